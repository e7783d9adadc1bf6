//! Output formats the encoder can produce, and media type helpers.

use image::ImageFormat;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// An encodable output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Png,
    #[serde(alias = "jpg")]
    Jpeg,
    Webp,
    Bmp,
    Gif,
}

impl OutputFormat {
    /// Parse a format from a media type (`image/jpeg`) or a bare name/extension
    /// (`jpeg`, `jpg`, `.png`). Returns `None` for anything the encoder cannot
    /// produce.
    pub fn parse(s: &str) -> Option<Self> {
        let lower = s.trim().to_ascii_lowercase();
        let name = lower
            .strip_prefix("image/")
            .unwrap_or_else(|| lower.trim_start_matches('.'));
        match name {
            "png" => Some(Self::Png),
            "jpeg" | "jpg" | "pjpeg" => Some(Self::Jpeg),
            "webp" => Some(Self::Webp),
            "bmp" | "x-ms-bmp" => Some(Self::Bmp),
            "gif" => Some(Self::Gif),
            _ => None,
        }
    }

    /// The media type, e.g. `image/png`.
    pub fn mime_type(self) -> &'static str {
        match self {
            Self::Png => "image/png",
            Self::Jpeg => "image/jpeg",
            Self::Webp => "image/webp",
            Self::Bmp => "image/bmp",
            Self::Gif => "image/gif",
        }
    }

    /// File extension without the dot.
    pub fn extension(self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg => "jpg",
            Self::Webp => "webp",
            Self::Bmp => "bmp",
            Self::Gif => "gif",
        }
    }

    /// Whether the container can store an alpha channel.
    pub fn supports_alpha(self) -> bool {
        !matches!(self, Self::Jpeg | Self::Bmp)
    }

    pub(crate) fn image_format(self) -> ImageFormat {
        match self {
            Self::Png => ImageFormat::Png,
            Self::Jpeg => ImageFormat::Jpeg,
            Self::Webp => ImageFormat::WebP,
            Self::Bmp => ImageFormat::Bmp,
            Self::Gif => ImageFormat::Gif,
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| format!("unsupported output format: {s}"))
    }
}

/// Declared media type for a file, derived from its extension only.
///
/// This mirrors what a browser reports for a selected file: a label, not a
/// content check.
pub fn declared_type_for_path(path: &Path) -> Option<String> {
    ImageFormat::from_path(path)
        .ok()
        .map(|f| f.to_mime_type().to_string())
        .or_else(|| {
            let ext = path.extension()?.to_str()?.to_ascii_lowercase();
            let mime = match ext.as_str() {
                "txt" | "md" => "text/plain",
                "pdf" => "application/pdf",
                "json" => "application/json",
                "svg" => "image/svg+xml",
                "heic" => "image/heic",
                _ => "application/octet-stream",
            };
            Some(mime.to_string())
        })
}

/// Map a decoded container format to a media type string.
pub fn mime_for_image_format(format: ImageFormat) -> String {
    format.to_mime_type().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_accepts_mime_and_extension() {
        assert_eq!(OutputFormat::parse("image/jpeg"), Some(OutputFormat::Jpeg));
        assert_eq!(OutputFormat::parse("JPG"), Some(OutputFormat::Jpeg));
        assert_eq!(OutputFormat::parse(".png"), Some(OutputFormat::Png));
        assert_eq!(OutputFormat::parse("webp"), Some(OutputFormat::Webp));
    }

    #[test]
    fn parse_rejects_formats_without_encoder() {
        assert_eq!(OutputFormat::parse("image/avif"), None);
        assert_eq!(OutputFormat::parse("image/heic"), None);
        assert_eq!(OutputFormat::parse("tiff"), None);
    }

    #[test]
    fn alpha_support() {
        assert!(OutputFormat::Png.supports_alpha());
        assert!(OutputFormat::Webp.supports_alpha());
        assert!(!OutputFormat::Jpeg.supports_alpha());
        assert!(!OutputFormat::Bmp.supports_alpha());
    }

    #[test]
    fn declared_type_follows_extension() {
        assert_eq!(
            declared_type_for_path(Path::new("cat.JPG")).as_deref(),
            Some("image/jpeg")
        );
        assert_eq!(
            declared_type_for_path(Path::new("notes.txt")).as_deref(),
            Some("text/plain")
        );
        assert_eq!(declared_type_for_path(Path::new("noext")), None);
    }

    #[test]
    fn serde_uses_lowercase_names() {
        let json = serde_json::to_string(&OutputFormat::Webp).unwrap();
        assert_eq!(json, "\"webp\"");
        let parsed: OutputFormat = serde_json::from_str("\"jpg\"").unwrap();
        assert_eq!(parsed, OutputFormat::Jpeg);
    }
}
