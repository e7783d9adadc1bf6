//! Source ingestion: type gate, size limits, and decode.

use image::{DynamicImage, GenericImageView};
use std::io::Cursor;
use std::path::Path;

use super::format::{declared_type_for_path, mime_for_image_format};
use super::preview::{PreviewHandle, PreviewRegistry};
use crate::config::LimitsConfig;
use crate::error::{PipelineError, PipelineResult};

/// A user-supplied file before any validation.
#[derive(Debug, Clone)]
pub struct SourceCandidate {
    /// Name shown to the user and used for export naming
    pub name: String,
    /// Media type as declared by the selection (never sniffed)
    pub declared_type: Option<String>,
    /// File contents
    pub bytes: Vec<u8>,
}

impl SourceCandidate {
    /// Create a candidate from in-memory data.
    pub fn new(name: impl Into<String>, declared_type: Option<&str>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            declared_type: declared_type.map(str::to_string),
            bytes,
        }
    }

    /// Read a candidate from disk. The declared type comes from the extension.
    pub fn from_path(path: &Path) -> PipelineResult<Self> {
        if !path.exists() {
            return Err(PipelineError::FileNotFound(path.to_path_buf()));
        }
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("unknown")
            .to_string();
        let bytes = std::fs::read(path).map_err(|e| PipelineError::DecodeFailure {
            name: name.clone(),
            message: format!("Cannot read file: {e}"),
        })?;
        Ok(Self {
            name,
            declared_type: declared_type_for_path(path),
            bytes,
        })
    }

    /// Whether the declared type is in the `image/` category.
    pub fn has_image_type(&self) -> bool {
        self.declared_type
            .as_deref()
            .is_some_and(|t| t.trim().to_ascii_lowercase().starts_with("image/"))
    }

    fn type_error(&self) -> PipelineError {
        PipelineError::InvalidType {
            name: self.name.clone(),
            declared: self
                .declared_type
                .clone()
                .unwrap_or_else(|| "none".to_string()),
        }
    }
}

/// Outcome of the file selection boundary.
#[derive(Debug, Default)]
pub struct Selection {
    /// Candidates that may enter a run, in input order
    pub accepted: Vec<SourceCandidate>,
    /// One `InvalidType` error per rejected candidate
    pub rejected: Vec<PipelineError>,
}

/// Split candidates by declared media type before any processing starts.
pub fn select(candidates: Vec<SourceCandidate>) -> Selection {
    let mut selection = Selection::default();
    for candidate in candidates {
        if candidate.has_image_type() {
            selection.accepted.push(candidate);
        } else {
            tracing::warn!(
                "Rejected {}: declared type {:?} is not an image",
                candidate.name,
                candidate.declared_type
            );
            selection.rejected.push(candidate.type_error());
        }
    }
    selection
}

/// A successfully decoded source. Immutable once created.
pub struct SourceImage {
    raw_bytes: Vec<u8>,
    mime_type: String,
    width: u32,
    height: u32,
    display_name: String,
    decoded: DynamicImage,
}

impl SourceImage {
    pub fn raw_bytes(&self) -> &[u8] {
        &self.raw_bytes
    }

    /// Media type of the decoded container (falls back to the declared type)
    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn original_byte_size(&self) -> u64 {
        self.raw_bytes.len() as u64
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    /// The decoded raster.
    pub fn image(&self) -> &DynamicImage {
        &self.decoded
    }
}

impl std::fmt::Debug for SourceImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceImage")
            .field("display_name", &self.display_name)
            .field("mime_type", &self.mime_type)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("original_byte_size", &self.original_byte_size())
            .finish()
    }
}

/// A decoded source plus the preview handle allocated for it.
#[derive(Debug)]
pub struct Ingested {
    pub source: SourceImage,
    /// Revoked when dropped; keep it alive while the preview is shown
    pub preview: PreviewHandle,
}

/// Validates candidates and decodes them into [`SourceImage`]s.
#[derive(Debug, Clone)]
pub struct SourceIngestor {
    limits: LimitsConfig,
    previews: PreviewRegistry,
}

impl SourceIngestor {
    /// Create an ingestor with the given limits, issuing previews from `previews`.
    pub fn new(limits: LimitsConfig, previews: PreviewRegistry) -> Self {
        Self { limits, previews }
    }

    /// The registry previews are issued from.
    pub fn previews(&self) -> &PreviewRegistry {
        &self.previews
    }

    /// Validate and decode one candidate.
    ///
    /// Decoding runs on the blocking thread pool; this is the only await
    /// point of ingestion.
    pub async fn ingest(&self, candidate: SourceCandidate) -> PipelineResult<Ingested> {
        if !candidate.has_image_type() {
            return Err(candidate.type_error());
        }

        let max_bytes = self.limits.max_file_size_mb * 1024 * 1024;
        if candidate.bytes.len() as u64 > max_bytes {
            return Err(PipelineError::FileTooLarge {
                name: candidate.name,
                size_mb: candidate.bytes.len() as u64 / (1024 * 1024),
                max_mb: self.limits.max_file_size_mb,
            });
        }

        let name = candidate.name.clone();
        let source = tokio::task::spawn_blocking(move || decode_sync(candidate))
            .await
            .map_err(|e| PipelineError::DecodeFailure {
                name,
                message: format!("Task join error: {e}"),
            })??;

        let max_dim = self.limits.max_image_dimension;
        if source.width > max_dim || source.height > max_dim {
            return Err(PipelineError::ImageTooLarge {
                name: source.display_name,
                width: source.width,
                height: source.height,
                max_dim,
            });
        }

        let preview = self.previews.acquire(&source.decoded);
        tracing::debug!(
            "Ingested {} ({}x{}, {} bytes, {})",
            source.display_name,
            source.width,
            source.height,
            source.original_byte_size(),
            source.mime_type
        );
        Ok(Ingested { source, preview })
    }
}

/// Synchronous decode (runs in spawn_blocking).
fn decode_sync(candidate: SourceCandidate) -> PipelineResult<SourceImage> {
    let SourceCandidate {
        name,
        declared_type,
        bytes,
    } = candidate;

    let reader = image::ImageReader::new(Cursor::new(bytes.as_slice()))
        .with_guessed_format()
        .map_err(|e| PipelineError::DecodeFailure {
            name: name.clone(),
            message: format!("Cannot detect image format: {e}"),
        })?;
    let mime_type = reader
        .format()
        .map(mime_for_image_format)
        .or(declared_type)
        .unwrap_or_else(|| "application/octet-stream".to_string());
    let decoded = reader.decode().map_err(|e| PipelineError::DecodeFailure {
        name: name.clone(),
        message: e.to_string(),
    })?;

    let (width, height) = decoded.dimensions();
    Ok(SourceImage {
        raw_bytes: bytes,
        mime_type,
        width,
        height,
        display_name: name,
        decoded,
    })
}
