//! Sub-configuration structs with their defaults.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Processing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingConfig {
    /// Items processed concurrently. 1 keeps the batch strictly sequential,
    /// so only one decoded raster and one working buffer are alive at a time.
    pub parallel_workers: usize,

    /// Capacity of the progress event channel. A full channel makes the
    /// runner wait for the observer.
    pub progress_buffer: usize,

    /// File extensions picked up when a directory is given as input
    pub supported_formats: Vec<String>,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            parallel_workers: 1,
            progress_buffer: 64,
            supported_formats: vec![
                "jpg".to_string(),
                "jpeg".to_string(),
                "png".to_string(),
                "webp".to_string(),
                "gif".to_string(),
                "bmp".to_string(),
            ],
        }
    }
}

/// Resource limits to protect against problematic inputs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Maximum file size in megabytes
    pub max_file_size_mb: u64,

    /// Maximum image dimension (width or height), for sources and for
    /// buffers allocated by resize/rotate
    pub max_image_dimension: u32,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_file_size_mb: 50,
            max_image_dimension: 16384,
        }
    }
}

/// Encoder defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EncodingConfig {
    /// Quality factor in [0, 1] used when no compress stage sets one
    pub default_quality: f32,
}

impl Default for EncodingConfig {
    fn default() -> Self {
        Self {
            default_quality: 0.92,
        }
    }
}

/// Watermark drawing defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WatermarkConfig {
    /// Distance in pixels between the text and the anchored edges
    pub padding: u32,

    /// Text height in pixels when a watermark step does not set one
    pub font_size: u32,

    /// Text color as `#rrggbb` or `#rrggbbaa`
    pub color: String,
}

impl Default for WatermarkConfig {
    fn default() -> Self {
        Self {
            padding: 20,
            font_size: 32,
            color: "#ffffff".to_string(),
        }
    }
}

/// Preview handle settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PreviewConfig {
    /// Whether ingested images get a thumbnail preview
    pub enabled: bool,

    /// Preview size in pixels (longest edge)
    pub size: u32,
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            size: 256,
        }
    }
}

/// Export settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    /// Directory artifacts are written to
    pub output_dir: PathBuf,

    /// Batches with at least this many finished items are bundled into one
    /// archive instead of separate files
    pub archive_threshold: usize,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("."),
            archive_threshold: 2,
        }
    }
}

/// Server-side transform endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// Base URL; operations are posted to `<endpoint>/<operation>`
    pub endpoint: Option<String>,

    /// Request timeout in milliseconds
    pub timeout_ms: u64,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            timeout_ms: 30000,
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: error, warn, info, debug, trace
    pub level: String,

    /// Log format: "pretty" or "json"
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}
