//! Error types for the imgpipe image pipeline.
//!
//! Errors are organized by where they surface: configuration loading, or a
//! single pipeline item. Pipeline errors carry enough context (item name,
//! offending parameter) to be shown to the user as-is.

use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for imgpipe operations.
#[derive(Error, Debug)]
pub enum ImgpipeError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Pipeline processing errors
    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// General I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to read the config file from disk
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    /// Failed to parse TOML configuration
    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Configuration values are invalid
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Errors raised while ingesting, transforming, or exporting one item.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Declared media type is not an image type
    #[error("Not an image: {name} (declared type {declared})")]
    InvalidType { name: String, declared: String },

    /// Source bytes could not be decoded
    #[error("Decode error for {name}: {message}")]
    DecodeFailure { name: String, message: String },

    /// Pixel array length does not match width * height * 4
    #[error("Pixel buffer has {actual} bytes, expected {expected} for {width}x{height}")]
    BufferShapeMismatch {
        width: u32,
        height: u32,
        expected: usize,
        actual: usize,
    },

    /// A transform parameter is outside its domain
    #[error("Invalid {stage} parameter: {message}")]
    InvalidParameter { stage: &'static str, message: String },

    /// The raster encoder does not support the requested media type
    #[error("Unsupported encoding: {0}")]
    UnsupportedEncoding(String),

    /// A stage requested an output format that cannot be produced
    #[error("Encoding unavailable for {stage}: {format}")]
    EncodingUnavailable { stage: &'static str, format: String },

    /// The remote transform endpoint answered with a failure
    #[error("Server error{}: {message}", status_suffix(.status))]
    ServerError {
        status: Option<u16>,
        message: String,
    },

    /// File exceeds size limit
    #[error("File too large: {name} ({size_mb}MB > {max_mb}MB)")]
    FileTooLarge {
        name: String,
        size_mb: u64,
        max_mb: u64,
    },

    /// Image dimensions exceed limit
    #[error("Image too large: {name} ({width}x{height} > {max_dim})")]
    ImageTooLarge {
        name: String,
        width: u32,
        height: u32,
        max_dim: u32,
    },

    /// File not found
    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    /// Writing an artifact failed
    #[error("Export failed for {name}: {message}")]
    Export { name: String, message: String },
}

impl PipelineError {
    /// Shorthand for [`PipelineError::InvalidParameter`].
    pub fn invalid(stage: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidParameter {
            stage,
            message: message.into(),
        }
    }
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" (HTTP {s})")).unwrap_or_default()
}

/// Convenience type alias for imgpipe results.
pub type Result<T> = std::result::Result<T, ImgpipeError>;

/// Convenience type alias for pipeline-specific results.
pub type PipelineResult<T> = std::result::Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_error_message_includes_status() {
        let err = PipelineError::ServerError {
            status: Some(501),
            message: "Operation not implemented".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Server error (HTTP 501): Operation not implemented"
        );
    }

    #[test]
    fn server_error_message_without_status() {
        let err = PipelineError::ServerError {
            status: None,
            message: "connection refused".to_string(),
        };
        assert_eq!(err.to_string(), "Server error: connection refused");
    }

    #[test]
    fn invalid_shorthand_names_stage() {
        let err = PipelineError::invalid("resize", "width must be > 0");
        assert!(err.to_string().contains("resize"));
        assert!(err.to_string().contains("width must be > 0"));
    }
}
