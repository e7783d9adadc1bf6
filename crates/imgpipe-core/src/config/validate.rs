//! Configuration validation with range checks.

use crate::error::ConfigError;
use crate::pipeline::raster::parse_hex_color;

use super::Config;

impl Config {
    /// Validate configuration values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.processing.parallel_workers == 0 {
            return Err(ConfigError::ValidationError(
                "processing.parallel_workers must be > 0".into(),
            ));
        }
        if self.processing.progress_buffer == 0 {
            return Err(ConfigError::ValidationError(
                "processing.progress_buffer must be > 0".into(),
            ));
        }
        if self.limits.max_file_size_mb == 0 {
            return Err(ConfigError::ValidationError(
                "limits.max_file_size_mb must be > 0".into(),
            ));
        }
        if self.limits.max_image_dimension == 0 {
            return Err(ConfigError::ValidationError(
                "limits.max_image_dimension must be > 0".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.encoding.default_quality) {
            return Err(ConfigError::ValidationError(
                "encoding.default_quality must be between 0.0 and 1.0".into(),
            ));
        }
        if self.watermark.font_size == 0 {
            return Err(ConfigError::ValidationError(
                "watermark.font_size must be > 0".into(),
            ));
        }
        if parse_hex_color(&self.watermark.color).is_none() {
            return Err(ConfigError::ValidationError(format!(
                "watermark.color must be #rrggbb or #rrggbbaa, got {:?}",
                self.watermark.color
            )));
        }
        if self.preview.size == 0 {
            return Err(ConfigError::ValidationError(
                "preview.size must be > 0".into(),
            ));
        }
        if self.export.archive_threshold == 0 {
            return Err(ConfigError::ValidationError(
                "export.archive_threshold must be > 0".into(),
            ));
        }
        if self.remote.timeout_ms == 0 {
            return Err(ConfigError::ValidationError(
                "remote.timeout_ms must be > 0".into(),
            ));
        }
        Ok(())
    }
}
