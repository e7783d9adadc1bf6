//! Configuration management for imgpipe.
//!
//! Configuration is loaded from `config.toml` in the platform config
//! directory. Every section has defaults, so a missing file or a partial file
//! is fine.

mod types;
mod validate;

pub use types::*;

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Root configuration structure for imgpipe.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Processing settings
    pub processing: ProcessingConfig,

    /// Resource limits
    pub limits: LimitsConfig,

    /// Encoder defaults
    pub encoding: EncodingConfig,

    /// Watermark defaults
    pub watermark: WatermarkConfig,

    /// Preview handle settings
    pub preview: PreviewConfig,

    /// Export settings
    pub export: ExportConfig,

    /// Server-side transform endpoint
    pub remote: RemoteConfig,

    /// Logging settings
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from the default location.
    ///
    /// Returns default configuration if the file doesn't exist.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Get the default config file path.
    ///
    /// - macOS: ~/Library/Application Support/dev.imgpipe.imgpipe/config.toml
    /// - Linux: ~/.config/imgpipe/config.toml
    /// - Windows: C:\Users\<User>\AppData\Roaming\imgpipe\imgpipe\config\config.toml
    ///
    /// Falls back to ~/.imgpipe/config.toml if directory detection fails.
    pub fn default_path() -> PathBuf {
        directories::ProjectDirs::from("dev", "imgpipe", "imgpipe")
            .map(|dirs| dirs.config_dir().to_path_buf().join("config.toml"))
            .unwrap_or_else(|| {
                let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
                PathBuf::from(home).join(".imgpipe").join("config.toml")
            })
    }

    /// Get the resolved output directory (with ~ expansion).
    pub fn output_dir(&self) -> PathBuf {
        let path_str = self.export.output_dir.to_string_lossy();
        let expanded = shellexpand::tilde(&path_str);
        PathBuf::from(expanded.into_owned())
    }

    /// Serialize the config to a pretty TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::ValidationError(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.processing.parallel_workers, 1);
        assert_eq!(config.watermark.padding, 20);
        assert_eq!(config.limits.max_file_size_mb, 50);
        assert!(config.remote.endpoint.is_none());
    }

    #[test]
    fn test_config_to_toml() {
        let config = Config::default();
        let toml = config.to_toml().unwrap();
        assert!(toml.contains("[processing]"));
        assert!(toml.contains("[watermark]"));
        assert!(toml.contains("[export]"));
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[watermark]\npadding = 8\n").unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.watermark.padding, 8);
        assert_eq!(config.watermark.font_size, 32);
        assert_eq!(config.encoding.default_quality, 0.92);
    }

    #[test]
    fn test_load_rejects_invalid_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[encoding]\ndefault_quality = 3.0\n").unwrap();

        let err = Config::load_from(&path).unwrap_err();
        assert!(err.to_string().contains("default_quality"));
    }

    #[test]
    fn test_output_dir_expands_tilde() {
        let mut config = Config::default();
        config.export.output_dir = PathBuf::from("~/exports");
        assert!(config.output_dir().ends_with("exports"));

        config.export.output_dir = PathBuf::from("out/batch");
        assert_eq!(config.output_dir(), PathBuf::from("out/batch"));
    }
}
