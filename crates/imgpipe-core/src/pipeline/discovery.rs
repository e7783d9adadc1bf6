//! Turning command-line inputs into source candidates.

use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use super::ingest::SourceCandidate;
use crate::config::ProcessingConfig;
use crate::error::PipelineError;

/// Expands input paths into files.
pub struct InputDiscovery {
    config: ProcessingConfig,
}

/// A file found on disk.
#[derive(Debug, Clone)]
pub struct DiscoveredFile {
    /// Full path to the file
    pub path: PathBuf,
    /// File size in bytes
    pub size: u64,
}

/// Candidates read from disk, plus the inputs that could not be read.
#[derive(Debug, Default)]
pub struct Gathered {
    pub candidates: Vec<SourceCandidate>,
    pub errors: Vec<PipelineError>,
}

impl InputDiscovery {
    pub fn new(config: ProcessingConfig) -> Self {
        Self { config }
    }

    /// Files named by `path`.
    ///
    /// A file is returned as-is whatever its extension, so the selection
    /// boundary can report it. A directory is walked recursively and only
    /// files with a supported extension are kept, sorted by path.
    pub fn discover(&self, path: &Path) -> Vec<DiscoveredFile> {
        if path.is_file() {
            return std::fs::metadata(path)
                .map(|meta| {
                    vec![DiscoveredFile {
                        path: path.to_path_buf(),
                        size: meta.len(),
                    }]
                })
                .unwrap_or_default();
        }

        let mut files: Vec<DiscoveredFile> = WalkDir::new(path)
            .follow_links(true)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|entry| entry.file_type().is_file() && self.is_supported(entry.path()))
            .filter_map(|entry| {
                let size = entry.metadata().ok()?.len();
                Some(DiscoveredFile {
                    path: entry.into_path(),
                    size,
                })
            })
            .collect();

        files.sort_by(|a, b| a.path.cmp(&b.path));
        files
    }

    /// Read every input into a candidate, in argument order.
    pub fn gather(&self, inputs: &[PathBuf]) -> Gathered {
        let mut gathered = Gathered::default();
        for input in inputs {
            if !input.exists() {
                gathered.errors.push(PipelineError::FileNotFound(input.clone()));
                continue;
            }
            for file in self.discover(input) {
                match SourceCandidate::from_path(&file.path) {
                    Ok(candidate) => gathered.candidates.push(candidate),
                    Err(e) => gathered.errors.push(e),
                }
            }
        }
        tracing::debug!(
            "Gathered {} candidate(s), {} unreadable input(s)",
            gathered.candidates.len(),
            gathered.errors.len()
        );
        gathered
    }

    fn is_supported(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| {
                self.config
                    .supported_formats
                    .iter()
                    .any(|fmt| fmt.eq_ignore_ascii_case(ext))
            })
            .unwrap_or(false)
    }
}
