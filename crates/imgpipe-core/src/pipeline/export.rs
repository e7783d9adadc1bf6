//! Writing finished items to disk: one file, or one zip archive per batch.

use serde::Serialize;
use std::collections::HashSet;
use std::io::Write;
use std::path::{Path, PathBuf};

use super::format::OutputFormat;
use crate::config::Config;
use crate::error::{PipelineError, PipelineResult};

/// Encoded output of one item.
#[derive(Clone, PartialEq, Eq, Serialize)]
pub struct ExportBlob {
    #[serde(skip)]
    pub bytes: Vec<u8>,
    pub format: OutputFormat,
}

impl ExportBlob {
    pub fn new(bytes: Vec<u8>, format: OutputFormat) -> Self {
        Self { bytes, format }
    }

    pub fn mime_type(&self) -> &'static str {
        self.format.mime_type()
    }

    pub fn byte_size(&self) -> u64 {
        self.bytes.len() as u64
    }
}

impl std::fmt::Debug for ExportBlob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExportBlob")
            .field("format", &self.format)
            .field("bytes", &self.bytes.len())
            .finish()
    }
}

/// A named archive entry. Entries without a blob are skipped.
#[derive(Debug, Clone)]
pub struct ExportEntry<'a> {
    pub name: String,
    pub blob: Option<&'a ExportBlob>,
}

/// `<label>_<stem>.<ext>`, with the extension following the encoded format.
pub fn prefixed_name(label: &str, source_name: &str, format: OutputFormat) -> String {
    let stem = Path::new(source_name)
        .file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .unwrap_or("image");
    format!("{label}_{stem}.{}", format.extension())
}

/// Archive file name for a batch.
pub fn archive_name(label: &str) -> String {
    format!("{label}_images.zip")
}

/// Append `_1`, `_2`, ... before the extension until `name` is unused.
fn unique_name(name: &str, taken: &mut HashSet<String>) -> String {
    if taken.insert(name.to_string()) {
        return name.to_string();
    }
    let (stem, ext) = match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => (stem, Some(ext)),
        _ => (name, None),
    };
    (1..)
        .map(|n| match ext {
            Some(ext) => format!("{stem}_{n}.{ext}"),
            None => format!("{stem}_{n}"),
        })
        .find(|candidate| taken.insert(candidate.clone()))
        .unwrap_or_else(|| name.to_string())
}

/// Writes artifacts into one output directory.
#[derive(Debug, Clone)]
pub struct ExportSink {
    output_dir: PathBuf,
}

impl ExportSink {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.output_dir())
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Write one artifact as `suggested_name`. Returns the written path.
    pub async fn export_single(
        &self,
        blob: &ExportBlob,
        suggested_name: &str,
    ) -> PipelineResult<PathBuf> {
        let export_err = |e: std::io::Error| PipelineError::Export {
            name: suggested_name.to_string(),
            message: e.to_string(),
        };
        tokio::fs::create_dir_all(&self.output_dir)
            .await
            .map_err(export_err)?;
        let path = self.output_dir.join(suggested_name);
        tokio::fs::write(&path, &blob.bytes)
            .await
            .map_err(export_err)?;
        tracing::info!("Saved {} ({} bytes)", path.display(), blob.bytes.len());
        Ok(path)
    }

    /// Write every entry that has a blob as its own file. Names repeated
    /// within the batch get a numeric suffix. Returns the written paths in
    /// entry order.
    pub async fn export_many(&self, entries: &[ExportEntry<'_>]) -> PipelineResult<Vec<PathBuf>> {
        let mut taken = HashSet::new();
        let mut written = Vec::with_capacity(entries.len());
        for entry in entries {
            let Some(blob) = entry.blob else {
                continue;
            };
            let name = unique_name(&entry.name, &mut taken);
            written.push(self.export_single(blob, &name).await?);
        }
        Ok(written)
    }

    /// Write a deflate zip named after `label` holding every entry that has a
    /// blob. Duplicate entry names get a numeric suffix.
    pub async fn export_batch(
        &self,
        label: &str,
        entries: &[ExportEntry<'_>],
    ) -> PipelineResult<PathBuf> {
        let name = archive_name(label);
        let path = self.output_dir.join(&name);

        let mut taken = HashSet::new();
        let files: Vec<(String, Vec<u8>)> = entries
            .iter()
            .filter_map(|entry| {
                let blob = entry.blob?;
                Some((unique_name(&entry.name, &mut taken), blob.bytes.clone()))
            })
            .collect();
        let skipped = entries.len() - files.len();

        let dir = self.output_dir.clone();
        let target = path.clone();
        let count = files.len();
        tokio::task::spawn_blocking(move || write_zip(&dir, &target, files))
            .await
            .map_err(|e| PipelineError::Export {
                name: name.clone(),
                message: format!("Task join error: {e}"),
            })?
            .map_err(|message| PipelineError::Export {
                name: name.clone(),
                message,
            })?;

        if skipped > 0 {
            tracing::debug!("Skipped {skipped} entr(ies) without a result");
        }
        tracing::info!("Saved {} ({count} file(s))", path.display());
        Ok(path)
    }
}

fn write_zip(dir: &Path, path: &Path, files: Vec<(String, Vec<u8>)>) -> Result<(), String> {
    std::fs::create_dir_all(dir).map_err(|e| e.to_string())?;
    let file = std::fs::File::create(path).map_err(|e| e.to_string())?;
    let mut zip = zip::ZipWriter::new(file);
    let options = zip::write::SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated);

    for (name, bytes) in files {
        zip.start_file(name, options).map_err(|e| e.to_string())?;
        zip.write_all(&bytes).map_err(|e| e.to_string())?;
    }
    zip.finish().map_err(|e| e.to_string())?;
    Ok(())
}
