//! Run reports in JSON or JSON Lines.
//!
//! A JSON report is one document: the per-item records plus a summary. A
//! JSONL report has one record per item followed by a summary line, so it can
//! be appended to and streamed.

use serde::Serialize;
use std::io::{self, Write};

use crate::pipeline::{ItemStatus, PipelineItem, RunResult};

/// Report format options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportFormat {
    /// Single JSON document
    Json,
    /// One JSON object per line (newline-delimited JSON)
    JsonLines,
}

impl ReportFormat {
    /// Parse format from string (case-insensitive).
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "json" => Some(Self::Json),
            "jsonl" | "jsonlines" | "ndjson" => Some(Self::JsonLines),
            _ => None,
        }
    }
}

/// Aggregate numbers of a run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub label: String,
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub queued: usize,
    pub cancelled: bool,
    pub original_bytes: u64,
    pub result_bytes: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub savings_percent: Option<f64>,
}

impl From<&RunResult> for RunSummary {
    fn from(run: &RunResult) -> Self {
        Self {
            label: run.label.clone(),
            total: run.items.len(),
            succeeded: run.succeeded(),
            failed: run.failed(),
            queued: run.queued(),
            cancelled: run.cancelled,
            original_bytes: run.total_original_bytes(),
            result_bytes: run.total_result_bytes(),
            savings_percent: run.savings_percent(),
        }
    }
}

/// One line of a JSONL report.
#[derive(Serialize)]
struct Record<'a, T: Serialize> {
    record: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    index: Option<usize>,
    #[serde(flatten)]
    body: &'a T,
    #[serde(skip_serializing_if = "Option::is_none")]
    result_bytes: Option<u64>,
}

#[derive(Serialize)]
struct Document<'a> {
    summary: &'a RunSummary,
    items: &'a [PipelineItem],
}

/// Writes run reports to any `Write`.
pub struct ReportWriter<W: Write> {
    writer: W,
    format: ReportFormat,
    pretty: bool,
}

impl<W: Write> ReportWriter<W> {
    /// Create a new report writer. `pretty` only affects JSON.
    pub fn new(writer: W, format: ReportFormat, pretty: bool) -> Self {
        Self {
            writer,
            format,
            pretty,
        }
    }

    /// Write the report for a whole run.
    pub fn write_run(&mut self, run: &RunResult) -> io::Result<()> {
        let summary = RunSummary::from(run);
        match self.format {
            ReportFormat::Json => {
                let doc = Document {
                    summary: &summary,
                    items: &run.items,
                };
                if self.pretty {
                    serde_json::to_writer_pretty(&mut self.writer, &doc)
                        .map_err(io::Error::other)?;
                } else {
                    serde_json::to_writer(&mut self.writer, &doc).map_err(io::Error::other)?;
                }
                writeln!(self.writer)?;
            }
            ReportFormat::JsonLines => {
                for (index, item) in run.items.iter().enumerate() {
                    self.write_line(&Record {
                        record: "item",
                        index: Some(index),
                        body: item,
                        result_bytes: item.result_byte_size(),
                    })?;
                }
                self.write_line(&Record {
                    record: "summary",
                    index: None,
                    body: &summary,
                    result_bytes: None,
                })?;
            }
        }
        self.writer.flush()
    }

    fn write_line<T: Serialize>(&mut self, record: &T) -> io::Result<()> {
        // JSONL is never pretty-printed (one object per line)
        serde_json::to_writer(&mut self.writer, record).map_err(io::Error::other)?;
        writeln!(self.writer)
    }

    /// Consume the writer and return the underlying writer.
    pub fn into_inner(self) -> W {
        self.writer
    }
}

/// Items that ended in `error`, with their messages.
pub fn failures(run: &RunResult) -> impl Iterator<Item = (&str, &str)> {
    run.items
        .iter()
        .filter(|i| i.status == ItemStatus::Error)
        .map(|i| (i.name.as_str(), i.error.as_deref().unwrap_or("unknown error")))
}
