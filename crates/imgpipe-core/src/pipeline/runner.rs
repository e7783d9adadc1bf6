//! Batch orchestration: ingest, transform, and encode every item of a run.
//!
//! Each item moves `queued -> processing -> done | error`. A failing item
//! records its error and the run continues with the next one; nothing is
//! retried. Results come back in input order whatever the concurrency.

use futures_util::StreamExt;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;

use super::export::{prefixed_name, ExportBlob};
use super::format::OutputFormat;
use super::ingest::{SourceCandidate, SourceIngestor};
use super::preview::PreviewRegistry;
use super::raster::RasterBuffer;
use super::stages::{run_label, EncodeTarget, StageContext, TransformSpec, WorkingImage};
use crate::config::Config;
use crate::error::{PipelineError, PipelineResult};

/// Lifecycle of one item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    Queued,
    Processing,
    Done,
    Error,
}

/// One source file and what became of it.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineItem {
    pub name: String,
    pub original_byte_size: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_dimensions: Option<(u32, u32)>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_dimensions: Option<(u32, u32)>,
    pub applied_specs: Vec<TransformSpec>,
    pub status: ItemStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<ExportBlob>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub export_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PipelineItem {
    fn queued(candidate: &SourceCandidate) -> Self {
        Self {
            name: candidate.name.clone(),
            original_byte_size: candidate.bytes.len() as u64,
            source_dimensions: None,
            output_dimensions: None,
            applied_specs: Vec::new(),
            status: ItemStatus::Queued,
            result: None,
            export_name: None,
            error: None,
        }
    }

    /// Encoded size of the result, when there is one.
    pub fn result_byte_size(&self) -> Option<u64> {
        self.result.as_ref().map(ExportBlob::byte_size)
    }

    /// Size reduction relative to the original, in percent. Negative when
    /// the result grew.
    pub fn savings_percent(&self) -> Option<f64> {
        let result = self.result_byte_size()?;
        savings(self.original_byte_size, result)
    }
}

fn savings(original: u64, result: u64) -> Option<f64> {
    if original == 0 {
        return None;
    }
    Some((1.0 - result as f64 / original as f64) * 100.0)
}

/// Everything a run produced.
#[derive(Debug, Clone, Serialize)]
pub struct RunResult {
    /// Same order as the input candidates
    pub items: Vec<PipelineItem>,
    /// Label used for export names, e.g. `resized` or `processed`
    pub label: String,
    /// Set when the run stopped early; unstarted items stay queued
    pub cancelled: bool,
}

impl RunResult {
    pub fn succeeded(&self) -> usize {
        self.count(ItemStatus::Done)
    }

    pub fn failed(&self) -> usize {
        self.count(ItemStatus::Error)
    }

    pub fn queued(&self) -> usize {
        self.count(ItemStatus::Queued)
    }

    fn count(&self, status: ItemStatus) -> usize {
        self.items.iter().filter(|i| i.status == status).count()
    }

    fn done(&self) -> impl Iterator<Item = &PipelineItem> {
        self.items.iter().filter(|i| i.status == ItemStatus::Done)
    }

    /// Original bytes of the finished items.
    pub fn total_original_bytes(&self) -> u64 {
        self.done().map(|i| i.original_byte_size).sum()
    }

    /// Encoded bytes of the finished items.
    pub fn total_result_bytes(&self) -> u64 {
        self.done().filter_map(PipelineItem::result_byte_size).sum()
    }

    /// Aggregate size saving over the finished items.
    pub fn savings_percent(&self) -> Option<f64> {
        savings(self.total_original_bytes(), self.total_result_bytes())
    }
}

/// Observable run progress.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ProgressEvent {
    ItemStarted {
        index: usize,
        name: String,
    },
    ItemFinished {
        index: usize,
        name: String,
        status: ItemStatus,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    RunFinished {
        succeeded: usize,
        failed: usize,
        cancelled: bool,
    },
}

/// Cancellation flag shared between a run and whoever may stop it.
#[derive(Debug, Clone, Default)]
pub struct RunControl {
    cancelled: Arc<AtomicBool>,
}

impl RunControl {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the run to stop. Items already processing finish; the rest stay
    /// queued.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// What a successful item produced.
#[derive(Debug)]
struct ItemOutput {
    source_dimensions: (u32, u32),
    output_dimensions: (u32, u32),
    blob: ExportBlob,
}

/// Runs a list of transform steps over a batch of sources.
pub struct PipelineRunner {
    ingestor: SourceIngestor,
    ctx: StageContext,
    default_quality: f32,
    parallel_workers: usize,
    progress_buffer: usize,
}

impl PipelineRunner {
    /// Create a runner with its own preview registry.
    pub fn new(config: &Config) -> Self {
        Self::with_previews(config, PreviewRegistry::new(config.preview.clone()))
    }

    /// Create a runner issuing previews from an existing registry.
    pub fn with_previews(config: &Config, previews: PreviewRegistry) -> Self {
        Self {
            ingestor: SourceIngestor::new(config.limits.clone(), previews),
            ctx: StageContext::from_config(config),
            default_quality: config.encoding.default_quality,
            parallel_workers: config.processing.parallel_workers.max(1),
            progress_buffer: config.processing.progress_buffer.max(1),
        }
    }

    pub fn previews(&self) -> &PreviewRegistry {
        self.ingestor.previews()
    }

    pub fn stage_context(&self) -> &StageContext {
        &self.ctx
    }

    /// A bounded channel sized for this runner's progress events.
    pub fn progress_channel(&self) -> (mpsc::Sender<ProgressEvent>, mpsc::Receiver<ProgressEvent>) {
        mpsc::channel(self.progress_buffer)
    }

    /// Process every candidate through `specs`, in order.
    ///
    /// With one worker the batch is strictly sequential. With more, up to
    /// that many items are in flight at once and results are still yielded
    /// in input order. When `control` is cancelled, items not yet started
    /// stay queued and every outstanding preview handle is revoked.
    pub async fn run(
        &self,
        candidates: Vec<SourceCandidate>,
        specs: &[TransformSpec],
        progress: Option<mpsc::Sender<ProgressEvent>>,
        control: &RunControl,
    ) -> RunResult {
        let start = Instant::now();
        let label = run_label(specs);
        let mut items: Vec<PipelineItem> = candidates.iter().map(PipelineItem::queued).collect();
        tracing::debug!(
            "Running {} step(s) over {} item(s) with {} worker(s)",
            specs.len(),
            items.len(),
            self.parallel_workers
        );

        let progress = progress.as_ref();
        let mut outcomes = futures_util::stream::iter(candidates.into_iter().enumerate())
            .map(|(index, candidate)| async move {
                if control.is_cancelled() {
                    return (index, None);
                }
                let name = candidate.name.clone();
                notify(progress, ProgressEvent::ItemStarted { index, name }).await;
                (index, Some(self.process_item(candidate, specs).await))
            })
            .buffered(self.parallel_workers);

        while let Some((index, outcome)) = outcomes.next().await {
            let Some(outcome) = outcome else {
                continue;
            };
            let item = &mut items[index];
            match outcome {
                Ok(output) => {
                    item.status = ItemStatus::Done;
                    item.source_dimensions = Some(output.source_dimensions);
                    item.output_dimensions = Some(output.output_dimensions);
                    item.applied_specs = specs.to_vec();
                    item.export_name =
                        Some(prefixed_name(label, &item.name, output.blob.format));
                    item.result = Some(output.blob);
                    tracing::info!(
                        "{}: {} -> {} bytes",
                        item.name,
                        item.original_byte_size,
                        item.result_byte_size().unwrap_or(0)
                    );
                }
                Err(e) => {
                    tracing::warn!("{}: {}", item.name, e);
                    item.status = ItemStatus::Error;
                    item.error = Some(e.to_string());
                }
            }
            notify(
                progress,
                ProgressEvent::ItemFinished {
                    index,
                    name: item.name.clone(),
                    status: item.status,
                    error: item.error.clone(),
                },
            )
            .await;
        }
        drop(outcomes);

        let cancelled = control.is_cancelled();
        if cancelled {
            let revoked = self.previews().revoke_all();
            tracing::warn!("Run cancelled; revoked {revoked} preview handle(s)");
        }

        let result = RunResult {
            items,
            label: label.to_string(),
            cancelled,
        };
        notify(
            progress,
            ProgressEvent::RunFinished {
                succeeded: result.succeeded(),
                failed: result.failed(),
                cancelled,
            },
        )
        .await;
        tracing::debug!(
            "Run finished in {:?}: {} done, {} failed, {} queued",
            start.elapsed(),
            result.succeeded(),
            result.failed(),
            result.queued()
        );
        result
    }

    /// Ingest, transform, and encode one candidate.
    async fn process_item(
        &self,
        candidate: SourceCandidate,
        specs: &[TransformSpec],
    ) -> PipelineResult<ItemOutput> {
        let item_start = Instant::now();
        let ingested = self.ingestor.ingest(candidate).await?;
        let source = &ingested.source;
        let source_dimensions = (source.width(), source.height());

        let format = OutputFormat::parse(source.mime_type()).unwrap_or(OutputFormat::Png);
        let target = EncodeTarget {
            format,
            quality: self.default_quality,
        };
        let mut image = WorkingImage::new(RasterBuffer::from_image(source.image(), None)?, target);
        drop(ingested);

        for spec in specs {
            let stage_start = Instant::now();
            image = spec.apply(image, &self.ctx)?;
            tracing::trace!("  {}: {:?}", spec.kind(), stage_start.elapsed());
        }

        let output_dimensions = image.buffer.dimensions();
        let WorkingImage { buffer, target } = image;
        let bytes = buffer.into_encoded_bytes(target.format, target.quality).await?;
        tracing::trace!("  Total: {:?}", item_start.elapsed());

        Ok(ItemOutput {
            source_dimensions,
            output_dimensions,
            blob: ExportBlob::new(bytes, target.format),
        })
    }

    /// Ingest, transform, and encode a single candidate outside a batch.
    pub async fn process_one(
        &self,
        candidate: SourceCandidate,
        specs: &[TransformSpec],
    ) -> PipelineResult<ExportBlob> {
        if specs.is_empty() {
            return Err(PipelineError::invalid("runner", "no transform steps given"));
        }
        self.process_item(candidate, specs).await.map(|out| out.blob)
    }
}

async fn notify(progress: Option<&mpsc::Sender<ProgressEvent>>, event: ProgressEvent) {
    if let Some(tx) = progress {
        // A dropped receiver only means nobody is watching
        let _ = tx.send(event).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::stages::{ConvertSpec, ResizeSpec};
    use image::{ImageFormat, RgbaImage};
    use std::io::Cursor;

    fn png(width: u32, height: u32) -> Vec<u8> {
        let img = RgbaImage::from_pixel(width, height, image::Rgba([40, 80, 120, 255]));
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, ImageFormat::Png).unwrap();
        out.into_inner()
    }

    fn candidate(name: &str, bytes: Vec<u8>) -> SourceCandidate {
        SourceCandidate::new(name, Some("image/png"), bytes)
    }

    fn config(workers: usize) -> Config {
        let mut config = Config::default();
        config.processing.parallel_workers = workers;
        config.preview.enabled = false;
        config
    }

    #[tokio::test]
    async fn test_middle_failure_does_not_stop_batch() {
        let runner = PipelineRunner::new(&config(1));
        let specs = [TransformSpec::Resize(ResizeSpec::percent(50.0))];
        let result = runner
            .run(
                vec![
                    candidate("a.png", png(20, 10)),
                    candidate("b.png", b"garbage".to_vec()),
                    candidate("c.png", png(8, 8)),
                ],
                &specs,
                None,
                &RunControl::new(),
            )
            .await;

        let statuses: Vec<ItemStatus> = result.items.iter().map(|i| i.status).collect();
        assert_eq!(
            statuses,
            [ItemStatus::Done, ItemStatus::Error, ItemStatus::Done]
        );
        assert_eq!(result.items[0].output_dimensions, Some((10, 5)));
        assert_eq!(result.items[0].export_name.as_deref(), Some("resized_a.png"));
        assert!(result.items[1].error.as_deref().unwrap().contains("b.png"));
        assert!(result.items[1].result.is_none());
        assert_eq!(result.succeeded(), 2);
        assert_eq!(result.failed(), 1);
        assert!(!result.cancelled);
    }

    #[tokio::test]
    async fn test_oversized_watermark_fails_items_not_run() {
        let runner = PipelineRunner::new(&config(1));
        let step = "watermark:text=abc,font_size=2000000000";
        let specs = [crate::pipeline::parse_step(step).unwrap()];
        let result = runner
            .run(
                vec![candidate("a.png", png(4, 4)), candidate("b.png", png(4, 4))],
                &specs,
                None,
                &RunControl::new(),
            )
            .await;

        assert!(result.items.iter().all(|i| i.status == ItemStatus::Error));
        assert!(result.items[0].error.as_deref().unwrap().contains("font_size"));
        assert!(!result.cancelled);
    }

    #[tokio::test]
    async fn test_parallel_run_preserves_order() {
        let runner = PipelineRunner::new(&config(4));
        let candidates: Vec<SourceCandidate> = (1..=6)
            .map(|i| candidate(&format!("{i}.png"), png(i * 10, 4)))
            .collect();
        let result = runner
            .run(candidates, &[], None, &RunControl::new())
            .await;

        let widths: Vec<u32> = result
            .items
            .iter()
            .map(|i| i.output_dimensions.unwrap().0)
            .collect();
        assert_eq!(widths, [10, 20, 30, 40, 50, 60]);
        assert_eq!(result.label, "processed");
    }

    #[tokio::test]
    async fn test_progress_events_in_order() {
        let runner = PipelineRunner::new(&config(1));
        let (tx, mut rx) = runner.progress_channel();
        let result = runner
            .run(
                vec![candidate("a.png", png(2, 2)), candidate("b.png", vec![])],
                &[],
                Some(tx),
                &RunControl::new(),
            )
            .await;
        assert_eq!(result.succeeded(), 1);

        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        assert_eq!(events.len(), 5);
        assert!(matches!(events[0], ProgressEvent::ItemStarted { index: 0, .. }));
        assert!(matches!(
            events[1],
            ProgressEvent::ItemFinished {
                index: 0,
                status: ItemStatus::Done,
                ..
            }
        ));
        assert!(matches!(
            events[3],
            ProgressEvent::ItemFinished {
                index: 1,
                status: ItemStatus::Error,
                ..
            }
        ));
        assert_eq!(
            events[4],
            ProgressEvent::RunFinished {
                succeeded: 1,
                failed: 1,
                cancelled: false
            }
        );
    }

    #[tokio::test]
    async fn test_cancelled_run_leaves_items_queued() {
        let runner = PipelineRunner::new(&config(1));
        let control = RunControl::new();
        control.cancel();
        let held = runner.previews().acquire(&image::DynamicImage::new_rgb8(2, 2));

        let result = runner
            .run(
                vec![candidate("a.png", png(2, 2)), candidate("b.png", png(2, 2))],
                &[],
                None,
                &control,
            )
            .await;

        assert!(result.cancelled);
        assert_eq!(result.queued(), 2);
        assert!(!held.is_live());
        assert_eq!(runner.previews().outstanding(), 0);
    }

    #[tokio::test]
    async fn test_convert_changes_export_extension() {
        let runner = PipelineRunner::new(&config(1));
        let specs = [TransformSpec::Convert(ConvertSpec {
            format: "jpeg".into(),
        })];
        let result = runner
            .run(
                vec![candidate("photo.png", png(4, 4))],
                &specs,
                None,
                &RunControl::new(),
            )
            .await;
        let item = &result.items[0];
        assert_eq!(item.export_name.as_deref(), Some("converted_photo.jpg"));
        assert_eq!(item.result.as_ref().unwrap().mime_type(), "image/jpeg");
        assert_eq!(item.applied_specs, specs);
    }

    #[test]
    fn test_savings() {
        assert_eq!(savings(200, 50), Some(75.0));
        assert_eq!(savings(100, 150), Some(-50.0));
        assert_eq!(savings(0, 10), None);
    }

    #[tokio::test]
    async fn test_process_one_requires_steps() {
        let runner = PipelineRunner::new(&config(1));
        let err = runner
            .process_one(candidate("a.png", png(2, 2)), &[])
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::InvalidParameter { .. }));
    }
}
