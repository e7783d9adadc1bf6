//! Batch run: progress display, cancellation, export, and the summary table.

use std::path::PathBuf;
use std::time::Duration;

use imgpipe_core::pipeline::{prefixed_name, ExportEntry};
use imgpipe_core::report::failures;
use imgpipe_core::{ExportSink, ItemStatus, ProgressEvent, RunControl, RunResult};
use indicatif::ProgressBar;

use super::{ProcessArgs, ProcessContext};

/// Run the recipe over every candidate while a progress bar follows the
/// runner's events. Ctrl-C cancels the items not yet started.
pub async fn run_with_progress(ctx: &mut ProcessContext) -> RunResult {
    let progress = create_progress_bar(ctx.candidates.len() as u64);
    let (tx, mut rx) = ctx.runner.progress_channel();

    let bar = progress.clone();
    let watcher = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            match event {
                ProgressEvent::ItemStarted { name, .. } => bar.set_message(name),
                ProgressEvent::ItemFinished {
                    name,
                    status: ItemStatus::Error,
                    error,
                    ..
                } => {
                    bar.inc(1);
                    bar.println(format!(
                        "  failed: {name}: {}",
                        error.as_deref().unwrap_or("unknown error")
                    ));
                }
                ProgressEvent::ItemFinished { .. } => bar.inc(1),
                ProgressEvent::RunFinished { .. } => break,
            }
        }
    });

    let control = RunControl::new();
    let interrupt = {
        let control = control.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Interrupted; finishing items in flight");
                control.cancel();
            }
        })
    };

    let candidates = std::mem::take(&mut ctx.candidates);
    let result = ctx
        .runner
        .run(candidates, &ctx.recipe.steps, Some(tx), &control)
        .await;

    interrupt.abort();
    if let Err(e) = watcher.await {
        tracing::debug!("Progress watcher ended early: {e}");
    }
    progress.finish_and_clear();
    result
}

/// Write the finished items into the output directory, as separate files or
/// as one archive. Returns the written paths.
pub async fn export_results(
    ctx: &ProcessContext,
    args: &ProcessArgs,
    result: &RunResult,
) -> anyhow::Result<Vec<PathBuf>> {
    let sink = ExportSink::from_config(&ctx.config);
    let label = args.prefix.as_deref().unwrap_or(&result.label);
    let entries = export_entries(result, label);

    let finished = entries.iter().filter(|e| e.blob.is_some()).count();
    if finished == 0 {
        tracing::warn!("Nothing to export");
        return Ok(Vec::new());
    }

    if archive_wanted(finished, ctx.config.export.archive_threshold, args.archive) {
        let path = sink.export_batch(label, &entries).await?;
        return Ok(vec![path]);
    }

    Ok(sink.export_many(&entries).await?)
}

/// One entry per item, named `<label>_<stem>.<ext>`. Items without a result
/// keep their source name and are skipped by the sink.
fn export_entries<'a>(result: &'a RunResult, label: &str) -> Vec<ExportEntry<'a>> {
    result
        .items
        .iter()
        .map(|item| match item.result {
            Some(ref blob) => ExportEntry {
                name: prefixed_name(label, &item.name, blob.format),
                blob: Some(blob),
            },
            None => ExportEntry {
                name: item.name.clone(),
                blob: None,
            },
        })
        .collect()
}

fn archive_wanted(finished: usize, threshold: usize, forced: bool) -> bool {
    forced || finished >= threshold
}

/// Create a progress bar for batch processing.
fn create_progress_bar(total: u64) -> ProgressBar {
    use indicatif::ProgressStyle;

    let pb = ProgressBar::new(total);
    if let Ok(style) = ProgressStyle::default_bar().template(
        "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg}",
    ) {
        pb.set_style(style.progress_chars("##-"));
    }
    pb.set_message("starting...");
    pb
}

/// Print a formatted summary table after a run.
pub fn print_summary(result: &RunResult, skipped: usize, elapsed: Duration) {
    let original_mb = result.total_original_bytes() as f64 / 1_000_000.0;
    let result_mb = result.total_result_bytes() as f64 / 1_000_000.0;
    let rate = if elapsed.as_secs_f64() > 0.0 {
        result.succeeded() as f64 / elapsed.as_secs_f64()
    } else {
        0.0
    };

    eprintln!();
    eprintln!("  ====================================");
    eprintln!("          Summary: {}", result.label);
    eprintln!("  ====================================");
    eprintln!("    Succeeded:    {:>8}", result.succeeded());
    if result.failed() > 0 {
        eprintln!("    Failed:       {:>8}", result.failed());
    }
    if result.queued() > 0 {
        eprintln!("    Not started:  {:>8}", result.queued());
    }
    if skipped > 0 {
        eprintln!("    Skipped:      {:>8}", skipped);
    }
    eprintln!("  ------------------------------------");
    eprintln!("    Original:     {:>7.2} MB", original_mb);
    eprintln!("    Result:       {:>7.2} MB", result_mb);
    if let Some(savings) = result.savings_percent() {
        eprintln!("    Saved:        {:>7.1}%", savings);
    }
    eprintln!("    Duration:     {:>7.1}s", elapsed.as_secs_f64());
    eprintln!("    Rate:         {:>7.1} img/sec", rate);
    eprintln!("  ====================================");

    for (name, error) in failures(result) {
        eprintln!("    {name}: {error}");
    }
}
