//! The `imgpipe process` command for running transform steps over images.

mod batch;
mod setup;
pub mod types;

pub use types::ReportFormatArg;

use clap::Args;
use imgpipe_core::report::ReportWriter;
use imgpipe_core::{Config, PipelineRunner, Recipe, RunResult, SourceCandidate};
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use batch::{export_results, print_summary, run_with_progress};
use setup::setup_run;

/// Arguments for the `process` command.
#[derive(Args, Debug)]
pub struct ProcessArgs {
    /// Image files or directories to process
    #[arg(required = true)]
    pub inputs: Vec<PathBuf>,

    /// Transform step as KIND:KEY=VALUE,... (repeatable, applied in order)
    #[arg(short, long = "step", value_name = "STEP")]
    pub steps: Vec<String>,

    /// TOML recipe with [[steps]] tables, applied before any --step
    #[arg(short, long)]
    pub recipe: Option<PathBuf>,

    /// Directory for exported files (defaults to [export] output_dir)
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,

    /// Always bundle the results into one zip archive
    #[arg(long)]
    pub archive: bool,

    /// Prefix for exported names (defaults to the step's label, or "processed")
    #[arg(long)]
    pub prefix: Option<String>,

    /// Number of items processed at once (defaults to [processing] parallel_workers)
    #[arg(short, long)]
    pub parallel: Option<usize>,

    /// Write a run report to this file
    #[arg(long)]
    pub report: Option<PathBuf>,

    /// Report format
    #[arg(long, value_enum, default_value = "json")]
    pub report_format: ReportFormatArg,
}

/// Manual Default impl for constructing ProcessArgs outside of clap.
///
/// Values match the clap `#[arg(default_value = ...)]` annotations above.
impl Default for ProcessArgs {
    fn default() -> Self {
        Self {
            inputs: Vec::new(),
            steps: Vec::new(),
            recipe: None,
            output_dir: None,
            archive: false,
            prefix: None,
            parallel: None,
            report: None,
            report_format: ReportFormatArg::Json,
        }
    }
}

/// Everything a run needs, assembled by setup_run().
pub(crate) struct ProcessContext {
    pub config: Config,
    pub runner: PipelineRunner,
    pub recipe: Recipe,
    pub candidates: Vec<SourceCandidate>,
    /// Inputs dropped before the run (unreadable or not an image)
    pub skipped: usize,
}

/// Execute the process command.
pub async fn execute(args: ProcessArgs, config: Config) -> anyhow::Result<()> {
    let mut ctx = setup_run(&args, config)?;
    let start = std::time::Instant::now();

    let result = run_with_progress(&mut ctx).await;
    let written = export_results(&ctx, &args, &result).await?;
    for path in &written {
        println!("{}", path.display());
    }

    print_summary(&result, ctx.skipped, start.elapsed());

    if let Some(ref path) = args.report {
        write_report(path, args.report_format, &result)?;
        tracing::info!("Report written to {:?}", path);
    }

    if result.cancelled {
        anyhow::bail!("Run cancelled; {} item(s) left unprocessed", result.queued());
    }
    if result.succeeded() == 0 {
        anyhow::bail!("All {} item(s) failed", result.failed());
    }
    Ok(())
}

fn write_report(path: &Path, format: ReportFormatArg, result: &RunResult) -> anyhow::Result<()> {
    let file = File::create(path)?;
    ReportWriter::new(BufWriter::new(file), format.into(), true).write_run(result)?;
    Ok(())
}
