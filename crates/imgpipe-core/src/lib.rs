//! imgpipe core - embeddable image transform pipeline.
//!
//! Takes image files, runs an ordered list of transform steps over each of
//! them (compress, resize, crop, rotate, watermark, color-key removal,
//! filters, convert), and exports the results as files or one zip archive.
//!
//! # Architecture
//!
//! ```text
//! Select → Ingest (decode) → RasterBuffer → Stage… → Encode → Export
//! ```
//!
//! Decode and encode run on tokio's blocking pool; everything between them
//! is synchronous work on one owned buffer per item.
//!
//! # Usage
//!
//! ```rust,ignore
//! use imgpipe_core::{Config, PipelineRunner, Recipe, RunControl, SourceCandidate};
//!
//! #[tokio::main]
//! async fn main() -> imgpipe_core::Result<()> {
//!     let config = Config::load()?;
//!     let mut recipe = Recipe::default();
//!     recipe.extend_from_args(&["resize:percent=50", "convert:format=jpeg"])?;
//!
//!     let runner = PipelineRunner::new(&config);
//!     let candidate = SourceCandidate::from_path("./photo.png".as_ref())?;
//!     let result = runner
//!         .run(vec![candidate], &recipe.steps, None, &RunControl::new())
//!         .await;
//!     println!("{} done, {} failed", result.succeeded(), result.failed());
//!     Ok(())
//! }
//! ```

// Module declarations
pub mod config;
pub mod error;
pub mod pipeline;
pub mod remote;
pub mod report;

// Re-exports for convenient access
pub use config::Config;
pub use error::{ConfigError, ImgpipeError, PipelineError, PipelineResult, Result};
pub use pipeline::{
    ExportBlob, ExportSink, InputDiscovery, ItemStatus, OutputFormat, PipelineItem,
    PipelineRunner, ProgressEvent, RasterBuffer, Recipe, RunControl, RunResult, SourceCandidate,
    TransformSpec,
};
pub use remote::{RemoteResponse, RemoteTransform, RemoteTransformer};
pub use report::{ReportFormat, ReportWriter, RunSummary};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
