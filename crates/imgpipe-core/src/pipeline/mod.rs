//! Image transform pipeline components.
//!
//! - **discovery**: Expand input paths into source candidates
//! - **ingest**: Type gate, size limits, and decode
//! - **preview**: Revocable preview handles
//! - **raster**: Owned RGBA buffer and encoding
//! - **stages**: The transform steps
//! - **recipe**: Step lists from TOML or the command line
//! - **runner**: Orchestrates a batch run
//! - **export**: Single files and zip archives

pub mod discovery;
pub mod export;
pub mod format;
pub mod ingest;
pub mod preview;
pub mod raster;
pub mod recipe;
pub mod runner;
pub mod stages;

// Re-exports for convenient access
pub use discovery::{DiscoveredFile, Gathered, InputDiscovery};
pub use export::{archive_name, prefixed_name, ExportBlob, ExportEntry, ExportSink};
pub use format::OutputFormat;
pub use ingest::{select, Ingested, Selection, SourceCandidate, SourceImage, SourceIngestor};
pub use preview::{PreviewHandle, PreviewRegistry};
pub use raster::RasterBuffer;
pub use recipe::{parse_step, Recipe};
pub use runner::{ItemStatus, PipelineItem, PipelineRunner, ProgressEvent, RunControl, RunResult};
pub use stages::{operation_label, StageContext, TransformSpec, TransformStage, WorkingImage};
