//! DEX Core Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Streaming dataset-export engine: fetches a remote dataset page by page
//! and materializes it into tabular and geographic files, then publishes
//! them back onto the dataset as metadata attachments.
//!
//! # Overview
//!
//! - **API**: HTTP client, endpoint builders and wire types for the
//!   dataset platform
//! - **Schema**: column planning and geometry concept detection
//! - **Fetch**: paginated line streaming with bounded retries
//! - **Sinks**: CSV, Parquet and XLSX encoders fed from one record stream
//! - **Geo**: GeoJSON/PMTiles/Shapefile/GeoPackage derivation via external
//!   conversion tools
//! - **Publish**: attachment upload and registration
//!
//! # Architecture
//!
//! A run is one pass of the pipeline:
//!
//! 1. Resolve the dataset snapshot and freeze the column plan
//! 2. Stream pages into every tabular sink concurrently, one worker per
//!    sink behind a bounded channel
//! 3. Wait for the tabular barrier, then derive the geographic formats
//!    from the staged CSV
//! 4. Publish each produced file, re-registering the attachment list after
//!    every upload
//!
//! Records are never accumulated: memory use is bounded by the channel
//! capacities and the per-sink encoder buffers, not by the dataset size.
//!
//! # Example
//!
//! ```no_run
//! use dex_core::api::DatasetClient;
//! use dex_core::{ExportPipeline, ProcessingConfig};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ProcessingConfig::load(std::path::Path::new("processing.json"))?;
//!     let client = DatasetClient::new(std::env::var("DEX_API_KEY").ok())?;
//!
//!     let pipeline = ExportPipeline::new(config, client, "data", CancellationToken::new());
//!     let report = pipeline.run().await?;
//!
//!     println!("{} lines into {} files", report.lines, report.files.len());
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod config;
pub mod error;
pub mod fetch;
pub mod geo;
pub mod model;
pub mod normalize;
pub mod pipeline;
pub mod progress;
pub mod publish;
pub mod schema;
pub mod sink;

// Re-export the main entry points
pub use config::{OutputFormat, ProcessingConfig};
pub use error::{ExportError, Result};
pub use pipeline::{ExportPipeline, ProducedFile, RunReport};
