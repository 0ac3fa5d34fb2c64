//! DEX Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared utilities for the DEX workspace members.
//!
//! # Overview
//!
//! This crate provides the pieces every DEX component needs regardless of
//! which side of the pipeline it sits on:
//!
//! - **Logging**: Centralized tracing configuration (console/file, text/JSON)
//! - **Bytes**: Human-readable size formatting for transfer reporting
//!
//! # Example
//!
//! ```no_run
//! use dex_common::logging::{LogConfig, init_logging};
//! use tracing::info;
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = LogConfig::from_env()?;
//!     init_logging(&config)?;
//!
//!     info!("Export tool started");
//!     Ok(())
//! }
//! ```

pub mod bytes;
pub mod logging;

// Re-export commonly used items
pub use bytes::format_bytes;
pub use logging::{init_logging, LogConfig};
