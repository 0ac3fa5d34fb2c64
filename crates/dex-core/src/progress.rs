//! Progress reporting seam between the pipeline and its frontends
//!
//! The pipeline reports through a trait so the CLI can render live bars
//! while headless runs fall back to structured log lines.

use std::path::Path;

use tracing::info;

use crate::config::OutputFormat;
use dex_common::format_bytes;

/// Receiver for pipeline progress events
pub trait ProgressReporter: Send + Sync {
    /// A pipeline stage started
    fn stage(&self, name: &str);

    /// Cumulative line count after a fetched page
    fn lines_fetched(&self, fetched: u64, total: Option<u64>);

    /// An output file was finalized
    fn file_done(&self, format: OutputFormat, path: &Path, bytes: u64);
}

/// Default reporter that forwards everything to the log
#[derive(Debug, Default, Clone, Copy)]
pub struct LogReporter;

impl ProgressReporter for LogReporter {
    fn stage(&self, name: &str) {
        info!(stage = name, "starting stage");
    }

    fn lines_fetched(&self, fetched: u64, total: Option<u64>) {
        match total {
            Some(total) => info!(fetched, total, "fetched lines"),
            None => info!(fetched, "fetched lines"),
        }
    }

    fn file_done(&self, format: OutputFormat, path: &Path, bytes: u64) {
        info!(
            format = %format,
            path = %path.display(),
            size = %format_bytes(bytes),
            "output file ready"
        );
    }
}
