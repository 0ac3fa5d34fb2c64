//! Progress rendering for CLI export runs
//!
//! Provides progress indicators for line fetching and long-running
//! conversions, plus the [`BarReporter`] bridge that feeds them from
//! pipeline events.

use std::path::Path;
use std::sync::Mutex;

use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};

use dex_common::format_bytes;
use dex_core::progress::ProgressReporter;
use dex_core::OutputFormat;

/// Create a progress bar for line fetching
pub fn create_line_progress(total: u64, message: &str) -> ProgressBar {
    let pb = ProgressBar::new(total);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{msg}\n{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} lines ({eta})")
            .expect("Invalid progress bar template")
            .progress_chars("#>-"),
    );
    pb.set_message(message.to_string());
    pb
}

/// Create a spinner for indeterminate operations
pub fn create_spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .expect("Invalid spinner template"),
    );
    pb.set_message(message.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}

/// Terminal progress reporter driven by pipeline events
///
/// One bar is live at a time: the fetch bar (or a spinner when the line
/// total is unknown) runs while pages stream in, and is cleared whenever
/// the pipeline moves to the next stage.
pub struct BarReporter {
    bar: Mutex<Option<ProgressBar>>,
}

impl BarReporter {
    pub fn new() -> Self {
        Self {
            bar: Mutex::new(None),
        }
    }

    fn clear_bar(&self) {
        if let Some(bar) = self.bar.lock().expect("progress state poisoned").take() {
            bar.finish_and_clear();
        }
    }
}

impl Default for BarReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressReporter for BarReporter {
    fn stage(&self, name: &str) {
        self.clear_bar();
        println!("{} {}", "→".cyan(), name);
    }

    fn lines_fetched(&self, fetched: u64, total: Option<u64>) {
        let mut slot = self.bar.lock().expect("progress state poisoned");
        let bar = slot.get_or_insert_with(|| match total {
            Some(total) => create_line_progress(total, "Fetching lines"),
            None => create_spinner("Fetching lines..."),
        });
        if let Some(total) = total {
            bar.set_length(total);
        }
        bar.set_position(fetched);
    }

    fn file_done(&self, format: OutputFormat, path: &Path, bytes: u64) {
        self.clear_bar();
        println!(
            "  {} {} ({}, {})",
            "✓".green(),
            path.display(),
            format,
            format_bytes(bytes)
        );
    }
}
