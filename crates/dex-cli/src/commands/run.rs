//! `dex run` command implementation
//!
//! Executes a full export: fetch the dataset lines, write every requested
//! file and publish them as attachments.

use std::path::Path;
use std::sync::Arc;

use colored::Colorize;
use tokio_util::sync::CancellationToken;

use crate::error::{CliError, Result};
use crate::progress::BarReporter;
use dex_common::format_bytes;
use dex_core::api::DatasetClient;
use dex_core::{ExportPipeline, OutputFormat, ProcessingConfig};

/// Run one export from a processing configuration
pub async fn run(
    config_path: String,
    tmp_dir: String,
    api_key: Option<String>,
    verbose: bool,
    cancel: CancellationToken,
) -> Result<()> {
    let path = Path::new(&config_path);
    if !path.exists() {
        return Err(CliError::FileNotFound(config_path));
    }

    let config = ProcessingConfig::load(path)?;
    config.validate()?;

    println!(
        "{} Exporting '{}' as {}",
        "→".cyan(),
        config.dataset.href,
        format_list(&config.format)
    );

    let client = DatasetClient::new(api_key)?;
    let mut pipeline = ExportPipeline::new(config, client, tmp_dir, cancel);
    if !verbose {
        // In verbose mode the default reporter logs to the console instead,
        // where bars would fight with the log lines.
        pipeline = pipeline.with_reporter(Arc::new(BarReporter::new()));
    }

    let report = pipeline.run().await?;

    for failure in &report.geo_failures {
        println!(
            "{} Skipped {}: {}",
            "!".yellow(),
            format_list(&failure.formats),
            failure.message
        );
    }

    if report.cancelled {
        println!(
            "{} Export interrupted: {} of {} file(s) published",
            "!".yellow().bold(),
            report.published,
            report.files.len()
        );
    } else {
        let total_bytes: u64 = report.files.iter().map(|f| f.bytes).sum();
        println!(
            "{} Exported {} line(s) into {} file(s) ({}) in {:.1?}",
            "✓".green().bold(),
            report.lines,
            report.files.len(),
            format_bytes(total_bytes),
            report.duration
        );
    }

    Ok(())
}

fn format_list(formats: &[OutputFormat]) -> String {
    formats
        .iter()
        .map(|f| f.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
