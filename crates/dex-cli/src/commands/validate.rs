//! `dex validate` command implementation
//!
//! Checks a processing configuration without contacting the data service.

use std::path::Path;

use colored::Colorize;

use crate::error::{CliError, Result};
use dex_core::ProcessingConfig;

/// Validate a processing configuration file
pub async fn run(config_path: String) -> Result<()> {
    let path = Path::new(&config_path);
    if !path.exists() {
        return Err(CliError::FileNotFound(config_path));
    }

    let config = ProcessingConfig::load(path)?;
    config.validate()?;

    println!("{} '{}' is valid", "✓".green(), config_path);
    println!("  dataset: {}", config.dataset.href);
    println!(
        "  formats: {}",
        config
            .format
            .iter()
            .map(|f| f.to_string())
            .collect::<Vec<_>>()
            .join(", ")
    );
    if config.fields.is_empty() {
        println!("  columns: full dataset schema");
    } else {
        println!(
            "  columns: {}",
            config
                .fields
                .iter()
                .map(|f| f.key.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        );
    }
    if let Some(expr) = config.filter_expression() {
        println!("  filter:  {}", expr);
    }

    Ok(())
}
