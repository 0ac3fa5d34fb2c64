//! DEX CLI Library
//!
//! Command-line interface for exporting datasets as downloadable files.
//!
//! # Overview
//!
//! The DEX CLI drives the export engine from a processing configuration file:
//!
//! - **Export Runs**: Fetch, convert and publish a dataset (`dex run`)
//! - **Configuration Checks**: Validate a configuration offline (`dex validate`)

pub mod commands;
pub mod error;
pub mod progress;

// Re-export commonly used types
pub use error::{CliError, Result};

use clap::{Parser, Subcommand};

/// DEX - Dataset Export Pipeline
#[derive(Parser, Debug)]
#[command(name = "dex")]
#[command(author, version, about, long_about = None)]
#[command(arg_required_else_help = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run an export: fetch the dataset, write files and publish them
    Run {
        /// Path to the processing configuration file
        #[arg(short, long, default_value = "processing.json")]
        config: String,

        /// Working directory for staged export files
        #[arg(short, long, default_value = "data")]
        tmp_dir: String,

        /// API key for the data service (anonymous requests when omitted)
        #[arg(long, env = "DEX_API_KEY")]
        api_key: Option<String>,
    },

    /// Validate a processing configuration without running the export
    Validate {
        /// Path to the processing configuration file
        #[arg(short, long, default_value = "processing.json")]
        config: String,
    },
}
