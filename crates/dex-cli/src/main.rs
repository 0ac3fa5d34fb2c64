//! DEX CLI - Main entry point

use clap::Parser;
use dex_cli::{Cli, Commands};
use dex_common::logging::{init_logging, LogConfig, LogLevel, LogOutput};
use std::process;
use tokio_util::sync::CancellationToken;
use tracing::error;

#[tokio::main]
async fn main() {
    // Load .env if present (API key, log settings)
    dotenvy::dotenv().ok();

    // Parse command-line arguments
    let cli = Cli::parse();

    // Initialize logging based on verbose flag and environment
    let log_config = if cli.verbose {
        // Verbose mode: log to console with debug level
        LogConfig::builder()
            .level(LogLevel::Debug)
            .output(LogOutput::Console)
            .log_file_prefix("dex".to_string())
            .build()
    } else {
        // Normal mode: only warnings and errors on the console
        LogConfig::builder()
            .level(LogLevel::Warn)
            .output(LogOutput::Console)
            .log_file_prefix("dex".to_string())
            .build()
    };

    // Merge with environment variables (they take precedence)
    let log_config = LogConfig::from_env().unwrap_or(log_config);

    // Initialize logging (ignore errors as CLI should work without logging)
    let _ = init_logging(&log_config);

    // Ctrl-C requests a graceful stop: started files are finalized, nothing
    // gets uploaded. A second Ctrl-C exits on the spot.
    let cancel = CancellationToken::new();
    let ctrl_c_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("Interrupted, finishing started files... (Ctrl-C again to exit now)");
            ctrl_c_cancel.cancel();
        }
        if tokio::signal::ctrl_c().await.is_ok() {
            process::exit(130);
        }
    });

    // Execute command
    let result = execute_command(cli, cancel.clone()).await;

    // Handle result
    match result {
        Ok(()) if cancel.is_cancelled() => process::exit(130),
        Ok(()) => {}
        Err(e) => {
            error!(error = %e, "Command failed");
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    }
}

/// Execute the CLI command
async fn execute_command(cli: Cli, cancel: CancellationToken) -> dex_cli::Result<()> {
    match cli.command {
        Commands::Run {
            config,
            tmp_dir,
            api_key,
        } => dex_cli::commands::run::run(config, tmp_dir, api_key, cli.verbose, cancel).await,

        Commands::Validate { config } => dex_cli::commands::validate::run(config).await,
    }
}
