//! Error types for the DEX CLI
//!
//! This module provides user-friendly error types with clear, actionable messages
//! that help users understand what went wrong and how to fix it.

use thiserror::Error;

/// Result type alias for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;

/// Error type for CLI operations
///
/// All errors are designed to be user-facing with clear messages and suggestions.
#[derive(Error, Debug)]
pub enum CliError {
    /// Export engine failure, already phrased for end users
    #[error(transparent)]
    Export(#[from] dex_core::ExportError),

    /// Required file is missing
    #[error("File not found: '{0}'. Verify the file path exists and you have read permissions.")]
    FileNotFound(String),

    /// File system operation failed
    #[error("File operation failed: {0}. Check file permissions and disk space.")]
    Io(#[from] std::io::Error),
}
