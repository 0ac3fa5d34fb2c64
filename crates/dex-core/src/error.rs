//! Error types for dataset export runs
//!
//! This module provides user-facing error types with clear, actionable messages
//! that tell the operator what went wrong and what to check next.

use thiserror::Error;

/// Result type alias for export operations
pub type Result<T> = std::result::Result<T, ExportError>;

/// Comprehensive error type for export operations
///
/// All errors are designed to be user-facing with clear messages and suggestions.
#[derive(Error, Debug)]
pub enum ExportError {
    /// Dataset API returned an unusable response
    #[error("Dataset API error: {0}. Check the dataset href and your API key permissions.")]
    Api(String),

    /// HTTP request failed
    #[error("Network request failed: {0}. Check your internet connection and the dataset URL.")]
    Http(#[from] reqwest::Error),

    /// A page fetch kept failing after the whole retry budget
    #[error("Fetching '{url}' failed after {attempts} attempts: {source}. The dataset API may be unavailable; run the export again later.")]
    RetriesExhausted {
        url: String,
        attempts: u32,
        #[source]
        source: Box<ExportError>,
    },

    /// Processing configuration is missing or invalid
    #[error("Invalid processing config: {0}. Fix the configuration file and run again.")]
    Config(String),

    /// JSON parsing failed
    #[error("Failed to parse JSON: {0}. The API response or config file may be malformed.")]
    Json(#[from] serde_json::Error),

    /// File system operation failed
    #[error("File operation failed: {0}. Check file permissions and disk space.")]
    Io(#[from] std::io::Error),

    /// CSV encoding failed
    #[error("CSV encoding failed: {0}")]
    Csv(#[from] csv::Error),

    /// Arrow conversion failed while batching records
    #[error("Arrow conversion failed: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    /// Parquet encoding failed
    #[error("Parquet encoding failed: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    /// Spreadsheet encoding failed
    #[error("XLSX encoding failed: {0}")]
    Xlsx(#[from] rust_xlsxwriter::XlsxError),

    /// A format sink failed mid-stream
    #[error("The '{format}' output failed: {message}")]
    Sink { format: String, message: String },

    /// Geographic formats requested on a dataset without spatial extent
    #[error("Dataset has no bounding box, so it holds no geographic data. Remove geographic formats from the config or add geo concepts to the dataset schema.")]
    NotGeographic,

    /// Geographic formats requested but no geometry concept tagged in the schema
    #[error("No geometry concept found in the dataset schema. Tag latitude/longitude or a geometry column with its concept to export geographic formats.")]
    NoGeometryConcept,

    /// External conversion tool exited with a failure status
    #[error("'{tool}' exited with {status}: {stderr}")]
    Tool {
        tool: String,
        status: String,
        stderr: String,
    },

    /// External conversion tool could not be started
    #[error("Failed to run '{tool}': {source}. Make sure the binary is installed and on PATH.")]
    ToolSpawn {
        tool: String,
        #[source]
        source: std::io::Error,
    },

    /// Generic anyhow error wrapper
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ExportError {
    /// Create an API error
    pub fn api(msg: impl Into<String>) -> Self {
        Self::Api(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a sink error
    pub fn sink(format: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Sink {
            format: format.into(),
            message: message.into(),
        }
    }

    /// Create a retries-exhausted error wrapping the last failure
    pub fn retries_exhausted(url: impl Into<String>, attempts: u32, source: ExportError) -> Self {
        Self::RetriesExhausted {
            url: url.into(),
            attempts,
            source: Box::new(source),
        }
    }
}
