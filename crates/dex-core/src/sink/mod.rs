//! Tabular record sinks
//!
//! Every sink receives the same normalized record stream and writes one
//! output file against the frozen column plan. Sinks are driven by the
//! pipeline's broadcast workers, one task per sink, so a slow encoder only
//! ever holds the fetch loop back by its channel capacity.

mod csv;
mod parquet;
mod xlsx;

use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::config::{OutputFormat, ProcessingConfig};
use crate::error::Result;
use crate::model::Record;
use crate::schema::ColumnPlan;

pub use self::csv::CsvSink;
pub use self::parquet::ParquetSink;
pub use self::xlsx::XlsxSink;

/// Outcome of one completed sink
#[derive(Debug, Clone)]
pub struct SinkReport {
    pub format: OutputFormat,
    pub path: PathBuf,
    pub rows: u64,
    pub bytes: u64,
}

/// One tabular output writer
///
/// `write` is called once per record in stream order; `finish` flushes and
/// closes the file, and must be called even for an empty stream so every
/// output at least carries its header.
pub trait RecordSink: Send {
    fn format(&self) -> OutputFormat;

    fn write(&mut self, record: &Record) -> Result<()>;

    fn finish(self: Box<Self>) -> Result<SinkReport>;
}

/// Instantiate the sinks a run needs, headers already written
///
/// The CSV sink is also created when only geographic formats were asked
/// for, because the derivation chain starts from the staged CSV. Whether
/// that file gets published is decided later from the requested formats.
pub fn build_sinks(
    config: &ProcessingConfig,
    plan: &ColumnPlan,
    dir: &Path,
) -> Result<Vec<Box<dyn RecordSink>>> {
    let mut sinks: Vec<Box<dyn RecordSink>> = Vec::new();
    if config.wants(OutputFormat::Csv) || config.wants_geo() {
        sinks.push(Box::new(CsvSink::create(dir, &config.filename, &plan.columns)?));
    }
    if config.wants(OutputFormat::Parquet) {
        sinks.push(Box::new(ParquetSink::create(
            dir,
            &config.filename,
            &plan.columns,
        )?));
    }
    if config.wants(OutputFormat::Xlsx) {
        sinks.push(Box::new(XlsxSink::create(dir, &config.filename, &plan.columns)?));
    }
    Ok(sinks)
}

/// Render a scalar cell as text, `None` for null/absent
///
/// Booleans become "1"/"0" and nested structures fall back to their JSON
/// text, so the textual formats agree on how non-scalar cells look.
pub(crate) fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(true) => Some("1".to_string()),
        Value::Bool(false) => Some("0".to_string()),
        Value::Object(_) | Value::Array(_) => Some(value.to_string()),
    }
}
