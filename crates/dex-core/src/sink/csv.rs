//! CSV sink
//!
//! The CSV file doubles as the staging input of the geographic derivation
//! chain, so it always follows the column plan exactly: header first, one
//! row per record, cells quoted only when the content requires it.

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::config::OutputFormat;
use crate::error::Result;
use crate::model::{Field, Record};
use crate::sink::{scalar_to_string, RecordSink, SinkReport};

pub struct CsvSink {
    writer: csv::Writer<fs::File>,
    columns: Vec<Field>,
    path: PathBuf,
    rows: u64,
}

impl CsvSink {
    /// Create the file and write its header row
    pub fn create(dir: &Path, stem: &str, columns: &[Field]) -> Result<Self> {
        let path = dir.join(format!("{stem}.csv"));
        let mut writer = csv::Writer::from_path(&path)?;
        writer.write_record(columns.iter().map(|c| c.key.as_str()))?;
        Ok(Self {
            writer,
            columns: columns.to_vec(),
            path,
            rows: 0,
        })
    }
}

impl RecordSink for CsvSink {
    fn format(&self) -> OutputFormat {
        OutputFormat::Csv
    }

    fn write(&mut self, record: &Record) -> Result<()> {
        let row = self.columns.iter().map(|column| {
            scalar_to_string(record.get(&column.key).unwrap_or(&Value::Null)).unwrap_or_default()
        });
        self.writer.write_record(row)?;
        self.rows += 1;
        Ok(())
    }

    fn finish(self: Box<Self>) -> Result<SinkReport> {
        let mut this = *self;
        this.writer.flush()?;
        drop(this.writer);
        let bytes = fs::metadata(&this.path)?.len();
        Ok(SinkReport {
            format: OutputFormat::Csv,
            path: this.path,
            rows: this.rows,
            bytes,
        })
    }
}
