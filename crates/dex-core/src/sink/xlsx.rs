//! XLSX sink
//!
//! Rows are written cell by cell with the value's native Excel type, so
//! numbers stay numbers in the spreadsheet. The workbook is held in memory
//! and serialized once in `finish`, which is how the writer library works;
//! XLSX is the one format whose memory use grows with the dataset.

use std::fs;
use std::path::{Path, PathBuf};

use rust_xlsxwriter::Workbook;
use serde_json::Value;

use crate::config::OutputFormat;
use crate::error::Result;
use crate::model::{Field, Record};
use crate::sink::{RecordSink, SinkReport};

pub struct XlsxSink {
    workbook: Workbook,
    columns: Vec<Field>,
    path: PathBuf,
    rows: u64,
}

impl XlsxSink {
    pub fn create(dir: &Path, stem: &str, columns: &[Field]) -> Result<Self> {
        let path = dir.join(format!("{stem}.xlsx"));
        let mut workbook = Workbook::new();
        let worksheet = workbook.add_worksheet();
        for (idx, column) in columns.iter().enumerate() {
            worksheet.write_string(0, idx as u16, column.key.as_str())?;
        }
        Ok(Self {
            workbook,
            columns: columns.to_vec(),
            path,
            rows: 0,
        })
    }
}

impl RecordSink for XlsxSink {
    fn format(&self) -> OutputFormat {
        OutputFormat::Xlsx
    }

    fn write(&mut self, record: &Record) -> Result<()> {
        // header occupies row 0
        let row = (self.rows + 1) as u32;
        let worksheet = self.workbook.worksheet_from_index(0)?;
        for (idx, column) in self.columns.iter().enumerate() {
            let col = idx as u16;
            match record.get(&column.key).unwrap_or(&Value::Null) {
                Value::Null => {},
                Value::String(s) => {
                    worksheet.write_string(row, col, s.as_str())?;
                },
                Value::Number(n) => {
                    if let Some(f) = n.as_f64() {
                        worksheet.write_number(row, col, f)?;
                    }
                },
                Value::Bool(b) => {
                    worksheet.write_boolean(row, col, *b)?;
                },
                other @ (Value::Object(_) | Value::Array(_)) => {
                    worksheet.write_string(row, col, other.to_string())?;
                },
            }
        }
        self.rows += 1;
        Ok(())
    }

    fn finish(self: Box<Self>) -> Result<SinkReport> {
        let mut this = *self;
        this.workbook.save(&this.path)?;
        let bytes = fs::metadata(&this.path)?.len();
        Ok(SinkReport {
            format: OutputFormat::Xlsx,
            path: this.path,
            rows: this.rows,
            bytes,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::model::FieldType;
    use serde_json::{json, Map};

    fn record(value: Value) -> Record {
        let map: Map<String, Value> = value.as_object().unwrap().clone();
        Record::from(map)
    }

    #[test]
    fn test_writes_a_zip_container() {
        let dir = tempfile::tempdir().unwrap();
        let columns = vec![
            Field::new("name", FieldType::String),
            Field::new("count", FieldType::Integer),
            Field::new("active", FieldType::Boolean),
        ];
        let mut sink = Box::new(XlsxSink::create(dir.path(), "out", &columns).unwrap());
        sink.write(&record(json!({"name": "a", "count": 3, "active": true})))
            .unwrap();
        sink.write(&record(json!({"name": "b"}))).unwrap();
        let report = sink.finish().unwrap();

        assert_eq!(report.rows, 2);
        assert_eq!(report.path, dir.path().join("out.xlsx"));
        let bytes = fs::read(&report.path).unwrap();
        assert_eq!(&bytes[..2], b"PK");
        assert_eq!(report.bytes, bytes.len() as u64);
    }

    #[test]
    fn test_empty_stream_saves_header_only_workbook() {
        let dir = tempfile::tempdir().unwrap();
        let columns = vec![Field::new("k", FieldType::String)];
        let sink = Box::new(XlsxSink::create(dir.path(), "out", &columns).unwrap());
        let report = sink.finish().unwrap();

        assert_eq!(report.rows, 0);
        assert!(report.bytes > 0);
    }
}
