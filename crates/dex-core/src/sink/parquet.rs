//! Parquet sink
//!
//! Records are buffered into Arrow builders and flushed as row groups of
//! `BATCH_ROWS`, so memory stays flat however long the stream runs. Every
//! column is nullable; cells that cannot be coerced to the declared type are
//! written as null rather than failing the row.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arrow::array::{ArrayRef, BooleanBuilder, Float32Builder, Int64Builder, StringBuilder};
use arrow::datatypes::{DataType, Field as ArrowField, Schema};
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;
use serde_json::Value;

use crate::config::OutputFormat;
use crate::error::{ExportError, Result};
use crate::model::{Field, FieldType, Record};
use crate::sink::{scalar_to_string, RecordSink, SinkReport};

/// Rows buffered per flushed row group
const BATCH_ROWS: usize = 8192;

enum ColumnBuilder {
    Int64(Int64Builder),
    Float32(Float32Builder),
    Utf8(StringBuilder),
    Boolean(BooleanBuilder),
}

impl ColumnBuilder {
    fn for_type(field_type: FieldType) -> Self {
        match field_type {
            FieldType::Integer => ColumnBuilder::Int64(Int64Builder::new()),
            FieldType::Number => ColumnBuilder::Float32(Float32Builder::new()),
            FieldType::String => ColumnBuilder::Utf8(StringBuilder::new()),
            FieldType::Boolean => ColumnBuilder::Boolean(BooleanBuilder::new()),
        }
    }

    fn append(&mut self, value: &Value) {
        match self {
            ColumnBuilder::Int64(b) => b.append_option(value_as_i64(value)),
            ColumnBuilder::Float32(b) => b.append_option(value_as_f32(value)),
            ColumnBuilder::Utf8(b) => b.append_option(scalar_to_string(value)),
            ColumnBuilder::Boolean(b) => b.append_option(value.as_bool()),
        }
    }

    // arrow builders reset themselves on finish
    fn finish(&mut self) -> ArrayRef {
        match self {
            ColumnBuilder::Int64(b) => Arc::new(b.finish()),
            ColumnBuilder::Float32(b) => Arc::new(b.finish()),
            ColumnBuilder::Utf8(b) => Arc::new(b.finish()),
            ColumnBuilder::Boolean(b) => Arc::new(b.finish()),
        }
    }
}

fn arrow_type(field_type: FieldType) -> DataType {
    match field_type {
        FieldType::Integer => DataType::Int64,
        FieldType::Number => DataType::Float32,
        FieldType::String => DataType::Utf8,
        FieldType::Boolean => DataType::Boolean,
    }
}

fn value_as_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn value_as_f32(value: &Value) -> Option<f32> {
    match value {
        Value::Number(n) => n.as_f64().map(|f| f as f32),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

pub struct ParquetSink {
    // Option because close() consumes the writer in finish
    writer: Option<ArrowWriter<fs::File>>,
    schema: Arc<Schema>,
    builders: Vec<ColumnBuilder>,
    columns: Vec<Field>,
    path: PathBuf,
    rows: u64,
    buffered: usize,
}

impl ParquetSink {
    pub fn create(dir: &Path, stem: &str, columns: &[Field]) -> Result<Self> {
        let path = dir.join(format!("{stem}.parquet"));
        let fields: Vec<ArrowField> = columns
            .iter()
            .map(|c| ArrowField::new(&c.key, arrow_type(c.field_type), true))
            .collect();
        let schema = Arc::new(Schema::new(fields));

        let file = fs::File::create(&path)?;
        let props = WriterProperties::builder()
            .set_compression(Compression::SNAPPY)
            .build();
        let writer = ArrowWriter::try_new(file, schema.clone(), Some(props))?;

        let builders = columns
            .iter()
            .map(|c| ColumnBuilder::for_type(c.field_type))
            .collect();
        Ok(Self {
            writer: Some(writer),
            schema,
            builders,
            columns: columns.to_vec(),
            path,
            rows: 0,
            buffered: 0,
        })
    }

    fn flush_batch(&mut self) -> Result<()> {
        if self.buffered == 0 {
            return Ok(());
        }
        let arrays: Vec<ArrayRef> = self.builders.iter_mut().map(ColumnBuilder::finish).collect();
        let batch = RecordBatch::try_new(self.schema.clone(), arrays)?;
        match self.writer.as_mut() {
            Some(writer) => writer.write(&batch)?,
            None => {
                return Err(ExportError::sink(
                    OutputFormat::Parquet.to_string(),
                    "writer already closed",
                ))
            },
        }
        self.buffered = 0;
        Ok(())
    }
}

impl RecordSink for ParquetSink {
    fn format(&self) -> OutputFormat {
        OutputFormat::Parquet
    }

    fn write(&mut self, record: &Record) -> Result<()> {
        for (column, builder) in self.columns.iter().zip(self.builders.iter_mut()) {
            builder.append(record.get(&column.key).unwrap_or(&Value::Null));
        }
        self.rows += 1;
        self.buffered += 1;
        if self.buffered >= BATCH_ROWS {
            self.flush_batch()?;
        }
        Ok(())
    }

    fn finish(self: Box<Self>) -> Result<SinkReport> {
        let mut this = *self;
        this.flush_batch()?;
        match this.writer.take() {
            Some(writer) => {
                writer.close()?;
            },
            None => {
                return Err(ExportError::sink(
                    OutputFormat::Parquet.to_string(),
                    "writer already closed",
                ))
            },
        }
        let bytes = fs::metadata(&this.path)?.len();
        Ok(SinkReport {
            format: OutputFormat::Parquet,
            path: this.path,
            rows: this.rows,
            bytes,
        })
    }
}
