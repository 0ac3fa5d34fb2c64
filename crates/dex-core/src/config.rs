//! Processing configuration
//!
//! The processing config is the read-only input of a run: which dataset to
//! export, which columns, which output formats, and which row filters. It is
//! the same JSON document the processing platform hands to the plugin.

use crate::api::types::SchemaField;
use crate::error::{ExportError, Result};
use crate::model::Field;
use serde::Deserialize;
use serde_json::Value;
use std::path::Path;

/// Output formats the pipeline can produce
///
/// The geographic subset (geojson, pmtiles, shz, gpkg) forms a derived group:
/// all of them come from one staging CSV + GeoJSON pair produced after the
/// tabular stage, the record stream is never fetched twice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Csv,
    Parquet,
    Xlsx,
    Geojson,
    Pmtiles,
    Shz,
    Gpkg,
}

impl OutputFormat {
    /// File extension, which doubles as the wire name of the format
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Csv => "csv",
            OutputFormat::Parquet => "parquet",
            OutputFormat::Xlsx => "xlsx",
            OutputFormat::Geojson => "geojson",
            OutputFormat::Pmtiles => "pmtiles",
            OutputFormat::Shz => "shz",
            OutputFormat::Gpkg => "gpkg",
        }
    }

    /// Whether this format is derived from the geographic staging chain
    pub fn is_geo(&self) -> bool {
        matches!(
            self,
            OutputFormat::Geojson | OutputFormat::Pmtiles | OutputFormat::Shz | OutputFormat::Gpkg
        )
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.extension())
    }
}

/// Reference to the remote dataset being exported
#[derive(Debug, Clone, Deserialize)]
pub struct DatasetRef {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    /// Dataset API base URL; `/lines` and `/metadata-attachments` hang off it
    pub href: String,
}

/// Row filter applied server-side through the lines API `qs` parameter
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Filter {
    /// Keep rows whose field value is one of the listed values
    In {
        field: SchemaField,
        values: Vec<Value>,
    },
}

impl Filter {
    /// Compile this filter to a query-string expression, `key:("a" OR "b")`
    ///
    /// Filters with no values select nothing and are skipped.
    pub fn to_expression(&self) -> Option<String> {
        match self {
            Filter::In { field, values } => {
                if values.is_empty() {
                    return None;
                }
                let rendered: Vec<String> = values
                    .iter()
                    .map(|v| format!("\"{}\"", render_value(v).replace('"', "\\\"")))
                    .collect();
                Some(format!("{}:({})", field.key, rendered.join(" OR ")))
            },
        }
    }
}

fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Full processing configuration for one export run
#[derive(Debug, Clone, Deserialize)]
pub struct ProcessingConfig {
    pub dataset: DatasetRef,
    /// Columns to export; empty means "full dataset schema minus calculated"
    #[serde(default)]
    pub fields: Vec<Field>,
    /// Requested output formats, in publication order
    pub format: Vec<OutputFormat>,
    #[serde(default)]
    pub filters: Vec<Filter>,
    /// Attachment title shown on the dataset page
    pub label: String,
    /// Base name of every produced file (extension is appended per format)
    pub filename: String,
}

impl ProcessingConfig {
    /// Load a processing config from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            ExportError::config(format!("cannot read '{}': {}", path.display(), e))
        })?;
        serde_json::from_str(&raw).map_err(|e| {
            ExportError::config(format!("cannot parse '{}': {}", path.display(), e))
        })
    }

    /// Check the config for problems that would waste a run
    pub fn validate(&self) -> Result<()> {
        if !self.dataset.href.starts_with("http://") && !self.dataset.href.starts_with("https://") {
            return Err(ExportError::config(format!(
                "dataset href '{}' is not an http(s) URL",
                self.dataset.href
            )));
        }
        if self.format.is_empty() {
            return Err(ExportError::config(
                "at least one output format must be requested",
            ));
        }
        if self.filename.is_empty() {
            return Err(ExportError::config("filename must not be empty"));
        }
        if self.filename.contains('/') || self.filename.contains('\\') {
            return Err(ExportError::config(format!(
                "filename '{}' must not contain path separators",
                self.filename
            )));
        }
        if self.label.is_empty() {
            return Err(ExportError::config("label must not be empty"));
        }
        for (i, field) in self.fields.iter().enumerate() {
            if field.key.is_empty() {
                return Err(ExportError::config(format!("field #{} has an empty key", i)));
            }
            if self.fields[..i].iter().any(|f| f.key == field.key) {
                return Err(ExportError::config(format!(
                    "field '{}' is listed more than once",
                    field.key
                )));
            }
        }
        Ok(())
    }

    /// Combined filter expression for the lines API, or None when unfiltered
    pub fn filter_expression(&self) -> Option<String> {
        let parts: Vec<String> = self
            .filters
            .iter()
            .filter_map(Filter::to_expression)
            .collect();
        if parts.is_empty() {
            None
        } else {
            Some(parts.join(" AND "))
        }
    }

    /// Requested formats from the geographic derived group, in request order
    pub fn geo_formats(&self) -> Vec<OutputFormat> {
        self.format.iter().copied().filter(OutputFormat::is_geo).collect()
    }

    pub fn wants(&self, format: OutputFormat) -> bool {
        self.format.contains(&format)
    }

    pub fn wants_geo(&self) -> bool {
        self.format.iter().any(OutputFormat::is_geo)
    }

    /// Whether geometry must be rendered as WKT instead of GeoJSON
    ///
    /// The shapefile and geopackage conversions read geometry from a WKT
    /// column, the other geographic outputs keep GeoJSON.
    pub fn wants_wkt(&self) -> bool {
        self.wants(OutputFormat::Shz) || self.wants(OutputFormat::Gpkg)
    }
}
