//! Column planning and geometry concept detection
//!
//! The column plan is resolved once from the processing config and the
//! dataset snapshot, then frozen for the whole run: it fixes which columns
//! are selected from the lines API, which columns every sink writes, and how
//! geometry is sourced for the geographic derivation chain.

use crate::api::types::{Dataset, SchemaField};
use crate::config::ProcessingConfig;
use crate::error::{ExportError, Result};
use crate::model::{Field, FieldType};

// ============================================================================
// Concept URIs tagged on dataset schema columns
// ============================================================================

pub const CONCEPT_LATITUDE: &str = "http://schema.org/latitude";
pub const CONCEPT_LONGITUDE: &str = "http://schema.org/longitude";
pub const CONCEPT_LAT_LON: &str = "http://www.w3.org/2003/01/geo/wgs84_pos#lat_long";
pub const CONCEPT_GEOMETRY: &str = "https://purl.org/geojson/vocab#geometry";

// ============================================================================
// Derived column keys added by the normalizer
// ============================================================================

/// Latitude column split out of a combined "lat,lon" point
pub const LATITUDE_KEY: &str = "latitude";
/// Longitude column split out of a combined "lat,lon" point
pub const LONGITUDE_KEY: &str = "longitude";
/// Column holding the normalized geometry (GeoJSON, or WKT when required)
pub const GEOSHAPE_KEY: &str = "_geoshape";

/// How the dataset schema encodes spatial location
///
/// Detection priority is fixed: explicit latitude + longitude columns win,
/// then a full geometry column, then a combined point column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GeometrySource {
    /// Paired numeric columns tagged with the latitude/longitude concepts
    LatLon { lat: String, lon: String },
    /// One column tagged with the geometry concept, holding GeoJSON
    Geometry { key: String },
    /// One column tagged with the combined concept, holding "lat,lon"
    Combined { key: String },
}

impl GeometrySource {
    /// Scan the dataset schema for a usable geometry concept
    pub fn detect(schema: &[SchemaField]) -> Option<Self> {
        let find = |uri: &str| schema.iter().find(|f| f.refers_to.as_deref() == Some(uri));

        if let (Some(lat), Some(lon)) = (find(CONCEPT_LATITUDE), find(CONCEPT_LONGITUDE)) {
            return Some(GeometrySource::LatLon {
                lat: lat.key.clone(),
                lon: lon.key.clone(),
            });
        }
        if let Some(geometry) = find(CONCEPT_GEOMETRY) {
            return Some(GeometrySource::Geometry {
                key: geometry.key.clone(),
            });
        }
        if let Some(combined) = find(CONCEPT_LAT_LON) {
            return Some(GeometrySource::Combined {
                key: combined.key.clone(),
            });
        }
        None
    }

    /// Dataset columns this source reads, which must be part of the selection
    pub fn source_keys(&self) -> Vec<&str> {
        match self {
            GeometrySource::LatLon { lat, lon } => vec![lat, lon],
            GeometrySource::Geometry { key } => vec![key],
            GeometrySource::Combined { key } => vec![key],
        }
    }
}

/// Frozen column plan for one export run
#[derive(Debug, Clone)]
pub struct ColumnPlan {
    /// Output columns in sink order: configured fields, then derived geometry
    pub columns: Vec<Field>,
    /// Geometry source, resolved only when a geographic format was requested
    pub geometry: Option<GeometrySource>,
    select: Vec<String>,
}

impl ColumnPlan {
    /// Resolve the plan from the config and the dataset snapshot
    ///
    /// An empty `fields` list falls back to the dataset's full schema minus
    /// calculated columns. A missing geometry concept is not an error here:
    /// the geographic stage reports it for the derived group only, the
    /// tabular outputs still proceed.
    pub fn resolve(config: &ProcessingConfig, dataset: &Dataset) -> Result<Self> {
        let fields = if config.fields.is_empty() {
            default_fields(&dataset.schema)
        } else {
            config.fields.clone()
        };
        if fields.is_empty() {
            return Err(ExportError::config(
                "the dataset schema has no exportable columns; list fields explicitly",
            ));
        }

        let geometry = if config.wants_geo() {
            GeometrySource::detect(&dataset.schema)
        } else {
            None
        };

        let mut select: Vec<String> = fields.iter().map(|f| f.key.clone()).collect();
        let mut columns = fields;

        if let Some(ref geometry) = geometry {
            for key in geometry.source_keys() {
                if !select.iter().any(|k| k == key) {
                    select.push(key.to_string());
                }
            }
            match geometry {
                GeometrySource::LatLon { lat, lon } => {
                    ensure_column(&mut columns, lat, FieldType::Number);
                    ensure_column(&mut columns, lon, FieldType::Number);
                },
                GeometrySource::Combined { .. } => {
                    ensure_column(&mut columns, LATITUDE_KEY, FieldType::Number);
                    ensure_column(&mut columns, LONGITUDE_KEY, FieldType::Number);
                },
                GeometrySource::Geometry { .. } => {
                    ensure_column(&mut columns, GEOSHAPE_KEY, FieldType::String);
                },
            }
        }

        Ok(Self {
            columns,
            geometry,
            select,
        })
    }

    /// Comma-joined column list for the lines API `select` parameter
    pub fn select_param(&self) -> String {
        self.select.join(",")
    }

    /// Output column keys, in sink order
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.key.as_str())
    }
}

fn default_fields(schema: &[SchemaField]) -> Vec<Field> {
    schema
        .iter()
        .filter(|f| !f.calculated)
        .map(|f| Field::new(&f.key, map_schema_type(f.field_type.as_deref())))
        .collect()
}

/// Map a JSON-schema type name onto a column type, defaulting to string
fn map_schema_type(field_type: Option<&str>) -> FieldType {
    match field_type {
        Some("integer") => FieldType::Integer,
        Some("number") => FieldType::Number,
        Some("boolean") => FieldType::Boolean,
        _ => FieldType::String,
    }
}

fn ensure_column(columns: &mut Vec<Field>, key: &str, field_type: FieldType) {
    if !columns.iter().any(|c| c.key == key) {
        columns.push(Field::new(key, field_type));
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::config::OutputFormat;
    use serde_json::json;

    fn config_with(fields: Vec<Field>, format: Vec<OutputFormat>) -> ProcessingConfig {
        let mut config: ProcessingConfig = serde_json::from_value(json!({
            "dataset": {"href": "https://example.com/api/v1/datasets/d"},
            "fields": [],
            "format": ["csv"],
            "label": "Export",
            "filename": "export"
        }))
        .unwrap();
        config.fields = fields;
        config.format = format;
        config
    }

    fn geo_dataset() -> Dataset {
        serde_json::from_value(json!({
            "title": "Contours",
            "schema": [
                {"key": "insee_dep", "type": "string"},
                {"key": "geometry", "type": "string", "x-refersTo": "https://purl.org/geojson/vocab#geometry"},
                {"key": "_geopoint", "type": "string", "x-calculated": true}
            ],
            "bbox": [-5.1, 41.3, 9.6, 51.1]
        }))
        .unwrap()
    }

    #[test]
    fn test_detect_priority_lat_lon_first() {
        let schema = vec![
            SchemaField::new("lat").with_concept(CONCEPT_LATITUDE),
            SchemaField::new("lng").with_concept(CONCEPT_LONGITUDE),
            SchemaField::new("geom").with_concept(CONCEPT_GEOMETRY),
            SchemaField::new("point").with_concept(CONCEPT_LAT_LON),
        ];
        assert_eq!(
            GeometrySource::detect(&schema),
            Some(GeometrySource::LatLon {
                lat: "lat".to_string(),
                lon: "lng".to_string()
            })
        );
    }

    #[test]
    fn test_detect_geometry_beats_combined() {
        let schema = vec![
            SchemaField::new("point").with_concept(CONCEPT_LAT_LON),
            SchemaField::new("geom").with_concept(CONCEPT_GEOMETRY),
        ];
        assert_eq!(
            GeometrySource::detect(&schema),
            Some(GeometrySource::Geometry {
                key: "geom".to_string()
            })
        );
    }

    #[test]
    fn test_detect_lat_alone_is_not_enough() {
        let schema = vec![SchemaField::new("lat").with_concept(CONCEPT_LATITUDE)];
        assert_eq!(GeometrySource::detect(&schema), None);
    }

    #[test]
    fn test_default_fields_skip_calculated_columns() {
        let config = config_with(vec![], vec![OutputFormat::Csv]);
        let plan = ColumnPlan::resolve(&config, &geo_dataset()).unwrap();
        let keys: Vec<&str> = plan.keys().collect();
        assert_eq!(keys, ["insee_dep", "geometry"]);
    }

    #[test]
    fn test_geometry_source_joins_selection_and_columns() {
        // Geometry column not listed in fields: still selected, and the
        // derived geometry column is appended to the output set.
        let config = config_with(
            vec![Field::new("insee_dep", FieldType::String)],
            vec![OutputFormat::Pmtiles],
        );
        let plan = ColumnPlan::resolve(&config, &geo_dataset()).unwrap();

        assert_eq!(plan.select_param(), "insee_dep,geometry");
        let keys: Vec<&str> = plan.keys().collect();
        assert_eq!(keys, ["insee_dep", GEOSHAPE_KEY]);
        assert_eq!(
            plan.geometry,
            Some(GeometrySource::Geometry {
                key: "geometry".to_string()
            })
        );
    }

    #[test]
    fn test_combined_source_adds_derived_point_columns() {
        let dataset: Dataset = serde_json::from_value(json!({
            "schema": [
                {"key": "capitale", "type": "string"},
                {"key": "coords", "type": "string", "x-refersTo": CONCEPT_LAT_LON}
            ],
            "bbox": [-180.0, -90.0, 180.0, 90.0]
        }))
        .unwrap();
        let config = config_with(
            vec![Field::new("capitale", FieldType::String)],
            vec![OutputFormat::Geojson],
        );
        let plan = ColumnPlan::resolve(&config, &dataset).unwrap();

        assert_eq!(plan.select_param(), "capitale,coords");
        let keys: Vec<&str> = plan.keys().collect();
        assert_eq!(keys, ["capitale", LATITUDE_KEY, LONGITUDE_KEY]);
    }

    #[test]
    fn test_no_geo_format_skips_detection() {
        let config = config_with(
            vec![Field::new("insee_dep", FieldType::String)],
            vec![OutputFormat::Csv],
        );
        let plan = ColumnPlan::resolve(&config, &geo_dataset()).unwrap();
        assert!(plan.geometry.is_none());
        assert_eq!(plan.select_param(), "insee_dep");
    }

    #[test]
    fn test_empty_schema_and_fields_is_an_error() {
        let config = config_with(vec![], vec![OutputFormat::Csv]);
        let dataset: Dataset = serde_json::from_value(json!({"schema": []})).unwrap();
        assert!(ColumnPlan::resolve(&config, &dataset).is_err());
    }
}
