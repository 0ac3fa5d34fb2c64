//! Record normalization between the lines API and the sinks
//!
//! Normalization is deliberately forgiving: a malformed geometry value is
//! logged and passed through (or left unset) rather than failing the run,
//! so one bad row never takes down a multi-million line export.

use geozero::geojson::GeoJson;
use geozero::ToWkt;
use serde_json::{Map, Number, Value};
use tracing::debug;

use crate::model::Record;
use crate::schema::{ColumnPlan, GeometrySource, GEOSHAPE_KEY, LATITUDE_KEY, LONGITUDE_KEY};

/// Search-score key injected by the lines API, never exported
const SCORE_KEY: &str = "_score";

/// Per-record transformer applied between fetch and broadcast
#[derive(Debug, Clone)]
pub struct Normalizer {
    geometry: Option<GeometrySource>,
    wkt: bool,
}

impl Normalizer {
    /// Build a normalizer for the resolved plan
    ///
    /// `wkt` switches the derived geometry column from GeoJSON text to WKT,
    /// which the OGR-based formats expect.
    pub fn new(plan: &ColumnPlan, wkt: bool) -> Self {
        Self {
            geometry: plan.geometry.clone(),
            wkt,
        }
    }

    /// Normalize one raw line into an exportable record
    pub fn normalize(&self, mut raw: Map<String, Value>) -> Record {
        raw.remove(SCORE_KEY);
        match self.geometry {
            Some(GeometrySource::Combined { ref key }) => split_combined_point(&mut raw, key),
            Some(GeometrySource::Geometry { ref key }) => {
                if let Some(geojson) = extract_geometry(&raw, key) {
                    let shape = if self.wkt {
                        to_wkt(&geojson)
                    } else {
                        geojson
                    };
                    raw.insert(GEOSHAPE_KEY.to_string(), Value::String(shape));
                }
            },
            // Latitude/longitude columns are exported as-is
            Some(GeometrySource::LatLon { .. }) | None => {},
        }
        Record::from(raw)
    }
}

/// Split a combined "lat,lon" value into numeric latitude/longitude columns
fn split_combined_point(raw: &mut Map<String, Value>, key: &str) {
    let Some(Value::String(point)) = raw.get(key) else {
        debug!(key, "combined point column missing or not a string, skipping");
        return;
    };
    let Some((lat, lon)) = parse_point(point) else {
        debug!(key, value = %point, "unparseable combined point, skipping");
        return;
    };
    raw.insert(LATITUDE_KEY.to_string(), Value::Number(lat));
    raw.insert(LONGITUDE_KEY.to_string(), Value::Number(lon));
}

fn parse_point(point: &str) -> Option<(Number, Number)> {
    let (lat, lon) = point.split_once(',')?;
    let lat: f64 = lat.trim().parse().ok()?;
    let lon: f64 = lon.trim().parse().ok()?;
    Some((Number::from_f64(lat)?, Number::from_f64(lon)?))
}

/// Recover a GeoJSON geometry string from the source column
///
/// The lines API returns the geometry either as a JSON string, as a nested
/// object, or flattened into `{key}.type` / `{key}.coordinates` entries.
fn extract_geometry(raw: &Map<String, Value>, key: &str) -> Option<String> {
    match raw.get(key) {
        Some(Value::String(s)) => return Some(s.clone()),
        Some(Value::Object(o)) => return Some(Value::Object(o.clone()).to_string()),
        Some(other) => {
            debug!(key, value = %other, "geometry column has unexpected shape, skipping");
            return None;
        },
        None => {},
    }

    let geom_type = raw.get(&format!("{key}.type"))?;
    let coordinates = raw.get(&format!("{key}.coordinates"))?;
    let mut geometry = Map::new();
    geometry.insert("type".to_string(), geom_type.clone());
    geometry.insert("coordinates".to_string(), coordinates.clone());
    Some(Value::Object(geometry).to_string())
}

/// Convert GeoJSON text to WKT, passing the original through on failure
fn to_wkt(geojson: &str) -> String {
    match GeoJson(geojson).to_wkt() {
        Ok(wkt) => wkt,
        Err(err) => {
            debug!(error = %err, "geometry is not convertible to WKT, keeping GeoJSON");
            geojson.to_string()
        },
    }
}
