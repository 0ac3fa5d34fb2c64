//! Geographic format derivation
//!
//! All geographic outputs are derived from one staged CSV: `ogr2ogr`
//! converts it to GeoJSON once, and the remaining formats are produced from
//! that file. Failures here never abort the run; they are collected per
//! format group so the tabular outputs still publish.

mod tools;

pub use tools::{ToolChain, OGR2OGR_ENV, TIPPECANOE_ENV};

use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::api::types::Dataset;
use crate::config::{OutputFormat, ProcessingConfig};
use crate::error::{ExportError, Result};
use crate::geo::tools::run_tool;
use crate::schema::{GeometrySource, GEOSHAPE_KEY, LATITUDE_KEY, LONGITUDE_KEY};

/// One failed derivation, scoped to the formats it took down
#[derive(Debug, Clone)]
pub struct GeoFailure {
    pub formats: Vec<OutputFormat>,
    pub message: String,
}

/// Files and failures produced by the geographic stage
#[derive(Debug, Default)]
pub struct GeoOutcome {
    pub files: Vec<(OutputFormat, PathBuf)>,
    pub failures: Vec<GeoFailure>,
}

impl GeoOutcome {
    fn failed(formats: Vec<OutputFormat>, err: &ExportError) -> Self {
        warn!(?formats, error = %err, "geographic derivation failed");
        Self {
            files: vec![],
            failures: vec![GeoFailure {
                formats,
                message: err.to_string(),
            }],
        }
    }
}

/// Derivation chain for the geographic formats of one run
pub struct GeoStage<'a> {
    config: &'a ProcessingConfig,
    tools: &'a ToolChain,
    dir: &'a Path,
}

impl<'a> GeoStage<'a> {
    pub fn new(config: &'a ProcessingConfig, tools: &'a ToolChain, dir: &'a Path) -> Self {
        Self { config, tools, dir }
    }

    /// Derive every requested geographic format from the staged CSV
    ///
    /// Precondition failures (no bounding box, no geometry concept) and the
    /// shared GeoJSON conversion take down the whole group; a failing tail
    /// conversion only takes down its own format.
    pub async fn derive(
        &self,
        dataset: &Dataset,
        geometry: Option<&GeometrySource>,
        staged_csv: &Path,
    ) -> GeoOutcome {
        let requested = self.config.geo_formats();
        if requested.is_empty() {
            return GeoOutcome::default();
        }

        if !dataset.bbox.as_ref().is_some_and(|b| b.len() >= 4) {
            return GeoOutcome::failed(requested, &ExportError::NotGeographic);
        }
        let Some(geometry) = geometry else {
            return GeoOutcome::failed(requested, &ExportError::NoGeometryConcept);
        };

        let geojson = self.output_path(OutputFormat::Geojson);
        let args = staging_args(staged_csv, &geojson, geometry);
        if let Err(err) = self.convert(&self.tools.ogr2ogr, &args, &geojson).await {
            return GeoOutcome::failed(requested, &err);
        }
        info!(path = %geojson.display(), "staged GeoJSON ready");

        let mut outcome = GeoOutcome::default();
        for format in requested {
            let result = match format {
                OutputFormat::Geojson => Ok(geojson.clone()),
                OutputFormat::Pmtiles => {
                    let out = self.output_path(format);
                    // thinning only makes sense for arbitrary geometries
                    let thin = matches!(geometry, GeometrySource::Geometry { .. });
                    let args = tile_args(&geojson, &out, &self.config.filename, thin);
                    self.convert(&self.tools.tippecanoe, &args, &out).await.map(|()| out)
                },
                OutputFormat::Shz => {
                    let out = self.output_path(format);
                    let args = vector_args(&geojson, &out, "ESRI Shapefile");
                    self.convert(&self.tools.ogr2ogr, &args, &out).await.map(|()| out)
                },
                OutputFormat::Gpkg => {
                    let out = self.output_path(format);
                    let args = vector_args(&geojson, &out, "GPKG");
                    self.convert(&self.tools.ogr2ogr, &args, &out).await.map(|()| out)
                },
                OutputFormat::Csv | OutputFormat::Parquet | OutputFormat::Xlsx => continue,
            };
            match result {
                Ok(path) => outcome.files.push((format, path)),
                Err(err) => {
                    warn!(%format, error = %err, "geographic derivation failed");
                    outcome.failures.push(GeoFailure {
                        formats: vec![format],
                        message: err.to_string(),
                    });
                },
            }
        }
        outcome
    }

    fn output_path(&self, format: OutputFormat) -> PathBuf {
        self.dir
            .join(format!("{}.{}", self.config.filename, format.extension()))
    }

    async fn convert(&self, bin: &str, args: &[String], out: &Path) -> Result<()> {
        run_tool(bin, args).await?;
        if !out.exists() {
            return Err(ExportError::Tool {
                tool: bin.to_string(),
                status: "code 0".to_string(),
                stderr: format!("no output file at {}", out.display()),
            });
        }
        Ok(())
    }
}

/// ogr2ogr arguments for the CSV to GeoJSON staging conversion
///
/// The open options tell GDAL's CSV driver where the geometry lives; note
/// that X maps to longitude and Y to latitude.
fn staging_args(csv: &Path, geojson: &Path, geometry: &GeometrySource) -> Vec<String> {
    let mut args = vec![
        "-f".to_string(),
        "GeoJSON".to_string(),
        geojson.display().to_string(),
        csv.display().to_string(),
    ];
    match geometry {
        GeometrySource::LatLon { lat, lon } => {
            args.push("-oo".to_string());
            args.push(format!("X_POSSIBLE_NAMES={lon}"));
            args.push("-oo".to_string());
            args.push(format!("Y_POSSIBLE_NAMES={lat}"));
        },
        GeometrySource::Combined { .. } => {
            args.push("-oo".to_string());
            args.push(format!("X_POSSIBLE_NAMES={LONGITUDE_KEY}"));
            args.push("-oo".to_string());
            args.push(format!("Y_POSSIBLE_NAMES={LATITUDE_KEY}"));
        },
        GeometrySource::Geometry { .. } => {
            args.push("-oo".to_string());
            args.push(format!("GEOM_POSSIBLE_NAMES={GEOSHAPE_KEY}"));
            args.push("-oo".to_string());
            args.push("KEEP_GEOM_COLUMNS=NO".to_string());
        },
    }
    args.push("-a_srs".to_string());
    args.push("EPSG:4326".to_string());
    args
}

/// tippecanoe arguments for the PMTiles tail
fn tile_args(geojson: &Path, pmtiles: &Path, layer: &str, thin: bool) -> Vec<String> {
    let mut args = vec![
        "-zg".to_string(),
        "--force".to_string(),
        "-o".to_string(),
        pmtiles.display().to_string(),
        "-l".to_string(),
        layer.to_string(),
    ];
    if thin {
        args.push("--drop-densest-as-needed".to_string());
    }
    args.push(geojson.display().to_string());
    args
}

/// ogr2ogr arguments for the shapefile and GeoPackage tails
fn vector_args(geojson: &Path, out: &Path, driver: &str) -> Vec<String> {
    vec![
        "-f".to_string(),
        driver.to_string(),
        out.display().to_string(),
        geojson.display().to_string(),
        "-skipfailures".to_string(),
    ]
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn config(formats: &[&str]) -> ProcessingConfig {
        serde_json::from_value(json!({
            "dataset": {"href": "https://example.com/api/v1/datasets/d"},
            "fields": [{"key": "k", "type": "string"}],
            "format": formats,
            "label": "Export",
            "filename": "contours"
        }))
        .unwrap()
    }

    fn geo_dataset(bbox: serde_json::Value) -> Dataset {
        serde_json::from_value(json!({
            "schema": [
                {"key": "k", "type": "string"},
                {"key": "geometry", "type": "string", "x-refersTo": "https://purl.org/geojson/vocab#geometry"}
            ],
            "bbox": bbox
        }))
        .unwrap()
    }

    #[test]
    fn test_staging_args_for_lat_lon_columns() {
        let source = GeometrySource::LatLon {
            lat: "lat".to_string(),
            lon: "lng".to_string(),
        };
        let args = staging_args(Path::new("in.csv"), Path::new("out.geojson"), &source);
        assert_eq!(
            args,
            [
                "-f",
                "GeoJSON",
                "out.geojson",
                "in.csv",
                "-oo",
                "X_POSSIBLE_NAMES=lng",
                "-oo",
                "Y_POSSIBLE_NAMES=lat",
                "-a_srs",
                "EPSG:4326"
            ]
        );
    }

    #[test]
    fn test_staging_args_for_geometry_column() {
        let source = GeometrySource::Geometry {
            key: "geometry".to_string(),
        };
        let args = staging_args(Path::new("in.csv"), Path::new("out.geojson"), &source);
        assert!(args.contains(&format!("GEOM_POSSIBLE_NAMES={GEOSHAPE_KEY}")));
        assert!(args.contains(&"KEEP_GEOM_COLUMNS=NO".to_string()));
    }

    #[test]
    fn test_staging_args_for_combined_column_use_derived_names() {
        let source = GeometrySource::Combined {
            key: "point".to_string(),
        };
        let args = staging_args(Path::new("in.csv"), Path::new("out.geojson"), &source);
        assert!(args.contains(&"X_POSSIBLE_NAMES=longitude".to_string()));
        assert!(args.contains(&"Y_POSSIBLE_NAMES=latitude".to_string()));
    }

    #[test]
    fn test_tile_args_thin_only_when_asked() {
        let thick = tile_args(Path::new("a.geojson"), Path::new("a.pmtiles"), "layer", false);
        assert_eq!(
            thick,
            ["-zg", "--force", "-o", "a.pmtiles", "-l", "layer", "a.geojson"]
        );
        let thin = tile_args(Path::new("a.geojson"), Path::new("a.pmtiles"), "layer", true);
        assert!(thin.contains(&"--drop-densest-as-needed".to_string()));
    }

    #[test]
    fn test_vector_args_skip_failures() {
        let args = vector_args(Path::new("a.geojson"), Path::new("a.gpkg"), "GPKG");
        assert_eq!(args, ["-f", "GPKG", "a.gpkg", "a.geojson", "-skipfailures"]);
    }

    #[tokio::test]
    async fn test_missing_bbox_fails_the_whole_group_without_running_tools() {
        let config = config(&["pmtiles", "gpkg"]);
        let tools = ToolChain {
            ogr2ogr: "/nonexistent/ogr2ogr".to_string(),
            tippecanoe: "/nonexistent/tippecanoe".to_string(),
        };
        let dir = tempfile::tempdir().unwrap();
        let stage = GeoStage::new(&config, &tools, dir.path());
        let dataset = geo_dataset(json!(null));
        let source = GeometrySource::Geometry {
            key: "geometry".to_string(),
        };

        let outcome = stage.derive(&dataset, Some(&source), Path::new("in.csv")).await;
        assert!(outcome.files.is_empty());
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(
            outcome.failures[0].formats,
            [OutputFormat::Pmtiles, OutputFormat::Gpkg]
        );
        assert!(outcome.failures[0].message.contains("no bounding box"));
    }

    #[tokio::test]
    async fn test_missing_geometry_concept_fails_the_group() {
        let config = config(&["geojson"]);
        let tools = ToolChain {
            ogr2ogr: "/nonexistent/ogr2ogr".to_string(),
            tippecanoe: "/nonexistent/tippecanoe".to_string(),
        };
        let dir = tempfile::tempdir().unwrap();
        let stage = GeoStage::new(&config, &tools, dir.path());
        let dataset = geo_dataset(json!([-5.1, 41.3, 9.6, 51.1]));

        let outcome = stage.derive(&dataset, None, Path::new("in.csv")).await;
        assert_eq!(outcome.failures.len(), 1);
        assert!(outcome.failures[0].message.contains("geometry concept"));
    }

    #[cfg(unix)]
    fn stub_tool(dir: &Path, name: &str, script: &str) -> String {
        use std::os::unix::fs::PermissionsExt;
        let path = dir.join(name);
        std::fs::write(&path, script).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path.display().to_string()
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_tails_derive_from_one_staged_geojson() {
        let dir = tempfile::tempdir().unwrap();
        // positional arg 3 is the output for ogr2ogr, arg 4 for tippecanoe
        let tools = ToolChain {
            ogr2ogr: stub_tool(dir.path(), "ogr2ogr", "#!/bin/sh\necho '{}' > \"$3\"\n"),
            tippecanoe: stub_tool(dir.path(), "tippecanoe", "#!/bin/sh\ntouch \"$4\"\n"),
        };
        let config = config(&["geojson", "pmtiles", "gpkg"]);
        let stage = GeoStage::new(&config, &tools, dir.path());
        let dataset = geo_dataset(json!([-5.1, 41.3, 9.6, 51.1]));
        let source = GeometrySource::Geometry {
            key: "geometry".to_string(),
        };
        let csv = dir.path().join("contours.csv");
        std::fs::write(&csv, "k,_geoshape\n").unwrap();

        let outcome = stage.derive(&dataset, Some(&source), &csv).await;
        assert!(outcome.failures.is_empty());
        let formats: Vec<OutputFormat> = outcome.files.iter().map(|(f, _)| *f).collect();
        assert_eq!(
            formats,
            [OutputFormat::Geojson, OutputFormat::Pmtiles, OutputFormat::Gpkg]
        );
        assert!(dir.path().join("contours.geojson").exists());
        assert!(dir.path().join("contours.pmtiles").exists());
        assert!(dir.path().join("contours.gpkg").exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failing_tail_only_loses_its_own_format() {
        let dir = tempfile::tempdir().unwrap();
        let tools = ToolChain {
            ogr2ogr: stub_tool(dir.path(), "ogr2ogr", "#!/bin/sh\necho '{}' > \"$3\"\n"),
            tippecanoe: stub_tool(
                dir.path(),
                "tippecanoe",
                "#!/bin/sh\necho 'tile explosion' >&2\nexit 1\n",
            ),
        };
        let config = config(&["geojson", "pmtiles", "shz"]);
        let stage = GeoStage::new(&config, &tools, dir.path());
        let dataset = geo_dataset(json!([-5.1, 41.3, 9.6, 51.1]));
        let source = GeometrySource::Geometry {
            key: "geometry".to_string(),
        };
        let csv = dir.path().join("contours.csv");
        std::fs::write(&csv, "k,_geoshape\n").unwrap();

        let outcome = stage.derive(&dataset, Some(&source), &csv).await;
        let formats: Vec<OutputFormat> = outcome.files.iter().map(|(f, _)| *f).collect();
        assert_eq!(formats, [OutputFormat::Geojson, OutputFormat::Shz]);
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].formats, [OutputFormat::Pmtiles]);
        assert!(outcome.failures[0].message.contains("tile explosion"));
    }
}
