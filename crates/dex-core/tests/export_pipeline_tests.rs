// Export Pipeline Integration Tests
//
// Drives the whole pipeline against a mocked dataset platform: snapshot,
// lines pagination, attachment upload and the attachment-list PATCH.

use std::fs;
use std::path::Path;

use serde_json::{json, Value};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use dex_core::api::DatasetClient;
use dex_core::geo::ToolChain;
use dex_core::{ExportPipeline, OutputFormat, ProcessingConfig};

const DATASET_PATH: &str = "/api/v1/datasets/capitales";

fn dataset_href(server: &MockServer) -> String {
    format!("{}{}", server.uri(), DATASET_PATH)
}

fn simple_config(server: &MockServer, formats: &[&str]) -> ProcessingConfig {
    serde_json::from_value(json!({
        "dataset": {"href": dataset_href(server), "title": "Capitales"},
        "fields": [
            {"key": "k", "type": "string"},
            {"key": "v", "type": "integer"}
        ],
        "format": formats,
        "label": "Fichiers exports",
        "filename": "export"
    }))
    .unwrap()
}

async fn mount_dataset(server: &MockServer, body: Value) {
    Mock::given(method("GET"))
        .and(path(DATASET_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

async fn mount_single_page(server: &MockServer, results: Value) {
    let total = results.as_array().map(Vec::len).unwrap_or(0);
    Mock::given(method("GET"))
        .and(path(format!("{DATASET_PATH}/lines")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "total": total,
            "results": results
        })))
        .mount(server)
        .await;
}

async fn mount_publish(server: &MockServer, name: &str) {
    Mock::given(method("POST"))
        .and(path(format!("{DATASET_PATH}/metadata-attachments")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "name": name,
            "size": 42,
            "mimetype": "text/csv"
        })))
        .mount(server)
        .await;
    Mock::given(method("PATCH"))
        .and(path(DATASET_PATH))
        .respond_with(ResponseTemplate::new(200))
        .mount(server)
        .await;
}

fn pipeline(config: ProcessingConfig, dir: &TempDir, cancel: CancellationToken) -> ExportPipeline {
    let client = DatasetClient::new(Some("test-key".to_string())).unwrap();
    ExportPipeline::new(config, client, dir.path(), cancel)
}

#[cfg(unix)]
fn stub_tool(dir: &Path, name: &str, script: &str) -> String {
    use std::os::unix::fs::PermissionsExt;
    let path = dir.join(name);
    fs::write(&path, script).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    path.display().to_string()
}

#[tokio::test]
async fn test_csv_export_end_to_end() {
    let server = MockServer::start().await;
    mount_dataset(
        &server,
        json!({
            "id": "capitales",
            "title": "Capitales",
            "schema": [{"key": "k", "type": "string"}, {"key": "v", "type": "integer"}],
            "attachments": [{"name": "notes.pdf", "title": "Notes"}]
        }),
    )
    .await;
    Mock::given(method("GET"))
        .and(path(format!("{DATASET_PATH}/lines")))
        .and(query_param("size", "10000"))
        .and(query_param("select", "k,v"))
        .and(header("x-apiKey", "test-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "total": 2,
            "results": [
                {"k": "x", "v": 1, "_score": 0.9},
                {"k": "y", "v": null, "_score": 0.4}
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;
    mount_publish(&server, "export.csv").await;

    // config read from disk, like a real processing run
    let dir = TempDir::new().unwrap();
    let config_path = dir.path().join("processing.json");
    fs::write(
        &config_path,
        json!({
            "dataset": {"href": dataset_href(&server)},
            "fields": [
                {"key": "k", "type": "string"},
                {"key": "v", "type": "integer"}
            ],
            "format": ["csv"],
            "label": "Fichiers exports",
            "filename": "export"
        })
        .to_string(),
    )
    .unwrap();
    let config = ProcessingConfig::load(&config_path).unwrap();

    let report = pipeline(config, &dir, CancellationToken::new())
        .run()
        .await
        .unwrap();

    assert_eq!(report.lines, 2);
    assert_eq!(report.published, 1);
    assert!(!report.is_partial());
    assert_eq!(report.files.len(), 1);
    assert_eq!(report.files[0].format, OutputFormat::Csv);

    let csv = fs::read_to_string(dir.path().join("export.csv")).unwrap();
    assert_eq!(csv, "k,v\nx,1\ny,\n");

    // the PATCH carried the snapshot plus the new entry, in that order
    let requests = server.received_requests().await.unwrap();
    let patch = requests.iter().find(|r| r.method.as_str() == "PATCH").unwrap();
    let body: Value = serde_json::from_slice(&patch.body).unwrap();
    let attachments = body["attachments"].as_array().unwrap();
    assert_eq!(attachments.len(), 2);
    assert_eq!(attachments[0]["name"], "notes.pdf");
    assert_eq!(attachments[1]["name"], "export.csv");
    assert_eq!(attachments[1]["type"], "file");
    assert_eq!(attachments[1]["title"], "Fichiers exports");
}

#[tokio::test]
async fn test_page_retry_does_not_duplicate_rows() {
    let server = MockServer::start().await;
    mount_dataset(
        &server,
        json!({"schema": [{"key": "k", "type": "string"}, {"key": "v", "type": "integer"}]}),
    )
    .await;
    // two transient failures first, then the real page
    Mock::given(method("GET"))
        .and(path(format!("{DATASET_PATH}/lines")))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    mount_single_page(&server, json!([{"k": "x", "v": 7}])).await;
    mount_publish(&server, "export.csv").await;

    let dir = TempDir::new().unwrap();
    let config = simple_config(&server, &["csv"]);
    let report = pipeline(config, &dir, CancellationToken::new())
        .run()
        .await
        .unwrap();

    assert_eq!(report.lines, 1);
    let csv = fs::read_to_string(dir.path().join("export.csv")).unwrap();
    assert_eq!(csv, "k,v\nx,7\n");
}

#[tokio::test]
async fn test_filter_expression_reaches_the_lines_api() {
    let server = MockServer::start().await;
    mount_dataset(&server, json!({"schema": [{"key": "k", "type": "string"}]})).await;
    Mock::given(method("GET"))
        .and(path(format!("{DATASET_PATH}/lines")))
        .and(query_param("qs", r#"insee_dep:("35" OR "56")"#))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "total": 0,
            "results": []
        })))
        .expect(1)
        .mount(&server)
        .await;
    mount_publish(&server, "export.csv").await;

    let config: ProcessingConfig = serde_json::from_value(json!({
        "dataset": {"href": dataset_href(&server)},
        "fields": [{"key": "k", "type": "string"}],
        "format": ["csv"],
        "filters": [{
            "type": "in",
            "field": {"key": "insee_dep"},
            "values": ["35", "56"]
        }],
        "label": "Export",
        "filename": "export"
    }))
    .unwrap();

    let dir = TempDir::new().unwrap();
    let report = pipeline(config, &dir, CancellationToken::new())
        .run()
        .await
        .unwrap();
    assert_eq!(report.lines, 0);
}

#[tokio::test]
async fn test_empty_dataset_still_publishes_headers() {
    let server = MockServer::start().await;
    mount_dataset(&server, json!({"schema": [{"key": "k", "type": "string"}]})).await;
    mount_single_page(&server, json!([])).await;
    mount_publish(&server, "export.csv").await;

    let dir = TempDir::new().unwrap();
    let config = simple_config(&server, &["csv"]);
    let report = pipeline(config, &dir, CancellationToken::new())
        .run()
        .await
        .unwrap();

    assert_eq!(report.lines, 0);
    assert_eq!(report.published, 1);
    let csv = fs::read_to_string(dir.path().join("export.csv")).unwrap();
    assert_eq!(csv, "k,v\n");
}

#[tokio::test]
async fn test_cancelled_run_finalizes_files_but_uploads_nothing() {
    let server = MockServer::start().await;
    mount_dataset(&server, json!({"schema": [{"key": "k", "type": "string"}]})).await;
    Mock::given(method("GET"))
        .and(path(format!("{DATASET_PATH}/lines")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"results": [{"k": "x"}]})))
        .expect(0)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let cancel = CancellationToken::new();
    cancel.cancel();
    let dir = TempDir::new().unwrap();
    let config = simple_config(&server, &["csv"]);
    let report = pipeline(config, &dir, cancel).run().await.unwrap();

    assert!(report.cancelled);
    assert!(report.is_partial());
    assert_eq!(report.lines, 0);
    assert_eq!(report.published, 0);
    // the file was still finalized with its header
    let csv = fs::read_to_string(dir.path().join("export.csv")).unwrap();
    assert_eq!(csv, "k,v\n");
}

#[tokio::test]
async fn test_geo_failure_keeps_tabular_outputs_publishing() {
    let server = MockServer::start().await;
    // geometry concept present but no spatial extent
    mount_dataset(
        &server,
        json!({
            "schema": [
                {"key": "k", "type": "string"},
                {"key": "geometry", "type": "string", "x-refersTo": "https://purl.org/geojson/vocab#geometry"}
            ],
            "bbox": null
        }),
    )
    .await;
    mount_single_page(
        &server,
        json!([{"k": "x", "geometry": {"type": "Point", "coordinates": [2.35, 48.85]}}]),
    )
    .await;
    mount_publish(&server, "export.csv").await;

    let dir = TempDir::new().unwrap();
    let config: ProcessingConfig = serde_json::from_value(json!({
        "dataset": {"href": dataset_href(&server)},
        "fields": [{"key": "k", "type": "string"}],
        "format": ["csv", "pmtiles"],
        "label": "Export",
        "filename": "export"
    }))
    .unwrap();

    // broken tool paths prove the chain is never attempted
    let tools = ToolChain {
        ogr2ogr: "/nonexistent/ogr2ogr".to_string(),
        tippecanoe: "/nonexistent/tippecanoe".to_string(),
    };
    let client = DatasetClient::new(None).unwrap();
    let report = ExportPipeline::new(config, client, dir.path(), CancellationToken::new())
        .with_tools(tools)
        .run()
        .await
        .unwrap();

    assert_eq!(report.published, 1);
    assert_eq!(report.files.len(), 1);
    assert_eq!(report.files[0].format, OutputFormat::Csv);
    assert!(report.is_partial());
    assert_eq!(report.geo_failures.len(), 1);
    assert_eq!(report.geo_failures[0].formats, [OutputFormat::Pmtiles]);
    assert!(report.geo_failures[0].message.contains("no bounding box"));
}

#[cfg(unix)]
#[tokio::test]
async fn test_geojson_derivation_publishes_but_not_the_staging_csv() {
    let server = MockServer::start().await;
    mount_dataset(
        &server,
        json!({
            "schema": [
                {"key": "k", "type": "string"},
                {"key": "geometry", "type": "string", "x-refersTo": "https://purl.org/geojson/vocab#geometry"}
            ],
            "bbox": [-5.1, 41.3, 9.6, 51.1]
        }),
    )
    .await;
    mount_single_page(
        &server,
        json!([{"k": "x", "geometry": {"type": "Point", "coordinates": [2.35, 48.85]}}]),
    )
    .await;
    Mock::given(method("POST"))
        .and(path(format!("{DATASET_PATH}/metadata-attachments")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "name": "export.geojson",
            "size": 42
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PATCH"))
        .and(path(DATASET_PATH))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let tools = ToolChain {
        ogr2ogr: stub_tool(
            dir.path(),
            "ogr2ogr",
            "#!/bin/sh\necho '{\"type\":\"FeatureCollection\",\"features\":[]}' > \"$3\"\n",
        ),
        tippecanoe: "/nonexistent/tippecanoe".to_string(),
    };
    let config: ProcessingConfig = serde_json::from_value(json!({
        "dataset": {"href": dataset_href(&server)},
        "fields": [{"key": "k", "type": "string"}],
        "format": ["geojson"],
        "label": "Export",
        "filename": "export"
    }))
    .unwrap();

    let client = DatasetClient::new(None).unwrap();
    let report = ExportPipeline::new(config, client, dir.path(), CancellationToken::new())
        .with_tools(tools)
        .run()
        .await
        .unwrap();

    assert!(!report.is_partial());
    assert_eq!(report.published, 1);
    assert_eq!(report.files.len(), 1);
    assert_eq!(report.files[0].format, OutputFormat::Geojson);
    // the staging CSV exists on disk but was never uploaded
    assert!(dir.path().join("export.csv").exists());

    // the staged CSV fed the conversion with the derived geometry column
    let staged = fs::read_to_string(dir.path().join("export.csv")).unwrap();
    assert!(staged.starts_with("k,_geoshape\n"));
    assert!(staged.contains("Point"));
}

#[cfg(unix)]
#[tokio::test]
async fn test_geo_conversion_starts_only_after_sinks_flush() {
    let server = MockServer::start().await;
    mount_dataset(
        &server,
        json!({
            "schema": [
                {"key": "k", "type": "string"},
                {"key": "lat", "type": "number", "x-refersTo": "http://schema.org/latitude"},
                {"key": "lon", "type": "number", "x-refersTo": "http://schema.org/longitude"}
            ],
            "bbox": [-5.1, 41.3, 9.6, 51.1]
        }),
    )
    .await;
    mount_single_page(
        &server,
        json!([
            {"k": "paris", "lat": 48.85, "lon": 2.35},
            {"k": "lyon", "lat": 45.76, "lon": 4.83}
        ]),
    )
    .await;
    mount_publish(&server, "export.geojson").await;

    let dir = TempDir::new().unwrap();
    // the stub copies its input file, so the "GeoJSON" output snapshots
    // whatever the staged CSV held at conversion time
    let tools = ToolChain {
        ogr2ogr: stub_tool(dir.path(), "ogr2ogr", "#!/bin/sh\ncp \"$4\" \"$3\"\n"),
        tippecanoe: "/nonexistent/tippecanoe".to_string(),
    };
    let config: ProcessingConfig = serde_json::from_value(json!({
        "dataset": {"href": dataset_href(&server)},
        "fields": [{"key": "k", "type": "string"}],
        "format": ["geojson"],
        "label": "Export",
        "filename": "export"
    }))
    .unwrap();

    let client = DatasetClient::new(None).unwrap();
    let report = ExportPipeline::new(config, client, dir.path(), CancellationToken::new())
        .with_tools(tools)
        .run()
        .await
        .unwrap();

    assert!(!report.is_partial());
    // every row was flushed before the conversion ran
    let snapshot = fs::read_to_string(dir.path().join("export.geojson")).unwrap();
    assert_eq!(snapshot, "k,lat,lon\nparis,48.85,2.35\nlyon,45.76,4.83\n");
}

#[tokio::test]
async fn test_files_follow_requested_format_order() {
    let server = MockServer::start().await;
    mount_dataset(
        &server,
        json!({"schema": [{"key": "k", "type": "string"}, {"key": "v", "type": "integer"}]}),
    )
    .await;
    mount_single_page(&server, json!([{"k": "x", "v": 1}, {"k": "y", "v": 2}])).await;
    mount_publish(&server, "export.xlsx").await;

    let dir = TempDir::new().unwrap();
    let config = simple_config(&server, &["xlsx", "csv", "parquet"]);
    let report = pipeline(config, &dir, CancellationToken::new())
        .run()
        .await
        .unwrap();

    let formats: Vec<OutputFormat> = report.files.iter().map(|f| f.format).collect();
    assert_eq!(
        formats,
        [OutputFormat::Xlsx, OutputFormat::Csv, OutputFormat::Parquet]
    );
    assert_eq!(report.published, 3);
    assert!(dir.path().join("export.xlsx").exists());
    assert!(dir.path().join("export.parquet").exists());
}
