//! End-to-end pipeline tests
//!
//! The marketplace API is mocked with wiremock and rows go to an in-memory
//! sink, so these run without network access or a database.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use async_trait::async_trait;
use nftetl_db::{DbError, DbResult};
use nftetl_ingest::{
    CollectionSink, EtlConfig, EtlError, NewCollection, OpenSeaClient, Pipeline, PipelineState,
    RateLimit,
};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use wiremock::{
    matchers::{method, path, query_param, query_param_is_missing},
    Mock, MockServer, ResponseTemplate,
};

// ============================================================================
// Harness
// ============================================================================

/// Collects loaded records; individual slugs can be made to fail
#[derive(Default)]
struct MemorySink {
    rows: Vec<(i64, NewCollection)>,
    prepare_calls: usize,
    close_calls: usize,
    failures: HashMap<String, fn() -> DbError>,
}

impl MemorySink {
    fn failing(slug: &str, error: fn() -> DbError) -> Self {
        let mut sink = Self::default();
        sink.failures.insert(slug.to_string(), error);
        sink
    }
}

#[async_trait]
impl CollectionSink for MemorySink {
    async fn prepare(&mut self) -> DbResult<()> {
        self.prepare_calls += 1;
        Ok(())
    }

    async fn load(&mut self, record: &NewCollection) -> DbResult<i64> {
        if let Some(error) = self.failures.get(&record.collection) {
            return Err(error());
        }
        let id = self.rows.len() as i64 + 1;
        self.rows.push((id, record.clone()));
        Ok(id)
    }

    async fn close(&mut self) {
        self.close_calls += 1;
    }
}

struct Harness {
    server: MockServer,
    dir: TempDir,
}

impl Harness {
    async fn start() -> Self {
        Self {
            server: MockServer::start().await,
            dir: TempDir::new().unwrap(),
        }
    }

    fn raw_dir(&self) -> PathBuf {
        self.dir.path().join("raw")
    }

    fn report_dir(&self) -> PathBuf {
        self.dir.path().join("reports")
    }

    fn pipeline(&self, sink: MemorySink) -> Pipeline<MemorySink> {
        let config = EtlConfig::new("test-key")
            .with_base_url(self.server.uri())
            .with_rate_limit(RateLimit::disabled())
            .with_raw_data_dir(self.raw_dir())
            .with_report_dir(Some(self.report_dir()));
        let client = OpenSeaClient::new(&config).unwrap();
        Pipeline::new(&config, client, sink)
    }
}

fn synthetic_collections(start: usize, count: usize) -> Vec<Value> {
    (start..start + count)
        .map(|i| {
            json!({
                "collection": format!("collection-{i}"),
                "name": format!("Collection {i}"),
                "owner": if i % 2 == 0 { "alice" } else { "bob" },
                "twitter_username": if i % 5 == 0 { "@nft" } else { "" },
                "contracts": [{"address": format!("0x{i:040x}"), "chain": "ethereum"}]
            })
        })
        .collect()
}

fn page(collections: Vec<Value>, next: Option<&str>) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({"collections": collections, "next": next}))
}

fn files_in(dir: &Path) -> Vec<PathBuf> {
    match std::fs::read_dir(dir) {
        Ok(entries) => entries.map(|e| e.unwrap().path()).collect(),
        Err(_) => Vec::new(),
    }
}

/// Per-page raw files only, without the run export
fn raw_pages_in(dir: &Path) -> Vec<PathBuf> {
    files_in(dir)
        .into_iter()
        .filter(|path| path.file_name().unwrap().to_string_lossy().starts_with("raw_"))
        .collect()
}

/// First page of 30 with a cursor, second page of 20 without one
async fn mount_two_pages(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/collections"))
        .and(query_param_is_missing("next"))
        .and(query_param("limit", "50"))
        .respond_with(page(synthetic_collections(0, 30), Some("cursor-2")))
        .expect(1)
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/collections"))
        .and(query_param("next", "cursor-2"))
        .and(query_param("limit", "20"))
        .respond_with(page(synthetic_collections(30, 20), None))
        .expect(1)
        .mount(server)
        .await;
}

// ============================================================================
// Successful runs
// ============================================================================

#[tokio::test]
async fn test_two_pages_load_fifty_rows() {
    let harness = Harness::start().await;
    mount_two_pages(&harness.server).await;

    let mut pipeline = harness.pipeline(MemorySink::default());
    let summary = pipeline.run("ethereum", 50).await.unwrap();

    assert_eq!(pipeline.state(), PipelineState::Done);
    assert_eq!(summary.state, PipelineState::Done);
    assert_eq!(summary.pages, 2);
    assert_eq!(summary.extracted, 50);
    assert_eq!(summary.transformed, 50);
    assert_eq!(summary.loaded, 50);
    assert_eq!(summary.skipped, 0);
    assert_eq!(summary.raw_files, 2);

    assert_eq!(raw_pages_in(&harness.raw_dir()).len(), 2);

    let sink = pipeline.into_sink();
    assert_eq!(sink.rows.len(), 50);
    assert_eq!(sink.prepare_calls, 1);
    assert_eq!(sink.close_calls, 1);
    assert_eq!(sink.rows[0].1.collection, "collection-0");
    assert_eq!(sink.rows[49].1.collection, "collection-49");
}

#[tokio::test]
async fn test_raw_files_hold_response_bodies() {
    let harness = Harness::start().await;
    mount_two_pages(&harness.server).await;

    let mut pipeline = harness.pipeline(MemorySink::default());
    pipeline.run("ethereum", 50).await.unwrap();

    let mut sizes: Vec<usize> = raw_pages_in(&harness.raw_dir())
        .iter()
        .map(|file| {
            let body: Value = serde_json::from_str(&std::fs::read_to_string(file).unwrap()).unwrap();
            body["collections"].as_array().unwrap().len()
        })
        .collect();
    sizes.sort_unstable();
    assert_eq!(sizes, vec![20, 30]);
}

#[tokio::test]
async fn test_run_export_holds_every_collection() {
    let harness = Harness::start().await;
    mount_two_pages(&harness.server).await;

    let mut pipeline = harness.pipeline(MemorySink::default());
    let summary = pipeline.run("ethereum", 50).await.unwrap();

    let export = summary.export.expect("export files");
    assert_eq!(export.rows, 50);
    assert!(export.json.starts_with(harness.raw_dir()));

    let json: Value = serde_json::from_str(&std::fs::read_to_string(&export.json).unwrap()).unwrap();
    let collections = json.as_array().unwrap();
    assert_eq!(collections.len(), 50);
    assert_eq!(collections[0]["collection"], "collection-0");
    assert_eq!(collections[49]["collection"], "collection-49");

    let csv = std::fs::read_to_string(&export.csv).unwrap();
    assert_eq!(csv.lines().count(), 51);
    assert!(csv.lines().next().unwrap().starts_with("collection,name,"));

    // Two pages plus the JSON and CSV export
    assert_eq!(files_in(&harness.raw_dir()).len(), 4);
}

#[tokio::test]
async fn test_aggregation_report_written() {
    let harness = Harness::start().await;
    mount_two_pages(&harness.server).await;

    let mut pipeline = harness.pipeline(MemorySink::default());
    let summary = pipeline.run("ethereum", 50).await.unwrap();

    let report_path = summary.report.expect("report path");
    assert!(report_path.starts_with(harness.report_dir()));

    let report: Value = serde_json::from_str(&std::fs::read_to_string(report_path).unwrap()).unwrap();
    assert_eq!(report["chain"], "ethereum");
    assert_eq!(report["total_collections"], 50);
    assert_eq!(report["collections_with_twitter"], 10);
    assert_eq!(report["collections_by_owner"]["alice"], 25);
    assert_eq!(report["contract_counts"]["ethereum"], 50);
    assert_eq!(report["categories"]["uncategorized"], 50);
}

#[tokio::test]
async fn test_invalid_records_are_skipped() {
    let harness = Harness::start().await;

    let mut collections = synthetic_collections(0, 4);
    collections[1].as_object_mut().unwrap().remove("collection");
    collections[2]["name"] = json!("   ");

    Mock::given(method("GET"))
        .and(path("/collections"))
        .respond_with(page(collections, None))
        .mount(&harness.server)
        .await;

    let mut pipeline = harness.pipeline(MemorySink::default());
    let summary = pipeline.run("ethereum", 50).await.unwrap();

    assert_eq!(summary.state, PipelineState::Done);
    assert_eq!(summary.extracted, 4);
    assert_eq!(summary.transformed, 2);
    assert_eq!(summary.skipped, 2);
    assert_eq!(summary.loaded, 2);
}

#[tokio::test]
async fn test_rejected_rows_do_not_abort() {
    let harness = Harness::start().await;

    Mock::given(method("GET"))
        .and(path("/collections"))
        .respond_with(page(synthetic_collections(0, 3), None))
        .mount(&harness.server)
        .await;

    let sink = MemorySink::failing("collection-1", || DbError::Write("value too long".to_string()));
    let mut pipeline = harness.pipeline(sink);
    let summary = pipeline.run("ethereum", 50).await.unwrap();

    assert_eq!(summary.loaded, 2);
    assert_eq!(summary.write_failures, 1);
    assert_eq!(pipeline.state(), PipelineState::Done);
}

// ============================================================================
// Failed runs
// ============================================================================

#[tokio::test]
async fn test_rate_limit_fails_run_and_closes_sink() {
    let harness = Harness::start().await;

    Mock::given(method("GET"))
        .and(path("/collections"))
        .respond_with(ResponseTemplate::new(429).set_body_string("{\"detail\": \"throttled\"}"))
        .expect(1)
        .mount(&harness.server)
        .await;

    let mut pipeline = harness.pipeline(MemorySink::default());
    let err = pipeline.run("ethereum", 50).await.unwrap_err();

    assert!(matches!(err, EtlError::RateLimited { .. }));
    assert_eq!(pipeline.state(), PipelineState::Failed);

    let summary = pipeline.summary().unwrap();
    assert_eq!(summary.state, PipelineState::Failed);
    assert_eq!(summary.loaded, 0);
    assert!(files_in(&harness.raw_dir()).is_empty());

    let sink = pipeline.into_sink();
    assert!(sink.rows.is_empty());
    assert_eq!(sink.close_calls, 1);
}

#[tokio::test]
async fn test_connection_loss_fails_run() {
    let harness = Harness::start().await;

    Mock::given(method("GET"))
        .and(path("/collections"))
        .respond_with(page(synthetic_collections(0, 5), None))
        .mount(&harness.server)
        .await;

    let sink = MemorySink::failing("collection-2", || DbError::Connection("connection reset".to_string()));
    let mut pipeline = harness.pipeline(sink);
    let err = pipeline.run("ethereum", 50).await.unwrap_err();

    assert!(matches!(err, EtlError::Db(DbError::Connection(_))));
    assert_eq!(pipeline.state(), PipelineState::Failed);
    assert_eq!(pipeline.summary().unwrap().loaded, 2);
    assert_eq!(pipeline.sink().close_calls, 1);
}

#[tokio::test]
async fn test_zero_limit_is_rejected() {
    let harness = Harness::start().await;

    let mut pipeline = harness.pipeline(MemorySink::default());
    let err = pipeline.run("ethereum", 0).await.unwrap_err();

    assert!(matches!(err, EtlError::Config(_)));
    assert_eq!(pipeline.state(), PipelineState::Failed);
    assert_eq!(pipeline.sink().prepare_calls, 0);
    assert_eq!(pipeline.sink().close_calls, 1);
}

#[tokio::test]
async fn test_raw_write_failure_is_not_fatal() {
    let harness = Harness::start().await;

    Mock::given(method("GET"))
        .and(path("/collections"))
        .respond_with(page(synthetic_collections(0, 3), None))
        .mount(&harness.server)
        .await;

    // A regular file where the raw directory should be
    std::fs::write(harness.raw_dir(), "blocked").unwrap();

    let mut pipeline = harness.pipeline(MemorySink::default());
    let summary = pipeline.run("ethereum", 50).await.unwrap();

    // The page file and the export both fail
    assert_eq!(summary.raw_failures, 2);
    assert_eq!(summary.raw_files, 0);
    assert!(summary.export.is_none());
    assert_eq!(summary.loaded, 3);
}
