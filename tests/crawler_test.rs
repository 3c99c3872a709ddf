use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;
use tempfile::TempDir;

use orggraph::config::{CrawlerConfig, FaultAction};
use orggraph::crawler::{
    ArtifactSource, CrawlPhase, DirectoryArtifactSource, StatusSink, StatusUpdate, TriggerCrawler,
};
use orggraph::errors::{CrawlError, Result};
use orggraph::graph::{GraphStore, SqliteGraphStore};
use orggraph::parse::ApexParser;
use orggraph::soql::SoqlParser;
use orggraph::types::{ArtifactSummary, EdgeSpec, MutationSummary, NodeRef, TriggerArtifact};

/// In-memory artifact source for tests.
struct FakeSource {
    triggers: Vec<(String, String)>,
}

impl FakeSource {
    fn new(triggers: &[(&str, &str)]) -> Self {
        Self {
            triggers: triggers
                .iter()
                .map(|(name, body)| (name.to_string(), body.to_string()))
                .collect(),
        }
    }

    fn id_for(name: &str) -> String {
        format!("trig:{name}")
    }
}

#[async_trait]
impl ArtifactSource for FakeSource {
    fn organization_id(&self) -> &str {
        "00Dtest"
    }

    async fn list_artifacts(
        &self,
        _kind: &str,
        _order_by: &str,
        _filter: &str,
    ) -> Result<Vec<ArtifactSummary>> {
        Ok(self
            .triggers
            .iter()
            .map(|(name, _)| ArtifactSummary {
                id: Self::id_for(name),
                name: name.clone(),
            })
            .collect())
    }

    async fn fetch_artifact(&self, _kind: &str, id: &str) -> Result<TriggerArtifact> {
        let (name, body) = self
            .triggers
            .iter()
            .find(|(name, _)| Self::id_for(name) == id)
            .ok_or_else(|| CrawlError::Source {
                message: format!("unknown artifact '{id}'"),
                operation: "fetch_artifact".to_string(),
            })?;
        Ok(TriggerArtifact {
            id: id.to_string(),
            full_name: name.clone(),
            body: body.clone(),
            extra: Default::default(),
        })
    }
}

/// Status sink that records every update.
#[derive(Default)]
struct RecordingSink {
    updates: Mutex<Vec<StatusUpdate>>,
}

impl RecordingSink {
    fn updates(&self) -> Vec<StatusUpdate> {
        self.updates.lock().expect("sink poisoned").clone()
    }
}

#[async_trait]
impl StatusSink for RecordingSink {
    async fn report(&self, update: &StatusUpdate) -> Result<()> {
        self.updates.lock().expect("sink poisoned").push(update.clone());
        Ok(())
    }
}

/// Store wrapper that fails every relationship upsert.
struct FailingStore {
    inner: SqliteGraphStore,
}

#[async_trait]
impl GraphStore for FailingStore {
    async fn upsert(
        &self,
        node_type: &str,
        key_field: &str,
        record: &Value,
    ) -> Result<MutationSummary> {
        self.inner.upsert(node_type, key_field, record).await
    }

    async fn upsert_relationship(
        &self,
        _from: &NodeRef,
        _to: &NodeRef,
        _edge: &EdgeSpec,
    ) -> Result<MutationSummary> {
        Err(CrawlError::Store {
            message: "store unreachable".to_string(),
            operation: "upsert_relationship".to_string(),
        })
    }

    async fn find_field_in_object(
        &self,
        object_name: &str,
        field_name: &str,
    ) -> Result<Option<String>> {
        self.inner.find_field_in_object(object_name, field_name).await
    }

    async fn relationship_target(
        &self,
        object_name: &str,
        relationship_name: &str,
    ) -> Result<Option<String>> {
        self.inner.relationship_target(object_name, relationship_name).await
    }
}

fn setup_store() -> (SqliteGraphStore, TempDir) {
    let dir = TempDir::new().expect("failed to create temp dir");
    let store =
        SqliteGraphStore::initialize(&dir.path().join("graph.db")).expect("failed to init store");
    (store, dir)
}

fn node_counts(dir: &TempDir) -> HashMap<String, i64> {
    let conn = rusqlite::Connection::open(dir.path().join("graph.db")).expect("open db");
    let mut stmt = conn
        .prepare("SELECT node_type, COUNT(*) FROM nodes GROUP BY node_type")
        .expect("prepare");
    stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))
        .expect("query")
        .collect::<std::result::Result<HashMap<_, _>, _>>()
        .expect("rows")
}

#[tokio::test]
async fn test_batch_reports_monotonic_progress_and_completes() {
    let source = FakeSource::new(&[
        ("Alpha", "{ MyObj__c a; }"),
        ("Beta", "{ [SELECT Id FROM Account]; }"),
    ]);
    let (store, _dir) = setup_store();
    let sink = RecordingSink::default();
    let parser = ApexParser;
    let queries = SoqlParser;

    let crawler = TriggerCrawler::new(
        &source,
        &store,
        &parser,
        &queries,
        &sink,
        CrawlerConfig::default(),
    );
    let summary = crawler.run().await.expect("crawl failed");

    assert_eq!(summary.total, 2);
    assert_eq!(summary.completed, 2);

    let updates = sink.updates();
    assert_eq!(updates[0].phase, CrawlPhase::InProgress);
    assert_eq!(updates[0].total, None);
    assert_eq!(updates[1].total, Some(2));
    let progress: Vec<_> = updates
        .iter()
        .filter_map(|u| u.completed)
        .collect();
    assert_eq!(progress, vec![1, 2]);
    assert_eq!(updates.last().expect("no updates").phase, CrawlPhase::Completed);
}

#[tokio::test]
async fn test_parse_failure_still_upserts_artifact_node() {
    let source = FakeSource::new(&[
        // Unterminated fragment: a syntax error in the front end.
        ("Broken", "{ [SELECT Id FROM"),
        ("Fine", "{ MyObj__c a; }"),
    ]);
    let (store, dir) = setup_store();
    let sink = RecordingSink::default();
    let parser = ApexParser;
    let queries = SoqlParser;

    let crawler = TriggerCrawler::new(
        &source,
        &store,
        &parser,
        &queries,
        &sink,
        CrawlerConfig::default(),
    );
    let summary = crawler.run().await.expect("crawl failed");

    // The malformed artifact is contained; the batch finishes.
    assert_eq!(summary.completed, 2);
    let counts = node_counts(&dir);
    assert_eq!(counts.get("ApexTrigger"), Some(&2));

    let conn = rusqlite::Connection::open(dir.path().join("graph.db")).expect("open db");
    let broken_edges: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM edges WHERE to_value = 'trig:Broken'",
            [],
            |row| row.get(0),
        )
        .expect("count");
    assert_eq!(broken_edges, 0);
}

#[tokio::test]
async fn test_store_failure_aborts_batch_without_completed_status() {
    let source = FakeSource::new(&[("Alpha", "{ MyObj__c a; }"), ("Beta", "{ Other__c b; }")]);
    let (inner, _dir) = setup_store();
    let store = FailingStore { inner };
    let sink = RecordingSink::default();
    let parser = ApexParser;
    let queries = SoqlParser;

    let crawler = TriggerCrawler::new(
        &source,
        &store,
        &parser,
        &queries,
        &sink,
        CrawlerConfig::default(),
    );
    let result = crawler.run().await;

    assert!(result.is_err());
    let updates = sink.updates();
    assert!(updates.iter().all(|u| u.phase != CrawlPhase::Completed));
}

#[tokio::test]
async fn test_directory_source_walks_once_per_instance() {
    let dir = TempDir::new().expect("failed to create temp dir");
    std::fs::write(dir.path().join("Alpha.trigger"), "{ MyObj__c a; }").expect("write trigger");
    let source = DirectoryArtifactSource::new(dir.path(), "00Dtest");

    let listed = source
        .list_artifacts("ApexTrigger", "Name", "")
        .await
        .expect("list failed");
    assert_eq!(listed.len(), 1);

    // A file appearing after the first walk is not picked up: the source
    // serves every call from the snapshot taken on first use.
    std::fs::write(dir.path().join("Beta.trigger"), "{ Other__c b; }").expect("write trigger");
    let relisted = source
        .list_artifacts("ApexTrigger", "Name", "")
        .await
        .expect("list failed");
    assert_eq!(relisted.len(), 1);

    let artifact = source
        .fetch_artifact("ApexTrigger", &listed[0].id)
        .await
        .expect("fetch failed");
    assert_eq!(artifact.full_name, "Alpha");
    assert_eq!(artifact.body, "{ MyObj__c a; }");
}

#[tokio::test]
async fn test_skip_policy_continues_past_store_failures() {
    let source = FakeSource::new(&[("Alpha", "{ MyObj__c a; }"), ("Beta", "{ Other__c b; }")]);
    let (inner, _dir) = setup_store();
    let store = FailingStore { inner };
    let sink = RecordingSink::default();
    let parser = ApexParser;
    let queries = SoqlParser;

    let mut config = CrawlerConfig::default();
    config.fault_policy.on_store_error = FaultAction::Skip;

    let crawler = TriggerCrawler::new(&source, &store, &parser, &queries, &sink, config);
    let summary = crawler.run().await.expect("crawl should finish");

    assert_eq!(summary.completed, 2);
    assert_eq!(sink.updates().last().expect("no updates").phase, CrawlPhase::Completed);
}
