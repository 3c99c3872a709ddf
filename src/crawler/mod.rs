//! Batch orchestration.
//!
//! Fetches the list of eligible trigger artifacts, drives extraction and
//! mutation building per artifact through a bounded work queue, reports
//! progress, and applies the configured fault policy.

mod directory;

pub use directory::DirectoryArtifactSource;

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use futures::TryStreamExt;
use tracing::{info, warn};

use crate::config::{CrawlerConfig, FaultAction};
use crate::errors::{CrawlError, Result};
use crate::extraction::ReferenceExtractor;
use crate::graph::GraphStore;
use crate::mutation::MutationBuilder;
use crate::parse::SourceParser;
use crate::soql::QueryParser;
use crate::types::{ArtifactSummary, TriggerArtifact};

/// Metadata kind crawled by this stage.
const METADATA_KIND: &str = "ApexTrigger";

/// Label reported to the status sink.
const STATUS_KIND: &str = "ApexTriggers";

/// Field the artifact list is ordered by.
const LIST_ORDER: &str = "Name";

/// Predicate restricting the list to active, unmanaged artifacts.
const ELIGIBLE_FILTER: &str = "ManageableState='unmanaged'";

/// Source platform exposing the artifact list and full artifact bodies.
#[async_trait]
pub trait ArtifactSource: Send + Sync {
    /// Identifier of the organization being crawled, attached to log events.
    fn organization_id(&self) -> &str;

    /// Lists eligible artifacts of `kind`, ordered by `order_by`, restricted
    /// by `filter`.
    async fn list_artifacts(
        &self,
        kind: &str,
        order_by: &str,
        filter: &str,
    ) -> Result<Vec<ArtifactSummary>>;

    /// Fetches one artifact's full record including its source body.
    async fn fetch_artifact(&self, kind: &str, id: &str) -> Result<TriggerArtifact>;
}

/// Crawl phase reported to the status sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrawlPhase {
    InProgress,
    Completed,
}

/// One status report: phase plus whatever counts are known at that point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusUpdate {
    pub phase: CrawlPhase,
    pub metadata_kind: String,
    pub total: Option<usize>,
    pub completed: Option<usize>,
}

impl StatusUpdate {
    pub fn in_progress(total: Option<usize>, completed: Option<usize>) -> Self {
        Self {
            phase: CrawlPhase::InProgress,
            metadata_kind: STATUS_KIND.to_string(),
            total,
            completed,
        }
    }

    pub fn completed() -> Self {
        Self {
            phase: CrawlPhase::Completed,
            metadata_kind: STATUS_KIND.to_string(),
            total: None,
            completed: None,
        }
    }
}

/// Sink for batch status reports.
#[async_trait]
pub trait StatusSink: Send + Sync {
    async fn report(&self, update: &StatusUpdate) -> Result<()>;
}

/// Status sink that emits structured log events.
pub struct LogStatusSink;

#[async_trait]
impl StatusSink for LogStatusSink {
    async fn report(&self, update: &StatusUpdate) -> Result<()> {
        info!(
            kind = %update.metadata_kind,
            phase = ?update.phase,
            total = update.total,
            completed = update.completed,
            "crawl status"
        );
        Ok(())
    }
}

/// Counts for one finished crawl.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CrawlSummary {
    pub total: usize,
    pub completed: usize,
    pub edges_upserted: u64,
}

/// Orchestrates one crawl over all eligible trigger artifacts.
pub struct TriggerCrawler<'a> {
    source: &'a dyn ArtifactSource,
    store: &'a dyn GraphStore,
    parser: &'a dyn SourceParser,
    queries: &'a dyn QueryParser,
    status: &'a dyn StatusSink,
    config: CrawlerConfig,
}

impl<'a> TriggerCrawler<'a> {
    pub fn new(
        source: &'a dyn ArtifactSource,
        store: &'a dyn GraphStore,
        parser: &'a dyn SourceParser,
        queries: &'a dyn QueryParser,
        status: &'a dyn StatusSink,
        config: CrawlerConfig,
    ) -> Self {
        Self {
            source,
            store,
            parser,
            queries,
            status,
            config,
        }
    }

    /// Processes all eligible artifacts and reports status throughout.
    ///
    /// Artifacts flow through a bounded queue of `max_in_flight` workers;
    /// the default of 1 processes them strictly sequentially in list order.
    /// Under the default fault policy a store error terminates the batch,
    /// so an absent Completed status means the batch did not finish; the
    /// run can safely be repeated since every mutation is idempotent.
    pub async fn run(&self) -> Result<CrawlSummary> {
        let org = self.source.organization_id().to_string();

        self.status
            .report(&StatusUpdate::in_progress(None, None))
            .await?;

        let artifacts = self
            .source
            .list_artifacts(METADATA_KIND, LIST_ORDER, ELIGIBLE_FILTER)
            .await?;
        let total = artifacts.len();

        self.status
            .report(&StatusUpdate::in_progress(Some(total), None))
            .await?;
        info!(org = %org, total, "fetched trigger list");

        let completed = AtomicUsize::new(0);
        let edges = AtomicUsize::new(0);
        let concurrency = self.config.max_in_flight.max(1);

        futures::stream::iter(artifacts.into_iter().map(Ok::<_, CrawlError>))
            .try_for_each_concurrent(concurrency, |summary| {
                let org = org.clone();
                let completed = &completed;
                let edges = &edges;
                async move {
                    self.process_one(&org, summary, total, completed, edges)
                        .await
                }
            })
            .await?;

        self.status.report(&StatusUpdate::completed()).await?;

        Ok(CrawlSummary {
            total,
            completed: completed.load(Ordering::SeqCst),
            edges_upserted: edges.load(Ordering::SeqCst) as u64,
        })
    }

    async fn process_one(
        &self,
        org: &str,
        summary: ArtifactSummary,
        total: usize,
        completed: &AtomicUsize,
        edges: &AtomicUsize,
    ) -> Result<()> {
        let artifact = self.source.fetch_artifact(METADATA_KIND, &summary.id).await?;

        // Parse failures are absorbed inside the extractor: a malformed body
        // yields empty results, and the artifact node is still upserted.
        let extractor = ReferenceExtractor::new(self.parser, self.queries);
        let extraction = extractor.extract(&artifact);

        let builder = MutationBuilder::new(self.store, self.config.literal_pairing);
        match builder.build(&artifact, &extraction).await {
            Ok(report) => {
                edges.fetch_add(report.edges_upserted as usize, Ordering::SeqCst);
                info!(
                    org = %org,
                    artifact = %artifact.id,
                    edges = report.edges_upserted,
                    misses = report.field_misses,
                    "trigger processed"
                );
            }
            Err(error) => match self.config.fault_policy.on_store_error {
                FaultAction::Abort => return Err(error),
                FaultAction::Skip => {
                    warn!(
                        org = %org,
                        artifact = %artifact.id,
                        %error,
                        "skipping trigger after store error"
                    );
                }
            },
        }

        let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
        info!(org = %org, completed = done, total, "trigger batch progress");
        self.status
            .report(&StatusUpdate::in_progress(Some(total), Some(done)))
            .await?;

        Ok(())
    }
}
