//! Extraction orchestrator.
//!
//! Runs registered extractors on a bounded worker pool, each inside its own
//! time budget, then pushes every non-failed result through the normalizer
//! and the upsert engine. A source that fails, times out or is cancelled is
//! reported in the summary and never affects the others. Only a store
//! failure ends the run early.

use std::collections::{BTreeSet, HashSet};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt, TryStreamExt};
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::CrawlSettings;
use crate::ingestion::extractor::{crawl_source, CrawlLimits};
use crate::ingestion::fetch::PageFetcher;
use crate::ingestion::models::CrawlResult;
use crate::ingestion::normalizer::normalize;
use crate::ingestion::sources::SourceRegistry;
use crate::ingestion::store::StoreError;
use crate::ingestion::summary::{RejectedRecord, RunSummary, SourceSummary};
use crate::ingestion::upsert::{Reconcile, UpsertEngine};
use crate::models::job::Organization;

#[derive(Debug, Error)]
pub enum RunError {
    #[error("no extractor registered for {0}")]
    NotRegistered(Organization),

    #[error("storage failure aborted the crawl run: {0}")]
    Store(#[from] StoreError),
}

pub struct Orchestrator {
    registry: SourceRegistry,
    fetcher: Arc<dyn PageFetcher>,
    engine: UpsertEngine,
    settings: CrawlSettings,
    in_flight: Mutex<HashSet<Organization>>,
    shutdown: watch::Receiver<bool>,
}

/// Marks a source as being crawled until dropped.
struct SourceClaim<'a> {
    in_flight: &'a Mutex<HashSet<Organization>>,
    organization: Organization,
}

impl Drop for SourceClaim<'_> {
    fn drop(&mut self) {
        let mut in_flight = self
            .in_flight
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        in_flight.remove(&self.organization);
    }
}

impl Orchestrator {
    pub fn new(
        registry: SourceRegistry,
        fetcher: Arc<dyn PageFetcher>,
        engine: UpsertEngine,
        settings: CrawlSettings,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            registry,
            fetcher,
            engine,
            settings,
            in_flight: Mutex::new(HashSet::new()),
            shutdown,
        }
    }

    /// Crawls every registered source.
    pub async fn run_all(&self) -> Result<RunSummary, RunError> {
        self.run(self.registry.organizations()).await
    }

    /// Crawls a single registered source.
    pub async fn run_source(&self, organization: Organization) -> Result<RunSummary, RunError> {
        if self.registry.get(organization).is_none() {
            return Err(RunError::NotRegistered(organization));
        }
        self.run(vec![organization]).await
    }

    async fn run(&self, organizations: Vec<Organization>) -> Result<RunSummary, RunError> {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let concurrency = self.settings.concurrency_for(self.registry.len());
        info!(
            "Crawl run {run_id} started: {} sources, concurrency {concurrency}",
            organizations.len()
        );

        let sources: Vec<SourceSummary> = stream::iter(organizations)
            .map(|organization| self.run_one(organization, started_at))
            .buffer_unordered(concurrency)
            .try_collect()
            .await
            .map_err(|e| {
                error!("Crawl run {run_id} aborted: {e}");
                e
            })?;

        let summary = RunSummary::new(run_id, started_at, sources);
        info!(
            "Crawl run {run_id} finished: {} sources, {} failures",
            summary.sources.len(),
            summary.failures.len()
        );
        Ok(summary)
    }

    fn claim(&self, organization: Organization) -> Option<SourceClaim<'_>> {
        let mut in_flight = self
            .in_flight
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        in_flight.insert(organization).then_some(SourceClaim {
            in_flight: &self.in_flight,
            organization,
        })
    }

    async fn run_one(
        &self,
        organization: Organization,
        started_at: DateTime<Utc>,
    ) -> Result<SourceSummary, StoreError> {
        let Some(extractor) = self.registry.get(organization) else {
            return Ok(SourceSummary::failed(organization, "no extractor registered"));
        };
        let Some(_claim) = self.claim(organization) else {
            warn!("{organization}: crawl already running, skipping");
            return Ok(SourceSummary::failed(organization, "already running"));
        };

        let limits = CrawlLimits {
            max_pages: self.settings.max_pages,
            detail_retry: self.settings.detail_retry_policy(),
            request_delay: self.settings.request_delay,
        };
        let budget = self.settings.source_timeout;
        let crawl = crawl_source(extractor.as_ref(), self.fetcher.as_ref(), limits);
        let mut shutdown = self.shutdown.clone();

        // Dropping the crawl future aborts its in-flight fetches; whatever it
        // gathered is discarded with it.
        let result = tokio::select! {
            finished = tokio::time::timeout(budget, crawl) => match finished {
                Ok(result) => result,
                Err(_) => {
                    warn!("{organization}: timed out after {}s", budget.as_secs());
                    CrawlResult::failed(
                        organization,
                        format!("timed out after {}s", budget.as_secs()),
                    )
                }
            },
            _ = wait_for_shutdown(&mut shutdown) => {
                warn!("{organization}: crawl cancelled by shutdown");
                CrawlResult::failed(organization, "cancelled by shutdown")
            }
        };

        self.ingest(result, started_at).await
    }

    async fn ingest(
        &self,
        result: CrawlResult,
        started_at: DateTime<Utc>,
    ) -> Result<SourceSummary, StoreError> {
        let organization = result.organization;
        let mut summary = SourceSummary::from_crawl(&result);
        if result.is_failed() {
            return Ok(summary);
        }

        let seen_ids: BTreeSet<String> = result.seen_ids().map(str::to_string).collect();
        let mut unique = BTreeSet::new();
        let mut candidates = Vec::with_capacity(result.records.len());
        for record in &result.records {
            match normalize(organization, record) {
                Ok(normalized) => {
                    if !unique.insert(normalized.candidate.source_id.clone()) {
                        debug!("{organization}: duplicate posting {}", record.source_id);
                        continue;
                    }
                    summary.dropped_fields.add(normalized.dropped);
                    candidates.push(normalized.candidate);
                }
                Err(reason) => {
                    warn!("{organization}: rejected {:?}: {reason}", record.source_id);
                    summary.rejected.push(RejectedRecord {
                        source_id: record.source_id.clone(),
                        reason,
                    });
                }
            }
        }
        summary.normalized = candidates.len();

        let stats = self
            .engine
            .apply(
                candidates,
                Reconcile {
                    organization,
                    seen_ids: &seen_ids,
                    started_at,
                    retire_absent: true,
                },
            )
            .await
            .map_err(|e| {
                error!("{organization}: storage failure during upsert: {e}");
                e
            })?;
        summary.apply_stats(stats);

        // An empty listing usually means a redesign or maintenance page.
        if result.records.is_empty() && result.skipped.is_empty() && summary.retired > 0 {
            let message = format!(
                "listing returned no postings; retired {} previously active postings",
                summary.retired
            );
            warn!("{organization}: {message}");
            summary.warnings.push(message);
        }
        Ok(summary)
    }
}

/// Resolves once shutdown is signalled. Never resolves if the sender is gone
/// without signalling.
async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow_and_update() {
            return;
        }
        if shutdown.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}
