use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::ingestion::models::{CrawlResult, CrawlStatus, SkippedRecord};
use crate::ingestion::normalizer::{FieldDrops, Rejection};
use crate::ingestion::upsert::UpsertStats;
use crate::models::job::Organization;

/// Per-run report returned to whoever triggered the crawl.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub sources: Vec<SourceSummary>,
    pub failures: Vec<SourceFailure>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceFailure {
    pub organization: Organization,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RejectedRecord {
    pub source_id: String,
    pub reason: Rejection,
}

/// Raw values present on a record but dropped by the normalizer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DroppedFieldCounts {
    pub grade: usize,
    pub deadline: usize,
    pub posted_date: usize,
}

impl DroppedFieldCounts {
    pub fn add(&mut self, drops: FieldDrops) {
        self.grade += usize::from(drops.grade);
        self.deadline += usize::from(drops.deadline);
        self.posted_date += usize::from(drops.posted_date);
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SourceSummary {
    pub organization: Organization,
    pub status: CrawlStatus,
    pub discovered: usize,
    pub normalized: usize,
    pub inserted: usize,
    pub updated: usize,
    pub reactivated: usize,
    pub retired: usize,
    pub expired: usize,
    pub skipped: usize,
    pub skipped_records: Vec<SkippedRecord>,
    pub rejected: Vec<RejectedRecord>,
    pub dropped_fields: DroppedFieldCounts,
    pub detail_retries: u32,
    pub pages_fetched: u32,
    pub error: Option<String>,
    /// Conditions worth a look that did not fail the source.
    pub warnings: Vec<String>,
}

impl SourceSummary {
    pub fn from_crawl(result: &CrawlResult) -> Self {
        Self {
            organization: result.organization,
            status: result.status,
            discovered: result.records.len() + result.skipped.len(),
            normalized: 0,
            inserted: 0,
            updated: 0,
            reactivated: 0,
            retired: 0,
            expired: 0,
            skipped: result.skipped.len(),
            skipped_records: result.skipped.clone(),
            rejected: Vec::new(),
            dropped_fields: DroppedFieldCounts::default(),
            detail_retries: result.detail_retries,
            pages_fetched: result.pages_fetched,
            error: result.error.clone(),
            warnings: Vec::new(),
        }
    }

    pub fn failed(organization: Organization, error: impl Into<String>) -> Self {
        Self::from_crawl(&CrawlResult::failed(organization, error))
    }

    pub fn apply_stats(&mut self, stats: UpsertStats) {
        self.inserted = stats.inserted;
        self.updated = stats.updated;
        self.reactivated = stats.reactivated;
        self.retired = stats.retired;
        self.expired = stats.expired;
    }

    pub fn is_failed(&self) -> bool {
        self.status == CrawlStatus::Failed
    }
}

impl RunSummary {
    pub fn new(
        run_id: Uuid,
        started_at: DateTime<Utc>,
        mut sources: Vec<SourceSummary>,
    ) -> Self {
        sources.sort_by_key(|s| s.organization);
        let failures = sources
            .iter()
            .filter(|s| s.is_failed())
            .map(|s| SourceFailure {
                organization: s.organization,
                error: s.error.clone().unwrap_or_else(|| "unknown error".into()),
            })
            .collect();
        Self {
            run_id,
            started_at,
            finished_at: Utc::now(),
            sources,
            failures,
        }
    }

    #[cfg(test)]
    pub fn source(&self, organization: Organization) -> Option<&SourceSummary> {
        self.sources.iter().find(|s| s.organization == organization)
    }
}
