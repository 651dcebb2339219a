//! Source extractor contract and the per-source crawl loop.
//!
//! An extractor knows one career site: how its listing pages paginate, how to
//! read a listing into entries, and (optionally) how to read a posting's
//! detail page. It never touches the network itself. `crawl_source` drives
//! an extractor against a `PageFetcher` and produces one `CrawlResult`.

use std::collections::BTreeMap;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::ingestion::fetch::{fetch_with_retry, FetchError, PacedFetcher, PageFetcher, RetryPolicy};
use crate::ingestion::models::{CrawlResult, CrawlStatus, RawRecord, SkippedRecord};
use crate::models::job::Organization;

// ────────────────────────────────────────────────────────────────────────────
// Errors
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ExtractError {
    /// Listing page could not be fetched. Fatal for the source's run.
    #[error("source unreachable: {source}")]
    SourceUnreachable {
        url: String,
        #[source]
        source: FetchError,
    },

    /// Listing page fetched but not understood. Fatal for the source's run.
    #[error("listing could not be parsed: {0}")]
    Listing(String),

    /// One posting could not be parsed. The posting is skipped.
    #[error("record {source_id} could not be parsed: {reason}")]
    RecordParse { source_id: String, reason: String },
}

impl ExtractError {
    pub fn record(source_id: &str, reason: impl Into<String>) -> Self {
        ExtractError::RecordParse {
            source_id: source_id.to_string(),
            reason: reason.into(),
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Listing shapes
// ────────────────────────────────────────────────────────────────────────────

/// One posting as seen on a listing page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingEntry {
    pub source_id: String,
    pub url: String,
    pub fields: BTreeMap<String, String>,
}

impl ListingEntry {
    pub fn new(source_id: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
            url: url.into(),
            fields: BTreeMap::new(),
        }
    }

    pub fn set(&mut self, name: &str, value: impl AsRef<str>) {
        let value = value.as_ref().trim();
        if !value.is_empty() {
            self.fields.insert(name.to_string(), value.to_string());
        }
    }

    /// Raw record carrying only what the listing exposed.
    pub fn to_record(&self) -> RawRecord {
        RawRecord {
            source_id: self.source_id.clone(),
            source_url: self.url.clone(),
            fields: self.fields.clone(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ListingPage {
    pub entries: Vec<ListingEntry>,
    /// Whether the site advertises another page after this one.
    pub has_next: bool,
    /// Listing items that could not even yield an entry.
    pub skipped: Vec<SkippedRecord>,
}

// ────────────────────────────────────────────────────────────────────────────
// Trait definition
// ────────────────────────────────────────────────────────────────────────────

pub trait SourceExtractor: Send + Sync {
    fn organization(&self) -> Organization;

    /// URL of the 1-based listing page `page`, or `None` past the last page
    /// the site can have (single-page sources return `None` for page 2).
    fn listing_url(&self, page: u32) -> Option<String>;

    fn parse_listing(&self, body: &str) -> Result<ListingPage, ExtractError>;

    /// Detail page for an entry. Listing-only sources keep the default.
    fn detail_url(&self, _entry: &ListingEntry) -> Option<String> {
        None
    }

    fn parse_detail(&self, entry: &ListingEntry, _body: &str) -> Result<RawRecord, ExtractError> {
        Ok(entry.to_record())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CrawlLimits {
    pub max_pages: u32,
    pub detail_retry: RetryPolicy,
    /// Spacing between requests to the source, retries included.
    pub request_delay: Duration,
}

// ────────────────────────────────────────────────────────────────────────────
// Crawl loop
// ────────────────────────────────────────────────────────────────────────────

/// Crawls one source to completion. Listing failures fail the whole source
/// and discard what was gathered; detail failures become skipped records.
pub async fn crawl_source(
    extractor: &dyn SourceExtractor,
    fetcher: &dyn PageFetcher,
    limits: CrawlLimits,
) -> CrawlResult {
    let organization = extractor.organization();
    let paced = PacedFetcher::new(fetcher, limits.request_delay);
    match crawl_pages(extractor, &paced, limits).await {
        Ok(result) => {
            info!(
                "{organization}: {} records, {} skipped over {} pages",
                result.records.len(),
                result.skipped.len(),
                result.pages_fetched
            );
            result
        }
        Err(e) => {
            warn!("{organization}: crawl failed: {e}");
            CrawlResult::failed(organization, e.to_string())
        }
    }
}

async fn crawl_pages(
    extractor: &dyn SourceExtractor,
    fetcher: &dyn PageFetcher,
    limits: CrawlLimits,
) -> Result<CrawlResult, ExtractError> {
    let organization = extractor.organization();
    let mut records = Vec::new();
    let mut skipped = Vec::new();
    let mut detail_retries = 0;
    let mut pages_fetched = 0;

    for page in 1..=limits.max_pages.max(1) {
        let Some(url) = extractor.listing_url(page) else {
            break;
        };

        // Listing pages are never retried within a run.
        let body = fetcher
            .fetch(&url)
            .await
            .map_err(|source| ExtractError::SourceUnreachable {
                url: url.clone(),
                source,
            })?;
        pages_fetched += 1;

        let listing = extractor.parse_listing(&body)?;
        debug!(
            "{organization}: page {page} has {} entries",
            listing.entries.len()
        );
        skipped.extend(listing.skipped);
        if listing.entries.is_empty() {
            break;
        }

        for entry in &listing.entries {
            match extract_entry(extractor, fetcher, entry, limits.detail_retry).await {
                (Ok(record), retries) => {
                    detail_retries += retries;
                    records.push(record);
                }
                (Err(reason), retries) => {
                    detail_retries += retries;
                    warn!("{organization}: skipping {}: {reason}", entry.source_id);
                    skipped.push(SkippedRecord {
                        source_id: Some(entry.source_id.clone()),
                        reason,
                    });
                }
            }
        }

        if !listing.has_next {
            break;
        }
    }

    let status = if skipped.is_empty() {
        CrawlStatus::Success
    } else {
        CrawlStatus::Partial
    };

    Ok(CrawlResult {
        organization,
        status,
        records,
        skipped,
        error: None,
        detail_retries,
        pages_fetched,
    })
}

async fn extract_entry(
    extractor: &dyn SourceExtractor,
    fetcher: &dyn PageFetcher,
    entry: &ListingEntry,
    retry: RetryPolicy,
) -> (Result<RawRecord, String>, u32) {
    let Some(url) = extractor.detail_url(entry) else {
        return (Ok(entry.to_record()), 0);
    };

    let fetched = fetch_with_retry(fetcher, &url, retry).await;
    let outcome = fetched
        .outcome
        .map_err(|e| e.to_string())
        .and_then(|body| {
            extractor
                .parse_detail(entry, &body)
                .map_err(|e| e.to_string())
        });
    (outcome, fetched.retries)
}
