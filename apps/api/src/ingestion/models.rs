use std::collections::BTreeMap;

use serde::Serialize;

use crate::models::job::Organization;

/// Candidate field names an extractor may emit. Anything else is ignored by
/// the normalizer.
pub mod field {
    pub const TITLE: &str = "title";
    pub const DESCRIPTION: &str = "description";
    pub const RESPONSIBILITIES: &str = "responsibilities";
    pub const QUALIFICATIONS: &str = "qualifications";
    pub const CATEGORY: &str = "category";
    pub const GRADE: &str = "grade";
    pub const CONTRACT_TYPE: &str = "contract_type";
    pub const LOCATION: &str = "location";
    pub const CITY: &str = "city";
    pub const COUNTRY: &str = "country";
    pub const DUTY_STATION: &str = "duty_station";
    pub const REMOTE: &str = "remote";
    pub const LANGUAGES: &str = "languages";
    pub const EDUCATION: &str = "education";
    pub const EXPERIENCE: &str = "experience";
    pub const APPLY_URL: &str = "apply_url";
    pub const DEADLINE: &str = "deadline";
    pub const POSTED_DATE: &str = "posted_date";
}

/// One discovered posting as scraped: a sorted map of field candidates plus
/// the two identifying fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RawRecord {
    pub source_id: String,
    pub source_url: String,
    pub fields: BTreeMap<String, String>,
}

impl RawRecord {
    #[cfg(test)]
    pub fn new(source_id: impl Into<String>, source_url: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
            source_url: source_url.into(),
            fields: BTreeMap::new(),
        }
    }

    /// Stores a trimmed, non-empty value. Blank candidates are not recorded.
    pub fn set(&mut self, name: &str, value: impl AsRef<str>) {
        let value = value.as_ref().trim();
        if !value.is_empty() {
            self.fields.insert(name.to_string(), value.to_string());
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CrawlStatus {
    Success,
    Partial,
    Failed,
}

/// A posting that was discovered but could not be turned into a raw record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedRecord {
    pub source_id: Option<String>,
    pub reason: String,
}

/// Result of one extractor run. Consumed immediately by the normalizer.
#[derive(Debug, Clone)]
pub struct CrawlResult {
    pub organization: Organization,
    pub status: CrawlStatus,
    pub records: Vec<RawRecord>,
    pub skipped: Vec<SkippedRecord>,
    pub error: Option<String>,
    pub detail_retries: u32,
    pub pages_fetched: u32,
}

impl CrawlResult {
    /// A source-level failure. Any records gathered before it are discarded.
    pub fn failed(organization: Organization, error: impl Into<String>) -> Self {
        Self {
            organization,
            status: CrawlStatus::Failed,
            records: Vec::new(),
            skipped: Vec::new(),
            error: Some(error.into()),
            detail_retries: 0,
            pages_fetched: 0,
        }
    }

    pub fn is_failed(&self) -> bool {
        self.status == CrawlStatus::Failed
    }

    /// Every source id the listing exposed, including skipped postings that
    /// carried one.
    pub fn seen_ids(&self) -> impl Iterator<Item = &str> {
        self.records
            .iter()
            .map(|r| r.source_id.as_str())
            .chain(self.skipped.iter().filter_map(|s| s.source_id.as_deref()))
    }
}
