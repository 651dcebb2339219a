//! WHO careers JSON API. The listing carries every field, so there is no
//! detail fetch.

use serde::Deserialize;
use serde_json::Value;

use crate::ingestion::extractor::{ExtractError, ListingEntry, ListingPage, SourceExtractor};
use crate::ingestion::models::{field, SkippedRecord};
use crate::models::job::Organization;

pub const DEFAULT_BASE_URL: &str = "https://careers.who.int";
const PAGE_SIZE: u64 = 50;

pub struct WhoExtractor {
    base_url: String,
}

impl WhoExtractor {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ApiPage {
    #[serde(default)]
    jobs: Vec<Value>,
    total: Option<u64>,
    page: Option<u64>,
    size: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct ApiJob {
    title: Option<String>,
    description: Option<String>,
    responsibilities: Option<String>,
    qualifications: Option<String>,
    location: Option<String>,
    city: Option<String>,
    country: Option<String>,
    grade: Option<String>,
    contract_type: Option<String>,
    category: Option<String>,
    deadline: Option<String>,
    posted_date: Option<String>,
    apply_url: Option<String>,
    url: Option<String>,
    languages: Option<Value>,
    remote: Option<Value>,
    years_of_experience: Option<Value>,
    education: Option<String>,
}

impl SourceExtractor for WhoExtractor {
    fn organization(&self) -> Organization {
        Organization::Who
    }

    fn listing_url(&self, page: u32) -> Option<String> {
        Some(format!(
            "{}/api/jobs?page={page}&size={PAGE_SIZE}",
            self.base_url
        ))
    }

    fn parse_listing(&self, body: &str) -> Result<ListingPage, ExtractError> {
        let api: ApiPage = serde_json::from_str(body)
            .map_err(|e| ExtractError::Listing(format!("invalid WHO API response: {e}")))?;

        let has_next = match (api.total, api.page, api.size) {
            (Some(total), Some(page), Some(size)) => page.saturating_mul(size) < total,
            _ => api.jobs.len() as u64 >= PAGE_SIZE,
        };

        let mut page = ListingPage {
            has_next,
            ..ListingPage::default()
        };
        for raw in api.jobs {
            let source_id = raw.get("id").and_then(scalar_to_string);
            let Some(source_id) = source_id else {
                page.skipped.push(SkippedRecord {
                    source_id: None,
                    reason: "API job without an id".into(),
                });
                continue;
            };
            match serde_json::from_value::<ApiJob>(raw) {
                Ok(job) => page.entries.push(self.to_entry(source_id, job)),
                Err(e) => page.skipped.push(SkippedRecord {
                    source_id: Some(source_id),
                    reason: format!("malformed API job: {e}"),
                }),
            }
        }

        Ok(page)
    }
}

impl WhoExtractor {
    fn to_entry(&self, source_id: String, job: ApiJob) -> ListingEntry {
        let url = job
            .url
            .clone()
            .unwrap_or_else(|| format!("{}/jobs/{source_id}", self.base_url));
        let mut entry = ListingEntry::new(source_id, url);

        let text_fields = [
            (field::TITLE, job.title),
            (field::DESCRIPTION, job.description),
            (field::RESPONSIBILITIES, job.responsibilities),
            (field::QUALIFICATIONS, job.qualifications),
            (field::LOCATION, job.location),
            (field::CITY, job.city),
            (field::COUNTRY, job.country),
            (field::GRADE, job.grade),
            (field::CONTRACT_TYPE, job.contract_type),
            (field::CATEGORY, job.category),
            (field::DEADLINE, job.deadline),
            (field::POSTED_DATE, job.posted_date),
            (field::APPLY_URL, job.apply_url),
            (field::EDUCATION, job.education),
        ];
        for (name, value) in text_fields {
            if let Some(value) = value {
                entry.set(name, value);
            }
        }

        if let Some(languages) = job.languages.as_ref().and_then(render_languages) {
            entry.set(field::LANGUAGES, languages);
        }
        if let Some(remote) = job.remote.as_ref().and_then(scalar_to_string) {
            entry.set(field::REMOTE, remote);
        }
        if let Some(years) = job.years_of_experience.as_ref().and_then(scalar_to_string) {
            entry.set(field::EXPERIENCE, years);
        }
        entry
    }
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Renders the API's language shapes as "Language: level; Language: level".
fn render_languages(value: &Value) -> Option<String> {
    let pairs: Vec<String> = match value {
        Value::String(s) => return Some(s.clone()),
        Value::Object(map) => map
            .iter()
            .filter_map(|(lang, level)| scalar_to_string(level).map(|l| format!("{lang}: {l}")))
            .collect(),
        Value::Array(items) => items
            .iter()
            .filter_map(|item| match item {
                Value::String(lang) => Some(lang.clone()),
                Value::Object(obj) => {
                    let lang = obj
                        .get("language")
                        .or_else(|| obj.get("name"))
                        .and_then(scalar_to_string)?;
                    match obj
                        .get("level")
                        .or_else(|| obj.get("proficiency"))
                        .and_then(scalar_to_string)
                    {
                        Some(level) => Some(format!("{lang}: {level}")),
                        None => Some(lang),
                    }
                }
                _ => None,
            })
            .collect(),
        _ => return None,
    };
    (!pairs.is_empty()).then(|| pairs.join("; "))
}
