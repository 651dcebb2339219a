use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;

/// Known UN-system entities whose career sites feed the corpus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Organization {
    Un,
    Undp,
    Unicef,
    Who,
    Ilo,
    Fao,
    Unops,
    Unhcr,
    Wfp,
    Unfpa,
    Unesco,
}

impl Organization {
    pub const ALL: [Organization; 11] = [
        Organization::Un,
        Organization::Undp,
        Organization::Unicef,
        Organization::Who,
        Organization::Ilo,
        Organization::Fao,
        Organization::Unops,
        Organization::Unhcr,
        Organization::Wfp,
        Organization::Unfpa,
        Organization::Unesco,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Organization::Un => "UN",
            Organization::Undp => "UNDP",
            Organization::Unicef => "UNICEF",
            Organization::Who => "WHO",
            Organization::Ilo => "ILO",
            Organization::Fao => "FAO",
            Organization::Unops => "UNOPS",
            Organization::Unhcr => "UNHCR",
            Organization::Wfp => "WFP",
            Organization::Unfpa => "UNFPA",
            Organization::Unesco => "UNESCO",
        }
    }
}

impl fmt::Display for Organization {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownOrganization(pub String);

impl fmt::Display for UnknownOrganization {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown organization '{}'", self.0)
    }
}

impl std::error::Error for UnknownOrganization {}

impl FromStr for Organization {
    type Err = UnknownOrganization;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Organization::ALL
            .into_iter()
            .find(|org| org.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| UnknownOrganization(wanted.to_string()))
    }
}

/// Natural key of a posting: stable across re-crawls of the same source.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct JobKey {
    pub organization: String,
    pub source_id: String,
}

impl JobKey {
    pub fn new(organization: Organization, source_id: impl Into<String>) -> Self {
        Self {
            organization: organization.as_str().to_string(),
            source_id: source_id.into(),
        }
    }
}

impl fmt::Display for JobKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.organization, self.source_id)
    }
}

/// Stored, canonical job posting.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Job {
    pub id: i64,
    pub source_id: String,
    pub organization: String,
    pub title: String,
    pub description: String,
    pub responsibilities: Option<String>,
    pub qualifications: Option<String>,
    pub category: Option<String>,
    pub grade: Option<String>,
    pub contract_type: Option<String>,
    pub location: Option<String>,
    pub duty_station: Option<String>,
    pub remote_eligible: bool,
    pub language_requirements: Json<BTreeMap<String, String>>,
    pub education_level: Option<String>,
    pub years_of_experience: Option<i32>,
    pub apply_url: String,
    pub deadline: Option<NaiveDate>,
    pub posted_date: Option<NaiveDate>,
    pub source_url: String,
    pub is_active: bool,
    pub last_scraped: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    pub fn key(&self) -> JobKey {
        JobKey {
            organization: self.organization.clone(),
            source_id: self.source_id.clone(),
        }
    }
}

/// Output of the normalizer: every canonical field, before the store assigns
/// identity and timestamps.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobCandidate {
    pub source_id: String,
    pub organization: Organization,
    pub title: String,
    pub description: String,
    pub responsibilities: Option<String>,
    pub qualifications: Option<String>,
    pub category: Option<String>,
    pub grade: Option<String>,
    pub contract_type: Option<String>,
    pub location: Option<String>,
    pub duty_station: Option<String>,
    pub remote_eligible: bool,
    pub language_requirements: BTreeMap<String, String>,
    pub education_level: Option<String>,
    pub years_of_experience: Option<u32>,
    pub apply_url: String,
    pub deadline: Option<NaiveDate>,
    pub posted_date: Option<NaiveDate>,
    pub source_url: String,
}

impl JobCandidate {
    pub fn key(&self) -> JobKey {
        JobKey::new(self.organization, self.source_id.clone())
    }
}
