use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Stored résumé with its derived signal. The uploaded bytes are not kept.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ResumeRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub filename: String,
    pub file_type: String,
    pub text: String,
    pub skills: Vec<String>,
    pub experience_years: Option<i32>,
    pub education_level: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

/// Listing view: everything but the raw text.
#[derive(Debug, Clone, Serialize)]
pub struct ResumeSummary {
    pub id: Uuid,
    pub user_id: Uuid,
    pub filename: String,
    pub file_type: String,
    pub skills: Vec<String>,
    pub experience_years: Option<i32>,
    pub education_level: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl From<ResumeRow> for ResumeSummary {
    fn from(row: ResumeRow) -> Self {
        Self {
            id: row.id,
            user_id: row.user_id,
            filename: row.filename,
            file_type: row.file_type,
            skills: row.skills,
            experience_years: row.experience_years,
            education_level: row.education_level,
            is_active: row.is_active,
            created_at: row.created_at,
        }
    }
}
