//! Match scoring: pluggable, trait-based scorer measuring a résumé against
//! job postings.
//!
//! Default: `KeywordMatchScorer` (vocabulary keyword overlap with an
//! experience adjustment). `AppState` holds an `Arc<dyn MatchScorer>`.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::AppError;
use crate::matching::vocabulary::SkillVocabulary;
use crate::models::job::Job;
use crate::models::resume::ResumeRow;

/// Jobs scored per blocking task.
const SCORING_CHUNK: usize = 256;

// ────────────────────────────────────────────────────────────────────────────
// Data models
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchLabel {
    #[serde(rename = "Excellent Match")]
    Excellent,
    #[serde(rename = "Good Match")]
    Good,
    #[serde(rename = "Fair Match")]
    Fair,
}

impl MatchLabel {
    pub fn for_score(score: f64) -> Self {
        if score >= 80.0 {
            MatchLabel::Excellent
        } else if score >= 60.0 {
            MatchLabel::Good
        } else {
            MatchLabel::Fair
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    pub job_id: i64,
    pub match_score: f64, // 0 to 100, one decimal
    pub label: MatchLabel,
    /// Most frequent in the posting first.
    pub matching_keywords: Vec<String>,
    pub missing_keywords: Vec<String>,
    /// Points subtracted for an experience shortfall.
    pub experience_penalty: f64,
    pub recommendation_text: String,
}

/// The résumé-side signal the scorer needs.
#[derive(Debug, Clone, Default)]
pub struct ResumeProfile {
    pub skills: BTreeSet<String>,
    pub experience_years: Option<u32>,
}

impl From<&ResumeRow> for ResumeProfile {
    fn from(row: &ResumeRow) -> Self {
        Self {
            skills: row.skills.iter().map(|s| s.trim().to_lowercase()).collect(),
            experience_years: row.experience_years.and_then(|y| u32::try_from(y).ok()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ScoredJob {
    pub job: Job,
    pub result: MatchResult,
}

// ────────────────────────────────────────────────────────────────────────────
// Trait definition
// ────────────────────────────────────────────────────────────────────────────

/// Implement this to swap scoring backends without touching handlers.
#[async_trait]
pub trait MatchScorer: Send + Sync {
    async fn score_all(
        &self,
        profile: &ResumeProfile,
        jobs: Vec<Job>,
    ) -> Result<Vec<ScoredJob>, AppError>;

    fn backend(&self) -> &'static str;
}

// ────────────────────────────────────────────────────────────────────────────
// KeywordMatchScorer
// ────────────────────────────────────────────────────────────────────────────

/// Keyword overlap scorer.
///
/// 1. Job keywords: vocabulary terms in title + category + description.
/// 2. base = 100 × |matching| / |job keywords| (0 for a job with no keywords)
/// 3. minus `penalty_per_year` per year of experience shortfall, capped at
///    `max_penalty`. An unknown résumé or job experience costs nothing.
/// 4. clamp to [0, 100], round to one decimal.
#[derive(Clone)]
pub struct KeywordMatchScorer {
    vocabulary: Arc<SkillVocabulary>,
    penalty_per_year: f64,
    max_penalty: f64,
}

impl KeywordMatchScorer {
    pub fn new(vocabulary: Arc<SkillVocabulary>) -> Self {
        Self {
            vocabulary,
            penalty_per_year: 5.0,
            max_penalty: 25.0,
        }
    }

    pub fn score_job(&self, profile: &ResumeProfile, job: &Job) -> MatchResult {
        let text = [
            job.title.as_str(),
            job.category.as_deref().unwrap_or_default(),
            job.description.as_str(),
        ]
        .join("\n");
        let keywords = self.vocabulary.extract_counts(&text);

        let (matching, missing): (Vec<_>, Vec<_>) = by_frequency(&keywords)
            .into_iter()
            .partition(|k| profile.skills.contains(k));

        let base = if keywords.is_empty() {
            0.0
        } else {
            100.0 * matching.len() as f64 / keywords.len() as f64
        };
        let penalty = self.experience_penalty(profile.experience_years, job.years_of_experience);
        let score = round1((base - penalty).clamp(0.0, 100.0));

        MatchResult {
            job_id: job.id,
            match_score: score,
            label: MatchLabel::for_score(score),
            matching_keywords: matching,
            missing_keywords: missing,
            experience_penalty: penalty,
            recommendation_text: String::new(),
        }
    }

    fn experience_penalty(&self, have: Option<u32>, required: Option<i32>) -> f64 {
        let (Some(have), Some(required)) = (have, required) else {
            return 0.0;
        };
        let shortfall = i64::from(required) - i64::from(have);
        if shortfall <= 0 {
            return 0.0;
        }
        (shortfall as f64 * self.penalty_per_year).min(self.max_penalty)
    }
}

#[async_trait]
impl MatchScorer for KeywordMatchScorer {
    async fn score_all(
        &self,
        profile: &ResumeProfile,
        jobs: Vec<Job>,
    ) -> Result<Vec<ScoredJob>, AppError> {
        let mut handles = Vec::new();
        let mut jobs = jobs.into_iter().peekable();
        while jobs.peek().is_some() {
            let chunk: Vec<Job> = jobs.by_ref().take(SCORING_CHUNK).collect();
            let scorer = self.clone();
            let profile = profile.clone();
            handles.push(tokio::task::spawn_blocking(move || {
                chunk
                    .into_iter()
                    .map(|job| {
                        let result = scorer.score_job(&profile, &job);
                        ScoredJob { job, result }
                    })
                    .collect::<Vec<_>>()
            }));
        }

        let mut scored = Vec::new();
        for handle in handles {
            let chunk = handle
                .await
                .map_err(|e| AppError::Internal(anyhow::anyhow!("scoring task failed: {e}")))?;
            scored.extend(chunk);
        }
        Ok(scored)
    }

    fn backend(&self) -> &'static str {
        "keyword"
    }
}

fn by_frequency(counts: &BTreeMap<String, usize>) -> Vec<String> {
    let mut keywords: Vec<(&String, &usize)> = counts.iter().collect();
    // BTreeMap order breaks ties alphabetically; the sort is stable.
    keywords.sort_by(|a, b| b.1.cmp(a.1));
    keywords.into_iter().map(|(k, _)| k.clone()).collect()
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
