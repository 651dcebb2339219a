use std::cmp::Ordering;

use serde::Serialize;

use crate::matching::scoring::{MatchResult, ScoredJob};
use crate::models::job::Job;

#[derive(Debug, Clone, Serialize)]
pub struct Recommendation {
    pub job: Job,
    #[serde(rename = "match")]
    pub result: MatchResult,
}

/// Score desc, then posted date desc (undated last), then natural key asc.
pub fn ranking_order(a: &ScoredJob, b: &ScoredJob) -> Ordering {
    b.result
        .match_score
        .total_cmp(&a.result.match_score)
        .then_with(|| match (a.job.posted_date, b.job.posted_date) {
            (Some(x), Some(y)) => y.cmp(&x),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        })
        .then_with(|| a.job.key().cmp(&b.job.key()))
}

/// Top `limit` jobs with a rationale attached. Deterministic for equal input.
pub fn generate(mut scored: Vec<ScoredJob>, limit: usize) -> Vec<Recommendation> {
    scored.sort_by(ranking_order);
    scored
        .into_iter()
        .take(limit)
        .map(|ScoredJob { job, mut result }| {
            result.recommendation_text = rationale(&result);
            Recommendation { job, result }
        })
        .collect()
}

/// One sentence naming up to three matching keywords and the top missing one.
pub fn rationale(result: &MatchResult) -> String {
    let top: Vec<&str> = result
        .matching_keywords
        .iter()
        .take(3)
        .map(String::as_str)
        .collect();
    let mut sentence = if top.is_empty() {
        "None of your listed skills appear in this posting".to_string()
    } else {
        format!("Matches your skills in {}", join_words(&top))
    };
    if let Some(missing) = result.missing_keywords.first() {
        sentence.push_str(&format!("; consider highlighting {missing}"));
    }
    sentence.push('.');
    sentence
}

fn join_words(words: &[&str]) -> String {
    match words {
        [] => String::new(),
        [only] => only.to_string(),
        [init @ .., last] => format!("{} and {last}", init.join(", ")),
    }
}
