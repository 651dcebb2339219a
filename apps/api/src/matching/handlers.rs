use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::errors::AppError;
use crate::matching::recommendations::{generate, Recommendation};
use crate::matching::scoring::ResumeProfile;
use crate::models::resume::ResumeRow;
use crate::resume::store::{get_active_resume, get_resume};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct RecommendationQuery {
    pub user_id: Uuid,
    pub limit: Option<usize>,
}

#[derive(Deserialize)]
pub struct LimitQuery {
    pub limit: Option<usize>,
}

#[derive(Serialize)]
pub struct RecommendationsResponse {
    pub resume_id: Uuid,
    pub scorer_backend: &'static str,
    pub jobs_considered: usize,
    pub recommendations: Vec<Recommendation>,
}

/// GET /api/v1/recommendations
/// Recommendations for the user's active résumé.
pub async fn handle_recommendations(
    State(state): State<AppState>,
    Query(params): Query<RecommendationQuery>,
) -> Result<Json<RecommendationsResponse>, AppError> {
    let resume = get_active_resume(&state.db, params.user_id)
        .await?
        .ok_or(AppError::NoActiveResume)?;
    recommend(&state, &resume, params.limit).await
}

/// GET /api/v1/resumes/:id/recommendations
pub async fn handle_resume_recommendations(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(params): Query<LimitQuery>,
) -> Result<Json<RecommendationsResponse>, AppError> {
    let resume = get_resume(&state.db, id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Résumé {id} not found")))?;
    recommend(&state, &resume, params.limit).await
}

async fn recommend(
    state: &AppState,
    resume: &ResumeRow,
    limit: Option<usize>,
) -> Result<Json<RecommendationsResponse>, AppError> {
    let jobs = state.jobs.active_jobs().await?;
    let jobs_considered = jobs.len();
    let profile = ResumeProfile::from(resume);

    let scored = state.scorer.score_all(&profile, jobs).await?;
    let max = state.config.max_recommendations;
    let recommendations = generate(scored, limit.unwrap_or(max).min(max));

    info!(
        "Scored {jobs_considered} jobs for résumé {}, returning {}",
        resume.id,
        recommendations.len()
    );
    Ok(Json(RecommendationsResponse {
        resume_id: resume.id,
        scorer_backend: state.scorer.backend(),
        jobs_considered,
        recommendations,
    }))
}
