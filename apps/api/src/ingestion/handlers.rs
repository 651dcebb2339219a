use axum::{
    extract::{Path, State},
    Json,
};
use tracing::info;

use crate::errors::AppError;
use crate::ingestion::summary::RunSummary;
use crate::models::job::Organization;
use crate::state::AppState;

/// POST /api/v1/crawl
pub async fn handle_crawl_all(
    State(state): State<AppState>,
) -> Result<Json<RunSummary>, AppError> {
    info!("Full crawl requested");
    let summary = state.orchestrator.run_all().await?;
    Ok(Json(summary))
}

/// POST /api/v1/crawl/:source
pub async fn handle_crawl_source(
    State(state): State<AppState>,
    Path(source): Path<String>,
) -> Result<Json<RunSummary>, AppError> {
    let organization: Organization = source.parse()?;
    info!("Crawl requested for {organization}");
    let summary = state.orchestrator.run_source(organization).await?;
    Ok(Json(summary))
}
