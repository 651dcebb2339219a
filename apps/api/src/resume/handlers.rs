use axum::{
    extract::{multipart::MultipartError, Multipart, Path, Query, State},
    http::{header::CONTENT_LENGTH, StatusCode},
    Json,
};
use bytes::Bytes;
use serde::Deserialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::resume::{ResumeRow, ResumeSummary};
use crate::resume::parser::parse_document;
use crate::resume::store::{activate_resume, delete_resume, get_resume, insert_resume, list_resumes};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct UserIdQuery {
    pub user_id: Uuid,
}

struct Upload {
    filename: String,
    declared_size: Option<usize>,
    bytes: Bytes,
}

fn multipart_error(e: MultipartError) -> AppError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::PayloadTooLarge(e.body_text())
    } else {
        AppError::Validation(e.body_text())
    }
}

/// POST /api/v1/resumes
/// Multipart form with `user_id` and `file` (PDF or DOCX).
pub async fn handle_upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<ResumeRow>), AppError> {
    let mut user_id = None;
    let mut upload = None;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("user_id") => {
                let raw = field.text().await.map_err(multipart_error)?;
                let parsed = raw.trim().parse::<Uuid>().map_err(|_| {
                    AppError::Validation(format!("user_id '{}' is not a valid UUID", raw.trim()))
                })?;
                user_id = Some(parsed);
            }
            Some("file") => {
                let filename = field.file_name().unwrap_or("upload").to_string();
                let declared_size = field
                    .headers()
                    .get(CONTENT_LENGTH)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.trim().parse().ok());
                let bytes = field.bytes().await.map_err(multipart_error)?;
                upload = Some(Upload {
                    filename,
                    declared_size,
                    bytes,
                });
            }
            _ => {}
        }
    }

    let user_id =
        user_id.ok_or_else(|| AppError::Validation("missing 'user_id' form field".into()))?;
    let upload = upload.ok_or_else(|| AppError::Validation("missing 'file' form field".into()))?;

    let vocabulary = state.vocabulary.clone();
    let limit = state.config.max_upload_bytes;
    let filename = upload.filename.clone();
    let parsed = tokio::task::spawn_blocking(move || {
        parse_document(
            &upload.filename,
            upload.declared_size,
            &upload.bytes,
            limit,
            &vocabulary,
        )
    })
    .await
    .map_err(|e| AppError::Internal(anyhow::anyhow!("résumé parsing task failed: {e}")))?;

    let parsed = match parsed {
        Ok(parsed) => parsed,
        Err(e) => {
            warn!("Rejected résumé '{filename}' for user {user_id}: {e}");
            return Err(e.into());
        }
    };

    let row = insert_resume(&state.db, user_id, &filename, &parsed).await?;
    Ok((StatusCode::CREATED, Json(row)))
}

/// GET /api/v1/resumes
pub async fn handle_list_resumes(
    State(state): State<AppState>,
    Query(params): Query<UserIdQuery>,
) -> Result<Json<Vec<ResumeSummary>>, AppError> {
    let rows = list_resumes(&state.db, params.user_id).await?;
    Ok(Json(rows.into_iter().map(ResumeSummary::from).collect()))
}

/// GET /api/v1/resumes/:id
pub async fn handle_get_resume(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ResumeRow>, AppError> {
    let row = get_resume(&state.db, id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Résumé {id} not found")))?;
    Ok(Json(row))
}

/// PATCH /api/v1/resumes/:id/activate
pub async fn handle_activate_resume(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ResumeSummary>, AppError> {
    let row = activate_resume(&state.db, id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Résumé {id} not found")))?;
    info!("Résumé {id} is now active for user {}", row.user_id);
    Ok(Json(row.into()))
}

/// DELETE /api/v1/resumes/:id
pub async fn handle_delete_resume(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    if !delete_resume(&state.db, id).await? {
        return Err(AppError::NotFound(format!("Résumé {id} not found")));
    }
    info!("Deleted résumé {id}");
    Ok(StatusCode::NO_CONTENT)
}
