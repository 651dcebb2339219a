use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::ingestion::orchestrator::RunError;
use crate::ingestion::store::StoreError;
use crate::models::job::UnknownOrganization;
use crate::resume::parser::DocumentError;

/// Application-level error type.
/// Implements `IntoResponse` so Axum handlers can return `Result<T, AppError>`.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    /// The user has no active résumé to match against.
    #[error("No active résumé")]
    NoActiveResume,

    #[error("Document could not be parsed: {0}")]
    DocumentParse(String),

    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<StoreError> for AppError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Database(e) => AppError::Database(e),
            other => AppError::Internal(other.into()),
        }
    }
}

impl From<RunError> for AppError {
    fn from(e: RunError) -> Self {
        match e {
            RunError::NotRegistered(org) => {
                AppError::NotFound(format!("No extractor registered for {org}"))
            }
            RunError::Store(e) => e.into(),
        }
    }
}

impl From<UnknownOrganization> for AppError {
    fn from(e: UnknownOrganization) -> Self {
        AppError::Validation(e.to_string())
    }
}

impl From<DocumentError> for AppError {
    fn from(e: DocumentError) -> Self {
        match e {
            DocumentError::TooLarge { .. } => AppError::PayloadTooLarge(e.to_string()),
            other => AppError::DocumentParse(other.to_string()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone()),
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
            AppError::NoActiveResume => (
                StatusCode::CONFLICT,
                "NO_ACTIVE_RESUME",
                "No active résumé. Upload a résumé or activate one to get recommendations."
                    .to_string(),
            ),
            AppError::DocumentParse(msg) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "DOCUMENT_PARSE_ERROR",
                msg.clone(),
            ),
            AppError::PayloadTooLarge(msg) => {
                (StatusCode::PAYLOAD_TOO_LARGE, "PAYLOAD_TOO_LARGE", msg.clone())
            }
            AppError::Database(e) => {
                tracing::error!("Database error: {e}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "DATABASE_ERROR",
                    "A database error occurred".to_string(),
                )
            }
            AppError::Internal(e) => {
                tracing::error!("Internal error: {e:?}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal server error occurred".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": {
                "code": code,
                "message": message
            }
        }));

        (status, body).into_response()
    }
}
