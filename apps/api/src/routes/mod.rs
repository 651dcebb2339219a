pub mod health;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, patch, post},
    Router,
};

use crate::ingestion::handlers as ingestion;
use crate::matching::handlers as matching;
use crate::resume::handlers as resume;
use crate::state::AppState;

/// Room for multipart boundaries and the other form fields on top of the file.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

pub fn build_router(state: AppState) -> Router {
    let upload_limit = state.config.max_upload_bytes + MULTIPART_OVERHEAD;

    Router::new()
        .route("/health", get(health::health_handler))
        // Ingestion
        .route("/api/v1/crawl", post(ingestion::handle_crawl_all))
        .route("/api/v1/crawl/:source", post(ingestion::handle_crawl_source))
        // Résumés
        .route(
            "/api/v1/resumes",
            get(resume::handle_list_resumes)
                .post(resume::handle_upload)
                .layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route(
            "/api/v1/resumes/:id",
            get(resume::handle_get_resume).delete(resume::handle_delete_resume),
        )
        .route(
            "/api/v1/resumes/:id/activate",
            patch(resume::handle_activate_resume),
        )
        // Matching
        .route(
            "/api/v1/resumes/:id/recommendations",
            get(matching::handle_resume_recommendations),
        )
        .route(
            "/api/v1/recommendations",
            get(matching::handle_recommendations),
        )
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use serde_json::Value;
    use sqlx::postgres::PgPoolOptions;
    use tokio::sync::watch;
    use tower::ServiceExt;

    use super::*;
    use crate::config::{Config, CrawlSettings};
    use crate::ingestion::fetch::testing::FakeFetcher;
    use crate::ingestion::orchestrator::Orchestrator;
    use crate::ingestion::sources::{un_careers::UnCareersExtractor, SourceRegistry};
    use crate::ingestion::store::memory::MemoryJobStore;
    use crate::ingestion::upsert::UpsertEngine;
    use crate::matching::scoring::KeywordMatchScorer;
    use crate::matching::vocabulary::SkillVocabulary;

    fn test_state() -> AppState {
        let config = Config {
            database_url: "postgres://postgres@localhost/unjobs_test".into(),
            port: 0,
            rust_log: "debug".into(),
            max_upload_bytes: 16,
            max_recommendations: 20,
            skill_vocabulary_extra: Vec::new(),
            crawl: CrawlSettings::default(),
        };
        // Never connects unless a handler touches the database.
        let db = PgPoolOptions::new()
            .connect_lazy(&config.database_url)
            .unwrap();
        let jobs = Arc::new(MemoryJobStore::new());
        let (_tx, shutdown) = watch::channel(false);
        let registry =
            SourceRegistry::new().register(Arc::new(UnCareersExtractor::new("https://careers.test")));
        let orchestrator = Orchestrator::new(
            registry,
            Arc::new(FakeFetcher::new()),
            UpsertEngine::new(jobs.clone(), 2),
            config.crawl.clone(),
            shutdown,
        );
        let vocabulary = Arc::new(SkillVocabulary::curated());
        AppState {
            db,
            config,
            jobs,
            orchestrator: Arc::new(orchestrator),
            scorer: Arc::new(KeywordMatchScorer::new(vocabulary.clone())),
            vocabulary,
        }
    }

    async fn send(request: Request<Body>) -> (StatusCode, Value) {
        let response = build_router(test_state()).oneshot(request).await.unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = serde_json::from_slice(&body).unwrap_or(Value::Null);
        (status, json)
    }

    fn post(uri: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .body(Body::empty())
            .unwrap()
    }

    fn upload(filename: &str, contents: &str) -> Request<Body> {
        let body = format!(
            "--XBOUNDARY\r\n\
             Content-Disposition: form-data; name=\"user_id\"\r\n\r\n\
             6f1c1bde-2a57-4bfb-9c55-2d0f1f5a8a11\r\n\
             --XBOUNDARY\r\n\
             Content-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\n\
             Content-Type: application/octet-stream\r\n\r\n\
             {contents}\r\n\
             --XBOUNDARY--\r\n"
        );
        Request::builder()
            .method("POST")
            .uri("/api/v1/resumes")
            .header("content-type", "multipart/form-data; boundary=XBOUNDARY")
            .body(Body::from(body))
            .unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
        let (status, body) = send(request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["service"], "unjobs-api");
    }

    #[tokio::test]
    async fn test_crawl_unknown_organization_is_bad_request() {
        let (status, body) = send(post("/api/v1/crawl/nasa")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_crawl_unregistered_source_is_not_found() {
        let (status, _) = send(post("/api/v1/crawl/fao")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_crawl_reports_source_failures_in_summary() {
        let (status, body) = send(post("/api/v1/crawl")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["failures"].as_array().map(Vec::len), Some(1));
        assert_eq!(body["failures"][0]["organization"], "UN");
        assert_eq!(body["sources"][0]["status"], "failed");
    }

    #[tokio::test]
    async fn test_recommendations_require_user_id() {
        let request = Request::builder()
            .uri("/api/v1/recommendations")
            .body(Body::empty())
            .unwrap();
        let (status, _) = send(request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_oversized_resume_rejected() {
        let (status, body) = send(upload("cv.txt", &"a".repeat(64))).await;
        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(body["error"]["code"], "PAYLOAD_TOO_LARGE");
    }

    #[tokio::test]
    async fn test_unsupported_resume_rejected() {
        let (status, body) = send(upload("cv.odt", "odt")).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["error"]["code"], "DOCUMENT_PARSE_ERROR");
    }
}
