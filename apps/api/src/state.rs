use std::sync::Arc;

use sqlx::PgPool;

use crate::config::Config;
use crate::ingestion::orchestrator::Orchestrator;
use crate::ingestion::store::JobStore;
use crate::matching::scoring::MatchScorer;
use crate::matching::vocabulary::SkillVocabulary;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    /// Résumé storage.
    pub db: PgPool,
    pub config: Config,
    /// Job corpus. Postgres in production.
    pub jobs: Arc<dyn JobStore>,
    pub orchestrator: Arc<Orchestrator>,
    /// Pluggable scorer. Default: KeywordMatchScorer.
    pub scorer: Arc<dyn MatchScorer>,
    /// Shared by résumé parsing and job keyword extraction.
    pub vocabulary: Arc<SkillVocabulary>,
}
