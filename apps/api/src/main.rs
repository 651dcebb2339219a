mod config;
mod db;
mod errors;
mod ingestion;
mod matching;
mod models;
mod resume;
mod routes;
mod state;
mod text;

use anyhow::Result;
use std::net::SocketAddr;
use tokio::sync::watch;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use std::sync::Arc;

use crate::config::Config;
use crate::db::{create_pool, MAX_CONNECTIONS};
use crate::ingestion::fetch::HttpFetcher;
use crate::ingestion::orchestrator::Orchestrator;
use crate::ingestion::sources::SourceRegistry;
use crate::ingestion::store::PgJobStore;
use crate::ingestion::upsert::UpsertEngine;
use crate::matching::scoring::KeywordMatchScorer;
use crate::matching::vocabulary::SkillVocabulary;
use crate::routes::build_router;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on missing or malformed env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_PKG_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting UN jobs API v{}", env!("CARGO_PKG_VERSION"));

    // Initialize PostgreSQL
    let db = create_pool(&config.database_url).await?;
    let jobs = Arc::new(PgJobStore::new(db.clone()));

    // Initialize the crawl pipeline
    let registry = SourceRegistry::from_enabled(&config.crawl.enabled_sources);
    info!("Registered sources: {:?}", registry.organizations());
    let fetcher = HttpFetcher::new(config.crawl.request_timeout, &config.crawl.user_agent)?;
    let engine = UpsertEngine::new(jobs.clone(), (MAX_CONNECTIONS / 2) as usize);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let orchestrator = Orchestrator::new(
        registry,
        Arc::new(fetcher),
        engine,
        config.crawl.clone(),
        shutdown_rx,
    );

    // Initialize matching (KeywordMatchScorer by default)
    let vocabulary = Arc::new(SkillVocabulary::with_extra_terms(
        &config.skill_vocabulary_extra,
    ));
    info!("Skill vocabulary: {} terms", vocabulary.len());
    let scorer = Arc::new(KeywordMatchScorer::new(vocabulary.clone()));

    // Build app state
    let state = AppState {
        db,
        config: config.clone(),
        jobs,
        orchestrator: Arc::new(orchestrator),
        scorer,
        vocabulary,
    };

    // Build router
    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown_tx))
        .await?;

    info!("Server stopped");
    Ok(())
}

/// Waits for Ctrl-C or SIGTERM, then tells in-flight crawls to stop.
async fn shutdown_signal(crawls: watch::Sender<bool>) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Could not listen for Ctrl-C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown requested, cancelling in-flight crawls");
    let _ = crawls.send(true);
}
