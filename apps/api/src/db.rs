use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::info;

pub const MAX_CONNECTIONS: u32 = 10;

/// Creates the PostgreSQL pool shared by the job corpus and résumé storage.
pub async fn create_pool(database_url: &str) -> Result<PgPool> {
    info!("Connecting to PostgreSQL...");

    let pool = PgPoolOptions::new()
        .max_connections(MAX_CONNECTIONS)
        .connect(database_url)
        .await
        .context("could not connect to DATABASE_URL")?;

    info!("PostgreSQL connection pool established ({MAX_CONNECTIONS} connections)");
    Ok(pool)
}
