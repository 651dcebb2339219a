use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::ingestion::fetch::RetryPolicy;
use crate::models::job::Organization;

const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;
const DEFAULT_USER_AGENT: &str = concat!("unjobs-crawler/", env!("CARGO_PKG_VERSION"));

/// Application configuration loaded from environment variables.
/// Startup fails if a required variable is missing or a value does not parse.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    pub rust_log: String,
    pub max_upload_bytes: usize,
    pub max_recommendations: usize,
    /// Extra skill terms appended to the built-in vocabulary.
    pub skill_vocabulary_extra: Vec<String>,
    pub crawl: CrawlSettings,
}

/// Crawl tuning, handed to the orchestrator at construction.
#[derive(Debug, Clone)]
pub struct CrawlSettings {
    /// Worker pool size. `None` means one worker per registered source.
    pub max_concurrency: Option<usize>,
    pub source_timeout: Duration,
    pub request_timeout: Duration,
    /// Retries after the first attempt, for detail pages only.
    pub detail_retries: u32,
    pub retry_base_delay: Duration,
    /// Minimum spacing between two requests to the same source.
    pub request_delay: Duration,
    pub max_pages: u32,
    pub user_agent: String,
    /// Empty means every shipped source.
    pub enabled_sources: Vec<Organization>,
}

impl Default for CrawlSettings {
    fn default() -> Self {
        Self {
            max_concurrency: None,
            source_timeout: Duration::from_secs(300),
            request_timeout: Duration::from_secs(30),
            detail_retries: 3,
            retry_base_delay: Duration::from_millis(500),
            request_delay: Duration::from_millis(500),
            max_pages: 5,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            enabled_sources: Vec::new(),
        }
    }
}

impl CrawlSettings {
    pub fn concurrency_for(&self, sources: usize) -> usize {
        self.max_concurrency.unwrap_or(sources).max(1)
    }

    pub fn detail_retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.detail_retries.saturating_add(1),
            base_delay: self.retry_base_delay,
        }
    }

    fn from_lookup(get: &impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();
        let enabled_sources = list(get, "ENABLED_SOURCES")
            .iter()
            .map(|name| {
                name.parse::<Organization>()
                    .with_context(|| "ENABLED_SOURCES contains an unknown organization")
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            max_concurrency: optional(get, "CRAWL_MAX_CONCURRENCY")?,
            source_timeout: Duration::from_secs(parsed_or(
                get,
                "CRAWL_SOURCE_TIMEOUT_SECS",
                defaults.source_timeout.as_secs(),
            )?),
            request_timeout: Duration::from_secs(parsed_or(
                get,
                "CRAWL_REQUEST_TIMEOUT_SECS",
                defaults.request_timeout.as_secs(),
            )?),
            detail_retries: parsed_or(get, "CRAWL_DETAIL_RETRIES", defaults.detail_retries)?,
            retry_base_delay: Duration::from_millis(parsed_or(
                get,
                "CRAWL_RETRY_BASE_DELAY_MS",
                500u64,
            )?),
            request_delay: Duration::from_millis(parsed_or(
                get,
                "CRAWL_REQUEST_DELAY_MS",
                500u64,
            )?),
            max_pages: parsed_or(get, "CRAWL_MAX_PAGES", defaults.max_pages)?,
            user_agent: get("CRAWL_USER_AGENT").unwrap_or(defaults.user_agent),
            enabled_sources,
        })
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing
        Self::from_lookup(&|key: &str| std::env::var(key).ok())
    }

    fn from_lookup(get: &impl Fn(&str) -> Option<String>) -> Result<Self> {
        Ok(Config {
            database_url: get("DATABASE_URL").with_context(|| {
                "Required environment variable 'DATABASE_URL' is not set".to_string()
            })?,
            port: parsed_or(get, "PORT", 8080u16).context("PORT must be a valid port number")?,
            rust_log: get("RUST_LOG").unwrap_or_else(|| "info".to_string()),
            max_upload_bytes: parsed_or(get, "MAX_UPLOAD_BYTES", DEFAULT_MAX_UPLOAD_BYTES)?,
            max_recommendations: parsed_or(get, "MAX_RECOMMENDATIONS", 20usize)?,
            skill_vocabulary_extra: list(get, "SKILL_VOCABULARY_EXTRA"),
            crawl: CrawlSettings::from_lookup(get)?,
        })
    }
}

fn parsed_or<T>(get: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    Ok(optional(get, key)?.unwrap_or(default))
}

fn optional<T>(get: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: Display,
{
    match get(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty()) {
        None => Ok(None),
        Some(raw) => raw
            .parse::<T>()
            .map(Some)
            .map_err(|e| anyhow::anyhow!("{key}='{raw}' is invalid: {e}")),
    }
}

fn list(get: &impl Fn(&str) -> Option<String>, key: &str) -> Vec<String> {
    get(key)
        .map(|raw| {
            raw.split(',')
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_apply() {
        let config = Config::from_lookup(&lookup(&[("DATABASE_URL", "postgres://localhost/jobs")])).unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.max_upload_bytes, 10 * 1024 * 1024);
        assert_eq!(config.max_recommendations, 20);
        assert_eq!(config.crawl.source_timeout, Duration::from_secs(300));
        assert_eq!(config.crawl.detail_retry_policy().max_attempts, 4);
        assert_eq!(config.crawl.request_delay, Duration::from_millis(500));
        assert!(config.crawl.enabled_sources.is_empty());
        assert_eq!(config.crawl.concurrency_for(4), 4);
    }

    #[test]
    fn test_missing_database_url_is_error() {
        assert!(Config::from_lookup(&lookup(&[])).is_err());
    }

    #[test]
    fn test_invalid_number_is_error() {
        let err = Config::from_lookup(&lookup(&[
            ("DATABASE_URL", "postgres://x"),
            ("CRAWL_MAX_PAGES", "many"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("CRAWL_MAX_PAGES"));
    }

    #[test]
    fn test_lists_parse() {
        let config = Config::from_lookup(&lookup(&[
            ("DATABASE_URL", "postgres://x"),
            ("ENABLED_SOURCES", "un, who"),
            ("SKILL_VOCABULARY_EXTRA", "gis, stata ,"),
            ("CRAWL_MAX_CONCURRENCY", "2"),
            ("CRAWL_REQUEST_DELAY_MS", "0"),
        ]))
        .unwrap();
        assert_eq!(
            config.crawl.enabled_sources,
            vec![Organization::Un, Organization::Who]
        );
        assert_eq!(config.skill_vocabulary_extra, vec!["gis", "stata"]);
        assert_eq!(config.crawl.concurrency_for(4), 2);
        assert_eq!(config.crawl.request_delay, Duration::ZERO);
    }

    #[test]
    fn test_unknown_enabled_source_is_error() {
        assert!(Config::from_lookup(&lookup(&[
            ("DATABASE_URL", "postgres://x"),
            ("ENABLED_SOURCES", "UN,NASA"),
        ]))
        .is_err());
    }
}
