//! Page fetching for extractors.
//!
//! `PageFetcher` is the seam between network and parsing: extractors only see
//! response bodies, so every parser can be exercised from fixtures with a fake
//! fetcher. `fetch_with_retry` wraps detail-page fetches with bounded
//! exponential backoff and reports how many retries it spent. `PacedFetcher`
//! spaces the requests one source sends to its site.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    #[error("request to {url} timed out")]
    Timeout { url: String },

    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("transport error for {url}: {message}")]
    Transport { url: String, message: String },
}

impl FetchError {
    /// Timeouts, transport failures, 429 and 5xx are worth another attempt.
    pub fn is_transient(&self) -> bool {
        match self {
            FetchError::Timeout { .. } | FetchError::Transport { .. } => true,
            FetchError::Status { status, .. } => *status == 429 || *status >= 500,
        }
    }
}

#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<String, FetchError>;
}

// ────────────────────────────────────────────────────────────────────────────
// HTTP implementation
// ────────────────────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration, user_agent: &str) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        let to_error = |e: reqwest::Error| {
            if e.is_timeout() {
                FetchError::Timeout {
                    url: url.to_string(),
                }
            } else {
                FetchError::Transport {
                    url: url.to_string(),
                    message: e.to_string(),
                }
            }
        };

        let response = self.client.get(url).send().await.map_err(to_error)?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response.text().await.map_err(to_error)?;
        debug!("Fetched {url} ({} bytes)", body.len());
        Ok(body)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Per-source pacing
// ────────────────────────────────────────────────────────────────────────────

/// Wraps a fetcher so consecutive requests start at least `interval` apart.
/// Retries count as requests. One instance per source crawl.
pub struct PacedFetcher<'a> {
    inner: &'a dyn PageFetcher,
    interval: Duration,
    last_request: Mutex<Option<Instant>>,
}

impl<'a> PacedFetcher<'a> {
    pub fn new(inner: &'a dyn PageFetcher, interval: Duration) -> Self {
        Self {
            inner,
            interval,
            last_request: Mutex::new(None),
        }
    }
}

#[async_trait]
impl<'a> PageFetcher for PacedFetcher<'a> {
    async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        {
            // Held across the wait so concurrent callers queue up behind it.
            let mut last = self.last_request.lock().await;
            if let Some(previous) = *last {
                tokio::time::sleep_until(previous + self.interval).await;
            }
            *last = Some(Instant::now());
        }
        self.inner.fetch(url).await
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Bounded retry
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts including the first one. Zero behaves like one.
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn delay_for(&self, retry: u32) -> Duration {
        // retry 1 → base, retry 2 → 2×base, retry 3 → 4×base
        self.base_delay * 2u32.saturating_pow(retry.saturating_sub(1))
    }
}

/// Outcome of a retried fetch plus the number of retries spent on it.
#[derive(Debug)]
pub struct Fetched {
    pub outcome: Result<String, FetchError>,
    pub retries: u32,
}

pub async fn fetch_with_retry(
    fetcher: &dyn PageFetcher,
    url: &str,
    policy: RetryPolicy,
) -> Fetched {
    let attempts = policy.max_attempts.max(1);
    let mut retries = 0;

    loop {
        match fetcher.fetch(url).await {
            Ok(body) => {
                return Fetched {
                    outcome: Ok(body),
                    retries,
                }
            }
            Err(e) if e.is_transient() && retries + 1 < attempts => {
                retries += 1;
                let delay = policy.delay_for(retries);
                warn!(
                    "Fetch of {url} failed ({e}), retry {retries} after {}ms",
                    delay.as_millis()
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => {
                return Fetched {
                    outcome: Err(e),
                    retries,
                }
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use super::*;

    /// Serves canned bodies by URL. Each URL holds a queue of responses; the
    /// last one repeats once the queue is drained. Unknown URLs return 404.
    #[derive(Default)]
    pub struct FakeFetcher {
        responses: Mutex<HashMap<String, Vec<Result<String, FetchError>>>>,
        calls: Mutex<Vec<String>>,
    }

    impl FakeFetcher {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn page(self, url: &str, body: &str) -> Self {
            self.push(url, Ok(body.to_string()))
        }

        pub fn error(self, url: &str, error: FetchError) -> Self {
            self.push(url, Err(error))
        }

        fn push(self, url: &str, response: Result<String, FetchError>) -> Self {
            if let Ok(mut map) = self.responses.lock() {
                map.entry(url.to_string()).or_default().push(response);
            }
            self
        }

        pub fn calls_to(&self, url: &str) -> usize {
            self.calls
                .lock()
                .map(|calls| calls.iter().filter(|c| c.as_str() == url).count())
                .unwrap_or(0)
        }
    }

    #[async_trait]
    impl PageFetcher for FakeFetcher {
        async fn fetch(&self, url: &str) -> Result<String, FetchError> {
            if let Ok(mut calls) = self.calls.lock() {
                calls.push(url.to_string());
            }
            let mut map = self.responses.lock().map_err(|_| FetchError::Transport {
                url: url.to_string(),
                message: "poisoned".into(),
            })?;
            match map.get_mut(url) {
                Some(queue) if queue.len() > 1 => queue.remove(0),
                Some(queue) if queue.len() == 1 => queue[0].clone(),
                _ => Err(FetchError::Status {
                    url: url.to_string(),
                    status: 404,
                }),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::FakeFetcher;
    use super::*;

    fn policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay: Duration::from_millis(1),
        }
    }

    #[test]
    fn test_transient_classification() {
        let status = |status| FetchError::Status {
            url: "u".into(),
            status,
        };
        assert!(status(503).is_transient());
        assert!(status(429).is_transient());
        assert!(!status(404).is_transient());
        assert!(FetchError::Timeout { url: "u".into() }.is_transient());
    }

    #[test]
    fn test_backoff_doubles() {
        let p = RetryPolicy {
            max_attempts: 4,
            base_delay: Duration::from_millis(500),
        };
        assert_eq!(p.delay_for(1), Duration::from_millis(500));
        assert_eq!(p.delay_for(2), Duration::from_millis(1000));
        assert_eq!(p.delay_for(3), Duration::from_millis(2000));
    }

    #[tokio::test]
    async fn test_retry_recovers_after_transient_failure() {
        let fetcher = FakeFetcher::new()
            .error("https://x/1", FetchError::Timeout { url: "https://x/1".into() })
            .page("https://x/1", "ok");
        let fetched = fetch_with_retry(&fetcher, "https://x/1", policy(3)).await;
        assert_eq!(fetched.outcome.unwrap(), "ok");
        assert_eq!(fetched.retries, 1);
        assert_eq!(fetcher.calls_to("https://x/1"), 2);
    }

    #[tokio::test]
    async fn test_retry_gives_up_after_max_attempts() {
        let fetcher = FakeFetcher::new().error(
            "https://x/1",
            FetchError::Status {
                url: "https://x/1".into(),
                status: 502,
            },
        );
        let fetched = fetch_with_retry(&fetcher, "https://x/1", policy(3)).await;
        assert!(fetched.outcome.is_err());
        assert_eq!(fetched.retries, 2);
        assert_eq!(fetcher.calls_to("https://x/1"), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_paced_requests_are_spaced() {
        let fetcher = FakeFetcher::new().page("https://x/1", "ok");
        let paced = PacedFetcher::new(&fetcher, Duration::from_millis(500));

        let started = Instant::now();
        paced.fetch("https://x/1").await.unwrap();
        assert_eq!(started.elapsed(), Duration::ZERO);
        for _ in 0..3 {
            paced.fetch("https://x/1").await.unwrap();
        }
        assert!(started.elapsed() >= Duration::from_millis(1500));
        assert_eq!(fetcher.calls_to("https://x/1"), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pacing_covers_retries() {
        let fetcher = FakeFetcher::new()
            .error("https://x/1", FetchError::Timeout { url: "https://x/1".into() })
            .page("https://x/1", "ok");
        let paced = PacedFetcher::new(&fetcher, Duration::from_secs(2));

        let started = Instant::now();
        let fetched = fetch_with_retry(&paced, "https://x/1", policy(3)).await;
        assert_eq!(fetched.outcome.unwrap(), "ok");
        // the 1ms backoff is absorbed by the 2s spacing
        assert!(started.elapsed() >= Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_permanent_failure_not_retried() {
        let fetcher = FakeFetcher::new();
        let fetched = fetch_with_retry(&fetcher, "https://x/missing", policy(3)).await;
        assert!(matches!(
            fetched.outcome,
            Err(FetchError::Status { status: 404, .. })
        ));
        assert_eq!(fetched.retries, 0);
    }
}
