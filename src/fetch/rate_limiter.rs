//! Per-domain politeness delay for page requests.
//!
//! Crawl workers run in parallel, but listing and detail pages usually come from
//! the same host. [`RateLimiter`] spaces requests to one domain by a minimum
//! delay while leaving different domains independent.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use std::time::Duration;
//! use topicmap_core::fetch::RateLimiter;
//!
//! # async fn example() {
//! let limiter = Arc::new(RateLimiter::new(Duration::from_millis(200)));
//! limiter.acquire("https://ieeexplore.ieee.org/document/1").await; // immediate
//! limiter.acquire("https://ieeexplore.ieee.org/document/2").await; // waits
//! limiter.acquire("https://doi.org/10.1109/x").await; // other domain, immediate
//! # }
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, instrument, warn};

/// Cumulative delay per domain after which a warning is logged.
const CUMULATIVE_DELAY_WARNING_THRESHOLD: Duration = Duration::from_secs(60);

/// Per-domain rate limiter, shared across workers through `Arc`.
///
/// Domain state lives in a `DashMap`; each entry is an `Arc` so the map shard
/// lock is released before awaiting the per-domain mutex.
#[derive(Debug)]
pub struct RateLimiter {
    delay: Duration,
    disabled: bool,
    domains: DashMap<String, Arc<DomainState>>,
}

#[derive(Debug)]
struct DomainState {
    /// `None` until the first request, which is never delayed.
    last_request: Mutex<Option<Instant>>,
    cumulative_delay_ms: AtomicU64,
}

impl DomainState {
    fn new() -> Self {
        Self {
            last_request: Mutex::new(None),
            cumulative_delay_ms: AtomicU64::new(0),
        }
    }

    #[allow(clippy::cast_possible_truncation)]
    fn add_cumulative_delay(&self, delay: Duration) -> Duration {
        let delay_ms = delay.as_millis() as u64;
        let total = self
            .cumulative_delay_ms
            .fetch_add(delay_ms, Ordering::SeqCst)
            + delay_ms;
        Duration::from_millis(total)
    }
}

impl RateLimiter {
    /// Creates a limiter enforcing `delay` between requests to one domain.
    /// A zero delay disables limiting.
    #[must_use]
    #[instrument(skip_all, fields(delay_ms = delay.as_millis()))]
    pub fn new(delay: Duration) -> Self {
        debug!("creating rate limiter");
        Self {
            delay,
            disabled: delay.is_zero(),
            domains: DashMap::new(),
        }
    }

    /// Creates a limiter that never waits.
    #[must_use]
    pub fn disabled() -> Self {
        Self::new(Duration::ZERO)
    }

    /// Returns whether limiting is disabled.
    #[must_use]
    pub fn is_disabled(&self) -> bool {
        self.disabled
    }

    /// Returns the configured per-domain delay.
    #[must_use]
    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Waits until a request to `url`'s domain is allowed, then records it.
    #[instrument(skip(self), fields(domain))]
    pub async fn acquire(&self, url: &str) {
        if self.disabled {
            return;
        }

        let domain = extract_domain(url);
        tracing::Span::current().record("domain", domain.as_str());

        let state = self
            .domains
            .entry(domain.clone())
            .or_insert_with(|| Arc::new(DomainState::new()))
            .clone();

        let mut last_request = state.last_request.lock().await;
        if let Some(previous) = *last_request {
            let elapsed = previous.elapsed();
            if elapsed < self.delay {
                let wait = self.delay.saturating_sub(elapsed);
                let cumulative = state.add_cumulative_delay(wait);
                debug!(
                    domain = %domain,
                    delay_ms = wait.as_millis(),
                    cumulative_ms = cumulative.as_millis(),
                    "applying rate limit delay"
                );
                if cumulative >= CUMULATIVE_DELAY_WARNING_THRESHOLD
                    && cumulative.saturating_sub(wait) < CUMULATIVE_DELAY_WARNING_THRESHOLD
                {
                    warn!(
                        domain = %domain,
                        cumulative_delay_secs = cumulative.as_secs(),
                        "crawl is spending a long time waiting on one domain"
                    );
                }
                tokio::time::sleep(wait).await;
            }
        }
        *last_request = Some(Instant::now());
    }
}

/// Lower-cased host of `url`, or `"unknown"` when it cannot be parsed so such
/// requests still share one bucket.
///
/// ```
/// use topicmap_core::fetch::extract_domain;
///
/// assert_eq!(extract_domain("https://IEEEXplore.ieee.org/x"), "ieeexplore.ieee.org");
/// assert_eq!(extract_domain("not a url"), "unknown");
/// ```
#[must_use]
pub fn extract_domain(url: &str) -> String {
    url::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_lowercase))
        .unwrap_or_else(|| "unknown".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_disabled_limiter_never_waits() {
        let limiter = RateLimiter::disabled();
        assert!(limiter.is_disabled());
        let start = Instant::now();
        for _ in 0..5 {
            limiter.acquire("https://example.org/a").await;
        }
        assert!(start.elapsed() < Duration::from_millis(50));
    }

    #[tokio::test]
    async fn test_same_domain_is_spaced() {
        let limiter = RateLimiter::new(Duration::from_millis(60));
        let start = Instant::now();
        limiter.acquire("https://example.org/a").await;
        limiter.acquire("https://example.org/b").await;
        assert!(start.elapsed() >= Duration::from_millis(60));
    }

    #[tokio::test]
    async fn test_different_domains_are_independent() {
        let limiter = RateLimiter::new(Duration::from_millis(500));
        let start = Instant::now();
        limiter.acquire("https://one.example/a").await;
        limiter.acquire("https://two.example/a").await;
        assert!(start.elapsed() < Duration::from_millis(250));
    }

    #[test]
    fn test_extract_domain_variants() {
        assert_eq!(extract_domain("http://Example.COM/Path"), "example.com");
        assert_eq!(extract_domain("https://localhost:8080/x"), "localhost");
        assert_eq!(extract_domain(""), "unknown");
    }
}
