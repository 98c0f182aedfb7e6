//! Page fetching capability used by link discovery and the crawler.
//!
//! A [`PageFetcher`] opens [`FetchSession`]s. Each crawl worker owns exactly
//! one session per attempt and drops it when the attempt ends, whatever the
//! outcome, so a session never outlives the work it was opened for.
//!
//! Every fetch carries a [`ReadyCondition`]: the CSS selector that signals the
//! page has rendered and the bounded wait for it. A page that never satisfies
//! its condition is reported as [`FetchError::NotReady`] or
//! [`FetchError::Timeout`], which the crawler treats as the end of a listing.

mod error;
mod http;
mod rate_limiter;
mod retry;

use std::time::Duration;

use async_trait::async_trait;
use scraper::{Html, Selector};

pub use error::FetchError;
pub use http::{DEFAULT_CONNECT_TIMEOUT, HttpPageFetcher};
pub use rate_limiter::{RateLimiter, extract_domain};
pub use retry::{DEFAULT_MAX_RETRIES, FailureType, RetryDecision, RetryPolicy, classify_error};

/// Default bounded wait for a page to render.
pub const DEFAULT_PAGE_WAIT: Duration = Duration::from_secs(10);

/// Opens fetch sessions.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Opens a new, independent session (cookie store, connection pool).
    async fn open_session(&self) -> Result<Box<dyn FetchSession>, FetchError>;
}

/// One worker's view of the web. Released by dropping it.
#[async_trait]
pub trait FetchSession: Send {
    /// Fetches `url` and returns its HTML once `ready` is satisfied.
    ///
    /// # Errors
    ///
    /// [`FetchError::Timeout`] when the wait elapses, [`FetchError::NotReady`]
    /// when the page loaded without the readiness element, and transport or
    /// status errors otherwise.
    async fn fetch(&mut self, url: &str, ready: &ReadyCondition) -> Result<String, FetchError>;
}

/// Element that must be present before a page counts as rendered.
#[derive(Debug, Clone)]
pub struct ReadyCondition {
    selector: Selector,
    source: String,
    timeout: Duration,
}

impl ReadyCondition {
    /// Compiles `selector` into a readiness condition with a bounded wait.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::InvalidSelector`] when `selector` is not valid CSS.
    pub fn new(selector: &str, timeout: Duration) -> Result<Self, FetchError> {
        let compiled =
            Selector::parse(selector).map_err(|_| FetchError::invalid_selector(selector))?;
        Ok(Self {
            selector: compiled,
            source: selector.to_string(),
            timeout,
        })
    }

    /// Selector text, for error messages.
    #[must_use]
    pub fn selector(&self) -> &str {
        &self.source
    }

    /// Bounded wait for the page.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Returns a copy with a different wait.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Returns true when `html` contains at least one matching element.
    #[must_use]
    pub fn is_satisfied_by(&self, html: &str) -> bool {
        let document = Html::parse_document(html);
        document.select(&self.selector).next().is_some()
    }
}
