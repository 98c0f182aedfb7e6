//! Error types for page fetching.

use std::time::Duration;

use thiserror::Error;

/// Errors a [`FetchSession`](super::FetchSession) can report.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Transport-level failure (DNS, connection refused, reset, TLS).
    #[error("transport error fetching {url}: {message}")]
    Transport {
        /// The URL being fetched.
        url: String,
        /// Description of the failure.
        message: String,
    },

    /// The page did not finish loading within the bounded wait.
    #[error("timed out after {}s fetching {url}", waited.as_secs_f32())]
    Timeout {
        /// The URL being fetched.
        url: String,
        /// How long the session waited.
        waited: Duration,
    },

    /// The page loaded but the element signalling readiness never appeared.
    #[error("page {url} loaded without expected element `{selector}`")]
    NotReady {
        /// The URL being fetched.
        url: String,
        /// CSS selector that was awaited.
        selector: String,
    },

    /// Non-success HTTP response.
    #[error("HTTP {status} fetching {url}")]
    HttpStatus {
        /// The URL being fetched.
        url: String,
        /// Response status code.
        status: u16,
    },

    /// The URL could not be parsed or resolved.
    #[error("invalid URL: {url}")]
    InvalidUrl {
        /// The offending URL.
        url: String,
    },

    /// A CSS selector failed to parse.
    #[error("invalid CSS selector: {selector}")]
    InvalidSelector {
        /// The offending selector.
        selector: String,
    },

    /// The fetcher could not open a session.
    #[error("failed to open fetch session: {message}")]
    Session {
        /// Description of the failure.
        message: String,
    },
}

impl FetchError {
    /// Creates a transport error.
    pub fn transport(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Transport {
            url: url.into(),
            message: message.into(),
        }
    }

    /// Creates a timeout error.
    pub fn timeout(url: impl Into<String>, waited: Duration) -> Self {
        Self::Timeout {
            url: url.into(),
            waited,
        }
    }

    /// Creates a missing-readiness-element error.
    pub fn not_ready(url: impl Into<String>, selector: impl Into<String>) -> Self {
        Self::NotReady {
            url: url.into(),
            selector: selector.into(),
        }
    }

    /// Creates an HTTP status error.
    pub fn http_status(url: impl Into<String>, status: u16) -> Self {
        Self::HttpStatus {
            url: url.into(),
            status,
        }
    }

    /// Creates an invalid URL error.
    pub fn invalid_url(url: impl Into<String>) -> Self {
        Self::InvalidUrl { url: url.into() }
    }

    /// Creates an invalid selector error.
    pub fn invalid_selector(selector: impl Into<String>) -> Self {
        Self::InvalidSelector {
            selector: selector.into(),
        }
    }

    /// Creates a session error.
    pub fn session(message: impl Into<String>) -> Self {
        Self::Session {
            message: message.into(),
        }
    }

    /// Returns true when the page failed to render within the bounded wait,
    /// either by timing out or by never showing its readiness element.
    #[must_use]
    pub fn is_not_rendered(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::NotReady { .. })
    }
}
