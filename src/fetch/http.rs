//! Plain HTTP implementation of [`PageFetcher`].
//!
//! Each session owns its own `reqwest::Client` with a private cookie store, so
//! two workers never share cookies or connections. Pages are not executed:
//! readiness is checked against the HTML as served.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, instrument};
use url::Url;

use super::{FetchError, FetchSession, PageFetcher, ReadyCondition};
use crate::user_agent;

/// Default TCP connect timeout.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Opens HTTP sessions.
#[derive(Debug, Clone)]
pub struct HttpPageFetcher {
    connect_timeout: Duration,
    user_agent: String,
}

impl Default for HttpPageFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpPageFetcher {
    /// Creates a fetcher with default timeouts and the crate's User-Agent.
    #[must_use]
    pub fn new() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            user_agent: user_agent::default_crawler_user_agent(),
        }
    }

    /// Overrides the connect timeout.
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    fn build_client(&self) -> Result<Client, reqwest::Error> {
        Client::builder()
            .connect_timeout(self.connect_timeout)
            .cookie_store(true)
            .gzip(true)
            .user_agent(self.user_agent.clone())
            .build()
    }
}

#[async_trait]
impl PageFetcher for HttpPageFetcher {
    async fn open_session(&self) -> Result<Box<dyn FetchSession>, FetchError> {
        let client = self
            .build_client()
            .map_err(|e| FetchError::session(e.to_string()))?;
        debug!("opened http session");
        Ok(Box::new(HttpSession { client }))
    }
}

struct HttpSession {
    client: Client,
}

impl HttpSession {
    async fn get_text(&self, url: &str) -> Result<String, FetchError> {
        let response = self.client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                FetchError::timeout(url, Duration::ZERO)
            } else {
                FetchError::transport(url, e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::http_status(url, status.as_u16()));
        }

        response
            .text()
            .await
            .map_err(|e| FetchError::transport(url, e.to_string()))
    }
}

#[async_trait]
impl FetchSession for HttpSession {
    #[instrument(skip(self, ready), fields(selector = ready.selector()))]
    async fn fetch(&mut self, url: &str, ready: &ReadyCondition) -> Result<String, FetchError> {
        Url::parse(url).map_err(|_| FetchError::invalid_url(url))?;

        let body = match tokio::time::timeout(ready.timeout(), self.get_text(url)).await {
            Ok(Err(FetchError::Timeout { .. })) | Err(_) => {
                return Err(FetchError::timeout(url, ready.timeout()));
            }
            Ok(result) => result?,
        };

        if !ready.is_satisfied_by(&body) {
            debug!(bytes = body.len(), "readiness element missing");
            return Err(FetchError::not_ready(url, ready.selector()));
        }

        debug!(bytes = body.len(), "page fetched");
        Ok(body)
    }
}
