//! Resumable, concurrent crawl of volume listings and article pages.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use dashmap::DashSet;
use futures_util::Stream;
use thiserror::Error;
use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use super::extract::{parse_article, parse_listing};
use super::layout::CompiledLayout;
use super::ledger::{Outcome, ProcessedLedger};
use crate::article::{ArticleRecord, VolumeLink, partial_file_name, write_json_atomic};
use crate::fetch::{
    FetchError, FetchSession, PageFetcher, RateLimiter, RetryDecision, RetryPolicy, classify_error,
};

/// Default number of volumes crawled in parallel.
pub const DEFAULT_CONCURRENCY: usize = 4;

/// Minimum allowed concurrency.
pub const MIN_CONCURRENCY: usize = 1;

/// Maximum allowed concurrency.
pub const MAX_CONCURRENCY: usize = 32;

/// Default cap on listing pages per volume.
pub const DEFAULT_MAX_PAGES: u32 = 5;

const RECORD_CHANNEL_CAPACITY: usize = 64;

/// Errors that stop a crawl as a whole. Per-volume and per-article failures
/// are recorded in the ledger instead.
#[derive(Debug, Error)]
pub enum CrawlError {
    /// Concurrency outside `MIN_CONCURRENCY..=MAX_CONCURRENCY`.
    #[error("invalid concurrency {value}: must be between {MIN_CONCURRENCY} and {MAX_CONCURRENCY}")]
    InvalidConcurrency {
        /// The rejected value.
        value: usize,
    },

    /// The worker semaphore closed unexpectedly.
    #[error("crawl worker pool closed unexpectedly")]
    SemaphoreClosed,

    /// The coordinator task panicked or was cancelled.
    #[error("crawl coordinator failed: {0}")]
    Join(String),
}

/// Live crawl counters, shared with progress reporting.
#[derive(Debug, Default)]
pub struct CrawlStats {
    volumes_succeeded: AtomicUsize,
    volumes_failed: AtomicUsize,
    volumes_skipped: AtomicUsize,
    articles_saved: AtomicUsize,
    articles_failed: AtomicUsize,
    articles_skipped: AtomicUsize,
    retries: AtomicUsize,
}

impl CrawlStats {
    /// Volumes whose pagination completed.
    #[must_use]
    pub fn volumes_succeeded(&self) -> usize {
        self.volumes_succeeded.load(Ordering::SeqCst)
    }

    /// Volumes given up on.
    #[must_use]
    pub fn volumes_failed(&self) -> usize {
        self.volumes_failed.load(Ordering::SeqCst)
    }

    /// Volumes already done in an earlier run.
    #[must_use]
    pub fn volumes_skipped(&self) -> usize {
        self.volumes_skipped.load(Ordering::SeqCst)
    }

    /// Articles written to partial files.
    #[must_use]
    pub fn articles_saved(&self) -> usize {
        self.articles_saved.load(Ordering::SeqCst)
    }

    /// Articles that could not be fetched, parsed or saved.
    #[must_use]
    pub fn articles_failed(&self) -> usize {
        self.articles_failed.load(Ordering::SeqCst)
    }

    /// Articles already done, or already handled by another worker this run.
    #[must_use]
    pub fn articles_skipped(&self) -> usize {
        self.articles_skipped.load(Ordering::SeqCst)
    }

    /// Retry attempts across volumes and articles.
    #[must_use]
    pub fn retries(&self) -> usize {
        self.retries.load(Ordering::SeqCst)
    }

    /// Point-in-time copy of every counter.
    #[must_use]
    pub fn summary(&self) -> CrawlSummary {
        CrawlSummary {
            volumes_succeeded: self.volumes_succeeded(),
            volumes_failed: self.volumes_failed(),
            volumes_skipped: self.volumes_skipped(),
            articles_saved: self.articles_saved(),
            articles_failed: self.articles_failed(),
            articles_skipped: self.articles_skipped(),
            retries: self.retries(),
        }
    }

    fn bump(counter: &AtomicUsize) {
        counter.fetch_add(1, Ordering::SeqCst);
    }
}

/// Final crawl counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CrawlSummary {
    /// Volumes whose pagination completed.
    pub volumes_succeeded: usize,
    /// Volumes given up on.
    pub volumes_failed: usize,
    /// Volumes skipped as already done.
    pub volumes_skipped: usize,
    /// Articles saved.
    pub articles_saved: usize,
    /// Articles failed.
    pub articles_failed: usize,
    /// Articles skipped.
    pub articles_skipped: usize,
    /// Retry attempts.
    pub retries: usize,
}

impl CrawlSummary {
    /// Items (volumes and articles) that succeeded.
    #[must_use]
    pub fn completed(&self) -> usize {
        self.volumes_succeeded + self.articles_saved
    }

    /// Items (volumes and articles) that failed.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.volumes_failed + self.articles_failed
    }
}

/// A running crawl: the record stream plus the coordinator task.
#[derive(Debug)]
pub struct CrawlHandle {
    records: mpsc::Receiver<ArticleRecord>,
    stats: Arc<CrawlStats>,
    task: JoinHandle<Result<(), CrawlError>>,
}

impl CrawlHandle {
    /// Live counters.
    #[must_use]
    pub fn stats(&self) -> Arc<CrawlStats> {
        Arc::clone(&self.stats)
    }

    /// Receives the next saved record, or `None` once every worker is done.
    pub async fn next_record(&mut self) -> Option<ArticleRecord> {
        self.records.recv().await
    }

    /// Drains all records, then waits for the crawl to finish.
    ///
    /// # Errors
    ///
    /// Returns [`CrawlError`] if the crawl stopped as a whole.
    pub async fn collect(mut self) -> Result<(Vec<ArticleRecord>, CrawlSummary), CrawlError> {
        let mut records = Vec::new();
        while let Some(record) = self.records.recv().await {
            records.push(record);
        }
        let summary = self.finish().await?;
        Ok((records, summary))
    }

    /// Discards the record stream and waits for the crawl to finish. Records
    /// are still persisted as partial files.
    ///
    /// # Errors
    ///
    /// Returns [`CrawlError`] if the crawl stopped as a whole.
    pub async fn finish(self) -> Result<CrawlSummary, CrawlError> {
        drop(self.records);
        self.task
            .await
            .map_err(|e| CrawlError::Join(e.to_string()))??;
        Ok(self.stats.summary())
    }

    /// Splits into a record stream and a handle that resolves to the summary.
    #[must_use]
    pub fn into_stream(
        self,
    ) -> (
        impl Stream<Item = ArticleRecord>,
        JoinHandle<Result<(), CrawlError>>,
        Arc<CrawlStats>,
    ) {
        let stream = futures_util::stream::unfold(self.records, |mut rx| async move {
            rx.recv().await.map(|record| (record, rx))
        });
        (stream, self.task, self.stats)
    }
}

/// Crawls volume listings and their article pages.
///
/// Each volume runs in its own task, limited by a semaphore. A task opens a
/// fresh [`FetchSession`] for every attempt and drops it when the attempt
/// ends. Volumes and articles already marked successful in the ledger are
/// skipped without fetching, which makes re-running a crawl cheap.
#[derive(Clone)]
pub struct ArticleCrawler {
    fetcher: Arc<dyn PageFetcher>,
    layout: Arc<CompiledLayout>,
    ledger: Arc<ProcessedLedger>,
    rate_limiter: Arc<RateLimiter>,
    retry_policy: RetryPolicy,
    semaphore: Arc<Semaphore>,
    concurrency: usize,
    max_pages: Option<u32>,
    partial_dir: PathBuf,
    in_flight: Arc<DashSet<String>>,
}

impl std::fmt::Debug for ArticleCrawler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArticleCrawler")
            .field("concurrency", &self.concurrency)
            .field("max_pages", &self.max_pages)
            .field("partial_dir", &self.partial_dir)
            .finish_non_exhaustive()
    }
}

impl ArticleCrawler {
    /// Creates a crawler writing partial files into `partial_dir`.
    ///
    /// Starts with the default retry policy, no rate limiting and the default
    /// page cap.
    ///
    /// # Errors
    ///
    /// Returns [`CrawlError::InvalidConcurrency`] when `concurrency` is out of
    /// range.
    pub fn new(
        fetcher: Arc<dyn PageFetcher>,
        layout: Arc<CompiledLayout>,
        ledger: Arc<ProcessedLedger>,
        partial_dir: &Path,
        concurrency: usize,
    ) -> Result<Self, CrawlError> {
        if !(MIN_CONCURRENCY..=MAX_CONCURRENCY).contains(&concurrency) {
            return Err(CrawlError::InvalidConcurrency { value: concurrency });
        }
        Ok(Self {
            fetcher,
            layout,
            ledger,
            rate_limiter: Arc::new(RateLimiter::disabled()),
            retry_policy: RetryPolicy::default(),
            semaphore: Arc::new(Semaphore::new(concurrency)),
            concurrency,
            max_pages: Some(DEFAULT_MAX_PAGES),
            partial_dir: partial_dir.to_path_buf(),
            in_flight: Arc::new(DashSet::new()),
        })
    }

    /// Sets the retry policy for volume attempts and article fetches.
    #[must_use]
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    /// Sets the per-domain rate limiter.
    #[must_use]
    pub fn with_rate_limiter(mut self, rate_limiter: Arc<RateLimiter>) -> Self {
        self.rate_limiter = rate_limiter;
        self
    }

    /// Caps listing pages per volume; `None` follows pagination to the end.
    #[must_use]
    pub fn with_max_pages(mut self, max_pages: Option<u32>) -> Self {
        self.max_pages = max_pages;
        self
    }

    /// Configured concurrency.
    #[must_use]
    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Starts crawling `volumes` in the background.
    ///
    /// Saved records arrive on the returned handle as they are written.
    /// Repeated volume URLs are crawled once.
    #[instrument(skip(self, volumes), fields(volumes = volumes.len(), concurrency = self.concurrency))]
    pub fn crawl(&self, volumes: Vec<VolumeLink>) -> CrawlHandle {
        let (tx, rx) = mpsc::channel(RECORD_CHANNEL_CAPACITY);
        let stats = Arc::new(CrawlStats::default());
        let crawler = self.clone();
        let task_stats = Arc::clone(&stats);
        let task = tokio::spawn(async move { crawler.run(volumes, task_stats, tx).await });
        CrawlHandle {
            records: rx,
            stats,
            task,
        }
    }

    async fn run(
        self,
        volumes: Vec<VolumeLink>,
        stats: Arc<CrawlStats>,
        tx: mpsc::Sender<ArticleRecord>,
    ) -> Result<(), CrawlError> {
        info!(volumes = volumes.len(), "starting crawl");
        let mut handles = Vec::new();
        let mut seen = HashSet::new();

        for volume in volumes {
            if !seen.insert(volume.clone()) {
                continue;
            }
            if self.ledger.is_success(volume.as_str()).await {
                debug!(volume = %volume, "volume already crawled, skipping");
                CrawlStats::bump(&stats.volumes_skipped);
                continue;
            }

            let permit = Arc::clone(&self.semaphore)
                .acquire_owned()
                .await
                .map_err(|_| CrawlError::SemaphoreClosed)?;

            let worker = self.clone();
            let stats = Arc::clone(&stats);
            let tx = tx.clone();
            let task_volume = volume.clone();
            let handle = tokio::spawn(async move {
                let _permit = permit;
                worker.crawl_volume(&task_volume, &stats, &tx).await;
            });
            handles.push((volume, handle));
        }
        drop(tx);

        for (volume, handle) in handles {
            if let Err(e) = handle.await {
                warn!(volume = %volume, error = %e, "volume task panicked");
                self.record(volume.as_str(), Outcome::Failure).await;
                CrawlStats::bump(&stats.volumes_failed);
            }
        }

        let summary = stats.summary();
        info!(
            volumes_succeeded = summary.volumes_succeeded,
            volumes_failed = summary.volumes_failed,
            volumes_skipped = summary.volumes_skipped,
            articles_saved = summary.articles_saved,
            articles_failed = summary.articles_failed,
            articles_skipped = summary.articles_skipped,
            retries = summary.retries,
            "crawl complete"
        );
        Ok(())
    }

    #[instrument(skip(self, stats, tx), fields(volume = %volume))]
    async fn crawl_volume(
        &self,
        volume: &VolumeLink,
        stats: &CrawlStats,
        tx: &mpsc::Sender<ArticleRecord>,
    ) {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            debug!(attempt, "starting volume attempt");

            match self.volume_attempt(volume, stats, tx).await {
                Ok(pages) => {
                    info!(pages, "volume crawled");
                    self.record(volume.as_str(), Outcome::Success).await;
                    CrawlStats::bump(&stats.volumes_succeeded);
                    return;
                }
                Err(error) => match self
                    .retry_policy
                    .should_retry(classify_error(&error), attempt)
                {
                    RetryDecision::Retry {
                        delay,
                        attempt: next_attempt,
                    } => {
                        info!(
                            attempt = next_attempt,
                            max_attempts = self.retry_policy.max_attempts(),
                            delay_ms = delay.as_millis(),
                            error = %error,
                            "retrying volume"
                        );
                        CrawlStats::bump(&stats.retries);
                        tokio::time::sleep(delay).await;
                    }
                    RetryDecision::DoNotRetry { reason } => {
                        warn!(error = %error, reason, attempts = attempt, "volume failed");
                        self.record(volume.as_str(), Outcome::Failure).await;
                        CrawlStats::bump(&stats.volumes_failed);
                        return;
                    }
                },
            }
        }
    }

    /// One pass over a volume's listing pages with a session of its own.
    /// Returns the number of listing pages visited.
    async fn volume_attempt(
        &self,
        volume: &VolumeLink,
        stats: &CrawlStats,
        tx: &mpsc::Sender<ArticleRecord>,
    ) -> Result<u32, FetchError> {
        let mut session = self.fetcher.open_session().await?;
        let mut seen_links = HashSet::new();
        let mut page = 1u32;

        loop {
            let page_url = self.layout.listing_page_url(volume.as_str(), page)?;
            self.rate_limiter.acquire(&page_url).await;

            let html = match session.fetch(&page_url, self.layout.listing_ready()).await {
                Ok(html) => html,
                // The first page must render; later pages failing to render
                // mark the end of the listing.
                Err(error) if page > 1 && error.is_not_rendered() => {
                    debug!(page, error = %error, "listing page not rendered, stopping");
                    return Ok(page - 1);
                }
                Err(error) => return Err(error),
            };

            let listing = parse_listing(&html, &page_url, &self.layout);
            let fresh: Vec<String> = listing
                .article_links
                .into_iter()
                .filter(|link| seen_links.insert(link.clone()))
                .collect();
            debug!(page, links = fresh.len(), "listing page parsed");

            if fresh.is_empty() {
                return Ok(page);
            }
            for link in &fresh {
                self.crawl_article(session.as_mut(), link, stats, tx).await;
            }

            if !listing.has_next || self.max_pages.is_some_and(|max| page >= max) {
                return Ok(page);
            }
            page += 1;
        }
    }

    #[instrument(skip(self, session, stats, tx))]
    async fn crawl_article(
        &self,
        session: &mut dyn FetchSession,
        url: &str,
        stats: &CrawlStats,
        tx: &mpsc::Sender<ArticleRecord>,
    ) {
        if !self.in_flight.insert(url.to_string()) || self.ledger.is_success(url).await {
            debug!("article already handled, skipping");
            CrawlStats::bump(&stats.articles_skipped);
            return;
        }

        let Some(html) = self.fetch_with_retry(session, url, stats).await else {
            self.fail_article(url, stats).await;
            return;
        };

        let Some(record) = parse_article(&html, url, &self.layout) else {
            warn!("article page has no title, abstract or DOI");
            self.fail_article(url, stats).await;
            return;
        };

        let path = self.partial_dir.join(partial_file_name(url));
        if let Err(error) = write_json_atomic(&path, &record) {
            warn!(error = %error, "failed to save article");
            self.fail_article(url, stats).await;
            return;
        }

        self.record(url, Outcome::Success).await;
        CrawlStats::bump(&stats.articles_saved);
        debug!(path = %path.display(), "article saved");

        if tx.send(record).await.is_err() {
            debug!("record receiver dropped");
        }
    }

    async fn fetch_with_retry(
        &self,
        session: &mut dyn FetchSession,
        url: &str,
        stats: &CrawlStats,
    ) -> Option<String> {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            self.rate_limiter.acquire(url).await;

            match session.fetch(url, self.layout.detail_ready()).await {
                Ok(html) => return Some(html),
                Err(error) => match self
                    .retry_policy
                    .should_retry(classify_error(&error), attempt)
                {
                    RetryDecision::Retry {
                        delay,
                        attempt: next_attempt,
                    } => {
                        debug!(attempt = next_attempt, error = %error, "retrying article");
                        CrawlStats::bump(&stats.retries);
                        tokio::time::sleep(delay).await;
                    }
                    RetryDecision::DoNotRetry { reason } => {
                        warn!(error = %error, reason, attempts = attempt, "article fetch failed");
                        return None;
                    }
                },
            }
        }
    }

    /// Records the failure and releases the claim on `url`, so a later
    /// attempt of any volume fetches it again.
    async fn fail_article(&self, url: &str, stats: &CrawlStats) {
        self.record(url, Outcome::Failure).await;
        self.in_flight.remove(url);
        CrawlStats::bump(&stats.articles_failed);
    }

    async fn record(&self, url: &str, outcome: Outcome) {
        if let Err(error) = self.ledger.mark(url, outcome).await {
            warn!(url, error = %error, "ledger update was not persisted");
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_totals() {
        let stats = CrawlStats::default();
        CrawlStats::bump(&stats.volumes_succeeded);
        CrawlStats::bump(&stats.articles_saved);
        CrawlStats::bump(&stats.articles_saved);
        CrawlStats::bump(&stats.articles_failed);

        let summary = stats.summary();
        assert_eq!(summary.completed(), 3);
        assert_eq!(summary.failed(), 1);
    }

    struct CrashingFetcher;

    #[async_trait::async_trait]
    impl PageFetcher for CrashingFetcher {
        async fn open_session(&self) -> Result<Box<dyn FetchSession>, FetchError> {
            panic!("session backend crashed");
        }
    }

    #[tokio::test]
    async fn test_panicking_volume_task_is_recorded_as_failure() {
        let dir = tempfile::TempDir::new().unwrap();
        let ledger = Arc::new(ProcessedLedger::in_memory());
        let crawler = ArticleCrawler::new(
            Arc::new(CrashingFetcher),
            Arc::new(CompiledLayout::default_layout().unwrap()),
            Arc::clone(&ledger),
            dir.path(),
            1,
        )
        .unwrap();
        let volume = "https://site.example/xpl/tocresult.jsp?isnumber=1";

        let summary = crawler
            .crawl(vec![VolumeLink::new(volume)])
            .finish()
            .await
            .unwrap();

        assert_eq!(summary.volumes_failed, 1);
        assert_eq!(ledger.outcome(volume).await, Some(Outcome::Failure));
    }

    #[test]
    fn test_crawl_error_display_names_range() {
        let err = CrawlError::InvalidConcurrency { value: 0 };
        assert!(err.to_string().contains("between 1 and 32"));
    }
}
