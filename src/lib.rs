//! Topicmap Core Library
//!
//! Collects journal article metadata from a web archive, cleans it, and
//! groups the articles into topic clusters.
//!
//! # Architecture
//!
//! The pipeline runs leaves first:
//! - [`fetch`] - Page fetching capability, rate limiting and retry policy
//! - [`crawl`] - Volume discovery and the resumable article crawler
//! - [`clean`] - Merging, normalization and deduplication of crawled records
//! - [`analysis`] - TF-IDF vectorization, PCA and k-means clustering
//! - [`topics`] - Per-cluster topic modelling, coherence and keyword labels
//! - [`report`] - Run results, cluster files, charts and the metrics log
//! - [`pipeline`] - Stage orchestration over a data directory

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod analysis;
pub mod article;
pub mod clean;
pub mod config;
pub mod crawl;
pub mod fetch;
pub mod pipeline;
pub mod report;
pub mod topics;
pub(crate) mod user_agent;

// Re-export commonly used types
pub use analysis::{
    AnalysisError, ClusterSizing, Clustering, DEFAULT_CLUSTERS, DEFAULT_MAX_FEATURES,
    DEFAULT_SEED, KMeansConfig, Projection2D, TermMatrix, TfidfVectorizer, cluster, vectorize,
};
pub use article::{ArticleRecord, NOT_FOUND, StoreError, VolumeLink, VolumeList};
pub use clean::{MergeError, MergeReport, merge};
pub use config::{DataPaths, PipelineConfig};
pub use crawl::{
    ArticleCrawler, CrawlError, CrawlHandle, CrawlStats, CrawlSummary, DEFAULT_CONCURRENCY,
    DEFAULT_MAX_PAGES, MAX_CONCURRENCY, MIN_CONCURRENCY, Outcome, ProcessedLedger, SiteLayout,
};
pub use fetch::{
    DEFAULT_MAX_RETRIES, FetchError, FetchSession, HttpPageFetcher, PageFetcher, RateLimiter,
    ReadyCondition, RetryPolicy,
};
pub use pipeline::{Pipeline, PipelineRun};
pub use report::{ClusterSummary, ReportError, RunResult, RunTracker};
pub use topics::{Embedder, KeywordExtractor, TopicError, TopicExtractor, TopicReport};
