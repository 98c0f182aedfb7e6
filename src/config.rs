//! Pipeline settings and the on-disk data layout.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Result, bail};

use crate::analysis::{ClusterSizing, DEFAULT_CLUSTERS, DEFAULT_MAX_FEATURES, DEFAULT_SEED};
use crate::crawl::{DEFAULT_CONCURRENCY, DEFAULT_MAX_PAGES, MAX_CONCURRENCY, MIN_CONCURRENCY, SiteLayout};
use crate::fetch::{DEFAULT_MAX_RETRIES, DEFAULT_PAGE_WAIT};

/// Archive page listing the volumes of the default journal.
pub const DEFAULT_LISTING_URL: &str =
    "https://ieeexplore.ieee.org/xpl/issues?punumber=6287639&isnumber=10820123";

/// Default data directory, relative to the working directory.
pub const DEFAULT_DATA_DIR: &str = "data";

/// Default per-domain delay between requests in milliseconds.
pub const DEFAULT_RATE_LIMIT_MS: u64 = 1000;

/// Upper bound for the per-domain delay in milliseconds.
pub const MAX_RATE_LIMIT_MS: u64 = 60_000;

/// Upper bound for the retry budget.
pub const MAX_RETRIES: u32 = 10;

/// Allowed bounded page wait in seconds.
pub const MIN_PAGE_WAIT_SECS: u64 = 1;
/// Allowed bounded page wait in seconds.
pub const MAX_PAGE_WAIT_SECS: u64 = 60;

/// Allowed cluster counts.
pub const MIN_CLUSTERS: usize = 2;
/// Allowed cluster counts.
pub const MAX_CLUSTERS: usize = 50;

/// Allowed vocabulary sizes.
pub const MIN_FEATURES: usize = 2;
/// Allowed vocabulary sizes.
pub const MAX_FEATURES: usize = 10_000;

/// Effective settings for every pipeline stage.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    /// Root of the data layout, see [`DataPaths`].
    pub data_dir: PathBuf,
    /// Archive page scanned by the discover stage.
    pub listing_url: String,
    /// Volumes crawled in parallel.
    pub concurrency: usize,
    /// Attempt budget per volume and per article.
    pub max_retries: u32,
    /// Per-domain delay in milliseconds; 0 disables rate limiting.
    pub rate_limit_ms: u64,
    /// Bounded wait for each page to render.
    pub page_wait: Duration,
    /// Listing pages per volume; `None` follows pagination to the end.
    pub max_pages: Option<u32>,
    /// Requested number of clusters.
    pub n_clusters: usize,
    /// Shrink the cluster count for small datasets.
    pub adaptive_clusters: bool,
    /// Seed for clustering and projections.
    pub seed: u64,
    /// Vectorizer vocabulary size.
    pub max_features: usize,
    /// Markup of the source site.
    pub layout: SiteLayout,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            listing_url: DEFAULT_LISTING_URL.to_string(),
            concurrency: DEFAULT_CONCURRENCY,
            max_retries: DEFAULT_MAX_RETRIES,
            rate_limit_ms: DEFAULT_RATE_LIMIT_MS,
            page_wait: DEFAULT_PAGE_WAIT,
            max_pages: Some(DEFAULT_MAX_PAGES),
            n_clusters: DEFAULT_CLUSTERS,
            adaptive_clusters: false,
            seed: DEFAULT_SEED,
            max_features: DEFAULT_MAX_FEATURES,
            layout: SiteLayout::default(),
        }
    }
}

impl PipelineConfig {
    /// Checks every setting against its allowed range.
    ///
    /// # Errors
    ///
    /// Names the first out-of-range setting.
    pub fn validate(&self) -> Result<()> {
        if !(MIN_CONCURRENCY..=MAX_CONCURRENCY).contains(&self.concurrency) {
            bail!(
                "Invalid concurrency value: {}. Expected range: {MIN_CONCURRENCY}..={MAX_CONCURRENCY}",
                self.concurrency
            );
        }
        if self.max_retries > MAX_RETRIES {
            bail!(
                "Invalid max_retries value: {}. Expected range: 0..={MAX_RETRIES}",
                self.max_retries
            );
        }
        if self.rate_limit_ms > MAX_RATE_LIMIT_MS {
            bail!(
                "Invalid rate_limit value: {}. Expected range: 0..={MAX_RATE_LIMIT_MS}",
                self.rate_limit_ms
            );
        }
        let wait = self.page_wait.as_secs();
        if !(MIN_PAGE_WAIT_SECS..=MAX_PAGE_WAIT_SECS).contains(&wait) {
            bail!(
                "Invalid page_wait_secs value: {wait}. Expected range: {MIN_PAGE_WAIT_SECS}..={MAX_PAGE_WAIT_SECS}"
            );
        }
        if !(MIN_CLUSTERS..=MAX_CLUSTERS).contains(&self.n_clusters) {
            bail!(
                "Invalid n_clusters value: {}. Expected range: {MIN_CLUSTERS}..={MAX_CLUSTERS}",
                self.n_clusters
            );
        }
        if !(MIN_FEATURES..=MAX_FEATURES).contains(&self.max_features) {
            bail!(
                "Invalid max_features value: {}. Expected range: {MIN_FEATURES}..={MAX_FEATURES}",
                self.max_features
            );
        }
        Ok(())
    }

    /// Cluster sizing derived from `n_clusters` and `adaptive_clusters`.
    #[must_use]
    pub fn cluster_sizing(&self) -> ClusterSizing {
        if self.adaptive_clusters {
            ClusterSizing::Adaptive(self.n_clusters)
        } else {
            ClusterSizing::Fixed(self.n_clusters)
        }
    }

    /// File locations under `data_dir`.
    #[must_use]
    pub fn paths(&self) -> DataPaths {
        DataPaths::new(&self.data_dir)
    }
}

/// Every file and directory the pipeline reads or writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataPaths {
    /// `raw/article_links.json`
    pub volume_list: PathBuf,
    /// `raw/processed_urls.json`
    pub ledger: PathBuf,
    /// `raw/partials/`
    pub partial_dir: PathBuf,
    /// `cleaned/cleaned_articles.json`
    pub canonical: PathBuf,
    /// `cleaned/clustered/`
    pub clustered_dir: PathBuf,
    /// `cleaned/topic-modelling/`
    pub charts_dir: PathBuf,
    /// `logs/run_result.json`
    pub run_result: PathBuf,
    /// `logs/topic_info.json`
    pub topic_info: PathBuf,
    /// `logs/metrics.jsonl`
    pub metrics: PathBuf,
}

impl DataPaths {
    /// Lays out the data files under `root`.
    #[must_use]
    pub fn new(root: &Path) -> Self {
        let raw = root.join("raw");
        let cleaned = root.join("cleaned");
        let logs = root.join("logs");
        Self {
            volume_list: raw.join("article_links.json"),
            ledger: raw.join("processed_urls.json"),
            partial_dir: raw.join("partials"),
            canonical: cleaned.join("cleaned_articles.json"),
            clustered_dir: cleaned.join("clustered"),
            charts_dir: cleaned.join("topic-modelling"),
            run_result: logs.join("run_result.json"),
            topic_info: logs.join("topic_info.json"),
            metrics: logs.join("metrics.jsonl"),
        }
    }

    /// `clustering_visualization.svg` in the chart directory.
    #[must_use]
    pub fn scatter_chart(&self) -> PathBuf {
        self.charts_dir.join("clustering_visualization.svg")
    }

    /// `cluster_<id>_topics.svg` in the chart directory.
    #[must_use]
    pub fn topic_chart(&self, cluster: usize) -> PathBuf {
        self.charts_dir.join(format!("cluster_{cluster}_topics.svg"))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = PipelineConfig::default();
        config.validate().unwrap();
        assert_eq!(config.concurrency, 4);
        assert_eq!(config.max_pages, Some(5));
        assert_eq!(config.cluster_sizing(), ClusterSizing::Fixed(3));
    }

    #[test]
    fn test_validate_rejects_out_of_range_values() {
        let cases: Vec<(PipelineConfig, &str)> = vec![
            (
                PipelineConfig {
                    concurrency: 0,
                    ..PipelineConfig::default()
                },
                "concurrency",
            ),
            (
                PipelineConfig {
                    max_retries: 11,
                    ..PipelineConfig::default()
                },
                "max_retries",
            ),
            (
                PipelineConfig {
                    rate_limit_ms: 60_001,
                    ..PipelineConfig::default()
                },
                "rate_limit",
            ),
            (
                PipelineConfig {
                    page_wait: Duration::from_secs(61),
                    ..PipelineConfig::default()
                },
                "page_wait_secs",
            ),
            (
                PipelineConfig {
                    n_clusters: 1,
                    ..PipelineConfig::default()
                },
                "n_clusters",
            ),
            (
                PipelineConfig {
                    max_features: 1,
                    ..PipelineConfig::default()
                },
                "max_features",
            ),
        ];
        for (config, key) in cases {
            let err = config.validate().unwrap_err().to_string();
            assert!(err.contains(key), "{err} should mention {key}");
        }
    }

    #[test]
    fn test_adaptive_sizing() {
        let config = PipelineConfig {
            adaptive_clusters: true,
            n_clusters: 8,
            ..PipelineConfig::default()
        };
        assert_eq!(config.cluster_sizing(), ClusterSizing::Adaptive(8));
    }

    #[test]
    fn test_data_paths_layout() {
        let paths = DataPaths::new(Path::new("/tmp/run"));
        assert_eq!(paths.ledger, Path::new("/tmp/run/raw/processed_urls.json"));
        assert_eq!(paths.canonical, Path::new("/tmp/run/cleaned/cleaned_articles.json"));
        assert_eq!(
            paths.topic_chart(2),
            Path::new("/tmp/run/cleaned/topic-modelling/cluster_2_topics.svg")
        );
        assert_eq!(paths.metrics, Path::new("/tmp/run/logs/metrics.jsonl"));
    }
}
