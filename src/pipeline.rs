//! Stage orchestration: discover, crawl, merge and model over one data
//! directory.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use rayon::prelude::*;
use tracing::{debug, info, instrument, warn};

use crate::analysis::{KMeansConfig, cluster, vectorize};
use crate::article::{ArticleRecord, VolumeList, read_json_file};
use crate::clean::{MergeReport, merge};
use crate::config::{DataPaths, PipelineConfig};
use crate::crawl::{ArticleCrawler, CrawlHandle, CrawlSummary, ProcessedLedger, discover_volumes};
use crate::fetch::{PageFetcher, RateLimiter, RetryPolicy};
use crate::report::{
    ClusterSummary, ClusterTopicInfo, RunResult, RunTracker, write_cluster_files,
    write_cluster_scatter, write_topic_barchart, write_topic_info,
};
use crate::topics::{KeywordExtractor, TopicExtractor};

/// Counts and scores from a full [`Pipeline::run`].
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineRun {
    /// Volume links known after discovery.
    pub volumes: usize,
    /// Counters from the crawl stage.
    pub crawl: CrawlSummary,
    /// Counters from the merge stage.
    pub merge: MergeReport,
    /// Clustering and topic scores from the model stage.
    pub result: RunResult,
}

/// Runs the pipeline stages against the files under `data_dir`.
///
/// Every stage reads its input from disk and writes its output back, so
/// stages can run separately from the CLI or all at once via
/// [`Pipeline::run`].
#[derive(Clone)]
pub struct Pipeline {
    config: PipelineConfig,
    paths: DataPaths,
    fetcher: Arc<dyn PageFetcher>,
    retry_policy: RetryPolicy,
    tracker: RunTracker,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("config", &self.config)
            .field("retry_policy", &self.retry_policy)
            .field("tracker", &self.tracker)
            .finish_non_exhaustive()
    }
}

impl Pipeline {
    /// Creates a pipeline that records params and metrics to
    /// `logs/metrics.jsonl`.
    ///
    /// # Errors
    ///
    /// Fails when a setting is out of range.
    pub fn new(config: PipelineConfig, fetcher: Arc<dyn PageFetcher>) -> Result<Self> {
        config.validate()?;
        let paths = config.paths();
        let retry_policy = RetryPolicy::with_max_attempts(config.max_retries);
        let tracker = RunTracker::new(paths.metrics.clone());
        Ok(Self {
            config,
            paths,
            fetcher,
            retry_policy,
            tracker,
        })
    }

    /// Replaces the retry policy derived from `max_retries`.
    #[must_use]
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    /// Replaces the metrics sink.
    #[must_use]
    pub fn with_tracker(mut self, tracker: RunTracker) -> Self {
        self.tracker = tracker;
        self
    }

    /// Settings this pipeline was built with.
    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Files and directories derived from `data_dir`.
    #[must_use]
    pub fn paths(&self) -> &DataPaths {
        &self.paths
    }

    /// Scans the listing page and adds new volume links to the volume list.
    /// Links found by earlier runs are kept.
    ///
    /// # Errors
    ///
    /// Fails when the listing page cannot be fetched or the list cannot be
    /// written.
    #[instrument(skip(self), fields(listing = %self.config.listing_url))]
    pub async fn discover(&self) -> Result<VolumeList> {
        let layout = self.config.layout.compile(self.config.page_wait)?;
        let mut links = discover_volumes(self.fetcher.as_ref(), &self.config.listing_url, &layout)
            .await
            .with_context(|| format!("Failed to discover volumes at {}", self.config.listing_url))?;

        if self.paths.volume_list.exists() {
            match VolumeList::load(&self.paths.volume_list) {
                Ok(existing) => links.extend(existing.urls),
                Err(error) => warn!(%error, "existing volume list is unreadable, replacing it"),
            }
        }

        let list = VolumeList::from_set(&links);
        list.save(&self.paths.volume_list).with_context(|| {
            format!(
                "Failed to write volume list {}",
                self.paths.volume_list.display()
            )
        })?;
        info!(volumes = list.urls.len(), "volume list saved");
        Ok(list)
    }

    /// Starts crawling every volume in the volume list. The returned handle
    /// exposes live counters for progress reporting.
    ///
    /// # Errors
    ///
    /// Fails when the volume list is missing or unreadable.
    pub fn start_crawl(&self) -> Result<CrawlHandle> {
        let volumes = VolumeList::load(&self.paths.volume_list).with_context(|| {
            format!(
                "Failed to read volume list {} (run `discover` first)",
                self.paths.volume_list.display()
            )
        })?;
        let layout = Arc::new(self.config.layout.compile(self.config.page_wait)?);
        let ledger = Arc::new(ProcessedLedger::load(&self.paths.ledger));
        let rate_limiter = Arc::new(RateLimiter::new(Duration::from_millis(
            self.config.rate_limit_ms,
        )));

        let crawler = ArticleCrawler::new(
            Arc::clone(&self.fetcher),
            layout,
            ledger,
            &self.paths.partial_dir,
            self.config.concurrency,
        )?
        .with_retry_policy(self.retry_policy.clone())
        .with_rate_limiter(rate_limiter)
        .with_max_pages(self.config.max_pages);

        debug!(volumes = volumes.urls.len(), "starting crawl");
        Ok(crawler.crawl(volumes.urls))
    }

    /// Crawls every volume and waits for the crawl to finish.
    ///
    /// # Errors
    ///
    /// Fails when the crawl cannot start or stops as a whole. Failed volumes
    /// and articles only show up in the summary.
    #[instrument(skip(self))]
    pub async fn crawl(&self) -> Result<CrawlSummary> {
        let summary = self.start_crawl()?.finish().await?;
        self.tracker.log_metric("articles_saved", as_metric(summary.articles_saved));
        self.tracker.log_metric("articles_failed", as_metric(summary.articles_failed));
        Ok(summary)
    }

    /// Merges partial article files into the canonical dataset.
    ///
    /// # Errors
    ///
    /// See [`crate::clean::merge`].
    pub fn merge(&self) -> Result<MergeReport> {
        let report = merge(&self.paths.partial_dir, &self.paths.canonical)?;
        self.tracker.log_metric("total_records", as_metric(report.total_records));
        Ok(report)
    }

    /// Clusters the canonical dataset and models the topics of each cluster.
    ///
    /// Writes the cluster files, charts, `run_result.json` and
    /// `topic_info.json`. A failure in one cluster's topic model leaves that
    /// cluster with an empty result; chart failures only log a warning.
    ///
    /// # Errors
    ///
    /// Fails when the dataset is missing, when there are too few articles or
    /// terms to vectorize, when the cluster count does not fit the dataset,
    /// or when a result file cannot be written.
    #[instrument(skip(self))]
    pub fn model(&self) -> Result<RunResult> {
        let records: Vec<ArticleRecord> =
            read_json_file(&self.paths.canonical).with_context(|| {
                format!(
                    "Failed to read dataset {} (run `merge` first)",
                    self.paths.canonical.display()
                )
            })?;
        let (records, documents): (Vec<ArticleRecord>, Vec<String>) = records
            .into_iter()
            .filter_map(|record| {
                let text = record.document_text();
                (!text.trim().is_empty()).then_some((record, text))
            })
            .unzip();
        debug!(articles = records.len(), "documents prepared");

        let (_, projection) = vectorize(&documents, self.config.max_features)
            .context("Failed to vectorize articles")?;
        let kmeans = KMeansConfig {
            seed: self.config.seed,
            ..KMeansConfig::default()
        };
        let clustering = cluster(&projection.points, self.config.cluster_sizing(), &kmeans)
            .context("Failed to cluster articles")?;

        write_cluster_files(&self.paths.clustered_dir, &records, &clustering.labels)?;
        if let Err(error) =
            write_cluster_scatter(&self.paths.scatter_chart(), &projection.points, &clustering.labels)
        {
            warn!(%error, "cluster scatter plot not written");
        }

        let extractor = TopicExtractor::new().with_seed(self.config.seed);
        let keywords = KeywordExtractor::new();
        let modelled: Vec<(usize, ClusterSummary, Option<ClusterTopicInfo>)> = (0..clustering.k)
            .into_par_iter()
            .map(|id| {
                let members: Vec<String> = clustering
                    .members(id)
                    .into_iter()
                    .map(|index| documents[index].clone())
                    .collect();
                let (summary, info) = self.model_cluster(id, &members, &extractor, &keywords);
                (id, summary, info)
            })
            .collect();

        let mut clusters = BTreeMap::new();
        let mut topic_info = BTreeMap::new();
        for (id, summary, info) in modelled {
            self.tracker
                .log_metric(&format!("cluster_{id}_coherence"), summary.coherence_score);
            clusters.insert(id, summary);
            if let Some(info) = info {
                topic_info.insert(id, info);
            }
        }

        let result = RunResult::new(clustering.silhouette, records.len(), clusters);
        result.write(&self.paths.run_result)?;
        write_topic_info(&self.paths.topic_info, &topic_info)?;

        self.tracker.log_param("n_clusters", clustering.k);
        self.tracker.log_param("adaptive_clusters", self.config.adaptive_clusters);
        self.tracker.log_param("max_features", self.config.max_features);
        self.tracker.log_param("seed", self.config.seed);
        self.tracker.log_metric("silhouette_score", result.silhouette_score);
        self.tracker.log_metric("coherence_score", result.coherence_score);
        self.tracker.log_metric("total_articles", as_metric(result.total_articles));

        info!(
            articles = result.total_articles,
            clusters = result.n_clusters,
            silhouette = result.silhouette_score,
            coherence = result.coherence_score,
            "modelling complete"
        );
        Ok(result)
    }

    /// Runs [`Pipeline::model`] on the blocking thread pool.
    ///
    /// # Errors
    ///
    /// See [`Pipeline::model`].
    pub async fn model_blocking(&self) -> Result<RunResult> {
        let pipeline = self.clone();
        tokio::task::spawn_blocking(move || pipeline.model())
            .await
            .context("Modelling task failed")?
    }

    /// Runs every stage in order.
    ///
    /// # Errors
    ///
    /// Stops at the first stage that fails as a whole.
    #[instrument(skip(self))]
    pub async fn run(&self) -> Result<PipelineRun> {
        let volumes = self.discover().await?.urls.len();
        let crawl = self.crawl().await?;
        let merge = self.merge()?;
        let result = self.model_blocking().await?;
        Ok(PipelineRun {
            volumes,
            crawl,
            merge,
            result,
        })
    }

    fn model_cluster(
        &self,
        id: usize,
        documents: &[String],
        extractor: &TopicExtractor,
        keywords: &KeywordExtractor,
    ) -> (ClusterSummary, Option<ClusterTopicInfo>) {
        let label = keywords.label_cluster(documents);
        let report = match extractor.extract_topics(documents) {
            Ok(report) => report,
            Err(error) => {
                warn!(cluster = id, %error, "topic extraction failed, recording an empty result");
                return (ClusterSummary::empty(documents.len(), label), None);
            }
        };

        if report.topics_count() > 0 {
            let path = self.paths.topic_chart(id);
            if let Err(error) = write_topic_barchart(&path, &format!("Cluster {id}"), &report) {
                warn!(cluster = id, %error, "topic chart not written");
            }
        }

        let summary = ClusterSummary {
            size: documents.len(),
            coherence_score: report.coherence_score,
            topics_count: report.topics_count(),
            keywords: label,
        };
        (summary, Some(ClusterTopicInfo::from(&report)))
    }
}

#[allow(clippy::cast_precision_loss)]
fn as_metric(count: usize) -> f64 {
    count as f64
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::fetch::{FetchError, FetchSession};
    use async_trait::async_trait;
    use tempfile::TempDir;

    struct Unreachable;

    #[async_trait]
    impl PageFetcher for Unreachable {
        async fn open_session(&self) -> Result<Box<dyn FetchSession>, FetchError> {
            Err(FetchError::session("offline"))
        }
    }

    fn pipeline(dir: &TempDir) -> Pipeline {
        let config = PipelineConfig {
            data_dir: dir.path().to_path_buf(),
            ..PipelineConfig::default()
        };
        Pipeline::new(config, Arc::new(Unreachable)).unwrap()
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let config = PipelineConfig {
            n_clusters: 0,
            ..PipelineConfig::default()
        };
        let err = Pipeline::new(config, Arc::new(Unreachable)).unwrap_err();
        assert!(err.to_string().contains("n_clusters"));
    }

    #[test]
    fn test_start_crawl_requires_volume_list() {
        let dir = TempDir::new().unwrap();
        let err = pipeline(&dir).start_crawl().unwrap_err();
        assert!(format!("{err:#}").contains("discover"));
    }

    #[test]
    fn test_model_requires_dataset() {
        let dir = TempDir::new().unwrap();
        let err = pipeline(&dir).model().unwrap_err();
        assert!(format!("{err:#}").contains("merge"));
    }

    #[tokio::test]
    async fn test_discover_failure_keeps_existing_list() {
        let dir = TempDir::new().unwrap();
        let pipeline = pipeline(&dir);
        let err = pipeline.discover().await.unwrap_err();
        assert!(format!("{err:#}").contains("offline"));
        assert!(!pipeline.paths().volume_list.exists());
    }

    #[test]
    fn test_merge_on_empty_directory_writes_empty_dataset() {
        let dir = TempDir::new().unwrap();
        let pipeline = pipeline(&dir);
        let report = pipeline.merge().unwrap();
        assert_eq!(report.total_records, 0);
        assert!(pipeline.paths().canonical.exists());
    }
}
