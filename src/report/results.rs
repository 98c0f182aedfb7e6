//! Run results, per-cluster article files and topic hyperparameters.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use super::error::ReportError;
use crate::article::{ArticleRecord, read_json_file, write_json_atomic};
use crate::topics::{TopicHyperparameters, TopicReport};

/// Per-cluster entry of a [`RunResult`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterSummary {
    /// Articles in the cluster.
    pub size: usize,
    /// Topic coherence of the cluster, 0.0 when it has no topics.
    pub coherence_score: f64,
    /// Topics found, the outlier topic excluded.
    pub topics_count: usize,
    /// RAKE keyword label.
    pub keywords: Vec<String>,
}

impl ClusterSummary {
    /// Summary of a cluster that produced no topic model.
    #[must_use]
    pub fn empty(size: usize, keywords: Vec<String>) -> Self {
        Self {
            size,
            coherence_score: 0.0,
            topics_count: 0,
            keywords,
        }
    }
}

/// Outcome of one modelling run, written once as `run_result.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunResult {
    /// Silhouette of the article clustering, in `[-1, 1]`.
    pub silhouette_score: f64,
    /// Number of clusters requested.
    pub n_clusters: usize,
    /// Articles that had text to cluster.
    pub total_articles: usize,
    /// Per-cluster summaries keyed by cluster id.
    pub clusters: BTreeMap<usize, ClusterSummary>,
    /// Mean of the positive per-cluster coherence scores.
    pub coherence_score: f64,
}

impl RunResult {
    /// Assembles a result; the overall coherence is derived from `clusters`.
    #[must_use]
    pub fn new(
        silhouette_score: f64,
        total_articles: usize,
        clusters: BTreeMap<usize, ClusterSummary>,
    ) -> Self {
        let coherence_score = overall_coherence(clusters.values().map(|c| c.coherence_score));
        Self {
            silhouette_score,
            n_clusters: clusters.len(),
            total_articles,
            clusters,
            coherence_score,
        }
    }

    /// Writes the result atomically.
    ///
    /// # Errors
    ///
    /// Returns [`ReportError::Store`] on I/O or serialization failure.
    #[instrument(skip(self), fields(path = %path.display()))]
    pub fn write(&self, path: &Path) -> Result<(), ReportError> {
        write_json_atomic(path, self)?;
        info!(
            silhouette = self.silhouette_score,
            coherence = self.coherence_score,
            clusters = self.n_clusters,
            "run result written"
        );
        Ok(())
    }

    /// Reads a result written by [`RunResult::write`].
    ///
    /// # Errors
    ///
    /// Returns [`ReportError::Store`] when the file is missing or malformed.
    pub fn read(path: &Path) -> Result<Self, ReportError> {
        Ok(read_json_file(path)?)
    }
}

/// Mean of the strictly positive scores, 0.0 when there are none.
#[must_use]
pub fn overall_coherence<I>(scores: I) -> f64
where
    I: IntoIterator<Item = f64>,
{
    let positive: Vec<f64> = scores.into_iter().filter(|&s| s > 0.0).collect();
    if positive.is_empty() {
        return 0.0;
    }
    #[allow(clippy::cast_precision_loss)]
    let count = positive.len() as f64;
    positive.iter().sum::<f64>() / count
}

#[derive(Serialize)]
struct ClusteredArticle<'a> {
    #[serde(flatten)]
    record: &'a ArticleRecord,
    cluster: usize,
}

/// Writes `cluster_<id>.json` for each cluster, replacing the files of any
/// earlier run. Each article carries its `cluster` id.
///
/// # Errors
///
/// Returns [`ReportError`] when stale files cannot be removed or a cluster
/// file cannot be written.
#[instrument(skip(records, labels), fields(dir = %dir.display(), records = records.len()))]
pub fn write_cluster_files(
    dir: &Path,
    records: &[ArticleRecord],
    labels: &[usize],
) -> Result<Vec<PathBuf>, ReportError> {
    remove_stale_cluster_files(dir)?;

    let mut grouped: BTreeMap<usize, Vec<ClusteredArticle<'_>>> = BTreeMap::new();
    for (record, &cluster) in records.iter().zip(labels) {
        grouped
            .entry(cluster)
            .or_default()
            .push(ClusteredArticle { record, cluster });
    }

    let mut written = Vec::with_capacity(grouped.len());
    for (cluster, articles) in &grouped {
        let path = dir.join(cluster_file_name(*cluster));
        write_json_atomic(&path, articles)?;
        written.push(path);
    }
    debug!(files = written.len(), "cluster files written");
    Ok(written)
}

/// `cluster_<id>.json`.
#[must_use]
pub fn cluster_file_name(cluster: usize) -> String {
    format!("cluster_{cluster}.json")
}

fn remove_stale_cluster_files(dir: &Path) -> Result<(), ReportError> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(ReportError::io(dir, e)),
    };
    for entry in entries {
        let path = entry.map_err(|e| ReportError::io(dir, e))?.path();
        let stale = path
            .file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| name.starts_with("cluster_") && name.ends_with(".json"));
        if stale {
            fs::remove_file(&path).map_err(|e| ReportError::io(&path, e))?;
        }
    }
    Ok(())
}

/// Topic hyperparameters and terms of one cluster, as stored in
/// `topic_info.json`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClusterTopicInfo {
    #[serde(flatten)]
    pub hyperparameters: TopicHyperparameters,
    pub coherence_score: f64,
    /// Topic id to its ranked terms.
    pub topics: BTreeMap<i32, Vec<String>>,
}

impl From<&TopicReport> for ClusterTopicInfo {
    fn from(report: &TopicReport) -> Self {
        Self {
            hyperparameters: report.hyperparameters.clone(),
            coherence_score: report.coherence_score,
            topics: report
                .model
                .iter()
                .map(|(&id, terms)| (id, terms.iter().map(|t| t.term.clone()).collect()))
                .collect(),
        }
    }
}

/// Writes `topic_info.json`: cluster id to [`ClusterTopicInfo`].
///
/// # Errors
///
/// Returns [`ReportError::Store`] on I/O or serialization failure.
pub fn write_topic_info(
    path: &Path,
    info: &BTreeMap<usize, ClusterTopicInfo>,
) -> Result<(), ReportError> {
    write_json_atomic(path, info)?;
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::article::NOT_FOUND;
    use crate::topics::{ProjectionParams, TopicTerm, TopicTerms};
    use tempfile::TempDir;

    fn summary(size: usize, coherence: f64) -> ClusterSummary {
        ClusterSummary {
            size,
            coherence_score: coherence,
            topics_count: 2,
            keywords: vec!["genome sequencing".to_string()],
        }
    }

    fn record(title: &str) -> ArticleRecord {
        ArticleRecord {
            title: title.to_string(),
            abstract_text: NOT_FOUND.to_string(),
            authors: NOT_FOUND.to_string(),
            journal_conference_name: "IEEE Access".to_string(),
            publisher: "IEEE".to_string(),
            year: "2023".to_string(),
            doi: NOT_FOUND.to_string(),
            group_name: "OpsA".to_string(),
            url: None,
        }
    }

    #[test]
    fn test_overall_coherence_ignores_non_positive_scores() {
        assert!((overall_coherence([0.4, 0.0, 0.6, -0.1]) - 0.5).abs() < 1e-12);
        assert!(overall_coherence([0.0, 0.0]).abs() < f64::EPSILON);
        assert!(overall_coherence([]).abs() < f64::EPSILON);
    }

    #[test]
    fn test_run_result_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("logs").join("run_result.json");
        let clusters = BTreeMap::from([(0, summary(3, 0.123_456_789)), (1, summary(2, 0.0))]);
        let result = RunResult::new(0.654_321, 5, clusters);

        result.write(&path).unwrap();
        let back = RunResult::read(&path).unwrap();

        assert_eq!(back.n_clusters, 2);
        assert_eq!(back.total_articles, 5);
        assert!((back.silhouette_score - 0.654_321).abs() < 1e-6);
        assert!((back.coherence_score - 0.123_456_789).abs() < 1e-6);
        assert_eq!(back.clusters[&1], result.clusters[&1]);
    }

    #[test]
    fn test_run_result_json_shape() {
        let result = RunResult::new(0.5, 3, BTreeMap::from([(2, summary(3, 0.25))]));
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["clusters"]["2"]["topics_count"], 2);
        assert_eq!(value["n_clusters"], 1);
    }

    #[test]
    fn test_cluster_files_carry_cluster_field_and_replace_stale_files() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("cluster_9.json"), "[]").unwrap();
        let records = vec![record("a"), record("b"), record("c")];

        let written = write_cluster_files(dir.path(), &records, &[1, 0, 1]).unwrap();

        assert_eq!(written.len(), 2);
        assert!(!dir.path().join("cluster_9.json").exists());
        let raw = fs::read_to_string(dir.path().join("cluster_1.json")).unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value.as_array().unwrap().len(), 2);
        assert_eq!(value[0]["cluster"], 1);
        assert_eq!(value[1]["title"], "c");
        assert!(value[0].get("url").is_none());
    }

    #[test]
    fn test_topic_info_flattens_hyperparameters() {
        let report = TopicReport {
            model: TopicTerms::from([(
                0,
                vec![TopicTerm {
                    term: "genome sequencing".to_string(),
                    weight: 1.5,
                }],
            )]),
            topic_sizes: BTreeMap::from([(0, 4)]),
            coherence_score: 0.0,
            hyperparameters: TopicHyperparameters {
                min_topic_size: 2,
                vectorizer_model: "tfidf".to_string(),
                projection: ProjectionParams::for_points(8),
            },
        };
        let info = BTreeMap::from([(0, ClusterTopicInfo::from(&report))]);
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("topic_info.json");
        write_topic_info(&path, &info).unwrap();

        let value: serde_json::Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["0"]["min_topic_size"], 2);
        assert_eq!(value["0"]["projection"]["metric"], "cosine");
        assert_eq!(value["0"]["topics"]["0"][0], "genome sequencing");
    }
}
