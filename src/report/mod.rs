//! Run outputs: the run-result file, per-cluster article files, topic
//! hyperparameters, SVG charts and the metrics log.

mod chart;
mod error;
mod results;
mod tracker;

pub use chart::{CHART_TOPICS, write_cluster_scatter, write_topic_barchart};
pub use error::ReportError;
pub use results::{
    ClusterSummary, ClusterTopicInfo, RunResult, cluster_file_name, overall_coherence,
    write_cluster_files, write_topic_info,
};
pub use tracker::RunTracker;
