use thiserror::Error;

/// Caller-contract violations in vectorization and clustering.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AnalysisError {
    /// Too few documents to vectorize.
    #[error("need at least {required} documents, got {found}")]
    InsufficientDocuments {
        /// Documents supplied.
        found: usize,
        /// Minimum accepted.
        required: usize,
    },

    /// The vocabulary is too small to span two dimensions.
    #[error("need at least 2 vocabulary terms, got {found}")]
    InsufficientFeatures {
        /// Terms in the vocabulary.
        found: usize,
    },

    /// `k` must satisfy `2 <= k < n`.
    #[error("invalid cluster count {k} for {n} points: need 2 <= k < n")]
    InvalidClusterCount {
        /// Requested clusters.
        k: usize,
        /// Points to cluster.
        n: usize,
    },

    /// Every k-means run ended with an empty cluster, which happens when there
    /// are fewer distinct points than clusters.
    #[error("k-means left a cluster empty for k = {k}; too few distinct points")]
    EmptyCluster {
        /// Requested clusters.
        k: usize,
    },
}

impl AnalysisError {
    /// Creates an invalid cluster count error.
    #[must_use]
    pub fn invalid_cluster_count(k: usize, n: usize) -> Self {
        Self::InvalidClusterCount { k, n }
    }
}
