use thiserror::Error;

use crate::analysis::AnalysisError;

/// Errors raised while modelling the topics of one cluster.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TopicError {
    /// The embedder could not vectorize the passages.
    #[error("passage embedding failed: {0}")]
    Embedding(#[from] AnalysisError),

    /// An embedder returned the wrong number of vectors.
    #[error("embedder returned {found} vectors for {expected} passages")]
    EmbeddingCount {
        /// Passages supplied.
        expected: usize,
        /// Vectors returned.
        found: usize,
    },
}

impl TopicError {
    /// Creates an embedding count mismatch error.
    #[must_use]
    pub fn embedding_count(expected: usize, found: usize) -> Self {
        Self::EmbeddingCount { expected, found }
    }

    /// True when the passages carry too little vocabulary to model, which
    /// callers treat as an empty model rather than a failure.
    #[must_use]
    pub fn is_insufficient_data(&self) -> bool {
        matches!(
            self,
            Self::Embedding(
                AnalysisError::InsufficientDocuments { .. } | AnalysisError::InsufficientFeatures { .. }
            )
        )
    }
}
