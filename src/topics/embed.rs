//! Passage embedding.

use tracing::instrument;

use super::error::TopicError;
use crate::analysis::TfidfVectorizer;

/// Vocabulary cap of the default embedder.
pub const DEFAULT_EMBEDDING_FEATURES: usize = 1000;

/// Turns passages into fixed-width vectors, one per passage.
pub trait Embedder: Send + Sync {
    /// Short name recorded in the topic hyperparameters.
    fn name(&self) -> &str;

    /// Embeds `passages`; the result has exactly one vector per passage and
    /// every vector has the same width.
    ///
    /// # Errors
    ///
    /// Returns [`TopicError`] when the passages cannot be embedded.
    fn embed(&self, passages: &[String]) -> Result<Vec<Vec<f64>>, TopicError>;
}

/// TF-IDF over passages with stop words removed and unit-length rows.
#[derive(Debug, Clone, Copy)]
pub struct TfidfEmbedder {
    max_features: usize,
}

impl Default for TfidfEmbedder {
    fn default() -> Self {
        Self::new(DEFAULT_EMBEDDING_FEATURES)
    }
}

impl TfidfEmbedder {
    /// Creates an embedder with at most `max_features` dimensions.
    #[must_use]
    pub fn new(max_features: usize) -> Self {
        Self { max_features }
    }
}

impl Embedder for TfidfEmbedder {
    fn name(&self) -> &str {
        "tfidf"
    }

    #[instrument(skip(self, passages), fields(passages = passages.len()))]
    fn embed(&self, passages: &[String]) -> Result<Vec<Vec<f64>>, TopicError> {
        let matrix = TfidfVectorizer::new(self.max_features)
            .with_stop_words_removed()
            .fit_transform(passages)?;
        Ok(matrix.to_dense())
    }
}
