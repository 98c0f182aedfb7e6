//! Per-cluster topic modelling.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use super::coherence::topic_coherence;
use super::density::{DEFAULT_MIN_TOPIC_SIZE, hdbscan};
use super::embed::{Embedder, TfidfEmbedder};
use super::error::TopicError;
use super::projection::{ProjectionParams, project};
use super::terms::{DEFAULT_TOP_TERMS, TopicTerms, class_tfidf};
use crate::analysis::{DEFAULT_SEED, content_tokens};

/// Hyperparameters a topic model was fitted with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicHyperparameters {
    /// Smallest reported topic.
    pub min_topic_size: usize,
    /// Name of the passage embedder.
    pub vectorizer_model: String,
    /// Manifold projection settings.
    pub projection: ProjectionParams,
}

/// Topic model of one cluster.
#[derive(Debug, Clone, PartialEq)]
pub struct TopicReport {
    /// Ranked terms per topic, outliers under `-1`.
    pub model: TopicTerms,
    /// Passages per topic.
    pub topic_sizes: BTreeMap<i32, usize>,
    /// Mean pairwise coherence of the non-outlier topics.
    pub coherence_score: f64,
    /// Settings the model was fitted with.
    pub hyperparameters: TopicHyperparameters,
}

impl TopicReport {
    /// Number of topics, the outlier topic excluded.
    #[must_use]
    pub fn topics_count(&self) -> usize {
        self.model.keys().filter(|&&id| id >= 0).count()
    }

    /// Up to `n` topics by descending size, the outlier topic excluded.
    #[must_use]
    pub fn largest_topics(&self, n: usize) -> Vec<(i32, usize)> {
        let mut sizes: Vec<(i32, usize)> = self
            .topic_sizes
            .iter()
            .filter(|(id, _)| **id >= 0)
            .map(|(&id, &size)| (id, size))
            .collect();
        sizes.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        sizes.truncate(n);
        sizes
    }
}

/// Splits documents into sentence passages on `.`, `!` and `?`.
///
/// A document text of the form `title. abstract` yields the title and then
/// each abstract sentence. Passages without content words are dropped.
#[must_use]
pub fn split_passages(documents: &[String]) -> Vec<String> {
    documents
        .iter()
        .flat_map(|doc| doc.split(['.', '!', '?']))
        .map(str::trim)
        .filter(|passage| !content_tokens(passage).is_empty())
        .map(String::from)
        .collect()
}

/// Fits a topic model per cluster.
#[derive(Clone)]
pub struct TopicExtractor {
    embedder: Arc<dyn Embedder>,
    min_topic_size: usize,
    top_terms: usize,
    seed: u64,
}

impl std::fmt::Debug for TopicExtractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TopicExtractor")
            .field("embedder", &self.embedder.name())
            .field("min_topic_size", &self.min_topic_size)
            .field("top_terms", &self.top_terms)
            .field("seed", &self.seed)
            .finish()
    }
}

impl Default for TopicExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl TopicExtractor {
    /// Creates an extractor with the TF-IDF embedder.
    #[must_use]
    pub fn new() -> Self {
        Self::with_embedder(Arc::new(TfidfEmbedder::default()))
    }

    /// Creates an extractor with a custom embedder.
    #[must_use]
    pub fn with_embedder(embedder: Arc<dyn Embedder>) -> Self {
        Self {
            embedder,
            min_topic_size: DEFAULT_MIN_TOPIC_SIZE,
            top_terms: DEFAULT_TOP_TERMS,
            seed: DEFAULT_SEED,
        }
    }

    /// Sets the smallest reported topic (at least 2).
    #[must_use]
    pub fn with_min_topic_size(mut self, min_topic_size: usize) -> Self {
        self.min_topic_size = min_topic_size.max(2);
        self
    }

    /// Sets the projection seed.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Models the topics of one cluster's documents.
    ///
    /// Fewer than two documents, or passages too sparse to embed, give an
    /// empty model with coherence 0.0.
    ///
    /// # Errors
    ///
    /// Returns [`TopicError`] when the embedder fails for other reasons or
    /// returns the wrong number of vectors.
    #[instrument(skip(self, documents), fields(documents = documents.len()))]
    pub fn extract_topics(&self, documents: &[String]) -> Result<TopicReport, TopicError> {
        if documents.len() < 2 {
            debug!("too few documents for topic modelling");
            return Ok(self.empty_report(0));
        }

        let passages = split_passages(documents);
        if passages.len() < 2 {
            return Ok(self.empty_report(passages.len()));
        }

        let embeddings = match self.embedder.embed(&passages) {
            Ok(embeddings) => embeddings,
            Err(e) if e.is_insufficient_data() => {
                debug!(error = %e, "passages too sparse for topic modelling");
                return Ok(self.empty_report(passages.len()));
            }
            Err(e) => return Err(e),
        };
        if embeddings.len() != passages.len() {
            return Err(TopicError::embedding_count(passages.len(), embeddings.len()));
        }

        let params = ProjectionParams::for_points(passages.len());
        let coordinates = project(&embeddings, &params, self.seed);
        let labels = hdbscan(&coordinates, self.min_topic_size);

        let mut topic_sizes = BTreeMap::new();
        for &label in &labels {
            *topic_sizes.entry(label).or_insert(0) += 1;
        }
        let model = class_tfidf(&passages, &labels, self.top_terms);
        let coherence_score = topic_coherence(&model);

        let report = TopicReport {
            model,
            topic_sizes,
            coherence_score,
            hyperparameters: self.hyperparameters(params),
        };
        info!(
            passages = passages.len(),
            topics = report.topics_count(),
            coherence = coherence_score,
            "topic extraction complete"
        );
        Ok(report)
    }

    fn hyperparameters(&self, projection: ProjectionParams) -> TopicHyperparameters {
        TopicHyperparameters {
            min_topic_size: self.min_topic_size,
            vectorizer_model: self.embedder.name().to_string(),
            projection,
        }
    }

    fn empty_report(&self, passages: usize) -> TopicReport {
        TopicReport {
            model: TopicTerms::new(),
            topic_sizes: BTreeMap::new(),
            coherence_score: 0.0,
            hyperparameters: self.hyperparameters(ProjectionParams::for_points(passages)),
        }
    }
}
