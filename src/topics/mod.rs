//! Topic modelling within a cluster.
//!
//! Cluster documents are split into sentence passages, embedded
//! ([`Embedder`]), projected onto a low-dimensional manifold, grouped by
//! density into topics, and described with class-based TF-IDF terms. The
//! mean pairwise similarity of the topics' term sets is the cluster's
//! coherence score. [`KeywordExtractor`] produces a RAKE keyword label per
//! cluster.

mod coherence;
mod density;
mod embed;
mod error;
mod extractor;
mod keywords;
mod projection;
mod terms;

pub use coherence::topic_coherence;
pub use density::{DEFAULT_MIN_TOPIC_SIZE, OUTLIER_TOPIC, hdbscan};
pub use embed::{DEFAULT_EMBEDDING_FEATURES, Embedder, TfidfEmbedder};
pub use error::TopicError;
pub use extractor::{TopicExtractor, TopicHyperparameters, TopicReport, split_passages};
pub use keywords::{KeywordExtractor, MAX_KEYWORDS, normalize_keywords};
pub use projection::{ProjectionParams, project};
pub use terms::{DEFAULT_TOP_TERMS, TopicTerm, TopicTerms, class_tfidf};
