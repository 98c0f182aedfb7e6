//! Document vectorization and clustering.
//!
//! [`vectorize`] turns documents into a TF-IDF [`TermMatrix`] and a 2-D PCA
//! [`Projection2D`]; [`cluster`] partitions the projected points with k-means
//! and scores the result with the mean silhouette coefficient.

mod error;
mod kmeans;
pub mod linalg;
mod tokenize;
mod vectorizer;

pub use error::AnalysisError;
pub use kmeans::{
    ClusterSizing, Clustering, DEFAULT_CLUSTERS, DEFAULT_SEED, KMeansConfig, cluster,
    silhouette_score,
};
pub use tokenize::{content_tokens, is_stop_word, tokenize, unigrams_and_bigrams};
pub use vectorizer::{
    DEFAULT_MAX_FEATURES, Projection2D, TermMatrix, TfidfVectorizer, pca_2d, vectorize,
};
