//! TF-IDF term weighting and a two-component PCA projection.

use std::collections::{BTreeMap, HashMap};

use tracing::{debug, instrument};

use super::error::AnalysisError;
use super::linalg::{dot, normalize, top_eigenpairs};
use super::tokenize::{content_tokens, tokenize};

/// Default vocabulary size.
pub const DEFAULT_MAX_FEATURES: usize = 500;

/// Seed for the PCA start vectors.
const PCA_SEED: u64 = 42;

/// Sparse document-term matrix with L2-normalized rows.
#[derive(Debug, Clone, PartialEq)]
pub struct TermMatrix {
    vocabulary: Vec<String>,
    rows: Vec<Vec<(usize, f64)>>,
}

impl TermMatrix {
    /// Number of documents.
    #[must_use]
    pub fn n_docs(&self) -> usize {
        self.rows.len()
    }

    /// Number of vocabulary terms.
    #[must_use]
    pub fn n_terms(&self) -> usize {
        self.vocabulary.len()
    }

    /// Vocabulary in column order (alphabetical).
    #[must_use]
    pub fn vocabulary(&self) -> &[String] {
        &self.vocabulary
    }

    /// Non-zero `(column, weight)` entries of row `doc`.
    #[must_use]
    pub fn row(&self, doc: usize) -> &[(usize, f64)] {
        self.rows.get(doc).map_or(&[], Vec::as_slice)
    }

    /// Dense copy of the matrix.
    #[must_use]
    pub fn to_dense(&self) -> Vec<Vec<f64>> {
        self.rows
            .iter()
            .map(|row| {
                let mut dense = vec![0.0; self.vocabulary.len()];
                for &(col, weight) in row {
                    dense[col] = weight;
                }
                dense
            })
            .collect()
    }
}

/// Documents projected onto the first two principal components.
#[derive(Debug, Clone, PartialEq)]
pub struct Projection2D {
    /// One point per document.
    pub points: Vec<[f64; 2]>,
    /// Variance captured by each component.
    pub explained_variance: [f64; 2],
}

/// TF-IDF vectorizer with a capped vocabulary.
#[derive(Debug, Clone, Copy)]
pub struct TfidfVectorizer {
    max_features: usize,
    remove_stop_words: bool,
}

impl Default for TfidfVectorizer {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FEATURES)
    }
}

impl TfidfVectorizer {
    /// Creates a vectorizer keeping at most `max_features` terms.
    #[must_use]
    pub fn new(max_features: usize) -> Self {
        Self {
            max_features: max_features.max(1),
            remove_stop_words: false,
        }
    }

    /// Drops English stop words before counting.
    #[must_use]
    pub fn with_stop_words_removed(mut self) -> Self {
        self.remove_stop_words = true;
        self
    }

    /// Builds the vocabulary from `documents` and weights them.
    ///
    /// The vocabulary holds the `max_features` terms with the highest corpus
    /// count (ties broken alphabetically). Weights are raw counts times the
    /// smoothed inverse document frequency `ln((1 + n) / (1 + df)) + 1`.
    ///
    /// # Errors
    ///
    /// [`AnalysisError::InsufficientDocuments`] for fewer than two documents
    /// and [`AnalysisError::InsufficientFeatures`] for fewer than two terms.
    #[instrument(skip(self, documents), fields(documents = documents.len(), max_features = self.max_features))]
    pub fn fit_transform(&self, documents: &[String]) -> Result<TermMatrix, AnalysisError> {
        if documents.len() < 2 {
            return Err(AnalysisError::InsufficientDocuments {
                found: documents.len(),
                required: 2,
            });
        }

        let doc_counts: Vec<HashMap<String, usize>> = documents
            .iter()
            .map(|doc| {
                let mut counts = HashMap::new();
                let tokens = if self.remove_stop_words {
                    content_tokens(doc)
                } else {
                    tokenize(doc)
                };
                for token in tokens {
                    *counts.entry(token).or_insert(0) += 1;
                }
                counts
            })
            .collect();

        let mut corpus_counts: BTreeMap<&str, (usize, usize)> = BTreeMap::new();
        for counts in &doc_counts {
            for (term, count) in counts {
                let entry = corpus_counts.entry(term.as_str()).or_insert((0, 0));
                entry.0 += count;
                entry.1 += 1;
            }
        }

        let mut ranked: Vec<(&str, usize, usize)> = corpus_counts
            .into_iter()
            .map(|(term, (total, df))| (term, total, df))
            .collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        ranked.truncate(self.max_features);
        ranked.sort_by(|a, b| a.0.cmp(b.0));

        if ranked.len() < 2 {
            return Err(AnalysisError::InsufficientFeatures {
                found: ranked.len(),
            });
        }

        #[allow(clippy::cast_precision_loss)]
        let n = documents.len() as f64;
        #[allow(clippy::cast_precision_loss)]
        let idf: Vec<f64> = ranked
            .iter()
            .map(|&(_, _, df)| ((1.0 + n) / (1.0 + df as f64)).ln() + 1.0)
            .collect();
        let columns: HashMap<&str, usize> = ranked
            .iter()
            .enumerate()
            .map(|(col, &(term, _, _))| (term, col))
            .collect();

        let rows = doc_counts
            .iter()
            .map(|counts| {
                let mut row: Vec<(usize, f64)> = counts
                    .iter()
                    .filter_map(|(term, &count)| {
                        columns.get(term.as_str()).map(|&col| {
                            #[allow(clippy::cast_precision_loss)]
                            let tf = count as f64;
                            (col, tf * idf[col])
                        })
                    })
                    .collect();
                row.sort_by_key(|&(col, _)| col);
                let length = row.iter().map(|(_, w)| w * w).sum::<f64>().sqrt();
                if length > 0.0 {
                    for (_, weight) in &mut row {
                        *weight /= length;
                    }
                }
                row
            })
            .collect();

        let vocabulary = ranked.into_iter().map(|(term, _, _)| term.to_string()).collect();
        Ok(TermMatrix { vocabulary, rows })
    }
}

/// Projects the rows of `matrix` onto their first two principal components.
///
/// Rows are centered first. The eigen-decomposition runs on the smaller of the
/// covariance (terms x terms) and Gram (documents x documents) operators. Each
/// component's sign is fixed so its largest-magnitude loading is positive.
#[must_use]
#[instrument(skip(matrix), fields(docs = matrix.n_docs(), terms = matrix.n_terms()))]
pub fn pca_2d(matrix: &TermMatrix) -> Projection2D {
    let mut data = matrix.to_dense();
    let n = data.len();
    let d = matrix.n_terms();
    if n == 0 || d == 0 {
        return Projection2D {
            points: vec![[0.0, 0.0]; n],
            explained_variance: [0.0, 0.0],
        };
    }

    #[allow(clippy::cast_precision_loss)]
    let n_f = n as f64;
    let mut mean = vec![0.0; d];
    for row in &data {
        for (m, x) in mean.iter_mut().zip(row) {
            *m += x / n_f;
        }
    }
    for row in &mut data {
        for (x, m) in row.iter_mut().zip(&mean) {
            *x -= m;
        }
    }

    let times_data = |v: &[f64]| -> Vec<f64> { data.iter().map(|row| dot(row, v)).collect() };
    let times_data_t = |u: &[f64]| -> Vec<f64> {
        let mut out = vec![0.0; d];
        for (row, &weight) in data.iter().zip(u) {
            for (o, x) in out.iter_mut().zip(row) {
                *o += weight * x;
            }
        }
        out
    };

    let mut components: Vec<Vec<f64>> = if n < d {
        top_eigenpairs(n, 2, |u| times_data(&times_data_t(u)), &[], PCA_SEED)
            .into_iter()
            .map(|(_, u)| {
                let mut v = times_data_t(&u);
                normalize(&mut v);
                v
            })
            .collect()
    } else {
        top_eigenpairs(d, 2, |v| times_data_t(&times_data(v)), &[], PCA_SEED)
            .into_iter()
            .map(|(_, v)| v)
            .collect()
    };
    components.resize(2, vec![0.0; d]);

    for component in &mut components {
        let pivot = component
            .iter()
            .copied()
            .max_by(|a, b| a.abs().total_cmp(&b.abs()))
            .unwrap_or(0.0);
        if pivot < 0.0 {
            for value in component.iter_mut() {
                *value = -*value;
            }
        }
    }

    let points: Vec<[f64; 2]> = data
        .iter()
        .map(|row| [dot(row, &components[0]), dot(row, &components[1])])
        .collect();

    let denominator = (n_f - 1.0).max(1.0);
    let mut explained_variance = [0.0; 2];
    for (axis, variance) in explained_variance.iter_mut().enumerate() {
        *variance = points.iter().map(|p| p[axis] * p[axis]).sum::<f64>() / denominator;
    }
    debug!(?explained_variance, "pca complete");

    Projection2D {
        points,
        explained_variance,
    }
}

/// Vectorizes `documents` and projects them to two dimensions.
///
/// # Errors
///
/// See [`TfidfVectorizer::fit_transform`].
pub fn vectorize(
    documents: &[String],
    max_features: usize,
) -> Result<(TermMatrix, Projection2D), AnalysisError> {
    let matrix = TfidfVectorizer::new(max_features).fit_transform(documents)?;
    let projection = pca_2d(&matrix);
    Ok((matrix, projection))
}
