//! Class-based TF-IDF topic terms.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::analysis::{content_tokens, unigrams_and_bigrams};

/// Terms kept per topic.
pub const DEFAULT_TOP_TERMS: usize = 10;

/// One ranked topic term.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicTerm {
    /// Unigram or space-joined bigram.
    pub term: String,
    /// Class-based TF-IDF weight.
    pub weight: f64,
}

/// Topic id to its ranked terms. Id `-1` holds the outlier passages.
pub type TopicTerms = BTreeMap<i32, Vec<TopicTerm>>;

/// Ranks the terms of each topic.
///
/// Passages sharing a label are treated as one class document. A term's
/// weight in a class is `tf * ln(1 + A / f)`, where `tf` is its count in the
/// class, `f` its count over all classes and `A` the average number of terms
/// per class. Stop words are removed before bigrams are formed.
#[must_use]
pub fn class_tfidf(passages: &[String], labels: &[i32], top_n: usize) -> TopicTerms {
    let mut class_counts: BTreeMap<i32, HashMap<String, f64>> = BTreeMap::new();
    for (passage, &label) in passages.iter().zip(labels) {
        let counts = class_counts.entry(label).or_default();
        for gram in unigrams_and_bigrams(&content_tokens(passage)) {
            *counts.entry(gram).or_insert(0.0) += 1.0;
        }
    }
    if class_counts.is_empty() {
        return TopicTerms::new();
    }

    let mut frequency: HashMap<&str, f64> = HashMap::new();
    for counts in class_counts.values() {
        for (term, count) in counts {
            *frequency.entry(term.as_str()).or_insert(0.0) += count;
        }
    }
    let total: f64 = frequency.values().sum();
    #[allow(clippy::cast_precision_loss)]
    let average = total / class_counts.len() as f64;

    class_counts
        .iter()
        .map(|(&label, counts)| {
            let mut ranked: Vec<TopicTerm> = counts
                .iter()
                .map(|(term, &tf)| {
                    let f = frequency.get(term.as_str()).copied().unwrap_or(tf);
                    TopicTerm {
                        term: term.clone(),
                        weight: tf * (1.0 + average / f).ln(),
                    }
                })
                .filter(|t| t.weight > 0.0)
                .collect();
            ranked.sort_by(|a, b| b.weight.total_cmp(&a.weight).then_with(|| a.term.cmp(&b.term)));
            ranked.truncate(top_n);
            (label, ranked)
        })
        .collect()
}
