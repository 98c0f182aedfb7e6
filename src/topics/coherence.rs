//! Inter-topic coherence.

use std::collections::HashMap;

use super::terms::TopicTerms;
use crate::analysis::content_tokens;

/// Mean pairwise cosine similarity between the term sets of the valid topics.
///
/// Each topic with id `>= 0` and at least one term becomes a pseudo-document
/// of its terms, with bigram spaces replaced by `_`. Pseudo-documents are
/// count-vectorized with stop words removed. Returns 0.0 with fewer than two
/// valid topics or an empty vocabulary.
#[must_use]
pub fn topic_coherence(model: &TopicTerms) -> f64 {
    let vectors: Vec<HashMap<String, f64>> = model
        .iter()
        .filter(|(id, terms)| **id >= 0 && !terms.is_empty())
        .map(|(_, terms)| {
            let text = terms
                .iter()
                .map(|t| t.term.replace(' ', "_"))
                .collect::<Vec<_>>()
                .join(" ");
            let mut counts = HashMap::new();
            for token in content_tokens(&text) {
                *counts.entry(token).or_insert(0.0) += 1.0;
            }
            counts
        })
        .collect();

    if vectors.len() < 2 || vectors.iter().all(HashMap::is_empty) {
        return 0.0;
    }

    let mut total = 0.0;
    let mut pairs = 0u32;
    for (i, a) in vectors.iter().enumerate() {
        for b in &vectors[i + 1..] {
            total += sparse_cosine(a, b);
            pairs += 1;
        }
    }
    total / f64::from(pairs)
}

fn sparse_cosine(a: &HashMap<String, f64>, b: &HashMap<String, f64>) -> f64 {
    let dot: f64 = a
        .iter()
        .filter_map(|(term, x)| b.get(term).map(|y| x * y))
        .sum();
    let norm_a = a.values().map(|x| x * x).sum::<f64>().sqrt();
    let norm_b = b.values().map(|x| x * x).sum::<f64>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}
