//! Human-readable cluster labels from RAKE (Rapid Automatic Keyword
//! Extraction) keywords.

use std::collections::HashSet;

use rake::{Rake, StopWords};
use stop_words::{LANGUAGE, get};
use tracing::instrument;

/// Keywords kept per label.
pub const MAX_KEYWORDS: usize = 10;

/// RAKE keyword extractor with English stop words.
pub struct KeywordExtractor {
    rake: Rake,
}

impl std::fmt::Debug for KeywordExtractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeywordExtractor").finish()
    }
}

impl Default for KeywordExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl KeywordExtractor {
    /// Creates an extractor with the English stop-word list.
    #[must_use]
    pub fn new() -> Self {
        let mut stop_words = StopWords::new();
        for word in get(LANGUAGE::English) {
            stop_words.insert(word);
        }
        Self {
            rake: Rake::new(stop_words),
        }
    }

    /// Top keywords of `text` by RAKE score, normalized and deduplicated.
    #[must_use]
    #[instrument(skip(self, text), fields(len = text.len()))]
    pub fn extract(&self, text: &str) -> Vec<String> {
        if text.trim().is_empty() {
            return Vec::new();
        }
        let mut scored = self.rake.run(text);
        // RAKE's ordering among equal scores is unstable.
        scored.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.keyword.cmp(&b.keyword)));

        let mut keywords = normalize_keywords(scored.into_iter().map(|k| k.keyword));
        keywords.truncate(MAX_KEYWORDS);
        keywords
    }

    /// Keyword label for a cluster's documents.
    #[must_use]
    pub fn label_cluster(&self, documents: &[String]) -> Vec<String> {
        self.extract(&documents.join(". "))
    }
}

/// Lower-cases and trims keywords, dropping empties and later duplicates.
/// Rank order is preserved.
#[must_use]
pub fn normalize_keywords<I>(keywords: I) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    let mut seen = HashSet::new();
    keywords
        .into_iter()
        .map(|k| k.trim().to_lowercase())
        .filter(|k| !k.is_empty() && seen.insert(k.clone()))
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_from_academic_title() {
        let keywords = KeywordExtractor::new().extract("Machine Learning Approaches to Climate Change Prediction");
        assert!(!keywords.is_empty());
        assert!(keywords.iter().all(|k| k == &k.to_lowercase()));
    }

    #[test]
    fn test_extract_empty_input_returns_empty() {
        let extractor = KeywordExtractor::new();
        assert!(extractor.extract("").is_empty());
        assert!(extractor.extract("   ").is_empty());
    }

    #[test]
    fn test_extract_limits_to_ten() {
        let text = "climate change global warming temperature increase carbon dioxide emissions greenhouse gases renewable energy solar power wind energy fossil fuels sustainability environmental impact biodiversity conservation ecosystem degradation pollution air quality water resources ocean acidification sea level rise extreme weather natural disasters mitigation adaptation resilience policy regulations";
        assert!(KeywordExtractor::new().extract(text).len() <= MAX_KEYWORDS);
    }

    #[test]
    fn test_extract_is_deterministic() {
        let extractor = KeywordExtractor::new();
        let text = "Genome sequencing of tumor biopsies. Nanopore sequencing for methylation calling.";
        assert_eq!(extractor.extract(text), extractor.extract(text));
    }

    #[test]
    fn test_label_cluster_joins_documents() {
        let docs = vec![
            "Perovskite solar cells".to_string(),
            "Tandem perovskite modules".to_string(),
        ];
        let label = KeywordExtractor::new().label_cluster(&docs);
        assert!(!label.is_empty());
    }

    #[test]
    fn test_normalize_keywords_dedups_in_rank_order() {
        let input = vec![
            "  Neural Networks ".to_string(),
            "deep learning".to_string(),
            "neural networks".to_string(),
            String::new(),
        ];
        assert_eq!(normalize_keywords(input), vec!["neural networks", "deep learning"]);
    }
}
