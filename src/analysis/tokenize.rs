//! Word tokenization shared by the vectorizer and topic extraction.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use stop_words::{LANGUAGE, get};

/// Words of two or more word characters.
#[allow(clippy::expect_used)]
static TOKEN_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b\w\w+\b").expect("token regex is valid")); // Static pattern, safe to panic

static ENGLISH_STOP_WORDS: LazyLock<HashSet<String>> = LazyLock::new(|| {
    get(LANGUAGE::English)
        .into_iter()
        .map(|word| word.to_lowercase())
        .collect()
});

/// Lower-cased tokens of `text` in order.
///
/// ```
/// use topicmap_core::analysis::tokenize;
///
/// assert_eq!(tokenize("Deep-Learning for a GPU!"), vec!["deep", "learning", "for", "gpu"]);
/// ```
#[must_use]
pub fn tokenize(text: &str) -> Vec<String> {
    let lowered = text.to_lowercase();
    TOKEN_PATTERN
        .find_iter(&lowered)
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Returns true for English stop words.
#[must_use]
pub fn is_stop_word(token: &str) -> bool {
    ENGLISH_STOP_WORDS.contains(token)
}

/// [`tokenize`] with English stop words removed.
#[must_use]
pub fn content_tokens(text: &str) -> Vec<String> {
    tokenize(text)
        .into_iter()
        .filter(|token| !is_stop_word(token))
        .collect()
}

/// Unigrams followed by space-joined bigrams of adjacent tokens.
#[must_use]
pub fn unigrams_and_bigrams(tokens: &[String]) -> Vec<String> {
    let mut grams: Vec<String> = tokens.to_vec();
    grams.extend(tokens.windows(2).map(|pair| format!("{} {}", pair[0], pair[1])));
    grams
}
