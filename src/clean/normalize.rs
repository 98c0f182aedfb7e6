//! Field normalization applied to every record before it is merged.

use std::collections::BTreeSet;

use crate::article::{ArticleRecord, NOT_FOUND, is_missing};

/// Splits an author string on `,` and `;`, trims each name, drops empties and
/// repeats, and joins the sorted set with `", "`.
///
/// Returns the sentinel when no names remain.
///
/// ```
/// use topicmap_core::clean::normalize_authors;
///
/// assert_eq!(normalize_authors("Bob ; Alice, Bob,  ; Alice"), "Alice, Bob");
/// assert_eq!(normalize_authors(" ; , "), "not found");
/// ```
#[must_use]
pub fn normalize_authors(raw: &str) -> String {
    if is_missing(raw) {
        return NOT_FOUND.to_string();
    }
    let names: BTreeSet<&str> = raw
        .split([',', ';'])
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .collect();
    if names.is_empty() {
        return NOT_FOUND.to_string();
    }
    names.into_iter().collect::<Vec<_>>().join(", ")
}

/// Undoes JSON-style escaping left in scraped text: `\/` becomes `/`, then
/// `\\` becomes `\`. The result is trimmed.
///
/// ```
/// use topicmap_core::clean::strip_escapes;
///
/// assert_eq!(strip_escapes(r"https:\/\/example.com\/x"), "https://example.com/x");
/// ```
#[must_use]
pub fn strip_escapes(value: &str) -> String {
    value.replace("\\/", "/").replace("\\\\", "\\").trim().to_string()
}

/// Normalizes every field of `record` in place and drops its source URL.
pub fn normalize_record(record: &mut ArticleRecord) {
    for field in [
        &mut record.title,
        &mut record.abstract_text,
        &mut record.journal_conference_name,
        &mut record.publisher,
        &mut record.year,
        &mut record.doi,
        &mut record.group_name,
    ] {
        let cleaned = strip_escapes(field);
        *field = if cleaned.is_empty() {
            NOT_FOUND.to_string()
        } else {
            cleaned
        };
    }
    record.authors = normalize_authors(&strip_escapes(&record.authors));
    record.url = None;
}

/// Key two records share exactly when they describe the same article: the DOI
/// when present (case-folded, resolver prefix removed), else the title.
#[must_use]
pub fn dedup_key(record: &ArticleRecord) -> Option<String> {
    if !is_missing(&record.doi) {
        let doi = record.doi.trim().to_lowercase();
        let bare = ["https://doi.org/", "http://doi.org/", "https://dx.doi.org/", "http://dx.doi.org/"]
            .iter()
            .find_map(|prefix| doi.strip_prefix(prefix))
            .unwrap_or(&doi);
        return Some(format!("doi:{bare}"));
    }
    if !is_missing(&record.title) {
        return Some(format!("title:{}", record.title.trim().to_lowercase()));
    }
    None
}
