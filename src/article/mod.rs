//! Article metadata records and volume link lists.
//!
//! An [`ArticleRecord`] is produced by the crawler for each article detail page,
//! persisted as its own partial file while the pipeline is in flight, and later
//! folded into the canonical dataset by the merger. Every field is a string;
//! data missing from the source page carries the [`NOT_FOUND`] sentinel rather
//! than being omitted.

mod store;

use std::collections::BTreeSet;
use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

pub use store::{StoreError, partial_file_name, read_json_file, write_json_atomic};

/// Sentinel stored in any field the source page did not provide.
pub const NOT_FOUND: &str = "not found";

fn not_found() -> String {
    NOT_FOUND.to_string()
}

/// Returns true when `value` is empty or the [`NOT_FOUND`] sentinel.
#[must_use]
pub fn is_missing(value: &str) -> bool {
    let trimmed = value.trim();
    trimmed.is_empty() || trimmed.eq_ignore_ascii_case(NOT_FOUND)
}

/// Metadata for one journal article.
///
/// Deserialization tolerates absent fields by filling the sentinel, so older or
/// hand-edited partial files still merge. Non-string values are rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArticleRecord {
    /// Article title.
    #[serde(default = "not_found")]
    pub title: String,
    /// Abstract text.
    #[serde(rename = "abstract", default = "not_found")]
    pub abstract_text: String,
    /// Normalized author list joined with `", "`.
    #[serde(default = "not_found")]
    pub authors: String,
    /// Venue name (journal or conference).
    #[serde(default = "not_found")]
    pub journal_conference_name: String,
    /// Publisher name.
    #[serde(default = "not_found")]
    pub publisher: String,
    /// Publication year as printed on the page.
    #[serde(default = "not_found")]
    pub year: String,
    /// DOI, usually as a `https://doi.org/...` link.
    #[serde(default = "not_found")]
    pub doi: String,
    /// Collection group tag.
    #[serde(default = "not_found")]
    pub group_name: String,
    /// Source detail page. Dropped from the canonical dataset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl ArticleRecord {
    /// Text used for vectorization and topic modelling: the title followed by
    /// the abstract, skipping whichever is missing.
    #[must_use]
    pub fn document_text(&self) -> String {
        let parts: Vec<&str> = [self.title.as_str(), self.abstract_text.as_str()]
            .into_iter()
            .filter(|part| !is_missing(part))
            .map(str::trim)
            .collect();
        parts.join(". ")
    }
}

/// A listing URL identifying one publication volume or issue.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VolumeLink(String);

impl VolumeLink {
    /// Wraps a URL string.
    pub fn new(url: impl Into<String>) -> Self {
        Self(url.into())
    }

    /// Returns the URL string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VolumeLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// On-disk shape of the volume list: `{"URL": [...]}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeList {
    /// Volume URLs in file order.
    #[serde(rename = "URL", default)]
    pub urls: Vec<VolumeLink>,
}

impl VolumeList {
    /// Builds a list from a set, preserving the set's sorted order.
    #[must_use]
    pub fn from_set(links: &BTreeSet<VolumeLink>) -> Self {
        Self {
            urls: links.iter().cloned().collect(),
        }
    }

    /// Loads a volume list file, dropping repeated URLs while keeping the
    /// first occurrence.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the file is unreadable or malformed.
    #[instrument(fields(path = %path.display()))]
    pub fn load(path: &Path) -> Result<Self, StoreError> {
        let mut list: Self = read_json_file(path)?;
        let mut seen = BTreeSet::new();
        list.urls.retain(|link| seen.insert(link.clone()));
        debug!(count = list.urls.len(), "loaded volume list");
        Ok(list)
    }

    /// Writes the list atomically.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on I/O or serialization failure.
    pub fn save(&self, path: &Path) -> Result<(), StoreError> {
        write_json_atomic(path, self)
    }
}
