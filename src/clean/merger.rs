use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use super::normalize::{dedup_key, normalize_record};
use crate::article::{ArticleRecord, StoreError, read_json_file, write_json_atomic};

/// Errors that abort a merge. Bad partial files never do.
#[derive(Debug, Error)]
pub enum MergeError {
    /// The partial directory could not be listed.
    #[error("cannot list partial directory {path}: {source}")]
    ListPartials {
        /// Directory involved.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The existing canonical dataset is unreadable.
    #[error("existing dataset is unreadable: {0}")]
    Canonical(#[source] StoreError),

    /// Writing the merged dataset failed; partials were left in place.
    #[error("failed to write merged dataset: {0}")]
    Write(#[source] StoreError),
}

/// Counts from one merge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeReport {
    /// Partial files merged and removed.
    pub files_merged: usize,
    /// Partial files that failed to parse and were deleted.
    pub files_rejected: usize,
    /// Records read from partial files.
    pub records_read: usize,
    /// Records dropped as duplicates (including against the existing dataset).
    pub duplicates_dropped: usize,
    /// Records in the canonical dataset after the merge.
    pub total_records: usize,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum PartialContent {
    Many(Vec<ArticleRecord>),
    One(Box<ArticleRecord>),
}

impl PartialContent {
    fn into_records(self) -> Vec<ArticleRecord> {
        match self {
            Self::Many(records) => records,
            Self::One(record) => vec![*record],
        }
    }
}

/// Folds every partial file in `partial_dir` into the dataset at
/// `canonical_path`.
///
/// Records already in the dataset come first, then partials in (modification
/// time, file name) order. After normalization, the first record for each
/// dedup key wins. The dataset is written atomically before any partial is
/// deleted, so an interrupted merge can simply be re-run.
///
/// A missing partial directory is treated as empty.
///
/// # Errors
///
/// Returns [`MergeError`] when the directory cannot be listed, the existing
/// dataset is corrupt, or the merged dataset cannot be written.
#[instrument(fields(partials = %partial_dir.display(), canonical = %canonical_path.display()))]
pub fn merge(partial_dir: &Path, canonical_path: &Path) -> Result<MergeReport, MergeError> {
    let mut report = MergeReport::default();

    let mut records: Vec<ArticleRecord> = if canonical_path.exists() {
        read_json_file(canonical_path).map_err(MergeError::Canonical)?
    } else {
        Vec::new()
    };
    let existing = records.len();
    debug!(existing, "loaded canonical dataset");

    let partials = list_partials(partial_dir)?;
    let mut consumed = Vec::with_capacity(partials.len());
    for path in partials {
        match read_json_file::<PartialContent>(&path) {
            Ok(content) => {
                let batch = content.into_records();
                report.records_read += batch.len();
                records.extend(batch);
                consumed.push(path);
            }
            Err(error) => {
                warn!(path = %path.display(), %error, "discarding malformed partial file");
                if let Err(error) = fs::remove_file(&path) {
                    warn!(path = %path.display(), %error, "could not delete malformed partial file");
                }
                report.files_rejected += 1;
            }
        }
    }

    let before = records.len();
    let merged = dedup_records(records);
    report.duplicates_dropped = before - merged.len();
    report.total_records = merged.len();

    write_json_atomic(canonical_path, &merged).map_err(MergeError::Write)?;

    for path in &consumed {
        if let Err(error) = fs::remove_file(path) {
            warn!(path = %path.display(), %error, "could not delete merged partial file");
        }
    }
    report.files_merged = consumed.len();

    info!(
        files_merged = report.files_merged,
        files_rejected = report.files_rejected,
        records_read = report.records_read,
        duplicates_dropped = report.duplicates_dropped,
        total_records = report.total_records,
        "merge complete"
    );
    Ok(report)
}

/// Normalizes each record and keeps the first one per dedup key. Records
/// without a key are kept as they are.
#[must_use]
pub fn dedup_records(records: Vec<ArticleRecord>) -> Vec<ArticleRecord> {
    let mut seen = HashSet::new();
    records
        .into_iter()
        .filter_map(|mut record| {
            normalize_record(&mut record);
            match dedup_key(&record) {
                Some(key) => seen.insert(key).then_some(record),
                None => Some(record),
            }
        })
        .collect()
}

fn list_partials(partial_dir: &Path) -> Result<Vec<PathBuf>, MergeError> {
    let entries = match fs::read_dir(partial_dir) {
        Ok(entries) => entries,
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(source) => {
            return Err(MergeError::ListPartials {
                path: partial_dir.to_path_buf(),
                source,
            });
        }
    };

    let mut partials: Vec<(SystemTime, PathBuf)> = entries
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| path.is_file() && path.extension().is_some_and(|ext| ext == "json"))
        .map(|path| {
            let modified = fs::metadata(&path)
                .and_then(|meta| meta.modified())
                .unwrap_or(SystemTime::UNIX_EPOCH);
            (modified, path)
        })
        .collect();
    partials.sort();
    Ok(partials.into_iter().map(|(_, path)| path).collect())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_merge_missing_partial_dir_writes_empty_dataset() {
        let dir = TempDir::new().unwrap();
        let canonical = dir.path().join("cleaned.json");

        let report = merge(&dir.path().join("absent"), &canonical).unwrap();

        assert_eq!(report, MergeReport::default());
        let back: Vec<ArticleRecord> = read_json_file(&canonical).unwrap();
        assert!(back.is_empty());
    }

    #[test]
    fn test_merge_accepts_array_partials() {
        let dir = TempDir::new().unwrap();
        let partials = dir.path().join("partials");
        fs::create_dir_all(&partials).unwrap();
        fs::write(
            partials.join("batch.json"),
            r#"[{"title": "A"}, {"title": "B"}, {"title": "a"}]"#,
        )
        .unwrap();
        let canonical = dir.path().join("cleaned.json");

        let report = merge(&partials, &canonical).unwrap();

        assert_eq!(report.records_read, 3);
        assert_eq!(report.duplicates_dropped, 1);
        assert_eq!(report.total_records, 2);
        assert!(!partials.join("batch.json").exists());
    }

    #[test]
    fn test_dedup_records_keeps_first_per_key_and_all_keyless() {
        let records: Vec<ArticleRecord> = serde_json::from_str(
            r#"[
                {"title": "First", "doi": "https://doi.org/10.1/X"},
                {"abstract": "No title or DOI."},
                {"title": "Second", "doi": "10.1/x"},
                {"abstract": "Another without a key."}
            ]"#,
        )
        .unwrap();

        let kept = dedup_records(records);

        assert_eq!(kept.len(), 3);
        assert_eq!(kept[0].title, "First");
        assert!(kept.iter().all(|r| r.title != "Second"));
    }

    #[test]
    fn test_merge_ignores_non_json_files() {
        let dir = TempDir::new().unwrap();
        let partials = dir.path().join("partials");
        fs::create_dir_all(&partials).unwrap();
        fs::write(partials.join("notes.txt"), "keep me").unwrap();

        let report = merge(&partials, &dir.path().join("out.json")).unwrap();

        assert_eq!(report.files_rejected, 0);
        assert!(partials.join("notes.txt").exists());
    }

    #[test]
    fn test_merge_refuses_corrupt_canonical_and_keeps_partials() {
        let dir = TempDir::new().unwrap();
        let partials = dir.path().join("partials");
        fs::create_dir_all(&partials).unwrap();
        fs::write(partials.join("a.json"), r#"{"title": "A"}"#).unwrap();
        let canonical = dir.path().join("cleaned.json");
        fs::write(&canonical, "[{broken").unwrap();

        let err = merge(&partials, &canonical).unwrap_err();

        assert!(matches!(err, MergeError::Canonical(_)));
        assert!(partials.join("a.json").exists());
    }
}
