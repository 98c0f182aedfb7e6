//! Persistent record of which URLs have been processed.
//!
//! The ledger is the crawler's only shared mutable state. Every check and
//! update happens under one async mutex, and the file is rewritten atomically
//! before the lock is released, so what is on disk always matches what workers
//! have observed.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, instrument, warn};

use crate::article::{StoreError, read_json_file, write_json_atomic};

/// Result of processing one URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    /// Fully processed; never fetched again.
    Success,
    /// Gave up; retried on the next run.
    Failure,
}

/// Errors from ledger persistence.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// The ledger file could not be written.
    #[error("failed to persist ledger: {0}")]
    Persist(#[source] StoreError),
}

/// URL -> [`Outcome`] map shared by all crawl workers via `Arc`.
#[derive(Debug)]
pub struct ProcessedLedger {
    path: Option<PathBuf>,
    entries: Mutex<BTreeMap<String, Outcome>>,
}

impl ProcessedLedger {
    /// Loads the ledger at `path`. A missing file starts an empty ledger; a
    /// malformed one is deleted and also starts empty.
    #[instrument(fields(path = %path.display()))]
    pub fn load(path: &Path) -> Self {
        let entries = if path.exists() {
            match read_json_file::<BTreeMap<String, Outcome>>(path) {
                Ok(entries) => entries,
                Err(error) => {
                    warn!(%error, "ledger file is malformed, starting empty");
                    if let Err(error) = fs::remove_file(path) {
                        warn!(%error, "could not delete malformed ledger file");
                    }
                    BTreeMap::new()
                }
            }
        } else {
            BTreeMap::new()
        };
        debug!(entries = entries.len(), "ledger loaded");
        Self {
            path: Some(path.to_path_buf()),
            entries: Mutex::new(entries),
        }
    }

    /// A ledger that is never written to disk.
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            path: None,
            entries: Mutex::new(BTreeMap::new()),
        }
    }

    /// Returns the recorded outcome for `url`.
    pub async fn outcome(&self, url: &str) -> Option<Outcome> {
        self.entries.lock().await.get(url).copied()
    }

    /// Returns true when `url` is marked [`Outcome::Success`].
    pub async fn is_success(&self, url: &str) -> bool {
        self.outcome(url).await == Some(Outcome::Success)
    }

    /// Records `outcome` for `url` and persists the ledger.
    ///
    /// A `Success` is never downgraded: marking a successful URL as `Failure`
    /// is a no-op and returns `Ok(false)`.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Persist`] when the file cannot be written. The
    /// in-memory entry is kept so the current run stays consistent.
    pub async fn mark(&self, url: &str, outcome: Outcome) -> Result<bool, LedgerError> {
        let mut entries = self.entries.lock().await;
        if outcome == Outcome::Failure && entries.get(url) == Some(&Outcome::Success) {
            return Ok(false);
        }
        if entries.get(url) == Some(&outcome) {
            return Ok(false);
        }
        entries.insert(url.to_string(), outcome);
        if let Some(path) = &self.path {
            write_json_atomic(path, &*entries).map_err(LedgerError::Persist)?;
        }
        debug!(url, ?outcome, "ledger updated");
        Ok(true)
    }

    /// Copy of all entries.
    pub async fn snapshot(&self) -> BTreeMap<String, Outcome> {
        self.entries.lock().await.clone()
    }

    /// Number of (success, failure) entries.
    pub async fn counts(&self) -> (usize, usize) {
        let entries = self.entries.lock().await;
        let success = entries.values().filter(|o| **o == Outcome::Success).count();
        (success, entries.len() - success)
    }
}
