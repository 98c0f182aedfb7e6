//! Atomic JSON persistence shared by the ledger, partial files and outputs.

use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::debug;

/// Errors reading or writing JSON files.
#[derive(Debug, Error)]
pub enum StoreError {
    /// File system failure.
    #[error("I/O error on {path}: {source}")]
    Io {
        /// File involved.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// Malformed or unserializable JSON.
    #[error("JSON error on {path}: {source}")]
    Json {
        /// File involved.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: serde_json::Error,
    },
}

impl StoreError {
    /// Creates an I/O error for `path`.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Creates a JSON error for `path`.
    pub fn json(path: impl Into<PathBuf>, source: serde_json::Error) -> Self {
        Self::Json {
            path: path.into(),
            source,
        }
    }
}

/// Serializes `value` to `path` through a sibling temp file and a rename, so
/// readers never observe a half-written file.
///
/// Parent directories are created as needed.
///
/// # Errors
///
/// Returns [`StoreError`] on I/O or serialization failure. The temp file is
/// removed on failure.
pub fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), StoreError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).map_err(|e| StoreError::io(parent, e))?;
    }

    let tmp_path = temp_path_for(path);
    let write_result = (|| {
        let file = fs::File::create(&tmp_path).map_err(|e| StoreError::io(&tmp_path, e))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, value)
            .map_err(|e| StoreError::json(&tmp_path, e))?;
        writer.flush().map_err(|e| StoreError::io(&tmp_path, e))?;
        let file = writer
            .into_inner()
            .map_err(|e| StoreError::io(&tmp_path, e.into_error()))?;
        file.sync_all().map_err(|e| StoreError::io(&tmp_path, e))?;
        fs::rename(&tmp_path, path).map_err(|e| StoreError::io(path, e))
    })();

    if write_result.is_err() {
        // Leave nothing behind that a later merge could pick up.
        let _ = fs::remove_file(&tmp_path);
    } else {
        debug!(path = %path.display(), "wrote json file");
    }
    write_result
}

/// Reads and deserializes a JSON file.
///
/// # Errors
///
/// Returns [`StoreError`] when the file cannot be read or parsed.
pub fn read_json_file<T: DeserializeOwned>(path: &Path) -> Result<T, StoreError> {
    let raw = fs::read_to_string(path).map_err(|e| StoreError::io(path, e))?;
    serde_json::from_str(&raw).map_err(|e| StoreError::json(path, e))
}

/// Partial file name for an article URL: `article_<16 hex chars>.json`.
///
/// The name is a stable hash of the URL, so re-crawling the same article
/// overwrites its own partial instead of adding a duplicate.
#[must_use]
pub fn partial_file_name(url: &str) -> String {
    let digest = Sha256::digest(url.as_bytes());
    let hex: String = digest.iter().take(8).map(|b| format!("{b:02x}")).collect();
    format!("article_{hex}.json")
}

fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(std::ffi::OsStr::to_os_string)
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}
