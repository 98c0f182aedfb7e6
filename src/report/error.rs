use std::path::PathBuf;

use thiserror::Error;

use crate::article::StoreError;

/// Errors writing run outputs.
#[derive(Debug, Error)]
pub enum ReportError {
    /// JSON output could not be written or read.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Filesystem error outside the JSON store.
    #[error("I/O error on {path}: {source}")]
    Io {
        /// Path involved.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// A chart had nothing to draw.
    #[error("nothing to chart for {path}")]
    EmptyChart {
        /// Chart destination.
        path: PathBuf,
    },
}

impl ReportError {
    /// Creates an I/O error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
