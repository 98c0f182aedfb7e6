//! Optional run tracking: parameters and metrics as JSON lines.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::Value;
use tracing::warn;

#[derive(Debug, Serialize)]
#[serde(rename_all = "lowercase")]
enum EntryKind {
    Param,
    Metric,
}

#[derive(Debug, Serialize)]
struct Entry<'a> {
    kind: EntryKind,
    key: &'a str,
    value: Value,
}

/// Appends `{"kind", "key", "value"}` lines to a metrics file.
///
/// Tracking never fails a run: write errors are logged as warnings.
#[derive(Debug, Clone, Default)]
pub struct RunTracker {
    path: Option<PathBuf>,
}

impl RunTracker {
    /// Tracks into `path`, created on first write.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
        }
    }

    /// A tracker that records nothing.
    #[must_use]
    pub fn disabled() -> Self {
        Self { path: None }
    }

    /// Destination file, if tracking is enabled.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Records a run parameter.
    pub fn log_param(&self, key: &str, value: impl Serialize) {
        self.append(EntryKind::Param, key, value);
    }

    /// Records a run metric.
    pub fn log_metric(&self, key: &str, value: f64) {
        self.append(EntryKind::Metric, key, value);
    }

    fn append(&self, kind: EntryKind, key: &str, value: impl Serialize) {
        let Some(path) = &self.path else { return };
        if let Err(e) = write_entry(path, kind, key, value) {
            warn!(path = %path.display(), key, error = %e, "Failed to record run tracking entry");
        }
    }
}

fn write_entry(path: &Path, kind: EntryKind, key: &str, value: impl Serialize) -> std::io::Result<()> {
    let value = serde_json::to_value(value)?;
    let line = serde_json::to_string(&Entry { kind, key, value })?;
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    writeln!(file, "{line}")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_tracker_appends_json_lines() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("logs").join("metrics.jsonl");
        let tracker = RunTracker::new(&path);

        tracker.log_param("n_clusters", 3);
        tracker.log_metric("silhouette_score", 0.75);

        let raw = fs::read_to_string(&path).unwrap();
        let lines: Vec<Value> = raw.lines().map(|l| serde_json::from_str(l).unwrap()).collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["kind"], "param");
        assert_eq!(lines[0]["key"], "n_clusters");
        assert_eq!(lines[0]["value"], 3);
        assert_eq!(lines[1]["kind"], "metric");
        assert!((lines[1]["value"].as_f64().unwrap() - 0.75).abs() < f64::EPSILON);
    }

    #[test]
    fn test_tracker_failures_do_not_panic() {
        let dir = TempDir::new().unwrap();
        // A directory where the file should be makes every write fail.
        let tracker = RunTracker::new(dir.path());
        tracker.log_metric("coherence_score", 0.5);
        assert!(dir.path().is_dir());
    }

    #[test]
    fn test_disabled_tracker_writes_nothing() {
        let tracker = RunTracker::disabled();
        tracker.log_param("seed", 42);
        assert!(tracker.path().is_none());
    }
}
