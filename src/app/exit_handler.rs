//! Maps stage outcomes to the process exit status: success, partial (some
//! items failed) or failure.

use topicmap_core::{CrawlSummary, MergeReport};

use crate::ProcessExit;

/// Exit outcome from succeeded and failed item counts.
pub(crate) fn determine_exit_outcome(completed: usize, failed: usize) -> ProcessExit {
    if failed == 0 {
        ProcessExit::Success
    } else if completed > 0 {
        ProcessExit::Partial
    } else {
        ProcessExit::Failure
    }
}

/// Volumes and articles count as items; skipped ones are neither.
pub(crate) fn crawl_outcome(summary: &CrawlSummary) -> ProcessExit {
    determine_exit_outcome(summary.completed(), summary.failed())
}

/// Rejected partial files are failed items.
pub(crate) fn merge_outcome(report: &MergeReport) -> ProcessExit {
    determine_exit_outcome(report.files_merged, report.files_rejected)
}
