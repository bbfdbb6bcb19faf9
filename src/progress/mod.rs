//! Poll-friendly progress views over download jobs.
//!
//! UI hosts poll on a timer; re-rendering identical text every tick causes
//! flicker, so the reporter suppresses fields that have not changed since
//! the previous poll and tells the caller when polling can stop.

use std::sync::Arc;

use crate::jobs::{DownloadJobManager, JobSnapshot};

const MIB: u64 = 1024 * 1024;

/// Rendered progress for one poll tick.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressView {
    /// Clamped to 0..=100.
    pub percent: u8,
    pub done_mib: u64,
    /// 0 when the total is unknown.
    pub total_mib: u64,
    /// Human-readable transfer line.
    pub label: String,
}

/// One poll result. `None` fields mean "unchanged since the last poll".
#[derive(Debug, Clone, Default)]
pub struct PollUpdate {
    pub progress: Option<ProgressView>,
    pub status: Option<String>,
    /// False once the job is terminal or unknown.
    pub keep_polling: bool,
}

/// Change-suppressed polling facade over a [`DownloadJobManager`].
pub struct ProgressReporter {
    manager: Arc<DownloadJobManager>,
}

impl ProgressReporter {
    #[must_use]
    pub fn new(manager: Arc<DownloadJobManager>) -> Self {
        Self { manager }
    }

    /// Polls the job under `key`. An unknown key yields a neutral update
    /// with `keep_polling = false`.
    #[must_use]
    pub fn poll(&self, key: &str) -> PollUpdate {
        let Some(diff) = self.manager.poll_diff(key) else {
            return PollUpdate::default();
        };

        let keep_polling = !diff.snapshot.status.is_terminal();
        PollUpdate {
            progress: diff.progress_changed.then(|| render(&diff.snapshot)),
            status: diff
                .status_changed
                .then(|| diff.snapshot.message.clone()),
            keep_polling,
        }
    }
}

fn render(snapshot: &JobSnapshot) -> ProgressView {
    let percent = snapshot.percent.min(100);
    let done_mib = snapshot.bytes_done / MIB;
    let total_mib = snapshot.bytes_total / MIB;
    let label = if snapshot.bytes_total > 0 {
        format!("{}: {done_mib} / {total_mib} MiB", snapshot.filename)
    } else {
        format!("{}: {done_mib} MiB", snapshot.filename)
    };
    ProgressView {
        percent,
        done_mib,
        total_mib,
        label,
    }
}
