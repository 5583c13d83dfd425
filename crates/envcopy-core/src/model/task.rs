//! Per-object copy task state.

use std::fmt::{self, Display, Formatter};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::resource::{ResourceDescriptor, Tags};

/// Phase a copy task is in (or failed in).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CopyPhase {
    /// Removing any stale destination object.
    Deletion,
    /// Issuing the copy request.
    Initiation,
    /// Waiting for the destination to become ready.
    Polling,
    /// Re-applying and verifying required tags.
    TagRestore,
}

impl CopyPhase {
    /// Stable identifier used in logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Deletion => "deletion",
            Self::Initiation => "initiation",
            Self::Polling => "polling",
            Self::TagRestore => "tag_restore",
        }
    }
}

impl Display for CopyPhase {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal or pending outcome of a copy task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CopyStatus {
    /// Not started or still running.
    Pending,
    /// Destination object is ready.
    Succeeded,
    /// Task failed; see `phase` and `error`.
    Failed,
}

/// One `(source, destination)` pair processed by the copy orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CopyTask {
    /// Object being copied.
    pub source: ResourceDescriptor,
    /// Name the copy is created under.
    pub destination_name: String,
    /// Tags captured from the destination before it was deleted.
    pub saved_tags: Option<Tags>,
    /// Current (or failing) phase.
    pub phase: CopyPhase,
    /// Outcome.
    pub status: CopyStatus,
    /// Failure description when `status` is `Failed`.
    pub error: Option<String>,
    /// Wall time spent on the task, in seconds.
    pub elapsed_secs: u64,
    /// Extra polling allowance granted to large objects, in seconds.
    pub wait_allowance_secs: u64,
    /// Whether the deletion phase completed.
    pub destination_cleared: bool,
    /// Whether the provider accepted the copy request.
    pub copy_accepted: bool,
    /// Required tags still missing after reconciliation.
    pub missing_tags: Vec<String>,
}

impl CopyTask {
    /// New pending task.
    #[must_use]
    pub fn new(source: ResourceDescriptor, destination_name: impl Into<String>) -> Self {
        Self {
            source,
            destination_name: destination_name.into(),
            saved_tags: None,
            phase: CopyPhase::Deletion,
            status: CopyStatus::Pending,
            error: None,
            elapsed_secs: 0,
            wait_allowance_secs: 0,
            destination_cleared: false,
            copy_accepted: false,
            missing_tags: Vec::new(),
        }
    }

    /// Elapsed time in whole minutes.
    #[must_use]
    pub const fn elapsed_minutes(&self) -> u64 {
        self.elapsed_secs / 60
    }

    /// Record elapsed wall time.
    pub fn set_elapsed(&mut self, elapsed: Duration) {
        self.elapsed_secs = elapsed.as_secs();
    }

    /// Mark the task as failed in the given phase.
    pub fn fail(&mut self, phase: CopyPhase, error: impl Into<String>) {
        self.phase = phase;
        self.status = CopyStatus::Failed;
        self.error = Some(error.into());
    }

    /// Mark the task as succeeded.
    pub const fn succeed(&mut self) {
        self.status = CopyStatus::Succeeded;
    }

    /// Whether the task ended in failure.
    #[must_use]
    pub fn is_failed(&self) -> bool {
        self.status == CopyStatus::Failed
    }

    /// Whether the task completed but left required tags missing.
    #[must_use]
    pub fn has_incomplete_tags(&self) -> bool {
        !self.missing_tags.is_empty()
    }

    /// Whether a provider-side copy may exist even though the task failed.
    #[must_use]
    pub fn may_have_orphan(&self) -> bool {
        self.is_failed() && self.destination_cleared
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failing_records_phase_and_error() {
        let mut task = CopyTask::new(ResourceDescriptor::new("db-a"), "db-b");
        task.fail(CopyPhase::Polling, "timed out");
        assert!(task.is_failed());
        assert_eq!(task.phase, CopyPhase::Polling);
        assert_eq!(task.error.as_deref(), Some("timed out"));
    }

    #[test]
    fn orphan_candidates_require_cleared_destination() {
        let mut task = CopyTask::new(ResourceDescriptor::new("db-a"), "db-b");
        task.fail(CopyPhase::Deletion, "delete refused");
        assert!(!task.may_have_orphan());

        task.destination_cleared = true;
        assert!(task.may_have_orphan());
    }

    #[test]
    fn elapsed_minutes_truncate() {
        let mut task = CopyTask::new(ResourceDescriptor::new("db-a"), "db-b");
        task.set_elapsed(Duration::from_secs(179));
        assert_eq!(task.elapsed_minutes(), 2);
    }
}
