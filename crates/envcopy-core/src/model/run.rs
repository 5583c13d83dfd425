//! Workflow run aggregate and stage records.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::CoreError;

/// Named stages of the refresh pipeline, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StageKind {
    /// Topology discovery.
    Discovery,
    /// Temporary elevated access for the operator.
    GrantElevatedAccess,
    /// Point-in-time restore of source objects into scratch copies.
    RestorePointInTime,
    /// Stop the destination workloads.
    StopDestination,
    /// Copy blob containers.
    CopyBlobStorage,
    /// Copy databases.
    CopyDatabases,
    /// Apply destination configuration fragments.
    CleanDestinationConfig,
    /// Undo access changes made on the source.
    RevertSourceAccess,
    /// Resize destination resources.
    AdjustDestinationResources,
    /// Rebuild geo-replicas.
    RebuildReplicas,
    /// Reapply destination access configuration.
    ReconfigureDestinationAccess,
    /// Start the destination workloads.
    StartDestination,
    /// Drop scratch copies created by the restore stage.
    DeleteScratchObjects,
    /// Remove the temporary elevated access.
    RevokeElevatedAccess,
}

impl StageKind {
    /// Stages executed between access grant and revoke.
    pub const PIPELINE: [Self; 12] = [
        Self::RestorePointInTime,
        Self::StopDestination,
        Self::CopyBlobStorage,
        Self::CopyDatabases,
        Self::CleanDestinationConfig,
        Self::RevertSourceAccess,
        Self::AdjustDestinationResources,
        Self::RebuildReplicas,
        Self::ReconfigureDestinationAccess,
        Self::StartDestination,
        Self::DeleteScratchObjects,
        Self::RevokeElevatedAccess,
    ];

    /// Stages that delegate entirely to an external hook command.
    pub const HOOKED: [Self; 7] = [
        Self::StopDestination,
        Self::CleanDestinationConfig,
        Self::RevertSourceAccess,
        Self::AdjustDestinationResources,
        Self::RebuildReplicas,
        Self::ReconfigureDestinationAccess,
        Self::StartDestination,
    ];

    /// Stable identifier used in logs, reports, and settings files.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Discovery => "discovery",
            Self::GrantElevatedAccess => "grant-elevated-access",
            Self::RestorePointInTime => "restore-point-in-time",
            Self::StopDestination => "stop-destination",
            Self::CopyBlobStorage => "copy-blob-storage",
            Self::CopyDatabases => "copy-databases",
            Self::CleanDestinationConfig => "clean-destination-config",
            Self::RevertSourceAccess => "revert-source-access",
            Self::AdjustDestinationResources => "adjust-destination-resources",
            Self::RebuildReplicas => "rebuild-replicas",
            Self::ReconfigureDestinationAccess => "reconfigure-destination-access",
            Self::StartDestination => "start-destination",
            Self::DeleteScratchObjects => "delete-scratch-objects",
            Self::RevokeElevatedAccess => "revoke-elevated-access",
        }
    }

    /// Whether the stage is delegated to an external hook command.
    #[must_use]
    pub fn is_hooked(self) -> bool {
        Self::HOOKED.contains(&self)
    }
}

impl Display for StageKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StageKind {
    type Err = CoreError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        std::iter::once(Self::Discovery)
            .chain(std::iter::once(Self::GrantElevatedAccess))
            .chain(Self::PIPELINE)
            .find(|stage| stage.as_str() == value.trim())
            .ok_or_else(|| CoreError::UnknownStage {
                value: value.to_string(),
            })
    }
}

/// Outcome recorded for one stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    /// Action performed.
    Completed,
    /// Dry run: action described but not performed.
    Planned,
    /// Nothing to do.
    Skipped,
    /// Finished with a non-fatal problem.
    Warning,
    /// Fatal in execute mode; accumulated in dry run.
    Failed,
}

impl StageStatus {
    /// Stable identifier used in reports.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Planned => "planned",
            Self::Skipped => "skipped",
            Self::Warning => "warning",
            Self::Failed => "failed",
        }
    }
}

/// Record of one stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageResult {
    /// Stage identifier.
    pub name: StageKind,
    /// Outcome.
    pub status: StageStatus,
    /// Human-readable detail.
    pub detail: String,
}

/// Top-level aggregate passed through every stage of one invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowRun {
    /// Correlation identifier recorded in logs.
    pub run_id: Uuid,
    /// Whether destructive calls are suppressed.
    pub dry_run: bool,
    /// Stage records in execution order.
    pub stages: Vec<StageResult>,
    /// Accumulated failures; any entry yields a non-zero exit.
    pub failures: Vec<String>,
    /// Non-fatal problems surfaced in the final report.
    pub warnings: Vec<String>,
    /// Destination objects that may exist after a failed copy.
    pub orphans: Vec<String>,
    /// Whether the pipeline stopped before its last stage.
    pub aborted: bool,
}

impl WorkflowRun {
    /// Start a run.
    #[must_use]
    pub fn new(dry_run: bool) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            dry_run,
            stages: Vec::new(),
            failures: Vec::new(),
            warnings: Vec::new(),
            orphans: Vec::new(),
            aborted: false,
        }
    }

    /// Append a stage record.
    pub fn record(&mut self, name: StageKind, status: StageStatus, detail: impl Into<String>) {
        self.stages.push(StageResult {
            name,
            status,
            detail: detail.into(),
        });
    }

    /// Record a failure reason.
    pub fn fail(&mut self, reason: impl Into<String>) {
        self.failures.push(reason.into());
    }

    /// Record a warning.
    pub fn warn(&mut self, warning: impl Into<String>) {
        self.warnings.push(warning.into());
    }

    /// Most recent record for a stage.
    #[must_use]
    pub fn stage(&self, name: StageKind) -> Option<&StageResult> {
        self.stages.iter().rev().find(|stage| stage.name == name)
    }

    /// Stage names and statuses, without details.
    #[must_use]
    pub fn plan(&self) -> Vec<(StageKind, StageStatus)> {
        self.stages
            .iter()
            .map(|stage| (stage.name, stage.status))
            .collect()
    }

    /// Whether the run finished without failures.
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.failures.is_empty() && !self.aborted
    }

    /// Process exit status for the run.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        i32::from(!self.succeeded())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_names_round_trip_through_from_str() {
        for stage in StageKind::PIPELINE {
            assert_eq!(stage.as_str().parse::<StageKind>().ok(), Some(stage));
        }
        assert!("launch-rockets".parse::<StageKind>().is_err());
    }

    #[test]
    fn pipeline_ends_with_access_revoke() {
        assert_eq!(StageKind::PIPELINE[0], StageKind::RestorePointInTime);
        assert_eq!(
            StageKind::PIPELINE.last().copied(),
            Some(StageKind::RevokeElevatedAccess)
        );
    }

    #[test]
    fn failures_drive_exit_code() {
        let mut run = WorkflowRun::new(true);
        run.record(StageKind::CopyDatabases, StageStatus::Planned, "3 databases");
        run.warn("tags incomplete");
        assert_eq!(run.exit_code(), 0);

        run.fail("capacity exhausted");
        assert_eq!(run.exit_code(), 1);
    }

    #[test]
    fn stage_lookup_returns_latest_record() {
        let mut run = WorkflowRun::new(false);
        run.record(StageKind::CopyDatabases, StageStatus::Failed, "first");
        run.record(StageKind::CopyDatabases, StageStatus::Completed, "second");
        let stage = run.stage(StageKind::CopyDatabases).expect("recorded");
        assert_eq!(stage.detail, "second");
    }
}
