//! Stage pipeline for one refresh run.
//!
//! # Design
//! - Stages run strictly in order; each returns a typed outcome that is
//!   recorded on the [`WorkflowRun`].
//! - Execute mode stops at the first failed stage; a dry run records the
//!   failure and keeps planning so every problem surfaces in one pass.
//! - Access revocation runs after the pipeline whether or not it aborted.

mod stages;

use std::sync::Arc;

use envcopy_config::{RefreshRequest, RefreshSettings};
use envcopy_core::{
    AccessScope, CloudPlatform, CopyBackend, CopyTask, StageContext, StageKind, StageStatus,
    WorkflowRun,
};
use envcopy_telemetry::{run_span, with_run_context};
use tracing::{Instrument, error, info, warn};

use crate::capacity::CapacityController;
use crate::error::EngineResult;
use crate::orchestrator::{CopyOrchestrator, OrchestratorSettings};
use crate::plan::NamingContext;
use crate::topology::EnvironmentTopology;

/// Sequences discovery, access, copy, and hook stages for a refresh.
pub struct WorkflowCoordinator {
    platform: Arc<dyn CloudPlatform>,
    settings: RefreshSettings,
    orchestrator: CopyOrchestrator,
    capacity: CapacityController,
}

enum StageOutcome {
    Completed(String),
    Planned(String),
    Skipped(String),
    Warning(String),
}

impl StageOutcome {
    const fn status(&self) -> StageStatus {
        match self {
            Self::Completed(_) => StageStatus::Completed,
            Self::Planned(_) => StageStatus::Planned,
            Self::Skipped(_) => StageStatus::Skipped,
            Self::Warning(_) => StageStatus::Warning,
        }
    }

    fn into_detail(self) -> String {
        match self {
            Self::Completed(detail)
            | Self::Planned(detail)
            | Self::Skipped(detail)
            | Self::Warning(detail) => detail,
        }
    }
}

struct Discovered {
    source: EnvironmentTopology,
    destination: EnvironmentTopology,
    naming: NamingContext,
}

struct RunState<'a> {
    request: &'a RefreshRequest,
    run: WorkflowRun,
    topology: Option<Discovered>,
    planned: Vec<CopyTask>,
    scratch: Vec<String>,
    granted: Option<AccessScope>,
    executed: Vec<(Arc<dyn CopyBackend>, Vec<CopyTask>)>,
}

impl<'a> RunState<'a> {
    fn new(request: &'a RefreshRequest, run: WorkflowRun) -> Self {
        Self {
            request,
            run,
            topology: None,
            planned: Vec::new(),
            scratch: Vec::new(),
            granted: None,
            executed: Vec::new(),
        }
    }

    const fn dry_run(&self) -> bool {
        self.request.dry_run
    }

    fn stage_context(&self) -> StageContext {
        let topology = self.topology.as_ref();
        StageContext {
            source_environment: self.request.source_environment.clone(),
            destination_environment: self.request.destination_environment.clone(),
            source_namespace: self.request.source_namespace.clone(),
            destination_namespace: self.request.destination_namespace.clone(),
            source_server: topology.map(|t| t.source.primary.name.clone()),
            destination_server: topology.map(|t| t.destination.primary.name.clone()),
            destination_resource_group: topology.map(|t| t.destination.primary.resource_group.clone()),
            instance_alias: self.request.instance_alias.clone(),
            instance_alias_to_remove: self.request.instance_alias_to_remove.clone(),
            dry_run: self.request.dry_run,
        }
    }
}

impl WorkflowCoordinator {
    /// Coordinator over a cloud platform with the given settings.
    #[must_use]
    pub fn new(platform: Arc<dyn CloudPlatform>, settings: RefreshSettings) -> Self {
        let orchestrator = CopyOrchestrator::new(OrchestratorSettings::from(&settings));
        let capacity = CapacityController::new(settings.capacity.safety_margin_percent);
        Self {
            platform,
            settings,
            orchestrator,
            capacity,
        }
    }

    /// Execute or simulate a refresh. Failures are recorded on the returned
    /// run rather than returned as errors.
    pub async fn run(&self, request: &RefreshRequest) -> WorkflowRun {
        let run = WorkflowRun::new(request.dry_run);
        let run_id = run.run_id;
        let span = run_span(run_id, request.dry_run);
        with_run_context(run_id, self.drive(request, run).instrument(span)).await
    }

    async fn drive(&self, request: &RefreshRequest, run: WorkflowRun) -> WorkflowRun {
        info!(
            source_environment = %request.source_environment,
            source_namespace = ?request.source_namespace,
            destination_namespace = ?request.destination_namespace,
            dry_run = request.dry_run,
            "refresh started"
        );
        let mut state = RunState::new(request, run);

        let mut proceed = self.run_stage(&mut state, StageKind::Discovery).await
            && self.run_stage(&mut state, StageKind::GrantElevatedAccess).await;
        if proceed {
            for stage in StageKind::PIPELINE {
                if stage == StageKind::RevokeElevatedAccess {
                    continue;
                }
                if !self.run_stage(&mut state, stage).await {
                    proceed = false;
                    break;
                }
            }
        }
        if !proceed {
            state.run.aborted = true;
            warn!("pipeline aborted; remaining stages not run");
        }
        self.run_stage(&mut state, StageKind::RevokeElevatedAccess).await;

        if state.run.aborted && !state.dry_run() && !state.scratch.is_empty() {
            let names = state.scratch.join(", ");
            warn!(scratch = %names, "scratch copies left in place");
            state.run.warn(format!("scratch copies left in place: {names}"));
        }

        if !state.dry_run() && !state.run.succeeded() {
            self.collect_orphans(&mut state).await;
        }

        info!(
            failures = state.run.failures.len(),
            warnings = state.run.warnings.len(),
            orphans = state.run.orphans.len(),
            exit_code = state.run.exit_code(),
            "refresh finished"
        );
        state.run
    }

    /// Run one stage and record its outcome. Returns whether the pipeline may
    /// continue.
    async fn run_stage(&self, state: &mut RunState<'_>, stage: StageKind) -> bool {
        if stage != StageKind::Discovery && state.topology.is_none() {
            state
                .run
                .record(stage, StageStatus::Skipped, "topology unavailable");
            return state.dry_run();
        }

        info!(stage = %stage, "stage started");
        let result = self.dispatch(state, stage).await;
        match result {
            Ok(outcome) => {
                let status = outcome.status();
                let detail = outcome.into_detail();
                info!(stage = %stage, status = status.as_str(), detail = %detail, "stage finished");
                state.run.record(stage, status, detail);
                true
            }
            Err(err) => {
                let diagnosis = err.diagnosis();
                error!(stage = %stage, error = %diagnosis, "stage failed");
                state.run.record(stage, StageStatus::Failed, err.to_string());
                state.run.fail(format!("{stage}: {diagnosis}"));
                state.dry_run()
            }
        }
    }

    async fn dispatch(&self, state: &mut RunState<'_>, stage: StageKind) -> EngineResult<StageOutcome> {
        match stage {
            StageKind::Discovery => self.discover(state).await,
            StageKind::GrantElevatedAccess => self.grant_access(state).await,
            StageKind::RestorePointInTime => self.restore_point_in_time(state).await,
            StageKind::CopyBlobStorage => self.copy_blob_storage(state).await,
            StageKind::CopyDatabases => self.copy_databases(state).await,
            StageKind::DeleteScratchObjects => self.delete_scratch_objects(state).await,
            StageKind::RevokeElevatedAccess => self.revoke_access(state).await,
            StageKind::StopDestination
            | StageKind::CleanDestinationConfig
            | StageKind::RevertSourceAccess
            | StageKind::AdjustDestinationResources
            | StageKind::RebuildReplicas
            | StageKind::ReconfigureDestinationAccess
            | StageKind::StartDestination => self.run_hook(state, stage).await,
        }
    }

    async fn collect_orphans(&self, state: &mut RunState<'_>) {
        for (backend, tasks) in &state.executed {
            let orphans = self.orchestrator.detect_orphans(backend.as_ref(), tasks).await;
            state.run.orphans.extend(orphans);
        }
        if !state.run.orphans.is_empty() {
            warn!(orphans = ?state.run.orphans, "orphaned objects need manual reconciliation");
        }
    }
}
