//! Per-object copy state machine and batch execution.
//!
//! Each task moves `Deletion -> Initiation -> Polling -> TagRestore` and ends
//! `Succeeded` or `Failed` in the phase that failed. Batches run sequentially
//! or with a fixed concurrency ceiling; with fail-fast enabled, a failure stops
//! tasks that have not started yet, which stay `Pending`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use envcopy_config::RefreshSettings;
use envcopy_core::{CopyBackend, CopyPhase, CopyStatus, CopyTask, FailoverRegistry, ResourceState};
use futures_util::{StreamExt, stream};
use serde::Serialize;
use tokio::time::{Instant, sleep};
use tracing::{debug, info, warn};

use crate::error::EngineError;
use crate::retry::{RetryPolicy, retry_with_backoff};
use crate::tags::TagReconciler;

/// How a batch schedules its tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    /// One task at a time.
    Sequential,
    /// At most this many tasks in flight.
    Parallel(usize),
}

/// Timing tunables shared by every batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrchestratorSettings {
    /// Backoff for copy initiation.
    pub retry: RetryPolicy,
    /// Delay between readiness checks.
    pub poll_interval: Duration,
    /// Cadence of credential rotation while polling.
    pub credential_refresh: Duration,
    /// Source size at which the large-object allowance applies.
    pub large_object_threshold_bytes: u64,
    /// Extra wait granted to large objects.
    pub large_object_allowance: Duration,
}

impl From<&RefreshSettings> for OrchestratorSettings {
    fn from(settings: &RefreshSettings) -> Self {
        Self {
            retry: RetryPolicy::from(&settings.retry),
            poll_interval: settings.poll_interval(),
            credential_refresh: settings.credential_refresh_interval(),
            large_object_threshold_bytes: settings.large_object.threshold_bytes(),
            large_object_allowance: settings.large_object.allowance(),
        }
    }
}

/// Per-batch options chosen by the caller.
#[derive(Debug, Clone)]
pub struct BatchOptions {
    /// Batch name for logs.
    pub label: &'static str,
    /// Scheduling mode.
    pub mode: ExecutionMode,
    /// Polling bound before the large-object allowance.
    pub max_wait: Duration,
    /// Stop starting tasks once one fails.
    pub fail_fast: bool,
    /// Tag reconciliation after each successful copy.
    pub tags: Option<TagReconciler>,
}

/// Final state of every task in a batch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchOutcome {
    /// Object kind copied.
    pub object: &'static str,
    /// Tasks in submission order.
    pub tasks: Vec<CopyTask>,
    /// Whether fail-fast stopped the batch early.
    pub aborted: bool,
}

impl BatchOutcome {
    /// Tasks that failed.
    pub fn failed(&self) -> impl Iterator<Item = &CopyTask> {
        self.tasks.iter().filter(|task| task.is_failed())
    }

    /// Tasks that succeeded.
    pub fn succeeded(&self) -> impl Iterator<Item = &CopyTask> {
        self.tasks
            .iter()
            .filter(|task| task.status == CopyStatus::Succeeded)
    }

    /// Tasks that never started.
    #[must_use]
    pub fn not_started(&self) -> usize {
        self.tasks
            .iter()
            .filter(|task| task.status == CopyStatus::Pending)
            .count()
    }

    /// Succeeded tasks whose required tags could not be completed.
    pub fn incomplete_tags(&self) -> impl Iterator<Item = &CopyTask> {
        self.succeeded().filter(|task| task.has_incomplete_tags())
    }

    /// Whether every task succeeded.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.tasks
            .iter()
            .all(|task| task.status == CopyStatus::Succeeded)
    }

    /// Batch failure, if any task failed or never started.
    #[must_use]
    pub fn error(&self) -> Option<EngineError> {
        if self.is_success() {
            return None;
        }
        let first_failure = self.failed().next().map_or_else(
            || "tasks were not started".to_string(),
            |task| {
                format!(
                    "{} [{}]: {}",
                    task.destination_name,
                    task.phase,
                    task.error.as_deref().unwrap_or("unknown error")
                )
            },
        );
        Some(EngineError::BatchFailed {
            object: self.object,
            failed: self.failed().count(),
            total: self.tasks.len(),
            first_failure,
        })
    }
}

/// Result of registering copied databases into a failover group.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FailoverSummary {
    /// Group name, when the primary has one.
    pub group: Option<String>,
    /// Databases added to the group.
    pub registered: Vec<String>,
    /// Databases that could not be added, with the reason.
    pub failures: Vec<(String, String)>,
}

/// Drives copy batches through a [`CopyBackend`].
#[derive(Debug, Clone, Copy)]
pub struct CopyOrchestrator {
    settings: OrchestratorSettings,
}

impl CopyOrchestrator {
    /// Orchestrator with the given timing tunables.
    #[must_use]
    pub const fn new(settings: OrchestratorSettings) -> Self {
        Self { settings }
    }

    /// Timing tunables in use.
    #[must_use]
    pub const fn settings(&self) -> &OrchestratorSettings {
        &self.settings
    }

    /// Run every task of a batch and return them in submission order.
    pub async fn run_batch(
        &self,
        backend: &dyn CopyBackend,
        tasks: Vec<CopyTask>,
        options: &BatchOptions,
    ) -> BatchOutcome {
        let object = backend.object_kind();
        info!(
            batch = options.label,
            object,
            tasks = tasks.len(),
            mode = ?options.mode,
            "starting copy batch"
        );
        let abort = AtomicBool::new(false);

        let tasks = match options.mode {
            ExecutionMode::Sequential => {
                let mut finished = Vec::with_capacity(tasks.len());
                for task in tasks {
                    finished.push(self.run_guarded(backend, task, options, &abort).await);
                }
                finished
            }
            ExecutionMode::Parallel(limit) => {
                let mut finished: Vec<(usize, CopyTask)> = stream::iter(
                    tasks.into_iter().enumerate().map(|(index, task)| {
                        let abort = &abort;
                        async move {
                            (index, self.run_guarded(backend, task, options, abort).await)
                        }
                    }),
                )
                .buffer_unordered(limit.max(1))
                .collect()
                .await;
                finished.sort_by_key(|(index, _)| *index);
                finished.into_iter().map(|(_, task)| task).collect()
            }
        };

        let outcome = BatchOutcome {
            object,
            tasks,
            aborted: abort.load(Ordering::SeqCst),
        };
        info!(
            batch = options.label,
            succeeded = outcome.succeeded().count(),
            failed = outcome.failed().count(),
            not_started = outcome.not_started(),
            "copy batch finished"
        );
        outcome
    }

    async fn run_guarded(
        &self,
        backend: &dyn CopyBackend,
        task: CopyTask,
        options: &BatchOptions,
        abort: &AtomicBool,
    ) -> CopyTask {
        if abort.load(Ordering::SeqCst) {
            debug!(object = %task.destination_name, "batch aborted; task not started");
            return task;
        }
        let task = self.run_task(backend, task, options).await;
        if task.is_failed() && options.fail_fast {
            abort.store(true, Ordering::SeqCst);
        }
        task
    }

    async fn run_task(
        &self,
        backend: &dyn CopyBackend,
        mut task: CopyTask,
        options: &BatchOptions,
    ) -> CopyTask {
        let object = backend.object_kind();
        let name = task.destination_name.clone();
        let started = Instant::now();

        task.phase = CopyPhase::Deletion;
        match backend.describe(&name).await {
            Ok(Some(existing)) => task.saved_tags = Some(existing.tags),
            Ok(None) => debug!(object = %name, "no existing destination object"),
            Err(err) => warn!(
                object = %name,
                error = %format!("{err:#}"),
                "could not read existing destination; tags not captured"
            ),
        }
        if let Err(err) = backend.delete(&name).await {
            return finish_failed(task, CopyPhase::Deletion, format!("delete failed: {err:#}"), started);
        }
        task.destination_cleared = true;

        task.phase = CopyPhase::Initiation;
        let source = task.source.clone();
        let operation = format!("start {object} copy {} -> {name}", source.name);
        let initiated = retry_with_backoff(&self.settings.retry, &operation, |_| {
            backend.start_copy(&source, &name)
        })
        .await;
        if let Err(exhausted) = initiated {
            let err = EngineError::CopyInitiation {
                object,
                name: name.clone(),
                attempts: exhausted.attempts,
                reason: format!("{:#}", exhausted.error),
            };
            return finish_failed(task, CopyPhase::Initiation, err.to_string(), started);
        }
        task.copy_accepted = true;

        task.phase = CopyPhase::Polling;
        let allowance = if task.source.size_bytes >= self.settings.large_object_threshold_bytes {
            self.settings.large_object_allowance
        } else {
            Duration::ZERO
        };
        task.wait_allowance_secs = allowance.as_secs();
        let bound = options.max_wait.saturating_add(allowance);
        if let Err(reason) = self.poll_until_ready(backend, &name, bound).await {
            return finish_failed(task, CopyPhase::Polling, reason, started);
        }

        if let Some(reconciler) = &options.tags {
            reconciler.reconcile(backend, &mut task).await;
        }

        task.set_elapsed(started.elapsed());
        task.succeed();
        info!(
            object = %name,
            source = %task.source.name,
            elapsed_minutes = task.elapsed_minutes(),
            "copy completed"
        );
        task
    }

    async fn poll_until_ready(
        &self,
        backend: &dyn CopyBackend,
        name: &str,
        bound: Duration,
    ) -> Result<(), String> {
        let object = backend.object_kind();
        let poll_started = Instant::now();
        let mut last_refresh = poll_started;

        loop {
            if last_refresh.elapsed() >= self.settings.credential_refresh {
                match backend.refresh_credentials().await {
                    Ok(()) => debug!(object = %name, "credentials refreshed"),
                    Err(err) => warn!(
                        object = %name,
                        error = %format!("{err:#}"),
                        "credential refresh failed"
                    ),
                }
                last_refresh = Instant::now();
            }

            match backend.readiness(name).await {
                Ok(ResourceState::Online) => return Ok(()),
                Ok(ResourceState::Failed) => {
                    return Err(format!("provider reported {object} copy '{name}' as failed"));
                }
                Ok(state) => debug!(object = %name, state = ?state, "copy not ready"),
                Err(err) => warn!(
                    object = %name,
                    error = %format!("{err:#}"),
                    "readiness check failed"
                ),
            }

            let waited = poll_started.elapsed();
            if waited >= bound {
                let err = EngineError::CopyTimeout {
                    object,
                    name: name.to_string(),
                    elapsed_minutes: waited.as_secs() / 60,
                };
                return Err(err.to_string());
            }
            sleep(self.settings.poll_interval.min(bound.saturating_sub(waited))).await;
        }
    }

    /// Add successfully copied databases to the primary's failover group.
    /// Excluded names and failed tasks are skipped; registration failures are
    /// collected, never rolled back.
    pub async fn register_failover(
        &self,
        registry: &dyn FailoverRegistry,
        tasks: &[CopyTask],
        is_excluded: impl Fn(&str) -> bool,
    ) -> FailoverSummary {
        let mut summary = FailoverSummary::default();
        let group = match registry.group_name().await {
            Ok(Some(group)) => group,
            Ok(None) => {
                debug!("primary has no failover group; registration skipped");
                return summary;
            }
            Err(err) => {
                summary
                    .failures
                    .push(("<failover group>".into(), format!("{err:#}")));
                return summary;
            }
        };

        for task in tasks {
            if task.status != CopyStatus::Succeeded || is_excluded(&task.destination_name) {
                continue;
            }
            match registry.add_member(&group, &task.destination_name).await {
                Ok(()) => summary.registered.push(task.destination_name.clone()),
                Err(err) => {
                    warn!(
                        group = %group,
                        database = %task.destination_name,
                        error = %format!("{err:#}"),
                        "failover registration failed"
                    );
                    summary
                        .failures
                        .push((task.destination_name.clone(), format!("{err:#}")));
                }
            }
        }
        summary.group = Some(group);
        summary
    }

    /// Re-query failed tasks whose destination was cleared; objects that exist
    /// anyway are orphans of provider-side copies.
    pub async fn detect_orphans(&self, backend: &dyn CopyBackend, tasks: &[CopyTask]) -> Vec<String> {
        let mut orphans = Vec::new();
        for task in tasks.iter().filter(|task| task.may_have_orphan()) {
            match backend.describe(&task.destination_name).await {
                Ok(Some(_)) => {
                    warn!(object = %task.destination_name, "orphaned object needs manual reconciliation");
                    orphans.push(task.destination_name.clone());
                }
                Ok(None) => {}
                Err(err) => {
                    warn!(
                        object = %task.destination_name,
                        error = %format!("{err:#}"),
                        "orphan check failed; listing object for manual review"
                    );
                    orphans.push(task.destination_name.clone());
                }
            }
        }
        orphans
    }
}

fn finish_failed(mut task: CopyTask, phase: CopyPhase, reason: String, started: Instant) -> CopyTask {
    warn!(object = %task.destination_name, phase = %phase, error = %reason, "copy task failed");
    task.set_elapsed(started.elapsed());
    task.fail(phase, reason);
    task
}
