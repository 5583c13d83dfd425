//! Stage bodies. Each returns the outcome to record or a typed failure.

use std::collections::BTreeSet;

use chrono::SecondsFormat;
use envcopy_core::{AccessScope, CopyTask, Namespace, StageKind, WorkflowRun};
use tracing::{info, warn};

use super::{Discovered, RunState, StageOutcome, WorkflowCoordinator};
use crate::capacity::Admission;
use crate::error::{EngineError, EngineResult};
use crate::orchestrator::{BatchOptions, ExecutionMode};
use crate::plan::{NamingContext, is_system_object, plan_container_tasks, plan_database_tasks};
use crate::tags::TagReconciler;
use crate::topology::{EnvironmentTopology, TopologyResolver};

fn namespace_label(namespace: &Namespace) -> &str {
    namespace.alias().unwrap_or("root")
}

fn collaborator(stage: StageKind, operation: &'static str) -> impl FnOnce(anyhow::Error) -> EngineError {
    move |source| EngineError::Collaborator {
        stage,
        operation,
        source,
    }
}

fn access_scope(discovered: &Discovered) -> AccessScope {
    let mut groups = BTreeSet::new();
    for side in [&discovered.source, &discovered.destination] {
        groups.insert(side.primary.resource_group.clone());
        if let Some(secondary) = &side.secondary {
            groups.insert(secondary.resource_group.clone());
        }
        groups.insert(side.storage.resource_group.clone());
    }
    AccessScope {
        subscription_id: discovered.destination.primary.subscription_id.clone(),
        resource_groups: groups.into_iter().collect(),
    }
}

fn name_list(tasks: &[CopyTask]) -> String {
    tasks
        .iter()
        .map(|task| format!("{} -> {}", task.source.name, task.destination_name))
        .collect::<Vec<_>>()
        .join(", ")
}

impl WorkflowCoordinator {
    pub(super) async fn discover(&self, state: &mut RunState<'_>) -> EngineResult<StageOutcome> {
        let request = state.request;
        let resolver = TopologyResolver::new(self.platform.inventory());
        let source = resolver
            .resolve(&request.source_environment, &request.source_namespace)
            .await?;
        let destination = if request.destination_environment == request.source_environment {
            EnvironmentTopology {
                storage: resolver
                    .storage_account(&request.destination_environment, &request.destination_namespace)
                    .await?,
                ..source.clone()
            }
        } else {
            resolver
                .resolve(&request.destination_environment, &request.destination_namespace)
                .await?
        };

        if source.storage.name.eq_ignore_ascii_case(&destination.storage.name) {
            return Err(EngineError::InvalidInput {
                reason: format!(
                    "namespaces '{}' and '{}' resolve to the same storage account '{}'",
                    namespace_label(&request.source_namespace),
                    namespace_label(&request.destination_namespace),
                    source.storage.name
                ),
            });
        }

        let product = self
            .settings
            .product
            .clone()
            .unwrap_or_else(|| source.primary.product_token.clone());
        let naming = NamingContext {
            product,
            source_namespace: request.source_namespace.clone(),
            destination_namespace: request.destination_namespace.clone(),
            source_environment: request.source_environment.clone(),
            destination_environment: request.destination_environment.clone(),
            source_region: source.primary.region.clone(),
            destination_region: destination.primary.region.clone(),
            source_tier: source.primary.tier_token.clone(),
            destination_tier: destination.primary.tier_token.clone(),
            restore_suffix: self.settings.restore.suffix.clone(),
        };

        let detail = format!(
            "primary {}, failover partner {}, storage {} -> {}",
            destination.primary.name,
            destination
                .secondary
                .as_ref()
                .map_or("none", |secondary| secondary.name.as_str()),
            source.storage.name,
            destination.storage.name
        );
        state.topology = Some(Discovered {
            source,
            destination,
            naming,
        });
        Ok(StageOutcome::Completed(detail))
    }

    pub(super) async fn grant_access(&self, state: &mut RunState<'_>) -> EngineResult<StageOutcome> {
        let Some(discovered) = state.topology.as_ref() else {
            return Ok(StageOutcome::Skipped("topology unavailable".into()));
        };
        let scope = access_scope(discovered);
        let role = &self.settings.access.role;
        let groups = scope.resource_groups.join(", ");
        let access = self.platform.access();

        if state.dry_run() {
            return Ok(match access.current_principal().await {
                Ok(principal) => {
                    StageOutcome::Planned(format!("would grant {role} to {principal} on {groups}"))
                }
                Err(err) => {
                    let warning = format!("signed-in principal could not be resolved: {err:#}");
                    state.run.warn(warning.clone());
                    StageOutcome::Warning(warning)
                }
            });
        }

        access
            .grant(&scope)
            .await
            .map_err(|source| EngineError::Permission {
                action: "grant",
                source,
            })?;
        state.granted = Some(scope);
        Ok(StageOutcome::Completed(format!("granted {role} on {groups}")))
    }

    pub(super) async fn restore_point_in_time(
        &self,
        state: &mut RunState<'_>,
    ) -> EngineResult<StageOutcome> {
        let stage = StageKind::RestorePointInTime;
        let Some(discovered) = state.topology.as_ref() else {
            return Ok(StageOutcome::Skipped("topology unavailable".into()));
        };
        let databases = self
            .platform
            .catalog()
            .list_databases(&discovered.source.primary)
            .await
            .map_err(collaborator(stage, "list source databases"))?;
        let tasks = plan_database_tasks(databases, &discovered.naming);
        if tasks.is_empty() {
            return Ok(StageOutcome::Skipped(
                "no source databases belong to the namespace".into(),
            ));
        }

        let point = state
            .request
            .restore_point
            .to_rfc3339_opts(SecondsFormat::Secs, true);
        let restores: Vec<CopyTask> = tasks
            .iter()
            .map(|task| {
                CopyTask::new(
                    task.source.clone(),
                    discovered.naming.scratch_name(&task.source.name),
                )
            })
            .collect();
        let count = restores.len();

        if state.dry_run() {
            let detail = format!(
                "would restore {count} databases as of {point}: {}",
                name_list(&restores)
            );
            state.planned = tasks;
            return Ok(StageOutcome::Planned(detail));
        }

        let backend = self
            .platform
            .restore_backend(&discovered.source.primary, state.request.restore_point);
        let options = BatchOptions {
            label: "restore",
            mode: ExecutionMode::Parallel(self.settings.copy_concurrency),
            max_wait: state.request.max_wait,
            fail_fast: true,
            tags: None,
        };
        let outcome = self
            .orchestrator
            .run_batch(backend.as_ref(), restores, &options)
            .await;
        state.scratch = outcome
            .tasks
            .iter()
            .filter(|task| task.copy_accepted)
            .map(|task| task.destination_name.clone())
            .collect();
        let failure = outcome.error();
        state.executed.push((backend, outcome.tasks));
        if let Some(err) = failure {
            return Err(err);
        }
        state.planned = tasks;
        Ok(StageOutcome::Completed(format!(
            "restored {count} databases as of {point}"
        )))
    }

    pub(super) async fn copy_blob_storage(
        &self,
        state: &mut RunState<'_>,
    ) -> EngineResult<StageOutcome> {
        let stage = StageKind::CopyBlobStorage;
        let Some(discovered) = state.topology.as_ref() else {
            return Ok(StageOutcome::Skipped("topology unavailable".into()));
        };
        let source = &discovered.source.storage;
        let destination = &discovered.destination.storage;
        let containers = self
            .platform
            .catalog()
            .list_containers(source)
            .await
            .map_err(collaborator(stage, "list source containers"))?;
        let tasks = plan_container_tasks(containers);
        if tasks.is_empty() {
            return Ok(StageOutcome::Skipped(format!(
                "no containers in {}",
                source.name
            )));
        }
        let names = tasks
            .iter()
            .map(|task| task.destination_name.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        let count = tasks.len();

        if state.dry_run() {
            return Ok(StageOutcome::Planned(format!(
                "would copy {count} containers from {} to {}: {names}",
                source.name, destination.name
            )));
        }

        let backend = self.platform.container_backend(source, destination);
        let options = BatchOptions {
            label: "containers",
            mode: ExecutionMode::Sequential,
            max_wait: state.request.max_wait,
            fail_fast: true,
            tags: None,
        };
        let detail = format!(
            "copied {count} containers from {} to {}",
            source.name, destination.name
        );
        let outcome = self.orchestrator.run_batch(backend.as_ref(), tasks, &options).await;
        let failure = outcome.error();
        state.executed.push((backend, outcome.tasks));
        match failure {
            Some(err) => Err(err),
            None => Ok(StageOutcome::Completed(detail)),
        }
    }

    pub(super) async fn copy_databases(&self, state: &mut RunState<'_>) -> EngineResult<StageOutcome> {
        let Some(discovered) = state.topology.as_ref() else {
            return Ok(StageOutcome::Skipped("topology unavailable".into()));
        };
        if state.planned.is_empty() {
            return Ok(StageOutcome::Skipped("no databases to copy".into()));
        }
        let source_server = &discovered.source.primary;
        let destination_server = &discovered.destination.primary;
        let mut warnings = Vec::new();

        let pool = self.platform.pool_inspector(destination_server);
        let capacity_note = match self.capacity.assess(pool.as_ref(), &state.planned).await? {
            None => format!("{} is not pooled; capacity check skipped", destination_server.name),
            Some(assessment) => match self.capacity.admit(&assessment, state.dry_run()) {
                Admission::Admitted => assessment.summary(),
                Admission::Warned(message) => {
                    warnings.push(message);
                    assessment.summary()
                }
                Admission::Denied(err) => return Err(err),
            },
        };

        let count = state.planned.len();
        let failover_partner = discovered.destination.secondary.as_ref();

        if state.dry_run() {
            let mut detail = format!(
                "would copy {count} databases: {}; {capacity_note}",
                name_list(&state.planned)
            );
            if let Some(secondary) = failover_partner {
                detail.push_str(&format!(
                    "; copies would join the failover group replicated to {}",
                    secondary.name
                ));
            }
            return Ok(settle(&mut state.run, warnings, detail, StageOutcome::Planned));
        }

        let naming = &discovered.naming;
        let tasks: Vec<CopyTask> = state
            .planned
            .iter()
            .map(|task| {
                let mut source = task.source.clone();
                source.name = naming.scratch_name(&task.source.name);
                CopyTask::new(source, task.destination_name.clone())
            })
            .collect();
        let backend = self.platform.database_backend(source_server, destination_server);
        let options = BatchOptions {
            label: "databases",
            mode: ExecutionMode::Parallel(self.settings.copy_concurrency),
            max_wait: state.request.max_wait,
            fail_fast: true,
            tags: Some(TagReconciler::new(
                state.request.destination_environment.clone(),
                state.request.destination_namespace.clone(),
            )),
        };
        let outcome = self.orchestrator.run_batch(backend.as_ref(), tasks, &options).await;
        if let Some(err) = outcome.error() {
            state.executed.push((backend, outcome.tasks));
            return Err(err);
        }

        for task in outcome.incomplete_tags() {
            warnings.push(format!(
                "{}: tags still missing after re-apply: {}",
                task.destination_name,
                task.missing_tags.join(", ")
            ));
        }

        let mut detail = format!("copied {count} databases; {capacity_note}");
        if failover_partner.is_some() {
            let registry = self.platform.failover_registry(destination_server);
            let suffix = naming.restore_suffix.as_str();
            let summary = self
                .orchestrator
                .register_failover(registry.as_ref(), &outcome.tasks, |name| {
                    is_system_object(name, suffix)
                })
                .await;
            for (database, reason) in &summary.failures {
                warnings.push(format!("failover registration of {database} failed: {reason}"));
            }
            if let Some(group) = &summary.group {
                detail.push_str(&format!(
                    "; {} registered in {group}",
                    summary.registered.len()
                ));
            }
        }
        state.executed.push((backend, outcome.tasks));
        Ok(settle(&mut state.run, warnings, detail, StageOutcome::Completed))
    }

    pub(super) async fn delete_scratch_objects(
        &self,
        state: &mut RunState<'_>,
    ) -> EngineResult<StageOutcome> {
        let Some(discovered) = state.topology.as_ref() else {
            return Ok(StageOutcome::Skipped("topology unavailable".into()));
        };
        if state.dry_run() {
            if state.planned.is_empty() {
                return Ok(StageOutcome::Skipped("no scratch copies planned".into()));
            }
            return Ok(StageOutcome::Planned(format!(
                "would delete {} scratch databases",
                state.planned.len()
            )));
        }
        if state.scratch.is_empty() {
            return Ok(StageOutcome::Skipped("no scratch copies created".into()));
        }

        let catalog = self.platform.catalog();
        let server = &discovered.source.primary;
        let mut deleted = 0_usize;
        let mut warnings = Vec::new();
        for name in &state.scratch {
            match catalog.delete_database(server, name).await {
                Ok(()) => {
                    info!(database = %name, "scratch copy deleted");
                    deleted += 1;
                }
                Err(err) => {
                    warn!(database = %name, error = %format!("{err:#}"), "scratch copy not deleted");
                    warnings.push(format!("scratch copy {name} not deleted: {err:#}"));
                }
            }
        }
        let detail = format!("deleted {deleted} of {} scratch databases", state.scratch.len());
        Ok(settle(&mut state.run, warnings, detail, StageOutcome::Completed))
    }

    pub(super) async fn revoke_access(&self, state: &mut RunState<'_>) -> EngineResult<StageOutcome> {
        let role = &self.settings.access.role;
        if state.dry_run() {
            return Ok(match state.topology.as_ref() {
                Some(discovered) => StageOutcome::Planned(format!(
                    "would revoke {role} on {}",
                    access_scope(discovered).resource_groups.join(", ")
                )),
                None => StageOutcome::Skipped("topology unavailable".into()),
            });
        }
        let Some(scope) = state.granted.take() else {
            return Ok(StageOutcome::Skipped("elevated access was not granted".into()));
        };
        self.platform
            .access()
            .revoke(&scope)
            .await
            .map_err(|source| EngineError::Permission {
                action: "revoke",
                source,
            })?;
        Ok(StageOutcome::Completed(format!(
            "revoked {role} on {}",
            scope.resource_groups.join(", ")
        )))
    }

    pub(super) async fn run_hook(
        &self,
        state: &mut RunState<'_>,
        stage: StageKind,
    ) -> EngineResult<StageOutcome> {
        let context = state.stage_context();
        let hooks = self.platform.hooks();
        let Some(description) = hooks.describe(stage, &context) else {
            return Ok(StageOutcome::Skipped("no hook configured".into()));
        };
        if state.dry_run() {
            return Ok(StageOutcome::Planned(format!("would run {description}")));
        }
        hooks
            .invoke(stage, &context)
            .await
            .map_err(collaborator(stage, "hook command"))?;
        Ok(StageOutcome::Completed(format!("ran {description}")))
    }
}

/// Fold collected warnings into the run; a stage with warnings is recorded as
/// `Warning` instead of its clean outcome.
fn settle(
    run: &mut WorkflowRun,
    warnings: Vec<String>,
    detail: String,
    clean: fn(String) -> StageOutcome,
) -> StageOutcome {
    if warnings.is_empty() {
        return clean(detail);
    }
    let detail = format!("{detail}; {} warning(s)", warnings.len());
    for warning in warnings {
        run.warn(warning);
    }
    StageOutcome::Warning(detail)
}
