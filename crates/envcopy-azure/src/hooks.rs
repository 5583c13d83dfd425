//! External commands for stages whose actions live outside this tool.
//!
//! Each command receives the stage context through `ENVCOPY_*` environment
//! variables. A non-zero exit fails the stage.

use std::collections::BTreeMap;

use anyhow::anyhow;
use async_trait::async_trait;
use envcopy_config::HookCommand;
use envcopy_core::{StageContext, StageHooks, StageKind};
use envcopy_telemetry::current_run_id;
use tracing::{debug, info};

use crate::cli::run_process;

/// Environment handed to a hook command.
#[must_use]
pub fn hook_environment(
    stage: StageKind,
    context: &StageContext,
    run_id: Option<String>,
) -> Vec<(String, String)> {
    let mut env = vec![
        ("ENVCOPY_STAGE", stage.as_str().to_string()),
        ("ENVCOPY_SOURCE_ENVIRONMENT", context.source_environment.clone()),
        (
            "ENVCOPY_DESTINATION_ENVIRONMENT",
            context.destination_environment.clone(),
        ),
        (
            "ENVCOPY_SOURCE_NAMESPACE",
            context.source_namespace.alias().unwrap_or_default().to_string(),
        ),
        (
            "ENVCOPY_DESTINATION_NAMESPACE",
            context
                .destination_namespace
                .alias()
                .unwrap_or_default()
                .to_string(),
        ),
        ("ENVCOPY_DRY_RUN", context.dry_run.to_string()),
    ];
    let optional = [
        ("ENVCOPY_SOURCE_SERVER", &context.source_server),
        ("ENVCOPY_DESTINATION_SERVER", &context.destination_server),
        (
            "ENVCOPY_DESTINATION_RESOURCE_GROUP",
            &context.destination_resource_group,
        ),
        ("ENVCOPY_INSTANCE_ALIAS", &context.instance_alias),
        (
            "ENVCOPY_INSTANCE_ALIAS_TO_REMOVE",
            &context.instance_alias_to_remove,
        ),
    ];
    env.extend(
        optional
            .into_iter()
            .filter_map(|(key, value)| value.clone().map(|value| (key, value))),
    );
    if let Some(run_id) = run_id {
        env.push(("ENVCOPY_RUN_ID", run_id));
    }
    env.into_iter()
        .map(|(key, value)| (key.to_string(), value))
        .collect()
}

/// Hook commands keyed by stage.
#[derive(Debug, Clone, Default)]
pub struct CommandHooks {
    commands: BTreeMap<StageKind, HookCommand>,
}

impl CommandHooks {
    /// Hooks from the configured stage map.
    #[must_use]
    pub const fn new(commands: BTreeMap<StageKind, HookCommand>) -> Self {
        Self { commands }
    }

    /// Whether a command is configured for `stage`.
    #[must_use]
    pub fn is_configured(&self, stage: StageKind) -> bool {
        self.commands.contains_key(&stage)
    }
}

#[async_trait]
impl StageHooks for CommandHooks {
    fn describe(&self, stage: StageKind, _context: &StageContext) -> Option<String> {
        self.commands.get(&stage).map(HookCommand::display)
    }

    async fn invoke(&self, stage: StageKind, context: &StageContext) -> anyhow::Result<()> {
        let command = self
            .commands
            .get(&stage)
            .ok_or_else(|| anyhow!("no collaborator configured for stage {stage}"))?;
        let env = hook_environment(stage, context, current_run_id().map(|id| id.to_string()));
        info!(stage = %stage, command = %command.display(), "running stage hook");
        let stdout = run_process(&command.program, &command.args, &env, command.timeout()).await?;
        for line in stdout.lines().filter(|line| !line.trim().is_empty()) {
            debug!(stage = %stage, "{line}");
        }
        Ok(())
    }
}
