//! Azure implementation of the collaborator factory.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use envcopy_config::RefreshSettings;
use envcopy_core::{
    AccessControl, CloudPlatform, CopyBackend, DatabaseCatalog, FailoverRegistry, PoolInspector,
    ResourceInventory, ServerTopology, StageHooks, StorageAccount,
};

use crate::access::AzAccess;
use crate::cli::AzCli;
use crate::hooks::CommandHooks;
use crate::inventory::AzInventory;
use crate::sql::{AzCatalog, AzFailover, AzPool, CopyMode, SqlCopyBackend};
use crate::storage::ContainerBackend;

/// Every collaborator backed by one `az` runner.
#[derive(Debug, Clone)]
pub struct AzurePlatform {
    cli: Arc<AzCli>,
    role: String,
    hooks: Arc<CommandHooks>,
}

impl AzurePlatform {
    /// Platform configured from runtime settings.
    #[must_use]
    pub fn from_settings(settings: &RefreshSettings) -> Self {
        Self {
            cli: Arc::new(AzCli::new(settings.az_path.clone())),
            role: settings.access.role.clone(),
            hooks: Arc::new(CommandHooks::new(settings.hooks.clone())),
        }
    }
}

impl CloudPlatform for AzurePlatform {
    fn inventory(&self) -> Arc<dyn ResourceInventory> {
        Arc::new(AzInventory::new(Arc::clone(&self.cli)))
    }

    fn catalog(&self) -> Arc<dyn DatabaseCatalog> {
        Arc::new(AzCatalog::new(Arc::clone(&self.cli)))
    }

    fn access(&self) -> Arc<dyn AccessControl> {
        Arc::new(AzAccess::new(Arc::clone(&self.cli), self.role.clone()))
    }

    fn hooks(&self) -> Arc<dyn StageHooks> {
        self.hooks.clone()
    }

    fn restore_backend(
        &self,
        server: &ServerTopology,
        point_in_time: DateTime<Utc>,
    ) -> Arc<dyn CopyBackend> {
        Arc::new(SqlCopyBackend::new(
            Arc::clone(&self.cli),
            server.clone(),
            CopyMode::Restore { point_in_time },
        ))
    }

    fn database_backend(
        &self,
        source: &ServerTopology,
        destination: &ServerTopology,
    ) -> Arc<dyn CopyBackend> {
        Arc::new(SqlCopyBackend::new(
            Arc::clone(&self.cli),
            destination.clone(),
            CopyMode::Copy {
                source: source.clone(),
            },
        ))
    }

    fn container_backend(
        &self,
        source: &StorageAccount,
        destination: &StorageAccount,
    ) -> Arc<dyn CopyBackend> {
        Arc::new(ContainerBackend::new(
            Arc::clone(&self.cli),
            source.clone(),
            destination.clone(),
        ))
    }

    fn pool_inspector(&self, server: &ServerTopology) -> Arc<dyn PoolInspector> {
        Arc::new(AzPool::new(Arc::clone(&self.cli), server.clone()))
    }

    fn failover_registry(&self, primary: &ServerTopology) -> Arc<dyn FailoverRegistry> {
        Arc::new(AzFailover::new(Arc::clone(&self.cli), primary.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use envcopy_config::HookCommand;
    use envcopy_core::StageKind;

    #[test]
    fn settings_drive_the_runner_and_hooks() {
        let mut settings = RefreshSettings {
            az_path: "/opt/az/bin/az".into(),
            ..RefreshSettings::default()
        };
        settings.hooks.insert(
            StageKind::StopDestination,
            HookCommand {
                program: "deploy".into(),
                args: vec!["stop".into()],
                timeout_secs: None,
            },
        );
        let platform = AzurePlatform::from_settings(&settings);
        assert_eq!(platform.cli.program(), "/opt/az/bin/az");
        assert_eq!(platform.role, settings.access.role);
        assert!(platform.hooks.is_configured(StageKind::StopDestination));
    }
}
