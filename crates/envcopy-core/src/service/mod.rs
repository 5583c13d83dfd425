//! Collaborator traits implemented by cloud adapters.
//!
//! Every method returns `anyhow::Result`; engines wrap failures into their own
//! typed errors with stage and resource context.

use std::sync::Arc;

use anyhow::bail;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{
    InventoryRecord, ResourceDescriptor, ResourceKind, ResourceState, ServerTopology, StageKind,
    StorageAccount, Tags, TopologyRole,
};
use crate::naming::Namespace;

/// Resource inventory queried during topology discovery.
#[async_trait]
pub trait ResourceInventory: Send + Sync {
    /// Resources of `kind` whose `Environment` tag equals `environment`
    /// (case-insensitive) and whose `Type` tag equals `role`.
    async fn find(
        &self,
        kind: ResourceKind,
        environment: &str,
        role: TopologyRole,
    ) -> anyhow::Result<Vec<InventoryRecord>>;
}

/// Per-object operations the copy orchestrator drives for one batch. The
/// backend is bound to a source and a destination container (server or
/// account) at construction.
#[async_trait]
pub trait CopyBackend: Send + Sync {
    /// Object kind for logs ("database", "container").
    fn object_kind(&self) -> &'static str;

    /// Destination object, if it exists.
    async fn describe(&self, name: &str) -> anyhow::Result<Option<ResourceDescriptor>>;

    /// Delete a destination object. Absence is not an error.
    async fn delete(&self, name: &str) -> anyhow::Result<()>;

    /// Ask the provider to create `destination_name` as a copy of `source`.
    /// Returns once the request is accepted.
    async fn start_copy(
        &self,
        source: &ResourceDescriptor,
        destination_name: &str,
    ) -> anyhow::Result<()>;

    /// Current readiness of a destination object.
    async fn readiness(&self, name: &str) -> anyhow::Result<ResourceState>;

    /// Replace the tags of a destination object.
    async fn write_tags(&self, name: &str, tags: &Tags) -> anyhow::Result<()>;

    /// Rotate the credential used for status checks.
    async fn refresh_credentials(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Storage limit of a shared pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolCapacity {
    /// Pool name.
    pub name: String,
    /// Storage limit in bytes.
    pub max_bytes: u64,
}

/// Read-only view of the shared pool hosting destination objects.
#[async_trait]
pub trait PoolInspector: Send + Sync {
    /// Pool limits, or `None` when destination objects are not pooled.
    async fn capacity(&self) -> anyhow::Result<Option<PoolCapacity>>;

    /// Sizes of every current pool member.
    async fn member_sizes(&self) -> anyhow::Result<Vec<u64>>;

    /// Size of one destination object; `None` when it is not yet measurable.
    async fn object_size(&self, name: &str) -> anyhow::Result<Option<u64>>;
}

/// Failover grouping of a primary/secondary pair.
#[async_trait]
pub trait FailoverRegistry: Send + Sync {
    /// Failover group name, or `None` if the primary has none.
    async fn group_name(&self) -> anyhow::Result<Option<String>>;

    /// Add a database to the group.
    async fn add_member(&self, group: &str, database: &str) -> anyhow::Result<()>;
}

/// Listing and lifecycle of databases and containers.
#[async_trait]
pub trait DatabaseCatalog: Send + Sync {
    /// Databases hosted on a server, with tags and sizes.
    async fn list_databases(&self, server: &ServerTopology)
    -> anyhow::Result<Vec<ResourceDescriptor>>;

    /// Containers in a storage account.
    async fn list_containers(
        &self,
        account: &StorageAccount,
    ) -> anyhow::Result<Vec<ResourceDescriptor>>;

    /// Delete a database. Absence is not an error.
    async fn delete_database(&self, server: &ServerTopology, name: &str) -> anyhow::Result<()>;
}

/// Scope of the temporary elevated access.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessScope {
    /// Subscription holding the resources.
    pub subscription_id: String,
    /// Resource groups the access covers.
    pub resource_groups: Vec<String>,
}

/// Elevated access management.
#[async_trait]
pub trait AccessControl: Send + Sync {
    /// Identity of the signed-in principal. Read-only.
    async fn current_principal(&self) -> anyhow::Result<String>;

    /// Grant elevated access over the scope.
    async fn grant(&self, scope: &AccessScope) -> anyhow::Result<()>;

    /// Revoke elevated access over the scope.
    async fn revoke(&self, scope: &AccessScope) -> anyhow::Result<()>;
}

/// Values handed to external stage collaborators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageContext {
    /// Source environment.
    pub source_environment: String,
    /// Destination environment.
    pub destination_environment: String,
    /// Source namespace.
    pub source_namespace: Namespace,
    /// Destination namespace.
    pub destination_namespace: Namespace,
    /// Source server name, when discovered.
    pub source_server: Option<String>,
    /// Destination server name, when discovered.
    pub destination_server: Option<String>,
    /// Destination resource group, when discovered.
    pub destination_resource_group: Option<String>,
    /// Hostname applied to destination configuration.
    pub instance_alias: Option<String>,
    /// Hostname removed from destination configuration.
    pub instance_alias_to_remove: Option<String>,
    /// Whether the run is simulated.
    pub dry_run: bool,
}

/// External collaborators for stages whose actions live outside this tool.
#[async_trait]
pub trait StageHooks: Send + Sync {
    /// Describe the action the stage would take, or `None` when no
    /// collaborator is configured for it.
    fn describe(&self, stage: StageKind, context: &StageContext) -> Option<String>;

    /// Perform the stage action.
    async fn invoke(&self, stage: StageKind, context: &StageContext) -> anyhow::Result<()> {
        let _ = context;
        bail!("no collaborator configured for stage {stage}");
    }
}

/// Factory tying all collaborators of one cloud together.
pub trait CloudPlatform: Send + Sync {
    /// Resource inventory.
    fn inventory(&self) -> Arc<dyn ResourceInventory>;

    /// Database and container catalog.
    fn catalog(&self) -> Arc<dyn DatabaseCatalog>;

    /// Elevated access management.
    fn access(&self) -> Arc<dyn AccessControl>;

    /// External stage collaborators.
    fn hooks(&self) -> Arc<dyn StageHooks>;

    /// Backend restoring databases on `server` to `point_in_time` under new names.
    fn restore_backend(
        &self,
        server: &ServerTopology,
        point_in_time: DateTime<Utc>,
    ) -> Arc<dyn CopyBackend>;

    /// Backend copying databases between servers.
    fn database_backend(
        &self,
        source: &ServerTopology,
        destination: &ServerTopology,
    ) -> Arc<dyn CopyBackend>;

    /// Backend copying blob containers between accounts.
    fn container_backend(
        &self,
        source: &StorageAccount,
        destination: &StorageAccount,
    ) -> Arc<dyn CopyBackend>;

    /// Pool view of a destination server.
    fn pool_inspector(&self, server: &ServerTopology) -> Arc<dyn PoolInspector>;

    /// Failover registry of a primary server.
    fn failover_registry(&self, primary: &ServerTopology) -> Arc<dyn FailoverRegistry>;
}
