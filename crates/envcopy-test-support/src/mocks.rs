//! In-memory cloud that records every collaborator call.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use anyhow::{Result, anyhow, bail};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use envcopy_core::tags::{TAG_CLIENT_NAME, TAG_ENVIRONMENT, TAG_TYPE};
use envcopy_core::{
    AccessControl, AccessScope, CloudPlatform, CopyBackend, DatabaseCatalog, FailoverRegistry,
    InventoryRecord, PoolCapacity, PoolInspector, ResourceDescriptor, ResourceInventory,
    ResourceKind, ResourceState, ServerTopology, StageContext, StageHooks, StageKind,
    StorageAccount, Tags, TopologyRole,
};

/// One recorded collaborator call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    /// Inventory query.
    Find {
        /// Kind queried.
        kind: ResourceKind,
        /// Environment queried.
        environment: String,
        /// Role queried.
        role: TopologyRole,
    },
    /// Database listing.
    ListDatabases {
        /// Server listed.
        server: String,
    },
    /// Container listing.
    ListContainers {
        /// Account listed.
        account: String,
    },
    /// Object read.
    Describe {
        /// Owning server or account.
        host: String,
        /// Object name.
        object: String,
    },
    /// Object deletion through a copy backend.
    Delete {
        /// Owning server or account.
        host: String,
        /// Object name.
        object: String,
    },
    /// Catalog database deletion.
    DeleteDatabase {
        /// Owning server.
        server: String,
        /// Database name.
        database: String,
    },
    /// Copy request.
    StartCopy {
        /// Source object.
        source: String,
        /// Destination host.
        host: String,
        /// Destination object.
        destination: String,
    },
    /// Readiness check.
    Readiness {
        /// Object name.
        object: String,
    },
    /// Tag write.
    WriteTags {
        /// Object name.
        object: String,
    },
    /// Credential rotation.
    RefreshCredentials,
    /// Principal lookup.
    CurrentPrincipal,
    /// Access grant.
    Grant {
        /// Resource groups covered.
        resource_groups: Vec<String>,
    },
    /// Access revocation.
    Revoke {
        /// Resource groups covered.
        resource_groups: Vec<String>,
    },
    /// Pool limit read.
    PoolCapacity {
        /// Server inspected.
        server: String,
    },
    /// Pool member listing.
    MemberSizes {
        /// Server inspected.
        server: String,
    },
    /// Single object size read.
    ObjectSize {
        /// Object measured.
        object: String,
    },
    /// Failover group lookup.
    GroupName {
        /// Primary server.
        server: String,
    },
    /// Failover group membership change.
    AddMember {
        /// Group name.
        group: String,
        /// Database added.
        database: String,
    },
    /// Hook invocation.
    InvokeHook {
        /// Stage delegated.
        stage: StageKind,
    },
}

impl Call {
    /// Whether the call mutates cloud state.
    #[must_use]
    pub const fn is_destructive(&self) -> bool {
        matches!(
            self,
            Self::Delete { .. }
                | Self::DeleteDatabase { .. }
                | Self::StartCopy { .. }
                | Self::WriteTags { .. }
                | Self::Grant { .. }
                | Self::Revoke { .. }
                | Self::AddMember { .. }
                | Self::InvokeHook { .. }
        )
    }
}

#[derive(Default)]
struct FakeState {
    inventory: Vec<(ResourceKind, InventoryRecord)>,
    hosts: BTreeMap<String, BTreeMap<String, ResourceDescriptor>>,
    pools: BTreeMap<String, PoolCapacity>,
    failover_groups: BTreeMap<String, (String, Vec<String>)>,
    hooks: BTreeMap<StageKind, String>,
    calls: Vec<Call>,
    principal: Option<String>,
    ready_after_polls: u32,
    polls: BTreeMap<String, u32>,
    never_ready: BTreeSet<String>,
    fail_on_poll: BTreeSet<String>,
    start_copy_failures: BTreeMap<String, u32>,
    delete_failures: BTreeSet<String>,
    hook_failures: BTreeSet<StageKind>,
    add_member_failures: BTreeSet<String>,
    tag_drops: BTreeMap<String, Vec<String>>,
    fail_grant: bool,
    fail_revoke: bool,
}

/// Scriptable in-memory cloud implementing every collaborator trait.
///
/// Clones share state, so a test keeps one handle for inspection while the
/// engine owns another.
#[derive(Clone)]
pub struct FakeCloud {
    state: Arc<Mutex<FakeState>>,
}

impl Default for FakeCloud {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeCloud {
    /// Empty cloud where copies become ready on the first poll.
    #[must_use]
    pub fn new() -> Self {
        let state = FakeState {
            principal: Some("operator@example.com".into()),
            ready_after_polls: 1,
            ..FakeState::default()
        };
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record(&self, call: Call) {
        self.lock().calls.push(call);
    }

    /// Register a SQL server in the inventory.
    #[must_use]
    pub fn with_server(
        self,
        environment: &str,
        role: TopologyRole,
        name: &str,
        resource_group: &str,
        location: &str,
    ) -> Self {
        let tags: Tags = [
            (TAG_ENVIRONMENT, environment),
            (TAG_TYPE, role.tag_value()),
        ]
        .into_iter()
        .collect();
        self.push_record(ResourceKind::SqlServer, name, resource_group, location, tags, ".database.windows.net");
        self.lock().hosts.entry(name.to_string()).or_default();
        self
    }

    /// Register a storage account; `client` sets its `ClientName` tag.
    #[must_use]
    pub fn with_storage(
        self,
        environment: &str,
        name: &str,
        resource_group: &str,
        client: Option<&str>,
    ) -> Self {
        let mut tags: Tags = [
            (TAG_ENVIRONMENT, environment),
            (TAG_TYPE, TopologyRole::Primary.tag_value()),
        ]
        .into_iter()
        .collect();
        if let Some(client) = client {
            tags.insert(TAG_CLIENT_NAME, client);
        }
        self.push_record(ResourceKind::StorageAccount, name, resource_group, "eastus", tags, ".blob.core.windows.net");
        self.lock().hosts.entry(name.to_string()).or_default();
        self
    }

    fn push_record(
        &self,
        kind: ResourceKind,
        name: &str,
        resource_group: &str,
        location: &str,
        tags: Tags,
        domain: &str,
    ) {
        self.lock().inventory.push((
            kind,
            InventoryRecord {
                name: name.to_string(),
                endpoint: format!("{name}{domain}"),
                resource_group: resource_group.to_string(),
                subscription_id: "00000000-0000-0000-0000-000000000001".into(),
                location: location.to_string(),
                tags,
            },
        ));
    }

    /// Place a database or container on a server or account.
    #[must_use]
    pub fn with_object(self, host: &str, object: ResourceDescriptor) -> Self {
        self.lock()
            .hosts
            .entry(host.to_string())
            .or_default()
            .insert(object.name.clone(), object.with_state(ResourceState::Online));
        self
    }

    /// Put a server's databases into a pool.
    #[must_use]
    pub fn with_pool(self, server: &str, pool: &str, max_bytes: u64) -> Self {
        self.lock().pools.insert(
            server.to_string(),
            PoolCapacity {
                name: pool.to_string(),
                max_bytes,
            },
        );
        self
    }

    /// Give a primary server a failover group.
    #[must_use]
    pub fn with_failover_group(self, server: &str, group: &str) -> Self {
        self.lock()
            .failover_groups
            .insert(server.to_string(), (group.to_string(), Vec::new()));
        self
    }

    /// Configure an external hook for a stage.
    #[must_use]
    pub fn with_hook(self, stage: StageKind, description: &str) -> Self {
        self.lock().hooks.insert(stage, description.to_string());
        self
    }

    /// Number of readiness checks before a new copy reports `Online`.
    #[must_use]
    pub fn ready_after(self, polls: u32) -> Self {
        self.lock().ready_after_polls = polls.max(1);
        self
    }

    /// Keep an object in `Creating` forever.
    #[must_use]
    pub fn never_ready(self, object: &str) -> Self {
        self.lock().never_ready.insert(object.to_string());
        self
    }

    /// Report an object's copy as `Failed`.
    #[must_use]
    pub fn fail_on_poll(self, object: &str) -> Self {
        self.lock().fail_on_poll.insert(object.to_string());
        self
    }

    /// Reject the first `times` copy requests for a destination.
    #[must_use]
    pub fn fail_start_copy(self, destination: &str, times: u32) -> Self {
        self.lock()
            .start_copy_failures
            .insert(destination.to_string(), times);
        self
    }

    /// Fail deletions of an object.
    #[must_use]
    pub fn fail_delete(self, object: &str) -> Self {
        self.lock().delete_failures.insert(object.to_string());
        self
    }

    /// Fail a stage hook.
    #[must_use]
    pub fn fail_hook(self, stage: StageKind) -> Self {
        self.lock().hook_failures.insert(stage);
        self
    }

    /// Fail failover registration of a database.
    #[must_use]
    pub fn fail_add_member(self, database: &str) -> Self {
        self.lock().add_member_failures.insert(database.to_string());
        self
    }

    /// Silently drop a tag key whenever tags are written to an object.
    #[must_use]
    pub fn drop_tag_on_write(self, object: &str, key: &str) -> Self {
        self.lock()
            .tag_drops
            .entry(object.to_string())
            .or_default()
            .push(key.to_string());
        self
    }

    /// Fail access grants.
    #[must_use]
    pub fn fail_grant(self) -> Self {
        self.lock().fail_grant = true;
        self
    }

    /// Fail access revocations.
    #[must_use]
    pub fn fail_revoke(self) -> Self {
        self.lock().fail_revoke = true;
        self
    }

    /// Make the signed-in principal unresolvable.
    #[must_use]
    pub fn without_principal(self) -> Self {
        self.lock().principal = None;
        self
    }

    /// Every call made so far.
    #[must_use]
    pub fn calls(&self) -> Vec<Call> {
        self.lock().calls.clone()
    }

    /// Calls that mutate cloud state.
    #[must_use]
    pub fn destructive_calls(&self) -> Vec<Call> {
        self.lock()
            .calls
            .iter()
            .filter(|call| call.is_destructive())
            .cloned()
            .collect()
    }

    /// Forget recorded calls.
    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    /// Object on a host.
    #[must_use]
    pub fn object(&self, host: &str, name: &str) -> Option<ResourceDescriptor> {
        self.lock()
            .hosts
            .get(host)
            .and_then(|objects| objects.get(name))
            .cloned()
    }

    /// Names of every object on a host.
    #[must_use]
    pub fn object_names(&self, host: &str) -> Vec<String> {
        self.lock()
            .hosts
            .get(host)
            .map(|objects| objects.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Members of a server's failover group.
    #[must_use]
    pub fn failover_members(&self, server: &str) -> Vec<String> {
        self.lock()
            .failover_groups
            .get(server)
            .map(|(_, members)| members.clone())
            .unwrap_or_default()
    }

    fn describe_on(&self, host: &str, name: &str) -> Option<ResourceDescriptor> {
        self.record(Call::Describe {
            host: host.to_string(),
            object: name.to_string(),
        });
        self.object(host, name)
    }

    fn delete_on(&self, host: &str, name: &str) -> Result<()> {
        self.record(Call::Delete {
            host: host.to_string(),
            object: name.to_string(),
        });
        let mut state = self.lock();
        if state.delete_failures.contains(name) {
            bail!("delete of {name} rejected");
        }
        if let Some(objects) = state.hosts.get_mut(host) {
            objects.remove(name);
        }
        Ok(())
    }

    fn copy_into(&self, source_host: &str, source: &ResourceDescriptor, host: &str, name: &str) -> Result<()> {
        self.record(Call::StartCopy {
            source: source.name.clone(),
            host: host.to_string(),
            destination: name.to_string(),
        });
        let mut state = self.lock();
        if let Some(remaining) = state.start_copy_failures.get_mut(name) {
            if *remaining > 0 {
                *remaining -= 1;
                bail!("copy request for {name} throttled");
            }
        }
        let size = state
            .hosts
            .get(source_host)
            .and_then(|objects| objects.get(&source.name))
            .map_or(source.size_bytes, |object| object.size_bytes);
        let copy = ResourceDescriptor::new(name)
            .with_size(size)
            .with_state(ResourceState::Creating);
        state
            .hosts
            .entry(host.to_string())
            .or_default()
            .insert(name.to_string(), copy);
        state.polls.remove(name);
        Ok(())
    }

    fn readiness_on(&self, host: &str, name: &str) -> Result<ResourceState> {
        self.record(Call::Readiness {
            object: name.to_string(),
        });
        let mut state = self.lock();
        if state.fail_on_poll.contains(name) {
            return Ok(ResourceState::Failed);
        }
        let never_ready = state.never_ready.contains(name);
        let ready_after = state.ready_after_polls;
        let polls = {
            let counter = state.polls.entry(name.to_string()).or_insert(0);
            *counter += 1;
            *counter
        };
        let object = state
            .hosts
            .get_mut(host)
            .and_then(|objects| objects.get_mut(name))
            .ok_or_else(|| anyhow!("{name} not found on {host}"))?;
        if object.state == ResourceState::Creating && !never_ready && polls >= ready_after {
            object.state = ResourceState::Online;
        }
        Ok(object.state)
    }

    fn write_tags_on(&self, host: &str, name: &str, tags: &Tags) -> Result<()> {
        self.record(Call::WriteTags {
            object: name.to_string(),
        });
        let mut state = self.lock();
        let mut written = tags.clone();
        if let Some(drops) = state.tag_drops.get(name) {
            for key in drops {
                written.remove(key);
            }
        }
        let object = state
            .hosts
            .get_mut(host)
            .and_then(|objects| objects.get_mut(name))
            .ok_or_else(|| anyhow!("{name} not found on {host}"))?;
        object.tags = written;
        Ok(())
    }
}

#[async_trait]
impl ResourceInventory for FakeCloud {
    async fn find(
        &self,
        kind: ResourceKind,
        environment: &str,
        role: TopologyRole,
    ) -> Result<Vec<InventoryRecord>> {
        self.record(Call::Find {
            kind,
            environment: environment.to_string(),
            role,
        });
        Ok(self
            .lock()
            .inventory
            .iter()
            .filter(|(k, record)| {
                *k == kind
                    && record
                        .tags
                        .get(TAG_ENVIRONMENT)
                        .is_some_and(|value| value.eq_ignore_ascii_case(environment))
                    && record.tags.get(TAG_TYPE) == Some(role.tag_value())
            })
            .map(|(_, record)| record.clone())
            .collect())
    }
}

#[async_trait]
impl DatabaseCatalog for FakeCloud {
    async fn list_databases(&self, server: &ServerTopology) -> Result<Vec<ResourceDescriptor>> {
        self.record(Call::ListDatabases {
            server: server.name.clone(),
        });
        Ok(self
            .lock()
            .hosts
            .get(&server.name)
            .map(|objects| objects.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn list_containers(&self, account: &StorageAccount) -> Result<Vec<ResourceDescriptor>> {
        self.record(Call::ListContainers {
            account: account.name.clone(),
        });
        Ok(self
            .lock()
            .hosts
            .get(&account.name)
            .map(|objects| objects.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn delete_database(&self, server: &ServerTopology, name: &str) -> Result<()> {
        self.record(Call::DeleteDatabase {
            server: server.name.clone(),
            database: name.to_string(),
        });
        let mut state = self.lock();
        if state.delete_failures.contains(name) {
            bail!("delete of {name} rejected");
        }
        if let Some(objects) = state.hosts.get_mut(&server.name) {
            objects.remove(name);
        }
        Ok(())
    }
}

#[async_trait]
impl AccessControl for FakeCloud {
    async fn current_principal(&self) -> Result<String> {
        self.record(Call::CurrentPrincipal);
        self.lock()
            .principal
            .clone()
            .ok_or_else(|| anyhow!("not signed in"))
    }

    async fn grant(&self, scope: &AccessScope) -> Result<()> {
        self.record(Call::Grant {
            resource_groups: scope.resource_groups.clone(),
        });
        if self.lock().fail_grant {
            bail!("authorization failed");
        }
        Ok(())
    }

    async fn revoke(&self, scope: &AccessScope) -> Result<()> {
        self.record(Call::Revoke {
            resource_groups: scope.resource_groups.clone(),
        });
        if self.lock().fail_revoke {
            bail!("role assignment not found");
        }
        Ok(())
    }
}

#[async_trait]
impl StageHooks for FakeCloud {
    fn describe(&self, stage: StageKind, _context: &StageContext) -> Option<String> {
        self.lock().hooks.get(&stage).cloned()
    }

    async fn invoke(&self, stage: StageKind, _context: &StageContext) -> Result<()> {
        self.record(Call::InvokeHook { stage });
        if self.lock().hook_failures.contains(&stage) {
            bail!("hook for {stage} exited with status 1");
        }
        Ok(())
    }
}

/// Which host pair a fake backend copies between.
#[derive(Clone)]
struct FakeBackend {
    cloud: FakeCloud,
    kind: &'static str,
    source_host: String,
    destination_host: String,
}

#[async_trait]
impl CopyBackend for FakeBackend {
    fn object_kind(&self) -> &'static str {
        self.kind
    }

    async fn describe(&self, name: &str) -> Result<Option<ResourceDescriptor>> {
        Ok(self.cloud.describe_on(&self.destination_host, name))
    }

    async fn delete(&self, name: &str) -> Result<()> {
        self.cloud.delete_on(&self.destination_host, name)
    }

    async fn start_copy(&self, source: &ResourceDescriptor, destination_name: &str) -> Result<()> {
        self.cloud
            .copy_into(&self.source_host, source, &self.destination_host, destination_name)
    }

    async fn readiness(&self, name: &str) -> Result<ResourceState> {
        self.cloud.readiness_on(&self.destination_host, name)
    }

    async fn write_tags(&self, name: &str, tags: &Tags) -> Result<()> {
        self.cloud.write_tags_on(&self.destination_host, name, tags)
    }

    async fn refresh_credentials(&self) -> Result<()> {
        self.cloud.record(Call::RefreshCredentials);
        Ok(())
    }
}

struct FakePool {
    cloud: FakeCloud,
    server: String,
}

#[async_trait]
impl PoolInspector for FakePool {
    async fn capacity(&self) -> Result<Option<PoolCapacity>> {
        self.cloud.record(Call::PoolCapacity {
            server: self.server.clone(),
        });
        Ok(self.cloud.lock().pools.get(&self.server).cloned())
    }

    async fn member_sizes(&self) -> Result<Vec<u64>> {
        self.cloud.record(Call::MemberSizes {
            server: self.server.clone(),
        });
        Ok(self
            .cloud
            .lock()
            .hosts
            .get(&self.server)
            .map(|objects| objects.values().map(|object| object.size_bytes).collect())
            .unwrap_or_default())
    }

    async fn object_size(&self, name: &str) -> Result<Option<u64>> {
        self.cloud.record(Call::ObjectSize {
            object: name.to_string(),
        });
        Ok(self.cloud.object(&self.server, name).map(|object| object.size_bytes))
    }
}

struct FakeFailover {
    cloud: FakeCloud,
    server: String,
}

#[async_trait]
impl FailoverRegistry for FakeFailover {
    async fn group_name(&self) -> Result<Option<String>> {
        self.cloud.record(Call::GroupName {
            server: self.server.clone(),
        });
        Ok(self
            .cloud
            .lock()
            .failover_groups
            .get(&self.server)
            .map(|(group, _)| group.clone()))
    }

    async fn add_member(&self, group: &str, database: &str) -> Result<()> {
        self.cloud.record(Call::AddMember {
            group: group.to_string(),
            database: database.to_string(),
        });
        let mut state = self.cloud.lock();
        if state.add_member_failures.contains(database) {
            bail!("database {database} is not eligible for {group}");
        }
        if let Some((_, members)) = state.failover_groups.get_mut(&self.server) {
            members.push(database.to_string());
        }
        Ok(())
    }
}

impl CloudPlatform for FakeCloud {
    fn inventory(&self) -> Arc<dyn ResourceInventory> {
        Arc::new(self.clone())
    }

    fn catalog(&self) -> Arc<dyn DatabaseCatalog> {
        Arc::new(self.clone())
    }

    fn access(&self) -> Arc<dyn AccessControl> {
        Arc::new(self.clone())
    }

    fn hooks(&self) -> Arc<dyn StageHooks> {
        Arc::new(self.clone())
    }

    fn restore_backend(
        &self,
        server: &ServerTopology,
        _point_in_time: DateTime<Utc>,
    ) -> Arc<dyn CopyBackend> {
        Arc::new(FakeBackend {
            cloud: self.clone(),
            kind: "restored database",
            source_host: server.name.clone(),
            destination_host: server.name.clone(),
        })
    }

    fn database_backend(
        &self,
        source: &ServerTopology,
        destination: &ServerTopology,
    ) -> Arc<dyn CopyBackend> {
        Arc::new(FakeBackend {
            cloud: self.clone(),
            kind: "database",
            source_host: source.name.clone(),
            destination_host: destination.name.clone(),
        })
    }

    fn container_backend(
        &self,
        source: &StorageAccount,
        destination: &StorageAccount,
    ) -> Arc<dyn CopyBackend> {
        Arc::new(FakeBackend {
            cloud: self.clone(),
            kind: "container",
            source_host: source.name.clone(),
            destination_host: destination.name.clone(),
        })
    }

    fn pool_inspector(&self, server: &ServerTopology) -> Arc<dyn PoolInspector> {
        Arc::new(FakePool {
            cloud: self.clone(),
            server: server.name.clone(),
        })
    }

    fn failover_registry(&self, primary: &ServerTopology) -> Arc<dyn FailoverRegistry> {
        Arc::new(FakeFailover {
            cloud: self.clone(),
            server: primary.name.clone(),
        })
    }
}

impl FakeCloud {
    /// Copy backend between two hosts, for driving the orchestrator directly.
    #[must_use]
    pub fn backend(&self, kind: &'static str, source_host: &str, destination_host: &str) -> Arc<dyn CopyBackend> {
        Arc::new(FakeBackend {
            cloud: self.clone(),
            kind,
            source_host: source_host.to_string(),
            destination_host: destination_host.to_string(),
        })
    }
}
