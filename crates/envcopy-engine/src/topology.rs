//! Topology discovery against the resource inventory.

use std::sync::Arc;

use envcopy_core::tags::TAG_CLIENT_NAME;
use envcopy_core::{
    InventoryRecord, Namespace, ResourceInventory, ResourceKind, ServerTopology, StorageAccount,
    TopologyRole,
};
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::{EngineError, EngineResult};

/// Everything discovered for one side of a refresh.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnvironmentTopology {
    /// Primary database server.
    pub primary: ServerTopology,
    /// Geo-replicated partner, when the environment has one.
    pub secondary: Option<ServerTopology>,
    /// Storage account of the namespace.
    pub storage: StorageAccount,
}

/// Resolves servers and storage accounts from inventory tags.
#[derive(Clone)]
pub struct TopologyResolver {
    inventory: Arc<dyn ResourceInventory>,
}

impl TopologyResolver {
    /// Build a resolver over an inventory.
    #[must_use]
    pub fn new(inventory: Arc<dyn ResourceInventory>) -> Self {
        Self { inventory }
    }

    /// Primary server of an environment.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Discovery`] when nothing matches.
    pub async fn primary_server(&self, environment: &str) -> EngineResult<ServerTopology> {
        let record = self
            .first_match(ResourceKind::SqlServer, environment, TopologyRole::Primary, None)
            .await?
            .ok_or_else(|| EngineError::Discovery {
                kind: ResourceKind::SqlServer.label(),
                environment: environment.to_string(),
                role: TopologyRole::Primary,
                scope: String::new(),
            })?;
        parse_server(&record)
    }

    /// Secondary server of an environment; `None` means no failover topology.
    ///
    /// # Errors
    ///
    /// Returns an error only when the inventory query fails or the match is
    /// misnamed.
    pub async fn secondary_server(&self, environment: &str) -> EngineResult<Option<ServerTopology>> {
        let record = self
            .first_match(ResourceKind::SqlServer, environment, TopologyRole::Secondary, None)
            .await?;
        match record {
            Some(record) => parse_server(&record).map(Some),
            None => {
                debug!(environment, "no secondary server; failover handling disabled");
                Ok(None)
            }
        }
    }

    /// Storage account of a namespace, selected by its `ClientName` tag.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Discovery`] when nothing matches.
    pub async fn storage_account(
        &self,
        environment: &str,
        namespace: &Namespace,
    ) -> EngineResult<StorageAccount> {
        let record = self
            .first_match(
                ResourceKind::StorageAccount,
                environment,
                TopologyRole::Primary,
                Some(namespace),
            )
            .await?
            .ok_or_else(|| EngineError::Discovery {
                kind: ResourceKind::StorageAccount.label(),
                environment: environment.to_string(),
                role: TopologyRole::Primary,
                scope: namespace_scope(namespace),
            })?;
        Ok(StorageAccount::from(&record))
    }

    /// Resolve primary, secondary, and storage for one side of a refresh.
    ///
    /// # Errors
    ///
    /// Propagates the first discovery failure.
    pub async fn resolve(
        &self,
        environment: &str,
        namespace: &Namespace,
    ) -> EngineResult<EnvironmentTopology> {
        let primary = self.primary_server(environment).await?;
        let secondary = self.secondary_server(environment).await?;
        let storage = self.storage_account(environment, namespace).await?;
        Ok(EnvironmentTopology {
            primary,
            secondary,
            storage,
        })
    }

    async fn first_match(
        &self,
        kind: ResourceKind,
        environment: &str,
        role: TopologyRole,
        namespace: Option<&Namespace>,
    ) -> EngineResult<Option<InventoryRecord>> {
        let records = self
            .inventory
            .find(kind, environment, role)
            .await
            .map_err(|source| EngineError::Inventory {
                kind: kind.label(),
                environment: environment.to_string(),
                source,
            })?;

        let mut matches: Vec<InventoryRecord> = records
            .into_iter()
            .filter(|record| namespace.is_none_or(|ns| belongs_to(record, ns)))
            .collect();

        if matches.len() > 1 {
            let names: Vec<&str> = matches.iter().map(|r| r.name.as_str()).collect();
            warn!(
                kind = kind.label(),
                environment,
                role = %role,
                candidates = ?names,
                "multiple resources match; using the first"
            );
        }
        Ok(if matches.is_empty() {
            None
        } else {
            Some(matches.swap_remove(0))
        })
    }
}

fn parse_server(record: &InventoryRecord) -> EngineResult<ServerTopology> {
    ServerTopology::from_record(record).map_err(|source| EngineError::Topology {
        name: record.name.clone(),
        source,
    })
}

fn belongs_to(record: &InventoryRecord, namespace: &Namespace) -> bool {
    let client = record.tags.get_non_empty(TAG_CLIENT_NAME);
    match namespace {
        Namespace::Root => client.is_none(),
        Namespace::Named(alias) => client.is_some_and(|value| value.eq_ignore_ascii_case(alias)),
    }
}

fn namespace_scope(namespace: &Namespace) -> String {
    match namespace.alias() {
        Some(alias) => format!(", {TAG_CLIENT_NAME}={alias}"),
        None => format!(" without {TAG_CLIENT_NAME}"),
    }
}
