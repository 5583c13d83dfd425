//! Resource discovery through Azure Resource Graph.

use std::sync::Arc;

use async_trait::async_trait;
use envcopy_core::tags::{TAG_ENVIRONMENT, TAG_TYPE};
use envcopy_core::{InventoryRecord, ResourceInventory, ResourceKind, Tags, TopologyRole};
use serde::Deserialize;
use tracing::debug;

use crate::cli::AzCli;

const PAGE_SIZE: &str = "1000";

#[derive(Debug, Deserialize)]
struct GraphResponse {
    #[serde(default)]
    data: Vec<GraphRow>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GraphRow {
    name: String,
    #[serde(default)]
    endpoint: Option<String>,
    resource_group: String,
    subscription_id: String,
    location: String,
    #[serde(default)]
    tags: Option<Tags>,
}

impl From<GraphRow> for InventoryRecord {
    fn from(row: GraphRow) -> Self {
        Self {
            endpoint: row.endpoint.unwrap_or_default(),
            name: row.name,
            resource_group: row.resource_group,
            subscription_id: row.subscription_id,
            location: row.location,
            tags: row.tags.unwrap_or_default(),
        }
    }
}

/// Inventory backed by `az graph query`.
#[derive(Debug, Clone)]
pub struct AzInventory {
    cli: Arc<AzCli>,
}

impl AzInventory {
    /// Inventory using the given runner.
    #[must_use]
    pub const fn new(cli: Arc<AzCli>) -> Self {
        Self { cli }
    }
}

#[async_trait]
impl ResourceInventory for AzInventory {
    async fn find(
        &self,
        kind: ResourceKind,
        environment: &str,
        role: TopologyRole,
    ) -> anyhow::Result<Vec<InventoryRecord>> {
        let query = graph_query(kind, environment, role);
        debug!(query = %query, "querying resource graph");
        let response: GraphResponse = self
            .cli
            .json(&["graph", "query", "--graph-query", &query, "--first", PAGE_SIZE])
            .await?;
        Ok(response.data.into_iter().map(InventoryRecord::from).collect())
    }
}

/// Case-insensitive tag filter for one resource kind and role.
pub(crate) fn graph_query(kind: ResourceKind, environment: &str, role: TopologyRole) -> String {
    let endpoint = match kind {
        ResourceKind::SqlServer => "tostring(properties.fullyQualifiedDomainName)",
        ResourceKind::StorageAccount => "tostring(properties.primaryEndpoints.blob)",
    };
    format!(
        "Resources | where type =~ '{kind}' | where tags['{env_key}'] =~ '{environment}' \
         | where tags['{type_key}'] =~ '{role}' \
         | project name, endpoint = {endpoint}, resourceGroup, subscriptionId, location, tags \
         | order by name asc",
        kind = kind.resource_type(),
        env_key = TAG_ENVIRONMENT,
        environment = escape(environment),
        type_key = TAG_TYPE,
        role = role.tag_value(),
    )
}

fn escape(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_filters_kind_environment_and_role() {
        let query = graph_query(ResourceKind::SqlServer, "qa2", TopologyRole::Secondary);
        assert!(query.contains("type =~ 'microsoft.sql/servers'"));
        assert!(query.contains("tags['Environment'] =~ 'qa2'"));
        assert!(query.contains("tags['Type'] =~ 'Secondary'"));
        assert!(query.contains("fullyQualifiedDomainName"));
    }

    #[test]
    fn quotes_in_values_are_escaped() {
        let query = graph_query(ResourceKind::StorageAccount, "qa'2", TopologyRole::Primary);
        assert!(query.contains("=~ 'qa\\'2'"));
    }

    #[test]
    fn rows_decode_into_records() {
        let body = r#"{"count":1,"data":[{"name":"sql-acme-prod-qa2-eastus",
            "endpoint":"sql-acme-prod-qa2-eastus.database.windows.net",
            "resourceGroup":"rg-acme-qa2","subscriptionId":"sub-1","location":"eastus",
            "tags":{"Environment":"qa2","Type":"Primary"}},
            {"name":"bare","resourceGroup":"rg","subscriptionId":"sub-1","location":"westus","tags":null}]}"#;
        let response: GraphResponse = serde_json::from_str(body).expect("decodes");
        let records: Vec<InventoryRecord> =
            response.data.into_iter().map(InventoryRecord::from).collect();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].tags.get("Type"), Some("Primary"));
        assert_eq!(records[1].endpoint, "");
        assert!(records[1].tags.is_empty());
    }
}
