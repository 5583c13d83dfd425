//! Server and storage identities discovered from the resource inventory.

use std::fmt::{self, Display, Formatter};

use serde::{Deserialize, Serialize};

use super::resource::Tags;
use crate::error::{CoreError, CoreResult};

/// Delimiter used by the resource naming convention.
pub const NAME_DELIMITER: char = '-';
/// Minimum number of delimited segments a server name must carry.
pub const MIN_NAME_SEGMENTS: usize = 4;

/// Role tag distinguishing the two halves of a failover pairing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TopologyRole {
    /// Read/write server that receives copies.
    Primary,
    /// Geo-replicated partner of the primary.
    Secondary,
}

impl TopologyRole {
    /// Value stored in the `Type` tag of inventory resources.
    #[must_use]
    pub const fn tag_value(self) -> &'static str {
        match self {
            Self::Primary => "Primary",
            Self::Secondary => "Secondary",
        }
    }
}

impl Display for TopologyRole {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag_value())
    }
}

/// Kind of inventory resource that carries a topology identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    /// Logical database server.
    SqlServer,
    /// Blob storage account.
    StorageAccount,
}

impl ResourceKind {
    /// Inventory resource type used when querying.
    #[must_use]
    pub const fn resource_type(self) -> &'static str {
        match self {
            Self::SqlServer => "microsoft.sql/servers",
            Self::StorageAccount => "microsoft.storage/storageaccounts",
        }
    }

    /// Short label used in logs and diagnostics.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::SqlServer => "sql server",
            Self::StorageAccount => "storage account",
        }
    }
}

/// Raw row returned by an inventory query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryRecord {
    /// Resource name.
    pub name: String,
    /// Fully-qualified endpoint (server FQDN or blob endpoint).
    pub endpoint: String,
    /// Owning resource group.
    pub resource_group: String,
    /// Owning subscription identifier.
    pub subscription_id: String,
    /// Deployment region.
    pub location: String,
    /// Tags attached to the resource.
    #[serde(default)]
    pub tags: Tags,
}

/// Identity of a database server, including tokens parsed from its name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerTopology {
    /// Server name.
    pub name: String,
    /// Fully-qualified endpoint address.
    pub endpoint_address: String,
    /// Owning resource group.
    pub resource_group: String,
    /// Owning subscription identifier.
    pub subscription_id: String,
    /// Deployment region.
    pub region: String,
    /// Product token (second name segment).
    pub product_token: String,
    /// Tier token (third name segment).
    pub tier_token: String,
    /// Environment token (fourth name segment).
    pub environment_token: String,
}

impl ServerTopology {
    /// Build a topology from an inventory record, parsing the naming convention
    /// `{prefix}-{product}-{tier}-{environment}[-...]`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidResourceName`] when the name has fewer than
    /// [`MIN_NAME_SEGMENTS`] delimited segments or any of them is empty.
    pub fn from_record(record: &InventoryRecord) -> CoreResult<Self> {
        let segments: Vec<&str> = record.name.split(NAME_DELIMITER).collect();
        if segments.len() < MIN_NAME_SEGMENTS {
            return Err(CoreError::InvalidResourceName {
                name: record.name.clone(),
                reason: "fewer than four delimited segments",
            });
        }
        if segments[..MIN_NAME_SEGMENTS].iter().any(|s| s.is_empty()) {
            return Err(CoreError::InvalidResourceName {
                name: record.name.clone(),
                reason: "empty segment",
            });
        }

        Ok(Self {
            name: record.name.clone(),
            endpoint_address: record.endpoint.clone(),
            resource_group: record.resource_group.clone(),
            subscription_id: record.subscription_id.clone(),
            region: record.location.to_ascii_lowercase(),
            product_token: segments[1].to_ascii_lowercase(),
            tier_token: segments[2].to_ascii_lowercase(),
            environment_token: segments[3].to_ascii_lowercase(),
        })
    }
}

/// Identity of a blob storage account. Storage names carry no delimiters, so
/// no tokens are parsed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageAccount {
    /// Account name.
    pub name: String,
    /// Blob endpoint.
    pub endpoint_address: String,
    /// Owning resource group.
    pub resource_group: String,
    /// Owning subscription identifier.
    pub subscription_id: String,
    /// Deployment region.
    pub region: String,
}

impl From<&InventoryRecord> for StorageAccount {
    fn from(record: &InventoryRecord) -> Self {
        Self {
            name: record.name.clone(),
            endpoint_address: record.endpoint.clone(),
            resource_group: record.resource_group.clone(),
            subscription_id: record.subscription_id.clone(),
            region: record.location.to_ascii_lowercase(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(name: &str) -> InventoryRecord {
        InventoryRecord {
            name: name.to_string(),
            endpoint: format!("{name}.database.windows.net"),
            resource_group: "rg-acme-prod-qa2".to_string(),
            subscription_id: "sub-1".to_string(),
            location: "EastUS".to_string(),
            tags: Tags::default(),
        }
    }

    #[test]
    fn from_record_parses_tokens() {
        let topology = ServerTopology::from_record(&record("sql-acme-prod-qa2-eastus"))
            .expect("valid name");
        assert_eq!(topology.product_token, "acme");
        assert_eq!(topology.tier_token, "prod");
        assert_eq!(topology.environment_token, "qa2");
        assert_eq!(topology.region, "eastus");
    }

    #[test]
    fn from_record_accepts_exactly_four_segments() {
        let topology =
            ServerTopology::from_record(&record("sql-acme-prod-qa2")).expect("four segments");
        assert_eq!(topology.environment_token, "qa2");
    }

    #[test]
    fn from_record_rejects_short_names() {
        let err = ServerTopology::from_record(&record("sql-acme-prod")).unwrap_err();
        assert!(matches!(
            err,
            CoreError::InvalidResourceName {
                reason: "fewer than four delimited segments",
                ..
            }
        ));
    }

    #[test]
    fn from_record_rejects_empty_segments() {
        assert!(ServerTopology::from_record(&record("sql--prod-qa2")).is_err());
    }

    #[test]
    fn role_tag_values_match_inventory_convention() {
        assert_eq!(TopologyRole::Primary.tag_value(), "Primary");
        assert_eq!(TopologyRole::Secondary.to_string(), "Secondary");
    }
}
