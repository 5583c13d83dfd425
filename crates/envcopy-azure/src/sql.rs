//! Azure SQL adapters: catalog, copy and restore backends, pool inspection
//! and failover groups.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use envcopy_core::{
    CopyBackend, DatabaseCatalog, FailoverRegistry, PoolCapacity, PoolInspector,
    ResourceDescriptor, ResourceState, ServerTopology, StorageAccount, Tags,
};
use serde::Deserialize;
use tokio::sync::OnceCell;
use tracing::{debug, info};

use crate::cli::AzCli;
use crate::error::{AzureError, AzureResult};
use crate::storage;

const SIZE_METRIC: &str = "database_size";

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DatabaseRow {
    name: String,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    tags: Option<Tags>,
    #[serde(default)]
    elastic_pool_name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageRow {
    name: String,
    #[serde(default)]
    current_value: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PoolRow {
    name: String,
    #[serde(default)]
    max_size_bytes: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct GroupRow {
    name: String,
}

/// Used bytes reported by `list-usages`, if present.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn database_size(rows: &[UsageRow]) -> Option<u64> {
    rows.iter()
        .find(|row| row.name == SIZE_METRIC)
        .and_then(|row| row.current_value)
        .filter(|value| value.is_finite() && *value >= 0.0)
        .map(|value| value.round() as u64)
}

/// `key=value` arguments for `az tag update`.
pub(crate) fn tag_arguments(tags: &Tags) -> Vec<String> {
    tags.iter().map(|(key, value)| format!("{key}={value}")).collect()
}

/// Database operations scoped to one logical server.
#[derive(Debug)]
pub(crate) struct SqlServer {
    cli: Arc<AzCli>,
    server: ServerTopology,
    pool: OnceCell<Option<String>>,
}

impl SqlServer {
    pub(crate) fn new(cli: Arc<AzCli>, server: ServerTopology) -> Self {
        Self {
            cli,
            server,
            pool: OnceCell::new(),
        }
    }

    fn scope(&self) -> [&str; 4] {
        [
            "--server",
            self.server.name.as_str(),
            "--resource-group",
            self.server.resource_group.as_str(),
        ]
    }

    fn resource_id(&self, database: &str) -> String {
        format!(
            "/subscriptions/{}/resourceGroups/{}/providers/Microsoft.Sql/servers/{}/databases/{database}",
            self.server.subscription_id, self.server.resource_group, self.server.name
        )
    }

    async fn list(&self) -> AzureResult<Vec<DatabaseRow>> {
        let mut args = vec!["sql", "db", "list"];
        args.extend(self.scope());
        self.cli.json(&args).await
    }

    async fn show(&self, database: &str) -> AzureResult<Option<DatabaseRow>> {
        let mut args = vec!["sql", "db", "show", "--name", database];
        args.extend(self.scope());
        self.cli.json_optional(&args).await
    }

    async fn used_bytes(&self, database: &str) -> AzureResult<Option<u64>> {
        let mut args = vec!["sql", "db", "list-usages", "--name", database];
        args.extend(self.scope());
        let rows: Option<Vec<UsageRow>> = self.cli.json_optional(&args).await?;
        Ok(rows.as_deref().and_then(database_size))
    }

    async fn delete(&self, database: &str) -> AzureResult<()> {
        let mut args = vec!["sql", "db", "delete", "--name", database, "--yes"];
        args.extend(self.scope());
        match self.cli.execute(&args).await {
            Err(err) if err.is_not_found() => {
                debug!(database, "database already absent");
                Ok(())
            }
            other => other,
        }
    }

    async fn pools(&self) -> AzureResult<Vec<PoolRow>> {
        let mut args = vec!["sql", "elastic-pool", "list"];
        args.extend(self.scope());
        self.cli.json(&args).await
    }

    async fn pool_name(&self) -> AzureResult<Option<String>> {
        self.pool
            .get_or_try_init(|| async {
                let pools = self.pools().await?;
                Ok::<_, AzureError>(pools.into_iter().next().map(|pool| pool.name))
            })
            .await
            .cloned()
    }

    async fn describe(&self, database: &str) -> AzureResult<Option<ResourceDescriptor>> {
        let Some(row) = self.show(database).await? else {
            return Ok(None);
        };
        let size = self.used_bytes(database).await?.unwrap_or(0);
        Ok(Some(descriptor(row, size)))
    }

    async fn readiness(&self, database: &str) -> AzureResult<ResourceState> {
        Ok(self.show(database).await?.map_or(ResourceState::Unknown, |row| {
            row.status
                .as_deref()
                .map_or(ResourceState::Unknown, ResourceState::from_provider_status)
        }))
    }

    async fn write_tags(&self, database: &str, tags: &Tags) -> AzureResult<()> {
        if tags.is_empty() {
            return Ok(());
        }
        let id = self.resource_id(database);
        let pairs = tag_arguments(tags);
        let mut args = vec!["tag", "update", "--resource-id", id.as_str(), "--operation", "Replace", "--tags"];
        args.extend(pairs.iter().map(String::as_str));
        self.cli.execute(&args).await
    }
}

fn descriptor(row: DatabaseRow, size: u64) -> ResourceDescriptor {
    let state = row
        .status
        .as_deref()
        .map_or(ResourceState::Unknown, ResourceState::from_provider_status);
    ResourceDescriptor::new(row.name)
        .with_tags(row.tags.unwrap_or_default())
        .with_size(size)
        .with_state(state)
}

/// Database and container listings.
#[derive(Debug, Clone)]
pub struct AzCatalog {
    cli: Arc<AzCli>,
}

impl AzCatalog {
    /// Catalog using the given runner.
    #[must_use]
    pub const fn new(cli: Arc<AzCli>) -> Self {
        Self { cli }
    }
}

#[async_trait]
impl DatabaseCatalog for AzCatalog {
    async fn list_databases(&self, server: &ServerTopology) -> anyhow::Result<Vec<ResourceDescriptor>> {
        let sql = SqlServer::new(Arc::clone(&self.cli), server.clone());
        let mut databases = Vec::new();
        for row in sql.list().await? {
            let size = sql.used_bytes(&row.name).await?.unwrap_or(0);
            databases.push(descriptor(row, size));
        }
        Ok(databases)
    }

    async fn list_containers(&self, account: &StorageAccount) -> anyhow::Result<Vec<ResourceDescriptor>> {
        Ok(storage::list_containers(&self.cli, account).await?)
    }

    async fn delete_database(&self, server: &ServerTopology, name: &str) -> anyhow::Result<()> {
        SqlServer::new(Arc::clone(&self.cli), server.clone())
            .delete(name)
            .await?;
        info!(server = %server.name, database = name, "database deleted");
        Ok(())
    }
}

/// How new databases are created on the target server.
#[derive(Debug, Clone)]
pub enum CopyMode {
    /// Online copy from another server.
    Copy {
        /// Server holding the source databases.
        source: ServerTopology,
    },
    /// Point-in-time restore on the same server.
    Restore {
        /// Restore point.
        point_in_time: DateTime<Utc>,
    },
}

/// Copy backend creating databases on one target server.
#[derive(Debug)]
pub struct SqlCopyBackend {
    target: SqlServer,
    mode: CopyMode,
}

impl SqlCopyBackend {
    /// Backend writing to `target`.
    #[must_use]
    pub fn new(cli: Arc<AzCli>, target: ServerTopology, mode: CopyMode) -> Self {
        Self {
            target: SqlServer::new(cli, target),
            mode,
        }
    }

    fn start_arguments<'a>(
        &'a self,
        source: &'a str,
        destination: &'a str,
        point: &'a str,
        pool: Option<&'a str>,
    ) -> Vec<&'a str> {
        let target = &self.target.server;
        let mut args = match &self.mode {
            CopyMode::Copy { source: server } => vec![
                "sql",
                "db",
                "copy",
                "--name",
                source,
                "--server",
                server.name.as_str(),
                "--resource-group",
                server.resource_group.as_str(),
                "--dest-name",
                destination,
                "--dest-server",
                target.name.as_str(),
                "--dest-resource-group",
                target.resource_group.as_str(),
            ],
            CopyMode::Restore { .. } => vec![
                "sql",
                "db",
                "restore",
                "--name",
                source,
                "--dest-name",
                destination,
                "--server",
                target.name.as_str(),
                "--resource-group",
                target.resource_group.as_str(),
                "--time",
                point,
            ],
        };
        if let Some(pool) = pool {
            args.extend(["--elastic-pool", pool]);
        }
        args.push("--no-wait");
        args
    }
}

#[async_trait]
impl CopyBackend for SqlCopyBackend {
    fn object_kind(&self) -> &'static str {
        match self.mode {
            CopyMode::Copy { .. } => "database",
            CopyMode::Restore { .. } => "restored database",
        }
    }

    async fn describe(&self, name: &str) -> anyhow::Result<Option<ResourceDescriptor>> {
        Ok(self.target.describe(name).await?)
    }

    async fn delete(&self, name: &str) -> anyhow::Result<()> {
        Ok(self.target.delete(name).await?)
    }

    async fn start_copy(&self, source: &ResourceDescriptor, destination_name: &str) -> anyhow::Result<()> {
        let pool = self.target.pool_name().await?;
        let point = match &self.mode {
            CopyMode::Restore { point_in_time } => {
                point_in_time.to_rfc3339_opts(SecondsFormat::Secs, true)
            }
            CopyMode::Copy { .. } => String::new(),
        };
        let args = self.start_arguments(&source.name, destination_name, &point, pool.as_deref());
        self.target.cli.execute(&args).await?;
        info!(
            source = %source.name,
            destination = destination_name,
            kind = self.object_kind(),
            "copy requested"
        );
        Ok(())
    }

    async fn readiness(&self, name: &str) -> anyhow::Result<ResourceState> {
        Ok(self.target.readiness(name).await?)
    }

    async fn write_tags(&self, name: &str, tags: &Tags) -> anyhow::Result<()> {
        Ok(self.target.write_tags(name, tags).await?)
    }

    async fn refresh_credentials(&self) -> anyhow::Result<()> {
        Ok(self.target.cli.execute(&["account", "get-access-token"]).await?)
    }
}

/// Elastic pool figures for one server.
#[derive(Debug)]
pub struct AzPool {
    server: SqlServer,
}

impl AzPool {
    /// Inspector for the pool of `server`.
    #[must_use]
    pub fn new(cli: Arc<AzCli>, server: ServerTopology) -> Self {
        Self {
            server: SqlServer::new(cli, server),
        }
    }
}

#[async_trait]
impl PoolInspector for AzPool {
    async fn capacity(&self) -> anyhow::Result<Option<PoolCapacity>> {
        let pool = self.server.pools().await?.into_iter().next();
        Ok(pool.map(|pool| PoolCapacity {
            max_bytes: pool.max_size_bytes.unwrap_or(0),
            name: pool.name,
        }))
    }

    async fn member_sizes(&self) -> anyhow::Result<Vec<u64>> {
        let Some(pool) = self.server.pool_name().await? else {
            return Ok(Vec::new());
        };
        let mut sizes = Vec::new();
        for row in self.server.list().await? {
            if row.elastic_pool_name.as_deref() == Some(pool.as_str()) {
                sizes.push(self.server.used_bytes(&row.name).await?.unwrap_or(0));
            }
        }
        Ok(sizes)
    }

    async fn object_size(&self, name: &str) -> anyhow::Result<Option<u64>> {
        Ok(self.server.used_bytes(name).await?)
    }
}

/// Failover group membership on a primary server.
#[derive(Debug)]
pub struct AzFailover {
    server: SqlServer,
}

impl AzFailover {
    /// Registry for the failover groups of `primary`.
    #[must_use]
    pub fn new(cli: Arc<AzCli>, primary: ServerTopology) -> Self {
        Self {
            server: SqlServer::new(cli, primary),
        }
    }
}

#[async_trait]
impl FailoverRegistry for AzFailover {
    async fn group_name(&self) -> anyhow::Result<Option<String>> {
        let mut args = vec!["sql", "failover-group", "list"];
        args.extend(self.server.scope());
        let groups: Vec<GroupRow> = self.server.cli.json(&args).await?;
        Ok(groups.into_iter().next().map(|group| group.name))
    }

    async fn add_member(&self, group: &str, database: &str) -> anyhow::Result<()> {
        let mut args = vec!["sql", "failover-group", "update", "--name", group, "--add-db", database];
        args.extend(self.server.scope());
        self.server.cli.execute(&args).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn server(name: &str) -> ServerTopology {
        ServerTopology {
            name: name.into(),
            endpoint_address: format!("{name}.database.windows.net"),
            resource_group: "rg-acme-qa2".into(),
            subscription_id: "sub-1".into(),
            region: "eastus".into(),
            product_token: "acme".into(),
            tier_token: "prod".into(),
            environment_token: "qa2".into(),
        }
    }

    fn cli() -> Arc<AzCli> {
        Arc::new(AzCli::new("az"))
    }

    #[test]
    fn size_comes_from_the_database_size_metric() {
        let rows: Vec<UsageRow> = serde_json::from_str(
            r#"[{"name":"database_allocated_size","currentValue":9000.0},
                {"name":"database_size","currentValue":4096.0}]"#,
        )
        .expect("decodes");
        assert_eq!(database_size(&rows), Some(4096));
        assert_eq!(database_size(&[]), None);
    }

    #[test]
    fn database_rows_map_status_and_tags() {
        let row: DatabaseRow = serde_json::from_str(
            r#"{"name":"db-a","status":"Copying","tags":{"Service":"core"},"elasticPoolName":"pool"}"#,
        )
        .expect("decodes");
        let descriptor = descriptor(row, 10);
        assert_eq!(descriptor.state, ResourceState::Creating);
        assert_eq!(descriptor.tags.get("Service"), Some("core"));
        assert_eq!(descriptor.size_bytes, 10);
    }

    #[test]
    fn copy_arguments_name_both_servers_and_pool() {
        let backend = SqlCopyBackend::new(
            cli(),
            server("sql-acme-prod-qa3-eastus"),
            CopyMode::Copy {
                source: server("sql-acme-prod-qa2-eastus"),
            },
        );
        let args = backend.start_arguments("db-a-restored", "db-b", "", Some("pool-1"));
        let line = args.join(" ");
        assert!(line.starts_with("sql db copy --name db-a-restored --server sql-acme-prod-qa2-eastus"));
        assert!(line.contains("--dest-server sql-acme-prod-qa3-eastus"));
        assert!(line.ends_with("--elastic-pool pool-1 --no-wait"));
        assert_eq!(backend.object_kind(), "database");
    }

    #[test]
    fn restore_arguments_carry_the_point_in_time() {
        let backend = SqlCopyBackend::new(
            cli(),
            server("sql-acme-prod-qa2-eastus"),
            CopyMode::Restore {
                point_in_time: Utc::now(),
            },
        );
        let args = backend.start_arguments("db-a", "db-a-restored", "2024-06-01T11:45:00Z", None);
        let line = args.join(" ");
        assert!(line.starts_with("sql db restore --name db-a --dest-name db-a-restored"));
        assert!(line.contains("--time 2024-06-01T11:45:00Z"));
        assert!(!line.contains("--elastic-pool"));
        assert_eq!(backend.object_kind(), "restored database");
    }

    #[test]
    fn tag_arguments_are_key_value_pairs() {
        let tags: Tags = [("Owner", "platform"), ("Environment", "qa2")].into_iter().collect();
        assert_eq!(
            tag_arguments(&tags),
            vec!["Environment=qa2".to_string(), "Owner=platform".to_string()]
        );
    }

    #[test]
    fn resource_ids_follow_arm_layout() {
        let sql = SqlServer::new(cli(), server("sql-acme-prod-qa2-eastus"));
        assert_eq!(
            sql.resource_id("db-a"),
            "/subscriptions/sub-1/resourceGroups/rg-acme-qa2/providers/Microsoft.Sql/servers/sql-acme-prod-qa2-eastus/databases/db-a"
        );
    }
}
