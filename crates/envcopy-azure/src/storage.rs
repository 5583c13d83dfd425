//! Blob container copies between storage accounts.

use std::sync::Arc;

use async_trait::async_trait;
use envcopy_core::{CopyBackend, ResourceDescriptor, ResourceState, StorageAccount, Tags};
use serde::Deserialize;
use tracing::{debug, info};

use crate::cli::AzCli;
use crate::error::AzureResult;

#[derive(Debug, Deserialize)]
struct ContainerRow {
    name: String,
}

#[derive(Debug, Default, Deserialize)]
struct BlobRow {
    #[serde(default)]
    properties: BlobProperties,
}

#[derive(Debug, Default, Deserialize)]
struct BlobProperties {
    #[serde(default)]
    copy: Option<CopyProperties>,
}

#[derive(Debug, Default, Deserialize)]
struct CopyProperties {
    #[serde(default)]
    status: Option<String>,
}

/// Aggregate copy state of a container from its blobs.
fn container_copy_state(blobs: &[BlobRow]) -> ResourceState {
    let statuses = blobs.iter().filter_map(|blob| {
        blob.properties
            .copy
            .as_ref()
            .and_then(|copy| copy.status.as_deref())
            .map(str::to_ascii_lowercase)
    });
    let mut pending = false;
    for status in statuses {
        match status.as_str() {
            "failed" | "aborted" => return ResourceState::Failed,
            "pending" => pending = true,
            _ => {}
        }
    }
    if pending {
        ResourceState::Creating
    } else {
        ResourceState::Online
    }
}

/// Containers of `account`; containers carry no tags or measured size.
pub(crate) async fn list_containers(
    cli: &AzCli,
    account: &StorageAccount,
) -> AzureResult<Vec<ResourceDescriptor>> {
    let rows: Vec<ContainerRow> = cli
        .json(&[
            "storage",
            "container",
            "list",
            "--account-name",
            account.name.as_str(),
            "--auth-mode",
            "login",
        ])
        .await?;
    Ok(rows
        .into_iter()
        .map(|row| ResourceDescriptor::new(row.name).with_state(ResourceState::Online))
        .collect())
}

/// Copy backend for blob containers.
#[derive(Debug)]
pub struct ContainerBackend {
    cli: Arc<AzCli>,
    source: StorageAccount,
    destination: StorageAccount,
}

impl ContainerBackend {
    /// Backend copying containers from `source` into `destination`.
    #[must_use]
    pub const fn new(cli: Arc<AzCli>, source: StorageAccount, destination: StorageAccount) -> Self {
        Self {
            cli,
            source,
            destination,
        }
    }

    fn container_args<'a>(&'a self, verb: &'a str, name: &'a str) -> Vec<&'a str> {
        vec![
            "storage",
            "container",
            verb,
            "--name",
            name,
            "--account-name",
            self.destination.name.as_str(),
            "--auth-mode",
            "login",
        ]
    }

    fn batch_args<'a>(&'a self, source: &'a str, destination: &'a str) -> Vec<&'a str> {
        vec![
            "storage",
            "blob",
            "copy",
            "start-batch",
            "--source-account-name",
            self.source.name.as_str(),
            "--source-container",
            source,
            "--destination-container",
            destination,
            "--account-name",
            self.destination.name.as_str(),
            "--auth-mode",
            "login",
        ]
    }
}

#[async_trait]
impl CopyBackend for ContainerBackend {
    fn object_kind(&self) -> &'static str {
        "container"
    }

    async fn describe(&self, name: &str) -> anyhow::Result<Option<ResourceDescriptor>> {
        let row: Option<ContainerRow> = self
            .cli
            .json_optional(&self.container_args("show", name))
            .await?;
        Ok(row.map(|row| ResourceDescriptor::new(row.name).with_state(ResourceState::Online)))
    }

    async fn delete(&self, name: &str) -> anyhow::Result<()> {
        match self.cli.execute(&self.container_args("delete", name)).await {
            Err(err) if err.is_not_found() => {
                debug!(container = name, "container already absent");
                Ok(())
            }
            other => Ok(other?),
        }
    }

    async fn start_copy(&self, source: &ResourceDescriptor, destination_name: &str) -> anyhow::Result<()> {
        self.cli
            .execute(&self.container_args("create", destination_name))
            .await?;
        self.cli
            .execute(&self.batch_args(&source.name, destination_name))
            .await?;
        info!(
            source_account = %self.source.name,
            destination_account = %self.destination.name,
            container = destination_name,
            "container copy requested"
        );
        Ok(())
    }

    async fn readiness(&self, name: &str) -> anyhow::Result<ResourceState> {
        let blobs: Option<Vec<BlobRow>> = self
            .cli
            .json_optional(&[
                "storage",
                "blob",
                "list",
                "--container-name",
                name,
                "--account-name",
                self.destination.name.as_str(),
                "--auth-mode",
                "login",
                "--include",
                "c",
                "--num-results",
                "*",
            ])
            .await?;
        Ok(blobs.map_or(ResourceState::Unknown, |blobs| container_copy_state(&blobs)))
    }

    async fn write_tags(&self, _name: &str, _tags: &Tags) -> anyhow::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blobs(json: &str) -> Vec<BlobRow> {
        serde_json::from_str(json).expect("decodes")
    }

    fn account(name: &str) -> StorageAccount {
        StorageAccount {
            name: name.into(),
            endpoint_address: format!("https://{name}.blob.core.windows.net/"),
            resource_group: "rg-acme-qa2".into(),
            subscription_id: "sub-1".into(),
            region: "eastus".into(),
        }
    }

    #[test]
    fn pending_blobs_keep_the_container_creating() {
        let rows = blobs(
            r#"[{"properties":{"copy":{"status":"success"}}},
                {"properties":{"copy":{"status":"pending"}}}]"#,
        );
        assert_eq!(container_copy_state(&rows), ResourceState::Creating);
    }

    #[test]
    fn any_failed_blob_fails_the_container() {
        let rows = blobs(
            r#"[{"properties":{"copy":{"status":"pending"}}},
                {"properties":{"copy":{"status":"Failed"}}}]"#,
        );
        assert_eq!(container_copy_state(&rows), ResourceState::Failed);
    }

    #[test]
    fn empty_or_finished_containers_are_online() {
        assert_eq!(container_copy_state(&[]), ResourceState::Online);
        let rows = blobs(r#"[{"properties":{}},{"properties":{"copy":{"status":"success"}}}]"#);
        assert_eq!(container_copy_state(&rows), ResourceState::Online);
    }

    #[test]
    fn batch_copy_targets_the_destination_account() {
        let backend = ContainerBackend::new(
            Arc::new(AzCli::new("az")),
            account("stacmeqa2"),
            account("stacmeqa3"),
        );
        let line = backend.batch_args("reports", "reports").join(" ");
        assert!(line.contains("--source-account-name stacmeqa2"));
        assert!(line.contains("--account-name stacmeqa3"));
        assert_eq!(backend.object_kind(), "container");
    }
}
