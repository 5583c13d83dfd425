//! Temporary role assignments for the signed-in operator.

use std::sync::Arc;

use anyhow::bail;
use async_trait::async_trait;
use envcopy_core::{AccessControl, AccessScope};
use serde::Deserialize;
use tracing::{info, warn};

use crate::cli::AzCli;
use crate::error::AzureResult;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignedInUser {
    id: String,
    #[serde(default)]
    user_principal_name: Option<String>,
}

/// ARM scope of one resource group.
pub(crate) fn scope_path(subscription_id: &str, resource_group: &str) -> String {
    format!("/subscriptions/{subscription_id}/resourceGroups/{resource_group}")
}

/// Role assignments through `az role assignment`.
#[derive(Debug, Clone)]
pub struct AzAccess {
    cli: Arc<AzCli>,
    role: String,
}

impl AzAccess {
    /// Access control assigning `role`.
    #[must_use]
    pub fn new(cli: Arc<AzCli>, role: impl Into<String>) -> Self {
        Self {
            cli,
            role: role.into(),
        }
    }

    async fn signed_in_user(&self) -> AzureResult<SignedInUser> {
        self.cli.json(&["ad", "signed-in-user", "show"]).await
    }
}

#[async_trait]
impl AccessControl for AzAccess {
    async fn current_principal(&self) -> anyhow::Result<String> {
        let user = self.signed_in_user().await?;
        Ok(user.user_principal_name.unwrap_or(user.id))
    }

    async fn grant(&self, scope: &AccessScope) -> anyhow::Result<()> {
        let user = self.signed_in_user().await?;
        for group in &scope.resource_groups {
            let path = scope_path(&scope.subscription_id, group);
            self.cli
                .execute(&[
                    "role",
                    "assignment",
                    "create",
                    "--assignee-object-id",
                    user.id.as_str(),
                    "--assignee-principal-type",
                    "User",
                    "--role",
                    self.role.as_str(),
                    "--scope",
                    path.as_str(),
                ])
                .await?;
            info!(role = %self.role, scope = %path, "role assigned");
        }
        Ok(())
    }

    async fn revoke(&self, scope: &AccessScope) -> anyhow::Result<()> {
        let user = self.signed_in_user().await?;
        let mut failed = Vec::new();
        for group in &scope.resource_groups {
            let path = scope_path(&scope.subscription_id, group);
            let outcome = self
                .cli
                .execute(&[
                    "role",
                    "assignment",
                    "delete",
                    "--assignee",
                    user.id.as_str(),
                    "--role",
                    self.role.as_str(),
                    "--scope",
                    path.as_str(),
                ])
                .await;
            match outcome {
                Ok(()) => info!(role = %self.role, scope = %path, "role removed"),
                Err(err) => {
                    warn!(scope = %path, error = %err, "role removal failed");
                    failed.push(format!("{group}: {err}"));
                }
            }
        }
        if !failed.is_empty() {
            bail!("could not revoke {} on {}", self.role, failed.join("; "));
        }
        Ok(())
    }
}
