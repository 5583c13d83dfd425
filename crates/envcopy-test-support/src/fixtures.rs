//! Standard environment used by integration suites.
//!
//! Environment `qa2` holds a primary server in `eastus` with a failover
//! partner in `westus`, one pool, and storage accounts for the root and the
//! `test` namespaces.

use std::time::Duration;

use chrono::{TimeZone, Utc};
use envcopy_config::RefreshRequest;
use envcopy_core::{Namespace, ResourceDescriptor, StageKind, Tags, TopologyRole};

use crate::mocks::FakeCloud;

/// One gibibyte.
pub const GIB: u64 = 1024 * 1024 * 1024;
/// Primary server of `qa2`.
pub const PRIMARY: &str = "sql-acme-prod-qa2-eastus";
/// Secondary server of `qa2`.
pub const SECONDARY: &str = "sql-acme-prod-qa2-westus";
/// Root namespace storage account.
pub const ROOT_STORAGE: &str = "stacmeprodqa2";
/// `test` namespace storage account.
pub const TEST_STORAGE: &str = "stacmeprodqa2test";
/// Root database with a `Service` tag.
pub const CORE_DB: &str = "db-acme-prod-core-qa2-eastus";
/// Root database whose service is inferred from its name.
pub const BILLING_DB: &str = "db-acme-prod-billing-qa2-eastus";
/// Existing destination of [`CORE_DB`].
pub const CORE_DEST: &str = "db-acme-prod-core-test-qa2-eastus";
/// Destination of [`BILLING_DB`].
pub const BILLING_DEST: &str = "db-acme-prod-billing-test-qa2-eastus";
/// Database of an unrelated namespace.
pub const OTHER_DB: &str = "db-acme-prod-core-other-qa2-eastus";
/// Failover group of the primary.
pub const FAILOVER_GROUP: &str = "fog-acme-qa2";

fn tags(pairs: &[(&str, &str)]) -> Tags {
    pairs.iter().copied().collect()
}

/// Cloud populated with the standard `qa2` environment and every delegated
/// stage hook configured.
#[must_use]
pub fn standard_cloud() -> FakeCloud {
    StageKind::HOOKED.iter().fold(bare_cloud(), |cloud, stage| {
        cloud.with_hook(*stage, &format!("./hooks/{stage}.sh"))
    })
}

/// The standard `qa2` environment without any stage hooks.
#[must_use]
pub fn bare_cloud() -> FakeCloud {
    FakeCloud::new()
        .with_server("qa2", TopologyRole::Primary, PRIMARY, "rg-acme-qa2", "eastus")
        .with_server("qa2", TopologyRole::Secondary, SECONDARY, "rg-acme-qa2-dr", "westus")
        .with_storage("qa2", ROOT_STORAGE, "rg-acme-qa2", None)
        .with_storage("qa2", TEST_STORAGE, "rg-acme-qa2-test", Some("test"))
        .with_pool(PRIMARY, "pool-acme-qa2", 200 * GIB)
        .with_failover_group(PRIMARY, FAILOVER_GROUP)
        .with_object(
            PRIMARY,
            ResourceDescriptor::new(CORE_DB)
                .with_size(10 * GIB)
                .with_tags(tags(&[
                    ("Environment", "qa2"),
                    ("Owner", "platform"),
                    ("Service", "core"),
                    ("Type", "Database"),
                ])),
        )
        .with_object(
            PRIMARY,
            ResourceDescriptor::new(BILLING_DB)
                .with_size(5 * GIB)
                .with_tags(tags(&[
                    ("Environment", "qa2"),
                    ("Owner", "platform"),
                    ("Type", "Database"),
                ])),
        )
        .with_object(
            PRIMARY,
            ResourceDescriptor::new(CORE_DEST)
                .with_size(4 * GIB)
                .with_tags(tags(&[
                    ("Environment", "qa2"),
                    ("Owner", "tenant-team"),
                    ("Service", "core"),
                    ("Type", "Database"),
                    ("ClientName", "test"),
                    ("CostCenter", "42"),
                ])),
        )
        .with_object(PRIMARY, ResourceDescriptor::new(OTHER_DB).with_size(GIB))
        .with_object(PRIMARY, ResourceDescriptor::new("master").with_size(GIB))
        .with_object(ROOT_STORAGE, ResourceDescriptor::new("uploads").with_size(GIB))
        .with_object(ROOT_STORAGE, ResourceDescriptor::new("reports").with_size(GIB))
        .with_object(ROOT_STORAGE, ResourceDescriptor::new("$logs"))
}

/// Refresh of `qa2` from the root namespace into `test`.
#[must_use]
pub fn refresh_request(dry_run: bool) -> RefreshRequest {
    RefreshRequest {
        source_environment: "qa2".into(),
        destination_environment: "qa2".into(),
        source_namespace: Namespace::Root,
        destination_namespace: Namespace::Named("test".into()),
        dry_run,
        max_wait: Duration::from_secs(60 * 60),
        restore_point: Utc
            .with_ymd_and_hms(2024, 6, 1, 11, 45, 0)
            .single()
            .unwrap_or_else(Utc::now),
        instance_alias: Some("test.acme.example".into()),
        instance_alias_to_remove: None,
    }
}
