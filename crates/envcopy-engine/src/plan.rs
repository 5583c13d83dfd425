//! Copy task planning from catalog listings.

use envcopy_core::tags::TAG_SERVICE;
use envcopy_core::{
    CopyTask, NameDerivationRequest, Namespace, ResourceDescriptor, derive_name, infer_service,
};
use tracing::debug;

/// Database every server carries that is never copied.
pub const SYSTEM_DATABASE: &str = "master";

/// Tokens needed to derive destination names for one refresh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamingContext {
    /// Product token.
    pub product: String,
    /// Source namespace.
    pub source_namespace: Namespace,
    /// Destination namespace.
    pub destination_namespace: Namespace,
    /// Source environment token.
    pub source_environment: String,
    /// Destination environment token.
    pub destination_environment: String,
    /// Source region token.
    pub source_region: String,
    /// Destination region token.
    pub destination_region: String,
    /// Source tier token.
    pub source_tier: String,
    /// Destination tier token.
    pub destination_tier: String,
    /// Suffix of scratch restore objects.
    pub restore_suffix: String,
}

impl NamingContext {
    /// Destination name for a source database, or `None` when it is not part
    /// of the refresh.
    #[must_use]
    pub fn destination_for(&self, source: &ResourceDescriptor) -> Option<String> {
        let service = source
            .tags
            .get_non_empty(TAG_SERVICE)
            .map(str::to_string)
            .or_else(|| infer_service(&source.name, &self.product, &self.source_tier))?;
        derive_name(&NameDerivationRequest {
            source_name: source.name.clone(),
            product: self.product.clone(),
            service,
            source_namespace: self.source_namespace.clone(),
            destination_namespace: self.destination_namespace.clone(),
            source_environment: self.source_environment.clone(),
            destination_environment: self.destination_environment.clone(),
            source_region: self.source_region.clone(),
            destination_region: self.destination_region.clone(),
            source_tier: self.source_tier.clone(),
            destination_tier: self.destination_tier.clone(),
        })
    }

    /// Scratch name used when restoring `name` to a point in time.
    #[must_use]
    pub fn scratch_name(&self, name: &str) -> String {
        format!("{name}{}", self.restore_suffix)
    }
}

/// Whether a database is a system or scratch object excluded from copies and
/// failover registration.
#[must_use]
pub fn is_system_object(name: &str, restore_suffix: &str) -> bool {
    name.eq_ignore_ascii_case(SYSTEM_DATABASE)
        || (!restore_suffix.is_empty() && name.ends_with(restore_suffix))
}

/// One copy task per source database that belongs to the refresh, sorted by
/// source name. The `Service` tag is filled in from the name when absent so
/// tag reconciliation can restore it.
#[must_use]
pub fn plan_database_tasks(databases: Vec<ResourceDescriptor>, naming: &NamingContext) -> Vec<CopyTask> {
    let mut tasks: Vec<CopyTask> = databases
        .into_iter()
        .filter(|db| !is_system_object(&db.name, &naming.restore_suffix))
        .filter_map(|mut db| {
            let Some(destination) = naming.destination_for(&db) else {
                debug!(database = %db.name, "name does not match the source namespace; skipped");
                return None;
            };
            if db.tags.get_non_empty(TAG_SERVICE).is_none()
                && let Some(service) = infer_service(&db.name, &naming.product, &naming.source_tier)
            {
                db.tags.insert(TAG_SERVICE, service);
            }
            Some(CopyTask::new(db, destination))
        })
        .collect();
    tasks.sort_by(|a, b| a.source.name.cmp(&b.source.name));
    tasks
}

/// One copy task per container, keeping container names. System containers
/// (`$`-prefixed) are skipped.
#[must_use]
pub fn plan_container_tasks(containers: Vec<ResourceDescriptor>) -> Vec<CopyTask> {
    let mut tasks: Vec<CopyTask> = containers
        .into_iter()
        .filter(|container| !container.name.starts_with('$'))
        .map(|container| {
            let name = container.name.clone();
            CopyTask::new(container, name)
        })
        .collect();
    tasks.sort_by(|a, b| a.source.name.cmp(&b.source.name));
    tasks
}

#[cfg(test)]
mod tests {
    use super::*;

    fn naming() -> NamingContext {
        NamingContext {
            product: "acme".into(),
            source_namespace: Namespace::Root,
            destination_namespace: Namespace::Named("test".into()),
            source_environment: "qa2".into(),
            destination_environment: "qa2".into(),
            source_region: "eastus".into(),
            destination_region: "eastus".into(),
            source_tier: "prod".into(),
            destination_tier: "prod".into(),
            restore_suffix: "-restored".into(),
        }
    }

    #[test]
    fn plans_only_matching_non_system_databases() {
        let databases = vec![
            ResourceDescriptor::new("master"),
            ResourceDescriptor::new("db-acme-prod-core-qa2-eastus-restored"),
            ResourceDescriptor::new("db-acme-prod-core-qa2-eastus")
                .with_tags([("Service", "core")].into_iter().collect()),
            ResourceDescriptor::new("db-acme-prod-billing-qa2-eastus"),
            ResourceDescriptor::new("db-acme-prod-core-other-qa2-eastus"),
        ];
        let tasks = plan_database_tasks(databases, &naming());
        let pairs: Vec<(&str, &str)> = tasks
            .iter()
            .map(|t| (t.source.name.as_str(), t.destination_name.as_str()))
            .collect();
        assert_eq!(
            pairs,
            vec![
                ("db-acme-prod-billing-qa2-eastus", "db-acme-prod-billing-test-qa2-eastus"),
                ("db-acme-prod-core-qa2-eastus", "db-acme-prod-core-test-qa2-eastus"),
            ]
        );
        assert_eq!(tasks[0].source.tags.get("Service"), Some("billing"));
    }

    #[test]
    fn scratch_names_use_suffix() {
        assert_eq!(naming().scratch_name("db"), "db-restored");
        assert!(is_system_object("db-restored", "-restored"));
        assert!(is_system_object("MASTER", "-restored"));
        assert!(!is_system_object("db", "-restored"));
    }

    #[test]
    fn containers_keep_names_and_skip_system_ones() {
        let tasks = plan_container_tasks(vec![
            ResourceDescriptor::new("uploads"),
            ResourceDescriptor::new("$logs"),
            ResourceDescriptor::new("reports"),
        ]);
        let names: Vec<&str> = tasks.iter().map(|t| t.destination_name.as_str()).collect();
        assert_eq!(names, vec!["reports", "uploads"]);
    }
}
