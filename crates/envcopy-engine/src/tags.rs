//! Post-copy tag reconciliation.

use envcopy_core::tags::{TagContext, missing_required_tags, plan_tag_restore};
use envcopy_core::{CopyBackend, CopyPhase, CopyTask, Namespace, Tags};
use tracing::{debug, info, warn};

/// Re-applies allowlisted tags to copied objects and verifies the required set.
#[derive(Debug, Clone)]
pub struct TagReconciler {
    destination_environment: String,
    destination_namespace: Namespace,
}

impl TagReconciler {
    /// Reconciler for objects landing in the given environment and namespace.
    #[must_use]
    pub fn new(destination_environment: impl Into<String>, destination_namespace: Namespace) -> Self {
        Self {
            destination_environment: destination_environment.into(),
            destination_namespace,
        }
    }

    /// Write the planned tags, verify, and re-apply once if verification
    /// fails. Required keys still missing afterwards are recorded on the task.
    pub async fn reconcile(&self, backend: &dyn CopyBackend, task: &mut CopyTask) {
        task.phase = CopyPhase::TagRestore;
        let context = TagContext {
            destination_environment: &self.destination_environment,
            destination_namespace: &self.destination_namespace,
        };
        let plan = plan_tag_restore(task.saved_tags.as_ref(), &task.source.tags, context);
        for key in &plan.dropped {
            info!(object = %task.destination_name, tag = %key, "dropping tag outside the allowlist");
        }
        if !plan.unresolved.is_empty() {
            debug!(
                object = %task.destination_name,
                unresolved = ?plan.unresolved,
                "no value available for required tags"
            );
        }

        let mut missing = self.apply_and_verify(backend, &task.destination_name, &plan.apply).await;
        if !missing.is_empty() {
            debug!(
                object = %task.destination_name,
                missing = ?missing,
                "tag verification failed; re-applying once"
            );
            missing = self.apply_and_verify(backend, &task.destination_name, &plan.apply).await;
        }

        if !missing.is_empty() {
            warn!(
                object = %task.destination_name,
                missing = ?missing,
                "required tags still missing after re-apply"
            );
        }
        task.missing_tags = missing;
    }

    async fn apply_and_verify(&self, backend: &dyn CopyBackend, name: &str, tags: &Tags) -> Vec<String> {
        if let Err(err) = backend.write_tags(name, tags).await {
            warn!(object = %name, error = %format!("{err:#}"), "tag write failed");
        }
        match backend.describe(name).await {
            Ok(Some(descriptor)) => missing_required_tags(&descriptor.tags, &self.destination_namespace)
                .into_iter()
                .map(str::to_string)
                .collect(),
            Ok(None) => {
                warn!(object = %name, "copied object not found during tag verification");
                self.all_required()
            }
            Err(err) => {
                warn!(object = %name, error = %format!("{err:#}"), "tag verification read failed");
                self.all_required()
            }
        }
    }

    fn all_required(&self) -> Vec<String> {
        envcopy_core::tags::required_tag_keys(&self.destination_namespace)
            .iter()
            .map(|key| (*key).to_string())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use envcopy_core::{ResourceDescriptor, ResourceState};
    use std::sync::Mutex;

    /// Backend whose stored tags drop `Owner` on the first `drop_writes` writes.
    struct FlakyTags {
        stored: Mutex<Tags>,
        drop_writes: Mutex<u32>,
        writes: Mutex<u32>,
    }

    impl FlakyTags {
        fn new(drop_writes: u32) -> Self {
            Self {
                stored: Mutex::new(Tags::new()),
                drop_writes: Mutex::new(drop_writes),
                writes: Mutex::new(0),
            }
        }
    }

    #[async_trait]
    impl CopyBackend for FlakyTags {
        fn object_kind(&self) -> &'static str {
            "database"
        }

        async fn describe(&self, name: &str) -> anyhow::Result<Option<ResourceDescriptor>> {
            let tags = self.stored.lock().unwrap().clone();
            Ok(Some(ResourceDescriptor::new(name).with_tags(tags)))
        }

        async fn delete(&self, _name: &str) -> anyhow::Result<()> {
            Ok(())
        }

        async fn start_copy(&self, _source: &ResourceDescriptor, _name: &str) -> anyhow::Result<()> {
            Ok(())
        }

        async fn readiness(&self, _name: &str) -> anyhow::Result<ResourceState> {
            Ok(ResourceState::Online)
        }

        async fn write_tags(&self, _name: &str, tags: &Tags) -> anyhow::Result<()> {
            *self.writes.lock().unwrap() += 1;
            let mut written = tags.clone();
            let mut drops = self.drop_writes.lock().unwrap();
            if *drops > 0 {
                *drops -= 1;
                written.remove("Owner");
            }
            *self.stored.lock().unwrap() = written;
            Ok(())
        }
    }

    fn task() -> CopyTask {
        let source = ResourceDescriptor::new("db-acme-prod-core-qa2-eastus").with_tags(
            [
                ("Owner", "platform"),
                ("Service", "core"),
                ("Type", "Database"),
                ("Debug", "1"),
            ]
            .into_iter()
            .collect(),
        );
        CopyTask::new(source, "db-acme-prod-core-test-qa2-eastus")
    }

    #[tokio::test]
    async fn complete_tags_need_one_write() {
        let backend = FlakyTags::new(0);
        let reconciler = TagReconciler::new("qa2", Namespace::Named("test".into()));
        let mut task = task();
        reconciler.reconcile(&backend, &mut task).await;

        assert!(!task.has_incomplete_tags());
        assert_eq!(*backend.writes.lock().unwrap(), 1);
        let stored = backend.stored.lock().unwrap().clone();
        assert_eq!(stored.get("ClientName"), Some("test"));
        assert_eq!(stored.get("Environment"), Some("qa2"));
        assert!(!stored.contains_key("Debug"));
    }

    #[derive(Clone, Default)]
    struct Captured(std::sync::Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn dropped_tags_are_logged_at_info() {
        let captured = Captured::default();
        let writer = captured.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::INFO)
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let backend = FlakyTags::new(0);
        let reconciler = TagReconciler::new("qa2", Namespace::Named("test".into()));
        let mut task = task();
        reconciler.reconcile(&backend, &mut task).await;

        let logs = String::from_utf8(captured.0.lock().unwrap().clone()).unwrap();
        let line = logs
            .lines()
            .find(|line| line.contains("dropping tag outside the allowlist"))
            .expect("dropped tag logged");
        assert!(line.contains("INFO"), "{line}");
        assert!(line.contains("Debug"), "{line}");
    }

    #[tokio::test]
    async fn single_reapply_recovers_transient_loss() {
        let backend = FlakyTags::new(1);
        let reconciler = TagReconciler::new("qa2", Namespace::Named("test".into()));
        let mut task = task();
        reconciler.reconcile(&backend, &mut task).await;

        assert!(!task.has_incomplete_tags());
        assert_eq!(*backend.writes.lock().unwrap(), 2);
    }

    #[tokio::test]
    async fn persistent_loss_is_recorded_after_exactly_one_reapply() {
        let backend = FlakyTags::new(5);
        let reconciler = TagReconciler::new("qa2", Namespace::Named("test".into()));
        let mut task = task();
        reconciler.reconcile(&backend, &mut task).await;

        assert_eq!(task.missing_tags, vec!["Owner".to_string()]);
        assert_eq!(*backend.writes.lock().unwrap(), 2);
        assert_eq!(task.phase, CopyPhase::TagRestore);
    }
}
