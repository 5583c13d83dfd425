use std::sync::Arc;

use envcopy_config::{RefreshRequest, RefreshSettings};
use envcopy_core::{StageKind, StageStatus, Tags, WorkflowRun};
use envcopy_engine::WorkflowCoordinator;
use envcopy_test_support::assert::{assert_called_before, assert_no_destructive_calls};
use envcopy_test_support::fixtures::{
    BILLING_DEST, CORE_DB, CORE_DEST, FAILOVER_GROUP, GIB, PRIMARY, TEST_STORAGE, bare_cloud,
    refresh_request, standard_cloud,
};
use envcopy_test_support::{Call, FakeCloud};

async fn run(cloud: &FakeCloud, request: &RefreshRequest) -> WorkflowRun {
    let coordinator = WorkflowCoordinator::new(Arc::new(cloud.clone()), RefreshSettings::default());
    coordinator.run(request).await
}

fn status(run: &WorkflowRun, stage: StageKind) -> Option<StageStatus> {
    run.stage(stage).map(|record| record.status)
}

fn tags(pairs: &[(&str, &str)]) -> Tags {
    pairs.iter().copied().collect()
}

fn scratch(name: &str) -> String {
    format!("{name}-restored")
}

#[tokio::test(start_paused = true)]
async fn dry_run_plans_every_stage_without_destructive_calls() {
    let cloud = standard_cloud();
    let run = run(&cloud, &refresh_request(true)).await;

    assert_no_destructive_calls(&cloud);
    assert!(run.succeeded(), "failures: {:?}", run.failures);
    assert_eq!(run.exit_code(), 0);
    assert_eq!(run.stages.len(), 14);
    assert_eq!(status(&run, StageKind::Discovery), Some(StageStatus::Completed));
    for stage in StageKind::PIPELINE {
        assert_eq!(status(&run, stage), Some(StageStatus::Planned), "{stage}");
    }
    assert_eq!(
        status(&run, StageKind::GrantElevatedAccess),
        Some(StageStatus::Planned)
    );

    let copy = run.stage(StageKind::CopyDatabases).expect("copy stage");
    assert!(copy.detail.contains(CORE_DEST), "{}", copy.detail);
    assert!(copy.detail.contains(BILLING_DEST), "{}", copy.detail);
    let blobs = run.stage(StageKind::CopyBlobStorage).expect("blob stage");
    assert!(blobs.detail.contains("reports, uploads"), "{}", blobs.detail);
    assert!(!blobs.detail.contains("$logs"));
}

#[tokio::test(start_paused = true)]
async fn repeated_dry_runs_produce_identical_plans() {
    let cloud = standard_cloud();
    let first = run(&cloud, &refresh_request(true)).await;
    let second = run(&cloud, &refresh_request(true)).await;

    assert_eq!(first.stages, second.stages);
    assert_ne!(first.run_id, second.run_id);
}

#[tokio::test(start_paused = true)]
async fn execute_refreshes_databases_and_containers() {
    let cloud = standard_cloud();
    let run = run(&cloud, &refresh_request(false)).await;

    assert!(run.succeeded(), "failures: {:?}", run.failures);
    assert!(run.warnings.is_empty(), "warnings: {:?}", run.warnings);
    assert!(run.orphans.is_empty());
    for stage in StageKind::PIPELINE {
        assert_eq!(status(&run, stage), Some(StageStatus::Completed), "{stage}");
    }

    let core = cloud.object(PRIMARY, CORE_DEST).expect("core copy");
    assert_eq!(core.size_bytes, 10 * GIB);
    assert_eq!(
        core.tags,
        tags(&[
            ("ClientName", "test"),
            ("Environment", "qa2"),
            ("Owner", "tenant-team"),
            ("Service", "core"),
            ("Type", "Database"),
        ])
    );
    let billing = cloud.object(PRIMARY, BILLING_DEST).expect("billing copy");
    assert_eq!(billing.tags.get("Service"), Some("billing"));
    assert_eq!(billing.tags.get("Owner"), Some("platform"));

    assert!(cloud.object(PRIMARY, &scratch(CORE_DB)).is_none());
    assert_eq!(cloud.object_names(TEST_STORAGE), vec!["reports", "uploads"]);
    assert_eq!(
        cloud.failover_members(PRIMARY),
        vec![BILLING_DEST.to_string(), CORE_DEST.to_string()]
    );
    assert!(
        run.stage(StageKind::CopyDatabases)
            .is_some_and(|stage| stage.detail.contains(FAILOVER_GROUP))
    );
}

#[tokio::test(start_paused = true)]
async fn execute_orders_access_hooks_and_copies() {
    let cloud = standard_cloud();
    let run = run(&cloud, &refresh_request(false)).await;
    assert!(run.succeeded());

    assert_called_before(
        &cloud,
        |call| matches!(call, Call::Grant { .. }),
        |call| matches!(call, Call::StartCopy { .. }),
    );
    assert_called_before(
        &cloud,
        |call| matches!(call, Call::StartCopy { destination, .. } if *destination == scratch(CORE_DB)),
        |call| *call == Call::InvokeHook { stage: StageKind::StopDestination },
    );
    assert_called_before(
        &cloud,
        |call| *call == Call::InvokeHook { stage: StageKind::StopDestination },
        |call| matches!(call, Call::StartCopy { destination, .. } if destination == "uploads"),
    );
    assert_called_before(
        &cloud,
        |call| matches!(call, Call::StartCopy { destination, .. } if destination == CORE_DEST),
        |call| *call == Call::InvokeHook { stage: StageKind::StartDestination },
    );
    let destructive = cloud.destructive_calls();
    assert!(matches!(destructive.last(), Some(Call::Revoke { .. })));
}

#[tokio::test(start_paused = true)]
async fn database_copies_read_from_scratch_restores() {
    let cloud = standard_cloud();
    let run = run(&cloud, &refresh_request(false)).await;
    assert!(run.succeeded());

    let copy_sources: Vec<String> = cloud
        .calls()
        .into_iter()
        .filter_map(|call| match call {
            Call::StartCopy {
                source,
                destination,
                ..
            } if destination == CORE_DEST => Some(source),
            _ => None,
        })
        .collect();
    assert_eq!(copy_sources, vec![scratch(CORE_DB)]);
}

#[tokio::test(start_paused = true)]
async fn exhausted_pool_fails_dry_run_but_keeps_planning() {
    let cloud = standard_cloud().with_pool(PRIMARY, "pool-acme-qa2", 30 * GIB);
    let run = run(&cloud, &refresh_request(true)).await;

    assert_no_destructive_calls(&cloud);
    assert_eq!(run.exit_code(), 1);
    assert_eq!(run.failures.len(), 1);
    assert!(run.failures[0].contains("exhausted"), "{}", run.failures[0]);
    assert!(!run.aborted);
    assert_eq!(status(&run, StageKind::CopyDatabases), Some(StageStatus::Failed));
    assert_eq!(
        status(&run, StageKind::StartDestination),
        Some(StageStatus::Planned)
    );
}

#[tokio::test(start_paused = true)]
async fn safety_margin_breach_only_warns_in_dry_run() {
    let cloud = standard_cloud().with_pool(PRIMARY, "pool-acme-qa2", 34 * GIB);
    let run = run(&cloud, &refresh_request(true)).await;

    assert!(run.succeeded(), "failures: {:?}", run.failures);
    assert_eq!(run.warnings.len(), 1);
    assert!(run.warnings[0].contains("safety margin"), "{}", run.warnings[0]);
    assert_eq!(status(&run, StageKind::CopyDatabases), Some(StageStatus::Warning));
}

#[tokio::test(start_paused = true)]
async fn capacity_denial_aborts_execute_before_destination_changes() {
    let cloud = standard_cloud().with_pool(PRIMARY, "pool-acme-qa2", 30 * GIB);
    let run = run(&cloud, &refresh_request(false)).await;

    assert_eq!(run.exit_code(), 1);
    assert!(run.aborted);
    assert_eq!(status(&run, StageKind::CopyDatabases), Some(StageStatus::Failed));
    assert!(run.stage(StageKind::CleanDestinationConfig).is_none());
    assert_eq!(
        status(&run, StageKind::RevokeElevatedAccess),
        Some(StageStatus::Completed)
    );
    assert!(cloud.object(PRIMARY, CORE_DEST).is_some());
    assert!(!cloud.calls().iter().any(
        |call| matches!(call, Call::Delete { object, .. } if object == CORE_DEST)
    ));
}

#[tokio::test(start_paused = true)]
async fn grant_failure_aborts_before_any_stage() {
    let cloud = standard_cloud().fail_grant();
    let run = run(&cloud, &refresh_request(false)).await;

    assert_eq!(run.exit_code(), 1);
    assert!(run.aborted);
    let plan: Vec<(StageKind, StageStatus)> = run.plan();
    assert_eq!(
        plan,
        vec![
            (StageKind::Discovery, StageStatus::Completed),
            (StageKind::GrantElevatedAccess, StageStatus::Failed),
            (StageKind::RevokeElevatedAccess, StageStatus::Skipped),
        ]
    );
    assert_eq!(cloud.destructive_calls().len(), 1);
    assert!(run.failures[0].contains("failed to grant elevated access"));
}

#[tokio::test(start_paused = true)]
async fn hook_failure_aborts_and_still_revokes_access() {
    let cloud = standard_cloud().fail_hook(StageKind::StopDestination);
    let run = run(&cloud, &refresh_request(false)).await;

    assert_eq!(run.exit_code(), 1);
    assert_eq!(status(&run, StageKind::StopDestination), Some(StageStatus::Failed));
    assert!(run.stage(StageKind::CopyBlobStorage).is_none());
    assert!(matches!(
        cloud.destructive_calls().last(),
        Some(Call::Revoke { .. })
    ));
    // No compensating rollback: scratch restores stay behind.
    assert!(cloud.object(PRIMARY, &scratch(CORE_DB)).is_some());
    assert!(
        run.warnings
            .iter()
            .any(|warning| warning.contains("scratch copies left in place")),
        "{:?}",
        run.warnings
    );
    assert!(run.failures[0].contains("hook command failed"), "{}", run.failures[0]);
}

#[tokio::test(start_paused = true)]
async fn stalled_copy_is_listed_as_orphan() {
    let cloud = standard_cloud().never_ready(CORE_DEST);
    let run = run(&cloud, &refresh_request(false)).await;

    assert_eq!(run.exit_code(), 1);
    assert_eq!(run.orphans, vec![CORE_DEST.to_string()]);
    assert!(run.failures[0].contains("did not complete within 60 minutes"));
}

#[tokio::test(start_paused = true)]
async fn revoke_failure_fails_an_otherwise_clean_run() {
    let cloud = standard_cloud().fail_revoke();
    let run = run(&cloud, &refresh_request(false)).await;

    assert!(!run.aborted);
    assert_eq!(run.exit_code(), 1);
    assert_eq!(
        status(&run, StageKind::RevokeElevatedAccess),
        Some(StageStatus::Failed)
    );
}

#[tokio::test(start_paused = true)]
async fn unknown_environment_fails_discovery_and_skips_the_rest() {
    let cloud = standard_cloud();
    let mut request = refresh_request(true);
    request.source_environment = "qa9".into();
    request.destination_environment = "qa9".into();
    let run = run(&cloud, &request).await;

    assert_eq!(run.exit_code(), 1);
    assert_eq!(run.failures.len(), 1);
    assert!(run.failures[0].contains("Environment=qa9"), "{}", run.failures[0]);
    assert_eq!(status(&run, StageKind::Discovery), Some(StageStatus::Failed));
    assert!(
        run.stages
            .iter()
            .skip(1)
            .all(|stage| stage.status == StageStatus::Skipped)
    );
    assert_no_destructive_calls(&cloud);
}

#[tokio::test(start_paused = true)]
async fn unresolvable_principal_warns_in_dry_run() {
    let cloud = standard_cloud().without_principal();
    let run = run(&cloud, &refresh_request(true)).await;

    assert!(run.succeeded());
    assert_eq!(
        status(&run, StageKind::GrantElevatedAccess),
        Some(StageStatus::Warning)
    );
    assert_eq!(run.warnings.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn unconfigured_hooks_are_skipped() {
    let cloud = bare_cloud();
    let run = run(&cloud, &refresh_request(false)).await;

    assert!(run.succeeded(), "failures: {:?}", run.failures);
    for stage in StageKind::HOOKED {
        assert_eq!(status(&run, stage), Some(StageStatus::Skipped), "{stage}");
    }
    assert!(
        !cloud
            .calls()
            .iter()
            .any(|call| matches!(call, Call::InvokeHook { .. }))
    );
}

#[tokio::test(start_paused = true)]
async fn same_storage_account_is_refused() {
    let cloud = standard_cloud();
    let mut request = refresh_request(true);
    request.destination_namespace = envcopy_core::Namespace::Named("other".into());
    let cloud = cloud.with_storage("qa2", "stacmeprodqa2other", "rg-acme-qa2", Some("other"));
    let run = run(&cloud, &request).await;
    assert!(run.succeeded(), "distinct accounts: {:?}", run.failures);

    let shared = standard_cloud().with_storage("qa2", "stacmeprodqa2", "rg-acme-qa2", Some("twin"));
    let mut request = refresh_request(true);
    request.destination_namespace = envcopy_core::Namespace::Named("twin".into());
    let run = self::run(&shared, &request).await;
    assert_eq!(run.exit_code(), 1);
    assert!(run.failures[0].contains("same storage account"), "{}", run.failures[0]);
}
