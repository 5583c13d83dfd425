//! `refresh` command: validate the request, run the workflow, print the report.

use std::sync::Arc;

use chrono::Utc;
use envcopy_azure::AzurePlatform;
use envcopy_config::{RefreshSettings, RequestInput, validate_request};
use envcopy_core::{CloudPlatform, WorkflowRun};
use envcopy_engine::WorkflowCoordinator;
use tracing::{error, info};

use crate::error::CliResult;
use crate::output::{OutputFormat, format_run};

pub(crate) async fn handle_refresh(
    input: RequestInput,
    settings: RefreshSettings,
    format: OutputFormat,
) -> CliResult<i32> {
    let platform: Arc<dyn CloudPlatform> = Arc::new(AzurePlatform::from_settings(&settings));
    let (run, report) = execute_refresh(platform, &input, settings, format).await?;
    println!("{report}");
    Ok(run.exit_code())
}

/// Validate `input`, run the workflow against `platform`, and render the
/// report. Validation failures return before any collaborator is called.
pub(crate) async fn execute_refresh(
    platform: Arc<dyn CloudPlatform>,
    input: &RequestInput,
    settings: RefreshSettings,
    format: OutputFormat,
) -> CliResult<(WorkflowRun, String)> {
    let request = validate_request(input, &settings, Utc::now())?;
    info!(
        environment = %request.source_environment,
        dry_run = request.dry_run,
        restore_point = %request.restore_point,
        "refresh requested"
    );

    let run = WorkflowCoordinator::new(platform, settings).run(&request).await;
    if run.succeeded() {
        info!(run_id = %run.run_id, "refresh finished");
    } else {
        error!(run_id = %run.run_id, failures = run.failures.len(), "refresh failed");
    }
    let report = format_run(&run, format)?;
    Ok((run, report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use envcopy_test_support::assert::assert_no_destructive_calls;
    use envcopy_test_support::fixtures::standard_cloud;
    use serde_json::Value;

    fn input(dry_run: bool) -> RequestInput {
        RequestInput {
            source: "qa2".into(),
            destination: "qa2".into(),
            source_namespace: "manufacturo".into(),
            destination_namespace: "test".into(),
            dry_run,
            ..RequestInput::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn dry_run_reports_a_clean_plan() {
        let cloud = standard_cloud();
        let (run, report) = execute_refresh(
            Arc::new(cloud.clone()),
            &input(true),
            RefreshSettings::default(),
            OutputFormat::Json,
        )
        .await
        .expect("runs");

        assert_eq!(run.exit_code(), 0);
        assert_no_destructive_calls(&cloud);
        let value: Value = serde_json::from_str(&report).expect("json report");
        assert_eq!(value["dry_run"], true);
        assert_eq!(value["stages"].as_array().map(Vec::len), Some(14));
    }

    #[tokio::test]
    async fn refused_requests_never_reach_the_cloud() {
        let cloud = standard_cloud();
        let mut request = input(false);
        request.destination_namespace = "manufacturo".into();
        let err = execute_refresh(
            Arc::new(cloud.clone()),
            &request,
            RefreshSettings::default(),
            OutputFormat::Table,
        )
        .await
        .expect_err("same namespace is refused");

        assert_eq!(err.exit_code(), 1);
        assert!(err.display_message().contains("hint:"));
        assert!(cloud.calls().is_empty());
    }
}
