//! Report renderers for CLI commands.

use std::fmt::Write as _;

use anyhow::anyhow;
use clap::ValueEnum;
use envcopy_core::WorkflowRun;
use serde::Serialize;

use crate::error::{CliError, CliResult};

/// Output format for rendered reports.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, ValueEnum)]
pub(crate) enum OutputFormat {
    /// Aligned human-readable table.
    #[default]
    Table,
    /// Pretty-printed JSON.
    Json,
}

pub(crate) fn to_json<T: Serialize>(value: &T) -> CliResult<String> {
    serde_json::to_string_pretty(value)
        .map_err(|err| CliError::failure(anyhow!("failed to format JSON: {err}")))
}

/// Render the final run report.
pub(crate) fn format_run(run: &WorkflowRun, format: OutputFormat) -> CliResult<String> {
    match format {
        OutputFormat::Json => to_json(run),
        OutputFormat::Table => Ok(run_table(run)),
    }
}

fn run_table(run: &WorkflowRun) -> String {
    let mut out = String::new();
    let mode = if run.dry_run { "dry run" } else { "execute" };
    let _ = writeln!(out, "run {} ({mode})", run.run_id);
    let width = run
        .stages
        .iter()
        .map(|stage| stage.name.as_str().len())
        .max()
        .unwrap_or(5)
        .max("STAGE".len());
    let _ = writeln!(out, "{:<width$} {:<9} DETAIL", "STAGE", "STATUS");
    for stage in &run.stages {
        let _ = writeln!(
            out,
            "{:<width$} {:<9} {}",
            stage.name.as_str(),
            stage.status.as_str(),
            stage.detail
        );
    }

    section(&mut out, "warnings", &run.warnings);
    section(&mut out, "failures", &run.failures);
    if !run.orphans.is_empty() {
        section(
            &mut out,
            "objects that may still be created by failed copies (delete them manually)",
            &run.orphans,
        );
    }

    let outcome = if run.succeeded() {
        "succeeded"
    } else if run.aborted {
        "aborted"
    } else {
        "failed"
    };
    let _ = writeln!(out, "result: {outcome}");
    out
}

fn section(out: &mut String, title: &str, lines: &[String]) {
    if lines.is_empty() {
        return;
    }
    let _ = writeln!(out, "{title}:");
    for line in lines {
        let _ = writeln!(out, "  - {line}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use envcopy_core::{StageKind, StageStatus};
    use serde_json::Value;

    fn sample() -> WorkflowRun {
        let mut run = WorkflowRun::new(false);
        run.record(StageKind::Discovery, StageStatus::Completed, "qa2: 2 servers");
        run.record(
            StageKind::CopyDatabases,
            StageStatus::Failed,
            "1 of 2 database copies failed",
        );
        run.fail("copy-databases: 1 of 2 database copies failed");
        run.warn("tags incomplete on db-b");
        run.orphans.push("db-a-copy".into());
        run.aborted = true;
        run
    }

    #[test]
    fn table_lists_stages_and_sections() {
        let text = format_run(&sample(), OutputFormat::Table).expect("renders");
        assert!(text.contains("(execute)"));
        assert!(text.contains("copy-databases"));
        assert!(text.contains("failed    1 of 2 database copies failed"));
        assert!(text.contains("warnings:\n  - tags incomplete on db-b"));
        assert!(text.contains("delete them manually):\n  - db-a-copy"));
        assert!(text.trim_end().ends_with("result: aborted"));
    }

    #[test]
    fn clean_runs_omit_empty_sections() {
        let mut run = WorkflowRun::new(true);
        run.record(StageKind::Discovery, StageStatus::Completed, "ok");
        let text = format_run(&run, OutputFormat::Table).expect("renders");
        assert!(text.contains("(dry run)"));
        assert!(!text.contains("warnings:"));
        assert!(!text.contains("failures:"));
        assert!(text.trim_end().ends_with("result: succeeded"));
    }

    #[test]
    fn json_report_carries_the_whole_run() {
        let text = format_run(&sample(), OutputFormat::Json).expect("renders");
        let value: Value = serde_json::from_str(&text).expect("valid json");
        assert_eq!(value["stages"][1]["name"], "copy-databases");
        assert_eq!(value["stages"][1]["status"], "failed");
        assert_eq!(value["orphans"][0], "db-a-copy");
        assert_eq!(value["aborted"], true);
    }
}
