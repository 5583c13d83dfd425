//! Process runner for the `az` command line.
//!
//! # Design
//! - Every invocation requests JSON output and is bounded by a timeout; the
//!   child is killed when the timeout elapses.
//! - Standard error is kept verbatim (trimmed) so not-found responses can be
//!   told apart from real failures.

use std::process::Stdio;
use std::time::Duration;

use serde::de::DeserializeOwned;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::{AzureError, AzureResult};

/// Upper bound for a single `az` call.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

/// Handle to the `az` executable.
#[derive(Debug, Clone)]
pub struct AzCli {
    program: String,
    timeout: Duration,
}

impl AzCli {
    /// Runner for the executable at `program`.
    #[must_use]
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Override the per-call timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Executable path.
    #[must_use]
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Run `az <args> --output json` and return standard output.
    ///
    /// # Errors
    ///
    /// Returns an error when the process cannot start, times out, or exits
    /// unsuccessfully.
    pub async fn run(&self, args: &[&str]) -> AzureResult<String> {
        let mut full: Vec<String> = args.iter().map(|arg| (*arg).to_string()).collect();
        full.extend(["--output".to_string(), "json".to_string(), "--only-show-errors".to_string()]);
        run_process(&self.program, &full, &[], Some(self.timeout)).await
    }

    /// Run a command and decode its JSON output.
    ///
    /// # Errors
    ///
    /// Returns an error when the command fails or its output does not decode.
    pub async fn json<T: DeserializeOwned>(&self, args: &[&str]) -> AzureResult<T> {
        let stdout = self.run(args).await?;
        decode(&self.render(args), &stdout)
    }

    /// Like [`AzCli::json`], mapping a not-found response to `None`.
    ///
    /// # Errors
    ///
    /// Returns every failure other than not-found.
    pub async fn json_optional<T: DeserializeOwned>(&self, args: &[&str]) -> AzureResult<Option<T>> {
        match self.json(args).await {
            Ok(value) => Ok(Some(value)),
            Err(err) if err.is_not_found() => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Run a command for its side effect, discarding output.
    ///
    /// # Errors
    ///
    /// Returns an error when the command fails.
    pub async fn execute(&self, args: &[&str]) -> AzureResult<()> {
        self.run(args).await.map(|_| ())
    }

    fn render(&self, args: &[&str]) -> String {
        render(&self.program, args.iter().copied())
    }
}

pub(crate) fn render<'a>(program: &'a str, args: impl Iterator<Item = &'a str>) -> String {
    std::iter::once(program).chain(args).collect::<Vec<_>>().join(" ")
}

pub(crate) fn decode<T: DeserializeOwned>(command: &str, stdout: &str) -> AzureResult<T> {
    let trimmed = stdout.trim();
    let body = if trimmed.is_empty() { "null" } else { trimmed };
    serde_json::from_str(body).map_err(|source| AzureError::Decode {
        command: command.to_string(),
        source,
    })
}

/// Spawn `program`, wait for it within `timeout`, and return standard output.
pub(crate) async fn run_process(
    program: &str,
    args: &[String],
    envs: &[(String, String)],
    timeout: Option<Duration>,
) -> AzureResult<String> {
    let command = render(program, args.iter().map(String::as_str));
    debug!(command = %command, "running command");

    let mut process = Command::new(program);
    process
        .args(args)
        .envs(envs.iter().map(|(key, value)| (key.as_str(), value.as_str())))
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let output = match timeout {
        Some(limit) => tokio::time::timeout(limit, process.output())
            .await
            .map_err(|_| {
                warn!(command = %command, timeout_secs = limit.as_secs(), "command timed out");
                AzureError::Timeout {
                    command: command.clone(),
                    timeout_secs: limit.as_secs(),
                }
            })?,
        None => process.output().await,
    }
    .map_err(|source| AzureError::Spawn {
        command: command.clone(),
        source,
    })?;

    if output.status.success() {
        return Ok(String::from_utf8_lossy(&output.stdout).into_owned());
    }
    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    Err(AzureError::CommandFailed {
        command,
        status: output.status.code().unwrap_or(-1),
        stderr,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    #[test]
    fn rendered_command_joins_program_and_arguments() {
        let program = String::from("az");
        let args = vec!["sql".to_string(), "db".to_string(), "list".to_string()];
        assert_eq!(render(&program, args.iter().map(String::as_str)), "az sql db list");
        assert_eq!(AzCli::new("az").render(&["group", "list"]), "az group list");
    }

    #[test]
    fn empty_output_decodes_as_null() {
        let value: Option<Value> = decode("az x", "  \n").expect("decodes");
        assert!(value.is_none());
    }

    #[test]
    fn malformed_output_names_the_command() {
        let err = decode::<Value>("az sql db show", "not json").unwrap_err();
        assert!(err.to_string().contains("az sql db show"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn captures_stdout_and_failures() {
        let ok = run_process("sh", &["-c".into(), "printf '[1,2]'".into()], &[], None)
            .await
            .expect("runs");
        assert_eq!(ok, "[1,2]");

        let err = run_process(
            "sh",
            &["-c".into(), "echo 'ResourceNotFound' >&2; exit 3".into()],
            &[],
            None,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AzureError::CommandFailed { status: 3, .. }));
        assert!(err.is_not_found());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn slow_commands_time_out() {
        let err = run_process(
            "sh",
            &["-c".into(), "sleep 5".into()],
            &[],
            Some(Duration::from_millis(50)),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AzureError::Timeout { .. }));
    }

    #[tokio::test]
    async fn missing_program_is_a_spawn_error() {
        let err = AzCli::new("/nonexistent/az-binary")
            .execute(&["account", "show"])
            .await
            .unwrap_err();
        assert!(matches!(err, AzureError::Spawn { .. }));
    }
}
