//! Failures of `az` and hook command invocations.

use std::io;

use thiserror::Error;

/// Result alias for adapter operations.
pub type AzureResult<T> = Result<T, AzureError>;

/// Errors raised while running external commands.
#[derive(Debug, Error)]
pub enum AzureError {
    /// The executable could not be started.
    #[error("failed to start `{command}`")]
    Spawn {
        /// Command line attempted.
        command: String,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// The command ran longer than allowed and was killed.
    #[error("`{command}` timed out after {timeout_secs}s")]
    Timeout {
        /// Command line attempted.
        command: String,
        /// Timeout applied.
        timeout_secs: u64,
    },
    /// The command exited unsuccessfully.
    #[error("`{command}` exited with status {status}: {stderr}")]
    CommandFailed {
        /// Command line attempted.
        command: String,
        /// Exit status, or -1 when killed by a signal.
        status: i32,
        /// Trimmed standard error.
        stderr: String,
    },
    /// The command printed output that could not be decoded.
    #[error("could not decode output of `{command}`")]
    Decode {
        /// Command line attempted.
        command: String,
        /// Decoder failure.
        #[source]
        source: serde_json::Error,
    },
    /// Decoded output lacked an expected field.
    #[error("output of `{command}` has no {field}")]
    MissingField {
        /// Command line attempted.
        command: String,
        /// Field expected.
        field: &'static str,
    },
}

impl AzureError {
    /// Whether the provider reported that the addressed resource does not
    /// exist.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::CommandFailed { stderr, .. } => {
                let lowered = stderr.to_ascii_lowercase();
                lowered.contains("resourcenotfound")
                    || lowered.contains("containernotfound")
                    || lowered.contains("was not found")
                    || lowered.contains("could not be found")
                    || lowered.contains("does not exist")
            }
            _ => false,
        }
    }
}
