//! Typed failures raised by the engine.
//!
//! # Design
//! - Messages name the resource searched for; `hint` carries the remediation.
//! - Collaborator failures keep their `anyhow` chain as the source.

use envcopy_core::{CapacityVerdict, CoreError, StageKind, TopologyRole};
use thiserror::Error;

/// Result alias for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors produced by discovery, admission, copying, and stage execution.
#[derive(Debug, Error)]
pub enum EngineError {
    /// No resource matched the discovery filter.
    #[error("no {kind} tagged Environment={environment}, Type={role}{scope}")]
    Discovery {
        /// Resource kind searched for.
        kind: &'static str,
        /// Environment tag searched for.
        environment: String,
        /// Role tag searched for.
        role: TopologyRole,
        /// Extra filter description, possibly empty.
        scope: String,
    },
    /// The inventory query itself failed.
    #[error("inventory query for {kind} in environment '{environment}' failed")]
    Inventory {
        /// Resource kind searched for.
        kind: &'static str,
        /// Environment tag searched for.
        environment: String,
        /// Underlying collaborator error.
        #[source]
        source: anyhow::Error,
    },
    /// A discovered resource does not follow the naming convention.
    #[error("resource '{name}' does not follow the naming convention")]
    Topology {
        /// Offending resource name.
        name: String,
        /// Parse failure.
        #[source]
        source: CoreError,
    },
    /// Granting or revoking elevated access failed.
    #[error("failed to {action} elevated access")]
    Permission {
        /// `grant` or `revoke`.
        action: &'static str,
        /// Underlying collaborator error.
        #[source]
        source: anyhow::Error,
    },
    /// Capacity admission denied a batch.
    #[error(
        "pool '{pool}' capacity check failed ({verdict}): projected free {projected_free_bytes} bytes, required {threshold_bytes} bytes"
    )]
    Capacity {
        /// Pool name.
        pool: String,
        /// Admission verdict.
        verdict: CapacityVerdict,
        /// Projected free space after the batch.
        projected_free_bytes: i64,
        /// Safety threshold.
        threshold_bytes: u64,
    },
    /// A copy request was never accepted.
    #[error("copy of {object} '{name}' was not accepted after {attempts} attempts: {reason}")]
    CopyInitiation {
        /// Object kind.
        object: &'static str,
        /// Destination name.
        name: String,
        /// Attempts made.
        attempts: u32,
        /// Last provider error.
        reason: String,
    },
    /// A copy did not become ready in time.
    #[error("copy of {object} '{name}' did not complete within {elapsed_minutes} minutes")]
    CopyTimeout {
        /// Object kind.
        object: &'static str,
        /// Destination name.
        name: String,
        /// Minutes waited.
        elapsed_minutes: u64,
    },
    /// A batch finished with failed tasks.
    #[error("{failed} of {total} {object} copies failed; first failure: {first_failure}")]
    BatchFailed {
        /// Object kind.
        object: &'static str,
        /// Failed task count.
        failed: usize,
        /// Total task count.
        total: usize,
        /// Description of the first failed task.
        first_failure: String,
    },
    /// An external collaborator failed during a stage.
    #[error("{operation} failed during stage {stage}")]
    Collaborator {
        /// Stage in progress.
        stage: StageKind,
        /// Operation that failed.
        operation: &'static str,
        /// Underlying collaborator error.
        #[source]
        source: anyhow::Error,
    },
    /// Inputs were inconsistent with discovered state.
    #[error("invalid input: {reason}")]
    InvalidInput {
        /// Description of the inconsistency.
        reason: String,
    },
}

impl EngineError {
    /// Remediation hint printed with the diagnosis.
    #[must_use]
    pub const fn hint(&self) -> &'static str {
        match self {
            Self::Discovery { .. } => {
                "verify the environment name and that the resource carries Environment and Type tags"
            }
            Self::Inventory { .. } => "check that the cloud CLI is signed in and can query the inventory",
            Self::Topology { .. } => {
                "server names must have at least four '-'-delimited segments: {prefix}-{product}-{tier}-{env}"
            }
            Self::Permission { .. } => {
                "confirm the signed-in principal may manage role assignments on the resource groups"
            }
            Self::Capacity { .. } => {
                "free pool storage or raise the pool limit before refreshing; a dry run lists the projection"
            }
            Self::CopyInitiation { .. } | Self::CopyTimeout { .. } | Self::BatchFailed { .. } => {
                "inspect the listed objects; a failed copy may still complete on the provider side"
            }
            Self::Collaborator { .. } => "check the hook command or cloud CLI output in the log file",
            Self::InvalidInput { .. } => "correct the invocation parameters and re-run",
        }
    }

    /// Error message with its source chain and hint.
    #[must_use]
    pub fn diagnosis(&self) -> String {
        let mut message = self.to_string();
        let mut source = std::error::Error::source(self);
        while let Some(cause) = source {
            message.push_str(": ");
            message.push_str(&cause.to_string());
            source = cause.source();
        }
        format!("{message} (hint: {})", self.hint())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discovery_message_names_filter() {
        let err = EngineError::Discovery {
            kind: "sql server",
            environment: "qa2".into(),
            role: TopologyRole::Primary,
            scope: String::new(),
        };
        assert_eq!(err.to_string(), "no sql server tagged Environment=qa2, Type=Primary");
        assert!(err.diagnosis().contains("hint:"));
    }

    #[test]
    fn diagnosis_includes_source_chain() {
        let err = EngineError::Permission {
            action: "grant",
            source: anyhow::anyhow!("authorization failed"),
        };
        let diagnosis = err.diagnosis();
        assert!(diagnosis.starts_with("failed to grant elevated access: authorization failed"));
    }
}
