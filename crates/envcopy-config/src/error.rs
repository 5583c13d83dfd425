//! Error types for request validation and settings loading.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Primary error type for configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A parameter carried an invalid value.
    #[error("invalid value for '{field}': {reason}")]
    InvalidField {
        /// Parameter name.
        field: &'static str,
        /// Offending value when available.
        value: Option<String>,
        /// Static reason for the failure.
        reason: &'static str,
    },
    /// Source and destination namespaces are identical.
    #[error("source and destination namespace are both '{namespace}'")]
    SameNamespace {
        /// Shared namespace value.
        namespace: String,
    },
    /// Source and destination environments differ.
    #[error("source environment '{source_environment}' differs from destination '{destination_environment}'")]
    EnvironmentMismatch {
        /// Source environment.
        source_environment: String,
        /// Destination environment.
        destination_environment: String,
    },
    /// The reserved root namespace was used as destination.
    #[error("destination namespace '{namespace}' is the reserved root namespace")]
    RootDestination {
        /// Offending namespace value.
        namespace: String,
    },
    /// A hook was configured for a stage that is not delegated.
    #[error("stage '{stage}' does not accept a hook command")]
    HookNotAllowed {
        /// Stage identifier.
        stage: String,
    },
    /// The settings file could not be read.
    #[error("failed to read settings file {path}")]
    SettingsRead {
        /// Settings file path.
        path: PathBuf,
        /// Underlying IO error.
        source: io::Error,
    },
    /// The settings file was not valid YAML for the settings schema.
    #[error("failed to parse settings file {path}")]
    SettingsParse {
        /// Settings file path.
        path: PathBuf,
        /// Underlying YAML error.
        source: serde_yaml::Error,
    },
}

impl ConfigError {
    /// Remediation hint printed alongside the error.
    #[must_use]
    pub const fn hint(&self) -> &'static str {
        match self {
            Self::InvalidField { .. } => "check the parameter against the documented format",
            Self::SameNamespace { .. } => {
                "choose a destination namespace different from the source to avoid overwriting it"
            }
            Self::EnvironmentMismatch { .. } => {
                "refreshes copy between namespaces of one environment; pass the same value for source and destination"
            }
            Self::RootDestination { .. } => {
                "the shared default deployment cannot be a refresh destination; pass a tenant namespace"
            }
            Self::HookNotAllowed { .. } => {
                "hooks are accepted for stop/start, config cleanup, access, resource and replica stages only"
            }
            Self::SettingsRead { .. } => "verify the --config path exists and is readable",
            Self::SettingsParse { .. } => "fix the YAML syntax or field types in the settings file",
        }
    }
}

/// Convenience alias for configuration results.
pub type ConfigResult<T> = Result<T, ConfigError>;
