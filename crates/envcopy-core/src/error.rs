//! Error types for the provider-agnostic core.

use thiserror::Error;

/// Primary error type for core model operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A resource name does not follow the delimited naming convention.
    #[error("resource name does not follow the naming convention")]
    InvalidResourceName {
        /// Offending resource name.
        name: String,
        /// Static reason for the rejection.
        reason: &'static str,
    },
    /// A stage identifier could not be parsed.
    #[error("unknown workflow stage")]
    UnknownStage {
        /// Value supplied by the caller.
        value: String,
    },
}

/// Convenience alias for core results.
pub type CoreResult<T> = Result<T, CoreError>;
