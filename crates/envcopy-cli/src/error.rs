//! CLI error type distinguishing invalid invocations from operational failures.

use std::fmt::{self, Display, Formatter};

use envcopy_config::ConfigError;

#[derive(Debug)]
pub(crate) enum CliError {
    Validation(String),
    Failure(anyhow::Error),
}

/// Convenience alias for functions returning a `CliError`.
pub(crate) type CliResult<T> = Result<T, CliError>;

impl CliError {
    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub(crate) fn failure(error: impl Into<anyhow::Error>) -> Self {
        Self::Failure(error.into())
    }

    /// Every refusal and failure exits with status 1.
    pub(crate) const fn exit_code(&self) -> i32 {
        match self {
            Self::Validation(_) | Self::Failure(_) => 1,
        }
    }

    pub(crate) fn display_message(&self) -> String {
        match self {
            Self::Validation(message) => message.clone(),
            Self::Failure(error) => format!("{error:#}"),
        }
    }
}

impl Display for CliError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display_message())
    }
}

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        Self::Validation(format!("{err} (hint: {})", err.hint()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    #[test]
    fn every_error_exits_with_one() {
        assert_eq!(CliError::validation("bad").exit_code(), 1);
        assert_eq!(CliError::failure(anyhow!("boom")).exit_code(), 1);
    }

    #[test]
    fn config_errors_carry_their_hint() {
        let err = CliError::from(ConfigError::SameNamespace {
            namespace: "test".into(),
        });
        let message = err.display_message();
        assert!(message.contains("both 'test'"));
        assert!(message.contains("hint: choose a destination namespace"));
    }

    #[test]
    fn failures_render_their_context_chain() {
        let err = CliError::failure(anyhow!("root cause").context("while loading"));
        assert_eq!(err.to_string(), "while loading: root cause");
    }
}
