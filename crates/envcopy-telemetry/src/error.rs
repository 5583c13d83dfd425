//! Error types for telemetry operations.

use std::path::PathBuf;

use thiserror::Error;

/// Result alias for telemetry operations.
pub type Result<T> = std::result::Result<T, TelemetryError>;

/// Errors raised by telemetry helpers.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// Installing the tracing subscriber failed.
    #[error("failed to install tracing subscriber")]
    SubscriberInstall {
        /// Underlying tracing subscriber error.
        #[source]
        source: tracing_subscriber::util::TryInitError,
    },
    /// Opening the append-only log file failed.
    #[error("failed to open log file")]
    LogFileOpen {
        /// Log file path.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },
    /// A log format name was not recognised.
    #[error("unknown log format")]
    UnknownFormat {
        /// Offending format name.
        value: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;
    use std::io;

    #[test]
    fn telemetry_error_display_and_source() {
        let open = TelemetryError::LogFileOpen {
            path: PathBuf::from("/tmp/envcopy.log"),
            source: io::Error::other("denied"),
        };
        assert_eq!(open.to_string(), "failed to open log file");
        assert!(open.source().is_some());

        let format = TelemetryError::UnknownFormat {
            value: "xml".into(),
        };
        assert_eq!(format.to_string(), "unknown log format");
        assert!(format.source().is_none());
    }
}
