//! Telemetry initialisation and logging configuration.
//!
//! # Design
//! - Single entry point installing a console layer and an optional
//!   append-only file layer behind one `EnvFilter`.
//! - The file layer never emits ANSI escapes.

use std::fs::{File, OpenOptions};
use std::path::Path;
use std::str::FromStr;
use std::sync::Mutex;

use tracing_subscriber::{
    EnvFilter, Layer, Registry, fmt, layer::SubscriberExt, util::SubscriberInitExt,
};

use crate::error::{Result, TelemetryError};

/// Default logging target when `RUST_LOG` is not provided.
pub const DEFAULT_LOG_LEVEL: &str = "info";

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Logging configuration.
#[derive(Debug, Clone)]
pub struct LoggingConfig<'a> {
    /// Log level string (e.g., `info`, `debug`).
    pub level: &'a str,
    /// Output format selection for the tracing subscriber.
    pub format: LogFormat,
    /// Optional file receiving a copy of every record, opened for append.
    pub log_file: Option<&'a Path>,
}

impl Default for LoggingConfig<'_> {
    fn default() -> Self {
        Self {
            level: DEFAULT_LOG_LEVEL,
            format: LogFormat::infer(),
            log_file: None,
        }
    }
}

/// Available output formats for the logger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Emit logs as structured JSON objects.
    Json,
    /// Emit human-readable logs.
    Pretty,
}

impl LogFormat {
    /// Choose a sensible default for the current build.
    #[must_use]
    pub const fn infer() -> Self {
        if cfg!(debug_assertions) {
            Self::Pretty
        } else {
            Self::Json
        }
    }
}

impl FromStr for LogFormat {
    type Err = TelemetryError;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "pretty" | "text" => Ok(Self::Pretty),
            other => Err(TelemetryError::UnknownFormat {
                value: other.to_string(),
            }),
        }
    }
}

/// Configure and install the global tracing subscriber.
///
/// # Errors
///
/// Returns an error if the log file cannot be opened or the subscriber
/// cannot be installed (for example, because another subscriber has already
/// been set globally).
pub fn init_logging(config: &LoggingConfig<'_>) -> Result<()> {
    let mut layers: Vec<BoxedLayer> = vec![console_layer(config.format)];
    if let Some(path) = config.log_file {
        let file = open_log_file(path)?;
        layers.push(file_layer(config.format, file));
    }

    tracing_subscriber::registry()
        .with(layers)
        .with(build_env_filter(config.level))
        .try_init()
        .map_err(|source| TelemetryError::SubscriberInstall { source })
}

/// Open a log file for appending, creating it when absent.
///
/// # Errors
///
/// Returns an error when the file cannot be created or opened.
pub fn open_log_file(path: &Path) -> Result<File> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|source| TelemetryError::LogFileOpen {
            path: path.to_path_buf(),
            source,
        })
}

fn console_layer(format: LogFormat) -> BoxedLayer {
    match format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_target(false)
            .with_thread_ids(false)
            .with_writer(std::io::stderr)
            .boxed(),
        LogFormat::Pretty => fmt::layer()
            .with_target(false)
            .with_thread_ids(false)
            .with_writer(std::io::stderr)
            .boxed(),
    }
}

fn file_layer(format: LogFormat, file: File) -> BoxedLayer {
    let writer = Mutex::new(file);
    match format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_ansi(false)
            .with_target(false)
            .with_writer(writer)
            .boxed(),
        LogFormat::Pretty => fmt::layer()
            .with_ansi(false)
            .with_target(false)
            .with_writer(writer)
            .boxed(),
    }
}

fn build_env_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
}
