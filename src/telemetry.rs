//! Logging setup: console output plus an optional rotating JSON file sink.
//!
//! # Sinks
//!
//! - **Console**: human-readable text on stdout.
//! - **File** (`LOG_FILE_ENABLED=true`): JSON lines written through a
//!   non-blocking worker to `LOG_FILE_PATH`, rotated daily with the five most
//!   recent files kept. The file name is split into prefix and suffix, so
//!   `logs/app.log` becomes `logs/app.2024-01-15.log`.
//!
//! # Levels
//!
//! `RUST_LOG`, when set and valid, takes precedence. Otherwise `LOG_LEVEL`
//! selects a directive set (see [`LogLevel::filter_directives`]); `info` hides
//! per-request traffic lines, `http` shows them.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::error;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{InitError, RollingFileAppender, Rotation};
use tracing_subscriber::filter::ParseError;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::{EnvFilter, Layer};

use crate::config::{Config, LogLevel};
use crate::middleware::errors::{panic_message, record_panic};

/// Rotated log files kept on disk.
pub const MAX_LOG_FILES: usize = 5;

/// Logging could not be initialized.
#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("Failed to create log directory {}: {source}", path.display())]
    LogDirectory {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to open log file: {0}")]
    Appender(#[from] InitError),

    #[error("Invalid log filter: {0}")]
    Filter(#[from] ParseError),

    #[error("Failed to install global subscriber: {0}")]
    Install(#[from] TryInitError),
}

/// Keeps the file writer alive; dropping it flushes buffered records.
#[must_use = "dropping the guard stops the file writer"]
pub struct TelemetryGuard {
    _file: Option<WorkerGuard>,
}

/// Install the global subscriber according to `config`.
///
/// # Errors
///
/// Returns `TelemetryError` if the log directory or file cannot be created,
/// or if a global subscriber is already installed.
pub fn init(config: &Config) -> Result<TelemetryGuard, TelemetryError> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => level_filter(config.log_level)?,
    };

    let console = tracing_subscriber::fmt::layer().with_target(true).boxed();

    let (file, guard) = if config.log_file_enabled {
        let appender = file_appender(&config.log_file_path)?;
        let (writer, guard) = tracing_appender::non_blocking(appender);
        let layer = tracing_subscriber::fmt::layer()
            .json()
            .with_current_span(true)
            .with_target(true)
            .with_ansi(false)
            .with_writer(writer)
            .boxed();
        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file)
        .try_init()?;

    Ok(TelemetryGuard { _file: guard })
}

/// Filter for `level`, ignoring `RUST_LOG`.
pub fn level_filter(level: LogLevel) -> Result<EnvFilter, ParseError> {
    EnvFilter::try_new(level.filter_directives())
}

/// Route every panic through the logger.
///
/// Panics inside request handlers are also turned into 500 responses; the
/// hook records the panic site so the response stack can point at it.
pub fn install_panic_hook() {
    std::panic::set_hook(Box::new(|info| {
        record_panic(info);

        let location = info
            .location()
            .map_or_else(|| "<unknown>".to_string(), ToString::to_string);
        error!(
            location = %location,
            "Panic: {}",
            panic_message(info.payload())
        );
    }));
}

/// Daily-rotating appender for `path`, creating its directory first.
fn file_appender(path: &Path) -> Result<RollingFileAppender, TelemetryError> {
    let directory = log_directory(path);
    fs::create_dir_all(&directory).map_err(|source| TelemetryError::LogDirectory {
        path: directory.clone(),
        source,
    })?;

    let mut builder = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .max_log_files(MAX_LOG_FILES);

    if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
        builder = builder.filename_prefix(stem);
    }
    if let Some(extension) = path.extension().and_then(|s| s.to_str()) {
        builder = builder.filename_suffix(extension);
    }

    Ok(builder.build(directory)?)
}

fn log_directory(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_level_filters_parse() {
        for level in [
            LogLevel::Error,
            LogLevel::Warn,
            LogLevel::Info,
            LogLevel::Http,
            LogLevel::Debug,
        ] {
            assert!(level_filter(level).is_ok(), "{level:?}");
        }
    }

    #[test]
    fn test_log_directory() {
        assert_eq!(
            log_directory(Path::new("logs/app.log")),
            PathBuf::from("logs")
        );
        assert_eq!(log_directory(Path::new("app.log")), PathBuf::from("."));
        assert_eq!(
            log_directory(Path::new("/var/log/api/app.log")),
            PathBuf::from("/var/log/api")
        );
    }

    #[test]
    fn test_file_appender_creates_directory() {
        let root = std::env::temp_dir().join(format!("telemetry-{}", uuid::Uuid::new_v4()));
        let path = root.join("nested").join("app.log");

        file_appender(&path).unwrap();
        assert!(root.join("nested").is_dir());

        fs::remove_dir_all(&root).unwrap();
    }
}
