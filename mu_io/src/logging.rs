//! Logging setup.
//!
//! Everything logs through `tracing`; this installs the global subscriber.
//! The level comes from `MYUPDATER_LOG` (an `EnvFilter` directive, default
//! `info`). Output goes to stderr and, when configured, to a plain-text log
//! file that is appended to and never rotated.

use std::fmt;
use std::path::{Path, PathBuf};

use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt as tracing_fmt};

pub const LOG_ENV: &str = "MYUPDATER_LOG";

#[derive(Debug)]
pub enum LoggingError {
    InvalidLogPath { path: PathBuf },
    Appender { path: PathBuf, message: String },
    AlreadyInitialized { message: String },
}

impl fmt::Display for LoggingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoggingError::InvalidLogPath { path } => {
                write!(f, "invalid log file path '{}'", path.display())
            }
            LoggingError::Appender { path, message } => {
                write!(f, "cannot open log file '{}': {}", path.display(), message)
            }
            LoggingError::AlreadyInitialized { message } => {
                write!(f, "logging already initialized: {}", message)
            }
        }
    }
}

impl std::error::Error for LoggingError {}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

fn file_appender(path: &Path) -> Result<RollingFileAppender, LoggingError> {
    let file_name = path
        .file_name()
        .ok_or_else(|| LoggingError::InvalidLogPath {
            path: path.to_path_buf(),
        })?;
    let dir = path
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));

    RollingFileAppender::builder()
        .rotation(Rotation::NEVER)
        .filename_prefix(file_name.to_string_lossy())
        .build(dir)
        .map_err(|e| LoggingError::Appender {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
}

/// Install the global subscriber. Fails if one is already set.
pub fn init_logging(log_file: Option<&Path>) -> Result<(), LoggingError> {
    let file_layer = match log_file {
        Some(path) => Some(
            tracing_fmt::layer()
                .with_ansi(false)
                .with_writer(file_appender(path)?),
        ),
        None => None,
    };

    tracing_subscriber::registry()
        .with(env_filter())
        .with(tracing_fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .try_init()
        .map_err(|e| LoggingError::AlreadyInitialized {
            message: e.to_string(),
        })
}
