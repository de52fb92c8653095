//! Telemetry error types.

use std::path::PathBuf;

use thiserror::Error;

/// Errors from building or installing the log subscriber.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// A format name other than pretty, compact, full or json.
    #[error("unknown log format '{0}'")]
    UnknownFormat(String),

    /// The level or a directive is not a valid filter.
    #[error("invalid log filter '{filter}': {reason}")]
    InvalidFilter {
        /// The offending level or directive.
        filter: String,
        /// Parser message.
        reason: String,
    },

    /// The log directory could not be created.
    #[error("cannot create log directory {path}: {source}")]
    LogDirectory {
        /// Directory that was requested.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// A global subscriber is already installed.
    #[error("log subscriber already installed: {0}")]
    AlreadyInstalled(String),
}

/// Result type for telemetry operations.
pub type TelemetryResult<T> = Result<T, TelemetryError>;
