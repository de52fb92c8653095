//! Audit-related error types.

use thiserror::Error;

/// Errors that can occur with audit storage.
#[derive(Debug, Error)]
pub enum AuditError {
    /// Underlying I/O failure.
    #[error("audit I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("serialization error: {0}")]
    SerializationError(String),

    /// The audit file has permissions wider than owner-only.
    #[error("audit file {path} is accessible by other users (mode {mode:o})")]
    InsecurePermissions {
        /// Path to the file.
        path: String,
        /// The offending mode bits.
        mode: u32,
    },
}

/// Result type for audit operations.
pub type AuditResult<T> = Result<T, AuditError>;
