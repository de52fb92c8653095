//! Runtime error types.

use std::path::PathBuf;

use thiserror::Error;
use warden_core::ExecutionType;

/// Errors raised while building the runtime or managing plugins.
///
/// Nothing here escapes [`crate::Dispatcher::submit`]; action failures are
/// folded into the returned result instead.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// Configuration could not be loaded or converted.
    #[error("Configuration error: {0}")]
    ConfigError(#[from] warden_config::ConfigError),

    /// Approval component error.
    #[error("Approval error: {0}")]
    ApprovalError(#[from] warden_approval::ApprovalError),

    /// Sandbox component error.
    #[error("Sandbox error: {0}")]
    SandboxError(#[from] warden_sandbox::SandboxError),

    /// Audit storage error.
    #[error("Audit error: {0}")]
    AuditError(#[from] warden_audit::AuditError),

    /// Logging could not be initialised.
    #[error("Telemetry error: {0}")]
    TelemetryError(#[from] warden_telemetry::TelemetryError),

    /// A plugin definition file could not be parsed.
    #[error("Invalid plugin definition {path}: {reason}")]
    InvalidDefinition {
        /// The file.
        path: PathBuf,
        /// Why it was rejected.
        reason: String,
    },

    /// A plugin name is empty or uses characters outside `[a-z0-9_-]`.
    #[error("Invalid plugin name: {0:?}")]
    InvalidPluginName(String),

    /// A plugin would shadow a built-in tool or an operator plugin.
    #[error("Plugin name conflict: {0}")]
    NameConflict(String),

    /// The definition declares the same parameter twice.
    #[error("Duplicate parameter '{parameter}' in plugin {name}")]
    DuplicateParameter {
        /// Plugin name.
        name: String,
        /// The repeated parameter.
        parameter: String,
    },

    /// A shell command template places a placeholder where its quoting
    /// would not hold.
    #[error("Plugin {name} has an unsafe command template: {reason}")]
    UnsafeCommandTemplate {
        /// Plugin name.
        name: String,
        /// Why the template was refused.
        reason: String,
    },

    /// The execution type may not be created through this channel.
    #[error("Plugin {name} may not use {execution} execution")]
    DisallowedExecutionType {
        /// Plugin name.
        name: String,
        /// The rejected execution type.
        execution: ExecutionType,
    },

    /// I/O error.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Result type for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;
