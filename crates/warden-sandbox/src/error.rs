//! Sandbox error types.
//!
//! `Display` output carries the detailed cause and goes to the diagnostic
//! log only. Callers see [`SandboxError::to_action_error`] rendered through
//! [`ActionError::user_message`].

use std::time::Duration;

use thiserror::Error;
use warden_core::ActionError;

/// Errors raised while preparing or running a sandboxed execution.
#[derive(Debug, Error)]
pub enum SandboxError {
    /// The target or configuration was refused by a containment rule.
    #[error("sandbox violation: {0}")]
    Violation(String),

    /// A template could not be rendered.
    #[error("template error: {0}")]
    Template(String),

    /// The secrets file is unreadable, malformed, or too permissive.
    #[error("secrets error: {0}")]
    Secrets(String),

    /// The process could not be started.
    #[error("failed to spawn process: {0}")]
    Spawn(String),

    /// Network or protocol failure.
    #[error("transport error: {0}")]
    Transport(String),

    /// The remote side answered with a non-success status.
    #[error("HTTP status {0}")]
    HttpStatus(u16),

    /// Wall-clock timeout.
    #[error("execution timed out after {0:?}")]
    Timeout(Duration),

    /// Cancelled by the caller.
    #[error("execution cancelled")]
    Cancelled,

    /// The plugin execution rate limit was exceeded.
    #[error("plugin execution rate limit exceeded")]
    RateLimited,

    /// The request reached the executor without being approved.
    #[error("request is not approved")]
    NotApproved,

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SandboxError {
    /// Map onto the caller-facing action taxonomy.
    #[must_use]
    pub fn to_action_error(&self) -> ActionError {
        match self {
            Self::Violation(cause) => ActionError::SandboxViolation(cause.clone()),
            Self::Timeout(limit) => ActionError::ExecutionTimeout(*limit),
            Self::Cancelled => ActionError::Cancelled,
            Self::HttpStatus(code) => ActionError::HttpStatus(*code),
            Self::RateLimited => ActionError::RateLimited("plugin_execution".to_string()),
            Self::NotApproved => ActionError::ApprovalDenied {
                reason: self.to_string(),
            },
            Self::Template(_)
            | Self::Secrets(_)
            | Self::Spawn(_)
            | Self::Transport(_)
            | Self::Io(_) => ActionError::ExecutionFailed(self.to_string()),
        }
    }
}

/// Result type for sandbox operations.
pub type SandboxResult<T> = Result<T, SandboxError>;
