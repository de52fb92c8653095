//! The action error taxonomy and the structured result returned to callers.
//!
//! Every failure is recovered into an [`ActionOutput`] with `is_error` set.
//! Callers only ever see [`ActionError::user_message`]; the `Display`
//! form carries the detailed cause and is meant for the diagnostic log.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::ids::ActionId;

/// Why an action did not complete successfully.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ActionError {
    /// A human (or the fail-closed default) denied the action.
    #[error("approval denied: {reason}")]
    ApprovalDenied {
        /// Internal reason.
        reason: String,
    },

    /// Nobody answered before the deadline.
    #[error("approval expired")]
    ApprovalExpired,

    /// The PIN did not match.
    #[error("invalid PIN")]
    PinInvalid,

    /// PIN verification is temporarily locked.
    #[error("PIN verification locked out")]
    PinLockout,

    /// The sandbox refused the action.
    #[error("sandbox violation: {0}")]
    SandboxViolation(String),

    /// The execution exceeded its wall-clock budget.
    #[error("execution timed out after {0:?}")]
    ExecutionTimeout(Duration),

    /// Transport or spawn failure.
    #[error("execution failed: {0}")]
    ExecutionFailed(String),

    /// A remote service answered with a non-success status.
    #[error("remote service returned HTTP {0}")]
    HttpStatus(u16),

    /// Too many requests for this caller.
    #[error("rate limit exceeded for {0}")]
    RateLimited(String),

    /// Nothing knows how to execute this action kind.
    #[error("no executor for action '{0}'")]
    UnknownAction(String),

    /// The caller cancelled the action.
    #[error("cancelled")]
    Cancelled,

    /// Parameters failed schema validation.
    #[error("invalid parameters: {0}")]
    InvalidParameters(String),
}

impl ActionError {
    /// Safe, non-technical message returned to the caller.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::ApprovalDenied { .. } => "denied: the action was not approved".to_string(),
            Self::ApprovalExpired => {
                "denied: no approval was given before the deadline".to_string()
            },
            Self::PinInvalid => "denied: the PIN was not accepted".to_string(),
            Self::PinLockout => {
                "denied: PIN entry is temporarily locked, try again later".to_string()
            },
            Self::SandboxViolation(_) => {
                "blocked: the action was refused by the sandbox".to_string()
            },
            Self::ExecutionTimeout(_) => "the action timed out and was stopped".to_string(),
            Self::ExecutionFailed(_) => "the action failed to run".to_string(),
            Self::HttpStatus(code) => format!("the remote service returned HTTP {code}"),
            Self::RateLimited(_) => "too many requests, try again later".to_string(),
            Self::UnknownAction(name) => format!("unknown action '{name}'"),
            Self::Cancelled => "cancelled".to_string(),
            Self::InvalidParameters(detail) => format!("invalid parameters: {detail}"),
        }
    }

    /// Audit classification of this error.
    #[must_use]
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            Self::ApprovalDenied { .. } => FailureKind::ApprovalDenied,
            Self::ApprovalExpired => FailureKind::ApprovalExpired,
            Self::PinInvalid => FailureKind::PinInvalid,
            Self::PinLockout => FailureKind::PinLockout,
            Self::SandboxViolation(_) => FailureKind::SandboxViolation,
            Self::ExecutionTimeout(_) => FailureKind::ExecutionTimeout,
            Self::ExecutionFailed(_) | Self::HttpStatus(_) => FailureKind::ExecutionFailed,
            Self::RateLimited(_) => FailureKind::RateLimited,
            Self::UnknownAction(_) => FailureKind::UnknownAction,
            Self::Cancelled => FailureKind::Cancelled,
            Self::InvalidParameters(_) => FailureKind::InvalidParameters,
        }
    }
}

/// Coarse failure category recorded in the audit log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Denied by a human, a missing handler, or cancellation before approval.
    ApprovalDenied,
    /// Approval window elapsed.
    ApprovalExpired,
    /// Wrong PIN.
    PinInvalid,
    /// PIN locked out.
    PinLockout,
    /// Refused by the sandbox.
    SandboxViolation,
    /// Timed out.
    ExecutionTimeout,
    /// Non-zero exit, transport failure, or error status.
    ExecutionFailed,
    /// Rate limited.
    RateLimited,
    /// No executor.
    UnknownAction,
    /// Cancelled while running.
    Cancelled,
    /// Parameter validation failed.
    InvalidParameters,
}

/// The `{output, isError}` pair produced by an execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionOutput {
    /// Sanitized output text.
    pub output: String,
    /// Whether the action failed.
    pub is_error: bool,
}

impl ActionOutput {
    /// A successful output.
    #[must_use]
    pub fn success(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            is_error: false,
        }
    }

    /// A failed output with a caller-safe message.
    #[must_use]
    pub fn error(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            is_error: true,
        }
    }
}

impl From<&ActionError> for ActionOutput {
    fn from(err: &ActionError) -> Self {
        Self::error(err.user_message())
    }
}

/// Final result of a `submit` call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionResult {
    /// The request this result belongs to.
    pub request_id: ActionId,
    /// Sanitized output.
    pub output: String,
    /// Whether the action failed or was refused.
    pub is_error: bool,
}

impl ActionResult {
    /// Attach an output to a request ID.
    #[must_use]
    pub fn new(request_id: ActionId, output: ActionOutput) -> Self {
        Self {
            request_id,
            output: output.output,
            is_error: output.is_error,
        }
    }
}
