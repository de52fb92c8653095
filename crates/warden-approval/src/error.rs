//! Approval error types.

use std::time::Duration;

use thiserror::Error;
use warden_core::{ActionError, ActionId};

/// Errors returned by the gate, the PIN verifier and the classifier builder.
#[derive(Debug, Error)]
pub enum ApprovalError {
    /// No pending request has this ID (never existed, or already resolved).
    #[error("no pending request {0}")]
    UnknownRequest(ActionId),

    /// A RED approval arrived without a PIN.
    #[error("this request requires a PIN")]
    PinRequired,

    /// The PIN did not match.
    #[error("invalid PIN ({remaining} attempts left before lockout)")]
    PinInvalid {
        /// Failures left before the lockout triggers.
        remaining: u32,
    },

    /// PIN verification is locked.
    #[error("PIN verification locked for another {retry_after:?}")]
    PinLockout {
        /// Time until the lockout lifts.
        retry_after: Duration,
    },

    /// No PIN credential is configured, so RED approvals are impossible.
    #[error("no PIN credential configured")]
    PinNotConfigured,

    /// The stored credential could not be decoded.
    #[error("invalid PIN credential: {0}")]
    InvalidCredential(String),

    /// Too many PIN submissions.
    #[error("too many PIN attempts")]
    RateLimited,

    /// A classifier pattern does not compile.
    #[error("invalid classifier pattern '{pattern}': {reason}")]
    InvalidPattern {
        /// The offending pattern.
        pattern: String,
        /// Compiler message.
        reason: String,
    },
}

impl ApprovalError {
    /// Map onto the caller-facing action taxonomy.
    #[must_use]
    pub fn to_action_error(&self) -> ActionError {
        match self {
            Self::PinLockout { .. } => ActionError::PinLockout,
            Self::RateLimited => ActionError::RateLimited("auth".to_string()),
            Self::UnknownRequest(_) => ActionError::ApprovalDenied {
                reason: self.to_string(),
            },
            _ => ActionError::PinInvalid,
        }
    }
}

/// Result type for approval operations.
pub type ApprovalResult<T> = Result<T, ApprovalError>;
