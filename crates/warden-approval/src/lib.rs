//! Warden Approval - deciding whether an action may run.
//!
//! This crate provides:
//! - [`TrustClassifier`]: maps actions to trust tiers
//! - [`PermissionGate`]: holds requests until a human decides, with expiry
//! - [`PinVerifier`]: PIN checks with consecutive-failure lockout
//! - [`RateLimiter`]: bounded sliding-window limits per category and identity
//!
//! # Example
//!
//! ```
//! use warden_approval::TrustClassifier;
//! use warden_core::{ActionKind, Parameters, TrustTier};
//!
//! let classifier = TrustClassifier::new();
//! let mut params = Parameters::new();
//! params.insert("command".into(), "rm -rf /".into());
//!
//! let verdict = classifier.classify(&ActionKind::builtin("bash"), &params, None);
//! assert_eq!(verdict.tier, TrustTier::Red);
//! assert!(verdict.requires_pin());
//! ```

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod classifier;
pub mod error;
pub mod gate;
pub mod pin;
pub mod rate_limit;

pub use classifier::TrustClassifier;
pub use error::{ApprovalError, ApprovalResult};
pub use gate::{ApprovalDecision, ApprovalHandler, DEFAULT_APPROVAL_TIMEOUT, PermissionGate};
pub use pin::{PinCredential, PinVerifier};
pub use rate_limit::{RateCategory, RateLimiter, RateLimiterConfig, RateWindow};
