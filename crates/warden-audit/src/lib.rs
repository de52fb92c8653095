//! Warden Audit - append-only record of every execution attempt.
//!
//! This crate provides:
//! - [`AuditLogEntry`]: timestamp, outcome, action kind, execution type and
//!   parameter *names* (values are never recorded)
//! - The [`AuditStorage`] trait with a JSON-lines file backend created with
//!   owner-only permissions, and an in-memory backend for tests
//! - [`AuditLog`], whose [`append`](AuditLog::append) never fails: a write
//!   error is reported on the diagnostic channel and counted, and the
//!   action being recorded carries on
//!
//! # Example
//!
//! ```
//! use warden_audit::{AuditLog, AuditLogEntry, AuditOutcome};
//!
//! let log = AuditLog::in_memory();
//! log.append(AuditLogEntry::new(
//!     AuditOutcome::Success,
//!     "read_file",
//!     "builtin",
//!     vec!["path".to_string()],
//! ));
//! assert_eq!(log.entries().unwrap().len(), 1);
//! ```

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

mod entry;
mod error;
mod log;
mod storage;

pub use entry::{AuditLogEntry, AuditOutcome};
pub use error::{AuditError, AuditResult};
pub use log::AuditLog;
pub use storage::{AuditStorage, FileAuditStorage, MemoryAuditStorage};

pub use warden_core::FailureKind;
