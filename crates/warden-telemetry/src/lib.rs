//! Warden Telemetry - logging setup for the permission gate.
//!
//! This crate provides:
//! - Configurable logging with pretty, compact, full and JSON formats
//! - Output to stdout, stderr, or a daily-rolling file
//! - Per-target filter directives on top of a base level
//!
//! Diagnostic detail that must never reach callers (raw transport errors,
//! rejected addresses) is emitted on the `warden::diagnostic` target, so it
//! can be routed or silenced with a directive like `warden::diagnostic=off`.
//!
//! # Example
//!
//! ```rust,no_run
//! use warden_telemetry::{LogConfig, LogFormat, setup_logging};
//!
//! # fn main() -> Result<(), warden_telemetry::TelemetryError> {
//! let config = LogConfig::new("debug")
//!     .with_format(LogFormat::Pretty)
//!     .with_directive("warden_sandbox=trace");
//!
//! setup_logging(&config)?;
//! tracing::info!("Gate ready");
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

mod error;
mod logging;

pub use error::{TelemetryError, TelemetryResult};
pub use logging::{LogConfig, LogFormat, LogTarget, setup_default_logging, setup_logging};
