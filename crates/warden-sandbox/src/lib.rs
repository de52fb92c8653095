//! Warden Sandbox - running approved plugins under containment.
//!
//! This crate provides:
//! - [`PluginExecutor`]: dispatches an approved request to its strategy and
//!   writes one audit entry per attempt
//! - [`HttpStrategy`]: outbound requests with SSRF and DNS-rebinding checks
//! - Shell and script strategies with a cleared environment, a vetted work
//!   directory, a timeout that kills the whole process group, and capped
//!   output
//! - [`Secrets`] and single-pass template rendering
//!
//! # Example
//!
//! ```
//! use warden_sandbox::net::is_safe_ip;
//!
//! assert!(!is_safe_ip("169.254.169.254".parse().unwrap()));
//! assert!(!is_safe_ip("::ffff:127.0.0.1".parse().unwrap()));
//! assert!(is_safe_ip("93.184.216.34".parse().unwrap()));
//! ```

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod error;
pub mod executor;
pub mod http;
pub mod net;
pub mod process;
pub mod quoting;
pub mod resolver;
pub mod script;
pub mod secrets;
pub mod shell;
pub mod template;

pub use error::{SandboxError, SandboxResult};
pub use executor::{DEFAULT_SCRIPT_INTERPRETER, ExecutorConfig, PluginExecutor};
pub use http::{HttpOutcome, HttpPolicy, HttpStrategy};
pub use process::{ProcessGroupGuard, ProcessOutput, run_contained, safe_work_dir};
pub use quoting::Quoting;
pub use resolver::{HostResolver, PinnedResolver, SystemResolver};
pub use secrets::Secrets;
pub use shell::{check_command_template, render_command, run_shell};
