//! Warden Runtime - the action dispatcher.
//!
//! This crate ties the gate and the sandbox together:
//! - [`Dispatcher`]: `submit`, `resolve_approval` and `cancel`
//! - [`PluginRegistry`]: installed plugin definitions and their creation policy
//! - [`Warden`]: builds everything from a [`warden_config::Config`]
//!
//! # Example
//!
//! ```no_run
//! use warden_config::Config;
//! use warden_core::{ActionKind, Parameters, RequesterId};
//! use warden_runtime::Warden;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::load()?;
//! warden_runtime::init_logging(&config)?;
//! let warden = Warden::from_config(&config)?;
//!
//! let mut params = Parameters::new();
//! params.insert("path".into(), "notes.txt".into());
//! let result = warden
//!     .dispatcher()
//!     .submit(ActionKind::builtin("read_file"), params, RequesterId::new("session-1"))
//!     .await;
//! println!("{} (error: {})", result.output, result.is_error);
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod bootstrap;
pub mod config_bridge;
pub mod dispatcher;
pub mod error;
pub mod registry;

pub use bootstrap::{Warden, init_logging};
pub use dispatcher::{ComputerController, Dispatcher};
pub use error::{RuntimeError, RuntimeResult};
pub use registry::PluginRegistry;
