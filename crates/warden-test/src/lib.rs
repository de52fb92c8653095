//! Warden Test - shared test utilities.
//!
//! Mock approval handlers, a scripted DNS resolver, plugin definition
//! fixtures, and a harness that wires a [`warden_runtime::Dispatcher`] with
//! an in-memory audit log inside a temporary work directory.
//!
//! # Usage
//!
//! ```toml
//! [dev-dependencies]
//! warden-test.workspace = true
//! ```
//!
//! ```rust,ignore
//! use warden_test::{TestWarden, params, test_requester};
//! use warden_core::ActionKind;
//!
//! #[tokio::test]
//! async fn reads_are_green() {
//!     let warden = TestWarden::builder().build();
//!     let result = warden
//!         .dispatcher
//!         .submit(ActionKind::builtin("list_directory"), params(&[]), test_requester())
//!         .await;
//!     assert!(!result.is_error);
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

pub mod fixtures;
pub mod harness;
pub mod mocks;

pub use fixtures::*;
pub use harness::*;
pub use mocks::*;
