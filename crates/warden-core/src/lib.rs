//! Warden Core - shared types for the permission gate and plugin sandbox.
//!
//! This crate provides:
//! - Identifiers for action requests and the agents that submit them
//! - The trust tier model ([`TrustTier`], [`ComputerBand`], [`Classification`])
//! - [`ActionRequest`] and its approval state machine
//! - [`PluginDefinition`] with its tagged [`ExecutionSpec`]
//! - [`SandboxPolicy`] containment settings
//! - The [`ActionError`] taxonomy and the [`ActionOutput`] returned to callers
//! - Outbound [`GateEvent`]s and the broadcast [`EventBus`]
//!
//! # Example
//!
//! ```
//! use warden_core::{ActionKind, ActionRequest, Classification, Parameters, RequesterId, TrustTier};
//!
//! let mut params = Parameters::new();
//! params.insert("path".into(), "notes.txt".into());
//!
//! let request = ActionRequest::new(
//!     RequesterId::new("session-1"),
//!     ActionKind::builtin("read_file"),
//!     params,
//!     Classification::new(TrustTier::Green, "read-only tool"),
//! );
//! assert!(request.status().is_approved());
//! ```

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod action;
pub mod env_policy;
pub mod error;
pub mod events;
pub mod ids;
pub mod plugin;
pub mod policy;
pub mod tier;
pub mod truncate;

pub use action::{ActionKind, ActionRequest, ApprovalPrompt, Parameters, RequestStatus};
pub use error::{ActionError, ActionOutput, ActionResult, FailureKind};
pub use events::{EventBus, GateEvent};
pub use ids::{ActionId, RequesterId};
pub use plugin::{
    DefinitionOrigin, ExecutionSpec, ExecutionType, HttpMethod, ParamSpec, ParamType,
    ParameterError, PluginDefinition,
};
pub use policy::{HARD_TIMEOUT_CEILING, SandboxPolicy};
pub use tier::{Classification, ComputerBand, TrustTier};
