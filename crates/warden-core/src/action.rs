//! Action requests and their approval state machine.
//!
//! An [`ActionRequest`] is created once per invocation attempt, classified
//! exactly once, and moves through `Pending -> {Approved, Denied, Expired}`.
//! Terminal states are final: a retried action is a brand-new request.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::ids::{ActionId, RequesterId};
use crate::plugin::ExecutionType;
use crate::tier::{Classification, ComputerBand, TrustTier};

/// Ordered mapping of parameter name to value.
///
/// Insertion order is preserved (declaration order for plugin parameters).
pub type Parameters = serde_json::Map<String, serde_json::Value>;

/// The logical operation an action request performs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ActionKind {
    /// A built-in tool such as `read_file` or `bash`.
    Builtin {
        /// Tool name.
        name: String,
    },
    /// A computer-input-device action (`screenshot`, `left_click`, ...).
    Computer {
        /// Sub-action name.
        action: String,
    },
    /// A user-installed plugin.
    Plugin {
        /// Plugin name.
        name: String,
        /// The plugin's declared execution type.
        execution: ExecutionType,
    },
}

impl ActionKind {
    /// Shorthand for a built-in tool kind.
    #[must_use]
    pub fn builtin(name: impl Into<String>) -> Self {
        Self::Builtin { name: name.into() }
    }

    /// Shorthand for a computer action kind.
    #[must_use]
    pub fn computer(action: impl Into<String>) -> Self {
        Self::Computer {
            action: action.into(),
        }
    }

    /// Shorthand for a plugin kind.
    #[must_use]
    pub fn plugin(name: impl Into<String>, execution: ExecutionType) -> Self {
        Self::Plugin {
            name: name.into(),
            execution,
        }
    }

    /// Execution type label recorded in the audit log.
    #[must_use]
    pub fn execution_label(&self) -> &'static str {
        match self {
            Self::Builtin { .. } => "builtin",
            Self::Computer { .. } => "computer",
            Self::Plugin { execution, .. } => execution.as_str(),
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Builtin { name } => f.write_str(name),
            Self::Computer { action } => write!(f, "computer:{action}"),
            Self::Plugin { name, execution } => write!(f, "plugin:{name}:{execution}"),
        }
    }
}

/// Approval status of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RequestStatus {
    /// Waiting for a human decision.
    Pending,
    /// Approved (explicitly, or automatically for tiers that need no approval).
    Approved,
    /// Denied, cancelled, or refused for lack of a handler.
    Denied,
    /// The approval window elapsed. Treated exactly like [`Self::Denied`].
    Expired,
}

impl RequestStatus {
    /// Whether this is a terminal state.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending)
    }

    /// Whether execution may proceed.
    #[must_use]
    pub fn is_approved(self) -> bool {
        matches!(self, Self::Approved)
    }

    /// Whether downstream code must treat this as a denial.
    #[must_use]
    pub fn is_denial(self) -> bool {
        matches!(self, Self::Denied | Self::Expired)
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Denied => "denied",
            Self::Expired => "expired",
        };
        f.write_str(label)
    }
}

/// One invocation attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionRequest {
    /// Unique request ID.
    pub id: ActionId,
    /// The agent or session that submitted the request.
    pub requester_id: RequesterId,
    /// What the request does.
    pub kind: ActionKind,
    /// Validated parameters.
    pub parameters: Parameters,
    /// When the request was created.
    pub created_at: DateTime<Utc>,
    /// Approval deadline, set when the request enters the pending table.
    pub expires_at: Option<DateTime<Utc>>,
    classification: Classification,
    status: RequestStatus,
}

impl ActionRequest {
    /// Create a request from its classification.
    ///
    /// Requests that need no approval start `Approved`; all others start
    /// `Pending`.
    #[must_use]
    pub fn new(
        requester_id: RequesterId,
        kind: ActionKind,
        parameters: Parameters,
        classification: Classification,
    ) -> Self {
        let status = if classification.requires_approval() {
            RequestStatus::Pending
        } else {
            RequestStatus::Approved
        };
        Self {
            id: ActionId::new(),
            requester_id,
            kind,
            parameters,
            created_at: Utc::now(),
            expires_at: None,
            classification,
            status,
        }
    }

    /// The tier assigned at creation. Immutable.
    #[must_use]
    pub fn tier(&self) -> TrustTier {
        self.classification.tier
    }

    /// Full classification assigned at creation.
    #[must_use]
    pub fn classification(&self) -> &Classification {
        &self.classification
    }

    /// Current status.
    #[must_use]
    pub fn status(&self) -> RequestStatus {
        self.status
    }

    /// Move a pending request into a terminal state.
    ///
    /// Returns `false` (and leaves the status untouched) if the request is
    /// already terminal or `next` is `Pending`.
    pub fn transition(&mut self, next: RequestStatus) -> bool {
        if self.status.is_terminal() || !next.is_terminal() {
            return false;
        }
        self.status = next;
        true
    }

    /// Names of the parameters, in order. Used for audit records.
    #[must_use]
    pub fn parameter_names(&self) -> Vec<String> {
        self.parameters.keys().cloned().collect()
    }

    /// Human-readable description shown in approval prompts.
    #[must_use]
    pub fn summary(&self) -> String {
        let param = |key: &str| {
            self.parameters
                .get(key)
                .and_then(serde_json::Value::as_str)
                .unwrap_or("?")
                .to_string()
        };
        match &self.kind {
            ActionKind::Builtin { name } => match name.as_str() {
                "bash" | "shell" => format!("Execute: {}", param("command")),
                "read_file" => format!("Read: {}", param("path")),
                "write_file" => format!("Write file: {}", param("path")),
                "list_directory" => format!("List directory: {}", param("path")),
                other => format!("Run tool '{other}'"),
            },
            ActionKind::Computer { action } => format!("Computer control: {action}"),
            ActionKind::Plugin { name, execution } => {
                format!("Run plugin '{name}' ({execution})")
            },
        }
    }
}

/// Snapshot of a pending request as presented to an approval frontend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalPrompt {
    /// Request being approved.
    pub request_id: ActionId,
    /// Who asked for it.
    pub requester_id: RequesterId,
    /// Assigned tier.
    pub tier: TrustTier,
    /// Computer band, if any.
    pub band: Option<ComputerBand>,
    /// Human-readable description of the action.
    pub description: String,
    /// Why the classifier chose this tier.
    pub reason: String,
    /// Raw parameters for inspection.
    pub parameters: Parameters,
    /// Whether the approval must carry a PIN.
    pub requires_pin: bool,
    /// Whether the prompt should be rendered with an elevated warning.
    pub elevated_warning: bool,
    /// Approval deadline.
    pub expires_at: DateTime<Utc>,
}

impl ApprovalPrompt {
    /// Build a prompt for `request` with the given deadline.
    #[must_use]
    pub fn for_request(request: &ActionRequest, expires_at: DateTime<Utc>) -> Self {
        let classification = request.classification();
        Self {
            request_id: request.id,
            requester_id: request.requester_id.clone(),
            tier: classification.tier,
            band: classification.band,
            description: request.summary(),
            reason: classification.reason.clone(),
            parameters: request.parameters.clone(),
            requires_pin: classification.requires_pin(),
            elevated_warning: classification.elevated_warning(),
            expires_at,
        }
    }
}
