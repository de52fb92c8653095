//! Audit entry types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use warden_core::{ActionId, ActionRequest, FailureKind, RequesterId, TrustTier};

/// Whether the audited attempt succeeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditOutcome {
    /// The action ran and reported success.
    Success,
    /// The action was refused, expired, or failed.
    Failure,
}

/// A single audit record.
///
/// Only parameter names are stored. Values may contain secrets and the audit
/// file is less tightly held than the operator configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditLogEntry {
    /// When the entry was written.
    pub timestamp_utc: DateTime<Utc>,
    /// Success or failure.
    pub outcome: AuditOutcome,
    /// Logical action (`bash`, `computer:left_click`, `plugin:weather:http`).
    pub action_kind: String,
    /// Execution strategy label (`builtin`, `computer`, `http`, `bash`, `script`).
    pub execution_type: String,
    /// Names of the parameters supplied, in order.
    pub parameter_names: Vec<String>,
    /// Request this entry belongs to, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<ActionId>,
    /// Who submitted the request, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requester_id: Option<RequesterId>,
    /// Tier assigned by the classifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tier: Option<TrustTier>,
    /// Failure category for failed attempts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureKind>,
}

impl AuditLogEntry {
    /// Create an entry with the minimum required fields.
    #[must_use]
    pub fn new(
        outcome: AuditOutcome,
        action_kind: impl Into<String>,
        execution_type: impl Into<String>,
        parameter_names: Vec<String>,
    ) -> Self {
        Self {
            timestamp_utc: Utc::now(),
            outcome,
            action_kind: action_kind.into(),
            execution_type: execution_type.into(),
            parameter_names,
            request_id: None,
            requester_id: None,
            tier: None,
            failure: None,
        }
    }

    /// Successful attempt for `request`.
    #[must_use]
    pub fn success(request: &ActionRequest) -> Self {
        Self::for_request(request, AuditOutcome::Success)
    }

    /// Failed attempt for `request`.
    #[must_use]
    pub fn failure(request: &ActionRequest, kind: FailureKind) -> Self {
        let mut entry = Self::for_request(request, AuditOutcome::Failure);
        entry.failure = Some(kind);
        entry
    }

    fn for_request(request: &ActionRequest, outcome: AuditOutcome) -> Self {
        let mut entry = Self::new(
            outcome,
            request.kind.to_string(),
            request.kind.execution_label(),
            request.parameter_names(),
        );
        entry.request_id = Some(request.id);
        entry.requester_id = Some(request.requester_id.clone());
        entry.tier = Some(request.tier());
        entry
    }

    /// Whether this entry records a success.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.outcome == AuditOutcome::Success
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use warden_core::{ActionKind, Classification, Parameters};

    fn request() -> ActionRequest {
        let mut params = Parameters::new();
        params.insert("api_key".into(), "sk-live-123456".into());
        params.insert("city".into(), "Oslo".into());
        ActionRequest::new(
            RequesterId::new("session-7"),
            ActionKind::plugin("weather", warden_core::ExecutionType::Http),
            params,
            Classification::new(TrustTier::Yellow, "plugin"),
        )
    }

    #[test]
    fn entry_records_names_not_values() {
        let entry = AuditLogEntry::failure(&request(), FailureKind::SandboxViolation);
        let json = serde_json::to_string(&entry).unwrap();
        assert!(json.contains("api_key"));
        assert!(json.contains("city"));
        assert!(!json.contains("sk-live-123456"));
        assert!(!json.contains("Oslo"));
        assert_eq!(entry.execution_type, "http");
        assert_eq!(entry.action_kind, "plugin:weather:http");
        assert_eq!(entry.failure, Some(FailureKind::SandboxViolation));
    }

    #[test]
    fn success_has_no_failure_kind() {
        let entry = AuditLogEntry::success(&request());
        assert!(entry.is_success());
        assert!(entry.failure.is_none());
        let json = serde_json::to_string(&entry).unwrap();
        assert!(!json.contains("failure\""));
    }
}
