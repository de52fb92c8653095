//! The permission gate.
//!
//! The [`PermissionGate`] owns the pending-approval table and coordinates
//! between:
//! - [`ApprovalHandler`] frontends that show prompts to a human
//! - The [`PinVerifier`] for RED approvals
//! - The optional [`RateLimiter`] throttling PIN submissions
//!
//! # Approval Flow
//!
//! 1. Requests that need no approval return [`ApprovalDecision::Approved`]
//! 2. With no available handler the request is denied (fail-closed)
//! 3. Otherwise the request enters the pending table and the handler gets
//!    an [`ApprovalPrompt`]
//! 4. [`PermissionGate::resolve_approval`] or [`PermissionGate::cancel`]
//!    completes it, or the deadline passes and it expires
//!
//! Exactly one of those outcomes wins: every path removes the entry from the
//! table under the same lock before delivering a decision.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{RwLock, oneshot};
use tokio::time::Instant;
use tracing::{debug, info, warn};
use warden_core::{
    ActionError, ActionId, ActionRequest, ApprovalPrompt, EventBus, GateEvent, RequestStatus,
    RequesterId,
};

use crate::error::{ApprovalError, ApprovalResult};
use crate::pin::PinVerifier;
use crate::rate_limit::{RateCategory, RateLimiter};

/// Default approval timeout (5 minutes).
pub const DEFAULT_APPROVAL_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// A frontend that shows approval prompts to a human.
///
/// `present` delivers the prompt; the human's answer comes back through
/// [`PermissionGate::resolve_approval`].
///
/// # Example
///
/// ```rust,ignore
/// use warden_approval::ApprovalHandler;
/// use warden_core::ApprovalPrompt;
///
/// struct TerminalHandler;
///
/// #[async_trait::async_trait]
/// impl ApprovalHandler for TerminalHandler {
///     async fn present(&self, prompt: ApprovalPrompt) {
///         println!("approve {}? {}", prompt.request_id, prompt.description);
///     }
///
///     fn is_available(&self) -> bool {
///         true
///     }
/// }
/// ```
#[async_trait]
pub trait ApprovalHandler: Send + Sync {
    /// Show a prompt.
    async fn present(&self, prompt: ApprovalPrompt);

    /// Whether the frontend is connected and able to show prompts.
    fn is_available(&self) -> bool;
}

/// How a pending request ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApprovalDecision {
    /// Execution may proceed.
    Approved,
    /// Denied, cancelled, or refused for lack of a handler.
    Denied {
        /// Why.
        reason: String,
    },
    /// Nobody answered before the deadline.
    Expired,
}

impl ApprovalDecision {
    fn denied(reason: impl Into<String>) -> Self {
        Self::Denied {
            reason: reason.into(),
        }
    }

    /// Whether execution may proceed.
    #[must_use]
    pub fn is_approved(&self) -> bool {
        matches!(self, Self::Approved)
    }

    /// The terminal request status for this decision.
    #[must_use]
    pub fn status(&self) -> RequestStatus {
        match self {
            Self::Approved => RequestStatus::Approved,
            Self::Denied { .. } => RequestStatus::Denied,
            Self::Expired => RequestStatus::Expired,
        }
    }

    /// The caller-facing error for a non-approval, `None` when approved.
    #[must_use]
    pub fn to_action_error(&self) -> Option<ActionError> {
        match self {
            Self::Approved => None,
            Self::Denied { reason } if reason == CANCELLED => Some(ActionError::Cancelled),
            Self::Denied { reason } => Some(ActionError::ApprovalDenied {
                reason: reason.clone(),
            }),
            Self::Expired => Some(ActionError::ApprovalExpired),
        }
    }
}

const CANCELLED: &str = "cancelled";

struct PendingEntry {
    requester_id: RequesterId,
    requires_pin: bool,
    sender: oneshot::Sender<ApprovalDecision>,
}

/// Removes a request from the pending table when its waiter goes away,
/// so a dropped caller cannot be approved after the fact.
struct PendingGuard<'a> {
    gate: &'a PermissionGate,
    id: ActionId,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        if self.gate.lock_pending().remove(&self.id).is_some() {
            debug!(request_id = %self.id, "Pending approval abandoned by its caller");
        }
    }
}

/// Holds pending requests until a human decides, they are cancelled, or
/// they expire.
pub struct PermissionGate {
    timeout: Duration,
    pending: Mutex<HashMap<ActionId, PendingEntry>>,
    handlers: RwLock<HashMap<RequesterId, Arc<dyn ApprovalHandler>>>,
    default_handler: RwLock<Option<Arc<dyn ApprovalHandler>>>,
    pin: PinVerifier,
    limiter: Option<Arc<RateLimiter>>,
    events: EventBus,
}

impl std::fmt::Debug for PermissionGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PermissionGate")
            .field("timeout", &self.timeout)
            .field("pending", &self.pending_count())
            .field("pin", &self.pin)
            .finish_non_exhaustive()
    }
}

impl PermissionGate {
    /// Create a gate with the default timeout and no PIN rate limiting.
    #[must_use]
    pub fn new(pin: PinVerifier, events: EventBus) -> Self {
        Self {
            timeout: DEFAULT_APPROVAL_TIMEOUT,
            pending: Mutex::new(HashMap::new()),
            handlers: RwLock::new(HashMap::new()),
            default_handler: RwLock::new(None),
            pin,
            limiter: None,
            events,
        }
    }

    /// Set the approval timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Throttle PIN submissions through `limiter`.
    #[must_use]
    pub fn with_rate_limiter(mut self, limiter: Arc<RateLimiter>) -> Self {
        self.limiter = Some(limiter);
        self
    }

    /// The approval timeout.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// The PIN verifier.
    #[must_use]
    pub fn pin_verifier(&self) -> &PinVerifier {
        &self.pin
    }

    /// Register the handler that receives prompts for one requester.
    pub async fn register_handler(
        &self,
        requester_id: RequesterId,
        handler: Arc<dyn ApprovalHandler>,
    ) {
        self.handlers.write().await.insert(requester_id, handler);
    }

    /// Remove a requester's handler.
    pub async fn unregister_handler(&self, requester_id: &RequesterId) {
        self.handlers.write().await.remove(requester_id);
    }

    /// Set the handler used when a requester has none of its own.
    pub async fn set_default_handler(&self, handler: Arc<dyn ApprovalHandler>) {
        *self.default_handler.write().await = Some(handler);
    }

    /// Number of requests awaiting a decision.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.lock_pending().len()
    }

    /// Whether `id` is awaiting a decision.
    #[must_use]
    pub fn is_pending(&self, id: ActionId) -> bool {
        self.lock_pending().contains_key(&id)
    }

    /// Obtain a decision for `request`, moving it into a terminal state.
    ///
    /// Never fails: every problem (no handler, timeout, closed channel)
    /// becomes a denial or expiry.
    pub async fn request_approval(&self, request: &mut ActionRequest) -> ApprovalDecision {
        match request.status() {
            RequestStatus::Approved => return ApprovalDecision::Approved,
            RequestStatus::Denied | RequestStatus::Expired => {
                return ApprovalDecision::denied("request already resolved");
            },
            RequestStatus::Pending => {},
        }

        let Some(handler) = self
            .handler_for(&request.requester_id)
            .await
            .filter(|h| h.is_available())
        else {
            warn!(
                request_id = %request.id,
                requester_id = %request.requester_id,
                "No approval handler available, denying"
            );
            let decision = ApprovalDecision::denied("no approval handler available");
            self.finish(request, &decision);
            return decision;
        };

        let now = Utc::now();
        let expires_at = chrono::Duration::from_std(self.timeout)
            .ok()
            .and_then(|d| now.checked_add_signed(d))
            .unwrap_or(now);
        request.expires_at = Some(expires_at);
        let prompt = ApprovalPrompt::for_request(request, expires_at);

        let (sender, mut receiver) = oneshot::channel();
        self.lock_pending().insert(
            request.id,
            PendingEntry {
                requester_id: request.requester_id.clone(),
                requires_pin: prompt.requires_pin,
                sender,
            },
        );
        let _pending = PendingGuard {
            gate: self,
            id: request.id,
        };
        info!(
            request_id = %request.id,
            requester_id = %request.requester_id,
            tier = %prompt.tier,
            "Awaiting approval"
        );
        self.events
            .publish(GateEvent::ApprovalRequested(prompt.clone()));

        let started = Instant::now();
        let deadline = started.checked_add(self.timeout).unwrap_or(started);
        let waited = tokio::time::timeout_at(deadline, async {
            handler.present(prompt).await;
            (&mut receiver).await
        })
        .await;

        let decision = match waited {
            Ok(Ok(decision)) => decision,
            Ok(Err(_)) => ApprovalDecision::denied("approval channel closed"),
            Err(_) => {
                let expired = self.lock_pending().remove(&request.id).is_some();
                if expired {
                    ApprovalDecision::Expired
                } else {
                    // Resolved between the deadline firing and taking the lock.
                    receiver
                        .try_recv()
                        .unwrap_or_else(|_| ApprovalDecision::denied("approval channel closed"))
                }
            },
        };

        self.finish(request, &decision);
        decision
    }

    /// Apply a human decision to a pending request.
    ///
    /// Denials always succeed. Approving a RED request needs the correct
    /// PIN; a rejected PIN leaves the request pending.
    ///
    /// # Errors
    ///
    /// - [`ApprovalError::UnknownRequest`] if `id` is not pending
    /// - [`ApprovalError::PinRequired`] if a RED approval carries no PIN
    /// - [`ApprovalError::RateLimited`] if PIN submissions are throttled
    /// - PIN verifier errors ([`ApprovalError::PinInvalid`],
    ///   [`ApprovalError::PinLockout`], [`ApprovalError::PinNotConfigured`])
    pub fn resolve_approval(
        &self,
        id: ActionId,
        approved: bool,
        pin: Option<&str>,
    ) -> ApprovalResult<RequestStatus> {
        let requester_id = {
            let mut pending = self.lock_pending();
            let Some(entry) = pending.get(&id) else {
                return Err(ApprovalError::UnknownRequest(id));
            };

            if !approved || !entry.requires_pin {
                let decision = if approved {
                    ApprovalDecision::Approved
                } else {
                    ApprovalDecision::denied("denied by user")
                };
                let status = decision.status();
                if let Some(entry) = pending.remove(&id) {
                    let _ = entry.sender.send(decision);
                }
                debug!(request_id = %id, %status, "Approval resolved");
                return Ok(status);
            }
            entry.requester_id.clone()
        };

        let Some(pin) = pin else {
            return Err(ApprovalError::PinRequired);
        };
        if let Some(limiter) = &self.limiter
            && !limiter.allow(RateCategory::Auth, requester_id.as_str())
        {
            return Err(ApprovalError::RateLimited);
        }
        if let Err(e) = self.pin.verify(pin) {
            warn!(request_id = %id, error = %e, "PIN rejected");
            return Err(e);
        }

        let entry = self
            .lock_pending()
            .remove(&id)
            .ok_or(ApprovalError::UnknownRequest(id))?;
        let _ = entry.sender.send(ApprovalDecision::Approved);
        debug!(request_id = %id, "Approval resolved with PIN");
        Ok(RequestStatus::Approved)
    }

    /// Deny a pending request as cancelled. Returns whether it was pending.
    pub fn cancel(&self, id: ActionId) -> bool {
        let Some(entry) = self.lock_pending().remove(&id) else {
            return false;
        };
        let _ = entry.sender.send(ApprovalDecision::denied(CANCELLED));
        info!(request_id = %id, "Pending approval cancelled");
        true
    }

    async fn handler_for(&self, requester_id: &RequesterId) -> Option<Arc<dyn ApprovalHandler>> {
        if let Some(handler) = self.handlers.read().await.get(requester_id) {
            return Some(Arc::clone(handler));
        }
        self.default_handler.read().await.clone()
    }

    fn finish(&self, request: &mut ActionRequest, decision: &ApprovalDecision) {
        let status = decision.status();
        if !request.transition(status) {
            return;
        }
        match decision {
            ApprovalDecision::Approved => {
                info!(request_id = %request.id, "Request approved");
            },
            ApprovalDecision::Denied { reason } => {
                info!(request_id = %request.id, %reason, "Request denied");
            },
            ApprovalDecision::Expired => {
                info!(request_id = %request.id, "Request expired without a decision");
            },
        }
        self.events.publish(GateEvent::ApprovalResolved {
            request_id: request.id,
            requester_id: request.requester_id.clone(),
            status,
            resolved_at: Utc::now(),
        });
    }

    fn lock_pending(&self) -> MutexGuard<'_, HashMap<ActionId, PendingEntry>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
