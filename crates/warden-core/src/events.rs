//! Outbound events for UI and notification collaborators.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::trace;

use crate::action::{ApprovalPrompt, RequestStatus};
use crate::ids::{ActionId, RequesterId};

/// Default channel capacity for the event bus.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// Something a frontend may want to render.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum GateEvent {
    /// A request is waiting for a human decision.
    ApprovalRequested(ApprovalPrompt),
    /// A pending request reached a terminal state.
    ApprovalResolved {
        /// The request.
        request_id: ActionId,
        /// Who submitted it.
        requester_id: RequesterId,
        /// Terminal status.
        status: RequestStatus,
        /// When it was resolved.
        resolved_at: DateTime<Utc>,
    },
    /// An execution finished.
    ExecutionCompleted {
        /// The request.
        request_id: ActionId,
        /// Who submitted it.
        requester_id: RequesterId,
        /// Sanitized output.
        output: String,
        /// Error flag.
        is_error: bool,
    },
}

impl GateEvent {
    /// Short label for logging.
    #[must_use]
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::ApprovalRequested(_) => "approval_requested",
            Self::ApprovalResolved { .. } => "approval_resolved",
            Self::ExecutionCompleted { .. } => "execution_completed",
        }
    }

    /// The request this event concerns.
    #[must_use]
    pub fn request_id(&self) -> ActionId {
        match self {
            Self::ApprovalRequested(prompt) => prompt.request_id,
            Self::ApprovalResolved { request_id, .. }
            | Self::ExecutionCompleted { request_id, .. } => *request_id,
        }
    }
}

/// Broadcasts [`GateEvent`]s to every subscriber.
///
/// Publishing never blocks and never fails; events published with no
/// subscribers are dropped.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<Arc<GateEvent>>,
}

impl EventBus {
    /// Create a bus with the default capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Create a bus with the given capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publish an event. Returns the number of receivers reached.
    pub fn publish(&self, event: GateEvent) -> usize {
        let event_type = event.event_type();
        match self.sender.send(Arc::new(event)) {
            Ok(count) => count,
            Err(_) => {
                trace!(event_type, "No receivers for event");
                0
            },
        }
    }

    /// Subscribe to all future events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<GateEvent>> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
