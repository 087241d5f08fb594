//! Approval lifecycle events.
//!
//! The workflow manager publishes an [`ApprovalEvent`] on every request
//! transition. Delivery (push, email, websocket) belongs to whoever
//! subscribes; publishing never blocks and never fails the transition.

use serde::Serialize;
use tokio::sync::broadcast;
use tracing::trace;
use uuid::Uuid;
use warden_core::models::approval::RequestStatus;
use warden_core::models::workflow::ApproverStep;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ApprovalEvent {
    ApprovalRequested {
        request_id: Uuid,
        org_id: Uuid,
        workflow_id: Uuid,
        requester_did: String,
        resource_type: String,
        resource_id: Option<String>,
        action: String,
        /// Who may act on step 0.
        approvers: ApproverStep,
    },
    ApprovalNextStep {
        request_id: Uuid,
        org_id: Uuid,
        step: u32,
        approvers: ApproverStep,
    },
    ApprovalApproved {
        request_id: Uuid,
        org_id: Uuid,
        requester_did: String,
    },
    ApprovalRejected {
        request_id: Uuid,
        org_id: Uuid,
        requester_did: String,
        rejected_by: String,
        comment: Option<String>,
    },
    ApprovalTimeout {
        request_id: Uuid,
        org_id: Uuid,
        requester_did: String,
        status: RequestStatus,
    },
}

impl ApprovalEvent {
    pub fn request_id(&self) -> Uuid {
        match self {
            ApprovalEvent::ApprovalRequested { request_id, .. }
            | ApprovalEvent::ApprovalNextStep { request_id, .. }
            | ApprovalEvent::ApprovalApproved { request_id, .. }
            | ApprovalEvent::ApprovalRejected { request_id, .. }
            | ApprovalEvent::ApprovalTimeout { request_id, .. } => *request_id,
        }
    }

    /// Wire name, e.g. `approval-next-step`.
    pub fn name(&self) -> &'static str {
        match self {
            ApprovalEvent::ApprovalRequested { .. } => "approval-requested",
            ApprovalEvent::ApprovalNextStep { .. } => "approval-next-step",
            ApprovalEvent::ApprovalApproved { .. } => "approval-approved",
            ApprovalEvent::ApprovalRejected { .. } => "approval-rejected",
            ApprovalEvent::ApprovalTimeout { .. } => "approval-timeout",
        }
    }
}

/// Destination for approval events.
pub trait ApprovalEventSink: Send + Sync + 'static {
    fn publish(&self, event: ApprovalEvent);
}

/// Fans events out to any number of subscribers over a tokio broadcast
/// channel. Events published with no subscriber are dropped; slow
/// subscribers observe `RecvError::Lagged`.
#[derive(Debug, Clone)]
pub struct BroadcastEventSink {
    tx: broadcast::Sender<ApprovalEvent>,
}

impl BroadcastEventSink {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ApprovalEvent> {
        self.tx.subscribe()
    }
}

impl ApprovalEventSink for BroadcastEventSink {
    fn publish(&self, event: ApprovalEvent) {
        let name = event.name();
        if self.tx.send(event).is_err() {
            trace!(event = name, "No subscribers for approval event");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_serialize_with_kebab_case_tag() {
        let event = ApprovalEvent::ApprovalNextStep {
            request_id: Uuid::nil(),
            org_id: Uuid::nil(),
            step: 1,
            approvers: ApproverStep::Role("finance".into()),
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "approval-next-step");
        assert_eq!(value["step"], 1);
        assert_eq!(event.name(), "approval-next-step");
    }

    #[tokio::test]
    async fn subscribers_receive_published_events() {
        let sink = BroadcastEventSink::new(8);
        let mut rx = sink.subscribe();
        let event = ApprovalEvent::ApprovalApproved {
            request_id: Uuid::new_v4(),
            org_id: Uuid::new_v4(),
            requester_did: "did:example:a".into(),
        };

        sink.publish(event.clone());
        assert_eq!(rx.recv().await.unwrap(), event);
    }

    #[test]
    fn publishing_without_subscribers_is_harmless() {
        let sink = BroadcastEventSink::new(1);
        sink.publish(ApprovalEvent::ApprovalApproved {
            request_id: Uuid::nil(),
            org_id: Uuid::nil(),
            requester_did: "did:example:a".into(),
        });
    }
}
