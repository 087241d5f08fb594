//! Best-effort audit trail for write operations.

use serde_json::Value;
use tracing::warn;
use uuid::Uuid;
use warden_core::models::audit::{AuditOutcome, CreateAuditLogEntry};
use warden_core::repository::{AuditLogRepository, Store};

/// Append an audit entry. Failures are logged and swallowed; they never
/// fail the operation being audited.
pub(crate) async fn record<S: Store>(
    store: &S,
    org_id: Uuid,
    actor_did: &str,
    action: &str,
    target: Option<String>,
    metadata: Value,
) {
    let entry = CreateAuditLogEntry {
        org_id,
        actor_did: actor_did.to_string(),
        action: action.to_string(),
        target,
        outcome: AuditOutcome::Success,
        metadata: Some(metadata),
    };
    if let Err(e) = store.audit().append(entry).await {
        warn!(%org_id, action, error = %e, "Failed to write audit log entry");
    }
}
