//! Temporary hand-over of permissions from one user to another.
//!
//! Lifecycle: `pending` → `active` (accepted by the delegate) →
//! `revoked` (by the delegator). A delegation only takes effect while
//! active and inside `[start_date, end_date)`.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::json;
use tracing::{debug, info};
use uuid::Uuid;
use warden_core::error::{DomainError, WardenError, WardenResult};
use warden_core::models::delegation::{
    CreateDelegation, DelegationFilter, DelegationStatus, PermissionDelegation,
};
use warden_core::repository::{DelegationRepository, Store};

use crate::audit;
use crate::cache::DecisionCache;

/// Delegations received by `delegate_did` that are in effect at `now`.
pub(crate) async fn active_delegations<S: Store>(
    store: &S,
    org_id: Uuid,
    delegate_did: &str,
    now: DateTime<Utc>,
) -> WardenResult<Vec<PermissionDelegation>> {
    let delegations = store
        .delegations()
        .list_active_for_delegate(org_id, delegate_did)
        .await?;
    Ok(delegations
        .into_iter()
        .filter(|d| d.is_effective_at(now))
        .collect())
}

pub struct DelegationManager<S: Store> {
    store: S,
    cache: Arc<DecisionCache>,
}

impl<S: Store> DelegationManager<S> {
    pub fn new(store: S, cache: Arc<DecisionCache>) -> Self {
        Self { store, cache }
    }

    pub async fn delegate_permissions(
        &self,
        input: CreateDelegation,
    ) -> WardenResult<PermissionDelegation> {
        if input.permissions.is_empty() || input.permissions.iter().any(|p| p.trim().is_empty()) {
            return Err(WardenError::validation(
                "a delegation must name at least one permission",
            ));
        }
        if input.delegator_did == input.delegate_did {
            return Err(WardenError::validation("cannot delegate to oneself"));
        }
        if input.end_date <= input.start_date {
            return Err(WardenError::validation("end_date must be after start_date"));
        }
        if let Some(scope) = &input.resource_scope {
            if scope.resource_type.trim().is_empty() {
                return Err(WardenError::validation(
                    "resource scope needs a resource type",
                ));
            }
        }

        let delegation = self.store.delegations().create(input).await?;

        info!(
            org_id = %delegation.org_id,
            delegation_id = %delegation.id,
            delegator = %delegation.delegator_did,
            delegate = %delegation.delegate_did,
            "Delegation created"
        );
        audit::record(
            &self.store,
            delegation.org_id,
            &delegation.delegator_did,
            "delegation.create",
            Some(delegation.id.to_string()),
            json!({
                "delegate_did": delegation.delegate_did,
                "permissions": delegation.permissions,
                "start_date": delegation.start_date,
                "end_date": delegation.end_date,
            }),
        )
        .await;

        Ok(delegation)
    }

    /// Activate a pending delegation. Anyone but the delegate, and any
    /// delegation that is not pending, sees `DelegationNotFound`.
    pub async fn accept_delegation(
        &self,
        delegation_id: Uuid,
        delegate_did: &str,
    ) -> WardenResult<PermissionDelegation> {
        let delegation = self.load(delegation_id).await?;
        if delegation.delegate_did != delegate_did
            || delegation.status != DelegationStatus::Pending
        {
            return Err(DomainError::DelegationNotFound.into());
        }

        let accepted = self
            .store
            .delegations()
            .transition(
                delegation_id,
                DelegationStatus::Pending,
                DelegationStatus::Active,
            )
            .await?
            .ok_or(DomainError::DelegationNotFound)?;

        self.cache.invalidate_user(&accepted.delegate_did);
        info!(org_id = %accepted.org_id, %delegation_id, "Delegation accepted");
        audit::record(
            &self.store,
            accepted.org_id,
            delegate_did,
            "delegation.accept",
            Some(delegation_id.to_string()),
            json!({}),
        )
        .await;

        Ok(accepted)
    }

    /// Revoke a delegation. Only the delegator may revoke; revoking twice
    /// succeeds without touching the record again.
    pub async fn revoke_delegation(
        &self,
        delegation_id: Uuid,
        revoker_did: &str,
    ) -> WardenResult<PermissionDelegation> {
        let delegation = self.load(delegation_id).await?;
        if delegation.delegator_did != revoker_did {
            return Err(DomainError::NotDelegator.into());
        }
        if delegation.status == DelegationStatus::Revoked {
            debug!(%delegation_id, "Delegation already revoked");
            return Ok(delegation);
        }

        let revoked = match self
            .store
            .delegations()
            .transition(delegation_id, delegation.status, DelegationStatus::Revoked)
            .await?
        {
            Some(revoked) => revoked,
            // Accepted or revoked concurrently; retry from the fresh state.
            None => {
                let current = self.load(delegation_id).await?;
                if current.status == DelegationStatus::Revoked {
                    return Ok(current);
                }
                self.store
                    .delegations()
                    .transition(delegation_id, current.status, DelegationStatus::Revoked)
                    .await?
                    .ok_or(DomainError::DelegationNotFound)?
            }
        };

        self.cache.invalidate_user(&revoked.delegate_did);
        info!(org_id = %revoked.org_id, %delegation_id, "Delegation revoked");
        audit::record(
            &self.store,
            revoked.org_id,
            revoker_did,
            "delegation.revoke",
            Some(delegation_id.to_string()),
            json!({ "delegate_did": revoked.delegate_did }),
        )
        .await;

        Ok(revoked)
    }

    pub async fn get_delegations(
        &self,
        org_id: Uuid,
        did: &str,
        filter: DelegationFilter,
    ) -> WardenResult<Vec<PermissionDelegation>> {
        self.store.delegations().list(org_id, did, filter).await
    }

    pub async fn get_active_delegations(
        &self,
        org_id: Uuid,
        delegate_did: &str,
        now: DateTime<Utc>,
    ) -> WardenResult<Vec<PermissionDelegation>> {
        active_delegations(&self.store, org_id, delegate_did, now).await
    }

    async fn load(&self, delegation_id: Uuid) -> WardenResult<PermissionDelegation> {
        self.store
            .delegations()
            .get_by_id(delegation_id)
            .await
            .map_err(|e| match e {
                WardenError::NotFound { .. } => DomainError::DelegationNotFound.into(),
                other => other,
            })
    }
}
