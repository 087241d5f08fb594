//! Role resolution shared by permission checks and approver steps.
//!
//! A user holds the role recorded on their organization membership plus
//! every custom role assigned to them as a live user grant on
//! `(ROLE_RESOURCE_TYPE, <role id>)`.

use chrono::{DateTime, Utc};
use uuid::Uuid;
use warden_core::error::WardenResult;
use warden_core::models::grant::{GranteeType, PermissionGrant, ROLE_RESOURCE_TYPE};
use warden_core::models::membership::OrgMember;
use warden_core::repository::{GrantRepository, OrgMemberRepository, Store};

/// Roles derivable from an already loaded membership and user grant set.
pub(crate) fn roles_from(
    member: Option<&OrgMember>,
    user_grants: &[PermissionGrant],
    now: DateTime<Utc>,
) -> Vec<String> {
    let mut roles: Vec<String> = member.map(|m| m.role.clone()).into_iter().collect();
    for grant in user_grants {
        if grant.resource_type != ROLE_RESOURCE_TYPE || !grant.is_live_at(now) {
            continue;
        }
        match &grant.resource_id {
            Some(role) if !roles.contains(role) => roles.push(role.clone()),
            _ => {}
        }
    }
    roles
}

pub(crate) async fn user_roles<S: Store>(
    store: &S,
    org_id: Uuid,
    user_did: &str,
    now: DateTime<Utc>,
) -> WardenResult<Vec<String>> {
    let member = store.members().get(org_id, user_did).await?;
    let grants = store
        .grants()
        .list_for_grantee(org_id, GranteeType::User, user_did)
        .await?;
    Ok(roles_from(member.as_ref(), &grants, now))
}
