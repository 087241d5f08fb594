//! Permission engine: grants, inheritance edges and permission checks.
//!
//! A check resolves sources in a fixed order and stops at the first
//! match:
//!
//! 1. direct user grants
//! 2. grants of every role the user holds
//! 3. grants of every team the user belongs to
//! 4. the same three sources on parent resources reachable through
//!    inheritance edges that admit the permission
//! 5. active delegations received by the user
//!
//! Later sources are only loaded from the store when every earlier one
//! failed to match.

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::json;
use tracing::{debug, info, warn};
use uuid::Uuid;
use warden_core::error::{DomainError, WardenError, WardenResult};
use warden_core::models::grant::{
    BulkGrantItem, CreateGrant, GrantSource, GranteeType, PermissionGrant, PermissionQuery,
    ROLE_RESOURCE_TYPE, ResourcePermissions, SourcedGrant, UserPermissions,
};
use warden_core::models::inheritance::{CreateInheritance, PermissionInheritance, ResourceRef};
use warden_core::repository::{
    GrantRepository, InheritanceRepository, OrgMemberRepository, Store, TeamRepository,
};
use warden_core::response::ErrorBody;

use crate::audit;
use crate::cache::DecisionCache;
use crate::config::AuthzConfig;
use crate::delegation::active_delegations;
use crate::roles::roles_from;

pub struct PermissionEngine<S: Store> {
    store: S,
    cache: Arc<DecisionCache>,
    config: AuthzConfig,
}

impl<S: Store> PermissionEngine<S> {
    pub fn new(store: S, config: AuthzConfig) -> Self {
        let cache = Arc::new(DecisionCache::new(config.decision_cache_ttl()));
        Self::with_cache(store, cache, config)
    }

    /// Build an engine sharing `cache` with the other managers, so their
    /// writes invalidate the decisions this engine serves.
    pub fn with_cache(store: S, cache: Arc<DecisionCache>, config: AuthzConfig) -> Self {
        Self {
            store,
            cache,
            config,
        }
    }

    pub fn cache(&self) -> Arc<DecisionCache> {
        Arc::clone(&self.cache)
    }

    pub async fn grant_permission(&self, input: CreateGrant) -> WardenResult<PermissionGrant> {
        validate_grant(&input, Utc::now())?;

        let grant = self.store.grants().create(input).await.map_err(|e| match e {
            WardenError::AlreadyExists { .. } => DomainError::PermissionExists.into(),
            other => other,
        })?;

        self.invalidate_for(grant.grantee_type, &grant.grantee_id);
        info!(
            org_id = %grant.org_id,
            grant_id = %grant.id,
            grantee_type = %grant.grantee_type,
            grantee_id = %grant.grantee_id,
            permission = %grant.permission,
            "Permission granted"
        );
        audit::record(
            &self.store,
            grant.org_id,
            &grant.granted_by,
            "permission.grant",
            Some(grant.id.to_string()),
            json!({
                "grantee_type": grant.grantee_type,
                "grantee_id": grant.grantee_id,
                "resource_type": grant.resource_type,
                "resource_id": grant.resource_id,
                "permission": grant.permission,
            }),
        )
        .await;

        Ok(grant)
    }

    /// Delete a grant. An unknown id fails with `GrantNotFound` and has
    /// no side effects.
    pub async fn revoke_permission(&self, grant_id: Uuid, revoked_by: &str) -> WardenResult<()> {
        let grant = self
            .store
            .grants()
            .get_by_id(grant_id)
            .await
            .map_err(grant_not_found)?;
        self.store
            .grants()
            .delete(grant_id)
            .await
            .map_err(grant_not_found)?;

        self.invalidate_for(grant.grantee_type, &grant.grantee_id);
        info!(org_id = %grant.org_id, %grant_id, "Permission revoked");
        audit::record(
            &self.store,
            grant.org_id,
            revoked_by,
            "permission.revoke",
            Some(grant_id.to_string()),
            json!({
                "grantee_type": grant.grantee_type,
                "grantee_id": grant.grantee_id,
                "permission": grant.permission,
            }),
        )
        .await;

        Ok(())
    }

    pub async fn check_permission(&self, query: PermissionQuery) -> WardenResult<bool> {
        let key = DecisionCache::key(
            &query.user_did,
            query.org_id,
            &query.resource_type,
            query.resource_id.as_deref(),
            &query.permission,
        );
        if let Some(allowed) = self.cache.get(&key) {
            return Ok(allowed);
        }

        let resolved = self.resolve(&query, Utc::now()).await?;
        let allowed = resolved.is_some();
        debug!(
            user_did = %query.user_did,
            org_id = %query.org_id,
            resource_type = %query.resource_type,
            permission = %query.permission,
            allowed,
            "Permission check resolved"
        );
        self.cache.insert(key, allowed, resolved.flatten());
        Ok(allowed)
    }

    /// `Some(expiry)` when the query is allowed, carrying when the
    /// matching source ends.
    async fn resolve(
        &self,
        query: &PermissionQuery,
        now: DateTime<Utc>,
    ) -> WardenResult<Option<Expiry>> {
        let permission = query.permission.as_str();
        let mut subject = Subject::new(&self.store, query.org_id, &query.user_did, now);

        let target = ResourceRef::new(query.resource_type.clone(), query.resource_id.clone());
        if let Some(expiry) = subject.holds(&target, permission).await? {
            return Ok(Some(expiry));
        }

        let mut visited: HashSet<ResourceRef> = HashSet::from([target.clone()]);
        let mut frontier = vec![target];
        let mut depth = 0;
        while !frontier.is_empty() {
            if depth >= self.config.max_inheritance_depth {
                warn!(
                    org_id = %query.org_id,
                    resource_type = %query.resource_type,
                    depth,
                    "Inheritance depth limit reached, ignoring deeper parents"
                );
                break;
            }
            depth += 1;

            let mut next = Vec::new();
            for resource in &frontier {
                let edges = self
                    .store
                    .inheritance()
                    .list_parents(
                        query.org_id,
                        &resource.resource_type,
                        resource.resource_id.as_deref(),
                    )
                    .await?;
                for edge in edges.iter().filter(|e| e.allows(permission)) {
                    let parent = edge.parent();
                    if !visited.insert(parent.clone()) {
                        debug!(edge_id = %edge.id, "Parent already visited, skipping");
                        continue;
                    }
                    if let Some(expiry) = subject.holds(&parent, permission).await? {
                        return Ok(Some(expiry));
                    }
                    next.push(parent);
                }
            }
            frontier = next;
        }

        let delegations = active_delegations(&self.store, query.org_id, &query.user_did, now).await?;
        Ok(delegations
            .iter()
            .filter(|d| {
                visited
                    .iter()
                    .any(|r| d.grants(&r.resource_type, r.resource_id.as_deref(), permission))
            })
            .map(|d| Some(d.end_date))
            .reduce(later))
    }

    /// Live grants held by the user, tagged with where they come from,
    /// plus the delegations currently in effect for them.
    pub async fn get_user_permissions(
        &self,
        user_did: &str,
        org_id: Uuid,
    ) -> WardenResult<UserPermissions> {
        let now = Utc::now();
        let grants_repo = self.store.grants();

        let direct = grants_repo
            .list_for_grantee(org_id, GranteeType::User, user_did)
            .await?;
        let member = self.store.members().get(org_id, user_did).await?;
        let roles = roles_from(member.as_ref(), &direct, now);

        let mut grants: Vec<SourcedGrant> = direct
            .into_iter()
            .filter(|g| g.is_live_at(now))
            .map(|grant| SourcedGrant {
                grant,
                source: GrantSource::Direct,
            })
            .collect();

        for role in roles {
            let role_grants = grants_repo
                .list_for_grantee(org_id, GranteeType::Role, &role)
                .await?;
            grants.extend(
                role_grants
                    .into_iter()
                    .filter(|g| g.is_live_at(now))
                    .map(|grant| SourcedGrant {
                        grant,
                        source: GrantSource::Role(role.clone()),
                    }),
            );
        }

        for team_id in self.store.teams().list_member_team_ids(org_id, user_did).await? {
            let team_grants = grants_repo
                .list_for_grantee(org_id, GranteeType::Team, &team_id.to_string())
                .await?;
            grants.extend(
                team_grants
                    .into_iter()
                    .filter(|g| g.is_live_at(now))
                    .map(|grant| SourcedGrant {
                        grant,
                        source: GrantSource::Team(team_id),
                    }),
            );
        }

        let delegations = active_delegations(&self.store, org_id, user_did, now).await?;
        Ok(UserPermissions {
            grants,
            delegations,
        })
    }

    pub async fn get_resource_permissions(
        &self,
        org_id: Uuid,
        resource_type: &str,
        resource_id: Option<&str>,
    ) -> WardenResult<ResourcePermissions> {
        let now = Utc::now();
        let grants = self
            .store
            .grants()
            .list_for_resource(org_id, resource_type, resource_id)
            .await?
            .into_iter()
            .filter(|g| g.is_live_at(now) && g.covers_resource(resource_type, resource_id))
            .collect();
        let inherited_from = self
            .store
            .inheritance()
            .list_parents(org_id, resource_type, resource_id)
            .await?;

        Ok(ResourcePermissions {
            grants,
            inherited_from,
        })
    }

    /// Flattened permission names the user holds on a resource.
    ///
    /// Delegated permissions are included regardless of their scope.
    pub async fn get_effective_permissions(
        &self,
        user_did: &str,
        org_id: Uuid,
        resource_type: &str,
        resource_id: Option<&str>,
    ) -> WardenResult<Vec<String>> {
        let now = Utc::now();
        let mut subject = Subject::new(&self.store, org_id, user_did, now);
        let mut names = BTreeSet::new();

        let target = ResourceRef::new(resource_type, resource_id.map(str::to_string));
        subject.collect_names(&target, None, &mut names).await?;

        // Each frontier entry carries the intersection of the allow-lists
        // on its path; `None` means unrestricted.
        let mut visited: HashSet<ResourceRef> = HashSet::from([target.clone()]);
        let mut frontier: Vec<(ResourceRef, Option<BTreeSet<String>>)> = vec![(target, None)];
        let mut depth = 0;
        while !frontier.is_empty() && depth < self.config.max_inheritance_depth {
            depth += 1;
            let mut next = Vec::new();
            for (resource, allowed) in &frontier {
                let edges = self
                    .store
                    .inheritance()
                    .list_parents(
                        org_id,
                        &resource.resource_type,
                        resource.resource_id.as_deref(),
                    )
                    .await?;
                for edge in edges {
                    let parent = edge.parent();
                    if !visited.insert(parent.clone()) {
                        continue;
                    }
                    let narrowed = narrow(allowed.as_ref(), &edge);
                    subject
                        .collect_names(&parent, narrowed.as_ref(), &mut names)
                        .await?;
                    next.push((parent, narrowed));
                }
            }
            frontier = next;
        }

        for delegation in active_delegations(&self.store, org_id, user_did, now).await? {
            names.extend(delegation.permissions);
        }

        Ok(names.into_iter().collect())
    }

    /// Apply grants one by one. A failing grant is reported in its slot
    /// and does not roll back the grants before it.
    pub async fn bulk_grant(
        &self,
        grants: Vec<CreateGrant>,
        granted_by: &str,
    ) -> WardenResult<Vec<BulkGrantItem>> {
        let mut results = Vec::with_capacity(grants.len());
        for mut input in grants {
            input.granted_by = granted_by.to_string();
            let grantee_id = input.grantee_id.clone();
            let permission = input.permission.clone();

            let item = match self.grant_permission(input).await {
                Ok(grant) => BulkGrantItem {
                    grantee_id,
                    permission,
                    grant: Some(grant),
                    error: None,
                },
                Err(e) => match ErrorBody::from_error(&e) {
                    Some(body) => BulkGrantItem {
                        grantee_id,
                        permission,
                        grant: None,
                        error: Some(body),
                    },
                    None => return Err(e),
                },
            };
            results.push(item);
        }
        Ok(results)
    }

    /// Register a parent → child edge. Cycles are not rejected here;
    /// checks traverse with a visited set instead.
    pub async fn inherit_permissions(
        &self,
        input: CreateInheritance,
    ) -> WardenResult<PermissionInheritance> {
        if input.parent_resource_type.trim().is_empty() || input.child_resource_type.trim().is_empty()
        {
            return Err(WardenError::validation("resource types must not be empty"));
        }
        if input.parent_resource_type == input.child_resource_type
            && input.parent_resource_id == input.child_resource_id
        {
            return Err(WardenError::validation(
                "a resource cannot inherit from itself",
            ));
        }

        let org_id = input.org_id;
        let actor = input.created_by.clone();
        let edge = self.store.inheritance().create(input).await?;

        self.cache.clear();
        info!(%org_id, inheritance_id = %edge.id, "Inheritance edge created");
        audit::record(
            &self.store,
            org_id,
            &actor,
            "permission.inherit",
            Some(edge.id.to_string()),
            json!({
                "parent_resource_type": edge.parent_resource_type,
                "parent_resource_id": edge.parent_resource_id,
                "child_resource_type": edge.child_resource_type,
                "child_resource_id": edge.child_resource_id,
            }),
        )
        .await;

        Ok(edge)
    }

    pub async fn remove_inheritance(&self, inheritance_id: Uuid, removed_by: &str) -> WardenResult<()> {
        let edge = self.store.inheritance().get_by_id(inheritance_id).await?;
        self.store.inheritance().delete(inheritance_id).await?;

        self.cache.clear();
        info!(org_id = %edge.org_id, %inheritance_id, "Inheritance edge removed");
        audit::record(
            &self.store,
            edge.org_id,
            removed_by,
            "permission.uninherit",
            Some(inheritance_id.to_string()),
            json!({}),
        )
        .await;

        Ok(())
    }

    /// A user grant only changes that user's decisions. Role and team
    /// grants reach users the cache cannot enumerate.
    fn invalidate_for(&self, grantee_type: GranteeType, grantee_id: &str) {
        match grantee_type {
            GranteeType::User => self.cache.invalidate_user(grantee_id),
            GranteeType::Role | GranteeType::Team => self.cache.clear(),
        }
    }
}

fn validate_grant(input: &CreateGrant, now: DateTime<Utc>) -> WardenResult<()> {
    if input.grantee_id.trim().is_empty() {
        return Err(WardenError::validation("grantee_id must not be empty"));
    }
    if input.resource_type.trim().is_empty() {
        return Err(WardenError::validation("resource_type must not be empty"));
    }
    if input.permission.trim().is_empty() {
        return Err(WardenError::validation("permission must not be empty"));
    }
    if input.granted_by.trim().is_empty() {
        return Err(WardenError::validation("granted_by must not be empty"));
    }
    if input.expires_at.is_some_and(|at| at <= now) {
        return Err(WardenError::validation("expires_at must be in the future"));
    }
    Ok(())
}

fn grant_not_found(e: WardenError) -> WardenError {
    match e {
        WardenError::NotFound { .. } => DomainError::GrantNotFound.into(),
        other => other,
    }
}

/// Intersect the path's allow-list with the edge's.
fn narrow(
    path: Option<&BTreeSet<String>>,
    edge: &PermissionInheritance,
) -> Option<BTreeSet<String>> {
    match (path, &edge.inherit_permissions) {
        (None, None) => None,
        (Some(path), None) => Some(path.clone()),
        (None, Some(edge)) => Some(edge.iter().cloned().collect()),
        (Some(path), Some(edge)) => Some(
            edge.iter()
                .filter(|p| path.contains(*p))
                .cloned()
                .collect(),
        ),
    }
}

/// When an allow stops holding; `None` while its source never ends.
type Expiry = Option<DateTime<Utc>>;

fn later(a: Expiry, b: Expiry) -> Expiry {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.max(b)),
        _ => None,
    }
}

fn earlier(a: Expiry, b: Expiry) -> Expiry {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (Some(at), None) | (None, Some(at)) => Some(at),
        (None, None) => None,
    }
}

/// `Some` when a grant matches, with the longest-lived match's expiry.
fn matching_expiry(
    grants: &[PermissionGrant],
    resource: &ResourceRef,
    permission: &str,
    now: DateTime<Utc>,
) -> Option<Expiry> {
    grants
        .iter()
        .filter(|g| {
            g.matches(
                &resource.resource_type,
                resource.resource_id.as_deref(),
                permission,
                now,
            )
        })
        .map(|g| g.expires_at)
        .reduce(later)
}

/// The grants one user holds, loaded source by source on first use.
struct Subject<'a, S: Store> {
    store: &'a S,
    org_id: Uuid,
    user_did: &'a str,
    now: DateTime<Utc>,
    direct: Option<Vec<PermissionGrant>>,
    via_roles: Option<Vec<PermissionGrant>>,
    via_teams: Option<Vec<PermissionGrant>>,
    /// Earliest end of a custom role assignment.
    roles_expiry: Expiry,
}

impl<'a, S: Store> Subject<'a, S> {
    fn new(store: &'a S, org_id: Uuid, user_did: &'a str, now: DateTime<Utc>) -> Self {
        Self {
            store,
            org_id,
            user_did,
            now,
            direct: None,
            via_roles: None,
            via_teams: None,
            roles_expiry: None,
        }
    }

    async fn direct(&mut self) -> WardenResult<&[PermissionGrant]> {
        if self.direct.is_none() {
            let grants = self
                .store
                .grants()
                .list_for_grantee(self.org_id, GranteeType::User, self.user_did)
                .await?;
            self.direct = Some(grants);
        }
        Ok(self.direct.as_deref().unwrap_or_default())
    }

    async fn via_roles(&mut self) -> WardenResult<&[PermissionGrant]> {
        if self.via_roles.is_none() {
            let now = self.now;
            let member = self.store.members().get(self.org_id, self.user_did).await?;
            let (roles, roles_expiry) = {
                let direct = self.direct().await?;
                let expiry = direct
                    .iter()
                    .filter(|g| g.resource_type == ROLE_RESOURCE_TYPE && g.is_live_at(now))
                    .map(|g| g.expires_at)
                    .fold(None, earlier);
                (roles_from(member.as_ref(), direct, now), expiry)
            };
            self.roles_expiry = roles_expiry;
            let mut grants = Vec::new();
            for role in &roles {
                grants.extend(
                    self.store
                        .grants()
                        .list_for_grantee(self.org_id, GranteeType::Role, role)
                        .await?,
                );
            }
            self.via_roles = Some(grants);
        }
        Ok(self.via_roles.as_deref().unwrap_or_default())
    }

    async fn via_teams(&mut self) -> WardenResult<&[PermissionGrant]> {
        if self.via_teams.is_none() {
            let team_ids = self
                .store
                .teams()
                .list_member_team_ids(self.org_id, self.user_did)
                .await?;
            let mut grants = Vec::new();
            for team_id in team_ids {
                grants.extend(
                    self.store
                        .grants()
                        .list_for_grantee(self.org_id, GranteeType::Team, &team_id.to_string())
                        .await?,
                );
            }
            self.via_teams = Some(grants);
        }
        Ok(self.via_teams.as_deref().unwrap_or_default())
    }

    /// Whether a direct, role or team grant covers `resource`, and until
    /// when.
    async fn holds(
        &mut self,
        resource: &ResourceRef,
        permission: &str,
    ) -> WardenResult<Option<Expiry>> {
        let now = self.now;
        if let Some(expiry) = matching_expiry(self.direct().await?, resource, permission, now) {
            return Ok(Some(expiry));
        }
        if let Some(expiry) = matching_expiry(self.via_roles().await?, resource, permission, now) {
            return Ok(Some(earlier(expiry, self.roles_expiry)));
        }
        Ok(matching_expiry(self.via_teams().await?, resource, permission, now))
    }

    /// Add the names of every live grant covering `resource` that the
    /// allow-list admits.
    async fn collect_names(
        &mut self,
        resource: &ResourceRef,
        allowed: Option<&BTreeSet<String>>,
        names: &mut BTreeSet<String>,
    ) -> WardenResult<()> {
        let now = self.now;
        let admit = |g: &PermissionGrant| {
            g.is_live_at(now)
                && g.covers_resource(&resource.resource_type, resource.resource_id.as_deref())
                && allowed.is_none_or(|a| a.contains(&g.permission))
        };

        names.extend(
            self.direct()
                .await?
                .iter()
                .filter(|g| admit(g))
                .map(|g| g.permission.clone()),
        );
        names.extend(
            self.via_roles()
                .await?
                .iter()
                .filter(|g| admit(g))
                .map(|g| g.permission.clone()),
        );
        names.extend(
            self.via_teams()
                .await?
                .iter()
                .filter(|g| admit(g))
                .map(|g| g.permission.clone()),
        );
        Ok(())
    }
}
