//! Integration tests for the permission engine using in-memory SurrealDB.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::{Duration, Utc};
use surrealdb::Surreal;
use surrealdb::engine::local::{Db, Mem};
use uuid::Uuid;
use warden_authz::{AuthzConfig, DelegationManager, PermissionEngine};
use warden_core::error::{DomainError, WardenError, WardenResult};
use warden_core::models::delegation::{CreateDelegation, ResourceScope};
use warden_core::models::grant::{
    CreateGrant, GrantSource, GranteeType, PermissionGrant, PermissionQuery, ROLE_RESOURCE_TYPE,
};
use warden_core::models::inheritance::CreateInheritance;
use warden_core::models::team::{AddTeamMember, CreateTeam, TeamRole};
use warden_core::repository::{GrantRepository, OrgMemberRepository, Store, TeamRepository};
use warden_db::SurrealStore;

async fn store() -> SurrealStore<Db> {
    let db = Surreal::new::<Mem>(()).await.unwrap();
    db.use_ns("test").use_db("test").await.unwrap();
    warden_db::run_migrations(&db).await.unwrap();
    SurrealStore::new(db)
}

fn grant(
    org_id: Uuid,
    grantee_type: GranteeType,
    grantee_id: &str,
    resource: (&str, Option<&str>),
    permission: &str,
) -> CreateGrant {
    CreateGrant {
        org_id,
        grantee_type,
        grantee_id: grantee_id.into(),
        resource_type: resource.0.into(),
        resource_id: resource.1.map(Into::into),
        permission: permission.into(),
        conditions: None,
        granted_by: "did:example:admin".into(),
        expires_at: None,
    }
}

fn edge(
    org_id: Uuid,
    parent: (&str, Option<&str>),
    child: (&str, Option<&str>),
    allowed: Option<Vec<&str>>,
) -> CreateInheritance {
    CreateInheritance {
        org_id,
        parent_resource_type: parent.0.into(),
        parent_resource_id: parent.1.map(Into::into),
        child_resource_type: child.0.into(),
        child_resource_id: child.1.map(Into::into),
        inherit_permissions: allowed.map(|a| a.into_iter().map(String::from).collect()),
        created_by: "did:example:admin".into(),
    }
}

fn query(org_id: Uuid, did: &str, resource: (&str, Option<&str>), permission: &str) -> PermissionQuery {
    PermissionQuery::new(did, org_id, resource.0, resource.1, permission)
}

const ALICE: &str = "did:example:alice";
const BOB: &str = "did:example:bob";

// ---------------------------------------------------------------------------
// Spy store counting role grant lookups
// ---------------------------------------------------------------------------

#[derive(Clone)]
struct SpyGrants {
    inner: <SurrealStore<Db> as Store>::Grants,
    role_lookups: Arc<AtomicUsize>,
}

impl GrantRepository for SpyGrants {
    async fn create(&self, input: CreateGrant) -> WardenResult<PermissionGrant> {
        self.inner.create(input).await
    }

    async fn get_by_id(&self, id: Uuid) -> WardenResult<PermissionGrant> {
        self.inner.get_by_id(id).await
    }

    async fn delete(&self, id: Uuid) -> WardenResult<()> {
        self.inner.delete(id).await
    }

    async fn list_for_grantee(
        &self,
        org_id: Uuid,
        grantee_type: GranteeType,
        grantee_id: &str,
    ) -> WardenResult<Vec<PermissionGrant>> {
        if grantee_type == GranteeType::Role {
            self.role_lookups.fetch_add(1, Ordering::SeqCst);
        }
        self.inner
            .list_for_grantee(org_id, grantee_type, grantee_id)
            .await
    }

    async fn list_for_resource(
        &self,
        org_id: Uuid,
        resource_type: &str,
        resource_id: Option<&str>,
    ) -> WardenResult<Vec<PermissionGrant>> {
        self.inner
            .list_for_resource(org_id, resource_type, resource_id)
            .await
    }
}

#[derive(Clone)]
struct SpyStore {
    inner: SurrealStore<Db>,
    grants: SpyGrants,
}

impl SpyStore {
    fn new(inner: SurrealStore<Db>) -> Self {
        let grants = SpyGrants {
            inner: inner.grants().clone(),
            role_lookups: Arc::new(AtomicUsize::new(0)),
        };
        Self { inner, grants }
    }

    fn role_lookups(&self) -> usize {
        self.grants.role_lookups.load(Ordering::SeqCst)
    }
}

impl Store for SpyStore {
    type Grants = SpyGrants;
    type Inheritance = <SurrealStore<Db> as Store>::Inheritance;
    type Delegations = <SurrealStore<Db> as Store>::Delegations;
    type Members = <SurrealStore<Db> as Store>::Members;
    type Teams = <SurrealStore<Db> as Store>::Teams;
    type Workflows = <SurrealStore<Db> as Store>::Workflows;
    type Requests = <SurrealStore<Db> as Store>::Requests;
    type Audit = <SurrealStore<Db> as Store>::Audit;

    fn grants(&self) -> &Self::Grants {
        &self.grants
    }

    fn inheritance(&self) -> &Self::Inheritance {
        self.inner.inheritance()
    }

    fn delegations(&self) -> &Self::Delegations {
        self.inner.delegations()
    }

    fn members(&self) -> &Self::Members {
        self.inner.members()
    }

    fn teams(&self) -> &Self::Teams {
        self.inner.teams()
    }

    fn workflows(&self) -> &Self::Workflows {
        self.inner.workflows()
    }

    fn requests(&self) -> &Self::Requests {
        self.inner.requests()
    }

    fn audit(&self) -> &Self::Audit {
        self.inner.audit()
    }
}

// ---------------------------------------------------------------------------
// Resolution
// ---------------------------------------------------------------------------

#[tokio::test]
async fn direct_grant_short_circuits_later_sources() {
    let spy = SpyStore::new(store().await);
    let engine = PermissionEngine::new(spy.clone(), AuthzConfig::default());
    let org_id = Uuid::new_v4();
    spy.members().upsert(org_id, ALICE, "editor").await.unwrap();

    engine
        .grant_permission(grant(org_id, GranteeType::User, ALICE, ("doc", Some("d1")), "read"))
        .await
        .unwrap();

    assert!(engine
        .check_permission(query(org_id, ALICE, ("doc", Some("d1")), "read"))
        .await
        .unwrap());
    assert_eq!(spy.role_lookups(), 0);

    // A miss on the direct source falls through to role grants.
    assert!(!engine
        .check_permission(query(org_id, ALICE, ("doc", Some("d1")), "write"))
        .await
        .unwrap());
    assert_eq!(spy.role_lookups(), 1);
}

#[tokio::test]
async fn expired_grant_never_satisfies() {
    let store = store().await;
    let engine = PermissionEngine::new(store.clone(), AuthzConfig::default());
    let org_id = Uuid::new_v4();

    // Written straight to the store: the engine refuses past expiries.
    store
        .grants()
        .create(CreateGrant {
            expires_at: Some(Utc::now() - Duration::milliseconds(1)),
            ..grant(org_id, GranteeType::User, ALICE, ("doc", None), "read")
        })
        .await
        .unwrap();

    assert!(!engine
        .check_permission(query(org_id, ALICE, ("doc", Some("d1")), "read"))
        .await
        .unwrap());

    let err = engine
        .grant_permission(CreateGrant {
            expires_at: Some(Utc::now() - Duration::milliseconds(1)),
            ..grant(org_id, GranteeType::User, ALICE, ("doc", None), "write")
        })
        .await
        .unwrap_err();
    assert_eq!(err.code(), Some("VALIDATION_ERROR"));
}

fn delegation(org_id: Uuid, end: chrono::DateTime<Utc>, scope: Option<ResourceScope>) -> CreateDelegation {
    CreateDelegation {
        org_id,
        delegator_did: BOB.into(),
        delegate_did: ALICE.into(),
        permissions: vec!["read".into()],
        resource_scope: scope,
        reason: None,
        start_date: Utc::now() - Duration::hours(1),
        end_date: end,
    }
}

#[tokio::test]
async fn cached_allow_ends_with_the_grant() {
    let engine = PermissionEngine::new(store().await, AuthzConfig::default());
    let org_id = Uuid::new_v4();
    let q = || query(org_id, ALICE, ("doc", Some("d1")), "read");

    engine
        .grant_permission(CreateGrant {
            expires_at: Some(Utc::now() + Duration::milliseconds(300)),
            ..grant(org_id, GranteeType::User, ALICE, ("doc", None), "read")
        })
        .await
        .unwrap();
    assert!(engine.check_permission(q()).await.unwrap());

    tokio::time::sleep(std::time::Duration::from_millis(500)).await;
    assert!(!engine.check_permission(q()).await.unwrap());
}

#[tokio::test]
async fn cached_allow_ends_with_the_delegation() {
    let store = store().await;
    let engine = PermissionEngine::new(store.clone(), AuthzConfig::default());
    let delegations = DelegationManager::new(store, engine.cache());
    let org_id = Uuid::new_v4();
    let q = || query(org_id, ALICE, ("doc", Some("d1")), "read");

    let created = delegations
        .delegate_permissions(delegation(org_id, Utc::now() + Duration::milliseconds(300), None))
        .await
        .unwrap();
    delegations.accept_delegation(created.id, ALICE).await.unwrap();
    assert!(engine.check_permission(q()).await.unwrap());

    tokio::time::sleep(std::time::Duration::from_millis(500)).await;
    assert!(!engine.check_permission(q()).await.unwrap());
}

#[tokio::test]
async fn grants_and_revokes_invalidate_cached_decisions() {
    let engine = PermissionEngine::new(store().await, AuthzConfig::default());
    let org_id = Uuid::new_v4();
    let q = || query(org_id, ALICE, ("project", Some("p1")), "deploy");

    assert!(!engine.check_permission(q()).await.unwrap());

    let granted = engine
        .grant_permission(grant(org_id, GranteeType::User, ALICE, ("project", None), "deploy"))
        .await
        .unwrap();
    assert!(engine.check_permission(q()).await.unwrap());

    engine.revoke_permission(granted.id, "did:example:admin").await.unwrap();
    assert!(!engine.check_permission(q()).await.unwrap());
}

#[tokio::test]
async fn role_grants_apply_to_membership_and_custom_roles() {
    let store = store().await;
    let engine = PermissionEngine::new(store.clone(), AuthzConfig::default());
    let org_id = Uuid::new_v4();

    store.members().upsert(org_id, ALICE, "admin").await.unwrap();
    engine
        .grant_permission(grant(org_id, GranteeType::Role, "admin", ("billing", None), "view"))
        .await
        .unwrap();
    engine
        .grant_permission(grant(org_id, GranteeType::Role, "auditor", ("ledger", None), "export"))
        .await
        .unwrap();

    assert!(engine
        .check_permission(query(org_id, ALICE, ("billing", Some("b1")), "view"))
        .await
        .unwrap());
    assert!(!engine
        .check_permission(query(org_id, ALICE, ("ledger", Some("l1")), "export"))
        .await
        .unwrap());

    // Assign the custom role.
    engine
        .grant_permission(grant(
            org_id,
            GranteeType::User,
            ALICE,
            (ROLE_RESOURCE_TYPE, Some("auditor")),
            "assume",
        ))
        .await
        .unwrap();
    assert!(engine
        .check_permission(query(org_id, ALICE, ("ledger", Some("l1")), "export"))
        .await
        .unwrap());
}

#[tokio::test]
async fn team_grants_reach_team_members() {
    let store = store().await;
    let engine = PermissionEngine::new(store.clone(), AuthzConfig::default());
    let org_id = Uuid::new_v4();

    let team = store
        .teams()
        .create(CreateTeam {
            org_id,
            name: "Ops".into(),
            description: None,
            parent_team_id: None,
            lead_did: None,
            lead_name: None,
            settings: None,
            created_by: "did:example:admin".into(),
        })
        .await
        .unwrap();
    store
        .teams()
        .add_member(
            org_id,
            AddTeamMember {
                team_id: team.id,
                member_did: BOB.into(),
                member_name: None,
                team_role: TeamRole::Member,
                invited_by: None,
            },
        )
        .await
        .unwrap();
    engine
        .grant_permission(grant(
            org_id,
            GranteeType::Team,
            &team.id.to_string(),
            ("server", None),
            "restart",
        ))
        .await
        .unwrap();

    assert!(engine
        .check_permission(query(org_id, BOB, ("server", Some("s1")), "restart"))
        .await
        .unwrap());
    assert!(!engine
        .check_permission(query(org_id, ALICE, ("server", Some("s1")), "restart"))
        .await
        .unwrap());

    let held = engine.get_user_permissions(BOB, org_id).await.unwrap();
    assert_eq!(held.grants.len(), 1);
    assert_eq!(held.grants[0].source, GrantSource::Team(team.id));
}

// ---------------------------------------------------------------------------
// Inheritance
// ---------------------------------------------------------------------------

#[tokio::test]
async fn inheritance_respects_allow_lists() {
    let engine = PermissionEngine::new(store().await, AuthzConfig::default());
    let org_id = Uuid::new_v4();

    engine
        .grant_permission(grant(org_id, GranteeType::User, ALICE, ("folder", Some("f1")), "read"))
        .await
        .unwrap();
    engine
        .grant_permission(grant(org_id, GranteeType::User, ALICE, ("folder", Some("f1")), "delete"))
        .await
        .unwrap();
    engine
        .inherit_permissions(edge(
            org_id,
            ("folder", Some("f1")),
            ("doc", Some("d1")),
            Some(vec!["read"]),
        ))
        .await
        .unwrap();

    assert!(engine
        .check_permission(query(org_id, ALICE, ("doc", Some("d1")), "read"))
        .await
        .unwrap());
    assert!(!engine
        .check_permission(query(org_id, ALICE, ("doc", Some("d1")), "delete"))
        .await
        .unwrap());
    assert!(!engine
        .check_permission(query(org_id, ALICE, ("doc", Some("d2")), "read"))
        .await
        .unwrap());

    let effective = engine
        .get_effective_permissions(ALICE, org_id, "doc", Some("d1"))
        .await
        .unwrap();
    assert_eq!(effective, vec!["read".to_string()]);

    let resource = engine
        .get_resource_permissions(org_id, "doc", Some("d1"))
        .await
        .unwrap();
    assert!(resource.grants.is_empty());
    assert_eq!(resource.inherited_from.len(), 1);
}

#[tokio::test]
async fn multi_level_inheritance_resolves_through_every_ancestor() {
    let engine = PermissionEngine::new(store().await, AuthzConfig::default());
    let org_id = Uuid::new_v4();

    engine
        .grant_permission(grant(org_id, GranteeType::User, ALICE, ("org", Some("o1")), "read"))
        .await
        .unwrap();
    engine
        .inherit_permissions(edge(org_id, ("org", Some("o1")), ("project", Some("p1")), None))
        .await
        .unwrap();
    engine
        .inherit_permissions(edge(org_id, ("project", Some("p1")), ("doc", Some("d1")), None))
        .await
        .unwrap();

    assert!(engine
        .check_permission(query(org_id, ALICE, ("doc", Some("d1")), "read"))
        .await
        .unwrap());

    // One level short of the grant.
    let shallow = PermissionEngine::new(
        store().await,
        AuthzConfig {
            max_inheritance_depth: 1,
            ..Default::default()
        },
    );
    shallow
        .grant_permission(grant(org_id, GranteeType::User, ALICE, ("org", Some("o1")), "read"))
        .await
        .unwrap();
    shallow
        .inherit_permissions(edge(org_id, ("org", Some("o1")), ("project", Some("p1")), None))
        .await
        .unwrap();
    shallow
        .inherit_permissions(edge(org_id, ("project", Some("p1")), ("doc", Some("d1")), None))
        .await
        .unwrap();
    assert!(!shallow
        .check_permission(query(org_id, ALICE, ("doc", Some("d1")), "read"))
        .await
        .unwrap());
}

#[tokio::test]
async fn depth_limit_still_honors_delegations_on_the_resource() {
    let store = store().await;
    let engine = PermissionEngine::new(
        store.clone(),
        AuthzConfig {
            max_inheritance_depth: 1,
            ..Default::default()
        },
    );
    let delegations = DelegationManager::new(store, engine.cache());
    let org_id = Uuid::new_v4();

    engine
        .inherit_permissions(edge(org_id, ("org", Some("o1")), ("project", Some("p1")), None))
        .await
        .unwrap();
    engine
        .inherit_permissions(edge(org_id, ("project", Some("p1")), ("doc", Some("d1")), None))
        .await
        .unwrap();
    let created = delegations
        .delegate_permissions(delegation(
            org_id,
            Utc::now() + Duration::days(1),
            Some(ResourceScope {
                resource_type: "doc".into(),
                resource_id: Some("d1".into()),
            }),
        ))
        .await
        .unwrap();
    delegations.accept_delegation(created.id, ALICE).await.unwrap();

    assert!(engine
        .check_permission(query(org_id, ALICE, ("doc", Some("d1")), "read"))
        .await
        .unwrap());
    assert!(!engine
        .check_permission(query(org_id, ALICE, ("doc", Some("d2")), "read"))
        .await
        .unwrap());
}

#[tokio::test]
async fn inheritance_cycle_fails_closed() {
    let engine = PermissionEngine::new(store().await, AuthzConfig::default());
    let org_id = Uuid::new_v4();

    engine
        .inherit_permissions(edge(org_id, ("folder", Some("a")), ("folder", Some("b")), None))
        .await
        .unwrap();
    engine
        .inherit_permissions(edge(org_id, ("folder", Some("b")), ("folder", Some("a")), None))
        .await
        .unwrap();

    assert!(!engine
        .check_permission(query(org_id, ALICE, ("folder", Some("a")), "read"))
        .await
        .unwrap());
}

#[tokio::test]
async fn removing_an_edge_stops_inheritance() {
    let engine = PermissionEngine::new(store().await, AuthzConfig::default());
    let org_id = Uuid::new_v4();
    let q = || query(org_id, ALICE, ("doc", Some("d1")), "read");

    engine
        .grant_permission(grant(org_id, GranteeType::User, ALICE, ("folder", Some("f1")), "read"))
        .await
        .unwrap();
    let e = engine
        .inherit_permissions(edge(org_id, ("folder", Some("f1")), ("doc", Some("d1")), None))
        .await
        .unwrap();
    assert!(engine.check_permission(q()).await.unwrap());

    engine.remove_inheritance(e.id, "did:example:admin").await.unwrap();
    assert!(!engine.check_permission(q()).await.unwrap());
}

// ---------------------------------------------------------------------------
// Grant lifecycle
// ---------------------------------------------------------------------------

#[tokio::test]
async fn duplicate_grant_is_reported() {
    let engine = PermissionEngine::new(store().await, AuthzConfig::default());
    let org_id = Uuid::new_v4();
    let input = grant(org_id, GranteeType::User, ALICE, ("doc", None), "read");

    engine.grant_permission(input.clone()).await.unwrap();
    let err = engine.grant_permission(input).await.unwrap_err();
    assert!(err.is_domain(DomainError::PermissionExists));
}

#[tokio::test]
async fn revoke_is_idempotent_for_unknown_grants() {
    let engine = PermissionEngine::new(store().await, AuthzConfig::default());
    let org_id = Uuid::new_v4();

    let granted = engine
        .grant_permission(grant(org_id, GranteeType::User, ALICE, ("doc", None), "read"))
        .await
        .unwrap();
    engine.revoke_permission(granted.id, ALICE).await.unwrap();

    let again = engine.revoke_permission(granted.id, ALICE).await.unwrap_err();
    assert!(again.is_domain(DomainError::GrantNotFound));
    let unknown = engine
        .revoke_permission(Uuid::new_v4(), ALICE)
        .await
        .unwrap_err();
    assert!(matches!(
        unknown,
        WardenError::Domain(DomainError::GrantNotFound)
    ));
}

#[tokio::test]
async fn bulk_grant_reports_each_input_in_order() {
    let engine = PermissionEngine::new(store().await, AuthzConfig::default());
    let org_id = Uuid::new_v4();

    let results = engine
        .bulk_grant(
            vec![
                grant(org_id, GranteeType::User, ALICE, ("doc", None), "read"),
                grant(org_id, GranteeType::User, ALICE, ("doc", None), "read"),
                grant(org_id, GranteeType::User, BOB, ("doc", None), "read"),
            ],
            "did:example:owner",
        )
        .await
        .unwrap();

    assert_eq!(results.len(), 3);
    assert!(results[0].grant.is_some());
    let error = results[1].error.as_ref().unwrap();
    assert_eq!(error.code, "PERMISSION_EXISTS");
    assert!(!error.message.is_empty());
    let third = results[2].grant.as_ref().unwrap();
    assert_eq!(third.grantee_id, BOB);
    assert_eq!(third.granted_by, "did:example:owner");
}
