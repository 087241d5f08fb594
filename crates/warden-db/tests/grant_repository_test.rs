//! Integration tests for the grant and inheritance repositories using
//! in-memory SurrealDB.

use chrono::{Duration, Utc};
use surrealdb::Surreal;
use surrealdb::engine::local::{Db, Mem};
use uuid::Uuid;
use warden_core::error::WardenError;
use warden_core::models::grant::{CreateGrant, GranteeType};
use warden_core::models::inheritance::CreateInheritance;
use warden_core::repository::{GrantRepository, InheritanceRepository};
use warden_db::repository::{SurrealGrantRepository, SurrealInheritanceRepository};

async fn setup() -> Surreal<Db> {
    let db = Surreal::new::<Mem>(()).await.unwrap();
    db.use_ns("test").use_db("test").await.unwrap();
    warden_db::run_migrations(&db).await.unwrap();
    db
}

fn grant(org_id: Uuid, resource_id: Option<&str>, permission: &str) -> CreateGrant {
    CreateGrant {
        org_id,
        grantee_type: GranteeType::User,
        grantee_id: "did:example:alice".into(),
        resource_type: "document".into(),
        resource_id: resource_id.map(str::to_string),
        permission: permission.into(),
        conditions: None,
        granted_by: "did:example:admin".into(),
        expires_at: None,
    }
}

#[tokio::test]
async fn create_and_get_grant() {
    let db = setup().await;
    let repo = SurrealGrantRepository::new(db);
    let org_id = Uuid::new_v4();

    let mut input = grant(org_id, Some("doc-1"), "read");
    input.conditions = Some(serde_json::json!({"ip": "10.0.0.0/8"}));
    input.expires_at = Some(Utc::now() + Duration::hours(1));
    let created = repo.create(input).await.unwrap();

    assert_eq!(created.org_id, org_id);
    assert_eq!(created.grantee_type, GranteeType::User);
    assert_eq!(created.resource_id.as_deref(), Some("doc-1"));
    assert_eq!(
        created.conditions,
        Some(serde_json::json!({"ip": "10.0.0.0/8"}))
    );

    let fetched = repo.get_by_id(created.id).await.unwrap();
    assert_eq!(fetched.id, created.id);
    assert_eq!(fetched.permission, "read");
    assert!(fetched.expires_at.is_some());
}

#[tokio::test]
async fn duplicate_grant_is_rejected() {
    let db = setup().await;
    let repo = SurrealGrantRepository::new(db);
    let org_id = Uuid::new_v4();

    repo.create(grant(org_id, Some("doc-1"), "read")).await.unwrap();
    let err = repo
        .create(grant(org_id, Some("doc-1"), "read"))
        .await
        .unwrap_err();
    assert!(matches!(err, WardenError::AlreadyExists { .. }));

    // The same tuple as a wildcard grant is a different grant, once.
    repo.create(grant(org_id, None, "read")).await.unwrap();
    let err = repo.create(grant(org_id, None, "read")).await.unwrap_err();
    assert!(matches!(err, WardenError::AlreadyExists { .. }));
}

#[tokio::test]
async fn list_for_resource_includes_wildcards() {
    let db = setup().await;
    let repo = SurrealGrantRepository::new(db);
    let org_id = Uuid::new_v4();

    repo.create(grant(org_id, Some("doc-1"), "read")).await.unwrap();
    repo.create(grant(org_id, Some("doc-2"), "read")).await.unwrap();
    repo.create(grant(org_id, None, "write")).await.unwrap();

    let grants = repo
        .list_for_resource(org_id, "document", Some("doc-1"))
        .await
        .unwrap();
    let mut permissions: Vec<_> = grants.iter().map(|g| g.permission.as_str()).collect();
    permissions.sort();
    assert_eq!(permissions, vec!["read", "write"]);

    let wildcard_only = repo
        .list_for_resource(org_id, "document", None)
        .await
        .unwrap();
    assert_eq!(wildcard_only.len(), 1);
    assert_eq!(wildcard_only[0].permission, "write");
}

#[tokio::test]
async fn grants_are_scoped_by_org_and_grantee() {
    let db = setup().await;
    let repo = SurrealGrantRepository::new(db);
    let org_a = Uuid::new_v4();
    let org_b = Uuid::new_v4();

    repo.create(grant(org_a, Some("doc-1"), "read")).await.unwrap();
    repo.create(grant(org_b, Some("doc-1"), "read")).await.unwrap();

    let in_a = repo
        .list_for_grantee(org_a, GranteeType::User, "did:example:alice")
        .await
        .unwrap();
    assert_eq!(in_a.len(), 1);
    assert_eq!(in_a[0].org_id, org_a);

    let as_role = repo
        .list_for_grantee(org_a, GranteeType::Role, "did:example:alice")
        .await
        .unwrap();
    assert!(as_role.is_empty());
}

#[tokio::test]
async fn delete_missing_grant_is_not_found() {
    let db = setup().await;
    let repo = SurrealGrantRepository::new(db);
    let org_id = Uuid::new_v4();

    let created = repo.create(grant(org_id, None, "read")).await.unwrap();
    repo.delete(created.id).await.unwrap();

    assert!(matches!(
        repo.get_by_id(created.id).await,
        Err(WardenError::NotFound { .. })
    ));
    assert!(matches!(
        repo.delete(created.id).await,
        Err(WardenError::NotFound { .. })
    ));
}

#[tokio::test]
async fn inheritance_edges_are_listed_by_child() {
    let db = setup().await;
    let repo = SurrealInheritanceRepository::new(db);
    let org_id = Uuid::new_v4();

    let edge = repo
        .create(CreateInheritance {
            org_id,
            parent_resource_type: "folder".into(),
            parent_resource_id: Some("f-1".into()),
            child_resource_type: "document".into(),
            child_resource_id: Some("doc-1".into()),
            inherit_permissions: Some(vec!["read".into()]),
            created_by: "did:example:admin".into(),
        })
        .await
        .unwrap();
    repo.create(CreateInheritance {
        org_id,
        parent_resource_type: "workspace".into(),
        parent_resource_id: None,
        child_resource_type: "document".into(),
        child_resource_id: None,
        inherit_permissions: None,
        created_by: "did:example:admin".into(),
    })
    .await
    .unwrap();

    let parents = repo
        .list_parents(org_id, "document", Some("doc-1"))
        .await
        .unwrap();
    assert_eq!(parents.len(), 2);

    let for_other_doc = repo
        .list_parents(org_id, "document", Some("doc-2"))
        .await
        .unwrap();
    assert_eq!(for_other_doc.len(), 1);
    assert_eq!(for_other_doc[0].parent_resource_type, "workspace");

    let fetched = repo.get_by_id(edge.id).await.unwrap();
    assert_eq!(fetched.inherit_permissions, Some(vec!["read".to_string()]));

    repo.delete(edge.id).await.unwrap();
    let parents = repo
        .list_parents(org_id, "document", Some("doc-1"))
        .await
        .unwrap();
    assert_eq!(parents.len(), 1);
}
