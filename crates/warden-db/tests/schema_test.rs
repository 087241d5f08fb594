//! Integration tests for schema initialization using in-memory SurrealDB.

use surrealdb::Surreal;
use surrealdb::engine::local::Mem;

#[tokio::test]
async fn schema_migration_applies_successfully() {
    let db = Surreal::new::<Mem>(()).await.unwrap();
    db.use_ns("test").use_db("test").await.unwrap();

    warden_db::run_migrations(&db).await.unwrap();

    let mut result = db.query("INFO FOR DB").await.unwrap();
    let info: Option<surrealdb_types::Value> = result.take(0).unwrap();
    let info = info.expect("INFO FOR DB should return a value");
    let info_str = format!("{:?}", info);

    for table in [
        "permission_grant",
        "permission_inheritance",
        "permission_delegation",
        "org_member",
        "org_team",
        "team_member",
        "approval_workflow",
        "approval_request",
        "approval_response",
        "audit_log",
        "_migration",
    ] {
        assert!(info_str.contains(table), "missing {table} table");
    }
}

#[tokio::test]
async fn migration_is_idempotent() {
    let db = Surreal::new::<Mem>(()).await.unwrap();
    db.use_ns("test").use_db("test").await.unwrap();

    warden_db::run_migrations(&db).await.unwrap();
    warden_db::run_migrations(&db).await.unwrap();

    let mut result = db.query("SELECT * FROM _migration").await.unwrap();
    let records: Vec<surrealdb_types::Value> = result.take(0).unwrap();
    assert_eq!(records.len(), 1, "expected exactly one migration record");
}

#[tokio::test]
async fn unique_index_prevents_duplicate_team_names() {
    let db = Surreal::new::<Mem>(()).await.unwrap();
    db.use_ns("test").use_db("test").await.unwrap();

    warden_db::run_migrations(&db).await.unwrap();

    db.query(
        "CREATE org_team SET \
         org_id = 'org-1', name = 'Platform', created_by = 'did:example:root'",
    )
    .await
    .unwrap()
    .check()
    .unwrap();

    let result = db
        .query(
            "CREATE org_team SET \
             org_id = 'org-1', name = 'Platform', created_by = 'did:example:root'",
        )
        .await
        .unwrap()
        .check();

    assert!(result.is_err(), "duplicate team name should be rejected");
}

#[tokio::test]
async fn enum_fields_reject_unknown_values() {
    let db = Surreal::new::<Mem>(()).await.unwrap();
    db.use_ns("test").use_db("test").await.unwrap();

    warden_db::run_migrations(&db).await.unwrap();

    let result = db
        .query(
            "CREATE permission_grant SET \
             org_id = 'org-1', grantee_type = 'group', grantee_id = 'x', \
             resource_type = 'document', permission = 'read', \
             granted_by = 'did:example:root'",
        )
        .await
        .unwrap()
        .check();

    assert!(result.is_err(), "unknown grantee type should be rejected");
}
