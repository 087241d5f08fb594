//! Schema definitions and migration runner for SurrealDB.
//!
//! All table definitions use SCHEMAFULL mode. UUIDs are stored as
//! strings, enums as lowercase strings guarded by ASSERT, and opaque
//! caller JSON (conditions, request data, approver steps) as serialized
//! JSON strings so it round-trips byte-for-byte.

use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use tracing::info;

use crate::error::DbError;

// -----------------------------------------------------------------------
// Migration tracking
// -----------------------------------------------------------------------

const MIGRATION_TABLE_DDL: &str = "\
DEFINE TABLE IF NOT EXISTS _migration SCHEMAFULL;
DEFINE FIELD IF NOT EXISTS version ON TABLE _migration TYPE int;
DEFINE FIELD IF NOT EXISTS name ON TABLE _migration TYPE string;
DEFINE FIELD IF NOT EXISTS applied_at ON TABLE _migration TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX IF NOT EXISTS idx_migration_version ON TABLE _migration \
    COLUMNS version UNIQUE;
";

#[derive(Debug, SurrealValue)]
struct MigrationRecord {
    version: u32,
    #[allow(dead_code)]
    name: String,
}

struct Migration {
    version: u32,
    name: &'static str,
    sql: &'static str,
}

static MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    name: "initial_schema",
    sql: SCHEMA_V1,
}];

// -----------------------------------------------------------------------
// Schema v1 — initial table definitions
// -----------------------------------------------------------------------

const SCHEMA_V1: &str = "\
-- =======================================================================
-- Permission grants (org scope)
-- =======================================================================
DEFINE TABLE permission_grant SCHEMAFULL;
DEFINE FIELD org_id ON TABLE permission_grant TYPE string;
DEFINE FIELD grantee_type ON TABLE permission_grant TYPE string \
    ASSERT $value IN ['user', 'role', 'team'];
DEFINE FIELD grantee_id ON TABLE permission_grant TYPE string;
DEFINE FIELD resource_type ON TABLE permission_grant TYPE string;
DEFINE FIELD resource_id ON TABLE permission_grant TYPE option<string>;
DEFINE FIELD permission ON TABLE permission_grant TYPE string;
DEFINE FIELD conditions ON TABLE permission_grant TYPE option<string>;
DEFINE FIELD granted_by ON TABLE permission_grant TYPE string;
DEFINE FIELD expires_at ON TABLE permission_grant TYPE option<datetime>;
DEFINE FIELD created_at ON TABLE permission_grant TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX idx_grant_unique ON TABLE permission_grant \
    COLUMNS org_id, grantee_type, grantee_id, resource_type, \
    resource_id, permission UNIQUE;
DEFINE INDEX idx_grant_resource ON TABLE permission_grant \
    COLUMNS org_id, resource_type;

-- =======================================================================
-- Resource inheritance edges (org scope)
-- =======================================================================
DEFINE TABLE permission_inheritance SCHEMAFULL;
DEFINE FIELD org_id ON TABLE permission_inheritance TYPE string;
DEFINE FIELD parent_resource_type ON TABLE permission_inheritance \
    TYPE string;
DEFINE FIELD parent_resource_id ON TABLE permission_inheritance \
    TYPE option<string>;
DEFINE FIELD child_resource_type ON TABLE permission_inheritance \
    TYPE string;
DEFINE FIELD child_resource_id ON TABLE permission_inheritance \
    TYPE option<string>;
DEFINE FIELD inherit_permissions ON TABLE permission_inheritance \
    TYPE option<array<string>>;
DEFINE FIELD created_by ON TABLE permission_inheritance TYPE string;
DEFINE FIELD created_at ON TABLE permission_inheritance TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX idx_inheritance_child ON TABLE permission_inheritance \
    COLUMNS org_id, child_resource_type, child_resource_id;

-- =======================================================================
-- Delegations (org scope)
-- =======================================================================
DEFINE TABLE permission_delegation SCHEMAFULL;
DEFINE FIELD org_id ON TABLE permission_delegation TYPE string;
DEFINE FIELD delegator_did ON TABLE permission_delegation TYPE string;
DEFINE FIELD delegate_did ON TABLE permission_delegation TYPE string;
DEFINE FIELD permissions ON TABLE permission_delegation \
    TYPE array<string>;
DEFINE FIELD scope_resource_type ON TABLE permission_delegation \
    TYPE option<string>;
DEFINE FIELD scope_resource_id ON TABLE permission_delegation \
    TYPE option<string>;
DEFINE FIELD reason ON TABLE permission_delegation TYPE option<string>;
DEFINE FIELD start_date ON TABLE permission_delegation TYPE datetime;
DEFINE FIELD end_date ON TABLE permission_delegation TYPE datetime;
DEFINE FIELD status ON TABLE permission_delegation TYPE string \
    ASSERT $value IN ['pending', 'active', 'revoked'];
DEFINE FIELD created_at ON TABLE permission_delegation TYPE datetime \
    DEFAULT time::now();
DEFINE FIELD updated_at ON TABLE permission_delegation TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX idx_delegation_delegate ON TABLE permission_delegation \
    COLUMNS org_id, delegate_did, status;
DEFINE INDEX idx_delegation_delegator ON TABLE permission_delegation \
    COLUMNS org_id, delegator_did;

-- =======================================================================
-- Organization membership (org scope)
-- =======================================================================
DEFINE TABLE org_member SCHEMAFULL;
DEFINE FIELD org_id ON TABLE org_member TYPE string;
DEFINE FIELD member_did ON TABLE org_member TYPE string;
DEFINE FIELD role ON TABLE org_member TYPE string;
DEFINE FIELD joined_at ON TABLE org_member TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX idx_org_member ON TABLE org_member \
    COLUMNS org_id, member_did UNIQUE;

-- =======================================================================
-- Teams (org scope, hierarchical)
-- =======================================================================
DEFINE TABLE org_team SCHEMAFULL;
DEFINE FIELD org_id ON TABLE org_team TYPE string;
DEFINE FIELD name ON TABLE org_team TYPE string;
DEFINE FIELD description ON TABLE org_team TYPE string DEFAULT '';
DEFINE FIELD parent_team_id ON TABLE org_team TYPE option<string>;
DEFINE FIELD lead_did ON TABLE org_team TYPE option<string>;
DEFINE FIELD lead_name ON TABLE org_team TYPE option<string>;
DEFINE FIELD settings ON TABLE org_team TYPE object FLEXIBLE DEFAULT {};
DEFINE FIELD created_by ON TABLE org_team TYPE string;
DEFINE FIELD created_at ON TABLE org_team TYPE datetime \
    DEFAULT time::now();
DEFINE FIELD updated_at ON TABLE org_team TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX idx_team_org_name ON TABLE org_team \
    COLUMNS org_id, name UNIQUE;
DEFINE INDEX idx_team_parent ON TABLE org_team \
    COLUMNS org_id, parent_team_id;

DEFINE TABLE team_member SCHEMAFULL;
DEFINE FIELD org_id ON TABLE team_member TYPE string;
DEFINE FIELD team_id ON TABLE team_member TYPE string;
DEFINE FIELD member_did ON TABLE team_member TYPE string;
DEFINE FIELD member_name ON TABLE team_member TYPE option<string>;
DEFINE FIELD team_role ON TABLE team_member TYPE string \
    ASSERT $value IN ['lead', 'member'];
DEFINE FIELD invited_by ON TABLE team_member TYPE option<string>;
DEFINE FIELD joined_at ON TABLE team_member TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX idx_team_member ON TABLE team_member \
    COLUMNS team_id, member_did UNIQUE;
DEFINE INDEX idx_team_member_did ON TABLE team_member \
    COLUMNS org_id, member_did;

-- =======================================================================
-- Approval workflows (org scope)
-- =======================================================================
DEFINE TABLE approval_workflow SCHEMAFULL;
DEFINE FIELD org_id ON TABLE approval_workflow TYPE string;
DEFINE FIELD name ON TABLE approval_workflow TYPE string;
DEFINE FIELD description ON TABLE approval_workflow TYPE string \
    DEFAULT '';
DEFINE FIELD trigger_resource_type ON TABLE approval_workflow \
    TYPE string;
DEFINE FIELD trigger_action ON TABLE approval_workflow TYPE string;
DEFINE FIELD trigger_conditions ON TABLE approval_workflow \
    TYPE option<string>;
DEFINE FIELD approval_type ON TABLE approval_workflow TYPE string \
    ASSERT $value IN ['sequential', 'parallel', 'any_one'];
DEFINE FIELD approvers ON TABLE approval_workflow TYPE string;
DEFINE FIELD timeout_hours ON TABLE approval_workflow TYPE int \
    ASSERT $value > 0;
DEFINE FIELD on_timeout ON TABLE approval_workflow TYPE string \
    ASSERT $value IN ['approve', 'reject', 'expire'];
DEFINE FIELD enabled ON TABLE approval_workflow TYPE bool DEFAULT true;
DEFINE FIELD created_by ON TABLE approval_workflow TYPE string;
DEFINE FIELD created_at ON TABLE approval_workflow TYPE datetime \
    DEFAULT time::now();
DEFINE FIELD updated_at ON TABLE approval_workflow TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX idx_workflow_trigger ON TABLE approval_workflow \
    COLUMNS org_id, trigger_resource_type, trigger_action;

-- =======================================================================
-- Approval requests & responses (org scope)
-- =======================================================================
DEFINE TABLE approval_request SCHEMAFULL;
DEFINE FIELD workflow_id ON TABLE approval_request TYPE string;
DEFINE FIELD org_id ON TABLE approval_request TYPE string;
DEFINE FIELD requester_did ON TABLE approval_request TYPE string;
DEFINE FIELD requester_name ON TABLE approval_request \
    TYPE option<string>;
DEFINE FIELD resource_type ON TABLE approval_request TYPE string;
DEFINE FIELD resource_id ON TABLE approval_request TYPE option<string>;
DEFINE FIELD action ON TABLE approval_request TYPE string;
DEFINE FIELD request_data ON TABLE approval_request TYPE string;
DEFINE FIELD status ON TABLE approval_request TYPE string \
    ASSERT $value IN ['pending', 'approved', 'rejected', 'expired'];
DEFINE FIELD current_step ON TABLE approval_request TYPE int \
    DEFAULT 0;
DEFINE FIELD total_steps ON TABLE approval_request TYPE int;
DEFINE FIELD approval_type ON TABLE approval_request TYPE string \
    ASSERT $value IN ['sequential', 'parallel', 'any_one'];
DEFINE FIELD approvers ON TABLE approval_request TYPE string;
DEFINE FIELD on_timeout ON TABLE approval_request TYPE string \
    ASSERT $value IN ['approve', 'reject', 'expire'];
DEFINE FIELD timeout_at ON TABLE approval_request TYPE datetime;
DEFINE FIELD created_at ON TABLE approval_request TYPE datetime \
    DEFAULT time::now();
DEFINE FIELD completed_at ON TABLE approval_request \
    TYPE option<datetime>;
DEFINE INDEX idx_request_org_status ON TABLE approval_request \
    COLUMNS org_id, status;
DEFINE INDEX idx_request_workflow_status ON TABLE approval_request \
    COLUMNS workflow_id, status;

DEFINE TABLE approval_response SCHEMAFULL
    PERMISSIONS
        FOR create FULL
        FOR select FULL
        FOR update NONE
        FOR delete NONE;
DEFINE FIELD request_id ON TABLE approval_response TYPE string;
DEFINE FIELD approver_did ON TABLE approval_response TYPE string;
DEFINE FIELD step ON TABLE approval_response TYPE int;
DEFINE FIELD decision ON TABLE approval_response TYPE string \
    ASSERT $value IN ['approve', 'reject'];
DEFINE FIELD comment ON TABLE approval_response TYPE option<string>;
DEFINE FIELD created_at ON TABLE approval_response TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX idx_response_request ON TABLE approval_response \
    COLUMNS request_id, step;

-- =======================================================================
-- Audit Log (org scope, append-only)
-- =======================================================================
DEFINE TABLE audit_log SCHEMAFULL
    PERMISSIONS
        FOR create FULL
        FOR select FULL
        FOR update NONE
        FOR delete NONE;
DEFINE FIELD org_id ON TABLE audit_log TYPE string;
DEFINE FIELD actor_did ON TABLE audit_log TYPE string;
DEFINE FIELD action ON TABLE audit_log TYPE string;
DEFINE FIELD target ON TABLE audit_log TYPE option<string>;
DEFINE FIELD outcome ON TABLE audit_log TYPE string \
    ASSERT $value IN ['success', 'failure', 'denied'];
DEFINE FIELD metadata ON TABLE audit_log TYPE object FLEXIBLE \
    DEFAULT {};
DEFINE FIELD timestamp ON TABLE audit_log TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX idx_audit_org_time ON TABLE audit_log \
    COLUMNS org_id, timestamp;
DEFINE INDEX idx_audit_org_actor ON TABLE audit_log \
    COLUMNS org_id, actor_did;
";

// -----------------------------------------------------------------------
// Public API
// -----------------------------------------------------------------------

/// Run all pending migrations against the given SurrealDB client.
///
/// Creates a `_migration` tracking table on first run, then applies
/// each migration whose version exceeds the current maximum.
/// All DEFINE statements are idempotent so re-running is safe.
pub async fn run_migrations<C: Connection>(db: &Surreal<C>) -> Result<(), DbError> {
    // Ensure migration tracking table exists (idempotent).
    db.query(MIGRATION_TABLE_DDL)
        .await?
        .check()
        .map_err(|e| DbError::Migration(e.to_string()))?;

    // Determine current schema version.
    let mut result = db
        .query("SELECT * FROM _migration ORDER BY version DESC LIMIT 1")
        .await?;
    let records: Vec<MigrationRecord> = result.take(0)?;
    let current_version = records.first().map(|m| m.version).unwrap_or(0);

    for migration in MIGRATIONS {
        if migration.version > current_version {
            info!(
                version = migration.version,
                name = migration.name,
                "Applying migration"
            );
            db.query(migration.sql).await?.check().map_err(|e| {
                DbError::Migration(format!(
                    "Migration v{} '{}' failed: {}",
                    migration.version, migration.name, e,
                ))
            })?;

            // Record the applied migration.
            db.query(
                "CREATE _migration SET version = $version, \
                 name = $name",
            )
            .bind(("version", migration.version))
            .bind(("name", migration.name))
            .await?
            .check()
            .map_err(|e| {
                DbError::Migration(format!(
                    "Failed to record migration v{}: {}",
                    migration.version, e,
                ))
            })?;

            info!(
                version = migration.version,
                "Migration applied successfully"
            );
        }
    }

    Ok(())
}

/// Returns the raw schema DDL for version 1.
///
/// Exposed for testing with in-memory SurrealDB instances that
/// bypass the migration runner.
pub fn schema_v1() -> &'static str {
    SCHEMA_V1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_v1_is_nonempty() {
        assert!(!SCHEMA_V1.is_empty());
    }

    #[test]
    fn schema_v1_defines_every_table() {
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
        ] {
            assert!(
                SCHEMA_V1.contains(&format!("DEFINE TABLE {table} SCHEMAFULL")),
                "missing table {table}"
            );
        }
    }

    #[test]
    fn migrations_are_ordered() {
        for window in MIGRATIONS.windows(2) {
            assert!(
                window[0].version < window[1].version,
                "Migrations must be in ascending version order"
            );
        }
    }
}
