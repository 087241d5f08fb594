//! SurrealDB implementation of [`GrantRepository`].

use chrono::{DateTime, Utc};
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use uuid::Uuid;
use warden_core::error::WardenResult;
use warden_core::models::grant::{CreateGrant, GranteeType, PermissionGrant};
use warden_core::repository::GrantRepository;

use super::{CountRow, single, total};
use crate::convert::{decode_opt_json, encode_opt_json, parse_enum, parse_uuid};
use crate::error::DbError;

const ENTITY: &str = "permission_grant";

#[derive(Debug, SurrealValue)]
struct GrantRecord {
    record_id: String,
    org_id: String,
    grantee_type: String,
    grantee_id: String,
    resource_type: String,
    resource_id: Option<String>,
    permission: String,
    conditions: Option<String>,
    granted_by: String,
    expires_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl GrantRecord {
    fn try_into_grant(self) -> Result<PermissionGrant, DbError> {
        Ok(PermissionGrant {
            id: parse_uuid(ENTITY, &self.record_id)?,
            org_id: parse_uuid(ENTITY, &self.org_id)?,
            grantee_type: parse_enum(ENTITY, &self.grantee_type)?,
            grantee_id: self.grantee_id,
            resource_type: self.resource_type,
            resource_id: self.resource_id,
            permission: self.permission,
            conditions: decode_opt_json(ENTITY, self.conditions.as_deref())?,
            granted_by: self.granted_by,
            expires_at: self.expires_at,
            created_at: self.created_at,
        })
    }
}

fn into_grants(rows: Vec<GrantRecord>) -> Result<Vec<PermissionGrant>, DbError> {
    rows.into_iter().map(GrantRecord::try_into_grant).collect()
}

/// SurrealDB implementation of the grant repository.
#[derive(Clone)]
pub struct SurrealGrantRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealGrantRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }

    async fn exists(&self, input: &CreateGrant) -> Result<bool, DbError> {
        // A wildcard grant stores NONE; match it explicitly.
        let query = if input.resource_id.is_some() {
            "SELECT count() AS total FROM permission_grant \
             WHERE org_id = $org_id AND grantee_type = $grantee_type \
             AND grantee_id = $grantee_id AND resource_type = $resource_type \
             AND resource_id = $resource_id AND permission = $permission \
             GROUP ALL"
        } else {
            "SELECT count() AS total FROM permission_grant \
             WHERE org_id = $org_id AND grantee_type = $grantee_type \
             AND grantee_id = $grantee_id AND resource_type = $resource_type \
             AND resource_id = NONE AND permission = $permission \
             GROUP ALL"
        };

        let mut result = self
            .db
            .query(query)
            .bind(("org_id", input.org_id.to_string()))
            .bind(("grantee_type", input.grantee_type.to_string()))
            .bind(("grantee_id", input.grantee_id.clone()))
            .bind(("resource_type", input.resource_type.clone()))
            .bind(("resource_id", input.resource_id.clone()))
            .bind(("permission", input.permission.clone()))
            .await?;

        let rows: Vec<CountRow> = result.take(0)?;
        Ok(total(rows) > 0)
    }
}

impl<C: Connection> GrantRepository for SurrealGrantRepository<C> {
    async fn create(&self, input: CreateGrant) -> WardenResult<PermissionGrant> {
        if self.exists(&input).await? {
            return Err(DbError::Duplicate {
                entity: ENTITY.into(),
            }
            .into());
        }

        let id_str = Uuid::new_v4().to_string();
        let conditions = encode_opt_json(ENTITY, input.conditions.as_ref())?;

        let result = self
            .db
            .query(
                "CREATE type::record('permission_grant', $id) SET \
                 org_id = $org_id, grantee_type = $grantee_type, \
                 grantee_id = $grantee_id, resource_type = $resource_type, \
                 resource_id = $resource_id, permission = $permission, \
                 conditions = $conditions, granted_by = $granted_by, \
                 expires_at = $expires_at; \
                 SELECT meta::id(id) AS record_id, * \
                 FROM type::record('permission_grant', $id);",
            )
            .bind(("id", id_str.clone()))
            .bind(("org_id", input.org_id.to_string()))
            .bind(("grantee_type", input.grantee_type.to_string()))
            .bind(("grantee_id", input.grantee_id))
            .bind(("resource_type", input.resource_type))
            .bind(("resource_id", input.resource_id))
            .bind(("permission", input.permission))
            .bind(("conditions", conditions))
            .bind(("granted_by", input.granted_by))
            .bind(("expires_at", input.expires_at))
            .await
            .map_err(DbError::from)?;

        let mut result = result.check().map_err(|e| DbError::from_write(ENTITY, e))?;

        let rows: Vec<GrantRecord> = result.take(1).map_err(DbError::from)?;
        Ok(single(rows, ENTITY, id_str)?.try_into_grant()?)
    }

    async fn get_by_id(&self, id: Uuid) -> WardenResult<PermissionGrant> {
        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * \
                 FROM type::record('permission_grant', $id)",
            )
            .bind(("id", id.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<GrantRecord> = result.take(0).map_err(DbError::from)?;
        Ok(single(rows, ENTITY, id)?.try_into_grant()?)
    }

    async fn delete(&self, id: Uuid) -> WardenResult<()> {
        let mut result = self
            .db
            .query(
                "SELECT count() AS total FROM type::record('permission_grant', $id) \
                 GROUP ALL; \
                 DELETE type::record('permission_grant', $id);",
            )
            .bind(("id", id.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<CountRow> = result.take(0).map_err(DbError::from)?;
        if total(rows) == 0 {
            return Err(DbError::not_found(ENTITY, id).into());
        }
        Ok(())
    }

    async fn list_for_grantee(
        &self,
        org_id: Uuid,
        grantee_type: GranteeType,
        grantee_id: &str,
    ) -> WardenResult<Vec<PermissionGrant>> {
        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * FROM permission_grant \
                 WHERE org_id = $org_id AND grantee_type = $grantee_type \
                 AND grantee_id = $grantee_id \
                 ORDER BY created_at ASC",
            )
            .bind(("org_id", org_id.to_string()))
            .bind(("grantee_type", grantee_type.to_string()))
            .bind(("grantee_id", grantee_id.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<GrantRecord> = result.take(0).map_err(DbError::from)?;
        Ok(into_grants(rows)?)
    }

    async fn list_for_resource(
        &self,
        org_id: Uuid,
        resource_type: &str,
        resource_id: Option<&str>,
    ) -> WardenResult<Vec<PermissionGrant>> {
        // Wildcard grants on the type apply to every resource of it.
        let query = if resource_id.is_some() {
            "SELECT meta::id(id) AS record_id, * FROM permission_grant \
             WHERE org_id = $org_id AND resource_type = $resource_type \
             AND (resource_id = $resource_id OR resource_id = NONE) \
             ORDER BY created_at ASC"
        } else {
            "SELECT meta::id(id) AS record_id, * FROM permission_grant \
             WHERE org_id = $org_id AND resource_type = $resource_type \
             AND resource_id = NONE \
             ORDER BY created_at ASC"
        };

        let mut result = self
            .db
            .query(query)
            .bind(("org_id", org_id.to_string()))
            .bind(("resource_type", resource_type.to_string()))
            .bind(("resource_id", resource_id.map(str::to_string)))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<GrantRecord> = result.take(0).map_err(DbError::from)?;
        Ok(into_grants(rows)?)
    }
}
