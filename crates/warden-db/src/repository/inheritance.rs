//! SurrealDB implementation of [`InheritanceRepository`].

use chrono::{DateTime, Utc};
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use uuid::Uuid;
use warden_core::error::WardenResult;
use warden_core::models::inheritance::{CreateInheritance, PermissionInheritance};
use warden_core::repository::InheritanceRepository;

use super::{CountRow, single, total};
use crate::convert::parse_uuid;
use crate::error::DbError;

const ENTITY: &str = "permission_inheritance";

#[derive(Debug, SurrealValue)]
struct InheritanceRecord {
    record_id: String,
    org_id: String,
    parent_resource_type: String,
    parent_resource_id: Option<String>,
    child_resource_type: String,
    child_resource_id: Option<String>,
    inherit_permissions: Option<Vec<String>>,
    created_at: DateTime<Utc>,
}

impl InheritanceRecord {
    fn try_into_inheritance(self) -> Result<PermissionInheritance, DbError> {
        Ok(PermissionInheritance {
            id: parse_uuid(ENTITY, &self.record_id)?,
            org_id: parse_uuid(ENTITY, &self.org_id)?,
            parent_resource_type: self.parent_resource_type,
            parent_resource_id: self.parent_resource_id,
            child_resource_type: self.child_resource_type,
            child_resource_id: self.child_resource_id,
            inherit_permissions: self.inherit_permissions,
            created_at: self.created_at,
        })
    }
}

/// SurrealDB implementation of the inheritance-edge repository.
#[derive(Clone)]
pub struct SurrealInheritanceRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealInheritanceRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }
}

impl<C: Connection> InheritanceRepository for SurrealInheritanceRepository<C> {
    async fn create(&self, input: CreateInheritance) -> WardenResult<PermissionInheritance> {
        let id_str = Uuid::new_v4().to_string();

        let result = self
            .db
            .query(
                "CREATE type::record('permission_inheritance', $id) SET \
                 org_id = $org_id, \
                 parent_resource_type = $parent_type, \
                 parent_resource_id = $parent_id, \
                 child_resource_type = $child_type, \
                 child_resource_id = $child_id, \
                 inherit_permissions = $inherit_permissions, \
                 created_by = $created_by; \
                 SELECT meta::id(id) AS record_id, * \
                 FROM type::record('permission_inheritance', $id);",
            )
            .bind(("id", id_str.clone()))
            .bind(("org_id", input.org_id.to_string()))
            .bind(("parent_type", input.parent_resource_type))
            .bind(("parent_id", input.parent_resource_id))
            .bind(("child_type", input.child_resource_type))
            .bind(("child_id", input.child_resource_id))
            .bind(("inherit_permissions", input.inherit_permissions))
            .bind(("created_by", input.created_by))
            .await
            .map_err(DbError::from)?;

        let mut result = result.check().map_err(|e| DbError::from_write(ENTITY, e))?;

        let rows: Vec<InheritanceRecord> = result.take(1).map_err(DbError::from)?;
        Ok(single(rows, ENTITY, id_str)?.try_into_inheritance()?)
    }

    async fn get_by_id(&self, id: Uuid) -> WardenResult<PermissionInheritance> {
        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * \
                 FROM type::record('permission_inheritance', $id)",
            )
            .bind(("id", id.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<InheritanceRecord> = result.take(0).map_err(DbError::from)?;
        Ok(single(rows, ENTITY, id)?.try_into_inheritance()?)
    }

    async fn delete(&self, id: Uuid) -> WardenResult<()> {
        let mut result = self
            .db
            .query(
                "SELECT count() AS total \
                 FROM type::record('permission_inheritance', $id) GROUP ALL; \
                 DELETE type::record('permission_inheritance', $id);",
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

    async fn list_parents(
        &self,
        org_id: Uuid,
        child_resource_type: &str,
        child_resource_id: Option<&str>,
    ) -> WardenResult<Vec<PermissionInheritance>> {
        // A concrete child also inherits through edges declared on its
        // whole type.
        let query = if child_resource_id.is_some() {
            "SELECT meta::id(id) AS record_id, * FROM permission_inheritance \
             WHERE org_id = $org_id AND child_resource_type = $child_type \
             AND (child_resource_id = $child_id OR child_resource_id = NONE) \
             ORDER BY created_at ASC"
        } else {
            "SELECT meta::id(id) AS record_id, * FROM permission_inheritance \
             WHERE org_id = $org_id AND child_resource_type = $child_type \
             AND child_resource_id = NONE \
             ORDER BY created_at ASC"
        };

        let mut result = self
            .db
            .query(query)
            .bind(("org_id", org_id.to_string()))
            .bind(("child_type", child_resource_type.to_string()))
            .bind(("child_id", child_resource_id.map(str::to_string)))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<InheritanceRecord> = result.take(0).map_err(DbError::from)?;
        Ok(rows
            .into_iter()
            .map(InheritanceRecord::try_into_inheritance)
            .collect::<Result<Vec<_>, DbError>>()?)
    }
}
