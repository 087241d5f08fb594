//! SurrealDB implementation of [`DelegationRepository`].

use chrono::{DateTime, Utc};
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use uuid::Uuid;
use warden_core::error::WardenResult;
use warden_core::models::delegation::{
    CreateDelegation, DelegationDirection, DelegationFilter, DelegationStatus,
    PermissionDelegation, ResourceScope,
};
use warden_core::repository::DelegationRepository;

use super::{TouchedRow, single};
use crate::convert::{parse_enum, parse_uuid};
use crate::error::DbError;

const ENTITY: &str = "permission_delegation";

#[derive(Debug, SurrealValue)]
struct DelegationRecord {
    record_id: String,
    org_id: String,
    delegator_did: String,
    delegate_did: String,
    permissions: Vec<String>,
    scope_resource_type: Option<String>,
    scope_resource_id: Option<String>,
    reason: Option<String>,
    start_date: DateTime<Utc>,
    end_date: DateTime<Utc>,
    status: String,
    created_at: DateTime<Utc>,
}

impl DelegationRecord {
    fn try_into_delegation(self) -> Result<PermissionDelegation, DbError> {
        let resource_scope = self.scope_resource_type.map(|resource_type| ResourceScope {
            resource_type,
            resource_id: self.scope_resource_id,
        });
        Ok(PermissionDelegation {
            id: parse_uuid(ENTITY, &self.record_id)?,
            org_id: parse_uuid(ENTITY, &self.org_id)?,
            delegator_did: self.delegator_did,
            delegate_did: self.delegate_did,
            permissions: self.permissions,
            resource_scope,
            reason: self.reason,
            start_date: self.start_date,
            end_date: self.end_date,
            status: parse_enum(ENTITY, &self.status)?,
            created_at: self.created_at,
        })
    }
}

fn into_delegations(rows: Vec<DelegationRecord>) -> Result<Vec<PermissionDelegation>, DbError> {
    rows.into_iter()
        .map(DelegationRecord::try_into_delegation)
        .collect()
}

/// SurrealDB implementation of the delegation repository.
#[derive(Clone)]
pub struct SurrealDelegationRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealDelegationRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }
}

impl<C: Connection> DelegationRepository for SurrealDelegationRepository<C> {
    async fn create(&self, input: CreateDelegation) -> WardenResult<PermissionDelegation> {
        let id_str = Uuid::new_v4().to_string();
        let (scope_type, scope_id) = match input.resource_scope {
            Some(scope) => (Some(scope.resource_type), scope.resource_id),
            None => (None, None),
        };

        let result = self
            .db
            .query(
                "CREATE type::record('permission_delegation', $id) SET \
                 org_id = $org_id, delegator_did = $delegator_did, \
                 delegate_did = $delegate_did, permissions = $permissions, \
                 scope_resource_type = $scope_type, \
                 scope_resource_id = $scope_id, reason = $reason, \
                 start_date = $start_date, end_date = $end_date, \
                 status = 'pending'; \
                 SELECT meta::id(id) AS record_id, * \
                 FROM type::record('permission_delegation', $id);",
            )
            .bind(("id", id_str.clone()))
            .bind(("org_id", input.org_id.to_string()))
            .bind(("delegator_did", input.delegator_did))
            .bind(("delegate_did", input.delegate_did))
            .bind(("permissions", input.permissions))
            .bind(("scope_type", scope_type))
            .bind(("scope_id", scope_id))
            .bind(("reason", input.reason))
            .bind(("start_date", input.start_date))
            .bind(("end_date", input.end_date))
            .await
            .map_err(DbError::from)?;

        let mut result = result.check().map_err(|e| DbError::from_write(ENTITY, e))?;

        let rows: Vec<DelegationRecord> = result.take(1).map_err(DbError::from)?;
        Ok(single(rows, ENTITY, id_str)?.try_into_delegation()?)
    }

    async fn get_by_id(&self, id: Uuid) -> WardenResult<PermissionDelegation> {
        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * \
                 FROM type::record('permission_delegation', $id)",
            )
            .bind(("id", id.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<DelegationRecord> = result.take(0).map_err(DbError::from)?;
        Ok(single(rows, ENTITY, id)?.try_into_delegation()?)
    }

    async fn transition(
        &self,
        id: Uuid,
        from: DelegationStatus,
        to: DelegationStatus,
    ) -> WardenResult<Option<PermissionDelegation>> {
        let id_str = id.to_string();

        let result = self
            .db
            .query(
                "UPDATE type::record('permission_delegation', $id) \
                 SET status = $to, updated_at = time::now() \
                 WHERE status = $from; \
                 SELECT meta::id(id) AS record_id, * \
                 FROM type::record('permission_delegation', $id);",
            )
            .bind(("id", id_str.clone()))
            .bind(("from", from.to_string()))
            .bind(("to", to.to_string()))
            .await
            .map_err(DbError::from)?;

        let mut result = result.check().map_err(|e| DbError::from_write(ENTITY, e))?;

        let touched: Vec<TouchedRow> = result.take(0).map_err(DbError::from)?;
        if touched.is_empty() {
            return Ok(None);
        }
        let rows: Vec<DelegationRecord> = result.take(1).map_err(DbError::from)?;
        Ok(Some(single(rows, ENTITY, id_str)?.try_into_delegation()?))
    }

    async fn list(
        &self,
        org_id: Uuid,
        did: &str,
        filter: DelegationFilter,
    ) -> WardenResult<Vec<PermissionDelegation>> {
        let mut conditions = vec!["org_id = $org_id"];
        conditions.push(match filter.direction {
            DelegationDirection::Delegated => "delegator_did = $did",
            DelegationDirection::Received => "delegate_did = $did",
            DelegationDirection::Both => "(delegator_did = $did OR delegate_did = $did)",
        });
        if filter.status.is_some() {
            conditions.push("status = $status");
        }

        let query = format!(
            "SELECT meta::id(id) AS record_id, * FROM permission_delegation \
             WHERE {} ORDER BY created_at DESC",
            conditions.join(" AND ")
        );

        let mut builder = self
            .db
            .query(&query)
            .bind(("org_id", org_id.to_string()))
            .bind(("did", did.to_string()));
        if let Some(status) = filter.status {
            builder = builder.bind(("status", status.to_string()));
        }

        let mut result = builder.await.map_err(DbError::from)?;
        let rows: Vec<DelegationRecord> = result.take(0).map_err(DbError::from)?;
        Ok(into_delegations(rows)?)
    }

    async fn list_active_for_delegate(
        &self,
        org_id: Uuid,
        delegate_did: &str,
    ) -> WardenResult<Vec<PermissionDelegation>> {
        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * FROM permission_delegation \
                 WHERE org_id = $org_id AND delegate_did = $did \
                 AND status = 'active' \
                 ORDER BY created_at ASC",
            )
            .bind(("org_id", org_id.to_string()))
            .bind(("did", delegate_did.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<DelegationRecord> = result.take(0).map_err(DbError::from)?;
        Ok(into_delegations(rows)?)
    }
}
