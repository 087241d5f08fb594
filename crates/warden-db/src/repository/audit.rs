//! SurrealDB implementation of [`AuditLogRepository`].
//!
//! Append-only: the table denies update and delete.

use chrono::{DateTime, Utc};
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use uuid::Uuid;
use warden_core::error::WardenResult;
use warden_core::models::audit::{AuditLogEntry, CreateAuditLogEntry};
use warden_core::repository::{AuditLogFilter, AuditLogRepository, PaginatedResult, Pagination};

use super::{CountRow, single, total};
use crate::convert::{parse_enum, parse_uuid};
use crate::error::DbError;

const ENTITY: &str = "audit_log";

#[derive(Debug, SurrealValue)]
struct AuditRecord {
    record_id: String,
    org_id: String,
    actor_did: String,
    action: String,
    target: Option<String>,
    outcome: String,
    metadata: serde_json::Value,
    timestamp: DateTime<Utc>,
}

impl AuditRecord {
    fn try_into_entry(self) -> Result<AuditLogEntry, DbError> {
        Ok(AuditLogEntry {
            id: parse_uuid(ENTITY, &self.record_id)?,
            org_id: parse_uuid(ENTITY, &self.org_id)?,
            actor_did: self.actor_did,
            action: self.action,
            target: self.target,
            outcome: parse_enum(ENTITY, &self.outcome)?,
            metadata: self.metadata,
            timestamp: self.timestamp,
        })
    }
}

/// SurrealDB implementation of the audit log repository.
#[derive(Clone)]
pub struct SurrealAuditLogRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealAuditLogRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }
}

impl<C: Connection> AuditLogRepository for SurrealAuditLogRepository<C> {
    async fn append(&self, input: CreateAuditLogEntry) -> WardenResult<AuditLogEntry> {
        let id_str = Uuid::new_v4().to_string();
        let metadata = input
            .metadata
            .unwrap_or(serde_json::Value::Object(Default::default()));

        let result = self
            .db
            .query(
                "CREATE type::record('audit_log', $id) SET \
                 org_id = $org_id, actor_did = $actor_did, action = $action, \
                 target = $target, outcome = $outcome, metadata = $metadata; \
                 SELECT meta::id(id) AS record_id, * \
                 FROM type::record('audit_log', $id);",
            )
            .bind(("id", id_str.clone()))
            .bind(("org_id", input.org_id.to_string()))
            .bind(("actor_did", input.actor_did))
            .bind(("action", input.action))
            .bind(("target", input.target))
            .bind(("outcome", input.outcome.to_string()))
            .bind(("metadata", metadata))
            .await
            .map_err(DbError::from)?;

        let mut result = result.check().map_err(|e| DbError::from_write(ENTITY, e))?;

        let rows: Vec<AuditRecord> = result.take(1).map_err(DbError::from)?;
        Ok(single(rows, ENTITY, id_str)?.try_into_entry()?)
    }

    async fn list(
        &self,
        org_id: Uuid,
        filter: AuditLogFilter,
        pagination: Pagination,
    ) -> WardenResult<PaginatedResult<AuditLogEntry>> {
        let mut conditions = vec!["org_id = $org_id"];
        if filter.actor_did.is_some() {
            conditions.push("actor_did = $actor_did");
        }
        if filter.action.is_some() {
            conditions.push("action = $action");
        }
        if filter.target.is_some() {
            conditions.push("target = $target");
        }
        if filter.from.is_some() {
            conditions.push("timestamp >= $from");
        }
        if filter.to.is_some() {
            conditions.push("timestamp < $to");
        }
        let where_clause = conditions.join(" AND ");

        let query = format!(
            "SELECT count() AS total FROM audit_log \
             WHERE {where_clause} GROUP ALL; \
             SELECT meta::id(id) AS record_id, * FROM audit_log \
             WHERE {where_clause} \
             ORDER BY timestamp DESC \
             LIMIT $limit START $offset;"
        );

        let mut builder = self
            .db
            .query(&query)
            .bind(("org_id", org_id.to_string()))
            .bind(("limit", pagination.limit))
            .bind(("offset", pagination.offset));
        if let Some(actor_did) = filter.actor_did {
            builder = builder.bind(("actor_did", actor_did));
        }
        if let Some(action) = filter.action {
            builder = builder.bind(("action", action));
        }
        if let Some(target) = filter.target {
            builder = builder.bind(("target", target));
        }
        if let Some(from) = filter.from {
            builder = builder.bind(("from", from));
        }
        if let Some(to) = filter.to {
            builder = builder.bind(("to", to));
        }

        let mut result = builder.await.map_err(DbError::from)?;
        let count_rows: Vec<CountRow> = result.take(0).map_err(DbError::from)?;
        let rows: Vec<AuditRecord> = result.take(1).map_err(DbError::from)?;

        let items = rows
            .into_iter()
            .map(AuditRecord::try_into_entry)
            .collect::<Result<Vec<_>, DbError>>()?;

        Ok(PaginatedResult {
            items,
            total: total(count_rows),
            offset: pagination.offset,
            limit: pagination.limit,
        })
    }
}
