//! SurrealDB implementation of [`WorkflowRepository`].

use chrono::{DateTime, Utc};
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use uuid::Uuid;
use warden_core::error::WardenResult;
use warden_core::models::workflow::{ApprovalWorkflow, CreateWorkflow, UpdateWorkflow};
use warden_core::repository::WorkflowRepository;

use super::{CountRow, single, total};
use crate::convert::{decode_json, decode_opt_json, encode_json, encode_opt_json, parse_enum, parse_uuid};
use crate::error::DbError;

const ENTITY: &str = "approval_workflow";

#[derive(Debug, SurrealValue)]
struct WorkflowRecord {
    record_id: String,
    org_id: String,
    name: String,
    description: String,
    trigger_resource_type: String,
    trigger_action: String,
    trigger_conditions: Option<String>,
    approval_type: String,
    approvers: String,
    timeout_hours: u32,
    on_timeout: String,
    enabled: bool,
    created_by: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl WorkflowRecord {
    fn try_into_workflow(self) -> Result<ApprovalWorkflow, DbError> {
        Ok(ApprovalWorkflow {
            id: parse_uuid(ENTITY, &self.record_id)?,
            org_id: parse_uuid(ENTITY, &self.org_id)?,
            name: self.name,
            description: self.description,
            trigger_resource_type: self.trigger_resource_type,
            trigger_action: self.trigger_action,
            trigger_conditions: decode_opt_json(ENTITY, self.trigger_conditions.as_deref())?,
            approval_type: parse_enum(ENTITY, &self.approval_type)?,
            approvers: decode_json(ENTITY, &self.approvers)?,
            timeout_hours: self.timeout_hours,
            on_timeout: parse_enum(ENTITY, &self.on_timeout)?,
            enabled: self.enabled,
            created_by: self.created_by,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// SurrealDB implementation of the workflow repository.
#[derive(Clone)]
pub struct SurrealWorkflowRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealWorkflowRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }
}

impl<C: Connection> WorkflowRepository for SurrealWorkflowRepository<C> {
    async fn create(&self, input: CreateWorkflow) -> WardenResult<ApprovalWorkflow> {
        let id_str = Uuid::new_v4().to_string();
        let approvers = encode_json(ENTITY, &input.approvers)?;
        let conditions = encode_opt_json(ENTITY, input.trigger_conditions.as_ref())?;

        let result = self
            .db
            .query(
                "CREATE type::record('approval_workflow', $id) SET \
                 org_id = $org_id, name = $name, description = $description, \
                 trigger_resource_type = $trigger_resource_type, \
                 trigger_action = $trigger_action, \
                 trigger_conditions = $trigger_conditions, \
                 approval_type = $approval_type, approvers = $approvers, \
                 timeout_hours = $timeout_hours, on_timeout = $on_timeout, \
                 enabled = $enabled, created_by = $created_by; \
                 SELECT meta::id(id) AS record_id, * \
                 FROM type::record('approval_workflow', $id);",
            )
            .bind(("id", id_str.clone()))
            .bind(("org_id", input.org_id.to_string()))
            .bind(("name", input.name))
            .bind(("description", input.description.unwrap_or_default()))
            .bind(("trigger_resource_type", input.trigger_resource_type))
            .bind(("trigger_action", input.trigger_action))
            .bind(("trigger_conditions", conditions))
            .bind(("approval_type", input.approval_type.to_string()))
            .bind(("approvers", approvers))
            .bind(("timeout_hours", input.timeout_hours))
            .bind(("on_timeout", input.on_timeout.to_string()))
            .bind(("enabled", input.enabled.unwrap_or(true)))
            .bind(("created_by", input.created_by))
            .await
            .map_err(DbError::from)?;

        let mut result = result.check().map_err(|e| DbError::from_write(ENTITY, e))?;

        let rows: Vec<WorkflowRecord> = result.take(1).map_err(DbError::from)?;
        Ok(single(rows, ENTITY, id_str)?.try_into_workflow()?)
    }

    async fn get_by_id(&self, id: Uuid) -> WardenResult<ApprovalWorkflow> {
        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * \
                 FROM type::record('approval_workflow', $id)",
            )
            .bind(("id", id.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<WorkflowRecord> = result.take(0).map_err(DbError::from)?;
        Ok(single(rows, ENTITY, id)?.try_into_workflow()?)
    }

    async fn update(
        &self,
        org_id: Uuid,
        id: Uuid,
        input: UpdateWorkflow,
    ) -> WardenResult<ApprovalWorkflow> {
        let id_str = id.to_string();

        let mut sets = Vec::new();
        if input.name.is_some() {
            sets.push("name = $name");
        }
        if input.description.is_some() {
            sets.push("description = $description");
        }
        if input.trigger_resource_type.is_some() {
            sets.push("trigger_resource_type = $trigger_resource_type");
        }
        if input.trigger_action.is_some() {
            sets.push("trigger_action = $trigger_action");
        }
        match &input.trigger_conditions {
            Some(Some(_)) => sets.push("trigger_conditions = $trigger_conditions"),
            Some(None) => sets.push("trigger_conditions = NONE"),
            None => {}
        }
        if input.approval_type.is_some() {
            sets.push("approval_type = $approval_type");
        }
        if input.approvers.is_some() {
            sets.push("approvers = $approvers");
        }
        if input.timeout_hours.is_some() {
            sets.push("timeout_hours = $timeout_hours");
        }
        if input.on_timeout.is_some() {
            sets.push("on_timeout = $on_timeout");
        }
        if input.enabled.is_some() {
            sets.push("enabled = $enabled");
        }
        sets.push("updated_at = time::now()");

        let query = format!(
            "UPDATE type::record('approval_workflow', $id) SET {} \
             WHERE org_id = $org_id; \
             SELECT meta::id(id) AS record_id, * \
             FROM type::record('approval_workflow', $id) WHERE org_id = $org_id;",
            sets.join(", ")
        );

        let mut builder = self
            .db
            .query(&query)
            .bind(("id", id_str.clone()))
            .bind(("org_id", org_id.to_string()));

        if let Some(name) = input.name {
            builder = builder.bind(("name", name));
        }
        if let Some(description) = input.description {
            builder = builder.bind(("description", description));
        }
        if let Some(resource_type) = input.trigger_resource_type {
            builder = builder.bind(("trigger_resource_type", resource_type));
        }
        if let Some(action) = input.trigger_action {
            builder = builder.bind(("trigger_action", action));
        }
        if let Some(Some(conditions)) = &input.trigger_conditions {
            builder = builder.bind(("trigger_conditions", encode_json(ENTITY, conditions)?));
        }
        if let Some(approval_type) = input.approval_type {
            builder = builder.bind(("approval_type", approval_type.to_string()));
        }
        if let Some(approvers) = &input.approvers {
            builder = builder.bind(("approvers", encode_json(ENTITY, approvers)?));
        }
        if let Some(timeout_hours) = input.timeout_hours {
            builder = builder.bind(("timeout_hours", timeout_hours));
        }
        if let Some(on_timeout) = input.on_timeout {
            builder = builder.bind(("on_timeout", on_timeout.to_string()));
        }
        if let Some(enabled) = input.enabled {
            builder = builder.bind(("enabled", enabled));
        }

        let result = builder.await.map_err(DbError::from)?;
        let mut result = result.check().map_err(|e| DbError::from_write(ENTITY, e))?;

        let rows: Vec<WorkflowRecord> = result.take(1).map_err(DbError::from)?;
        Ok(single(rows, ENTITY, id_str)?.try_into_workflow()?)
    }

    async fn delete(&self, org_id: Uuid, id: Uuid) -> WardenResult<()> {
        let mut result = self
            .db
            .query(
                "SELECT count() AS total FROM type::record('approval_workflow', $id) \
                 WHERE org_id = $org_id GROUP ALL; \
                 DELETE type::record('approval_workflow', $id) WHERE org_id = $org_id;",
            )
            .bind(("id", id.to_string()))
            .bind(("org_id", org_id.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<CountRow> = result.take(0).map_err(DbError::from)?;
        if total(rows) == 0 {
            return Err(DbError::not_found(ENTITY, id).into());
        }
        Ok(())
    }

    async fn list(&self, org_id: Uuid) -> WardenResult<Vec<ApprovalWorkflow>> {
        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * FROM approval_workflow \
                 WHERE org_id = $org_id ORDER BY created_at ASC",
            )
            .bind(("org_id", org_id.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<WorkflowRecord> = result.take(0).map_err(DbError::from)?;
        Ok(rows
            .into_iter()
            .map(WorkflowRecord::try_into_workflow)
            .collect::<Result<Vec<_>, DbError>>()?)
    }
}
