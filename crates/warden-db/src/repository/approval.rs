//! SurrealDB implementation of [`ApprovalRequestRepository`].
//!
//! Status and step writes are conditional on the request still being
//! pending (and, for step advances, still at the expected step), so two
//! racing writers cannot both move the same request.

use chrono::{DateTime, Utc};
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use uuid::Uuid;
use warden_core::error::WardenResult;
use warden_core::models::approval::{
    ApprovalHistoryFilter, ApprovalRequest, ApprovalResponse, CreateApprovalRequest,
    CreateApprovalResponse, RequestStatus,
};
use warden_core::repository::{ApprovalRequestRepository, PaginatedResult, Pagination};

use super::{CountRow, TouchedRow, single, total};
use crate::convert::{decode_json, encode_json, parse_enum, parse_uuid};
use crate::error::DbError;

const REQUEST: &str = "approval_request";
const RESPONSE: &str = "approval_response";

#[derive(Debug, SurrealValue)]
struct RequestRecord {
    record_id: String,
    workflow_id: String,
    org_id: String,
    requester_did: String,
    requester_name: Option<String>,
    resource_type: String,
    resource_id: Option<String>,
    action: String,
    request_data: String,
    status: String,
    current_step: u32,
    total_steps: u32,
    approval_type: String,
    approvers: String,
    on_timeout: String,
    timeout_at: DateTime<Utc>,
    created_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
}

impl RequestRecord {
    fn try_into_request(self) -> Result<ApprovalRequest, DbError> {
        Ok(ApprovalRequest {
            id: parse_uuid(REQUEST, &self.record_id)?,
            workflow_id: parse_uuid(REQUEST, &self.workflow_id)?,
            org_id: parse_uuid(REQUEST, &self.org_id)?,
            requester_did: self.requester_did,
            requester_name: self.requester_name,
            resource_type: self.resource_type,
            resource_id: self.resource_id,
            action: self.action,
            request_data: decode_json(REQUEST, &self.request_data)?,
            status: parse_enum(REQUEST, &self.status)?,
            current_step: self.current_step,
            total_steps: self.total_steps,
            approval_type: parse_enum(REQUEST, &self.approval_type)?,
            approvers: decode_json(REQUEST, &self.approvers)?,
            on_timeout: parse_enum(REQUEST, &self.on_timeout)?,
            timeout_at: self.timeout_at,
            created_at: self.created_at,
            completed_at: self.completed_at,
        })
    }
}

fn into_requests(rows: Vec<RequestRecord>) -> Result<Vec<ApprovalRequest>, DbError> {
    rows.into_iter().map(RequestRecord::try_into_request).collect()
}

#[derive(Debug, SurrealValue)]
struct ResponseRecord {
    record_id: String,
    request_id: String,
    approver_did: String,
    step: u32,
    decision: String,
    comment: Option<String>,
    created_at: DateTime<Utc>,
}

impl ResponseRecord {
    fn try_into_response(self) -> Result<ApprovalResponse, DbError> {
        Ok(ApprovalResponse {
            id: parse_uuid(RESPONSE, &self.record_id)?,
            request_id: parse_uuid(RESPONSE, &self.request_id)?,
            approver_did: self.approver_did,
            step: self.step,
            decision: parse_enum(RESPONSE, &self.decision)?,
            comment: self.comment,
            created_at: self.created_at,
        })
    }
}

/// SurrealDB implementation of the approval request repository.
#[derive(Clone)]
pub struct SurrealApprovalRequestRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealApprovalRequestRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }
}

impl<C: Connection> ApprovalRequestRepository for SurrealApprovalRequestRepository<C> {
    async fn create(&self, input: CreateApprovalRequest) -> WardenResult<ApprovalRequest> {
        let id_str = Uuid::new_v4().to_string();
        let request_data = encode_json(REQUEST, &input.request_data)?;
        let approvers = encode_json(REQUEST, &input.approvers)?;
        let total_steps = input.approvers.len() as u32;

        let result = self
            .db
            .query(
                "CREATE type::record('approval_request', $id) SET \
                 workflow_id = $workflow_id, org_id = $org_id, \
                 requester_did = $requester_did, requester_name = $requester_name, \
                 resource_type = $resource_type, resource_id = $resource_id, \
                 action = $action, request_data = $request_data, \
                 status = 'pending', current_step = 0, \
                 total_steps = $total_steps, approval_type = $approval_type, \
                 approvers = $approvers, on_timeout = $on_timeout, \
                 timeout_at = $timeout_at; \
                 SELECT meta::id(id) AS record_id, * \
                 FROM type::record('approval_request', $id);",
            )
            .bind(("id", id_str.clone()))
            .bind(("workflow_id", input.workflow_id.to_string()))
            .bind(("org_id", input.org_id.to_string()))
            .bind(("requester_did", input.requester_did))
            .bind(("requester_name", input.requester_name))
            .bind(("resource_type", input.resource_type))
            .bind(("resource_id", input.resource_id))
            .bind(("action", input.action))
            .bind(("request_data", request_data))
            .bind(("total_steps", total_steps))
            .bind(("approval_type", input.approval_type.to_string()))
            .bind(("approvers", approvers))
            .bind(("on_timeout", input.on_timeout.to_string()))
            .bind(("timeout_at", input.timeout_at))
            .await
            .map_err(DbError::from)?;

        let mut result = result.check().map_err(|e| DbError::from_write(REQUEST, e))?;

        let rows: Vec<RequestRecord> = result.take(1).map_err(DbError::from)?;
        Ok(single(rows, REQUEST, id_str)?.try_into_request()?)
    }

    async fn get_by_id(&self, id: Uuid) -> WardenResult<ApprovalRequest> {
        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * \
                 FROM type::record('approval_request', $id)",
            )
            .bind(("id", id.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<RequestRecord> = result.take(0).map_err(DbError::from)?;
        Ok(single(rows, REQUEST, id)?.try_into_request()?)
    }

    async fn count_pending_for_workflow(&self, workflow_id: Uuid) -> WardenResult<u64> {
        let mut result = self
            .db
            .query(
                "SELECT count() AS total FROM approval_request \
                 WHERE workflow_id = $workflow_id AND status = 'pending' GROUP ALL",
            )
            .bind(("workflow_id", workflow_id.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<CountRow> = result.take(0).map_err(DbError::from)?;
        Ok(total(rows))
    }

    async fn list_pending(&self, org_id: Option<Uuid>) -> WardenResult<Vec<ApprovalRequest>> {
        let query = if org_id.is_some() {
            "SELECT meta::id(id) AS record_id, * FROM approval_request \
             WHERE org_id = $org_id AND status = 'pending' \
             ORDER BY created_at ASC"
        } else {
            "SELECT meta::id(id) AS record_id, * FROM approval_request \
             WHERE status = 'pending' ORDER BY created_at ASC"
        };

        let mut result = self
            .db
            .query(query)
            .bind(("org_id", org_id.map(|o| o.to_string())))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<RequestRecord> = result.take(0).map_err(DbError::from)?;
        Ok(into_requests(rows)?)
    }

    async fn advance_step(&self, id: Uuid, from_step: u32) -> WardenResult<Option<ApprovalRequest>> {
        let id_str = id.to_string();

        let result = self
            .db
            .query(
                "UPDATE type::record('approval_request', $id) \
                 SET current_step = $next \
                 WHERE status = 'pending' AND current_step = $from \
                 AND $next < total_steps; \
                 SELECT meta::id(id) AS record_id, * \
                 FROM type::record('approval_request', $id);",
            )
            .bind(("id", id_str.clone()))
            .bind(("from", from_step))
            .bind(("next", from_step + 1))
            .await
            .map_err(DbError::from)?;

        let mut result = result.check().map_err(|e| DbError::from_write(REQUEST, e))?;

        let touched: Vec<TouchedRow> = result.take(0).map_err(DbError::from)?;
        if touched.is_empty() {
            return Ok(None);
        }
        let rows: Vec<RequestRecord> = result.take(1).map_err(DbError::from)?;
        Ok(Some(single(rows, REQUEST, id_str)?.try_into_request()?))
    }

    async fn complete(
        &self,
        id: Uuid,
        status: RequestStatus,
        completed_at: DateTime<Utc>,
    ) -> WardenResult<Option<ApprovalRequest>> {
        let id_str = id.to_string();

        let result = self
            .db
            .query(
                "UPDATE type::record('approval_request', $id) \
                 SET status = $status, completed_at = $completed_at \
                 WHERE status = 'pending'; \
                 SELECT meta::id(id) AS record_id, * \
                 FROM type::record('approval_request', $id);",
            )
            .bind(("id", id_str.clone()))
            .bind(("status", status.to_string()))
            .bind(("completed_at", completed_at))
            .await
            .map_err(DbError::from)?;

        let mut result = result.check().map_err(|e| DbError::from_write(REQUEST, e))?;

        let touched: Vec<TouchedRow> = result.take(0).map_err(DbError::from)?;
        if touched.is_empty() {
            return Ok(None);
        }
        let rows: Vec<RequestRecord> = result.take(1).map_err(DbError::from)?;
        Ok(Some(single(rows, REQUEST, id_str)?.try_into_request()?))
    }

    async fn list(
        &self,
        org_id: Uuid,
        filter: ApprovalHistoryFilter,
        pagination: Pagination,
    ) -> WardenResult<PaginatedResult<ApprovalRequest>> {
        let mut conditions = vec!["org_id = $org_id"];
        if filter.requester_did.is_some() {
            conditions.push("requester_did = $requester_did");
        }
        if filter.workflow_id.is_some() {
            conditions.push("workflow_id = $workflow_id");
        }
        if filter.resource_type.is_some() {
            conditions.push("resource_type = $resource_type");
        }
        if filter.status.is_some() {
            conditions.push("status = $status");
        }
        let where_clause = conditions.join(" AND ");

        let query = format!(
            "SELECT count() AS total FROM approval_request \
             WHERE {where_clause} GROUP ALL; \
             SELECT meta::id(id) AS record_id, * FROM approval_request \
             WHERE {where_clause} \
             ORDER BY created_at DESC \
             LIMIT $limit START $offset;"
        );

        let mut builder = self
            .db
            .query(&query)
            .bind(("org_id", org_id.to_string()))
            .bind(("limit", pagination.limit))
            .bind(("offset", pagination.offset));
        if let Some(requester_did) = filter.requester_did {
            builder = builder.bind(("requester_did", requester_did));
        }
        if let Some(workflow_id) = filter.workflow_id {
            builder = builder.bind(("workflow_id", workflow_id.to_string()));
        }
        if let Some(resource_type) = filter.resource_type {
            builder = builder.bind(("resource_type", resource_type));
        }
        if let Some(status) = filter.status {
            builder = builder.bind(("status", status.to_string()));
        }

        let mut result = builder.await.map_err(DbError::from)?;
        let count_rows: Vec<CountRow> = result.take(0).map_err(DbError::from)?;
        let rows: Vec<RequestRecord> = result.take(1).map_err(DbError::from)?;

        Ok(PaginatedResult {
            items: into_requests(rows)?,
            total: total(count_rows),
            offset: pagination.offset,
            limit: pagination.limit,
        })
    }

    async fn record_response(&self, input: CreateApprovalResponse) -> WardenResult<ApprovalResponse> {
        let id_str = Uuid::new_v4().to_string();

        let result = self
            .db
            .query(
                "CREATE type::record('approval_response', $id) SET \
                 request_id = $request_id, approver_did = $approver_did, \
                 step = $step, decision = $decision, comment = $comment; \
                 SELECT meta::id(id) AS record_id, * \
                 FROM type::record('approval_response', $id);",
            )
            .bind(("id", id_str.clone()))
            .bind(("request_id", input.request_id.to_string()))
            .bind(("approver_did", input.approver_did))
            .bind(("step", input.step))
            .bind(("decision", input.decision.to_string()))
            .bind(("comment", input.comment))
            .await
            .map_err(DbError::from)?;

        let mut result = result.check().map_err(|e| DbError::from_write(RESPONSE, e))?;

        let rows: Vec<ResponseRecord> = result.take(1).map_err(DbError::from)?;
        Ok(single(rows, RESPONSE, id_str)?.try_into_response()?)
    }

    async fn list_responses(&self, request_id: Uuid) -> WardenResult<Vec<ApprovalResponse>> {
        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * FROM approval_response \
                 WHERE request_id = $request_id ORDER BY created_at ASC",
            )
            .bind(("request_id", request_id.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<ResponseRecord> = result.take(0).map_err(DbError::from)?;
        Ok(rows
            .into_iter()
            .map(ResponseRecord::try_into_response)
            .collect::<Result<Vec<_>, DbError>>()?)
    }
}
