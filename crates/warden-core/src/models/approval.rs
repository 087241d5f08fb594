//! Approval requests and the responses cast on them.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::WardenError;
use crate::models::workflow::{ApprovalType, ApproverStep, TimeoutAction};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Pending,
    Approved,
    Rejected,
    Expired,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Pending => "pending",
            RequestStatus::Approved => "approved",
            RequestStatus::Rejected => "rejected",
            RequestStatus::Expired => "expired",
        }
    }

    /// Terminal statuses absorb: no transition leaves them.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RequestStatus::Pending)
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RequestStatus {
    type Err = WardenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(RequestStatus::Pending),
            "approved" => Ok(RequestStatus::Approved),
            "rejected" => Ok(RequestStatus::Rejected),
            "expired" => Ok(RequestStatus::Expired),
            other => Err(WardenError::validation(format!(
                "unknown request status: {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Approve,
    Reject,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Decision::Approve => "approve",
            Decision::Reject => "reject",
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Decision {
    type Err = WardenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "approve" => Ok(Decision::Approve),
            "reject" => Ok(Decision::Reject),
            other => Err(WardenError::validation(format!("unknown decision: {other}"))),
        }
    }
}

/// A request for sign-off on an action.
///
/// The workflow's approval type, approver steps and timeout policy are
/// copied onto the request when it is submitted, so later edits to the
/// workflow never change the rules of an in-flight request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ApprovalRequest {
    pub id: Uuid,
    pub workflow_id: Uuid,
    pub org_id: Uuid,
    pub requester_did: String,
    pub requester_name: Option<String>,
    pub resource_type: String,
    pub resource_id: Option<String>,
    pub action: String,
    pub request_data: serde_json::Value,
    pub status: RequestStatus,
    pub current_step: u32,
    pub total_steps: u32,
    pub approval_type: ApprovalType,
    pub approvers: Vec<ApproverStep>,
    pub on_timeout: TimeoutAction,
    pub timeout_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl ApprovalRequest {
    pub fn current_approvers(&self) -> Option<&ApproverStep> {
        self.approvers.get(self.current_step as usize)
    }

    pub fn is_final_step(&self) -> bool {
        self.current_step + 1 >= self.total_steps
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateApprovalRequest {
    pub workflow_id: Uuid,
    pub org_id: Uuid,
    pub requester_did: String,
    pub requester_name: Option<String>,
    pub resource_type: String,
    pub resource_id: Option<String>,
    pub action: String,
    pub request_data: serde_json::Value,
    pub approval_type: ApprovalType,
    pub approvers: Vec<ApproverStep>,
    pub on_timeout: TimeoutAction,
    pub timeout_at: DateTime<Utc>,
}

/// Caller input for `submit_approval`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitApproval {
    pub workflow_id: Uuid,
    pub org_id: Uuid,
    pub requester_did: String,
    pub requester_name: Option<String>,
    pub resource_type: String,
    pub resource_id: Option<String>,
    pub action: String,
    #[serde(default)]
    pub request_data: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ApprovalResponse {
    pub id: Uuid,
    pub request_id: Uuid,
    pub approver_did: String,
    pub step: u32,
    pub decision: Decision,
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateApprovalResponse {
    pub request_id: Uuid,
    pub approver_did: String,
    pub step: u32,
    pub decision: Decision,
    pub comment: Option<String>,
}

/// A request together with every response recorded on it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalRequestDetail {
    pub request: ApprovalRequest,
    pub responses: Vec<ApprovalResponse>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApprovalHistoryFilter {
    pub requester_did: Option<String>,
    pub workflow_id: Option<Uuid>,
    pub resource_type: Option<String>,
    pub status: Option<RequestStatus>,
}
