//! Approval workflow definitions.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::WardenError;
use crate::models::approval::RequestStatus;

/// How many approvers per step must act before the step advances.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalType {
    /// One approval per step, steps in order.
    #[default]
    Sequential,
    /// Every approver of the step must approve.
    Parallel,
    /// The first approval of a step advances it.
    AnyOne,
}

impl ApprovalType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApprovalType::Sequential => "sequential",
            ApprovalType::Parallel => "parallel",
            ApprovalType::AnyOne => "any_one",
        }
    }
}

impl fmt::Display for ApprovalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ApprovalType {
    type Err = WardenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sequential" => Ok(ApprovalType::Sequential),
            "parallel" => Ok(ApprovalType::Parallel),
            "any_one" => Ok(ApprovalType::AnyOne),
            other => Err(WardenError::validation(format!(
                "unknown approval type: {other}"
            ))),
        }
    }
}

/// What happens to a request still pending when its timeout elapses.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum TimeoutAction {
    Approve,
    #[default]
    Reject,
    Expire,
}

impl TimeoutAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimeoutAction::Approve => "approve",
            TimeoutAction::Reject => "reject",
            TimeoutAction::Expire => "expire",
        }
    }

    pub fn resulting_status(&self) -> RequestStatus {
        match self {
            TimeoutAction::Approve => RequestStatus::Approved,
            TimeoutAction::Reject => RequestStatus::Rejected,
            TimeoutAction::Expire => RequestStatus::Expired,
        }
    }
}

impl fmt::Display for TimeoutAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TimeoutAction {
    type Err = WardenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "approve" => Ok(TimeoutAction::Approve),
            "reject" => Ok(TimeoutAction::Reject),
            "expire" => Ok(TimeoutAction::Expire),
            other => Err(WardenError::validation(format!(
                "unknown timeout action: {other}"
            ))),
        }
    }
}

/// The approver set of a single workflow step.
///
/// Serialized as `{"kind": "did", "value": "did:..."}`,
/// `{"kind": "any_of", "value": [...]}` or `{"kind": "role", "value": "admin"}`.
/// A bare string or array is also accepted on input and read as a
/// single DID or a DID set respectively.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
#[serde(from = "ApproverStepRepr")]
pub enum ApproverStep {
    Did(String),
    AnyOf(Vec<String>),
    Role(String),
}

#[derive(Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
enum TaggedStep {
    Did(String),
    AnyOf(Vec<String>),
    Role(String),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ApproverStepRepr {
    Did(String),
    AnyOf(Vec<String>),
    Tagged(TaggedStep),
}

impl From<ApproverStepRepr> for ApproverStep {
    fn from(repr: ApproverStepRepr) -> Self {
        match repr {
            ApproverStepRepr::Did(did) | ApproverStepRepr::Tagged(TaggedStep::Did(did)) => {
                ApproverStep::Did(did)
            }
            ApproverStepRepr::AnyOf(dids) | ApproverStepRepr::Tagged(TaggedStep::AnyOf(dids)) => {
                ApproverStep::AnyOf(dids)
            }
            ApproverStepRepr::Tagged(TaggedStep::Role(role)) => ApproverStep::Role(role),
        }
    }
}

impl ApproverStep {
    /// Whether `did`, holding `roles`, may vote on this step.
    pub fn authorizes(&self, did: &str, roles: &[String]) -> bool {
        match self {
            ApproverStep::Did(expected) => expected == did,
            ApproverStep::AnyOf(dids) => dids.iter().any(|d| d == did),
            ApproverStep::Role(role) => roles.iter().any(|r| r == role),
        }
    }

    /// Distinct approvals a parallel step needs before it advances.
    pub fn required_approvals(&self) -> usize {
        match self {
            ApproverStep::Did(_) | ApproverStep::Role(_) => 1,
            ApproverStep::AnyOf(dids) => {
                let mut unique: Vec<&String> = dids.iter().collect();
                unique.sort();
                unique.dedup();
                unique.len().max(1)
            }
        }
    }

    pub fn is_role(&self) -> bool {
        matches!(self, ApproverStep::Role(_))
    }

    fn validate(&self) -> Result<(), WardenError> {
        let empty = match self {
            ApproverStep::Did(did) => did.trim().is_empty(),
            ApproverStep::Role(role) => role.trim().is_empty(),
            ApproverStep::AnyOf(dids) => dids.is_empty() || dids.iter().any(|d| d.trim().is_empty()),
        };
        if empty {
            return Err(WardenError::validation("approver step must name an approver"));
        }
        Ok(())
    }
}

/// Check a list of steps before it is stored on a workflow.
pub fn validate_approvers(approvers: &[ApproverStep]) -> Result<(), WardenError> {
    if approvers.is_empty() {
        return Err(WardenError::validation(
            "a workflow needs at least one approver step",
        ));
    }
    approvers.iter().try_for_each(ApproverStep::validate)
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ApprovalWorkflow {
    pub id: Uuid,
    pub org_id: Uuid,
    pub name: String,
    pub description: String,
    pub trigger_resource_type: String,
    pub trigger_action: String,
    /// Opaque, stored and returned untouched.
    pub trigger_conditions: Option<serde_json::Value>,
    pub approval_type: ApprovalType,
    pub approvers: Vec<ApproverStep>,
    pub timeout_hours: u32,
    pub on_timeout: TimeoutAction,
    pub enabled: bool,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ApprovalWorkflow {
    pub fn triggers_on(&self, resource_type: &str, action: &str) -> bool {
        self.enabled && self.trigger_resource_type == resource_type && self.trigger_action == action
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateWorkflow {
    pub org_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub trigger_resource_type: String,
    pub trigger_action: String,
    pub trigger_conditions: Option<serde_json::Value>,
    #[serde(default)]
    pub approval_type: ApprovalType,
    pub approvers: Vec<ApproverStep>,
    pub timeout_hours: u32,
    #[serde(default)]
    pub on_timeout: TimeoutAction,
    pub enabled: Option<bool>,
    pub created_by: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UpdateWorkflow {
    pub name: Option<String>,
    pub description: Option<String>,
    pub trigger_resource_type: Option<String>,
    pub trigger_action: Option<String>,
    /// `Some(None)` clears the conditions.
    pub trigger_conditions: Option<Option<serde_json::Value>>,
    pub approval_type: Option<ApprovalType>,
    pub approvers: Option<Vec<ApproverStep>>,
    pub timeout_hours: Option<u32>,
    pub on_timeout: Option<TimeoutAction>,
    pub enabled: Option<bool>,
}
