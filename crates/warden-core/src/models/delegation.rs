//! Time-boxed permission delegation.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::WardenError;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DelegationStatus {
    Pending,
    Active,
    Revoked,
}

impl DelegationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DelegationStatus::Pending => "pending",
            DelegationStatus::Active => "active",
            DelegationStatus::Revoked => "revoked",
        }
    }
}

impl fmt::Display for DelegationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DelegationStatus {
    type Err = WardenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(DelegationStatus::Pending),
            "active" => Ok(DelegationStatus::Active),
            "revoked" => Ok(DelegationStatus::Revoked),
            other => Err(WardenError::validation(format!(
                "unknown delegation status: {other}"
            ))),
        }
    }
}

/// Restricts a delegation to one resource type, optionally to one
/// resource of that type.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResourceScope {
    pub resource_type: String,
    pub resource_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PermissionDelegation {
    pub id: Uuid,
    pub org_id: Uuid,
    pub delegator_did: String,
    pub delegate_did: String,
    pub permissions: Vec<String>,
    pub resource_scope: Option<ResourceScope>,
    pub reason: Option<String>,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub status: DelegationStatus,
    pub created_at: DateTime<Utc>,
}

impl PermissionDelegation {
    /// Active and inside the half-open window `[start_date, end_date)`.
    pub fn is_effective_at(&self, now: DateTime<Utc>) -> bool {
        self.status == DelegationStatus::Active && self.start_date <= now && now < self.end_date
    }

    pub fn in_scope(&self, resource_type: &str, resource_id: Option<&str>) -> bool {
        match &self.resource_scope {
            None => true,
            Some(scope) => {
                scope.resource_type == resource_type
                    && (scope.resource_id.is_none() || scope.resource_id.as_deref() == resource_id)
            }
        }
    }

    pub fn grants(&self, resource_type: &str, resource_id: Option<&str>, permission: &str) -> bool {
        self.permissions.iter().any(|p| p == permission) && self.in_scope(resource_type, resource_id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateDelegation {
    pub org_id: Uuid,
    pub delegator_did: String,
    pub delegate_did: String,
    pub permissions: Vec<String>,
    pub resource_scope: Option<ResourceScope>,
    pub reason: Option<String>,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
}

/// Which side of a delegation the queried identity is on.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum DelegationDirection {
    /// Delegations the identity handed out.
    Delegated,
    /// Delegations the identity received.
    Received,
    #[default]
    Both,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DelegationFilter {
    pub direction: DelegationDirection,
    pub status: Option<DelegationStatus>,
}
