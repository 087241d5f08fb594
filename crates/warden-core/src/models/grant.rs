//! Permission grant domain model.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::WardenError;
use crate::models::delegation::PermissionDelegation;
use crate::models::inheritance::PermissionInheritance;
use crate::response::ErrorBody;

/// Resource type under which custom role assignments are recorded.
///
/// A user grant on `(ROLE_RESOURCE_TYPE, <role id>)` makes the user a
/// holder of that role.
pub const ROLE_RESOURCE_TYPE: &str = "role";

/// The kind of subject a grant targets.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum GranteeType {
    User,
    Role,
    Team,
}

impl GranteeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            GranteeType::User => "user",
            GranteeType::Role => "role",
            GranteeType::Team => "team",
        }
    }
}

impl fmt::Display for GranteeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GranteeType {
    type Err = WardenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(GranteeType::User),
            "role" => Ok(GranteeType::Role),
            "team" => Ok(GranteeType::Team),
            other => Err(WardenError::validation(format!(
                "unknown grantee type: {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PermissionGrant {
    pub id: Uuid,
    pub org_id: Uuid,
    pub grantee_type: GranteeType,
    /// User DID, role id or team id depending on `grantee_type`.
    pub grantee_id: String,
    pub resource_type: String,
    /// `None` grants the permission on every resource of the type.
    pub resource_id: Option<String>,
    pub permission: String,
    /// Opaque condition blob, stored and returned untouched.
    pub conditions: Option<serde_json::Value>,
    pub granted_by: String,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl PermissionGrant {
    pub fn is_live_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_none_or(|expires_at| expires_at > now)
    }

    /// Whether this grant applies to `(resource_type, resource_id)`,
    /// ignoring the permission and expiry.
    pub fn covers_resource(&self, resource_type: &str, resource_id: Option<&str>) -> bool {
        self.resource_type == resource_type
            && (self.resource_id.is_none() || self.resource_id.as_deref() == resource_id)
    }

    /// Full match rule used by permission checks.
    pub fn matches(
        &self,
        resource_type: &str,
        resource_id: Option<&str>,
        permission: &str,
        now: DateTime<Utc>,
    ) -> bool {
        self.permission == permission
            && self.covers_resource(resource_type, resource_id)
            && self.is_live_at(now)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateGrant {
    pub org_id: Uuid,
    pub grantee_type: GranteeType,
    pub grantee_id: String,
    pub resource_type: String,
    pub resource_id: Option<String>,
    pub permission: String,
    pub conditions: Option<serde_json::Value>,
    pub granted_by: String,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Where a grant held by a user comes from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", content = "id", rename_all = "lowercase")]
pub enum GrantSource {
    Direct,
    Role(String),
    Team(Uuid),
}

/// Input of a permission check. `resource_id: None` asks about the
/// resource type as a whole, which only wildcard grants satisfy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PermissionQuery {
    pub user_did: String,
    pub org_id: Uuid,
    pub resource_type: String,
    pub resource_id: Option<String>,
    pub permission: String,
}

impl PermissionQuery {
    pub fn new(
        user_did: impl Into<String>,
        org_id: Uuid,
        resource_type: impl Into<String>,
        resource_id: Option<&str>,
        permission: impl Into<String>,
    ) -> Self {
        Self {
            user_did: user_did.into(),
            org_id,
            resource_type: resource_type.into(),
            resource_id: resource_id.map(str::to_string),
            permission: permission.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SourcedGrant {
    #[serde(flatten)]
    pub grant: PermissionGrant,
    pub source: GrantSource,
}

/// Everything a user holds in one organization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserPermissions {
    pub grants: Vec<SourcedGrant>,
    pub delegations: Vec<PermissionDelegation>,
}

/// Grants covering one resource and the edges it inherits through.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourcePermissions {
    pub grants: Vec<PermissionGrant>,
    pub inherited_from: Vec<PermissionInheritance>,
}

/// Per-input result of a bulk grant, in input order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkGrantItem {
    pub grantee_id: String,
    pub permission: String,
    pub grant: Option<PermissionGrant>,
    /// Why the grant was not created.
    pub error: Option<ErrorBody>,
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    fn grant(resource_id: Option<&str>, expires_at: Option<DateTime<Utc>>) -> PermissionGrant {
        PermissionGrant {
            id: Uuid::new_v4(),
            org_id: Uuid::new_v4(),
            grantee_type: GranteeType::User,
            grantee_id: "did:example:alice".into(),
            resource_type: "project".into(),
            resource_id: resource_id.map(Into::into),
            permission: "read".into(),
            conditions: None,
            granted_by: "did:example:admin".into(),
            expires_at,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn wildcard_grant_covers_every_resource_of_type() {
        let now = Utc::now();
        let g = grant(None, None);
        assert!(g.matches("project", Some("p1"), "read", now));
        assert!(g.matches("project", None, "read", now));
        assert!(!g.matches("document", Some("p1"), "read", now));
        assert!(!g.matches("project", Some("p1"), "write", now));
    }

    #[test]
    fn scoped_grant_requires_exact_resource() {
        let now = Utc::now();
        let g = grant(Some("p1"), None);
        assert!(g.matches("project", Some("p1"), "read", now));
        assert!(!g.matches("project", Some("p2"), "read", now));
        assert!(!g.matches("project", None, "read", now));
    }

    #[test]
    fn expiry_is_exclusive() {
        let now = Utc::now();
        assert!(!grant(None, Some(now)).is_live_at(now));
        assert!(!grant(None, Some(now - Duration::milliseconds(1))).is_live_at(now));
        assert!(grant(None, Some(now + Duration::seconds(1))).is_live_at(now));
    }

    #[test]
    fn grantee_type_round_trips_through_str() {
        for t in [GranteeType::User, GranteeType::Role, GranteeType::Team] {
            assert_eq!(t.as_str().parse::<GranteeType>().unwrap(), t);
        }
        assert!("group".parse::<GranteeType>().is_err());
    }
}
