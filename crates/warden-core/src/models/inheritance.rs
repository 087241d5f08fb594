//! Resource inheritance edges.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A `(resource_type, resource_id)` pair.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceRef {
    pub resource_type: String,
    pub resource_id: Option<String>,
}

impl ResourceRef {
    pub fn new(resource_type: impl Into<String>, resource_id: Option<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            resource_id,
        }
    }
}

/// A child resource resolves permissions from its parent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PermissionInheritance {
    pub id: Uuid,
    pub org_id: Uuid,
    pub parent_resource_type: String,
    pub parent_resource_id: Option<String>,
    pub child_resource_type: String,
    pub child_resource_id: Option<String>,
    /// `None` inherits everything; otherwise only the listed permissions.
    pub inherit_permissions: Option<Vec<String>>,
    pub created_at: DateTime<Utc>,
}

impl PermissionInheritance {
    pub fn allows(&self, permission: &str) -> bool {
        self.inherit_permissions
            .as_ref()
            .is_none_or(|allowed| allowed.iter().any(|p| p == permission))
    }

    pub fn parent(&self) -> ResourceRef {
        ResourceRef::new(
            self.parent_resource_type.clone(),
            self.parent_resource_id.clone(),
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateInheritance {
    pub org_id: Uuid,
    pub parent_resource_type: String,
    pub parent_resource_id: Option<String>,
    pub child_resource_type: String,
    pub child_resource_id: Option<String>,
    pub inherit_permissions: Option<Vec<String>>,
    pub created_by: String,
}
