//! Organization membership.
//!
//! Memberships are provisioned by an external collaborator. Warden only
//! reads the member's organization role when resolving role grants.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OrgMember {
    pub org_id: Uuid,
    pub member_did: String,
    /// Organization-level role (e.g. `owner`, `admin`, `member`).
    pub role: String,
    pub joined_at: DateTime<Utc>,
}
