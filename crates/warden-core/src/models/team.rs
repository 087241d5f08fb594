//! Team domain model.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::WardenError;

/// An organizational sub-team. Teams form a forest through
/// `parent_team_id`; members of a team receive its team grants.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrgTeam {
    pub id: Uuid,
    pub org_id: Uuid,
    pub name: String,
    pub description: String,
    pub parent_team_id: Option<Uuid>,
    pub lead_did: Option<String>,
    pub lead_name: Option<String>,
    pub settings: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateTeam {
    pub org_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub parent_team_id: Option<Uuid>,
    pub lead_did: Option<String>,
    pub lead_name: Option<String>,
    pub settings: Option<serde_json::Value>,
    pub created_by: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UpdateTeam {
    pub name: Option<String>,
    pub description: Option<String>,
    /// `Some(Some(id))` = move under `id`, `Some(None)` = make root, `None` = no change.
    pub parent_team_id: Option<Option<Uuid>>,
    pub settings: Option<serde_json::Value>,
}

/// A team together with its live member count.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamSummary {
    #[serde(flatten)]
    pub team: OrgTeam,
    pub member_count: u64,
}

/// Parent filter for team listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParentFilter {
    #[default]
    Any,
    /// Only teams without a parent.
    Roots,
    /// Only direct children of the given team.
    ChildrenOf(Uuid),
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TeamRole {
    Lead,
    Member,
}

impl TeamRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            TeamRole::Lead => "lead",
            TeamRole::Member => "member",
        }
    }
}

impl fmt::Display for TeamRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TeamRole {
    type Err = WardenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "lead" => Ok(TeamRole::Lead),
            "member" => Ok(TeamRole::Member),
            other => Err(WardenError::validation(format!(
                "unknown team role: {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TeamMember {
    pub id: Uuid,
    pub team_id: Uuid,
    pub member_did: String,
    pub member_name: Option<String>,
    pub team_role: TeamRole,
    pub joined_at: DateTime<Utc>,
    pub invited_by: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddTeamMember {
    pub team_id: Uuid,
    pub member_did: String,
    pub member_name: Option<String>,
    pub team_role: TeamRole,
    pub invited_by: Option<String>,
}
