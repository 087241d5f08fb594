//! SurrealDB implementation of [`TeamRepository`].

use chrono::{DateTime, Utc};
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use uuid::Uuid;
use warden_core::error::WardenResult;
use warden_core::models::team::{
    AddTeamMember, CreateTeam, OrgTeam, ParentFilter, TeamMember, UpdateTeam,
};
use warden_core::repository::TeamRepository;

use super::{CountRow, single, total};
use crate::convert::{parse_enum, parse_opt_uuid, parse_uuid};
use crate::error::DbError;

const TEAM: &str = "org_team";
const MEMBER: &str = "team_member";

#[derive(Debug, SurrealValue)]
struct TeamRecord {
    record_id: String,
    org_id: String,
    name: String,
    description: String,
    parent_team_id: Option<String>,
    lead_did: Option<String>,
    lead_name: Option<String>,
    settings: serde_json::Value,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TeamRecord {
    fn try_into_team(self) -> Result<OrgTeam, DbError> {
        Ok(OrgTeam {
            id: parse_uuid(TEAM, &self.record_id)?,
            org_id: parse_uuid(TEAM, &self.org_id)?,
            name: self.name,
            description: self.description,
            parent_team_id: parse_opt_uuid(TEAM, self.parent_team_id.as_deref())?,
            lead_did: self.lead_did,
            lead_name: self.lead_name,
            settings: self.settings,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(Debug, SurrealValue)]
struct MemberRecord {
    record_id: String,
    team_id: String,
    member_did: String,
    member_name: Option<String>,
    team_role: String,
    invited_by: Option<String>,
    joined_at: DateTime<Utc>,
}

impl MemberRecord {
    fn try_into_member(self) -> Result<TeamMember, DbError> {
        Ok(TeamMember {
            id: parse_uuid(MEMBER, &self.record_id)?,
            team_id: parse_uuid(MEMBER, &self.team_id)?,
            member_did: self.member_did,
            member_name: self.member_name,
            team_role: parse_enum(MEMBER, &self.team_role)?,
            joined_at: self.joined_at,
            invited_by: self.invited_by,
        })
    }
}

#[derive(Debug, SurrealValue)]
struct TeamIdRow {
    team_id: String,
}

/// SurrealDB implementation of the team repository.
#[derive(Clone)]
pub struct SurrealTeamRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealTeamRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }
}

impl<C: Connection> TeamRepository for SurrealTeamRepository<C> {
    async fn create(&self, input: CreateTeam) -> WardenResult<OrgTeam> {
        let id = Uuid::new_v4();
        let org_id = input.org_id;
        let settings = input
            .settings
            .unwrap_or(serde_json::Value::Object(Default::default()));

        let mut query = String::from(
            "BEGIN TRANSACTION; \
             CREATE type::record('org_team', $id) SET \
             org_id = $org_id, name = $name, description = $description, \
             parent_team_id = $parent_team_id, lead_did = $lead_did, \
             lead_name = $lead_name, settings = $settings, \
             created_by = $created_by; ",
        );
        if input.lead_did.is_some() {
            query.push_str(
                "CREATE type::record('team_member', $member_id) SET \
                 org_id = $org_id, team_id = $id, member_did = $lead_did, \
                 member_name = $lead_name, team_role = 'lead', \
                 invited_by = $created_by; ",
            );
        }
        query.push_str("COMMIT TRANSACTION;");

        let mut response = self
            .db
            .query(&query)
            .bind(("id", id.to_string()))
            .bind(("member_id", Uuid::new_v4().to_string()))
            .bind(("org_id", org_id.to_string()))
            .bind(("name", input.name))
            .bind(("description", input.description.unwrap_or_default()))
            .bind(("parent_team_id", input.parent_team_id.map(|p| p.to_string())))
            .bind(("lead_did", input.lead_did))
            .bind(("lead_name", input.lead_name))
            .bind(("settings", settings))
            .bind(("created_by", input.created_by))
            .await
            .map_err(DbError::from)?;

        let errors = response.take_errors();
        if !errors.is_empty() {
            return Err(DbError::from_transaction(TEAM, errors.into_values()).into());
        }

        self.get_by_id(org_id, id).await
    }

    async fn get_by_id(&self, org_id: Uuid, id: Uuid) -> WardenResult<OrgTeam> {
        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * \
                 FROM type::record('org_team', $id) WHERE org_id = $org_id",
            )
            .bind(("id", id.to_string()))
            .bind(("org_id", org_id.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<TeamRecord> = result.take(0).map_err(DbError::from)?;
        Ok(single(rows, TEAM, id)?.try_into_team()?)
    }

    async fn get_by_name(&self, org_id: Uuid, name: &str) -> WardenResult<Option<OrgTeam>> {
        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * FROM org_team \
                 WHERE org_id = $org_id AND name = $name LIMIT 1",
            )
            .bind(("org_id", org_id.to_string()))
            .bind(("name", name.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<TeamRecord> = result.take(0).map_err(DbError::from)?;
        Ok(rows
            .into_iter()
            .next()
            .map(TeamRecord::try_into_team)
            .transpose()?)
    }

    async fn update(&self, org_id: Uuid, id: Uuid, input: UpdateTeam) -> WardenResult<OrgTeam> {
        let id_str = id.to_string();

        let mut sets = Vec::new();
        if input.name.is_some() {
            sets.push("name = $name");
        }
        if input.description.is_some() {
            sets.push("description = $description");
        }
        match input.parent_team_id {
            Some(Some(_)) => sets.push("parent_team_id = $parent_team_id"),
            Some(None) => sets.push("parent_team_id = NONE"),
            None => {}
        }
        if input.settings.is_some() {
            sets.push("settings = $settings");
        }
        sets.push("updated_at = time::now()");

        let query = format!(
            "UPDATE type::record('org_team', $id) SET {} \
             WHERE org_id = $org_id; \
             SELECT meta::id(id) AS record_id, * \
             FROM type::record('org_team', $id) WHERE org_id = $org_id;",
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
        if let Some(Some(parent)) = input.parent_team_id {
            builder = builder.bind(("parent_team_id", parent.to_string()));
        }
        if let Some(settings) = input.settings {
            builder = builder.bind(("settings", settings));
        }

        let result = builder.await.map_err(DbError::from)?;
        let mut result = result.check().map_err(|e| DbError::from_write(TEAM, e))?;

        let rows: Vec<TeamRecord> = result.take(1).map_err(DbError::from)?;
        Ok(single(rows, TEAM, id_str)?.try_into_team()?)
    }

    async fn assign_lead(
        &self,
        org_id: Uuid,
        id: Uuid,
        lead_did: &str,
        lead_name: Option<String>,
        invited_by: &str,
    ) -> WardenResult<OrgTeam> {
        let mut response = self
            .db
            .query(
                "BEGIN TRANSACTION; \
                 UPDATE team_member SET team_role = 'member' \
                 WHERE team_id = $team_id AND team_role = 'lead' \
                 AND member_did != $lead_did; \
                 LET $existing = SELECT VALUE id FROM team_member \
                 WHERE team_id = $team_id AND member_did = $lead_did; \
                 IF array::len($existing) > 0 { \
                     UPDATE team_member SET team_role = 'lead' \
                     WHERE team_id = $team_id AND member_did = $lead_did; \
                 } ELSE { \
                     CREATE type::record('team_member', $member_id) SET \
                     org_id = $org_id, team_id = $team_id, \
                     member_did = $lead_did, member_name = $lead_name, \
                     team_role = 'lead', invited_by = $invited_by; \
                 }; \
                 UPDATE type::record('org_team', $team_id) SET \
                 lead_did = $lead_did, lead_name = $lead_name, \
                 updated_at = time::now() \
                 WHERE org_id = $org_id; \
                 COMMIT TRANSACTION;",
            )
            .bind(("team_id", id.to_string()))
            .bind(("member_id", Uuid::new_v4().to_string()))
            .bind(("org_id", org_id.to_string()))
            .bind(("lead_did", lead_did.to_string()))
            .bind(("lead_name", lead_name))
            .bind(("invited_by", invited_by.to_string()))
            .await
            .map_err(DbError::from)?;

        let errors = response.take_errors();
        if !errors.is_empty() {
            return Err(DbError::from_transaction(MEMBER, errors.into_values()).into());
        }

        self.get_by_id(org_id, id).await
    }

    async fn delete(&self, org_id: Uuid, id: Uuid) -> WardenResult<()> {
        let id_str = id.to_string();
        let org_id_str = org_id.to_string();

        let mut check = self
            .db
            .query(
                "SELECT count() AS total FROM type::record('org_team', $id) \
                 WHERE org_id = $org_id GROUP ALL",
            )
            .bind(("id", id_str.clone()))
            .bind(("org_id", org_id_str.clone()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<CountRow> = check.take(0).map_err(DbError::from)?;
        if total(rows) == 0 {
            return Err(DbError::not_found(TEAM, id_str).into());
        }

        // Membership rows go first, then the team record.
        self.db
            .query(
                "DELETE team_member WHERE team_id = $id; \
                 DELETE type::record('org_team', $id) WHERE org_id = $org_id;",
            )
            .bind(("id", id_str))
            .bind(("org_id", org_id_str))
            .await
            .map_err(DbError::from)?;

        Ok(())
    }

    async fn list(&self, org_id: Uuid, parent: ParentFilter) -> WardenResult<Vec<OrgTeam>> {
        let filter = match parent {
            ParentFilter::Any => "",
            ParentFilter::Roots => "AND parent_team_id = NONE",
            ParentFilter::ChildrenOf(_) => "AND parent_team_id = $parent_id",
        };
        let query = format!(
            "SELECT meta::id(id) AS record_id, * FROM org_team \
             WHERE org_id = $org_id {filter} ORDER BY name ASC"
        );

        let mut builder = self.db.query(&query).bind(("org_id", org_id.to_string()));
        if let ParentFilter::ChildrenOf(parent_id) = parent {
            builder = builder.bind(("parent_id", parent_id.to_string()));
        }

        let mut result = builder.await.map_err(DbError::from)?;
        let rows: Vec<TeamRecord> = result.take(0).map_err(DbError::from)?;
        Ok(rows
            .into_iter()
            .map(TeamRecord::try_into_team)
            .collect::<Result<Vec<_>, DbError>>()?)
    }

    async fn count_children(&self, org_id: Uuid, id: Uuid) -> WardenResult<u64> {
        let mut result = self
            .db
            .query(
                "SELECT count() AS total FROM org_team \
                 WHERE org_id = $org_id AND parent_team_id = $id GROUP ALL",
            )
            .bind(("org_id", org_id.to_string()))
            .bind(("id", id.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<CountRow> = result.take(0).map_err(DbError::from)?;
        Ok(total(rows))
    }

    async fn add_member(&self, org_id: Uuid, input: AddTeamMember) -> WardenResult<TeamMember> {
        let id_str = Uuid::new_v4().to_string();

        let result = self
            .db
            .query(
                "CREATE type::record('team_member', $id) SET \
                 org_id = $org_id, team_id = $team_id, \
                 member_did = $member_did, member_name = $member_name, \
                 team_role = $team_role, invited_by = $invited_by; \
                 SELECT meta::id(id) AS record_id, * \
                 FROM type::record('team_member', $id);",
            )
            .bind(("id", id_str.clone()))
            .bind(("org_id", org_id.to_string()))
            .bind(("team_id", input.team_id.to_string()))
            .bind(("member_did", input.member_did))
            .bind(("member_name", input.member_name))
            .bind(("team_role", input.team_role.to_string()))
            .bind(("invited_by", input.invited_by))
            .await
            .map_err(DbError::from)?;

        let mut result = result.check().map_err(|e| DbError::from_write(MEMBER, e))?;

        let rows: Vec<MemberRecord> = result.take(1).map_err(DbError::from)?;
        Ok(single(rows, MEMBER, id_str)?.try_into_member()?)
    }

    async fn get_member(&self, team_id: Uuid, member_did: &str) -> WardenResult<Option<TeamMember>> {
        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * FROM team_member \
                 WHERE team_id = $team_id AND member_did = $member_did LIMIT 1",
            )
            .bind(("team_id", team_id.to_string()))
            .bind(("member_did", member_did.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<MemberRecord> = result.take(0).map_err(DbError::from)?;
        Ok(rows
            .into_iter()
            .next()
            .map(MemberRecord::try_into_member)
            .transpose()?)
    }

    async fn remove_member(&self, team_id: Uuid, member_did: &str) -> WardenResult<bool> {
        let mut response = self
            .db
            .query(
                "SELECT count() AS total FROM team_member \
                 WHERE team_id = $team_id AND member_did = $member_did GROUP ALL; \
                 BEGIN TRANSACTION; \
                 DELETE team_member \
                 WHERE team_id = $team_id AND member_did = $member_did; \
                 UPDATE type::record('org_team', $team_id) SET \
                 lead_did = NONE, lead_name = NONE, updated_at = time::now() \
                 WHERE lead_did = $member_did; \
                 COMMIT TRANSACTION;",
            )
            .bind(("team_id", team_id.to_string()))
            .bind(("member_did", member_did.to_string()))
            .await
            .map_err(DbError::from)?;

        let errors = response.take_errors();
        if !errors.is_empty() {
            return Err(DbError::from_transaction(MEMBER, errors.into_values()).into());
        }

        let rows: Vec<CountRow> = response.take(0).map_err(DbError::from)?;
        Ok(total(rows) > 0)
    }

    async fn list_members(&self, team_id: Uuid) -> WardenResult<Vec<TeamMember>> {
        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * FROM team_member \
                 WHERE team_id = $team_id ORDER BY joined_at ASC",
            )
            .bind(("team_id", team_id.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<MemberRecord> = result.take(0).map_err(DbError::from)?;
        Ok(rows
            .into_iter()
            .map(MemberRecord::try_into_member)
            .collect::<Result<Vec<_>, DbError>>()?)
    }

    async fn count_members(&self, team_id: Uuid) -> WardenResult<u64> {
        let mut result = self
            .db
            .query(
                "SELECT count() AS total FROM team_member \
                 WHERE team_id = $team_id GROUP ALL",
            )
            .bind(("team_id", team_id.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<CountRow> = result.take(0).map_err(DbError::from)?;
        Ok(total(rows))
    }

    async fn list_member_team_ids(&self, org_id: Uuid, member_did: &str) -> WardenResult<Vec<Uuid>> {
        let mut result = self
            .db
            .query(
                "SELECT team_id FROM team_member \
                 WHERE org_id = $org_id AND member_did = $member_did",
            )
            .bind(("org_id", org_id.to_string()))
            .bind(("member_did", member_did.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<TeamIdRow> = result.take(0).map_err(DbError::from)?;
        Ok(rows
            .iter()
            .map(|row| parse_uuid(MEMBER, &row.team_id))
            .collect::<Result<Vec<_>, DbError>>()?)
    }
}
