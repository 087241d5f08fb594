//! Organization teams: a forest of named groups whose members receive
//! the team's grants.

use std::collections::HashSet;
use std::sync::Arc;

use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;
use warden_core::error::{DomainError, WardenError, WardenResult};
use warden_core::models::team::{
    AddTeamMember, CreateTeam, OrgTeam, ParentFilter, TeamMember, TeamRole, TeamSummary,
    UpdateTeam,
};
use warden_core::repository::{Store, TeamRepository};

use crate::audit;
use crate::cache::DecisionCache;

pub struct TeamManager<S: Store> {
    store: S,
    cache: Arc<DecisionCache>,
}

impl<S: Store> TeamManager<S> {
    pub fn new(store: S, cache: Arc<DecisionCache>) -> Self {
        Self { store, cache }
    }

    /// Create a team. A lead, if given, is enrolled with the `lead` role.
    pub async fn create_team(&self, input: CreateTeam) -> WardenResult<OrgTeam> {
        let name = input.name.trim().to_string();
        if name.is_empty() {
            return Err(WardenError::validation("team name must not be empty"));
        }
        let org_id = input.org_id;
        if let Some(parent_id) = input.parent_team_id {
            self.store.teams().get_by_id(org_id, parent_id).await?;
        }
        if self.store.teams().get_by_name(org_id, &name).await?.is_some() {
            return Err(DomainError::TeamNameExists.into());
        }

        let created_by = input.created_by.clone();
        let input = CreateTeam { name, ..input };
        let team = self
            .store
            .teams()
            .create(input)
            .await
            .map_err(team_name_taken)?;

        if let Some(lead_did) = &team.lead_did {
            self.cache.invalidate_user(lead_did);
        }

        info!(%org_id, team_id = %team.id, name = %team.name, "Team created");
        audit::record(
            &self.store,
            org_id,
            &created_by,
            "team.create",
            Some(team.id.to_string()),
            json!({ "name": team.name, "parent_team_id": team.parent_team_id }),
        )
        .await;

        Ok(team)
    }

    /// Rename, describe or re-parent a team. Moving a team under one of
    /// its own descendants is rejected.
    pub async fn update_team(
        &self,
        org_id: Uuid,
        team_id: Uuid,
        input: UpdateTeam,
        updated_by: &str,
    ) -> WardenResult<OrgTeam> {
        let current = self.store.teams().get_by_id(org_id, team_id).await?;

        let mut input = input;
        if let Some(name) = input.name.take() {
            let name = name.trim().to_string();
            if name.is_empty() {
                return Err(WardenError::validation("team name must not be empty"));
            }
            if name != current.name {
                if let Some(existing) = self.store.teams().get_by_name(org_id, &name).await? {
                    if existing.id != team_id {
                        return Err(DomainError::TeamNameExists.into());
                    }
                }
            }
            input.name = Some(name);
        }
        if let Some(Some(parent_id)) = input.parent_team_id {
            self.ensure_not_descendant(org_id, team_id, parent_id).await?;
        }

        let team = self
            .store
            .teams()
            .update(org_id, team_id, input)
            .await
            .map_err(team_name_taken)?;

        info!(%org_id, %team_id, "Team updated");
        audit::record(
            &self.store,
            org_id,
            updated_by,
            "team.update",
            Some(team_id.to_string()),
            json!({ "name": team.name, "parent_team_id": team.parent_team_id }),
        )
        .await;

        Ok(team)
    }

    /// Delete a child-free team together with its memberships.
    pub async fn delete_team(&self, org_id: Uuid, team_id: Uuid, deleted_by: &str) -> WardenResult<()> {
        let team = self.store.teams().get_by_id(org_id, team_id).await?;
        if self.store.teams().count_children(org_id, team_id).await? > 0 {
            return Err(DomainError::HasSubTeams.into());
        }

        let members = self.store.teams().list_members(team_id).await?;
        self.store.teams().delete(org_id, team_id).await?;
        for member in &members {
            self.cache.invalidate_user(&member.member_did);
        }

        info!(%org_id, %team_id, members = members.len(), "Team deleted");
        audit::record(
            &self.store,
            org_id,
            deleted_by,
            "team.delete",
            Some(team_id.to_string()),
            json!({ "name": team.name }),
        )
        .await;

        Ok(())
    }

    pub async fn add_member(&self, org_id: Uuid, input: AddTeamMember) -> WardenResult<TeamMember> {
        if input.member_did.trim().is_empty() {
            return Err(WardenError::validation("member_did must not be empty"));
        }
        let team = self.store.teams().get_by_id(org_id, input.team_id).await?;
        if input.team_role == TeamRole::Lead {
            let member_name = input.member_name.clone();
            let invited_by = input.invited_by.clone().unwrap_or_default();
            if self
                .store
                .teams()
                .get_member(team.id, &input.member_did)
                .await?
                .is_some()
            {
                return Err(DomainError::AlreadyMember.into());
            }
            self.set_lead(org_id, team.id, &input.member_did, member_name, &invited_by)
                .await?;
            return self
                .store
                .teams()
                .get_member(team.id, &input.member_did)
                .await?
                .ok_or_else(|| WardenError::NotFound {
                    entity: "team_member".into(),
                    id: input.member_did.clone(),
                });
        }

        let actor = input.invited_by.clone().unwrap_or_default();
        let member = self
            .store
            .teams()
            .add_member(org_id, input)
            .await
            .map_err(|e| match e {
                WardenError::AlreadyExists { .. } => DomainError::AlreadyMember.into(),
                other => other,
            })?;

        self.cache.invalidate_user(&member.member_did);
        info!(%org_id, team_id = %team.id, member = %member.member_did, "Team member added");
        audit::record(
            &self.store,
            org_id,
            &actor,
            "team.member_add",
            Some(team.id.to_string()),
            json!({ "member_did": member.member_did }),
        )
        .await;

        Ok(member)
    }

    /// Remove a member. Removing the lead also clears the team's lead.
    pub async fn remove_member(
        &self,
        org_id: Uuid,
        team_id: Uuid,
        member_did: &str,
        removed_by: &str,
    ) -> WardenResult<()> {
        let team = self.store.teams().get_by_id(org_id, team_id).await?;
        if !self.store.teams().remove_member(team_id, member_did).await? {
            return Err(WardenError::NotFound {
                entity: "team_member".into(),
                id: member_did.to_string(),
            });
        }
        let was_lead = team.lead_did.as_deref() == Some(member_did);

        self.cache.invalidate_user(member_did);
        info!(%org_id, %team_id, member = %member_did, was_lead, "Team member removed");
        audit::record(
            &self.store,
            org_id,
            removed_by,
            "team.member_remove",
            Some(team_id.to_string()),
            json!({ "member_did": member_did }),
        )
        .await;

        Ok(())
    }

    /// Make `lead_did` the team lead: the previous lead becomes a plain
    /// member and the new lead is enrolled if needed, all in one
    /// transaction.
    pub async fn set_lead(
        &self,
        org_id: Uuid,
        team_id: Uuid,
        lead_did: &str,
        lead_name: Option<String>,
        set_by: &str,
    ) -> WardenResult<OrgTeam> {
        let teams = self.store.teams();
        let team = teams.get_by_id(org_id, team_id).await?;

        let lead_name = match lead_name {
            Some(name) => Some(name),
            None => teams
                .get_member(team_id, lead_did)
                .await?
                .and_then(|m| m.member_name),
        };
        let updated = teams
            .assign_lead(org_id, team_id, lead_did, lead_name, set_by)
            .await?;
        self.cache.invalidate_user(lead_did);

        info!(%org_id, %team_id, lead = %lead_did, "Team lead set");
        audit::record(
            &self.store,
            org_id,
            set_by,
            "team.set_lead",
            Some(team_id.to_string()),
            json!({ "lead_did": lead_did, "previous_lead": team.lead_did }),
        )
        .await;

        Ok(updated)
    }

    pub async fn get_teams(
        &self,
        org_id: Uuid,
        parent: ParentFilter,
    ) -> WardenResult<Vec<TeamSummary>> {
        let teams = self.store.teams().list(org_id, parent).await?;
        let mut summaries = Vec::with_capacity(teams.len());
        for team in teams {
            let member_count = self.store.teams().count_members(team.id).await?;
            summaries.push(TeamSummary { team, member_count });
        }
        Ok(summaries)
    }

    pub async fn get_team_members(
        &self,
        org_id: Uuid,
        team_id: Uuid,
    ) -> WardenResult<Vec<TeamMember>> {
        self.store.teams().get_by_id(org_id, team_id).await?;
        self.store.teams().list_members(team_id).await
    }

    /// Teams the user belongs to.
    pub async fn get_user_teams(&self, org_id: Uuid, member_did: &str) -> WardenResult<Vec<OrgTeam>> {
        let ids = self
            .store
            .teams()
            .list_member_team_ids(org_id, member_did)
            .await?;
        let mut teams = Vec::with_capacity(ids.len());
        for id in ids {
            match self.store.teams().get_by_id(org_id, id).await {
                Ok(team) => teams.push(team),
                // Deleted between the two reads.
                Err(WardenError::NotFound { .. }) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(teams)
    }

    /// Walk up from `new_parent` and fail if `team_id` is among its
    /// ancestors (or is `new_parent` itself).
    async fn ensure_not_descendant(
        &self,
        org_id: Uuid,
        team_id: Uuid,
        new_parent: Uuid,
    ) -> WardenResult<()> {
        let mut seen = HashSet::new();
        let mut cursor = Some(new_parent);
        while let Some(id) = cursor {
            if id == team_id {
                return Err(WardenError::validation(
                    "a team cannot be moved under itself or its descendants",
                ));
            }
            if !seen.insert(id) {
                warn!(%org_id, team_id = %id, "Existing team hierarchy contains a cycle");
                break;
            }
            cursor = self.store.teams().get_by_id(org_id, id).await?.parent_team_id;
        }
        Ok(())
    }
}

fn team_name_taken(e: WardenError) -> WardenError {
    match e {
        WardenError::AlreadyExists { .. } => DomainError::TeamNameExists.into(),
        other => other,
    }
}
