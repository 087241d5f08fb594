//! Integration tests for the team and org-membership repositories using
//! in-memory SurrealDB.

use surrealdb::Surreal;
use surrealdb::engine::local::{Db, Mem};
use uuid::Uuid;
use warden_core::error::WardenError;
use warden_core::models::team::{AddTeamMember, CreateTeam, ParentFilter, TeamRole, UpdateTeam};
use warden_core::repository::{OrgMemberRepository, TeamRepository};
use warden_db::repository::{SurrealOrgMemberRepository, SurrealTeamRepository};

async fn setup() -> Surreal<Db> {
    let db = Surreal::new::<Mem>(()).await.unwrap();
    db.use_ns("test").use_db("test").await.unwrap();
    warden_db::run_migrations(&db).await.unwrap();
    db
}

fn team(org_id: Uuid, name: &str, parent: Option<Uuid>) -> CreateTeam {
    CreateTeam {
        org_id,
        name: name.into(),
        description: None,
        parent_team_id: parent,
        lead_did: None,
        lead_name: None,
        settings: None,
        created_by: "did:example:admin".into(),
    }
}

fn member(team_id: Uuid, did: &str, role: TeamRole) -> AddTeamMember {
    AddTeamMember {
        team_id,
        member_did: did.into(),
        member_name: None,
        team_role: role,
        invited_by: Some("did:example:admin".into()),
    }
}

#[tokio::test]
async fn team_names_are_unique_per_org() {
    let db = setup().await;
    let repo = SurrealTeamRepository::new(db);
    let org_a = Uuid::new_v4();
    let org_b = Uuid::new_v4();

    let created = repo.create(team(org_a, "Platform", None)).await.unwrap();
    assert_eq!(created.settings, serde_json::json!({}));

    assert!(matches!(
        repo.create(team(org_a, "Platform", None)).await,
        Err(WardenError::AlreadyExists { .. })
    ));
    repo.create(team(org_b, "Platform", None)).await.unwrap();

    let found = repo.get_by_name(org_a, "Platform").await.unwrap();
    assert_eq!(found.map(|t| t.id), Some(created.id));
    assert!(repo.get_by_name(org_a, "Missing").await.unwrap().is_none());
}

#[tokio::test]
async fn list_filters_by_parent() {
    let db = setup().await;
    let repo = SurrealTeamRepository::new(db);
    let org_id = Uuid::new_v4();

    let root = repo.create(team(org_id, "Engineering", None)).await.unwrap();
    repo.create(team(org_id, "Backend", Some(root.id))).await.unwrap();
    repo.create(team(org_id, "Frontend", Some(root.id))).await.unwrap();

    assert_eq!(repo.list(org_id, ParentFilter::Any).await.unwrap().len(), 3);
    let roots = repo.list(org_id, ParentFilter::Roots).await.unwrap();
    assert_eq!(roots.len(), 1);
    assert_eq!(roots[0].id, root.id);

    let children = repo
        .list(org_id, ParentFilter::ChildrenOf(root.id))
        .await
        .unwrap();
    let names: Vec<_> = children.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, vec!["Backend", "Frontend"]);
    assert_eq!(repo.count_children(org_id, root.id).await.unwrap(), 2);
}

#[tokio::test]
async fn update_can_clear_the_parent() {
    let db = setup().await;
    let repo = SurrealTeamRepository::new(db);
    let org_id = Uuid::new_v4();

    let root = repo.create(team(org_id, "Engineering", None)).await.unwrap();
    let child = repo
        .create(team(org_id, "Backend", Some(root.id)))
        .await
        .unwrap();

    let updated = repo
        .update(
            org_id,
            child.id,
            UpdateTeam {
                name: Some("Services".into()),
                parent_team_id: Some(None),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.name, "Services");
    assert_eq!(updated.parent_team_id, None);
}

#[tokio::test]
async fn membership_lifecycle() {
    let db = setup().await;
    let repo = SurrealTeamRepository::new(db);
    let org_id = Uuid::new_v4();
    let platform = repo.create(team(org_id, "Platform", None)).await.unwrap();

    repo.add_member(org_id, member(platform.id, "did:example:a", TeamRole::Lead))
        .await
        .unwrap();
    repo.add_member(org_id, member(platform.id, "did:example:b", TeamRole::Member))
        .await
        .unwrap();
    assert!(matches!(
        repo.add_member(org_id, member(platform.id, "did:example:b", TeamRole::Member))
            .await,
        Err(WardenError::AlreadyExists { .. })
    ));
    assert_eq!(repo.count_members(platform.id).await.unwrap(), 2);

    let b = repo
        .get_member(platform.id, "did:example:b")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(b.team_role, TeamRole::Member);

    assert_eq!(
        repo.list_member_team_ids(org_id, "did:example:b").await.unwrap(),
        vec![platform.id]
    );

    assert!(repo.remove_member(platform.id, "did:example:a").await.unwrap());
    assert!(!repo.remove_member(platform.id, "did:example:a").await.unwrap());
    assert_eq!(repo.list_members(platform.id).await.unwrap().len(), 1);
}

fn led_team(org_id: Uuid, name: &str, lead: &str) -> CreateTeam {
    CreateTeam {
        lead_did: Some(lead.into()),
        lead_name: Some("Lead".into()),
        ..team(org_id, name, None)
    }
}

#[tokio::test]
async fn create_enrolls_the_lead_in_the_same_transaction() {
    let db = setup().await;
    let repo = SurrealTeamRepository::new(db);
    let org_id = Uuid::new_v4();

    let platform = repo
        .create(led_team(org_id, "Platform", "did:example:a"))
        .await
        .unwrap();
    let lead = repo
        .get_member(platform.id, "did:example:a")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(lead.team_role, TeamRole::Lead);
    assert_eq!(lead.member_name.as_deref(), Some("Lead"));

    // The name clash cancels the whole transaction: no membership row
    // is left behind for the second lead.
    assert!(matches!(
        repo.create(led_team(org_id, "Platform", "did:example:b")).await,
        Err(WardenError::AlreadyExists { .. })
    ));
    assert!(
        repo.list_member_team_ids(org_id, "did:example:b")
            .await
            .unwrap()
            .is_empty()
    );
    assert_eq!(repo.list(org_id, ParentFilter::Any).await.unwrap().len(), 1);
}

#[tokio::test]
async fn assign_lead_keeps_a_single_lead() {
    let db = setup().await;
    let repo = SurrealTeamRepository::new(db);
    let org_id = Uuid::new_v4();
    let platform = repo
        .create(led_team(org_id, "Platform", "did:example:a"))
        .await
        .unwrap();
    repo.add_member(org_id, member(platform.id, "did:example:b", TeamRole::Member))
        .await
        .unwrap();

    // Promote an existing member.
    let updated = repo
        .assign_lead(org_id, platform.id, "did:example:b", Some("B".into()), "did:example:admin")
        .await
        .unwrap();
    assert_eq!(updated.lead_did.as_deref(), Some("did:example:b"));
    assert_eq!(updated.lead_name.as_deref(), Some("B"));

    // Enroll a newcomer.
    let updated = repo
        .assign_lead(org_id, platform.id, "did:example:c", None, "did:example:admin")
        .await
        .unwrap();
    assert_eq!(updated.lead_did.as_deref(), Some("did:example:c"));

    let members = repo.list_members(platform.id).await.unwrap();
    assert_eq!(members.len(), 3);
    let leads: Vec<_> = members
        .iter()
        .filter(|m| m.team_role == TeamRole::Lead)
        .map(|m| m.member_did.as_str())
        .collect();
    assert_eq!(leads, vec!["did:example:c"]);
    let c = members.iter().find(|m| m.member_did == "did:example:c").unwrap();
    assert_eq!(c.invited_by.as_deref(), Some("did:example:admin"));
}

#[tokio::test]
async fn removing_the_lead_clears_the_team_lead() {
    let db = setup().await;
    let repo = SurrealTeamRepository::new(db);
    let org_id = Uuid::new_v4();
    let platform = repo
        .create(led_team(org_id, "Platform", "did:example:a"))
        .await
        .unwrap();
    repo.add_member(org_id, member(platform.id, "did:example:b", TeamRole::Member))
        .await
        .unwrap();

    assert!(repo.remove_member(platform.id, "did:example:b").await.unwrap());
    let team = repo.get_by_id(org_id, platform.id).await.unwrap();
    assert_eq!(team.lead_did.as_deref(), Some("did:example:a"));

    assert!(repo.remove_member(platform.id, "did:example:a").await.unwrap());
    let team = repo.get_by_id(org_id, platform.id).await.unwrap();
    assert_eq!(team.lead_did, None);
    assert_eq!(team.lead_name, None);
}

#[tokio::test]
async fn delete_removes_memberships() {
    let db = setup().await;
    let repo = SurrealTeamRepository::new(db);
    let org_id = Uuid::new_v4();
    let platform = repo.create(team(org_id, "Platform", None)).await.unwrap();
    repo.add_member(org_id, member(platform.id, "did:example:a", TeamRole::Member))
        .await
        .unwrap();

    repo.delete(org_id, platform.id).await.unwrap();

    assert_eq!(repo.count_members(platform.id).await.unwrap(), 0);
    assert!(matches!(
        repo.get_by_id(org_id, platform.id).await,
        Err(WardenError::NotFound { .. })
    ));
    assert!(matches!(
        repo.delete(org_id, platform.id).await,
        Err(WardenError::NotFound { .. })
    ));
}

#[tokio::test]
async fn org_member_upsert_replaces_role() {
    let db = setup().await;
    let repo = SurrealOrgMemberRepository::new(db);
    let org_id = Uuid::new_v4();

    repo.upsert(org_id, "did:example:a", "member").await.unwrap();
    let updated = repo.upsert(org_id, "did:example:a", "admin").await.unwrap();
    assert_eq!(updated.role, "admin");

    let fetched = repo.get(org_id, "did:example:a").await.unwrap().unwrap();
    assert_eq!(fetched.role, "admin");
    assert!(repo.get(Uuid::new_v4(), "did:example:a").await.unwrap().is_none());

    repo.remove(org_id, "did:example:a").await.unwrap();
    assert!(repo.get(org_id, "did:example:a").await.unwrap().is_none());
}
