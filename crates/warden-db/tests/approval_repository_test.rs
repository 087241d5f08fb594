//! Integration tests for the workflow and approval request repositories
//! using in-memory SurrealDB.

use chrono::{Duration, Utc};
use surrealdb::Surreal;
use surrealdb::engine::local::{Db, Mem};
use uuid::Uuid;
use warden_core::models::approval::{
    ApprovalHistoryFilter, CreateApprovalRequest, CreateApprovalResponse, Decision, RequestStatus,
};
use warden_core::models::workflow::{
    ApprovalType, ApprovalWorkflow, ApproverStep, CreateWorkflow, TimeoutAction, UpdateWorkflow,
};
use warden_core::repository::{ApprovalRequestRepository, Pagination, WorkflowRepository};
use warden_db::repository::{SurrealApprovalRequestRepository, SurrealWorkflowRepository};

async fn setup() -> Surreal<Db> {
    let db = Surreal::new::<Mem>(()).await.unwrap();
    db.use_ns("test").use_db("test").await.unwrap();
    warden_db::run_migrations(&db).await.unwrap();
    db
}

fn two_step_workflow(org_id: Uuid) -> CreateWorkflow {
    CreateWorkflow {
        org_id,
        name: "Budget sign-off".into(),
        description: Some("Two approvers".into()),
        trigger_resource_type: "budget".into(),
        trigger_action: "approve".into(),
        trigger_conditions: Some(serde_json::json!({"amount": {"gt": 1000}})),
        approval_type: ApprovalType::Sequential,
        approvers: vec![
            ApproverStep::Did("did:example:manager".into()),
            ApproverStep::Role("finance".into()),
        ],
        timeout_hours: 24,
        on_timeout: TimeoutAction::Reject,
        enabled: None,
        created_by: "did:example:admin".into(),
    }
}

fn request_for(workflow: &ApprovalWorkflow) -> CreateApprovalRequest {
    CreateApprovalRequest {
        workflow_id: workflow.id,
        org_id: workflow.org_id,
        requester_did: "did:example:requester".into(),
        requester_name: Some("Requester".into()),
        resource_type: "budget".into(),
        resource_id: Some("q3".into()),
        action: "approve".into(),
        request_data: serde_json::json!({"amount": 5000}),
        approval_type: workflow.approval_type,
        approvers: workflow.approvers.clone(),
        on_timeout: workflow.on_timeout,
        timeout_at: Utc::now() + Duration::hours(workflow.timeout_hours as i64),
    }
}

#[tokio::test]
async fn workflow_round_trips_approver_steps() {
    let db = setup().await;
    let repo = SurrealWorkflowRepository::new(db);
    let org_id = Uuid::new_v4();

    let created = repo.create(two_step_workflow(org_id)).await.unwrap();
    assert!(created.enabled);

    let fetched = repo.get_by_id(created.id).await.unwrap();
    assert_eq!(fetched, created);
    assert_eq!(fetched.approvers.len(), 2);
    assert_eq!(
        fetched.trigger_conditions,
        Some(serde_json::json!({"amount": {"gt": 1000}}))
    );
}

#[tokio::test]
async fn workflow_update_and_delete() {
    let db = setup().await;
    let repo = SurrealWorkflowRepository::new(db);
    let org_id = Uuid::new_v4();
    let created = repo.create(two_step_workflow(org_id)).await.unwrap();

    let updated = repo
        .update(
            org_id,
            created.id,
            UpdateWorkflow {
                approval_type: Some(ApprovalType::AnyOne),
                trigger_conditions: Some(None),
                enabled: Some(false),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.approval_type, ApprovalType::AnyOne);
    assert_eq!(updated.trigger_conditions, None);
    assert!(!updated.enabled);

    assert_eq!(repo.list(org_id).await.unwrap().len(), 1);
    assert!(repo.delete(Uuid::new_v4(), created.id).await.is_err());
    repo.delete(org_id, created.id).await.unwrap();
    assert!(repo.list(org_id).await.unwrap().is_empty());
}

#[tokio::test]
async fn request_snapshots_and_advances_once() {
    let db = setup().await;
    let workflows = SurrealWorkflowRepository::new(db.clone());
    let requests = SurrealApprovalRequestRepository::new(db);
    let workflow = workflows.create(two_step_workflow(Uuid::new_v4())).await.unwrap();

    let request = requests.create(request_for(&workflow)).await.unwrap();
    assert_eq!(request.status, RequestStatus::Pending);
    assert_eq!(request.current_step, 0);
    assert_eq!(request.total_steps, 2);
    assert_eq!(request.approvers, workflow.approvers);
    assert_eq!(request.request_data, serde_json::json!({"amount": 5000}));

    let advanced = requests.advance_step(request.id, 0).await.unwrap();
    assert_eq!(advanced.map(|r| r.current_step), Some(1));

    // A second writer expecting step 0 loses.
    assert!(requests.advance_step(request.id, 0).await.unwrap().is_none());
    // Cannot advance past the last step.
    assert!(requests.advance_step(request.id, 1).await.unwrap().is_none());
}

#[tokio::test]
async fn complete_is_a_single_terminal_transition() {
    let db = setup().await;
    let workflows = SurrealWorkflowRepository::new(db.clone());
    let requests = SurrealApprovalRequestRepository::new(db);
    let workflow = workflows.create(two_step_workflow(Uuid::new_v4())).await.unwrap();
    let request = requests.create(request_for(&workflow)).await.unwrap();

    assert_eq!(
        requests.count_pending_for_workflow(workflow.id).await.unwrap(),
        1
    );

    let done = requests
        .complete(request.id, RequestStatus::Rejected, Utc::now())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(done.status, RequestStatus::Rejected);
    assert!(done.completed_at.is_some());

    assert!(
        requests
            .complete(request.id, RequestStatus::Approved, Utc::now())
            .await
            .unwrap()
            .is_none()
    );
    assert_eq!(
        requests.get_by_id(request.id).await.unwrap().status,
        RequestStatus::Rejected
    );
    assert_eq!(
        requests.count_pending_for_workflow(workflow.id).await.unwrap(),
        0
    );
}

#[tokio::test]
async fn responses_and_history() {
    let db = setup().await;
    let workflows = SurrealWorkflowRepository::new(db.clone());
    let requests = SurrealApprovalRequestRepository::new(db);
    let org_id = Uuid::new_v4();
    let workflow = workflows.create(two_step_workflow(org_id)).await.unwrap();

    let first = requests.create(request_for(&workflow)).await.unwrap();
    let mut other = request_for(&workflow);
    other.requester_did = "did:example:other".into();
    requests.create(other).await.unwrap();

    requests
        .record_response(CreateApprovalResponse {
            request_id: first.id,
            approver_did: "did:example:manager".into(),
            step: 0,
            decision: Decision::Approve,
            comment: Some("ok".into()),
        })
        .await
        .unwrap();
    let responses = requests.list_responses(first.id).await.unwrap();
    assert_eq!(responses.len(), 1);
    assert_eq!(responses[0].decision, Decision::Approve);

    assert_eq!(requests.list_pending(Some(org_id)).await.unwrap().len(), 2);
    assert_eq!(requests.list_pending(None).await.unwrap().len(), 2);
    assert!(requests.list_pending(Some(Uuid::new_v4())).await.unwrap().is_empty());

    let page = requests
        .list(
            org_id,
            ApprovalHistoryFilter {
                requester_did: Some("did:example:requester".into()),
                ..Default::default()
            },
            Pagination::default(),
        )
        .await
        .unwrap();
    assert_eq!(page.total, 1);
    assert_eq!(page.items[0].id, first.id);

    let limited = requests
        .list(
            org_id,
            ApprovalHistoryFilter::default(),
            Pagination { offset: 0, limit: 1 },
        )
        .await
        .unwrap();
    assert_eq!(limited.total, 2);
    assert_eq!(limited.items.len(), 1);
}
