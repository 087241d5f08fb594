//! Multi-step approval workflows.
//!
//! A request moves `pending → pending` (step advance) and finally into
//! one of `approved`, `rejected` or `expired`. Decisions and timeouts on
//! the same request are serialized by a per-request async mutex, and
//! every status or step write is a compare-and-swap against the state
//! that was read, so a request reaches a terminal state at most once.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::json;
use tracing::{debug, error, info, warn};
use uuid::Uuid;
use warden_core::error::{DomainError, WardenError, WardenResult};
use warden_core::models::approval::{
    ApprovalHistoryFilter, ApprovalRequest, ApprovalRequestDetail, CreateApprovalRequest,
    CreateApprovalResponse, Decision, RequestStatus, SubmitApproval,
};
use warden_core::models::workflow::{
    ApprovalType, ApprovalWorkflow, CreateWorkflow, UpdateWorkflow, validate_approvers,
};
use warden_core::repository::{
    ApprovalRequestRepository, PaginatedResult, Pagination, Store, WorkflowRepository,
};

use crate::audit;
use crate::config::AuthzConfig;
use crate::events::{ApprovalEvent, ApprovalEventSink};
use crate::locks::RequestLocks;
use crate::roles::user_roles;
use crate::timer::TimeoutScheduler;

/// Actor recorded on audit entries written by timers.
const SYSTEM_ACTOR: &str = "system";

/// Workflow definitions and the requests raised against them.
///
/// Cloning is cheap; clones share timers and request locks.
pub struct ApprovalWorkflowManager<S: Store> {
    store: S,
    events: Arc<dyn ApprovalEventSink>,
    timers: Arc<TimeoutScheduler>,
    locks: Arc<RequestLocks>,
    config: AuthzConfig,
}

impl<S: Store> Clone for ApprovalWorkflowManager<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            events: Arc::clone(&self.events),
            timers: Arc::clone(&self.timers),
            locks: Arc::clone(&self.locks),
            config: self.config.clone(),
        }
    }
}

impl<S: Store> ApprovalWorkflowManager<S> {
    pub fn new(store: S, events: Arc<dyn ApprovalEventSink>, config: AuthzConfig) -> Self {
        Self {
            store,
            events,
            timers: Arc::new(TimeoutScheduler::new()),
            locks: Arc::new(RequestLocks::new()),
            config,
        }
    }

    // -----------------------------------------------------------------------
    // Workflow definitions
    // -----------------------------------------------------------------------

    pub async fn create_workflow(&self, input: CreateWorkflow) -> WardenResult<ApprovalWorkflow> {
        if input.name.trim().is_empty() {
            return Err(WardenError::validation("workflow name must not be empty"));
        }
        if input.trigger_resource_type.trim().is_empty() || input.trigger_action.trim().is_empty() {
            return Err(WardenError::validation(
                "workflow trigger needs a resource type and an action",
            ));
        }
        validate_approvers(&input.approvers)?;
        validate_timeout(input.timeout_hours)?;

        let workflow = self.store.workflows().create(input).await?;

        info!(
            org_id = %workflow.org_id,
            workflow_id = %workflow.id,
            steps = workflow.approvers.len(),
            "Approval workflow created"
        );
        audit::record(
            &self.store,
            workflow.org_id,
            &workflow.created_by,
            "workflow.create",
            Some(workflow.id.to_string()),
            json!({
                "name": workflow.name,
                "trigger_resource_type": workflow.trigger_resource_type,
                "trigger_action": workflow.trigger_action,
            }),
        )
        .await;

        Ok(workflow)
    }

    /// Edit a workflow. Requests already submitted keep the rules they
    /// were submitted under.
    pub async fn update_workflow(
        &self,
        org_id: Uuid,
        workflow_id: Uuid,
        input: UpdateWorkflow,
        updated_by: &str,
    ) -> WardenResult<ApprovalWorkflow> {
        self.get_workflow(org_id, workflow_id).await?;
        if let Some(approvers) = &input.approvers {
            validate_approvers(approvers)?;
        }
        if let Some(hours) = input.timeout_hours {
            validate_timeout(hours)?;
        }
        if input.name.as_deref().is_some_and(|n| n.trim().is_empty()) {
            return Err(WardenError::validation("workflow name must not be empty"));
        }

        let workflow = self
            .store
            .workflows()
            .update(org_id, workflow_id, input)
            .await?;

        info!(%org_id, %workflow_id, "Approval workflow updated");
        audit::record(
            &self.store,
            org_id,
            updated_by,
            "workflow.update",
            Some(workflow_id.to_string()),
            json!({ "enabled": workflow.enabled }),
        )
        .await;

        Ok(workflow)
    }

    pub async fn delete_workflow(
        &self,
        org_id: Uuid,
        workflow_id: Uuid,
        deleted_by: &str,
    ) -> WardenResult<()> {
        self.get_workflow(org_id, workflow_id).await?;
        if self
            .store
            .requests()
            .count_pending_for_workflow(workflow_id)
            .await?
            > 0
        {
            return Err(DomainError::HasPendingRequests.into());
        }

        self.store
            .workflows()
            .delete(org_id, workflow_id)
            .await
            .map_err(workflow_not_found)?;

        info!(%org_id, %workflow_id, "Approval workflow deleted");
        audit::record(
            &self.store,
            org_id,
            deleted_by,
            "workflow.delete",
            Some(workflow_id.to_string()),
            json!({}),
        )
        .await;

        Ok(())
    }

    /// A workflow of the organization, enabled or not.
    pub async fn get_workflow(&self, org_id: Uuid, workflow_id: Uuid) -> WardenResult<ApprovalWorkflow> {
        let workflow = self
            .store
            .workflows()
            .get_by_id(workflow_id)
            .await
            .map_err(workflow_not_found)?;
        if workflow.org_id != org_id {
            return Err(DomainError::WorkflowNotFound.into());
        }
        Ok(workflow)
    }

    pub async fn list_workflows(&self, org_id: Uuid) -> WardenResult<Vec<ApprovalWorkflow>> {
        self.store.workflows().list(org_id).await
    }

    /// The first enabled workflow triggered by `action` on `resource_type`.
    pub async fn find_matching_workflow(
        &self,
        org_id: Uuid,
        resource_type: &str,
        action: &str,
    ) -> WardenResult<Option<ApprovalWorkflow>> {
        let workflows = self.store.workflows().list(org_id).await?;
        Ok(workflows
            .into_iter()
            .find(|w| w.triggers_on(resource_type, action)))
    }

    // -----------------------------------------------------------------------
    // Requests
    // -----------------------------------------------------------------------

    pub async fn submit_approval(&self, input: SubmitApproval) -> WardenResult<ApprovalRequest> {
        if input.requester_did.trim().is_empty() {
            return Err(WardenError::validation("requester_did must not be empty"));
        }
        let workflow = self.get_workflow(input.org_id, input.workflow_id).await?;
        if !workflow.enabled {
            return Err(DomainError::WorkflowNotFound.into());
        }

        let now = Utc::now();
        let timeout_at = now
            .checked_add_signed(self.config.timeout_for(workflow.timeout_hours))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);

        let request = self
            .store
            .requests()
            .create(CreateApprovalRequest {
                workflow_id: workflow.id,
                org_id: workflow.org_id,
                requester_did: input.requester_did,
                requester_name: input.requester_name,
                resource_type: input.resource_type,
                resource_id: input.resource_id,
                action: input.action,
                request_data: input.request_data,
                approval_type: workflow.approval_type,
                approvers: workflow.approvers,
                on_timeout: workflow.on_timeout,
                timeout_at,
            })
            .await?;

        self.arm_timer(&request, now);

        if let Some(first) = request.current_approvers() {
            self.events.publish(ApprovalEvent::ApprovalRequested {
                request_id: request.id,
                org_id: request.org_id,
                workflow_id: request.workflow_id,
                requester_did: request.requester_did.clone(),
                resource_type: request.resource_type.clone(),
                resource_id: request.resource_id.clone(),
                action: request.action.clone(),
                approvers: first.clone(),
            });
        }

        info!(
            org_id = %request.org_id,
            request_id = %request.id,
            workflow_id = %request.workflow_id,
            total_steps = request.total_steps,
            "Approval requested"
        );
        audit::record(
            &self.store,
            request.org_id,
            &request.requester_did,
            "approval.submit",
            Some(request.id.to_string()),
            json!({
                "workflow_id": request.workflow_id,
                "resource_type": request.resource_type,
                "action": request.action,
            }),
        )
        .await;

        Ok(request)
    }

    pub async fn approve_request(
        &self,
        request_id: Uuid,
        approver_did: &str,
        comment: Option<String>,
    ) -> WardenResult<ApprovalRequest> {
        self.process_decision(request_id, approver_did, Decision::Approve, comment)
            .await
    }

    pub async fn reject_request(
        &self,
        request_id: Uuid,
        approver_did: &str,
        comment: Option<String>,
    ) -> WardenResult<ApprovalRequest> {
        self.process_decision(request_id, approver_did, Decision::Reject, comment)
            .await
    }

    async fn process_decision(
        &self,
        request_id: Uuid,
        approver_did: &str,
        decision: Decision,
        comment: Option<String>,
    ) -> WardenResult<ApprovalRequest> {
        let slot = self.locks.slot(request_id);
        let _guard = slot.lock().await;

        // 1. Only pending requests take decisions.
        let request = self.load_request(request_id).await?;
        if request.status != RequestStatus::Pending {
            return Err(DomainError::RequestNotFound.into());
        }
        let step = request
            .current_approvers()
            .cloned()
            .ok_or(DomainError::RequestNotFound)?;

        // 2. The approver must belong to the current step.
        let now = Utc::now();
        let roles = if step.is_role() {
            user_roles(&self.store, request.org_id, approver_did, now).await?
        } else {
            Vec::new()
        };
        if !step.authorizes(approver_did, &roles) {
            warn!(%request_id, approver = %approver_did, step = request.current_step, "Approver not authorized for step");
            return Err(DomainError::NotAuthorized.into());
        }

        // 3. Record the vote.
        self.store
            .requests()
            .record_response(CreateApprovalResponse {
                request_id,
                approver_did: approver_did.to_string(),
                step: request.current_step,
                decision,
                comment: comment.clone(),
            })
            .await?;

        // 4. Transition.
        let updated = match decision {
            Decision::Reject => {
                let rejected = self
                    .complete(request_id, RequestStatus::Rejected, now)
                    .await?;
                self.events.publish(ApprovalEvent::ApprovalRejected {
                    request_id,
                    org_id: rejected.org_id,
                    requester_did: rejected.requester_did.clone(),
                    rejected_by: approver_did.to_string(),
                    comment,
                });
                rejected
            }
            Decision::Approve => {
                if !self.step_satisfied(&request).await? {
                    debug!(%request_id, step = request.current_step, "Step awaiting more approvals");
                    self.load_request(request_id).await?
                } else if request.is_final_step() {
                    let approved = self
                        .complete(request_id, RequestStatus::Approved, now)
                        .await?;
                    self.events.publish(ApprovalEvent::ApprovalApproved {
                        request_id,
                        org_id: approved.org_id,
                        requester_did: approved.requester_did.clone(),
                    });
                    approved
                } else {
                    let advanced = self
                        .store
                        .requests()
                        .advance_step(request_id, request.current_step)
                        .await?
                        .ok_or(DomainError::RequestNotFound)?;
                    if let Some(next) = advanced.current_approvers() {
                        self.events.publish(ApprovalEvent::ApprovalNextStep {
                            request_id,
                            org_id: advanced.org_id,
                            step: advanced.current_step,
                            approvers: next.clone(),
                        });
                    }
                    advanced
                }
            }
        };

        info!(
            %request_id,
            approver = %approver_did,
            %decision,
            status = %updated.status,
            step = updated.current_step,
            "Approval decision recorded"
        );
        audit::record(
            &self.store,
            updated.org_id,
            approver_did,
            match decision {
                Decision::Approve => "approval.approve",
                Decision::Reject => "approval.reject",
            },
            Some(request_id.to_string()),
            json!({ "step": request.current_step, "status": updated.status }),
        )
        .await;

        Ok(updated)
    }

    /// Whether the current step has collected enough approvals.
    async fn step_satisfied(&self, request: &ApprovalRequest) -> WardenResult<bool> {
        if request.approval_type != ApprovalType::Parallel {
            return Ok(true);
        }
        let Some(step) = request.current_approvers() else {
            return Ok(false);
        };

        let responses = self.store.requests().list_responses(request.id).await?;
        let approvers: HashSet<&str> = responses
            .iter()
            .filter(|r| r.step == request.current_step && r.decision == Decision::Approve)
            .map(|r| r.approver_did.as_str())
            .collect();
        Ok(approvers.len() >= step.required_approvals())
    }

    /// Terminal CAS on a pending request; also disarms its timer.
    async fn complete(
        &self,
        request_id: Uuid,
        status: RequestStatus,
        now: DateTime<Utc>,
    ) -> WardenResult<ApprovalRequest> {
        let done = self
            .store
            .requests()
            .complete(request_id, status, now)
            .await?
            .ok_or(DomainError::RequestNotFound)?;
        self.timers.cancel(request_id);
        Ok(done)
    }

    // -----------------------------------------------------------------------
    // Timers
    // -----------------------------------------------------------------------

    fn arm_timer(&self, request: &ApprovalRequest, now: DateTime<Utc>) {
        let delay = (request.timeout_at - now).to_std().unwrap_or_default();
        let manager = self.clone();
        let request_id = request.id;
        self.timers.arm(request_id, delay, async move {
            manager.timers.disarm(request_id);
            if let Err(e) = manager.handle_timeout(request_id).await {
                error!(%request_id, error = %e, "Approval timeout handling failed");
            }
        });
    }

    /// Apply the request's timeout policy if it is still pending.
    async fn handle_timeout(&self, request_id: Uuid) -> WardenResult<()> {
        let slot = self.locks.slot(request_id);
        let _guard = slot.lock().await;

        let request = self.store.requests().get_by_id(request_id).await?;
        if request.status.is_terminal() {
            debug!(%request_id, status = %request.status, "Timeout fired for settled request");
            return Ok(());
        }

        let status = request.on_timeout.resulting_status();
        let Some(done) = self
            .store
            .requests()
            .complete(request_id, status, Utc::now())
            .await?
        else {
            debug!(%request_id, "Request settled before timeout could apply");
            return Ok(());
        };

        self.events.publish(ApprovalEvent::ApprovalTimeout {
            request_id,
            org_id: done.org_id,
            requester_did: done.requester_did.clone(),
            status: done.status,
        });
        info!(%request_id, status = %done.status, "Approval request timed out");
        audit::record(
            &self.store,
            done.org_id,
            SYSTEM_ACTOR,
            "approval.timeout",
            Some(request_id.to_string()),
            json!({ "status": done.status, "step": done.current_step }),
        )
        .await;

        Ok(())
    }

    /// Re-arm timers for every pending request, e.g. after a restart.
    /// Overdue requests time out immediately. Returns the number armed.
    pub async fn resume_timers(&self) -> WardenResult<usize> {
        let pending = self.store.requests().list_pending(None).await?;
        let now = Utc::now();
        for request in &pending {
            self.arm_timer(request, now);
        }
        info!(count = pending.len(), "Resumed approval timers");
        Ok(pending.len())
    }

    /// Requests whose timer is currently armed.
    pub fn armed_timers(&self) -> usize {
        self.timers.len()
    }

    /// Requests with a decision or timeout currently in flight.
    pub fn locked_requests(&self) -> usize {
        self.locks.len()
    }

    /// Cancel every armed timer. Pending requests stay pending and are
    /// picked up again by [`Self::resume_timers`].
    pub fn shutdown(&self) {
        self.timers.shutdown();
        info!("Approval workflow manager shut down");
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// Pending requests of the organization the approver may act on now.
    pub async fn get_pending_approvals(
        &self,
        approver_did: &str,
        org_id: Uuid,
    ) -> WardenResult<Vec<ApprovalRequest>> {
        let pending = self.store.requests().list_pending(Some(org_id)).await?;

        let mut roles: Option<Vec<String>> = None;
        let mut actionable = Vec::new();
        for request in pending {
            let Some(step) = request.current_approvers() else {
                continue;
            };
            if step.is_role() && roles.is_none() {
                roles = Some(user_roles(&self.store, org_id, approver_did, Utc::now()).await?);
            }
            if step.authorizes(approver_did, roles.as_deref().unwrap_or_default()) {
                actionable.push(request);
            }
        }
        Ok(actionable)
    }

    pub async fn get_approval_history(
        &self,
        org_id: Uuid,
        filter: ApprovalHistoryFilter,
        pagination: Pagination,
    ) -> WardenResult<PaginatedResult<ApprovalRequest>> {
        self.store.requests().list(org_id, filter, pagination).await
    }

    pub async fn get_request(&self, request_id: Uuid) -> WardenResult<ApprovalRequestDetail> {
        let request = self.load_request(request_id).await?;
        let responses = self.store.requests().list_responses(request_id).await?;
        Ok(ApprovalRequestDetail { request, responses })
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    async fn load_request(&self, request_id: Uuid) -> WardenResult<ApprovalRequest> {
        self.store
            .requests()
            .get_by_id(request_id)
            .await
            .map_err(|e| match e {
                WardenError::NotFound { .. } => DomainError::RequestNotFound.into(),
                other => other,
            })
    }
}

fn validate_timeout(hours: u32) -> WardenResult<()> {
    if hours == 0 {
        return Err(WardenError::validation("timeout_hours must be positive"));
    }
    Ok(())
}

fn workflow_not_found(e: WardenError) -> WardenError {
    match e {
        WardenError::NotFound { .. } => DomainError::WorkflowNotFound.into(),
        other => other,
    }
}
