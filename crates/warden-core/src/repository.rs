//! Repository trait definitions for data access abstraction.
//!
//! All repository operations are async. Organization-scoped
//! repositories take an `org_id` parameter to enforce isolation.
//! Services never talk to a database directly; they receive a [`Store`]
//! bundling one implementation of every repository.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::WardenResult;
use crate::models::{
    approval::{
        ApprovalHistoryFilter, ApprovalRequest, ApprovalResponse, CreateApprovalRequest,
        CreateApprovalResponse, RequestStatus,
    },
    audit::{AuditLogEntry, CreateAuditLogEntry},
    delegation::{CreateDelegation, DelegationFilter, DelegationStatus, PermissionDelegation},
    grant::{CreateGrant, GranteeType, PermissionGrant},
    inheritance::{CreateInheritance, PermissionInheritance},
    membership::OrgMember,
    team::{AddTeamMember, CreateTeam, OrgTeam, ParentFilter, TeamMember, UpdateTeam},
    workflow::{ApprovalWorkflow, CreateWorkflow, UpdateWorkflow},
};

/// Pagination parameters for list queries.
#[derive(Debug, Clone)]
pub struct Pagination {
    pub offset: u64,
    pub limit: u64,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            offset: 0,
            limit: 50,
        }
    }
}

/// A paginated result set.
#[derive(Debug, Clone, serde::Serialize)]
pub struct PaginatedResult<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub offset: u64,
    pub limit: u64,
}

// ---------------------------------------------------------------------------
// Grants & inheritance
// ---------------------------------------------------------------------------

pub trait GrantRepository: Send + Sync {
    /// Insert a grant. Fails with `AlreadyExists` when the
    /// (org, grantee, resource, permission) tuple is taken.
    fn create(&self, input: CreateGrant)
    -> impl Future<Output = WardenResult<PermissionGrant>> + Send;
    fn get_by_id(&self, id: Uuid) -> impl Future<Output = WardenResult<PermissionGrant>> + Send;
    fn delete(&self, id: Uuid) -> impl Future<Output = WardenResult<()>> + Send;

    /// All grants held by one grantee, expired ones included.
    fn list_for_grantee(
        &self,
        org_id: Uuid,
        grantee_type: GranteeType,
        grantee_id: &str,
    ) -> impl Future<Output = WardenResult<Vec<PermissionGrant>>> + Send;

    /// Grants on a resource, including wildcard grants on its type.
    fn list_for_resource(
        &self,
        org_id: Uuid,
        resource_type: &str,
        resource_id: Option<&str>,
    ) -> impl Future<Output = WardenResult<Vec<PermissionGrant>>> + Send;
}

pub trait InheritanceRepository: Send + Sync {
    fn create(
        &self,
        input: CreateInheritance,
    ) -> impl Future<Output = WardenResult<PermissionInheritance>> + Send;
    fn get_by_id(
        &self,
        id: Uuid,
    ) -> impl Future<Output = WardenResult<PermissionInheritance>> + Send;
    fn delete(&self, id: Uuid) -> impl Future<Output = WardenResult<()>> + Send;

    /// Edges whose child is the given resource.
    fn list_parents(
        &self,
        org_id: Uuid,
        child_resource_type: &str,
        child_resource_id: Option<&str>,
    ) -> impl Future<Output = WardenResult<Vec<PermissionInheritance>>> + Send;
}

// ---------------------------------------------------------------------------
// Delegations
// ---------------------------------------------------------------------------

pub trait DelegationRepository: Send + Sync {
    /// Insert a delegation in `pending` status.
    fn create(
        &self,
        input: CreateDelegation,
    ) -> impl Future<Output = WardenResult<PermissionDelegation>> + Send;
    fn get_by_id(
        &self,
        id: Uuid,
    ) -> impl Future<Output = WardenResult<PermissionDelegation>> + Send;

    /// Compare-and-swap the status. Returns `None` when the stored
    /// status no longer equals `from`.
    fn transition(
        &self,
        id: Uuid,
        from: DelegationStatus,
        to: DelegationStatus,
    ) -> impl Future<Output = WardenResult<Option<PermissionDelegation>>> + Send;

    fn list(
        &self,
        org_id: Uuid,
        did: &str,
        filter: DelegationFilter,
    ) -> impl Future<Output = WardenResult<Vec<PermissionDelegation>>> + Send;

    /// Delegations received by `delegate_did` whose status is `active`.
    /// The date window is left to the caller.
    fn list_active_for_delegate(
        &self,
        org_id: Uuid,
        delegate_did: &str,
    ) -> impl Future<Output = WardenResult<Vec<PermissionDelegation>>> + Send;
}

// ---------------------------------------------------------------------------
// Organization membership & teams
// ---------------------------------------------------------------------------

pub trait OrgMemberRepository: Send + Sync {
    /// Create or replace the member's organization role.
    fn upsert(
        &self,
        org_id: Uuid,
        member_did: &str,
        role: &str,
    ) -> impl Future<Output = WardenResult<OrgMember>> + Send;
    fn get(
        &self,
        org_id: Uuid,
        member_did: &str,
    ) -> impl Future<Output = WardenResult<Option<OrgMember>>> + Send;
    fn remove(&self, org_id: Uuid, member_did: &str)
    -> impl Future<Output = WardenResult<()>> + Send;
}

pub trait TeamRepository: Send + Sync {
    /// Insert a team and, when it names a lead, the lead's `lead`
    /// membership in the same transaction. Fails with `AlreadyExists`
    /// when the name is taken within the organization.
    fn create(&self, input: CreateTeam) -> impl Future<Output = WardenResult<OrgTeam>> + Send;
    fn get_by_id(
        &self,
        org_id: Uuid,
        id: Uuid,
    ) -> impl Future<Output = WardenResult<OrgTeam>> + Send;
    fn get_by_name(
        &self,
        org_id: Uuid,
        name: &str,
    ) -> impl Future<Output = WardenResult<Option<OrgTeam>>> + Send;
    fn update(
        &self,
        org_id: Uuid,
        id: Uuid,
        input: UpdateTeam,
    ) -> impl Future<Output = WardenResult<OrgTeam>> + Send;
    /// Make `lead_did` the only `lead` of the team in one transaction:
    /// other leads are demoted, the new lead is promoted or enrolled and
    /// the team's lead fields are rewritten.
    fn assign_lead(
        &self,
        org_id: Uuid,
        id: Uuid,
        lead_did: &str,
        lead_name: Option<String>,
        invited_by: &str,
    ) -> impl Future<Output = WardenResult<OrgTeam>> + Send;
    /// Delete the team and its membership rows.
    fn delete(&self, org_id: Uuid, id: Uuid) -> impl Future<Output = WardenResult<()>> + Send;
    fn list(
        &self,
        org_id: Uuid,
        parent: ParentFilter,
    ) -> impl Future<Output = WardenResult<Vec<OrgTeam>>> + Send;
    fn count_children(
        &self,
        org_id: Uuid,
        id: Uuid,
    ) -> impl Future<Output = WardenResult<u64>> + Send;

    /// Add a member. Fails with `AlreadyExists` for a duplicate
    /// (team, member) pair.
    fn add_member(
        &self,
        org_id: Uuid,
        input: AddTeamMember,
    ) -> impl Future<Output = WardenResult<TeamMember>> + Send;
    fn get_member(
        &self,
        team_id: Uuid,
        member_did: &str,
    ) -> impl Future<Output = WardenResult<Option<TeamMember>>> + Send;
    /// Remove a member, clearing the team's lead fields in the same
    /// transaction when they named this member. Returns `false` when the
    /// member was not on the team.
    fn remove_member(
        &self,
        team_id: Uuid,
        member_did: &str,
    ) -> impl Future<Output = WardenResult<bool>> + Send;
    fn list_members(
        &self,
        team_id: Uuid,
    ) -> impl Future<Output = WardenResult<Vec<TeamMember>>> + Send;
    fn count_members(&self, team_id: Uuid) -> impl Future<Output = WardenResult<u64>> + Send;

    /// Ids of every team in the organization the member belongs to.
    fn list_member_team_ids(
        &self,
        org_id: Uuid,
        member_did: &str,
    ) -> impl Future<Output = WardenResult<Vec<Uuid>>> + Send;
}

// ---------------------------------------------------------------------------
// Approval workflows
// ---------------------------------------------------------------------------

pub trait WorkflowRepository: Send + Sync {
    fn create(
        &self,
        input: CreateWorkflow,
    ) -> impl Future<Output = WardenResult<ApprovalWorkflow>> + Send;
    fn get_by_id(&self, id: Uuid) -> impl Future<Output = WardenResult<ApprovalWorkflow>> + Send;
    fn update(
        &self,
        org_id: Uuid,
        id: Uuid,
        input: UpdateWorkflow,
    ) -> impl Future<Output = WardenResult<ApprovalWorkflow>> + Send;
    fn delete(&self, org_id: Uuid, id: Uuid) -> impl Future<Output = WardenResult<()>> + Send;
    fn list(
        &self,
        org_id: Uuid,
    ) -> impl Future<Output = WardenResult<Vec<ApprovalWorkflow>>> + Send;
}

pub trait ApprovalRequestRepository: Send + Sync {
    /// Insert a request in `pending` status at step 0.
    fn create(
        &self,
        input: CreateApprovalRequest,
    ) -> impl Future<Output = WardenResult<ApprovalRequest>> + Send;
    fn get_by_id(&self, id: Uuid) -> impl Future<Output = WardenResult<ApprovalRequest>> + Send;
    fn count_pending_for_workflow(
        &self,
        workflow_id: Uuid,
    ) -> impl Future<Output = WardenResult<u64>> + Send;

    /// Pending requests of one organization, or of every organization
    /// when `org_id` is `None`.
    fn list_pending(
        &self,
        org_id: Option<Uuid>,
    ) -> impl Future<Output = WardenResult<Vec<ApprovalRequest>>> + Send;

    /// Move a pending request from `from_step` to `from_step + 1`.
    /// Returns `None` when the request is no longer pending at `from_step`.
    fn advance_step(
        &self,
        id: Uuid,
        from_step: u32,
    ) -> impl Future<Output = WardenResult<Option<ApprovalRequest>>> + Send;

    /// Move a pending request into a terminal status and stamp
    /// `completed_at`. Returns `None` when the request was not pending.
    fn complete(
        &self,
        id: Uuid,
        status: RequestStatus,
        completed_at: DateTime<Utc>,
    ) -> impl Future<Output = WardenResult<Option<ApprovalRequest>>> + Send;

    fn list(
        &self,
        org_id: Uuid,
        filter: ApprovalHistoryFilter,
        pagination: Pagination,
    ) -> impl Future<Output = WardenResult<PaginatedResult<ApprovalRequest>>> + Send;

    /// Append a response. Responses are never updated or deleted.
    fn record_response(
        &self,
        input: CreateApprovalResponse,
    ) -> impl Future<Output = WardenResult<ApprovalResponse>> + Send;
    fn list_responses(
        &self,
        request_id: Uuid,
    ) -> impl Future<Output = WardenResult<Vec<ApprovalResponse>>> + Send;
}

// ---------------------------------------------------------------------------
// Audit (append-only, org-scoped)
// ---------------------------------------------------------------------------

/// Query filters for audit log entries.
#[derive(Debug, Clone, Default)]
pub struct AuditLogFilter {
    pub actor_did: Option<String>,
    pub action: Option<String>,
    pub target: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

pub trait AuditLogRepository: Send + Sync {
    /// Append a new audit log entry. No update or delete operations exist.
    fn append(
        &self,
        input: CreateAuditLogEntry,
    ) -> impl Future<Output = WardenResult<AuditLogEntry>> + Send;
    fn list(
        &self,
        org_id: Uuid,
        filter: AuditLogFilter,
        pagination: Pagination,
    ) -> impl Future<Output = WardenResult<PaginatedResult<AuditLogEntry>>> + Send;
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// One implementation of every repository, handed to the services.
///
/// Cloning a store must be cheap; implementations share one database
/// handle between clones.
pub trait Store: Clone + Send + Sync + 'static {
    type Grants: GrantRepository;
    type Inheritance: InheritanceRepository;
    type Delegations: DelegationRepository;
    type Members: OrgMemberRepository;
    type Teams: TeamRepository;
    type Workflows: WorkflowRepository;
    type Requests: ApprovalRequestRepository;
    type Audit: AuditLogRepository;

    fn grants(&self) -> &Self::Grants;
    fn inheritance(&self) -> &Self::Inheritance;
    fn delegations(&self) -> &Self::Delegations;
    fn members(&self) -> &Self::Members;
    fn teams(&self) -> &Self::Teams;
    fn workflows(&self) -> &Self::Workflows;
    fn requests(&self) -> &Self::Requests;
    fn audit(&self) -> &Self::Audit;
}
