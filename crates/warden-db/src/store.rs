//! [`SurrealStore`]: every repository over one shared SurrealDB handle.

use surrealdb::{Connection, Surreal};
use warden_core::repository::Store;

use crate::repository::{
    SurrealApprovalRequestRepository, SurrealAuditLogRepository, SurrealDelegationRepository,
    SurrealGrantRepository, SurrealInheritanceRepository, SurrealOrgMemberRepository,
    SurrealTeamRepository, SurrealWorkflowRepository,
};

/// The SurrealDB-backed [`Store`]. Clones share the underlying client.
#[derive(Clone)]
pub struct SurrealStore<C: Connection> {
    grants: SurrealGrantRepository<C>,
    inheritance: SurrealInheritanceRepository<C>,
    delegations: SurrealDelegationRepository<C>,
    members: SurrealOrgMemberRepository<C>,
    teams: SurrealTeamRepository<C>,
    workflows: SurrealWorkflowRepository<C>,
    requests: SurrealApprovalRequestRepository<C>,
    audit: SurrealAuditLogRepository<C>,
}

impl<C: Connection> SurrealStore<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self {
            grants: SurrealGrantRepository::new(db.clone()),
            inheritance: SurrealInheritanceRepository::new(db.clone()),
            delegations: SurrealDelegationRepository::new(db.clone()),
            members: SurrealOrgMemberRepository::new(db.clone()),
            teams: SurrealTeamRepository::new(db.clone()),
            workflows: SurrealWorkflowRepository::new(db.clone()),
            requests: SurrealApprovalRequestRepository::new(db.clone()),
            audit: SurrealAuditLogRepository::new(db),
        }
    }
}

impl<C: Connection + Clone> Store for SurrealStore<C> {
    type Grants = SurrealGrantRepository<C>;
    type Inheritance = SurrealInheritanceRepository<C>;
    type Delegations = SurrealDelegationRepository<C>;
    type Members = SurrealOrgMemberRepository<C>;
    type Teams = SurrealTeamRepository<C>;
    type Workflows = SurrealWorkflowRepository<C>;
    type Requests = SurrealApprovalRequestRepository<C>;
    type Audit = SurrealAuditLogRepository<C>;

    fn grants(&self) -> &Self::Grants {
        &self.grants
    }

    fn inheritance(&self) -> &Self::Inheritance {
        &self.inheritance
    }

    fn delegations(&self) -> &Self::Delegations {
        &self.delegations
    }

    fn members(&self) -> &Self::Members {
        &self.members
    }

    fn teams(&self) -> &Self::Teams {
        &self.teams
    }

    fn workflows(&self) -> &Self::Workflows {
        &self.workflows
    }

    fn requests(&self) -> &Self::Requests {
        &self.requests
    }

    fn audit(&self) -> &Self::Audit {
        &self.audit
    }
}
