//! Error types for the Warden system.
//!
//! Two families of errors exist. [`DomainError`]s are expected outcomes
//! of business rules (a duplicate grant, a missing request) and are
//! rendered to callers as a stable error code. Everything else in
//! [`WardenError`] is infrastructure failure that propagates unchanged.

use thiserror::Error;

/// Business-rule failures, each with a stable wire code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DomainError {
    #[error("permission grant already exists")]
    PermissionExists,

    #[error("permission grant not found")]
    GrantNotFound,

    #[error("approval workflow not found or disabled")]
    WorkflowNotFound,

    #[error("approval request not found or no longer pending")]
    RequestNotFound,

    #[error("approver is not authorized for the current step")]
    NotAuthorized,

    #[error("workflow still has pending approval requests")]
    HasPendingRequests,

    #[error("delegation not found")]
    DelegationNotFound,

    #[error("only the delegator may revoke a delegation")]
    NotDelegator,

    #[error("team still has sub-teams")]
    HasSubTeams,

    #[error("member already belongs to the team")]
    AlreadyMember,

    #[error("a team with this name already exists in the organization")]
    TeamNameExists,
}

impl DomainError {
    /// The stable code surfaced to callers.
    pub fn code(&self) -> &'static str {
        match self {
            DomainError::PermissionExists => "PERMISSION_EXISTS",
            DomainError::GrantNotFound => "GRANT_NOT_FOUND",
            DomainError::WorkflowNotFound => "WORKFLOW_NOT_FOUND",
            DomainError::RequestNotFound => "REQUEST_NOT_FOUND",
            DomainError::NotAuthorized => "NOT_AUTHORIZED",
            DomainError::HasPendingRequests => "HAS_PENDING_REQUESTS",
            DomainError::DelegationNotFound => "DELEGATION_NOT_FOUND",
            DomainError::NotDelegator => "NOT_DELEGATOR",
            DomainError::HasSubTeams => "HAS_SUB_TEAMS",
            DomainError::AlreadyMember => "ALREADY_MEMBER",
            DomainError::TeamNameExists => "TEAM_NAME_EXISTS",
        }
    }
}

#[derive(Debug, Error)]
pub enum WardenError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Entity already exists: {entity}")]
    AlreadyExists { entity: String },

    #[error("Validation error: {message}")]
    Validation { message: String },

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl WardenError {
    pub fn validation(message: impl Into<String>) -> Self {
        WardenError::Validation {
            message: message.into(),
        }
    }

    /// Code for errors that are returned to the caller rather than
    /// propagated. `None` means the error is an infrastructure failure.
    pub fn code(&self) -> Option<&'static str> {
        match self {
            WardenError::Domain(e) => Some(e.code()),
            WardenError::NotFound { .. } => Some("NOT_FOUND"),
            WardenError::Validation { .. } => Some("VALIDATION_ERROR"),
            WardenError::AlreadyExists { .. }
            | WardenError::Database(_)
            | WardenError::Internal(_) => None,
        }
    }

    pub fn is_domain(&self, expected: DomainError) -> bool {
        matches!(self, WardenError::Domain(e) if *e == expected)
    }
}

pub type WardenResult<T> = Result<T, WardenError>;
