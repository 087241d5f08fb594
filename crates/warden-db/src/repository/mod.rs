//! SurrealDB repository implementations.
//!
//! Every repository reads records back with
//! `SELECT meta::id(id) AS record_id, *` so the UUID key travels with
//! the row. Writes that must not race (status transitions, step
//! advances) are issued as conditional `UPDATE ... WHERE` statements and
//! report whether a row was touched.

mod approval;
mod audit;
mod delegation;
mod grant;
mod inheritance;
mod membership;
mod team;
mod workflow;

pub use approval::SurrealApprovalRequestRepository;
pub use audit::SurrealAuditLogRepository;
pub use delegation::SurrealDelegationRepository;
pub use grant::SurrealGrantRepository;
pub use inheritance::SurrealInheritanceRepository;
pub use membership::SurrealOrgMemberRepository;
pub use team::SurrealTeamRepository;
pub use workflow::SurrealWorkflowRepository;

use surrealdb_types::SurrealValue;

use crate::error::DbError;

#[derive(Debug, SurrealValue)]
pub(crate) struct CountRow {
    pub(crate) total: u64,
}

/// Rows touched by a conditional update; only used for counting.
#[derive(Debug, SurrealValue)]
pub(crate) struct TouchedRow {
    #[allow(dead_code)]
    pub(crate) org_id: String,
}

pub(crate) fn total(rows: Vec<CountRow>) -> u64 {
    rows.first().map(|r| r.total).unwrap_or(0)
}

/// The single row a record-id query returns, or `NotFound`.
pub(crate) fn single<T>(rows: Vec<T>, entity: &str, id: impl ToString) -> Result<T, DbError> {
    rows.into_iter()
        .next()
        .ok_or_else(|| DbError::not_found(entity, id))
}
