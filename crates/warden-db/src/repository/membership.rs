//! SurrealDB implementation of [`OrgMemberRepository`].
//!
//! One record per (org, member); the record key is `"{org_id}/{did}"`, so
//! upserts replace the role in place.

use chrono::{DateTime, Utc};
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use uuid::Uuid;
use warden_core::error::WardenResult;
use warden_core::models::membership::OrgMember;
use warden_core::repository::OrgMemberRepository;

use super::single;
use crate::convert::parse_uuid;
use crate::error::DbError;

const ENTITY: &str = "org_member";

#[derive(Debug, SurrealValue)]
struct OrgMemberRecord {
    org_id: String,
    member_did: String,
    role: String,
    joined_at: DateTime<Utc>,
}

impl OrgMemberRecord {
    fn try_into_member(self) -> Result<OrgMember, DbError> {
        Ok(OrgMember {
            org_id: parse_uuid(ENTITY, &self.org_id)?,
            member_did: self.member_did,
            role: self.role,
            joined_at: self.joined_at,
        })
    }
}

fn member_key(org_id: Uuid, member_did: &str) -> String {
    format!("{org_id}/{member_did}")
}

/// SurrealDB implementation of the organization membership repository.
#[derive(Clone)]
pub struct SurrealOrgMemberRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealOrgMemberRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }
}

impl<C: Connection> OrgMemberRepository for SurrealOrgMemberRepository<C> {
    async fn upsert(&self, org_id: Uuid, member_did: &str, role: &str) -> WardenResult<OrgMember> {
        let key = member_key(org_id, member_did);

        let result = self
            .db
            .query(
                "UPSERT type::record('org_member', $key) SET \
                 org_id = $org_id, member_did = $member_did, role = $role",
            )
            .bind(("key", key.clone()))
            .bind(("org_id", org_id.to_string()))
            .bind(("member_did", member_did.to_string()))
            .bind(("role", role.to_string()))
            .await
            .map_err(DbError::from)?;

        let mut result = result.check().map_err(|e| DbError::from_write(ENTITY, e))?;

        let rows: Vec<OrgMemberRecord> = result.take(0).map_err(DbError::from)?;
        Ok(single(rows, ENTITY, key)?.try_into_member()?)
    }

    async fn get(&self, org_id: Uuid, member_did: &str) -> WardenResult<Option<OrgMember>> {
        let mut result = self
            .db
            .query("SELECT * FROM type::record('org_member', $key)")
            .bind(("key", member_key(org_id, member_did)))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<OrgMemberRecord> = result.take(0).map_err(DbError::from)?;
        Ok(rows
            .into_iter()
            .next()
            .map(OrgMemberRecord::try_into_member)
            .transpose()?)
    }

    async fn remove(&self, org_id: Uuid, member_did: &str) -> WardenResult<()> {
        self.db
            .query("DELETE type::record('org_member', $key)")
            .bind(("key", member_key(org_id, member_did)))
            .await
            .map_err(DbError::from)?;

        Ok(())
    }
}
