//! Short-lived cache of `check_permission` decisions.
//!
//! Best effort: entries expire after the configured TTL and are dropped
//! on every write that could change a decision. An allow never outlives
//! the grant or delegation that produced it.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tracing::debug;
use uuid::Uuid;

#[derive(Debug)]
pub struct DecisionCache {
    ttl: Duration,
    /// Decision and the instant it stops being served.
    entries: RwLock<HashMap<String, (bool, Instant)>>,
}

impl DecisionCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// `userDid:orgId:resourceType:resourceId-or-*:permission`
    pub fn key(
        user_did: &str,
        org_id: Uuid,
        resource_type: &str,
        resource_id: Option<&str>,
        permission: &str,
    ) -> String {
        format!(
            "{user_did}:{org_id}:{resource_type}:{}:{permission}",
            resource_id.unwrap_or("*")
        )
    }

    pub fn get(&self, key: &str) -> Option<bool> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        let now = Instant::now();
        entries
            .get(key)
            .filter(|(_, deadline)| now < *deadline)
            .map(|(allowed, _)| *allowed)
    }

    /// Cache `allowed` for the TTL, or only until `valid_until` when the
    /// decision depends on something that ends sooner.
    pub fn insert(&self, key: String, allowed: bool, valid_until: Option<DateTime<Utc>>) {
        let now = Instant::now();
        let mut deadline = now.checked_add(self.ttl).unwrap_or(now);
        if let Some(until) = valid_until {
            let remaining = (until - Utc::now()).to_std().unwrap_or_default();
            deadline = deadline.min(now.checked_add(remaining).unwrap_or(now));
        }

        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.retain(|_, (_, at)| now < *at);
        entries.insert(key, (allowed, deadline));
    }

    /// Drop every decision cached for `user_did`.
    pub fn invalidate_user(&self, user_did: &str) {
        let prefix = format!("{user_did}:");
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        let before = entries.len();
        entries.retain(|key, _| !key.starts_with(&prefix));
        debug!(
            user_did,
            dropped = before - entries.len(),
            "Invalidated cached decisions"
        );
    }

    pub fn clear(&self) {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        debug!(dropped = entries.len(), "Cleared decision cache");
        entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
