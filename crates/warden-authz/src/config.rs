//! Authorization service configuration.

use std::time::Duration;

/// Configuration shared by the permission engine and the workflow manager.
#[derive(Debug, Clone)]
pub struct AuthzConfig {
    /// Lifetime of a cached `check_permission` decision in seconds
    /// (default: 60).
    pub decision_cache_ttl_secs: u64,
    /// Longest chain of inheritance edges followed by one check before it
    /// fails closed (default: 32).
    pub max_inheritance_depth: usize,
    /// Length of one workflow "timeout hour" in seconds (default: 3600).
    /// Tests shrink this to exercise timers quickly.
    pub timeout_hour_secs: u64,
    /// Buffered approval events per subscriber (default: 256).
    pub event_channel_capacity: usize,
}

impl AuthzConfig {
    pub fn decision_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.decision_cache_ttl_secs)
    }

    /// Wall-clock length of `hours` workflow timeout hours.
    pub fn timeout_for(&self, hours: u32) -> chrono::Duration {
        let secs = self.timeout_hour_secs.saturating_mul(u64::from(hours));
        i64::try_from(secs)
            .ok()
            .and_then(chrono::Duration::try_seconds)
            .unwrap_or(chrono::Duration::MAX)
    }
}

impl Default for AuthzConfig {
    fn default() -> Self {
        Self {
            decision_cache_ttl_secs: 60,
            max_inheritance_depth: 32,
            timeout_hour_secs: 3600,
            event_channel_capacity: 256,
        }
    }
}
