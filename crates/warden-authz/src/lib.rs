//! Warden Authz — permission checks, delegations, teams and approval
//! workflows over any [`Store`](warden_core::Store) implementation.

mod audit;
pub mod cache;
pub mod config;
pub mod delegation;
pub mod engine;
pub mod events;
mod locks;
mod roles;
pub mod team;
pub mod timer;
pub mod workflow;

use std::sync::Arc;

use warden_core::Store;

pub use cache::DecisionCache;
pub use config::AuthzConfig;
pub use delegation::DelegationManager;
pub use engine::PermissionEngine;
pub use events::{ApprovalEvent, ApprovalEventSink, BroadcastEventSink};
pub use team::TeamManager;
pub use timer::TimeoutScheduler;
pub use workflow::ApprovalWorkflowManager;

/// The four managers wired to one store and one decision cache.
pub struct AuthzServices<S: Store> {
    pub engine: PermissionEngine<S>,
    pub delegations: DelegationManager<S>,
    pub teams: TeamManager<S>,
    pub workflows: ApprovalWorkflowManager<S>,
}

impl<S: Store> AuthzServices<S> {
    pub fn new(store: S, events: Arc<dyn ApprovalEventSink>, config: AuthzConfig) -> Self {
        let cache = Arc::new(DecisionCache::new(config.decision_cache_ttl()));
        Self {
            engine: PermissionEngine::with_cache(store.clone(), Arc::clone(&cache), config.clone()),
            delegations: DelegationManager::new(store.clone(), Arc::clone(&cache)),
            teams: TeamManager::new(store.clone(), cache),
            workflows: ApprovalWorkflowManager::new(store, events, config),
        }
    }
}
