//! Per-request async locks.
//!
//! An entry lives only while some caller holds or awaits the lock for
//! its request; the last [`RequestSlot`] to drop removes it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, MutexGuard};
use uuid::Uuid;

#[derive(Debug, Default)]
pub struct RequestLocks {
    entries: Mutex<HashMap<Uuid, Arc<AsyncMutex<()>>>>,
}

impl RequestLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register interest in `request_id`'s lock. Lock it with
    /// [`RequestSlot::lock`]; drop the guard before the slot.
    pub fn slot(&self, request_id: Uuid) -> RequestSlot<'_> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let lock = Arc::clone(entries.entry(request_id).or_default());
        RequestSlot {
            locks: self,
            request_id,
            lock,
        }
    }

    /// Requests with at least one live slot.
    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub struct RequestSlot<'a> {
    locks: &'a RequestLocks,
    request_id: Uuid,
    lock: Arc<AsyncMutex<()>>,
}

impl RequestSlot<'_> {
    pub async fn lock(&self) -> MutexGuard<'_, ()> {
        self.lock.lock().await
    }
}

impl Drop for RequestSlot<'_> {
    fn drop(&mut self) {
        let mut entries = self
            .locks
            .entries
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        // One reference in the map, one here: nobody else is waiting.
        if Arc::strong_count(&self.lock) == 2 {
            entries.remove(&self.request_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn entry_is_dropped_with_the_last_slot() {
        let locks = RequestLocks::new();
        let id = Uuid::new_v4();
        {
            let slot = locks.slot(id);
            let _guard = slot.lock().await;
            assert_eq!(locks.len(), 1);
        }
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn entry_survives_while_another_caller_waits() {
        let locks = RequestLocks::new();
        let id = Uuid::new_v4();

        let first = locks.slot(id);
        let guard = first.lock().await;
        let second = locks.slot(id);

        drop(guard);
        drop(first);
        assert_eq!(locks.len(), 1);

        {
            let _guard = second.lock().await;
        }
        drop(second);
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn abandoned_waiter_does_not_leak() {
        let locks = RequestLocks::new();
        let id = Uuid::new_v4();

        let holder = locks.slot(id);
        let guard = holder.lock().await;
        {
            let waiter = locks.slot(id);
            let waited = tokio::time::timeout(Duration::from_millis(20), waiter.lock()).await;
            assert!(waited.is_err());
        }
        assert_eq!(locks.len(), 1);

        drop(guard);
        drop(holder);
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn distinct_requests_do_not_share_a_lock() {
        let locks = RequestLocks::new();
        let a = locks.slot(Uuid::new_v4());
        let b = locks.slot(Uuid::new_v4());
        let _ga = a.lock().await;
        let _gb = b.lock().await;
        assert_eq!(locks.len(), 2);
    }
}
