//! One-shot timers for pending approval requests.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::debug;
use uuid::Uuid;

/// Tracks the timeout task armed for each pending request.
///
/// At most one timer exists per request. Every terminal transition
/// cancels (or, from inside the timer itself, disarms) the entry.
#[derive(Debug, Default)]
pub struct TimeoutScheduler {
    tasks: Mutex<HashMap<Uuid, JoinHandle<()>>>,
}

impl TimeoutScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `on_fire` once `delay` has elapsed. Re-arming a request aborts
    /// its previous timer.
    pub fn arm<F>(&self, request_id: Uuid, delay: Duration, on_fire: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        // Held across the spawn so a zero-delay task cannot disarm itself
        // before its handle is recorded.
        let mut tasks = self.tasks.lock().unwrap_or_else(|e| e.into_inner());
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            on_fire.await;
        });
        if let Some(previous) = tasks.insert(request_id, handle) {
            previous.abort();
        }
        debug!(%request_id, delay_ms = delay.as_millis() as u64, "Armed approval timeout");
    }

    /// Abort the request's timer. Returns `false` when none was armed.
    pub fn cancel(&self, request_id: Uuid) -> bool {
        let handle = self
            .tasks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&request_id);
        match handle {
            Some(handle) => {
                handle.abort();
                debug!(%request_id, "Cancelled approval timeout");
                true
            }
            None => false,
        }
    }

    /// Forget the request's timer without aborting it. Used by the timer
    /// task itself once it has fired.
    pub fn disarm(&self, request_id: Uuid) {
        self.tasks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&request_id);
    }

    pub fn is_armed(&self, request_id: Uuid) -> bool {
        self.tasks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(&request_id)
    }

    pub fn len(&self) -> usize {
        self.tasks.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Abort every armed timer.
    pub fn shutdown(&self) {
        let drained: Vec<_> = self
            .tasks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .drain()
            .collect();
        for (_, handle) in &drained {
            handle.abort();
        }
        debug!(count = drained.len(), "Cancelled all approval timeouts");
    }
}

impl Drop for TimeoutScheduler {
    fn drop(&mut self) {
        let tasks = self.tasks.get_mut().unwrap_or_else(|e| e.into_inner());
        for (_, handle) in tasks.drain() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[tokio::test]
    async fn armed_timer_fires_once() {
        let scheduler = TimeoutScheduler::new();
        let fired = Arc::new(AtomicUsize::new(0));
        let id = Uuid::new_v4();

        let counter = fired.clone();
        scheduler.arm(id, Duration::from_millis(10), async move {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert!(scheduler.is_armed(id));

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cancelled_timer_never_fires() {
        let scheduler = TimeoutScheduler::new();
        let fired = Arc::new(AtomicUsize::new(0));
        let id = Uuid::new_v4();

        let counter = fired.clone();
        scheduler.arm(id, Duration::from_millis(20), async move {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert!(scheduler.cancel(id));
        assert!(!scheduler.cancel(id));

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        assert!(scheduler.is_empty());
    }

    #[tokio::test]
    async fn rearming_replaces_the_previous_timer() {
        let scheduler = TimeoutScheduler::new();
        let fired = Arc::new(AtomicUsize::new(0));
        let id = Uuid::new_v4();

        for _ in 0..3 {
            let counter = fired.clone();
            scheduler.arm(id, Duration::from_millis(20), async move {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }
        assert_eq!(scheduler.len(), 1);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);

        scheduler.shutdown();
        assert!(scheduler.is_empty());
    }
}
