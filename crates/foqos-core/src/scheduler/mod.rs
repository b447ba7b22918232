//! Deferred expiration scheduling.
//!
//! When a session starts with a timer, the lifecycle manager registers a
//! one-shot callback here. Firing and cancellation are both best-effort:
//! `expire_by_timer` re-validates session state itself, so a late or
//! uncancelled callback is harmless.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;
use std::time::Duration;

use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::error::CoreError;

/// One-shot expiration callback. `Fn` rather than `FnOnce` so the scheduler
/// can retry transient failures.
pub type ExpireCallback =
    Box<dyn Fn() -> Pin<Box<dyn Future<Output = Result<(), CoreError>> + Send>> + Send + Sync>;

/// Contract for the deferred-expiration collaborator: run a callback after a
/// delay, cancellable by session id.
pub trait ExpirationScheduler: Send + Sync {
    fn schedule(&self, session_id: Uuid, delay: Duration, on_fire: ExpireCallback);

    /// Cancel the pending callback for a session. No-op when none is pending
    /// or it already fired.
    fn cancel(&self, session_id: Uuid);
}

/// Tokio-backed scheduler: one spawned task per timed session.
pub struct TokioExpirationScheduler {
    tasks: Mutex<HashMap<Uuid, JoinHandle<()>>>,
    /// Delivery attempts per callback before giving up.
    max_attempts: u32,
    retry_delay: Duration,
}

impl TokioExpirationScheduler {
    pub fn new() -> Self {
        Self {
            tasks: Mutex::new(HashMap::new()),
            max_attempts: 3,
            retry_delay: Duration::from_secs(5),
        }
    }

    #[cfg(test)]
    fn with_retry(max_attempts: u32, retry_delay: Duration) -> Self {
        Self {
            tasks: Mutex::new(HashMap::new()),
            max_attempts,
            retry_delay,
        }
    }

    /// Whether a callback is still pending for the session.
    pub fn is_pending(&self, session_id: Uuid) -> bool {
        self.tasks
            .lock()
            .expect("scheduler task map poisoned")
            .get(&session_id)
            .is_some_and(|h| !h.is_finished())
    }
}

impl Default for TokioExpirationScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl ExpirationScheduler for TokioExpirationScheduler {
    fn schedule(&self, session_id: Uuid, delay: Duration, on_fire: ExpireCallback) {
        let max_attempts = self.max_attempts;
        let retry_delay = self.retry_delay;
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            for attempt in 1..=max_attempts {
                match on_fire().await {
                    Ok(()) => return,
                    Err(_) if attempt < max_attempts => {
                        tokio::time::sleep(retry_delay).await;
                    }
                    Err(_) => return,
                }
            }
        });

        let mut tasks = self.tasks.lock().expect("scheduler task map poisoned");
        if let Some(previous) = tasks.insert(session_id, handle) {
            previous.abort();
        }
    }

    fn cancel(&self, session_id: Uuid) {
        if let Some(handle) = self
            .tasks
            .lock()
            .expect("scheduler task map poisoned")
            .remove(&session_id)
        {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn counting_callback(counter: Arc<AtomicU32>, fail_first: u32) -> ExpireCallback {
        Box::new(move || {
            let counter = counter.clone();
            Box::pin(async move {
                let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                if n <= fail_first {
                    Err(CoreError::Custom("transient".into()))
                } else {
                    Ok(())
                }
            })
        })
    }

    #[tokio::test]
    async fn fires_after_delay() {
        let scheduler = TokioExpirationScheduler::new();
        let fired = Arc::new(AtomicU32::new(0));
        let id = Uuid::new_v4();

        scheduler.schedule(id, Duration::from_millis(10), counting_callback(fired.clone(), 0));
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(!scheduler.is_pending(id));
    }

    #[tokio::test]
    async fn cancel_prevents_firing() {
        let scheduler = TokioExpirationScheduler::new();
        let fired = Arc::new(AtomicU32::new(0));
        let id = Uuid::new_v4();

        scheduler.schedule(id, Duration::from_millis(50), counting_callback(fired.clone(), 0));
        scheduler.cancel(id);
        tokio::time::sleep(Duration::from_millis(150)).await;

        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn cancel_unknown_session_is_noop() {
        let scheduler = TokioExpirationScheduler::new();
        scheduler.cancel(Uuid::new_v4());
    }

    #[tokio::test]
    async fn retries_transient_failure() {
        let scheduler =
            TokioExpirationScheduler::with_retry(3, Duration::from_millis(5));
        let attempts = Arc::new(AtomicU32::new(0));
        let id = Uuid::new_v4();

        scheduler.schedule(
            id,
            Duration::from_millis(5),
            counting_callback(attempts.clone(), 1),
        );
        tokio::time::sleep(Duration::from_millis(100)).await;

        // First delivery fails, the retry succeeds.
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn rescheduling_replaces_previous_timer() {
        let scheduler = TokioExpirationScheduler::new();
        let fired = Arc::new(AtomicU32::new(0));
        let id = Uuid::new_v4();

        scheduler.schedule(id, Duration::from_millis(20), counting_callback(fired.clone(), 0));
        scheduler.schedule(id, Duration::from_millis(20), counting_callback(fired.clone(), 0));
        tokio::time::sleep(Duration::from_millis(120)).await;

        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }
}
