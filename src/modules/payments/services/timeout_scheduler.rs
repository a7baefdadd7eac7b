use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::task::AbortHandle;

/// Cancellable per-payment timers
///
/// Timers live in memory only; the expiration sweep covers payments whose
/// timer was lost to a restart.
#[derive(Default)]
pub struct TimeoutScheduler {
    timers: Mutex<HashMap<String, AbortHandle>>,
}

impl TimeoutScheduler {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn timers(&self) -> MutexGuard<'_, HashMap<String, AbortHandle>> {
        self.timers.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Run `on_timeout` after `delay` unless cancelled first. Scheduling the
    /// same id again replaces the previous timer.
    pub fn schedule<F>(self: &Arc<Self>, payment_id: &str, delay: Duration, on_timeout: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let scheduler = Arc::clone(self);
        let id = payment_id.to_string();

        let mut timers = self.timers();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            scheduler.forget(&id);
            on_timeout.await;
        });

        if let Some(previous) = timers.insert(payment_id.to_string(), handle.abort_handle()) {
            previous.abort();
        }
    }

    /// Abort a pending timer; `false` when none was armed
    pub fn cancel(&self, payment_id: &str) -> bool {
        match self.timers().remove(payment_id) {
            Some(handle) => {
                handle.abort();
                true
            }
            None => false,
        }
    }

    pub fn is_armed(&self, payment_id: &str) -> bool {
        self.timers().contains_key(payment_id)
    }

    pub fn armed(&self) -> usize {
        self.timers().len()
    }

    fn forget(&self, payment_id: &str) {
        self.timers().remove(payment_id);
    }
}
