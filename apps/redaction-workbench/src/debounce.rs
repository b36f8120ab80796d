//! Trailing-edge debouncer
//!
//! Each `schedule` call replaces the pending action; the action runs only
//! after `delay` passes without another call.

use std::future::Future;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;

pub struct Debouncer {
    delay: Duration,
    pending: Mutex<Option<JoinHandle<()>>>,
}

impl Debouncer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            pending: Mutex::new(None),
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    pub fn schedule<F>(&self, action: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let delay = self.delay;
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = pending.take() {
            previous.abort();
        }
        *pending = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            action.await;
        }));
    }

    /// Drop the pending action, if any
    pub fn cancel(&self) {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = pending.take() {
            previous.abort();
        }
    }

    /// Whether an action is waiting to run
    pub fn is_pending(&self) -> bool {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        self.cancel();
    }
}
