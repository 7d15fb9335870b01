use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Operator stop token shared between the signal handler and the supervisor.
#[derive(Debug, Clone, Default)]
pub struct StopToken {
    stopped: Arc<AtomicBool>,
    notify: Arc<tokio::sync::Notify>,
}

impl StopToken {
    /// Creates a new, not-yet-stopped token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests a stop and wakes pending waiters.
    pub fn stop(&self) {
        let already_stopped = self.stopped.swap(true, Ordering::SeqCst);
        if !already_stopped {
            self.notify.notify_waiters();
        }
    }

    /// Returns true when a stop has been requested.
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Resolves once a stop has been requested.
    pub async fn stopped(&self) {
        let notified = self.notify.notified();
        tokio::pin!(notified);
        // Register before checking the flag so a concurrent `stop` is not missed.
        notified.as_mut().enable();
        if self.is_stopped() {
            return;
        }
        notified.await;
    }
}
