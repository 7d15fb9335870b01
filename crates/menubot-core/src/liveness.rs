//! Per-session liveness bookkeeping shared by the dispatcher and the prober.

use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};

use crate::current_unix_timestamp_ms;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
/// Point-in-time copy of a session's liveness state.
pub struct LivenessSnapshot {
    pub started_unix_ms: u64,
    pub last_activity_unix_ms: u64,
    pub last_probe_unix_ms: u64,
    pub consecutive_probe_failures: u32,
    pub healthy: bool,
}

#[derive(Debug, Clone)]
/// Shared handle over one session's liveness state.
///
/// User activity and probe results are tracked separately: silence from
/// users never affects `healthy`, only failed probes do.
pub struct LivenessTracker {
    inner: Arc<Mutex<LivenessSnapshot>>,
}

impl LivenessTracker {
    /// Creates fresh state for a new session.
    pub fn fresh() -> Self {
        let now = current_unix_timestamp_ms();
        Self {
            inner: Arc::new(Mutex::new(LivenessSnapshot {
                started_unix_ms: now,
                last_activity_unix_ms: now,
                last_probe_unix_ms: 0,
                consecutive_probe_failures: 0,
                healthy: true,
            })),
        }
    }

    /// Records a successfully handled inbound update.
    pub fn record_activity(&self) {
        self.lock().last_activity_unix_ms = current_unix_timestamp_ms();
    }

    /// Records a successful connectivity probe.
    pub fn record_probe_success(&self) {
        let mut state = self.lock();
        state.consecutive_probe_failures = 0;
        state.healthy = true;
        state.last_probe_unix_ms = current_unix_timestamp_ms();
    }

    /// Records a failed probe and returns the updated failure streak.
    ///
    /// `healthy` flips to false once the streak reaches `threshold`.
    pub fn record_probe_failure(&self, threshold: u32) -> u32 {
        let mut state = self.lock();
        state.consecutive_probe_failures = state.consecutive_probe_failures.saturating_add(1);
        state.last_probe_unix_ms = current_unix_timestamp_ms();
        if state.consecutive_probe_failures >= threshold.max(1) {
            state.healthy = false;
        }
        state.consecutive_probe_failures
    }

    pub fn snapshot(&self) -> LivenessSnapshot {
        *self.lock()
    }

    fn lock(&self) -> MutexGuard<'_, LivenessSnapshot> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for LivenessTracker {
    fn default() -> Self {
        Self::fresh()
    }
}
