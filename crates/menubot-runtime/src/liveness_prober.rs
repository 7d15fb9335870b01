use std::sync::Arc;
use std::time::Duration;

use menubot_core::LivenessTracker;
use menubot_telegram::ChatPlatform;
use tokio::sync::oneshot;
use tokio::task::{JoinError, JoinHandle};

pub const DEFAULT_PROBE_INTERVAL: Duration = Duration::from_secs(240);
/// Consecutive failed probes before a session is declared stalled.
///
/// A threshold of 1 restarts on any single transient blip; 3 waits for a
/// sustained outage.
pub const DEFAULT_PROBE_FAILURE_THRESHOLD: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LivenessProberConfig {
    pub interval: Duration,
    pub failure_threshold: u32,
}

impl Default for LivenessProberConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_PROBE_INTERVAL,
            failure_threshold: DEFAULT_PROBE_FAILURE_THRESHOLD,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Sent once by the prober when it gives up on the session.
pub struct StallReport {
    pub consecutive_failures: u32,
    pub last_error: String,
}

impl StallReport {
    pub(crate) fn prober_exited() -> Self {
        Self {
            consecutive_failures: 0,
            last_error: "liveness prober exited unexpectedly".to_string(),
        }
    }
}

#[derive(Debug)]
/// Handle over one session's prober task.
pub struct LivenessProberHandle {
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl LivenessProberHandle {
    pub fn is_running(&self) -> bool {
        self.task.is_some()
    }

    /// Signals the task and waits for it to finish. Safe to call twice.
    pub async fn shutdown(&mut self) -> Result<(), JoinError> {
        if let Some(shutdown_tx) = self.shutdown_tx.take() {
            let _ = shutdown_tx.send(());
        }
        match self.task.take() {
            Some(task) => task.await,
            None => Ok(()),
        }
    }
}

impl Drop for LivenessProberHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Spawns the prober for one session.
///
/// The first probe runs one interval after start; the session start itself
/// already proved connectivity.
pub fn start_liveness_prober(
    platform: Arc<dyn ChatPlatform>,
    liveness: LivenessTracker,
    config: LivenessProberConfig,
    stall_tx: oneshot::Sender<StallReport>,
) -> LivenessProberHandle {
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let task = tokio::spawn(run_liveness_probe_loop(
        platform,
        liveness,
        config,
        shutdown_rx,
        stall_tx,
    ));
    LivenessProberHandle {
        shutdown_tx: Some(shutdown_tx),
        task: Some(task),
    }
}

async fn run_liveness_probe_loop(
    platform: Arc<dyn ChatPlatform>,
    liveness: LivenessTracker,
    config: LivenessProberConfig,
    mut shutdown_rx: oneshot::Receiver<()>,
    stall_tx: oneshot::Sender<StallReport>,
) {
    let period = config.interval.max(Duration::from_millis(1));
    let threshold = config.failure_threshold.max(1);
    let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    let mut stall_tx = Some(stall_tx);

    loop {
        tokio::select! {
            _ = &mut shutdown_rx => break,
            _ = interval.tick() => {}
        }

        let result = tokio::select! {
            _ = &mut shutdown_rx => break,
            result = platform.probe() => result,
        };
        match result {
            Ok(identity) => {
                liveness.record_probe_success();
                tracing::debug!(bot_id = identity.id, "liveness probe ok");
            }
            Err(error) => {
                let failures = liveness.record_probe_failure(threshold);
                tracing::warn!(
                    failures,
                    threshold,
                    kind = error.kind(),
                    %error,
                    "liveness probe failed"
                );
                if failures >= threshold {
                    if let Some(stall_tx) = stall_tx.take() {
                        let _ = stall_tx.send(StallReport {
                            consecutive_failures: failures,
                            last_error: error.to_string(),
                        });
                    }
                    break;
                }
            }
        }
    }
}
