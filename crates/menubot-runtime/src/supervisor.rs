//! Restart supervisor owning the polling session lifecycle.

use std::sync::Arc;
use std::time::Duration;

use menubot_core::{
    current_unix_timestamp_ms, elapsed_since_unix_ms, LivenessSnapshot, LivenessTracker, StopToken,
};
use menubot_menu::MenuCatalog;
use menubot_telegram::PlatformError;
use serde::Serialize;
use tokio::sync::watch;

use crate::backoff_policy::{
    BackoffDecision, BackoffPolicy, BackoffReason, SupervisorPhase, SupervisorState,
};
use crate::liveness_prober::{LivenessProberConfig, StallReport};
use crate::session::{Session, SessionFactory};

pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupervisorConfig {
    pub poll_timeout: Duration,
    pub backoff: BackoffPolicy,
    pub prober: LivenessProberConfig,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            poll_timeout: DEFAULT_POLL_TIMEOUT,
            backoff: BackoffPolicy::default(),
            prober: LivenessProberConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
/// Published view of the supervisor for status endpoints.
pub struct SupervisorSnapshot {
    pub updated_unix_ms: u64,
    pub session_id: Option<u64>,
    pub next_update_offset: i64,
    #[serde(flatten)]
    pub state: SupervisorState,
    pub liveness: Option<LivenessSnapshot>,
}

impl SupervisorSnapshot {
    /// Time since the active session last handled an update, or `None`
    /// without an active session.
    pub fn idle_for_ms(&self, now_unix_ms: u64) -> Option<u64> {
        self.liveness.and_then(|liveness| {
            elapsed_since_unix_ms(liveness.last_activity_unix_ms, now_unix_ms)
        })
    }
}

enum SessionExit {
    OperatorStop,
    Stalled(StallReport),
    Failed {
        error: PlatformError,
        backoff: BackoffDecision,
    },
}

/// Drives sessions until an operator stop.
///
/// At most one [`Session`] exists at a time: the supervisor holds it by value
/// and tears it down before creating the next one.
pub struct RestartSupervisor {
    config: SupervisorConfig,
    factory: Arc<dyn SessionFactory>,
    catalog: Arc<MenuCatalog>,
    stop: StopToken,
    state: SupervisorState,
    next_update_offset: i64,
    sessions_started: u64,
    active: Option<(u64, LivenessTracker)>,
    snapshot_tx: watch::Sender<SupervisorSnapshot>,
}

impl RestartSupervisor {
    pub fn new(
        config: SupervisorConfig,
        factory: Arc<dyn SessionFactory>,
        catalog: Arc<MenuCatalog>,
        stop: StopToken,
    ) -> Self {
        let state = SupervisorState::default();
        let (snapshot_tx, _) = watch::channel(SupervisorSnapshot {
            updated_unix_ms: current_unix_timestamp_ms(),
            session_id: None,
            next_update_offset: 0,
            state,
            liveness: None,
        });
        Self {
            config,
            factory,
            catalog,
            stop,
            state,
            next_update_offset: 0,
            sessions_started: 0,
            active: None,
            snapshot_tx,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<SupervisorSnapshot> {
        self.snapshot_tx.subscribe()
    }

    /// Runs until the stop token fires and returns the final counters.
    pub async fn run(mut self) -> SupervisorState {
        tracing::info!(
            poll_timeout_secs = self.config.poll_timeout.as_secs(),
            probe_interval_secs = self.config.prober.interval.as_secs(),
            probe_failure_threshold = self.config.prober.failure_threshold,
            max_consecutive_errors = self.config.backoff.max_consecutive_errors,
            "restart supervisor started"
        );

        while !self.stop.is_stopped() {
            self.transition(SupervisorPhase::Starting);
            self.sessions_started = self.sessions_started.saturating_add(1);
            let session_id = self.sessions_started;

            let started = tokio::select! {
                biased;
                _ = self.stop.stopped() => break,
                started = Session::start(
                    session_id,
                    self.factory.as_ref(),
                    self.catalog.clone(),
                    self.config.prober,
                ) => started,
            };
            let mut session = match started {
                Ok(session) => session,
                Err(error) => {
                    tracing::warn!(
                        session = session_id,
                        kind = error.kind(),
                        %error,
                        "session start failed"
                    );
                    self.transition(SupervisorPhase::TearingDown);
                    let delay = self.config.backoff.startup_delay(&error);
                    if !self.wait_unless_stopped(delay).await {
                        break;
                    }
                    continue;
                }
            };

            self.state.record_success();
            self.active = Some((session.id(), session.liveness().clone()));
            self.transition(SupervisorPhase::Running);

            let exit = self.drive_session(&mut session).await;
            if let SessionExit::Stalled(report) = &exit {
                self.transition(SupervisorPhase::Stalled);
                tracing::warn!(
                    session = session_id,
                    consecutive_failures = report.consecutive_failures,
                    last_error = %report.last_error,
                    "session stalled; forcing restart"
                );
            }
            self.transition(SupervisorPhase::TearingDown);
            session.teardown().await;
            drop(session);
            self.active = None;

            match exit {
                SessionExit::OperatorStop => break,
                SessionExit::Stalled(_) => {
                    self.state.record_forced_restart();
                    self.publish();
                }
                SessionExit::Failed { error, backoff } => {
                    self.state.record_restart();
                    self.publish();
                    tracing::info!(
                        session = session_id,
                        kind = error.kind(),
                        delay_ms = backoff.delay.as_millis() as u64,
                        "restarting session after failure"
                    );
                    if !self.wait_unless_stopped(backoff.delay).await {
                        break;
                    }
                }
            }
        }

        self.transition(SupervisorPhase::Stopped);
        tracing::info!(
            restart_count = self.state.restart_count,
            long_cooldowns = self.state.long_cooldowns,
            "restart supervisor stopped"
        );
        self.state
    }

    async fn drive_session(&mut self, session: &mut Session) -> SessionExit {
        loop {
            if let Some(report) = session.poll_stall() {
                return SessionExit::Stalled(report);
            }

            let offset = self.next_update_offset;
            let fetched = tokio::select! {
                biased;
                _ = self.stop.stopped() => return SessionExit::OperatorStop,
                fetched = session.platform().fetch_updates(offset, self.config.poll_timeout) => fetched,
            };

            match fetched {
                Ok(updates) => {
                    self.state.record_success();
                    for update in &updates {
                        self.next_update_offset = self
                            .next_update_offset
                            .max(update.update_id.saturating_add(1));
                        session
                            .dispatcher()
                            .handle(session.platform(), update)
                            .await;
                    }
                    if self.state.phase != SupervisorPhase::Running {
                        self.transition(SupervisorPhase::Running);
                    } else if !updates.is_empty() {
                        self.publish();
                    }
                }
                Err(error) => {
                    let backoff = self.state.record_failure(&error, &self.config.backoff);
                    if !error.keeps_session() {
                        tracing::error!(
                            session = session.id(),
                            error = ?error,
                            consecutive_errors = self.state.consecutive_errors,
                            "unclassified polling failure; tearing session down"
                        );
                        return SessionExit::Failed { error, backoff };
                    }
                    log_backoff(session.id(), &error, &backoff, self.state.consecutive_errors);
                    self.transition(SupervisorPhase::Error);

                    tokio::select! {
                        biased;
                        _ = self.stop.stopped() => return SessionExit::OperatorStop,
                        report = session.stalled() => return SessionExit::Stalled(report),
                        _ = tokio::time::sleep(backoff.delay) => {}
                    }
                }
            }
        }
    }

    async fn wait_unless_stopped(&self, delay: Duration) -> bool {
        tokio::select! {
            biased;
            _ = self.stop.stopped() => false,
            _ = tokio::time::sleep(delay) => true,
        }
    }

    fn transition(&mut self, phase: SupervisorPhase) {
        if self.state.phase != phase {
            tracing::info!(
                from = self.state.phase.as_str(),
                to = phase.as_str(),
                consecutive_errors = self.state.consecutive_errors,
                restart_count = self.state.restart_count,
                "supervisor phase change"
            );
        }
        self.state.phase = phase;
        self.publish();
    }

    fn publish(&self) {
        let (session_id, liveness) = match &self.active {
            Some((id, tracker)) => (Some(*id), Some(tracker.snapshot())),
            None => (None, None),
        };
        self.snapshot_tx.send_replace(SupervisorSnapshot {
            updated_unix_ms: current_unix_timestamp_ms(),
            session_id,
            next_update_offset: self.next_update_offset,
            state: self.state,
            liveness,
        });
    }
}

fn log_backoff(
    session_id: u64,
    error: &PlatformError,
    backoff: &BackoffDecision,
    consecutive_errors: u32,
) {
    let delay_ms = backoff.delay.as_millis() as u64;
    match backoff.reason {
        BackoffReason::RateLimited => tracing::info!(
            session = session_id,
            delay_ms,
            "rate limited by platform; waiting"
        ),
        BackoffReason::ShortRetry => tracing::warn!(
            session = session_id,
            kind = error.kind(),
            %error,
            consecutive_errors,
            delay_ms,
            "polling failed; retrying"
        ),
        BackoffReason::LongCooldown => tracing::warn!(
            session = session_id,
            kind = error.kind(),
            %error,
            delay_ms,
            "too many consecutive polling failures; cooling down"
        ),
    }
}
