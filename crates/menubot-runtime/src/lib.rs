//! Session supervision for the menu bot.
//!
//! A [`RestartSupervisor`] owns one polling [`Session`] at a time, feeds
//! inbound updates to the dispatcher, and applies the [`BackoffPolicy`]
//! failure table. A per-session liveness prober reports stalls that force a
//! full restart.

pub mod backoff_policy;
pub mod liveness_prober;
pub mod session;
pub mod supervisor;

pub use backoff_policy::{
    BackoffDecision, BackoffPolicy, BackoffReason, SupervisorPhase, SupervisorState,
};
pub use liveness_prober::{
    start_liveness_prober, LivenessProberConfig, LivenessProberHandle, StallReport,
    DEFAULT_PROBE_FAILURE_THRESHOLD, DEFAULT_PROBE_INTERVAL,
};
pub use session::{Session, SessionFactory, TelegramSessionFactory};
pub use supervisor::{RestartSupervisor, SupervisorConfig, SupervisorSnapshot, DEFAULT_POLL_TIMEOUT};

#[cfg(test)]
mod tests;
