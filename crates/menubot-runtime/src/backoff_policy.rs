//! Failure classification table and the supervisor counters it drives.

use std::time::Duration;

use menubot_telegram::PlatformError;
use serde::{Deserialize, Serialize};

pub const DEFAULT_RATE_LIMIT_MARGIN: Duration = Duration::from_secs(1);
pub const DEFAULT_TIMEOUT_RETRY_DELAY: Duration = Duration::from_secs(3);
pub const DEFAULT_NETWORK_RETRY_DELAY: Duration = Duration::from_secs(5);
pub const DEFAULT_MAX_CONSECUTIVE_ERRORS: u32 = 5;
pub const DEFAULT_LONG_COOLDOWN: Duration = Duration::from_secs(90);
pub const DEFAULT_STARTUP_RETRY_DELAY: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, Eq)]
/// Delays and thresholds applied to classified platform failures.
pub struct BackoffPolicy {
    pub rate_limit_margin: Duration,
    pub timeout_retry_delay: Duration,
    pub network_retry_delay: Duration,
    pub max_consecutive_errors: u32,
    pub long_cooldown: Duration,
    pub startup_retry_delay: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            rate_limit_margin: DEFAULT_RATE_LIMIT_MARGIN,
            timeout_retry_delay: DEFAULT_TIMEOUT_RETRY_DELAY,
            network_retry_delay: DEFAULT_NETWORK_RETRY_DELAY,
            max_consecutive_errors: DEFAULT_MAX_CONSECUTIVE_ERRORS,
            long_cooldown: DEFAULT_LONG_COOLDOWN,
            startup_retry_delay: DEFAULT_STARTUP_RETRY_DELAY,
        }
    }
}

impl BackoffPolicy {
    /// Delay before retrying a failed session start.
    pub fn startup_delay(&self, error: &PlatformError) -> Duration {
        match error {
            PlatformError::RateLimited {
                retry_after_seconds,
            } => self.rate_limit_delay(*retry_after_seconds),
            _ => self.startup_retry_delay,
        }
    }

    fn rate_limit_delay(&self, retry_after_seconds: u64) -> Duration {
        Duration::from_secs(retry_after_seconds).saturating_add(self.rate_limit_margin)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
/// Lifecycle phases of the restart supervisor.
pub enum SupervisorPhase {
    Starting,
    Running,
    Error,
    Stalled,
    TearingDown,
    Stopped,
}

impl SupervisorPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Error => "error",
            Self::Stalled => "stalled",
            Self::TearingDown => "tearing_down",
            Self::Stopped => "stopped",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffReason {
    RateLimited,
    ShortRetry,
    LongCooldown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// What the supervisor does after one classified failure.
pub struct BackoffDecision {
    pub delay: Duration,
    pub reason: BackoffReason,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
/// Counters owned by the supervisor across sessions.
pub struct SupervisorState {
    pub phase: SupervisorPhase,
    pub consecutive_errors: u32,
    pub restart_count: u64,
    pub long_cooldowns: u64,
}

impl Default for SupervisorState {
    fn default() -> Self {
        Self {
            phase: SupervisorPhase::Starting,
            consecutive_errors: 0,
            restart_count: 0,
            long_cooldowns: 0,
        }
    }
}

impl SupervisorState {
    /// Any successful poll or session start clears the error streak.
    pub fn record_success(&mut self) {
        self.consecutive_errors = 0;
    }

    /// Applies the failure table to one classified error.
    pub fn record_failure(
        &mut self,
        error: &PlatformError,
        policy: &BackoffPolicy,
    ) -> BackoffDecision {
        match error {
            PlatformError::RateLimited {
                retry_after_seconds,
            } => {
                self.consecutive_errors = 0;
                BackoffDecision {
                    delay: policy.rate_limit_delay(*retry_after_seconds),
                    reason: BackoffReason::RateLimited,
                }
            }
            PlatformError::Timeout => self.count_error(policy.timeout_retry_delay, policy),
            PlatformError::NetworkUnavailable(_) | PlatformError::Unclassified(_) => {
                self.count_error(policy.network_retry_delay, policy)
            }
        }
    }

    /// Session torn down after a failure that invalidated it.
    pub fn record_restart(&mut self) {
        self.restart_count = self.restart_count.saturating_add(1);
    }

    /// Session torn down because the prober declared it stalled.
    pub fn record_forced_restart(&mut self) {
        self.record_restart();
        self.consecutive_errors = 0;
    }

    fn count_error(&mut self, short_delay: Duration, policy: &BackoffPolicy) -> BackoffDecision {
        self.consecutive_errors = self.consecutive_errors.saturating_add(1);
        if self.consecutive_errors >= policy.max_consecutive_errors.max(1) {
            self.consecutive_errors = 0;
            self.long_cooldowns = self.long_cooldowns.saturating_add(1);
            return BackoffDecision {
                delay: policy.long_cooldown,
                reason: BackoffReason::LongCooldown,
            };
        }
        BackoffDecision {
            delay: short_delay,
            reason: BackoffReason::ShortRetry,
        }
    }
}
