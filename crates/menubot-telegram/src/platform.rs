use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::{BotIdentity, InboundUpdate, MessageView};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
/// Classified failure of a platform call.
pub enum PlatformError {
    #[error("rate limited by platform: retry after {retry_after_seconds}s")]
    RateLimited { retry_after_seconds: u64 },
    #[error("platform request timed out")]
    Timeout,
    #[error("platform unreachable: {0}")]
    NetworkUnavailable(String),
    #[error("unclassified platform failure: {0}")]
    Unclassified(String),
}

impl PlatformError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::RateLimited { .. } => "rate_limited",
            Self::Timeout => "timeout",
            Self::NetworkUnavailable(_) => "network_unavailable",
            Self::Unclassified(_) => "unclassified",
        }
    }

    /// Returns true when the failure leaves the current session usable.
    pub fn keeps_session(&self) -> bool {
        !matches!(self, Self::Unclassified(_))
    }
}

#[async_trait]
/// Trait contract for the messaging platform the bot talks to.
pub trait ChatPlatform: Send + Sync {
    /// Long-polls for updates with `update_id >= offset`.
    async fn fetch_updates(
        &self,
        offset: i64,
        timeout: Duration,
    ) -> Result<Vec<InboundUpdate>, PlatformError>;

    async fn send_message(&self, chat_id: i64, view: &MessageView) -> Result<(), PlatformError>;

    async fn edit_message(
        &self,
        chat_id: i64,
        message_id: i64,
        view: &MessageView,
    ) -> Result<(), PlatformError>;

    /// Answers a callback so the client stops showing its loading state.
    async fn acknowledge(&self, callback_id: &str) -> Result<(), PlatformError>;

    /// Lightweight connectivity check independent of user traffic.
    async fn probe(&self) -> Result<BotIdentity, PlatformError>;
}
