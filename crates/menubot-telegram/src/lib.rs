//! Telegram transport for the menu bot.
//!
//! Defines the [`ChatPlatform`] seam the dispatcher and supervisor are written
//! against, the [`PlatformError`] taxonomy the restart policy matches on, and
//! the Bot API client that implements both over `reqwest`.

mod platform;
mod telegram_client;
mod telegram_types;

pub use platform::{ChatPlatform, PlatformError};
pub use telegram_client::{TelegramBotClient, TelegramClientConfig};
pub use telegram_types::{
    is_start_command, parse_inbound_update, BotIdentity, InboundEvent, InboundUpdate, MenuButton,
    MessageView, ParseMode,
};
