use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

const START_COMMAND: &str = "/start";

#[derive(Debug, Clone, PartialEq, Eq)]
/// One inbound update delivered by the platform.
pub struct InboundUpdate {
    pub update_id: i64,
    pub event: InboundEvent,
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Enumerates the inbound events the bot reacts to.
pub enum InboundEvent {
    StartCommand {
        chat_id: i64,
    },
    Callback {
        callback_id: String,
        chat_id: i64,
        message_id: i64,
        selection_id: String,
    },
    Ignored,
}

impl InboundEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::StartCommand { .. } => "start_command",
            Self::Callback { .. } => "callback",
            Self::Ignored => "ignored",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParseMode {
    Markdown,
}

impl ParseMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Markdown => "Markdown",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// Inline keyboard button carrying a selection id as callback data.
pub struct MenuButton {
    pub label: String,
    pub callback_data: String,
}

impl MenuButton {
    pub fn new(label: impl Into<String>, callback_data: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            callback_data: callback_data.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Rendered message content: text plus an inline keyboard.
pub struct MessageView {
    pub text: String,
    pub buttons: Vec<MenuButton>,
    pub parse_mode: Option<ParseMode>,
}

impl MessageView {
    /// Encodes the buttons as a Bot API inline keyboard, one button per row.
    pub fn reply_markup(&self) -> Value {
        let rows = self
            .buttons
            .iter()
            .map(|button| {
                json!([{
                    "text": button.label,
                    "callback_data": button.callback_data,
                }])
            })
            .collect::<Vec<_>>();
        json!({ "inline_keyboard": rows })
    }

    pub fn has_button(&self, callback_data: &str) -> bool {
        self.buttons
            .iter()
            .any(|button| button.callback_data == callback_data)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
/// Identity returned by the connectivity probe.
pub struct BotIdentity {
    pub id: i64,
    #[serde(default)]
    pub username: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawUpdate {
    #[serde(default)]
    message: Option<RawMessage>,
    #[serde(default)]
    callback_query: Option<RawCallbackQuery>,
}

#[derive(Debug, Deserialize)]
struct RawMessage {
    message_id: i64,
    chat: RawChat,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawChat {
    id: i64,
}

#[derive(Debug, Deserialize)]
struct RawCallbackQuery {
    id: String,
    #[serde(default)]
    data: Option<String>,
    #[serde(default)]
    message: Option<RawMessage>,
}

/// Parses one Bot API update object.
///
/// Updates the bot does not react to, or whose body does not decode, become
/// [`InboundEvent::Ignored`] so the caller can still advance its offset past
/// them. Only an entry without a numeric `update_id` is rejected.
///
/// `bot_username` is the identity reported by `getMe`; when known,
/// `/start@other_bot` is not treated as this bot's command.
pub fn parse_inbound_update(
    value: &Value,
    bot_username: Option<&str>,
) -> Result<InboundUpdate, serde_json::Error> {
    let update_id = value
        .get("update_id")
        .and_then(Value::as_i64)
        .ok_or_else(|| <serde_json::Error as serde::de::Error>::missing_field("update_id"))?;
    let event = match RawUpdate::deserialize(value) {
        Ok(raw) => classify_raw_update(raw, bot_username),
        Err(error) => {
            tracing::warn!(update_id, %error, "undecodable telegram update; ignoring");
            InboundEvent::Ignored
        }
    };
    Ok(InboundUpdate { update_id, event })
}

fn classify_raw_update(raw: RawUpdate, bot_username: Option<&str>) -> InboundEvent {
    if let Some(callback) = raw.callback_query {
        return match (callback.message, callback.data) {
            (Some(message), Some(data)) => InboundEvent::Callback {
                callback_id: callback.id,
                chat_id: message.chat.id,
                message_id: message.message_id,
                selection_id: data,
            },
            _ => InboundEvent::Ignored,
        };
    }
    match raw.message {
        Some(message) => match message.text.as_deref() {
            Some(text) if is_start_command(text, bot_username) => InboundEvent::StartCommand {
                chat_id: message.chat.id,
            },
            _ => InboundEvent::Ignored,
        },
        None => InboundEvent::Ignored,
    }
}

/// Returns true for `/start`, `/start@botname`, and `/start <payload>`.
///
/// A mention is matched case-insensitively against `bot_username` when it is
/// known; an unknown username accepts any mention.
pub fn is_start_command(text: &str, bot_username: Option<&str>) -> bool {
    let Some(command) = text.split_whitespace().next() else {
        return false;
    };
    let (name, mention) = match command.split_once('@') {
        Some((name, mention)) => (name, Some(mention)),
        None => (command, None),
    };
    if name != START_COMMAND {
        return false;
    }
    match (mention, bot_username) {
        (Some(mention), Some(username)) => {
            mention.eq_ignore_ascii_case(username.trim_start_matches('@'))
        }
        _ => true,
    }
}
