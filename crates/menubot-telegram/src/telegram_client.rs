//! Telegram Bot API client used by the polling session and the prober.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::{
    parse_inbound_update, BotIdentity, ChatPlatform, InboundUpdate, MessageView, PlatformError,
};

const MESSAGE_NOT_MODIFIED: &str = "message is not modified";
const MAX_ERROR_DETAIL_CHARS: usize = 320;

#[derive(Debug, Clone)]
/// Connection settings for [`TelegramBotClient`].
pub struct TelegramClientConfig {
    pub api_base: String,
    pub bot_token: String,
    pub request_timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct TelegramEnvelope {
    ok: bool,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    error_code: Option<u16>,
    #[serde(default)]
    parameters: Option<TelegramResponseParameters>,
}

#[derive(Debug, Deserialize)]
struct TelegramResponseParameters {
    #[serde(default)]
    retry_after: Option<u64>,
}

#[derive(Clone)]
pub struct TelegramBotClient {
    http: reqwest::Client,
    method_base: String,
    request_timeout: Duration,
    bot_username: Arc<OnceLock<String>>,
}

impl std::fmt::Debug for TelegramBotClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramBotClient")
            .field("request_timeout", &self.request_timeout)
            .finish_non_exhaustive()
    }
}

impl TelegramBotClient {
    pub fn new(config: TelegramClientConfig) -> Result<Self, PlatformError> {
        let token = config.bot_token.trim();
        if token.is_empty() {
            return Err(PlatformError::Unclassified(
                "telegram bot token cannot be empty".to_string(),
            ));
        }
        let base = config.api_base.trim().trim_end_matches('/');
        if base.is_empty() {
            return Err(PlatformError::Unclassified(
                "telegram api base cannot be empty".to_string(),
            ));
        }
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::USER_AGENT,
            reqwest::header::HeaderValue::from_static("menubot"),
        );
        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(config.request_timeout.max(Duration::from_millis(1)))
            .build()
            .map_err(|error| {
                PlatformError::Unclassified(format!(
                    "failed to create telegram http client: {}",
                    error.without_url()
                ))
            })?;
        Ok(Self {
            http,
            method_base: format!("{base}/bot{token}"),
            request_timeout: config.request_timeout,
            bot_username: Arc::new(OnceLock::new()),
        })
    }

    async fn call_method<T>(
        &self,
        method: &str,
        payload: &Value,
        timeout: Option<Duration>,
    ) -> Result<T, PlatformError>
    where
        T: DeserializeOwned,
    {
        let mut request = self
            .http
            .post(format!("{}/{method}", self.method_base))
            .json(payload);
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }
        let response = request
            .send()
            .await
            .map_err(|error| classify_transport_error(method, error))?;

        let status = response.status();
        let header_retry_after = parse_retry_after(response.headers());
        let body = response
            .text()
            .await
            .map_err(|error| classify_transport_error(method, error))?;
        let envelope = serde_json::from_str::<TelegramEnvelope>(&body).ok();

        match envelope {
            Some(envelope) if status.is_success() && envelope.ok => {
                let result = envelope.result.unwrap_or(Value::Null);
                serde_json::from_value::<T>(result).map_err(|error| {
                    PlatformError::Unclassified(format!(
                        "telegram {method} returned an undecodable result: {error}"
                    ))
                })
            }
            envelope => Err(classify_api_failure(
                method,
                status,
                header_retry_after,
                envelope.as_ref(),
                &body,
            )),
        }
    }
}

#[async_trait]
impl ChatPlatform for TelegramBotClient {
    async fn fetch_updates(
        &self,
        offset: i64,
        timeout: Duration,
    ) -> Result<Vec<InboundUpdate>, PlatformError> {
        let payload = json!({
            "offset": offset,
            "timeout": timeout.as_secs(),
            "allowed_updates": ["message", "callback_query"],
        });
        let raw_updates: Vec<Value> = self
            .call_method(
                "getUpdates",
                &payload,
                Some(timeout.saturating_add(self.request_timeout)),
            )
            .await?;

        let mut updates = Vec::with_capacity(raw_updates.len());
        for raw in &raw_updates {
            match parse_inbound_update(raw, self.bot_username.get().map(String::as_str)) {
                Ok(update) => updates.push(update),
                Err(error) => {
                    tracing::warn!(%error, "skipping telegram update without update_id");
                }
            }
        }
        Ok(updates)
    }

    async fn send_message(&self, chat_id: i64, view: &MessageView) -> Result<(), PlatformError> {
        let mut payload = json!({
            "chat_id": chat_id,
            "text": view.text,
            "reply_markup": view.reply_markup(),
        });
        if let Some(parse_mode) = view.parse_mode {
            payload["parse_mode"] = Value::String(parse_mode.as_str().to_string());
        }
        let _: Value = self.call_method("sendMessage", &payload, None).await?;
        Ok(())
    }

    async fn edit_message(
        &self,
        chat_id: i64,
        message_id: i64,
        view: &MessageView,
    ) -> Result<(), PlatformError> {
        let mut payload = json!({
            "chat_id": chat_id,
            "message_id": message_id,
            "text": view.text,
            "reply_markup": view.reply_markup(),
        });
        if let Some(parse_mode) = view.parse_mode {
            payload["parse_mode"] = Value::String(parse_mode.as_str().to_string());
        }
        match self
            .call_method::<Value>("editMessageText", &payload, None)
            .await
        {
            Ok(_) => Ok(()),
            // Redelivered selections re-render identical content.
            Err(PlatformError::Unclassified(detail)) if detail.contains(MESSAGE_NOT_MODIFIED) => {
                Ok(())
            }
            Err(error) => Err(error),
        }
    }

    async fn acknowledge(&self, callback_id: &str) -> Result<(), PlatformError> {
        let payload = json!({ "callback_query_id": callback_id });
        let _: Value = self
            .call_method("answerCallbackQuery", &payload, None)
            .await?;
        Ok(())
    }

    async fn probe(&self) -> Result<BotIdentity, PlatformError> {
        let identity: BotIdentity = self.call_method("getMe", &json!({}), None).await?;
        if let Some(username) = identity.username.as_deref() {
            let _ = self.bot_username.set(username.to_string());
        }
        Ok(identity)
    }
}

fn classify_transport_error(method: &str, error: reqwest::Error) -> PlatformError {
    let error = error.without_url();
    if error.is_timeout() {
        PlatformError::Timeout
    } else if error.is_connect() || error.is_request() || error.is_body() {
        PlatformError::NetworkUnavailable(format!("telegram {method}: {error}"))
    } else {
        PlatformError::Unclassified(format!("telegram {method} transport error: {error}"))
    }
}

fn classify_api_failure(
    method: &str,
    status: StatusCode,
    header_retry_after: Option<u64>,
    envelope: Option<&TelegramEnvelope>,
    body: &str,
) -> PlatformError {
    let error_code = envelope
        .and_then(|envelope| envelope.error_code)
        .unwrap_or(status.as_u16());
    if status == StatusCode::TOO_MANY_REQUESTS || error_code == 429 {
        let retry_after_seconds = envelope
            .and_then(|envelope| envelope.parameters.as_ref())
            .and_then(|parameters| parameters.retry_after)
            .or(header_retry_after)
            .unwrap_or(1);
        return PlatformError::RateLimited {
            retry_after_seconds,
        };
    }

    let description = envelope
        .and_then(|envelope| envelope.description.clone())
        .unwrap_or_else(|| truncate_for_error(body, MAX_ERROR_DETAIL_CHARS));
    if status.is_server_error() {
        return PlatformError::NetworkUnavailable(format!(
            "telegram {method} failed with status {}: {description}",
            status.as_u16()
        ));
    }
    PlatformError::Unclassified(format!(
        "telegram {method} failed with status {} (error_code={error_code}): {description}",
        status.as_u16()
    ))
}

fn parse_retry_after(headers: &reqwest::header::HeaderMap) -> Option<u64> {
    headers
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<u64>().ok())
}

fn truncate_for_error(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    let mut truncated = value.chars().take(max_chars).collect::<String>();
    truncated.push_str("...");
    truncated
}
