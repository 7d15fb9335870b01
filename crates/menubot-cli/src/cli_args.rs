use std::path::PathBuf;

use clap::{ArgAction, Parser};

fn parse_positive_u64(value: &str) -> Result<u64, String> {
    let parsed = value
        .parse::<u64>()
        .map_err(|error| format!("failed to parse integer: {error}"))?;
    if parsed == 0 {
        return Err("value must be greater than 0".to_string());
    }
    Ok(parsed)
}

fn parse_positive_u32(value: &str) -> Result<u32, String> {
    let parsed = value
        .parse::<u32>()
        .map_err(|error| format!("failed to parse integer: {error}"))?;
    if parsed == 0 {
        return Err("value must be greater than 0".to_string());
    }
    Ok(parsed)
}

#[derive(Debug, Clone, Parser)]
#[command(
    name = "menubot",
    about = "Menu-driven Telegram bot with a supervised polling session",
    version
)]
pub struct Cli {
    #[arg(
        long = "bot-token",
        env = "BOT_TOKEN",
        hide_env_values = true,
        help = "Telegram bot token issued by BotFather"
    )]
    pub bot_token: Option<String>,

    #[arg(
        long = "api-base",
        env = "MENUBOT_API_BASE",
        default_value = "https://api.telegram.org",
        help = "Base URL of the Telegram Bot API"
    )]
    pub api_base: String,

    #[arg(
        long = "request-timeout-seconds",
        env = "MENUBOT_REQUEST_TIMEOUT_SECONDS",
        default_value_t = 10,
        value_parser = parse_positive_u64,
        help = "Per-request timeout added on top of the long-poll timeout"
    )]
    pub request_timeout_seconds: u64,

    #[arg(
        long = "poll-timeout-seconds",
        env = "MENUBOT_POLL_TIMEOUT_SECONDS",
        default_value_t = 30,
        value_parser = parse_positive_u64,
        help = "Long-poll timeout passed to getUpdates"
    )]
    pub poll_timeout_seconds: u64,

    #[arg(
        long = "probe-interval-seconds",
        env = "MENUBOT_PROBE_INTERVAL_SECONDS",
        default_value_t = 240,
        value_parser = parse_positive_u64,
        help = "Seconds between liveness probes of the active session"
    )]
    pub probe_interval_seconds: u64,

    #[arg(
        long = "probe-failure-threshold",
        env = "MENUBOT_PROBE_FAILURE_THRESHOLD",
        default_value_t = 3,
        value_parser = parse_positive_u32,
        help = "Consecutive failed probes before the session is restarted"
    )]
    pub probe_failure_threshold: u32,

    #[arg(
        long = "max-consecutive-errors",
        env = "MENUBOT_MAX_CONSECUTIVE_ERRORS",
        default_value_t = 5,
        value_parser = parse_positive_u32,
        help = "Polling failures in a row before entering the long cooldown"
    )]
    pub max_consecutive_errors: u32,

    #[arg(
        long = "long-cooldown-seconds",
        env = "MENUBOT_LONG_COOLDOWN_SECONDS",
        default_value_t = 90,
        value_parser = parse_positive_u64,
        help = "Wait after the consecutive error budget is exhausted"
    )]
    pub long_cooldown_seconds: u64,

    #[arg(
        long = "timeout-retry-seconds",
        env = "MENUBOT_TIMEOUT_RETRY_SECONDS",
        default_value_t = 3,
        value_parser = parse_positive_u64,
        help = "Wait before retrying a timed out poll"
    )]
    pub timeout_retry_seconds: u64,

    #[arg(
        long = "network-retry-seconds",
        env = "MENUBOT_NETWORK_RETRY_SECONDS",
        default_value_t = 5,
        value_parser = parse_positive_u64,
        help = "Wait before retrying after a network failure"
    )]
    pub network_retry_seconds: u64,

    #[arg(
        long = "rate-limit-margin-seconds",
        env = "MENUBOT_RATE_LIMIT_MARGIN_SECONDS",
        default_value_t = 1,
        help = "Extra wait added to the platform's retry_after hint"
    )]
    pub rate_limit_margin_seconds: u64,

    #[arg(
        long = "startup-retry-seconds",
        env = "MENUBOT_STARTUP_RETRY_SECONDS",
        default_value_t = 5,
        value_parser = parse_positive_u64,
        help = "Wait before retrying a failed session start"
    )]
    pub startup_retry_seconds: u64,

    #[arg(
        long = "keepalive-enabled",
        env = "MENUBOT_KEEPALIVE_ENABLED",
        default_value_t = true,
        action = ArgAction::Set,
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "true",
        help = "Serve the keep-alive HTTP endpoint"
    )]
    pub keepalive_enabled: bool,

    #[arg(
        long = "keepalive-bind",
        env = "MENUBOT_KEEPALIVE_BIND",
        default_value = "0.0.0.0:5000",
        help = "Address for the keep-alive HTTP endpoint"
    )]
    pub keepalive_bind: String,

    #[arg(
        long = "self-ping-url",
        env = "MENUBOT_SELF_PING_URL",
        help = "Public URL requested periodically to keep the host awake"
    )]
    pub self_ping_url: Option<String>,

    #[arg(
        long = "self-ping-interval-seconds",
        env = "MENUBOT_SELF_PING_INTERVAL_SECONDS",
        default_value_t = 300,
        value_parser = parse_positive_u64,
        help = "Seconds between self-ping requests"
    )]
    pub self_ping_interval_seconds: u64,

    #[arg(
        long = "menu-file",
        env = "MENUBOT_MENU_FILE",
        help = "Optional TOML file replacing the built-in menu"
    )]
    pub menu_file: Option<PathBuf>,
}
