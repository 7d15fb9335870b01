use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Result;
use menubot_keepalive::KeepAliveConfig;
use menubot_menu::MenuCatalog;
use menubot_runtime::{BackoffPolicy, LivenessProberConfig, SupervisorConfig};
use menubot_telegram::TelegramClientConfig;
use thiserror::Error;

use crate::Cli;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("bot token is missing: set BOT_TOKEN or pass --bot-token")]
    MissingToken,
}

#[derive(Debug, Clone)]
/// Validated process configuration derived from [`Cli`].
pub struct RuntimeConfig {
    pub telegram: TelegramClientConfig,
    pub supervisor: SupervisorConfig,
    pub keepalive: Option<KeepAliveConfig>,
    pub menu_file: Option<PathBuf>,
}

impl RuntimeConfig {
    pub fn from_cli(cli: &Cli) -> Result<Self, ConfigError> {
        let bot_token = cli
            .bot_token
            .as_deref()
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .ok_or(ConfigError::MissingToken)?
            .to_string();

        let keepalive = cli.keepalive_enabled.then(|| KeepAliveConfig {
            bind: cli.keepalive_bind.clone(),
            self_ping_url: cli
                .self_ping_url
                .as_deref()
                .map(str::trim)
                .filter(|url| !url.is_empty())
                .map(str::to_string),
            self_ping_interval: Duration::from_secs(cli.self_ping_interval_seconds),
        });

        Ok(Self {
            telegram: TelegramClientConfig {
                api_base: cli.api_base.clone(),
                bot_token,
                request_timeout: Duration::from_secs(cli.request_timeout_seconds),
            },
            supervisor: SupervisorConfig {
                poll_timeout: Duration::from_secs(cli.poll_timeout_seconds),
                backoff: BackoffPolicy {
                    rate_limit_margin: Duration::from_secs(cli.rate_limit_margin_seconds),
                    timeout_retry_delay: Duration::from_secs(cli.timeout_retry_seconds),
                    network_retry_delay: Duration::from_secs(cli.network_retry_seconds),
                    max_consecutive_errors: cli.max_consecutive_errors,
                    long_cooldown: Duration::from_secs(cli.long_cooldown_seconds),
                    startup_retry_delay: Duration::from_secs(cli.startup_retry_seconds),
                },
                prober: LivenessProberConfig {
                    interval: Duration::from_secs(cli.probe_interval_seconds),
                    failure_threshold: cli.probe_failure_threshold,
                },
            },
            keepalive,
            menu_file: cli.menu_file.clone(),
        })
    }
}

/// Loads the menu override when configured, else the built-in menu.
pub fn load_menu_catalog(menu_file: Option<&Path>) -> Result<MenuCatalog> {
    match menu_file {
        Some(path) => {
            let catalog = MenuCatalog::load_from_path(path)?;
            tracing::info!(
                path = %path.display(),
                items = catalog.items().len(),
                "loaded menu file"
            );
            Ok(catalog)
        }
        None => Ok(MenuCatalog::builtin()),
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use clap::Parser;

    use super::*;

    fn parse(args: &[&str]) -> Cli {
        let mut argv = vec!["menubot"];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).expect("parse cli")
    }

    #[test]
    fn unit_blank_token_is_missing() {
        let mut cli = parse(&["--bot-token", "   "]);
        assert_eq!(
            RuntimeConfig::from_cli(&cli).err(),
            Some(ConfigError::MissingToken)
        );
        cli.bot_token = None;
        let error = RuntimeConfig::from_cli(&cli).expect_err("missing token");
        assert!(error.to_string().contains("BOT_TOKEN"));
    }

    #[test]
    fn functional_cli_values_flow_into_runtime_config() {
        let cli = parse(&[
            "--bot-token",
            " 123:abc ",
            "--probe-failure-threshold",
            "1",
            "--probe-interval-seconds",
            "60",
            "--long-cooldown-seconds",
            "120",
            "--self-ping-url",
            "https://menubot.example.test/",
        ]);
        let config = RuntimeConfig::from_cli(&cli).expect("config");
        assert_eq!(config.telegram.bot_token, "123:abc");
        assert_eq!(config.telegram.request_timeout, Duration::from_secs(10));
        assert_eq!(config.supervisor.prober.failure_threshold, 1);
        assert_eq!(config.supervisor.prober.interval, Duration::from_secs(60));
        assert_eq!(config.supervisor.backoff.long_cooldown, Duration::from_secs(120));
        assert_eq!(config.supervisor.poll_timeout, Duration::from_secs(30));
        let keepalive = config.keepalive.expect("keepalive enabled");
        assert_eq!(keepalive.bind, "0.0.0.0:5000");
        assert_eq!(
            keepalive.self_ping_url.as_deref(),
            Some("https://menubot.example.test/")
        );
    }

    #[test]
    fn unit_defaults_match_supervisor_defaults() {
        let config = RuntimeConfig::from_cli(&parse(&["--bot-token", "t"])).expect("config");
        assert_eq!(config.supervisor, SupervisorConfig::default());
    }

    #[test]
    fn unit_disabled_keepalive_yields_no_server_config() {
        let cli = parse(&["--bot-token", "t", "--keepalive-enabled=false"]);
        let config = RuntimeConfig::from_cli(&cli).expect("config");
        assert!(config.keepalive.is_none());
    }

    #[test]
    fn functional_menu_file_overrides_builtin_catalog() {
        let mut file = tempfile::NamedTempFile::new().expect("tempfile");
        write!(
            file,
            r#"
home_text = "Pick one:"
back_label = "Back"

[[items]]
id = "faq"
label = "FAQ"
body = "*Questions*"
"#
        )
        .expect("write menu");

        let catalog = load_menu_catalog(Some(file.path())).expect("catalog");
        assert_eq!(catalog.items().len(), 1);
        assert_eq!(catalog.render_home().text, "Pick one:");

        let builtin = load_menu_catalog(None).expect("builtin");
        assert_eq!(builtin.items().len(), 8);
    }

    #[test]
    fn regression_invalid_menu_file_names_the_path() {
        let mut file = tempfile::NamedTempFile::new().expect("tempfile");
        write!(file, "home_text = ").expect("write menu");
        let error = load_menu_catalog(Some(file.path())).expect_err("invalid toml");
        assert!(format!("{error:#}").contains(&file.path().display().to_string()));
    }
}
