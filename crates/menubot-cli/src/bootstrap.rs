use std::sync::Arc;

use anyhow::Result;
use menubot_core::StopToken;
use menubot_keepalive::{bind_keepalive_listener, run_keepalive};
use menubot_runtime::{RestartSupervisor, TelegramSessionFactory};
use tokio::task::JoinHandle;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

use crate::{load_menu_catalog, Cli, RuntimeConfig};

pub fn init_tracing() {
    let env_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();
}

/// Fires `stop` on Ctrl-C or, on unix, SIGTERM.
pub fn spawn_stop_signal_listener(stop: StopToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        wait_for_stop_signal().await;
        tracing::info!("stop signal received; shutting down");
        stop.stop();
    })
}

#[cfg(unix)]
async fn wait_for_stop_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut terminate) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = terminate.recv() => {}
            }
        }
        Err(error) => {
            tracing::warn!(%error, "failed to install SIGTERM handler; only Ctrl-C will stop");
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_stop_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

/// Runs the bot until an operator stop. Fails fast on configuration errors.
pub async fn run(cli: Cli) -> Result<()> {
    let config = RuntimeConfig::from_cli(&cli)?;
    let catalog = Arc::new(load_menu_catalog(config.menu_file.as_deref())?);
    let keepalive_listener = match &config.keepalive {
        Some(keepalive) => Some(bind_keepalive_listener(keepalive).await?),
        None => None,
    };

    let stop = StopToken::new();
    let signals = spawn_stop_signal_listener(stop.clone());
    let factory = Arc::new(TelegramSessionFactory::new(config.telegram.clone()));
    let supervisor = RestartSupervisor::new(
        config.supervisor.clone(),
        factory,
        catalog,
        stop.clone(),
    );

    let keepalive = config
        .keepalive
        .clone()
        .zip(keepalive_listener)
        .map(|(keepalive, listener)| {
            let snapshots = supervisor.subscribe();
            let stop = stop.clone();
            tokio::spawn(async move {
                if let Err(error) = run_keepalive(&keepalive, listener, snapshots, stop).await {
                    tracing::error!(error = %format!("{error:#}"), "keep-alive server failed");
                }
            })
        });

    let final_state = supervisor.run().await;
    signals.abort();
    if let Some(task) = keepalive {
        if let Err(error) = task.await {
            tracing::warn!(%error, "keep-alive task ended abnormally");
        }
    }

    tracing::info!(
        restart_count = final_state.restart_count,
        long_cooldowns = final_state.long_cooldowns,
        "menubot stopped"
    );
    Ok(())
}
