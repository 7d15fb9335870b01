//! Keep-alive HTTP surface for hosting platforms that idle silent processes.
//!
//! Serves a fixed liveness string on `/`, a plain `OK` on `/health`, and the
//! latest supervisor snapshot as JSON on `/status`. An optional self-ping loop
//! requests a public URL on a fixed interval.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use menubot_core::{current_unix_timestamp_ms, StopToken};
use menubot_runtime::SupervisorSnapshot;
use serde::Serialize;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;

pub const DEFAULT_KEEPALIVE_BIND: &str = "0.0.0.0:5000";
pub const DEFAULT_SELF_PING_INTERVAL: Duration = Duration::from_secs(300);
const SELF_PING_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

pub const ROOT_ENDPOINT: &str = "/";
pub const HEALTH_ENDPOINT: &str = "/health";
pub const STATUS_ENDPOINT: &str = "/status";
pub const ROOT_RESPONSE_BODY: &str = "Bot is running!";
pub const HEALTH_RESPONSE_BODY: &str = "OK";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeepAliveConfig {
    pub bind: String,
    pub self_ping_url: Option<String>,
    pub self_ping_interval: Duration,
}

impl Default for KeepAliveConfig {
    fn default() -> Self {
        Self {
            bind: DEFAULT_KEEPALIVE_BIND.to_string(),
            self_ping_url: None,
            self_ping_interval: DEFAULT_SELF_PING_INTERVAL,
        }
    }
}

#[derive(Debug, Serialize)]
struct StatusResponse {
    #[serde(flatten)]
    snapshot: SupervisorSnapshot,
    idle_for_ms: Option<u64>,
}

struct KeepAliveState {
    snapshots: watch::Receiver<SupervisorSnapshot>,
}

pub fn build_keepalive_router(snapshots: watch::Receiver<SupervisorSnapshot>) -> Router {
    Router::new()
        .route(ROOT_ENDPOINT, get(handle_root))
        .route(HEALTH_ENDPOINT, get(handle_health))
        .route(STATUS_ENDPOINT, get(handle_status))
        .with_state(Arc::new(KeepAliveState { snapshots }))
}

async fn handle_root() -> impl IntoResponse {
    (StatusCode::OK, ROOT_RESPONSE_BODY)
}

async fn handle_health() -> impl IntoResponse {
    (StatusCode::OK, HEALTH_RESPONSE_BODY)
}

async fn handle_status(State(state): State<Arc<KeepAliveState>>) -> impl IntoResponse {
    let snapshot = state.snapshots.borrow().clone();
    let idle_for_ms = snapshot.idle_for_ms(current_unix_timestamp_ms());
    (
        StatusCode::OK,
        Json(StatusResponse {
            snapshot,
            idle_for_ms,
        }),
    )
}

/// Binds the keep-alive listener. Called before the bot starts so a busy
/// port fails startup instead of leaving the process without a health
/// endpoint.
pub async fn bind_keepalive_listener(config: &KeepAliveConfig) -> Result<TcpListener> {
    let listener = TcpListener::bind(config.bind.as_str())
        .await
        .with_context(|| format!("failed to bind keep-alive server on {}", config.bind))?;
    let local_addr = listener
        .local_addr()
        .context("failed to resolve keep-alive server address")?;
    tracing::info!(addr = %local_addr, "keep-alive server listening");
    Ok(listener)
}

/// Starts the optional self-ping loop and serves on `listener` until the
/// stop token fires.
pub async fn run_keepalive(
    config: &KeepAliveConfig,
    listener: TcpListener,
    snapshots: watch::Receiver<SupervisorSnapshot>,
    stop: StopToken,
) -> Result<()> {
    let self_ping = config.self_ping_url.clone().map(|url| {
        spawn_self_ping(url, config.self_ping_interval, stop.clone())
    });

    let served = serve_keepalive(listener, snapshots, stop).await;
    if let Some(task) = self_ping {
        if let Err(error) = task.await {
            tracing::warn!(%error, "self-ping task ended abnormally");
        }
    }
    served
}

pub async fn serve_keepalive(
    listener: TcpListener,
    snapshots: watch::Receiver<SupervisorSnapshot>,
    stop: StopToken,
) -> Result<()> {
    let app = build_keepalive_router(snapshots);
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { stop.stopped().await })
        .await
        .context("keep-alive server exited unexpectedly")?;
    tracing::info!("keep-alive server stopped");
    Ok(())
}

/// Requests `url` every `interval` until stopped. Failures are logged and
/// never stop the loop.
pub fn spawn_self_ping(url: String, interval: Duration, stop: StopToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        let client = match reqwest::Client::builder()
            .timeout(SELF_PING_REQUEST_TIMEOUT)
            .build()
        {
            Ok(client) => client,
            Err(error) => {
                tracing::warn!(%error, "self-ping disabled: failed to build http client");
                return;
            }
        };
        let period = interval.max(Duration::from_secs(1));
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        tracing::info!(url = %url, interval_secs = period.as_secs(), "self-ping enabled");

        loop {
            tokio::select! {
                biased;
                _ = stop.stopped() => break,
                _ = ticker.tick() => {}
            }
            match ping_once(&client, &url).await {
                Ok(status) => tracing::debug!(status = status.as_u16(), "self-ping ok"),
                Err(error) => tracing::warn!(error = %format!("{error:#}"), "self-ping failed"),
            }
        }
    })
}

pub async fn ping_once(client: &reqwest::Client, url: &str) -> Result<reqwest::StatusCode> {
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|error| error.without_url())
        .context("self-ping request failed")?;
    let status = response.status();
    if !status.is_success() {
        anyhow::bail!("self-ping returned status {}", status.as_u16());
    }
    Ok(status)
}
