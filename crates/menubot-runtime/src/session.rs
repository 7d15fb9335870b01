use std::sync::Arc;

use async_trait::async_trait;
use menubot_core::LivenessTracker;
use menubot_menu::{MenuCatalog, UpdateDispatcher};
use menubot_telegram::{ChatPlatform, PlatformError, TelegramBotClient, TelegramClientConfig};
use tokio::sync::oneshot;

use crate::liveness_prober::{
    start_liveness_prober, LivenessProberConfig, LivenessProberHandle, StallReport,
};

#[async_trait]
/// Builds a connected platform handle for a new session.
pub trait SessionFactory: Send + Sync {
    async fn connect(&self) -> Result<Arc<dyn ChatPlatform>, PlatformError>;
}

#[derive(Debug, Clone)]
/// Connects to the Telegram Bot API and verifies the token with `getMe`.
pub struct TelegramSessionFactory {
    config: TelegramClientConfig,
}

impl TelegramSessionFactory {
    pub fn new(config: TelegramClientConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl SessionFactory for TelegramSessionFactory {
    async fn connect(&self) -> Result<Arc<dyn ChatPlatform>, PlatformError> {
        let client = TelegramBotClient::new(self.config.clone())?;
        let identity = client.probe().await?;
        tracing::info!(
            bot_id = identity.id,
            username = identity.username.as_deref().unwrap_or("unknown"),
            "telegram session connected"
        );
        Ok(Arc::new(client))
    }
}

/// The single active connection owned by the supervisor.
pub struct Session {
    id: u64,
    platform: Arc<dyn ChatPlatform>,
    dispatcher: UpdateDispatcher,
    liveness: LivenessTracker,
    prober: LivenessProberHandle,
    stall_rx: Option<oneshot::Receiver<StallReport>>,
    torn_down: bool,
}

impl Session {
    /// Connects, wires a fresh dispatcher and liveness state, and starts the prober.
    pub async fn start(
        id: u64,
        factory: &dyn SessionFactory,
        catalog: Arc<MenuCatalog>,
        prober_config: LivenessProberConfig,
    ) -> Result<Self, PlatformError> {
        let platform = factory.connect().await?;
        let liveness = LivenessTracker::fresh();
        let dispatcher = UpdateDispatcher::new(catalog, liveness.clone());
        let (stall_tx, stall_rx) = oneshot::channel();
        let prober = start_liveness_prober(
            platform.clone(),
            liveness.clone(),
            prober_config,
            stall_tx,
        );
        Ok(Self {
            id,
            platform,
            dispatcher,
            liveness,
            prober,
            stall_rx: Some(stall_rx),
            torn_down: false,
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn platform(&self) -> &dyn ChatPlatform {
        self.platform.as_ref()
    }

    pub fn dispatcher(&self) -> &UpdateDispatcher {
        &self.dispatcher
    }

    pub fn liveness(&self) -> &LivenessTracker {
        &self.liveness
    }

    /// Returns a pending stall report without waiting.
    pub fn poll_stall(&mut self) -> Option<StallReport> {
        let stall_rx = self.stall_rx.as_mut()?;
        let report = match stall_rx.try_recv() {
            Ok(report) => report,
            Err(oneshot::error::TryRecvError::Empty) => return None,
            Err(oneshot::error::TryRecvError::Closed) => StallReport::prober_exited(),
        };
        self.stall_rx = None;
        Some(report)
    }

    /// Resolves when the prober declares the session stalled.
    pub async fn stalled(&mut self) -> StallReport {
        let Some(stall_rx) = self.stall_rx.as_mut() else {
            return std::future::pending().await;
        };
        let report = stall_rx
            .await
            .unwrap_or_else(|_| StallReport::prober_exited());
        self.stall_rx = None;
        report
    }

    /// Stops the prober and releases the connection. Idempotent; secondary
    /// failures are logged only.
    pub async fn teardown(&mut self) {
        if self.torn_down {
            return;
        }
        self.torn_down = true;
        if let Err(error) = self.prober.shutdown().await {
            tracing::warn!(session = self.id, %error, "liveness prober ended abnormally during teardown");
        }
        self.stall_rx = None;
        tracing::debug!(session = self.id, "session torn down");
    }
}
