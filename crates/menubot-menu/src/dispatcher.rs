use std::sync::Arc;

use menubot_core::LivenessTracker;
use menubot_telegram::{ChatPlatform, InboundEvent, InboundUpdate, PlatformError};

use crate::catalog::{is_home_selection, MenuCatalog};

#[derive(Debug, Clone, PartialEq, Eq)]
/// Result of handling one inbound update.
pub enum DispatchOutcome {
    SentHome,
    EditedHome,
    EditedItem { selection_id: String },
    Ignored,
    AcknowledgeFailed(PlatformError),
    DeliveryFailed(PlatformError),
}

impl DispatchOutcome {
    pub fn is_success(&self) -> bool {
        !matches!(self, Self::AcknowledgeFailed(_) | Self::DeliveryFailed(_))
    }
}

#[derive(Debug, Clone)]
/// Routes inbound updates to the home menu or an item view.
pub struct UpdateDispatcher {
    catalog: Arc<MenuCatalog>,
    liveness: LivenessTracker,
}

impl UpdateDispatcher {
    pub fn new(catalog: Arc<MenuCatalog>, liveness: LivenessTracker) -> Self {
        Self { catalog, liveness }
    }

    pub fn liveness(&self) -> &LivenessTracker {
        &self.liveness
    }

    /// Handles one update. Failures are logged and reported, never raised.
    pub async fn handle(
        &self,
        platform: &dyn ChatPlatform,
        update: &InboundUpdate,
    ) -> DispatchOutcome {
        let outcome = match &update.event {
            InboundEvent::StartCommand { chat_id } => {
                let view = self.catalog.render_home();
                match platform.send_message(*chat_id, &view).await {
                    Ok(()) => DispatchOutcome::SentHome,
                    Err(error) => DispatchOutcome::DeliveryFailed(error),
                }
            }
            InboundEvent::Callback {
                callback_id,
                chat_id,
                message_id,
                selection_id,
            } => {
                if let Err(error) = platform.acknowledge(callback_id).await {
                    tracing::warn!(
                        update_id = update.update_id,
                        %error,
                        "callback acknowledgment failed; dropping update"
                    );
                    return DispatchOutcome::AcknowledgeFailed(error);
                }
                self.show_selection(platform, *chat_id, *message_id, selection_id)
                    .await
            }
            InboundEvent::Ignored => DispatchOutcome::Ignored,
        };

        if let DispatchOutcome::DeliveryFailed(error) = &outcome {
            tracing::warn!(
                update_id = update.update_id,
                kind = update.event.kind(),
                %error,
                "menu delivery failed"
            );
        } else {
            tracing::debug!(update_id = update.update_id, outcome = ?outcome, "update handled");
            self.liveness.record_activity();
        }
        outcome
    }

    async fn show_selection(
        &self,
        platform: &dyn ChatPlatform,
        chat_id: i64,
        message_id: i64,
        selection_id: &str,
    ) -> DispatchOutcome {
        let (view, outcome) = if is_home_selection(selection_id) {
            (self.catalog.render_home(), DispatchOutcome::EditedHome)
        } else {
            (
                self.catalog.render_item(selection_id),
                DispatchOutcome::EditedItem {
                    selection_id: selection_id.to_string(),
                },
            )
        };
        match platform.edit_message(chat_id, message_id, &view).await {
            Ok(()) => outcome,
            Err(error) => DispatchOutcome::DeliveryFailed(error),
        }
    }
}
