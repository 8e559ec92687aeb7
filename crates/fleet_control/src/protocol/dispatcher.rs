//! Routes control-channel traffic to the orchestration core.

use std::sync::Arc;
use tracing::{debug, error, info, trace, warn};

use super::messages::{ControlMessage, LobbyTransferRequest, LobbyTransferResponse};
use crate::error::FleetError;
use crate::host::{FleetHost, InboundMessage, MessageOrigin};
use crate::lifecycle::LifecycleManager;
use crate::registry::Registry;
use crate::selector::select_target;
use crate::types::FleetStatus;

/// Answers transfer requests arriving on the control channel.
///
/// Every accepted request produces exactly one response, broadcast on the
/// same channel. Recipients match it to the request by player name.
pub struct FleetDispatcher {
    host: Arc<dyn FleetHost>,
    registry: Registry,
    lifecycle: Arc<LifecycleManager>,
    control_channel: String,
}

impl FleetDispatcher {
    /// Creates a new dispatcher.
    ///
    /// # Arguments
    ///
    /// * `host` - Probes instances and carries responses
    /// * `lifecycle` - Provisions instances when none can take a player
    /// * `control_channel` - The only channel this dispatcher listens on
    pub fn new(
        host: Arc<dyn FleetHost>,
        lifecycle: Arc<LifecycleManager>,
        control_channel: impl Into<String>,
    ) -> Self {
        Self {
            host,
            registry: Registry::new(),
            lifecycle,
            control_channel: control_channel.into(),
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn lifecycle(&self) -> &LifecycleManager {
        &self.lifecycle
    }

    pub fn control_channel(&self) -> &str {
        &self.control_channel
    }

    /// Processes one inbound message.
    ///
    /// Messages on other channels, from players, with malformed payloads or
    /// on unknown sub-channels are dropped and yield `Ok(None)`. A handled
    /// transfer request yields the response that was broadcast.
    ///
    /// # Errors
    ///
    /// A configuration error during handling is returned after a
    /// `failed_initialization` response has been broadcast for it.
    pub async fn handle_inbound(
        &self,
        message: &InboundMessage,
    ) -> Result<Option<LobbyTransferResponse>, FleetError> {
        if message.channel != self.control_channel {
            trace!("Ignoring message on channel '{}'", message.channel);
            return Ok(None);
        }

        if message.origin != MessageOrigin::Backend {
            trace!("Ignoring control message from a player connection");
            return Ok(None);
        }

        let request = match ControlMessage::decode(&message.payload) {
            Ok(Some(ControlMessage::TransferRequest(request))) => request,
            Ok(Some(other)) => {
                trace!("Ignoring control message {:?}", other);
                return Ok(None);
            }
            Ok(None) => {
                trace!("Ignoring unknown sub-channel");
                return Ok(None);
            }
            Err(e) => {
                debug!("Dropping malformed control payload: {}", e);
                return Ok(None);
            }
        };

        let (response, failure) = match self.handle_transfer_request(&request).await {
            Ok(response) => (response, None),
            Err(e) => {
                error!(
                    "❌ Transfer of {} to '{}' failed: {}",
                    request.player_name, request.instance_type, e
                );
                let response =
                    LobbyTransferResponse::without_target(FleetStatus::FailedInitializing, &request.player_name);
                (response, Some(e))
            }
        };

        self.send_response(&response).await;

        match failure {
            Some(e) => Err(e),
            None => Ok(Some(response)),
        }
    }

    /// Decides where the requesting player goes.
    ///
    /// Refreshes the registry and waits for every probe, then picks the
    /// busiest instance of the type with room left. With no such instance a
    /// new one is requested from the lifecycle manager.
    pub async fn handle_transfer_request(
        &self,
        request: &LobbyTransferRequest,
    ) -> Result<LobbyTransferResponse, FleetError> {
        debug!(
            "🔍 Transfer request: {} wants '{}'",
            request.player_name, request.instance_type
        );

        self.registry.refresh(self.host.as_ref()).await;
        let snapshot = self.registry.snapshot().await;

        if let Some(target) = select_target(&request.instance_type, &snapshot) {
            info!("➡️ Sending {} to {}", request.player_name, target);
            return Ok(LobbyTransferResponse::transferable(&request.player_name, target));
        }

        let status = self
            .lifecycle
            .start_new_instance(&request.instance_type, &snapshot)
            .await?;
        info!(
            "📨 No open '{}' instance for {}: {}",
            request.instance_type, request.player_name, status
        );

        Ok(LobbyTransferResponse::without_target(status, &request.player_name))
    }

    async fn send_response(&self, response: &LobbyTransferResponse) {
        let payload = match ControlMessage::TransferResponse(response.clone()).encode() {
            Ok(payload) => payload,
            Err(e) => {
                error!("Failed to encode response for {}: {}", response.player_name, e);
                return;
            }
        };

        match self.host.broadcast(&self.control_channel, &payload).await {
            Ok(0) => warn!("No connected instance received the response for {}", response.player_name),
            Ok(count) => trace!("Response for {} sent to {} instances", response.player_name, count),
            Err(e) => error!("Failed to broadcast response for {}: {}", response.player_name, e),
        }
    }
}
