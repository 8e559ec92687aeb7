//! The seam between the orchestrator and the process hosting it.
//!
//! The host owns the player-facing connections, the server registry and the
//! message transport. The orchestrator only needs three things from it: the
//! list of instances it currently knows, a way to probe one of them, and a
//! way to send a payload to all of them.

use async_trait::async_trait;

use crate::error::FleetError;
use crate::types::{InstanceHandle, ProbeReport};

/// Where an inbound payload came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageOrigin {
    /// A backend game-server instance
    Backend,
    /// An end-user connection
    Player,
}

/// A tagged-channel payload delivered by the host.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub channel: String,
    pub origin: MessageOrigin,
    pub payload: Vec<u8>,
}

impl InboundMessage {
    pub fn from_backend(channel: impl Into<String>, payload: Vec<u8>) -> Self {
        Self {
            channel: channel.into(),
            origin: MessageOrigin::Backend,
            payload,
        }
    }
}

/// Services the orchestrator requires from its host process.
///
/// The transport offers no reply-to-origin primitive, which is why responses
/// go out through [`FleetHost::broadcast`] and recipients filter by player.
#[async_trait]
pub trait FleetHost: Send + Sync {
    /// Every instance currently registered with the host, reachable or not.
    async fn known_instances(&self) -> Vec<InstanceHandle>;

    /// Asks one instance for its occupancy.
    ///
    /// Timeouts, refusals and malformed replies are all reported as an error;
    /// how long a probe may take is up to the host.
    async fn probe(&self, instance: &InstanceHandle) -> Result<ProbeReport, FleetError>;

    /// Sends `payload` on `channel` to every connected instance and returns
    /// how many received it.
    async fn broadcast(&self, channel: &str, payload: &[u8]) -> Result<usize, FleetError>;
}
