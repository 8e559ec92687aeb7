//! The daemon's implementation of the orchestrator's host seam.

use async_trait::async_trait;
use fleet_control::{
    ConfigProvider, FleetError, FleetHost, FleetSettings, InstanceHandle, ProbeReport,
};
use std::sync::Arc;
use std::time::Duration;

use crate::connection::ConnectionManager;
use crate::frame::encode_frame;
use crate::status_ping;

/// A managed instance and where to reach it.
#[derive(Debug, Clone)]
struct KnownInstance {
    handle: InstanceHandle,
    port: u16,
}

/// Hosts the orchestrator over TCP.
///
/// The instance list is the configured port table: every named port is an
/// instance that may or may not be running. Probes use the status ping,
/// broadcasts go to every connected backend.
pub struct TcpFleetHost {
    instances: Vec<KnownInstance>,
    instance_host: String,
    probe_timeout: Duration,
    connections: Arc<ConnectionManager>,
}

impl TcpFleetHost {
    /// Builds the host from fleet settings.
    ///
    /// Names in the port table are parsed into slots against the configured
    /// type catalog; names outside it are still probed but never selected.
    ///
    /// # Errors
    ///
    /// Returns [`FleetError::Config`] for a port that is not a valid `u16`.
    pub fn new(
        settings: &FleetSettings,
        instance_host: impl Into<String>,
        probe_timeout: Duration,
        connections: Arc<ConnectionManager>,
    ) -> Result<Self, FleetError> {
        let catalog = settings.catalog();
        let naming = settings.slot_naming();

        let instances = settings
            .ports
            .iter()
            .map(|(name, port)| {
                let port = port
                    .parse::<u16>()
                    .map_err(|_| FleetError::Config(format!("invalid port '{port}' for instance {name}")))?;
                Ok(KnownInstance {
                    handle: InstanceHandle::new(name.clone(), naming.parse(name, &catalog)),
                    port,
                })
            })
            .collect::<Result<Vec<_>, FleetError>>()?;

        Ok(Self {
            instances,
            instance_host: instance_host.into(),
            probe_timeout,
            connections,
        })
    }

    pub fn instance_count(&self) -> usize {
        self.instances.len()
    }
}

#[async_trait]
impl FleetHost for TcpFleetHost {
    async fn known_instances(&self) -> Vec<InstanceHandle> {
        self.instances.iter().map(|known| known.handle.clone()).collect()
    }

    async fn probe(&self, instance: &InstanceHandle) -> Result<ProbeReport, FleetError> {
        let port = self
            .instances
            .iter()
            .find(|known| known.handle.name == instance.name)
            .map(|known| known.port)
            .ok_or_else(|| FleetError::probe(&instance.name, "not in the port table"))?;

        status_ping::ping(&instance.name, &self.instance_host, port, self.probe_timeout).await
    }

    async fn broadcast(&self, channel: &str, payload: &[u8]) -> Result<usize, FleetError> {
        let frame = encode_frame(channel, payload)?;
        Ok(self.connections.broadcast(frame))
    }
}
