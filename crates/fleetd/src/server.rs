//! The control listener backends connect to.

use anyhow::Context;
use fleet_control::FleetDispatcher;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::{error, info};

use crate::connection::{handle_connection, ConnectionManager};

/// Accepts backend connections and feeds their frames to the dispatcher.
pub struct ControlServer {
    listener: TcpListener,
    connections: Arc<ConnectionManager>,
    dispatcher: Arc<FleetDispatcher>,
}

impl ControlServer {
    /// Binds the control listener.
    ///
    /// # Arguments
    ///
    /// * `bind_address` - Address to listen on
    /// * `connections` - Shared with the host so broadcasts reach these connections
    /// * `dispatcher` - Handles every inbound frame
    pub async fn bind(
        bind_address: SocketAddr,
        connections: Arc<ConnectionManager>,
        dispatcher: Arc<FleetDispatcher>,
    ) -> anyhow::Result<Self> {
        let listener = TcpListener::bind(bind_address)
            .await
            .with_context(|| format!("Failed to bind control listener on {bind_address}"))?;
        info!("✅ Control listener bound on {}", listener.local_addr()?);

        Ok(Self {
            listener,
            connections,
            dispatcher,
        })
    }

    pub fn local_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Runs the accept loop until `shutdown` fires or accepting fails.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        loop {
            tokio::select! {
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, addr)) => {
                        let connections = self.connections.clone();
                        let dispatcher = self.dispatcher.clone();
                        tokio::spawn(handle_connection(stream, addr, connections, dispatcher));
                    }
                    Err(e) => {
                        error!("Failed to accept connection: {}", e);
                        break;
                    }
                },
                _ = shutdown.recv() => {
                    info!("Control listener shutting down");
                    break;
                }
            }
        }
    }
}
