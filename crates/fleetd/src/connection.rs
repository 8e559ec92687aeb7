//! Backend connection management.
//!
//! Every backend instance keeps one TCP connection open to the control
//! listener. The [`ConnectionManager`] tracks a bounded outbound queue per
//! connection so broadcasts never wait on a slow socket. A backend that lets
//! its queue fill up is dropped.

use dashmap::DashMap;
use fleet_control::{FleetDispatcher, InboundMessage};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::frame::read_frame;

/// Type alias for connection identifiers.
pub type ConnectionId = usize;

/// Frames queued per connection before it is considered stalled.
pub const OUTBOUND_QUEUE_CAPACITY: usize = 256;

#[derive(Debug)]
struct BackendConnection {
    remote_addr: SocketAddr,
    outbound: mpsc::Sender<Arc<[u8]>>,
}

/// Tracks live backend connections and fans frames out to them.
#[derive(Debug, Default)]
pub struct ConnectionManager {
    connections: DashMap<ConnectionId, BackendConnection>,
    next_id: AtomicUsize,
}

impl ConnectionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a connection and returns its id and outbound queue.
    pub fn add_connection(&self, remote_addr: SocketAddr) -> (ConnectionId, mpsc::Receiver<Arc<[u8]>>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (outbound, receiver) = mpsc::channel(OUTBOUND_QUEUE_CAPACITY);
        self.connections.insert(id, BackendConnection { remote_addr, outbound });
        (id, receiver)
    }

    pub fn remove_connection(&self, id: ConnectionId) {
        if let Some((_, conn)) = self.connections.remove(&id) {
            info!("🔌 Backend {} ({}) disconnected", id, conn.remote_addr);
        }
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Queues `frame` on every live connection and returns how many took it.
    ///
    /// Connections whose queue is full are removed; dropping the sender ends
    /// their writer task.
    pub fn broadcast(&self, frame: Vec<u8>) -> usize {
        let frame: Arc<[u8]> = frame.into();
        let mut delivered = 0;
        let mut stalled = Vec::new();

        for entry in self.connections.iter() {
            match entry.outbound.try_send(frame.clone()) {
                Ok(()) => delivered += 1,
                Err(mpsc::error::TrySendError::Full(_)) => stalled.push(*entry.key()),
                Err(mpsc::error::TrySendError::Closed(_)) => {}
            }
        }

        for id in stalled {
            warn!("Backend {} is not reading its queue, dropping it", id);
            self.remove_connection(id);
        }

        delivered
    }
}

/// Serves one backend connection until it closes.
///
/// Inbound frames are handed to the dispatcher on their own tasks, so a
/// transfer request that waits on probes does not stall the connection.
pub async fn handle_connection(
    stream: TcpStream,
    remote_addr: SocketAddr,
    connections: Arc<ConnectionManager>,
    dispatcher: Arc<FleetDispatcher>,
) {
    let (mut reader, mut writer) = stream.into_split();
    let (id, mut outbound) = connections.add_connection(remote_addr);
    info!("🔗 Backend {} connected from {}", id, remote_addr);

    let writer_task = tokio::spawn(async move {
        while let Some(frame) = outbound.recv().await {
            if let Err(e) = writer.write_all(&frame).await {
                warn!("Write to backend {} failed: {}", id, e);
                break;
            }
        }
    });

    loop {
        match read_frame(&mut reader).await {
            Ok(Some(frame)) => {
                let dispatcher = dispatcher.clone();
                tokio::spawn(async move {
                    let message = InboundMessage::from_backend(frame.channel, frame.payload);
                    if let Err(e) = dispatcher.handle_inbound(&message).await {
                        error!("Control message from backend {} failed: {}", id, e);
                    }
                });
            }
            Ok(None) => break,
            Err(e) => {
                debug!("Closing backend {} after read error: {}", id, e);
                break;
            }
        }
    }

    connections.remove_connection(id);
    writer_task.abort();
}
