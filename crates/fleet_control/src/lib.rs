//! # Fleet Control - On-Demand Game Instance Orchestration
//!
//! The orchestration core for a fleet of game-server instances sitting
//! behind a proxy. Backends ask, over a tagged control channel, where a
//! player should be sent for a given instance type. The core answers with
//! the busiest instance that still has room, or brings a new instance up
//! when none does.
//!
//! ## Architecture Overview
//!
//! ### Core Components
//!
//! * **Registry** - Last known occupancy of every reachable instance,
//!   rebuilt by concurrent health probes
//! * **Selector** - Picks the transfer target from a registry snapshot
//! * **Lifecycle Manager** - Allocates the lowest free slot and provisions
//!   it, at most once per type per cooldown window
//! * **Protocol Dispatcher** - Decodes requests, runs the flow above and
//!   broadcasts the response
//! * **Config Provider** - Capacity ceilings and port assignments
//!
//! ### Message Flow
//!
//! 1. A backend sends `LobbyTransferRequest(player, type)` on the control channel
//! 2. The registry probes every known instance and waits for all of them
//! 3. The selector looks for a non-full instance of the type
//! 4. Failing that, the lifecycle manager tries to start a new one
//! 5. `LobbyTransferResponse(status, player, instance)` is broadcast back
//!
//! ## Host Integration
//!
//! The crate owns no sockets. The process embedding it implements
//! [`FleetHost`] to supply the instance list, the probe and the broadcast
//! transport, and feeds every inbound message to
//! [`FleetDispatcher::handle_inbound`].
//!
//! ```rust,no_run
//! # use std::sync::Arc;
//! # use fleet_control::{create_dispatcher, FleetHost, FleetSettings, InboundMessage};
//! # async fn run(host: Arc<dyn FleetHost>, message: InboundMessage) {
//! let dispatcher = create_dispatcher(host, &FleetSettings::default(), "mcmg:main");
//! if let Err(e) = dispatcher.handle_inbound(&message).await {
//!     eprintln!("configuration problem: {e}");
//! }
//! # }
//! ```
//!
//! ## Error Handling
//!
//! All fallible operations return [`FleetError`]. Probe failures evict the
//! instance for the current cycle, provisioning I/O failures become a
//! `failed_initialization` status, malformed messages are dropped. Only
//! configuration errors reach the caller.
//!
//! ## Thread Safety
//!
//! * The registry uses `Arc<RwLock<BTreeMap>>` so snapshots iterate in name order
//! * The provisioning lock is a `DashMap` with atomic check-and-acquire
//! * Handlers are `async` and can run concurrently on a multi-threaded runtime

use std::sync::Arc;

pub use config::{ConfigProvider, FleetSettings};
pub use error::FleetError;
pub use host::{FleetHost, InboundMessage, MessageOrigin};
pub use lifecycle::{CooldownPolicy, FilesystemProvisioner, LifecycleManager, Provisioner};
pub use protocol::{FleetDispatcher, LobbyTransferRequest, LobbyTransferResponse};
pub use registry::{RefreshReport, Registry, RegistrySnapshot};
pub use selector::select_target;
pub use types::{
    FleetStatus, InstanceHandle, InstanceInfo, InstanceType, ProbeReport, Slot, SlotNaming,
};

pub mod config;
pub mod error;
pub mod host;
pub mod lifecycle;
pub mod protocol;
pub mod registry;
pub mod selector;
pub mod types;

/// Builds a dispatcher backed by a [`FilesystemProvisioner`].
///
/// # Arguments
///
/// * `host` - The embedding process's probe and transport
/// * `settings` - Fleet settings; copied into the dispatcher
/// * `control_channel` - Channel identifier to listen and answer on
pub fn create_dispatcher(
    host: Arc<dyn FleetHost>,
    settings: &FleetSettings,
    control_channel: impl Into<String>,
) -> FleetDispatcher {
    let provisioner = FilesystemProvisioner::new(&settings.instance_root, &settings.launch_command);
    let lifecycle = LifecycleManager::new(
        Arc::new(settings.clone()),
        Arc::new(provisioner),
        settings.cooldown(),
        settings.cooldown_policy,
    );

    FleetDispatcher::new(host, Arc::new(lifecycle), control_channel)
}
