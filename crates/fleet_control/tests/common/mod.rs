//! Test doubles for the host and provisioning seams.

#![allow(dead_code)]

use async_trait::async_trait;
use fleet_control::protocol::{ControlMessage, LobbyTransferRequest, LobbyTransferResponse};
use fleet_control::{
    CooldownPolicy, FleetDispatcher, FleetError, FleetHost, FleetSettings, InboundMessage,
    InstanceHandle, InstanceType, LifecycleManager, ProbeReport, Provisioner, Slot, SlotNaming,
};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const CHANNEL: &str = "mcmg:main";

/// How a mocked instance answers its probe.
#[derive(Debug, Clone, Copy)]
pub enum ProbeBehavior {
    Online { online: u32, max: u32, delay: Duration },
    Offline,
}

impl ProbeBehavior {
    pub fn online(online: u32, max: u32) -> Self {
        Self::Online {
            online,
            max,
            delay: Duration::ZERO,
        }
    }
}

/// In-memory host with scripted probe answers.
#[derive(Default)]
pub struct MockHost {
    instances: Mutex<BTreeMap<String, (InstanceHandle, ProbeBehavior)>>,
    pub probes_started: AtomicUsize,
    pub probes_finished: Arc<AtomicUsize>,
    pub broadcasts: Mutex<Vec<(String, Vec<u8>)>>,
}

impl MockHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, instance_type: &str, ordinal: u32, behavior: ProbeBehavior) {
        let handle = InstanceHandle::for_slot(Slot::new(instance_type, ordinal), &SlotNaming::default());
        self.instances
            .lock()
            .unwrap()
            .insert(handle.name.clone(), (handle, behavior));
    }

    pub fn remove(&self, name: &str) {
        self.instances.lock().unwrap().remove(name);
    }

    /// Decoded responses broadcast so far.
    pub fn responses(&self) -> Vec<LobbyTransferResponse> {
        self.broadcasts
            .lock()
            .unwrap()
            .iter()
            .filter_map(|(_, payload)| match ControlMessage::decode(payload) {
                Ok(Some(ControlMessage::TransferResponse(resp))) => Some(resp),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl FleetHost for MockHost {
    async fn known_instances(&self) -> Vec<InstanceHandle> {
        self.instances
            .lock()
            .unwrap()
            .values()
            .map(|(handle, _)| handle.clone())
            .collect()
    }

    async fn probe(&self, instance: &InstanceHandle) -> Result<ProbeReport, FleetError> {
        self.probes_started.fetch_add(1, Ordering::SeqCst);
        let behavior = self
            .instances
            .lock()
            .unwrap()
            .get(&instance.name)
            .map(|(_, behavior)| *behavior);

        let result = match behavior {
            Some(ProbeBehavior::Online { online, max, delay }) => {
                tokio::time::sleep(delay).await;
                Ok(ProbeReport {
                    online_count: online,
                    max_count: max,
                })
            }
            _ => Err(FleetError::probe(&instance.name, "connection refused")),
        };

        self.probes_finished.fetch_add(1, Ordering::SeqCst);
        result
    }

    async fn broadcast(&self, channel: &str, payload: &[u8]) -> Result<usize, FleetError> {
        self.broadcasts
            .lock()
            .unwrap()
            .push((channel.to_string(), payload.to_vec()));
        Ok(1)
    }
}

/// Records provisioning calls and how many probes had settled at each.
#[derive(Default)]
pub struct MockProvisioner {
    pub calls: Mutex<Vec<(Slot, String, String)>>,
    pub probes_settled_at_call: Mutex<Vec<usize>>,
    probes_finished: Option<Arc<AtomicUsize>>,
    fail: bool,
}

impl MockProvisioner {
    pub fn watching(host: &MockHost) -> Self {
        Self {
            probes_finished: Some(host.probes_finished.clone()),
            ..Default::default()
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl Provisioner for MockProvisioner {
    async fn provision(&self, slot: &Slot, name: &str, port: &str) -> Result<(), FleetError> {
        if let Some(counter) = &self.probes_finished {
            self.probes_settled_at_call
                .lock()
                .unwrap()
                .push(counter.load(Ordering::SeqCst));
        }
        self.calls
            .lock()
            .unwrap()
            .push((slot.clone(), name.to_string(), port.to_string()));

        if self.fail {
            Err(std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only filesystem").into())
        } else {
            Ok(())
        }
    }
}

/// Settings for a single `KOTH` type with `ceiling` slots, ports from 25510.
pub fn koth_settings(ceiling: u32) -> FleetSettings {
    FleetSettings {
        max_instances: BTreeMap::from([("KOTH".to_string(), ceiling)]),
        ports: (0..ceiling)
            .map(|i| (format!("KOTH_{i}"), (25510 + i).to_string()))
            .collect::<BTreeMap<_, _>>(),
        cooldown_policy: CooldownPolicy::Fixed,
        ..FleetSettings::default()
    }
}

pub fn dispatcher(
    host: Arc<MockHost>,
    provisioner: Arc<MockProvisioner>,
    settings: FleetSettings,
) -> FleetDispatcher {
    let cooldown = settings.cooldown();
    let policy = settings.cooldown_policy;
    let lifecycle = LifecycleManager::new(Arc::new(settings), provisioner, cooldown, policy);
    FleetDispatcher::new(host, Arc::new(lifecycle), CHANNEL)
}

pub fn transfer_request(player: &str, instance_type: &str) -> InboundMessage {
    let payload = ControlMessage::TransferRequest(LobbyTransferRequest {
        player_name: player.to_string(),
        instance_type: InstanceType::from(instance_type),
    })
    .encode()
    .unwrap();
    InboundMessage::from_backend(CHANNEL, payload)
}
