//! Health-probing registry of backend instances.
//!
//! The registry holds the last known occupancy of every reachable instance.
//! It is rebuilt by [`Registry::refresh`], which probes every instance the
//! host knows about concurrently and only returns once all of those probes
//! have settled. Readers must take a [`RegistrySnapshot`] after the refresh
//! they depend on has completed.
//!
//! Entries are kept in name order so that anything iterating a snapshot sees
//! the same order for the same contents.

use futures::stream::{FuturesUnordered, StreamExt};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, trace};

use crate::host::FleetHost;
use crate::types::InstanceInfo;

/// Outcome counts of one refresh cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RefreshReport {
    /// Number of probes issued
    pub probed: usize,
    /// Probes that succeeded and updated an entry
    pub online: usize,
    /// Probes that failed and evicted an entry
    pub offline: usize,
}

/// An owned, name-ordered copy of the registry contents.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistrySnapshot {
    entries: Vec<InstanceInfo>,
}

impl RegistrySnapshot {
    /// Builds a snapshot from arbitrary entries, sorting them by name.
    ///
    /// Later entries replace earlier ones with the same name.
    pub fn from_entries(entries: impl IntoIterator<Item = InstanceInfo>) -> Self {
        let map: BTreeMap<String, InstanceInfo> = entries
            .into_iter()
            .map(|info| (info.name.clone(), info))
            .collect();
        Self {
            entries: map.into_values().collect(),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &InstanceInfo> {
        self.entries.iter()
    }

    pub fn get(&self, name: &str) -> Option<&InstanceInfo> {
        self.entries
            .binary_search_by(|info| info.name.as_str().cmp(name))
            .ok()
            .map(|idx| &self.entries[idx])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Shared map of instance name to last known health and capacity.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    entries: Arc<RwLock<BTreeMap<String, InstanceInfo>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Probes every instance known to `host` and waits for all of them.
    ///
    /// A successful probe overwrites the instance's entry, a failed one
    /// evicts it. Instances the host no longer knows are dropped. Nothing is
    /// retried within a cycle.
    pub async fn refresh<H>(&self, host: &H) -> RefreshReport
    where
        H: FleetHost + ?Sized,
    {
        let instances = host.known_instances().await;

        {
            let mut entries = self.entries.write().await;
            entries.retain(|name, _| instances.iter().any(|instance| &instance.name == name));
        }

        let mut probes = instances
            .iter()
            .map(|instance| {
                let entries = self.entries.clone();
                async move {
                    match host.probe(instance).await {
                        Ok(report) => {
                            trace!(
                                "Probed {}: {} of {} online",
                                instance.name, report.online_count, report.max_count
                            );
                            entries
                                .write()
                                .await
                                .insert(instance.name.clone(), InstanceInfo::from_probe(instance, report));
                            true
                        }
                        Err(e) => {
                            debug!("Instance {} is offline this cycle: {}", instance.name, e);
                            entries.write().await.remove(&instance.name);
                            false
                        }
                    }
                }
            })
            .collect::<FuturesUnordered<_>>();

        let mut report = RefreshReport {
            probed: instances.len(),
            ..Default::default()
        };

        while let Some(online) = probes.next().await {
            if online {
                report.online += 1;
            } else {
                report.offline += 1;
            }
        }

        debug!(
            "🔍 Registry refreshed: {} probed, {} online, {} offline",
            report.probed, report.online, report.offline
        );
        report
    }

    /// Copies the current contents.
    pub async fn snapshot(&self) -> RegistrySnapshot {
        let entries = self.entries.read().await;
        RegistrySnapshot {
            entries: entries.values().cloned().collect(),
        }
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}
