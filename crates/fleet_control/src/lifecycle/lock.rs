//! Cooldown lock guarding provisioning per instance type.
//!
//! While a type is held, new provisioning attempts for it are rejected
//! without side effects. Each held entry is released by a single delayed task
//! once its cooldown elapses. A generation number is stored with every entry
//! so that a timer belonging to an earlier, already released hold can never
//! release a newer one.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::types::InstanceType;

/// What happens to the cooldown lock when provisioning fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CooldownPolicy {
    /// The lock is held for the full cooldown whatever the outcome
    #[default]
    Fixed,
    /// A failed attempt releases the lock immediately
    ReleaseOnFailure,
}

/// Proof of a successful [`ProvisioningLock::try_acquire`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockTicket {
    instance_type: InstanceType,
    generation: u64,
}

impl LockTicket {
    pub fn instance_type(&self) -> &InstanceType {
        &self.instance_type
    }
}

/// Set of instance types with a provisioning attempt in flight.
#[derive(Debug, Clone, Default)]
pub struct ProvisioningLock {
    held: Arc<DashMap<InstanceType, u64>>,
    next_generation: Arc<AtomicU64>,
}

impl ProvisioningLock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_locked(&self, instance_type: &InstanceType) -> bool {
        self.held.contains_key(instance_type)
    }

    /// Takes the lock for `instance_type` for `cooldown`.
    ///
    /// Returns `None` if the type is already held. Check and insert happen
    /// under the same map entry, so two concurrent callers cannot both win.
    /// Must be called from within a tokio runtime.
    pub fn try_acquire(&self, instance_type: &InstanceType, cooldown: Duration) -> Option<LockTicket> {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);

        match self.held.entry(instance_type.clone()) {
            Entry::Occupied(_) => return None,
            Entry::Vacant(vacant) => {
                vacant.insert(generation);
            }
        }

        let held = self.held.clone();
        let expiring = instance_type.clone();
        tokio::spawn(async move {
            tokio::time::sleep(cooldown).await;
            if held.remove_if(&expiring, |_, g| *g == generation).is_some() {
                debug!("⏲️ Provisioning cooldown for '{}' expired", expiring);
            }
        });

        Some(LockTicket {
            instance_type: instance_type.clone(),
            generation,
        })
    }

    /// Releases the hold identified by `ticket` before its cooldown elapses.
    ///
    /// Returns `false` if that hold was already released.
    pub fn release(&self, ticket: &LockTicket) -> bool {
        self.held
            .remove_if(&ticket.instance_type, |_, g| *g == ticket.generation)
            .is_some()
    }

    /// Types currently held, in no particular order.
    pub fn held_types(&self) -> Vec<InstanceType> {
        self.held.iter().map(|entry| entry.key().clone()).collect()
    }
}
