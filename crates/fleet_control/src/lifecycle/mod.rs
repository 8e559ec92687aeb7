//! Instance lifecycle management.
//!
//! The [`LifecycleManager`] decides whether a new instance of a type may be
//! created and, if so, which slot it takes. Provisioning attempts for a type
//! are rate limited by a [`ProvisioningLock`]: one attempt per cooldown
//! window, whatever its outcome.
//!
//! # Decision order
//!
//! 1. A held lock for the type answers [`FleetStatus::Initializing`] with no
//!    side effects.
//! 2. The type's capacity ceiling is looked up; a missing ceiling is a
//!    configuration error.
//! 3. The lowest ordinal not claimed by any registry entry is chosen. With no
//!    free ordinal the answer is [`FleetStatus::Full`] and no lock is taken.
//! 4. The slot's port is looked up; a missing port is a configuration error
//!    and leaves the lock untouched.
//! 5. The lock is taken and the slot is handed to the [`Provisioner`].

pub mod lock;
pub mod provisioner;

pub use lock::{CooldownPolicy, LockTicket, ProvisioningLock};
pub use provisioner::{FilesystemProvisioner, Provisioner};

use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::config::ConfigProvider;
use crate::error::FleetError;
use crate::registry::RegistrySnapshot;
use crate::types::{FleetStatus, InstanceType, Slot};

/// Creates new instances on demand, one per type per cooldown window.
pub struct LifecycleManager {
    /// Capacity ceilings, ports and naming
    config: Arc<dyn ConfigProvider>,

    /// Performs the actual instance creation
    provisioner: Arc<dyn Provisioner>,

    /// Per-type cooldown lock
    lock: ProvisioningLock,

    /// How long each provisioning attempt holds the lock
    cooldown: Duration,

    /// Whether a failed attempt keeps the lock
    policy: CooldownPolicy,
}

impl LifecycleManager {
    /// Creates a new lifecycle manager.
    ///
    /// # Arguments
    ///
    /// * `config` - Source of capacity ceilings, ports and slot naming
    /// * `provisioner` - Creates and starts instance processes
    /// * `cooldown` - Length of each provisioning lock
    /// * `policy` - Lock behaviour after a failed attempt
    pub fn new(
        config: Arc<dyn ConfigProvider>,
        provisioner: Arc<dyn Provisioner>,
        cooldown: Duration,
        policy: CooldownPolicy,
    ) -> Self {
        Self {
            config,
            provisioner,
            lock: ProvisioningLock::new(),
            cooldown,
            policy,
        }
    }

    pub fn lock(&self) -> &ProvisioningLock {
        &self.lock
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    /// Finds the lowest free slot of `instance_type`.
    ///
    /// A slot is free when no entry in `snapshot` carries its name or parses
    /// to it.
    /// Returns `Ok(None)` when every slot below the ceiling is taken.
    ///
    /// # Errors
    ///
    /// Returns [`FleetError::Config`] if the type has no capacity ceiling.
    pub fn allocate_slot(
        &self,
        instance_type: &InstanceType,
        snapshot: &RegistrySnapshot,
    ) -> Result<Option<Slot>, FleetError> {
        let ceiling = self.config.max_instances_of_type(instance_type)?;
        let naming = self.config.slot_naming();

        Ok((0..ceiling)
            .map(|ordinal| Slot::new(instance_type.clone(), ordinal))
            .find(|slot| {
                !snapshot.contains(&naming.name(slot))
                    && !snapshot.iter().any(|info| info.slot.as_ref() == Some(slot))
            }))
    }

    /// Attempts to bring up one more instance of `instance_type`.
    ///
    /// `snapshot` must be taken after a completed registry refresh.
    ///
    /// # Returns
    ///
    /// * `Initializing` - an attempt for this type is still cooling down
    /// * `Full` - the capacity ceiling is reached
    /// * `BeganInitializing` - a new instance was provisioned
    /// * `FailedInitializing` - provisioning hit an I/O error
    ///
    /// # Errors
    ///
    /// Configuration lookups that fail are returned as [`FleetError::Config`].
    pub async fn start_new_instance(
        &self,
        instance_type: &InstanceType,
        snapshot: &RegistrySnapshot,
    ) -> Result<FleetStatus, FleetError> {
        if self.lock.is_locked(instance_type) {
            info!("⏳ Provisioning of '{}' is cooling down", instance_type);
            return Ok(FleetStatus::Initializing);
        }

        let Some(slot) = self.allocate_slot(instance_type, snapshot)? else {
            info!("🈵 All instances of '{}' are in use", instance_type);
            return Ok(FleetStatus::Full);
        };

        let name = self.config.slot_naming().name(&slot);
        let port = self.config.port_for_instance_name(&name)?;

        let Some(ticket) = self.lock.try_acquire(instance_type, self.cooldown) else {
            // Another request took the lock between the check and here
            return Ok(FleetStatus::Initializing);
        };

        info!("🔧 Provisioning {} on port {}", name, port);
        match self.provisioner.provision(&slot, &name, &port).await {
            Ok(()) => {
                info!("✅ Instance {} is starting", name);
                Ok(FleetStatus::BeganInitializing)
            }
            Err(e) => {
                error!("❌ Failed to provision {}: {}", name, e);
                self.after_failure(&ticket);
                Ok(FleetStatus::FailedInitializing)
            }
        }
    }

    fn after_failure(&self, ticket: &LockTicket) {
        match self.policy {
            CooldownPolicy::Fixed => warn!(
                "Provisioning of '{}' stays locked for {:?} after failure",
                ticket.instance_type(),
                self.cooldown
            ),
            CooldownPolicy::ReleaseOnFailure => {
                self.lock.release(ticket);
            }
        }
    }
}

impl std::fmt::Debug for LifecycleManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LifecycleManager")
            .field("lock", &self.lock)
            .field("cooldown", &self.cooldown)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FleetSettings;
    use crate::types::InstanceInfo;
    use async_trait::async_trait;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingProvisioner {
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl Provisioner for CountingProvisioner {
        async fn provision(&self, _slot: &Slot, _name: &str, _port: &str) -> Result<(), FleetError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(std::io::Error::new(std::io::ErrorKind::NotFound, "template missing").into())
            } else {
                Ok(())
            }
        }
    }

    fn settings(ceiling: u32, policy: CooldownPolicy) -> FleetSettings {
        FleetSettings {
            cooldown_policy: policy,
            max_instances: BTreeMap::from([("KOTH".to_string(), ceiling)]),
            ports: (0..ceiling)
                .map(|i| (format!("KOTH_{i}"), (25510 + i).to_string()))
                .collect(),
            ..FleetSettings::default()
        }
    }

    fn manager(settings: FleetSettings, provisioner: Arc<CountingProvisioner>) -> LifecycleManager {
        let cooldown = settings.cooldown();
        let policy = settings.cooldown_policy;
        LifecycleManager::new(Arc::new(settings), provisioner, cooldown, policy)
    }

    fn running(ordinals: &[u32]) -> RegistrySnapshot {
        RegistrySnapshot::from_entries(ordinals.iter().map(|&i| InstanceInfo {
            name: format!("KOTH_{i}"),
            slot: Some(Slot::new("KOTH", i)),
            online_count: 0,
            max_count: 8,
        }))
    }

    #[tokio::test]
    async fn test_allocates_lowest_free_ordinal() {
        let provisioner = Arc::new(CountingProvisioner::default());
        let manager = manager(settings(4, CooldownPolicy::Fixed), provisioner);
        let koth = InstanceType::from("KOTH");

        assert_eq!(
            manager.allocate_slot(&koth, &running(&[0, 2])).unwrap(),
            Some(Slot::new("KOTH", 1))
        );
        assert_eq!(
            manager.allocate_slot(&koth, &running(&[])).unwrap(),
            Some(Slot::new("KOTH", 0))
        );
        assert_eq!(manager.allocate_slot(&koth, &running(&[0, 1, 2, 3])).unwrap(), None);
    }

    #[tokio::test]
    async fn test_full_does_not_take_lock() {
        let provisioner = Arc::new(CountingProvisioner::default());
        let manager = manager(settings(2, CooldownPolicy::Fixed), provisioner.clone());
        let koth = InstanceType::from("KOTH");

        let status = manager.start_new_instance(&koth, &running(&[0, 1])).await.unwrap();
        assert_eq!(status, FleetStatus::Full);
        assert!(!manager.lock().is_locked(&koth));
        assert_eq!(provisioner.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_request_in_window_is_initializing() {
        let provisioner = Arc::new(CountingProvisioner::default());
        let manager = manager(settings(4, CooldownPolicy::Fixed), provisioner.clone());
        let koth = InstanceType::from("KOTH");
        let snapshot = running(&[0]);

        let first = manager.start_new_instance(&koth, &snapshot).await.unwrap();
        let second = manager.start_new_instance(&koth, &snapshot).await.unwrap();

        assert_eq!(first, FleetStatus::BeganInitializing);
        assert_eq!(second, FleetStatus::Initializing);
        assert_eq!(provisioner.calls.load(Ordering::SeqCst), 1);

        tokio::time::sleep(manager.cooldown() + Duration::from_secs(1)).await;
        let third = manager.start_new_instance(&koth, &snapshot).await.unwrap();
        assert_eq!(third, FleetStatus::BeganInitializing);
        assert_eq!(provisioner.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_keeps_lock_under_fixed_policy() {
        let provisioner = Arc::new(CountingProvisioner {
            fail: true,
            ..Default::default()
        });
        let manager = manager(settings(2, CooldownPolicy::Fixed), provisioner.clone());
        let koth = InstanceType::from("KOTH");

        let status = manager.start_new_instance(&koth, &running(&[])).await.unwrap();
        assert_eq!(status, FleetStatus::FailedInitializing);
        assert!(manager.lock().is_locked(&koth));

        let status = manager.start_new_instance(&koth, &running(&[])).await.unwrap();
        assert_eq!(status, FleetStatus::Initializing);
        assert_eq!(provisioner.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_releases_lock_under_release_policy() {
        let provisioner = Arc::new(CountingProvisioner {
            fail: true,
            ..Default::default()
        });
        let manager = manager(
            settings(2, CooldownPolicy::ReleaseOnFailure),
            provisioner.clone(),
        );
        let koth = InstanceType::from("KOTH");

        let status = manager.start_new_instance(&koth, &running(&[])).await.unwrap();
        assert_eq!(status, FleetStatus::FailedInitializing);
        assert!(!manager.lock().is_locked(&koth));

        let status = manager.start_new_instance(&koth, &running(&[])).await.unwrap();
        assert_eq!(status, FleetStatus::FailedInitializing);
        assert_eq!(provisioner.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_unknown_type_is_config_error() {
        let provisioner = Arc::new(CountingProvisioner::default());
        let manager = manager(settings(2, CooldownPolicy::Fixed), provisioner.clone());

        let err = manager
            .start_new_instance(&InstanceType::from("BedWars"), &running(&[]))
            .await
            .unwrap_err();
        assert!(err.is_config());
        assert!(!manager.lock().is_locked(&InstanceType::from("BedWars")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_port_is_config_error() {
        let provisioner = Arc::new(CountingProvisioner::default());
        let mut settings = settings(2, CooldownPolicy::Fixed);
        settings.ports.clear();
        let manager = manager(settings, provisioner.clone());

        let err = manager
            .start_new_instance(&InstanceType::from("KOTH"), &running(&[]))
            .await
            .unwrap_err();
        assert!(err.is_config());
        assert_eq!(provisioner.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_port_does_not_lock_type() {
        let provisioner = Arc::new(CountingProvisioner::default());
        let mut settings = settings(2, CooldownPolicy::Fixed);
        settings.ports.clear();
        let manager = manager(settings, provisioner.clone());
        let koth = InstanceType::from("KOTH");

        for _ in 0..2 {
            let err = manager.start_new_instance(&koth, &running(&[])).await.unwrap_err();
            assert!(err.is_config());
            assert!(!manager.lock().is_locked(&koth));
        }
        assert_eq!(provisioner.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_slot_claimed_by_other_name_is_not_free() {
        let provisioner = Arc::new(CountingProvisioner::default());
        let manager = manager(settings(2, CooldownPolicy::Fixed), provisioner);
        let koth = InstanceType::from("KOTH");

        let snapshot = RegistrySnapshot::from_entries([InstanceInfo {
            name: "KOTH_00".to_string(),
            slot: Some(Slot::new("KOTH", 0)),
            online_count: 8,
            max_count: 8,
        }]);

        assert_eq!(
            manager.allocate_slot(&koth, &snapshot).unwrap(),
            Some(Slot::new("KOTH", 1))
        );
    }
}
