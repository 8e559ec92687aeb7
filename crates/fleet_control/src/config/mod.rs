//! Configuration access for fleet orchestration.
//!
//! The orchestrator reads two kinds of values synchronously while handling a
//! request: the capacity ceiling of an instance type and the port assigned to
//! an instance name. Both come through [`ConfigProvider`] so that the host can
//! back them with whatever configuration system it already has.
//! [`FleetSettings`] is the TOML-friendly implementation used by `fleetd`.

pub mod settings;

pub use settings::FleetSettings;

use crate::error::FleetError;
use crate::types::{InstanceType, SlotNaming};

/// Read-only source of per-type ceilings and per-instance ports.
///
/// Lookups for values that are not configured must fail with
/// [`FleetError::Config`]; there is no safe default for either value.
pub trait ConfigProvider: Send + Sync {
    /// Maximum number of instances of `instance_type` allowed on the network.
    fn max_instances_of_type(&self, instance_type: &InstanceType) -> Result<u32, FleetError>;

    /// Port assigned to the instance called `name`, as written to its
    /// runtime properties.
    fn port_for_instance_name(&self, name: &str) -> Result<String, FleetError>;

    /// Every instance type this provider knows a ceiling for.
    fn catalog(&self) -> Vec<InstanceType>;

    /// How slot identities map to instance names.
    fn slot_naming(&self) -> SlotNaming {
        SlotNaming::default()
    }
}
