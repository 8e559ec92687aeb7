//! Fleet configuration settings
//!
//! [`FleetSettings`] holds everything the orchestration core needs from the
//! configuration file: capacity ceilings, port assignments, provisioning
//! paths and the cooldown policy. It is deserialized from the `[fleet]`
//! table of the daemon configuration.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use super::ConfigProvider;
use crate::error::FleetError;
use crate::lifecycle::CooldownPolicy;
use crate::types::{InstanceType, SlotNaming};

fn default_instance_root() -> PathBuf {
    PathBuf::from("server-instances")
}

fn default_name_separator() -> String {
    "_".to_string()
}

fn default_cooldown_secs() -> u64 {
    60
}

fn default_launch_command() -> String {
    "java -Xmx1024M -Xms512M -jar paper.jar --nogui".to_string()
}

/// Fleet orchestration settings.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct FleetSettings {
    /// Root directory holding one `<type>/template` tree per instance type.
    ///
    /// Provisioned instances are created under `<type>/active-servers/<name>`.
    #[serde(default = "default_instance_root")]
    pub instance_root: PathBuf,

    /// Separator between type token and ordinal in instance names
    #[serde(default = "default_name_separator")]
    pub name_separator: String,

    /// How long a provisioning attempt blocks further attempts for its type
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,

    /// Whether a failed provisioning attempt keeps the cooldown lock
    #[serde(default)]
    pub cooldown_policy: CooldownPolicy,

    /// Command line written into each new instance's start script
    #[serde(default = "default_launch_command")]
    pub launch_command: String,

    /// Capacity ceiling per instance type; the keys form the type catalog
    #[serde(default)]
    pub max_instances: BTreeMap<String, u32>,

    /// Port assignment per instance name
    #[serde(default)]
    pub ports: BTreeMap<String, String>,
}

impl Default for FleetSettings {
    fn default() -> Self {
        Self {
            instance_root: default_instance_root(),
            name_separator: default_name_separator(),
            cooldown_secs: default_cooldown_secs(),
            cooldown_policy: CooldownPolicy::default(),
            launch_command: default_launch_command(),
            max_instances: BTreeMap::from([
                ("KOTH_lobby".to_string(), 2),
                ("MM_lobby".to_string(), 2),
            ]),
            ports: BTreeMap::from([
                ("KOTH_lobby_0".to_string(), "25510".to_string()),
                ("KOTH_lobby_1".to_string(), "25511".to_string()),
                ("MM_lobby_0".to_string(), "25520".to_string()),
                ("MM_lobby_1".to_string(), "25521".to_string()),
            ]),
        }
    }
}

impl FleetSettings {
    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }

    /// Checks the settings for values the orchestrator cannot work with.
    pub fn validate(&self) -> Result<(), String> {
        if self.cooldown_secs == 0 {
            return Err("Provisioning cooldown must be at least one second".to_string());
        }

        if self.launch_command.trim().is_empty() {
            return Err("Launch command cannot be empty".to_string());
        }

        for (name, port) in &self.ports {
            if port.parse::<u16>().is_err() {
                return Err(format!("Invalid port '{port}' for instance {name}"));
            }
        }

        Ok(())
    }
}

impl ConfigProvider for FleetSettings {
    fn max_instances_of_type(&self, instance_type: &InstanceType) -> Result<u32, FleetError> {
        self.max_instances
            .get(instance_type.as_str())
            .copied()
            .ok_or_else(|| {
                FleetError::Config(format!("no capacity ceiling configured for type '{instance_type}'"))
            })
    }

    fn port_for_instance_name(&self, name: &str) -> Result<String, FleetError> {
        self.ports
            .get(name)
            .cloned()
            .ok_or_else(|| FleetError::Config(format!("no port configured for instance '{name}'")))
    }

    fn catalog(&self) -> Vec<InstanceType> {
        self.max_instances.keys().map(|t| InstanceType::from(t.as_str())).collect()
    }

    fn slot_naming(&self) -> SlotNaming {
        SlotNaming::new(self.name_separator.clone())
    }
}
