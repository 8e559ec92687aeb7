//! Shared data vocabulary for the fleet.
//!
//! Instance identity is structured: every managed instance occupies a
//! [`Slot`] `(type, ordinal)` and its name is rendered from that slot by a
//! [`SlotNaming`]. Type membership is decided on the slot, never by searching
//! for the type token inside the name.

use std::fmt;
use std::str::FromStr;

use crate::error::FleetError;

/// A token from the small catalog of instance types (e.g. `KOTH_lobby`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct InstanceType(String);

impl InstanceType {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for InstanceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for InstanceType {
    fn from(token: &str) -> Self {
        Self(token.to_string())
    }
}

impl From<String> for InstanceType {
    fn from(token: String) -> Self {
        Self(token)
    }
}

/// A `(type, ordinal)` identity reserved for one instance within a type's
/// capacity ceiling.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Slot {
    pub instance_type: InstanceType,
    pub ordinal: u32,
}

impl Slot {
    pub fn new(instance_type: impl Into<InstanceType>, ordinal: u32) -> Self {
        Self {
            instance_type: instance_type.into(),
            ordinal,
        }
    }
}

/// Renders slots into instance names and parses names back into slots.
///
/// A name is `type + separator + ordinal`, so with the default `"_"`
/// separator slot `(KOTH, 0)` is named `KOTH_0`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotNaming {
    separator: String,
}

impl Default for SlotNaming {
    fn default() -> Self {
        Self {
            separator: "_".to_string(),
        }
    }
}

impl SlotNaming {
    pub fn new(separator: impl Into<String>) -> Self {
        Self {
            separator: separator.into(),
        }
    }

    pub fn separator(&self) -> &str {
        &self.separator
    }

    /// Returns the instance name for a slot.
    pub fn name(&self, slot: &Slot) -> String {
        format!("{}{}{}", slot.instance_type, self.separator, slot.ordinal)
    }

    /// Parses an instance name against a type catalog.
    ///
    /// The longest catalog entry that matches as a prefix wins, so `KOTH` and
    /// `KOTH_lobby` can coexist. The remainder after the separator must be a
    /// decimal ordinal without leading zeros; anything else yields `None`.
    pub fn parse<'a, I>(&self, name: &str, catalog: I) -> Option<Slot>
    where
        I: IntoIterator<Item = &'a InstanceType>,
    {
        let mut best: Option<Slot> = None;
        let mut best_len = 0;

        for instance_type in catalog {
            let Some(rest) = name.strip_prefix(instance_type.as_str()) else {
                continue;
            };
            let Some(digits) = rest.strip_prefix(self.separator.as_str()) else {
                continue;
            };
            if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
                continue;
            }
            let Ok(ordinal) = digits.parse::<u32>() else {
                continue;
            };
            // Only the canonical rendering names a slot
            if ordinal.to_string() != digits {
                continue;
            }
            if instance_type.as_str().len() >= best_len {
                best_len = instance_type.as_str().len();
                best = Some(Slot::new(instance_type.clone(), ordinal));
            }
        }

        best
    }
}

/// A backend instance as known to the host, before any probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceHandle {
    pub name: String,
    /// `None` for instances outside the managed catalog; they are probed but
    /// never selected or allocated.
    pub slot: Option<Slot>,
}

impl InstanceHandle {
    pub fn new(name: impl Into<String>, slot: Option<Slot>) -> Self {
        Self {
            name: name.into(),
            slot,
        }
    }

    /// Builds the handle for a managed slot.
    pub fn for_slot(slot: Slot, naming: &SlotNaming) -> Self {
        Self {
            name: naming.name(&slot),
            slot: Some(slot),
        }
    }
}

/// Occupancy data returned by a successful health probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeReport {
    pub online_count: u32,
    pub max_count: u32,
}

/// Point-in-time health and capacity of a reachable instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceInfo {
    pub name: String,
    pub slot: Option<Slot>,
    pub online_count: u32,
    pub max_count: u32,
}

impl InstanceInfo {
    pub fn from_probe(handle: &InstanceHandle, report: ProbeReport) -> Self {
        Self {
            name: handle.name.clone(),
            slot: handle.slot.clone(),
            online_count: report.online_count,
            max_count: report.max_count,
        }
    }

    pub fn is_full(&self) -> bool {
        self.online_count >= self.max_count
    }

    pub fn is_of_type(&self, instance_type: &InstanceType) -> bool {
        self.slot
            .as_ref()
            .is_some_and(|slot| &slot.instance_type == instance_type)
    }
}

/// Result vocabulary returned to protocol clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FleetStatus {
    /// An instance with spare capacity was found
    Transferable,
    /// Every slot of the requested type is occupied
    Full,
    /// A provisioning attempt for the type is already in flight
    Initializing,
    /// A new instance was provisioned and is starting up
    BeganInitializing,
    /// Provisioning a new instance failed
    FailedInitializing,
}

impl FleetStatus {
    /// The token carried on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Transferable => "transferable",
            Self::Full => "full",
            Self::Initializing => "initializing",
            Self::BeganInitializing => "began_initialization",
            Self::FailedInitializing => "failed_initialization",
        }
    }
}

impl fmt::Display for FleetStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FleetStatus {
    type Err = FleetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "transferable" => Ok(Self::Transferable),
            "full" => Ok(Self::Full),
            "initializing" => Ok(Self::Initializing),
            "began_initialization" => Ok(Self::BeganInitializing),
            "failed_initialization" => Ok(Self::FailedInitializing),
            other => Err(FleetError::Protocol(format!("unknown fleet status '{other}'"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> Vec<InstanceType> {
        vec![InstanceType::from("KOTH"), InstanceType::from("KOTH_lobby"), InstanceType::from("MM_lobby")]
    }

    #[test]
    fn test_slot_naming_default_separator() {
        let naming = SlotNaming::default();
        assert_eq!(naming.name(&Slot::new("KOTH", 0)), "KOTH_0");
        assert_eq!(naming.name(&Slot::new("MM_lobby", 12)), "MM_lobby_12");
    }

    #[test]
    fn test_parse_prefers_longest_type() {
        let naming = SlotNaming::default();
        let catalog = catalog();

        assert_eq!(naming.parse("KOTH_3", &catalog), Some(Slot::new("KOTH", 3)));
        assert_eq!(
            naming.parse("KOTH_lobby_1", &catalog),
            Some(Slot::new("KOTH_lobby", 1))
        );
    }

    #[test]
    fn test_parse_rejects_non_slot_names() {
        let naming = SlotNaming::default();
        let catalog = catalog();

        assert_eq!(naming.parse("KOTH", &catalog), None);
        assert_eq!(naming.parse("KOTH_", &catalog), None);
        assert_eq!(naming.parse("KOTH_x1", &catalog), None);
        assert_eq!(naming.parse("hub", &catalog), None);
        // Substring containment is not membership
        assert_eq!(naming.parse("old_KOTH_1", &catalog), None);
        assert_eq!(naming.parse("KOTH_00", &catalog), None);
        assert_eq!(naming.parse("KOTH_01", &catalog), None);
        assert_eq!(naming.parse("KOTH_10", &catalog), Some(Slot::new("KOTH", 10)));
    }

    #[test]
    fn test_parse_with_empty_separator() {
        let naming = SlotNaming::new("");
        let catalog = vec![InstanceType::from("KOTH_lobby")];
        assert_eq!(
            naming.parse("KOTH_lobby0", &catalog),
            Some(Slot::new("KOTH_lobby", 0))
        );
    }

    #[test]
    fn test_fleet_status_tokens() {
        for status in [
            FleetStatus::Transferable,
            FleetStatus::Full,
            FleetStatus::Initializing,
            FleetStatus::BeganInitializing,
            FleetStatus::FailedInitializing,
        ] {
            assert_eq!(status.as_str().parse::<FleetStatus>().unwrap(), status);
        }
        assert!("offline".parse::<FleetStatus>().is_err());
    }

    #[test]
    fn test_instance_info_capacity() {
        let handle = InstanceHandle::for_slot(Slot::new("KOTH", 0), &SlotNaming::default());
        let info = InstanceInfo::from_probe(
            &handle,
            ProbeReport {
                online_count: 8,
                max_count: 8,
            },
        );
        assert!(info.is_full());
        assert!(info.is_of_type(&InstanceType::from("KOTH")));
        assert!(!info.is_of_type(&InstanceType::from("KOTH_lobby")));
    }
}
