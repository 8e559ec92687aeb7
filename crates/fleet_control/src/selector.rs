//! Transfer target selection.

use crate::registry::RegistrySnapshot;
use crate::types::InstanceType;

/// Picks the instance of `instance_type` a player should be sent to.
///
/// Instances at capacity are skipped. Among the rest the busiest one wins, so
/// players fill an active instance before a quiet one. Ties go to the first
/// candidate in snapshot order, which is ascending by name.
///
/// Returns `None` when no instance of the type can take another player.
pub fn select_target(instance_type: &InstanceType, snapshot: &RegistrySnapshot) -> Option<String> {
    let mut target: Option<&str> = None;
    let mut best_online: Option<u32> = None;

    for info in snapshot.iter() {
        if !info.is_of_type(instance_type) || info.is_full() {
            continue;
        }

        if best_online.map_or(true, |best| info.online_count > best) {
            target = Some(info.name.as_str());
            best_online = Some(info.online_count);
        }
    }

    target.map(str::to_string)
}
