//! Delta snapshot construction.
//!
//! Every broadcast period the engine captures the quantized world and
//! diffs it against the previous capture. Only tanks whose replicated
//! gameplay fields changed, shells (which always move), upgrades whose
//! collected flag flipped, and players with changed descriptors are
//! included. An empty delta suppresses the broadcast entirely.

use hashbrown::HashMap;

use crate::config::{PatchParams, TreeParams};
use crate::net::protocol::{DeltaSnapshot, FullSnapshot, UpgradeSnapshot};

/// Diff `current` against `base`. Returns `None` when nothing relevant
/// changed, so the caller can skip the emit.
pub fn build_delta(
    base: &FullSnapshot,
    current: &FullSnapshot,
    tree_params: &TreeParams,
    patch_params: &PatchParams,
) -> Option<DeltaSnapshot> {
    // Tanks: include rows whose watched fields differ, plus new tanks
    let base_tanks: HashMap<&str, _> = base.tanks.iter().map(|t| (t.id.as_str(), t)).collect();
    let tanks: Vec<_> = current
        .tanks
        .iter()
        .filter(|tank| {
            base_tanks
                .get(tank.id.as_str())
                .map_or(true, |prev| tank.gameplay_fields_differ(prev))
        })
        .cloned()
        .collect();

    // Shells always move; include the whole list when any exist. A
    // client drops shells absent from the latest delta.
    let shells = current.shells.clone();
    let shells_changed = !current.shells.is_empty() || !base.shells.is_empty();

    // Upgrades: new ones appear, vanished ones are reported collected
    let base_upgrades: HashMap<u32, &UpgradeSnapshot> =
        base.upgrades.iter().map(|u| (u.id, u)).collect();
    let current_ids: hashbrown::HashSet<u32> = current.upgrades.iter().map(|u| u.id).collect();

    let mut upgrades: Vec<UpgradeSnapshot> = current
        .upgrades
        .iter()
        .filter(|u| !base_upgrades.contains_key(&u.id))
        .cloned()
        .collect();
    for upgrade in &base.upgrades {
        if !current_ids.contains(&upgrade.id) {
            let mut collected = upgrade.clone();
            collected.collected = true;
            upgrades.push(collected);
        }
    }

    // Players: descriptor changes and joins
    let base_players: HashMap<&str, _> =
        base.players.iter().map(|p| (p.id.as_str(), p)).collect();
    let players: Vec<_> = current
        .players
        .iter()
        .filter(|player| {
            base_players
                .get(player.id.as_str())
                .map_or(true, |prev| *prev != *player)
        })
        .cloned()
        .collect();

    if tanks.is_empty() && !shells_changed && upgrades.is_empty() && players.is_empty() {
        return None;
    }

    Some(DeltaSnapshot {
        game_time: current.game_time,
        tanks,
        shells,
        upgrades,
        players,
        tree_params: tree_params.clone(),
        patch_params: patch_params.clone(),
    })
}
