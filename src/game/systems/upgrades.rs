//! Upgrade respawn policy: after every collision pass, each upgrade kind
//! is topped back up to its configured live count.

use rand::Rng;
use std::f32::consts::TAU;

use crate::config::{UpgradeParams, UpgradeTypeParams};
use crate::game::constants::{arena, upgrade};
use crate::game::state::{GameState, Upgrade, UpgradeKind};
use crate::util::vec2::Vec2;

/// Config row for one upgrade kind.
pub fn type_params(params: &UpgradeParams, kind: UpgradeKind) -> UpgradeTypeParams {
    match kind {
        UpgradeKind::Speed => params.speed,
        UpgradeKind::Gasoline => params.gasoline,
        UpgradeKind::Rotation => params.rotation,
        UpgradeKind::Ammunition => params.ammunition,
        UpgradeKind::Kinetics => params.kinetics,
        UpgradeKind::Health => params.health,
    }
}

/// Top up every kind whose live count is below target.
pub fn respawn_pass(state: &mut GameState, params: &UpgradeParams, rng: &mut impl Rng) {
    for kind in UpgradeKind::ALL {
        let target = type_params(params, kind).count as usize;
        while state.live_upgrades(kind) < target {
            spawn_one(state, kind, rng);
        }
    }
}

fn spawn_one(state: &mut GameState, kind: UpgradeKind, rng: &mut impl Rng) {
    let position = find_clear_position(state, rng);
    let id = state.next_decor_id();
    let rotation = rng.gen_range(0.0..TAU);
    state.upgrades.push(Upgrade::new(id, kind, position, rotation));
}

/// Random position at least `SPAWN_CLEARANCE` from every tree, tank and
/// upgrade. After `SPAWN_ATTEMPTS` failures the constraint is waived so
/// a crowded arena still gets its pickups.
fn find_clear_position(state: &GameState, rng: &mut impl Rng) -> Vec2 {
    let clearance_sq = upgrade::SPAWN_CLEARANCE * upgrade::SPAWN_CLEARANCE;

    for _ in 0..upgrade::SPAWN_ATTEMPTS {
        let candidate = random_position(rng);

        let blocked = state
            .trees
            .iter()
            .any(|t| t.position.distance_sq_to(candidate) < clearance_sq)
            || state
                .tanks
                .values()
                .any(|t| t.position.distance_sq_to(candidate) < clearance_sq)
            || state
                .upgrades
                .iter()
                .any(|u| u.position.distance_sq_to(candidate) < clearance_sq);

        if !blocked {
            return candidate;
        }
    }
    random_position(rng)
}

fn random_position(rng: &mut impl Rng) -> Vec2 {
    let margin = upgrade::SIZE;
    Vec2::new(
        rng.gen_range(margin..arena::WIDTH - margin),
        rng.gen_range(margin..arena::HEIGHT - margin),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AttributeLimits;
    use crate::game::state::{Tank, Tree};
    use uuid::Uuid;

    #[test]
    fn pass_tops_up_every_kind() {
        let mut state = GameState::new();
        let params = UpgradeParams::default();
        let mut rng = rand::thread_rng();

        respawn_pass(&mut state, &params, &mut rng);

        for kind in UpgradeKind::ALL {
            assert_eq!(
                state.live_upgrades(kind),
                type_params(&params, kind).count as usize
            );
        }
    }

    #[test]
    fn pass_is_idempotent_at_target() {
        let mut state = GameState::new();
        let params = UpgradeParams::default();
        let mut rng = rand::thread_rng();

        respawn_pass(&mut state, &params, &mut rng);
        let count = state.upgrades.len();
        respawn_pass(&mut state, &params, &mut rng);
        assert_eq!(state.upgrades.len(), count);
    }

    #[test]
    fn spawns_keep_clear_of_obstacles() {
        let mut state = GameState::new();
        let limits = AttributeLimits::default();
        let id = Uuid::new_v4();
        state
            .tanks
            .insert(id, Tank::new(id, Vec2::new(750.0, 450.0), false, &limits));
        state
            .trees
            .push(Tree::new(0, Vec2::new(400.0, 300.0), 48.0, 0, 0.0));

        let params = UpgradeParams::default();
        let mut rng = rand::thread_rng();
        respawn_pass(&mut state, &params, &mut rng);

        // Sparse arena: the clearance rule should always be satisfiable
        for u in &state.upgrades {
            assert!(u.position.distance_to(Vec2::new(750.0, 450.0)) >= upgrade::SPAWN_CLEARANCE);
            assert!(u.position.distance_to(Vec2::new(400.0, 300.0)) >= upgrade::SPAWN_CLEARANCE);
        }
    }

    #[test]
    fn replaces_collected_upgrades() {
        let mut state = GameState::new();
        let params = UpgradeParams::default();
        let mut rng = rand::thread_rng();
        respawn_pass(&mut state, &params, &mut rng);

        // Simulate a pickup: one SPEED upgrade disappears
        let idx = state
            .upgrades
            .iter()
            .position(|u| u.kind == UpgradeKind::Speed)
            .unwrap();
        state.upgrades.remove(idx);
        assert_eq!(
            state.live_upgrades(UpgradeKind::Speed),
            type_params(&params, UpgradeKind::Speed).count as usize - 1
        );

        respawn_pass(&mut state, &params, &mut rng);
        assert_eq!(
            state.live_upgrades(UpgradeKind::Speed),
            type_params(&params, UpgradeKind::Speed).count as usize
        );
    }

    #[test]
    fn upgrade_ids_stay_unique_across_respawns() {
        let mut state = GameState::new();
        let params = UpgradeParams::default();
        let mut rng = rand::thread_rng();
        respawn_pass(&mut state, &params, &mut rng);
        state.upgrades.clear();
        respawn_pass(&mut state, &params, &mut rng);

        let mut ids: Vec<u32> = state.upgrades.iter().map(|u| u.id).collect();
        let len = ids.len();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), len);
    }
}
