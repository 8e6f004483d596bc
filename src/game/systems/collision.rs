//! Collision and damage resolution.
//!
//! Runs after kinematics and shell integration, against the bounds those
//! phases produced. Shells resolve first (tank hits, then tree hits),
//! upgrades second, so a tank destroyed by a shell never collects a
//! pickup in the same step.

use crate::config::GameSettings;
use crate::game::constants::{arena, shell as shell_consts, upgrade as upgrade_consts};
use crate::game::spatial::{SpatialEntry, SpatialId, SpatialIndex};
use crate::game::state::{GameState, PlayerId, Shell, UpgradeKind};
use crate::game::systems::trees;
use crate::game::systems::upgrades::type_params;
use crate::util::bounds::Aabb;
use crate::util::pool::Pool;

/// A shell hit that actually applied damage.
#[derive(Debug, Clone)]
pub struct DamageEvent {
    pub target: PlayerId,
    pub shooter: PlayerId,
    pub fatal: bool,
}

/// A pickup collected this step.
#[derive(Debug, Clone)]
pub struct PickupEvent {
    pub tank: PlayerId,
    pub kind: UpgradeKind,
}

/// Everything the collision pass reports back to the tick supervisor.
#[derive(Debug, Default)]
pub struct CollisionEvents {
    pub damage: Vec<DamageEvent>,
    pub pickups: Vec<PickupEvent>,
}

fn world_bounds() -> Aabb {
    Aabb::new(0.0, 0.0, arena::WIDTH, arena::HEIGHT)
}

/// Build the broad-phase index from every live entity with bounds.
fn build_index(state: &GameState) -> SpatialIndex {
    let mut entries: Vec<SpatialEntry> = Vec::with_capacity(
        state.tanks.len() + state.shells.len() + state.trees.len() + state.upgrades.len(),
    );
    for tank in state.tanks.values().filter(|t| t.alive) {
        entries.push(SpatialEntry {
            id: SpatialId::Tank(tank.id),
            bounds: tank.bounds,
        });
    }
    for round in &state.shells {
        entries.push(SpatialEntry {
            id: SpatialId::Shell(round.id),
            bounds: round.bounds,
        });
    }
    for tree in &state.trees {
        entries.push(SpatialEntry {
            id: SpatialId::Tree(tree.id),
            bounds: tree.trunk_bounds(),
        });
    }
    for upgrade in state.upgrades.iter().filter(|u| !u.collected) {
        entries.push(SpatialEntry {
            id: SpatialId::Upgrade(upgrade.id),
            bounds: upgrade.bounds,
        });
    }
    SpatialIndex::build(world_bounds(), entries)
}

/// Run the full collision pass for this step.
pub fn resolve(
    state: &mut GameState,
    settings: &GameSettings,
    pool: &mut Pool<Shell>,
) -> CollisionEvents {
    let index = build_index(state);
    let mut events = CollisionEvents::default();

    resolve_shells(state, settings, pool, &index, &mut events);
    resolve_pickups(state, settings, &mut events);

    events
}

fn resolve_shells(
    state: &mut GameState,
    settings: &GameSettings,
    pool: &mut Pool<Shell>,
    index: &SpatialIndex,
    events: &mut CollisionEvents,
) {
    let now = state.game_time_ms;

    // Reverse iteration keeps swap_remove safe mid-loop
    let mut i = state.shells.len();
    while i > 0 {
        i -= 1;

        let (shell_id, shell_bounds, shell_pos, shell_vel, shooter, shell_immunity) = {
            let round = &state.shells[i];
            (
                round.id,
                round.bounds,
                round.position,
                round.velocity,
                round.shooter,
                round.shooter_immunity_until,
            )
        };
        let exclude = Some(SpatialId::Shell(shell_id));

        // Tank hits first
        let mut destroyed = false;
        let candidates = index.query(&shell_bounds, shell_consts::TANK_SEARCH_RADIUS, exclude);
        for candidate in &candidates {
            let SpatialId::Tank(tank_id) = candidate.id else {
                continue;
            };
            let Some(tank) = state.tanks.get(&tank_id) else {
                continue;
            };
            if !tank.alive {
                continue;
            }

            let overlap = tank.bounds.intersects(&shell_bounds);
            // Anti-tunneling: a fast shell that stepped over the hull
            // still counts when it passes close to the center
            let grazed = !overlap
                && shell_vel.length() > shell_consts::FAST_SPEED
                && tank.position.distance_to(shell_pos) <= shell_consts::FAST_HIT_DISTANCE;
            if !overlap && !grazed {
                continue;
            }

            // Damage gates: firing immunity on the target, and a shell
            // cannot hurt its own shooter inside its immunity window
            if now < tank.timers.firing_immunity_until {
                continue;
            }
            if shooter == tank_id && now < shell_immunity {
                continue;
            }

            let tank = state.tanks.get_mut(&tank_id).expect("checked above");
            let fatal = tank.apply_damage(&settings.damage_params, &settings.attribute_limits);
            if fatal {
                tank.die(settings.game_params.respawn_time);
            }
            events.damage.push(DamageEvent {
                target: tank_id,
                shooter,
                fatal,
            });

            crate::game::systems::shells::destroy(state, pool, i);
            destroyed = true;
            break;
        }
        if destroyed {
            continue;
        }

        // Tree hits
        let candidates = index.query(&shell_bounds, shell_consts::TREE_SEARCH_RADIUS, exclude);
        for candidate in &candidates {
            let SpatialId::Tree(tree_id) = candidate.id else {
                continue;
            };
            let Some(tree) = state.trees.iter_mut().find(|t| t.id == tree_id) else {
                continue;
            };
            if !tree.trunk_bounds().intersects(&shell_bounds) {
                continue;
            }

            let dir = shell_vel.normalize();
            trees::apply_impact(tree, dir, shell_vel.length(), now);
            crate::game::systems::shells::destroy(state, pool, i);
            break;
        }
    }
}

/// Two-stage pickup test: broad AABB overlap, then a center-distance
/// check sized by the tank footprint.
fn resolve_pickups(state: &mut GameState, settings: &GameSettings, events: &mut CollisionEvents) {
    let GameState {
        tanks, upgrades, ..
    } = state;

    for tank in tanks.values_mut().filter(|t| t.alive) {
        let reach = tank.collision_width.max(tank.collision_height) / 2.0
            + upgrade_consts::RADIUS
            + upgrade_consts::PICKUP_SLACK;

        for upgrade in upgrades.iter_mut().filter(|u| !u.collected) {
            if !tank.bounds.intersects(&upgrade.bounds) {
                continue;
            }
            if tank.position.distance_to(upgrade.position) > reach {
                continue;
            }

            let kind = upgrade.kind;
            let attr = kind.attribute();
            let value = type_params(&settings.upgrade_types, kind).value;
            let max = crate::game::state::limit_of(&settings.attribute_limits, attr).max;
            let current = tank.attributes.get(attr);
            tank.attributes.set(attr, (current + value).min(max));

            upgrade.collected = true;
            events.pickups.push(PickupEvent { tank: tank.id, kind });
        }
    }

    // Collected upgrades are pending removal; drop them now
    upgrades.retain(|u| !u.collected);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AttributeLimits;
    use crate::game::constants::tick::STEP_MS;
    use crate::game::state::{Tank, Tree, Upgrade};
    use crate::game::systems::shells;
    use crate::util::vec2::Vec2;
    use uuid::Uuid;

    fn state_with_tanks(positions: &[Vec2]) -> (GameState, Vec<Uuid>) {
        let mut state = GameState::new();
        let limits = AttributeLimits::default();
        let ids: Vec<Uuid> = positions
            .iter()
            .map(|&p| {
                let id = Uuid::new_v4();
                state.tanks.insert(id, Tank::new(id, p, false, &limits));
                id
            })
            .collect();
        (state, ids)
    }

    fn fire_at(state: &mut GameState, pool: &mut Pool<Shell>, shooter: Uuid) {
        assert!(shells::try_fire(
            state,
            pool,
            shooter,
            &crate::config::GameParams::default()
        ));
    }

    #[test]
    fn shell_damages_tank_and_is_destroyed() {
        let cfg = GameSettings::default();
        let (mut state, ids) =
            state_with_tanks(&[Vec2::new(500.0, 450.0), Vec2::new(600.0, 450.0)]);
        let mut pool = Pool::with_capacity(16);
        fire_at(&mut state, &mut pool, ids[0]);

        // Fly the shell until the collision pass reports a hit
        let health_before = state.tank(ids[1]).unwrap().attributes.health;
        let mut hit = false;
        for _ in 0..120 {
            state.game_time_ms += STEP_MS;
            shells::integrate(&mut state, STEP_MS);
            let events = resolve(&mut state, &cfg, &mut pool);
            if !events.damage.is_empty() {
                assert_eq!(events.damage[0].target, ids[1]);
                assert_eq!(events.damage[0].shooter, ids[0]);
                hit = true;
                break;
            }
        }
        assert!(hit, "shell never hit the target");
        assert!(state.shells.is_empty(), "shell must be destroyed on hit");
        assert_eq!(
            state.tank(ids[1]).unwrap().attributes.health,
            health_before - cfg.damage_params.health
        );
    }

    #[test]
    fn shooter_is_immune_to_its_own_fresh_shell() {
        let cfg = GameSettings::default();
        let (mut state, ids) = state_with_tanks(&[Vec2::new(500.0, 450.0)]);
        let mut pool = Pool::with_capacity(16);
        fire_at(&mut state, &mut pool, ids[0]);

        // Park the shell on top of the shooter while immunity is fresh
        state.shells[0].position = state.tank(ids[0]).unwrap().position;
        state.shells[0].refresh_bounds();
        let events = resolve(&mut state, &cfg, &mut pool);
        assert!(events.damage.is_empty());
        assert_eq!(state.shells.len(), 1, "immune hit must not destroy the shell");
    }

    #[test]
    fn target_firing_immunity_blocks_damage() {
        let cfg = GameSettings::default();
        let (mut state, ids) =
            state_with_tanks(&[Vec2::new(500.0, 450.0), Vec2::new(540.0, 450.0)]);
        let mut pool = Pool::with_capacity(16);
        state.game_time_ms = 1000.0;

        // Target has just fired: immune for the window
        state.tanks.get_mut(&ids[1]).unwrap().timers.firing_immunity_until = 1150.0;
        fire_at(&mut state, &mut pool, ids[0]);
        state.shells[0].position = Vec2::new(540.0, 450.0);
        state.shells[0].refresh_bounds();

        let events = resolve(&mut state, &cfg, &mut pool);
        assert!(events.damage.is_empty());

        // Window expires, the same overlap now lands
        state.game_time_ms = 1200.0;
        let events = resolve(&mut state, &cfg, &mut pool);
        assert_eq!(events.damage.len(), 1);
    }

    #[test]
    fn fast_shell_hits_via_proximity_fallback() {
        let cfg = GameSettings::default();
        let (mut state, ids) =
            state_with_tanks(&[Vec2::new(100.0, 100.0), Vec2::new(600.0, 450.0)]);
        let mut pool = Pool::with_capacity(16);
        state.game_time_ms = 5000.0;
        fire_at(&mut state, &mut pool, ids[0]);

        // Park the shell near the target center but clear of its AABB:
        // hull half-height is 15, shell half-size 3, so 19 px below the
        // center there is no overlap while the center distance is <= 20
        state.shells[0].position = Vec2::new(600.0, 450.0 + 19.0);
        state.shells[0].refresh_bounds();

        let events = resolve(&mut state, &cfg, &mut pool);
        assert_eq!(events.damage.len(), 1, "proximity fallback should land");
    }

    #[test]
    fn fatal_hit_kills_and_sets_respawn_timer() {
        let mut cfg = GameSettings::default();
        cfg.damage_params.health = 100.0;
        let (mut state, ids) =
            state_with_tanks(&[Vec2::new(500.0, 450.0), Vec2::new(540.0, 450.0)]);
        let mut pool = Pool::with_capacity(16);
        state.game_time_ms = 1000.0;
        fire_at(&mut state, &mut pool, ids[0]);
        state.shells[0].position = Vec2::new(540.0, 450.0);
        state.shells[0].refresh_bounds();

        let events = resolve(&mut state, &cfg, &mut pool);
        assert!(events.damage[0].fatal);
        let target = state.tank(ids[1]).unwrap();
        assert!(!target.alive);
        assert_eq!(target.timers.respawn_ms, cfg.game_params.respawn_time);
        assert_eq!(target.velocity, Vec2::ZERO);
    }

    #[test]
    fn shell_hitting_trunk_swings_the_tree() {
        let cfg = GameSettings::default();
        let (mut state, ids) = state_with_tanks(&[Vec2::new(100.0, 466.0)]);
        let mut pool = Pool::with_capacity(16);
        state.trees.push(Tree::new(0, Vec2::new(300.0, 482.0), 32.0, 0, 0.0));
        // Trunk center is (300, 466); fire straight at it
        fire_at(&mut state, &mut pool, ids[0]);

        let mut impacted = false;
        for _ in 0..120 {
            state.game_time_ms += STEP_MS;
            shells::integrate(&mut state, STEP_MS);
            resolve(&mut state, &cfg, &mut pool);
            if state.shells.is_empty() {
                impacted = true;
                break;
            }
        }
        assert!(impacted, "shell should be absorbed by the trunk");
        assert!(state.trees[0].swing.velocity != 0.0);
    }

    #[test]
    fn pickup_applies_value_clamped_to_max() {
        let cfg = GameSettings::default();
        let (mut state, ids) = state_with_tanks(&[Vec2::new(380.0, 400.0)]);
        state.tanks.get_mut(&ids[0]).unwrap().attributes.speed = 30.0;
        state
            .upgrades
            .push(Upgrade::new(0, UpgradeKind::Speed, Vec2::new(400.0, 400.0), 0.0));

        let mut pool = Pool::with_capacity(4);
        let events = resolve(&mut state, &cfg, &mut pool);

        assert_eq!(events.pickups.len(), 1);
        assert_eq!(events.pickups[0].kind, UpgradeKind::Speed);
        // 30 + 20 clamps to the 50 maximum
        assert_eq!(
            state.tank(ids[0]).unwrap().attributes.speed,
            cfg.attribute_limits.speed.max
        );
        assert!(state.upgrades.is_empty(), "collected upgrade is removed");
    }

    #[test]
    fn distant_upgrade_is_not_collected() {
        let cfg = GameSettings::default();
        let (mut state, _ids) = state_with_tanks(&[Vec2::new(380.0, 400.0)]);
        state
            .upgrades
            .push(Upgrade::new(0, UpgradeKind::Health, Vec2::new(700.0, 400.0), 0.0));

        let mut pool = Pool::with_capacity(4);
        let events = resolve(&mut state, &cfg, &mut pool);
        assert!(events.pickups.is_empty());
        assert_eq!(state.upgrades.len(), 1);
    }

    #[test]
    fn dead_tanks_collect_nothing() {
        let cfg = GameSettings::default();
        let (mut state, ids) = state_with_tanks(&[Vec2::new(400.0, 400.0)]);
        state.tanks.get_mut(&ids[0]).unwrap().die(5000.0);
        state
            .upgrades
            .push(Upgrade::new(0, UpgradeKind::Ammunition, Vec2::new(400.0, 400.0), 0.0));

        let mut pool = Pool::with_capacity(4);
        let events = resolve(&mut state, &cfg, &mut pool);
        assert!(events.pickups.is_empty());
    }
}
