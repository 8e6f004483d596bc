//! Shell firing, flight and culling.
//!
//! Shells are pooled: destruction anywhere in the tick must hand the
//! instance back through [`destroy`] or [`cull_outside`] so the pool
//! stays primed.

use crate::config::GameParams;
use crate::game::constants::shell;
use crate::game::state::{GameState, PlayerId, Shell};
use crate::util::pool::Pool;

/// Attempt to fire the tank's cannon.
///
/// Firing requires the tank to be alive with ammunition and a cold
/// barrel; refused attempts are valid domain outcomes and return false
/// silently.
pub fn try_fire(
    state: &mut GameState,
    pool: &mut Pool<Shell>,
    shooter: PlayerId,
    params: &GameParams,
) -> bool {
    let now = state.game_time_ms;
    let shell_id = {
        let Some(tank) = state.tanks.get(&shooter) else {
            return false;
        };
        if !tank.can_shoot() {
            return false;
        }
        state.next_shell_id()
    };

    let tank = state
        .tanks
        .get_mut(&shooter)
        .expect("tank checked above");
    tank.attributes.ammunition -= 1.0;
    tank.timers.reload_ms = params.reload_time;
    tank.timers.last_shot_ms = now;
    tank.timers.firing_immunity_until = now + shell::FIRING_IMMUNITY_MS;

    let facing = tank.facing();
    let muzzle = tank.position + facing * shell::MUZZLE_OFFSET;
    let velocity = facing * tank.attributes.kinetics;
    let immunity_until = tank.timers.firing_immunity_until;

    let mut round = pool.acquire(Shell::default);
    round.reset(shell_id, shooter, muzzle, velocity, now, immunity_until);
    state.shells.push(round);
    true
}

/// Integrate every shell and refresh its bounds.
pub fn integrate(state: &mut GameState, dt_ms: f64) {
    let dt_s = (dt_ms / 1000.0) as f32;
    for round in &mut state.shells {
        round.position += round.velocity * dt_s;
        round.refresh_bounds();
    }
}

/// Remove a shell by list index, returning it to the pool.
pub fn destroy(state: &mut GameState, pool: &mut Pool<Shell>, index: usize) {
    let round = state.shells.swap_remove(index);
    pool.release(round);
}

/// Drop every shell that has left the arena.
pub fn cull_outside(state: &mut GameState, pool: &mut Pool<Shell>) -> usize {
    let mut culled = 0;
    let mut i = 0;
    while i < state.shells.len() {
        if state.shells[i].is_outside_arena() {
            let round = state.shells.swap_remove(i);
            pool.release(round);
            culled += 1;
        } else {
            i += 1;
        }
    }
    culled
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AttributeLimits;
    use crate::game::state::Tank;
    use crate::util::vec2::Vec2;
    use uuid::Uuid;

    fn state_with_tank(position: Vec2, angle: f32) -> (GameState, Uuid) {
        let mut state = GameState::new();
        let limits = AttributeLimits::default();
        let id = Uuid::new_v4();
        let mut tank = Tank::new(id, position, false, &limits);
        tank.angle = angle;
        state.tanks.insert(id, tank);
        (state, id)
    }

    #[test]
    fn firing_spawns_shell_at_the_muzzle() {
        let (mut state, id) = state_with_tank(Vec2::new(500.0, 450.0), 0.0);
        let mut pool = Pool::with_capacity(16);
        let params = GameParams::default();
        let ammo_before = state.tank(id).unwrap().attributes.ammunition;

        assert!(try_fire(&mut state, &mut pool, id, &params));

        let tank = state.tank(id).unwrap();
        assert_eq!(tank.attributes.ammunition, ammo_before - 1.0);
        assert_eq!(tank.timers.reload_ms, params.reload_time);

        assert_eq!(state.shells.len(), 1);
        let round = &state.shells[0];
        assert_eq!(round.position, Vec2::new(520.0, 450.0));
        assert_eq!(round.velocity, Vec2::new(tank.attributes.kinetics, 0.0));
        assert_eq!(round.shooter, id);
        assert_eq!(
            round.shooter_immunity_until,
            state.game_time_ms + shell::FIRING_IMMUNITY_MS
        );
    }

    #[test]
    fn reload_blocks_consecutive_shots() {
        let (mut state, id) = state_with_tank(Vec2::new(500.0, 450.0), 0.0);
        let mut pool = Pool::with_capacity(16);
        let params = GameParams::default();

        assert!(try_fire(&mut state, &mut pool, id, &params));
        assert!(!try_fire(&mut state, &mut pool, id, &params));

        // Cool the barrel and fire again
        state.tanks.get_mut(&id).unwrap().timers.reload_ms = 0.0;
        assert!(try_fire(&mut state, &mut pool, id, &params));
        assert_eq!(state.shells.len(), 2);
    }

    #[test]
    fn dead_or_dry_tanks_cannot_fire() {
        let (mut state, id) = state_with_tank(Vec2::new(500.0, 450.0), 0.0);
        let mut pool = Pool::with_capacity(16);
        let params = GameParams::default();

        state.tanks.get_mut(&id).unwrap().attributes.ammunition = 0.0;
        assert!(!try_fire(&mut state, &mut pool, id, &params));

        state.tanks.get_mut(&id).unwrap().attributes.ammunition = 5.0;
        state.tanks.get_mut(&id).unwrap().alive = false;
        assert!(!try_fire(&mut state, &mut pool, id, &params));
    }

    #[test]
    fn shells_integrate_along_their_velocity() {
        let (mut state, id) = state_with_tank(Vec2::new(500.0, 450.0), 0.0);
        let mut pool = Pool::with_capacity(16);
        try_fire(&mut state, &mut pool, id, &GameParams::default());

        let kinetics = state.tank(id).unwrap().attributes.kinetics;
        integrate(&mut state, 1000.0);
        let round = &state.shells[0];
        assert!((round.position.x - (520.0 + kinetics)).abs() < 1e-3);
        assert!(round.bounds.contains_point(round.position));
    }

    #[test]
    fn culling_releases_to_the_pool() {
        let (mut state, id) = state_with_tank(Vec2::new(1480.0, 450.0), 0.0);
        let mut pool = Pool::with_capacity(16);
        try_fire(&mut state, &mut pool, id, &GameParams::default());

        // Fly it out of the arena
        integrate(&mut state, 2000.0);
        assert!(state.shells[0].is_outside_arena());

        let culled = cull_outside(&mut state, &mut pool);
        assert_eq!(culled, 1);
        assert!(state.shells.is_empty());
        assert_eq!(pool.free_count(), 1);
    }

    #[test]
    fn shell_ids_are_unique() {
        let (mut state, id) = state_with_tank(Vec2::new(500.0, 450.0), 0.0);
        let mut pool = Pool::with_capacity(16);
        let params = GameParams::default();
        for _ in 0..3 {
            state.tanks.get_mut(&id).unwrap().timers.reload_ms = 0.0;
            assert!(try_fire(&mut state, &mut pool, id, &params));
        }
        let mut ids: Vec<_> = state.shells.iter().map(|s| s.id).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), 3);
    }
}
