//! Tank kinematics.
//!
//! Tanks are direction-locked: the movement intent only selects a target
//! heading and speed, and the hull can move along its current facing
//! only. Rotation is capped by the rotation attribute, so a heavy intent
//! change plays out as a visible turning arc.

use rand::Rng;

use crate::config::GameSettings;
use crate::game::constants::{arena, tank};
use crate::game::state::{random_tank_position, GameState, Tank, Tree};
use crate::game::systems::trees;
use crate::util::angle;
use crate::util::vec2::Vec2;

/// Advance every tank by one step.
pub fn update(state: &mut GameState, settings: &GameSettings, dt_ms: f64, rng: &mut impl Rng) {
    let GameState {
        tanks,
        trees,
        game_time_ms,
        ..
    } = state;
    let now = *game_time_ms;

    for tank_entity in tanks.values_mut() {
        update_tank(tank_entity, trees, settings, now, dt_ms, rng);
    }
}

fn update_tank(
    tank_entity: &mut Tank,
    arena_trees: &mut [Tree],
    settings: &GameSettings,
    now: f64,
    dt_ms: f64,
    rng: &mut impl Rng,
) {
    if !tank_entity.alive {
        tank_entity.timers.respawn_ms -= dt_ms;
        if tank_entity.timers.respawn_ms <= 0.0 {
            let position = random_tank_position(rng);
            tank_entity.respawn(position, &settings.attribute_limits);
        }
        return;
    }

    tank_entity.timers.reload_ms -= dt_ms;

    let dt_s = (dt_ms / 1000.0) as f32;
    let attrs = tank_entity.attributes;

    let intent = tank_entity.target_velocity;
    if !intent.is_near_zero(tank::INTENT_EPSILON) {
        // Rotate toward the intent heading, capped by the rotation attribute
        let target_angle = intent.angle();
        let max_step = attrs.rotation * tank::TURN_RATE_SCALE * dt_s;
        tank_entity.angle = angle::rotate_toward(
            tank_entity.angle,
            target_angle,
            max_step,
            tank::TURN_DEADZONE,
        );

        // Intent magnitude caps desired speed; empty gasoline slows it further
        let desired_speed = intent.length().min(attrs.speed);
        let effective_speed = if attrs.gasoline <= 0.0 {
            desired_speed * settings.game_params.gasoline_speed_penalty
        } else {
            desired_speed
        };

        // Project the intent onto the facing: tanks only move along
        // their heading, forward or in reverse
        let facing = tank_entity.facing();
        let dir = intent.normalize();
        let dot = facing.dot(dir);
        let target_velocity = facing * (dot * effective_speed);
        tank_entity
            .velocity
            .lerp_assign(target_velocity, tank::VELOCITY_LERP);
    } else {
        tank_entity.velocity *= tank::IDLE_FRICTION;
        if tank_entity.velocity.length() < tank::REST_SPEED {
            tank_entity.velocity = Vec2::ZERO;
        }
    }

    let before = tank_entity.position;
    tank_entity.position += tank_entity.velocity * dt_s;

    resolve_tree_bounce(tank_entity, arena_trees, now);

    // Gasoline burns with distance actually covered
    let moved = tank_entity.position.distance_to(before);
    tank_entity.attributes.gasoline =
        (tank_entity.attributes.gasoline - moved * settings.game_params.gasoline_per_unit).max(0.0);

    tank_entity.position.x = tank_entity
        .position
        .x
        .clamp(arena::TANK_MARGIN, arena::WIDTH - arena::TANK_MARGIN);
    tank_entity.position.y = tank_entity
        .position
        .y
        .clamp(arena::TANK_MARGIN, arena::HEIGHT - arena::TANK_MARGIN);

    update_recoil(tank_entity, now);
    tank_entity.refresh_bounds();
}

/// Continuous circle-vs-trunk resolution. The hull is a 20 px circle,
/// the trunk a `size/16` circle half a size above the tree anchor.
fn resolve_tree_bounce(tank_entity: &mut Tank, arena_trees: &mut [Tree], now: f64) {
    for tree in arena_trees.iter_mut() {
        let trunk = tree.trunk_center();
        let min_dist = tank::BODY_RADIUS + tree.trunk_radius();
        let delta = tank_entity.position - trunk;
        let dist_sq = delta.length_sq();
        if dist_sq >= min_dist * min_dist || dist_sq == 0.0 {
            continue;
        }

        let dist = dist_sq.sqrt();
        let normal = delta * (1.0 / dist);

        // Separate along the contact normal
        tank_entity.position = trunk + normal * min_dist;

        // Reflect the inward component, then shave friction off both
        let inward = tank_entity.velocity.dot(normal);
        if inward < 0.0 {
            let tangential = tank_entity.velocity - normal * inward;
            tank_entity.velocity = (tangential + normal * (-inward * tank::TREE_RESTITUTION))
                * tank::TREE_FRICTION;

            let impact_force = -inward;
            trees::apply_impact(tree, -normal, impact_force, now);
            trees::boost_swing(tree, now);
        }
    }
}

/// Ease-out cubic over `[0, 1]`.
fn ease_out_cubic(t: f32) -> f32 {
    let inv = 1.0 - t;
    1.0 - inv * inv * inv
}

/// Recoil animation driven from the time since the last shot: body and
/// turret kick back and return over one second, with a small sinusoidal
/// turret pendulum on top. Advisory state only.
fn update_recoil(tank_entity: &mut Tank, now: f64) {
    let elapsed = now - tank_entity.timers.last_shot_ms;
    if !(0.0..tank::RECOIL_DURATION_MS).contains(&elapsed) {
        tank_entity.recoil = Default::default();
        return;
    }
    let t = (elapsed / tank::RECOIL_DURATION_MS) as f32;
    let settle = 1.0 - ease_out_cubic(t);
    tank_entity.recoil.body_offset = tank::RECOIL_BODY_OFFSET * settle;
    tank_entity.recoil.turret_offset = tank::RECOIL_TURRET_OFFSET * settle;
    tank_entity.recoil.turret_swing =
        (t * std::f32::consts::TAU * 2.0).sin() * tank::RECOIL_SWING * settle;
}
