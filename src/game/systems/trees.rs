//! Tree swing dynamics: a damped pendulum on the canopy angle plus a 2D
//! spring-damper on the foliage offset. Purely cosmetic, but replicated,
//! so the integration runs on the tick like everything else.
//!
//! Coefficients are per-step at the 60 Hz tick; `dt` is normalized to
//! step units before integration.

use crate::game::constants::{tick, tree};
use crate::game::state::{GameState, Tree};
use crate::util::vec2::Vec2;

/// Swing velocity clamp, radians per step.
const SWING_VELOCITY_MAX: f32 = 1.5;
/// Foliage velocity clamp, pixels per step.
const FOLIAGE_VELOCITY_MAX: f32 = 10.0;

/// Deposit a shell or tank impact into the tree.
///
/// `dir` is the direction the impact travels (into the tree), `force`
/// scales with the impact speed.
pub fn apply_impact(tree: &mut Tree, dir: Vec2, force: f32, now_ms: f64) {
    let scale = (force / tree::IMPULSE_FORCE_DIVISOR).min(tree::IMPULSE_MAX);
    let impact_angle = dir.angle();

    tree.swing.velocity = (tree.swing.velocity - impact_angle * scale * tree::SWING_IMPULSE)
        .clamp(-SWING_VELOCITY_MAX, SWING_VELOCITY_MAX);
    tree.foliage.velocity =
        (tree.foliage.velocity - dir * scale).clamp_length(FOLIAGE_VELOCITY_MAX);
    tree.swing.last_impact_ms = now_ms;
}

/// Speed up the pendulum for a while after a tank rams the trunk.
pub fn boost_swing(tree: &mut Tree, now_ms: f64) {
    tree.swing.boost_until_ms = now_ms + tree::BOUNCE_BOOST_MS;
    tree.swing.boost_factor = tree::BOUNCE_BOOST_FACTOR;
}

/// Advance pendulum and foliage for every tree.
pub fn update(state: &mut GameState, dt_ms: f64) {
    let now = state.game_time_ms;
    let steps = (dt_ms / tick::STEP_MS) as f32;
    for tree in &mut state.trees {
        step_tree(tree, now, steps);
    }
}

fn step_tree(tree: &mut Tree, now_ms: f64, steps: f32) {
    let active = now_ms - tree.swing.last_impact_ms < tree::ACTIVE_WINDOW_MS;

    if active {
        let boost = if now_ms < tree.swing.boost_until_ms {
            tree.swing.boost_factor
        } else {
            1.0
        };
        let gravity = tree::SWING_GRAVITY * boost;

        let angular_accel =
            -gravity * tree.swing.angle.sin() - tree::SWING_DAMPING * tree.swing.velocity;
        tree.swing.velocity += angular_accel * steps;
        tree.swing.angle =
            (tree.swing.angle + tree.swing.velocity * steps).clamp(-tree::SWING_MAX, tree::SWING_MAX);

        let spring_accel = tree.foliage.offset * -tree::FOLIAGE_STIFFNESS
            - tree.foliage.velocity * tree::FOLIAGE_DAMPING;
        tree.foliage.velocity += spring_accel * steps;
        tree.foliage.offset =
            (tree.foliage.offset + tree.foliage.velocity * steps)
                .clamp_length(tree::FOLIAGE_MAX_OFFSET);
    } else {
        tree.swing.velocity *= tree::SETTLE_VELOCITY_DECAY;
        tree.swing.angle *= tree::SETTLE_OFFSET_DECAY;
        tree.foliage.velocity *= tree::SETTLE_VELOCITY_DECAY;
        tree.foliage.offset *= tree::SETTLE_OFFSET_DECAY;

        if tree.swing.velocity.abs() < tree::REST_EPSILON
            && tree.swing.angle.abs() < tree::REST_EPSILON
        {
            tree.swing.velocity = 0.0;
            tree.swing.angle = 0.0;
        }
        if tree.foliage.velocity.is_near_zero(tree::REST_EPSILON)
            && tree.foliage.offset.is_near_zero(tree::REST_EPSILON)
        {
            tree.foliage.velocity = Vec2::ZERO;
            tree.foliage.offset = Vec2::ZERO;
        }
    }
}
