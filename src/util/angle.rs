//! Angle helpers for tank heading updates.
//!
//! Headings live in `[0, 2π)`; turning always takes the shortest arc and
//! is capped by the tank's rotation attribute.

use std::f32::consts::TAU;

/// Normalize an angle into `[0, 2π)`.
pub fn wrap(angle: f32) -> f32 {
    let wrapped = angle % TAU;
    if wrapped < 0.0 {
        wrapped + TAU
    } else {
        wrapped
    }
}

/// Signed shortest difference `target - current`, in `(-π, π]`.
pub fn shortest_diff(current: f32, target: f32) -> f32 {
    let mut diff = (target - current) % TAU;
    if diff > std::f32::consts::PI {
        diff -= TAU;
    } else if diff <= -std::f32::consts::PI {
        diff += TAU;
    }
    diff
}

/// Rotate `current` toward `target` by at most `max_step` radians.
///
/// Differences below `deadzone` are left untouched so a tank settles
/// instead of oscillating around its target heading.
pub fn rotate_toward(current: f32, target: f32, max_step: f32, deadzone: f32) -> f32 {
    let diff = shortest_diff(current, target);
    if diff.abs() < deadzone {
        return wrap(current);
    }
    let step = diff.abs().min(max_step).copysign(diff);
    wrap(current + step)
}
