use serde::{Deserialize, Serialize};
use std::ops::{Add, AddAssign, Mul, MulAssign, Neg, Sub, SubAssign};

/// 2D vector for positions, velocities and movement intents.
///
/// Arena coordinates are y-down with the origin at the top-left corner.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

impl Vec2 {
    pub const ZERO: Vec2 = Vec2 { x: 0.0, y: 0.0 };

    #[inline]
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Unit vector pointing along `angle` radians.
    #[inline]
    pub fn from_angle(angle: f32) -> Self {
        Self {
            x: angle.cos(),
            y: angle.sin(),
        }
    }

    #[inline]
    pub fn length(&self) -> f32 {
        (self.x * self.x + self.y * self.y).sqrt()
    }

    #[inline]
    pub fn length_sq(&self) -> f32 {
        self.x * self.x + self.y * self.y
    }

    /// Normalized copy, or zero for a (near-)zero vector.
    pub fn normalize(&self) -> Self {
        let len = self.length();
        if len > 1e-6 {
            Self {
                x: self.x / len,
                y: self.y / len,
            }
        } else {
            Self::ZERO
        }
    }

    #[inline]
    pub fn dot(&self, other: Vec2) -> f32 {
        self.x * other.x + self.y * other.y
    }

    #[inline]
    pub fn distance_to(&self, other: Vec2) -> f32 {
        (*self - other).length()
    }

    #[inline]
    pub fn distance_sq_to(&self, other: Vec2) -> f32 {
        (*self - other).length_sq()
    }

    /// Linear interpolation toward `other` by factor `t`.
    pub fn lerp(&self, other: Vec2, t: f32) -> Self {
        *self + (other - *self) * t
    }

    /// In-place lerp, used on velocity every physics step.
    pub fn lerp_assign(&mut self, target: Vec2, t: f32) {
        self.x += (target.x - self.x) * t;
        self.y += (target.y - self.y) * t;
    }

    pub fn rotate(&self, angle: f32) -> Self {
        let (sin, cos) = angle.sin_cos();
        Self {
            x: self.x * cos - self.y * sin,
            y: self.x * sin + self.y * cos,
        }
    }

    /// Rotated 90 degrees (clockwise on a y-down screen).
    pub fn perpendicular(&self) -> Self {
        Self {
            x: -self.y,
            y: self.x,
        }
    }

    /// Reflection off a surface with unit normal `normal`.
    pub fn reflect(&self, normal: Vec2) -> Self {
        *self - normal * (2.0 * self.dot(normal))
    }

    pub fn clamp_length(&self, max: f32) -> Self {
        let len = self.length();
        if len > max && len > 0.0 {
            *self * (max / len)
        } else {
            *self
        }
    }

    /// Heading of the vector in radians.
    pub fn angle(&self) -> f32 {
        self.y.atan2(self.x)
    }

    pub fn is_near_zero(&self, epsilon: f32) -> bool {
        self.length_sq() < epsilon * epsilon
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

impl Add for Vec2 {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Self {
            x: self.x + rhs.x,
            y: self.y + rhs.y,
        }
    }
}

impl Sub for Vec2 {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Self {
            x: self.x - rhs.x,
            y: self.y - rhs.y,
        }
    }
}

impl Mul<f32> for Vec2 {
    type Output = Self;
    fn mul(self, rhs: f32) -> Self {
        Self {
            x: self.x * rhs,
            y: self.y * rhs,
        }
    }
}

impl Neg for Vec2 {
    type Output = Self;
    fn neg(self) -> Self {
        Self {
            x: -self.x,
            y: -self.y,
        }
    }
}

impl AddAssign for Vec2 {
    fn add_assign(&mut self, rhs: Self) {
        self.x += rhs.x;
        self.y += rhs.y;
    }
}

impl SubAssign for Vec2 {
    fn sub_assign(&mut self, rhs: Self) {
        self.x -= rhs.x;
        self.y -= rhs.y;
    }
}

impl MulAssign<f32> for Vec2 {
    fn mul_assign(&mut self, rhs: f32) {
        self.x *= rhs;
        self.y *= rhs;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    const EPSILON: f32 = 1e-5;

    fn approx(a: f32, b: f32) -> bool {
        (a - b).abs() < EPSILON
    }

    #[test]
    fn length_and_normalize() {
        let v = Vec2::new(3.0, 4.0);
        assert!(approx(v.length(), 5.0));
        assert!(approx(v.length_sq(), 25.0));
        let n = v.normalize();
        assert!(approx(n.length(), 1.0));
        assert!(approx(n.x, 0.6));
    }

    #[test]
    fn normalize_zero_is_zero() {
        assert_eq!(Vec2::ZERO.normalize(), Vec2::ZERO);
    }

    #[test]
    fn from_angle_matches_heading() {
        let v = Vec2::from_angle(PI / 2.0);
        assert!(approx(v.x, 0.0));
        assert!(approx(v.y, 1.0));
        assert!(approx(v.angle(), PI / 2.0));
    }

    #[test]
    fn lerp_assign_moves_toward_target() {
        let mut v = Vec2::ZERO;
        v.lerp_assign(Vec2::new(10.0, 0.0), 0.12);
        assert!(approx(v.x, 1.2));
        assert!(approx(v.y, 0.0));
    }

    #[test]
    fn reflect_inverts_normal_component() {
        let v = Vec2::new(1.0, -1.0);
        let r = v.reflect(Vec2::new(0.0, 1.0));
        assert!(approx(r.x, 1.0));
        assert!(approx(r.y, 1.0));
    }

    #[test]
    fn perpendicular_is_orthogonal() {
        let v = Vec2::new(2.0, 5.0);
        assert!(approx(v.dot(v.perpendicular()), 0.0));
    }

    #[test]
    fn clamp_length_caps_magnitude() {
        let v = Vec2::new(6.0, 8.0);
        let c = v.clamp_length(5.0);
        assert!(approx(c.length(), 5.0));
        let short = Vec2::new(1.0, 0.0).clamp_length(5.0);
        assert!(approx(short.x, 1.0));
    }

    #[test]
    fn rotate_quarter_turn() {
        let v = Vec2::new(1.0, 0.0).rotate(PI / 2.0);
        assert!(approx(v.x, 0.0));
        assert!(approx(v.y, 1.0));
    }

    #[test]
    fn operators() {
        let a = Vec2::new(1.0, 2.0);
        let b = Vec2::new(3.0, 4.0);
        assert_eq!(a + b, Vec2::new(4.0, 6.0));
        assert_eq!(b - a, Vec2::new(2.0, 2.0));
        assert_eq!(a * 2.0, Vec2::new(2.0, 4.0));
        assert_eq!(-a, Vec2::new(-1.0, -2.0));
        let mut c = a;
        c += b;
        c *= 0.5;
        assert_eq!(c, Vec2::new(2.0, 3.0));
    }
}
