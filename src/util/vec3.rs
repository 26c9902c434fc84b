use serde::{Deserialize, Serialize};
use std::ops::{Add, AddAssign, Div, Mul, MulAssign, Neg, Sub, SubAssign};

/// 3D vector for road geometry and vehicle physics (y is up)
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub const ZERO: Vec3 = Vec3 { x: 0.0, y: 0.0, z: 0.0 };
    pub const ONE: Vec3 = Vec3 { x: 1.0, y: 1.0, z: 1.0 };
    pub const UP: Vec3 = Vec3 { x: 0.0, y: 1.0, z: 0.0 };
    pub const RIGHT: Vec3 = Vec3 { x: 1.0, y: 0.0, z: 0.0 };
    pub const FORWARD: Vec3 = Vec3 { x: 0.0, y: 0.0, z: 1.0 };

    #[inline]
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    #[inline]
    pub const fn splat(v: f32) -> Self {
        Self { x: v, y: v, z: v }
    }

    #[inline]
    pub fn length(&self) -> f32 {
        self.length_sq().sqrt()
    }

    #[inline]
    pub fn length_sq(&self) -> f32 {
        self.x * self.x + self.y * self.y + self.z * self.z
    }

    pub fn normalize(&self) -> Self {
        let len = self.length();
        if len > 0.0 {
            *self / len
        } else {
            Self::ZERO
        }
    }

    /// Returns normalized vector and original length
    pub fn normalize_with_length(&self) -> (Self, f32) {
        let len = self.length();
        if len > 0.0 {
            (*self / len, len)
        } else {
            (Self::ZERO, 0.0)
        }
    }

    /// Normalize, falling back to `fallback` for (near) zero vectors
    pub fn normalize_or(&self, fallback: Vec3) -> Self {
        let len_sq = self.length_sq();
        if len_sq > 1e-12 {
            *self / len_sq.sqrt()
        } else {
            fallback
        }
    }

    #[inline]
    pub fn dot(&self, other: Vec3) -> f32 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    #[inline]
    pub fn cross(&self, other: Vec3) -> Vec3 {
        Vec3 {
            x: self.y * other.z - self.z * other.y,
            y: self.z * other.x - self.x * other.z,
            z: self.x * other.y - self.y * other.x,
        }
    }

    #[inline]
    pub fn distance_to(&self, other: Vec3) -> f32 {
        (*self - other).length()
    }

    #[inline]
    pub fn distance_sq_to(&self, other: Vec3) -> f32 {
        (*self - other).length_sq()
    }

    pub fn clamp_length(&self, max: f32) -> Self {
        let len = self.length();
        if len > max && len > 0.0 {
            *self * (max / len)
        } else {
            *self
        }
    }

    pub fn lerp(&self, other: Vec3, t: f32) -> Self {
        *self + (other - *self) * t
    }

    /// Remove the component along `axis` (which must be unit length)
    pub fn reject_from(&self, axis: Vec3) -> Self {
        *self - axis * self.dot(axis)
    }

    /// Component by axis index (0 = x, 1 = y, 2 = z)
    #[inline]
    pub fn axis(&self, axis: usize) -> f32 {
        match axis {
            0 => self.x,
            1 => self.y,
            _ => self.z,
        }
    }

    /// Index of the largest component
    pub fn max_axis(&self) -> usize {
        if self.x >= self.y && self.x >= self.z {
            0
        } else if self.y >= self.z {
            1
        } else {
            2
        }
    }

    /// Component-wise min
    pub fn min(&self, other: Vec3) -> Self {
        Self {
            x: self.x.min(other.x),
            y: self.y.min(other.y),
            z: self.z.min(other.z),
        }
    }

    /// Component-wise max
    pub fn max(&self, other: Vec3) -> Self {
        Self {
            x: self.x.max(other.x),
            y: self.y.max(other.y),
            z: self.z.max(other.z),
        }
    }

    /// Component-wise abs
    pub fn abs(&self) -> Self {
        Self {
            x: self.x.abs(),
            y: self.y.abs(),
            z: self.z.abs(),
        }
    }

    /// Check if vector is approximately zero
    pub fn is_zero(&self, epsilon: f32) -> bool {
        self.x.abs() < epsilon && self.y.abs() < epsilon && self.z.abs() < epsilon
    }

    /// Check if vector is approximately equal to another
    pub fn approx_eq(&self, other: Vec3, epsilon: f32) -> bool {
        (*self - other).is_zero(epsilon)
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

impl Add for Vec3 {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Self {
            x: self.x + rhs.x,
            y: self.y + rhs.y,
            z: self.z + rhs.z,
        }
    }
}

impl Sub for Vec3 {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Self {
            x: self.x - rhs.x,
            y: self.y - rhs.y,
            z: self.z - rhs.z,
        }
    }
}

impl Mul<f32> for Vec3 {
    type Output = Self;
    fn mul(self, rhs: f32) -> Self {
        Self {
            x: self.x * rhs,
            y: self.y * rhs,
            z: self.z * rhs,
        }
    }
}

impl Mul<Vec3> for f32 {
    type Output = Vec3;
    fn mul(self, rhs: Vec3) -> Vec3 {
        rhs * self
    }
}

impl Div<f32> for Vec3 {
    type Output = Self;
    fn div(self, rhs: f32) -> Self {
        Self {
            x: self.x / rhs,
            y: self.y / rhs,
            z: self.z / rhs,
        }
    }
}

impl Neg for Vec3 {
    type Output = Self;
    fn neg(self) -> Self {
        Self {
            x: -self.x,
            y: -self.y,
            z: -self.z,
        }
    }
}

impl AddAssign for Vec3 {
    fn add_assign(&mut self, rhs: Self) {
        self.x += rhs.x;
        self.y += rhs.y;
        self.z += rhs.z;
    }
}

impl SubAssign for Vec3 {
    fn sub_assign(&mut self, rhs: Self) {
        self.x -= rhs.x;
        self.y -= rhs.y;
        self.z -= rhs.z;
    }
}

impl MulAssign<f32> for Vec3 {
    fn mul_assign(&mut self, rhs: f32) {
        self.x *= rhs;
        self.y *= rhs;
        self.z *= rhs;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPSILON: f32 = 1e-5;

    fn approx_eq(a: f32, b: f32) -> bool {
        (a - b).abs() < EPSILON
    }

    #[test]
    fn test_length() {
        let v = Vec3::new(2.0, 3.0, 6.0);
        assert!(approx_eq(v.length(), 7.0));
        assert!(approx_eq(v.length_sq(), 49.0));
    }

    #[test]
    fn test_normalize_zero() {
        assert_eq!(Vec3::ZERO.normalize(), Vec3::ZERO);
        assert_eq!(Vec3::ZERO.normalize_or(Vec3::FORWARD), Vec3::FORWARD);
    }

    #[test]
    fn test_normalize_with_length() {
        let (n, len) = Vec3::new(0.0, 0.0, 4.0).normalize_with_length();
        assert!(approx_eq(len, 4.0));
        assert_eq!(n, Vec3::FORWARD);
    }

    #[test]
    fn test_cross_right_handed_basis() {
        // right = up x forward
        assert!(Vec3::UP.cross(Vec3::FORWARD).approx_eq(Vec3::RIGHT, EPSILON));
        assert!(Vec3::FORWARD.cross(Vec3::RIGHT).approx_eq(Vec3::UP, EPSILON));
    }

    #[test]
    fn test_dot_perpendicular() {
        assert!(approx_eq(Vec3::UP.dot(Vec3::RIGHT), 0.0));
    }

    #[test]
    fn test_reject_from() {
        let v = Vec3::new(1.0, 2.0, 3.0);
        let r = v.reject_from(Vec3::FORWARD);
        assert_eq!(r, Vec3::new(1.0, 2.0, 0.0));
    }

    #[test]
    fn test_clamp_length() {
        let v = Vec3::new(0.0, 6.0, 8.0);
        let clamped = v.clamp_length(5.0);
        assert!(approx_eq(clamped.length(), 5.0));
        assert!(approx_eq(clamped.z, 4.0));
    }

    #[test]
    fn test_lerp_edges() {
        let a = Vec3::ZERO;
        let b = Vec3::splat(10.0);
        assert!(a.lerp(b, 0.0).approx_eq(a, EPSILON));
        assert!(a.lerp(b, 1.0).approx_eq(b, EPSILON));
        assert!(a.lerp(b, 0.5).approx_eq(Vec3::splat(5.0), EPSILON));
    }

    #[test]
    fn test_axis_helpers() {
        let v = Vec3::new(1.0, 7.0, 3.0);
        assert_eq!(v.axis(0), 1.0);
        assert_eq!(v.axis(1), 7.0);
        assert_eq!(v.axis(2), 3.0);
        assert_eq!(v.max_axis(), 1);
        assert_eq!(Vec3::new(0.0, 0.0, 9.0).max_axis(), 2);
    }

    #[test]
    fn test_operators() {
        let mut a = Vec3::new(1.0, 2.0, 3.0);
        a += Vec3::ONE;
        assert_eq!(a, Vec3::new(2.0, 3.0, 4.0));
        a -= Vec3::ONE;
        a *= 2.0;
        assert_eq!(a, Vec3::new(2.0, 4.0, 6.0));
        assert_eq!(-a, Vec3::new(-2.0, -4.0, -6.0));
        assert_eq!(0.5 * a, Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(a / 2.0, Vec3::new(1.0, 2.0, 3.0));
    }

    #[test]
    fn test_min_max() {
        let a = Vec3::new(1.0, 5.0, -1.0);
        let b = Vec3::new(3.0, 2.0, 0.0);
        assert_eq!(a.min(b), Vec3::new(1.0, 2.0, -1.0));
        assert_eq!(a.max(b), Vec3::new(3.0, 5.0, 0.0));
    }

    #[test]
    fn test_serde() {
        let v = Vec3::new(1.5, 2.5, -3.5);
        let encoded =
            bincode::serde::encode_to_vec(v, bincode::config::standard()).unwrap();
        let (decoded, _): (Vec3, usize) =
            bincode::serde::decode_from_slice(&encoded, bincode::config::standard()).unwrap();
        assert_eq!(v, decoded);
    }
}
