use serde::{Deserialize, Serialize};
use std::ops::Mul;

use super::vec3::Vec3;

/// Unit quaternion for render transforms
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Quat {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub w: f32,
}

impl Default for Quat {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Quat {
    pub const IDENTITY: Quat = Quat { x: 0.0, y: 0.0, z: 0.0, w: 1.0 };

    #[inline]
    pub const fn new(x: f32, y: f32, z: f32, w: f32) -> Self {
        Self { x, y, z, w }
    }

    pub fn from_axis_angle(axis: Vec3, angle: f32) -> Self {
        let axis = axis.normalize();
        let (s, c) = (angle * 0.5).sin_cos();
        Self::new(axis.x * s, axis.y * s, axis.z * s, c)
    }

    /// First-order approximation of a rotation by a small angle about `axis`.
    /// Only valid for |angle| well below a radian; the bank limit keeps it there.
    pub fn from_small_angle(axis: Vec3, angle: f32) -> Self {
        let h = angle * 0.5;
        Self::new(axis.x * h, axis.y * h, axis.z * h, 1.0).normalize()
    }

    /// Rotation whose local +z points along `forward` and local +y is as close
    /// to `up` as possible
    pub fn look_rotation(forward: Vec3, up: Vec3) -> Self {
        let f = forward.normalize_or(Vec3::FORWARD);
        let r = up.cross(f).normalize_or(Vec3::RIGHT);
        let u = f.cross(r);
        Self::from_basis(r, u, f)
    }

    /// Quaternion from an orthonormal basis given as matrix columns
    fn from_basis(right: Vec3, up: Vec3, forward: Vec3) -> Self {
        let (m00, m10, m20) = (right.x, right.y, right.z);
        let (m01, m11, m21) = (up.x, up.y, up.z);
        let (m02, m12, m22) = (forward.x, forward.y, forward.z);

        let trace = m00 + m11 + m22;
        let q = if trace > 0.0 {
            let s = (trace + 1.0).sqrt() * 2.0;
            Self::new((m21 - m12) / s, (m02 - m20) / s, (m10 - m01) / s, 0.25 * s)
        } else if m00 > m11 && m00 > m22 {
            let s = (1.0 + m00 - m11 - m22).sqrt() * 2.0;
            Self::new(0.25 * s, (m01 + m10) / s, (m02 + m20) / s, (m21 - m12) / s)
        } else if m11 > m22 {
            let s = (1.0 + m11 - m00 - m22).sqrt() * 2.0;
            Self::new((m01 + m10) / s, 0.25 * s, (m12 + m21) / s, (m02 - m20) / s)
        } else {
            let s = (1.0 + m22 - m00 - m11).sqrt() * 2.0;
            Self::new((m02 + m20) / s, (m12 + m21) / s, 0.25 * s, (m10 - m01) / s)
        };
        q.normalize()
    }

    pub fn length_sq(&self) -> f32 {
        self.x * self.x + self.y * self.y + self.z * self.z + self.w * self.w
    }

    pub fn normalize(&self) -> Self {
        let len = self.length_sq().sqrt();
        if len > 0.0 {
            Self::new(self.x / len, self.y / len, self.z / len, self.w / len)
        } else {
            Self::IDENTITY
        }
    }

    /// Rotate a vector by this quaternion
    pub fn rotate(&self, v: Vec3) -> Vec3 {
        let q = Vec3::new(self.x, self.y, self.z);
        let t = q.cross(v) * 2.0;
        v + t * self.w + q.cross(t)
    }
}

impl Mul for Quat {
    type Output = Self;
    fn mul(self, rhs: Self) -> Self {
        Self {
            x: self.w * rhs.x + self.x * rhs.w + self.y * rhs.z - self.z * rhs.y,
            y: self.w * rhs.y - self.x * rhs.z + self.y * rhs.w + self.z * rhs.x,
            z: self.w * rhs.z + self.x * rhs.y - self.y * rhs.x + self.z * rhs.w,
            w: self.w * rhs.w - self.x * rhs.x - self.y * rhs.y - self.z * rhs.z,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::FRAC_PI_2;

    const EPSILON: f32 = 1e-4;

    #[test]
    fn test_look_rotation_identity() {
        let q = Quat::look_rotation(Vec3::FORWARD, Vec3::UP);
        assert!((q.w - 1.0).abs() < EPSILON);
        assert!(q.rotate(Vec3::RIGHT).approx_eq(Vec3::RIGHT, EPSILON));
    }

    #[test]
    fn test_look_rotation_maps_forward() {
        for dir in [Vec3::RIGHT, -Vec3::RIGHT, -Vec3::FORWARD, Vec3::new(1.0, 0.5, -2.0)] {
            let q = Quat::look_rotation(dir, Vec3::UP);
            let mapped = q.rotate(Vec3::FORWARD);
            assert!(mapped.approx_eq(dir.normalize(), EPSILON), "{:?} -> {:?}", dir, mapped);
        }
    }

    #[test]
    fn test_look_rotation_degenerate_up() {
        let q = Quat::look_rotation(Vec3::UP, Vec3::UP);
        assert!((q.length_sq() - 1.0).abs() < EPSILON);
        assert!(q.rotate(Vec3::FORWARD).approx_eq(Vec3::UP, EPSILON));
    }

    #[test]
    fn test_axis_angle_rotate() {
        let q = Quat::from_axis_angle(Vec3::UP, FRAC_PI_2);
        assert!(q.rotate(Vec3::FORWARD).approx_eq(Vec3::RIGHT, EPSILON));
    }

    #[test]
    fn test_small_angle_close_to_exact() {
        let angle = 0.2;
        let exact = Quat::from_axis_angle(Vec3::FORWARD, angle);
        let approx = Quat::from_small_angle(Vec3::FORWARD, angle);
        let a = exact.rotate(Vec3::UP);
        let b = approx.rotate(Vec3::UP);
        assert!(a.approx_eq(b, 1e-2));
    }

    #[test]
    fn test_mul_composes() {
        let a = Quat::from_axis_angle(Vec3::UP, FRAC_PI_2);
        let b = Quat::from_axis_angle(Vec3::UP, FRAC_PI_2);
        let v = (a * b).rotate(Vec3::FORWARD);
        assert!(v.approx_eq(-Vec3::FORWARD, EPSILON));
    }
}
