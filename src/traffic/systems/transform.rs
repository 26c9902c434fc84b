use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::traffic::vehicle::Vehicle;
use crate::util::quat::Quat;
use crate::util::vec3::Vec3;

/// Render transform for one NPC vehicle
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VehicleTransform {
    pub id: u32,
    pub prefab: u32,
    pub position: Vec3,
    pub rotation: Quat,
}

/// Orientation from heading plus a small-angle roll about the local forward axis
#[inline]
pub fn vehicle_rotation(heading: Vec3, bank: f32) -> Quat {
    Quat::look_rotation(heading, Vec3::UP) * Quat::from_small_angle(Vec3::FORWARD, bank)
}

/// Rewrite `out` with one transform per vehicle, in vehicle order
pub fn write_transforms(vehicles: &[Vehicle], out: &mut Vec<VehicleTransform>, parallel: bool) {
    let build = |v: &Vehicle| VehicleTransform {
        id: v.id,
        prefab: v.prefab,
        position: v.physical.position,
        rotation: vehicle_rotation(v.physical.heading, v.physical.bank),
    };
    out.clear();
    if parallel {
        vehicles.par_iter().map(build).collect_into_vec(out);
    } else {
        out.extend(vehicles.iter().map(build));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rotation_faces_heading() {
        let q = vehicle_rotation(Vec3::RIGHT, 0.0);
        assert!(q.rotate(Vec3::FORWARD).approx_eq(Vec3::RIGHT, 1e-5));
        assert!(q.rotate(Vec3::UP).approx_eq(Vec3::UP, 1e-5));
    }

    #[test]
    fn test_bank_rolls_about_forward() {
        let q = vehicle_rotation(Vec3::FORWARD, 0.2);
        // Forward is unchanged by a roll
        assert!(q.rotate(Vec3::FORWARD).approx_eq(Vec3::FORWARD, 1e-4));
        let up = q.rotate(Vec3::UP);
        assert!((up.length() - 1.0).abs() < 1e-4);
        assert!(up.x.abs() > 0.1);
        // Close to the exact rotation for small angles
        let exact = Quat::from_axis_angle(Vec3::FORWARD, 0.2).rotate(Vec3::UP);
        assert!(up.approx_eq(exact, 1e-2));
    }
}
