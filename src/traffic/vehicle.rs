//! NPC vehicle state
//!
//! Path state (road-relative) and physical state (world-space) are kept apart:
//! the path pipeline writes the former and an ideal target point, the fixed-step
//! integrator moves the latter toward that point.

use rand::rngs::SmallRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::traffic::constants::grid::LANES;
use crate::traffic::occupancy::OccupancyFootprint;
use crate::traffic::road::{right_vector, RoadNetwork};
use crate::util::vec3::Vec3;

/// One entry of the vehicle-type pool
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VehicleType {
    /// Render prefab identifier, opaque to the simulation
    pub prefab: u32,
    /// Scales both desired road speed and physical speed cap
    pub speed_mult: f32,
}

impl VehicleType {
    pub fn new(prefab: u32, speed_mult: f32) -> Self {
        Self { prefab, speed_mult }
    }
}

/// Road-relative state
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PathState {
    pub segment: usize,
    /// Normalized progress along the segment spline
    pub curve_pos: f32,
    pub lane: usize,
    pub wanted_lane: usize,
    /// Blend from `lane` toward `wanted_lane`, in [0, 1]
    pub lane_tween: f32,
    /// Ticks left before another lane switch may start
    pub cooldown: u32,
    pub speed: f32,
    pub target_speed: f32,
    /// Where in the segment's speed range this driver likes to sit
    pub speed_range_select: f32,
    pub wants_new_lane: bool,
}

impl PathState {
    #[inline]
    pub fn is_changing_lane(&self) -> bool {
        self.lane != self.wanted_lane
    }
}

/// World-space state moved by the integrator
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PhysicalState {
    pub position: Vec3,
    /// Unit forward vector
    pub heading: Vec3,
    pub velocity: Vec3,
    /// Roll angle in radians, positive banks to the right
    pub bank: f32,
    pub speed_mult: f32,
}

/// Everything needed to materialize a vehicle at the command-buffer flush
#[derive(Debug, Clone, Copy)]
pub struct VehicleSpawn {
    pub segment: usize,
    pub lane: usize,
    pub vehicle_type: VehicleType,
    pub speed: f32,
    pub speed_range_select: f32,
    /// Seed drawn from the parent spawner stream
    pub rng_seed: u64,
}

#[derive(Debug, Clone)]
pub struct Vehicle {
    pub id: u32,
    pub prefab: u32,
    pub path: PathState,
    pub physical: PhysicalState,
    /// Target point produced by the path pipeline
    pub ideal_position: Vec3,
    /// Set when the vehicle ran off a terminal segment
    pub despawn: bool,
    pub rng: SmallRng,
}

impl Vehicle {
    /// Place a vehicle at the start of its spawn segment
    pub fn new(id: u32, spawn: &VehicleSpawn, roads: &RoadNetwork) -> Self {
        let lane = spawn.lane.min(LANES - 1);
        let (position, heading) = match roads.get(spawn.segment) {
            Some(seg) => {
                let sample = seg.sample(0.0);
                let right = right_vector(sample.tangent);
                (
                    sample.position + seg.lane_offset(lane, right),
                    sample.tangent.normalize_or(Vec3::FORWARD),
                )
            }
            None => (Vec3::ZERO, Vec3::FORWARD),
        };

        Self {
            id,
            prefab: spawn.vehicle_type.prefab,
            path: PathState {
                segment: spawn.segment,
                curve_pos: 0.0,
                lane,
                wanted_lane: lane,
                lane_tween: 0.0,
                cooldown: 0,
                speed: spawn.speed,
                target_speed: spawn.speed,
                speed_range_select: spawn.speed_range_select,
                wants_new_lane: false,
            },
            physical: PhysicalState {
                position,
                heading,
                velocity: heading * spawn.speed,
                bank: 0.0,
                speed_mult: spawn.vehicle_type.speed_mult,
            },
            ideal_position: position,
            despawn: false,
            rng: SmallRng::seed_from_u64(spawn.rng_seed),
        }
    }

    /// Occupancy contribution for this tick
    #[inline]
    pub fn footprint(&self) -> OccupancyFootprint {
        OccupancyFootprint {
            id: self.id,
            segment: self.path.segment,
            curve_pos: self.path.curve_pos,
            lane: self.path.lane,
            wanted_lane: self.path.wanted_lane,
            speed: self.path.speed,
        }
    }

    pub fn snapshot(&self) -> VehicleSnapshot {
        VehicleSnapshot {
            id: self.id,
            prefab: self.prefab,
            segment: self.path.segment as u32,
            curve_pos: self.path.curve_pos,
            lane: self.path.lane as u8,
            wanted_lane: self.path.wanted_lane as u8,
            lane_tween: self.path.lane_tween,
            speed: self.path.speed,
            position: self.physical.position,
            heading: self.physical.heading,
            velocity: self.physical.velocity,
            bank: self.physical.bank,
        }
    }
}

/// Serializable per-vehicle state for replays and determinism checks
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VehicleSnapshot {
    pub id: u32,
    pub prefab: u32,
    pub segment: u32,
    pub curve_pos: f32,
    pub lane: u8,
    pub wanted_lane: u8,
    pub lane_tween: f32,
    pub speed: f32,
    pub position: Vec3,
    pub heading: Vec3,
    pub velocity: Vec3,
    pub bank: f32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traffic::road::{RoadSegment, SegmentProfile};
    use rand::Rng;

    fn road() -> RoadNetwork {
        RoadNetwork::new(vec![RoadSegment::straight(
            Vec3::ZERO,
            Vec3::new(100.0, 0.0, 0.0),
            &SegmentProfile::default(),
            32,
        )])
        .unwrap()
    }

    fn spawn(lane: usize, seed: u64) -> VehicleSpawn {
        VehicleSpawn {
            segment: 0,
            lane,
            vehicle_type: VehicleType::new(3, 1.2),
            speed: 10.0,
            speed_range_select: 0.5,
            rng_seed: seed,
        }
    }

    #[test]
    fn test_new_vehicle_sits_on_lane() {
        let roads = road();
        let vehicle = Vehicle::new(1, &spawn(0, 1), &roads);
        assert_eq!(vehicle.path.curve_pos, 0.0);
        assert!(!vehicle.path.is_changing_lane());
        // Lane 0 is one width to the left of the centre lane
        let expected = Vec3::new(0.0, 0.0, roads[0].width);
        assert!(vehicle.physical.position.approx_eq(expected, 1e-4));
        assert!(vehicle.physical.heading.approx_eq(Vec3::RIGHT, 1e-4));
        assert!((vehicle.physical.velocity.length() - 10.0).abs() < 1e-4);
        assert_eq!(vehicle.physical.speed_mult, 1.2);
        assert_eq!(vehicle.prefab, 3);
    }

    #[test]
    fn test_lane_is_clamped() {
        let vehicle = Vehicle::new(1, &spawn(9, 1), &road());
        assert_eq!(vehicle.path.lane, 2);
        assert_eq!(vehicle.path.wanted_lane, 2);
    }

    #[test]
    fn test_rng_stream_follows_seed() {
        let roads = road();
        let mut a = Vehicle::new(1, &spawn(1, 77), &roads);
        let mut b = Vehicle::new(2, &spawn(1, 77), &roads);
        let mut c = Vehicle::new(3, &spawn(1, 78), &roads);
        let (x, y, z): (u64, u64, u64) = (a.rng.gen(), b.rng.gen(), c.rng.gen());
        assert_eq!(x, y);
        assert_ne!(x, z);
    }

    #[test]
    fn test_footprint_mirrors_path_state() {
        let mut vehicle = Vehicle::new(5, &spawn(1, 1), &road());
        vehicle.path.curve_pos = 0.4;
        vehicle.path.wanted_lane = 2;
        let footprint = vehicle.footprint();
        assert_eq!(footprint.id, 5);
        assert_eq!(footprint.curve_pos, 0.4);
        assert_eq!(footprint.lane, 1);
        assert_eq!(footprint.wanted_lane, 2);
    }

    #[test]
    fn test_snapshot_bincode() {
        let vehicle = Vehicle::new(5, &spawn(1, 1), &road());
        let snapshot = vehicle.snapshot();
        let bytes = bincode::serde::encode_to_vec(snapshot, bincode::config::standard()).unwrap();
        let (decoded, _): (VehicleSnapshot, usize) =
            bincode::serde::decode_from_slice(&bytes, bincode::config::standard()).unwrap();
        assert_eq!(decoded, snapshot);
    }
}
