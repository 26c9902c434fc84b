use crate::traffic::constants::path::SLOW_LANE_RATIO;
use crate::traffic::occupancy::OccupancyGrid;
use crate::traffic::road::RoadNetwork;
use crate::traffic::vehicle::Vehicle;
use crate::util::lerp;

/// Free-flow speed for a vehicle on its current segment
#[inline]
pub fn desired_speed(vehicle: &Vehicle, roads: &RoadNetwork, global_speed_factor: f32) -> f32 {
    roads
        .get(vehicle.path.segment)
        .map(|seg| {
            lerp(seg.min_speed, seg.max_speed, vehicle.path.speed_range_select)
                * vehicle.physical.speed_mult
                * global_speed_factor
        })
        .unwrap_or(0.0)
}

/// Match speed to the traffic one slot ahead and raise lane-change intent
/// when held well below free flow
pub fn moderate(
    vehicle: &mut Vehicle,
    roads: &RoadNetwork,
    grid: &OccupancyGrid,
    global_speed_factor: f32,
    dt: f32,
) {
    let desired = desired_speed(vehicle, roads, global_speed_factor);
    let path = &mut vehicle.path;
    let ahead = grid.speed_ahead(roads, path.segment, path.curve_pos, path.lane);
    let target = desired.min(ahead);

    path.target_speed = target;
    path.speed = lerp(path.speed, target, dt.min(1.0));
    path.wants_new_lane = target < desired * SLOW_LANE_RATIO;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traffic::occupancy::OccupancyFootprint;
    use crate::traffic::road::{RoadSegment, SegmentProfile};
    use crate::traffic::vehicle::{VehicleSpawn, VehicleType};
    use crate::util::vec3::Vec3;

    fn setup() -> (RoadNetwork, Vehicle) {
        let profile = SegmentProfile { min_speed: 10.0, max_speed: 20.0, ..Default::default() };
        let roads = RoadNetwork::new(vec![RoadSegment::straight(
            Vec3::ZERO,
            Vec3::new(160.0, 0.0, 0.0),
            &profile,
            32,
        )])
        .unwrap();
        let vehicle = Vehicle::new(
            2,
            &VehicleSpawn {
                segment: 0,
                lane: 1,
                vehicle_type: VehicleType::new(0, 1.0),
                speed: 15.0,
                speed_range_select: 0.5,
                rng_seed: 0,
            },
            &roads,
        );
        (roads, vehicle)
    }

    #[test]
    fn test_desired_speed_scales() {
        let (roads, mut vehicle) = setup();
        assert!((desired_speed(&vehicle, &roads, 1.0) - 15.0).abs() < 1e-5);
        vehicle.physical.speed_mult = 2.0;
        assert!((desired_speed(&vehicle, &roads, 0.5) - 15.0).abs() < 1e-5);
    }

    #[test]
    fn test_free_road_keeps_desired() {
        let (roads, mut vehicle) = setup();
        let mut grid = OccupancyGrid::new(1);
        grid.rebuild(&roads, &[vehicle.footprint()], false);
        moderate(&mut vehicle, &roads, &grid, 1.0, 1.0 / 60.0);
        assert_eq!(vehicle.path.target_speed, 15.0);
        assert!(!vehicle.path.wants_new_lane);
    }

    #[test]
    fn test_slow_leader_limits_and_raises_intent() {
        let (roads, mut vehicle) = setup();
        vehicle.path.curve_pos = 0.2;
        let leader = OccupancyFootprint {
            id: 1,
            segment: 0,
            curve_pos: 0.5,
            lane: 1,
            wanted_lane: 1,
            speed: 4.0,
        };
        let mut grid = OccupancyGrid::new(1);
        grid.rebuild(&roads, &[leader, vehicle.footprint()], false);

        moderate(&mut vehicle, &roads, &grid, 1.0, 0.5);
        // The slot ahead carries 4.0 smoothed backward by pass 2
        assert!(vehicle.path.target_speed < 5.0);
        assert!(vehicle.path.target_speed >= 4.0);
        // Halfway from 15 toward the target
        let expected = 15.0 + (vehicle.path.target_speed - 15.0) * 0.5;
        assert!((vehicle.path.speed - expected).abs() < 1e-4);
        assert!(vehicle.path.wants_new_lane);
    }

    #[test]
    fn test_large_dt_snaps_to_target() {
        let (roads, mut vehicle) = setup();
        let grid = OccupancyGrid::new(1);
        vehicle.path.speed = 0.0;
        moderate(&mut vehicle, &roads, &grid, 1.0, 3.0);
        assert_eq!(vehicle.path.speed, 15.0);
    }
}
