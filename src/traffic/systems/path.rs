//! Path following: curve advance, link handoff and lane blending

use rand::Rng;

use crate::traffic::constants::path::{LANE_TWEEN_RATE, SPEED_FUDGE};
use crate::traffic::road::{right_vector, RoadNetwork, RoadSegment};
use crate::traffic::vehicle::{PathState, Vehicle};
use crate::util::smoothstep;
use crate::util::vec3::Vec3;

/// Point on the road for a path state: spline position plus the blended
/// lateral offset between current and wanted lane
pub fn lane_point(seg: &RoadSegment, path: &PathState) -> Vec3 {
    let sample = seg.sample(path.curve_pos.clamp(0.0, 1.0));
    let right = right_vector(sample.tangent);
    let from = seg.lane_offset(path.lane, right);
    let to = seg.lane_offset(path.wanted_lane, right);
    sample.position + from.lerp(to, smoothstep(path.lane_tween))
}

/// Move the curve parameter forward at the current speed.
///
/// Progress stalls while the physical body trails the ideal point by more than
/// the tether distance.
pub fn advance(vehicle: &mut Vehicle, roads: &RoadNetwork, dt: f32, tether_distance_sq: f32) {
    let Some(seg) = roads.get(vehicle.path.segment) else {
        return;
    };
    let sample = seg.sample(vehicle.path.curve_pos.clamp(0.0, 1.0));
    let ideal = lane_point(seg, &vehicle.path);
    vehicle.ideal_position = ideal;

    if vehicle.physical.position.distance_sq_to(ideal) > tether_distance_sq {
        return;
    }

    let tangent_len = sample.tangent.length();
    if tangent_len <= f32::EPSILON || seg.arc_length <= 0.0 {
        return;
    }
    let step = (SPEED_FUDGE / seg.arc_length) * vehicle.path.speed.max(0.0) / tangent_len * dt;
    vehicle.path.curve_pos += step;
}

/// Hand off to a linked segment once the end is reached.
///
/// Returns false when the vehicle ran off a terminal segment and must be
/// despawned; its curve position is left at or past 1.
pub fn handoff(vehicle: &mut Vehicle, roads: &RoadNetwork) -> bool {
    if vehicle.path.curve_pos < 1.0 {
        return true;
    }
    let Some(seg) = roads.get(vehicle.path.segment) else {
        return false;
    };

    let branch = match seg.extra() {
        Some(extra) if seg.link_extra_chance > 0.0 => {
            (vehicle.rng.gen::<f32>() < seg.link_extra_chance).then_some(extra)
        }
        _ => None,
    };

    match branch.or_else(|| seg.next()) {
        Some(target) => {
            vehicle.path.segment = target;
            vehicle.path.curve_pos = 0.0;
            true
        }
        None => false,
    }
}

/// Advance the lane tween and refresh the ideal point at the new curve position
pub fn position_lane(vehicle: &mut Vehicle, roads: &RoadNetwork, dt: f32) {
    let path = &mut vehicle.path;
    if path.is_changing_lane() {
        path.lane_tween += dt * path.speed.max(0.0) * LANE_TWEEN_RATE;
        if path.lane_tween >= 1.0 {
            path.lane = path.wanted_lane;
            path.lane_tween = 0.0;
        }
    } else {
        path.lane_tween = 0.0;
    }

    if let Some(seg) = roads.get(path.segment) {
        vehicle.ideal_position = lane_point(seg, path);
    }
}
