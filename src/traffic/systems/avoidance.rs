//! Seek, local avoidance and fixed-step integration of physical state

use crate::config::TrafficConfig;
use crate::traffic::constants::physics::{
    AVOIDANCE_STRENGTH, BANK_PER_LATERAL_ACCEL, BANK_SMOOTHING, CELL_LOOKAHEAD_SECONDS, MAX_BANK,
    TURN_RATE,
};
use crate::traffic::road::right_vector;
use crate::traffic::spatial::{HashSample, VehicleSpatialHash};
use crate::traffic::vehicle::Vehicle;
use crate::util::vec3::Vec3;

/// Tunables for one integration sub-step
#[derive(Debug, Clone, Copy)]
pub struct SteeringParams {
    pub max_speed: f32,
    pub slowing_distance: f32,
    pub vehicle_radius: f32,
    pub step: f32,
}

impl SteeringParams {
    pub fn from_config(config: &TrafficConfig, step: f32) -> Self {
        Self {
            max_speed: config.max_speed,
            slowing_distance: config.slowing_distance,
            vehicle_radius: config.vehicle_radius,
            step,
        }
    }
}

/// Spatial hash entry for a vehicle
#[inline]
pub fn hash_sample(vehicle: &Vehicle, radius: f32) -> HashSample {
    HashSample {
        id: vehicle.id,
        position: vehicle.physical.position,
        velocity: vehicle.physical.velocity,
        radius,
    }
}

/// Seek toward `target`: direction and speed, ramped down near the target
pub fn seek(position: Vec3, heading: Vec3, target: Vec3, max_speed: f32, slowing_distance: f32) -> (Vec3, f32) {
    let (direction, distance) = (target - position).normalize_with_length();
    if distance <= f32::EPSILON {
        return (heading, 0.0);
    }
    let speed = if distance < slowing_distance {
        max_speed * distance / slowing_distance
    } else {
        max_speed
    };
    (direction, speed)
}

/// Sum of push-away vectors from neighbours ahead in the current cell and the
/// cell the vehicle is heading into
pub fn avoidance_force(
    sample: &HashSample,
    heading: Vec3,
    hash: &VehicleSpatialHash,
    step: f32,
) -> Vec3 {
    let here = hash.position_to_cell(sample.position);
    let there = hash.position_to_cell(sample.position + sample.velocity * CELL_LOOKAHEAD_SECONDS);
    let anticipated = sample.position + sample.velocity * step;
    let fallback = right_vector(heading);

    let cells = if here == there { [Some(here), None] } else { [Some(here), Some(there)] };
    let mut force = Vec3::ZERO;
    for key in cells.into_iter().flatten() {
        for other in hash.cell(key) {
            if other.id == sample.id {
                continue;
            }
            let other_anticipated = other.position + other.velocity * step;
            let combined = other.radius + sample.radius;
            let delta = anticipated - other_anticipated;
            let distance = delta.length();
            if distance >= combined {
                continue;
            }
            // Only react to what is in front
            if (other_anticipated - anticipated).dot(heading) <= 0.0 {
                continue;
            }
            let push = delta.reject_from(heading).normalize_or(fallback);
            force += push * (1.0 - distance / combined);
        }
    }
    force
}

/// One fixed sub-step for one vehicle
pub fn integrate(vehicle: &mut Vehicle, hash: &VehicleSpatialHash, params: &SteeringParams) {
    let step = params.step;
    let ideal = vehicle.ideal_position;
    let sample = hash_sample(vehicle, params.vehicle_radius);
    let body = &mut vehicle.physical;

    let (seek_direction, speed) = seek(
        body.position,
        body.heading,
        ideal,
        params.max_speed * body.speed_mult,
        params.slowing_distance,
    );

    let force = avoidance_force(&sample, body.heading, hash, step);
    let steer = if force.is_zero(1e-6) {
        seek_direction
    } else {
        (body.heading * speed + force * (AVOIDANCE_STRENGTH * speed)).normalize_or(seek_direction)
    };

    let previous_velocity = body.velocity;
    body.heading = body
        .heading
        .lerp(steer, (TURN_RATE * step).min(1.0))
        .normalize_or(body.heading);
    body.velocity = body.heading * speed;
    body.position += body.velocity * step;

    let lateral_accel = (body.velocity - previous_velocity).dot(right_vector(body.heading)) / step;
    let target_bank = (-lateral_accel * BANK_PER_LATERAL_ACCEL).clamp(-MAX_BANK, MAX_BANK);
    body.bank += (target_bank - body.bank) * (BANK_SMOOTHING * step).min(1.0);
}
