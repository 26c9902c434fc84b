//! Spawners
//!
//! Each spawner owns its random stream and a countdown in simulated steps.
//! Spawning only records a request; the vehicle is created at the command
//! buffer flush.

use bitvec::prelude::*;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::traffic::constants::grid::LANES;
use crate::traffic::constants::spawn::{DELAY_SCALE, MIN_DELAY_STEPS};
use crate::traffic::occupancy::OccupancyGrid;
use crate::traffic::road::RoadNetwork;
use crate::traffic::vehicle::{VehicleSpawn, VehicleType};
use crate::util::lerp;

/// Largest vehicle-type pool addressable by a selection mask
pub const MAX_POOL_SIZE: usize = 64;

/// Authored spawn location
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpawnPoint {
    pub segment: usize,
    pub lane: usize,
    pub min_speed: f32,
    pub max_speed: f32,
    /// Bit `i` allows pool entry `i`; 0 allows the whole pool
    #[serde(default)]
    pub pool_mask: u64,
}

/// Shared, read-only inputs for one spawn pass
#[derive(Debug, Clone, Copy)]
pub struct SpawnContext<'a> {
    pub roads: &'a RoadNetwork,
    pub grid: &'a OccupancyGrid,
    pub pool: &'a [VehicleType],
    pub live_vehicles: usize,
    pub max_cars: usize,
    /// Fixed steps simulated this tick
    pub steps: u32,
}

#[derive(Debug, Clone)]
pub struct Spawner {
    pub point: SpawnPoint,
    /// Steps until the next attempt
    pub countdown: u32,
    rng: SmallRng,
}

impl Spawner {
    pub fn new(point: SpawnPoint, seed: u64) -> Self {
        let point = SpawnPoint { lane: point.lane.min(LANES - 1), ..point };
        Self {
            point,
            countdown: 0,
            rng: SmallRng::seed_from_u64(seed),
        }
    }

    /// Count down and, when due, try to produce a spawn request.
    ///
    /// The countdown is reset after every attempt, successful or not.
    pub fn update(&mut self, ctx: &SpawnContext<'_>) -> Option<VehicleSpawn> {
        self.countdown = self.countdown.saturating_sub(ctx.steps);
        if self.countdown > 0 {
            return None;
        }
        self.countdown = spawn_delay(self.point.min_speed, &mut self.rng);

        if ctx.live_vehicles >= ctx.max_cars {
            return None;
        }
        // Any occupant at the start of the lane blocks the spawn
        if ctx.roads.get(self.point.segment).is_none()
            || ctx.grid.lane_blocked(ctx.roads, self.point.segment, 0.0, self.point.lane, 0, 0)
        {
            return None;
        }
        let type_index = select_vehicle_type(self.point.pool_mask, ctx.pool.len(), &mut self.rng)?;

        let speed_range_select: f32 = self.rng.gen();
        Some(VehicleSpawn {
            segment: self.point.segment,
            lane: self.point.lane,
            vehicle_type: ctx.pool[type_index],
            speed: lerp(self.point.min_speed, self.point.max_speed, speed_range_select),
            speed_range_select,
            rng_seed: self.rng.gen(),
        })
    }
}

/// Delay until the next attempt, in steps: uniform in `[base, 2 * base)` with
/// slower spawners waiting longer
pub fn spawn_delay(min_speed: f32, rng: &mut impl Rng) -> u32 {
    let base = ((DELAY_SCALE / min_speed.max(1.0)) as u32).max(MIN_DELAY_STEPS);
    rng.gen_range(base..base * 2)
}

/// Pick a pool index among the mask's set bits, or uniformly when the mask
/// selects nothing valid
pub fn select_vehicle_type(mask: u64, pool_len: usize, rng: &mut impl Rng) -> Option<usize> {
    let pool_len = pool_len.min(MAX_POOL_SIZE);
    if pool_len == 0 {
        return None;
    }
    let valid = if pool_len == MAX_POOL_SIZE { u64::MAX } else { (1u64 << pool_len) - 1 };
    let eligible = mask & valid;
    if eligible == 0 {
        return Some(rng.gen_range(0..pool_len));
    }
    let bits = eligible.view_bits::<Lsb0>();
    let nth = rng.gen_range(0..bits.count_ones());
    bits.iter_ones().nth(nth)
}
