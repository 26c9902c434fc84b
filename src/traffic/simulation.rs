//! Traffic simulation owner
//!
//! Holds every piece of per-tick state and runs the stages in order:
//!
//! 1. rebuild the occupancy grid from current path state
//! 2. per vehicle: advance, hand off, blend lanes, moderate speed, resolve lane switches
//! 3. spawners record create requests
//! 4. flush the command buffer (destroys, then creates)
//! 5. fixed sub-steps: rebuild the spatial hash, then seek/avoid/integrate
//! 6. write render transforms
//!
//! Stages 2, 3 and the per-vehicle part of 5 run on rayon when
//! `parallel_enabled` is set. Results do not depend on it.

use rayon::prelude::*;
use std::sync::Arc;
use std::time::Instant;

use crate::config::{ConfigError, TrafficConfig};
use crate::kdtree::{KdHit, KdTree, KdTreeSettings};
use crate::metrics::TrafficMetrics;
use crate::traffic::commands::{CommandBuffer, TrafficCommand};
use crate::traffic::constants::physics::STEP;
use crate::traffic::constants::spawn::{FIRST_VEHICLE_ID, PLAYER_ID};
use crate::traffic::occupancy::{OccupancyFootprint, OccupancyGrid};
use crate::traffic::road::{RoadError, RoadNetwork};
use crate::traffic::snapshot::FrameSnapshot;
use crate::traffic::spatial::{HashSample, VehicleSpatialHash};
use crate::traffic::systems::avoidance::{self, SteeringParams};
use crate::traffic::systems::lane::{self, LaneDecision};
use crate::traffic::systems::spawn::{SpawnContext, SpawnPoint, Spawner, MAX_POOL_SIZE};
use crate::traffic::systems::transform::{self, VehicleTransform};
use crate::traffic::systems::{path, speed};
use crate::traffic::vehicle::{Vehicle, VehicleSpawn, VehicleType};
use crate::util::vec3::Vec3;

/// Construction-time failures
#[derive(Debug, thiserror::Error)]
pub enum SimulationError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("invalid road network: {0}")]
    Road(#[from] RoadError),
    #[error("vehicle pool is empty")]
    EmptyPool,
    #[error("vehicle pool has {0} entries, at most 64 can be selected")]
    PoolTooLarge(usize),
    #[error("spawn point {index} references segment {segment} outside network of {len} segments")]
    SpawnOutOfRange { index: usize, segment: usize, len: usize },
}

/// Player vehicle as seen by the traffic, read once per tick
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PlayerState {
    pub position: Vec3,
    pub velocity: Vec3,
}

/// What one tick did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub substeps: u32,
    pub spawned: usize,
    pub despawned: usize,
    pub lane_switches: usize,
    pub lane_aborts: usize,
}

/// Per-vehicle outcome of the path stage
#[derive(Debug, Clone, Copy, Default)]
struct PathTally {
    despawned: usize,
    started: usize,
    aborted: usize,
}

impl PathTally {
    fn merge(self, other: Self) -> Self {
        Self {
            despawned: self.despawned + other.despawned,
            started: self.started + other.started,
            aborted: self.aborted + other.aborted,
        }
    }
}

pub struct TrafficSimulation {
    config: TrafficConfig,
    roads: RoadNetwork,
    pool: Vec<VehicleType>,
    spawners: Vec<Spawner>,
    /// Sorted by id
    vehicles: Vec<Vehicle>,
    occupancy: OccupancyGrid,
    hash: VehicleSpatialHash,
    commands: CommandBuffer,
    transforms: Vec<VehicleTransform>,
    footprints: Vec<OccupancyFootprint>,
    next_vehicle_id: u32,
    accumulator: f32,
    tick: u64,
    metrics: Arc<TrafficMetrics>,
}

impl TrafficSimulation {
    pub fn new(
        config: TrafficConfig,
        roads: RoadNetwork,
        spawn_points: Vec<SpawnPoint>,
        pool: Vec<VehicleType>,
    ) -> Result<Self, SimulationError> {
        config.validate()?;
        if pool.is_empty() {
            return Err(SimulationError::EmptyPool);
        }
        if pool.len() > MAX_POOL_SIZE {
            return Err(SimulationError::PoolTooLarge(pool.len()));
        }
        for (index, point) in spawn_points.iter().enumerate() {
            if point.segment >= roads.len() {
                return Err(SimulationError::SpawnOutOfRange {
                    index,
                    segment: point.segment,
                    len: roads.len(),
                });
            }
        }

        let spawners = spawn_points
            .into_iter()
            .enumerate()
            .map(|(i, point)| Spawner::new(point, spawner_seed(config.seed, i)))
            .collect::<Vec<_>>();

        tracing::info!(
            segments = roads.len(),
            spawners = spawners.len(),
            pool = pool.len(),
            max_cars = config.max_cars,
            parallel = config.parallel_enabled,
            "Traffic simulation created"
        );

        Ok(Self {
            occupancy: OccupancyGrid::new(roads.len()),
            hash: VehicleSpatialHash::new(config.hash_cell_size, config.pool_cell_vehicle_size),
            commands: CommandBuffer::new(),
            transforms: Vec::with_capacity(config.max_cars),
            footprints: Vec::with_capacity(config.max_cars),
            vehicles: Vec::with_capacity(config.max_cars),
            next_vehicle_id: FIRST_VEHICLE_ID,
            accumulator: 0.0,
            tick: 0,
            metrics: Arc::new(TrafficMetrics::new()),
            config,
            roads,
            pool,
            spawners,
        })
    }

    /// Build from a baked JSON segment table
    pub fn from_road_json(
        config: TrafficConfig,
        json: &str,
        spawn_points: Vec<SpawnPoint>,
        pool: Vec<VehicleType>,
    ) -> Result<Self, SimulationError> {
        let roads = RoadNetwork::from_json(json)?;
        Self::new(config, roads, spawn_points, pool)
    }

    /// Advance the simulation by `dt` seconds of frame time
    pub fn tick(&mut self, dt: f32, player: Option<PlayerState>) -> TickReport {
        let started = Instant::now();
        let dt = if dt.is_finite() { dt.max(0.0) } else { 0.0 };
        let parallel = self.config.parallel_enabled;

        self.rebuild_occupancy(parallel);
        let tally = self.update_paths(dt, parallel);

        self.accumulator += dt;
        let mut substeps = 0u32;
        while self.accumulator >= STEP {
            self.accumulator -= STEP;
            substeps += 1;
        }

        self.run_spawners(substeps, tally.despawned, parallel);
        let flushed = self.commands.flush(
            &mut self.vehicles,
            &self.roads,
            &mut self.next_vehicle_id,
            self.config.max_cars,
        );

        for step in 0..substeps {
            let player = player.map(|p| PlayerState {
                position: p.position + p.velocity * (STEP * step as f32),
                velocity: p.velocity,
            });
            self.substep(player, parallel);
        }

        transform::write_transforms(&self.vehicles, &mut self.transforms, parallel);
        self.tick += 1;

        let report = TickReport {
            substeps,
            spawned: flushed.created,
            despawned: flushed.destroyed,
            lane_switches: tally.started,
            lane_aborts: tally.aborted,
        };
        self.record_metrics(&report, flushed.rejected, started);

        tracing::debug!(
            tick = self.tick,
            vehicles = self.vehicles.len(),
            substeps,
            spawned = report.spawned,
            despawned = report.despawned,
            "Traffic tick"
        );

        report
    }

    fn rebuild_occupancy(&mut self, parallel: bool) {
        self.footprints.clear();
        self.footprints.extend(self.vehicles.iter().map(Vehicle::footprint));
        self.occupancy.rebuild(&self.roads, &self.footprints, parallel);
    }

    fn update_paths(&mut self, dt: f32, parallel: bool) -> PathTally {
        let roads = &self.roads;
        let grid = &self.occupancy;
        let commands = &self.commands;
        let tether_sq = self.config.tether_distance_sq();
        let speed_factor = self.config.global_speed_factor;
        let lane_delay = self.config.lane_switch_delay;

        let stage = |vehicle: &mut Vehicle| -> PathTally {
            if vehicle.despawn {
                return PathTally::default();
            }
            path::advance(vehicle, roads, dt, tether_sq);
            if !path::handoff(vehicle, roads) {
                vehicle.despawn = true;
                commands.record(TrafficCommand::Destroy(vehicle.id));
                return PathTally { despawned: 1, ..Default::default() };
            }
            path::position_lane(vehicle, roads, dt);
            speed::moderate(vehicle, roads, grid, speed_factor, dt);
            match lane::resolve(vehicle, roads, grid, lane_delay) {
                LaneDecision::Stay => PathTally::default(),
                LaneDecision::Start(_) => PathTally { started: 1, ..Default::default() },
                LaneDecision::Abort => PathTally { aborted: 1, ..Default::default() },
            }
        };

        if parallel {
            self.vehicles
                .par_iter_mut()
                .map(stage)
                .reduce(PathTally::default, PathTally::merge)
        } else {
            self.vehicles
                .iter_mut()
                .map(stage)
                .fold(PathTally::default(), PathTally::merge)
        }
    }

    fn run_spawners(&mut self, steps: u32, despawning: usize, parallel: bool) {
        let ctx = SpawnContext {
            roads: &self.roads,
            grid: &self.occupancy,
            pool: &self.pool,
            live_vehicles: self.vehicles.len().saturating_sub(despawning),
            max_cars: self.config.max_cars,
            steps,
        };
        let commands = &self.commands;
        let run = |(index, spawner): (usize, &mut Spawner)| {
            if let Some(spawn) = spawner.update(&ctx) {
                commands.record(TrafficCommand::Create { spawner: index, spawn });
            }
        };
        if parallel {
            self.spawners.par_iter_mut().enumerate().for_each(run);
        } else {
            self.spawners.iter_mut().enumerate().for_each(run);
        }
    }

    fn substep(&mut self, player: Option<PlayerState>, parallel: bool) {
        let radius = self.config.vehicle_radius;
        let player = player.map(|p| HashSample {
            id: PLAYER_ID,
            position: p.position,
            velocity: p.velocity,
            radius: self.config.player_radius,
        });
        self.hash
            .rebuild(self.vehicles.iter().map(|v| avoidance::hash_sample(v, radius)), player);

        let hash = &self.hash;
        let params = SteeringParams::from_config(&self.config, STEP);
        if parallel {
            self.vehicles
                .par_iter_mut()
                .for_each(|v| avoidance::integrate(v, hash, &params));
        } else {
            self.vehicles
                .iter_mut()
                .for_each(|v| avoidance::integrate(v, hash, &params));
        }
    }

    fn record_metrics(&self, report: &TickReport, rejected: usize, started: Instant) {
        let m = &self.metrics;
        TrafficMetrics::set(&m.vehicles_live, self.vehicles.len());
        TrafficMetrics::add(&m.vehicles_spawned, report.spawned);
        TrafficMetrics::add(&m.vehicles_despawned, report.despawned);
        TrafficMetrics::add(&m.spawns_rejected, rejected);
        TrafficMetrics::add(&m.lane_switches_started, report.lane_switches);
        TrafficMetrics::add(&m.lane_switches_aborted, report.lane_aborts);
        TrafficMetrics::add(&m.substep_count, report.substeps as usize);
        TrafficMetrics::set(&m.occupied_cells, self.occupancy.occupied_count());
        let stats = self.hash.stats();
        TrafficMetrics::set(&m.hash_cells, stats.non_empty_cells);
        TrafficMetrics::set(&m.hash_max_per_cell, stats.max_per_cell);
        m.record_tick_time(started.elapsed());
    }

    /// Create a vehicle immediately, outside the spawner schedule.
    /// Returns `None` when the vehicle budget is exhausted or the segment is unknown.
    pub fn spawn_vehicle(&mut self, spawn: VehicleSpawn) -> Option<u32> {
        if self.vehicles.len() >= self.config.max_cars || self.roads.get(spawn.segment).is_none() {
            return None;
        }
        let id = self.next_vehicle_id;
        self.next_vehicle_id += 1;
        self.vehicles.push(Vehicle::new(id, &spawn, &self.roads));
        Some(id)
    }

    /// Render transforms from the last tick, in id order
    #[inline]
    pub fn transforms(&self) -> &[VehicleTransform] {
        &self.transforms
    }

    #[inline]
    pub fn vehicle_count(&self) -> usize {
        self.vehicles.len()
    }

    #[inline]
    pub fn vehicles(&self) -> &[Vehicle] {
        &self.vehicles
    }

    #[inline]
    pub fn roads(&self) -> &RoadNetwork {
        &self.roads
    }

    #[inline]
    pub fn occupancy(&self) -> &OccupancyGrid {
        &self.occupancy
    }

    #[inline]
    pub fn config(&self) -> &TrafficConfig {
        &self.config
    }

    #[inline]
    pub fn tick_count(&self) -> u64 {
        self.tick
    }

    pub fn metrics(&self) -> Arc<TrafficMetrics> {
        Arc::clone(&self.metrics)
    }

    pub fn snapshot(&self) -> FrameSnapshot {
        FrameSnapshot {
            tick: self.tick,
            vehicles: self.vehicles.iter().map(Vehicle::snapshot).collect(),
        }
    }

    /// k-d tree over current vehicle positions; hit indices are positions in `vehicles()`
    pub fn vehicle_index(&self) -> KdTree {
        let points: Vec<Vec3> = self.vehicles.iter().map(|v| v.physical.position).collect();
        let tree = KdTree::build(&points, KdTreeSettings::default(), self.config.parallel_enabled);
        tracing::trace!(
            vehicles = tree.len(),
            depth = tree.depth(),
            leaves = tree.leaf_count(),
            "Vehicle index built"
        );
        tree
    }

    /// Ids of the `k` vehicles nearest to `point`, nearest first
    pub fn nearest_vehicles(&self, point: Vec3, k: usize) -> Vec<u32> {
        self.hits_to_ids(self.vehicle_index().nearest_k(point, k))
    }

    /// Ids of vehicles within `radius` of `point`, nearest first
    pub fn vehicles_within(&self, point: Vec3, radius: f32) -> Vec<u32> {
        self.hits_to_ids(self.vehicle_index().within_radius(point, radius))
    }

    fn hits_to_ids(&self, hits: Vec<KdHit>) -> Vec<u32> {
        hits.into_iter()
            .filter_map(|hit| self.vehicles.get(hit.index as usize).map(|v| v.id))
            .collect()
    }
}

/// Independent stream per spawner, derived from the root seed
fn spawner_seed(seed: u64, index: usize) -> u64 {
    // SplitMix64 finalizer over seed + index
    let mut z = seed.wrapping_add((index as u64 + 1).wrapping_mul(0x9E37_79B9_7F4A_7C15));
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}
