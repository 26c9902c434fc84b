use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::traffic::constants::road::DEFAULT_PATH_SEGMENTS;

/// Configuration-time validation failures
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("max_cars must be at least 1")]
    NoVehicleBudget,
    #[error("{name} must be positive and finite (got {value})")]
    NonPositive { name: &'static str, value: f32 },
    #[error("path_segments must be at least 1")]
    NoPathResolution,
    #[error("player_radius ({player}) must not be smaller than vehicle_radius ({vehicle})")]
    PlayerSmallerThanVehicle { player: f32, vehicle: f32 },
}

/// Global traffic settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrafficConfig {
    /// Maximum number of concurrent NPC vehicles
    pub max_cars: usize,
    /// Expected vehicles per spatial-hash allocation (sizes the backing maps)
    pub pool_cell_vehicle_size: usize,
    /// Global scale applied to every segment's speed range
    pub global_speed_factor: f32,
    /// Polyline resolution used when measuring segment arc length
    pub path_segments: usize,
    /// Root seed for all spawner streams
    pub seed: u64,
    /// Run stages through rayon (results are identical either way)
    pub parallel_enabled: bool,
    /// Spatial hash cell size in world units
    pub hash_cell_size: f32,
    /// Avoidance radius of an NPC vehicle
    pub vehicle_radius: f32,
    /// Avoidance radius of the player vehicle
    pub player_radius: f32,
    /// Physical speed cap before the per-vehicle multiplier
    pub max_speed: f32,
    /// Path progress stalls while the body is further than this from its ideal point
    pub tether_distance: f32,
    /// Seek speed ramps down inside this distance of the ideal point
    pub slowing_distance: f32,
    /// Ticks a vehicle waits after an aborted lane switch
    pub lane_switch_delay: u32,
}

impl Default for TrafficConfig {
    fn default() -> Self {
        Self {
            max_cars: 2000,
            pool_cell_vehicle_size: 4096,
            global_speed_factor: 1.0,
            path_segments: DEFAULT_PATH_SEGMENTS,
            seed: 0x5EED_CA75,
            parallel_enabled: true,
            hash_cell_size: 16.0,
            vehicle_radius: 2.5,
            player_radius: 8.0,
            max_speed: 40.0,
            tether_distance: 12.0,
            slowing_distance: 6.0,
            lane_switch_delay: 60,
        }
    }
}

/// Parse an env var into `target`, warning (and keeping the default) on bad input
fn read_env<T: FromStr>(key: &str, target: &mut T) {
    if let Ok(raw) = std::env::var(key) {
        match raw.parse::<T>() {
            Ok(parsed) => *target = parsed,
            Err(_) => tracing::warn!("Invalid {} '{}', using default", key, raw),
        }
    }
}

impl TrafficConfig {
    /// Load config from `TRAFFIC_*` environment variables or use defaults
    pub fn load_or_default() -> Self {
        let mut config = Self::default();

        read_env("TRAFFIC_MAX_CARS", &mut config.max_cars);
        read_env("TRAFFIC_POOL_CELL_VEHICLE_SIZE", &mut config.pool_cell_vehicle_size);
        read_env("TRAFFIC_GLOBAL_SPEED_FACTOR", &mut config.global_speed_factor);
        read_env("TRAFFIC_PATH_SEGMENTS", &mut config.path_segments);
        read_env("TRAFFIC_SEED", &mut config.seed);
        read_env("TRAFFIC_PARALLEL", &mut config.parallel_enabled);
        read_env("TRAFFIC_HASH_CELL_SIZE", &mut config.hash_cell_size);
        read_env("TRAFFIC_VEHICLE_RADIUS", &mut config.vehicle_radius);
        read_env("TRAFFIC_PLAYER_RADIUS", &mut config.player_radius);
        read_env("TRAFFIC_MAX_SPEED", &mut config.max_speed);
        read_env("TRAFFIC_TETHER_DISTANCE", &mut config.tether_distance);
        read_env("TRAFFIC_SLOWING_DISTANCE", &mut config.slowing_distance);
        read_env("TRAFFIC_LANE_SWITCH_DELAY", &mut config.lane_switch_delay);

        tracing::info!(
            max_cars = config.max_cars,
            speed_factor = config.global_speed_factor,
            seed = config.seed,
            parallel = config.parallel_enabled,
            "Traffic configuration loaded"
        );

        config
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_cars == 0 {
            return Err(ConfigError::NoVehicleBudget);
        }
        if self.path_segments == 0 {
            return Err(ConfigError::NoPathResolution);
        }
        let positives = [
            ("global_speed_factor", self.global_speed_factor),
            ("hash_cell_size", self.hash_cell_size),
            ("vehicle_radius", self.vehicle_radius),
            ("player_radius", self.player_radius),
            ("max_speed", self.max_speed),
            ("tether_distance", self.tether_distance),
            ("slowing_distance", self.slowing_distance),
        ];
        for (name, value) in positives {
            if !(value.is_finite() && value > 0.0) {
                return Err(ConfigError::NonPositive { name, value });
            }
        }
        if self.player_radius < self.vehicle_radius {
            return Err(ConfigError::PlayerSmallerThanVehicle {
                player: self.player_radius,
                vehicle: self.vehicle_radius,
            });
        }
        Ok(())
    }

    /// Squared tether distance used by the path advance check
    pub fn tether_distance_sq(&self) -> f32 {
        self.tether_distance * self.tether_distance
    }
}
