/// Occupancy grid layout - the flattened index arithmetic depends on these strides
pub mod grid {
    /// Maximum longitudinal occupancy slots per segment
    pub const SLOTS_PER_SEGMENT: usize = 16;
    /// Lanes per segment
    pub const LANES: usize = 3;
    /// Cells owned by one segment in the flattened grid
    pub const CELLS_PER_SEGMENT: usize = SLOTS_PER_SEGMENT * LANES;
    /// Speed stored in cells that have not seen an occupant
    pub const EMPTY_SPEED: f32 = f32::MAX;
    /// Speed increment per empty slot during gap-fill pass 1
    pub const GAP_FILL_INCREMENT: f32 = 0.1;
}

/// Path following constants
pub mod path {
    /// Scale applied to curve-parameter advance
    pub const SPEED_FUDGE: f32 = 1.0;
    /// Lane tween advance per (second * speed unit)
    pub const LANE_TWEEN_RATE: f32 = 0.1;
    /// A vehicle wants a new lane when held this far below its free-flow speed
    pub const SLOW_LANE_RATIO: f32 = 0.9;
    /// Occupancy slots checked either side of the vehicle when switching lanes
    pub const LANE_CHECK_WINDOW: usize = 1;
}

/// Fixed-step physics constants
pub mod physics {
    /// Integration step rate in Hz
    pub const STEP_RATE: u32 = 60;
    /// Fixed sub-step in seconds
    pub const STEP: f32 = 1.0 / 60.0;
    /// Seconds of velocity lookahead when anticipating the next hash cell
    pub const CELL_LOOKAHEAD_SECONDS: f32 = 2.0;
    /// Heading turn rate (fraction of the gap closed per second)
    pub const TURN_RATE: f32 = 6.0;
    /// Strength of the avoidance push relative to cruising speed
    pub const AVOIDANCE_STRENGTH: f32 = 1.5;
    /// Bank angle per unit of lateral acceleration (radians per m/s^2)
    pub const BANK_PER_LATERAL_ACCEL: f32 = 0.04;
    /// Maximum bank angle in radians
    pub const MAX_BANK: f32 = 0.35;
    /// Bank smoothing rate (fraction of the gap closed per second)
    pub const BANK_SMOOTHING: f32 = 4.0;
}

/// Spawner constants
pub mod spawn {
    /// Spawn delay numerator: base delay in steps = SCALE / min_speed
    pub const DELAY_SCALE: f32 = 600.0;
    /// Minimum base delay in steps
    pub const MIN_DELAY_STEPS: u32 = 1;
    /// Id reserved for the player entry in the spatial hash
    pub const PLAYER_ID: u32 = 0;
    /// First id handed to an NPC vehicle
    pub const FIRST_VEHICLE_ID: u32 = 1;
}

/// Road baking constants
pub mod road {
    /// Default polyline resolution used to measure arc length
    pub const DEFAULT_PATH_SEGMENTS: usize = 32;
    /// Default physical vehicle length in world units
    pub const DEFAULT_VEHICLE_LENGTH: f32 = 4.5;
}

/// Convert a vehicle length in world units to half a length in curve-parameter units
pub fn half_length_in_curve_units(vehicle_length: f32, arc_length: f32) -> f32 {
    if arc_length <= 0.0 {
        return 0.0;
    }
    (vehicle_length * 0.5 / arc_length).clamp(0.0, 0.5)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grid_strides() {
        assert_eq!(grid::CELLS_PER_SEGMENT, 48);
    }

    #[test]
    fn test_step_matches_rate() {
        assert!((physics::STEP * physics::STEP_RATE as f32 - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_half_length_conversion() {
        assert!((half_length_in_curve_units(4.0, 100.0) - 0.02).abs() < 1e-6);
        assert_eq!(half_length_in_curve_units(4.0, 0.0), 0.0);
        // Vehicles longer than the segment saturate at the whole segment
        assert_eq!(half_length_in_curve_units(400.0, 10.0), 0.5);
    }

    #[test]
    fn test_player_id_not_a_vehicle_id() {
        assert!(spawn::PLAYER_ID < spawn::FIRST_VEHICLE_ID);
    }
}
