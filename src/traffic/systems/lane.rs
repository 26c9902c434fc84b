//! Lane-switch resolution
//!
//! Runs after speed moderation against the same occupancy grid. A switch in
//! progress is reversed when its destination fills up; otherwise a vehicle that
//! wants a new lane picks the fastest free neighbour.

use crate::traffic::constants::grid::LANES;
use crate::traffic::constants::path::LANE_CHECK_WINDOW;
use crate::traffic::occupancy::OccupancyGrid;
use crate::traffic::road::RoadNetwork;
use crate::traffic::vehicle::Vehicle;

/// What the resolver did this tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaneDecision {
    Stay,
    Start(usize),
    Abort,
}

pub fn resolve(
    vehicle: &mut Vehicle,
    roads: &RoadNetwork,
    grid: &OccupancyGrid,
    lane_switch_delay: u32,
) -> LaneDecision {
    let id = vehicle.id;
    let path = &mut vehicle.path;
    path.cooldown = path.cooldown.saturating_sub(1);

    if path.is_changing_lane() {
        let blocked = grid.lane_blocked(
            roads,
            path.segment,
            path.curve_pos,
            path.wanted_lane,
            id,
            LANE_CHECK_WINDOW,
        );
        if !blocked {
            return LaneDecision::Stay;
        }
        std::mem::swap(&mut path.lane, &mut path.wanted_lane);
        path.lane_tween = (1.0 - path.lane_tween).clamp(0.0, 1.0);
        path.cooldown = lane_switch_delay;
        return LaneDecision::Abort;
    }

    if !path.wants_new_lane || path.cooldown > 0 {
        return LaneDecision::Stay;
    }

    let lane = path.lane.min(LANES - 1);
    let candidates = [lane.checked_sub(1), Some(lane + 1).filter(|&l| l < LANES)];
    let mut best: Option<(usize, f32)> = None;
    for candidate in candidates.into_iter().flatten() {
        if grid.lane_blocked(roads, path.segment, path.curve_pos, candidate, id, LANE_CHECK_WINDOW) {
            continue;
        }
        let ahead = grid.speed_ahead(roads, path.segment, path.curve_pos, candidate);
        if ahead <= path.speed {
            continue;
        }
        if best.map_or(true, |(_, fastest)| ahead > fastest) {
            best = Some((candidate, ahead));
        }
    }

    match best {
        Some((candidate, _)) => {
            path.wanted_lane = candidate;
            path.lane_tween = 0.0;
            LaneDecision::Start(candidate)
        }
        None => LaneDecision::Stay,
    }
}
