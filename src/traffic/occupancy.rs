//! Per-segment occupancy grid
//!
//! Fixed 16-slot x 3-lane block per segment, flattened as
//! `(segment * SLOTS_PER_SEGMENT + slot) * LANES + lane`. Rebuilt every tick:
//! clear, parallel fill, two backward gap-fill passes, then a cross-segment
//! adjustment so speed information flows over segment boundaries.
//!
//! Concurrent fills never lock. Each cell keeps the minimum vehicle id, the
//! maximum vehicle id and the minimum speed written to it (independent
//! `fetch_min`/`fetch_max`), so the result is the same for any interleaving of
//! writers. The id pair lets a reader tell a cell it owns alone from one it
//! shares, whichever of the two ids is lower.

use rayon::prelude::*;
use std::sync::atomic::{AtomicU32, Ordering};

use crate::traffic::constants::grid::{
    CELLS_PER_SEGMENT, EMPTY_SPEED, GAP_FILL_INCREMENT, LANES, SLOTS_PER_SEGMENT,
};
use crate::traffic::road::{RoadNetwork, RoadSegment};

/// Raw occupant value for an empty cell; loses every `fetch_min`
const RAW_EMPTY: u32 = u32::MAX;

/// Plain copy of one cell
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OccupancyCell {
    /// 0 when empty, otherwise the lowest occupying vehicle id
    pub occupied: u32,
    /// 0 when empty, otherwise the highest occupying vehicle id
    pub newest: u32,
    /// Occupant speed, or the propagated speed after gap-fill
    pub speed: f32,
}

impl OccupancyCell {
    pub const EMPTY: OccupancyCell = OccupancyCell { occupied: 0, newest: 0, speed: EMPTY_SPEED };

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.occupied == 0
    }

    /// Occupied by at least one vehicle other than `id`
    #[inline]
    pub fn held_by_other(&self, id: u32) -> bool {
        !self.is_empty() && (self.occupied != id || self.newest != id)
    }
}

/// What a vehicle contributes to the grid during fill
#[derive(Debug, Clone, Copy)]
pub struct OccupancyFootprint {
    pub id: u32,
    pub segment: usize,
    pub curve_pos: f32,
    pub lane: usize,
    /// Written as well while a lane change is in progress
    pub wanted_lane: usize,
    pub speed: f32,
}

#[derive(Debug)]
struct AtomicCell {
    occupant: AtomicU32,
    /// Highest writer id, 0 when empty
    newest: AtomicU32,
    /// Bits of a non-negative f32; integer order matches float order
    speed_bits: AtomicU32,
}

impl AtomicCell {
    fn empty() -> Self {
        Self {
            occupant: AtomicU32::new(RAW_EMPTY),
            newest: AtomicU32::new(0),
            speed_bits: AtomicU32::new(EMPTY_SPEED.to_bits()),
        }
    }

    #[inline]
    fn reset(&mut self) {
        *self.occupant.get_mut() = RAW_EMPTY;
        *self.newest.get_mut() = 0;
        *self.speed_bits.get_mut() = EMPTY_SPEED.to_bits();
    }

    #[inline]
    fn merge(&self, id: u32, speed: f32) {
        self.occupant.fetch_min(id, Ordering::Relaxed);
        self.newest.fetch_max(id, Ordering::Relaxed);
        self.speed_bits.fetch_min(speed_to_bits(speed), Ordering::Relaxed);
    }

    #[inline]
    fn load(&self) -> OccupancyCell {
        OccupancyCell {
            occupied: decode_id(self.occupant.load(Ordering::Relaxed)),
            newest: self.newest.load(Ordering::Relaxed),
            speed: f32::from_bits(self.speed_bits.load(Ordering::Relaxed)),
        }
    }

    #[inline]
    fn is_occupied_mut(&mut self) -> bool {
        *self.occupant.get_mut() != RAW_EMPTY
    }

    #[inline]
    fn speed_mut(&mut self) -> f32 {
        f32::from_bits(*self.speed_bits.get_mut())
    }

    #[inline]
    fn set_speed_mut(&mut self, speed: f32) {
        *self.speed_bits.get_mut() = speed_to_bits(speed);
    }
}

#[inline]
fn speed_to_bits(speed: f32) -> u32 {
    // max(0.0) also maps NaN to 0.0
    speed.max(0.0).to_bits()
}

#[inline]
fn decode_id(raw: u32) -> u32 {
    if raw == RAW_EMPTY {
        0
    } else {
        raw
    }
}

#[inline]
fn local_index(slot: usize, lane: usize) -> usize {
    slot * LANES + lane
}

/// Pending cross-segment write, computed before any cell is changed
#[derive(Debug, Clone, Copy)]
struct GapUpdate {
    index: usize,
    occupant: u32,
    newest: u32,
    speed_bits: u32,
}

impl Default for GapUpdate {
    fn default() -> Self {
        Self { index: 0, occupant: RAW_EMPTY, newest: 0, speed_bits: EMPTY_SPEED.to_bits() }
    }
}

/// Occupancy grid for a whole road network
#[derive(Debug)]
pub struct OccupancyGrid {
    cells: Vec<AtomicCell>,
    segment_count: usize,
}

impl OccupancyGrid {
    pub fn new(segment_count: usize) -> Self {
        let mut cells = Vec::with_capacity(segment_count * CELLS_PER_SEGMENT);
        cells.resize_with(segment_count * CELLS_PER_SEGMENT, AtomicCell::empty);
        Self { cells, segment_count }
    }

    #[inline]
    pub fn segment_count(&self) -> usize {
        self.segment_count
    }

    /// Flattened index of a cell; slot and lane are clamped
    #[inline]
    pub fn index(segment: usize, slot: usize, lane: usize) -> usize {
        segment * CELLS_PER_SEGMENT
            + local_index(slot.min(SLOTS_PER_SEGMENT - 1), lane.min(LANES - 1))
    }

    /// Reset every cell to empty
    pub fn clear(&mut self, parallel: bool) {
        if parallel {
            self.cells.par_iter_mut().for_each(AtomicCell::reset);
        } else {
            self.cells.iter_mut().for_each(AtomicCell::reset);
        }
    }

    /// Merge one write into a cell (min id, max id, min speed)
    #[inline]
    pub fn write(&self, segment: usize, slot: usize, lane: usize, id: u32, speed: f32) {
        if segment >= self.segment_count {
            return;
        }
        self.cells[Self::index(segment, slot, lane)].merge(id, speed);
    }

    /// Read a cell; out-of-range segments read as empty
    #[inline]
    pub fn cell(&self, segment: usize, slot: usize, lane: usize) -> OccupancyCell {
        if segment >= self.segment_count {
            return OccupancyCell::EMPTY;
        }
        self.cells[Self::index(segment, slot, lane)].load()
    }

    /// Write the slot range covered by one vehicle
    pub fn fill_vehicle(&self, roads: &RoadNetwork, footprint: &OccupancyFootprint) {
        let Some(seg) = roads.get(footprint.segment) else {
            return;
        };
        let limit = seg.occupation_limit.max(1);
        let (first, last) = covered_slots(seg, footprint.curve_pos);
        let overflow = last.saturating_sub(limit - 1);
        let last = last.min(limit - 1);

        let changing = footprint.wanted_lane != footprint.lane;
        let lanes = [footprint.lane, footprint.wanted_lane];
        let lanes = if changing { &lanes[..] } else { &lanes[..1] };

        for &lane in lanes {
            for slot in first..=last {
                self.write(footprint.segment, slot, lane, footprint.id, footprint.speed);
            }
        }

        // The vehicle's nose reaches into the leading cells of the successor
        if overflow > 0 {
            if let Some(next) = seg.next().and_then(|n| roads.get(n).map(|s| (n, s))) {
                let (next_index, next_seg) = next;
                let next_last = (overflow - 1).min(next_seg.occupation_limit.max(1) - 1);
                for &lane in lanes {
                    for slot in 0..=next_last {
                        self.write(next_index, slot, lane, footprint.id, footprint.speed);
                    }
                }
            }
        }
    }

    /// Fill from a set of footprints
    pub fn fill(&self, roads: &RoadNetwork, footprints: &[OccupancyFootprint], parallel: bool) {
        if parallel {
            footprints.par_iter().for_each(|f| self.fill_vehicle(roads, f));
        } else {
            footprints.iter().for_each(|f| self.fill_vehicle(roads, f));
        }
    }

    /// Gap-fill passes 1 and 2 for every segment
    pub fn gap_fill(&mut self, roads: &RoadNetwork, parallel: bool) {
        let limit_of = |i: usize| roads.get(i).map(|s| s.occupation_limit).unwrap_or(0);
        let run = |(i, chunk): (usize, &mut [AtomicCell])| {
            let limit = limit_of(i).min(SLOTS_PER_SEGMENT);
            for lane in 0..LANES {
                gap_fill_propagate(chunk, limit, lane);
                gap_fill_smooth(chunk, limit, lane);
            }
        };
        if parallel {
            self.cells.par_chunks_mut(CELLS_PER_SEGMENT).enumerate().for_each(run);
        } else {
            self.cells.chunks_mut(CELLS_PER_SEGMENT).enumerate().for_each(run);
        }
    }

    /// Blend each linked segment's last cells with its successor's first cells
    pub fn adjust_gaps(&mut self, roads: &RoadNetwork, parallel: bool) {
        let this = &*self;
        let blend = |(i, seg): (usize, &RoadSegment)| -> Option<[GapUpdate; LANES]> {
            let next = seg.next()?;
            if i >= this.segment_count || next >= this.segment_count {
                return None;
            }
            let last_slot = seg.occupation_limit.clamp(1, SLOTS_PER_SEGMENT) - 1;
            let mut out = [GapUpdate::default(); LANES];
            for (lane, entry) in out.iter_mut().enumerate() {
                let tail = &this.cells[Self::index(i, last_slot, lane)];
                let head = &this.cells[Self::index(next, 0, lane)];
                let occupant = tail
                    .occupant
                    .load(Ordering::Relaxed)
                    .min(head.occupant.load(Ordering::Relaxed));
                let newest = tail
                    .newest
                    .load(Ordering::Relaxed)
                    .max(head.newest.load(Ordering::Relaxed));
                let speed_bits = tail
                    .speed_bits
                    .load(Ordering::Relaxed)
                    .min(head.speed_bits.load(Ordering::Relaxed));
                *entry = GapUpdate { index: Self::index(i, last_slot, lane), occupant, newest, speed_bits };
            }
            Some(out)
        };

        // Read everything first so a segment's own adjustment can't feed its predecessor's
        let updates: Vec<[GapUpdate; LANES]> = if parallel {
            roads.segments().par_iter().enumerate().filter_map(blend).collect()
        } else {
            roads.segments().iter().enumerate().filter_map(blend).collect()
        };

        for update in updates.into_iter().flatten() {
            let cell = &mut self.cells[update.index];
            *cell.occupant.get_mut() = update.occupant;
            *cell.newest.get_mut() = update.newest;
            *cell.speed_bits.get_mut() = update.speed_bits;
        }
    }

    /// Full rebuild: clear, fill, gap-fill, adjust
    pub fn rebuild(&mut self, roads: &RoadNetwork, footprints: &[OccupancyFootprint], parallel: bool) {
        if self.segment_count != roads.len() {
            *self = Self::new(roads.len());
        } else {
            self.clear(parallel);
        }
        self.fill(roads, footprints, parallel);
        self.gap_fill(roads, parallel);
        self.adjust_gaps(roads, parallel);
    }

    /// Speed seen in the first slot past the vehicle's front edge, crossing
    /// into the successor at the segment boundary
    pub fn speed_ahead(&self, roads: &RoadNetwork, segment: usize, curve_pos: f32, lane: usize) -> f32 {
        let Some(seg) = roads.get(segment) else {
            return EMPTY_SPEED;
        };
        let limit = seg.occupation_limit.max(1);
        let (_, front) = covered_slots(seg, curve_pos);
        let ahead = front + 1;
        if ahead < limit {
            return self.cell(segment, ahead, lane).speed;
        }
        match seg.next().and_then(|n| roads.get(n).map(|s| (n, s))) {
            Some((next, next_seg)) => {
                let slot = (ahead - limit).min(next_seg.occupation_limit.max(1) - 1);
                self.cell(next, slot, lane).speed
            }
            None => EMPTY_SPEED,
        }
    }

    /// Whether any cell in the window around a vehicle's footprint on `lane`
    /// holds a vehicle other than `self_id`, including cells shared with it
    pub fn lane_blocked(
        &self,
        roads: &RoadNetwork,
        segment: usize,
        curve_pos: f32,
        lane: usize,
        self_id: u32,
        window: usize,
    ) -> bool {
        let Some(seg) = roads.get(segment) else {
            return false;
        };
        let limit = seg.occupation_limit.max(1);
        let (first, last) = covered_slots(seg, curve_pos);
        let first = first.saturating_sub(window);
        let last = (last + window).min(limit - 1);
        (first..=last).any(|slot| self.cell(segment, slot, lane).held_by_other(self_id))
    }

    /// Snapshot of one segment's cells (slot-major)
    pub fn segment_cells(&self, segment: usize) -> Vec<OccupancyCell> {
        (0..SLOTS_PER_SEGMENT)
            .flat_map(|slot| (0..LANES).map(move |lane| (slot, lane)))
            .map(|(slot, lane)| self.cell(segment, slot, lane))
            .collect()
    }

    /// Number of occupied cells (diagnostics)
    pub fn occupied_count(&self) -> usize {
        self.cells
            .iter()
            .filter(|c| c.occupant.load(Ordering::Relaxed) != RAW_EMPTY)
            .count()
    }
}

/// Slot range `[first, last]` covered by `curve_pos ± half length`.
/// `first` is clamped to 0; `last` may run past the segment end, the caller
/// decides whether the excess spills into a successor.
fn covered_slots(seg: &RoadSegment, curve_pos: f32) -> (usize, usize) {
    let limit = seg.occupation_limit.max(1) as f32;
    let first = seg.slot_at(curve_pos - seg.vehicle_half_len);
    let hi = ((curve_pos + seg.vehicle_half_len) * limit).floor();
    let last = if hi > 0.0 { (hi as usize).min(2 * SLOTS_PER_SEGMENT) } else { 0 };
    (first, last.max(first))
}

/// Pass 1: walk backward carrying the last occupant's speed into empty cells,
/// adding a small increment per empty step
fn gap_fill_propagate(chunk: &mut [AtomicCell], limit: usize, lane: usize) {
    let mut carried: Option<f32> = None;
    for slot in (0..limit).rev() {
        let cell = &mut chunk[local_index(slot, lane)];
        if cell.is_occupied_mut() {
            carried = Some(cell.speed_mut());
        } else if let Some(speed) = carried {
            let speed = speed + GAP_FILL_INCREMENT;
            cell.set_speed_mut(speed);
            carried = Some(speed);
        }
    }
}

/// Pass 2: each cell takes the minimum of itself and its successor's pass-1 value
fn gap_fill_smooth(chunk: &mut [AtomicCell], limit: usize, lane: usize) {
    let mut successor: Option<f32> = None;
    for slot in (0..limit).rev() {
        let cell = &mut chunk[local_index(slot, lane)];
        let own = cell.speed_mut();
        if let Some(next) = successor {
            if next < own {
                cell.set_speed_mut(next);
            }
        }
        successor = Some(own);
    }
}
