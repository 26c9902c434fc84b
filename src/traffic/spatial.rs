//! Spatial hash for local avoidance
//!
//! Coarse 3D grid, independent of the occupancy grid. Cleared and refilled every
//! fixed sub-step with one sample per vehicle plus one for the player.

use hashbrown::HashMap;
use rustc_hash::FxBuildHasher;
use smallvec::SmallVec;

use crate::util::vec3::Vec3;

/// Samples stored inline per cell before spilling to the heap
const CELL_INLINE_SAMPLES: usize = 8;

/// Rebuilds between drops of cells that stayed empty through a whole fill
const PRUNE_INTERVAL: u32 = 256;

/// Grid cell key - (x, y, z) cell coordinates
pub type CellKey = (i32, i32, i32);

/// One moving obstacle
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HashSample {
    pub id: u32,
    pub position: Vec3,
    pub velocity: Vec3,
    pub radius: f32,
}

type CellSamples = SmallVec<[HashSample; CELL_INLINE_SAMPLES]>;

/// Spatial hash over vehicle samples
#[derive(Debug)]
pub struct VehicleSpatialHash {
    cell_size: f32,
    /// Inverse cell size for fast position-to-cell conversion
    inv_cell_size: f32,
    cells: HashMap<CellKey, CellSamples, FxBuildHasher>,
    rebuilds: u32,
}

impl VehicleSpatialHash {
    /// `capacity` is the expected number of live cells
    pub fn new(cell_size: f32, capacity: usize) -> Self {
        Self {
            cell_size,
            inv_cell_size: 1.0 / cell_size,
            cells: HashMap::with_capacity_and_hasher(capacity, FxBuildHasher),
            rebuilds: 0,
        }
    }

    #[inline]
    pub fn cell_size(&self) -> f32 {
        self.cell_size
    }

    /// Clear all samples, keeping cell allocations
    #[inline]
    pub fn clear(&mut self) {
        for cell in self.cells.values_mut() {
            cell.clear();
        }
    }

    /// Convert world position to cell key
    #[inline]
    pub fn position_to_cell(&self, position: Vec3) -> CellKey {
        (
            (position.x * self.inv_cell_size).floor() as i32,
            (position.y * self.inv_cell_size).floor() as i32,
            (position.z * self.inv_cell_size).floor() as i32,
        )
    }

    #[inline]
    pub fn insert(&mut self, sample: HashSample) {
        let key = self.position_to_cell(sample.position);
        self.cells.entry(key).or_default().push(sample);
    }

    /// Samples in one cell (empty slice for unknown cells)
    #[inline]
    pub fn cell(&self, key: CellKey) -> &[HashSample] {
        self.cells.get(&key).map(|c| c.as_slice()).unwrap_or(&[])
    }

    /// Rebuild from vehicle samples, then add the player as a last entry.
    /// Every `PRUNE_INTERVAL` rebuilds, cells left empty by the previous fill
    /// are dropped so the map tracks the area in use rather than every cell
    /// ever visited.
    pub fn rebuild(&mut self, samples: impl Iterator<Item = HashSample>, player: Option<HashSample>) {
        self.rebuilds = self.rebuilds.wrapping_add(1);
        if self.rebuilds % PRUNE_INTERVAL == 0 {
            self.cells.retain(|_, cell| !cell.is_empty());
        }
        self.clear();
        for sample in samples {
            self.insert(sample);
        }
        if let Some(player) = player {
            self.insert(player);
        }
    }

    /// Get statistics about the hash
    pub fn stats(&self) -> SpatialHashStats {
        let non_empty_cells = self.cells.values().filter(|c| !c.is_empty()).count();
        let total_samples: usize = self.cells.values().map(|c| c.len()).sum();
        let max_per_cell = self.cells.values().map(|c| c.len()).max().unwrap_or(0);

        SpatialHashStats {
            non_empty_cells,
            total_samples,
            max_per_cell,
        }
    }
}

/// Statistics about the spatial hash
#[derive(Debug, Clone)]
pub struct SpatialHashStats {
    pub non_empty_cells: usize,
    pub total_samples: usize,
    pub max_per_cell: usize,
}
