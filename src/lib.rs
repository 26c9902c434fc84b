//! NPC Traffic Core
//!
//! Deterministic, data-parallel traffic simulation over a baked road network.
//!
//! - `traffic` - road model, occupancy grid, path/lane/speed pipeline, steering and spawning
//! - `kdtree` - parallel-built k-d tree for range and nearest-neighbour queries
//! - `metrics` - lock-free counters with Prometheus and JSON output

pub mod config;
pub mod kdtree;
pub mod metrics;
pub mod traffic;
pub mod util;
