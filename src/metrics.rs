//! Traffic simulation metrics
//!
//! Lock-free counters updated by the simulation owner, readable from any thread.
//! Rendered as Prometheus text or JSON by whoever embeds the simulation.

use parking_lot::RwLock;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Tick-time samples kept for percentiles
const TICK_HISTORY_LEN: usize = 1000;

/// Metrics registry for one traffic simulation
#[derive(Debug)]
pub struct TrafficMetrics {
    // Population
    pub vehicles_live: AtomicU64,
    pub vehicles_spawned: AtomicU64,
    pub vehicles_despawned: AtomicU64,
    pub spawns_rejected: AtomicU64,

    // Lane changes
    pub lane_switches_started: AtomicU64,
    pub lane_switches_aborted: AtomicU64,

    // Grid state after the last rebuild
    pub occupied_cells: AtomicU64,
    pub hash_cells: AtomicU64,
    pub hash_max_per_cell: AtomicU64,

    // Tick timing (microseconds)
    pub tick_time_us: AtomicU64,
    pub tick_time_p95_us: AtomicU64,
    pub tick_time_p99_us: AtomicU64,
    pub tick_time_max_us: AtomicU64,

    pub tick_count: AtomicU64,
    pub substep_count: AtomicU64,

    start_time: Instant,

    // Rolling tick times for percentile calculation (VecDeque for O(1) pop_front)
    tick_history: RwLock<VecDeque<u64>>,
}

impl TrafficMetrics {
    pub fn new() -> Self {
        Self {
            vehicles_live: AtomicU64::new(0),
            vehicles_spawned: AtomicU64::new(0),
            vehicles_despawned: AtomicU64::new(0),
            spawns_rejected: AtomicU64::new(0),
            lane_switches_started: AtomicU64::new(0),
            lane_switches_aborted: AtomicU64::new(0),
            occupied_cells: AtomicU64::new(0),
            hash_cells: AtomicU64::new(0),
            hash_max_per_cell: AtomicU64::new(0),
            tick_time_us: AtomicU64::new(0),
            tick_time_p95_us: AtomicU64::new(0),
            tick_time_p99_us: AtomicU64::new(0),
            tick_time_max_us: AtomicU64::new(0),
            tick_count: AtomicU64::new(0),
            substep_count: AtomicU64::new(0),
            start_time: Instant::now(),
            tick_history: RwLock::new(VecDeque::with_capacity(TICK_HISTORY_LEN)),
        }
    }

    /// Record a tick time and update percentiles
    pub fn record_tick_time(&self, duration: Duration) {
        let us = duration.as_micros() as u64;
        self.tick_time_us.store(us, Ordering::Relaxed);
        self.tick_count.fetch_add(1, Ordering::Relaxed);

        let mut history = self.tick_history.write();
        history.push_back(us);
        while history.len() > TICK_HISTORY_LEN {
            history.pop_front();
        }

        if history.len() >= 10 {
            let mut sorted: Vec<u64> = history.iter().copied().collect();
            sorted.sort_unstable();

            let p95_idx = (sorted.len() as f32 * 0.95) as usize;
            let p99_idx = (sorted.len() as f32 * 0.99) as usize;

            self.tick_time_p95_us.store(sorted[p95_idx.min(sorted.len() - 1)], Ordering::Relaxed);
            self.tick_time_p99_us.store(sorted[p99_idx.min(sorted.len() - 1)], Ordering::Relaxed);
            self.tick_time_max_us.store(sorted.last().copied().unwrap_or(0), Ordering::Relaxed);
        }
    }

    #[inline]
    pub fn add(counter: &AtomicU64, n: usize) {
        if n > 0 {
            counter.fetch_add(n as u64, Ordering::Relaxed);
        }
    }

    #[inline]
    pub fn set(gauge: &AtomicU64, value: usize) {
        gauge.store(value as u64, Ordering::Relaxed);
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Generate Prometheus-format metrics output
    pub fn to_prometheus(&self) -> String {
        let mut output = String::with_capacity(2048);

        macro_rules! metric {
            ($name:expr, $help:expr, $type:expr, $value:expr) => {
                output.push_str(&format!(
                    "# HELP {} {}\n# TYPE {} {}\n{} {}\n",
                    $name, $help, $name, $type, $name, $value
                ));
            };
        }

        metric!("traffic_vehicles", "Live NPC vehicles", "gauge",
            self.vehicles_live.load(Ordering::Relaxed));
        metric!("traffic_vehicles_spawned_total", "Vehicles created", "counter",
            self.vehicles_spawned.load(Ordering::Relaxed));
        metric!("traffic_vehicles_despawned_total", "Vehicles destroyed at terminal segments", "counter",
            self.vehicles_despawned.load(Ordering::Relaxed));
        metric!("traffic_spawns_rejected_total", "Spawn requests dropped at flush", "counter",
            self.spawns_rejected.load(Ordering::Relaxed));

        metric!("traffic_lane_switches_started_total", "Lane switches started", "counter",
            self.lane_switches_started.load(Ordering::Relaxed));
        metric!("traffic_lane_switches_aborted_total", "Lane switches reversed", "counter",
            self.lane_switches_aborted.load(Ordering::Relaxed));

        metric!("traffic_occupied_cells", "Occupied occupancy cells", "gauge",
            self.occupied_cells.load(Ordering::Relaxed));
        metric!("traffic_hash_cells", "Non-empty spatial hash cells", "gauge",
            self.hash_cells.load(Ordering::Relaxed));
        metric!("traffic_hash_max_per_cell", "Most samples in one hash cell", "gauge",
            self.hash_max_per_cell.load(Ordering::Relaxed));

        metric!("traffic_tick_time_microseconds", "Current tick time in microseconds", "gauge",
            self.tick_time_us.load(Ordering::Relaxed));
        metric!("traffic_tick_time_p95_microseconds", "95th percentile tick time", "gauge",
            self.tick_time_p95_us.load(Ordering::Relaxed));
        metric!("traffic_tick_time_p99_microseconds", "99th percentile tick time", "gauge",
            self.tick_time_p99_us.load(Ordering::Relaxed));
        metric!("traffic_tick_time_max_microseconds", "Maximum tick time", "gauge",
            self.tick_time_max_us.load(Ordering::Relaxed));
        metric!("traffic_tick_count", "Total ticks processed", "counter",
            self.tick_count.load(Ordering::Relaxed));
        metric!("traffic_substep_count", "Total fixed sub-steps integrated", "counter",
            self.substep_count.load(Ordering::Relaxed));
        metric!("traffic_uptime_seconds", "Simulation uptime in seconds", "counter",
            self.uptime_seconds());

        output
    }

    /// JSON snapshot of the same values
    pub fn to_json(&self) -> serde_json::Value {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        serde_json::json!({
            "vehicles": {
                "live": load(&self.vehicles_live),
                "spawned": load(&self.vehicles_spawned),
                "despawned": load(&self.vehicles_despawned),
                "rejected": load(&self.spawns_rejected),
            },
            "lanes": {
                "switches_started": load(&self.lane_switches_started),
                "switches_aborted": load(&self.lane_switches_aborted),
            },
            "grids": {
                "occupied_cells": load(&self.occupied_cells),
                "hash_cells": load(&self.hash_cells),
                "hash_max_per_cell": load(&self.hash_max_per_cell),
            },
            "performance": {
                "tick_time_us": load(&self.tick_time_us),
                "tick_time_p95_us": load(&self.tick_time_p95_us),
                "tick_time_p99_us": load(&self.tick_time_p99_us),
                "tick_time_max_us": load(&self.tick_time_max_us),
                "tick_count": load(&self.tick_count),
                "substep_count": load(&self.substep_count),
                "uptime_seconds": self.uptime_seconds(),
            },
        })
    }
}

impl Default for TrafficMetrics {
    fn default() -> Self {
        Self::new()
    }
}
