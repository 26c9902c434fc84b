use std::time::Instant;

use anyhow::Context;
use tracing::info;
use tracing_subscriber::EnvFilter;

use traffic_core::config::TrafficConfig;
use traffic_core::traffic::constants::grid::LANES;
use traffic_core::traffic::{
    PlayerState, RingLayout, RoadNetwork, SegmentProfile, SpawnPoint, TrafficSimulation, VehicleType,
};
use traffic_core::util::vec3::Vec3;

/// Headless driver: runs the simulation against a scripted player and prints
/// the resulting metrics.
fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    info!("NPC traffic core v{}", env!("CARGO_PKG_VERSION"));

    let config = TrafficConfig::load_or_default();
    config.validate().context("invalid traffic configuration")?;

    let roads = match std::env::var("TRAFFIC_ROAD_FILE") {
        Ok(path) => {
            let json = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read road file {}", path))?;
            RoadNetwork::from_json(&json).with_context(|| format!("failed to load road file {}", path))?
        }
        Err(_) => RoadNetwork::ring(RingLayout::default(), &SegmentProfile::default(), config.path_segments)
            .context("failed to build ring network")?,
    };

    let ticks: u64 = std::env::var("TRAFFIC_TICKS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(3600);

    // One spawner per segment that starts a chain (has a successor)
    let spawn_points: Vec<SpawnPoint> = roads
        .segments()
        .iter()
        .enumerate()
        .filter(|(_, seg)| seg.next().is_some())
        .map(|(i, seg)| SpawnPoint {
            segment: i,
            lane: i % LANES,
            min_speed: seg.min_speed,
            max_speed: seg.max_speed,
            pool_mask: 0,
        })
        .collect();

    let pool = vec![
        VehicleType::new(0, 1.0),
        VehicleType::new(1, 0.85),
        VehicleType::new(2, 1.1),
        VehicleType::new(3, 1.25),
    ];

    let mut sim = TrafficSimulation::new(config, roads, spawn_points, pool)?;
    let metrics = sim.metrics();

    let dt = 1.0 / 60.0;
    let started = Instant::now();
    for tick in 0..ticks {
        let player = scripted_player(tick as f32 * dt);
        let report = sim.tick(dt, Some(player));

        if tick % 600 == 0 {
            let near = sim.vehicles_within(player.position, 50.0);
            info!(
                tick,
                vehicles = sim.vehicle_count(),
                spawned = report.spawned,
                despawned = report.despawned,
                near_player = near.len(),
                "Traffic progress"
            );
        }
    }

    info!(
        ticks,
        elapsed_ms = started.elapsed().as_millis() as u64,
        vehicles = sim.vehicle_count(),
        "Run complete"
    );

    println!("{}", metrics.to_prometheus());
    println!("{}", serde_json::to_string_pretty(&metrics.to_json())?);

    Ok(())
}

/// Player driving a slow circle inside the default ring
fn scripted_player(t: f32) -> PlayerState {
    let angle = t * 0.04;
    let radius = 390.0;
    PlayerState {
        position: Vec3::new(angle.cos() * radius, 0.0, angle.sin() * radius),
        velocity: Vec3::new(-angle.sin(), 0.0, angle.cos()) * (radius * 0.04),
    }
}
