//! Traffic throughput benchmarks
//!
//! Measures full ticks, the occupancy rebuild and k-d tree build/query at
//! several vehicle budgets.
//!
//! Run with: cargo bench --bench traffic

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use traffic_core::config::TrafficConfig;
use traffic_core::kdtree::{KdTree, KdTreeSettings};
use traffic_core::traffic::occupancy::{OccupancyFootprint, OccupancyGrid};
use traffic_core::traffic::vehicle::Vehicle;
use traffic_core::traffic::{
    PlayerState, RingLayout, RoadNetwork, SegmentProfile, SpawnPoint, TrafficSimulation, VehicleType,
};
use traffic_core::util::vec3::Vec3;

const DT: f32 = 1.0 / 60.0;

/// Ring network with a spawner on every segment, warmed up until populated
fn warmed_simulation(max_cars: usize, parallel: bool) -> TrafficSimulation {
    let layout = RingLayout { segments: 128, radius: 1600.0, ..Default::default() };
    let roads = RoadNetwork::ring(layout, &SegmentProfile::default(), 32).expect("ring network");
    let spawn_points = (0..layout.segments)
        .map(|i| SpawnPoint {
            segment: i,
            lane: i % 3,
            min_speed: 8.0,
            max_speed: 16.0,
            pool_mask: 0,
        })
        .collect();
    let pool = vec![VehicleType::new(0, 1.0), VehicleType::new(1, 0.85), VehicleType::new(2, 1.2)];
    let config = TrafficConfig { max_cars, parallel_enabled: parallel, ..Default::default() };
    let mut sim = TrafficSimulation::new(config, roads, spawn_points, pool).expect("simulation");

    for _ in 0..1200 {
        sim.tick(DT, None);
    }
    sim
}

fn player() -> PlayerState {
    PlayerState {
        position: Vec3::new(1600.0, 0.0, 0.0),
        velocity: Vec3::new(0.0, 0.0, 20.0),
    }
}

fn bench_full_tick(c: &mut Criterion) {
    let mut group = c.benchmark_group("full_tick");
    group.sample_size(30);

    for max_cars in [250, 1000, 4000] {
        for parallel in [false, true] {
            let mut sim = warmed_simulation(max_cars, parallel);
            let label = if parallel { "parallel" } else { "sequential" };
            group.throughput(Throughput::Elements(sim.vehicle_count() as u64));
            group.bench_with_input(BenchmarkId::new(label, max_cars), &max_cars, |b, _| {
                b.iter(|| black_box(sim.tick(DT, Some(player()))));
            });
        }
    }

    group.finish();
}

fn bench_occupancy(c: &mut Criterion) {
    let mut group = c.benchmark_group("occupancy_rebuild");
    group.sample_size(50);

    for max_cars in [1000, 4000] {
        let sim = warmed_simulation(max_cars, true);
        let roads = sim.roads().clone();
        let footprints: Vec<OccupancyFootprint> = sim.vehicles().iter().map(Vehicle::footprint).collect();
        let mut grid = OccupancyGrid::new(roads.len());

        group.throughput(Throughput::Elements(footprints.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(max_cars), &max_cars, |b, _| {
            b.iter(|| {
                grid.rebuild(&roads, black_box(&footprints), true);
                black_box(grid.occupied_count())
            });
        });
    }

    group.finish();
}

fn random_points(n: usize) -> Vec<Vec3> {
    let mut rng = SmallRng::seed_from_u64(42);
    (0..n)
        .map(|_| {
            Vec3::new(
                rng.gen_range(-2000.0..2000.0),
                rng.gen_range(-50.0..50.0),
                rng.gen_range(-2000.0..2000.0),
            )
        })
        .collect()
}

fn bench_kdtree(c: &mut Criterion) {
    let mut group = c.benchmark_group("kdtree");
    group.sample_size(50);

    for count in [1_000, 10_000, 100_000] {
        let points = random_points(count);
        group.throughput(Throughput::Elements(count as u64));

        group.bench_with_input(BenchmarkId::new("build_parallel", count), &points, |b, points| {
            b.iter(|| black_box(KdTree::build(points, KdTreeSettings::default(), true)));
        });
        group.bench_with_input(BenchmarkId::new("build_sequential", count), &points, |b, points| {
            b.iter(|| black_box(KdTree::build(points, KdTreeSettings::default(), false)));
        });

        let tree = KdTree::build(&points, KdTreeSettings::default(), true);
        group.bench_with_input(BenchmarkId::new("nearest_16", count), &tree, |b, tree| {
            b.iter(|| black_box(tree.nearest_k(Vec3::new(10.0, 0.0, -25.0), 16)));
        });
        group.bench_with_input(BenchmarkId::new("within_100", count), &tree, |b, tree| {
            b.iter(|| black_box(tree.within_radius(Vec3::new(10.0, 0.0, -25.0), 100.0)));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_full_tick, bench_occupancy, bench_kdtree);
criterion_main!(benches);
