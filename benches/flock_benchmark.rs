/*
 * Flock Benchmark
 *
 * Measures the hot paths of a tick: building the octree, neighbor queries
 * against a brute-force scan, a full simulation step at several flock sizes,
 * and snapshot encoding for the wire.
 */

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use glam::Vec3;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::time::Duration;

use mirrored_flock::{codec, Octree, OctreeConfig, SimConfig, Simulation, CUBE_SIZE};

fn random_points(n: usize, seed: u64) -> Vec<Vec3> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    (0..n)
        .map(|_| {
            Vec3::new(
                rng.gen_range(-CUBE_SIZE..CUBE_SIZE),
                rng.gen_range(-CUBE_SIZE..CUBE_SIZE),
                rng.gen_range(-CUBE_SIZE..CUBE_SIZE),
            )
        })
        .collect()
}

fn brute_force(points: &[Vec3], center: Vec3, radius: f32, out: &mut Vec<usize>) {
    out.clear();
    for (i, p) in points.iter().enumerate() {
        if (*p - center).abs().max_element() <= radius {
            out.push(i);
        }
    }
}

fn bench_octree_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("octree_build");

    for num_boids in [100, 500, 1000, 2000].iter() {
        let points = random_points(*num_boids, 1);
        let mut octree = Octree::new(OctreeConfig::default()).expect("default config is valid");
        group.bench_with_input(BenchmarkId::from_parameter(num_boids), &points, |b, points| {
            b.iter(|| {
                octree.build(black_box(points));
                black_box(octree.node_count());
            });
        });
    }

    group.finish();
}

fn bench_neighbor_queries(c: &mut Criterion) {
    let mut group = c.benchmark_group("neighbor_queries");
    let radius = 0.7;

    for num_boids in [500, 2000].iter() {
        let points = random_points(*num_boids, 2);
        let mut octree = Octree::new(OctreeConfig::default()).expect("default config is valid");
        octree.build(&points);
        let mut out = Vec::new();

        group.bench_with_input(BenchmarkId::new("octree", num_boids), &points, |b, points| {
            b.iter(|| {
                for (i, p) in points.iter().enumerate() {
                    octree.query_neighbors(i, *p, radius, &mut out);
                    black_box(out.len());
                }
            });
        });

        group.bench_with_input(BenchmarkId::new("brute_force", num_boids), &points, |b, points| {
            b.iter(|| {
                for p in points {
                    brute_force(points, *p, radius, &mut out);
                    black_box(out.len());
                }
            });
        });
    }

    group.finish();
}

fn bench_full_step(c: &mut Criterion) {
    let mut group = c.benchmark_group("full_step");
    group.measurement_time(Duration::from_secs(10));

    for num_boids in [500, 1000, 2000].iter() {
        for parallel in [false, true] {
            let config = SimConfig {
                agent_count: *num_boids,
                seed: Some(7),
                parallel,
                ..SimConfig::default()
            };
            let mut sim = Simulation::new(&config).expect("valid config");
            let label = if parallel { "parallel" } else { "sequential" };

            group.bench_function(BenchmarkId::new(label, num_boids), |b| {
                b.iter(|| black_box(sim.step(1.0 / 60.0).tick));
            });
        }
    }

    group.finish();
}

fn bench_snapshot_encode(c: &mut Criterion) {
    let config = SimConfig {
        seed: Some(3),
        ..SimConfig::default()
    };
    let mut sim = Simulation::new(&config).expect("valid config");
    let snapshot = sim.step(1.0 / 60.0);

    c.bench_function("snapshot_encode", |b| {
        b.iter(|| black_box(codec::encode(black_box(&snapshot)).len()));
    });
    let bytes = codec::encode(&snapshot);
    c.bench_function("snapshot_decode", |b| {
        b.iter(|| black_box(codec::decode(black_box(&bytes)).map(|s| s.tick)));
    });
}

criterion_group!(
    benches,
    bench_octree_build,
    bench_neighbor_queries,
    bench_full_step,
    bench_snapshot_encode
);
criterion_main!(benches);
