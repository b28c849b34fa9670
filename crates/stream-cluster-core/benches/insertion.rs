//! CF-tree Performance Benchmarks
//!
//! Measures per-point insertion cost and global consolidation cost.
//!
//! Run: cargo bench -p stream-cluster-core -- insertion

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use stream_cluster_core::clustering::{CfTree, GlobalConsolidator};
use stream_cluster_core::ClusterParams;

fn frames(count: usize, dimension: usize, seed: u64) -> Vec<Vec<f64>> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    (0..count)
        .map(|_| (0..dimension).map(|_| rng.gen_range(0.0..1.0)).collect())
        .collect()
}

fn build(points: &[Vec<f64>], threshold: f64, branching: usize) -> CfTree {
    let params = ClusterParams::new(threshold).with_branching_factor(branching);
    let mut tree = CfTree::new(params).expect("valid params");
    for p in points {
        tree.insert(p).expect("uniform dimension");
    }
    tree
}

/// Stream 10k points into a fresh tree, varying the dimension.
fn bench_insert_stream(c: &mut Criterion) {
    let mut group = c.benchmark_group("insert_stream");
    for dimension in [2usize, 16, 128] {
        let points = frames(10_000, dimension, 7);
        group.throughput(Throughput::Elements(points.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(dimension), &points, |b, points| {
            b.iter(|| black_box(build(points, 0.5, 50)))
        });
    }
    group.finish();
}

/// Branching factor trades node scan cost against tree height.
fn bench_branching_factor(c: &mut Criterion) {
    let points = frames(10_000, 8, 11);
    let mut group = c.benchmark_group("branching_factor");
    for branching in [4usize, 16, 50, 200] {
        group.bench_with_input(BenchmarkId::from_parameter(branching), &points, |b, points| {
            b.iter(|| black_box(build(points, 0.3, branching)))
        });
    }
    group.finish();
}

/// Consolidate a fixed leaf set down to 10 clusters.
fn bench_consolidate(c: &mut Criterion) {
    let mut group = c.benchmark_group("consolidate");
    for count in [1_000usize, 5_000] {
        let tree = build(&frames(count, 4, 3), 0.05, 50);
        let consolidator = GlobalConsolidator::new(10).expect("non-zero target");
        group.bench_with_input(BenchmarkId::from_parameter(tree.leaf_count()), &tree, |b, tree| {
            b.iter(|| black_box(consolidator.consolidate(tree).expect("consolidation")))
        });
    }
    group.finish();
}

criterion_group!(benches, bench_insert_stream, bench_branching_factor, bench_consolidate);
criterion_main!(benches);
