//! Shared helpers for integration tests.

#![allow(dead_code)]

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing_subscriber::EnvFilter;

/// Route engine logs to the test output when `RUST_LOG` is set.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// `per_center` points drawn uniformly within `spread` of each center,
/// centers visited round-robin so the stream interleaves clusters.
pub fn blobs(centers: &[Vec<f64>], per_center: usize, spread: f64, seed: u64) -> Vec<Vec<f64>> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut points = Vec::with_capacity(centers.len() * per_center);
    for _ in 0..per_center {
        for center in centers {
            points.push(
                center
                    .iter()
                    .map(|c| c + rng.gen_range(-spread..=spread))
                    .collect(),
            );
        }
    }
    points
}

/// `count` points uniform in `[-extent, extent]^dimension`.
pub fn uniform(count: usize, dimension: usize, extent: f64, seed: u64) -> Vec<Vec<f64>> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    (0..count)
        .map(|_| {
            (0..dimension)
                .map(|_| rng.gen_range(-extent..=extent))
                .collect()
        })
        .collect()
}
