//! Default values and numeric tolerances.
//!
//! Every magic number the engine relies on is named here so that
//! configuration, tests and the tree agree on one source of truth.

/// Default radius threshold T.
///
/// Points merge into an existing leaf CF only while the merged radius stays
/// at or below this value.
pub const DEFAULT_THRESHOLD: f64 = 0.5;

/// Default branching factor B (maximum entries per node).
pub const DEFAULT_BRANCHING_FACTOR: usize = 50;

/// Smallest legal branching factor. A split needs two groups.
pub const MIN_BRANCHING_FACTOR: usize = 2;

/// Relative tolerance applied to the radius bound.
///
/// A CF satisfies the bound when `radius <= T + RADIUS_TOLERANCE * max(1, T)`.
pub const RADIUS_TOLERANCE: f64 = 1e-9;

/// Relative tolerance used when comparing summed statistics
/// (ancestor CF vs. sum of its children).
pub const STATISTICS_TOLERANCE: f64 = 1e-9;

/// Absolute slack added to the radius bound for a given threshold.
#[inline]
pub fn radius_slack(threshold: f64) -> f64 {
    RADIUS_TOLERANCE * threshold.max(1.0)
}
