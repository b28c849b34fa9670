//! Threshold calibration from a sample of the stream.
//!
//! [`scan_distances`] summarizes the distances between consecutive points so
//! a threshold can be chosen by hand; [`calibrate_threshold`] picks one from
//! the median of that summary.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ClusterError, Result};

/// Distribution of consecutive-point distances in a sample.
///
/// Percentiles interpolate linearly between the two nearest sorted
/// distances at position `(count - 1) * q`. The median is the middle
/// distance, or the mean of the two middle distances for an even count.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DistanceScan {
    /// Number of distances (one less than the number of points).
    pub count: usize,
    /// Smallest distance.
    pub min: f64,
    /// 20th percentile.
    pub p20: f64,
    /// Median distance.
    pub median: f64,
    /// 80th percentile.
    pub p80: f64,
    /// Largest distance.
    pub max: f64,
}

fn percentile(sorted: &[f64], q: f64) -> f64 {
    let position = (sorted.len() - 1) as f64 * q;
    let lower = position.floor() as usize;
    let fraction = position - lower as f64;
    match sorted.get(lower + 1) {
        Some(&upper) => sorted[lower] * (1.0 - fraction) + upper * fraction,
        None => sorted[lower],
    }
}

/// Summarize the Euclidean distance between each point and the one before it.
///
/// # Errors
///
/// Returns `ClusterError::InvalidParameter` if there are fewer than 2
/// points, the points disagree on dimension, or a distance is not finite.
pub fn scan_distances<P: AsRef<[f64]>>(points: &[P]) -> Result<DistanceScan> {
    if points.len() < 2 {
        return Err(ClusterError::invalid_parameter(format!(
            "distance scan needs at least 2 points, got {}",
            points.len()
        )));
    }

    let mut distances = Vec::with_capacity(points.len() - 1);
    for (i, pair) in points.windows(2).enumerate() {
        let (a, b) = (pair[0].as_ref(), pair[1].as_ref());
        if a.len() != b.len() {
            return Err(ClusterError::invalid_parameter(format!(
                "distance scan sample mixes dimensions {} and {}",
                a.len(),
                b.len()
            )));
        }
        let d = a
            .iter()
            .zip(b)
            .map(|(x, y)| (x - y) * (x - y))
            .sum::<f64>()
            .sqrt();
        if !d.is_finite() {
            return Err(ClusterError::invalid_parameter(format!(
                "distance between points {} and {} is {}",
                i,
                i + 1,
                d
            )));
        }
        distances.push(d);
    }
    distances.sort_by(|a, b| a.total_cmp(b));

    let count = distances.len();
    let mid = count / 2;
    let median = if count % 2 == 0 {
        (distances[mid - 1] + distances[mid]) / 2.0
    } else {
        distances[mid]
    };

    Ok(DistanceScan {
        count,
        min: distances[0],
        p20: percentile(&distances, 0.2),
        median,
        p80: percentile(&distances, 0.8),
        max: distances[count - 1],
    })
}

/// Derive a radius threshold from consecutive points of a sample.
///
/// Returns `factor` times the median of [`scan_distances`]. For frame
/// streams this tracks the typical frame-to-frame change, so near-duplicate
/// frames share a leaf.
///
/// # Errors
///
/// Returns `ClusterError::InvalidParameter` if `factor` is not finite and
/// positive, the scan fails, or the median distance is zero.
pub fn calibrate_threshold<P: AsRef<[f64]>>(points: &[P], factor: f64) -> Result<f64> {
    if !factor.is_finite() || factor <= 0.0 {
        return Err(ClusterError::invalid_parameter(format!(
            "calibration factor must be finite and > 0, got {}",
            factor
        )));
    }

    let scan = scan_distances(points)?;
    if scan.median <= 0.0 {
        return Err(ClusterError::invalid_parameter(format!(
            "median consecutive distance is {}, cannot derive a threshold",
            scan.median
        )));
    }

    let threshold = scan.median * factor;
    debug!(
        samples = points.len(),
        median = scan.median,
        factor,
        threshold,
        "Calibrated threshold"
    );
    Ok(threshold)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_median_of_odd_count() {
        // Distances 1, 3, 2 -> median 2.
        let points = vec![vec![0.0], vec![1.0], vec![4.0], vec![6.0]];
        let t = calibrate_threshold(&points, 0.5).unwrap();
        assert!((t - 1.0).abs() < 1e-12, "got {}", t);
    }

    #[test]
    fn test_median_of_even_count() {
        // Distances 5, 1 -> median 3.
        let points = [[0.0, 0.0], [3.0, 4.0], [3.0, 5.0]];
        let t = calibrate_threshold(&points, 2.0).unwrap();
        assert!((t - 6.0).abs() < 1e-12, "got {}", t);
    }

    #[test]
    fn test_rejects_degenerate_samples() {
        assert!(calibrate_threshold(&[[1.0]], 1.0).is_err());
        assert!(calibrate_threshold(&[[1.0], [2.0]], 0.0).is_err());
        assert!(calibrate_threshold(&[[1.0], [2.0]], f64::NAN).is_err());
        assert!(calibrate_threshold(&[[1.0], [1.0], [1.0]], 1.0).is_err());

        let mixed: Vec<Vec<f64>> = vec![vec![1.0], vec![1.0, 2.0]];
        assert!(calibrate_threshold(&mixed, 1.0).is_err());
    }

    #[test]
    fn test_scan_interpolates_percentiles_odd_count() {
        // Distances 1, 2, 3, 4, 5.
        let points = [[0.0], [1.0], [3.0], [6.0], [10.0], [15.0]];
        let scan = scan_distances(&points).unwrap();

        assert_eq!(scan.count, 5);
        assert_eq!(scan.min, 1.0);
        assert_eq!(scan.median, 3.0);
        assert_eq!(scan.max, 5.0);
        // Positions 0.8 and 3.2 in the sorted distances.
        assert!((scan.p20 - 1.8).abs() < 1e-12, "p20 {}", scan.p20);
        assert!((scan.p80 - 4.2).abs() < 1e-12, "p80 {}", scan.p80);
        println!("[PASS] test_scan_interpolates_percentiles_odd_count");
    }

    #[test]
    fn test_scan_interpolates_percentiles_even_count() {
        // Distances 2, 4, 6, 8 in shuffled order.
        let points = [[0.0, 0.0], [0.0, 6.0], [8.0, 6.0], [8.0, 8.0], [4.0, 8.0]];
        let scan = scan_distances(&points).unwrap();

        assert_eq!(scan.count, 4);
        assert_eq!(scan.min, 2.0);
        assert_eq!(scan.median, 5.0);
        assert_eq!(scan.max, 8.0);
        // Positions 0.6 and 2.4.
        assert!((scan.p20 - 3.2).abs() < 1e-12, "p20 {}", scan.p20);
        assert!((scan.p80 - 6.8).abs() < 1e-12, "p80 {}", scan.p80);
    }

    #[test]
    fn test_scan_of_single_interval() {
        let scan = scan_distances(&[[0.0, 0.0], [3.0, 4.0]]).unwrap();
        assert_eq!(scan.count, 1);
        for value in [scan.min, scan.p20, scan.median, scan.p80, scan.max] {
            assert_eq!(value, 5.0);
        }
    }

    #[test]
    fn test_scan_serializes_every_statistic() {
        let scan = scan_distances(&[[0.0], [1.0], [3.0]]).unwrap();
        let json = serde_json::to_string(&scan).unwrap();
        for key in ["count", "min", "p20", "median", "p80", "max"] {
            assert!(json.contains(key), "{} missing from {}", key, json);
        }
        assert_eq!(serde_json::from_str::<DistanceScan>(&json).unwrap(), scan);
    }

    #[test]
    fn test_scan_rejects_non_finite_distance() {
        let err = scan_distances(&[[0.0], [f64::INFINITY]]).unwrap_err();
        assert!(matches!(err, ClusterError::InvalidParameter { .. }), "got: {}", err);
    }
}
