//! Clustering Feature (CF): the additive sufficient statistic of the tree.
//!
//! The CF is a triple (n, LS, SS) that summarizes a set of points:
//! - n: number of data points
//! - LS: linear sum (vector sum of all points)
//! - SS: squared sum (scalar sum of squared norms)
//!
//! Key property: CFs are additive. CF(A ∪ B) = CF(A) + CF(B). Every
//! derived quantity (centroid, radius, merged radius) comes from these three
//! statistics, so absorbing a point or a whole CF is O(D).

use serde::{Deserialize, Serialize};

use crate::config::constants::radius_slack;
use crate::error::{ClusterError, Result};

/// Clustering Feature - statistical summary of a group of points.
///
/// # Example
///
/// ```
/// use stream_cluster_core::clustering::ClusteringFeature;
///
/// let mut cf = ClusteringFeature::from_point(&[1.0, 2.0, 3.0]);
/// cf.merge_point(&[2.0, 3.0, 4.0]).unwrap();
///
/// assert_eq!(cf.n, 2);
/// assert_eq!(cf.centroid(), vec![1.5, 2.5, 3.5]);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusteringFeature {
    /// Number of data points summarized.
    pub n: u64,
    /// Linear sum: Σ Xi (d-dimensional vector).
    pub ls: Vec<f64>,
    /// Squared sum: Σ ||Xi||² (scalar).
    pub ss: f64,
}

/// Radius from merged statistics: sqrt(max(0, SS/n - ||LS/n||²)).
///
/// Overflowed statistics yield an infinite radius, never a clamped zero.
#[inline]
fn radius_from(n: f64, ls_norm_sq: f64, ss: f64) -> f64 {
    if n <= 0.0 {
        return 0.0;
    }
    if !ss.is_finite() || !ls_norm_sq.is_finite() {
        return f64::INFINITY;
    }
    let variance = ss / n - ls_norm_sq / (n * n);
    if variance.is_nan() || variance <= 0.0 {
        0.0
    } else {
        variance.sqrt()
    }
}

#[inline]
fn squared_norm(v: &[f64]) -> f64 {
    v.iter().map(|x| x * x).sum()
}

impl ClusteringFeature {
    /// Create empty CF with given dimension.
    pub fn new(dimension: usize) -> Self {
        Self {
            n: 0,
            ls: vec![0.0; dimension],
            ss: 0.0,
        }
    }

    /// Create CF from a single point.
    pub fn from_point(point: &[f64]) -> Self {
        Self {
            n: 1,
            ls: point.to_vec(),
            ss: squared_norm(point),
        }
    }

    /// Get dimension of this CF.
    #[inline]
    pub fn dimension(&self) -> usize {
        self.ls.len()
    }

    /// Check if CF is empty (no points).
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.n == 0
    }

    /// Whether every statistic is finite.
    pub fn is_finite(&self) -> bool {
        self.ss.is_finite() && self.ls.iter().all(|x| x.is_finite())
    }

    /// Compute centroid (mean point).
    ///
    /// Returns the zero vector if n=0.
    pub fn centroid(&self) -> Vec<f64> {
        if self.n == 0 {
            return vec![0.0; self.ls.len()];
        }
        let n = self.n as f64;
        self.ls.iter().map(|x| x / n).collect()
    }

    /// Compute radius (RMS distance from centroid to points).
    ///
    /// Returns 0.0 if n=0 or if the radicand is negative (rounding).
    pub fn radius(&self) -> f64 {
        radius_from(self.n as f64, squared_norm(&self.ls), self.ss)
    }

    /// Merge another CF into this one.
    ///
    /// # Errors
    ///
    /// Returns `ClusterError::DimensionMismatch` if dimensions differ.
    pub fn merge(&mut self, other: &ClusteringFeature) -> Result<()> {
        if other.n == 0 {
            return Ok(());
        }

        if self.n == 0 && self.ls.is_empty() {
            self.ls = vec![0.0; other.ls.len()];
        }

        if self.ls.len() != other.ls.len() {
            return Err(ClusterError::dimension_mismatch(self.ls.len(), other.ls.len()));
        }

        self.n += other.n;
        for (a, b) in self.ls.iter_mut().zip(other.ls.iter()) {
            *a += b;
        }
        self.ss += other.ss;

        Ok(())
    }

    /// Add a single point to this CF.
    ///
    /// # Errors
    ///
    /// Returns `ClusterError::DimensionMismatch` if point dimension differs.
    pub fn merge_point(&mut self, point: &[f64]) -> Result<()> {
        if self.n == 0 && self.ls.is_empty() {
            self.ls = vec![0.0; point.len()];
        }

        if self.ls.len() != point.len() {
            return Err(ClusterError::dimension_mismatch(self.ls.len(), point.len()));
        }

        self.n += 1;
        for (a, b) in self.ls.iter_mut().zip(point.iter()) {
            *a += b;
        }
        self.ss += squared_norm(point);

        Ok(())
    }

    /// Radius the CF would have after absorbing `point`.
    ///
    /// Computes the hypothetical statistics inline without cloning.
    pub fn radius_with_point(&self, point: &[f64]) -> f64 {
        let n = (self.n + 1) as f64;
        let ls_norm_sq: f64 = self
            .ls
            .iter()
            .zip(point.iter())
            .map(|(a, b)| (a + b) * (a + b))
            .sum();
        radius_from(n, ls_norm_sq, self.ss + squared_norm(point))
    }

    /// Radius of the union of this CF and `other`.
    pub fn merged_radius(&self, other: &ClusteringFeature) -> f64 {
        let n = (self.n + other.n) as f64;
        let ls_norm_sq: f64 = self
            .ls
            .iter()
            .zip(other.ls.iter())
            .map(|(a, b)| (a + b) * (a + b))
            .sum();
        radius_from(n, ls_norm_sq, self.ss + other.ss)
    }

    /// Check if a point would fit within threshold after merging.
    ///
    /// Never mutates. A dimension mismatch or a non-finite hypothetical
    /// radius never fits.
    pub fn would_fit(&self, point: &[f64], threshold: f64) -> bool {
        if self.n == 0 {
            return true;
        }
        if self.ls.len() != point.len() {
            return false;
        }
        let radius = self.radius_with_point(point);
        radius.is_finite() && radius <= threshold + radius_slack(threshold)
    }

    /// Check if a whole CF would fit within threshold after merging.
    pub fn would_fit_feature(&self, other: &ClusteringFeature, threshold: f64) -> bool {
        if self.ls.len() != other.ls.len() {
            return false;
        }
        let radius = self.merged_radius(other);
        radius.is_finite() && radius <= threshold + radius_slack(threshold)
    }

    /// Whether absorbing `point` keeps every statistic finite.
    pub fn merge_stays_finite(&self, point: &[f64]) -> bool {
        (self.ss + squared_norm(point)).is_finite()
            && self
                .ls
                .iter()
                .zip(point.iter())
                .all(|(a, b)| (a + b).is_finite())
    }

    /// Whether absorbing `other` keeps every statistic finite.
    pub fn merge_feature_stays_finite(&self, other: &ClusteringFeature) -> bool {
        (self.ss + other.ss).is_finite()
            && self
                .ls
                .iter()
                .zip(other.ls.iter())
                .all(|(a, b)| (a + b).is_finite())
    }

    /// Squared Euclidean distance from `point` to the centroid.
    pub fn squared_distance_to(&self, point: &[f64]) -> f64 {
        if self.n == 0 {
            return squared_norm(point);
        }
        let n = self.n as f64;
        self.ls
            .iter()
            .zip(point.iter())
            .map(|(a, b)| {
                let d = a / n - b;
                d * d
            })
            .sum()
    }

    /// Euclidean distance from `point` to the centroid.
    pub fn distance_to(&self, point: &[f64]) -> f64 {
        self.squared_distance_to(point).sqrt()
    }

    /// Squared Euclidean distance between the centroids of two CFs.
    pub fn squared_centroid_distance(&self, other: &ClusteringFeature) -> f64 {
        let n1 = (self.n as f64).max(1.0);
        let n2 = (other.n as f64).max(1.0);
        self.ls
            .iter()
            .zip(other.ls.iter())
            .map(|(a, b)| {
                let d = a / n1 - b / n2;
                d * d
            })
            .sum()
    }

    /// Euclidean distance between the centroids of two CFs.
    pub fn centroid_distance(&self, other: &ClusteringFeature) -> f64 {
        self.squared_centroid_distance(other).sqrt()
    }
}
