//! Run configuration.
//!
//! [`ClusterParams`] carries the radius threshold T, branching factor B,
//! optional target cluster count K and an optional input record limit.
//! Values are never clamped: build them with the `with_*` setters, then call
//! [`ClusterParams::validate`], which fails fast with a message naming the
//! offending field. [`crate::clustering::CfTree::new`] and
//! [`crate::run::ClusterRun::new`] validate for you.
//!
//! Parameters can also be read from TOML:
//!
//! ```toml
//! threshold = 0.25
//! branching_factor = 32
//! target_clusters = 8
//! ```
//!
//! `threshold` is required; every other key falls back to its default.

pub mod constants;

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ClusterError, Result};

use constants::{DEFAULT_BRANCHING_FACTOR, DEFAULT_THRESHOLD, MIN_BRANCHING_FACTOR};

fn default_branching_factor() -> usize {
    DEFAULT_BRANCHING_FACTOR
}

/// Parameters for one clustering run.
///
/// # Example
///
/// ```
/// use stream_cluster_core::config::ClusterParams;
///
/// let params = ClusterParams::new(0.5)
///     .with_branching_factor(8)
///     .with_target_clusters(3);
/// assert!(params.validate().is_ok());
///
/// let invalid = ClusterParams::new(0.0);
/// assert!(invalid.validate().is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterParams {
    /// Maximum radius T of a leaf CF. Must be finite and > 0.
    pub threshold: f64,

    /// Maximum entries per node (B). Must be >= 2.
    #[serde(default = "default_branching_factor")]
    pub branching_factor: usize,

    /// Target cluster count K. `None` disables consolidation and the leaf
    /// CFs are the final clusters.
    #[serde(default)]
    pub target_clusters: Option<usize>,

    /// Stop after consuming this many input records (malformed ones
    /// included). `None` consumes the whole stream.
    #[serde(default)]
    pub max_records: Option<usize>,
}

impl Default for ClusterParams {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            branching_factor: DEFAULT_BRANCHING_FACTOR,
            target_clusters: None,
            max_records: None,
        }
    }
}

impl ClusterParams {
    /// Create params with the given threshold and default everything else.
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold,
            ..Self::default()
        }
    }

    /// Set threshold.
    #[must_use]
    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    /// Set branching factor.
    #[must_use]
    pub fn with_branching_factor(mut self, bf: usize) -> Self {
        self.branching_factor = bf;
        self
    }

    /// Request consolidation down to `k` clusters.
    #[must_use]
    pub fn with_target_clusters(mut self, k: usize) -> Self {
        self.target_clusters = Some(k);
        self
    }

    /// Limit the number of input records consumed.
    #[must_use]
    pub fn with_max_records(mut self, limit: usize) -> Self {
        self.max_records = Some(limit);
        self
    }

    /// Validate parameters.
    ///
    /// # Errors
    ///
    /// Returns `ClusterError::InvalidParameter` if:
    /// - threshold <= 0.0 or threshold is NaN/Infinity
    /// - branching_factor < 2
    /// - target_clusters is `Some(0)`
    /// - max_records is `Some(0)`
    pub fn validate(&self) -> Result<()> {
        if !self.threshold.is_finite() || self.threshold <= 0.0 {
            return Err(ClusterError::invalid_parameter(format!(
                "threshold must be > 0.0 and finite, got {}. Threshold bounds the radius of every leaf cluster.",
                self.threshold
            )));
        }

        if self.branching_factor < MIN_BRANCHING_FACTOR {
            return Err(ClusterError::invalid_parameter(format!(
                "branching_factor must be >= {}, got {}. A node split needs two groups.",
                MIN_BRANCHING_FACTOR, self.branching_factor
            )));
        }

        if self.target_clusters == Some(0) {
            return Err(ClusterError::invalid_parameter(
                "target_clusters must be >= 1 when set, got 0",
            ));
        }

        if self.max_records == Some(0) {
            return Err(ClusterError::invalid_parameter(
                "max_records must be >= 1 when set, got 0",
            ));
        }

        Ok(())
    }

    /// Parse and validate params from a TOML document.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let params: ClusterParams = toml::from_str(s)?;
        params.validate()?;
        Ok(params)
    }

    /// Render params as TOML.
    pub fn to_toml_string(&self) -> Result<String> {
        Ok(toml::to_string(self)?)
    }

    /// Load and validate params from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)?;
        let params = Self::from_toml_str(&text)?;
        debug!(path = %path.display(), ?params, "Loaded cluster params");
        Ok(params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // =========================================================================
    // DEFAULTS
    // =========================================================================

    #[test]
    fn test_defaults_are_valid() {
        let params = ClusterParams::default();
        assert_eq!(params.branching_factor, DEFAULT_BRANCHING_FACTOR);
        assert!((params.threshold - DEFAULT_THRESHOLD).abs() < f64::EPSILON);
        assert_eq!(params.target_clusters, None);
        assert_eq!(params.max_records, None);
        assert!(params.validate().is_ok(), "Default params must be valid");
        println!("[PASS] test_defaults_are_valid");
    }

    // =========================================================================
    // VALIDATION - FAIL FAST
    // =========================================================================

    #[test]
    fn test_validation_rejects_non_positive_threshold() {
        for t in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            let result = ClusterParams::new(t).validate();
            let err = result.expect_err("threshold must be rejected");
            assert!(
                err.to_string().contains("threshold"),
                "Error must mention field name, got: {}",
                err
            );
        }
        println!("[PASS] test_validation_rejects_non_positive_threshold");
    }

    #[test]
    fn test_validation_rejects_branching_factor_below_2() {
        let err = ClusterParams::new(0.5)
            .with_branching_factor(1)
            .validate()
            .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("branching_factor"), "got: {}", msg);
        assert!(msg.contains('2'), "Error must mention minimum value");

        assert!(ClusterParams::new(0.5)
            .with_branching_factor(2)
            .validate()
            .is_ok());
    }

    #[test]
    fn test_validation_rejects_zero_target_clusters() {
        let err = ClusterParams::new(0.5)
            .with_target_clusters(0)
            .validate()
            .unwrap_err();
        assert!(err.to_string().contains("target_clusters"));
        assert!(ClusterParams::new(0.5)
            .with_target_clusters(1)
            .validate()
            .is_ok());
    }

    #[test]
    fn test_validation_rejects_zero_record_limit() {
        let err = ClusterParams::new(0.5)
            .with_max_records(0)
            .validate()
            .unwrap_err();
        assert!(err.to_string().contains("max_records"));
    }

    // =========================================================================
    // TOML
    // =========================================================================

    #[test]
    fn test_toml_minimal_uses_defaults() {
        let params = ClusterParams::from_toml_str("threshold = 0.25").unwrap();
        assert_eq!(params.threshold, 0.25);
        assert_eq!(params.branching_factor, DEFAULT_BRANCHING_FACTOR);
        assert_eq!(params.target_clusters, None);
    }

    #[test]
    fn test_toml_full() {
        let text = r#"
            threshold = 1.5
            branching_factor = 8
            target_clusters = 4
            max_records = 1000
        "#;
        let params = ClusterParams::from_toml_str(text).unwrap();
        assert_eq!(
            params,
            ClusterParams::new(1.5)
                .with_branching_factor(8)
                .with_target_clusters(4)
                .with_max_records(1000)
        );
    }

    #[test]
    fn test_toml_requires_threshold() {
        let err = ClusterParams::from_toml_str("branching_factor = 8").unwrap_err();
        assert!(matches!(err, ClusterError::Serialization(_)), "got {:?}", err);
    }

    #[test]
    fn test_toml_values_are_validated() {
        let err = ClusterParams::from_toml_str("threshold = 0.5\nbranching_factor = 1").unwrap_err();
        assert!(matches!(err, ClusterError::InvalidParameter { .. }));
    }

    #[test]
    fn test_toml_round_trip() {
        let params = ClusterParams::new(0.75).with_target_clusters(3);
        let text = params.to_toml_string().unwrap();
        assert_eq!(ClusterParams::from_toml_str(&text).unwrap(), params);
    }
}
