//! Error types for stream-cluster-core.
//!
//! [`ClusterError`] covers every failure the engine can report. The variants
//! split into two classes:
//!
//! - Fatal: [`ClusterError::InvalidParameter`] (rejected before streaming),
//!   [`ClusterError::DimensionMismatch`] (aborts a run, partial results are
//!   kept), and the ambient I/O, serialization and snapshot errors.
//! - Recoverable: [`ClusterError::Parse`] (the record is skipped) and
//!   [`ClusterError::NumericAnomaly`] (the merge or point is rejected). A run
//!   only counts these and keeps streaming.
//!
//! Library code never panics on bad input; everything flows through
//! [`Result`] and the `?` operator.
//!
//! # Examples
//!
//! ```rust
//! use stream_cluster_core::error::ClusterError;
//!
//! let err = ClusterError::dimension_mismatch(3, 2);
//! assert!(!err.is_recoverable());
//! assert_eq!(err.to_string(), "Dimension mismatch: expected 3, got 2");
//! ```

mod conversions;

#[cfg(test)]
mod tests;

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ClusterError>;

/// Errors produced by the clustering engine and its I/O layer.
#[derive(Debug, Error)]
pub enum ClusterError {
    /// A configuration value is out of range (threshold, branching factor,
    /// target cluster count, record limit).
    #[error("Invalid parameter: {message}")]
    InvalidParameter {
        /// Description naming the offending field and value
        message: String,
    },

    /// A point disagrees with the dimension established by the first point.
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Dimension fixed by the tree
        expected: usize,
        /// Dimension of the rejected input
        actual: usize,
    },

    /// A malformed input record.
    ///
    /// # Recovery
    ///
    /// The record is skipped and counted; streaming continues.
    #[error("Parse error at record {line}: {reason}")]
    Parse {
        /// 1-based line (or record) number in the input
        line: usize,
        /// What was wrong with the record
        reason: String,
    },

    /// A merge or insertion would produce a non-finite statistic.
    ///
    /// # Recovery
    ///
    /// The merge is rejected and counted; streaming continues.
    #[error("Numeric anomaly: {0}")]
    NumericAnomaly(String),

    /// An operation was attempted on a structure in the wrong state.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// A persisted tree does not describe a valid CF-tree.
    #[error("Corrupt snapshot: {0}")]
    CorruptSnapshot(String),

    /// Underlying reader or writer failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Encoding or decoding a persisted representation failed.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl ClusterError {
    /// Create an `InvalidParameter` error.
    pub fn invalid_parameter(message: impl Into<String>) -> Self {
        Self::InvalidParameter {
            message: message.into(),
        }
    }

    /// Create a `DimensionMismatch` error.
    pub fn dimension_mismatch(expected: usize, actual: usize) -> Self {
        Self::DimensionMismatch { expected, actual }
    }

    /// Create a `Parse` error for the given 1-based record number.
    pub fn parse(line: usize, reason: impl Into<String>) -> Self {
        Self::Parse {
            line,
            reason: reason.into(),
        }
    }

    /// Create a `NumericAnomaly` error.
    pub fn numeric_anomaly(message: impl Into<String>) -> Self {
        Self::NumericAnomaly(message.into())
    }

    /// Create an `InvalidState` error.
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState(message.into())
    }

    /// Create a `CorruptSnapshot` error.
    pub fn corrupt_snapshot(message: impl Into<String>) -> Self {
        Self::CorruptSnapshot(message.into())
    }

    /// Whether a streaming run may skip the offending record and continue.
    #[inline]
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Parse { .. } | Self::NumericAnomaly(_))
    }
}
