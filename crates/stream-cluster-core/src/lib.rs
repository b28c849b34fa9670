//! Stream Cluster Core Library
//!
//! Single-pass clustering of unbounded vector streams (video frames, sensor
//! readings, generic points) with a BIRCH-style CF-tree.
//!
//! # Architecture
//!
//! This crate defines:
//! - Clustering features and the CF-tree (`clustering`)
//! - The insertion engine and the optional consolidation to K clusters
//! - Runs with per-point assignments and statistics (`run`)
//! - Text point input, result output and tree snapshots (`io`)
//! - Error types and result aliases (`error`)
//! - Configuration structures (`config`)
//!
//! Logging goes through `tracing`; the library never installs a subscriber.
//!
//! # Example
//!
//! ```
//! use stream_cluster_core::{cluster_points, ClusterParams};
//!
//! let points = [[0.0, 0.0], [0.1, 0.0], [0.0, 0.1], [10.0, 10.0], [10.1, 10.0]];
//! let params = ClusterParams::new(0.5).with_branching_factor(5);
//! let report = cluster_points(params, points).unwrap();
//!
//! assert_eq!(report.cluster_count(), 2);
//! assert_eq!(report.cluster_ids(), vec![0, 0, 0, 1, 1]);
//! ```

pub mod clustering;
pub mod config;
pub mod error;
pub mod io;
pub mod run;

// Re-exports for convenience
pub use clustering::{CfTree, ClusteringFeature, GlobalConsolidator, LeafId};
pub use config::ClusterParams;
pub use error::{ClusterError, Result};
pub use run::{cluster_points, CancelToken, ClusterReport, ClusterRun, RunAborted};
