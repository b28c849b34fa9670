//! Streaming CF-tree clustering.
//!
//! Points are summarized into clustering features (CFs) held by a
//! height-balanced tree of bounded-fanout nodes. Each point is routed to its
//! nearest leaf CF and either absorbed (when the merged radius stays within
//! the threshold T) or stored as a new leaf CF. The leaf CFs are the leaf
//! clusters; [`GlobalConsolidator`] can then merge them down to exactly K.
//!
//! # Modules
//!
//! - `feature`: [`ClusteringFeature`] sufficient statistics
//! - `node`: [`CfNode`] entries and the split operation
//! - `tree`: [`CfTree`] arena and read access
//! - `insert`: the insertion engine
//! - `consolidate`: post-stream reduction to K clusters
//! - `fan_in`: merging independent trees
//! - `snapshot`: persisted form of a tree
//! - `calibrate`: consecutive-distance scan and threshold from a data sample

mod calibrate;
mod consolidate;
mod fan_in;
mod feature;
mod insert;
mod invariants;
mod node;
mod snapshot;
mod tree;

pub use calibrate::{calibrate_threshold, scan_distances, DistanceScan};
pub use consolidate::{Consolidation, GlobalConsolidator};
pub use fan_in::merge_trees;
pub use feature::ClusteringFeature;
pub use insert::Insertion;
pub use node::{CfEntry, CfNode, EntryRef, LeafId, NodeId};
pub use snapshot::{EntryRecord, NodeRecord, TreeSnapshot};
pub use tree::CfTree;
