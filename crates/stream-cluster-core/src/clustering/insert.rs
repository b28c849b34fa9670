//! Insertion engine for the CF-tree.
//!
//! One insertion is a single synchronous step:
//! 1. Descend from the root to a leaf node, taking the entry with the
//!    nearest centroid at every level (first entry wins ties).
//! 2. Take the nearest leaf CF and absorb the input if the merged radius
//!    stays within T; otherwise add a new singleton leaf CF.
//! 3. Add the input's statistics to every ancestor entry on the path.
//! 4. Split overflowing nodes bottom-up; a root split adds a level.
//!
//! Every check that can fail runs before the first mutation, so a rejected
//! input leaves the tree untouched.

use tracing::{debug, trace};

use crate::config::constants::radius_slack;
use crate::error::{ClusterError, Result};

use super::feature::ClusteringFeature;
use super::node::{CfEntry, CfNode, EntryRef, LeafId, NodeId};
use super::tree::CfTree;

/// Outcome of one successful insertion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Insertion {
    /// Leaf cluster that now holds the input.
    pub leaf: LeafId,
    /// Whether a new leaf CF was created for the input.
    pub created: bool,
    /// Whether absorbing into the nearest leaf CF was rejected because it
    /// would have overflowed, forcing a singleton.
    pub anomaly: bool,
}

/// What is being inserted: a raw point, or a whole CF (a weighted point).
#[derive(Clone, Copy)]
enum Payload<'a> {
    Point(&'a [f64]),
    Feature(&'a ClusteringFeature),
}

impl Payload<'_> {
    fn dimension(&self) -> usize {
        match self {
            Payload::Point(p) => p.len(),
            Payload::Feature(f) => f.dimension(),
        }
    }

    fn weight(&self) -> u64 {
        match self {
            Payload::Point(_) => 1,
            Payload::Feature(f) => f.n,
        }
    }

    fn distance_sq(&self, cf: &ClusteringFeature) -> f64 {
        match self {
            Payload::Point(p) => cf.squared_distance_to(p),
            Payload::Feature(f) => cf.squared_centroid_distance(f),
        }
    }

    fn fits(&self, cf: &ClusteringFeature, threshold: f64) -> bool {
        match self {
            Payload::Point(p) => cf.would_fit(p, threshold),
            Payload::Feature(f) => cf.would_fit_feature(f, threshold),
        }
    }

    fn stays_finite(&self, cf: &ClusteringFeature) -> bool {
        match self {
            Payload::Point(p) => cf.merge_stays_finite(p),
            Payload::Feature(f) => cf.merge_feature_stays_finite(f),
        }
    }

    fn absorb_into(&self, cf: &mut ClusteringFeature) -> Result<()> {
        match self {
            Payload::Point(p) => cf.merge_point(p),
            Payload::Feature(f) => cf.merge(f),
        }
    }

    fn to_feature(self) -> ClusteringFeature {
        match self {
            Payload::Point(p) => ClusteringFeature::from_point(p),
            Payload::Feature(f) => f.clone(),
        }
    }
}

impl CfTree {
    /// Insert a point into the tree.
    ///
    /// The first point fixes the tree's dimension.
    ///
    /// # Errors
    ///
    /// - `ClusterError::DimensionMismatch` if the point disagrees with the
    ///   established dimension (fatal for a run).
    /// - `ClusterError::NumericAnomaly` if the point, or the ancestor
    ///   statistics after propagating it, would be non-finite. The tree is
    ///   unchanged (recoverable for a run).
    /// - `ClusterError::InvalidParameter` for a point with no coordinates.
    pub fn insert(&mut self, point: &[f64]) -> Result<Insertion> {
        self.insert_payload(Payload::Point(point))
    }

    /// Insert a whole CF as one weighted input.
    ///
    /// Used to fan several independent trees into one. The CF goes through
    /// the same descent, radius gate and splits as a point, so the leaf
    /// radius bound keeps holding.
    ///
    /// # Errors
    ///
    /// As [`CfTree::insert`], plus `ClusterError::InvalidParameter` if the CF
    /// is empty or its own radius already exceeds T.
    pub fn insert_feature(&mut self, cf: &ClusteringFeature) -> Result<Insertion> {
        if cf.is_empty() {
            return Err(ClusterError::invalid_parameter(
                "cannot insert an empty clustering feature",
            ));
        }
        let threshold = self.params.threshold;
        let radius = cf.radius();
        if radius > threshold + radius_slack(threshold) {
            return Err(ClusterError::invalid_parameter(format!(
                "clustering feature radius {} exceeds threshold {}",
                radius, threshold
            )));
        }
        self.insert_payload(Payload::Feature(cf))
    }

    fn insert_payload(&mut self, payload: Payload<'_>) -> Result<Insertion> {
        let dimension = payload.dimension();
        if dimension == 0 {
            return Err(ClusterError::invalid_parameter(
                "points must have at least one coordinate",
            ));
        }
        if let Some(expected) = self.dimension {
            if dimension != expected {
                return Err(ClusterError::dimension_mismatch(expected, dimension));
            }
        }

        let singleton = payload.to_feature();
        if !singleton.is_finite() {
            return Err(ClusterError::numeric_anomaly(
                "input has non-finite coordinates or squared norm",
            ));
        }

        let (path, leaf_node) = self.descend(&payload)?;

        for &(node, idx) in &path {
            if !payload.stays_finite(&self.nodes[node.0].entries()[idx].cf) {
                return Err(ClusterError::numeric_anomaly(format!(
                    "propagating input into {} would overflow its statistics",
                    node
                )));
            }
        }

        let threshold = self.params.threshold;
        let mut anomaly = false;
        let absorb_at = {
            let node = &self.nodes[leaf_node.0];
            node.nearest_by(|cf| payload.distance_sq(cf))
                .and_then(|idx| {
                    let cf = &node.entries()[idx].cf;
                    if !payload.stays_finite(cf) {
                        anomaly = true;
                        None
                    } else if payload.fits(cf, threshold) {
                        Some(idx)
                    } else {
                        None
                    }
                })
        };

        let (leaf, created) = match absorb_at {
            Some(idx) => {
                let entry = self.nodes[leaf_node.0].entry_mut(idx).ok_or_else(|| {
                    ClusterError::invalid_state(format!("{} lost entry {}", leaf_node, idx))
                })?;
                let leaf = match entry.target {
                    EntryRef::Leaf(leaf) => leaf,
                    EntryRef::Child(child) => {
                        return Err(ClusterError::invalid_state(format!(
                            "leaf {} points at child {}",
                            leaf_node, child
                        )))
                    }
                };
                payload.absorb_into(&mut entry.cf)?;
                (leaf, false)
            }
            None => {
                let leaf = self.allocate_leaf(leaf_node);
                self.nodes[leaf_node.0].push(CfEntry::leaf(singleton, leaf));
                (leaf, true)
            }
        };

        for &(node, idx) in &path {
            if let Some(entry) = self.nodes[node.0].entry_mut(idx) {
                payload.absorb_into(&mut entry.cf)?;
            }
        }

        if self.dimension.is_none() {
            self.dimension = Some(dimension);
        }
        self.total_points += payload.weight();

        trace!(%leaf, created, anomaly, depth = path.len(), "Inserted into CF-tree");

        if created {
            self.split_upward(leaf_node)?;
        }

        Ok(Insertion {
            leaf,
            created,
            anomaly,
        })
    }

    /// Walk from the root to a leaf node.
    ///
    /// Returns the (internal node, entry index) pairs taken on the way down
    /// and the leaf node reached.
    fn descend(&self, payload: &Payload<'_>) -> Result<(Vec<(NodeId, usize)>, NodeId)> {
        let mut path = Vec::new();
        let mut current = self.root;

        loop {
            let node = &self.nodes[current.0];
            if node.is_leaf {
                return Ok((path, current));
            }

            let idx = node
                .nearest_by(|cf| payload.distance_sq(cf))
                .ok_or_else(|| {
                    ClusterError::invalid_state(format!("internal {} has no entries", current))
                })?;

            match node.entries()[idx].target {
                EntryRef::Child(child) => {
                    path.push((current, idx));
                    current = child;
                }
                EntryRef::Leaf(leaf) => {
                    return Err(ClusterError::invalid_state(format!(
                        "internal {} holds {}",
                        current, leaf
                    )))
                }
            }
        }
    }

    /// Split `start` and then every ancestor that overflows as a result.
    fn split_upward(&mut self, start: NodeId) -> Result<()> {
        let dimension = self.dimension.unwrap_or(0);
        let capacity = self.params.branching_factor;
        let mut current = start;

        while self.nodes[current.0].is_overflowing() {
            let moved = self.nodes[current.0].split();
            if moved.is_empty() {
                return Err(ClusterError::invalid_state(format!(
                    "{} overflows but cannot be split",
                    current
                )));
            }

            let is_leaf = self.nodes[current.0].is_leaf;
            let parent = self.nodes[current.0].parent;
            let sibling = NodeId(self.nodes.len());
            let mut sibling_node = if is_leaf {
                CfNode::new_leaf(capacity, parent)
            } else {
                CfNode::new_internal(capacity, parent)
            };

            for entry in moved {
                match entry.target {
                    EntryRef::Child(child) => self.nodes[child.0].parent = Some(sibling),
                    EntryRef::Leaf(leaf) => self.leaves[leaf.0] = sibling,
                }
                sibling_node.push(entry);
            }
            self.nodes.push(sibling_node);

            let kept_cf = self.nodes[current.0].total_cf(dimension);
            let sibling_cf = self.nodes[sibling.0].total_cf(dimension);

            debug!(
                node = %current,
                %sibling,
                kept = self.nodes[current.0].len(),
                moved = self.nodes[sibling.0].len(),
                leaf = is_leaf,
                "Split CF-tree node"
            );

            match parent {
                Some(parent_id) => {
                    let parent_node = &mut self.nodes[parent_id.0];
                    let idx = parent_node.position_of_child(current).ok_or_else(|| {
                        ClusterError::invalid_state(format!(
                            "{} is not listed in its parent {}",
                            current, parent_id
                        ))
                    })?;
                    if let Some(entry) = parent_node.entry_mut(idx) {
                        entry.cf = kept_cf;
                    }
                    parent_node.insert(idx + 1, CfEntry::child(sibling_cf, sibling));
                    current = parent_id;
                }
                None => {
                    let new_root = NodeId(self.nodes.len());
                    let mut root = CfNode::new_internal(capacity, None);
                    root.push(CfEntry::child(kept_cf, current));
                    root.push(CfEntry::child(sibling_cf, sibling));
                    self.nodes.push(root);
                    self.nodes[current.0].parent = Some(new_root);
                    self.nodes[sibling.0].parent = Some(new_root);
                    self.root = new_root;
                    debug!(root = %new_root, height = self.height(), "CF-tree grew a level");
                    break;
                }
            }
        }

        Ok(())
    }
}
