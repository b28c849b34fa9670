//! Structural and statistical invariant checks for a CF-tree.
//!
//! Used by tests after every insertion and by snapshot restore to reject
//! trees that could not have been produced by the insertion engine.

use std::collections::HashSet;

use crate::config::constants::{radius_slack, STATISTICS_TOLERANCE};
use crate::error::{ClusterError, Result};

use super::feature::ClusteringFeature;
use super::node::{EntryRef, NodeId};
use super::tree::CfTree;

fn close(a: f64, b: f64) -> bool {
    (a - b).abs() <= STATISTICS_TOLERANCE * (1.0 + a.abs().max(b.abs()))
}

fn same_statistics(a: &ClusteringFeature, b: &ClusteringFeature) -> bool {
    a.n == b.n
        && a.ls.len() == b.ls.len()
        && close(a.ss, b.ss)
        && a.ls.iter().zip(b.ls.iter()).all(|(x, y)| close(*x, *y))
}

impl CfTree {
    /// Verify every tree invariant.
    ///
    /// - the root has no parent and every other reachable node's parent link
    ///   matches the entry pointing at it
    /// - every node holds at most B entries; internal nodes are non-empty
    /// - every leaf CF has radius ≤ T (within tolerance)
    /// - every internal entry equals the sum of its child's entries
    /// - every leaf id is reachable exactly once, from the node the leaf
    ///   table says holds it
    /// - every arena node is reachable from the root
    /// - every leaf node sits at the same depth, which is the tree height
    /// - the sum of leaf `n` equals the number of absorbed points
    ///
    /// # Errors
    ///
    /// Returns `ClusterError::InvalidState` describing the first violation.
    pub fn check_invariants(&self) -> Result<()> {
        let threshold = self.params.threshold;
        let capacity = self.params.branching_factor;
        let dimension = self.dimension.unwrap_or(0);

        let root = self
            .node(self.root)
            .ok_or_else(|| ClusterError::invalid_state(format!("root {} missing", self.root)))?;
        if root.parent.is_some() {
            return Err(ClusterError::invalid_state("root has a parent"));
        }

        let mut seen_leaves = HashSet::new();
        let mut visited = HashSet::new();
        let mut leaf_total: u64 = 0;
        let mut leaf_depth: Option<usize> = None;
        let mut stack: Vec<(NodeId, usize)> = vec![(self.root, 1)];

        while let Some((id, depth)) = stack.pop() {
            if !visited.insert(id) {
                return Err(ClusterError::invalid_state(format!("{} reachable twice", id)));
            }
            let node = self
                .node(id)
                .ok_or_else(|| ClusterError::invalid_state(format!("{} missing", id)))?;

            if node.len() > capacity {
                return Err(ClusterError::invalid_state(format!(
                    "{} holds {} entries, branching factor is {}",
                    id,
                    node.len(),
                    capacity
                )));
            }
            if !node.is_leaf && node.is_empty() {
                return Err(ClusterError::invalid_state(format!("internal {} is empty", id)));
            }
            if node.is_leaf {
                match leaf_depth {
                    None => leaf_depth = Some(depth),
                    Some(expected) if expected != depth => {
                        return Err(ClusterError::invalid_state(format!(
                            "leaf node {} at depth {}, other leaf nodes at depth {}",
                            id, depth, expected
                        )));
                    }
                    Some(_) => {}
                }
            }

            for entry in node.entries() {
                if entry.cf.dimension() != dimension {
                    return Err(ClusterError::invalid_state(format!(
                        "{} holds a CF of dimension {}, tree dimension is {}",
                        id,
                        entry.cf.dimension(),
                        dimension
                    )));
                }

                match (node.is_leaf, entry.target) {
                    (true, EntryRef::Leaf(leaf)) => {
                        if !seen_leaves.insert(leaf) {
                            return Err(ClusterError::invalid_state(format!(
                                "{} listed twice",
                                leaf
                            )));
                        }
                        if self.leaves.get(leaf.0) != Some(&id) {
                            return Err(ClusterError::invalid_state(format!(
                                "leaf table does not place {} in {}",
                                leaf, id
                            )));
                        }
                        let radius = entry.cf.radius();
                        if radius > threshold + radius_slack(threshold) {
                            return Err(ClusterError::invalid_state(format!(
                                "{} radius {} exceeds threshold {}",
                                leaf, radius, threshold
                            )));
                        }
                        leaf_total += entry.cf.n;
                    }
                    (false, EntryRef::Child(child)) => {
                        let child_node = self.node(child).ok_or_else(|| {
                            ClusterError::invalid_state(format!("{} points at missing {}", id, child))
                        })?;
                        if child_node.parent != Some(id) {
                            return Err(ClusterError::invalid_state(format!(
                                "{} parent link is {:?}, expected {}",
                                child, child_node.parent, id
                            )));
                        }
                        let expected = child_node.total_cf(dimension);
                        if !same_statistics(&entry.cf, &expected) {
                            return Err(ClusterError::invalid_state(format!(
                                "entry for {} in {} does not match the sum of its entries",
                                child, id
                            )));
                        }
                        stack.push((child, depth + 1));
                    }
                    (is_leaf, target) => {
                        return Err(ClusterError::invalid_state(format!(
                            "{} (leaf: {}) holds mismatched entry {:?}",
                            id, is_leaf, target
                        )));
                    }
                }
            }
        }

        if visited.len() != self.nodes.len() {
            return Err(ClusterError::invalid_state(format!(
                "{} nodes reachable from the root, arena holds {}",
                visited.len(),
                self.nodes.len()
            )));
        }

        if let Some(depth) = leaf_depth {
            if depth != self.height() {
                return Err(ClusterError::invalid_state(format!(
                    "leaf nodes at depth {}, height reports {}",
                    depth,
                    self.height()
                )));
            }
        }

        if seen_leaves.len() != self.leaves.len() {
            return Err(ClusterError::invalid_state(format!(
                "{} leaves reachable, {} registered",
                seen_leaves.len(),
                self.leaves.len()
            )));
        }

        if leaf_total != self.total_points {
            return Err(ClusterError::invalid_state(format!(
                "leaf CFs hold {} points, tree absorbed {}",
                leaf_total, self.total_points
            )));
        }

        Ok(())
    }
}
