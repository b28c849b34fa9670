//! Serializable snapshot of a CF-tree.
//!
//! A snapshot is the node list in arena order plus the tree parameters,
//! enough to rebuild the tree exactly and keep inserting into it. Restoring
//! validates the structure first and then runs the full invariant check, so
//! a hand-edited or truncated snapshot is rejected instead of producing a
//! tree that misroutes later points.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::ClusterParams;
use crate::error::{ClusterError, Result};

use super::feature::ClusteringFeature;
use super::node::{CfEntry, CfNode, EntryRef, LeafId, NodeId};
use super::tree::CfTree;

/// One entry of a persisted node. Exactly one of `child` and `leaf` is set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryRecord {
    pub n: u64,
    pub ls: Vec<f64>,
    pub ss: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub child: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub leaf: Option<usize>,
}

/// One persisted node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRecord {
    pub id: usize,
    pub is_leaf: bool,
    pub parent: Option<usize>,
    pub entries: Vec<EntryRecord>,
}

/// Persisted form of a [`CfTree`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeSnapshot {
    pub params: ClusterParams,
    pub dimension: Option<usize>,
    pub total_points: u64,
    pub root: usize,
    pub leaf_count: usize,
    pub nodes: Vec<NodeRecord>,
}

impl CfTree {
    /// Capture the tree as a serializable snapshot.
    pub fn snapshot(&self) -> TreeSnapshot {
        let nodes = self
            .nodes
            .iter()
            .enumerate()
            .map(|(id, node)| NodeRecord {
                id,
                is_leaf: node.is_leaf,
                parent: node.parent.map(|p| p.0),
                entries: node
                    .entries()
                    .iter()
                    .map(|entry| {
                        let (child, leaf) = match entry.target {
                            EntryRef::Child(c) => (Some(c.0), None),
                            EntryRef::Leaf(l) => (None, Some(l.0)),
                        };
                        EntryRecord {
                            n: entry.cf.n,
                            ls: entry.cf.ls.clone(),
                            ss: entry.cf.ss,
                            child,
                            leaf,
                        }
                    })
                    .collect(),
            })
            .collect();

        TreeSnapshot {
            params: self.params.clone(),
            dimension: self.dimension,
            total_points: self.total_points,
            root: self.root.0,
            leaf_count: self.leaves.len(),
            nodes,
        }
    }

    /// Rebuild a tree from a snapshot.
    ///
    /// # Errors
    ///
    /// Returns `ClusterError::CorruptSnapshot` if the parameters are invalid,
    /// an id is out of range, an entry has the wrong kind for its node, a
    /// leaf id is missing or repeated, a node holds more than B entries, a
    /// dimension disagrees, or any tree invariant fails on the result.
    pub fn from_snapshot(snapshot: TreeSnapshot) -> Result<Self> {
        let TreeSnapshot {
            params,
            dimension,
            total_points,
            root,
            leaf_count,
            nodes: records,
        } = snapshot;

        params
            .validate()
            .map_err(|e| ClusterError::corrupt_snapshot(format!("invalid parameters: {}", e)))?;

        let node_count = records.len();
        if root >= node_count {
            return Err(ClusterError::corrupt_snapshot(format!(
                "root {} out of range for {} nodes",
                root, node_count
            )));
        }
        match dimension {
            Some(0) => return Err(ClusterError::corrupt_snapshot("dimension 0")),
            None if total_points > 0 || records.iter().any(|r| !r.entries.is_empty()) => {
                return Err(ClusterError::corrupt_snapshot(
                    "entries present but no dimension recorded",
                ))
            }
            _ => {}
        }
        let expected_dim = dimension.unwrap_or(0);

        let mut leaves: Vec<Option<NodeId>> = vec![None; leaf_count];
        let mut nodes = Vec::with_capacity(node_count);

        for (position, record) in records.into_iter().enumerate() {
            if record.id != position {
                return Err(ClusterError::corrupt_snapshot(format!(
                    "node at position {} has id {}",
                    position, record.id
                )));
            }
            if let Some(parent) = record.parent {
                if parent >= node_count {
                    return Err(ClusterError::corrupt_snapshot(format!(
                        "node {} has parent {} out of range",
                        position, parent
                    )));
                }
            }
            if record.entries.len() > params.branching_factor {
                return Err(ClusterError::corrupt_snapshot(format!(
                    "node {} holds {} entries, branching factor is {}",
                    position,
                    record.entries.len(),
                    params.branching_factor
                )));
            }

            let parent = record.parent.map(NodeId);
            let mut node = if record.is_leaf {
                CfNode::new_leaf(params.branching_factor, parent)
            } else {
                CfNode::new_internal(params.branching_factor, parent)
            };

            for (idx, entry) in record.entries.into_iter().enumerate() {
                if entry.n == 0 || entry.ls.len() != expected_dim {
                    return Err(ClusterError::corrupt_snapshot(format!(
                        "node {} entry {} has n = {} and {} coordinates, expected n > 0 and {}",
                        position,
                        idx,
                        entry.n,
                        entry.ls.len(),
                        expected_dim
                    )));
                }
                let cf = ClusteringFeature {
                    n: entry.n,
                    ls: entry.ls,
                    ss: entry.ss,
                };
                if !cf.is_finite() {
                    return Err(ClusterError::corrupt_snapshot(format!(
                        "node {} entry {} has non-finite statistics",
                        position, idx
                    )));
                }

                let entry = match (record.is_leaf, entry.child, entry.leaf) {
                    (false, Some(child), None) if child < node_count => {
                        CfEntry::child(cf, NodeId(child))
                    }
                    (true, None, Some(leaf)) if leaf < leaf_count => {
                        if leaves[leaf].replace(NodeId(position)).is_some() {
                            return Err(ClusterError::corrupt_snapshot(format!(
                                "{} appears more than once",
                                LeafId(leaf)
                            )));
                        }
                        CfEntry::leaf(cf, LeafId(leaf))
                    }
                    (is_leaf, child, leaf) => {
                        return Err(ClusterError::corrupt_snapshot(format!(
                            "node {} (leaf: {}) entry {} has child {:?} and leaf {:?}",
                            position, is_leaf, idx, child, leaf
                        )))
                    }
                };
                node.push(entry);
            }
            nodes.push(node);
        }

        let leaves = leaves
            .into_iter()
            .enumerate()
            .map(|(leaf, node)| {
                node.ok_or_else(|| {
                    ClusterError::corrupt_snapshot(format!("{} is never referenced", LeafId(leaf)))
                })
            })
            .collect::<Result<Vec<NodeId>>>()?;

        let tree = CfTree {
            params,
            nodes,
            root: NodeId(root),
            leaves,
            dimension,
            total_points,
        };
        tree.check_invariants()
            .map_err(|e| ClusterError::corrupt_snapshot(e.to_string()))?;

        debug!(
            nodes = tree.node_count(),
            leaves = tree.leaf_count(),
            points = tree.total_points(),
            "Restored CF-tree from snapshot"
        );
        Ok(tree)
    }
}
