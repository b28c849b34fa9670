//! CF-tree arena.
//!
//! The tree owns every node in a flat `Vec<CfNode>` and addresses them by
//! [`NodeId`]. Parent and child links are indices, so there is no shared
//! ownership and no cycles. A second table maps every [`LeafId`] to the leaf
//! node currently holding it; splits keep it up to date.
//!
//! Mutation happens only through `&mut CfTree` (see `insert.rs`), which gives
//! the single-writer discipline the insertion algorithm needs for free.

use crate::config::ClusterParams;
use crate::error::Result;

use super::feature::ClusteringFeature;
use super::node::{CfNode, EntryRef, LeafId, NodeId};

/// BIRCH-style CF-tree for single-pass clustering.
///
/// # Example
///
/// ```
/// use stream_cluster_core::clustering::CfTree;
/// use stream_cluster_core::config::ClusterParams;
///
/// let mut tree = CfTree::new(ClusterParams::new(0.5)).unwrap();
/// let first = tree.insert(&[0.0, 0.0]).unwrap();
/// let second = tree.insert(&[0.1, 0.0]).unwrap();
///
/// assert_eq!(first.leaf, second.leaf);
/// assert_eq!(tree.total_points(), 2);
/// assert_eq!(tree.leaf_count(), 1);
/// ```
#[derive(Debug, Clone)]
pub struct CfTree {
    pub(crate) params: ClusterParams,
    pub(crate) nodes: Vec<CfNode>,
    pub(crate) root: NodeId,
    /// Leaf id -> leaf node currently holding it.
    pub(crate) leaves: Vec<NodeId>,
    pub(crate) dimension: Option<usize>,
    pub(crate) total_points: u64,
}

impl CfTree {
    /// Create a new empty tree.
    ///
    /// # Errors
    ///
    /// Returns `ClusterError::InvalidParameter` if `params.validate()` fails.
    pub fn new(params: ClusterParams) -> Result<Self> {
        params.validate()?;
        let root = CfNode::new_leaf(params.branching_factor, None);
        Ok(Self {
            params,
            nodes: vec![root],
            root: NodeId(0),
            leaves: Vec::new(),
            dimension: None,
            total_points: 0,
        })
    }

    /// Parameters the tree was built with.
    #[inline]
    pub fn params(&self) -> &ClusterParams {
        &self.params
    }

    /// Radius threshold T.
    #[inline]
    pub fn threshold(&self) -> f64 {
        self.params.threshold
    }

    /// Branching factor B.
    #[inline]
    pub fn branching_factor(&self) -> usize {
        self.params.branching_factor
    }

    /// Point dimension, fixed by the first insertion.
    #[inline]
    pub fn dimension(&self) -> Option<usize> {
        self.dimension
    }

    /// Number of points absorbed (the sum of `n` over all leaf CFs).
    #[inline]
    pub fn total_points(&self) -> u64 {
        self.total_points
    }

    /// Number of leaf CFs (leaf clusters).
    #[inline]
    pub fn leaf_count(&self) -> usize {
        self.leaves.len()
    }

    /// Number of nodes in the arena.
    #[inline]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Whether no point has been absorbed yet.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.leaves.is_empty()
    }

    /// Root node id.
    #[inline]
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Look up a node.
    pub fn node(&self, id: NodeId) -> Option<&CfNode> {
        self.nodes.get(id.0)
    }

    /// Number of levels from root to leaves (1 for a lone root leaf).
    ///
    /// Leaf nodes all sit at one depth, so following the first entry suffices.
    pub fn height(&self) -> usize {
        let mut height = 1;
        let mut current = self.root;
        while let Some(node) = self.nodes.get(current.0) {
            match node.entries().first().map(|e| e.target) {
                Some(EntryRef::Child(child)) => {
                    height += 1;
                    current = child;
                }
                _ => break,
            }
        }
        height
    }

    /// CF of a single leaf cluster.
    pub fn leaf_feature(&self, leaf: LeafId) -> Option<&ClusteringFeature> {
        let node = self.nodes.get(self.leaves.get(leaf.0)?.0)?;
        let idx = node.position_of_leaf(leaf)?;
        Some(&node.entries()[idx].cf)
    }

    /// Every leaf CF, ordered by leaf id.
    pub fn leaf_features(&self) -> Vec<(LeafId, &ClusteringFeature)> {
        let mut out: Vec<(LeafId, &ClusteringFeature)> = Vec::with_capacity(self.leaves.len());
        for node in self.nodes.iter().filter(|n| n.is_leaf) {
            for entry in node.entries() {
                if let EntryRef::Leaf(leaf) = entry.target {
                    out.push((leaf, &entry.cf));
                }
            }
        }
        out.sort_by_key(|(leaf, _)| *leaf);
        out
    }

    /// CF summarizing every absorbed point.
    pub fn root_feature(&self) -> ClusteringFeature {
        let dimension = self.dimension.unwrap_or(0);
        self.nodes[self.root.0].total_cf(dimension)
    }

    pub(crate) fn allocate_leaf(&mut self, node: NodeId) -> LeafId {
        let id = LeafId(self.leaves.len());
        self.leaves.push(node);
        id
    }
}
