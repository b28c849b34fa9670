//! Nodes of the CF-tree.
//!
//! A node is a fixed-capacity ordered list of [`CfEntry`] values:
//! - A leaf node: every entry is a leaf cluster (`EntryRef::Leaf`)
//! - An internal node: every entry summarizes a child node (`EntryRef::Child`)
//!
//! Nodes live in the tree's arena and refer to each other by [`NodeId`];
//! nothing here owns another node. A node may transiently hold `capacity + 1`
//! entries, which is exactly the state [`CfNode::split`] resolves.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::feature::ClusteringFeature;

/// Index of a node in the tree arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub usize);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node#{}", self.0)
    }
}

/// Identifier of a leaf CF (leaf cluster).
///
/// Assigned densely from 0 in creation order and stable for the lifetime of
/// the tree: splits move leaf entries between nodes without renaming them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LeafId(pub usize);

impl fmt::Display for LeafId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "leaf#{}", self.0)
    }
}

/// What an entry's CF summarizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryRef {
    /// Internal entry: the CF is the sum of the child node's entries.
    Child(NodeId),
    /// Leaf entry: the CF is a leaf cluster.
    Leaf(LeafId),
}

/// One slot of a node: a CF plus what it refers to.
#[derive(Debug, Clone, PartialEq)]
pub struct CfEntry {
    /// Clustering feature summary.
    pub cf: ClusteringFeature,
    /// Child node or leaf cluster.
    pub target: EntryRef,
}

impl CfEntry {
    /// Leaf entry for `leaf` summarized by `cf`.
    pub fn leaf(cf: ClusteringFeature, leaf: LeafId) -> Self {
        Self {
            cf,
            target: EntryRef::Leaf(leaf),
        }
    }

    /// Internal entry pointing at `child`.
    pub fn child(cf: ClusteringFeature, child: NodeId) -> Self {
        Self {
            cf,
            target: EntryRef::Child(child),
        }
    }
}

/// Node in the CF-tree.
///
/// # Example
///
/// ```
/// use stream_cluster_core::clustering::CfNode;
///
/// let leaf = CfNode::new_leaf(4, None);
/// assert!(leaf.is_leaf);
/// assert!(leaf.is_empty());
/// assert_eq!(leaf.capacity(), 4);
/// ```
#[derive(Debug, Clone)]
pub struct CfNode {
    /// Whether this is a leaf node.
    pub is_leaf: bool,
    /// Parent node; `None` for the root.
    pub parent: Option<NodeId>,
    entries: Vec<CfEntry>,
    capacity: usize,
}

impl CfNode {
    fn with_kind(is_leaf: bool, capacity: usize, parent: Option<NodeId>) -> Self {
        Self {
            is_leaf,
            parent,
            // One spare slot: an overflowing node is split before the next operation.
            entries: Vec::with_capacity(capacity + 1),
            capacity,
        }
    }

    /// Create a new empty leaf node.
    #[must_use]
    pub fn new_leaf(capacity: usize, parent: Option<NodeId>) -> Self {
        Self::with_kind(true, capacity, parent)
    }

    /// Create a new empty internal (non-leaf) node.
    #[must_use]
    pub fn new_internal(capacity: usize, parent: Option<NodeId>) -> Self {
        Self::with_kind(false, capacity, parent)
    }

    /// Maximum number of entries (B).
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Get number of entries in this node.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if node has no entries.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether the node holds more than `capacity` entries and must split.
    #[inline]
    pub fn is_overflowing(&self) -> bool {
        self.entries.len() > self.capacity
    }

    /// Entries in order.
    #[inline]
    pub fn entries(&self) -> &[CfEntry] {
        &self.entries
    }

    pub(crate) fn entry_mut(&mut self, idx: usize) -> Option<&mut CfEntry> {
        self.entries.get_mut(idx)
    }

    /// Append an entry. May leave the node overflowing.
    pub fn push(&mut self, entry: CfEntry) {
        self.entries.push(entry);
    }

    /// Insert an entry at `idx`, shifting later entries right.
    pub(crate) fn insert(&mut self, idx: usize, entry: CfEntry) {
        self.entries.insert(idx, entry);
    }

    /// Compute total CF for all entries in this node.
    ///
    /// Returns an empty CF of `dimension` if node has no entries.
    #[must_use]
    pub fn total_cf(&self, dimension: usize) -> ClusteringFeature {
        let mut total = ClusteringFeature::new(dimension);
        for entry in &self.entries {
            total.n += entry.cf.n;
            for (a, b) in total.ls.iter_mut().zip(entry.cf.ls.iter()) {
                *a += b;
            }
            total.ss += entry.cf.ss;
        }
        total
    }

    /// Index of the entry minimizing `distance`.
    ///
    /// The first entry wins ties; NaN distances are never selected over a
    /// real one. Returns None if node has no entries.
    pub fn nearest_by<F>(&self, distance: F) -> Option<usize>
    where
        F: Fn(&ClusteringFeature) -> f64,
    {
        let mut best: Option<(usize, f64)> = None;
        for (i, entry) in self.entries.iter().enumerate() {
            let d = distance(&entry.cf);
            let d = if d.is_nan() { f64::INFINITY } else { d };
            match best {
                Some((_, best_d)) if d >= best_d => {}
                _ => best = Some((i, d)),
            }
        }
        best.map(|(i, _)| i)
    }

    /// Index of the entry whose centroid is nearest to `point`.
    pub fn nearest_to_point(&self, point: &[f64]) -> Option<usize> {
        self.nearest_by(|cf| cf.squared_distance_to(point))
    }

    /// Position of the entry pointing at `child`.
    pub fn position_of_child(&self, child: NodeId) -> Option<usize> {
        self.entries
            .iter()
            .position(|e| e.target == EntryRef::Child(child))
    }

    /// Position of the entry holding `leaf`.
    pub fn position_of_leaf(&self, leaf: LeafId) -> Option<usize> {
        self.entries
            .iter()
            .position(|e| e.target == EntryRef::Leaf(leaf))
    }

    /// Split the entries into two groups.
    ///
    /// Seeds are the most mutually distant pair of entry centroids (first
    /// pair wins ties). Every other entry, in order, joins whichever seed's
    /// centroid is closer, ties going to the first seed. This node keeps the
    /// first group; the second group is returned for a new sibling node.
    /// Relative entry order is preserved within both groups.
    ///
    /// Nodes with fewer than two entries are left untouched and an empty
    /// group is returned.
    pub fn split(&mut self) -> Vec<CfEntry> {
        if self.entries.len() < 2 {
            return Vec::new();
        }

        let (seed1, seed2) = farthest_pair(&self.entries);
        let c1 = self.entries[seed1].cf.clone();
        let c2 = self.entries[seed2].cf.clone();

        let mut kept = Vec::with_capacity(self.capacity + 1);
        let mut moved = Vec::with_capacity(self.capacity + 1);

        for (i, entry) in std::mem::take(&mut self.entries).into_iter().enumerate() {
            if i == seed1 {
                kept.push(entry);
            } else if i == seed2 {
                moved.push(entry);
            } else {
                let d1 = entry.cf.squared_centroid_distance(&c1);
                let d2 = entry.cf.squared_centroid_distance(&c2);
                if d1 <= d2 || d2.is_nan() {
                    kept.push(entry);
                } else {
                    moved.push(entry);
                }
            }
        }

        self.entries = kept;
        moved
    }
}

/// Find farthest pair of entries (for split seeds).
fn farthest_pair(entries: &[CfEntry]) -> (usize, usize) {
    let mut max_dist = f64::NEG_INFINITY;
    let mut pair = (0, 1);

    for i in 0..entries.len() {
        for j in (i + 1)..entries.len() {
            let dist = entries[i].cf.squared_centroid_distance(&entries[j].cf);
            if dist > max_dist {
                max_dist = dist;
                pair = (i, j);
            }
        }
    }

    pair
}
