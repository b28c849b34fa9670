//! Global consolidation of leaf CFs into exactly K clusters.
//!
//! After the stream ends, every leaf CF is treated as a weighted point and
//! groups are merged greedily, two at a time, until K remain. The pair to
//! merge is the one whose union has the smallest radius; ties fall back to
//! the smallest centroid distance, then to the lowest index pair. The pass
//! only reads the tree.
//!
//! Each group caches its best partner among higher-indexed groups, so one
//! merge step costs O(L·D) plus the rows whose cached partner was consumed,
//! instead of rescanning all L² pairs. The initial table is filled in
//! parallel with `rayon`; rows are independent, so the result does not depend
//! on scheduling.

use std::cmp::Ordering;

use rayon::prelude::*;
use tracing::{debug, info};

use crate::error::{ClusterError, Result};

use super::feature::ClusteringFeature;
use super::node::LeafId;
use super::tree::CfTree;

/// Merge cost of a pair of groups.
#[derive(Debug, Clone, Copy, PartialEq)]
struct MergeCost {
    radius: f64,
    distance: f64,
}

impl MergeCost {
    fn between(a: &ClusteringFeature, b: &ClusteringFeature) -> Self {
        Self {
            radius: a.merged_radius(b),
            distance: a.squared_centroid_distance(b),
        }
    }

    fn order(&self, other: &Self) -> Ordering {
        self.radius
            .total_cmp(&other.radius)
            .then(self.distance.total_cmp(&other.distance))
    }
}

#[derive(Debug, Clone)]
struct Group {
    cf: ClusteringFeature,
    members: Vec<LeafId>,
}

/// Result of consolidating a leaf set.
#[derive(Debug, Clone, PartialEq)]
pub struct Consolidation {
    /// Final cluster id per leaf id (`labels[leaf.0]`).
    labels: Vec<usize>,
    /// Merged CF per final cluster id.
    clusters: Vec<ClusteringFeature>,
}

impl Consolidation {
    /// Final cluster id of a leaf.
    pub fn label_of(&self, leaf: LeafId) -> Option<usize> {
        self.labels.get(leaf.0).copied()
    }

    /// Final cluster id per leaf id.
    pub fn labels(&self) -> &[usize] {
        &self.labels
    }

    /// Merged CF per final cluster id.
    pub fn clusters(&self) -> &[ClusteringFeature] {
        &self.clusters
    }

    /// Number of final clusters.
    pub fn cluster_count(&self) -> usize {
        self.clusters.len()
    }
}

/// Greedy pairwise-nearest-merge reduction to a target cluster count.
///
/// # Example
///
/// ```
/// use stream_cluster_core::clustering::{CfTree, GlobalConsolidator};
/// use stream_cluster_core::config::ClusterParams;
///
/// let mut tree = CfTree::new(ClusterParams::new(0.1)).unwrap();
/// for p in [[0.0], [1.0], [10.0], [11.0]] {
///     tree.insert(&p).unwrap();
/// }
///
/// let result = GlobalConsolidator::new(2).unwrap().consolidate(&tree).unwrap();
/// assert_eq!(result.cluster_count(), 2);
/// assert_eq!(result.labels(), &[0, 0, 1, 1]);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GlobalConsolidator {
    target: usize,
}

impl GlobalConsolidator {
    /// Create a consolidator for `target` clusters.
    ///
    /// # Errors
    ///
    /// Returns `ClusterError::InvalidParameter` if `target` is 0.
    pub fn new(target: usize) -> Result<Self> {
        if target == 0 {
            return Err(ClusterError::invalid_parameter(
                "target_clusters must be >= 1, got 0",
            ));
        }
        Ok(Self { target })
    }

    /// Target cluster count K.
    pub fn target(&self) -> usize {
        self.target
    }

    /// Consolidate the leaf CFs of `tree`.
    pub fn consolidate(&self, tree: &CfTree) -> Result<Consolidation> {
        let leaves: Vec<(LeafId, ClusteringFeature)> = tree
            .leaf_features()
            .into_iter()
            .map(|(leaf, cf)| (leaf, cf.clone()))
            .collect();
        self.consolidate_features(leaves)
    }

    /// Consolidate an explicit leaf set.
    ///
    /// Leaf ids must be exactly `0..leaves.len()` in any order.
    pub fn consolidate_features(
        &self,
        mut leaves: Vec<(LeafId, ClusteringFeature)>,
    ) -> Result<Consolidation> {
        leaves.sort_by_key(|(leaf, _)| *leaf);
        for (expected, (leaf, _)) in leaves.iter().enumerate() {
            if leaf.0 != expected {
                return Err(ClusterError::invalid_parameter(format!(
                    "leaf ids must be dense from 0, found {} at position {}",
                    leaf, expected
                )));
            }
        }

        let mut groups: Vec<Option<Group>> = leaves
            .into_iter()
            .map(|(leaf, cf)| {
                Some(Group {
                    cf,
                    members: vec![leaf],
                })
            })
            .collect();

        let mut active = groups.len();
        let leaf_count = active;

        if active > self.target {
            let mut best: Vec<Option<(MergeCost, usize)>> = (0..groups.len())
                .into_par_iter()
                .map(|i| best_partner(&groups, i))
                .collect();

            while active > self.target {
                let (a, b) = cheapest_pair(&best).ok_or_else(|| {
                    ClusterError::invalid_state("no mergeable pair left during consolidation")
                })?;

                let absorbed = groups[b].take().ok_or_else(|| {
                    ClusterError::invalid_state(format!("group {} already merged", b))
                })?;
                best[b] = None;
                let survivor = groups[a].as_mut().ok_or_else(|| {
                    ClusterError::invalid_state(format!("group {} already merged", a))
                })?;
                survivor.cf.merge(&absorbed.cf)?;
                survivor.members.extend(absorbed.members);
                active -= 1;

                best[a] = best_partner(&groups, a);
                for k in 0..groups.len() {
                    if k == a || groups[k].is_none() {
                        continue;
                    }
                    let cached = best[k];
                    match cached {
                        Some((_, j)) if j == a || j == b => best[k] = best_partner(&groups, k),
                        Some((cost, j)) if k < a => {
                            if let (Some(gk), Some(ga)) = (&groups[k], &groups[a]) {
                                let merged = MergeCost::between(&gk.cf, &ga.cf);
                                let better = match merged.order(&cost) {
                                    Ordering::Less => true,
                                    Ordering::Equal => a < j,
                                    Ordering::Greater => false,
                                };
                                if better {
                                    best[k] = Some((merged, a));
                                }
                            }
                        }
                        None if k < a => best[k] = best_partner(&groups, k),
                        _ => {}
                    }
                }
            }
        }

        let mut labels = vec![0; leaf_count];
        let mut clusters = Vec::with_capacity(active);
        for group in groups.into_iter().flatten() {
            let id = clusters.len();
            for leaf in &group.members {
                labels[leaf.0] = id;
            }
            clusters.push(group.cf);
        }

        debug!(
            leaves = leaf_count,
            clusters = clusters.len(),
            target = self.target,
            "Consolidated leaf CFs"
        );
        if clusters.len() < self.target {
            info!(
                leaves = leaf_count,
                target = self.target,
                "Fewer leaf CFs than target clusters; every leaf is its own cluster"
            );
        }

        Ok(Consolidation { labels, clusters })
    }
}

/// Cheapest partner of group `i` among higher-indexed live groups.
///
/// Lower index wins ties, so the choice is deterministic.
fn best_partner(groups: &[Option<Group>], i: usize) -> Option<(MergeCost, usize)> {
    let gi = groups.get(i)?.as_ref()?;
    let mut best: Option<(MergeCost, usize)> = None;
    for (j, gj) in groups.iter().enumerate().skip(i + 1) {
        let Some(gj) = gj else { continue };
        let cost = MergeCost::between(&gi.cf, &gj.cf);
        match best {
            Some((current, _)) if cost.order(&current) != Ordering::Less => {}
            _ => best = Some((cost, j)),
        }
    }
    best
}

/// Globally cheapest pair `(i, j)` with `i < j`; lowest pair wins ties.
fn cheapest_pair(best: &[Option<(MergeCost, usize)>]) -> Option<(usize, usize)> {
    let mut winner: Option<(MergeCost, usize, usize)> = None;
    for (i, entry) in best.iter().enumerate() {
        let Some((cost, j)) = entry else { continue };
        match winner {
            Some((current, _, _)) if cost.order(&current) != Ordering::Less => {}
            _ => winner = Some((*cost, i, *j)),
        }
    }
    winner.map(|(_, i, j)| (i, j))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClusterParams;

    fn leaf_set(points: &[&[f64]]) -> Vec<(LeafId, ClusteringFeature)> {
        points
            .iter()
            .enumerate()
            .map(|(i, p)| (LeafId(i), ClusteringFeature::from_point(p)))
            .collect()
    }

    /// Reference implementation: rescan every pair each step.
    fn naive_labels(points: &[&[f64]], target: usize) -> Vec<usize> {
        let mut groups: Vec<Option<(ClusteringFeature, Vec<usize>)>> = points
            .iter()
            .enumerate()
            .map(|(i, p)| Some((ClusteringFeature::from_point(p), vec![i])))
            .collect();
        let mut active = groups.len();
        while active > target {
            let mut winner: Option<(MergeCost, usize, usize)> = None;
            for i in 0..groups.len() {
                for j in (i + 1)..groups.len() {
                    if let (Some(a), Some(b)) = (&groups[i], &groups[j]) {
                        let cost = MergeCost::between(&a.0, &b.0);
                        if winner.map_or(true, |(c, _, _)| cost.order(&c) == Ordering::Less) {
                            winner = Some((cost, i, j));
                        }
                    }
                }
            }
            let (_, i, j) = winner.unwrap();
            let (cf, members) = groups[j].take().unwrap();
            let target_group = groups[i].as_mut().unwrap();
            target_group.0.merge(&cf).unwrap();
            target_group.1.extend(members);
            active -= 1;
        }
        let mut labels = vec![0; points.len()];
        for (id, (_, members)) in groups.into_iter().flatten().enumerate() {
            for m in members {
                labels[m] = id;
            }
        }
        labels
    }

    // =========================================================================
    // BASIC REDUCTION
    // =========================================================================

    #[test]
    fn test_reduces_to_target() {
        let points: Vec<&[f64]> = vec![&[0.0], &[1.0], &[10.0], &[11.0], &[30.0]];
        let result = GlobalConsolidator::new(3)
            .unwrap()
            .consolidate_features(leaf_set(&points))
            .unwrap();
        assert_eq!(result.cluster_count(), 3);
        assert_eq!(result.labels(), &[0, 0, 1, 1, 2]);
        assert_eq!(result.clusters()[0].n, 2);
        assert_eq!(result.clusters()[2].n, 1);
        println!("[PASS] test_reduces_to_target");
    }

    #[test]
    fn test_fewer_leaves_than_target_is_identity() {
        let points: Vec<&[f64]> = vec![&[0.0], &[5.0]];
        let result = GlobalConsolidator::new(4)
            .unwrap()
            .consolidate_features(leaf_set(&points))
            .unwrap();
        assert_eq!(result.cluster_count(), 2);
        assert_eq!(result.labels(), &[0, 1]);
    }

    #[test]
    fn test_single_target_merges_everything() {
        let points: Vec<&[f64]> = vec![&[0.0, 1.0], &[3.0, 4.0], &[-2.0, 7.0]];
        let result = GlobalConsolidator::new(1)
            .unwrap()
            .consolidate_features(leaf_set(&points))
            .unwrap();
        assert_eq!(result.labels(), &[0, 0, 0]);
        assert_eq!(result.clusters()[0].n, 3);
    }

    #[test]
    fn test_empty_leaf_set() {
        let result = GlobalConsolidator::new(2)
            .unwrap()
            .consolidate_features(Vec::new())
            .unwrap();
        assert_eq!(result.cluster_count(), 0);
        assert!(result.labels().is_empty());
    }

    // =========================================================================
    // COST ORDERING
    // =========================================================================

    #[test]
    fn test_weight_affects_merged_radius() {
        // A heavy group at 0 and a light point at 3 merge into a tighter
        // union than two light points 2.5 apart would.
        let mut heavy = ClusteringFeature::from_point(&[0.0]);
        for _ in 0..99 {
            heavy.merge_point(&[0.0]).unwrap();
        }
        let leaves = vec![
            (LeafId(0), heavy),
            (LeafId(1), ClusteringFeature::from_point(&[3.0])),
            (LeafId(2), ClusteringFeature::from_point(&[20.0])),
            (LeafId(3), ClusteringFeature::from_point(&[22.5])),
        ];
        let result = GlobalConsolidator::new(3)
            .unwrap()
            .consolidate_features(leaves)
            .unwrap();
        assert_eq!(result.labels(), &[0, 0, 1, 2]);
    }

    #[test]
    fn test_matches_naive_reference() {
        let raw: Vec<Vec<f64>> = (0..40)
            .map(|i| {
                let x = ((i * 7919) % 97) as f64 * 0.37;
                let y = ((i * 104729) % 89) as f64 * 0.21;
                vec![x, y]
            })
            .collect();
        let points: Vec<&[f64]> = raw.iter().map(|p| p.as_slice()).collect();

        for target in [1, 2, 5, 13, 39, 40] {
            let fast = GlobalConsolidator::new(target)
                .unwrap()
                .consolidate_features(leaf_set(&points))
                .unwrap();
            assert_eq!(
                fast.labels(),
                naive_labels(&points, target).as_slice(),
                "target {}",
                target
            );
        }
    }

    // =========================================================================
    // DETERMINISM & VALIDATION
    // =========================================================================

    #[test]
    fn test_consolidating_twice_is_identical() {
        let mut tree = CfTree::new(ClusterParams::new(0.3).with_branching_factor(4)).unwrap();
        for i in 0..60 {
            let v = i as f64;
            tree.insert(&[(v * 0.7).sin() * 5.0, (v * 1.3).cos() * 5.0]).unwrap();
        }
        let consolidator = GlobalConsolidator::new(4).unwrap();
        let first = consolidator.consolidate(&tree).unwrap();
        let second = consolidator.consolidate(&tree).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.cluster_count(), tree.leaf_count().min(4));
    }

    #[test]
    fn test_rejects_zero_target_and_sparse_ids() {
        assert!(GlobalConsolidator::new(0).is_err());

        let leaves = vec![
            (LeafId(0), ClusteringFeature::from_point(&[0.0])),
            (LeafId(2), ClusteringFeature::from_point(&[1.0])),
        ];
        assert!(GlobalConsolidator::new(1)
            .unwrap()
            .consolidate_features(leaves)
            .is_err());
    }
}
