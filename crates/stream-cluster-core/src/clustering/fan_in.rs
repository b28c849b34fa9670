//! Fan-in of independently built trees.

use tracing::{debug, warn};

use crate::config::ClusterParams;
use crate::error::{ClusterError, Result};

use super::tree::CfTree;

/// Build one tree from the leaf CFs of several independent trees.
///
/// Every source leaf CF is inserted as a weighted point, source by source,
/// in leaf id order. Leaf ids in the result are assigned fresh. A source
/// leaf already within the source's T may still be wider than the target's,
/// so every source threshold must not exceed `params.threshold`.
///
/// # Errors
///
/// - `ClusterError::InvalidParameter` if `params` is invalid or a source was
///   built with a larger threshold.
/// - `ClusterError::DimensionMismatch` if the sources disagree on dimension.
/// - `ClusterError::NumericAnomaly` if a merged statistic would overflow.
pub fn merge_trees(params: ClusterParams, sources: &[CfTree]) -> Result<CfTree> {
    let mut merged = CfTree::new(params)?;
    let threshold = merged.threshold();

    for (source_idx, source) in sources.iter().enumerate() {
        if source.threshold() > threshold {
            return Err(ClusterError::invalid_parameter(format!(
                "source tree {} has threshold {}, larger than target threshold {}",
                source_idx,
                source.threshold(),
                threshold
            )));
        }

        for (leaf, cf) in source.leaf_features() {
            let insertion = merged.insert_feature(cf).map_err(|e| {
                warn!(source = source_idx, leaf = %leaf, error = %e, "Fan-in insertion failed");
                e
            })?;
            if insertion.anomaly {
                warn!(
                    source = source_idx,
                    leaf = %leaf,
                    "Fan-in merge would overflow; kept as a separate leaf"
                );
            }
        }
    }

    debug!(
        sources = sources.len(),
        leaves = merged.leaf_count(),
        points = merged.total_points(),
        "Merged trees"
    );
    Ok(merged)
}
