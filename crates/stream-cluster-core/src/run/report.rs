//! Results of a clustering run.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::clustering::ClusteringFeature;
use crate::config::ClusterParams;
use crate::error::ClusterError;

/// Cluster id assigned to one input record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignment {
    /// 0-based index of the record in the input stream.
    pub index: usize,
    /// Final cluster id (a leaf id when no consolidation ran).
    pub cluster: usize,
}

/// Per-cluster statistics derived from its merged CF.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterSummary {
    /// Final cluster id.
    pub id: usize,
    /// Number of points in the cluster.
    pub points: u64,
    /// Mean of the cluster's points.
    pub centroid: Vec<f64>,
    /// Root-mean-square distance of the points from the centroid.
    pub radius: f64,
}

impl ClusterSummary {
    pub(crate) fn from_feature(id: usize, cf: &ClusteringFeature) -> Self {
        Self {
            id,
            points: cf.n,
            centroid: cf.centroid(),
            radius: cf.radius(),
        }
    }
}

/// Serializable run statistics, written next to the assignments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Leaf radius threshold T.
    pub threshold: f64,
    /// Maximum entries per node B.
    pub branching_factor: usize,
    /// Requested cluster count K, if any.
    pub target_clusters: Option<usize>,
    /// Records pulled from the input, including skipped ones.
    pub records_read: usize,
    /// Points absorbed into the tree.
    pub points_ingested: usize,
    /// Malformed records that were skipped.
    pub skipped_records: usize,
    /// Points rejected or isolated because a statistic would overflow.
    pub numeric_anomalies: usize,
    /// Leaf clusters in the tree at the end of the run.
    pub leaf_count: usize,
    /// Distinct final cluster ids.
    pub cluster_count: usize,
    /// Wall-clock processing time in milliseconds.
    pub elapsed_ms: u64,
    /// Whether leaves were merged down to `target_clusters`.
    pub consolidated: bool,
    /// Whether the run stopped on its cancellation token.
    pub cancelled: bool,
    /// Whether the run stopped at `max_records`.
    pub truncated: bool,
    /// Whether a fatal error ended the run early.
    pub aborted: bool,
}

/// Outcome of a finished (or aborted) run.
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterReport {
    pub(crate) params: ClusterParams,
    pub(crate) assignments: Vec<Assignment>,
    pub(crate) clusters: Vec<ClusterSummary>,
    pub(crate) records_read: usize,
    pub(crate) skipped_records: usize,
    pub(crate) numeric_anomalies: usize,
    pub(crate) leaf_count: usize,
    pub(crate) elapsed: Duration,
    pub(crate) consolidated: bool,
    pub(crate) cancelled: bool,
    pub(crate) truncated: bool,
    pub(crate) aborted: bool,
}

impl ClusterReport {
    /// Parameters the run used.
    pub fn params(&self) -> &ClusterParams {
        &self.params
    }

    /// `(record index, cluster id)` for every ingested point, in input order.
    pub fn assignments(&self) -> &[Assignment] {
        &self.assignments
    }

    /// Cluster id sequence in input order, one per ingested point.
    pub fn cluster_ids(&self) -> Vec<usize> {
        self.assignments.iter().map(|a| a.cluster).collect()
    }

    /// Cluster id of the record at `index`, if it was ingested.
    pub fn cluster_of(&self, index: usize) -> Option<usize> {
        self.assignments
            .binary_search_by_key(&index, |a| a.index)
            .ok()
            .map(|pos| self.assignments[pos].cluster)
    }

    /// Number of distinct clusters in the final labeling.
    pub fn cluster_count(&self) -> usize {
        self.clusters.len()
    }

    /// Per-cluster statistics, ordered by cluster id.
    pub fn clusters(&self) -> &[ClusterSummary] {
        &self.clusters
    }

    /// Leaf CFs in the tree when the run ended.
    pub fn leaf_count(&self) -> usize {
        self.leaf_count
    }

    /// Records offered to the run, including skipped and rejected ones.
    pub fn records_read(&self) -> usize {
        self.records_read
    }

    /// Points absorbed into the tree by this run.
    pub fn points_ingested(&self) -> usize {
        self.assignments.len()
    }

    /// Malformed records that were skipped.
    pub fn skipped_records(&self) -> usize {
        self.skipped_records
    }

    /// Rejected points plus merges that fell back to a singleton.
    pub fn numeric_anomalies(&self) -> usize {
        self.numeric_anomalies
    }

    /// Streaming and consolidation time.
    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    /// Whether cluster ids come from global consolidation.
    pub fn consolidated(&self) -> bool {
        self.consolidated
    }

    /// Whether the run stopped on its cancel token.
    pub fn cancelled(&self) -> bool {
        self.cancelled
    }

    /// Whether records were left unread because of `max_records`.
    pub fn truncated(&self) -> bool {
        self.truncated
    }

    /// Whether a fatal error ended the stream.
    pub fn aborted(&self) -> bool {
        self.aborted
    }

    /// Serializable statistics for this report.
    pub fn summary(&self) -> RunSummary {
        RunSummary {
            threshold: self.params.threshold,
            branching_factor: self.params.branching_factor,
            target_clusters: self.params.target_clusters,
            records_read: self.records_read,
            points_ingested: self.points_ingested(),
            skipped_records: self.skipped_records,
            numeric_anomalies: self.numeric_anomalies,
            leaf_count: self.leaf_count,
            cluster_count: self.cluster_count(),
            elapsed_ms: u64::try_from(self.elapsed.as_millis()).unwrap_or(u64::MAX),
            consolidated: self.consolidated,
            cancelled: self.cancelled,
            truncated: self.truncated,
            aborted: self.aborted,
        }
    }
}

/// A fatal error together with everything recorded before it.
#[derive(Debug, Error)]
#[error("Run aborted after {} records: {error}", .partial.records_read)]
pub struct RunAborted {
    /// Error that ended the stream.
    #[source]
    pub error: ClusterError,
    /// Assignments and counters up to the failing record, with leaf ids.
    pub partial: Box<ClusterReport>,
}

impl From<RunAborted> for ClusterError {
    fn from(aborted: RunAborted) -> Self {
        aborted.error
    }
}
