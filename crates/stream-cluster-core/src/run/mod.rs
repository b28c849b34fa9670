//! Clustering runs.
//!
//! A [`ClusterRun`] owns one tree and the counters of one pass over a record
//! stream. It moves through `Init -> Streaming -> Consolidating -> Done` and
//! never back; clustering another stream into the same tree goes through
//! [`ClusterRun::resume`].
//!
//! Record handling:
//! - a point is inserted and assigned its leaf id
//! - a malformed record (`ClusterError::Parse`) is skipped and counted
//! - a point rejected as a `NumericAnomaly` is counted and gets no assignment
//! - any other error aborts the run; [`ClusterRun::run`] returns it together
//!   with the partial report, labeled with leaf ids
//!
//! When the stream ends (or the cancel token or record limit stops it), the
//! run consolidates the leaves into `target_clusters` groups if configured
//! and rewrites every assignment once.

mod cancel;
mod report;

pub use cancel::CancelToken;
pub use report::{Assignment, ClusterReport, ClusterSummary, RunAborted, RunSummary};

use std::time::{Duration, Instant};

use tracing::{info, warn};

use crate::clustering::{CfTree, Consolidation, GlobalConsolidator, LeafId};
use crate::config::ClusterParams;
use crate::error::{ClusterError, Result};

/// Lifecycle of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    /// Created, no record seen yet.
    Init,
    /// Accepting records.
    Streaming,
    /// Merging leaf CFs down to the target cluster count.
    Consolidating,
    /// Report produced; no further records accepted.
    Done,
}

/// What happened to one offered record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    /// The point was absorbed into `leaf`.
    Assigned { index: usize, leaf: LeafId },
    /// The record was malformed and skipped.
    Skipped { index: usize },
    /// The point was rejected as a numeric anomaly.
    Rejected { index: usize },
    /// The run stopped (cancelled or record limit reached); the record was
    /// not consumed.
    Stopped,
}

/// One pass of a record stream through a CF-tree.
///
/// # Example
///
/// ```
/// use stream_cluster_core::config::ClusterParams;
/// use stream_cluster_core::run::ClusterRun;
///
/// let points = vec![vec![0.0, 0.0], vec![0.1, 0.0], vec![10.0, 10.0]];
/// let mut run = ClusterRun::new(ClusterParams::new(0.5)).unwrap();
/// let report = run.run(points.into_iter().map(Ok)).unwrap();
///
/// assert_eq!(report.cluster_ids(), vec![0, 0, 1]);
/// assert_eq!(report.cluster_count(), 2);
/// ```
#[derive(Debug)]
pub struct ClusterRun {
    params: ClusterParams,
    tree: CfTree,
    state: RunState,
    cancel: CancelToken,
    /// (record index, leaf) per ingested point, in input order.
    assignments: Vec<(usize, LeafId)>,
    records_read: usize,
    skipped: usize,
    anomalies: usize,
    started: Option<Instant>,
    cancelled: bool,
    truncated: bool,
    aborted: bool,
}

impl ClusterRun {
    /// Start a run on a fresh tree.
    ///
    /// # Errors
    ///
    /// Returns `ClusterError::InvalidParameter` if `params` is invalid.
    pub fn new(params: ClusterParams) -> Result<Self> {
        let tree = CfTree::new(params.clone())?;
        Ok(Self::with_tree(params, tree))
    }

    /// Start a run that keeps inserting into an existing tree.
    ///
    /// `params` supplies the target cluster count and record limit for the
    /// new stream; its threshold and branching factor must match the tree.
    /// Record indexes start from zero again.
    ///
    /// # Errors
    ///
    /// Returns `ClusterError::InvalidParameter` if `params` is invalid or
    /// disagrees with the tree.
    pub fn resume(params: ClusterParams, tree: CfTree) -> Result<Self> {
        params.validate()?;
        if params.threshold != tree.threshold() || params.branching_factor != tree.branching_factor()
        {
            return Err(ClusterError::invalid_parameter(format!(
                "resume parameters (threshold {}, branching_factor {}) disagree with the tree \
                 (threshold {}, branching_factor {})",
                params.threshold,
                params.branching_factor,
                tree.threshold(),
                tree.branching_factor()
            )));
        }
        Ok(Self::with_tree(params, tree))
    }

    fn with_tree(params: ClusterParams, tree: CfTree) -> Self {
        Self {
            params,
            tree,
            state: RunState::Init,
            cancel: CancelToken::new(),
            assignments: Vec::new(),
            records_read: 0,
            skipped: 0,
            anomalies: 0,
            started: None,
            cancelled: false,
            truncated: false,
            aborted: false,
        }
    }

    /// Use `token` to stop this run.
    #[must_use]
    pub fn with_cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = token;
        self
    }

    /// Token that stops this run before its next record.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> RunState {
        self.state
    }

    /// Parameters this run was created with.
    pub fn params(&self) -> &ClusterParams {
        &self.params
    }

    /// The tree built so far.
    pub fn tree(&self) -> &CfTree {
        &self.tree
    }

    /// Take the tree, e.g. to snapshot it or resume with another stream.
    pub fn into_tree(self) -> CfTree {
        self.tree
    }

    /// Stream every record, then finish.
    ///
    /// # Errors
    ///
    /// Returns [`RunAborted`] carrying the first fatal error and the partial
    /// report if a record or the final consolidation fails.
    pub fn run<I, P>(&mut self, records: I) -> std::result::Result<ClusterReport, RunAborted>
    where
        I: IntoIterator<Item = Result<P>>,
        P: AsRef<[f64]>,
    {
        for record in records {
            match self.push_record(record) {
                Ok(RecordOutcome::Stopped) => break,
                Ok(_) => {}
                Err(error) => return Err(self.abort(error)),
            }
        }
        self.finish().map_err(|error| self.abort(error))
    }

    /// Offer one record that may have failed to parse.
    ///
    /// # Errors
    ///
    /// Returns the record's error if it is not recoverable, or any fatal
    /// error from [`ClusterRun::push_point`].
    pub fn push_record<P: AsRef<[f64]>>(&mut self, record: Result<P>) -> Result<RecordOutcome> {
        match record {
            Ok(point) => self.push_point(point.as_ref()),
            Err(error) => {
                self.begin()?;
                if self.should_stop() {
                    return Ok(RecordOutcome::Stopped);
                }
                let index = self.next_index();
                if error.is_recoverable() {
                    self.skipped += 1;
                    warn!(index, error = %error, "Skipped malformed record");
                    Ok(RecordOutcome::Skipped { index })
                } else {
                    self.aborted = true;
                    warn!(index, error = %error, "Aborting run on unreadable record");
                    Err(error)
                }
            }
        }
    }

    /// Offer one point.
    ///
    /// # Errors
    ///
    /// - `ClusterError::InvalidState` if the run has finished or aborted.
    /// - `ClusterError::DimensionMismatch` (or another fatal insertion
    ///   error); the run is aborted and keeps everything recorded so far.
    pub fn push_point(&mut self, point: &[f64]) -> Result<RecordOutcome> {
        self.begin()?;
        if self.should_stop() {
            return Ok(RecordOutcome::Stopped);
        }
        let index = self.next_index();

        match self.tree.insert(point) {
            Ok(insertion) => {
                if insertion.anomaly {
                    self.anomalies += 1;
                    warn!(
                        index,
                        leaf = %insertion.leaf,
                        "Merge would overflow; point kept as a singleton"
                    );
                }
                self.assignments.push((index, insertion.leaf));
                Ok(RecordOutcome::Assigned {
                    index,
                    leaf: insertion.leaf,
                })
            }
            Err(error) if error.is_recoverable() => {
                self.anomalies += 1;
                warn!(index, error = %error, "Rejected point");
                Ok(RecordOutcome::Rejected { index })
            }
            Err(error) => {
                self.aborted = true;
                warn!(index, error = %error, "Aborting run");
                Err(error)
            }
        }
    }

    /// End the stream: consolidate if a target is set and build the report.
    ///
    /// An aborted run is not consolidated; its report carries leaf ids.
    ///
    /// # Errors
    ///
    /// Returns `ClusterError::InvalidState` if the run already finished, or
    /// an error from consolidation.
    pub fn finish(&mut self) -> Result<ClusterReport> {
        if matches!(self.state, RunState::Consolidating | RunState::Done) {
            return Err(ClusterError::invalid_state("run already finished"));
        }

        let report = match self.params.target_clusters {
            Some(target) if !self.aborted => {
                self.state = RunState::Consolidating;
                let consolidation = GlobalConsolidator::new(target)?.consolidate(&self.tree)?;
                self.consolidated_report(&consolidation)?
            }
            _ => self.leaf_report(),
        };
        self.state = RunState::Done;

        info!(
            records = report.records_read(),
            points = report.points_ingested(),
            skipped = report.skipped_records(),
            anomalies = report.numeric_anomalies(),
            leaves = report.leaf_count(),
            clusters = report.cluster_count(),
            consolidated = report.consolidated(),
            cancelled = report.cancelled(),
            truncated = report.truncated(),
            elapsed_ms = report.elapsed().as_millis() as u64,
            "Clustering run finished"
        );
        Ok(report)
    }

    fn begin(&mut self) -> Result<()> {
        if self.aborted {
            return Err(ClusterError::invalid_state("run was aborted by an earlier error"));
        }
        match self.state {
            RunState::Init => {
                self.state = RunState::Streaming;
                self.started = Some(Instant::now());
                info!(
                    threshold = self.params.threshold,
                    branching_factor = self.params.branching_factor,
                    target_clusters = ?self.params.target_clusters,
                    max_records = ?self.params.max_records,
                    resumed_points = self.tree.total_points(),
                    "Clustering run started"
                );
                Ok(())
            }
            RunState::Streaming => Ok(()),
            RunState::Consolidating | RunState::Done => {
                Err(ClusterError::invalid_state("run already finished"))
            }
        }
    }

    /// Whether the cancel token or the record limit stops the next record.
    fn should_stop(&mut self) -> bool {
        if self.cancel.is_cancelled() {
            if !self.cancelled {
                info!(records = self.records_read, "Clustering run cancelled");
            }
            self.cancelled = true;
            return true;
        }
        if let Some(limit) = self.params.max_records {
            if self.records_read >= limit {
                if !self.truncated {
                    info!(limit, "Record limit reached; ignoring the rest of the stream");
                }
                self.truncated = true;
                return true;
            }
        }
        false
    }

    fn next_index(&mut self) -> usize {
        let index = self.records_read;
        self.records_read += 1;
        index
    }

    fn elapsed(&self) -> Duration {
        self.started.map(|s| s.elapsed()).unwrap_or_default()
    }

    fn abort(&mut self, error: ClusterError) -> RunAborted {
        self.aborted = true;
        self.state = RunState::Done;
        let partial = self.leaf_report();
        warn!(
            records = partial.records_read(),
            points = partial.points_ingested(),
            error = %error,
            "Clustering run aborted; returning partial results"
        );
        RunAborted {
            error,
            partial: Box::new(partial),
        }
    }

    fn base_report(
        &self,
        assignments: Vec<Assignment>,
        clusters: Vec<ClusterSummary>,
    ) -> ClusterReport {
        ClusterReport {
            params: self.params.clone(),
            assignments,
            clusters,
            records_read: self.records_read,
            skipped_records: self.skipped,
            numeric_anomalies: self.anomalies,
            leaf_count: self.tree.leaf_count(),
            elapsed: self.elapsed(),
            consolidated: false,
            cancelled: self.cancelled,
            truncated: self.truncated,
            aborted: self.aborted,
        }
    }

    fn leaf_report(&self) -> ClusterReport {
        let assignments = self
            .assignments
            .iter()
            .map(|&(index, leaf)| Assignment {
                index,
                cluster: leaf.0,
            })
            .collect();
        let clusters = self
            .tree
            .leaf_features()
            .into_iter()
            .map(|(leaf, cf)| ClusterSummary::from_feature(leaf.0, cf))
            .collect();
        self.base_report(assignments, clusters)
    }

    fn consolidated_report(&self, consolidation: &Consolidation) -> Result<ClusterReport> {
        let assignments = self
            .assignments
            .iter()
            .map(|&(index, leaf)| {
                consolidation
                    .label_of(leaf)
                    .map(|cluster| Assignment { index, cluster })
                    .ok_or_else(|| {
                        ClusterError::invalid_state(format!("{} missing from consolidation", leaf))
                    })
            })
            .collect::<Result<Vec<_>>>()?;
        let clusters = consolidation
            .clusters()
            .iter()
            .enumerate()
            .map(|(id, cf)| ClusterSummary::from_feature(id, cf))
            .collect();

        let mut report = self.base_report(assignments, clusters);
        report.consolidated = true;
        Ok(report)
    }
}

/// Cluster an in-memory point set in one run.
///
/// # Errors
///
/// Returns the run's fatal error (partial results are discarded; use
/// [`ClusterRun::run`] to keep them).
pub fn cluster_points<I, P>(params: ClusterParams, points: I) -> Result<ClusterReport>
where
    I: IntoIterator<Item = P>,
    P: AsRef<[f64]>,
{
    let mut run = ClusterRun::new(params)?;
    Ok(run.run(points.into_iter().map(Ok))?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn points(raw: &[&[f64]]) -> Vec<Result<Vec<f64>>> {
        raw.iter().map(|p| Ok(p.to_vec())).collect()
    }

    // =========================================================================
    // STATE MACHINE
    // =========================================================================

    #[test]
    fn test_state_transitions() {
        let mut run = ClusterRun::new(ClusterParams::new(1.0)).unwrap();
        assert_eq!(run.state(), RunState::Init);

        run.push_point(&[0.0]).unwrap();
        assert_eq!(run.state(), RunState::Streaming);

        run.finish().unwrap();
        assert_eq!(run.state(), RunState::Done);

        assert!(matches!(
            run.push_point(&[1.0]),
            Err(ClusterError::InvalidState(_))
        ));
        assert!(matches!(run.finish(), Err(ClusterError::InvalidState(_))));
        println!("[PASS] test_state_transitions");
    }

    #[test]
    fn test_finish_without_records() {
        let mut run = ClusterRun::new(ClusterParams::new(1.0).with_target_clusters(3)).unwrap();
        let report = run.finish().unwrap();
        assert_eq!(report.cluster_count(), 0);
        assert_eq!(report.points_ingested(), 0);
        assert!(report.consolidated());
    }

    #[test]
    fn test_invalid_params_fail_before_streaming() {
        assert!(ClusterRun::new(ClusterParams::new(0.0)).is_err());
        assert!(ClusterRun::new(ClusterParams::new(1.0).with_branching_factor(1)).is_err());
        assert!(ClusterRun::new(ClusterParams::new(1.0).with_target_clusters(0)).is_err());
    }

    // =========================================================================
    // RECORD HANDLING
    // =========================================================================

    #[test]
    fn test_malformed_records_are_skipped() {
        let records = vec![
            Ok(vec![0.0, 0.0]),
            Err(ClusterError::parse(2, "not a number: 'x'")),
            Ok(vec![0.1, 0.0]),
        ];
        let mut run = ClusterRun::new(ClusterParams::new(0.5)).unwrap();
        let report = run.run(records).unwrap();

        assert_eq!(report.skipped_records(), 1);
        assert_eq!(report.records_read(), 3);
        let indexes: Vec<usize> = report.assignments().iter().map(|a| a.index).collect();
        assert_eq!(indexes, vec![0, 2]);
        assert_eq!(report.cluster_of(1), None);
        assert_eq!(report.cluster_of(2), Some(0));
    }

    #[test]
    fn test_non_finite_point_is_counted_not_assigned() {
        let records = points(&[&[0.0], &[f64::NAN], &[0.2]]);
        let mut run = ClusterRun::new(ClusterParams::new(0.5)).unwrap();
        let report = run.run(records).unwrap();

        assert_eq!(report.numeric_anomalies(), 1);
        assert_eq!(report.points_ingested(), 2);
        assert!(!report.aborted());
        assert_eq!(run.tree().total_points(), 2);
    }

    #[test]
    fn test_dimension_mismatch_returns_partial_result() {
        let records = points(&[&[0.0, 0.0], &[5.0, 5.0], &[1.0, 2.0, 3.0], &[0.0, 0.1]]);
        let mut run = ClusterRun::new(ClusterParams::new(0.5).with_target_clusters(1)).unwrap();
        let aborted = run.run(records).unwrap_err();

        assert!(matches!(
            aborted.error,
            ClusterError::DimensionMismatch {
                expected: 2,
                actual: 3
            }
        ));
        let partial = &aborted.partial;
        assert!(partial.aborted());
        assert!(!partial.consolidated(), "aborted runs keep leaf ids");
        assert_eq!(partial.cluster_ids(), vec![0, 1]);
        assert_eq!(partial.records_read(), 3);
        assert_eq!(run.state(), RunState::Done);
        assert!(aborted.to_string().contains("Dimension mismatch"));
    }

    // =========================================================================
    // STOPPING
    // =========================================================================

    #[test]
    fn test_record_limit_truncates() {
        let raw: Vec<Vec<f64>> = (0..5).map(|i| vec![i as f64]).collect();

        let mut run = ClusterRun::new(ClusterParams::new(0.1).with_max_records(3)).unwrap();
        let report = run.run(raw.iter().cloned().map(Ok)).unwrap();
        assert_eq!(report.records_read(), 3);
        assert!(report.truncated());

        let mut run = ClusterRun::new(ClusterParams::new(0.1).with_max_records(5)).unwrap();
        let report = run.run(raw.iter().cloned().map(Ok)).unwrap();
        assert_eq!(report.records_read(), 5);
        assert!(!report.truncated(), "a stream that ends at the limit is complete");
    }

    #[test]
    fn test_cancellation_stops_before_next_record() {
        let token = CancelToken::new();
        let mut run = ClusterRun::new(ClusterParams::new(0.1).with_target_clusters(2))
            .unwrap()
            .with_cancel_token(token.clone());

        let records = (0..10).map(|i| {
            if i == 4 {
                token.cancel();
            }
            Ok(vec![i as f64 * 3.0])
        });
        let report = run.run(records).unwrap();

        assert!(report.cancelled());
        assert_eq!(report.records_read(), 4);
        assert!(report.consolidated(), "a cancelled run still finishes normally");
        assert_eq!(report.cluster_count(), 2);
    }

    // =========================================================================
    // RESUME
    // =========================================================================

    #[test]
    fn test_resume_requires_matching_tree_params() {
        let mut run = ClusterRun::new(ClusterParams::new(0.5)).unwrap();
        run.push_point(&[1.0]).unwrap();
        run.finish().unwrap();
        let tree = run.into_tree();

        assert!(ClusterRun::resume(ClusterParams::new(0.7), tree.clone()).is_err());

        let mut resumed =
            ClusterRun::resume(ClusterParams::new(0.5).with_target_clusters(1), tree).unwrap();
        let report = resumed.run(points(&[&[1.1], &[9.0]])).unwrap();
        assert_eq!(report.assignments()[0].index, 0);
        assert_eq!(resumed.tree().total_points(), 3);
        assert_eq!(report.cluster_ids(), vec![0, 0]);
    }
}
