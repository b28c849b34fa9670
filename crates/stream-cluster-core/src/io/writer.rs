//! Result and snapshot persistence.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use tracing::debug;

use crate::clustering::{CfTree, TreeSnapshot};
use crate::error::Result;
use crate::run::{ClusterReport, RunSummary};

/// Write one `index cluster` line per ingested point.
///
/// A `#` header line carries the point, cluster and skipped-record counts.
pub fn write_assignments<W: Write>(mut writer: W, report: &ClusterReport) -> Result<()> {
    writeln!(
        writer,
        "# points {} clusters {} skipped {}",
        report.points_ingested(),
        report.cluster_count(),
        report.skipped_records()
    )?;
    for assignment in report.assignments() {
        writeln!(writer, "{} {}", assignment.index, assignment.cluster)?;
    }
    writer.flush()?;
    Ok(())
}

/// Write assignments to a file, replacing it.
pub fn save_assignments(path: impl AsRef<Path>, report: &ClusterReport) -> Result<()> {
    let path = path.as_ref();
    write_assignments(BufWriter::new(File::create(path)?), report)?;
    debug!(path = %path.display(), points = report.points_ingested(), "Wrote assignments");
    Ok(())
}

/// Write a run summary as pretty-printed JSON.
pub fn write_summary<W: Write>(mut writer: W, summary: &RunSummary) -> Result<()> {
    serde_json::to_writer_pretty(&mut writer, summary)?;
    writeln!(writer)?;
    writer.flush()?;
    Ok(())
}

/// Write a run summary to a JSON file, replacing it.
pub fn save_summary(path: impl AsRef<Path>, summary: &RunSummary) -> Result<()> {
    let path = path.as_ref();
    write_summary(BufWriter::new(File::create(path)?), summary)?;
    debug!(path = %path.display(), "Wrote run summary");
    Ok(())
}

/// Read a run summary written by [`save_summary`].
pub fn load_summary(path: impl AsRef<Path>) -> Result<RunSummary> {
    let file = File::open(path.as_ref())?;
    Ok(serde_json::from_reader(BufReader::new(file))?)
}

/// Persist a tree as a JSON snapshot.
pub fn save_snapshot(path: impl AsRef<Path>, tree: &CfTree) -> Result<()> {
    let path = path.as_ref();
    let mut writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer(&mut writer, &tree.snapshot())?;
    writer.flush()?;
    debug!(
        path = %path.display(),
        nodes = tree.node_count(),
        leaves = tree.leaf_count(),
        "Saved CF-tree snapshot"
    );
    Ok(())
}

/// Load and validate a tree written by [`save_snapshot`].
///
/// # Errors
///
/// `ClusterError::Io` or `ClusterError::Serialization` if the file cannot
/// be read or decoded, `ClusterError::CorruptSnapshot` if it does not
/// describe a valid tree.
pub fn load_snapshot(path: impl AsRef<Path>) -> Result<CfTree> {
    let file = File::open(path.as_ref())?;
    let snapshot: TreeSnapshot = serde_json::from_reader(BufReader::new(file))?;
    CfTree::from_snapshot(snapshot)
}
