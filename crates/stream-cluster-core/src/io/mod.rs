//! Point-stream input and result output.
//!
//! The engine itself only sees records (`Result<Vec<f64>>`); this module
//! adapts text files into records and writes assignments, run summaries and
//! tree snapshots back out.

mod reader;
mod writer;

pub use reader::TextPointReader;
pub use writer::{
    load_snapshot, load_summary, save_assignments, save_snapshot, save_summary, write_assignments,
    write_summary,
};
