//! Whitespace-separated text point streams.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::error::{ClusterError, Result};

/// Reads one point per line.
///
/// Coordinates are separated by ASCII whitespace. Blank lines and lines
/// whose first non-blank character is `#` are ignored. A line that fails to
/// parse, including one that is not valid UTF-8, yields `ClusterError::Parse`
/// with its 1-based line number, and reading continues with the next line.
/// An I/O error is yielded once and ends the stream.
///
/// # Example
///
/// ```
/// use stream_cluster_core::io::TextPointReader;
///
/// let input = "# frame vectors\n0 0\n0.5 1e-3\n\nbad line\n";
/// let records: Vec<_> = TextPointReader::new(input.as_bytes()).collect();
///
/// assert_eq!(records.len(), 3);
/// assert_eq!(records[1].as_ref().unwrap(), &vec![0.5, 0.001]);
/// assert!(records[2].is_err());
/// ```
#[derive(Debug)]
pub struct TextPointReader<R> {
    reader: R,
    line: usize,
    buf: Vec<u8>,
    done: bool,
}

impl<R: BufRead> TextPointReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            line: 0,
            buf: Vec::new(),
            done: false,
        }
    }

    /// Number of lines consumed so far.
    pub fn lines_read(&self) -> usize {
        self.line
    }
}

impl TextPointReader<BufReader<File>> {
    /// Open a point file.
    ///
    /// # Errors
    ///
    /// Returns `ClusterError::Io` if the file cannot be opened.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        Ok(Self::new(BufReader::new(file)))
    }
}

fn parse_point(text: &str, line: usize) -> Result<Vec<f64>> {
    text.split_ascii_whitespace()
        .map(|token| {
            token
                .parse::<f64>()
                .map_err(|e| ClusterError::parse(line, format!("'{}': {}", token, e)))
        })
        .collect()
}

impl<R: BufRead> Iterator for TextPointReader<R> {
    type Item = Result<Vec<f64>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        loop {
            self.buf.clear();
            match self.reader.read_until(b'\n', &mut self.buf) {
                Ok(0) => {
                    self.done = true;
                    return None;
                }
                Ok(_) => {
                    self.line += 1;
                    let text = match std::str::from_utf8(&self.buf) {
                        Ok(text) => text.trim(),
                        Err(e) => {
                            return Some(Err(ClusterError::parse(
                                self.line,
                                format!("invalid UTF-8: {}", e),
                            )))
                        }
                    };
                    if text.is_empty() || text.starts_with('#') {
                        continue;
                    }
                    return Some(parse_point(text, self.line));
                }
                Err(e) => {
                    self.done = true;
                    return Some(Err(e.into()));
                }
            }
        }
    }
}
