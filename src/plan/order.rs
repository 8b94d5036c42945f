//! Ordering strategies
//!
//! Sequential order is the enumerator's sorted order. Progressive order
//! visits the sorted list at a halving stride so that the first jobs sample
//! the whole capture:
//!
//! ```text
//! n = 9   stride 5: 0 5 8      stride 2: 2 4 6      stride 1: 1 3 7
//! ```
//!
//! Both strategies drop timestamps whose raw file group is incomplete.

use crate::capture::Timestamp;
use crate::plan::PlanStats;
use crate::scan::SourceListing;
use tracing::warn;

/// Order in which timestamps are emitted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OrderMode {
    /// Chronological
    #[default]
    Sequential,
    /// Recursive bisection over the chronological list
    Progressive,
}

/// Index permutation of `0..n` in progressive order
#[derive(Debug, Clone)]
pub struct ProgressiveIndices {
    len: usize,
    stride: usize,
    pos: usize,
    tail_checked: bool,
    visited: Vec<bool>,
    emitted: usize,
}

impl ProgressiveIndices {
    /// Progressive permutation of `0..len`
    pub fn new(len: usize) -> Self {
        Self {
            len,
            stride: len.div_ceil(2).max(1),
            pos: 0,
            tail_checked: false,
            visited: vec![false; len],
            emitted: 0,
        }
    }

    fn visit(&mut self, idx: usize) -> Option<usize> {
        if self.visited[idx] {
            return None;
        }
        self.visited[idx] = true;
        self.emitted += 1;
        Some(idx)
    }
}

impl Iterator for ProgressiveIndices {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        while self.emitted < self.len {
            if self.pos < self.len {
                let idx = self.pos;
                self.pos += self.stride;
                if let Some(idx) = self.visit(idx) {
                    return Some(idx);
                }
                continue;
            }

            if !self.tail_checked {
                self.tail_checked = true;
                if let Some(idx) = self.visit(self.len - 1) {
                    return Some(idx);
                }
                continue;
            }

            // Pass finished; the stride 1 pass covers every index
            if self.stride == 1 {
                break;
            }
            self.stride = (self.stride / 2).max(1);
            self.pos = 0;
            self.tail_checked = false;
        }
        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = self.len - self.emitted;
        (left, Some(left))
    }
}

impl ExactSizeIterator for ProgressiveIndices {}

/// Items of a list in progressive order, moved out without cloning
pub struct Progressive<T> {
    items: Vec<Option<T>>,
    indices: ProgressiveIndices,
}

impl<T> Progressive<T> {
    pub fn new(items: Vec<T>) -> Self {
        let indices = ProgressiveIndices::new(items.len());
        Self {
            items: items.into_iter().map(Some).collect(),
            indices,
        }
    }
}

impl<T> Iterator for Progressive<T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        let idx = self.indices.next()?;
        self.items[idx].take()
    }
}

/// Arrange a sorted sequence according to the ordering mode
///
/// Progressive order needs the whole list, so it collects its input first;
/// sequential order stays lazy.
pub fn arrange<'a, T, I>(mode: OrderMode, input: I) -> Box<dyn Iterator<Item = T> + 'a>
where
    T: 'a,
    I: Iterator<Item = T> + 'a,
{
    match mode {
        OrderMode::Sequential => Box::new(input),
        OrderMode::Progressive => Box::new(Progressive::new(input.collect())),
    }
}

/// Source-side group integrity check
///
/// A timestamp is usable only when exactly `expected` raw files share it.
pub struct GroupCheck<'a> {
    listing: &'a SourceListing,
    expected: usize,
    stats: &'a PlanStats,
}

impl<'a> GroupCheck<'a> {
    pub fn new(listing: &'a SourceListing, expected: usize, stats: &'a PlanStats) -> Self {
        Self {
            listing,
            expected,
            stats,
        }
    }

    /// Accept a timestamp, or warn and count it as skipped
    pub fn accept(&self, ts: &Timestamp) -> bool {
        let found = self.listing.group_size(ts);
        if found == self.expected {
            return true;
        }
        warn!(
            timestamp = %ts,
            found,
            expected = self.expected,
            "Discarding timestamp with incomplete file group"
        );
        self.stats.record_incomplete();
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::path::{Path, PathBuf};

    #[test]
    fn test_progressive_small() {
        assert_eq!(ProgressiveIndices::new(0).count(), 0);
        assert_eq!(ProgressiveIndices::new(1).collect::<Vec<_>>(), vec![0]);
        assert_eq!(ProgressiveIndices::new(2).collect::<Vec<_>>(), vec![0, 1]);
        assert_eq!(ProgressiveIndices::new(4).collect::<Vec<_>>(), vec![0, 2, 3, 1]);
        assert_eq!(ProgressiveIndices::new(5).collect::<Vec<_>>(), vec![0, 3, 4, 1, 2]);
    }

    #[test]
    fn test_progressive_nine() {
        let order: Vec<_> = ProgressiveIndices::new(9).collect();
        assert_eq!(order, vec![0, 5, 8, 2, 4, 6, 1, 3, 7]);
    }

    #[test]
    fn test_progressive_is_permutation() {
        for n in 1..200 {
            let order: Vec<_> = ProgressiveIndices::new(n).collect();
            assert_eq!(order.len(), n, "length for n={n}");
            assert_eq!(order[0], 0);
            let unique: HashSet<_> = order.iter().copied().collect();
            assert_eq!(unique.len(), n, "duplicates for n={n}");
            assert!(order.iter().all(|&i| i < n));
        }
    }

    #[test]
    fn test_progressive_spreads_early() {
        // The first pass covers both ends of the capture
        let order: Vec<_> = ProgressiveIndices::new(100).take(3).collect();
        assert_eq!(order, vec![0, 50, 99]);
    }

    #[test]
    fn test_arrange() {
        let seq: Vec<_> = arrange(OrderMode::Sequential, 0..5).collect();
        assert_eq!(seq, vec![0, 1, 2, 3, 4]);

        let prog: Vec<_> = arrange(OrderMode::Progressive, "abcd".chars()).collect();
        assert_eq!(prog, vec!['a', 'c', 'd', 'b']);
    }

    #[test]
    fn test_group_check() {
        let listing = SourceListing::from_paths(
            Path::new("/src"),
            [
                "1466431433_000001_1.jp4",
                "1466431433_000001_2.jp4",
                "1466431433_000002_1.jp4",
            ]
            .map(PathBuf::from),
            "jp4",
        );
        let stats = PlanStats::default();
        let check = GroupCheck::new(&listing, 2, &stats);

        assert!(check.accept(&Timestamp::extract("1466431433_000001").unwrap()));
        assert!(!check.accept(&Timestamp::extract("1466431433_000002").unwrap()));
        assert_eq!(stats.skipped_incomplete(), 1);
    }

    /// In-memory log sink for asserting on emitted events
    #[derive(Clone, Default)]
    struct CapturedLog(std::sync::Arc<parking_lot::Mutex<Vec<u8>>>);

    impl std::io::Write for CapturedLog {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_group_check_warns_on_incomplete_group() {
        let listing = SourceListing::from_paths(
            Path::new("/src"),
            ["1466431433_000002_1.jp4"].map(PathBuf::from),
            "jp4",
        );
        let stats = PlanStats::default();
        let check = GroupCheck::new(&listing, 2, &stats);

        let log = CapturedLog::default();
        let sink = log.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || sink.clone())
            .with_ansi(false)
            .finish();
        tracing::subscriber::with_default(subscriber, || {
            assert!(!check.accept(&Timestamp::extract("1466431433_000002").unwrap()));
        });

        let output = String::from_utf8(log.0.lock().clone()).unwrap();
        assert!(output.contains("WARN"), "{output}");
        assert!(output.contains("Discarding timestamp with incomplete file group"));
        assert!(output.contains("timestamp=1466431433_000002"));
        assert!(output.contains("found=1"));
        assert!(output.contains("expected=2"));
    }
}
