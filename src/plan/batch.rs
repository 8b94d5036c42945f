//! Batch splitter
//!
//! With a batch size no larger than the camera count every timestamp is a
//! batch of its own. A larger batch size switches to directory mode, where
//! the raw files of each source directory are cut into consecutive ranges
//! of `split_at` files:
//!
//! ```text
//! split_at = 10, cameras = 4, 23 files
//!   [0..10) [10..20) [20..23)        trailing batch kept
//!   [0..10) [10..20)                 truncate: keep 20, drop 3
//!
//! split_at = 10, cameras = 4, 15 files
//!   [0..10) [10..12)                 truncate: keep 12, drop 3
//! ```

use crate::capture::{RawFile, Timestamp};
use crate::plan::PlanStats;
use crate::scan::SourceListing;
use std::cmp::Ordering;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// How timestamps are grouped into jobs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchMode {
    /// One job per timestamp
    PerTimestamp,
    /// Jobs cover ranges of files in each source directory
    Directory,
}

impl BatchMode {
    /// Directory mode once a batch would span more than one timestamp group
    pub fn for_split(split_at: usize, camera_count: u32) -> Self {
        if split_at > camera_count as usize {
            BatchMode::Directory
        } else {
            BatchMode::PerTimestamp
        }
    }
}

/// What a batch covers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkItem {
    /// Every raw file of one timestamp
    Timestamp(Timestamp),

    /// `count` files of a directory starting at sorted index `first`
    Files {
        directory: PathBuf,
        first: usize,
        count: usize,
    },
}

/// A unit handed to the dispatcher
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    /// 1-based emission order
    pub seq: u64,

    /// Output identifier passed to the processing program
    pub output_id: String,

    /// Covered work
    pub item: WorkItem,

    /// Raw files covered
    pub raw_files: usize,
}

/// Groups ordered work into batches without reordering it
pub struct BatchSplitter<'a> {
    run_id: &'a str,
    split_at: usize,
    camera_count: usize,
    truncate: bool,
    stats: &'a PlanStats,
}

impl<'a> BatchSplitter<'a> {
    pub fn new(
        run_id: &'a str,
        split_at: usize,
        camera_count: u32,
        truncate: bool,
        stats: &'a PlanStats,
    ) -> Self {
        Self {
            run_id,
            split_at,
            camera_count: camera_count as usize,
            truncate,
            stats,
        }
    }

    /// One batch per timestamp, preserving input order
    pub fn per_timestamp<I>(self, timestamps: I) -> impl Iterator<Item = Batch> + 'a
    where
        I: Iterator<Item = Timestamp> + 'a,
    {
        let run_id = self.run_id;
        let camera_count = self.camera_count;
        let stats = self.stats;

        timestamps.enumerate().map(move |(idx, ts)| {
            let total = stats.record_batch(camera_count as u64);
            debug!(timestamp = %ts, total_files = total, "Batch");
            Batch {
                seq: idx as u64 + 1,
                output_id: format!("{}-{}", run_id, ts),
                item: WorkItem::Timestamp(ts),
                raw_files: camera_count,
            }
        })
    }

    /// Directory-mode batches for the whole listing, sorted numerically by directory
    pub fn directories(self, listing: &SourceListing) -> Vec<Batch> {
        let mut dirs: Vec<(PathBuf, Vec<&RawFile>)> = listing.by_directory().into_iter().collect();
        dirs.sort_by(|a, b| numeric_order(&a.0, &b.0));

        let mut batches = Vec::new();
        for (directory, files) in dirs {
            let (ranges, dropped) =
                chunk_ranges(files.len(), self.split_at, self.camera_count, self.truncate);
            if dropped > 0 {
                warn!(
                    directory = %directory.display(),
                    dropped,
                    camera_count = self.camera_count,
                    "Truncating trailing partial batch"
                );
                self.stats.record_truncated(dropped as u64);
            }

            for (first, count) in ranges {
                let seq = batches.len() as u64 + 1;
                self.stats.record_batch(count as u64);
                batches.push(Batch {
                    seq,
                    output_id: format!("{}_{:04}", self.run_id, seq),
                    item: WorkItem::Files {
                        directory: directory.clone(),
                        first,
                        count,
                    },
                    raw_files: count,
                });
            }
        }

        info!(
            batches = batches.len(),
            files = self.stats.raw_files(),
            "Directory batches prepared"
        );
        batches
    }
}

/// Cut `total` files into ranges of `split_at`
///
/// Returns the `(first, count)` ranges and the number of files dropped. Only
/// the trailing range can be short. With `truncate` the directory is cut at
/// the last whole multiple of `camera_count`, so the kept file count is
/// always a whole number of camera groups.
pub fn chunk_ranges(
    total: usize,
    split_at: usize,
    camera_count: usize,
    truncate: bool,
) -> (Vec<(usize, usize)>, usize) {
    let keep = if truncate && camera_count > 0 {
        total - total % camera_count
    } else {
        total
    };

    let ranges = (0..keep)
        .step_by(split_at.max(1))
        .map(|first| (first, split_at.max(1).min(keep - first)))
        .collect();

    (ranges, total - keep)
}

/// Numeric directory order: numeric names by value first, then the rest by name
pub fn numeric_order(a: &Path, b: &Path) -> Ordering {
    let key = |p: &Path| {
        let name = p
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        (name.parse::<u64>().ok(), name)
    };

    let (na, sa) = key(a);
    let (nb, sb) = key(b);
    let by_name = match (na, nb) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => sa.cmp(&sb),
    };
    by_name.then_with(|| a.cmp(b))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_mode() {
        assert_eq!(BatchMode::for_split(26, 26), BatchMode::PerTimestamp);
        assert_eq!(BatchMode::for_split(1, 26), BatchMode::PerTimestamp);
        assert_eq!(BatchMode::for_split(27, 26), BatchMode::Directory);
    }

    #[test]
    fn test_chunk_ranges_keeps_trailing() {
        let (ranges, dropped) = chunk_ranges(23, 10, 4, false);
        assert_eq!(ranges, vec![(0, 10), (10, 10), (20, 3)]);
        assert_eq!(dropped, 0);
    }

    #[test]
    fn test_chunk_ranges_truncates_to_whole_groups() {
        let (ranges, dropped) = chunk_ranges(27, 10, 4, true);
        assert_eq!(ranges, vec![(0, 10), (10, 10), (20, 4)]);
        assert_eq!(dropped, 3);

        let (ranges, dropped) = chunk_ranges(23, 10, 4, true);
        assert_eq!(ranges, vec![(0, 10), (10, 10)]);
        assert_eq!(dropped, 3);
    }

    #[test]
    fn test_chunk_ranges_cut_counts_from_directory_start() {
        // 10 is not a multiple of 4, so the cut lands inside the trailing range
        let (ranges, dropped) = chunk_ranges(15, 10, 4, true);
        assert_eq!(ranges, vec![(0, 10), (10, 2)]);
        assert_eq!(dropped, 3);

        let kept: usize = ranges.iter().map(|(_, count)| count).sum();
        assert_eq!(kept % 4, 0);
    }

    #[test]
    fn test_chunk_ranges_exact_multiple() {
        let (ranges, dropped) = chunk_ranges(20, 10, 4, true);
        assert_eq!(ranges, vec![(0, 10), (10, 10)]);
        assert_eq!(dropped, 0);
        assert!(chunk_ranges(0, 10, 4, true).0.is_empty());
    }

    #[test]
    fn test_numeric_order() {
        let mut dirs: Vec<PathBuf> = ["/s/10", "/s/b", "/s/9", "/s/a", "/s/100"]
            .into_iter()
            .map(PathBuf::from)
            .collect();
        dirs.sort_by(|a, b| numeric_order(a, b));
        let names: Vec<_> = dirs.iter().map(|p| p.to_str().unwrap()).collect();
        assert_eq!(names, vec!["/s/9", "/s/10", "/s/100", "/s/a", "/s/b"]);
    }

    #[test]
    fn test_per_timestamp_preserves_order() {
        let stats = PlanStats::default();
        let splitter = BatchSplitter::new("run", 4, 4, false, &stats);
        let input = ["1466431433_000003", "1466431433_000001"]
            .map(|s| Timestamp::extract(s).unwrap());

        let batches: Vec<_> = splitter.per_timestamp(input.into_iter()).collect();
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].seq, 1);
        assert_eq!(batches[0].output_id, "run-1466431433_000003");
        assert_eq!(batches[1].output_id, "run-1466431433_000001");
        assert_eq!(stats.batches(), 2);
        assert_eq!(stats.raw_files(), 8);
    }

    #[test]
    fn test_directories() {
        let paths = (0..6)
            .map(|i| PathBuf::from(format!("10/1466431433_00000{}_1.jp4", i)))
            .chain((0..3).map(|i| PathBuf::from(format!("9/1466431433_10000{}_1.jp4", i))));
        let listing = SourceListing::from_paths(Path::new("/src"), paths, "jp4");
        let stats = PlanStats::default();

        let batches = BatchSplitter::new("run", 4, 2, true, &stats).directories(&listing);
        let items: Vec<_> = batches.iter().map(|b| b.item.clone()).collect();
        assert_eq!(
            items,
            vec![
                WorkItem::Files {
                    directory: "/src/9".into(),
                    first: 0,
                    count: 2
                },
                WorkItem::Files {
                    directory: "/src/10".into(),
                    first: 0,
                    count: 4
                },
                WorkItem::Files {
                    directory: "/src/10".into(),
                    first: 4,
                    count: 2
                },
            ]
        );
        assert_eq!(batches[2].output_id, "run_0003");
        assert_eq!(stats.truncated_files(), 1);
    }
}
