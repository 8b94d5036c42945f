//! Work enumerator
//!
//! Yields each distinct timestamp of a [`SourceListing`] once, in sorted
//! order. With an oracle attached, timestamps whose outputs are already
//! complete in the destination snapshot are dropped. That costs one oracle
//! call (a handful of set lookups) per timestamp, so it is opt-in.

use crate::capture::Timestamp;
use crate::plan::PlanStats;
use crate::scan::SourceListing;
use crate::snapshot::CompletionOracle;
use tracing::debug;

/// Lazy, deduplicated, sorted timestamp source
pub struct WorkEnumerator<'a> {
    listing: &'a SourceListing,
    oracle: Option<&'a CompletionOracle>,
    stats: &'a PlanStats,
}

impl<'a> WorkEnumerator<'a> {
    /// Create an enumerator; pass an oracle to skip completed timestamps
    pub fn new(
        listing: &'a SourceListing,
        oracle: Option<&'a CompletionOracle>,
        stats: &'a PlanStats,
    ) -> Self {
        Self {
            listing,
            oracle,
            stats,
        }
    }

    /// Timestamps still needing work
    pub fn timestamps(&self) -> impl Iterator<Item = &'a Timestamp> + 'a {
        let oracle = self.oracle;
        let stats = self.stats;

        self.listing.timestamps().filter(move |ts| {
            stats.record_seen();
            match oracle {
                Some(oracle) if oracle.is_complete(ts) => {
                    debug!(timestamp = %ts, "Already complete, skipping");
                    stats.record_complete();
                    false
                }
                _ => true,
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::{DestinationSnapshot, OutputFormat};
    use std::path::{Path, PathBuf};
    use std::sync::Arc;

    fn listing() -> SourceListing {
        SourceListing::from_paths(
            Path::new("/src"),
            [
                "1466431433_000001_1.jp4",
                "1466431433_000002_1.jp4",
                "1466431433_000003_1.jp4",
            ]
            .map(PathBuf::from),
            "jp4",
        )
    }

    #[test]
    fn test_without_oracle_yields_all() {
        let listing = listing();
        let stats = PlanStats::default();
        let found: Vec<_> = WorkEnumerator::new(&listing, None, &stats)
            .timestamps()
            .map(|t| t.as_str().to_string())
            .collect();
        assert_eq!(
            found,
            vec!["1466431433_000001", "1466431433_000002", "1466431433_000003"]
        );
        assert_eq!(stats.timestamps_seen(), 3);
    }

    #[test]
    fn test_oracle_filters_complete() {
        let listing = listing();
        let snapshot =
            DestinationSnapshot::from_names(["1466431433_000002-00-DECONV-RGB24_EQR.jpeg"]);
        let oracle = CompletionOracle::new(Arc::new(snapshot), 1, OutputFormat::Jpeg);
        let stats = PlanStats::default();

        let found: Vec<_> = WorkEnumerator::new(&listing, Some(&oracle), &stats)
            .timestamps()
            .map(|t| t.as_str().to_string())
            .collect();
        assert_eq!(found, vec!["1466431433_000001", "1466431433_000003"]);
        assert_eq!(stats.skipped_complete(), 1);
    }
}
