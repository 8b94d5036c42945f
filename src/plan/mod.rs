//! Job planning: ordering, integrity filtering and batching
//!
//! # Pipeline
//!
//! ```text
//! SourceListing ──▶ WorkEnumerator ──▶ arrange(OrderMode) ──▶ GroupCheck
//!                     │ (oracle)                                 │
//!                     ▼                                          ▼
//!              DestinationSnapshot                     BatchSplitter ──▶ JobDescriptor
//! ```
//!
//! The planner is a single-threaded producer. Jobs are generated lazily one
//! at a time, so a consumer can start dispatching before enumeration ends.

pub mod batch;
pub mod job;
pub mod order;
pub mod stats;

pub use batch::{chunk_ranges, numeric_order, Batch, BatchMode, BatchSplitter, WorkItem};
pub use job::JobDescriptor;
pub use order::{arrange, GroupCheck, OrderMode, Progressive, ProgressiveIndices};
pub use stats::PlanStats;

use crate::config::RunConfig;
use crate::error::Result;
use crate::scan::{SourceListing, WorkEnumerator};
use crate::snapshot::{CompletionOracle, DestinationSnapshot};
use std::sync::Arc;
use tracing::info;

/// Produces the ordered job stream for one run
pub struct Planner {
    config: Arc<RunConfig>,
    listing: SourceListing,
    oracle: Option<CompletionOracle>,
    stats: Arc<PlanStats>,
}

impl Planner {
    /// Scan the source and, when completeness checking is on, the destination
    pub fn new(config: Arc<RunConfig>) -> Result<Self> {
        let listing = match &config.file_list {
            Some(list) => SourceListing::from_file_list(&config.source_root, list, &config.extension)?,
            None => SourceListing::scan(&config.source_root, &config.extension)?,
        };

        // Directory mode never consults the oracle, so skip the traversal
        let snapshot = if config.check_complete && config.batch_mode() == BatchMode::PerTimestamp {
            Some(Arc::new(DestinationSnapshot::capture(&config.destination_root)?))
        } else {
            None
        };

        Ok(Self::from_parts(config, listing, snapshot))
    }

    /// Assemble a planner from an existing listing and snapshot
    pub fn from_parts(
        config: Arc<RunConfig>,
        listing: SourceListing,
        snapshot: Option<Arc<DestinationSnapshot>>,
    ) -> Self {
        let oracle = snapshot.map(|s| {
            CompletionOracle::new(s, config.capture.subcamera_count, config.capture.output_format)
        });

        Self {
            config,
            listing,
            oracle,
            stats: Arc::new(PlanStats::default()),
        }
    }

    /// Shared planner statistics
    pub fn stats(&self) -> Arc<PlanStats> {
        Arc::clone(&self.stats)
    }

    /// Lazily generated jobs in dispatch order
    pub fn jobs(&self) -> Box<dyn Iterator<Item = JobDescriptor> + '_> {
        let config = &*self.config;
        let stats = &*self.stats;
        let splitter = BatchSplitter::new(
            &config.run_id,
            config.split_at,
            config.capture.camera_count,
            config.truncate,
            stats,
        );

        match config.batch_mode() {
            BatchMode::PerTimestamp => {
                info!(
                    order = ?config.order,
                    check_complete = self.oracle.is_some(),
                    "Planning one job per timestamp"
                );
                let enumerator = WorkEnumerator::new(&self.listing, self.oracle.as_ref(), stats);
                let check = GroupCheck::new(
                    &self.listing,
                    config.capture.camera_count as usize,
                    stats,
                );
                let ordered = arrange(config.order, enumerator.timestamps().cloned());
                let valid = ordered.filter(move |ts| check.accept(ts));

                Box::new(
                    splitter
                        .per_timestamp(valid)
                        .map(move |batch| JobDescriptor::from_batch(batch, config)),
                )
            }
            BatchMode::Directory => {
                info!(
                    split_at = config.split_at,
                    camera_count = config.capture.camera_count,
                    "Batch size exceeds camera count, planning directory batches"
                );
                let batches = splitter.directories(&self.listing);
                Box::new(
                    batches
                        .into_iter()
                        .map(move |batch| JobDescriptor::from_batch(batch, config)),
                )
            }
        }
    }
}
