//! Counters collected while generating jobs

use std::sync::atomic::{AtomicU64, Ordering};

/// Planner statistics
#[derive(Debug, Default)]
pub struct PlanStats {
    /// Timestamps considered by the enumerator
    pub timestamps_seen: AtomicU64,

    /// Timestamps skipped because their outputs already exist
    pub skipped_complete: AtomicU64,

    /// Timestamps skipped for a wrong raw file count
    pub skipped_incomplete: AtomicU64,

    /// Batches emitted
    pub batches: AtomicU64,

    /// Raw files covered by emitted batches
    pub raw_files: AtomicU64,

    /// Raw files dropped by truncation
    pub truncated_files: AtomicU64,
}

impl PlanStats {
    pub(crate) fn record_seen(&self) {
        self.timestamps_seen.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_complete(&self) {
        self.skipped_complete.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_incomplete(&self) {
        self.skipped_incomplete.fetch_add(1, Ordering::Relaxed);
    }

    /// Count one batch and return the running raw file total
    pub(crate) fn record_batch(&self, raw_files: u64) -> u64 {
        self.batches.fetch_add(1, Ordering::Relaxed);
        self.raw_files.fetch_add(raw_files, Ordering::Relaxed) + raw_files
    }

    pub(crate) fn record_truncated(&self, count: u64) {
        self.truncated_files.fetch_add(count, Ordering::Relaxed);
    }

    pub fn timestamps_seen(&self) -> u64 {
        self.timestamps_seen.load(Ordering::Relaxed)
    }

    pub fn skipped_complete(&self) -> u64 {
        self.skipped_complete.load(Ordering::Relaxed)
    }

    pub fn skipped_incomplete(&self) -> u64 {
        self.skipped_incomplete.load(Ordering::Relaxed)
    }

    pub fn batches(&self) -> u64 {
        self.batches.load(Ordering::Relaxed)
    }

    pub fn raw_files(&self) -> u64 {
        self.raw_files.load(Ordering::Relaxed)
    }

    pub fn truncated_files(&self) -> u64 {
        self.truncated_files.load(Ordering::Relaxed)
    }
}
