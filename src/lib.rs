//! capture-queue - Resumable post-processing queue for multi-camera captures
//!
//! A camera array writes one raw file per camera for every acquisition
//! instant; all files of one instant share a fixed-width timestamp prefix.
//! This crate turns a source tree of such files into a job manifest for an
//! external processing program, one job per timestamp (or per directory
//! chunk), and can run the jobs itself with a bounded worker pool.
//!
//! # Features
//!
//! - **Resumable**: with completeness checking, timestamps whose output
//!   artifacts already exist in the destination are skipped, so an
//!   interrupted run is resumed by simply running again.
//!
//! - **Single Destination Scan**: the destination is traversed exactly once
//!   per run into an in-memory snapshot; every completeness test is a set
//!   lookup.
//!
//! - **Progressive Order**: jobs can be emitted in bisection order so that
//!   early output samples the whole capture.
//!
//! - **Self-Executing Manifest**: the manifest's `#!` header invokes the
//!   worker pool, and it is only ever appended to.
//!
//! # Architecture
//!
//! ```text
//!   SOURCE tree / file list          DESTINATION tree
//!            │                              │ one walk
//!            ▼                              ▼
//!   ┌─────────────────┐           ┌───────────────────┐
//!   │  SourceListing  │           │DestinationSnapshot│
//!   └────────┬────────┘           └─────────┬─────────┘
//!            │                              │
//!            ▼                              ▼
//!   ┌─────────────────┐  is_complete ┌──────────────────┐
//!   │ WorkEnumerator  │◀─────────────│ CompletionOracle │
//!   └────────┬────────┘              └──────────────────┘
//!            ▼
//!   ┌─────────────────┐
//!   │ arrange + Group │  sequential / progressive
//!   │      Check      │
//!   └────────┬────────┘
//!            ▼
//!   ┌─────────────────┐
//!   │  BatchSplitter  │  per timestamp / directory chunks
//!   └────────┬────────┘
//!            ▼
//!   ┌─────────────────┐        ┌──────────────────┐
//!   │   Dispatcher    │───────▶│  ManifestWriter  │──▶ queue_<id>.sh
//!   └────────┬────────┘        └──────────────────┘
//!            │ queue mode
//!            ▼
//!   ┌─────────────────┐
//!   │ JobQueue ──▶ N  │──▶ program ──▶ <output_id>.log, joblog
//!   │    workers      │
//!   └─────────────────┘
//! ```
//!
//! # Example
//!
//! ```bash
//! # Write a manifest for everything not yet processed
//! capture-queue -p eyesis.prefs --program ./process.sh -c /data/raw /data/eqr
//!
//! # Process immediately, 8 at a time, spreading early output over the capture
//! capture-queue -p eyesis.prefs --program ./process.sh -c -r -q -j 8 /data/raw /data/eqr
//!
//! # Re-run the failed jobs of an earlier manifest
//! capture-queue replay logs/queue_20240101_120000.sh
//! ```

pub mod capture;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod manifest;
pub mod plan;
pub mod progress;
pub mod scan;
pub mod snapshot;

pub use capture::{RawFile, Timestamp, TIMESTAMP_LEN};
pub use config::{CaptureSettings, CliArgs, DispatchMode, Preferences, RunConfig};
pub use dispatch::{replay_manifest, Dispatcher, ReplayOptions, RunSummary};
pub use error::{QueueError, Result};
pub use manifest::{InvocationTemplate, Manifest, ManifestWriter};
pub use plan::{BatchMode, JobDescriptor, OrderMode, Planner};
pub use scan::{SourceListing, WorkEnumerator};
pub use snapshot::{CompletionOracle, DestinationSnapshot, OutputFormat};
