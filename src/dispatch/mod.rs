//! Job dispatch
//!
//! Every job is appended to the manifest first. In queue mode it is then
//! handed to an in-process pool of `--jobs` workers through a bounded queue:
//!
//! ```text
//! Planner ──▶ Dispatcher ──▶ ManifestWriter thread ──▶ queue_<id>.sh
//!                 │
//!                 ▼
//!             JobQueue (bounded) ──▶ Worker × N ──▶ program ──▶ <output_id>.log
//!                                        │
//!                                        ▼
//!                                     JobLog
//! ```

pub mod coordinator;
pub mod joblog;
pub mod queue;
pub mod worker;

pub use coordinator::{replay_manifest, DispatchProgress, Dispatcher, ReplayOptions, RunSummary};
pub use joblog::{completed_seqs, JobLog, JobRecord, JOBLOG_HEADER};
pub use queue::{JobQueue, JobQueueReceiver, JobQueueSender, QueueStats, QueuedJob, WorkGuard};
pub use worker::{JobRunner, PoolStats, Worker};
