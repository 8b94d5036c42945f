//! Dispatcher - hands planned jobs to the manifest and the worker pool
//!
//! The dispatcher is responsible for:
//! - Opening (or resuming) the manifest and spawning its writer
//! - Appending every job line to the manifest before it is queued
//! - In queue mode, running the bounded worker pool and the job log
//! - Stopping the producer on shutdown and reporting final statistics

use crate::config::{DispatchMode, RunConfig};
use crate::dispatch::joblog::{self, JobLog};
use crate::dispatch::queue::{JobQueue, QueuedJob};
use crate::dispatch::worker::{JobRunner, PoolStats, Worker};
use crate::error::{QueueError, Result};
use crate::manifest::{InvocationTemplate, Manifest, ManifestSummary, ManifestWriter};
use crate::plan::JobDescriptor;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Live counters passed to the progress callback
#[derive(Debug, Clone, Default)]
pub struct DispatchProgress {
    /// Jobs produced by this run
    pub emitted: u64,

    /// Jobs waiting in the queue
    pub queued: usize,

    /// Jobs currently running
    pub running: u64,

    /// Jobs finished with exit value 0
    pub succeeded: u64,

    /// Jobs that failed or could not start
    pub failed: u64,

    /// Elapsed time
    pub elapsed: Duration,
}

/// Result of a dispatch run
#[derive(Debug, Clone)]
pub struct RunSummary {
    /// Jobs produced by this run
    pub jobs_emitted: u64,

    /// Jobs skipped because the job log shows them done (replay only)
    pub jobs_skipped: u64,

    /// Manifest state, absent for replays
    pub manifest: Option<ManifestSummary>,

    /// Whether jobs were executed in-process
    pub executed: bool,

    pub succeeded: u64,
    pub failed: u64,
    pub not_started: u64,

    /// Times the producer found the job queue full
    pub queue_waits: u64,

    /// Time taken
    pub duration: Duration,

    /// Whether the run stopped early on a shutdown request
    pub interrupted: bool,
}

impl RunSummary {
    /// True when nothing failed and the run was not interrupted
    pub fn is_clean(&self) -> bool {
        !self.interrupted && self.failed == 0 && self.not_started == 0
    }
}

/// In-process worker pool with its queue and job log
struct Pool {
    queue: JobQueue,
    workers: Vec<Worker>,
    stats: Arc<PoolStats>,
}

impl Pool {
    fn start(
        template: &InvocationTemplate,
        jobs: usize,
        queue_size: usize,
        joblog_path: &Path,
        log_dir: PathBuf,
        shutdown: &Arc<AtomicBool>,
    ) -> Result<Self> {
        let joblog = Arc::new(JobLog::open(joblog_path)?);
        let runner = Arc::new(JobRunner::new(template.clone(), log_dir));
        let queue = JobQueue::new(queue_size);
        let stats = Arc::new(PoolStats::default());

        let mut workers = Vec::with_capacity(jobs);
        for id in 0..jobs {
            workers.push(Worker::spawn(
                id,
                queue.receiver(),
                Arc::clone(&runner),
                Arc::clone(&joblog),
                Arc::clone(shutdown),
                Arc::clone(&stats),
            )?);
        }

        info!(workers = workers.len(), joblog = %joblog_path.display(), "Worker pool started");
        Ok(Self {
            queue,
            workers,
            stats,
        })
    }

    fn progress(&self, emitted: u64, elapsed: Duration) -> DispatchProgress {
        DispatchProgress {
            emitted,
            queued: self.queue.len(),
            running: self.queue.active_workers() as u64,
            succeeded: self.stats.succeeded(),
            failed: self.stats.failed() + self.stats.not_started(),
            elapsed,
        }
    }

    /// Close the queue and wait for the workers, reporting progress meanwhile
    ///
    /// Returns the pool counters and the number of sends that found the
    /// queue full.
    fn drain<F>(mut self, emitted: u64, start: Instant, on_progress: &mut F) -> (Arc<PoolStats>, u64)
    where
        F: FnMut(&DispatchProgress),
    {
        self.queue.close();

        while !self.workers.iter().all(Worker::is_finished) {
            on_progress(&self.progress(emitted, start.elapsed()));
            thread::sleep(Duration::from_millis(100));
        }
        on_progress(&self.progress(emitted, start.elapsed()));

        let remaining = self.queue.len();
        if remaining > 0 {
            warn!(jobs = remaining, "Queued jobs not started before shutdown");
        }

        for worker in std::mem::take(&mut self.workers) {
            if let Err(e) = worker.join() {
                warn!(error = %e, "Worker failed to join cleanly");
            }
        }

        let queue_waits = self.queue.stats().backpressure_count();
        if queue_waits > 0 {
            debug!(queue_waits, "Producer was throttled by the job queue");
        }
        (self.stats, queue_waits)
    }
}

/// Coordinates manifest persistence and job execution for one run
pub struct Dispatcher {
    config: Arc<RunConfig>,
    template: InvocationTemplate,
    shutdown: Arc<AtomicBool>,
}

impl Dispatcher {
    pub fn new(config: Arc<RunConfig>, template: InvocationTemplate) -> Self {
        Self {
            config,
            template,
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Get a clone of the shutdown flag (for signal handlers)
    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    /// Persist, and in queue mode run, every job the iterator yields
    ///
    /// Jobs are pulled lazily, so the planner only runs ahead of the pool by
    /// the queue capacity.
    pub fn run<I, F>(self, jobs: I, mut on_progress: F) -> Result<RunSummary>
    where
        I: IntoIterator<Item = JobDescriptor>,
        F: FnMut(&DispatchProgress),
    {
        let start = Instant::now();
        let config = &self.config;

        let writer = ManifestWriter::create(
            &config.manifest_path,
            &self.template,
            config.resume,
            config.queue_size,
        )?;
        let manifest = writer.handle();
        let seq_offset = writer.existing_jobs();

        let pool = match config.dispatch {
            DispatchMode::Queue => Some(Pool::start(
                &self.template,
                config.jobs,
                config.queue_size,
                &config.joblog_path,
                config.log_dir.clone(),
                &self.shutdown,
            )?),
            DispatchMode::PersistOnly => None,
        };
        let sender = pool.as_ref().and_then(|p| p.queue.sender());

        info!(
            manifest = %config.manifest_path.display(),
            mode = ?config.dispatch,
            resume_after = seq_offset,
            "Dispatching jobs"
        );

        let mut emitted = 0u64;
        let mut interrupted = false;
        let mut failure: Option<QueueError> = None;

        for job in jobs {
            if self.shutdown.load(Ordering::Relaxed) {
                interrupted = true;
                break;
            }

            let line = job.to_line();
            if let Err(e) = manifest.send_line(line) {
                failure = Some(e.into());
                break;
            }

            if let Some(sender) = &sender {
                let queued = QueuedJob {
                    seq: seq_offset + job.seq,
                    output_id: job.output_id.clone(),
                    words: job.words(),
                };
                match sender.send_until(queued, &self.shutdown) {
                    Ok(true) => {}
                    Ok(false) => {
                        emitted += 1;
                        interrupted = true;
                        break;
                    }
                    Err(e) => {
                        failure = Some(e.into());
                        break;
                    }
                }
            }

            emitted += 1;
            let progress = match &pool {
                Some(pool) => pool.progress(emitted, start.elapsed()),
                None => DispatchProgress {
                    emitted,
                    elapsed: start.elapsed(),
                    ..Default::default()
                },
            };
            on_progress(&progress);
        }
        drop(sender);

        if interrupted {
            info!(emitted, "Shutdown requested, no further jobs will be produced");
        }

        let drained = pool.map(|p| p.drain(emitted, start, &mut on_progress));
        drop(manifest);
        let manifest_summary = writer.finish()?;

        if let Some(e) = failure {
            return Err(e);
        }

        let duration = start.elapsed();
        info!(
            jobs = emitted,
            manifest_lines = manifest_summary.existing_jobs + manifest_summary.lines_written,
            duration_ms = duration.as_millis() as u64,
            "Dispatch completed"
        );

        Ok(RunSummary {
            jobs_emitted: emitted,
            jobs_skipped: 0,
            manifest: Some(manifest_summary),
            executed: drained.is_some(),
            succeeded: drained.as_ref().map_or(0, |(s, _)| s.succeeded()),
            failed: drained.as_ref().map_or(0, |(s, _)| s.failed()),
            not_started: drained.as_ref().map_or(0, |(s, _)| s.not_started()),
            queue_waits: drained.as_ref().map_or(0, |(_, waits)| *waits),
            duration,
            interrupted,
        })
    }
}

/// Options for re-running an existing manifest
#[derive(Debug, Clone)]
pub struct ReplayOptions {
    pub manifest_path: PathBuf,

    /// Concurrent jobs, defaulting to the header's
    pub jobs: Option<usize>,

    /// Job log, defaulting to the header's
    pub joblog: Option<PathBuf>,

    /// Directory for per-job output
    pub log_dir: PathBuf,
}

/// Execute an existing manifest with the in-process pool
///
/// Jobs the job log records with exit value 0 are skipped; every other job
/// is run again.
pub fn replay_manifest<F>(
    options: &ReplayOptions,
    shutdown: Arc<AtomicBool>,
    mut on_progress: F,
) -> Result<RunSummary>
where
    F: FnMut(&DispatchProgress),
{
    let start = Instant::now();
    let manifest = Manifest::load(&options.manifest_path)?;
    let template = manifest.template;

    let jobs = options.jobs.unwrap_or(template.jobs).max(1);
    let joblog_path = options.joblog.clone().unwrap_or_else(|| template.joblog.clone());
    let done = joblog::completed_seqs(&joblog_path)?;

    info!(
        manifest = %options.manifest_path.display(),
        jobs = manifest.jobs.len(),
        already_done = done.len(),
        workers = jobs,
        "Replaying manifest"
    );

    let pool = Pool::start(
        &template,
        jobs,
        jobs * 2,
        &joblog_path,
        options.log_dir.clone(),
        &shutdown,
    )?;
    let sender = pool.queue.sender();

    let mut emitted = 0u64;
    let mut skipped = 0u64;
    let mut interrupted = false;
    let mut failure: Option<QueueError> = None;

    for (idx, line) in manifest.jobs.iter().enumerate() {
        let seq = idx as u64 + 1;
        if done.contains(&seq) {
            skipped += 1;
            continue;
        }
        if shutdown.load(Ordering::Relaxed) {
            interrupted = true;
            break;
        }

        let job = match QueuedJob::from_line(&options.manifest_path, seq, line) {
            Ok(job) => job,
            Err(e) => {
                warn!(seq, error = %e, "Skipping unreadable job line");
                continue;
            }
        };

        if let Some(sender) = &sender {
            match sender.send_until(job, &shutdown) {
                Ok(true) => {}
                Ok(false) => {
                    interrupted = true;
                    break;
                }
                Err(e) => {
                    failure = Some(e.into());
                    break;
                }
            }
        }
        emitted += 1;
        on_progress(&pool.progress(emitted, start.elapsed()));
    }
    drop(sender);

    let (stats, queue_waits) = pool.drain(emitted, start, &mut on_progress);
    if let Some(e) = failure {
        return Err(e);
    }

    Ok(RunSummary {
        jobs_emitted: emitted,
        jobs_skipped: skipped,
        manifest: None,
        executed: true,
        succeeded: stats.succeeded(),
        failed: stats.failed(),
        not_started: stats.not_started(),
        queue_waits,
        duration: start.elapsed(),
        interrupted,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_is_clean() {
        let mut summary = RunSummary {
            jobs_emitted: 3,
            jobs_skipped: 0,
            manifest: None,
            executed: true,
            succeeded: 3,
            failed: 0,
            not_started: 0,
            queue_waits: 2,
            duration: Duration::from_secs(1),
            interrupted: false,
        };
        assert!(summary.is_clean());

        summary.failed = 1;
        assert!(!summary.is_clean());

        summary.failed = 0;
        summary.interrupted = true;
        assert!(!summary.is_clean());
    }
}
