//! Worker threads of the in-process pool
//!
//! Each worker:
//! - Pulls jobs from the bounded queue
//! - Runs `[wrapper] program <job words>` as a child process
//! - Captures the child's stdout and stderr in `<log_dir>/<output_id>.log`
//! - Records the outcome in the shared job log
//!
//! A worker finishes its current job when shutdown is requested but does
//! not start another one.

use crate::dispatch::joblog::{JobLog, JobRecord};
use crate::dispatch::queue::{JobQueueReceiver, QueuedJob, WorkGuard};
use crate::error::{DispatchError, DispatchResult, JobOutcome};
use crate::manifest::InvocationTemplate;
use chrono::Local;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Statistics shared by all workers of a pool
#[derive(Debug, Default)]
pub struct PoolStats {
    /// Jobs that exited 0
    pub succeeded: AtomicU64,

    /// Jobs that exited non-zero or were killed
    pub failed: AtomicU64,

    /// Jobs whose process could not be started
    pub not_started: AtomicU64,
}

impl PoolStats {
    fn record(&self, outcome: &JobOutcome) {
        let counter = match outcome {
            JobOutcome::Success { .. } => &self.succeeded,
            JobOutcome::Failed { .. } => &self.failed,
            JobOutcome::NotStarted { .. } => &self.not_started,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn succeeded(&self) -> u64 {
        self.succeeded.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    pub fn not_started(&self) -> u64 {
        self.not_started.load(Ordering::Relaxed)
    }
}

/// Runs one job as a child process
#[derive(Debug, Clone)]
pub struct JobRunner {
    template: InvocationTemplate,
    log_dir: PathBuf,
}

impl JobRunner {
    pub fn new(template: InvocationTemplate, log_dir: impl Into<PathBuf>) -> Self {
        Self {
            template,
            log_dir: log_dir.into(),
        }
    }

    /// Per-job output file
    pub fn log_path(&self, job: &QueuedJob) -> PathBuf {
        self.log_dir.join(format!("{}.log", job.output_id))
    }

    /// Run a job to completion
    pub fn run(&self, job: &QueuedJob) -> (JobOutcome, JobRecord) {
        let argv = self.template.expand(&job.words);
        let started = Local::now();
        let clock = Instant::now();

        let outcome = match self.spawn(&argv, &self.log_path(job)) {
            Ok(status) => outcome_from_status(job.seq, status),
            Err(reason) => JobOutcome::NotStarted {
                seq: job.seq,
                reason,
            },
        };

        let (exit_code, signal) = match &outcome {
            JobOutcome::Success { .. } => (0, 0),
            JobOutcome::Failed {
                exit_code, signal, ..
            } => (*exit_code, *signal),
            // GNU parallel logs 127 for commands it cannot start
            JobOutcome::NotStarted { .. } => (127, 0),
        };

        let record = JobRecord {
            seq: job.seq,
            started,
            runtime: clock.elapsed(),
            exit_code,
            signal,
            command: shell_words::join(&argv),
        };
        (outcome, record)
    }

    fn spawn(&self, argv: &[String], log_path: &Path) -> Result<ExitStatus, String> {
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| "empty command".to_string())?;

        let stdout = File::create(log_path)
            .map_err(|e| format!("cannot create {}: {}", log_path.display(), e))?;
        let stderr = stdout.try_clone().map_err(|e| e.to_string())?;

        Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(stdout)
            .stderr(stderr)
            .status()
            .map_err(|e| format!("{}: {}", program, e))
    }
}

fn outcome_from_status(seq: u64, status: ExitStatus) -> JobOutcome {
    if status.success() {
        return JobOutcome::Success { seq };
    }

    #[cfg(unix)]
    let signal = {
        use std::os::unix::process::ExitStatusExt;
        status.signal().unwrap_or(0)
    };
    #[cfg(not(unix))]
    let signal = 0;

    JobOutcome::Failed {
        seq,
        exit_code: status.code().unwrap_or(-1),
        signal,
    }
}

/// A worker thread of the pool
pub struct Worker {
    id: usize,
    handle: Option<JoinHandle<DispatchResult<()>>>,
}

impl Worker {
    /// Spawn a new worker thread
    pub fn spawn(
        id: usize,
        queue_rx: JobQueueReceiver,
        runner: Arc<JobRunner>,
        joblog: Arc<JobLog>,
        shutdown: Arc<AtomicBool>,
        stats: Arc<PoolStats>,
    ) -> DispatchResult<Self> {
        let handle = thread::Builder::new()
            .name(format!("job-worker-{}", id))
            .spawn(move || worker_loop(id, queue_rx, runner, joblog, shutdown, stats))
            .map_err(|e| DispatchError::SpawnFailed {
                id,
                reason: e.to_string(),
            })?;

        Ok(Self {
            id,
            handle: Some(handle),
        })
    }

    /// Whether the thread has exited
    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Wait for the worker to finish
    pub fn join(mut self) -> DispatchResult<()> {
        match self.handle.take() {
            Some(handle) => handle.join().unwrap_or_else(|_| {
                Err(DispatchError::Panicked {
                    id: self.id,
                    message: "Worker thread panicked".into(),
                })
            }),
            None => Ok(()),
        }
    }
}

fn worker_loop(
    id: usize,
    queue_rx: JobQueueReceiver,
    runner: Arc<JobRunner>,
    joblog: Arc<JobLog>,
    shutdown: Arc<AtomicBool>,
    stats: Arc<PoolStats>,
) -> DispatchResult<()> {
    debug!(worker = id, "Worker starting");

    while !shutdown.load(Ordering::Relaxed) {
        let job = match queue_rx.recv_timeout(Duration::from_millis(100)) {
            Ok(Some(job)) => job,
            Ok(None) => continue,
            Err(_) => break,
        };

        let _guard = WorkGuard::new(&queue_rx);
        debug!(worker = id, seq = job.seq, output_id = %job.output_id, "Job started");

        let (outcome, record) = runner.run(&job);
        stats.record(&outcome);

        match &outcome {
            JobOutcome::Success { seq } => {
                info!(worker = id, seq, output_id = %job.output_id, "Job finished");
            }
            JobOutcome::Failed {
                seq,
                exit_code,
                signal,
            } => {
                warn!(
                    worker = id,
                    seq,
                    exit_code,
                    signal,
                    log = %runner.log_path(&job).display(),
                    "Job failed"
                );
            }
            JobOutcome::NotStarted { seq, reason } => {
                error!(worker = id, seq, reason = %reason, "Job could not be started");
            }
        }

        if let Err(e) = joblog.record(&record) {
            error!(worker = id, error = %e, "Failed to write job log");
        }
    }

    debug!(worker = id, "Worker shutting down");
    Ok(())
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::config::ResolvedCommands;
    use std::fs;
    use tempfile::tempdir;

    fn runner(program: &str, log_dir: &Path) -> JobRunner {
        let commands = ResolvedCommands {
            pool: "/usr/bin/parallel".into(),
            program: program.into(),
            wrapper: None,
        };
        let template = InvocationTemplate::new(&commands, 1, Path::new("joblog.txt"));
        JobRunner::new(template, log_dir)
    }

    fn job(words: &[&str]) -> QueuedJob {
        QueuedJob {
            seq: 1,
            output_id: "r_0001".into(),
            words: words.iter().map(|w| w.to_string()).collect(),
        }
    }

    #[test]
    fn test_run_captures_output() {
        let dir = tempdir().unwrap();
        let runner = runner("/bin/sh", dir.path());

        let (outcome, record) = runner.run(&job(&["-c", "echo out; echo err >&2"]));
        assert!(outcome.is_success());
        assert_eq!(record.exit_code, 0);

        let log = fs::read_to_string(dir.path().join("r_0001.log")).unwrap();
        assert!(log.contains("out"));
        assert!(log.contains("err"));
    }

    #[test]
    fn test_run_failure_and_missing_program() {
        let dir = tempdir().unwrap();

        let (outcome, record) = runner("/bin/sh", dir.path()).run(&job(&["-c", "exit 3"]));
        assert_eq!(
            outcome,
            JobOutcome::Failed {
                seq: 1,
                exit_code: 3,
                signal: 0
            }
        );
        assert_eq!(record.exit_code, 3);

        let (outcome, record) = runner("/nonexistent/program", dir.path()).run(&job(&[]));
        assert!(matches!(outcome, JobOutcome::NotStarted { .. }));
        assert_eq!(record.exit_code, 127);
    }
}
