//! Bounded job queue between the planner and the worker pool
//!
//! The producer blocks once `capacity` jobs are waiting, which keeps the
//! planner at most a few jobs ahead of execution. Workers see the queue as
//! closed once every sender is gone and it has drained.

use crate::error::{DispatchError, DispatchResult, ManifestError, ManifestResult};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, SendTimeoutError, Sender};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Position of the output id among a job line's words
const OUTPUT_ID_WORD: usize = 5;

/// A job ready to run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedJob {
    /// Manifest sequence number (1-based line index after the header)
    pub seq: u64,

    /// Output identifier, also names the per-job log file
    pub output_id: String,

    /// Arguments substituted for the manifest placeholder
    pub words: Vec<String>,
}

impl QueuedJob {
    /// Parse a manifest job line
    pub fn from_line(path: &Path, seq: u64, line: &str) -> ManifestResult<Self> {
        let words = shell_words::split(line).map_err(|e| ManifestError::InvalidLine {
            path: path.to_path_buf(),
            line: seq as usize,
            reason: e.to_string(),
        })?;
        let output_id = words
            .get(OUTPUT_ID_WORD)
            .cloned()
            .unwrap_or_else(|| format!("job_{:06}", seq));

        Ok(Self {
            seq,
            output_id,
            words,
        })
    }

    /// Job line as written to the manifest
    pub fn line(&self) -> String {
        shell_words::join(&self.words)
    }
}

/// Statistics for the job queue
#[derive(Debug, Default)]
pub struct QueueStats {
    /// Sends that found the queue full
    pub backpressure_events: AtomicU64,
}

impl QueueStats {
    pub fn backpressure_count(&self) -> u64 {
        self.backpressure_events.load(Ordering::Relaxed)
    }
}

/// Bounded multi-consumer job queue
pub struct JobQueue {
    sender: Option<Sender<QueuedJob>>,
    receiver: Receiver<QueuedJob>,
    active_workers: Arc<AtomicUsize>,
    stats: Arc<QueueStats>,
}

impl JobQueue {
    pub fn new(capacity: usize) -> Self {
        let (sender, receiver) = bounded(capacity.max(1));

        Self {
            sender: Some(sender),
            receiver,
            active_workers: Arc::new(AtomicUsize::new(0)),
            stats: Arc::new(QueueStats::default()),
        }
    }

    /// Get a sender, `None` once the queue is closed
    pub fn sender(&self) -> Option<JobQueueSender> {
        self.sender.as_ref().map(|sender| JobQueueSender {
            sender: sender.clone(),
            stats: Arc::clone(&self.stats),
        })
    }

    /// Get a receiver for a worker
    pub fn receiver(&self) -> JobQueueReceiver {
        JobQueueReceiver {
            receiver: self.receiver.clone(),
            active_workers: Arc::clone(&self.active_workers),
        }
    }

    /// Drop the queue's own sender; workers exit once the queue drains
    pub fn close(&mut self) {
        self.sender = None;
    }

    pub fn stats(&self) -> Arc<QueueStats> {
        Arc::clone(&self.stats)
    }

    /// Workers currently running a job
    pub fn active_workers(&self) -> usize {
        self.active_workers.load(Ordering::SeqCst)
    }

    /// Jobs still waiting
    pub fn len(&self) -> usize {
        self.receiver.len()
    }
}

/// Handle for enqueueing jobs
#[derive(Clone)]
pub struct JobQueueSender {
    sender: Sender<QueuedJob>,
    stats: Arc<QueueStats>,
}

impl JobQueueSender {
    /// Send a job, waiting for space until it is accepted or `shutdown` is set
    ///
    /// Returns `Ok(false)` when shutdown was requested before the job was
    /// accepted.
    pub fn send_until(&self, job: QueuedJob, shutdown: &AtomicBool) -> DispatchResult<bool> {
        let mut job = job;
        let mut waited = false;

        loop {
            if shutdown.load(Ordering::Relaxed) {
                return Ok(false);
            }
            match self.sender.send_timeout(job, Duration::from_millis(100)) {
                Ok(()) => return Ok(true),
                Err(SendTimeoutError::Timeout(back)) => {
                    if !waited {
                        self.stats
                            .backpressure_events
                            .fetch_add(1, Ordering::Relaxed);
                        waited = true;
                    }
                    job = back;
                }
                Err(SendTimeoutError::Disconnected(_)) => return Err(DispatchError::QueueClosed),
            }
        }
    }
}

/// Handle for taking jobs
#[derive(Clone)]
pub struct JobQueueReceiver {
    receiver: Receiver<QueuedJob>,
    active_workers: Arc<AtomicUsize>,
}

impl JobQueueReceiver {
    /// Receive with timeout
    ///
    /// `Ok(None)` on timeout, `Err(QueueClosed)` once the queue is closed
    /// and drained.
    pub fn recv_timeout(&self, timeout: Duration) -> DispatchResult<Option<QueuedJob>> {
        match self.receiver.recv_timeout(timeout) {
            Ok(job) => Ok(Some(job)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(DispatchError::QueueClosed),
        }
    }

    pub fn begin_work(&self) {
        self.active_workers.fetch_add(1, Ordering::SeqCst);
    }

    pub fn end_work(&self) {
        self.active_workers.fetch_sub(1, Ordering::SeqCst);
    }
}

/// RAII guard for marking a worker as busy
pub struct WorkGuard<'a> {
    receiver: &'a JobQueueReceiver,
}

impl<'a> WorkGuard<'a> {
    pub fn new(receiver: &'a JobQueueReceiver) -> Self {
        receiver.begin_work();
        Self { receiver }
    }
}

impl Drop for WorkGuard<'_> {
    fn drop(&mut self) {
        self.receiver.end_work();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job(seq: u64) -> QueuedJob {
        QueuedJob {
            seq,
            output_id: format!("r_{:04}", seq),
            words: vec![seq.to_string()],
        }
    }

    #[test]
    fn test_from_line() {
        let job = QueuedJob::from_line(
            Path::new("m.sh"),
            3,
            "p.prefs /src '/dst dir' 4 0 run-1466431433_273487 1466431433_273487",
        )
        .unwrap();
        assert_eq!(job.seq, 3);
        assert_eq!(job.output_id, "run-1466431433_273487");
        assert_eq!(job.words[2], "/dst dir");
        assert_eq!(job.line(), "p.prefs /src '/dst dir' 4 0 run-1466431433_273487 1466431433_273487");

        let short = QueuedJob::from_line(Path::new("m.sh"), 7, "a b").unwrap();
        assert_eq!(short.output_id, "job_000007");

        assert!(QueuedJob::from_line(Path::new("m.sh"), 1, "unterminated 'quote").is_err());
    }

    #[test]
    fn test_queue_close_drains() {
        let mut queue = JobQueue::new(4);
        let sender = queue.sender().unwrap();
        let receiver = queue.receiver();
        let shutdown = AtomicBool::new(false);

        assert!(sender.send_until(job(1), &shutdown).unwrap());
        assert!(sender.send_until(job(2), &shutdown).unwrap());
        drop(sender);
        queue.close();
        assert!(queue.sender().is_none());

        let timeout = Duration::from_millis(10);
        assert_eq!(receiver.recv_timeout(timeout).unwrap().unwrap().seq, 1);
        assert_eq!(receiver.recv_timeout(timeout).unwrap().unwrap().seq, 2);
        assert!(matches!(
            receiver.recv_timeout(timeout),
            Err(DispatchError::QueueClosed)
        ));
        assert_eq!(queue.stats().backpressure_count(), 0);
    }

    #[test]
    fn test_send_until_stops_on_shutdown() {
        let queue = JobQueue::new(1);
        let sender = queue.sender().unwrap();
        let shutdown = AtomicBool::new(false);

        assert!(sender.send_until(job(1), &shutdown).unwrap());
        shutdown.store(true, Ordering::SeqCst);
        assert!(!sender.send_until(job(2), &shutdown).unwrap());
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_send_records_backpressure() {
        let queue = JobQueue::new(1);
        let sender = queue.sender().unwrap();
        let receiver = queue.receiver();
        let shutdown = AtomicBool::new(false);
        sender.send_until(job(1), &shutdown).unwrap();

        let consumer = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(250));
            receiver.recv_timeout(Duration::from_secs(1)).unwrap()
        });
        assert!(sender.send_until(job(2), &shutdown).unwrap());
        assert_eq!(consumer.join().unwrap().unwrap().seq, 1);
        assert_eq!(queue.stats().backpressure_count(), 1);
    }

    #[test]
    fn test_work_guard() {
        let queue = JobQueue::new(2);
        let receiver = queue.receiver();
        {
            let _guard = WorkGuard::new(&receiver);
            assert_eq!(queue.active_workers(), 1);
        }
        assert_eq!(queue.active_workers(), 0);
    }
}
