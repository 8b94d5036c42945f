//! Job log in GNU parallel's `--joblog` format
//!
//! One tab-separated record per finished job. Because the format matches
//! what the external pool writes, a manifest started with one can be resumed
//! with the other.

use crate::error::{DispatchError, DispatchResult};
use chrono::{DateTime, Local};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Column header line
pub const JOBLOG_HEADER: &str =
    "Seq\tHost\tStarttime\tJobRuntime\tSend\tReceive\tExitval\tSignal\tCommand";

/// Outcome of one finished job
#[derive(Debug, Clone, PartialEq)]
pub struct JobRecord {
    pub seq: u64,
    pub started: DateTime<Local>,
    pub runtime: Duration,
    pub exit_code: i32,
    pub signal: i32,
    pub command: String,
}

impl JobRecord {
    /// Render one log line
    pub fn to_line(&self) -> String {
        let start = self.started.timestamp_millis() as f64 / 1000.0;
        format!(
            "{}\t:\t{:.3}\t{:.3}\t0\t0\t{}\t{}\t{}",
            self.seq,
            start,
            self.runtime.as_secs_f64(),
            self.exit_code,
            self.signal,
            self.command
        )
    }
}

/// Append-only job log shared by all workers
pub struct JobLog {
    path: PathBuf,
    out: Mutex<BufWriter<File>>,
}

impl JobLog {
    /// Open for appending, writing the header into a new or empty file
    pub fn open(path: &Path) -> DispatchResult<Self> {
        let err = |e: std::io::Error| DispatchError::JobLog {
            path: path.to_path_buf(),
            reason: e.to_string(),
        };

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(err)?;
        let empty = file.metadata().map_err(err)?.len() == 0;

        let mut out = BufWriter::new(file);
        if empty {
            writeln!(out, "{}", JOBLOG_HEADER).map_err(err)?;
            out.flush().map_err(err)?;
        }

        Ok(Self {
            path: path.to_path_buf(),
            out: Mutex::new(out),
        })
    }

    /// Append one record
    pub fn record(&self, record: &JobRecord) -> DispatchResult<()> {
        let mut out = self.out.lock();
        writeln!(out, "{}", record.to_line())
            .and_then(|_| out.flush())
            .map_err(|e| DispatchError::JobLog {
                path: self.path.clone(),
                reason: e.to_string(),
            })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Sequence numbers recorded with exit value 0
///
/// A missing log means nothing has completed yet.
pub fn completed_seqs(path: &Path) -> DispatchResult<HashSet<u64>> {
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(HashSet::new()),
        Err(e) => {
            return Err(DispatchError::JobLog {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })
        }
    };

    let done: HashSet<u64> = text
        .lines()
        .filter_map(|line| {
            let cols: Vec<&str> = line.split('\t').collect();
            let seq = cols.first()?.trim().parse::<u64>().ok()?;
            let exit = cols.get(6)?.trim().parse::<i32>().ok()?;
            (exit == 0).then_some(seq)
        })
        .collect();

    debug!(path = %path.display(), completed = done.len(), "Job log read");
    Ok(done)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn record(seq: u64, exit_code: i32) -> JobRecord {
        JobRecord {
            seq,
            started: Local::now(),
            runtime: Duration::from_millis(1500),
            exit_code,
            signal: 0,
            command: format!("process job {}", seq),
        }
    }

    #[test]
    fn test_record_line() {
        let line = record(4, 2).to_line();
        let cols: Vec<_> = line.split('\t').collect();
        assert_eq!(cols.len(), 9);
        assert_eq!(cols[0], "4");
        assert_eq!(cols[3], "1.500");
        assert_eq!(cols[6], "2");
        assert_eq!(cols[8], "process job 4");
    }

    #[test]
    fn test_completed_seqs() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("joblog.txt");

        {
            let log = JobLog::open(&path).unwrap();
            log.record(&record(1, 0)).unwrap();
            log.record(&record(2, 1)).unwrap();
        }
        {
            let log = JobLog::open(&path).unwrap();
            log.record(&record(3, 0)).unwrap();
        }

        let text = fs::read_to_string(&path).unwrap();
        assert_eq!(text.lines().filter(|l| *l == JOBLOG_HEADER).count(), 1);

        let done = completed_seqs(&path).unwrap();
        assert_eq!(done, HashSet::from([1, 3]));
    }

    #[test]
    fn test_missing_log_is_empty() {
        let dir = tempdir().unwrap();
        assert!(completed_seqs(&dir.path().join("none.txt")).unwrap().is_empty());
    }
}
