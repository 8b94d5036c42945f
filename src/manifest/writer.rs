//! Manifest writer thread
//!
//! Job lines are appended by a dedicated thread fed through a bounded
//! channel, so the planner never blocks on disk I/O for longer than the
//! channel allows. Every line is flushed as soon as it is written: a crash
//! loses at most the line in flight, and a resumed run appends after it.

use crate::error::{ManifestError, ManifestResult};
use crate::manifest::header::InvocationTemplate;
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Message types sent to the writer thread
#[derive(Debug)]
pub enum ManifestMessage {
    /// Append one job line
    Job(String),

    /// Stop after everything queued so far
    Shutdown,
}

/// Statistics about manifest writes
#[derive(Debug, Default)]
pub struct ManifestStats {
    /// Job lines appended by this run
    pub lines_written: AtomicU64,

    /// Bytes appended by this run, header included
    pub bytes_written: AtomicU64,
}

impl ManifestStats {
    pub fn lines_written(&self) -> u64 {
        self.lines_written.load(Ordering::Relaxed)
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written.load(Ordering::Relaxed)
    }
}

/// Handle for sending lines to the writer
#[derive(Debug, Clone)]
pub struct ManifestHandle {
    sender: Sender<ManifestMessage>,
    stats: Arc<ManifestStats>,
}

impl ManifestHandle {
    /// Queue a job line for appending
    pub fn send_line(&self, line: String) -> ManifestResult<()> {
        self.sender
            .send(ManifestMessage::Job(line))
            .map_err(|_| ManifestError::ChannelClosed)
    }

    /// Request shutdown (pending lines are still written)
    pub fn shutdown(&self) -> ManifestResult<()> {
        self.sender
            .send(ManifestMessage::Shutdown)
            .map_err(|_| ManifestError::ChannelClosed)
    }

    pub fn stats(&self) -> &ManifestStats {
        &self.stats
    }
}

/// Final state of a manifest after the writer stopped
#[derive(Debug, Clone)]
pub struct ManifestSummary {
    /// Manifest path
    pub path: PathBuf,

    /// Job lines already present before this run
    pub existing_jobs: u64,

    /// Job lines appended by this run
    pub lines_written: u64,

    /// Manifest size on disk
    pub size_bytes: u64,
}

/// Append-only manifest writer running in its own thread
#[derive(Debug)]
pub struct ManifestWriter {
    handle: Option<JoinHandle<ManifestResult<()>>>,
    manifest_handle: ManifestHandle,
    path: PathBuf,
    existing_jobs: u64,
}

impl ManifestWriter {
    /// Open the manifest and spawn the writer thread
    ///
    /// A fresh manifest is truncated and gets `template` as its header. With
    /// `resume` an existing manifest is validated and appended to; its header
    /// is kept as-is.
    pub fn create(
        path: &Path,
        template: &InvocationTemplate,
        resume: bool,
        channel_size: usize,
    ) -> ManifestResult<Self> {
        let open_err = |e: std::io::Error| ManifestError::OpenFailed {
            path: path.to_path_buf(),
            reason: e.to_string(),
        };
        let stats = Arc::new(ManifestStats::default());

        let (file, existing_jobs) = if resume && path.exists() {
            let existing = Manifest::load(path)?;
            if existing.template.command != template.command {
                warn!(
                    path = %path.display(),
                    "Manifest header names a different program; keeping the existing header"
                );
            }
            let mut file = OpenOptions::new()
                .read(true)
                .append(true)
                .open(path)
                .map_err(open_err)?;
            if !ends_with_newline(&mut file).map_err(open_err)? {
                file.write_all(b"\n").map_err(|e| ManifestError::WriteFailed {
                    path: path.to_path_buf(),
                    reason: e.to_string(),
                })?;
                stats.bytes_written.fetch_add(1, Ordering::Relaxed);
                warn!(path = %path.display(), "Manifest ended mid-line; terminated it before appending");
            }
            info!(
                path = %path.display(),
                existing_jobs = existing.jobs.len(),
                "Resuming manifest"
            );
            (file, existing.jobs.len() as u64)
        } else {
            let mut file = File::create(path).map_err(open_err)?;
            let header = format!("{}\n", template.header_line());
            file.write_all(header.as_bytes())
                .and_then(|_| file.flush())
                .map_err(|e| ManifestError::WriteFailed {
                    path: path.to_path_buf(),
                    reason: e.to_string(),
                })?;
            stats
                .bytes_written
                .fetch_add(header.len() as u64, Ordering::Relaxed);
            make_executable(path).map_err(open_err)?;
            info!(path = %path.display(), "Manifest created");
            (file, 0)
        };

        let (sender, receiver) = bounded(channel_size.max(1));
        let manifest_handle = ManifestHandle {
            sender,
            stats: Arc::clone(&stats),
        };

        let thread_path = path.to_path_buf();
        let handle = thread::Builder::new()
            .name("manifest-writer".into())
            .spawn(move || writer_thread(file, thread_path, receiver, stats))
            .map_err(open_err)?;

        Ok(Self {
            handle: Some(handle),
            manifest_handle,
            path: path.to_path_buf(),
            existing_jobs,
        })
    }

    /// Get a handle for sending lines to the writer
    pub fn handle(&self) -> ManifestHandle {
        self.manifest_handle.clone()
    }

    /// Job lines present before this run started
    pub fn existing_jobs(&self) -> u64 {
        self.existing_jobs
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Wait for every queued line to be written
    pub fn finish(mut self) -> ManifestResult<ManifestSummary> {
        let _ = self.manifest_handle.shutdown();

        if let Some(handle) = self.handle.take() {
            match handle.join() {
                Ok(result) => result?,
                Err(_) => return Err(ManifestError::WriterPanicked),
            }
        }

        let size_bytes = fs::metadata(&self.path).map(|m| m.len()).unwrap_or(0);
        Ok(ManifestSummary {
            path: self.path.clone(),
            existing_jobs: self.existing_jobs,
            lines_written: self.manifest_handle.stats().lines_written(),
            size_bytes,
        })
    }
}

fn writer_thread(
    file: File,
    path: PathBuf,
    receiver: Receiver<ManifestMessage>,
    stats: Arc<ManifestStats>,
) -> ManifestResult<()> {
    let mut out = BufWriter::new(file);
    let write_err = |e: std::io::Error| ManifestError::WriteFailed {
        path: path.clone(),
        reason: e.to_string(),
    };

    loop {
        match receiver.recv_timeout(Duration::from_millis(100)) {
            Ok(ManifestMessage::Job(line)) => {
                writeln!(out, "{}", line).map_err(write_err)?;
                out.flush().map_err(write_err)?;
                stats.lines_written.fetch_add(1, Ordering::Relaxed);
                stats
                    .bytes_written
                    .fetch_add(line.len() as u64 + 1, Ordering::Relaxed);
            }
            Ok(ManifestMessage::Shutdown) | Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => {}
        }
    }

    out.flush().map_err(write_err)?;
    out.get_ref().sync_data().map_err(write_err)?;
    debug!(lines = stats.lines_written(), "Manifest writer finished");
    Ok(())
}

/// True for an empty file or one whose last byte is a newline
fn ends_with_newline(file: &mut File) -> std::io::Result<bool> {
    if file.metadata()?.len() == 0 {
        return Ok(true);
    }
    let mut last = [0u8; 1];
    file.seek(SeekFrom::End(-1))?;
    file.read_exact(&mut last)?;
    Ok(last[0] == b'\n')
}

#[cfg(unix)]
fn make_executable(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o755))
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) -> std::io::Result<()> {
    Ok(())
}

/// A manifest read back from disk
#[derive(Debug, Clone)]
pub struct Manifest {
    /// Parsed header
    pub template: InvocationTemplate,

    /// Job lines in file order; the job with sequence number `n` is `jobs[n - 1]`
    pub jobs: Vec<String>,
}

impl Manifest {
    /// Read and validate a manifest
    pub fn load(path: &Path) -> ManifestResult<Self> {
        let file = File::open(path).map_err(|e| ManifestError::OpenFailed {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        let mut lines = BufReader::new(file).lines();

        let header = lines
            .next()
            .transpose()
            .map_err(|e| ManifestError::OpenFailed {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?
            .ok_or_else(|| ManifestError::MissingHeader {
                path: path.to_path_buf(),
            })?;
        let template = InvocationTemplate::parse(path, &header)?;

        let mut jobs = Vec::new();
        for line in lines {
            let line = line.map_err(|e| ManifestError::OpenFailed {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            jobs.push(trimmed.to_string());
        }

        Ok(Self { template, jobs })
    }
}
