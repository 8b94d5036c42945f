//! Error types for capture-queue
//!
//! This module defines the error hierarchy for the queue generator:
//! - Configuration and precondition errors (fatal, raised before any work)
//! - Capture file name errors (soft, the file is skipped)
//! - Source scan and destination snapshot errors
//! - Manifest and dispatch errors
//!
//! Per-timestamp data problems (a group with the wrong number of raw files)
//! are not errors at all: they are logged, counted and skipped by the planner.

use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for capture-queue
#[derive(Error, Debug)]
pub enum QueueError {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Raw file naming errors
    #[error("Capture error: {0}")]
    Capture(#[from] CaptureError),

    /// Source tree / file list errors
    #[error("Scan error: {0}")]
    Scan(#[from] ScanError),

    /// Destination snapshot errors
    #[error("Snapshot error: {0}")]
    Snapshot(#[from] SnapshotError),

    /// Manifest errors
    #[error("Manifest error: {0}")]
    Manifest(#[from] ManifestError),

    /// Worker pool errors
    #[error("Dispatch error: {0}")]
    Dispatch(#[from] DispatchError),

    /// I/O errors (file operations, etc.)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Interrupted by signal
    #[error("Operation interrupted by signal")]
    Interrupted,
}

/// Configuration, preferences and precondition errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Preferences file could not be read
    #[error("Cannot read preferences file '{path}': {reason}")]
    PrefsUnreadable { path: PathBuf, reason: String },

    /// A required preference is unset
    #[error("Required setting {key} is not set (preferences file '{path}')")]
    MissingPreference { key: &'static str, path: PathBuf },

    /// A preference has an unusable value
    #[error("Invalid value '{value}' for {key}: {reason}")]
    InvalidPreference {
        key: &'static str,
        value: String,
        reason: String,
    },

    /// Invalid job count
    #[error("Invalid job count {count}: must be between 1 and {max}")]
    InvalidJobCount { count: usize, max: usize },

    /// Invalid batch size
    #[error("Invalid batch size {size}: must be at least 1")]
    InvalidBatchSize { size: usize },

    /// A required external command cannot be found
    #[error("Required command '{name}' not found: {reason}")]
    MissingCommand { name: String, reason: String },

    /// Path argument error
    #[error("Invalid path '{path}': {reason}")]
    InvalidPath { path: PathBuf, reason: String },

    /// Run identifier unusable in file names
    #[error("Invalid run id '{id}': only letters, digits, '-' and '_' are allowed")]
    InvalidRunId { id: String },
}

/// Raw capture file naming errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CaptureError {
    /// File name shorter than the fixed timestamp prefix
    #[error("File name '{name}' is too short for a {min}-character timestamp")]
    NameTooShort { name: String, min: usize },

    /// File name is not valid UTF-8
    #[error("File name of '{path}' is not valid UTF-8")]
    NotUtf8 { path: PathBuf },
}

/// Source-side scan errors
#[derive(Error, Debug)]
pub enum ScanError {
    /// Source root cannot be traversed
    #[error("Failed to scan source '{path}': {reason}")]
    SourceUnreadable { path: PathBuf, reason: String },

    /// Cached file list cannot be read
    #[error("Failed to read file list '{path}': {reason}")]
    FileListUnreadable { path: PathBuf, reason: String },
}

/// Destination snapshot errors
#[derive(Error, Debug)]
pub enum SnapshotError {
    /// Destination root does not exist
    #[error("Destination '{path}' does not exist")]
    DestinationMissing { path: PathBuf },

    /// Traversal failed part way through
    #[error("Failed to scan destination '{path}': {reason}")]
    TraversalFailed { path: PathBuf, reason: String },
}

/// Manifest file errors
#[derive(Error, Debug)]
pub enum ManifestError {
    /// Failed to create or open the manifest
    #[error("Failed to open manifest '{path}': {reason}")]
    OpenFailed { path: PathBuf, reason: String },

    /// Failed to append to the manifest
    #[error("Failed to write manifest '{path}': {reason}")]
    WriteFailed { path: PathBuf, reason: String },

    /// Existing manifest has no invocation header
    #[error("Manifest '{path}' has no invocation header")]
    MissingHeader { path: PathBuf },

    /// Invocation header could not be parsed
    #[error("Invalid invocation header in '{path}': {reason}")]
    InvalidHeader { path: PathBuf, reason: String },

    /// A job line could not be split into words
    #[error("Invalid job line {line} in '{path}': {reason}")]
    InvalidLine {
        path: PathBuf,
        line: usize,
        reason: String,
    },

    /// Writer channel closed unexpectedly
    #[error("Manifest writer channel closed unexpectedly")]
    ChannelClosed,

    /// Writer thread panicked
    #[error("Manifest writer thread panicked")]
    WriterPanicked,
}

/// Worker pool errors
#[derive(Error, Debug)]
pub enum DispatchError {
    /// Worker thread could not be started
    #[error("Failed to start worker {id}: {reason}")]
    SpawnFailed { id: usize, reason: String },

    /// Worker panicked
    #[error("Worker {id} panicked: {message}")]
    Panicked { id: usize, message: String },

    /// Job queue closed while the producer was still sending
    #[error("Job queue closed unexpectedly")]
    QueueClosed,

    /// Job log could not be opened or written
    #[error("Job log '{path}' error: {reason}")]
    JobLog { path: PathBuf, reason: String },
}

/// Result type alias for QueueError
pub type Result<T> = std::result::Result<T, QueueError>;

/// Result type alias for ManifestError
pub type ManifestResult<T> = std::result::Result<T, ManifestError>;

/// Result type alias for DispatchError
pub type DispatchResult<T> = std::result::Result<T, DispatchError>;

/// Represents the outcome of running a single job
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    /// Process exited with status 0
    Success { seq: u64 },

    /// Process exited non-zero or was killed by a signal
    Failed {
        seq: u64,
        exit_code: i32,
        signal: i32,
    },

    /// Process could not be started at all
    NotStarted { seq: u64, reason: String },
}

impl JobOutcome {
    /// Returns true if this outcome represents success
    pub fn is_success(&self) -> bool {
        matches!(self, JobOutcome::Success { .. })
    }

    /// Returns the manifest sequence number of the job
    pub fn seq(&self) -> u64 {
        match self {
            JobOutcome::Success { seq } => *seq,
            JobOutcome::Failed { seq, .. } => *seq,
            JobOutcome::NotStarted { seq, .. } => *seq,
        }
    }
}
