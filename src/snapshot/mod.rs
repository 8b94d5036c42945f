//! Point-in-time view of the destination tree
//!
//! The snapshot is captured once per run by a single recursive traversal and
//! shared read-only afterwards. Artifacts produced by jobs that finish later
//! in the same run are not reflected in it.

pub mod oracle;

pub use oracle::{CompletionOracle, OutputFormat};

use crate::error::SnapshotError;
use chrono::Local;
use std::collections::HashSet;
use std::path::Path;
use std::time::Instant;
use tracing::{debug, info};
use walkdir::WalkDir;

/// Immutable listing of artifact file names under the destination root
#[derive(Debug, Clone)]
pub struct DestinationSnapshot {
    names: HashSet<String>,
}

impl DestinationSnapshot {
    /// Traverse the destination root once and record every file name
    pub fn capture(root: &Path) -> Result<Self, SnapshotError> {
        if !root.is_dir() {
            return Err(SnapshotError::DestinationMissing {
                path: root.to_path_buf(),
            });
        }

        let start = Instant::now();
        let captured_at = Local::now();
        let mut names = HashSet::new();

        for entry in WalkDir::new(root).follow_links(true) {
            let entry = entry.map_err(|e| SnapshotError::TraversalFailed {
                path: root.to_path_buf(),
                reason: e.to_string(),
            })?;

            if !entry.file_type().is_file() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                names.insert(name.to_string());
            } else {
                debug!(path = %entry.path().display(), "Skipping non UTF-8 artifact name");
            }
        }

        info!(
            root = %root.display(),
            captured_at = %captured_at.format("%Y-%m-%d %H:%M:%S"),
            artifacts = names.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Destination snapshot captured"
        );

        Ok(Self { names })
    }

    /// Build a snapshot from known artifact names
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
        }
    }

    /// Check whether an artifact with this file name exists
    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    /// Number of artifacts recorded
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Check if the destination held no files at capture time
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}
