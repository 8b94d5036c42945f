//! Source-side discovery
//!
//! Builds a [`SourceListing`] of raw capture files, either by walking the
//! source root once or from a cached newline-delimited file list, and groups
//! them by timestamp. The [`WorkEnumerator`] then yields the distinct
//! timestamps, optionally filtered through the completion oracle.

pub mod enumerator;

pub use enumerator::WorkEnumerator;

use crate::capture::{has_extension, RawFile, Timestamp};
use crate::error::ScanError;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Raw files of the source tree grouped by acquisition timestamp
#[derive(Debug, Clone, Default)]
pub struct SourceListing {
    /// Distinct file names per timestamp, sorted by timestamp
    groups: BTreeMap<Timestamp, BTreeSet<String>>,

    /// Every raw file, deduplicated by path, in discovery order
    files: Vec<RawFile>,

    /// Files rejected for malformed names
    malformed: u64,
}

impl SourceListing {
    /// Walk the source root and collect raw files
    pub fn scan(root: &Path, extension: &str) -> Result<Self, ScanError> {
        let start = Instant::now();
        let mut paths = Vec::new();

        for entry in WalkDir::new(root).follow_links(true).sort_by_file_name() {
            let entry = entry.map_err(|e| ScanError::SourceUnreadable {
                path: root.to_path_buf(),
                reason: e.to_string(),
            })?;
            if entry.file_type().is_file() && has_extension(entry.path(), extension) {
                paths.push(entry.into_path());
            }
        }

        let listing = Self::from_paths(root, paths, extension);
        info!(
            root = %root.display(),
            files = listing.file_count(),
            timestamps = listing.timestamp_count(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Source scanned"
        );
        Ok(listing)
    }

    /// Read a cached file list instead of walking the source tree
    ///
    /// Blank lines and `#` comments are ignored; relative entries are
    /// resolved against the source root.
    pub fn from_file_list(root: &Path, list: &Path, extension: &str) -> Result<Self, ScanError> {
        let text = fs::read_to_string(list).map_err(|e| ScanError::FileListUnreadable {
            path: list.to_path_buf(),
            reason: e.to_string(),
        })?;

        let paths = text
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty() && !l.starts_with('#'))
            .map(PathBuf::from)
            .filter(|p| has_extension(p, extension));

        let listing = Self::from_paths(root, paths, extension);
        info!(
            list = %list.display(),
            files = listing.file_count(),
            timestamps = listing.timestamp_count(),
            "Source loaded from file list"
        );
        Ok(listing)
    }

    /// Build a listing from known paths
    pub fn from_paths<I>(root: &Path, paths: I, extension: &str) -> Self
    where
        I: IntoIterator<Item = PathBuf>,
    {
        let mut listing = Self::default();
        let mut seen = HashSet::new();

        for path in paths {
            let path = if path.is_relative() {
                root.join(path)
            } else {
                path
            };
            if !has_extension(&path, extension) || !seen.insert(path.clone()) {
                continue;
            }

            match RawFile::from_path(&path) {
                Ok(raw) => {
                    listing
                        .groups
                        .entry(raw.timestamp.clone())
                        .or_default()
                        .insert(raw.name.clone());
                    listing.files.push(raw);
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Skipping malformed raw file name");
                    listing.malformed += 1;
                }
            }
        }

        debug!(
            files = listing.files.len(),
            malformed = listing.malformed,
            "Source listing built"
        );
        listing
    }

    /// Distinct timestamps in sorted order
    pub fn timestamps(&self) -> impl Iterator<Item = &Timestamp> + '_ {
        self.groups.keys()
    }

    /// Number of distinct raw files sharing a timestamp
    pub fn group_size(&self, ts: &Timestamp) -> usize {
        self.groups.get(ts).map_or(0, BTreeSet::len)
    }

    /// All raw files
    pub fn files(&self) -> &[RawFile] {
        &self.files
    }

    /// Raw files grouped by parent directory, each group sorted by name
    pub fn by_directory(&self) -> BTreeMap<PathBuf, Vec<&RawFile>> {
        let mut dirs: BTreeMap<PathBuf, Vec<&RawFile>> = BTreeMap::new();
        for raw in &self.files {
            dirs.entry(raw.parent().to_path_buf()).or_default().push(raw);
        }
        for files in dirs.values_mut() {
            files.sort_by(|a, b| a.name.cmp(&b.name));
        }
        dirs
    }

    /// Number of raw files
    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    /// Number of distinct timestamps
    pub fn timestamp_count(&self) -> usize {
        self.groups.len()
    }

    /// Files skipped for malformed names
    pub fn malformed(&self) -> u64 {
        self.malformed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn ts(s: &str) -> Timestamp {
        Timestamp::extract(s).unwrap()
    }

    #[test]
    fn test_from_paths_groups_and_dedupes() {
        let listing = SourceListing::from_paths(
            Path::new("/src"),
            [
                "1466431433_273487_1.jp4",
                "1466431433_273487_2.jp4",
                "1466431433_273487_2.jp4",
                "1466431400_000001_1.jp4",
                "bad_1.jp4",
                "1466431433_273487_3.tiff",
            ]
            .map(PathBuf::from),
            "jp4",
        );

        assert_eq!(listing.file_count(), 3);
        assert_eq!(listing.malformed(), 1);
        assert_eq!(listing.group_size(&ts("1466431433_273487")), 2);
        assert_eq!(listing.group_size(&ts("1466431400_000001")), 1);
        assert_eq!(listing.group_size(&ts("1466431499_000000")), 0);

        let order: Vec<_> = listing.timestamps().map(Timestamp::as_str).collect();
        assert_eq!(order, vec!["1466431400_000001", "1466431433_273487"]);
    }

    #[test]
    fn test_scan_recurses() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("1/2")).unwrap();
        fs::write(dir.path().join("1/1466431433_273487_1.jp4"), b"").unwrap();
        fs::write(dir.path().join("1/2/1466431433_273487_2.JP4"), b"").unwrap();
        fs::write(dir.path().join("1/notes.txt"), b"").unwrap();

        let listing = SourceListing::scan(dir.path(), "jp4").unwrap();
        assert_eq!(listing.file_count(), 2);
        assert_eq!(listing.timestamp_count(), 1);
        assert_eq!(listing.by_directory().len(), 2);
    }

    #[test]
    fn test_scan_missing_root() {
        let dir = tempdir().unwrap();
        let err = SourceListing::scan(&dir.path().join("missing"), "jp4").unwrap_err();
        assert!(matches!(err, ScanError::SourceUnreadable { .. }));
    }

    #[test]
    fn test_file_list() {
        let dir = tempdir().unwrap();
        let list = dir.path().join("files.txt");
        fs::write(
            &list,
            "# cached\n\n1466431433_273487_1.jp4\n  /abs/1466431433_273487_2.jp4  \n",
        )
        .unwrap();

        let listing = SourceListing::from_file_list(Path::new("/src"), &list, "jp4").unwrap();
        assert_eq!(listing.file_count(), 2);
        assert_eq!(listing.files()[0].path, PathBuf::from("/src/1466431433_273487_1.jp4"));
        assert_eq!(listing.files()[1].path, PathBuf::from("/abs/1466431433_273487_2.jp4"));
    }

    #[test]
    fn test_by_directory_sorts_files() {
        let listing = SourceListing::from_paths(
            Path::new("/src"),
            ["d/1466431433_273487_2.jp4", "d/1466431433_273487_1.jp4"].map(PathBuf::from),
            "jp4",
        );
        let dirs = listing.by_directory();
        let files = &dirs[Path::new("/src/d")];
        assert_eq!(files[0].name, "1466431433_273487_1.jp4");
        assert_eq!(files[1].name, "1466431433_273487_2.jp4");
    }
}
