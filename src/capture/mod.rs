//! Raw capture files and their timestamp keys
//!
//! Every raw file carries a fixed-width acquisition timestamp as its name
//! prefix followed by the index of the camera unit that produced it:
//!
//! ```text
//! 1466431433_273487_3.jp4
//! └──── timestamp ────┘ └ unit
//! ```

pub mod timestamp;

pub use timestamp::{Timestamp, TIMESTAMP_LEN};

use crate::error::CaptureError;
use std::path::{Path, PathBuf};

/// A raw capture file discovered in the source tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFile {
    /// Path as discovered (absolute or relative to the source root)
    pub path: PathBuf,

    /// File name component of `path`
    pub name: String,

    /// Acquisition timestamp parsed from the name
    pub timestamp: Timestamp,

    /// Camera unit index, when the name carries one
    pub unit: Option<u32>,
}

impl RawFile {
    /// Parse a raw file from its path
    pub fn from_path(path: &Path) -> Result<Self, CaptureError> {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| CaptureError::NotUtf8 {
                path: path.to_path_buf(),
            })?;

        let timestamp = Timestamp::extract(name)?;
        let unit = parse_unit(&name[TIMESTAMP_LEN..]);

        Ok(Self {
            path: path.to_path_buf(),
            name: name.to_string(),
            timestamp,
            unit,
        })
    }

    /// Directory containing this file (empty for bare names)
    pub fn parent(&self) -> &Path {
        self.path.parent().unwrap_or_else(|| Path::new(""))
    }
}

/// Parse the unit index out of the remainder after the timestamp: `_<digits>.<ext>`
fn parse_unit(rest: &str) -> Option<u32> {
    let rest = rest.strip_prefix('_')?;
    let stem = rest.split('.').next()?;
    stem.parse().ok()
}

/// Check whether a path has the given extension (case-insensitive)
pub fn has_extension(path: &Path, extension: &str) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(extension))
}
