//! Completion oracle
//!
//! A timestamp is complete when every sub-camera has either its combined
//! equirectangular artifact or both of its LEFT/RIGHT halves:
//!
//! ```text
//! 1466431433_273487-07-DECONV-RGB24_EQR.jpeg
//! 1466431433_273487-07-DECONV-RGB24_EQR_LEFT.jpeg + ..._EQR_RIGHT.jpeg
//! ```
//!
//! All checks are set lookups against the run's [`DestinationSnapshot`].

use crate::capture::Timestamp;
use crate::error::ConfigError;
use crate::snapshot::DestinationSnapshot;
use std::fmt;
use std::sync::Arc;

/// Fixed part of every artifact name between sub-camera index and suffix
const ARTIFACT_KIND: &str = "DECONV-RGB24_EQR";

/// Output image format written by the processing program
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// JPEG output (selector 0)
    Jpeg,
    /// TIFF output (selector 1)
    Tiff,
}

impl OutputFormat {
    /// Map the integer selector used in the preferences file
    pub fn from_selector(selector: i64) -> Result<Self, ConfigError> {
        match selector {
            0 => Ok(OutputFormat::Jpeg),
            1 => Ok(OutputFormat::Tiff),
            other => Err(ConfigError::InvalidPreference {
                key: "OUTPUTFORMAT",
                value: other.to_string(),
                reason: "expected 0 (jpeg) or 1 (tiff)".into(),
            }),
        }
    }

    /// File name tag (extension) of artifacts in this format
    pub fn tag(self) -> &'static str {
        match self {
            OutputFormat::Jpeg => "jpeg",
            OutputFormat::Tiff => "tiff",
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Decides whether a timestamp's outputs already exist
#[derive(Debug, Clone)]
pub struct CompletionOracle {
    snapshot: Arc<DestinationSnapshot>,
    subcamera_count: u32,
    format: OutputFormat,
}

impl CompletionOracle {
    /// Create an oracle over a captured snapshot
    pub fn new(snapshot: Arc<DestinationSnapshot>, subcamera_count: u32, format: OutputFormat) -> Self {
        Self {
            snapshot,
            subcamera_count,
            format,
        }
    }

    /// Name of the combined artifact for one sub-camera
    pub fn artifact_name(&self, ts: &Timestamp, sub: u32) -> String {
        format!("{}-{:02}-{}.{}", ts, sub, ARTIFACT_KIND, self.format.tag())
    }

    /// Names of the LEFT/RIGHT split artifacts for one sub-camera
    pub fn split_artifact_names(&self, ts: &Timestamp, sub: u32) -> (String, String) {
        let stem = format!("{}-{:02}-{}", ts, sub, ARTIFACT_KIND);
        let tag = self.format.tag();
        (
            format!("{}_LEFT.{}", stem, tag),
            format!("{}_RIGHT.{}", stem, tag),
        )
    }

    /// Check one sub-camera
    pub fn is_subcamera_complete(&self, ts: &Timestamp, sub: u32) -> bool {
        if self.snapshot.contains(&self.artifact_name(ts, sub)) {
            return true;
        }
        let (left, right) = self.split_artifact_names(ts, sub);
        self.snapshot.contains(&left) && self.snapshot.contains(&right)
    }

    /// Check every sub-camera of a timestamp
    pub fn is_complete(&self, ts: &Timestamp) -> bool {
        (0..self.subcamera_count).all(|sub| self.is_subcamera_complete(ts, sub))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts() -> Timestamp {
        Timestamp::extract("1466431433_273487").unwrap()
    }

    fn oracle(names: &[&str], subs: u32) -> CompletionOracle {
        let snapshot = DestinationSnapshot::from_names(names.iter().copied());
        CompletionOracle::new(Arc::new(snapshot), subs, OutputFormat::Jpeg)
    }

    #[test]
    fn test_artifact_names() {
        let o = oracle(&[], 1);
        assert_eq!(
            o.artifact_name(&ts(), 3),
            "1466431433_273487-03-DECONV-RGB24_EQR.jpeg"
        );
        let (l, r) = o.split_artifact_names(&ts(), 12);
        assert_eq!(l, "1466431433_273487-12-DECONV-RGB24_EQR_LEFT.jpeg");
        assert_eq!(r, "1466431433_273487-12-DECONV-RGB24_EQR_RIGHT.jpeg");
    }

    #[test]
    fn test_complete_with_combined_and_split() {
        let o = oracle(
            &[
                "1466431433_273487-00-DECONV-RGB24_EQR.jpeg",
                "1466431433_273487-01-DECONV-RGB24_EQR_LEFT.jpeg",
                "1466431433_273487-01-DECONV-RGB24_EQR_RIGHT.jpeg",
            ],
            2,
        );
        assert!(o.is_complete(&ts()));
    }

    #[test]
    fn test_half_split_is_incomplete() {
        let o = oracle(
            &[
                "1466431433_273487-00-DECONV-RGB24_EQR.jpeg",
                "1466431433_273487-01-DECONV-RGB24_EQR_LEFT.jpeg",
            ],
            2,
        );
        assert!(!o.is_complete(&ts()));
    }

    #[test]
    fn test_wrong_format_is_incomplete() {
        let o = oracle(&["1466431433_273487-00-DECONV-RGB24_EQR.tiff"], 1);
        assert!(!o.is_complete(&ts()));
    }

    #[test]
    fn test_output_format_selector() {
        assert_eq!(OutputFormat::from_selector(0).unwrap(), OutputFormat::Jpeg);
        assert_eq!(OutputFormat::from_selector(1).unwrap(), OutputFormat::Tiff);
        assert!(OutputFormat::from_selector(5).is_err());
    }
}
