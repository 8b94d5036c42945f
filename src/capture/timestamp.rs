//! Fixed-width acquisition timestamp keys

use crate::error::CaptureError;
use std::fmt;

/// Width of the timestamp prefix: `SSSSSSSSSS_UUUUUU`
pub const TIMESTAMP_LEN: usize = 17;

/// Canonical grouping key shared by all raw files of one capture instant
///
/// Ordering is plain string ordering, which is chronological because the
/// prefix has a fixed width.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(String);

impl Timestamp {
    /// Extract the timestamp prefix from a raw file name
    ///
    /// Names shorter than [`TIMESTAMP_LEN`] are rejected, never truncated.
    pub fn extract(file_name: &str) -> Result<Self, CaptureError> {
        if file_name.len() < TIMESTAMP_LEN || !file_name.is_char_boundary(TIMESTAMP_LEN) {
            return Err(CaptureError::NameTooShort {
                name: file_name.to_string(),
                min: TIMESTAMP_LEN,
            });
        }
        Ok(Self(file_name[..TIMESTAMP_LEN].to_string()))
    }

    /// The timestamp as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Timestamp {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract() {
        let ts = Timestamp::extract("1466431433_273487_12.jp4").unwrap();
        assert_eq!(ts.as_str(), "1466431433_273487");
        assert_eq!(ts.to_string(), "1466431433_273487");
    }

    #[test]
    fn test_extract_exact_width() {
        assert!(Timestamp::extract("1466431433_273487").is_ok());
    }

    #[test]
    fn test_extract_rejects_short_names() {
        let err = Timestamp::extract("1466431433_2734").unwrap_err();
        assert_eq!(
            err,
            CaptureError::NameTooShort {
                name: "1466431433_2734".into(),
                min: TIMESTAMP_LEN,
            }
        );
    }

    #[test]
    fn test_extract_rejects_split_character() {
        // 16 ASCII bytes followed by a two-byte character straddling the boundary
        let name = "1466431433_27348é_1.jp4";
        assert!(Timestamp::extract(name).is_err());
    }

    #[test]
    fn test_ordering_is_chronological() {
        let a = Timestamp::extract("1466431433_273487").unwrap();
        let b = Timestamp::extract("1466431434_000001").unwrap();
        assert!(a < b);
    }
}
