//! Job descriptors: one manifest line per batch

use crate::config::RunConfig;
use crate::plan::{Batch, WorkItem};
use std::fmt;
use std::path::PathBuf;

/// Fully resolved invocation arguments for one batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobDescriptor {
    /// 1-based generation order
    pub seq: u64,

    /// Preferences file for the processing program
    pub prefs_path: PathBuf,

    /// Source directory of the raw files
    pub source: PathBuf,

    /// Destination root
    pub destination: PathBuf,

    /// Configured batch size
    pub split_at: usize,

    /// Truncation flag
    pub truncate: bool,

    /// Output identifier
    pub output_id: String,

    /// Timestamp, or `<first>+<count>` file range
    pub scope: String,
}

impl JobDescriptor {
    /// Resolve a batch against the run configuration
    pub fn from_batch(batch: Batch, config: &RunConfig) -> Self {
        let (source, scope) = match batch.item {
            WorkItem::Timestamp(ts) => (config.source_root.clone(), ts.to_string()),
            WorkItem::Files {
                directory,
                first,
                count,
            } => (directory, format!("{}+{}", first, count)),
        };

        Self {
            seq: batch.seq,
            prefs_path: config.prefs_path.clone(),
            source,
            destination: config.destination_root.clone(),
            split_at: config.split_at,
            truncate: config.truncate,
            output_id: batch.output_id,
            scope,
        }
    }

    /// Arguments substituted for the manifest placeholder
    pub fn words(&self) -> Vec<String> {
        vec![
            self.prefs_path.display().to_string(),
            self.source.display().to_string(),
            self.destination.display().to_string(),
            self.split_at.to_string(),
            if self.truncate { "1" } else { "0" }.to_string(),
            self.output_id.clone(),
            self.scope.clone(),
        ]
    }

    /// Manifest line: shell-quoted words
    pub fn to_line(&self) -> String {
        shell_words::join(self.words())
    }
}

impl fmt::Display for JobDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_line())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::Timestamp;
    use crate::config::CaptureSettings;
    use crate::snapshot::OutputFormat;

    fn config() -> RunConfig {
        let settings = CaptureSettings {
            camera_count: 4,
            subcamera_count: 2,
            output_format: OutputFormat::Jpeg,
        };
        RunConfig::new("/data/raw", "/data/eqr out", "/etc/eyesis.prefs", settings)
    }

    #[test]
    fn test_timestamp_descriptor_line() {
        let batch = Batch {
            seq: 1,
            output_id: "run-1466431433_273487".into(),
            item: WorkItem::Timestamp(Timestamp::extract("1466431433_273487").unwrap()),
            raw_files: 4,
        };
        let job = JobDescriptor::from_batch(batch, &config());

        assert_eq!(job.source, PathBuf::from("/data/raw"));
        assert_eq!(
            job.to_line(),
            "/etc/eyesis.prefs /data/raw '/data/eqr out' 4 0 run-1466431433_273487 1466431433_273487"
        );
        assert_eq!(shell_words::split(&job.to_line()).unwrap(), job.words());
    }

    #[test]
    fn test_range_descriptor() {
        let batch = Batch {
            seq: 2,
            output_id: "run_0002".into(),
            item: WorkItem::Files {
                directory: "/data/raw/12".into(),
                first: 40,
                count: 20,
            },
            raw_files: 20,
        };
        let job = JobDescriptor::from_batch(batch, &config());
        assert_eq!(job.source, PathBuf::from("/data/raw/12"));
        assert_eq!(job.scope, "40+20");
        assert_eq!(job.seq, 2);
    }
}
