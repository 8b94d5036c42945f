//! Configuration types for capture-queue
//!
//! This module defines:
//! - CLI argument parsing using clap derive macros
//! - The preferences file loader (camera counts and output format)
//! - Runtime configuration with validation, resolved once per run

use crate::error::ConfigError;
use crate::plan::{BatchMode, OrderMode};
use crate::snapshot::OutputFormat;
use chrono::Local;
use clap::Parser;
use regex::Regex;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

/// Maximum reasonable concurrent job count
pub const MAX_JOBS: usize = 512;

/// Default raw file extension
const DEFAULT_EXTENSION: &str = "jp4";

/// Default worker pool command referenced by the manifest header
const DEFAULT_POOL_COMMAND: &str = "parallel";

/// Preference keys
pub mod keys {
    pub const CAMERA_COUNT: &str = "CAMERACOUNT";
    pub const SUBCAMERA_COUNT: &str = "SUBCAMERACOUNT";
    pub const OUTPUT_FORMAT: &str = "OUTPUTFORMAT";
}

/// Regex for `KEY=VALUE` preference lines
static PREF_LINE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:export\s+)?([A-Za-z_][A-Za-z0-9_]*)\s*=\s*(.*?)\s*$")
        .expect("Invalid preference line regex")
});

/// Run identifiers end up in file names
static RUN_ID_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_-]+$").expect("Invalid run id regex"));

/// Resumable post-processing queue for multi-camera captures
#[derive(Parser, Debug, Clone)]
#[command(
    name = "capture-queue",
    version,
    about = "Schedule post-processing of camera captures into a resumable job manifest",
    long_about = "Scans a source tree of raw captures grouped by acquisition timestamp, skips\n\
                  groups whose outputs already exist in the destination, and emits one job per\n\
                  timestamp (or per directory chunk) into a self-executing manifest.\n\n\
                  In queue mode the jobs are also run immediately by a bounded worker pool.",
    after_help = "EXAMPLES:\n    \
        capture-queue -p eyesis.prefs --program ./process.sh /data/raw /data/eqr\n    \
        capture-queue -p eyesis.prefs --program ./process.sh -c -r -q -j 8 /data/raw /data/eqr\n    \
        capture-queue -p eyesis.prefs --program ./process.sh -s 260 -t /data/raw /data/eqr\n    \
        capture-queue replay logs/queue_20240101_120000.sh -j 4",
    args_conflicts_with_subcommands = true,
    subcommand_negates_reqs = true
)]
pub struct CliArgs {
    /// Source directory containing raw capture files
    #[arg(value_name = "SOURCE", required = true)]
    pub source: Option<PathBuf>,

    /// Destination directory for processed output
    #[arg(value_name = "DESTINATION", required = true)]
    pub destination: Option<PathBuf>,

    /// Subcommand (replay)
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Preferences file with CAMERACOUNT, SUBCAMERACOUNT and OUTPUTFORMAT
    #[arg(short = 'p', long, value_name = "FILE", required = true)]
    pub prefs: Option<PathBuf>,

    /// External program that processes one job
    #[arg(long, value_name = "PATH", required = true)]
    pub program: Option<PathBuf>,

    /// Logging wrapper placed in front of the program
    #[arg(long, value_name = "PATH")]
    pub wrapper: Option<PathBuf>,

    /// Worker pool command written into the manifest header
    #[arg(long, default_value = DEFAULT_POOL_COMMAND, value_name = "CMD")]
    pub pool_command: String,

    /// Raw files per job; above the camera count, directories are batched instead
    #[arg(short = 's', long, value_name = "NUM")]
    pub split_at: Option<usize>,

    /// Run jobs immediately while writing the manifest
    #[arg(short = 'q', long)]
    pub queue: bool,

    /// Maximum concurrent jobs
    #[arg(short = 'j', long, default_value_t = default_jobs(), value_name = "NUM")]
    pub jobs: usize,

    /// Skip timestamps whose outputs already exist (scans destination once)
    #[arg(short = 'c', long)]
    pub check: bool,

    /// Progressive order: spread early output across the whole capture
    #[arg(short = 'r', long)]
    pub progressive: bool,

    /// Drop a trailing partial batch down to whole camera groups
    #[arg(short = 't', long)]
    pub truncate: bool,

    /// Newline-delimited list of raw files to use instead of scanning SOURCE
    #[arg(short = 'l', long, value_name = "FILE")]
    pub file_list: Option<PathBuf>,

    /// Directory for the manifest, job log and per-job output
    #[arg(short = 'L', long, default_value = "logs", value_name = "DIR")]
    pub log_dir: PathBuf,

    /// Manifest path (default: LOG_DIR/queue_<run id>.sh)
    #[arg(short = 'm', long, value_name = "FILE")]
    pub manifest: Option<PathBuf>,

    /// Reuse a previous run id and append to its manifest
    #[arg(long, value_name = "ID")]
    pub run_id: Option<String>,

    /// Raw file extension
    #[arg(long, default_value = DEFAULT_EXTENSION, value_name = "EXT")]
    pub extension: String,

    /// Override CAMERACOUNT from the preferences file
    #[arg(long, value_name = "NUM")]
    pub camera_count: Option<u32>,

    /// Override SUBCAMERACOUNT from the preferences file
    #[arg(long, value_name = "NUM")]
    pub subcamera_count: Option<u32>,

    /// Override OUTPUTFORMAT from the preferences file (0 = jpeg, 1 = tiff)
    #[arg(long, value_name = "NUM")]
    pub output_format: Option<i64>,

    /// Print job lines to stdout without writing or running anything
    #[arg(short = 'n', long)]
    pub dry_run: bool,

    /// Quiet mode - suppress progress output
    #[arg(long)]
    pub quiet: bool,

    /// Verbose output
    #[arg(short = 'v', long)]
    pub verbose: bool,
}

/// Subcommands
#[derive(clap::Subcommand, Debug, Clone)]
pub enum Command {
    /// Execute an existing manifest with the built-in worker pool
    Replay {
        /// Manifest file to execute
        #[arg(value_name = "MANIFEST")]
        manifest: PathBuf,

        /// Maximum concurrent jobs (default: value in the manifest header)
        #[arg(short = 'j', long, value_name = "NUM")]
        jobs: Option<usize>,

        /// Job log to resume from and append to (default: the header's job log)
        #[arg(long, value_name = "FILE")]
        joblog: Option<PathBuf>,

        /// Directory for per-job output
        #[arg(short = 'L', long, default_value = "logs", value_name = "DIR")]
        log_dir: PathBuf,

        /// Quiet mode - suppress progress output
        #[arg(long)]
        quiet: bool,

        /// Verbose output
        #[arg(short = 'v', long)]
        verbose: bool,
    },
}

fn default_jobs() -> usize {
    num_cpus::get()
}

/// How generated jobs are handed off
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchMode {
    /// Only append jobs to the manifest
    PersistOnly,
    /// Append to the manifest and run immediately
    Queue,
}

/// Parsed preferences file
#[derive(Debug, Clone, Default)]
pub struct Preferences {
    path: PathBuf,
    values: BTreeMap<String, String>,
}

impl Preferences {
    /// Read and parse a preferences file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|e| ConfigError::PrefsUnreadable {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Ok(Self::parse(path, &text))
    }

    /// Parse shell-style `KEY=VALUE` lines; anything else is ignored
    pub fn parse(path: &Path, text: &str) -> Self {
        let mut values = BTreeMap::new();

        for line in text.lines() {
            let trimmed = line.trim_start();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            let Some(caps) = PREF_LINE_REGEX.captures(line) else {
                continue;
            };
            values.insert(caps[1].to_string(), unquote(&caps[2]));
        }

        Self {
            path: path.to_path_buf(),
            values,
        }
    }

    /// Raw string value of a key
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// Integer value of a key, `None` when unset or empty
    pub fn get_int(&self, key: &'static str) -> Result<Option<i64>, ConfigError> {
        match self.get(key) {
            None | Some("") => Ok(None),
            Some(v) => v
                .parse()
                .map(Some)
                .map_err(|_| ConfigError::InvalidPreference {
                    key,
                    value: v.to_string(),
                    reason: "expected an integer".into(),
                }),
        }
    }

    /// Path the preferences were read from
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Strip matching quotes, or a trailing ` # comment` from unquoted values
fn unquote(raw: &str) -> String {
    for q in ['"', '\''] {
        if raw.len() >= 2 && raw.starts_with(q) && raw.ends_with(q) {
            return raw[1..raw.len() - 1].to_string();
        }
    }
    match raw.find(" #") {
        Some(idx) => raw[..idx].trim_end().to_string(),
        None => raw.to_string(),
    }
}

/// Camera array parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureSettings {
    /// Raw files per complete timestamp group
    pub camera_count: u32,

    /// Sub-cameras that each produce one output artifact
    pub subcamera_count: u32,

    /// Output artifact format
    pub output_format: OutputFormat,
}

impl CaptureSettings {
    /// Resolve settings from preferences, letting CLI overrides win
    pub fn resolve(
        prefs: &Preferences,
        camera_count: Option<u32>,
        subcamera_count: Option<u32>,
        output_format: Option<i64>,
    ) -> Result<Self, ConfigError> {
        let camera_count = match camera_count {
            Some(v) => v as i64,
            None => require(prefs, keys::CAMERA_COUNT)?,
        };
        let subcamera_count = match subcamera_count {
            Some(v) => v as i64,
            None => require(prefs, keys::SUBCAMERA_COUNT)?,
        };
        let selector = match output_format {
            Some(v) => v,
            None => require(prefs, keys::OUTPUT_FORMAT)?,
        };

        Ok(Self {
            camera_count: positive(keys::CAMERA_COUNT, camera_count)?,
            subcamera_count: positive(keys::SUBCAMERA_COUNT, subcamera_count)?,
            output_format: OutputFormat::from_selector(selector)?,
        })
    }
}

fn require(prefs: &Preferences, key: &'static str) -> Result<i64, ConfigError> {
    prefs
        .get_int(key)?
        .ok_or_else(|| ConfigError::MissingPreference {
            key,
            path: prefs.path().to_path_buf(),
        })
}

fn positive(key: &'static str, value: i64) -> Result<u32, ConfigError> {
    u32::try_from(value)
        .ok()
        .filter(|v| *v > 0)
        .ok_or_else(|| ConfigError::InvalidPreference {
            key,
            value: value.to_string(),
            reason: "must be a positive integer".into(),
        })
}

/// Absolute paths of the external commands a run depends on
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedCommands {
    /// Worker pool executable for the manifest header
    pub pool: PathBuf,

    /// Processing program
    pub program: PathBuf,

    /// Optional logging wrapper
    pub wrapper: Option<PathBuf>,
}

/// Validated runtime configuration (one per invocation, never mutated)
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Root of the raw capture tree
    pub source_root: PathBuf,

    /// Root of the processed output tree
    pub destination_root: PathBuf,

    /// Preferences file handed to every job
    pub prefs_path: PathBuf,

    /// Cached file list used instead of scanning the source
    pub file_list: Option<PathBuf>,

    /// Raw file extension
    pub extension: String,

    /// Camera array parameters
    pub capture: CaptureSettings,

    /// Raw files per job
    pub split_at: usize,

    /// Timestamp ordering
    pub order: OrderMode,

    /// Filter out timestamps already complete in the destination
    pub check_complete: bool,

    /// Truncate a trailing partial batch to whole camera groups
    pub truncate: bool,

    /// Persist-only or queue mode
    pub dispatch: DispatchMode,

    /// Worker pool size
    pub jobs: usize,

    /// Job queue capacity
    pub queue_size: usize,

    /// Run identity, embedded in file names and output ids
    pub run_id: String,

    /// Run id was given explicitly, so an existing manifest is appended to
    pub resume: bool,

    /// Directory for logs and the manifest
    pub log_dir: PathBuf,

    /// Manifest path
    pub manifest_path: PathBuf,

    /// Job log path
    pub joblog_path: PathBuf,

    /// Processing program as given
    pub program: PathBuf,

    /// Logging wrapper as given
    pub wrapper: Option<PathBuf>,

    /// Worker pool command as given
    pub pool_command: String,

    /// Print jobs only
    pub dry_run: bool,

    /// Show progress indicator
    pub show_progress: bool,

    /// Verbose logging
    pub verbose: bool,
}

impl RunConfig {
    /// Create a configuration with default run options
    pub fn new(
        source_root: impl Into<PathBuf>,
        destination_root: impl Into<PathBuf>,
        prefs_path: impl Into<PathBuf>,
        capture: CaptureSettings,
    ) -> Self {
        let run_id = fresh_run_id();
        let log_dir = PathBuf::from("logs");
        let jobs = default_jobs();

        Self {
            source_root: source_root.into(),
            destination_root: destination_root.into(),
            prefs_path: prefs_path.into(),
            file_list: None,
            extension: DEFAULT_EXTENSION.to_string(),
            capture,
            split_at: capture.camera_count as usize,
            order: OrderMode::Sequential,
            check_complete: false,
            truncate: false,
            dispatch: DispatchMode::PersistOnly,
            jobs,
            queue_size: jobs * 2,
            manifest_path: log_dir.join(format!("queue_{}.sh", run_id)),
            joblog_path: log_dir.join(format!("joblog_{}.txt", run_id)),
            run_id,
            resume: false,
            log_dir,
            program: PathBuf::from("process"),
            wrapper: None,
            pool_command: DEFAULT_POOL_COMMAND.to_string(),
            dry_run: false,
            show_progress: false,
            verbose: false,
        }
    }

    /// Create and validate configuration from CLI arguments
    pub fn from_args(args: CliArgs) -> Result<Self, ConfigError> {
        let source_root = required_path(args.source, "SOURCE is required")?;
        let destination_root = required_path(args.destination, "DESTINATION is required")?;
        let prefs_path = required_path(args.prefs, "--prefs is required")?;
        let program = required_path(args.program, "--program is required")?;

        if !source_root.is_dir() {
            return Err(ConfigError::InvalidPath {
                path: source_root,
                reason: "source directory does not exist".into(),
            });
        }

        if let Some(list) = &args.file_list {
            if !list.is_file() {
                return Err(ConfigError::InvalidPath {
                    path: list.clone(),
                    reason: "file list does not exist".into(),
                });
            }
        }

        let prefs = Preferences::load(&prefs_path)?;
        let capture = CaptureSettings::resolve(
            &prefs,
            args.camera_count,
            args.subcamera_count,
            args.output_format,
        )?;

        // Validate job count
        if args.jobs == 0 || args.jobs > MAX_JOBS {
            return Err(ConfigError::InvalidJobCount {
                count: args.jobs,
                max: MAX_JOBS,
            });
        }

        let split_at = args.split_at.unwrap_or(capture.camera_count as usize);
        if split_at == 0 {
            return Err(ConfigError::InvalidBatchSize { size: split_at });
        }

        let resume = args.run_id.is_some();
        let run_id = match args.run_id {
            Some(id) if RUN_ID_REGEX.is_match(&id) => id,
            Some(id) => return Err(ConfigError::InvalidRunId { id }),
            None => fresh_run_id(),
        };

        let manifest_path = args
            .manifest
            .unwrap_or_else(|| args.log_dir.join(format!("queue_{}.sh", run_id)));
        let joblog_path = args.log_dir.join(format!("joblog_{}.txt", run_id));

        Ok(Self {
            source_root,
            destination_root,
            prefs_path,
            file_list: args.file_list,
            extension: args.extension.trim_start_matches('.').to_string(),
            capture,
            split_at,
            order: if args.progressive {
                OrderMode::Progressive
            } else {
                OrderMode::Sequential
            },
            check_complete: args.check,
            truncate: args.truncate,
            dispatch: if args.queue {
                DispatchMode::Queue
            } else {
                DispatchMode::PersistOnly
            },
            jobs: args.jobs,
            queue_size: args.jobs * 2,
            run_id,
            resume,
            log_dir: args.log_dir,
            manifest_path,
            joblog_path,
            program,
            wrapper: args.wrapper,
            pool_command: args.pool_command,
            dry_run: args.dry_run,
            show_progress: !args.quiet && !args.dry_run,
            verbose: args.verbose,
        })
    }

    /// Batching mode implied by the batch size and camera count
    pub fn batch_mode(&self) -> BatchMode {
        BatchMode::for_split(self.split_at, self.capture.camera_count)
    }

    /// Resolve every external command the run needs
    ///
    /// A missing command is fatal before any work item is produced. The pool
    /// command is only needed for the manifest header, so a dry run skips it.
    pub fn check_prerequisites(&self) -> Result<ResolvedCommands, ConfigError> {
        let program = resolve_command(self.program.as_os_str())?;
        let wrapper = self
            .wrapper
            .as_ref()
            .map(|w| resolve_command(w.as_os_str()))
            .transpose()?;
        let pool = if self.dry_run {
            PathBuf::from(&self.pool_command)
        } else {
            resolve_command(self.pool_command.as_ref())?
        };

        Ok(ResolvedCommands {
            pool,
            program,
            wrapper,
        })
    }

    /// Create the log directory when missing
    pub fn ensure_log_dir(&self) -> std::io::Result<()> {
        fs::create_dir_all(&self.log_dir)?;
        if let Some(parent) = self.manifest_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        Ok(())
    }
}

fn required_path(value: Option<PathBuf>, reason: &str) -> Result<PathBuf, ConfigError> {
    value.ok_or_else(|| ConfigError::InvalidPath {
        path: PathBuf::new(),
        reason: reason.to_string(),
    })
}

/// Resolve a command name or path to an absolute executable path
pub fn resolve_command(name: &std::ffi::OsStr) -> Result<PathBuf, ConfigError> {
    let found = which::which(name).map_err(|e| ConfigError::MissingCommand {
        name: name.to_string_lossy().into_owned(),
        reason: e.to_string(),
    })?;
    Ok(std::path::absolute(&found).unwrap_or(found))
}

/// Run id for a fresh run: local start time
pub fn fresh_run_id() -> String {
    Local::now().format("%Y%m%d_%H%M%S").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prefs(text: &str) -> Preferences {
        Preferences::parse(Path::new("test.prefs"), text)
    }

    #[test]
    fn test_parse_preferences() {
        let p = prefs(
            "# camera setup\n\
             CAMERACOUNT=26\n\
             export SUBCAMERACOUNT = \"24\"\n\
             OUTPUTFORMAT='1'\n\
             NOTE=hello # trailing\n\
             not a setting\n",
        );
        assert_eq!(p.get("CAMERACOUNT"), Some("26"));
        assert_eq!(p.get("SUBCAMERACOUNT"), Some("24"));
        assert_eq!(p.get("OUTPUTFORMAT"), Some("1"));
        assert_eq!(p.get("NOTE"), Some("hello"));
        assert_eq!(p.get("not"), None);
    }

    #[test]
    fn test_resolve_settings() {
        let p = prefs("CAMERACOUNT=26\nSUBCAMERACOUNT=24\nOUTPUTFORMAT=0\n");
        let s = CaptureSettings::resolve(&p, None, None, None).unwrap();
        assert_eq!(s.camera_count, 26);
        assert_eq!(s.subcamera_count, 24);
        assert_eq!(s.output_format, OutputFormat::Jpeg);

        let s = CaptureSettings::resolve(&p, Some(4), None, Some(1)).unwrap();
        assert_eq!(s.camera_count, 4);
        assert_eq!(s.output_format, OutputFormat::Tiff);
    }

    #[test]
    fn test_missing_preference() {
        let p = prefs("CAMERACOUNT=26\nOUTPUTFORMAT=0\n");
        let err = CaptureSettings::resolve(&p, None, None, None).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::MissingPreference {
                key: "SUBCAMERACOUNT",
                ..
            }
        ));
    }

    #[test]
    fn test_invalid_preference() {
        let p = prefs("CAMERACOUNT=abc\nSUBCAMERACOUNT=1\nOUTPUTFORMAT=0\n");
        assert!(CaptureSettings::resolve(&p, None, None, None).is_err());

        let p = prefs("CAMERACOUNT=0\nSUBCAMERACOUNT=1\nOUTPUTFORMAT=0\n");
        assert!(CaptureSettings::resolve(&p, None, None, None).is_err());
    }

    #[test]
    fn test_batch_mode_from_split() {
        let settings = CaptureSettings {
            camera_count: 4,
            subcamera_count: 2,
            output_format: OutputFormat::Jpeg,
        };
        let mut config = RunConfig::new("/src", "/dst", "p.prefs", settings);
        assert_eq!(config.split_at, 4);
        assert_eq!(config.batch_mode(), BatchMode::PerTimestamp);

        config.split_at = 5;
        assert_eq!(config.batch_mode(), BatchMode::Directory);
    }

    #[test]
    fn test_from_args_rejects_bad_run_id() {
        let dir = tempfile::tempdir().unwrap();
        let prefs_path = dir.path().join("p.prefs");
        fs::write(&prefs_path, "CAMERACOUNT=2\nSUBCAMERACOUNT=1\nOUTPUTFORMAT=0\n").unwrap();

        let args = CliArgs::parse_from([
            "capture-queue",
            "-p",
            prefs_path.to_str().unwrap(),
            "--program",
            "true",
            "--run-id",
            "../evil",
            dir.path().to_str().unwrap(),
            dir.path().to_str().unwrap(),
        ]);
        let err = RunConfig::from_args(args).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidRunId { .. }));
    }

    #[test]
    fn test_from_args_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let prefs_path = dir.path().join("p.prefs");
        fs::write(&prefs_path, "CAMERACOUNT=2\nSUBCAMERACOUNT=1\nOUTPUTFORMAT=1\n").unwrap();

        let args = CliArgs::parse_from([
            "capture-queue",
            "-p",
            prefs_path.to_str().unwrap(),
            "--program",
            "true",
            "--run-id",
            "run_1",
            "-r",
            "-q",
            "-j",
            "3",
            dir.path().to_str().unwrap(),
            dir.path().to_str().unwrap(),
        ]);
        let config = RunConfig::from_args(args).unwrap();
        assert_eq!(config.split_at, 2);
        assert_eq!(config.order, OrderMode::Progressive);
        assert_eq!(config.dispatch, DispatchMode::Queue);
        assert_eq!(config.jobs, 3);
        assert!(config.resume);
        assert_eq!(config.manifest_path, PathBuf::from("logs/queue_run_1.sh"));
        assert_eq!(config.joblog_path, PathBuf::from("logs/joblog_run_1.txt"));
    }
}
