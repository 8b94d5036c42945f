//! Invocation template stored in the manifest header
//!
//! The first manifest line makes the file self-executing through the worker
//! pool command:
//!
//! ```text
//! #!/usr/bin/parallel --shebang -r -j 8 --joblog logs/joblog_<id>.txt [wrapper] program {}
//! ```
//!
//! Every following line is the argument list for one job, substituted for
//! the `{}` placeholder.

use crate::config::ResolvedCommands;
use crate::error::{ManifestError, ManifestResult};
use std::path::{Path, PathBuf};

/// Placeholder the pool replaces with a job line
pub const PLACEHOLDER: &str = "{}";

/// Pool invocation recorded in the first manifest line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvocationTemplate {
    /// Absolute path of the worker pool command
    pub pool: PathBuf,

    /// Concurrent jobs
    pub jobs: usize,

    /// Job log written by the pool
    pub joblog: PathBuf,

    /// Optional wrapper followed by the processing program
    pub command: Vec<String>,
}

impl InvocationTemplate {
    pub fn new(commands: &ResolvedCommands, jobs: usize, joblog: &Path) -> Self {
        let command = commands
            .wrapper
            .iter()
            .chain(std::iter::once(&commands.program))
            .map(|p| p.display().to_string())
            .collect();

        Self {
            pool: commands.pool.clone(),
            jobs,
            joblog: joblog.to_path_buf(),
            command,
        }
    }

    /// Render the `#!` header line
    pub fn header_line(&self) -> String {
        format!(
            "#!{} --shebang -r -j {} --joblog {} {} {}",
            self.pool.display(),
            self.jobs,
            shell_words::quote(&self.joblog.display().to_string()),
            shell_words::join(&self.command),
            PLACEHOLDER
        )
    }

    /// Parse a header line read back from `path`
    pub fn parse(path: &Path, line: &str) -> ManifestResult<Self> {
        let invalid = |reason: &str| ManifestError::InvalidHeader {
            path: path.to_path_buf(),
            reason: reason.to_string(),
        };

        let body = line
            .strip_prefix("#!")
            .ok_or_else(|| ManifestError::MissingHeader {
                path: path.to_path_buf(),
            })?;
        let words = shell_words::split(body).map_err(|e| invalid(&e.to_string()))?;

        let (pool, rest) = words.split_first().ok_or_else(|| invalid("empty header"))?;
        let mut jobs = None;
        let mut joblog = None;
        let mut iter = rest.iter();
        let mut command = Vec::new();

        while let Some(word) = iter.next() {
            match word.as_str() {
                "--shebang" | "-r" => {}
                "-j" => {
                    let value = iter.next().ok_or_else(|| invalid("-j without a value"))?;
                    jobs = Some(
                        value
                            .parse::<usize>()
                            .map_err(|_| invalid("job count is not a number"))?,
                    );
                }
                "--joblog" => {
                    let value = iter
                        .next()
                        .ok_or_else(|| invalid("--joblog without a value"))?;
                    joblog = Some(PathBuf::from(value));
                }
                _ => {
                    command.push(word.clone());
                    command.extend(iter.by_ref().cloned());
                }
            }
        }

        if command.pop().as_deref() != Some(PLACEHOLDER) {
            return Err(invalid("command does not end with the {} placeholder"));
        }
        if command.is_empty() {
            return Err(invalid("no program in header"));
        }

        Ok(Self {
            pool: PathBuf::from(pool),
            jobs: jobs.ok_or_else(|| invalid("missing -j"))?,
            joblog: joblog.ok_or_else(|| invalid("missing --joblog"))?,
            command,
        })
    }

    /// Full argument vector for one job
    pub fn expand(&self, words: &[String]) -> Vec<String> {
        self.command.iter().chain(words).cloned().collect()
    }
}
