//! Progress reporting for capture-queue
//!
//! Provides a live spinner while jobs are produced and run, and the
//! header/summary printed around a run.

use crate::dispatch::{DispatchProgress, RunSummary};
use crate::plan::PlanStats;
use console::style;
use humansize::{format_size, BINARY};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use std::time::Duration;

/// Spinner showing dispatch counters
pub struct ProgressReporter {
    bar: ProgressBar,
}

impl ProgressReporter {
    pub fn new() -> Self {
        let bar = ProgressBar::new_spinner();

        let style = ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed_precise}] {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏");
        bar.set_style(style);
        bar.enable_steady_tick(Duration::from_millis(100));

        Self { bar }
    }

    /// Update the progress display
    pub fn update(&self, progress: &DispatchProgress) {
        let msg = if progress.running > 0 || progress.succeeded > 0 || progress.failed > 0 {
            format!(
                "Jobs: {} | Queued: {} | Running: {} | Done: {} | Failed: {}",
                format_number(progress.emitted),
                progress.queued,
                progress.running,
                format_number(progress.succeeded),
                format_number(progress.failed),
            )
        } else {
            format!("Jobs: {}", format_number(progress.emitted))
        };

        self.bar.set_message(msg);
    }

    /// Set a status message
    pub fn set_status(&self, status: &str) {
        self.bar.set_message(status.to_string());
    }

    /// Finish the progress display with a final message
    pub fn finish(&self, message: &str) {
        self.bar.finish_with_message(message.to_string());
    }
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new()
    }
}

/// Format a number with thousands separators
pub fn format_number(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);

    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

/// Print a header at the start of a run
pub fn print_header(source: &Path, destination: &Path, mode: &str, manifest: &Path) {
    println!();
    println!(
        "{} {}",
        style("capture-queue").cyan().bold(),
        env!("CARGO_PKG_VERSION")
    );
    println!("{}", style("─".repeat(50)).dim());
    println!("  {} {}", style("Source:").bold(), source.display());
    println!("  {} {}", style("Destination:").bold(), destination.display());
    println!("  {} {}", style("Mode:").bold(), mode);
    println!("  {} {}", style("Manifest:").bold(), manifest.display());
    println!();
}

/// Print a summary of a run
pub fn print_summary(summary: &RunSummary, plan: Option<&PlanStats>) {
    let title = if summary.interrupted {
        style("Run Interrupted").yellow().bold()
    } else {
        style("Run Complete").green().bold()
    };

    println!();
    println!("{}", title);
    println!("{}", style("─".repeat(50)).dim());

    if let Some(plan) = plan {
        println!(
            "  {} {}",
            style("Timestamps:").bold(),
            format_number(plan.timestamps_seen())
        );
        if plan.skipped_complete() > 0 {
            println!(
                "  {} {}",
                style("Already done:").bold(),
                format_number(plan.skipped_complete())
            );
        }
        if plan.skipped_incomplete() > 0 {
            println!(
                "  {} {}",
                style("Incomplete:").yellow().bold(),
                format_number(plan.skipped_incomplete())
            );
        }
        if plan.truncated_files() > 0 {
            println!(
                "  {} {} files",
                style("Truncated:").yellow().bold(),
                format_number(plan.truncated_files())
            );
        }
    }

    println!("  {} {}", style("Jobs:").bold(), format_number(summary.jobs_emitted));
    if summary.jobs_skipped > 0 {
        println!(
            "  {} {}",
            style("Skipped:").bold(),
            format_number(summary.jobs_skipped)
        );
    }
    if summary.executed {
        println!(
            "  {} {}",
            style("Succeeded:").bold(),
            format_number(summary.succeeded)
        );
        let failed = summary.failed + summary.not_started;
        if failed > 0 {
            println!("  {} {}", style("Failed:").red().bold(), format_number(failed));
        }
        if summary.queue_waits > 0 {
            println!(
                "  {} {} (producer waited on a full queue)",
                style("Queue waits:").bold(),
                format_number(summary.queue_waits)
            );
        }
    }
    println!(
        "  {} {:.1}s",
        style("Duration:").bold(),
        summary.duration.as_secs_f64()
    );
    if let Some(manifest) = &summary.manifest {
        println!(
            "  {} {} ({}, {} jobs)",
            style("Manifest:").bold(),
            manifest.path.display(),
            format_size(manifest.size_bytes, BINARY),
            format_number(manifest.existing_jobs + manifest.lines_written)
        );
    }
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(0), "0");
        assert_eq!(format_number(999), "999");
        assert_eq!(format_number(1000), "1,000");
        assert_eq!(format_number(1234567), "1,234,567");
        assert_eq!(format_number(1234567890), "1,234,567,890");
    }
}
