//! capture-queue - Resumable post-processing queue for multi-camera captures
//!
//! Entry point for the CLI application.

use anyhow::{Context, Result};
use capture_queue::config::{CliArgs, Command, DispatchMode, RunConfig, MAX_JOBS};
use capture_queue::dispatch::{replay_manifest, Dispatcher, ReplayOptions, RunSummary};
use capture_queue::error::{ConfigError, QueueError};
use capture_queue::manifest::InvocationTemplate;
use capture_queue::plan::Planner;
use capture_queue::progress::{print_header, print_summary, ProgressReporter};
use clap::Parser;
use std::io::{self, Write};
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    let args = match CliArgs::try_parse() {
        Ok(args) => args,
        Err(e) => {
            let _ = e.print();
            // --help and --version are not failures
            return if e.use_stderr() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(args: CliArgs) -> Result<()> {
    match args.command.clone() {
        Some(Command::Replay {
            manifest,
            jobs,
            joblog,
            log_dir,
            quiet,
            verbose,
        }) => {
            setup_logging(verbose)?;
            let options = ReplayOptions {
                manifest_path: manifest,
                jobs,
                joblog,
                log_dir,
            };
            run_replay(options, !quiet)
        }
        None => {
            setup_logging(args.verbose)?;
            run_generate(args)
        }
    }
}

/// Scan, plan and dispatch a new (or resumed) run
fn run_generate(args: CliArgs) -> Result<()> {
    let config = Arc::new(RunConfig::from_args(args).context("Invalid configuration")?);
    let commands = config
        .check_prerequisites()
        .context("Prerequisite check failed")?;

    let planner = Planner::new(Arc::clone(&config)).context("Failed to scan capture")?;

    if config.dry_run {
        let mut out = io::stdout().lock();
        for job in planner.jobs() {
            writeln!(out, "{}", job)?;
        }
        return Ok(());
    }

    config
        .ensure_log_dir()
        .with_context(|| format!("Failed to create {}", config.log_dir.display()))?;

    let template = InvocationTemplate::new(&commands, config.jobs, &config.joblog_path);

    if config.show_progress {
        let mode = match config.dispatch {
            DispatchMode::PersistOnly => "manifest only".to_string(),
            DispatchMode::Queue => format!("queue, {} jobs", config.jobs),
        };
        print_header(
            &config.source_root,
            &config.destination_root,
            &mode,
            &config.manifest_path,
        );
    }

    let dispatcher = Dispatcher::new(Arc::clone(&config), template);
    install_signal_handler(dispatcher.shutdown_flag())?;

    let progress = config.show_progress.then(ProgressReporter::new);
    if let Some(p) = &progress {
        p.set_status("Planning jobs...");
    }

    let summary = dispatcher
        .run(planner.jobs(), |update| {
            if let Some(p) = &progress {
                p.update(update);
            }
        })
        .context("Dispatch failed")?;

    finish(progress.as_ref(), &summary);
    if config.show_progress {
        print_summary(&summary, Some(&planner.stats()));
    }

    check_summary(&summary)
}

/// Run an existing manifest through the in-process pool
fn run_replay(options: ReplayOptions, show_progress: bool) -> Result<()> {
    if let Some(jobs) = options.jobs {
        if jobs == 0 || jobs > MAX_JOBS {
            return Err(ConfigError::InvalidJobCount {
                count: jobs,
                max: MAX_JOBS,
            })
            .context("Invalid configuration");
        }
    }
    std::fs::create_dir_all(&options.log_dir)
        .with_context(|| format!("Failed to create {}", options.log_dir.display()))?;

    let shutdown = Arc::new(AtomicBool::new(false));
    install_signal_handler(Arc::clone(&shutdown))?;

    let progress = show_progress.then(ProgressReporter::new);
    let summary = replay_manifest(&options, shutdown, |update| {
        if let Some(p) = &progress {
            p.update(update);
        }
    })
    .with_context(|| format!("Replay of {} failed", options.manifest_path.display()))?;

    finish(progress.as_ref(), &summary);
    if show_progress {
        print_summary(&summary, None);
    }

    check_summary(&summary)
}

fn install_signal_handler(shutdown: Arc<AtomicBool>) -> Result<()> {
    ctrlc::set_handler(move || {
        eprintln!("\nInterrupt received, finishing running jobs...");
        shutdown.store(true, Ordering::SeqCst);
    })
    .context("Failed to set signal handler")
}

fn finish(progress: Option<&ProgressReporter>, summary: &RunSummary) {
    if let Some(p) = progress {
        if summary.interrupted {
            p.finish("Run interrupted");
        } else {
            p.finish("Run completed");
        }
    }
}

fn check_summary(summary: &RunSummary) -> Result<()> {
    if summary.interrupted {
        info!(jobs = summary.jobs_emitted, "Run was interrupted before completion");
        return Err(QueueError::Interrupted.into());
    }

    // Job failures are recorded in the job log; they do not fail the run
    let failed = summary.failed + summary.not_started;
    if failed > 0 {
        warn!(failed, jobs = summary.jobs_emitted, "Some jobs failed, see the job log");
    }
    Ok(())
}

fn setup_logging(verbose: bool) -> Result<()> {
    let filter = if verbose {
        EnvFilter::new("capture_queue=debug,warn")
    } else {
        EnvFilter::new("capture_queue=info,warn")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    Ok(())
}
