//! archive-transfer - Command-line interface for the archive transfer engine.
//!
//! Two subcommands: `mirror` keeps an engineer's mirror in step with their
//! drive, `backup` moves a session through staging into a new batch.
//! Progress goes to stderr, plans and summaries to stdout.

mod config;
mod logging;

use anyhow::{bail, Context};
use clap::{ArgGroup, Parser, Subcommand};
use config::Config;
use engine::{
    backup::{resolve_engineer, BackupOutcome, BackupService, BackupSettings},
    mirror::Mirror,
    model::{CommitReport, FileOutcome, FileStatus, Phase},
    progress::ProgressCallback,
    staging::StagingSettings,
    EngineError,
};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// archive-transfer - Move recording sessions into the archive
#[derive(Parser, Debug)]
#[command(name = "archive-transfer")]
#[command(version = "0.1.0")]
#[command(about = "Mirror engineer drives and back up sessions with MD5 verification")]
struct Args {
    /// TOML configuration file
    #[arg(long, value_name = "PATH", global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Bring <mirror_root>/<engineer> in line with a source drive
    Mirror {
        /// Source directory
        #[arg(long, value_name = "PATH")]
        source: PathBuf,

        /// Engineer whose mirror is updated
        #[arg(long)]
        engineer: String,

        /// Mirror root (overrides paths.mirror_root)
        #[arg(long, value_name = "PATH")]
        mirror_root: Option<PathBuf>,

        /// Show the plan without copying anything
        #[arg(long)]
        dry_run: bool,
    },

    /// Copy a session through staging into a new batch
    #[command(group(ArgGroup::new("input").required(true).args(["source_root", "source"])))]
    Backup {
        /// Drive root holding one directory per engineer
        #[arg(long, value_name = "PATH")]
        source_root: Option<PathBuf>,

        /// Session directory (requires --engineer)
        #[arg(long, value_name = "PATH", requires = "engineer")]
        source: Option<PathBuf>,

        /// Engineer the session belongs to
        #[arg(long, requires = "source")]
        engineer: Option<String>,

        /// Staging area (overrides paths.staging_root)
        #[arg(long, value_name = "PATH")]
        staging_root: Option<PathBuf>,

        /// Batch archive root (overrides paths.backup_root)
        #[arg(long, value_name = "PATH")]
        backup_root: Option<PathBuf>,
    },
}

/// How a run that did not error ended.
#[derive(Debug, PartialEq, Eq)]
enum RunStatus {
    Clean,
    /// Some files failed to transfer or verify
    FilesFailed,
    /// Stopped on Ctrl+C before every file was handled
    Cancelled,
}

/// CLI implementation of ProgressCallback for displaying transfer progress
struct CliProgress {
    verbose: bool,
    start_time: Instant,
    cancel: Arc<AtomicBool>,
}

impl CliProgress {
    fn new(verbose: bool, cancel: Arc<AtomicBool>) -> Self {
        CliProgress {
            verbose,
            start_time: Instant::now(),
            cancel,
        }
    }

    fn format_bytes(bytes: u64) -> String {
        const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
        let mut size = bytes as f64;
        let mut unit_idx = 0;

        while size >= 1024.0 && unit_idx < UNITS.len() - 1 {
            size /= 1024.0;
            unit_idx += 1;
        }

        format!("{:.2} {}", size, UNITS[unit_idx])
    }

    fn format_duration(elapsed: std::time::Duration) -> String {
        let secs = elapsed.as_secs();
        let hours = secs / 3600;
        let mins = (secs % 3600) / 60;
        let secs = secs % 60;

        if hours > 0 {
            format!("{}h {}m {}s", hours, mins, secs)
        } else if mins > 0 {
            format!("{}m {}s", mins, secs)
        } else {
            format!("{}s", secs)
        }
    }

    fn status_label(status: &FileStatus) -> &'static str {
        match status {
            FileStatus::Transferred => "Copied",
            FileStatus::Verified => "Verified",
            FileStatus::Removed => "Removed",
            FileStatus::Failed(_) => "Failed",
        }
    }

    fn print_commit_summary(&self, report: &CommitReport) {
        eprintln!();
        if report.cancelled {
            eprintln!("Mirror cancelled.");
        } else {
            eprintln!("Mirror complete!");
        }
        eprintln!(
            "Summary: new {} ok / {} failed, changed {} ok / {} failed, removed {} ok / {} failed",
            report.new.succeeded,
            report.new.failed,
            report.changed.succeeded,
            report.changed.failed,
            report.removed.succeeded,
            report.removed.failed
        );
        eprintln!("Bytes copied: {}", Self::format_bytes(report.bytes_copied));
        eprintln!("Elapsed: {}", Self::format_duration(self.start_time.elapsed()));

        if report.has_failures() {
            eprintln!();
            eprintln!("Failed files:");
            for outcome in report.failures() {
                if let FileStatus::Failed(reason) = &outcome.status {
                    eprintln!("  {}: {}", outcome.relative_path.display(), reason);
                }
            }
        }
    }

    fn print_backup_summary(&self, outcome: &BackupOutcome) {
        eprintln!();
        eprintln!("Backup complete!");
        eprintln!(
            "Summary: {} files promoted, {} audio files verified, {} checksums generated at source",
            outcome.promoted.len(),
            outcome.staging.verified,
            outcome.staging.sidecars_generated
        );
        eprintln!(
            "Bytes copied: {}",
            Self::format_bytes(outcome.staging.bytes_copied)
        );
        eprintln!("Elapsed: {}", Self::format_duration(self.start_time.elapsed()));
        if !outcome.notified {
            eprintln!("Warning: the batch was promoted but the notification failed");
        }
    }
}

impl ProgressCallback for CliProgress {
    fn on_phase_started(&self, phase: Phase, total: usize) {
        if total > 0 || self.verbose {
            eprintln!("Processing {} files: {}", phase, total);
        }
    }

    fn on_file_started(&self, _phase: Phase, index: usize, path: &Path) {
        if self.verbose {
            eprintln!("[{:3}] Starting: {}", index, path.display());
        }
    }

    fn on_file_completed(&self, index: usize, outcome: &FileOutcome) {
        match &outcome.status {
            FileStatus::Failed(reason) => {
                eprintln!(
                    "[{:3}] Failed: {} ({})",
                    index,
                    outcome.relative_path.display(),
                    reason
                );
            }
            status if self.verbose => {
                eprintln!(
                    "[{:3}] {}: {}",
                    index,
                    Self::status_label(status),
                    outcome.relative_path.display()
                );
            }
            _ => {}
        }
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }
}

/// Set `cancel` on the first Ctrl+C; a second one exits immediately.
fn install_cancel_handler(cancel: Arc<AtomicBool>) -> anyhow::Result<()> {
    ctrlc::set_handler(move || {
        if cancel.swap(true, Ordering::SeqCst) {
            std::process::exit(130);
        }
        eprintln!();
        eprintln!("Stopping after the current file (Ctrl+C again to abort)...");
    })
    .context("Failed to install Ctrl+C handler")
}

/// Parse arguments, load configuration and logging, then run the command
fn main() {
    let args = Args::parse();

    let config = match Config::load(args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(2);
        }
    };

    let level = if args.verbose {
        "debug"
    } else {
        config.log.level.as_str()
    };
    match logging::init(level, config.log.directory.as_deref()) {
        Ok(Some(path)) => tracing::info!(log_file = %path.display(), "logging to file"),
        Ok(None) => {}
        Err(e) => eprintln!("Warning: {:#}", e),
    }

    // Only mirror commits stop between files; a backup keeps the default Ctrl+C
    let cancel = Arc::new(AtomicBool::new(false));
    if matches!(args.command, Command::Mirror { .. }) {
        if let Err(e) = install_cancel_handler(Arc::clone(&cancel)) {
            tracing::warn!(error = %format!("{:#}", e), "mirror cannot be cancelled");
        }
    }

    let result = run_cli(&args, &config, &cancel);
    if let Err(e) = &result {
        eprintln!("Error: {:#}", e);
    }
    std::process::exit(exit_code(&result));
}

/// 0 for a clean run, 1 when files failed to transfer or verify, 2 otherwise
/// (including a cancelled mirror with no failed files).
fn exit_code(result: &anyhow::Result<RunStatus>) -> i32 {
    match result {
        Ok(RunStatus::Clean) => 0,
        Ok(RunStatus::FilesFailed) => 1,
        Ok(RunStatus::Cancelled) => 2,
        Err(e) => match e.downcast_ref::<EngineError>() {
            Some(EngineError::ChecksumVerificationFailed { .. }) => 1,
            _ => 2,
        },
    }
}

/// Main CLI logic - separated for testability
fn run_cli(args: &Args, config: &Config, cancel: &Arc<AtomicBool>) -> anyhow::Result<RunStatus> {
    match &args.command {
        Command::Mirror {
            source,
            engineer,
            mirror_root,
            dry_run,
        } => {
            let mirror_root = mirror_root
                .clone()
                .or_else(|| config.paths.mirror_root.clone())
                .context("No mirror root: pass --mirror-root or set paths.mirror_root")?;
            let engineer = config.engineer_spelling(engineer).unwrap_or(engineer);
            let progress = CliProgress::new(args.verbose, Arc::clone(cancel));
            run_mirror(source, &mirror_root, engineer, *dry_run, &progress)
        }
        Command::Backup {
            source_root,
            source,
            engineer,
            staging_root,
            backup_root,
        } => {
            let (engineer, source) = match (source_root, source, engineer) {
                (Some(root), _, _) => {
                    if config.backup.engineers.is_empty() {
                        bail!("--source-root needs backup.engineers in the configuration");
                    }
                    resolve_engineer(root, &config.backup.engineers)?
                }
                (None, Some(source), Some(engineer)) => {
                    let engineer = config.engineer_spelling(engineer).unwrap_or(engineer);
                    (engineer.to_string(), source.clone())
                }
                _ => bail!("Pass --source-root, or --source together with --engineer"),
            };

            let staging_root = staging_root
                .clone()
                .or_else(|| config.paths.staging_root.clone())
                .context("No staging area: pass --staging-root or set paths.staging_root")?;
            let backup_root = backup_root
                .clone()
                .or_else(|| config.paths.backup_root.clone())
                .context("No backup root: pass --backup-root or set paths.backup_root")?;

            let settings = BackupSettings {
                staging: StagingSettings {
                    audio_extensions: config.backup.audio_extensions.clone(),
                },
                required_companions: config.backup.required_companions.clone(),
                ..BackupSettings::new(staging_root, backup_root)
            };
            let progress = CliProgress::new(args.verbose, Arc::clone(cancel));
            run_backup(settings, &source, &engineer, &progress)
        }
    }
}

fn run_mirror(
    source: &Path,
    mirror_root: &Path,
    engineer: &str,
    dry_run: bool,
    progress: &CliProgress,
) -> anyhow::Result<RunStatus> {
    let mirror = Mirror::new(source, mirror_root, engineer);
    eprintln!("Mirroring {} to {}", source.display(), mirror.destination().display());

    let plan = mirror.plan().context("Mirror planning failed")?;
    println!("{}", plan);

    if dry_run {
        return Ok(RunStatus::Clean);
    }
    if plan.is_empty() {
        eprintln!("Mirror is up to date.");
        return Ok(RunStatus::Clean);
    }

    let report = mirror
        .commit(&plan, Some(progress))
        .context("Mirror commit failed")?;
    progress.print_commit_summary(&report);

    if report.has_failures() {
        Ok(RunStatus::FilesFailed)
    } else if report.cancelled {
        Ok(RunStatus::Cancelled)
    } else {
        Ok(RunStatus::Clean)
    }
}

fn run_backup(
    settings: BackupSettings,
    source: &Path,
    engineer: &str,
    progress: &CliProgress,
) -> anyhow::Result<RunStatus> {
    eprintln!("Backing up {} for {}", source.display(), engineer);

    let service = BackupService::new(settings);
    let outcome = service.run(source, engineer, Some(progress))?;

    progress.print_backup_summary(&outcome);
    println!("{}", outcome.batch.display());
    Ok(RunStatus::Clean)
}
