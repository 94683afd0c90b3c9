//! Core data model for sync and staging runs.
//!
//! This module defines the values that flow between the components:
//! - FileRecord: one file of a scanned tree (relative path + size)
//! - DiffResult: the New / Changed / Removed classification of two scans
//! - FailedFileSet: basenames whose checksum verification failed in a run
//! - FileOutcome, CommitReport, StagingReport: per-file and per-run results

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// A single regular file found by a tree scan.
///
/// Identity is `relative_path`; a scan never yields the same path twice.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct FileRecord {
    /// Path relative to the scanned root
    pub relative_path: PathBuf,

    /// File size in bytes
    pub size: u64,
}

impl FileRecord {
    pub fn new(relative_path: impl Into<PathBuf>, size: u64) -> Self {
        FileRecord {
            relative_path: relative_path.into(),
            size,
        }
    }

    /// Final path component as a string, used for FailedFileSet entries.
    pub fn basename(&self) -> String {
        basename(&self.relative_path)
    }
}

/// Result of classifying a source scan against a destination scan.
///
/// The three sequences are disjoint. Any path absent from all three is
/// unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DiffResult {
    /// In source only
    pub new: Vec<FileRecord>,
    /// In both, sizes differ (carries the source record)
    pub changed: Vec<FileRecord>,
    /// In destination only
    pub removed: Vec<FileRecord>,
}

impl DiffResult {
    /// True when source and destination agree on every path and size.
    pub fn is_empty(&self) -> bool {
        self.new.is_empty() && self.changed.is_empty() && self.removed.is_empty()
    }

    /// Total number of paths needing an operation.
    pub fn len(&self) -> usize {
        self.new.len() + self.changed.len() + self.removed.len()
    }

    /// Bytes that a commit will copy (new + changed).
    pub fn bytes_to_copy(&self) -> u64 {
        self.new.iter().chain(&self.changed).map(|r| r.size).sum()
    }
}

impl fmt::Display for DiffResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sections = [
            ("New Files", &self.new),
            ("Changed Files", &self.changed),
            ("Removed Files", &self.removed),
        ];
        for (i, (title, records)) in sections.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            writeln!(f, "{}: {}", title, records.len())?;
            for record in records.iter() {
                writeln!(f, " * {}", record.relative_path.display())?;
            }
        }
        Ok(())
    }
}

/// The commit phases, in the order they are applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Phase {
    New,
    Changed,
    Removed,
    /// Copy into the staging area
    Staging,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::New => write!(f, "new"),
            Phase::Changed => write!(f, "changed"),
            Phase::Removed => write!(f, "removed"),
            Phase::Staging => write!(f, "staging"),
        }
    }
}

/// Why a single file did not make it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum FailureReason {
    /// The transferred copy does not match its sidecar
    ChecksumMismatch { expected: String, actual: String },
    /// A filesystem operation on this file failed
    Io { message: String },
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::ChecksumMismatch { expected, actual } => {
                write!(f, "checksum mismatch (expected {}, got {})", expected, actual)
            }
            FailureReason::Io { message } => write!(f, "{}", message),
        }
    }
}

/// Terminal status of one file in a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum FileStatus {
    /// Copied; no sidecar was available to verify against
    Transferred,
    /// Copied and verified against its sidecar
    Verified,
    /// Deleted from the destination
    Removed,
    /// Not transferred (or quarantined after transfer)
    Failed(FailureReason),
}

impl FileStatus {
    pub fn is_failure(&self) -> bool {
        matches!(self, FileStatus::Failed(_))
    }
}

/// Outcome of a single file operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileOutcome {
    pub relative_path: PathBuf,
    pub phase: Phase,
    pub status: FileStatus,
}

/// Basenames of files whose checksum verification failed during a run.
///
/// Ordered so reports and error messages are stable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FailedFileSet {
    files: BTreeSet<String>,
}

impl FailedFileSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a failed basename. Returns false if it was already present.
    pub fn insert(&mut self, basename: impl Into<String>) -> bool {
        self.files.insert(basename.into())
    }

    pub fn contains(&self, basename: &str) -> bool {
        self.files.contains(basename)
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.files.iter().map(String::as_str)
    }

    pub fn to_vec(&self) -> Vec<String> {
        self.files.iter().cloned().collect()
    }
}

/// Per-phase counters of a commit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PhaseCounts {
    /// Files that reached the destination (and stayed there)
    pub succeeded: usize,
    /// Files that failed or were quarantined
    pub failed: usize,
}

/// Report returned by a mirror commit.
#[derive(Debug, Clone, Serialize)]
pub struct CommitReport {
    /// Identifier of this run, also attached to its log span
    pub id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub new: PhaseCounts,
    pub changed: PhaseCounts,
    pub removed: PhaseCounts,
    /// Basenames whose checksum verification failed
    pub failed: FailedFileSet,
    /// One entry per file touched, in processing order
    pub outcomes: Vec<FileOutcome>,
    /// Set when the run stopped early on a cancellation request
    pub cancelled: bool,
    pub bytes_copied: u64,
}

impl CommitReport {
    pub(crate) fn new() -> Self {
        CommitReport {
            id: Uuid::new_v4(),
            started_at: Utc::now(),
            finished_at: None,
            new: PhaseCounts::default(),
            changed: PhaseCounts::default(),
            removed: PhaseCounts::default(),
            failed: FailedFileSet::new(),
            outcomes: Vec::new(),
            cancelled: false,
            bytes_copied: 0,
        }
    }

    /// Record an outcome and bump the matching phase counter.
    pub(crate) fn record(&mut self, outcome: FileOutcome) {
        let counts = match outcome.phase {
            Phase::New => Some(&mut self.new),
            Phase::Changed => Some(&mut self.changed),
            Phase::Removed => Some(&mut self.removed),
            Phase::Staging => None,
        };
        if let Some(counts) = counts {
            if outcome.status.is_failure() {
                counts.failed += 1;
            } else {
                counts.succeeded += 1;
            }
        }
        self.outcomes.push(outcome);
    }

    /// All outcomes that ended in failure.
    pub fn failures(&self) -> impl Iterator<Item = &FileOutcome> {
        self.outcomes.iter().filter(|o| o.status.is_failure())
    }

    pub fn has_failures(&self) -> bool {
        self.failures().next().is_some()
    }
}

/// Report returned by a successful staging copy.
#[derive(Debug, Clone, Serialize)]
pub struct StagingReport {
    pub id: Uuid,
    /// Primary files now in staging (sidecars excluded)
    pub staged: Vec<PathBuf>,
    /// Audio files whose staged copy matched its sidecar
    pub verified: usize,
    /// Sidecars written next to source files that had none
    pub sidecars_generated: usize,
    pub bytes_copied: u64,
}

/// Final path component of `path` as a lossy string.
pub fn basename(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}
