//! Batch promotion.
//!
//! Moves verified staged files into `<backup_root>/<engineer>/batch_<NN>_<timestamp>`.
//! `NN` is one more than the number of directories already under the
//! engineer's root. If an older batch was deleted by hand the count alone
//! would hand out a number that is still in use, so the highest existing
//! batch number is taken into account as well.
//!
//! Promotion is a sequence of individual moves and is not atomic: if a move
//! fails, files already moved stay in the batch and the rest stay staged.

use crate::checksums;
use crate::error::EngineError;
use crate::fs_ops;
use crate::model::basename;
use chrono::{DateTime, Local, TimeZone};
use std::fs;
use std::path::{Path, PathBuf};

/// Timestamp format of batch directory names (`YYYYMMDD_HH.MM`).
pub const BATCH_TIMESTAMP_FORMAT: &str = "%Y%m%d_%H.%M";

/// Directory name of batch `number` created at `timestamp`.
pub fn batch_dir_name<Tz: TimeZone>(number: usize, timestamp: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    format!("batch_{:02}_{}", number, timestamp.format(BATCH_TIMESTAMP_FORMAT))
}

/// Number the next batch under `engineer_root` would get.
pub fn next_batch_number(engineer_root: &Path) -> Result<usize, EngineError> {
    let entries = fs::read_dir(engineer_root).map_err(|e| EngineError::Enumeration {
        path: engineer_root.to_path_buf(),
        source: e,
    })?;

    let mut existing = 0;
    let mut highest = 0;
    for entry in entries {
        let entry = entry.map_err(|e| EngineError::Enumeration {
            path: engineer_root.to_path_buf(),
            source: e,
        })?;
        if entry.file_type().map(|t| t.is_dir()).unwrap_or(false) {
            existing += 1;
            if let Some(number) = parse_batch_number(&entry.file_name().to_string_lossy()) {
                highest = highest.max(number);
            }
        }
    }
    Ok(existing.max(highest) + 1)
}

/// The `NN` of a `batch_<NN>_<timestamp>` directory name.
fn parse_batch_number(name: &str) -> Option<usize> {
    name.strip_prefix("batch_")?.split('_').next()?.parse().ok()
}

/// Promote `staged_files` into a new batch stamped with the current local time.
pub fn promote(
    staged_files: &[PathBuf],
    backup_root: &Path,
    engineer: &str,
) -> Result<PathBuf, EngineError> {
    promote_at(staged_files, backup_root, engineer, &Local::now())
}

/// Promote `staged_files` into a new batch stamped with `timestamp`.
///
/// Each file's sidecar, when present, moves with it.
///
/// # Returns
/// Path of the new batch directory
pub fn promote_at<Tz: TimeZone>(
    staged_files: &[PathBuf],
    backup_root: &Path,
    engineer: &str,
    timestamp: &DateTime<Tz>,
) -> Result<PathBuf, EngineError>
where
    Tz::Offset: std::fmt::Display,
{
    let engineer_root = backup_root.join(engineer);
    if engineer_root.is_dir() {
        tracing::info!(directory = %engineer_root.display(), "engineer backup directory exists");
    } else {
        fs_ops::ensure_dir_exists(&engineer_root)?;
        tracing::info!(directory = %engineer_root.display(), "engineer backup directory created");
    }

    let number = next_batch_number(&engineer_root)?;
    let batch = engineer_root.join(batch_dir_name(number, timestamp));
    fs::create_dir(&batch).map_err(|e| EngineError::DirectoryCreation {
        path: batch.clone(),
        source: e,
    })?;
    tracing::info!(batch = %batch.display(), "batch directory created");

    for staged in staged_files {
        let target = batch.join(basename(staged));
        fs_ops::move_file(staged, &target)?;
        tracing::info!(file = %staged.display(), batch = %batch.display(), "moved to batch");

        let sidecar = checksums::sidecar_path(staged);
        if sidecar.is_file() {
            fs_ops::move_file(&sidecar, &checksums::sidecar_path(&target))?;
        }
    }

    Ok(batch)
}
