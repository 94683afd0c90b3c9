//! Staged backup workflow.
//!
//! Moves one engineer's session off a source drive:
//! staging copy with verification, sidecar purge, metadata rewrite with
//! fresh sidecars, access-copy transcoding, promotion into a new batch and a
//! final notification. Any failure after the staging area has been touched
//! clears it again before the error is returned.

use crate::batch;
use crate::checksums;
use crate::collaborators::{AccessTranscoder, MetadataRewriter, Notifier, Passthrough};
use crate::error::EngineError;
use crate::fs_ops;
use crate::model::{basename, StagingReport};
use crate::progress::ProgressCallback;
use crate::staging::{self, StagingArea, StagingSettings};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

/// Companion spreadsheet every session must carry.
pub const TRACKING_SHEET_SUFFIX: &str = "_TrackingSheet.xlsx";

/// Batch upload spreadsheet every session must carry.
pub const BATCH_UPLOAD_SUFFIX: &str = "_ExcelBatchUpload.xlsx";

/// Locations and rules for a staged backup.
#[derive(Debug, Clone)]
pub struct BackupSettings {
    pub staging_root: PathBuf,
    pub backup_root: PathBuf,
    pub staging: StagingSettings,
    /// File name suffixes that must each match at least one source file
    pub required_companions: Vec<String>,
}

impl BackupSettings {
    pub fn new(staging_root: impl Into<PathBuf>, backup_root: impl Into<PathBuf>) -> Self {
        BackupSettings {
            staging_root: staging_root.into(),
            backup_root: backup_root.into(),
            staging: StagingSettings::default(),
            required_companions: vec![
                TRACKING_SHEET_SUFFIX.to_string(),
                BATCH_UPLOAD_SUFFIX.to_string(),
            ],
        }
    }
}

/// Result of a completed backup.
#[derive(Debug, Clone, Serialize)]
pub struct BackupOutcome {
    pub engineer: String,
    pub batch: PathBuf,
    pub promoted: Vec<PathBuf>,
    pub staging: StagingReport,
    /// False when the notifier reported an error; the batch stands regardless
    pub notified: bool,
}

/// Runs staged backups with the configured collaborators.
pub struct BackupService<'a> {
    settings: BackupSettings,
    rewriter: &'a dyn MetadataRewriter,
    transcoder: &'a dyn AccessTranscoder,
    notifier: &'a dyn Notifier,
}

impl<'a> BackupService<'a> {
    /// A service with no-op collaborators.
    pub fn new(settings: BackupSettings) -> Self {
        BackupService {
            settings,
            rewriter: &Passthrough,
            transcoder: &Passthrough,
            notifier: &Passthrough,
        }
    }

    pub fn with_rewriter(mut self, rewriter: &'a dyn MetadataRewriter) -> Self {
        self.rewriter = rewriter;
        self
    }

    pub fn with_transcoder(mut self, transcoder: &'a dyn AccessTranscoder) -> Self {
        self.transcoder = transcoder;
        self
    }

    pub fn with_notifier(mut self, notifier: &'a dyn Notifier) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn settings(&self) -> &BackupSettings {
        &self.settings
    }

    pub fn staging_area(&self) -> StagingArea {
        StagingArea::new(&self.settings.staging_root)
    }

    /// Back up the files directly under `source_dir` for `engineer`.
    ///
    /// # Errors
    /// - `StructuralPrecondition` for a missing companion file or an empty source
    /// - `ChecksumVerificationFailed` when a staged copy does not verify
    /// - I/O errors, and rewriter or transcoder errors
    ///
    /// A notifier error does not fail the run: the batch is already promoted,
    /// so it is logged and reported through `BackupOutcome::notified`.
    /// The staging area is empty whenever an error is returned.
    pub fn run(
        &self,
        source_dir: &Path,
        engineer: &str,
        progress_callback: Option<&dyn ProgressCallback>,
    ) -> Result<BackupOutcome, EngineError> {
        fs_ops::validate_dir(source_dir)?;

        let staging = self.staging_area();
        staging.ensure_exists()?;
        staging.clear()?;

        let files = fs_ops::list_files(source_dir)?;
        staging::require_companions(&files, &self.settings.required_companions)?;

        let span = tracing::info_span!("backup", %engineer);
        let _guard = span.enter();

        let result = staging::copy_to_staging(
            &files,
            &staging,
            &self.settings.staging,
            progress_callback,
        )
        .and_then(|report| self.finish(&staging, engineer, report));

        if result.is_err() {
            discard(&staging);
        }
        result
    }

    /// Everything after a verified staging copy.
    fn finish(
        &self,
        staging: &StagingArea,
        engineer: &str,
        report: StagingReport,
    ) -> Result<BackupOutcome, EngineError> {
        let purged = checksums::purge_sidecars(staging.path())?;
        tracing::info!(count = purged, "removed staged checksums");

        let staged = staging.staged_files()?;
        for file in staged.iter().filter(|f| self.settings.staging.is_audio(f)) {
            self.rewriter.rewrite(file, engineer)?;
            checksums::generate_and_persist(file)?;
            tracing::info!(file = %file.display(), "checksum regenerated after metadata rewrite");
        }

        for file in staged.iter().filter(|f| self.settings.staging.is_audio(f)) {
            self.transcoder.transcode(file, staging.path())?;
        }

        let batch = batch::promote(&staged, &self.settings.backup_root, engineer)?;
        tracing::info!(batch = %batch.display(), files = staged.len(), "batch promoted");

        let tracking_sheet = staged
            .iter()
            .map(|f| basename(f))
            .find(|name| name.ends_with(TRACKING_SHEET_SUFFIX));
        let notified = match self.notifier.notify(engineer, &batch, tracking_sheet.as_deref()) {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(batch = %batch.display(), error = %e, "notification failed");
                false
            }
        };

        let promoted = staged
            .iter()
            .map(|f| batch.join(basename(f)))
            .collect();

        Ok(BackupOutcome {
            engineer: engineer.to_string(),
            batch,
            promoted,
            staging: report,
            notified,
        })
    }
}

/// Clear staging after a failed run. A failure here is only logged so the
/// error that ended the run is the one returned.
fn discard(staging: &StagingArea) {
    match staging.clear() {
        Ok(count) => tracing::warn!(count, "staging area cleared after failed run"),
        Err(e) => tracing::error!(error = %e, "could not clear staging area"),
    }
}

/// Find the engineer directory under `source_root`.
///
/// Returns the roster spelling of the first subdirectory whose name matches a
/// roster entry case-insensitively, together with that directory.
///
/// # Errors
/// `StructuralPrecondition` when `source_root` has no subdirectories or none
/// of them belongs to a known engineer.
pub fn resolve_engineer(
    source_root: &Path,
    roster: &[String],
) -> Result<(String, PathBuf), EngineError> {
    fs_ops::validate_dir(source_root)?;

    let entries = fs::read_dir(source_root).map_err(|e| EngineError::Enumeration {
        path: source_root.to_path_buf(),
        source: e,
    })?;

    let mut directories = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| EngineError::Enumeration {
            path: source_root.to_path_buf(),
            source: e,
        })?;
        if entry.file_type().map(|t| t.is_dir()).unwrap_or(false) {
            directories.push(entry.path());
        }
    }
    directories.sort();

    if directories.is_empty() {
        return Err(EngineError::precondition(format!(
            "no engineer directory under {}",
            source_root.display()
        )));
    }

    for directory in directories {
        let name = basename(&directory).to_lowercase();
        if let Some(engineer) = roster.iter().find(|e| e.to_lowercase() == name) {
            tracing::info!(%engineer, directory = %directory.display(), "engineer identified");
            return Ok((engineer.clone(), directory));
        }
    }

    Err(EngineError::precondition(format!(
        "no directory under {} matches a known engineer",
        source_root.display()
    )))
}
