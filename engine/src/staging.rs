//! Staged copy into a transient holding area.
//!
//! Files leave the source drive through a single flat staging directory.
//! Audio files are copied together with their sidecar (generated at the
//! source when missing) and the staged copy is verified against it. Nothing
//! is promoted unless every audio file verified; on failure the caller
//! clears the staging area so no partial state survives into the next run.

use crate::checksums::{self, Verification};
use crate::error::EngineError;
use crate::fs_ops;
use crate::model::{basename, FailedFileSet, FailureReason, FileOutcome, FileStatus, Phase, StagingReport};
use crate::progress::ProgressCallback;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Which files the staging copy treats as audio.
#[derive(Debug, Clone)]
pub struct StagingSettings {
    /// Extensions (without the dot, compared case-insensitively) of files
    /// that must carry a verified sidecar
    pub audio_extensions: Vec<String>,
}

impl Default for StagingSettings {
    fn default() -> Self {
        StagingSettings {
            audio_extensions: vec!["wav".to_string()],
        }
    }
}

impl StagingSettings {
    pub fn is_audio(&self, path: &Path) -> bool {
        match path.extension() {
            Some(ext) => self
                .audio_extensions
                .iter()
                .any(|audio| ext.eq_ignore_ascii_case(audio.as_str())),
            None => false,
        }
    }
}

/// The staging directory.
#[derive(Debug, Clone)]
pub struct StagingArea {
    root: PathBuf,
}

impl StagingArea {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        StagingArea { root: root.into() }
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    /// Create the staging directory if it is missing.
    pub fn ensure_exists(&self) -> Result<(), EngineError> {
        fs_ops::ensure_dir_exists(&self.root)
    }

    /// True when no regular file sits directly in the staging directory.
    pub fn is_empty(&self) -> Result<bool, EngineError> {
        Ok(fs_ops::list_files(&self.root)?.is_empty())
    }

    /// Delete every file directly in the staging directory.
    ///
    /// Returns the number of files removed.
    pub fn clear(&self) -> Result<usize, EngineError> {
        let files = fs_ops::list_files(&self.root)?;
        if files.is_empty() {
            tracing::info!(staging = %self.root.display(), "staging area clear");
            return Ok(0);
        }

        tracing::warn!(staging = %self.root.display(), count = files.len(), "files found in staging area");
        for file in &files {
            fs_ops::remove_file(file)?;
            tracing::warn!(file = %file.display(), "removed from staging area");
        }
        Ok(files.len())
    }

    /// Staged primary files (sidecars excluded), sorted.
    pub fn staged_files(&self) -> Result<Vec<PathBuf>, EngineError> {
        Ok(fs_ops::list_files(&self.root)?
            .into_iter()
            .filter(|f| !checksums::is_sidecar(f))
            .collect())
    }
}

/// Check that for every required suffix some file name ends with it.
///
/// # Errors
/// `StructuralPrecondition` naming the first suffix nothing matches.
pub fn require_companions(files: &[PathBuf], suffixes: &[String]) -> Result<(), EngineError> {
    for suffix in suffixes {
        if !files.iter().any(|f| basename(f).ends_with(suffix.as_str())) {
            tracing::warn!(%suffix, "required companion file missing");
            return Err(EngineError::precondition(format!(
                "required companion file *{} is missing from the source",
                suffix
            )));
        }
    }
    Ok(())
}

/// Copy `files` into `staging`, generating and verifying audio sidecars.
///
/// Sidecars in `files` are skipped; they travel with their audio file.
///
/// # Errors
/// - `StructuralPrecondition` when there is nothing to copy, two files share a
///   name, or staging already holds files
/// - I/O errors abort immediately
/// - `ChecksumVerificationFailed` once every file has been processed, if any
///   staged audio copy failed verification
pub fn copy_to_staging(
    files: &[PathBuf],
    staging: &StagingArea,
    settings: &StagingSettings,
    progress_callback: Option<&dyn ProgressCallback>,
) -> Result<StagingReport, EngineError> {
    let primaries: Vec<&PathBuf> = files.iter().filter(|f| !checksums::is_sidecar(f)).collect();
    if primaries.is_empty() {
        return Err(EngineError::precondition("no files to copy to staging"));
    }

    let mut names = HashSet::new();
    for file in &primaries {
        if !names.insert(basename(file)) {
            return Err(EngineError::precondition(format!(
                "more than one file is named {} and staging is flat",
                basename(file)
            )));
        }
    }

    staging.ensure_exists()?;
    if !staging.is_empty()? {
        return Err(EngineError::precondition(format!(
            "staging area {} is not empty",
            staging.path().display()
        )));
    }

    let mut report = StagingReport {
        id: Uuid::new_v4(),
        staged: Vec::with_capacity(primaries.len()),
        verified: 0,
        sidecars_generated: 0,
        bytes_copied: 0,
    };
    let span = tracing::info_span!("staging", run = %report.id);
    let _guard = span.enter();

    let mut failed = FailedFileSet::new();

    if let Some(callback) = progress_callback {
        callback.on_phase_started(Phase::Staging, primaries.len());
    }

    for (index, file) in primaries.into_iter().enumerate() {
        let name = basename(file);
        let staged = staging.path().join(&name);

        if let Some(callback) = progress_callback {
            callback.on_file_started(Phase::Staging, index, file);
        }

        let status = if settings.is_audio(file) {
            stage_audio(file, &staged, &mut report, &mut failed)?
        } else {
            report.bytes_copied += fs_ops::copy_file_with_metadata(file, &staged)?;
            tracing::info!(file = %file.display(), "copied to staging area");
            FileStatus::Transferred
        };
        report.staged.push(staged);

        if let Some(callback) = progress_callback {
            let outcome = FileOutcome {
                relative_path: PathBuf::from(name),
                phase: Phase::Staging,
                status,
            };
            callback.on_file_completed(index, &outcome);
        }
    }

    if let Some(callback) = progress_callback {
        callback.on_phase_completed(Phase::Staging);
    }

    if !failed.is_empty() {
        tracing::error!(failed = ?failed.to_vec(), "checksum verification failed");
        return Err(EngineError::ChecksumVerificationFailed {
            count: failed.len(),
            files: failed.to_vec(),
        });
    }

    tracing::info!(
        staged = report.staged.len(),
        verified = report.verified,
        "checksum verification passed for all files"
    );
    Ok(report)
}

/// Copy one audio file and its sidecar into staging and verify the copy.
fn stage_audio(
    file: &Path,
    staged: &Path,
    report: &mut StagingReport,
    failed: &mut FailedFileSet,
) -> Result<FileStatus, EngineError> {
    let sidecar = checksums::sidecar_path(file);
    let source_digest = checksums::generate(file)?;

    if sidecar.is_file() {
        let recorded = checksums::read_sidecar(file)?;
        if recorded != source_digest {
            tracing::warn!(file = %file.display(), "source file does not match its existing checksum");
        }
    } else {
        checksums::persist(file, &source_digest, &sidecar)?;
        report.sidecars_generated += 1;
        tracing::info!(file = %file.display(), "generated checksum");
    }

    report.bytes_copied += fs_ops::copy_file_with_metadata(file, staged)?;
    tracing::info!(file = %file.display(), "copied to staging area");
    fs_ops::copy_file_with_metadata(&sidecar, &checksums::sidecar_path(staged))?;

    let staged_digest = checksums::generate(staged)?;
    match checksums::verify(staged, &staged_digest, failed)? {
        Verification::Verified => {
            report.verified += 1;
            Ok(FileStatus::Verified)
        }
        Verification::Mismatch { expected } => {
            Ok(FileStatus::Failed(FailureReason::ChecksumMismatch {
                expected,
                actual: staged_digest.hex().to_string(),
            }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    struct Fixture {
        _tmp: tempfile::TempDir,
        source: PathBuf,
        staging: StagingArea,
    }

    fn fixture() -> Fixture {
        let tmp = tempfile::tempdir().expect("Failed to create temp dir");
        let source = tmp.path().join("Carlo Krahmer");
        fs::create_dir(&source).expect("Failed to create source dir");
        let staging = StagingArea::new(tmp.path().join("_staging_area"));
        Fixture {
            _tmp: tmp,
            source,
            staging,
        }
    }

    #[test]
    fn test_audio_sidecar_generated_and_verified() {
        let fx = fixture();
        let wav = fx.source.join("C1_001.wav");
        let sheet = fx.source.join("CK_240307_1_TrackingSheet.xlsx");
        fs::write(&wav, b"RIFF audio").expect("write");
        fs::write(&sheet, b"sheet").expect("write");

        let files = fs_ops::list_files(&fx.source).expect("Failed to list");
        let report = copy_to_staging(&files, &fx.staging, &StagingSettings::default(), None)
            .expect("Staging failed");

        assert_eq!(report.sidecars_generated, 1);
        assert_eq!(report.verified, 1);
        assert!(checksums::sidecar_path(&wav).exists(), "sidecar written at the source");
        assert!(fx.staging.path().join("C1_001.wav").exists());
        assert!(fx.staging.path().join("C1_001.wav.md5").exists());
        assert!(fx.staging.path().join("CK_240307_1_TrackingSheet.xlsx").exists());
        assert!(!fx.staging.path().join("CK_240307_1_TrackingSheet.xlsx.md5").exists());
        assert_eq!(report.staged.len(), 2);
    }

    #[test]
    fn test_existing_sidecar_is_authoritative() {
        let fx = fixture();
        let wav = fx.source.join("take1.wav");
        fs::write(&wav, b"take one").expect("write");
        fs::write(
            checksums::sidecar_path(&wav),
            "ffffffffffffffffffffffffffffffff *take1.wav",
        )
        .expect("write");

        let files = fs_ops::list_files(&fx.source).expect("Failed to list");
        let result = copy_to_staging(&files, &fx.staging, &StagingSettings::default(), None);

        match result {
            Err(EngineError::ChecksumVerificationFailed { count, files }) => {
                assert_eq!(count, 1);
                assert_eq!(files, vec!["take1.wav".to_string()]);
            }
            other => panic!("expected ChecksumVerificationFailed, got {:?}", other),
        }

        // The source sidecar was not overwritten
        let sidecar = fs::read_to_string(checksums::sidecar_path(&wav)).unwrap();
        assert!(sidecar.starts_with("ffffffff"));

        // Caller cleanup leaves nothing behind
        assert_eq!(fx.staging.clear().expect("Failed to clear"), 2);
        assert!(fx.staging.is_empty().expect("Failed to check"));
    }

    #[test]
    fn test_failures_do_not_stop_sibling_files() {
        let fx = fixture();
        let bad = fx.source.join("a_bad.wav");
        fs::write(&bad, b"bad").expect("write");
        fs::write(checksums::sidecar_path(&bad), "0".repeat(32)).expect("write");
        fs::write(fx.source.join("b_good.wav"), b"good").expect("write");

        let files = fs_ops::list_files(&fx.source).expect("Failed to list");
        let result = copy_to_staging(&files, &fx.staging, &StagingSettings::default(), None);
        assert!(matches!(
            result,
            Err(EngineError::ChecksumVerificationFailed { count: 1, .. })
        ));
        assert!(fx.staging.path().join("b_good.wav").exists());
    }

    #[test]
    fn test_rejects_empty_list_and_dirty_staging() {
        let fx = fixture();
        let result = copy_to_staging(&[], &fx.staging, &StagingSettings::default(), None);
        assert!(matches!(result, Err(EngineError::StructuralPrecondition { .. })));

        fs::write(fx.source.join("x.txt"), b"x").expect("write");
        fx.staging.ensure_exists().expect("mkdir");
        fs::write(fx.staging.path().join("leftover.wav"), b"old").expect("write");

        let files = fs_ops::list_files(&fx.source).expect("Failed to list");
        let result = copy_to_staging(&files, &fx.staging, &StagingSettings::default(), None);
        assert!(matches!(result, Err(EngineError::StructuralPrecondition { .. })));
    }

    #[test]
    fn test_rejects_duplicate_basenames() {
        let fx = fixture();
        let other = fx.source.join("other");
        fs::create_dir(&other).expect("mkdir");
        fs::write(fx.source.join("dup.xlsx"), b"1").expect("write");
        fs::write(other.join("dup.xlsx"), b"2").expect("write");

        let files = vec![fx.source.join("dup.xlsx"), other.join("dup.xlsx")];
        let result = copy_to_staging(&files, &fx.staging, &StagingSettings::default(), None);
        assert!(matches!(result, Err(EngineError::StructuralPrecondition { .. })));
    }

    #[test]
    fn test_audio_extension_match_is_case_insensitive() {
        let settings = StagingSettings::default();
        assert!(settings.is_audio(Path::new("a.WAV")));
        assert!(settings.is_audio(Path::new("a.wav")));
        assert!(!settings.is_audio(Path::new("a.wav.md5")));
        assert!(!settings.is_audio(Path::new("wav")));
    }

    #[test]
    fn test_require_companions() {
        let suffixes = vec![
            "_TrackingSheet.xlsx".to_string(),
            "_ExcelBatchUpload.xlsx".to_string(),
        ];
        let complete = vec![
            PathBuf::from("/d/CK_TrackingSheet.xlsx"),
            PathBuf::from("/d/CK_240307_1_ExcelBatchUpload.xlsx"),
        ];
        assert!(require_companions(&complete, &suffixes).is_ok());

        let missing = vec![PathBuf::from("/d/CK_TrackingSheet.xlsx")];
        let err = require_companions(&missing, &suffixes).unwrap_err();
        assert!(err.to_string().contains("_ExcelBatchUpload.xlsx"));
    }

    #[test]
    fn test_staged_files_excludes_sidecars() {
        let fx = fixture();
        fx.staging.ensure_exists().expect("mkdir");
        fs::write(fx.staging.path().join("a.wav"), b"a").expect("write");
        fs::write(fx.staging.path().join("a.wav.md5"), b"x").expect("write");
        assert_eq!(
            fx.staging.staged_files().expect("Failed to list"),
            vec![fx.staging.path().join("a.wav")]
        );
    }
}
