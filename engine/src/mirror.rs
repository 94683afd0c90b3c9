//! Mirror synchronization.
//!
//! Applies a `DiffResult` to a destination tree: copy new files, overwrite
//! changed files, delete removed files, strictly in that order so that an
//! interrupted run leaves the destination a superset of the source until
//! deletions begin.
//!
//! Every transferred file whose source carries a sidecar is re-hashed at the
//! destination and checked against the copied sidecar. A copy that does not
//! match is quarantined (the file and its sidecar are deleted from the
//! destination) and the run moves on to the next file.

use crate::checksums::{self, Verification};
use crate::diff;
use crate::error::EngineError;
use crate::fs_ops;
use crate::model::{
    CommitReport, DiffResult, FailedFileSet, FailureReason, FileOutcome, FileRecord, FileStatus,
    Phase,
};
use crate::progress::ProgressCallback;
use crate::scanner;
use chrono::Utc;
use std::path::{Path, PathBuf};

/// Apply `diff` from `source_root` onto `dest_root`.
///
/// Individual file failures (checksum mismatch, per-file I/O errors) are
/// recorded in the returned report and never abort the run.
///
/// # Errors
/// Returns EngineError only when the source root is missing or the
/// destination root cannot be created.
pub fn commit(
    diff: &DiffResult,
    source_root: &Path,
    dest_root: &Path,
    progress_callback: Option<&dyn ProgressCallback>,
) -> Result<CommitReport, EngineError> {
    fs_ops::validate_dir(source_root)?;
    fs_ops::ensure_dir_exists(dest_root)?;

    let mut report = CommitReport::new();
    let span = tracing::info_span!("commit", run = %report.id);
    let _guard = span.enter();

    tracing::info!(
        source = %source_root.display(),
        destination = %dest_root.display(),
        operations = diff.len(),
        "commit started"
    );

    let phases: [(Phase, &[FileRecord]); 3] = [
        (Phase::New, diff.new.as_slice()),
        (Phase::Changed, diff.changed.as_slice()),
        (Phase::Removed, diff.removed.as_slice()),
    ];

    'phases: for (phase, records) in phases {
        if records.is_empty() {
            continue;
        }

        if let Some(callback) = progress_callback {
            callback.on_phase_started(phase, records.len());
        }

        for (index, record) in records.iter().enumerate() {
            if progress_callback.map_or(false, |c| c.is_cancelled()) {
                tracing::warn!(%phase, remaining = records.len() - index, "commit cancelled");
                report.cancelled = true;
                if let Some(callback) = progress_callback {
                    callback.on_phase_completed(phase);
                }
                break 'phases;
            }

            let source = source_root.join(&record.relative_path);
            let dest = dest_root.join(&record.relative_path);

            if let Some(callback) = progress_callback {
                callback.on_file_started(phase, index, &record.relative_path);
            }

            let status = match phase {
                Phase::Removed => remove_file(&dest),
                _ => {
                    let (status, bytes) = transfer_file(&source, &dest, &mut report.failed);
                    report.bytes_copied += bytes;
                    status
                }
            };

            match &status {
                FileStatus::Failed(reason) => {
                    tracing::error!(%phase, file = %record.relative_path.display(), %reason, "file failed")
                }
                _ => tracing::info!(%phase, file = %record.relative_path.display(), "file mirrored"),
            }

            let outcome = FileOutcome {
                relative_path: record.relative_path.clone(),
                phase,
                status,
            };
            if let Some(callback) = progress_callback {
                callback.on_file_completed(index, &outcome);
            }
            report.record(outcome);
        }

        if let Some(callback) = progress_callback {
            callback.on_phase_completed(phase);
        }
    }

    report.finished_at = Some(Utc::now());

    if report.failed.is_empty() {
        tracing::info!("all files with existing checksums validated");
    } else {
        tracing::error!(
            failed = ?report.failed.to_vec(),
            "checksum verification failed; failed files were removed from the destination"
        );
    }

    Ok(report)
}

/// Copy one file (and its sidecar, if any) and verify the copy.
///
/// A copy that fails leaves any previous destination file in place. Returns
/// the terminal status and the number of bytes that stayed at the
/// destination.
fn transfer_file(source: &Path, dest: &Path, failed: &mut FailedFileSet) -> (FileStatus, u64) {
    let bytes = match fs_ops::copy_file_with_metadata(source, dest) {
        Ok(bytes) => bytes,
        Err(e) => return (io_failure(&e), 0),
    };

    let source_sidecar = checksums::sidecar_path(source);
    if !source_sidecar.is_file() {
        return (FileStatus::Transferred, bytes);
    }

    let dest_sidecar = checksums::sidecar_path(dest);
    let checked = fs_ops::copy_file_with_metadata(&source_sidecar, &dest_sidecar)
        .and_then(|_| checksums::generate(dest))
        .and_then(|digest| {
            checksums::verify(dest, &digest, failed).map(|verification| (digest, verification))
        });

    match checked {
        Ok((_, Verification::Verified)) => (FileStatus::Verified, bytes),
        Ok((digest, Verification::Mismatch { expected })) => {
            let status = FileStatus::Failed(FailureReason::ChecksumMismatch {
                expected,
                actual: digest.hex().to_string(),
            });
            (quarantine(dest, &dest_sidecar, status), 0)
        }
        Err(e) => (quarantine(dest, &dest_sidecar, io_failure(&e)), 0),
    }
}

/// Delete a rejected copy and its sidecar from the destination.
fn quarantine(dest: &Path, dest_sidecar: &Path, status: FileStatus) -> FileStatus {
    for path in [dest, dest_sidecar] {
        if let Err(e) = fs_ops::remove_file_if_exists(path) {
            tracing::error!(file = %path.display(), error = %e, "could not remove rejected copy");
        }
    }
    status
}

fn remove_file(dest: &Path) -> FileStatus {
    match fs_ops::remove_file(dest) {
        Ok(()) => FileStatus::Removed,
        Err(e) => io_failure(&e),
    }
}

fn io_failure(err: &EngineError) -> FileStatus {
    let message = match std::error::Error::source(err) {
        Some(cause) => format!("{}: {}", err, cause),
        None => err.to_string(),
    };
    FileStatus::Failed(FailureReason::Io { message })
}

/// An engineer's working drive and its mirror at `<mirror_root>/<engineer>`.
#[derive(Debug, Clone)]
pub struct Mirror {
    source_root: PathBuf,
    destination: PathBuf,
    engineer: String,
}

impl Mirror {
    pub fn new(
        source_root: impl Into<PathBuf>,
        mirror_root: impl AsRef<Path>,
        engineer: impl Into<String>,
    ) -> Self {
        let engineer = engineer.into();
        Mirror {
            source_root: source_root.into(),
            destination: mirror_root.as_ref().join(&engineer),
            engineer,
        }
    }

    pub fn source_root(&self) -> &Path {
        &self.source_root
    }

    pub fn destination(&self) -> &Path {
        &self.destination
    }

    pub fn engineer(&self) -> &str {
        &self.engineer
    }

    /// Whether the engineer's mirror directory exists yet.
    pub fn mirror_exists(&self) -> bool {
        let exists = self.destination.is_dir();
        if exists {
            tracing::info!(mirror = %self.destination.display(), "mirror location exists");
        } else {
            tracing::info!(mirror = %self.destination.display(), "mirror location does not exist");
        }
        exists
    }

    /// Scan both sides and classify the differences.
    ///
    /// A mirror that does not exist yet is treated as empty.
    pub fn plan(&self) -> Result<DiffResult, EngineError> {
        let source = scanner::scan_all(&self.source_root)?;
        let dest = if self.mirror_exists() {
            scanner::scan_all(&self.destination)?
        } else {
            Vec::new()
        };
        Ok(diff::diff(&source, &dest))
    }

    /// Apply a plan produced by `plan`.
    pub fn commit(
        &self,
        plan: &DiffResult,
        progress_callback: Option<&dyn ProgressCallback>,
    ) -> Result<CommitReport, EngineError> {
        tracing::info!(engineer = %self.engineer, "drive mirror commit initiated");
        commit(plan, &self.source_root, &self.destination, progress_callback)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::{Cell, RefCell};
    use std::fs;

    fn write(path: &Path, content: &[u8]) {
        fs_ops::ensure_parent_dir_exists(path).expect("Failed to create parent");
        fs::write(path, content).expect("Failed to write file");
    }

    fn roots() -> (tempfile::TempDir, PathBuf, PathBuf) {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let src = temp_dir.path().join("src");
        let dst = temp_dir.path().join("dst");
        fs::create_dir(&src).expect("Failed to create src dir");
        fs::create_dir(&dst).expect("Failed to create dst dir");
        (temp_dir, src, dst)
    }

    fn rescan_diff(src: &Path, dst: &Path) -> DiffResult {
        let source = scanner::scan_all(src).expect("Failed to scan source");
        let dest = scanner::scan_all(dst).expect("Failed to scan dest");
        diff::diff(&source, &dest)
    }

    #[test]
    fn test_commit_new_file_then_rediff_is_empty() {
        let (_tmp, src, dst) = roots();
        write(&src.join("a.txt"), b"0123456789");

        let plan = diff::diff(&[FileRecord::new("a.txt", 10)], &[]);
        let report = commit(&plan, &src, &dst, None).expect("Commit failed");

        assert_eq!(report.new.succeeded, 1);
        assert!(report.failed.is_empty());
        assert_eq!(report.bytes_copied, 10);
        assert!(rescan_diff(&src, &dst).is_empty());
    }

    #[test]
    fn test_commit_copies_and_verifies_sidecar() {
        let (_tmp, src, dst) = roots();
        let song = src.join("song.wav");
        write(&song, &vec![7u8; 5000]);
        checksums::generate_and_persist(&song).expect("Failed to write sidecar");
        write(&src.join("notes.xlsx"), b"tracking");

        let plan = rescan_diff(&src, &dst);
        let new_paths: Vec<_> = plan.new.iter().map(|r| r.relative_path.clone()).collect();
        assert_eq!(new_paths.len(), 2);
        assert!(new_paths.contains(&PathBuf::from("song.wav")));
        assert!(new_paths.contains(&PathBuf::from("notes.xlsx")));

        let report = commit(&plan, &src, &dst, None).expect("Commit failed");
        assert!(report.failed.is_empty());
        assert!(dst.join("song.wav").exists());
        assert!(dst.join("song.wav.md5").exists());
        assert!(dst.join("notes.xlsx").exists());

        let song_outcome = report
            .outcomes
            .iter()
            .find(|o| o.relative_path == Path::new("song.wav"))
            .expect("song.wav outcome");
        assert_eq!(song_outcome.status, FileStatus::Verified);
    }

    #[test]
    fn test_commit_quarantines_mismatch_and_continues() {
        let (_tmp, src, dst) = roots();
        write(&src.join("bad.wav"), b"audio bytes");
        write(
            &src.join("bad.wav.md5"),
            b"00000000000000000000000000000000 *bad.wav",
        );
        write(&src.join("good.wav"), b"more audio");

        let plan = rescan_diff(&src, &dst);
        let report = commit(&plan, &src, &dst, None).expect("Commit failed");

        assert!(report.failed.contains("bad.wav"));
        assert_eq!(report.failed.len(), 1);
        assert!(!dst.join("bad.wav").exists());
        assert!(!dst.join("bad.wav.md5").exists());
        assert!(dst.join("good.wav").exists());
        assert_eq!(report.new.succeeded, 1);
        assert_eq!(report.new.failed, 1);
    }

    #[test]
    fn test_commit_overwrites_changed_and_refreshes_sidecar() {
        let (_tmp, src, dst) = roots();
        let src_file = src.join("mix").join("take.wav");
        write(&src_file, b"longer new content");
        checksums::generate_and_persist(&src_file).expect("Failed to write sidecar");
        write(&dst.join("mix").join("take.wav"), b"short");
        write(&dst.join("mix").join("take.wav.md5"), b"stale");

        let plan = rescan_diff(&src, &dst);
        assert_eq!(plan.changed.len(), 1);

        let report = commit(&plan, &src, &dst, None).expect("Commit failed");
        assert_eq!(report.changed.succeeded, 1);
        assert_eq!(
            fs::read(dst.join("mix").join("take.wav")).unwrap(),
            b"longer new content"
        );
        assert_eq!(
            fs::read(dst.join("mix").join("take.wav.md5")).unwrap(),
            fs::read(checksums::sidecar_path(&src_file)).unwrap()
        );
    }

    #[test]
    fn test_commit_quarantines_changed_mismatch() {
        let (_tmp, src, dst) = roots();
        write(&src.join("take.wav"), b"re-recorded take");
        write(
            &src.join("take.wav.md5"),
            b"ffffffffffffffffffffffffffffffff *take.wav",
        );
        write(&dst.join("take.wav"), b"old take");
        write(&dst.join("take.wav.md5"), b"stale");

        let plan = rescan_diff(&src, &dst);
        assert_eq!(plan.changed.len(), 1);

        let report = commit(&plan, &src, &dst, None).expect("Commit failed");
        assert_eq!(report.changed.failed, 1);
        assert_eq!(report.changed.succeeded, 0);
        assert!(report.failed.contains("take.wav"));
        assert!(!dst.join("take.wav").exists());
        assert!(!dst.join("take.wav.md5").exists());
        assert!(matches!(
            report.outcomes[0].status,
            FileStatus::Failed(FailureReason::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn test_failed_changed_copy_keeps_previous_mirror_copy() {
        let (_tmp, src, dst) = roots();
        // Unreadable as a file, so the copy fails part way
        fs::create_dir(src.join("take.wav")).expect("mkdir");
        write(&dst.join("take.wav"), &vec![3u8; 4096]);

        let plan = diff::diff(
            &[FileRecord::new("take.wav", 10)],
            &[FileRecord::new("take.wav", 4096)],
        );
        assert_eq!(plan.changed.len(), 1);

        let report = commit(&plan, &src, &dst, None).expect("Commit should not abort");
        assert_eq!(report.changed.failed, 1);
        assert!(matches!(
            report.outcomes[0].status,
            FileStatus::Failed(FailureReason::Io { .. })
        ));
        assert_eq!(fs::read(dst.join("take.wav")).unwrap().len(), 4096);
        assert!(!fs_ops::partial_path(&dst.join("take.wav")).exists());
    }

    #[test]
    fn test_commit_deletes_removed() {
        let (_tmp, src, dst) = roots();
        write(&dst.join("old.wav"), &vec![1u8; 200]);

        let plan = rescan_diff(&src, &dst);
        assert_eq!(plan.removed, vec![FileRecord::new("old.wav", 200)]);

        let report = commit(&plan, &src, &dst, None).expect("Commit failed");
        assert_eq!(report.removed.succeeded, 1);
        assert!(!dst.join("old.wav").exists());
    }

    #[test]
    fn test_commit_records_per_file_io_failure() {
        let (_tmp, src, dst) = roots();
        // Planned file that vanished from the source before commit
        let plan = diff::diff(&[FileRecord::new("gone.wav", 3)], &[]);
        let report = commit(&plan, &src, &dst, None).expect("Commit should not abort");

        assert_eq!(report.new.failed, 1);
        assert!(report.failed.is_empty(), "I/O failures are not checksum failures");
        assert!(matches!(
            report.outcomes[0].status,
            FileStatus::Failed(FailureReason::Io { .. })
        ));
    }

    #[test]
    fn test_commit_missing_source_root_is_structural() {
        let (tmp, _src, dst) = roots();
        let result = commit(&DiffResult::default(), &tmp.path().join("nope"), &dst, None);
        assert!(matches!(result, Err(EngineError::SourceNotFound { .. })));
    }

    struct RecordingProgress {
        calls: RefCell<Vec<String>>,
        cancel_after: Option<usize>,
        completed: Cell<usize>,
    }

    impl RecordingProgress {
        fn new(cancel_after: Option<usize>) -> Self {
            RecordingProgress {
                calls: RefCell::new(Vec::new()),
                cancel_after,
                completed: Cell::new(0),
            }
        }
    }

    impl ProgressCallback for RecordingProgress {
        fn on_phase_started(&self, phase: Phase, total: usize) {
            self.calls.borrow_mut().push(format!("start {} {}", phase, total));
        }

        fn on_file_completed(&self, _index: usize, outcome: &FileOutcome) {
            self.completed.set(self.completed.get() + 1);
            self.calls
                .borrow_mut()
                .push(format!("done {}", outcome.relative_path.display()));
        }

        fn on_phase_completed(&self, phase: Phase) {
            self.calls.borrow_mut().push(format!("end {}", phase));
        }

        fn is_cancelled(&self) -> bool {
            self.cancel_after.map_or(false, |n| self.completed.get() >= n)
        }
    }

    #[test]
    fn test_phase_order_new_changed_removed() {
        let (_tmp, src, dst) = roots();
        write(&src.join("a.txt"), b"new");
        write(&src.join("b.txt"), b"changed!");
        write(&dst.join("b.txt"), b"old");
        write(&dst.join("c.txt"), b"removed");

        let plan = rescan_diff(&src, &dst);
        let progress = RecordingProgress::new(None);
        commit(&plan, &src, &dst, Some(&progress)).expect("Commit failed");

        assert_eq!(
            progress.calls.into_inner(),
            vec![
                "start new 1",
                "done a.txt",
                "end new",
                "start changed 1",
                "done b.txt",
                "end changed",
                "start removed 1",
                "done c.txt",
                "end removed",
            ]
        );
    }

    #[test]
    fn test_cancellation_stops_between_files() {
        let (_tmp, src, dst) = roots();
        write(&src.join("a.txt"), b"1");
        write(&src.join("b.txt"), b"2");
        write(&dst.join("z.txt"), b"keep me");

        let plan = rescan_diff(&src, &dst);
        let progress = RecordingProgress::new(Some(1));
        let report = commit(&plan, &src, &dst, Some(&progress)).expect("Commit failed");

        assert!(report.cancelled);
        assert_eq!(report.outcomes.len(), 1);
        assert!(dst.join("a.txt").exists(), "committed files stay in place");
        assert!(!dst.join("b.txt").exists());
        assert!(dst.join("z.txt").exists(), "no deletions after cancellation");
    }

    #[test]
    fn test_mirror_plan_against_missing_destination() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let src = temp_dir.path().join("drive");
        write(&src.join("project").join("song.wav"), b"abc");

        let mirror = Mirror::new(&src, temp_dir.path().join("mirrors"), "Carlo");
        assert!(!mirror.mirror_exists());

        let plan = mirror.plan().expect("Failed to plan");
        assert_eq!(plan.new.len(), 1);

        let report = mirror.commit(&plan, None).expect("Failed to commit");
        assert_eq!(report.new.succeeded, 1);
        assert!(mirror.mirror_exists());
        assert!(temp_dir
            .path()
            .join("mirrors")
            .join("Carlo")
            .join("project")
            .join("song.wav")
            .exists());
        assert!(mirror.plan().expect("Failed to re-plan").is_empty());
    }
}
