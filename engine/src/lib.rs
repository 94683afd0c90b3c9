//! # Archive Transfer Engine
//!
//! A headless engine for moving recording sessions off removable drives into
//! an archive, with MD5 sidecars guarding every audio file on the way.
//! Designed as the foundation for a CLI and other front ends.
//!
//! ## Overview
//!
//! Two workflows share one checksum service:
//! - **Mirror**: scan source and destination, diff by relative path and size,
//!   then commit the difference (new, then changed, then removed files) with
//!   per-file verification and quarantine of bad copies
//! - **Staged backup**: copy a session into a flat staging area, verify it,
//!   regenerate sidecars after metadata rewriting, and promote it into a
//!   numbered batch directory
//!
//! Progress and cancellation go through a callback trait, decoupled from any
//! UI technology.
//!
//! ## Basic Usage
//!
//! ```no_run
//! use engine::Mirror;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mirror = Mirror::new("/media/drive/Carlo Krahmer", "/archive/mirror", "Carlo Krahmer");
//!
//! // Work out what differs
//! let plan = mirror.plan()?;
//! println!("{}", plan);
//!
//! // Apply it
//! let report = mirror.commit(&plan, None)?;
//! for failed in report.failed.iter() {
//!     println!("failed: {}", failed);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - **model**: Core data structures (FileRecord, DiffResult, reports)
//! - **error**: Error types and handling
//! - **fs_ops**: Low-level filesystem operations
//! - **checksums**: MD5 sidecar generation and verification
//! - **scanner**: Recursive tree scanning
//! - **diff**: Snapshot comparison
//! - **mirror**: Mirror commit and workflow
//! - **staging**: Staged copy with verification
//! - **batch**: Batch promotion
//! - **backup**: Staged backup workflow
//! - **collaborators**: Hooks for metadata, transcoding and notification
//! - **progress**: Progress callback trait

pub mod model;
pub mod error;
pub mod fs_ops;
pub mod checksums;
pub mod scanner;
pub mod diff;
pub mod mirror;
pub mod staging;
pub mod batch;
pub mod backup;
pub mod collaborators;
pub mod progress;

// Re-export main types and functions
pub use model::{
    CommitReport, DiffResult, FailedFileSet, FailureReason, FileOutcome, FileRecord, FileStatus,
    Phase, PhaseCounts, StagingReport,
};
pub use error::EngineError;
pub use checksums::{Md5Digest, Verification};
pub use scanner::{scan, scan_all, ScanOptions};
pub use diff::diff;
pub use mirror::{commit, Mirror};
pub use staging::{copy_to_staging, require_companions, StagingArea, StagingSettings};
pub use batch::promote;
pub use backup::{resolve_engineer, BackupOutcome, BackupService, BackupSettings};
pub use collaborators::{AccessTranscoder, MetadataRewriter, Notifier, Passthrough};
pub use progress::ProgressCallback;
