//! Error types for the transfer engine.
//!
//! `EngineError` covers the failures that abort a phase: filesystem errors
//! on a structural path, missing preconditions, and a staging run whose
//! checksum verification failed. Per-file checksum mismatches are never
//! raised through this type; they are recorded as `FileOutcome`s and in the
//! run's `FailedFileSet`.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that abort the current phase and propagate to the caller.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Source directory does not exist
    #[error("Source directory not found: {}", path.display())]
    SourceNotFound { path: PathBuf },

    /// Failed to open or read a file
    #[error("Failed to read file: {}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Failed to create or write a file
    #[error("Failed to write file: {}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Failed to delete a file
    #[error("Failed to remove file: {}", path.display())]
    Remove {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Failed to move a file into its new location
    #[error("Failed to move {} to {}", from.display(), to.display())]
    Move {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Failed to enumerate a directory
    #[error("Failed to enumerate directory: {}", path.display())]
    Enumeration {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Failed to create a directory
    #[error("Failed to create directory: {}", path.display())]
    DirectoryCreation {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A required input is missing or the staging area is in the wrong state
    #[error("Precondition not met: {reason}")]
    StructuralPrecondition { reason: String },

    /// One or more staged files failed checksum verification
    #[error("Checksum verification failed for {count} file(s): {}", files.join(", "))]
    ChecksumVerificationFailed { count: usize, files: Vec<String> },

    /// An external collaborator (rewriter, transcoder, notifier) reported a failure
    #[error("{stage} failed for {}: {message}", path.display())]
    Collaborator {
        stage: &'static str,
        path: PathBuf,
        message: String,
    },
}

impl EngineError {
    /// Extract the OS error code from this error, if available.
    pub fn raw_os_error(&self) -> Option<u32> {
        match self {
            Self::Read { source, .. }
            | Self::Write { source, .. }
            | Self::Remove { source, .. }
            | Self::Move { source, .. }
            | Self::Enumeration { source, .. }
            | Self::DirectoryCreation { source, .. } => source.raw_os_error().map(|e| e as u32),
            _ => None,
        }
    }

    /// True for the filesystem variants (the `IOFailure` class of errors).
    pub fn is_io(&self) -> bool {
        matches!(
            self,
            Self::SourceNotFound { .. }
                | Self::Read { .. }
                | Self::Write { .. }
                | Self::Remove { .. }
                | Self::Move { .. }
                | Self::Enumeration { .. }
                | Self::DirectoryCreation { .. }
        )
    }

    /// The underlying `io::Error` of a filesystem variant, or a new one
    /// carrying this error's message for the others.
    pub fn into_io_error(self) -> io::Error {
        match self {
            Self::Read { source, .. }
            | Self::Write { source, .. }
            | Self::Remove { source, .. }
            | Self::Move { source, .. }
            | Self::Enumeration { source, .. }
            | Self::DirectoryCreation { source, .. } => source,
            other @ Self::SourceNotFound { .. } => {
                io::Error::new(io::ErrorKind::NotFound, other.to_string())
            }
            other => io::Error::new(io::ErrorKind::Other, other.to_string()),
        }
    }

    pub(crate) fn precondition(reason: impl Into<String>) -> Self {
        Self::StructuralPrecondition {
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verification_failure_lists_files() {
        let err = EngineError::ChecksumVerificationFailed {
            count: 2,
            files: vec!["a.wav".to_string(), "b.wav".to_string()],
        };
        assert_eq!(
            err.to_string(),
            "Checksum verification failed for 2 file(s): a.wav, b.wav"
        );
        assert!(!err.is_io());
    }

    #[test]
    fn test_raw_os_error_passthrough() {
        let err = EngineError::Read {
            path: PathBuf::from("x"),
            source: io::Error::from_raw_os_error(2),
        };
        assert_eq!(err.raw_os_error(), Some(2));
        assert!(err.is_io());
        assert_eq!(EngineError::precondition("nope").raw_os_error(), None);
    }

    #[test]
    fn test_into_io_error_keeps_os_code() {
        let err = EngineError::Write {
            path: PathBuf::from("x"),
            source: io::Error::from_raw_os_error(13),
        };
        assert_eq!(err.into_io_error().raw_os_error(), Some(13));

        let err = EngineError::SourceNotFound {
            path: PathBuf::from("x"),
        };
        assert_eq!(err.into_io_error().kind(), io::ErrorKind::NotFound);
    }
}
