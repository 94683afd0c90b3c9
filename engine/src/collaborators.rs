//! Hooks for the external steps of a staged backup.
//!
//! Metadata embedding, access-copy transcoding and notification live outside
//! the engine. The backup workflow calls them through these traits;
//! `Passthrough` does nothing and is used when no collaborator is wired in.

use crate::error::EngineError;
use std::path::Path;

/// Rewrites embedded metadata of a staged audio file in place.
///
/// The file's bytes may change, so sidecars are generated after this runs.
pub trait MetadataRewriter {
    fn rewrite(&self, path: &Path, engineer: &str) -> Result<(), EngineError>;
}

/// Produces an access copy of a staged audio file.
///
/// Whatever the transcoder writes is not tracked by the batch.
pub trait AccessTranscoder {
    fn transcode(&self, path: &Path, staging_dir: &Path) -> Result<(), EngineError>;
}

/// Announces a promoted batch.
pub trait Notifier {
    fn notify(
        &self,
        engineer: &str,
        batch_path: &Path,
        tracking_sheet: Option<&str>,
    ) -> Result<(), EngineError>;
}

/// No-op collaborator.
#[derive(Debug, Clone, Copy, Default)]
pub struct Passthrough;

impl MetadataRewriter for Passthrough {
    fn rewrite(&self, _path: &Path, _engineer: &str) -> Result<(), EngineError> {
        Ok(())
    }
}

impl AccessTranscoder for Passthrough {
    fn transcode(&self, _path: &Path, _staging_dir: &Path) -> Result<(), EngineError> {
        Ok(())
    }
}

impl Notifier for Passthrough {
    fn notify(
        &self,
        engineer: &str,
        batch_path: &Path,
        _tracking_sheet: Option<&str>,
    ) -> Result<(), EngineError> {
        tracing::debug!(%engineer, batch = %batch_path.display(), "no notifier configured");
        Ok(())
    }
}
