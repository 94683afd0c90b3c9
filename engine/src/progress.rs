//! Progress reporting trait.
//!
//! This module defines the ProgressCallback trait, which decouples the
//! commit and staging loops from any particular front end. It is also the
//! cancellation point: runs ask `is_cancelled` between files and stop
//! issuing new file operations once it returns true.

use crate::model::{FileOutcome, Phase};
use std::path::Path;

/// Trait for receiving progress updates from a commit or staging run.
///
/// All methods are called synchronously on the thread doing the work.
/// Every method has an empty default so implementors only override what
/// they render.
pub trait ProgressCallback {
    /// Called when a phase starts, with the number of files it will touch.
    fn on_phase_started(&self, _phase: Phase, _total: usize) {}

    /// Called before a file is processed.
    fn on_file_started(&self, _phase: Phase, _index: usize, _path: &Path) {}

    /// Called when a file reaches a terminal status.
    fn on_file_completed(&self, _index: usize, _outcome: &FileOutcome) {}

    /// Called when every file of a phase has been handled (or the run was cancelled).
    fn on_phase_completed(&self, _phase: Phase) {}

    /// Polled between files. Returning true stops the run before the next file.
    fn is_cancelled(&self) -> bool {
        false
    }
}
