//! Tree scanning.
//!
//! Walks a directory at unbounded depth and yields one `FileRecord` per
//! regular file, with paths relative to the scanned root. The walk is lazy
//! and sorted by file name, so scanning an unchanged tree twice yields the
//! same sequence.

use crate::checksums;
use crate::error::EngineError;
use crate::fs_ops;
use crate::model::FileRecord;
use std::io;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Options for tree scanning
#[derive(Debug, Clone, Default)]
pub struct ScanOptions {
    /// Emit `*.md5` sidecars as records of their own. Off by default:
    /// sidecars travel with their data file and are not diffed separately.
    pub include_sidecars: bool,

    /// Follow symbolic links
    pub follow_links: bool,
}

/// A lazy scan over the regular files of a tree.
pub struct Scan {
    root: PathBuf,
    options: ScanOptions,
    walker: walkdir::IntoIter,
}

impl Iterator for Scan {
    type Item = Result<FileRecord, EngineError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let entry = match self.walker.next()? {
                Ok(entry) => entry,
                Err(e) => {
                    let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| self.root.clone());
                    return Some(Err(EngineError::Enumeration {
                        path,
                        source: io::Error::from(e),
                    }));
                }
            };

            if !entry.file_type().is_file() {
                continue;
            }
            if !self.options.include_sidecars && checksums::is_sidecar(entry.path()) {
                continue;
            }

            let size = match entry.metadata() {
                Ok(metadata) => metadata.len(),
                Err(e) => {
                    return Some(Err(EngineError::Enumeration {
                        path: entry.path().to_path_buf(),
                        source: io::Error::from(e),
                    }))
                }
            };

            let relative_path = entry
                .path()
                .strip_prefix(&self.root)
                .unwrap_or(entry.path())
                .to_path_buf();

            return Some(Ok(FileRecord {
                relative_path,
                size,
            }));
        }
    }
}

/// Scan `root` with default options.
pub fn scan(root: &Path) -> Result<Scan, EngineError> {
    scan_with(root, ScanOptions::default())
}

/// Scan `root`.
///
/// # Errors
/// Fails up front if `root` does not exist or is not a directory; errors
/// below the root are yielded by the iterator.
pub fn scan_with(root: &Path, options: ScanOptions) -> Result<Scan, EngineError> {
    fs_ops::validate_dir(root)?;

    let walker = WalkDir::new(root)
        .min_depth(1)
        .follow_links(options.follow_links)
        .sort_by_file_name()
        .into_iter();

    Ok(Scan {
        root: root.to_path_buf(),
        options,
        walker,
    })
}

/// Scan `root` and collect every record, stopping at the first error.
pub fn scan_all(root: &Path) -> Result<Vec<FileRecord>, EngineError> {
    scan(root)?.collect()
}
