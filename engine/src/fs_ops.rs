//! Filesystem operations module.
//!
//! Low-level operations shared by the mirror and staging paths:
//! - Copying files with timestamp preservation
//! - Moving files (rename, with a copy fallback across devices)
//! - Creating parent directories
//! - Listing the regular files directly under a directory

use crate::error::EngineError;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Copy a file from source to destination, preserving its timestamps.
///
/// Parent directories of `dst` are created as needed and an existing `dst`
/// is replaced. The data is written to a sibling `.<name>.partial` file and
/// renamed over `dst` only once the copy is complete, so a failed copy
/// leaves any previous `dst` untouched.
///
/// # Returns
/// Number of bytes copied
pub fn copy_file_with_metadata(src: &Path, dst: &Path) -> Result<u64, EngineError> {
    ensure_parent_dir_exists(dst)?;

    let partial = partial_path(dst);
    let result = copy_contents(src, &partial).and_then(|bytes| {
        fs::rename(&partial, dst).map_err(|e| EngineError::Write {
            path: dst.to_path_buf(),
            source: e,
        })?;
        Ok(bytes)
    });

    if result.is_err() {
        if let Err(e) = remove_file_if_exists(&partial) {
            tracing::warn!(file = %partial.display(), error = %e, "could not remove partial copy");
        }
    }
    result
}

/// Sibling path a copy into `dst` is written to before it is renamed.
pub fn partial_path(dst: &Path) -> PathBuf {
    let name = dst
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    dst.with_file_name(format!(".{}.partial", name))
}

fn copy_contents(src: &Path, dst: &Path) -> Result<u64, EngineError> {
    let mut src_file = fs::File::open(src).map_err(|e| EngineError::Read {
        path: src.to_path_buf(),
        source: e,
    })?;

    let src_metadata = src_file.metadata().map_err(|e| EngineError::Read {
        path: src.to_path_buf(),
        source: e,
    })?;

    let mut dst_file = fs::File::create(dst).map_err(|e| EngineError::Write {
        path: dst.to_path_buf(),
        source: e,
    })?;

    let bytes_copied = io::copy(&mut src_file, &mut dst_file).map_err(|e| {
        if e.kind() == io::ErrorKind::PermissionDenied {
            EngineError::Write {
                path: dst.to_path_buf(),
                source: e,
            }
        } else {
            EngineError::Read {
                path: src.to_path_buf(),
                source: e,
            }
        }
    })?;

    dst_file.sync_all().map_err(|e| EngineError::Write {
        path: dst.to_path_buf(),
        source: e,
    })?;
    drop(dst_file);

    let atime = filetime::FileTime::from_last_access_time(&src_metadata);
    let mtime = filetime::FileTime::from_last_modification_time(&src_metadata);
    if let Err(e) = filetime::set_file_times(dst, atime, mtime) {
        tracing::warn!(file = %dst.display(), error = %e, "could not preserve timestamps");
    }

    Ok(bytes_copied)
}

/// Move a file into `dst`, replacing any file already there.
///
/// Tries a rename first; when that fails (typically across filesystems) the
/// file is copied and the source removed.
pub fn move_file(src: &Path, dst: &Path) -> Result<(), EngineError> {
    ensure_parent_dir_exists(dst)?;

    if fs::rename(src, dst).is_ok() {
        return Ok(());
    }

    copy_file_with_metadata(src, dst).map_err(|e| EngineError::Move {
        from: src.to_path_buf(),
        to: dst.to_path_buf(),
        source: e.into_io_error(),
    })?;
    fs::remove_file(src).map_err(|e| EngineError::Move {
        from: src.to_path_buf(),
        to: dst.to_path_buf(),
        source: e,
    })
}

/// Delete a file.
pub fn remove_file(path: &Path) -> Result<(), EngineError> {
    fs::remove_file(path).map_err(|e| EngineError::Remove {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Delete a file if it exists.
///
/// Returns true if something was removed.
pub fn remove_file_if_exists(path: &Path) -> Result<bool, EngineError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(EngineError::Remove {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}

/// List the regular files directly under `dir`, sorted by path.
pub fn list_files(dir: &Path) -> Result<Vec<PathBuf>, EngineError> {
    let entries = fs::read_dir(dir).map_err(|e| EngineError::Enumeration {
        path: dir.to_path_buf(),
        source: e,
    })?;

    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| EngineError::Enumeration {
            path: dir.to_path_buf(),
            source: e,
        })?;
        let metadata = entry.metadata().map_err(|e| EngineError::Enumeration {
            path: dir.to_path_buf(),
            source: e,
        })?;
        if metadata.is_file() {
            files.push(entry.path());
        }
    }
    files.sort();
    Ok(files)
}

/// Check that `root` exists and is a directory.
pub fn validate_dir(root: &Path) -> Result<(), EngineError> {
    match fs::metadata(root) {
        Ok(metadata) if metadata.is_dir() => Ok(()),
        Ok(_) => Err(EngineError::precondition(format!(
            "{} is not a directory",
            root.display()
        ))),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Err(EngineError::SourceNotFound {
            path: root.to_path_buf(),
        }),
        Err(e) => Err(EngineError::Enumeration {
            path: root.to_path_buf(),
            source: e,
        }),
    }
}

/// Ensure `dir` exists as a directory, creating it (and its parents) if needed.
pub fn ensure_dir_exists(dir: &Path) -> Result<(), EngineError> {
    match fs::metadata(dir) {
        Ok(metadata) if metadata.is_dir() => Ok(()),
        Ok(_) => Err(EngineError::DirectoryCreation {
            path: dir.to_path_buf(),
            source: io::Error::new(
                io::ErrorKind::InvalidInput,
                "Path exists but is not a directory",
            ),
        }),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            fs::create_dir_all(dir).map_err(|e| EngineError::DirectoryCreation {
                path: dir.to_path_buf(),
                source: e,
            })
        }
        Err(e) => Err(EngineError::DirectoryCreation {
            path: dir.to_path_buf(),
            source: e,
        }),
    }
}

/// Ensure the parent directory of a path exists, creating it if necessary.
pub fn ensure_parent_dir_exists(path: &Path) -> Result<(), EngineError> {
    match path.parent() {
        // Skip if parent is empty path (relative root)
        Some(parent) if !parent.as_os_str().is_empty() => ensure_dir_exists(parent),
        _ => Ok(()),
    }
}
