//! MD5 sidecar checksums.
//!
//! Every verified data file carries a sidecar `<file>.md5` holding
//! `"<32 lowercase hex> *<basename>"`, the format `md5sum` emits. This module
//! computes digests, writes sidecars, verifies files against them, and
//! purges them from a directory.
//!
//! Digests are explicit values: `generate` returns an `Md5Digest` and
//! `verify` takes one, so there is no hidden "current checksum" to keep in
//! step with the file being checked.

use crate::error::EngineError;
use crate::model::{basename, FailedFileSet};
use std::fmt;
use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};

/// Sidecar file extension (without the dot).
pub const SIDECAR_EXTENSION: &str = "md5";

/// Length of a hex-encoded MD5 digest.
pub const DIGEST_HEX_LEN: usize = 32;

const CHUNK_SIZE: usize = 65536; // 64 KB buffer

/// A computed MD5 digest, held as lowercase hex.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Md5Digest {
    hex: String,
}

impl Md5Digest {
    /// Wrap an existing hex string (as read from a sidecar).
    pub fn from_hex(hex: impl Into<String>) -> Self {
        Md5Digest { hex: hex.into() }
    }

    pub fn hex(&self) -> &str {
        &self.hex
    }
}

impl fmt::Display for Md5Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.hex)
    }
}

/// Result of comparing a digest against a sidecar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verification {
    Verified,
    /// The sidecar disagrees; `expected` is what the sidecar holds
    Mismatch { expected: String },
}

impl Verification {
    pub fn is_verified(&self) -> bool {
        matches!(self, Verification::Verified)
    }
}

/// Path of the sidecar belonging to `path` (`<path>.md5`).
pub fn sidecar_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".");
    name.push(SIDECAR_EXTENSION);
    PathBuf::from(name)
}

/// True if `path` looks like a sidecar file.
pub fn is_sidecar(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.eq_ignore_ascii_case(SIDECAR_EXTENSION))
        .unwrap_or(false)
}

/// Stream a file through MD5.
pub fn generate(path: &Path) -> Result<Md5Digest, EngineError> {
    let mut file = File::open(path).map_err(|e| EngineError::Read {
        path: path.to_path_buf(),
        source: e,
    })?;

    let mut context = md5::Context::new();
    let mut buffer = vec![0u8; CHUNK_SIZE];
    loop {
        match file.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => context.consume(&buffer[..n]),
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => {
                return Err(EngineError::Read {
                    path: path.to_path_buf(),
                    source: e,
                })
            }
        }
    }

    Ok(Md5Digest {
        hex: format!("{:x}", context.compute()),
    })
}

/// Write `"<digest> *<basename(path)>"` to `sidecar`, replacing any existing file.
pub fn persist(path: &Path, digest: &Md5Digest, sidecar: &Path) -> Result<(), EngineError> {
    let line = format!("{} *{}", digest.hex(), basename(path));
    fs::write(sidecar, line).map_err(|e| EngineError::Write {
        path: sidecar.to_path_buf(),
        source: e,
    })
}

/// Compute the digest of `path` and write it to its sidecar.
pub fn generate_and_persist(path: &Path) -> Result<Md5Digest, EngineError> {
    let digest = generate(path)?;
    persist(path, &digest, &sidecar_path(path))?;
    Ok(digest)
}

/// Read the digest stored in the sidecar of `path`.
///
/// Only the first 32 bytes are read; anything after (the ` *name` part, a
/// trailing newline) is ignored.
pub fn read_sidecar(path: &Path) -> Result<Md5Digest, EngineError> {
    let sidecar = sidecar_path(path);
    let file = File::open(&sidecar).map_err(|e| EngineError::Read {
        path: sidecar.clone(),
        source: e,
    })?;

    let mut head = Vec::with_capacity(DIGEST_HEX_LEN);
    file.take(DIGEST_HEX_LEN as u64)
        .read_to_end(&mut head)
        .map_err(|e| EngineError::Read {
            path: sidecar.clone(),
            source: e,
        })?;

    Ok(Md5Digest::from_hex(String::from_utf8_lossy(&head).into_owned()))
}

/// Compare `digest` with the sidecar of `path`.
///
/// A mismatch is data, not an error: the basename is added to `failed` and
/// `Verification::Mismatch` is returned. Only an unreadable sidecar fails.
pub fn verify(
    path: &Path,
    digest: &Md5Digest,
    failed: &mut FailedFileSet,
) -> Result<Verification, EngineError> {
    let expected = read_sidecar(path)?;
    if expected.hex() == digest.hex() {
        tracing::debug!(file = %path.display(), "checksum verified");
        Ok(Verification::Verified)
    } else {
        tracing::warn!(
            file = %path.display(),
            expected = expected.hex(),
            actual = digest.hex(),
            "checksum mismatch"
        );
        failed.insert(basename(path));
        Ok(Verification::Mismatch {
            expected: expected.hex,
        })
    }
}

/// Delete every sidecar directly under `directory` (not recursive).
///
/// Returns the number of sidecars removed.
pub fn purge_sidecars(directory: &Path) -> Result<usize, EngineError> {
    let entries = fs::read_dir(directory).map_err(|e| EngineError::Enumeration {
        path: directory.to_path_buf(),
        source: e,
    })?;

    let mut removed = 0;
    for entry in entries {
        let entry = entry.map_err(|e| EngineError::Enumeration {
            path: directory.to_path_buf(),
            source: e,
        })?;
        let path = entry.path();
        let is_file = entry.file_type().map(|t| t.is_file()).unwrap_or(false);
        if is_file && is_sidecar(&path) {
            fs::remove_file(&path).map_err(|e| EngineError::Remove {
                path: path.clone(),
                source: e,
            })?;
            removed += 1;
        }
    }

    tracing::info!(directory = %directory.display(), removed, "purged sidecars");
    Ok(removed)
}
