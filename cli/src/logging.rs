//! Logging configuration using tracing.

use anyhow::Context;
use chrono::{DateTime, Local, TimeZone};
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Name of the log file for a run started at `started`.
pub fn log_file_name<Tz: TimeZone>(started: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    format!("{}_log.log", started.format("%Y%m%d_%H.%M"))
}

/// Initialize logging with the specified level.
///
/// `RUST_LOG` takes precedence over `level`. Output goes to stderr and, when
/// `directory` is given, to a log file in it without colours. If the log file
/// cannot be opened, logging continues on stderr alone and the failure is
/// logged there.
///
/// # Returns
/// Path of the log file, if one was opened
pub fn init(level: &str, directory: Option<&Path>) -> anyhow::Result<Option<PathBuf>> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let opened = directory.map(open_log_file).transpose();
    let (file_layer, log_path, file_error) = match opened {
        Ok(Some((file, path))) => {
            let layer = fmt::layer().with_ansi(false).with_writer(Mutex::new(file));
            (Some(layer), Some(path), None)
        }
        Ok(None) => (None, None, None),
        Err(e) => (None, None, Some(e)),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .try_init()
        .context("Failed to install log subscriber")?;

    if let Some(e) = file_error {
        tracing::warn!(error = %format!("{:#}", e), "logging to stderr only");
    }

    Ok(log_path)
}

/// Create `directory` if needed and open this run's log file in it.
pub fn open_log_file(directory: &Path) -> anyhow::Result<(File, PathBuf)> {
    fs::create_dir_all(directory)
        .with_context(|| format!("Failed to create log directory {}", directory.display()))?;
    let path = directory.join(log_file_name(&Local::now()));
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("Failed to open log file {}", path.display()))?;
    Ok((file, path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_log_file_name() {
        let started = Utc.with_ymd_and_hms(2024, 3, 7, 14, 30, 0).unwrap();
        assert_eq!(log_file_name(&started), "20240307_14.30_log.log");
    }

    #[test]
    fn test_unusable_log_directory_falls_back_to_stderr() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let blocker = temp_dir.path().join("logs");
        std::fs::write(&blocker, b"not a directory").expect("Failed to write file");

        assert!(open_log_file(&blocker).is_err());

        // The subscriber is still installed, just without a file
        let log_path = init("info", Some(&blocker)).expect("stderr logging should install");
        assert!(log_path.is_none());
        assert!(tracing::dispatcher::has_been_set());
    }
}
