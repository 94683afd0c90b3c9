//! Configuration management for the CLI.
//!
//! Loads settings from a TOML file. Every section is optional; command-line
//! flags override whatever the file provides.

use anyhow::Context;
use engine::backup::{BATCH_UPLOAD_SUFFIX, TRACKING_SHEET_SUFFIX};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub backup: BackupConfig,
    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Flat holding area for staged backups
    pub staging_root: Option<PathBuf>,

    /// Root of the batch archive (`<backup_root>/<engineer>/batch_*`)
    pub backup_root: Option<PathBuf>,

    /// Root of the drive mirrors (`<mirror_root>/<engineer>`)
    pub mirror_root: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupConfig {
    /// Extensions that get checksum sidecars
    #[serde(default = "default_audio_extensions")]
    pub audio_extensions: Vec<String>,

    /// File name suffixes a session must contain
    #[serde(default = "default_required_companions")]
    pub required_companions: Vec<String>,

    /// Known engineers, spelled as their archive directories should be
    #[serde(default)]
    pub engineers: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Directory for log files; stderr only when unset
    #[serde(default)]
    pub directory: Option<PathBuf>,
}

// Default values
fn default_audio_extensions() -> Vec<String> {
    vec!["wav".to_string()]
}

fn default_required_companions() -> Vec<String> {
    vec![
        TRACKING_SHEET_SUFFIX.to_string(),
        BATCH_UPLOAD_SUFFIX.to_string(),
    ]
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for BackupConfig {
    fn default() -> Self {
        BackupConfig {
            audio_extensions: default_audio_extensions(),
            required_companions: default_required_companions(),
            engineers: Vec::new(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        LogConfig {
            level: default_log_level(),
            directory: None,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        Ok(config)
    }

    /// Load `path` if given, otherwise use defaults.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => Ok(Self::default()),
        }
    }

    /// Roster spelling of `name`, matched case-insensitively.
    pub fn engineer_spelling(&self, name: &str) -> Option<&str> {
        self.backup
            .engineers
            .iter()
            .find(|e| e.eq_ignore_ascii_case(name))
            .map(String::as_str)
    }
}
