//! Configuration file parser for ~/.config/lincast/config.toml.
//!
//! The config file is optional and a missing file yields `Config::default()`.
//! Unknown keys are accepted by serde but logged as likely typos.
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::feed::{DEFAULT_FETCH_TIMEOUT, DEFAULT_USER_AGENT};
use crate::update::{
    default_worker_count, DEFAULT_EPISODE_INTERVAL, DEFAULT_JOB_TIMEOUT, DEFAULT_REFRESH_INTERVAL,
};

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// Config file exceeds the maximum allowed size.
    #[error("Config file too large: {0}")]
    TooLarge(String),
}

// ============================================================================
// Configuration Structs
// ============================================================================

/// Top-level application configuration.
///
/// All fields use `#[serde(default)]` so any subset of keys can be specified.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Number of refresh workers. 0 = one per available CPU.
    pub workers: usize,

    /// Minutes between refreshes of all subscribed podcasts. 0 = only at
    /// startup and on request.
    pub refresh_interval_minutes: u64,

    /// Minimum milliseconds between two episodes stored by one worker.
    pub episode_interval_ms: u64,

    /// Deadline for a whole refresh job in seconds. 0 = no deadline.
    pub job_timeout_secs: u64,

    /// Timeout for one feed request in seconds.
    pub fetch_timeout_secs: u64,

    /// User-Agent header sent with feed requests.
    pub user_agent: String,

    /// Allow feeds on localhost and private networks.
    pub allow_private_hosts: bool,

    /// SQLite database file. Relative paths resolve against the config
    /// directory; unset means `podcasts.sqlite` there.
    pub database_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            workers: 0,
            refresh_interval_minutes: DEFAULT_REFRESH_INTERVAL.as_secs() / 60,
            episode_interval_ms: DEFAULT_EPISODE_INTERVAL.as_millis() as u64,
            job_timeout_secs: DEFAULT_JOB_TIMEOUT.as_secs(),
            fetch_timeout_secs: DEFAULT_FETCH_TIMEOUT.as_secs(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            allow_private_hosts: false,
            database_path: None,
        }
    }
}

impl Config {
    /// Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    const KNOWN_KEYS: [&'static str; 8] = [
        "workers",
        "refresh_interval_minutes",
        "episode_interval_ms",
        "job_timeout_secs",
        "fetch_timeout_secs",
        "user_agent",
        "allow_private_hosts",
        "database_path",
    ];

    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - Unknown keys → accepted, logged as warning
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        // Check the size before reading so a huge file is never loaded
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > Self::MAX_FILE_SIZE => {
                return Err(ConfigError::TooLarge(format!(
                    "Config file is {} bytes (max {} bytes)",
                    meta.len(),
                    Self::MAX_FILE_SIZE
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
            Ok(_) => {}
        }

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                // Deleted between metadata and read
                tracing::debug!(path = %path.display(), "Config file disappeared, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        if content.trim().is_empty() {
            tracing::debug!(path = %path.display(), "Config file is empty, using defaults");
            return Ok(Self::default());
        }

        if let Ok(raw) = content.parse::<toml::Table>() {
            for key in raw.keys() {
                if !Self::KNOWN_KEYS.contains(&key.as_str()) {
                    tracing::warn!(key = %key, "Unknown key in config file, ignoring");
                }
            }
        }

        let config: Config = toml::from_str(&content)?;
        tracing::info!(
            path = %path.display(),
            workers = config.worker_count(),
            refresh_interval_minutes = config.refresh_interval_minutes,
            "Loaded configuration"
        );
        Ok(config)
    }

    /// Effective worker count, resolving 0 to the available parallelism
    pub fn worker_count(&self) -> usize {
        if self.workers == 0 {
            default_worker_count()
        } else {
            self.workers
        }
    }

    pub fn refresh_interval(&self) -> Option<Duration> {
        match self.refresh_interval_minutes {
            0 => None,
            minutes => Some(Duration::from_secs(minutes.saturating_mul(60))),
        }
    }

    pub fn episode_interval(&self) -> Duration {
        Duration::from_millis(self.episode_interval_ms)
    }

    pub fn job_timeout(&self) -> Option<Duration> {
        match self.job_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs.max(1))
    }

    /// Database location, with relative paths anchored at `config_dir`
    pub fn database_path(&self, config_dir: &Path) -> PathBuf {
        match &self.database_path {
            Some(path) if path.is_absolute() => path.clone(),
            Some(path) => config_dir.join(path),
            None => config_dir.join("podcasts.sqlite"),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
