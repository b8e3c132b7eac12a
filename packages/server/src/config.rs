//! Server configuration.
//!
//! Settings come from an optional TOML file (`DESA_SOS_CONFIG`, default
//! `desa_sos.toml`) and are then overridden by the `BIND_ADDR`, `PORT` and
//! `DATABASE_PATH` environment variables. Sections of the file that belong
//! to other components (such as `[guard]`) are ignored here.

use std::path::{Path, PathBuf};
use std::time::Duration;

use desa_sos_database::sqlite::DEFAULT_DB_PATH;
use desa_sos_realtime::hub::DEFAULT_CAPACITY;
use serde::Deserialize;

use crate::auth::SessionEntry;

/// Environment variable naming the configuration file.
pub const CONFIG_ENV: &str = "DESA_SOS_CONFIG";

/// Configuration file read when [`CONFIG_ENV`] is unset.
pub const DEFAULT_CONFIG_PATH: &str = "desa_sos.toml";

/// Errors raised while loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("Failed to read config file {path}: {source}")]
    Io {
        /// File that was being read.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// The configuration file is not valid TOML for this schema.
    #[error("Invalid config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// An environment override could not be parsed.
    #[error("Invalid value {value:?} for {name}")]
    InvalidEnv {
        /// Variable name.
        name: &'static str,
        /// Rejected value.
        value: String,
    },
}

/// Realtime tuning.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RealtimeSettings {
    /// Events buffered per subscriber before it starts skipping.
    pub capacity: usize,
    /// Seconds of silence before an SSE keep-alive comment is sent.
    pub keep_alive_secs: u64,
    /// Default long-poll wait in seconds.
    pub poll_wait_secs: u64,
    /// Longest long-poll wait a client may ask for, in seconds.
    pub max_poll_wait_secs: u64,
    /// Reconnect delay advertised to SSE clients, in milliseconds.
    pub retry_millis: u64,
}

impl Default for RealtimeSettings {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            keep_alive_secs: 15,
            poll_wait_secs: 25,
            max_poll_wait_secs: 60,
            retry_millis: 3000,
        }
    }
}

impl RealtimeSettings {
    /// SSE keep-alive interval.
    #[must_use]
    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(self.keep_alive_secs.max(1))
    }

    /// Effective long-poll wait for a requested number of seconds.
    #[must_use]
    pub fn poll_wait(&self, requested: Option<u64>) -> Duration {
        Duration::from_secs(
            requested
                .unwrap_or(self.poll_wait_secs)
                .min(self.max_poll_wait_secs),
        )
    }
}

/// Top-level server configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Interface to bind.
    pub bind_addr: String,
    /// Port to bind.
    pub port: u16,
    /// `SQLite` database file.
    pub database_path: PathBuf,
    /// Realtime tuning.
    pub realtime: RealtimeSettings,
    /// Known sessions. Session issuance lives outside this service; the
    /// table stands in for it.
    pub sessions: Vec<SessionEntry>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1".to_string(),
            port: 8080,
            database_path: PathBuf::from(DEFAULT_DB_PATH),
            realtime: RealtimeSettings::default(),
            sessions: Vec::new(),
        }
    }
}

impl ServerConfig {
    /// Loads the configuration file named by [`CONFIG_ENV`] (or
    /// [`DEFAULT_CONFIG_PATH`]) and applies environment overrides.
    ///
    /// A missing default file is not an error; a missing file that was
    /// named explicitly is.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read or parsed, or if
    /// an environment override is malformed.
    pub fn load() -> Result<Self, ConfigError> {
        let explicit = std::env::var(CONFIG_ENV).ok();
        let path = PathBuf::from(explicit.as_deref().unwrap_or(DEFAULT_CONFIG_PATH));

        let mut config = if explicit.is_none() && !path.exists() {
            log::info!("No config file at {}, using defaults", path.display());
            Self::default()
        } else {
            Self::from_file(&path)?
        };

        config.apply_env(|name| std::env::var(name).ok())?;
        Ok(config)
    }

    /// Reads and parses a configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        log::info!("Loaded config from {}", path.display());
        Self::from_toml_str(&text)
    }

    /// Parses configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] if the text is not valid.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Applies `BIND_ADDR`, `PORT` and `DATABASE_PATH` from `lookup`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidEnv`] if `PORT` is not a port number.
    pub fn apply_env(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(addr) = lookup("BIND_ADDR") {
            self.bind_addr = addr;
        }
        if let Some(port) = lookup("PORT") {
            self.port = port
                .parse()
                .map_err(|_| ConfigError::InvalidEnv { name: "PORT", value: port })?;
        }
        if let Some(path) = lookup("DATABASE_PATH") {
            self.database_path = PathBuf::from(path);
        }
        Ok(())
    }
}
