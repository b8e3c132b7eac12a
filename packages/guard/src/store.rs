//! Durable lockout state.
//!
//! The record is two values under well-known keys, `sos_cancel_count` and
//! `sos_block_until` (epoch milliseconds), so a restart still enforces a
//! running lockout.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::GuardError;

/// Persisted lockout state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockoutRecord {
    /// Cancellations since the counter was last cleared.
    #[serde(rename = "sos_cancel_count", default)]
    pub cancel_count: u32,
    /// End of the current lockout, if any.
    #[serde(
        rename = "sos_block_until",
        default,
        with = "chrono::serde::ts_milliseconds_option"
    )]
    pub block_until: Option<DateTime<Utc>>,
}

/// Where the guard keeps its [`LockoutRecord`].
pub trait LockoutStore: Send {
    /// Reads the stored record, or the default when nothing is stored.
    ///
    /// # Errors
    ///
    /// Returns [`GuardError`] if the backing storage cannot be read.
    fn load(&self) -> Result<LockoutRecord, GuardError>;

    /// Replaces the stored record.
    ///
    /// # Errors
    ///
    /// Returns [`GuardError`] if the backing storage cannot be written.
    fn save(&mut self, record: &LockoutRecord) -> Result<(), GuardError>;
}

/// In-memory store. Clones share the same record, which lets a test
/// build a second guard over the same state to simulate a reload.
#[derive(Debug, Clone, Default)]
pub struct MemoryLockoutStore {
    record: Arc<Mutex<LockoutRecord>>,
}

impl MemoryLockoutStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current record.
    #[must_use]
    pub fn snapshot(&self) -> LockoutRecord {
        *self.record.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl LockoutStore for MemoryLockoutStore {
    fn load(&self) -> Result<LockoutRecord, GuardError> {
        Ok(self.snapshot())
    }

    fn save(&mut self, record: &LockoutRecord) -> Result<(), GuardError> {
        *self.record.lock().unwrap_or_else(PoisonError::into_inner) = *record;
        Ok(())
    }
}

/// JSON file store.
#[derive(Debug, Clone)]
pub struct FileLockoutStore {
    path: PathBuf,
}

impl FileLockoutStore {
    /// Default location, relative to the working directory.
    pub const DEFAULT_PATH: &'static str = "data/sos_guard.json";

    /// Uses the file at `path`. The file is created on first save.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl LockoutStore for FileLockoutStore {
    fn load(&self) -> Result<LockoutRecord, GuardError> {
        let text = match std::fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(LockoutRecord::default());
            }
            Err(e) => return Err(e.into()),
        };

        match serde_json::from_str(&text) {
            Ok(record) => Ok(record),
            Err(e) => {
                log::warn!(
                    "Ignoring unreadable lockout state in {}: {e}",
                    self.path.display()
                );
                Ok(LockoutRecord::default())
            }
        }
    }

    fn save(&mut self, record: &LockoutRecord) -> Result<(), GuardError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, serde_json::to_string_pretty(record)?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone as _;

    use super::*;

    #[test]
    fn record_uses_well_known_keys() {
        let record = LockoutRecord {
            cancel_count: 5,
            block_until: Some(Utc.timestamp_millis_opt(1_700_000_060_000).unwrap()),
        };
        let json = serde_json::to_value(record).unwrap();
        assert_eq!(json["sos_cancel_count"], 5);
        assert_eq!(json["sos_block_until"], 1_700_000_060_000_i64);
    }

    #[test]
    fn file_store_round_trips_and_tolerates_missing_or_corrupt_files() {
        let path = std::env::temp_dir()
            .join(format!("desa_sos_guard_{}", uuid::Uuid::new_v4()))
            .join("guard.json");
        let mut store = FileLockoutStore::new(&path);
        assert_eq!(store.load().unwrap(), LockoutRecord::default());

        let record = LockoutRecord {
            cancel_count: 2,
            block_until: None,
        };
        store.save(&record).unwrap();
        assert_eq!(FileLockoutStore::new(&path).load().unwrap(), record);

        std::fs::write(&path, "not json").unwrap();
        assert_eq!(store.load().unwrap(), LockoutRecord::default());

        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }
}
