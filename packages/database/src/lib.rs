#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Emergency report persistence.
//!
//! [`EmergencyStore`] is the single source of truth for emergency
//! records. [`sqlite::SqliteEmergencyStore`] persists through
//! `switchy_database`; [`memory::MemoryEmergencyStore`] keeps everything in
//! process and backs the tests.
//!
//! Concurrent writes to the same report are last-write-wins. There is no
//! version column; the last `update_status` or `delete` to reach the store
//! is the one that sticks.

pub mod memory;
pub mod sqlite;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use desa_sos_database_models::{
    EmergencyCounts, EmergencyPage, EmergencyQuery, NewEmergency, UserRow,
};
use desa_sos_emergency_models::{EmergencyReport, EmergencyStatus};

/// Errors that can occur during store operations.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    /// Database query error.
    #[error("Database error: {0}")]
    Database(#[from] switchy_database::DatabaseError),

    /// The database could not be opened.
    #[error("Failed to open database: {message}")]
    Open {
        /// Description of what went wrong.
        message: String,
    },

    /// I/O error while preparing the database location.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Data conversion error.
    #[error("Data conversion error: {message}")]
    Conversion {
        /// Description of what went wrong.
        message: String,
    },
}

/// Storage for emergency reports.
#[async_trait]
pub trait EmergencyStore: Send + Sync {
    /// Persists a new report with status `OPEN` and returns it as stored.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the write fails.
    async fn insert(&self, new: NewEmergency) -> Result<EmergencyReport, DbError>;

    /// Fetches one report.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the read fails.
    async fn get(&self, id: &str) -> Result<Option<EmergencyReport>, DbError>;

    /// Lists reports newest first.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the read fails.
    async fn list(&self, query: &EmergencyQuery) -> Result<EmergencyPage, DbError>;

    /// Counts reports per status.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the read fails.
    async fn count(&self) -> Result<EmergencyCounts, DbError>;

    /// Moves a report to `status`, provided its stored status is one of
    /// [`EmergencyStatus::predecessors`]. The check and the write are one
    /// atomic step. Returns `None` if the report does not exist or its
    /// stored status does not allow the move.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the write fails.
    async fn update_status(
        &self,
        id: &str,
        status: EmergencyStatus,
        at: DateTime<Utc>,
    ) -> Result<Option<EmergencyReport>, DbError>;

    /// Removes a report. Returns `false` if it did not exist.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the write fails.
    async fn delete(&self, id: &str) -> Result<bool, DbError>;

    /// Records (or refreshes) a user so reports can show who sent them.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the write fails.
    async fn upsert_user(&self, user: &UserRow) -> Result<(), DbError>;
}
