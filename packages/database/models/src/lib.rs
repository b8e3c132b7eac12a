#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Row types and query parameter definitions for the emergency store.
//!
//! These types describe what goes into and comes out of the store. They
//! are distinct from the API types in `desa_sos_server_models` so that the
//! HTTP contract can evolve independently.

use chrono::{DateTime, Utc};
use desa_sos_emergency_models::{Coordinates, EmergencyReport, EmergencyStatus};
use serde::{Deserialize, Serialize};

/// A validated report ready to be inserted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewEmergency {
    /// Server-assigned id.
    pub id: String,
    /// Reporting user.
    pub user_id: Option<String>,
    /// Contact phone number.
    pub phone_number: String,
    /// Location (sentinel when unavailable).
    pub coordinates: Coordinates,
    /// Composed report text.
    pub message: String,
    /// Server timestamp.
    pub created_at: DateTime<Utc>,
}

impl NewEmergency {
    /// The record this insert produces, before reporter enrichment.
    #[must_use]
    pub fn into_report(self) -> EmergencyReport {
        EmergencyReport {
            id: self.id,
            user_id: self.user_id,
            reporter_name: None,
            phone_number: self.phone_number,
            latitude: self.coordinates.latitude,
            longitude: self.coordinates.longitude,
            message: self.message,
            status: EmergencyStatus::Open,
            is_handled: false,
            created_at: self.created_at,
            updated_at: self.created_at,
        }
    }
}

/// Parameters for listing reports.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmergencyQuery {
    /// Filter on the handled flag (`None` = don't filter).
    pub handled: Option<bool>,
    /// Filter on an exact status (`None` = don't filter).
    pub status: Option<EmergencyStatus>,
    /// Maximum number of results to return.
    pub limit: u32,
    /// Number of results to skip.
    pub offset: u32,
}

impl EmergencyQuery {
    /// Whether `report` passes this query's filters.
    #[must_use]
    pub fn matches(&self, report: &EmergencyReport) -> bool {
        self.handled.is_none_or(|h| report.status.is_handled() == h)
            && self.status.is_none_or(|s| report.status == s)
    }
}

/// One page of reports plus the total matching the filters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmergencyPage {
    /// Reports on this page, newest first.
    pub reports: Vec<EmergencyReport>,
    /// Total reports matching the filters across all pages.
    pub total: u64,
}

/// Aggregate counts for dashboard badges.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmergencyCounts {
    /// All reports.
    pub total: u64,
    /// Reports in `OPEN`.
    pub open: u64,
    /// Reports in `IN_PROGRESS`.
    pub in_progress: u64,
    /// Reports in `RESOLVED`.
    pub resolved: u64,
    /// Reports not yet resolved.
    pub unhandled: u64,
}

impl EmergencyCounts {
    /// Adds `count` reports in `status`.
    pub const fn add(&mut self, status: EmergencyStatus, count: u64) {
        match status {
            EmergencyStatus::Open => self.open += count,
            EmergencyStatus::InProgress => self.in_progress += count,
            EmergencyStatus::Resolved => self.resolved += count,
        }
        self.total += count;
        self.unhandled = self.open + self.in_progress;
    }
}

/// A portal user known to the emergency store, used to put a name on
/// reports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRow {
    /// User id.
    pub id: String,
    /// Display name.
    pub display_name: String,
    /// Phone number on the profile.
    pub phone_number: Option<String>,
}
