#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Emergency (SOS) report types shared across the desa-sos system.
//!
//! Defines the [`EmergencyReport`] record, its explicit status lifecycle,
//! the location representation with its `"0"`/`"0"` sentinel, the fixed
//! emergency type catalog and the realtime event union pushed to admin
//! dashboards.

pub mod catalog;
pub mod event;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

pub use catalog::{EmergencyType, MAX_ADDITIONAL_INFO_CHARS, compose_message};
pub use event::{DeletedEmergency, EmergencyEvent};

/// Maximum length of a report message, in characters.
pub const MAX_MESSAGE_CHARS: usize = 500;

/// Coordinate value used when the reporter's location could not be
/// acquired.
pub const UNRESOLVED_COORDINATE: &str = "0";

/// Lifecycle state of an emergency report.
///
/// Transitions only move forward: `OPEN → IN_PROGRESS → RESOLVED`, with
/// `OPEN → RESOLVED` allowed as a shortcut.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum EmergencyStatus {
    /// Reported, nobody has picked it up yet
    Open,
    /// An admin is dispatching help
    InProgress,
    /// Handled; terminal
    Resolved,
}

impl EmergencyStatus {
    /// Whether this status counts as "handled" in the boolean contract.
    #[must_use]
    pub const fn is_handled(self) -> bool {
        matches!(self, Self::Resolved)
    }

    /// Whether a report in this status may move to `next`.
    ///
    /// A transition to the same status is not a transition and returns
    /// `false`; callers treat it as a no-op.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Open, Self::InProgress | Self::Resolved) | (Self::InProgress, Self::Resolved)
        )
    }

    /// Statuses a report may be in to move to `self`.
    #[must_use]
    pub const fn predecessors(self) -> &'static [Self] {
        match self {
            Self::Open => &[],
            Self::InProgress => &[Self::Open],
            Self::Resolved => &[Self::Open, Self::InProgress],
        }
    }

    /// Returns all variants of this enum.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[Self::Open, Self::InProgress, Self::Resolved]
    }
}

/// Error returned when a latitude/longitude pair cannot be accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidCoordinatesError {
    /// The rejected input.
    pub value: String,
    /// Which axis was rejected (`"latitude"` or `"longitude"`).
    pub axis: &'static str,
}

impl std::fmt::Display for InvalidCoordinatesError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid {} value {:?}", self.axis, self.value)
    }
}

impl std::error::Error for InvalidCoordinatesError {}

/// A reporter location as decimal strings.
///
/// Both values are always present. `"0"`/`"0"` marks a location that could
/// not be acquired.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Coordinates {
    /// Latitude in decimal degrees.
    pub latitude: String,
    /// Longitude in decimal degrees.
    pub longitude: String,
}

impl Coordinates {
    /// The sentinel pair used when no location is available.
    #[must_use]
    pub fn unresolved() -> Self {
        Self {
            latitude: UNRESOLVED_COORDINATE.to_string(),
            longitude: UNRESOLVED_COORDINATE.to_string(),
        }
    }

    /// Builds coordinates from a device fix.
    #[must_use]
    pub fn from_degrees(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude: latitude.to_string(),
            longitude: longitude.to_string(),
        }
    }

    /// Validates raw input, substituting the sentinel for missing or blank
    /// values. Accepted strings are kept verbatim (trimmed) so that the
    /// exact decimal representation round-trips.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidCoordinatesError`] if a value is not a finite
    /// decimal or lies outside the WGS84 range.
    pub fn parse(
        latitude: Option<&str>,
        longitude: Option<&str>,
    ) -> Result<Self, InvalidCoordinatesError> {
        Ok(Self {
            latitude: parse_axis(latitude, "latitude", 90.0)?,
            longitude: parse_axis(longitude, "longitude", 180.0)?,
        })
    }

    /// Whether this is the "location unavailable" sentinel.
    #[must_use]
    pub fn is_unresolved(&self) -> bool {
        self.to_degrees().is_none()
    }

    /// Returns `(latitude, longitude)` in degrees, or `None` for the
    /// sentinel or an unparsable value.
    #[must_use]
    pub fn to_degrees(&self) -> Option<(f64, f64)> {
        let lat: f64 = self.latitude.trim().parse().ok()?;
        let lon: f64 = self.longitude.trim().parse().ok()?;
        #[allow(clippy::float_cmp)]
        if lat == 0.0 && lon == 0.0 {
            return None;
        }
        Some((lat, lon))
    }
}

fn parse_axis(
    value: Option<&str>,
    axis: &'static str,
    bound: f64,
) -> Result<String, InvalidCoordinatesError> {
    let Some(raw) = value.map(str::trim).filter(|v| !v.is_empty()) else {
        return Ok(UNRESOLVED_COORDINATE.to_string());
    };

    match raw.parse::<f64>() {
        Ok(v) if v.is_finite() && v.abs() <= bound => Ok(raw.to_string()),
        _ => Err(InvalidCoordinatesError {
            value: raw.to_string(),
            axis,
        }),
    }
}

/// An emergency report as stored and served.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmergencyReport {
    /// Opaque unique id, server-assigned.
    pub id: String,
    /// Reporting user, if known. Not an owning reference.
    pub user_id: Option<String>,
    /// Display name of the reporting user, filled in on read.
    pub reporter_name: Option<String>,
    /// Contact phone number.
    pub phone_number: String,
    /// Latitude as a decimal string (`"0"` when unavailable).
    pub latitude: String,
    /// Longitude as a decimal string (`"0"` when unavailable).
    pub longitude: String,
    /// Composed report text.
    pub message: String,
    /// Lifecycle state.
    pub status: EmergencyStatus,
    /// `true` once the report is resolved.
    pub is_handled: bool,
    /// When the report was created.
    pub created_at: DateTime<Utc>,
    /// When the status last changed.
    pub updated_at: DateTime<Utc>,
}

impl EmergencyReport {
    /// The report location.
    #[must_use]
    pub fn coordinates(&self) -> Coordinates {
        Coordinates {
            latitude: self.latitude.clone(),
            longitude: self.longitude.clone(),
        }
    }

    /// Moves the report to `status`, keeping `is_handled` in step.
    pub fn set_status(&mut self, status: EmergencyStatus, at: DateTime<Utc>) {
        self.status = status;
        self.is_handled = status.is_handled();
        self.updated_at = at;
    }
}
