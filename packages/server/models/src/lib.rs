#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! API request and response types for the desa-sos server.
//!
//! These types are serialized to JSON for the REST API. They are separate
//! from the store row types to allow independent evolution of the API
//! contract. Field names are `snake_case` on the wire.

use desa_sos_database_models::{EmergencyCounts, EmergencyQuery};
use desa_sos_emergency_models::{EmergencyReport, EmergencyStatus, EmergencyType};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Page size used when the request does not specify one.
pub const DEFAULT_PAGE_LIMIT: u32 = 10;

/// Largest accepted page size.
pub const MAX_PAGE_LIMIT: u32 = 100;

/// Body of `POST /private/emergencies`.
///
/// Coordinates are optional on the wire; blank or missing values are
/// stored as the `"0"` sentinel.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateEmergencyRequest {
    /// Contact phone number.
    #[serde(default)]
    pub phone_number: String,
    /// Decimal latitude.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latitude: Option<String>,
    /// Decimal longitude.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub longitude: Option<String>,
    /// Report text.
    #[serde(default)]
    pub message: String,
}

/// Query parameters for `GET /admin/emergencies`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListEmergenciesParams {
    /// 1-based page number.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    /// Page size.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
    /// Only handled (`true`) or unhandled (`false`) reports.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_handled: Option<bool>,
    /// Only reports in this status.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<EmergencyStatus>,
}

impl ListEmergenciesParams {
    /// Effective page number (at least 1).
    #[must_use]
    pub fn page(&self) -> u32 {
        self.page.unwrap_or(1).max(1)
    }

    /// Effective page size, defaulted and clamped to
    /// `1..=MAX_PAGE_LIMIT`.
    #[must_use]
    pub fn limit(&self) -> u32 {
        self.limit
            .unwrap_or(DEFAULT_PAGE_LIMIT)
            .clamp(1, MAX_PAGE_LIMIT)
    }

    /// Translates the request into a store query.
    #[must_use]
    pub fn to_query(&self) -> EmergencyQuery {
        let limit = self.limit();
        EmergencyQuery {
            handled: self.is_handled,
            status: self.status,
            limit,
            offset: (self.page() - 1).saturating_mul(limit),
        }
    }
}

/// Body of `PATCH /admin/emergencies/{id}`. An empty body resolves the
/// report.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateEmergencyRequest {
    /// Target status.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<EmergencyStatus>,
}

impl UpdateEmergencyRequest {
    /// The status this request asks for.
    #[must_use]
    pub fn target(&self) -> EmergencyStatus {
        self.status.unwrap_or(EmergencyStatus::Resolved)
    }
}

/// Pagination block of a list response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiPagination {
    /// Current 1-based page.
    pub page: u32,
    /// Page size.
    pub limit: u32,
    /// Number of reports matching the filter.
    pub total: u64,
    /// Number of pages at this page size.
    pub total_pages: u64,
}

impl ApiPagination {
    /// Builds the block for `total` matching reports.
    #[must_use]
    pub fn new(page: u32, limit: u32, total: u64) -> Self {
        let limit_wide = u64::from(limit.max(1));
        Self {
            page,
            limit,
            total,
            total_pages: total.div_ceil(limit_wide),
        }
    }
}

/// Response of `GET /admin/emergencies`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiEmergencyList {
    /// Reports on this page, newest first.
    pub data: Vec<EmergencyReport>,
    /// Totals.
    pub pagination: ApiPagination,
}

/// Response of `GET /admin/emergencies/count`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiEmergencyCount {
    /// All reports.
    pub total: u64,
    /// Reports in `OPEN`.
    pub open: u64,
    /// Reports in `IN_PROGRESS`.
    pub in_progress: u64,
    /// Reports in `RESOLVED`.
    pub resolved: u64,
    /// Reports not yet handled.
    pub unhandled: u64,
}

impl From<EmergencyCounts> for ApiEmergencyCount {
    fn from(counts: EmergencyCounts) -> Self {
        Self {
            total: counts.total,
            open: counts.open,
            in_progress: counts.in_progress,
            resolved: counts.resolved,
            unhandled: counts.unhandled,
        }
    }
}

/// Response of `DELETE /admin/emergencies/{id}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiDeleted {
    /// Id of the removed report.
    pub id: String,
}

/// One entry of `GET /public/emergency-types`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiEmergencyType {
    /// Stable key.
    pub key: EmergencyType,
    /// Display label.
    pub label: String,
    /// Canned description used as the report message.
    pub description: String,
}

impl From<EmergencyType> for ApiEmergencyType {
    fn from(kind: EmergencyType) -> Self {
        Self {
            key: kind,
            label: kind.label().to_string(),
            description: kind.description().to_string(),
        }
    }
}

/// Portal role of a session user.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Role {
    /// Village administrator; may use `/admin`.
    Admin,
    /// Resident.
    Warga,
}

/// Response of `GET /private/me`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiProfile {
    /// User id.
    pub user_id: String,
    /// Display name.
    pub display_name: String,
    /// Phone number on file.
    pub phone_number: Option<String>,
    /// Portal role.
    pub role: Role,
}

/// Query parameters for the long-polling endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollParams {
    /// Seconds to wait for the first event. `0` returns immediately.
    pub wait_secs: Option<u64>,
    /// Cursor from the previous response. Absent on the first poll, which
    /// starts at the newest event.
    pub since: Option<u64>,
}

/// Error body returned by every endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiError {
    /// Machine-readable kind, e.g. `validation` or `not_found`.
    pub error: String,
    /// Human-readable description.
    pub message: String,
}

/// Health check response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiHealth {
    /// Whether the service is healthy.
    pub healthy: bool,
    /// Service version.
    pub version: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_params_default_and_clamp() {
        let params = ListEmergenciesParams::default();
        assert_eq!(params.page(), 1);
        assert_eq!(params.limit(), DEFAULT_PAGE_LIMIT);

        let params = ListEmergenciesParams {
            page: Some(0),
            limit: Some(1000),
            ..ListEmergenciesParams::default()
        };
        assert_eq!(params.page(), 1);
        assert_eq!(params.limit(), MAX_PAGE_LIMIT);

        let params = ListEmergenciesParams {
            limit: Some(0),
            ..ListEmergenciesParams::default()
        };
        assert_eq!(params.limit(), 1);
    }

    #[test]
    fn list_params_translate_page_to_offset() {
        let params = ListEmergenciesParams {
            page: Some(3),
            limit: Some(20),
            is_handled: Some(false),
            status: None,
        };
        let query = params.to_query();
        assert_eq!(query.offset, 40);
        assert_eq!(query.limit, 20);
        assert_eq!(query.handled, Some(false));
    }

    #[test]
    fn pagination_rounds_pages_up() {
        assert_eq!(ApiPagination::new(1, 10, 0).total_pages, 0);
        assert_eq!(ApiPagination::new(1, 10, 10).total_pages, 1);
        assert_eq!(ApiPagination::new(1, 10, 11).total_pages, 2);
    }

    #[test]
    fn empty_update_body_resolves() {
        let body: UpdateEmergencyRequest = serde_json::from_str("{}").unwrap();
        assert_eq!(body.target(), EmergencyStatus::Resolved);

        let body: UpdateEmergencyRequest =
            serde_json::from_str(r#"{"status":"IN_PROGRESS"}"#).unwrap();
        assert_eq!(body.target(), EmergencyStatus::InProgress);
    }

    #[test]
    fn create_request_accepts_missing_coordinates() {
        let body: CreateEmergencyRequest =
            serde_json::from_str(r#"{"phone_number":"0812","message":"Banjir"}"#).unwrap();
        assert_eq!(body.latitude, None);
        assert_eq!(body.longitude, None);
    }

    #[test]
    fn emergency_type_entry_uses_catalog_text() {
        let entry = ApiEmergencyType::from(EmergencyType::Medis);
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["key"], "medis");
        assert_eq!(json["description"], EmergencyType::Medis.description());
    }
}
