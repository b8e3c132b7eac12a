//! Realtime lifecycle events pushed to admin dashboards.

use serde::{Deserialize, Serialize};

use crate::EmergencyReport;

/// Payload of an [`EmergencyEvent::EmergencyDeleted`] event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeletedEmergency {
    /// Id of the removed report.
    pub id: String,
}

/// A server-originated emergency lifecycle event.
///
/// Serialized as `{"event": "<name>", "data": ...}` where the name is one
/// of `new_emergency`, `emergency_updated` or `emergency_deleted`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum EmergencyEvent {
    /// A report was created.
    NewEmergency(EmergencyReport),
    /// A report changed status.
    EmergencyUpdated(EmergencyReport),
    /// A report was removed.
    EmergencyDeleted(DeletedEmergency),
}

impl EmergencyEvent {
    /// Wire name of the event.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::NewEmergency(_) => "new_emergency",
            Self::EmergencyUpdated(_) => "emergency_updated",
            Self::EmergencyDeleted(_) => "emergency_deleted",
        }
    }

    /// Id of the report this event refers to.
    #[must_use]
    pub fn report_id(&self) -> &str {
        match self {
            Self::NewEmergency(report) | Self::EmergencyUpdated(report) => &report.id,
            Self::EmergencyDeleted(deleted) => &deleted.id,
        }
    }
}
