//! Local copy of the report set, kept current by realtime events.

use desa_sos_emergency_models::{EmergencyEvent, EmergencyReport};

/// Reports known to one dashboard, newest first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EmergencyMirror {
    reports: Vec<EmergencyReport>,
}

impl EmergencyMirror {
    /// Empty mirror.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the contents with a freshly fetched list.
    pub fn replace_all(&mut self, reports: Vec<EmergencyReport>) {
        self.reports = reports;
    }

    /// Merges one event. Returns `false` when the event changed nothing.
    ///
    /// An update older than the mirrored copy is ignored, so a delayed
    /// event cannot roll back a list fetched after it.
    pub fn apply(&mut self, event: &EmergencyEvent) -> bool {
        match event {
            EmergencyEvent::NewEmergency(report) => {
                self.reports.retain(|r| r.id != report.id);
                self.reports.insert(0, report.clone());
                true
            }
            EmergencyEvent::EmergencyUpdated(report) => {
                if let Some(existing) = self.reports.iter_mut().find(|r| r.id == report.id) {
                    if *existing == *report || report.updated_at < existing.updated_at {
                        if *existing != *report {
                            log::debug!("Ignoring stale update for emergency {}", report.id);
                        }
                        return false;
                    }
                    *existing = report.clone();
                } else {
                    let at = self
                        .reports
                        .iter()
                        .position(|r| r.created_at < report.created_at)
                        .unwrap_or(self.reports.len());
                    self.reports.insert(at, report.clone());
                }
                true
            }
            EmergencyEvent::EmergencyDeleted(deleted) => {
                let before = self.reports.len();
                self.reports.retain(|r| r.id != deleted.id);
                self.reports.len() != before
            }
        }
    }

    /// Looks up a report by id.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&EmergencyReport> {
        self.reports.iter().find(|r| r.id == id)
    }

    /// All reports, newest first.
    #[must_use]
    pub fn reports(&self) -> &[EmergencyReport] {
        &self.reports
    }

    /// Number of mirrored reports.
    #[must_use]
    pub fn len(&self) -> usize {
        self.reports.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.reports.is_empty()
    }
}
