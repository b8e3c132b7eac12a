//! In-process emergency store.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use desa_sos_database_models::{
    EmergencyCounts, EmergencyPage, EmergencyQuery, NewEmergency, UserRow,
};
use desa_sos_emergency_models::{EmergencyReport, EmergencyStatus};
use tokio::sync::RwLock;

use crate::{DbError, EmergencyStore};

#[derive(Default)]
struct Inner {
    /// Insertion order, oldest first.
    reports: Vec<EmergencyReport>,
    users: BTreeMap<String, UserRow>,
}

impl Inner {
    fn enrich(&self, mut report: EmergencyReport) -> EmergencyReport {
        report.reporter_name = report
            .user_id
            .as_ref()
            .and_then(|id| self.users.get(id))
            .map(|u| u.display_name.clone());
        report
    }
}

/// Emergency store kept entirely in memory. Contents are lost on drop.
#[derive(Default)]
pub struct MemoryEmergencyStore {
    inner: RwLock<Inner>,
}

impl MemoryEmergencyStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EmergencyStore for MemoryEmergencyStore {
    async fn insert(&self, new: NewEmergency) -> Result<EmergencyReport, DbError> {
        let mut inner = self.inner.write().await;
        if inner.reports.iter().any(|r| r.id == new.id) {
            return Err(DbError::Conversion {
                message: format!("Duplicate emergency id: {}", new.id),
            });
        }
        let report = new.into_report();
        inner.reports.push(report.clone());
        Ok(inner.enrich(report))
    }

    async fn get(&self, id: &str) -> Result<Option<EmergencyReport>, DbError> {
        let inner = self.inner.read().await;
        Ok(inner
            .reports
            .iter()
            .find(|r| r.id == id)
            .cloned()
            .map(|r| inner.enrich(r)))
    }

    async fn list(&self, query: &EmergencyQuery) -> Result<EmergencyPage, DbError> {
        let inner = self.inner.read().await;
        let mut matching: Vec<&EmergencyReport> = inner
            .reports
            .iter()
            .rev()
            .filter(|r| query.matches(r))
            .collect();
        // Stable sort keeps newer insertions first among equal timestamps.
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let total = matching.len() as u64;
        let reports = matching
            .into_iter()
            .skip(query.offset as usize)
            .take(query.limit as usize)
            .cloned()
            .map(|r| inner.enrich(r))
            .collect();

        Ok(EmergencyPage { reports, total })
    }

    async fn count(&self) -> Result<EmergencyCounts, DbError> {
        let inner = self.inner.read().await;
        let mut counts = EmergencyCounts::default();
        for report in &inner.reports {
            counts.add(report.status, 1);
        }
        Ok(counts)
    }

    async fn update_status(
        &self,
        id: &str,
        status: EmergencyStatus,
        at: DateTime<Utc>,
    ) -> Result<Option<EmergencyReport>, DbError> {
        let mut inner = self.inner.write().await;
        let Some(report) = inner
            .reports
            .iter_mut()
            .find(|r| r.id == id && r.status.can_transition_to(status))
        else {
            return Ok(None);
        };
        report.set_status(status, at);
        let report = report.clone();
        Ok(Some(inner.enrich(report)))
    }

    async fn delete(&self, id: &str) -> Result<bool, DbError> {
        let mut inner = self.inner.write().await;
        let before = inner.reports.len();
        inner.reports.retain(|r| r.id != id);
        Ok(inner.reports.len() != before)
    }

    async fn upsert_user(&self, user: &UserRow) -> Result<(), DbError> {
        self.inner
            .write()
            .await
            .users
            .insert(user.id.clone(), user.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use desa_sos_emergency_models::Coordinates;

    use super::*;

    fn new_emergency(id: &str, at: DateTime<Utc>) -> NewEmergency {
        NewEmergency {
            id: id.to_string(),
            user_id: Some("u1".to_string()),
            phone_number: "+62811".to_string(),
            coordinates: Coordinates::unresolved(),
            message: "Terjadi kebakaran".to_string(),
            created_at: at,
        }
    }

    #[tokio::test]
    async fn list_is_newest_first_and_paginated() {
        let store = MemoryEmergencyStore::new();
        let base = Utc::now();
        for (i, id) in ["a", "b", "c"].into_iter().enumerate() {
            store
                .insert(new_emergency(id, base + Duration::seconds(i64::try_from(i).unwrap())))
                .await
                .unwrap();
        }

        let page = store
            .list(&EmergencyQuery {
                limit: 2,
                offset: 0,
                ..EmergencyQuery::default()
            })
            .await
            .unwrap();
        assert_eq!(page.total, 3);
        let ids: Vec<&str> = page.reports.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, ["c", "b"]);

        let page = store
            .list(&EmergencyQuery {
                limit: 2,
                offset: 2,
                ..EmergencyQuery::default()
            })
            .await
            .unwrap();
        assert_eq!(page.reports.len(), 1);
        assert_eq!(page.reports[0].id, "a");
    }

    #[tokio::test]
    async fn same_timestamp_keeps_insertion_recency() {
        let store = MemoryEmergencyStore::new();
        let at = Utc::now();
        store.insert(new_emergency("older", at)).await.unwrap();
        store.insert(new_emergency("newer", at)).await.unwrap();

        let page = store
            .list(&EmergencyQuery {
                limit: 10,
                ..EmergencyQuery::default()
            })
            .await
            .unwrap();
        assert_eq!(page.reports[0].id, "newer");
    }

    #[tokio::test]
    async fn reporter_name_comes_from_users() {
        let store = MemoryEmergencyStore::new();
        store.insert(new_emergency("a", Utc::now())).await.unwrap();
        assert_eq!(store.get("a").await.unwrap().unwrap().reporter_name, None);

        store
            .upsert_user(&UserRow {
                id: "u1".to_string(),
                display_name: "Budi".to_string(),
                phone_number: None,
            })
            .await
            .unwrap();
        assert_eq!(
            store.get("a").await.unwrap().unwrap().reporter_name.as_deref(),
            Some("Budi")
        );
    }

    #[tokio::test]
    async fn handled_filter_and_counts() {
        let store = MemoryEmergencyStore::new();
        let at = Utc::now();
        store.insert(new_emergency("a", at)).await.unwrap();
        store.insert(new_emergency("b", at)).await.unwrap();
        store.insert(new_emergency("c", at)).await.unwrap();
        store
            .update_status("a", EmergencyStatus::Resolved, at)
            .await
            .unwrap();
        store
            .update_status("b", EmergencyStatus::InProgress, at)
            .await
            .unwrap();

        let handled = store
            .list(&EmergencyQuery {
                handled: Some(true),
                limit: 10,
                ..EmergencyQuery::default()
            })
            .await
            .unwrap();
        assert_eq!(handled.total, 1);
        assert_eq!(handled.reports[0].id, "a");

        let counts = store.count().await.unwrap();
        assert_eq!(
            counts,
            EmergencyCounts {
                total: 3,
                open: 1,
                in_progress: 1,
                resolved: 1,
                unhandled: 2,
            }
        );
    }

    #[tokio::test]
    async fn update_refuses_to_move_backwards() {
        let store = MemoryEmergencyStore::new();
        let at = Utc::now();
        store.insert(new_emergency("a", at)).await.unwrap();
        store
            .update_status("a", EmergencyStatus::Resolved, at)
            .await
            .unwrap()
            .unwrap();

        assert!(
            store
                .update_status("a", EmergencyStatus::InProgress, at)
                .await
                .unwrap()
                .is_none()
        );
        assert_eq!(
            store.get("a").await.unwrap().unwrap().status,
            EmergencyStatus::Resolved
        );
    }

    #[tokio::test]
    async fn delete_missing_returns_false() {
        let store = MemoryEmergencyStore::new();
        assert!(!store.delete("nope").await.unwrap());
        assert!(
            store
                .update_status("nope", EmergencyStatus::Resolved, Utc::now())
                .await
                .unwrap()
                .is_none()
        );
    }
}
