//! Emergency persistence and query service.
//!
//! Every mutation is written to the store first and broadcast on the
//! [`EventHub`] only after the write returned successfully. Status moves
//! are checked and written in one store step, so concurrent updates never
//! move a report backwards; between an update and a delete the last write
//! wins.

use std::sync::Arc;

use chrono::Utc;
use desa_sos_database::{DbError, EmergencyStore};
use desa_sos_database_models::{EmergencyCounts, NewEmergency};
use desa_sos_emergency_models::{
    Coordinates, DeletedEmergency, EmergencyEvent, EmergencyReport, EmergencyStatus,
    MAX_MESSAGE_CHARS,
};
use desa_sos_realtime::hub::EventHub;
use desa_sos_server_models::{
    ApiEmergencyList, ApiPagination, CreateEmergencyRequest, ListEmergenciesParams,
};

/// Errors surfaced by the service and the HTTP gate.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// The request is malformed or asks for an impossible transition.
    #[error("{0}")]
    Validation(String),

    /// No report with this id.
    #[error("Emergency {0} not found")]
    NotFound(String),

    /// Missing or unknown session.
    #[error("Authentication required")]
    Unauthorized,

    /// The session may not use this route.
    #[error("Admin access required")]
    Forbidden,

    /// The store failed.
    #[error(transparent)]
    Store(#[from] DbError),
}

impl ServiceError {
    /// Machine-readable kind used in error bodies.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::NotFound(_) => "not_found",
            Self::Unauthorized => "unauthorized",
            Self::Forbidden => "forbidden",
            Self::Store(_) => "internal",
        }
    }
}

/// Returns `Ok(false)` when `current` already has `target`, `Ok(true)` for
/// a forward move and a validation error for a move backwards.
fn check_transition(
    current: &EmergencyReport,
    target: EmergencyStatus,
) -> Result<bool, ServiceError> {
    if current.status == target {
        log::debug!("Emergency {} already {target}, nothing to do", current.id);
        return Ok(false);
    }
    if !current.status.can_transition_to(target) {
        return Err(ServiceError::Validation(format!(
            "cannot move emergency from {} to {target}",
            current.status
        )));
    }
    Ok(true)
}

/// Emergency operations shared by the HTTP handlers.
#[derive(Clone)]
pub struct EmergencyService {
    store: Arc<dyn EmergencyStore>,
    hub: EventHub,
}

impl EmergencyService {
    /// Creates the service over a store and a hub.
    #[must_use]
    pub fn new(store: Arc<dyn EmergencyStore>, hub: EventHub) -> Self {
        Self { store, hub }
    }

    /// The hub events are published on.
    #[must_use]
    pub const fn hub(&self) -> &EventHub {
        &self.hub
    }

    /// The underlying store.
    #[must_use]
    pub fn store(&self) -> &dyn EmergencyStore {
        self.store.as_ref()
    }

    /// Validates and stores a new report, then broadcasts `new_emergency`.
    ///
    /// # Errors
    ///
    /// * [`ServiceError::Validation`] for a blank phone number, a blank or
    ///   over-long message, or unparsable coordinates
    /// * [`ServiceError::Store`] if the write fails
    pub async fn create(
        &self,
        user_id: Option<String>,
        request: CreateEmergencyRequest,
    ) -> Result<EmergencyReport, ServiceError> {
        let phone_number = request.phone_number.trim();
        if phone_number.is_empty() {
            return Err(ServiceError::Validation(
                "phone_number is required".to_string(),
            ));
        }

        let message = request.message.trim();
        if message.is_empty() {
            return Err(ServiceError::Validation("message is required".to_string()));
        }
        if message.chars().count() > MAX_MESSAGE_CHARS {
            return Err(ServiceError::Validation(format!(
                "message must be at most {MAX_MESSAGE_CHARS} characters"
            )));
        }

        let coordinates =
            Coordinates::parse(request.latitude.as_deref(), request.longitude.as_deref())
                .map_err(|e| ServiceError::Validation(e.to_string()))?;

        let new = NewEmergency {
            id: uuid::Uuid::new_v4().to_string(),
            user_id,
            phone_number: phone_number.to_string(),
            coordinates,
            message: message.to_string(),
            created_at: Utc::now(),
        };

        let report = self.store.insert(new).await?;
        log::info!(
            "Emergency {} reported by {}",
            report.id,
            report.user_id.as_deref().unwrap_or("unknown user")
        );
        self.hub
            .publish(EmergencyEvent::NewEmergency(report.clone()));
        Ok(report)
    }

    /// Fetches one report.
    ///
    /// # Errors
    ///
    /// [`ServiceError::NotFound`] if absent, [`ServiceError::Store`] if the
    /// read fails.
    pub async fn get(&self, id: &str) -> Result<EmergencyReport, ServiceError> {
        self.store
            .get(id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(id.to_string()))
    }

    /// Lists one page of reports, newest first.
    ///
    /// # Errors
    ///
    /// [`ServiceError::Store`] if the read fails.
    pub async fn list(&self, params: &ListEmergenciesParams) -> Result<ApiEmergencyList, ServiceError> {
        let query = params.to_query();
        let page = self.store.list(&query).await?;
        Ok(ApiEmergencyList {
            data: page.reports,
            pagination: ApiPagination::new(params.page(), query.limit, page.total),
        })
    }

    /// Counts reports per status.
    ///
    /// # Errors
    ///
    /// [`ServiceError::Store`] if the read fails.
    pub async fn count(&self) -> Result<EmergencyCounts, ServiceError> {
        Ok(self.store.count().await?)
    }

    /// Moves a report to `target` and broadcasts `emergency_updated`.
    ///
    /// Asking for the status the report already has returns it unchanged
    /// without a broadcast.
    ///
    /// # Errors
    ///
    /// * [`ServiceError::NotFound`] if the report does not exist
    /// * [`ServiceError::Validation`] if the transition would move the
    ///   status backwards
    /// * [`ServiceError::Store`] if the read or write fails
    pub async fn update_status(
        &self,
        id: &str,
        target: EmergencyStatus,
    ) -> Result<EmergencyReport, ServiceError> {
        let current = self.get(id).await?;
        if !check_transition(&current, target)? {
            return Ok(current);
        }

        let Some(updated) = self.store.update_status(id, target, Utc::now()).await? else {
            // Another update or a delete landed between the read and the
            // write. Statuses only move forward, so the report now either
            // has `target` or is past it.
            let latest = self.get(id).await?;
            log::debug!(
                "Emergency {id} changed to {} before it could move to {target}",
                latest.status
            );
            check_transition(&latest, target)?;
            return Ok(latest);
        };

        log::info!("Emergency {id} moved {} -> {target}", current.status);
        self.hub
            .publish(EmergencyEvent::EmergencyUpdated(updated.clone()));
        Ok(updated)
    }

    /// Removes a report and broadcasts `emergency_deleted`.
    ///
    /// # Errors
    ///
    /// [`ServiceError::NotFound`] if absent, [`ServiceError::Store`] if the
    /// write fails.
    pub async fn delete(&self, id: &str) -> Result<(), ServiceError> {
        if !self.store.delete(id).await? {
            return Err(ServiceError::NotFound(id.to_string()));
        }

        log::info!("Emergency {id} deleted");
        self.hub
            .publish(EmergencyEvent::EmergencyDeleted(DeletedEmergency {
                id: id.to_string(),
            }));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use chrono::DateTime;
    use desa_sos_database::memory::MemoryEmergencyStore;
    use desa_sos_database_models::{EmergencyPage, EmergencyQuery, UserRow};
    use desa_sos_emergency_models::{EmergencyType, compose_message};
    use tokio::sync::Barrier;

    use super::*;

    fn service() -> EmergencyService {
        EmergencyService::new(Arc::new(MemoryEmergencyStore::new()), EventHub::new(16))
    }

    /// Holds the first `held` reads until all of them have read, so every
    /// caller sees the same state before any of them writes.
    struct LockstepReads {
        inner: MemoryEmergencyStore,
        barrier: Barrier,
        held: usize,
        reads: AtomicUsize,
    }

    impl LockstepReads {
        fn new(held: usize) -> Self {
            Self {
                inner: MemoryEmergencyStore::new(),
                barrier: Barrier::new(held),
                held,
                reads: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl EmergencyStore for LockstepReads {
        async fn insert(&self, new: NewEmergency) -> Result<EmergencyReport, DbError> {
            self.inner.insert(new).await
        }

        async fn get(&self, id: &str) -> Result<Option<EmergencyReport>, DbError> {
            let report = self.inner.get(id).await?;
            if self.reads.fetch_add(1, Ordering::SeqCst) < self.held {
                self.barrier.wait().await;
            }
            Ok(report)
        }

        async fn list(&self, query: &EmergencyQuery) -> Result<EmergencyPage, DbError> {
            self.inner.list(query).await
        }

        async fn count(&self) -> Result<EmergencyCounts, DbError> {
            self.inner.count().await
        }

        async fn update_status(
            &self,
            id: &str,
            status: EmergencyStatus,
            at: DateTime<Utc>,
        ) -> Result<Option<EmergencyReport>, DbError> {
            self.inner.update_status(id, status, at).await
        }

        async fn delete(&self, id: &str) -> Result<bool, DbError> {
            self.inner.delete(id).await
        }

        async fn upsert_user(&self, user: &UserRow) -> Result<(), DbError> {
            self.inner.upsert_user(user).await
        }
    }

    fn request(message: &str) -> CreateEmergencyRequest {
        CreateEmergencyRequest {
            phone_number: "081234567890".to_string(),
            latitude: Some("-7.797068".to_string()),
            longitude: Some("110.370529".to_string()),
            message: message.to_string(),
        }
    }

    #[tokio::test]
    async fn create_persists_then_broadcasts() {
        let service = service();
        let mut sub = service.hub().subscribe();

        let message = compose_message(EmergencyType::Medis, Some("Pingsan di sawah"));
        let report = service
            .create(Some("warga-1".to_string()), request(&message))
            .await
            .unwrap();

        assert_eq!(report.status, EmergencyStatus::Open);
        assert!(!report.is_handled);
        assert_eq!(report.message, message);

        let event = sub.try_next().unwrap();
        assert_eq!(event, EmergencyEvent::NewEmergency(report.clone()));
        assert_eq!(service.get(&report.id).await.unwrap().id, report.id);
    }

    #[tokio::test]
    async fn create_rejects_bad_input_without_broadcast() {
        let service = service();
        let mut sub = service.hub().subscribe();

        let mut blank_phone = request("Banjir");
        blank_phone.phone_number = "  ".to_string();
        let too_long = request(&"a".repeat(MAX_MESSAGE_CHARS + 1));
        let mut bad_lat = request("Banjir");
        bad_lat.latitude = Some("north".to_string());

        for bad in [blank_phone, request(" "), too_long, bad_lat] {
            assert!(matches!(
                service.create(None, bad).await,
                Err(ServiceError::Validation(_))
            ));
        }
        assert!(sub.try_next().is_none());
        assert_eq!(service.count().await.unwrap().total, 0);
    }

    #[tokio::test]
    async fn missing_coordinates_use_sentinel() {
        let service = service();
        let mut req = request("Pohon tumbang");
        req.latitude = None;
        req.longitude = Some(String::new());

        let report = service.create(None, req).await.unwrap();
        assert_eq!(report.latitude, "0");
        assert_eq!(report.longitude, "0");
        assert!(report.coordinates().is_unresolved());
    }

    #[tokio::test]
    async fn update_moves_forward_and_broadcasts() {
        let service = service();
        let report = service.create(None, request("Kebakaran")).await.unwrap();
        let mut sub = service.hub().subscribe();

        let updated = service
            .update_status(&report.id, EmergencyStatus::InProgress)
            .await
            .unwrap();
        assert_eq!(updated.status, EmergencyStatus::InProgress);
        assert!(!updated.is_handled);

        let resolved = service
            .update_status(&report.id, EmergencyStatus::Resolved)
            .await
            .unwrap();
        assert!(resolved.is_handled);

        assert_eq!(sub.try_next().unwrap().name(), "emergency_updated");
        assert_eq!(
            sub.try_next().unwrap(),
            EmergencyEvent::EmergencyUpdated(resolved)
        );
    }

    #[tokio::test]
    async fn same_status_is_a_silent_no_op() {
        let service = service();
        let report = service.create(None, request("Banjir")).await.unwrap();
        service
            .update_status(&report.id, EmergencyStatus::Resolved)
            .await
            .unwrap();

        let mut sub = service.hub().subscribe();
        let again = service
            .update_status(&report.id, EmergencyStatus::Resolved)
            .await
            .unwrap();
        assert!(again.is_handled);
        assert!(sub.try_next().is_none());
    }

    #[tokio::test]
    async fn racing_updates_never_unresolve() {
        let service = EmergencyService::new(Arc::new(LockstepReads::new(2)), EventHub::new(16));
        let report = service.create(None, request("Kebakaran")).await.unwrap();
        let mut sub = service.hub().subscribe();

        // Both admins read OPEN; resolving writes first.
        let (progress, resolve) = tokio::join!(
            service.update_status(&report.id, EmergencyStatus::InProgress),
            service.update_status(&report.id, EmergencyStatus::Resolved),
        );

        let resolved = resolve.unwrap();
        assert_eq!(resolved.status, EmergencyStatus::Resolved);
        assert!(matches!(progress, Err(ServiceError::Validation(_))));

        let stored = service.get(&report.id).await.unwrap();
        assert_eq!(stored.status, EmergencyStatus::Resolved);
        assert!(stored.is_handled);

        assert_eq!(
            sub.try_next().unwrap(),
            EmergencyEvent::EmergencyUpdated(resolved)
        );
        assert!(sub.try_next().is_none());
    }

    #[tokio::test]
    async fn racing_resolves_broadcast_once() {
        let service = EmergencyService::new(Arc::new(LockstepReads::new(2)), EventHub::new(16));
        let report = service.create(None, request("Banjir")).await.unwrap();
        let mut sub = service.hub().subscribe();

        let (first, second) = tokio::join!(
            service.update_status(&report.id, EmergencyStatus::Resolved),
            service.update_status(&report.id, EmergencyStatus::Resolved),
        );
        assert!(first.unwrap().is_handled);
        assert!(second.unwrap().is_handled);

        assert_eq!(sub.try_next().unwrap().name(), "emergency_updated");
        assert!(sub.try_next().is_none());
    }

    #[tokio::test]
    async fn reversal_is_rejected() {
        let service = service();
        let report = service.create(None, request("Banjir")).await.unwrap();
        service
            .update_status(&report.id, EmergencyStatus::Resolved)
            .await
            .unwrap();

        assert!(matches!(
            service.update_status(&report.id, EmergencyStatus::Open).await,
            Err(ServiceError::Validation(_))
        ));
        assert!(matches!(
            service
                .update_status(&report.id, EmergencyStatus::InProgress)
                .await,
            Err(ServiceError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn unknown_ids_are_not_found() {
        let service = service();
        assert!(matches!(
            service.update_status("missing", EmergencyStatus::Resolved).await,
            Err(ServiceError::NotFound(_))
        ));
        assert!(matches!(
            service.delete("missing").await,
            Err(ServiceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn delete_removes_regardless_of_status() {
        let service = service();
        let report = service.create(None, request("Listrik")).await.unwrap();
        service
            .update_status(&report.id, EmergencyStatus::Resolved)
            .await
            .unwrap();
        let mut sub = service.hub().subscribe();

        service.delete(&report.id).await.unwrap();
        assert_eq!(
            sub.try_next().unwrap(),
            EmergencyEvent::EmergencyDeleted(DeletedEmergency { id: report.id.clone() })
        );
        assert!(matches!(
            service.get(&report.id).await,
            Err(ServiceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn list_paginates_newest_first() {
        let service = service();
        for i in 0..12 {
            service
                .create(None, request(&format!("Laporan {i}")))
                .await
                .unwrap();
        }

        let first = service
            .list(&ListEmergenciesParams::default())
            .await
            .unwrap();
        assert_eq!(first.data.len(), 10);
        assert_eq!(first.data[0].message, "Laporan 11");
        assert_eq!(first.pagination.total, 12);
        assert_eq!(first.pagination.total_pages, 2);

        let second = service
            .list(&ListEmergenciesParams {
                page: Some(2),
                ..ListEmergenciesParams::default()
            })
            .await
            .unwrap();
        assert_eq!(second.data.len(), 2);
        assert_eq!(second.data[1].message, "Laporan 0");
    }
}
