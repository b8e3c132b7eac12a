//! The operations a client can perform against the emergency service.

use async_trait::async_trait;
use desa_sos_emergency_models::{EmergencyReport, EmergencyStatus};
use desa_sos_server_models::{
    ApiEmergencyCount, ApiEmergencyList, ApiEmergencyType, ApiProfile, CreateEmergencyRequest,
    ListEmergenciesParams,
};

use crate::error::ClientError;

/// Emergency service operations.
///
/// Every call carries the session; a missing or expired one surfaces as
/// [`ClientError::Unauthorized`].
#[async_trait]
pub trait EmergencyBackend: Send + Sync {
    /// Files a new report.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError`] if the report is rejected or the request
    /// fails.
    async fn create(&self, request: &CreateEmergencyRequest) -> Result<EmergencyReport, ClientError>;

    /// Fetches one page of reports, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Fetch`] on a non-success status.
    async fn list(&self, params: &ListEmergenciesParams) -> Result<ApiEmergencyList, ClientError>;

    /// Fetches one report.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::NotFound`] if it does not exist.
    async fn get(&self, id: &str) -> Result<EmergencyReport, ClientError>;

    /// Moves a report to `status`.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError`] if the report is missing, the transition is
    /// rejected or the request fails.
    async fn set_status(
        &self,
        id: &str,
        status: EmergencyStatus,
    ) -> Result<EmergencyReport, ClientError>;

    /// Marks a report handled. Acknowledging an already resolved report
    /// succeeds and returns it unchanged.
    ///
    /// # Errors
    ///
    /// See [`EmergencyBackend::set_status`].
    async fn acknowledge(&self, id: &str) -> Result<EmergencyReport, ClientError> {
        self.set_status(id, EmergencyStatus::Resolved).await
    }

    /// Removes a report.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::NotFound`] if it does not exist.
    async fn delete(&self, id: &str) -> Result<(), ClientError>;

    /// Report counts for badges.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Fetch`] on a non-success status.
    async fn count(&self) -> Result<ApiEmergencyCount, ClientError>;

    /// Profile of the session user.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Unauthorized`] without a valid session.
    async fn profile(&self) -> Result<ApiProfile, ClientError>;

    /// The emergency type catalog.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Fetch`] on a non-success status.
    async fn emergency_types(&self) -> Result<Vec<ApiEmergencyType>, ClientError>;
}
