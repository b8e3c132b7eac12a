//! SOS orchestration: guard, then location, then submission.

use std::sync::Arc;

use desa_sos_emergency_models::EmergencyReport;
use desa_sos_guard::{CancelOutcome, GuardError, GuardState, PressOutcome, RateLimiter, Tick};

use crate::backend::EmergencyBackend;
use crate::error::ClientError;
use crate::form::SubmissionForm;
use crate::geolocation::{PositionOptions, PositionProvider, acquire};

/// One client's SOS button.
pub struct SosFlow {
    guard: Box<dyn RateLimiter>,
    backend: Arc<dyn EmergencyBackend>,
    geolocation: Arc<dyn PositionProvider>,
    options: PositionOptions,
}

impl SosFlow {
    /// Wires the flow together with default location options.
    #[must_use]
    pub fn new(
        guard: Box<dyn RateLimiter>,
        backend: Arc<dyn EmergencyBackend>,
        geolocation: Arc<dyn PositionProvider>,
    ) -> Self {
        Self {
            guard,
            backend,
            geolocation,
            options: PositionOptions::default(),
        }
    }

    /// Overrides the location options.
    #[must_use]
    pub const fn with_position_options(mut self, options: PositionOptions) -> Self {
        self.options = options;
        self
    }

    /// Guard state.
    #[must_use]
    pub fn state(&self) -> GuardState {
        self.guard.state()
    }

    /// User pressed SOS.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Guard`] if the press is not valid now.
    pub fn press(&mut self) -> Result<PressOutcome, ClientError> {
        Ok(self.guard.press()?)
    }

    /// User confirmed.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Guard`] outside the confirmation step.
    pub fn confirm(&mut self) -> Result<(), ClientError> {
        Ok(self.guard.confirm()?)
    }

    /// User cancelled.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Guard`] outside the confirmation step.
    pub fn cancel(&mut self) -> Result<CancelOutcome, ClientError> {
        Ok(self.guard.cancel()?)
    }

    /// Lockout countdown tick.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Guard`] if lockout storage fails.
    pub fn tick(&mut self) -> Result<Tick, ClientError> {
        Ok(self.guard.tick()?)
    }

    /// User closed the form without sending.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Guard`] if the guard was not armed.
    pub fn abandon(&mut self) -> Result<(), ClientError> {
        Ok(self.guard.abandon()?)
    }

    /// Sends the report.
    ///
    /// The type is checked before anything touches the network. Location
    /// is best-effort; without it the sentinel is sent. A blank phone
    /// number is filled from the user's profile. On success the guard
    /// returns to idle; on failure it stays armed so the user can retry.
    /// Once the backend accepted the report this returns `Ok` even if the
    /// guard fails to persist its bookkeeping.
    ///
    /// # Errors
    ///
    /// * [`ClientError::Guard`] if the guard is not armed
    /// * [`ClientError::Validation`] if the form is incomplete
    /// * any error from the backend
    pub async fn submit(&mut self, form: &SubmissionForm) -> Result<EmergencyReport, ClientError> {
        let state = self.guard.state();
        if state != GuardState::Armed {
            return Err(GuardError::InvalidTransition {
                state,
                action: "submit",
            }
            .into());
        }

        form.validate()?;

        let position = acquire(self.geolocation.as_ref(), &self.options).await;

        let profile_phone = if form.has_phone_number() {
            None
        } else {
            self.backend.profile().await?.phone_number
        };

        let request = form.build(profile_phone.as_deref(), position.as_ref())?;
        let report = self.backend.create(&request).await?;
        log::info!("Emergency {} sent", report.id);

        // Already stored server-side; guard bookkeeping errors are only logged.
        if let Err(e) = self.guard.record_success() {
            log::warn!("Emergency {} sent but the guard could not record it: {e}", report.id);
        }
        Ok(report)
    }
}
