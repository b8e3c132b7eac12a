//! The SOS report form.

use desa_sos_emergency_models::{EmergencyType, MAX_ADDITIONAL_INFO_CHARS, compose_message};
use desa_sos_server_models::CreateEmergencyRequest;

use crate::error::ClientError;
use crate::geolocation::{Position, coordinates_or_sentinel};

/// What the user filled in.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubmissionForm {
    emergency_type: Option<EmergencyType>,
    additional_info: String,
    phone_number: String,
}

impl SubmissionForm {
    /// Empty form.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Selects the emergency type.
    #[must_use]
    pub const fn with_type(mut self, kind: EmergencyType) -> Self {
        self.emergency_type = Some(kind);
        self
    }

    /// Sets the free-text detail, cut to 100 characters.
    #[must_use]
    pub fn with_additional_info(mut self, info: &str) -> Self {
        self.additional_info = info.chars().take(MAX_ADDITIONAL_INFO_CHARS).collect();
        self
    }

    /// Sets the contact number. Leaving it blank falls back to the number
    /// on the user's profile.
    #[must_use]
    pub fn with_phone_number(mut self, phone: &str) -> Self {
        self.phone_number = phone.trim().to_string();
        self
    }

    /// Selected type.
    #[must_use]
    pub const fn emergency_type(&self) -> Option<EmergencyType> {
        self.emergency_type
    }

    /// Free-text detail as stored.
    #[must_use]
    pub fn additional_info(&self) -> &str {
        &self.additional_info
    }

    /// Whether the user typed a phone number.
    #[must_use]
    pub fn has_phone_number(&self) -> bool {
        !self.phone_number.is_empty()
    }

    /// Whether the submit control should be enabled.
    #[must_use]
    pub const fn can_submit(&self) -> bool {
        self.emergency_type.is_some()
    }

    /// Checks what can be checked without the network.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Validation`] when no type is selected.
    pub fn validate(&self) -> Result<EmergencyType, ClientError> {
        self.emergency_type.ok_or_else(|| ClientError::Validation {
            message: "emergency_type is required".to_string(),
        })
    }

    /// Report text: the type's canned description, plus the detail when
    /// there is one.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Validation`] when no type is selected.
    pub fn message(&self) -> Result<String, ClientError> {
        let kind = self.validate()?;
        Ok(compose_message(kind, Some(&self.additional_info)))
    }

    /// Builds the request body.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Validation`] when no type is selected or no
    /// phone number is available at all.
    pub fn build(
        &self,
        profile_phone: Option<&str>,
        position: Option<&Position>,
    ) -> Result<CreateEmergencyRequest, ClientError> {
        let message = self.message()?;

        let phone_number = if self.has_phone_number() {
            self.phone_number.clone()
        } else {
            profile_phone
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(ToString::to_string)
                .ok_or_else(|| ClientError::Validation {
                    message: "phone_number is required".to_string(),
                })?
        };

        let coordinates = coordinates_or_sentinel(position);
        Ok(CreateEmergencyRequest {
            phone_number,
            latitude: Some(coordinates.latitude),
            longitude: Some(coordinates.longitude),
            message,
        })
    }
}
