//! Client error taxonomy and the messages shown to users.

use desa_sos_guard::GuardError;
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Language of user-facing messages.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
pub enum Locale {
    /// Bahasa Indonesia.
    #[default]
    #[strum(serialize = "id")]
    #[serde(rename = "id")]
    Indonesian,
    /// English.
    #[strum(serialize = "en")]
    #[serde(rename = "en")]
    English,
}

/// Errors raised by the emergency client.
///
/// The `Display` text is for logs. Show users [`ClientError::user_message`]
/// instead, which never contains technical detail.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The input was rejected, locally or by the server.
    #[error("Validation failed: {message}")]
    Validation {
        /// What was wrong.
        message: String,
    },

    /// No valid session, or the session lacks the required role.
    #[error("Session missing, expired or not allowed")]
    Unauthorized,

    /// The report does not exist.
    #[error("Emergency {id} not found")]
    NotFound {
        /// Requested id.
        id: String,
    },

    /// The request never got a response.
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// A mutation failed with an unexpected status.
    #[error("Server returned {status}: {message}")]
    General {
        /// HTTP status code.
        status: u16,
        /// Server-provided description.
        message: String,
    },

    /// A read failed with an unexpected status.
    #[error("Fetching emergencies failed with status {status}")]
    Fetch {
        /// HTTP status code.
        status: u16,
    },

    /// The abuse guard refused the step.
    #[error(transparent)]
    Guard(#[from] GuardError),
}

impl ClientError {
    /// Short machine-readable kind.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "validation",
            Self::Unauthorized => "unauthorized",
            Self::NotFound { .. } => "not_found",
            Self::Network(_) => "network",
            Self::General { .. } => "general",
            Self::Fetch { .. } => "fetch",
            Self::Guard(_) => "guard",
        }
    }

    /// Message to show the user.
    #[must_use]
    pub fn user_message(&self, locale: Locale) -> &'static str {
        match (locale, self) {
            (Locale::Indonesian, Self::Validation { .. }) => {
                "Data laporan belum lengkap. Periksa kembali isian Anda."
            }
            (Locale::Indonesian, Self::Unauthorized) => {
                "Sesi Anda telah berakhir. Silakan masuk kembali."
            }
            (Locale::Indonesian, Self::NotFound { .. }) => "Laporan darurat tidak ditemukan.",
            (Locale::Indonesian, Self::Network(_)) => {
                "Tidak dapat terhubung ke server. Periksa koneksi internet Anda."
            }
            (Locale::Indonesian, Self::General { .. }) => {
                "Gagal mengirim laporan darurat. Silakan coba lagi."
            }
            (Locale::Indonesian, Self::Fetch { .. }) => "Gagal memuat data laporan darurat.",
            (Locale::Indonesian, Self::Guard(_)) => {
                "Tombol SOS sedang tidak dapat digunakan. Tunggu sebentar."
            }
            (Locale::English, Self::Validation { .. }) => {
                "The report is incomplete. Please check your input."
            }
            (Locale::English, Self::Unauthorized) => {
                "Your session has expired. Please sign in again."
            }
            (Locale::English, Self::NotFound { .. }) => "The emergency report was not found.",
            (Locale::English, Self::Network(_)) => {
                "Cannot reach the server. Check your internet connection."
            }
            (Locale::English, Self::General { .. }) => {
                "Failed to send the emergency report. Please try again."
            }
            (Locale::English, Self::Fetch { .. }) => "Failed to load emergency reports.",
            (Locale::English, Self::Guard(_)) => {
                "The SOS button is unavailable right now. Please wait."
            }
        }
    }
}
