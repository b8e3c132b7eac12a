//! The fixed emergency type catalog.
//!
//! Each category carries a short label and a canned description. The
//! description is the first part of every report message so that admins
//! can triage without reading free text.

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Maximum length of the user-entered detail appended to a report message,
/// in characters.
pub const MAX_ADDITIONAL_INFO_CHARS: usize = 100;

/// Emergency categories a resident can report.
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
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum EmergencyType {
    /// Fire
    Kebakaran,
    /// Flood
    Banjir,
    /// Medical emergency
    Medis,
    /// Traffic or work accident
    Kecelakaan,
    /// Crime in progress
    Kriminal,
    /// Structural collapse
    BangunanRuntuh,
    /// Electrical hazard
    Listrik,
    /// Fallen tree
    PohonTumbang,
}

impl EmergencyType {
    /// Returns all variants of this enum.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[
            Self::Kebakaran,
            Self::Banjir,
            Self::Medis,
            Self::Kecelakaan,
            Self::Kriminal,
            Self::BangunanRuntuh,
            Self::Listrik,
            Self::PohonTumbang,
        ]
    }

    /// Short label shown on the selection buttons.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Kebakaran => "Kebakaran",
            Self::Banjir => "Banjir",
            Self::Medis => "Darurat Medis",
            Self::Kecelakaan => "Kecelakaan",
            Self::Kriminal => "Tindak Kriminal",
            Self::BangunanRuntuh => "Bangunan Runtuh",
            Self::Listrik => "Bahaya Listrik",
            Self::PohonTumbang => "Pohon Tumbang",
        }
    }

    /// Canned description used as the head of the report message.
    #[must_use]
    pub const fn description(self) -> &'static str {
        match self {
            Self::Kebakaran => "Terjadi kebakaran, butuh bantuan pemadam segera",
            Self::Banjir => "Terjadi banjir, butuh bantuan evakuasi",
            Self::Medis => "Darurat medis, butuh pertolongan tenaga kesehatan segera",
            Self::Kecelakaan => "Terjadi kecelakaan, ada korban yang butuh pertolongan",
            Self::Kriminal => "Terjadi tindak kriminal, butuh bantuan keamanan",
            Self::BangunanRuntuh => "Bangunan runtuh, kemungkinan ada korban tertimbun",
            Self::Listrik => "Bahaya listrik, ada kabel putus atau korsleting",
            Self::PohonTumbang => "Pohon tumbang menghalangi jalan atau menimpa bangunan",
        }
    }
}

/// Composes a report message from a category and optional free text.
///
/// The free text is trimmed and cut to [`MAX_ADDITIONAL_INFO_CHARS`]
/// characters. Without free text the message is the canned description
/// alone; otherwise it is `"<description> - <info>"`.
#[must_use]
pub fn compose_message(kind: EmergencyType, additional_info: Option<&str>) -> String {
    let info: String = additional_info
        .map(str::trim)
        .unwrap_or_default()
        .chars()
        .take(MAX_ADDITIONAL_INFO_CHARS)
        .collect();
    let info = info.trim_end();

    if info.is_empty() {
        kind.description().to_string()
    } else {
        format!("{} - {info}", kind.description())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_has_eight_categories() {
        assert_eq!(EmergencyType::all().len(), 8);
        for kind in EmergencyType::all() {
            assert!(!kind.label().is_empty());
            assert!(!kind.description().is_empty());
            assert_eq!(kind.as_ref().parse::<EmergencyType>().ok(), Some(*kind));
        }
    }

    #[test]
    fn keys_are_snake_case() {
        assert_eq!(EmergencyType::BangunanRuntuh.as_ref(), "bangunan_runtuh");
        assert_eq!(
            "pohon_tumbang".parse::<EmergencyType>().ok(),
            Some(EmergencyType::PohonTumbang)
        );
    }

    #[test]
    fn message_with_detail() {
        let message = compose_message(EmergencyType::Medis, Some("butuh ambulans"));
        assert!(message.starts_with(EmergencyType::Medis.description()));
        assert!(message.ends_with("- butuh ambulans"));
    }

    #[test]
    fn message_without_detail_is_description() {
        assert_eq!(
            compose_message(EmergencyType::Banjir, Some("   ")),
            EmergencyType::Banjir.description()
        );
        assert_eq!(
            compose_message(EmergencyType::Banjir, None),
            EmergencyType::Banjir.description()
        );
    }

    #[test]
    fn detail_is_capped() {
        let long = "a".repeat(250);
        let message = compose_message(EmergencyType::Kriminal, Some(&long));
        let detail = message
            .strip_prefix(EmergencyType::Kriminal.description())
            .and_then(|rest| rest.strip_prefix(" - "))
            .unwrap();
        assert_eq!(detail.chars().count(), MAX_ADDITIONAL_INFO_CHARS);
    }
}
