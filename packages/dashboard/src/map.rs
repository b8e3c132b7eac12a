//! Map projection of the report set.
//!
//! Reports become `GeoJSON` point features with `[longitude, latitude]`
//! coordinates. Reports sent without a location (the `"0"`/`"0"`
//! sentinel) are skipped; they still appear in the list panel.

use desa_sos_emergency_models::EmergencyReport;
use geojson::feature::Id;
use geojson::{Feature, FeatureCollection, Geometry, JsonObject, Value};
use serde::{Deserialize, Serialize};

/// Where the map is looking.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MapView {
    /// Center latitude in degrees.
    pub latitude: f64,
    /// Center longitude in degrees.
    pub longitude: f64,
    /// Tile zoom level.
    pub zoom: u8,
}

/// Map settings, the `[dashboard]` table of the config file.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct MapConfig {
    /// Initial center latitude.
    pub center_latitude: f64,
    /// Initial center longitude.
    pub center_longitude: f64,
    /// Initial zoom.
    pub zoom: u8,
    /// Zoom used when a report is selected.
    pub selected_zoom: u8,
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            center_latitude: -7.797_068,
            center_longitude: 110.370_529,
            zoom: 13,
            selected_zoom: 17,
        }
    }
}

impl MapConfig {
    /// View shown before anything is selected.
    #[must_use]
    pub const fn initial_view(&self) -> MapView {
        MapView {
            latitude: self.center_latitude,
            longitude: self.center_longitude,
            zoom: self.zoom,
        }
    }

    /// View centered on `report`, or `None` if it has no location.
    #[must_use]
    pub fn focus(&self, report: &EmergencyReport) -> Option<MapView> {
        let (latitude, longitude) = report.coordinates().to_degrees()?;
        Some(MapView {
            latitude,
            longitude,
            zoom: self.selected_zoom,
        })
    }
}

/// One marker feature, or `None` for a report without a location.
#[must_use]
pub fn marker(report: &EmergencyReport, selected: bool) -> Option<Feature> {
    let (latitude, longitude) = report.coordinates().to_degrees()?;

    let mut properties = JsonObject::new();
    properties.insert("id".to_string(), report.id.clone().into());
    properties.insert("status".to_string(), report.status.to_string().into());
    properties.insert("is_handled".to_string(), report.is_handled.into());
    properties.insert("message".to_string(), report.message.clone().into());
    properties.insert(
        "phone_number".to_string(),
        report.phone_number.clone().into(),
    );
    properties.insert(
        "reporter_name".to_string(),
        report.reporter_name.clone().into(),
    );
    properties.insert(
        "created_at".to_string(),
        report.created_at.to_rfc3339().into(),
    );
    properties.insert("selected".to_string(), selected.into());

    Some(Feature {
        bbox: None,
        geometry: Some(Geometry::new(Value::Point(vec![longitude, latitude]))),
        id: Some(Id::String(report.id.clone())),
        properties: Some(properties),
        foreign_members: None,
    })
}

/// Markers for every located report.
#[must_use]
pub fn markers<'a>(
    reports: impl IntoIterator<Item = &'a EmergencyReport>,
    selected: Option<&str>,
) -> FeatureCollection {
    let features = reports
        .into_iter()
        .filter_map(|r| marker(r, selected == Some(r.id.as_str())))
        .collect();

    FeatureCollection {
        bbox: None,
        features,
        foreign_members: None,
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use desa_sos_emergency_models::EmergencyStatus;

    use super::*;

    fn report(id: &str, latitude: &str, longitude: &str) -> EmergencyReport {
        let now = Utc::now();
        EmergencyReport {
            id: id.to_string(),
            user_id: None,
            reporter_name: Some("Pak Budi".to_string()),
            phone_number: "0812".to_string(),
            latitude: latitude.to_string(),
            longitude: longitude.to_string(),
            message: "Kebakaran".to_string(),
            status: EmergencyStatus::Open,
            is_handled: false,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn sentinel_reports_are_not_placed() {
        let reports = [report("a", "-7.8", "110.4"), report("b", "0", "0")];
        let collection = markers(&reports, Some("a"));

        assert_eq!(collection.features.len(), 1);
        let feature = &collection.features[0];
        assert_eq!(feature.id, Some(Id::String("a".to_string())));
        assert_eq!(
            feature.geometry.as_ref().map(|g| g.value.clone()),
            Some(Value::Point(vec![110.4, -7.8]))
        );
        assert_eq!(
            feature.property("selected"),
            Some(&serde_json::Value::Bool(true))
        );
        assert_eq!(
            feature.property("status"),
            Some(&serde_json::Value::from("OPEN"))
        );
    }

    #[test]
    fn focus_needs_a_location() {
        let config = MapConfig::default();
        assert_eq!(config.focus(&report("b", "0", "0")), None);

        let view = config.focus(&report("a", "-7.8", "110.4")).unwrap();
        assert_eq!(view.zoom, config.selected_zoom);
        assert!((view.latitude + 7.8).abs() < f64::EPSILON);
    }

    #[test]
    fn collection_serializes_as_geojson() {
        let json = markers(&[report("a", "-7.8", "110.4")], None).to_string();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["type"], "FeatureCollection");
        assert_eq!(value["features"][0]["geometry"]["type"], "Point");
    }
}
