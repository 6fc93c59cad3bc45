//! Detection records

use std::collections::BTreeMap;
use std::fmt;

use geoscout_core::GeoPoint;
use serde::{Deserialize, Serialize};

/// Kind of threat a detection reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThreatType {
    Explosion,
    Fire,
    ArmedGroup,
    VehicleConvoy,
    StructuralDamage,
    UnusualActivity,
    CampFormation,
    Roadblock,
}

impl ThreatType {
    pub const ALL: [ThreatType; 8] = [
        ThreatType::Explosion,
        ThreatType::Fire,
        ThreatType::ArmedGroup,
        ThreatType::VehicleConvoy,
        ThreatType::StructuralDamage,
        ThreatType::UnusualActivity,
        ThreatType::CampFormation,
        ThreatType::Roadblock,
    ];

    /// Wire name, e.g. `vehicle_convoy`.
    pub fn as_str(&self) -> &'static str {
        match self {
            ThreatType::Explosion => "explosion",
            ThreatType::Fire => "fire",
            ThreatType::ArmedGroup => "armed_group",
            ThreatType::VehicleConvoy => "vehicle_convoy",
            ThreatType::StructuralDamage => "structural_damage",
            ThreatType::UnusualActivity => "unusual_activity",
            ThreatType::CampFormation => "camp_formation",
            ThreatType::Roadblock => "roadblock",
        }
    }

    /// Plural heading used in summary breakdowns.
    pub fn label(&self) -> &'static str {
        match self {
            ThreatType::Explosion => "Explosion Sites",
            ThreatType::Fire => "Fire/Explosion Signatures",
            ThreatType::ArmedGroup => "Armed Group Activity",
            ThreatType::VehicleConvoy => "Vehicle Concentrations/Convoys",
            ThreatType::StructuralDamage => "Structural Damage Areas",
            ThreatType::UnusualActivity => "Unusual Activity Patterns",
            ThreatType::CampFormation => "Camp Formations",
            ThreatType::Roadblock => "Roadblocks/Checkpoints",
        }
    }
}

impl fmt::Display for ThreatType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered severity: `Low < Medium < High < Critical`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Most severe first.
    pub const DESCENDING: [Severity; 4] = [Severity::Critical, Severity::High, Severity::Medium, Severity::Low];

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Value of a technical detail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DetailValue {
    Bool(bool),
    Number(f64),
    Text(String),
}

impl From<f64> for DetailValue {
    fn from(v: f64) -> Self {
        DetailValue::Number(v)
    }
}

impl From<usize> for DetailValue {
    fn from(v: usize) -> Self {
        DetailValue::Number(v as f64)
    }
}

impl From<bool> for DetailValue {
    fn from(v: bool) -> Self {
        DetailValue::Bool(v)
    }
}

impl From<&str> for DetailValue {
    fn from(v: &str) -> Self {
        DetailValue::Text(v.to_string())
    }
}

impl From<String> for DetailValue {
    fn from(v: String) -> Self {
        DetailValue::Text(v)
    }
}

/// Detector-specific measurements, keyed by name.
pub type TechnicalDetails = BTreeMap<String, DetailValue>;

/// Whole-pixel position in the source raster (`x` column, `y` row).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PixelCoord {
    pub x: i64,
    pub y: i64,
}

impl PixelCoord {
    /// Truncate a fractional position.
    pub fn from_position(x: f64, y: f64) -> Self {
        Self {
            x: x as i64,
            y: y as i64,
        }
    }
}

/// A geolocated detection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub threat_type: ThreatType,
    pub severity: Severity,
    pub confidence: f64,
    pub location: GeoPoint,
    /// Set when `location` could not be expressed in WGS84.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub location_degraded: bool,
    pub pixel_coordinates: PixelCoord,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub area_pixels: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vehicle_count: Option<u32>,
    pub description: String,
    #[serde(default)]
    pub technical_details: TechnicalDetails,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_order() {
        assert!(Severity::Low < Severity::Medium);
        assert!(Severity::Medium < Severity::High);
        assert!(Severity::High < Severity::Critical);
        assert_eq!(Severity::DESCENDING[0], Severity::Critical);
    }

    #[test]
    fn test_serde_names() {
        assert_eq!(serde_json::to_string(&ThreatType::VehicleConvoy).unwrap(), "\"vehicle_convoy\"");
        assert_eq!(serde_json::to_string(&Severity::Critical).unwrap(), "\"critical\"");
        for t in ThreatType::ALL {
            let json = serde_json::to_string(&t).unwrap();
            assert_eq!(json, format!("\"{}\"", t.as_str()));
        }
    }

    #[test]
    fn test_detection_json() {
        let mut details = TechnicalDetails::new();
        details.insert("fire_index".into(), 0.6.into());
        details.insert("formation_type".into(), "concentrated".into());
        let d = Detection {
            threat_type: ThreatType::Fire,
            severity: Severity::High,
            confidence: 0.84,
            location: GeoPoint::new(-3.5, 40.1),
            location_degraded: false,
            pixel_coordinates: PixelCoord::from_position(12.7, 3.2),
            area_pixels: Some(400),
            vehicle_count: None,
            description: "test".into(),
            technical_details: details,
        };
        let v = serde_json::to_value(&d).unwrap();
        assert_eq!(v["pixel_coordinates"]["x"], 12);
        assert_eq!(v["technical_details"]["fire_index"], 0.6);
        assert_eq!(v["technical_details"]["formation_type"], "concentrated");
        assert!(v.get("vehicle_count").is_none());
        assert!(v.get("location_degraded").is_none());

        let back: Detection = serde_json::from_value(v).unwrap();
        assert_eq!(back, d);
    }
}
