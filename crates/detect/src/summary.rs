//! Human-readable analysis summaries

use std::collections::BTreeMap;

use crate::model::{Detection, Severity, ThreatType};

pub const NO_THREATS: &str = "Analysis completed. No significant threats detected in the imagery.";

const RECOMMENDATION: &str =
    "Recommendation: Review detected threats on the map for location details and priority response planning.";

fn severity_line(severity: Severity, count: usize) -> String {
    match severity {
        Severity::Critical => format!("CRITICAL: {} high-priority threat(s) requiring immediate attention", count),
        Severity::High => format!("HIGH: {} significant threat(s) detected", count),
        Severity::Medium => format!("MEDIUM: {} moderate concern(s) identified", count),
        Severity::Low => format!("LOW: {} minor anomaly/anomalies detected", count),
    }
}

/// Summarize `detections`: counts by severity (most severe first), then by
/// threat type in descending count, then a recommendation.
pub fn summarize(detections: &[Detection]) -> String {
    if detections.is_empty() {
        return NO_THREATS.to_string();
    }

    let mut by_severity: BTreeMap<Severity, usize> = BTreeMap::new();
    let mut by_type: BTreeMap<ThreatType, usize> = BTreeMap::new();
    for d in detections {
        *by_severity.entry(d.severity).or_default() += 1;
        *by_type.entry(d.threat_type).or_default() += 1;
    }

    let mut lines = vec![
        format!("Analysis identified {} potential threat(s):", detections.len()),
        String::new(),
    ];
    for severity in Severity::DESCENDING {
        if let Some(&count) = by_severity.get(&severity) {
            lines.push(severity_line(severity, count));
        }
    }

    lines.push(String::new());
    lines.push("Threat Breakdown:".to_string());
    let mut types: Vec<(ThreatType, usize)> = by_type.into_iter().collect();
    // stable: equal counts keep declaration order
    types.sort_by(|a, b| b.1.cmp(&a.1));
    for (threat_type, count) in types {
        lines.push(format!("  • {}: {}", threat_type.label(), count));
    }

    lines.push(String::new());
    lines.push(RECOMMENDATION.to_string());
    lines.join("\n")
}

/// Mean confidence, or 0 for no detections.
pub fn mean_confidence(detections: &[Detection]) -> f64 {
    if detections.is_empty() {
        return 0.0;
    }
    detections.iter().map(|d| d.confidence).sum::<f64>() / detections.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{PixelCoord, TechnicalDetails};
    use geoscout_core::GeoPoint;

    fn detection(threat_type: ThreatType, severity: Severity, confidence: f64) -> Detection {
        Detection {
            threat_type,
            severity,
            confidence,
            location: GeoPoint::new(0.0, 0.0),
            location_degraded: false,
            pixel_coordinates: PixelCoord { x: 0, y: 0 },
            area_pixels: None,
            vehicle_count: None,
            description: String::new(),
            technical_details: TechnicalDetails::new(),
        }
    }

    #[test]
    fn test_empty_summary() {
        assert_eq!(summarize(&[]), NO_THREATS);
        assert_eq!(mean_confidence(&[]), 0.0);
    }

    #[test]
    fn test_summary_layout() {
        let detections = vec![
            detection(ThreatType::Fire, Severity::Medium, 0.7),
            detection(ThreatType::VehicleConvoy, Severity::Critical, 0.9),
            detection(ThreatType::VehicleConvoy, Severity::Low, 0.6),
            detection(ThreatType::StructuralDamage, Severity::Medium, 0.8),
        ];
        let text = summarize(&detections);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "Analysis identified 4 potential threat(s):");
        assert_eq!(lines[2], "CRITICAL: 1 high-priority threat(s) requiring immediate attention");
        assert_eq!(lines[3], "MEDIUM: 2 moderate concern(s) identified");
        assert_eq!(lines[4], "LOW: 1 minor anomaly/anomalies detected");
        assert_eq!(lines[6], "Threat Breakdown:");
        assert_eq!(lines[7], "  • Vehicle Concentrations/Convoys: 2");
        assert_eq!(lines[8], "  • Fire/Explosion Signatures: 1");
        assert_eq!(lines[9], "  • Structural Damage Areas: 1");
        assert!(lines[11].starts_with("Recommendation:"));
        assert!(!text.contains("HIGH:"));

        approx::assert_relative_eq!(mean_confidence(&detections), 0.75, epsilon = 1e-12);
    }
}
