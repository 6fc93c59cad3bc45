//! Fire and explosion signatures
//!
//! Scans the whole raster in overlapping tiles. Per pixel, the red/green
//! fire index is taken from the raw radiometry (a normalized difference is
//! already gain-free), while brightness averages the channels scaled by
//! their run-wide 98th percentiles. Pixels above both thresholds are
//! cleaned with a disk opening then closing and grouped into 8-connected
//! components.
//!
//! The index deliberately skips the per-channel 0..1 normalization the
//! brightness term gets: on stretched channels a red 200 / green 50 surface
//! would no longer score 0.6.

use geoscout_algorithms::label::{label, Connectivity};
use geoscout_algorithms::morphology::{closing, opening, StructuringElement};
use geoscout_algorithms::spectral::{brightness, fire_index, fire_mask, FireMaskParams};
use geoscout_core::{Error, Result};
use geoscout_parallel::{Tile, TileIterator};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::engine::{Candidate, Detector, ScanContext};
use crate::model::{Severity, TechnicalDetails, ThreatType};
use crate::stats::RunStats;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FireParams {
    pub tile_size: usize,
    pub overlap: usize,
    pub bucket_size: usize,
    pub min_fire_index: f64,
    pub min_brightness: f64,
    pub opening_radius: usize,
    pub closing_radius: usize,
    /// Components must be strictly larger than this, in pixels
    pub min_area: usize,
}

impl Default for FireParams {
    fn default() -> Self {
        Self {
            tile_size: 2048,
            overlap: 256,
            bucket_size: 100,
            min_fire_index: 0.3,
            min_brightness: 0.5,
            opening_radius: 3,
            closing_radius: 5,
            min_area: 100,
        }
    }
}

/// Severity from component area and mean fire index.
pub fn fire_severity(area: usize, mean_fire_index: f64) -> Severity {
    let score = area as f64 / 1000.0 + mean_fire_index;
    if score > 2.0 {
        Severity::Critical
    } else if score > 1.0 {
        Severity::High
    } else if score > 0.5 {
        Severity::Medium
    } else {
        Severity::Low
    }
}

fn describe(severity: Severity, area_km2: f64) -> String {
    match severity {
        Severity::Critical => format!(
            "Large-scale fire detected covering approximately {:.2} km². Immediate response recommended.",
            area_km2
        ),
        Severity::High => format!(
            "Significant fire activity detected over {:.2} km². Active monitoring advised.",
            area_km2
        ),
        Severity::Medium => format!(
            "Fire signature detected covering {:.2} km². Investigation recommended.",
            area_km2
        ),
        Severity::Low => format!("Minor fire activity or hot spot detected over {:.2} km².", area_km2),
    }
}

#[derive(Debug, Clone, Default)]
pub struct FireDetector {
    params: FireParams,
}

impl FireDetector {
    pub fn new(params: FireParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &FireParams {
        &self.params
    }

    fn gain(stats: &RunStats, band: usize) -> Result<f64> {
        stats
            .range(band)
            .map(|r| r.high)
            .filter(|&h| h > 0.0)
            .ok_or_else(|| Error::Algorithm(format!("band {} has no positive 98th percentile", band)))
    }
}

/// Scale by `gain` and clip to 0..1; NaN stays NaN.
fn scale(data: &Array2<f64>, gain: f64) -> Array2<f64> {
    data.mapv(|v| if v.is_nan() { v } else { (v / gain).clamp(0.0, 1.0) })
}

impl Detector for FireDetector {
    type Finding = Candidate;

    fn name(&self) -> &'static str {
        "fire"
    }

    fn threat_type(&self) -> ThreatType {
        ThreatType::Fire
    }

    fn bucket_size(&self) -> usize {
        self.params.bucket_size
    }

    fn bands(&self, band_count: usize) -> Option<Vec<usize>> {
        (band_count >= 3).then(|| vec![1, 2, 3])
    }

    fn tiles(&self, width: usize, height: usize) -> Vec<Tile> {
        TileIterator::new(height, width, self.params.tile_size, self.params.overlap).collect()
    }

    fn check_stats(&self, stats: &RunStats, bands: &[usize]) -> std::result::Result<(), String> {
        bands
            .iter()
            .try_for_each(|&b| Self::gain(stats, b).map(|_| ()))
            .map_err(|e| e.to_string())
    }

    fn scan_tile(&self, tile: &Tile, data: &[Array2<f64>], ctx: &ScanContext) -> Result<Vec<Candidate>> {
        let [red, green, blue] = data else {
            return Err(Error::Algorithm(format!("fire detection needs 3 bands, got {}", data.len())));
        };
        let p = &self.params;

        let index = fire_index(red, green)?;
        let bright = brightness(
            &scale(red, Self::gain(ctx.stats, 1)?),
            &scale(green, Self::gain(ctx.stats, 2)?),
            &scale(blue, Self::gain(ctx.stats, 3)?),
        )?;
        let thresholds = FireMaskParams {
            min_fire_index: p.min_fire_index,
            min_brightness: p.min_brightness,
        };
        let mask = fire_mask(&index, &bright, &thresholds)?;
        let mask = opening(&mask, &StructuringElement::Disk(p.opening_radius))?;
        let mask = closing(&mask, &StructuringElement::Disk(p.closing_radius))?;

        let (_, regions) = label(&mask, Connectivity::Eight);
        debug!(tile = tile.index, components = regions.len(), "fire components");

        let candidates = regions
            .into_iter()
            .filter(|region| region.area > p.min_area)
            .map(|region| {
                let mean_index = region.mean_of(&index);
                let severity = fire_severity(region.area, mean_index);
                let (row, col) = tile.to_source_coords(region.centroid.0, region.centroid.1);
                let area_km2 = region.area as f64 * ctx.pixel_area() / 1_000_000.0;

                let mut details = TechnicalDetails::new();
                details.insert("fire_index".into(), mean_index.into());
                details.insert("brightness".into(), region.mean_of(&bright).into());
                details.insert("perimeter".into(), region.perimeter.into());

                Candidate {
                    x: col,
                    y: row,
                    severity,
                    confidence: (0.6 + mean_index * 0.4).min(0.99),
                    area_pixels: Some(region.area as u64),
                    vehicle_count: None,
                    description: describe(severity, area_km2),
                    details,
                }
            })
            .collect();
        Ok(candidates)
    }

    fn merge(&self, findings: Vec<Candidate>, _ctx: &ScanContext) -> Vec<Candidate> {
        findings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use geoscout_algorithms::stretch::PercentileRange;

    #[test]
    fn test_severity_thresholds() {
        assert_eq!(fire_severity(22_500, 0.6), Severity::Critical);
        assert_eq!(fire_severity(1_500, 0.6), Severity::Critical);
        assert_eq!(fire_severity(500, 0.6), Severity::High);
        assert_eq!(fire_severity(150, 0.4), Severity::Medium);
        assert_eq!(fire_severity(101, 0.3), Severity::Low);
    }

    #[test]
    fn test_scan_tile_finds_square() {
        let n = 200;
        let inside = |r: usize, c: usize| (50..130).contains(&r) && (60..140).contains(&c);
        let red = Array2::from_shape_fn((n, n), |(r, c)| if inside(r, c) { 200.0 } else { 100.0 });
        let other = Array2::from_shape_fn((n, n), |(r, c)| if inside(r, c) { 50.0 } else { 100.0 });
        let stats = RunStats::from_ranges(vec![
            Some(PercentileRange::new(100.0, 200.0)),
            Some(PercentileRange::new(50.0, 100.0)),
            Some(PercentileRange::new(50.0, 100.0)),
        ]);
        let ctx = ScanContext {
            stats: &stats,
            pixel_size: (10.0, 10.0),
            width: n,
            height: n,
        };
        let tile = TileIterator::new(n, n, 2048, 256).tile(0).unwrap();

        let found = FireDetector::default()
            .scan_tile(&tile, &[red, other.clone(), other], &ctx)
            .unwrap();
        assert_eq!(found.len(), 1);
        let fire = &found[0];
        assert_relative_eq!(fire.x, 99.5, epsilon = 0.5);
        assert_relative_eq!(fire.y, 89.5, epsilon = 0.5);
        assert_relative_eq!(fire.confidence, 0.84, epsilon = 1e-3);
        assert_eq!(fire.severity, Severity::Critical);
        assert!(fire.area_pixels.unwrap() > 6300);
        assert!(fire.description.contains("0.64 km²") || fire.description.contains("0.63 km²"));
    }

    #[test]
    fn test_needs_three_bands() {
        let d = FireDetector::default();
        assert!(d.bands(2).is_none());
        assert_eq!(d.bands(4), Some(vec![1, 2, 3]));
    }
}
