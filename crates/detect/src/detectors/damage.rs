//! Structural damage from edge density
//!
//! Only fixed blocks on a sparse stride are examined; the raster is not
//! covered exhaustively. A block is reported when the share of pixels with
//! a strong Sobel gradient exceeds a high threshold.

use geoscout_algorithms::edge::{center_of_mass, edge_density, edge_mask, finite_mean, sobel_magnitude};
use geoscout_algorithms::stretch::stretch_unit;
use geoscout_core::{Error, Result};
use geoscout_parallel::{SampleGrid, Tile};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::engine::{Candidate, Detector, ScanContext};
use crate::model::{Severity, TechnicalDetails, ThreatType};
use crate::stats::RunStats;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DamageParams {
    pub block_size: usize,
    pub stride: usize,
    pub bucket_size: usize,
    /// Gradient magnitude above which a pixel is an edge
    pub edge_threshold: f64,
    /// Edge share a block must exceed to be reported
    pub min_edge_density: f64,
    /// Upper bound on sampled blocks; unbounded when `None`
    pub max_samples: Option<usize>,
}

impl Default for DamageParams {
    fn default() -> Self {
        Self {
            block_size: 512,
            stride: 2048,
            bucket_size: 500,
            edge_threshold: 0.15,
            min_edge_density: 0.2,
            max_samples: None,
        }
    }
}

pub fn damage_severity(edge_density: f64) -> Severity {
    if edge_density > 0.4 {
        Severity::Critical
    } else if edge_density > 0.3 {
        Severity::High
    } else {
        Severity::Medium
    }
}

fn describe(severity: Severity, area_m2: f64) -> String {
    match severity {
        Severity::Critical => format!(
            "Severe structural damage detected across approximately {:.0} m². Pattern indicates potential explosive impact.",
            area_m2
        ),
        Severity::High => format!(
            "Moderate structural damage observed over {:.0} m². Possible building collapse or significant damage.",
            area_m2
        ),
        _ => format!(
            "Structural anomaly detected covering {:.0} m². Further analysis recommended.",
            area_m2
        ),
    }
}

#[derive(Debug, Clone, Default)]
pub struct DamageDetector {
    params: DamageParams,
}

impl DamageDetector {
    pub fn new(params: DamageParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &DamageParams {
        &self.params
    }
}

impl Detector for DamageDetector {
    type Finding = Candidate;

    fn name(&self) -> &'static str {
        "structural_damage"
    }

    fn threat_type(&self) -> ThreatType {
        ThreatType::StructuralDamage
    }

    fn bucket_size(&self) -> usize {
        self.params.bucket_size
    }

    fn bands(&self, band_count: usize) -> Option<Vec<usize>> {
        (band_count >= 1).then(|| vec![1])
    }

    fn tiles(&self, width: usize, height: usize) -> Vec<Tile> {
        let grid = SampleGrid::new(height, width, self.params.block_size, self.params.stride);
        match self.params.max_samples {
            Some(cap) => grid.capped(cap).tiles(),
            None => grid.tiles(),
        }
    }

    fn check_stats(&self, stats: &RunStats, _bands: &[usize]) -> std::result::Result<(), String> {
        match stats.range(1) {
            Some(r) if !r.is_degenerate() => Ok(()),
            Some(r) => Err(format!("band 1 has a degenerate stretch range [{}, {}]", r.low, r.high)),
            None => Err("band 1 has no valid samples".to_string()),
        }
    }

    fn scan_tile(&self, tile: &Tile, data: &[Array2<f64>], ctx: &ScanContext) -> Result<Vec<Candidate>> {
        let band = data
            .first()
            .ok_or_else(|| Error::Algorithm("damage detection needs one band".into()))?;
        let (rows, cols) = band.dim();
        if rows < 3 || cols < 3 {
            return Ok(Vec::new());
        }
        let range = ctx
            .stats
            .range(1)
            .ok_or_else(|| Error::Algorithm("band 1 has no stretch range".into()))?;

        let magnitude = sobel_magnitude(&stretch_unit(band, &range)?)?;
        let mask = edge_mask(&magnitude, self.params.edge_threshold);
        let density = edge_density(&mask);
        debug!(tile = tile.index, density, "edge density");
        if density <= self.params.min_edge_density {
            return Ok(Vec::new());
        }
        let Some((r, c)) = center_of_mass(&mask) else {
            return Ok(Vec::new());
        };

        let (row, col) = tile.to_source_coords(r, c);
        let severity = damage_severity(density);
        let area_m2 = (rows * cols) as f64 * ctx.pixel_area();
        let edges = mask.iter().filter(|&&v| v).count();

        let mut details = TechnicalDetails::new();
        details.insert("edge_density".into(), density.into());
        details.insert("mean_gradient".into(), finite_mean(&magnitude).into());
        details.insert("sample_x".into(), tile.window.col().into());
        details.insert("sample_y".into(), tile.window.row().into());

        Ok(vec![Candidate {
            x: col,
            y: row,
            severity,
            confidence: (0.6 + density * 0.35).min(0.95),
            area_pixels: Some(edges as u64),
            vehicle_count: None,
            description: describe(severity, area_m2),
            details,
        }])
    }

    fn merge(&self, findings: Vec<Candidate>, _ctx: &ScanContext) -> Vec<Candidate> {
        findings
    }
}
