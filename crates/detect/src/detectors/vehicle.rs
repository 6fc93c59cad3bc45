//! Vehicle concentrations
//!
//! A bounded number of sparse blocks is searched for small bright blobs at
//! half resolution. Blob centres from every block are then clustered by
//! single linkage, and each large enough cluster becomes one detection.
//!
//! Blob cells are thresholded on the unclipped percentile stretch, so only
//! cells brighter than the band's 98th percentile qualify and textured
//! background never does. Blob area is measured in source pixels: a 5x5
//! target covers nine half-resolution cells, below a ten-cell floor.

use geoscout_algorithms::blobs::{detect_blobs, BlobParams};
use geoscout_algorithms::cluster::{centroid, single_linkage, spread};
use geoscout_algorithms::resample::downsample_mean;
use geoscout_algorithms::stretch::stretch_linear;
use geoscout_core::{Error, Result};
use geoscout_parallel::{SampleGrid, Tile};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::engine::{Candidate, Detector, Located, ScanContext};
use crate::model::{Severity, TechnicalDetails, ThreatType};
use crate::stats::RunStats;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VehicleParams {
    pub block_size: usize,
    pub stride: usize,
    pub bucket_size: usize,
    /// Hard limit on sampled blocks
    pub max_samples: usize,
    /// Share of the sample grid that may be scanned, below `max_samples`
    pub sample_fraction: f64,
    pub downsample: usize,
    /// Value a downsampled cell must reach on the unclipped stretch, where
    /// 1.0 is the band's 98th percentile
    pub blob_threshold: f64,
    /// Blob area bounds in source pixels
    pub min_blob_area: f64,
    pub max_blob_area: f64,
    /// Single-linkage distance in source pixels
    pub cluster_distance: f64,
    pub min_cluster_size: usize,
    /// Spread below which a cluster is "concentrated"
    pub concentrated_spread: f64,
}

impl Default for VehicleParams {
    fn default() -> Self {
        Self {
            block_size: 512,
            stride: 1024,
            bucket_size: 500,
            max_samples: 4,
            sample_fraction: 0.1,
            downsample: 2,
            blob_threshold: 1.0,
            min_blob_area: 10.0,
            max_blob_area: 200.0,
            cluster_distance: 200.0,
            min_cluster_size: 5,
            concentrated_spread: 100.0,
        }
    }
}

impl VehicleParams {
    /// Blocks scanned out of a grid of `total`: the smaller of
    /// `max_samples` and `sample_fraction` of the grid, but at least one.
    pub fn sample_cap(&self, total: usize) -> usize {
        let by_fraction = (self.sample_fraction * total as f64).floor() as usize;
        by_fraction.min(self.max_samples).max(1)
    }
}

pub fn vehicle_severity(count: usize) -> Severity {
    if count > 20 {
        Severity::Critical
    } else if count > 10 {
        Severity::High
    } else if count > 5 {
        Severity::Medium
    } else {
        Severity::Low
    }
}

fn describe(count: usize) -> String {
    if count > 20 {
        format!(
            "Large convoy or military formation detected with {}+ vehicles. High-priority monitoring recommended.",
            count
        )
    } else if count > 10 {
        format!(
            "Significant vehicle concentration identified with approximately {} vehicles. Could indicate convoy movement.",
            count
        )
    } else if count > 5 {
        format!("Vehicle grouping detected with {} vehicles. May indicate coordinated movement.", count)
    } else {
        format!("Small vehicle cluster identified with {} vehicles.", count)
    }
}

/// A blob centre in source pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlobHit {
    pub x: f64,
    pub y: f64,
    pub area: f64,
}

impl Located for BlobHit {
    fn position(&self) -> (f64, f64) {
        (self.x, self.y)
    }
}

#[derive(Debug, Clone, Default)]
pub struct VehicleDetector {
    params: VehicleParams,
}

impl VehicleDetector {
    pub fn new(params: VehicleParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &VehicleParams {
        &self.params
    }
}

impl Detector for VehicleDetector {
    type Finding = BlobHit;

    fn name(&self) -> &'static str {
        "vehicle_convoy"
    }

    fn threat_type(&self) -> ThreatType {
        ThreatType::VehicleConvoy
    }

    fn bucket_size(&self) -> usize {
        self.params.bucket_size
    }

    fn bands(&self, band_count: usize) -> Option<Vec<usize>> {
        (band_count >= 1).then(|| vec![1])
    }

    fn tiles(&self, width: usize, height: usize) -> Vec<Tile> {
        let grid = SampleGrid::new(height, width, self.params.block_size, self.params.stride);
        let cap = self.params.sample_cap(grid.total());
        grid.capped(cap).tiles()
    }

    fn check_stats(&self, stats: &RunStats, _bands: &[usize]) -> std::result::Result<(), String> {
        match stats.range(1) {
            Some(r) if !r.is_degenerate() => Ok(()),
            Some(r) => Err(format!("band 1 has a degenerate stretch range [{}, {}]", r.low, r.high)),
            None => Err("band 1 has no valid samples".to_string()),
        }
    }

    fn scan_tile(&self, tile: &Tile, data: &[Array2<f64>], ctx: &ScanContext) -> Result<Vec<BlobHit>> {
        let band = data
            .first()
            .ok_or_else(|| Error::Algorithm("vehicle detection needs one band".into()))?;
        let range = ctx
            .stats
            .range(1)
            .ok_or_else(|| Error::Algorithm("band 1 has no stretch range".into()))?;
        let p = &self.params;
        let factor = p.downsample.max(1);

        let small = downsample_mean(&stretch_linear(band, &range)?, factor)?;
        let blobs = detect_blobs(
            &small,
            &BlobParams {
                threshold: p.blob_threshold,
                min_area: p.min_blob_area,
                max_area: p.max_blob_area,
                pixel_area: (factor * factor) as f64,
            },
        );
        debug!(tile = tile.index, blobs = blobs.len(), "blobs");

        // centre of a downsampled cell in source pixel indices
        let offset = (factor as f64 - 1.0) / 2.0;
        Ok(blobs
            .into_iter()
            .map(|b| {
                let (row, col) = tile.to_source_coords(b.y * factor as f64 + offset, b.x * factor as f64 + offset);
                BlobHit {
                    x: col,
                    y: row,
                    area: b.area,
                }
            })
            .collect())
    }

    fn merge(&self, findings: Vec<BlobHit>, _ctx: &ScanContext) -> Vec<Candidate> {
        let p = &self.params;
        let points: Vec<(f64, f64)> = findings.iter().map(|h| (h.x, h.y)).collect();
        let clusters = single_linkage(&points, p.cluster_distance);

        clusters
            .into_iter()
            .filter(|members| members.len() >= p.min_cluster_size)
            .filter_map(|members| {
                let (x, y) = centroid(&points, &members)?;
                let count = members.len();
                let cluster_spread = spread(&points, &members);
                let formation = if cluster_spread < p.concentrated_spread {
                    "concentrated"
                } else {
                    "dispersed"
                };

                let mut details = TechnicalDetails::new();
                details.insert("cluster_spread".into(), cluster_spread.into());
                details.insert("formation_type".into(), formation.into());

                let severity = vehicle_severity(count);
                Some(Candidate {
                    x,
                    y,
                    severity,
                    confidence: (0.6 + count as f64 / 50.0).min(0.9),
                    area_pixels: None,
                    vehicle_count: Some(count as u32),
                    description: describe(count),
                    details,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    use crate::model::DetailValue;

    fn ctx(stats: &RunStats) -> ScanContext<'_> {
        ScanContext {
            stats,
            pixel_size: (1.0, 1.0),
            width: 4096,
            height: 4096,
        }
    }

    #[test]
    fn test_sample_cap() {
        let p = VehicleParams::default();
        assert_eq!(p.sample_cap(1), 1);
        assert_eq!(p.sample_cap(16), 1);
        assert_eq!(p.sample_cap(25), 2);
        assert_eq!(p.sample_cap(100), 4);
        assert_eq!(VehicleDetector::default().tiles(4096, 4096).len(), 1);
        assert_eq!(VehicleDetector::default().tiles(10_240, 10_240).len(), 4);
    }

    #[test]
    fn test_severity_thresholds() {
        assert_eq!(vehicle_severity(21), Severity::Critical);
        assert_eq!(vehicle_severity(11), Severity::High);
        assert_eq!(vehicle_severity(6), Severity::Medium);
        assert_eq!(vehicle_severity(5), Severity::Low);
    }

    #[test]
    fn test_blob_positions_map_to_source() {
        let mut band = Array2::from_elem((64, 64), 0.1);
        // 4x4 bright square at rows 20..24, cols 40..44
        for r in 20..24 {
            for c in 40..44 {
                band[(r, c)] = 1.0;
            }
        }
        let stats = RunStats::from_ranges(vec![Some(geoscout_algorithms::stretch::PercentileRange::new(0.0, 1.0))]);
        let tile = SampleGrid::new(64, 64, 512, 1024).tiles()[0];
        let mut params = VehicleParams::default();
        params.min_blob_area = 4.0;
        let hits = VehicleDetector::new(params).scan_tile(&tile, &[band], &ctx(&stats)).unwrap();
        assert_eq!(hits.len(), 1);
        assert_relative_eq!(hits[0].x, 41.5);
        assert_relative_eq!(hits[0].y, 21.5);
        assert_relative_eq!(hits[0].area, 16.0);
    }

    #[test]
    fn test_merge_clusters() {
        let mut hits: Vec<BlobHit> = (0..6)
            .map(|i| BlobHit {
                x: 100.0 + 20.0 * i as f64,
                y: 300.0,
                area: 36.0,
            })
            .collect();
        // far-away pair never reaches the minimum size
        hits.push(BlobHit { x: 3000.0, y: 3000.0, area: 36.0 });
        hits.push(BlobHit { x: 3010.0, y: 3000.0, area: 36.0 });

        let stats = RunStats::from_ranges(vec![]);
        let found = VehicleDetector::default().merge(hits, &ctx(&stats));
        assert_eq!(found.len(), 1);
        let c = &found[0];
        assert_eq!(c.vehicle_count, Some(6));
        assert_eq!(c.severity, Severity::Medium);
        assert_relative_eq!(c.x, 150.0);
        assert_relative_eq!(c.y, 300.0);
        assert_relative_eq!(c.confidence, 0.72);
        assert_eq!(c.details["formation_type"], DetailValue::Text("concentrated".into()));
    }

    /// Uniform 30..70 texture from a fixed LCG.
    fn textured(rows: usize, cols: usize, seed: u64) -> Array2<f64> {
        let mut state = seed;
        Array2::from_shape_fn((rows, cols), |_| {
            state = state.wrapping_mul(6_364_136_223_846_793_005).wrapping_add(1_442_695_040_888_963_407);
            30.0 + ((state >> 33) % 40) as f64
        })
    }

    #[test]
    fn test_textured_background_yields_only_real_blobs() {
        let mut band = textured(256, 256, 7);
        let stats = RunStats::from_ranges(vec![geoscout_algorithms::stretch::percentile_range(
            band.iter().copied(),
            2.0,
            98.0,
        )]);
        let tile = SampleGrid::new(256, 256, 512, 1024).tiles()[0];
        let detector = VehicleDetector::default();

        let hits = detector.scan_tile(&tile, &[band.clone()], &ctx(&stats)).unwrap();
        assert!(hits.is_empty(), "{:?}", hits);

        // one 5x5 target off the downsample grid
        for r in 101..106 {
            for c in 57..62 {
                band[(r, c)] = 250.0;
            }
        }
        let hits = detector.scan_tile(&tile, &[band], &ctx(&stats)).unwrap();
        assert_eq!(hits.len(), 1, "{:?}", hits);
        assert_relative_eq!(hits[0].area, 36.0);
        assert!((hits[0].x - 59.0).abs() <= 1.0);
        assert!((hits[0].y - 103.0).abs() <= 1.0);
    }
}
