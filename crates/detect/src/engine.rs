//! Windowed detection engine
//!
//! A detector run walks `Idle → Scanning(tile) → Merging → Done`. Tiles are
//! read and scanned independently (in parallel when enabled); each yields a
//! `Result` so one bad tile only costs that tile. Tile results are then
//! merged in tile order: findings outside the tile's core are discarded,
//! candidates are deduplicated by spatial bucket (first seen wins), mapped
//! to WGS84 and validated against the raster footprint.

use geoscout_core::{CoordinateMapper, Error as CoreError, RasterHandle};
use geoscout_parallel::{ParallelStrategy, ProcessingMode, Tile};
use ndarray::Array2;
use tracing::{debug, info, warn};

use crate::dedup::DedupIndex;
use crate::error::{DetectError, Result, TileError};
use crate::model::{Detection, PixelCoord, Severity, TechnicalDetails, ThreatType};
use crate::stats::RunStats;

/// Progress of one detector run. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanState {
    Idle,
    Scanning { tile: usize },
    Merging,
    Done,
}

impl ScanState {
    fn rank(&self) -> (u8, usize) {
        match *self {
            ScanState::Idle => (0, 0),
            ScanState::Scanning { tile } => (1, tile),
            ScanState::Merging => (2, 0),
            ScanState::Done => (3, 0),
        }
    }

    pub fn can_advance_to(&self, next: ScanState) -> bool {
        next.rank() > self.rank()
    }
}

/// Anything a tile scan reports at a source pixel position.
pub trait Located {
    /// `(x, y)`: column and row in source pixels.
    fn position(&self) -> (f64, f64);
}

/// A detection before geolocation.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub x: f64,
    pub y: f64,
    pub severity: Severity,
    pub confidence: f64,
    pub area_pixels: Option<u64>,
    pub vehicle_count: Option<u32>,
    pub description: String,
    pub details: TechnicalDetails,
}

impl Located for Candidate {
    fn position(&self) -> (f64, f64) {
        (self.x, self.y)
    }
}

/// Read-only state shared by every tile of a run.
#[derive(Debug, Clone, Copy)]
pub struct ScanContext<'a> {
    pub stats: &'a RunStats,
    /// Absolute pixel size in CRS units `(x, y)`
    pub pixel_size: (f64, f64),
    pub width: usize,
    pub height: usize,
}

impl ScanContext<'_> {
    /// Ground area of one pixel in CRS units squared.
    pub fn pixel_area(&self) -> f64 {
        self.pixel_size.0 * self.pixel_size.1
    }
}

/// A per-tile detection algorithm.
pub trait Detector: Sync {
    /// What a tile scan reports; merged into candidates after all tiles.
    type Finding: Located + Send;

    fn name(&self) -> &'static str;

    fn threat_type(&self) -> ThreatType;

    /// DedupKey bucket edge in source pixels.
    fn bucket_size(&self) -> usize;

    /// 1-based bands read for each tile, or `None` if the raster lacks them.
    fn bands(&self, band_count: usize) -> Option<Vec<usize>>;

    /// Tiles to scan over a `width` x `height` raster.
    fn tiles(&self, width: usize, height: usize) -> Vec<Tile>;

    /// Whether the run statistics allow this detector to work. The default
    /// requires a range for every band.
    fn check_stats(&self, stats: &RunStats, bands: &[usize]) -> std::result::Result<(), String> {
        match bands.iter().find(|&&b| stats.range(b).is_none()) {
            Some(b) => Err(format!("band {} has no valid samples", b)),
            None => Ok(()),
        }
    }

    /// Scan one tile. `data` holds the tile window of each band from
    /// [`Detector::bands`], in order. Findings are in source pixels.
    fn scan_tile(&self, tile: &Tile, data: &[Array2<f64>], ctx: &ScanContext) -> geoscout_core::Result<Vec<Self::Finding>>;

    /// Turn the findings of all tiles, in tile order, into candidates.
    fn merge(&self, findings: Vec<Self::Finding>, ctx: &ScanContext) -> Vec<Candidate>;
}

/// Outcome of one detector run.
#[derive(Debug)]
pub struct DetectorReport {
    pub detector: &'static str,
    pub detections: Vec<Detection>,
    pub tiles_scanned: usize,
    pub tile_errors: Vec<TileError>,
    /// Candidates dropped because their bucket was already taken
    pub duplicates: usize,
    /// Candidates dropped by footprint validation
    pub rejected: usize,
    /// Why the detector did not scan, if it did not
    pub skipped: Option<String>,
    pub state: ScanState,
}

impl DetectorReport {
    fn new(detector: &'static str) -> Self {
        Self {
            detector,
            detections: Vec::new(),
            tiles_scanned: 0,
            tile_errors: Vec::new(),
            duplicates: 0,
            rejected: 0,
            skipped: None,
            state: ScanState::Idle,
        }
    }

    fn advance(&mut self, next: ScanState) {
        debug_assert!(self.state.can_advance_to(next), "{:?} -> {:?}", self.state, next);
        debug!(detector = self.detector, from = ?self.state, to = ?next, "scan state");
        self.state = next;
    }

    fn skip(mut self, reason: String) -> Self {
        info!(detector = self.detector, %reason, "detector skipped");
        self.skipped = Some(reason);
        self.advance(ScanState::Done);
        self
    }
}

/// Runs detectors over one open raster.
pub struct DetectionEngine<'a> {
    handle: &'a RasterHandle,
    mapper: &'a CoordinateMapper,
    stats: &'a RunStats,
    mode: ProcessingMode,
}

impl<'a> DetectionEngine<'a> {
    pub fn new(handle: &'a RasterHandle, mapper: &'a CoordinateMapper, stats: &'a RunStats) -> Self {
        Self {
            handle,
            mapper,
            stats,
            mode: ProcessingMode::default(),
        }
    }

    pub fn with_mode(mut self, mode: ProcessingMode) -> Self {
        self.mode = mode;
        self
    }

    /// Run `detector` over the raster.
    ///
    /// Tile failures are collected in the report; only a scan in which
    /// every tile failed is an error.
    pub fn run<D: Detector>(&self, detector: &D) -> Result<DetectorReport> {
        let mut report = DetectorReport::new(detector.name());
        let (width, height) = (self.handle.width(), self.handle.height());

        let Some(bands) = detector.bands(self.handle.band_count()) else {
            return Ok(report.skip(format!(
                "not applicable to a {}-band raster",
                self.handle.band_count()
            )));
        };
        if self.stats.is_empty() {
            return Ok(report.skip("raster has no valid data".to_string()));
        }
        if let Err(reason) = detector.check_stats(self.stats, &bands) {
            return Ok(report.skip(reason));
        }

        let ctx = ScanContext {
            stats: self.stats,
            pixel_size: self.handle.transform().resolution(),
            width,
            height,
        };
        let tiles = detector.tiles(width, height);
        info!(detector = detector.name(), tiles = tiles.len(), width, height, "scanning");

        let handle = self.handle;
        let results = self.mode.par_map(0..tiles.len(), |i| scan_one(handle, detector, &tiles[i], &bands, &ctx));

        let mut findings = Vec::new();
        for (tile, result) in tiles.iter().zip(results) {
            report.advance(ScanState::Scanning { tile: tile.index });
            match result {
                Ok(mut found) => {
                    report.tiles_scanned += 1;
                    findings.append(&mut found);
                }
                Err(e) => {
                    warn!(detector = detector.name(), error = %e, "tile skipped");
                    report.tile_errors.push(e);
                }
            }
        }
        if !tiles.is_empty() && report.tiles_scanned == 0 {
            let last = report.tile_errors.last().map(|e| e.to_string()).unwrap_or_default();
            return Err(DetectError::AllTilesFailed {
                detector: detector.name(),
                tiles: tiles.len(),
                last,
            });
        }

        report.advance(ScanState::Merging);
        let candidates = detector.merge(findings, &ctx);
        let mut dedup = DedupIndex::new(detector.bucket_size());
        for candidate in candidates {
            if !dedup.insert(candidate.x, candidate.y) {
                debug!(detector = detector.name(), x = candidate.x, y = candidate.y, "duplicate dropped");
                report.duplicates += 1;
                continue;
            }
            match self.locate(detector.threat_type(), candidate) {
                Ok(detection) => report.detections.push(detection),
                Err(e) => {
                    warn!(detector = detector.name(), error = %e, "detection dropped");
                    report.rejected += 1;
                }
            }
        }

        report.advance(ScanState::Done);
        info!(
            detector = detector.name(),
            detections = report.detections.len(),
            failed_tiles = report.tile_errors.len(),
            duplicates = report.duplicates,
            rejected = report.rejected,
            "scan complete"
        );
        Ok(report)
    }

    fn locate(&self, threat_type: ThreatType, c: Candidate) -> geoscout_core::Result<Detection> {
        let geo = self.mapper.pixel_to_geo(c.x, c.y);
        self.mapper.check(&geo.point)?;
        if geo.degraded {
            warn!(x = c.x, y = c.y, "detection location is not in WGS84");
        }
        Ok(Detection {
            threat_type,
            severity: c.severity,
            confidence: c.confidence,
            location: geo.point,
            location_degraded: geo.degraded,
            pixel_coordinates: PixelCoord::from_position(c.x, c.y),
            area_pixels: c.area_pixels,
            vehicle_count: c.vehicle_count,
            description: c.description,
            technical_details: c.details,
        })
    }
}

/// Read and scan one tile, keeping findings inside its core.
fn scan_one<D: Detector>(
    handle: &RasterHandle,
    detector: &D,
    tile: &Tile,
    bands: &[usize],
    ctx: &ScanContext,
) -> std::result::Result<Vec<D::Finding>, TileError> {
    let fail = |source: CoreError| TileError {
        index: tile.index,
        window: tile.window,
        source,
    };

    let mut data = Vec::with_capacity(bands.len());
    for &band in bands {
        data.push(handle.read_window(&tile.window, band).map_err(fail)?.into_array());
    }
    if data.iter().all(|d| d.iter().all(|&v| v == 0.0 || v.is_nan())) {
        debug!(detector = detector.name(), tile = tile.index, "empty tile");
        return Ok(Vec::new());
    }

    let findings = detector.scan_tile(tile, &data, ctx).map_err(fail)?;
    Ok(findings
        .into_iter()
        .filter(|f| {
            let (x, y) = f.position();
            tile.owns(y, x)
        })
        .collect())
}
