//! Run-wide band statistics
//!
//! Stretch ranges must be identical for every tile of a scan, otherwise the
//! same surface would normalize differently on either side of a tile edge.
//! They are computed once per run from an area-averaged read whose longest
//! side is bounded, so memory use does not grow with the raster. Files with
//! overviews serve that read from the closest overview.

use geoscout_algorithms::stretch::{percentile_range, PercentileRange};
use geoscout_core::{RasterHandle, Result, Window};
use tracing::debug;

/// Longest side of the statistics sample by default.
pub const DEFAULT_SAMPLE_SIDE: usize = 1024;

/// 2nd/98th percentile ranges per band (zero and NaN samples excluded).
#[derive(Debug, Clone, PartialEq)]
pub struct RunStats {
    ranges: Vec<Option<PercentileRange>>,
}

impl RunStats {
    /// Sample every band of `handle` at no more than `max_side` pixels on
    /// the longest side.
    pub fn sample(handle: &RasterHandle, max_side: usize) -> Result<Self> {
        let (w, h) = (handle.width(), handle.height());
        let (sw, sh) = sample_size(w, h, max_side.max(1));
        let full = Window::full(w, h);

        let mut ranges = Vec::with_capacity(handle.band_count());
        for band in 1..=handle.band_count() {
            let data = handle.read_window_resampled(&full, band, sw, sh)?;
            let range = percentile_range(data.valid_values(), 2.0, 98.0);
            debug!(band, sample_width = sw, sample_height = sh, ?range, "band statistics");
            ranges.push(range);
        }
        Ok(Self { ranges })
    }

    pub fn from_ranges(ranges: Vec<Option<PercentileRange>>) -> Self {
        Self { ranges }
    }

    /// Range of a 1-based band; `None` when the band has no valid samples.
    pub fn range(&self, band: usize) -> Option<PercentileRange> {
        band.checked_sub(1).and_then(|i| self.ranges.get(i).copied().flatten())
    }

    /// True when no band has any valid (non-zero, finite) sample.
    pub fn is_empty(&self) -> bool {
        self.ranges.iter().all(Option::is_none)
    }
}

/// Largest size with the raster's aspect ratio whose longest side is at
/// most `max_side`.
fn sample_size(width: usize, height: usize, max_side: usize) -> (usize, usize) {
    let long = width.max(height);
    if long <= max_side {
        return (width.max(1), height.max(1));
    }
    let scale = max_side as f64 / long as f64;
    (
        ((width as f64 * scale).round() as usize).clamp(1, max_side),
        ((height as f64 * scale).round() as usize).clamp(1, max_side),
    )
}
