//! Tiled, multi-resolution output
//!
//! The full-resolution image is copied through bounded windows, then each
//! overview level is produced from area-averaged reads of the source. The
//! output only appears at its final path once every image is complete.

use std::path::{Path, PathBuf};

use geoscout_core::io::{ImageSpec, TiffFormat, TiffWriter};
use geoscout_core::{Compression, PixelType, RasterHandle, Window};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{CogError, Result};

/// Settings for [`build_tiled_output`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizeOptions {
    pub compression: Compression,
    /// JPEG quality (1-100)
    pub quality: u8,
    /// Decimation factor of each overview, relative to full resolution
    pub overview_levels: Vec<usize>,
    /// Edge of the square internal tiles
    pub block_size: usize,
    /// Edge of the square windows used to copy full-resolution data
    pub copy_window: usize,
    /// Container format; `None` picks BigTIFF only when the uncompressed
    /// pixels could overflow classic offsets.
    pub format: Option<TiffFormat>,
}

impl Default for OptimizeOptions {
    fn default() -> Self {
        Self {
            compression: Compression::Jpeg,
            quality: 85,
            overview_levels: vec![2, 4, 8, 16],
            block_size: 512,
            copy_window: 1024,
            format: None,
        }
    }
}

impl OptimizeOptions {
    pub fn validate(&self) -> Result<()> {
        if !(1..=100).contains(&self.quality) {
            return Err(CogError::InvalidOption {
                name: "quality",
                reason: format!("{} is outside 1..=100", self.quality),
            });
        }
        if self.block_size == 0 || self.block_size % 16 != 0 {
            return Err(CogError::InvalidOption {
                name: "block_size",
                reason: format!("{} is not a positive multiple of 16", self.block_size),
            });
        }
        if self.copy_window == 0 {
            return Err(CogError::InvalidOption {
                name: "copy_window",
                reason: "must be positive".into(),
            });
        }
        if let Some(bad) = self.overview_levels.iter().find(|&&f| f < 2) {
            return Err(CogError::InvalidOption {
                name: "overview_levels",
                reason: format!("factor {} must be at least 2", bad),
            });
        }
        Ok(())
    }
}

/// One reduced-resolution image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverviewLevel {
    pub factor: usize,
    pub width: usize,
    pub height: usize,
}

/// What [`build_tiled_output`] wrote.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TiledOutput {
    pub path: PathBuf,
    /// Compression actually used (after any fallback)
    pub compression: Compression,
    pub block_size: usize,
    pub bands: usize,
    pub overviews: Vec<OverviewLevel>,
    pub format: TiffFormat,
}

/// Compression to use for a raster with `bands` samples of `pixel_type`.
///
/// JPEG needs exactly three 8-bit bands for its colour transform; anything
/// else falls back to lossless Deflate.
pub fn effective_compression(requested: Compression, bands: usize, pixel_type: PixelType) -> Compression {
    if requested == Compression::Jpeg && (bands != 3 || pixel_type != PixelType::Uint8) {
        warn!(
            bands,
            dtype = %pixel_type,
            "JPEG requires 3 uint8 bands; falling back to deflate"
        );
        return Compression::Deflate;
    }
    requested
}

/// Sizes of the requested overview levels, in ascending factor order.
///
/// Duplicate factors are dropped, as are levels whose size equals the
/// previous level's (tiny rasters bottom out at 1x1).
pub fn overview_plan(width: usize, height: usize, factors: &[usize]) -> Vec<OverviewLevel> {
    let mut factors: Vec<usize> = factors.iter().copied().filter(|&f| f >= 2).collect();
    factors.sort_unstable();
    factors.dedup();

    let mut levels: Vec<OverviewLevel> = Vec::new();
    for factor in factors {
        let level = OverviewLevel {
            factor,
            width: width.div_ceil(factor),
            height: height.div_ceil(factor),
        };
        if levels.last().map_or(false, |p| (p.width, p.height) == (level.width, level.height)) {
            continue;
        }
        levels.push(level);
    }
    levels
}

/// Write `handle` as a tiled GeoTIFF with overviews at `output`.
///
/// On any error the partial file is removed and nothing appears at
/// `output`.
pub fn build_tiled_output(
    handle: &RasterHandle,
    output: impl AsRef<Path>,
    options: &OptimizeOptions,
) -> Result<TiledOutput> {
    options.validate()?;
    let (width, height, bands) = (handle.width(), handle.height(), handle.band_count());
    let compression = effective_compression(options.compression, bands, handle.pixel_type());
    let bs = options.block_size;

    let base = ImageSpec {
        width,
        height,
        bands,
        pixel_type: handle.pixel_type(),
        tile_size: bs,
        compression,
        quality: options.quality,
        transform: *handle.transform(),
        crs: handle.crs().cloned(),
        nodata: handle.nodata(),
        overview: false,
    };
    let levels = overview_plan(width, height, &options.overview_levels);

    let payload: u64 = std::iter::once((width, height))
        .chain(levels.iter().map(|l| (l.width, l.height)))
        .map(|(w, h)| (w * h * bands * handle.pixel_type().size()) as u64)
        .sum();
    let format = options.format.unwrap_or_else(|| TiffFormat::for_payload(payload));

    let mut writer = TiffWriter::create_with(output.as_ref(), format)?;
    let main = writer.add_image(base.clone())?;
    let mut overview_ids = Vec::with_capacity(levels.len());
    for level in &levels {
        let spec = ImageSpec {
            width: level.width,
            height: level.height,
            transform: base
                .transform
                .scaled(width as f64 / level.width as f64, height as f64 / level.height as f64),
            overview: true,
            ..base.clone()
        };
        overview_ids.push(writer.add_image(spec)?);
    }

    info!(
        width,
        height,
        bands,
        compression = compression.name(),
        block_size = bs,
        overviews = levels.len(),
        ?format,
        "writing tiled output"
    );
    copy_full_resolution(handle, &mut writer, main, options.copy_window)?;
    for (level, &id) in levels.iter().zip(&overview_ids) {
        debug!(factor = level.factor, width = level.width, height = level.height, "building overview");
        build_overview(handle, &mut writer, id, level)?;
    }

    let path = writer.finish()?;
    info!(path = %path.display(), "tiled output complete");
    Ok(TiledOutput {
        path,
        compression,
        block_size: bs,
        bands,
        overviews: levels,
        format,
    })
}

/// Interleave the `tile_size`² block at `(r0, c0)` of `bands` into `buf`.
fn interleave(bands: &[Array2<f64>], r0: usize, c0: usize, tile_size: usize, fill: f64, buf: &mut [f64]) {
    buf.fill(fill);
    let n = bands.len();
    for (b, band) in bands.iter().enumerate() {
        let (rows, cols) = band.dim();
        for r in 0..tile_size.min(rows.saturating_sub(r0)) {
            for c in 0..tile_size.min(cols.saturating_sub(c0)) {
                buf[(r * tile_size + c) * n + b] = band[(r0 + r, c0 + c)];
            }
        }
    }
}

fn copy_full_resolution(
    handle: &RasterHandle,
    writer: &mut TiffWriter,
    image: usize,
    copy_window: usize,
) -> Result<()> {
    let spec = writer
        .spec(image)
        .cloned()
        .ok_or_else(|| geoscout_core::Error::Other("main image missing".into()))?;
    let ts = spec.tile_size;
    // Whole tiles per copy window
    let tiles_per_window = copy_window.div_ceil(ts).max(1);
    let step = tiles_per_window * ts;
    let fill = spec.nodata.unwrap_or(0.0);
    let mut buf = vec![fill; ts * ts * spec.bands];

    for wy in (0..spec.height).step_by(step) {
        for wx in (0..spec.width).step_by(step) {
            let window = Window::new(wx as isize, wy as isize, step, step);
            let bands = (1..=spec.bands)
                .map(|b| handle.read_window(&window, b).map(|r| r.into_array()))
                .collect::<std::result::Result<Vec<_>, _>>()?;

            let (rows, cols) = bands[0].dim();
            for ty in 0..rows.div_ceil(ts) {
                for tx in 0..cols.div_ceil(ts) {
                    interleave(&bands, ty * ts, tx * ts, ts, fill, &mut buf);
                    writer.write_tile(image, wx / ts + tx, wy / ts + ty, &buf)?;
                }
            }
        }
    }
    Ok(())
}

fn build_overview(handle: &RasterHandle, writer: &mut TiffWriter, image: usize, level: &OverviewLevel) -> Result<()> {
    let spec = writer
        .spec(image)
        .cloned()
        .ok_or_else(|| geoscout_core::Error::Other("overview image missing".into()))?;
    let ts = spec.tile_size;
    let (src_w, src_h) = (handle.width(), handle.height());
    let sx = src_w as f64 / level.width as f64;
    let sy = src_h as f64 / level.height as f64;
    let fill = spec.nodata.unwrap_or(0.0);
    let mut buf = vec![fill; ts * ts * spec.bands];

    for ty in 0..spec.tiles_down() {
        for tx in 0..spec.tiles_across() {
            let (ox0, oy0) = (tx * ts, ty * ts);
            let ow = ts.min(level.width - ox0);
            let oh = ts.min(level.height - oy0);

            // Source pixels covered by this overview tile
            let c0 = (ox0 as f64 * sx).floor() as usize;
            let r0 = (oy0 as f64 * sy).floor() as usize;
            let c1 = (((ox0 + ow) as f64 * sx).ceil() as usize).min(src_w);
            let r1 = (((oy0 + oh) as f64 * sy).ceil() as usize).min(src_h);
            let window = Window::new(c0 as isize, r0 as isize, c1 - c0, r1 - r0);

            let bands = (1..=spec.bands)
                .map(|b| {
                    handle
                        .read_window_resampled(&window, b, ow, oh)
                        .map(|r| r.into_array())
                })
                .collect::<std::result::Result<Vec<_>, _>>()?;
            interleave(&bands, 0, 0, ts, fill, &mut buf);
            writer.write_tile(image, tx, ty, &buf)?;
        }
    }
    Ok(())
}
