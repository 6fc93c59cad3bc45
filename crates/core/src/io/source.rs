//! Windowed raster reader.
//!
//! [`RasterHandle`] parses the image directories of a GeoTIFF once and then
//! serves reads of arbitrary windows by decoding only the tiles or strips
//! that intersect them. No read allocates more than the requested window
//! plus the chunks it touches. Reduced-resolution reads are served from the
//! coarsest stored overview that is still at least as fine as the output.

use std::fs::File;
use std::io::BufReader;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use ndarray::Array2;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::crs::CRS;
use crate::error::{Error, Result};
use crate::io::cache::{ChunkCache, ChunkKey};
use crate::io::codec::{self, ChunkShape};
use crate::io::geokeys::{self, GeoMeta};
use crate::io::ifd::{self, tags, Ifd};
use crate::raster::{Endian, GeoTransform, PixelType, Raster};

/// Default number of decoded chunks kept per handle.
pub const DEFAULT_CACHE_CHUNKS: usize = 64;

/// Longest IFD chain followed when collecting overviews.
const MAX_IFD_CHAIN: usize = 64;

/// Photometric interpretation codes.
pub mod photometric {
    pub const MIN_IS_WHITE: u16 = 0;
    pub const MIN_IS_BLACK: u16 = 1;
    pub const RGB: u16 = 2;
    pub const PALETTE: u16 = 3;
    pub const YCBCR: u16 = 6;
}

/// A rectangular region in pixel space.
///
/// Offsets may be negative or extend past the raster: reads clip the window
/// to the raster bounds and only reject it when nothing is left.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Window {
    pub col_off: isize,
    pub row_off: isize,
    pub width: usize,
    pub height: usize,
}

impl Window {
    pub fn new(col_off: isize, row_off: isize, width: usize, height: usize) -> Self {
        Self {
            col_off,
            row_off,
            width,
            height,
        }
    }

    /// Window covering a whole `width` x `height` raster.
    pub fn full(width: usize, height: usize) -> Self {
        Self::new(0, 0, width, height)
    }

    /// Exclusive end column.
    pub fn col_end(&self) -> isize {
        self.col_off + self.width as isize
    }

    /// Exclusive end row.
    pub fn row_end(&self) -> isize {
        self.row_off + self.height as isize
    }

    pub fn area(&self) -> usize {
        self.width * self.height
    }

    /// Intersection with a `width` x `height` raster, or `None` if empty.
    pub fn clip(&self, width: usize, height: usize) -> Option<Window> {
        let c0 = self.col_off.max(0);
        let r0 = self.row_off.max(0);
        let c1 = self.col_end().min(width as isize);
        let r1 = self.row_end().min(height as isize);
        if c1 <= c0 || r1 <= r0 {
            return None;
        }
        Some(Window::new(c0, r0, (c1 - c0) as usize, (r1 - r0) as usize))
    }

    /// Column offset as an index; only meaningful for clipped windows.
    pub fn col(&self) -> usize {
        self.col_off.max(0) as usize
    }

    /// Row offset as an index; only meaningful for clipped windows.
    pub fn row(&self) -> usize {
        self.row_off.max(0) as usize
    }
}

/// Summary of a raster's structure and georeferencing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RasterMetadata {
    pub width: usize,
    pub height: usize,
    pub bands: usize,
    pub dtype: String,
    /// CRS identifier, e.g. `EPSG:32630`.
    pub crs: Option<String>,
    /// GDAL-ordered affine coefficients.
    pub transform: [f64; 6],
    /// Native bounds (left, bottom, right, top).
    pub bounds: (f64, f64, f64, f64),
    /// Absolute pixel size (x, y).
    pub resolution: (f64, f64),
    pub nodata: Option<f64>,
    pub compression: String,
    pub tiled: bool,
    pub block_size: (usize, usize),
    pub overview_count: usize,
}

/// Chunk layout of one stored image: the main image or an overview.
///
/// Strips are treated as full-width tiles so tiled and stripped files go
/// through the same read path.
#[derive(Debug, Clone)]
struct Layout {
    width: usize,
    height: usize,
    samples: usize,
    planar: bool,
    pixel_type: PixelType,
    order: Endian,
    compression: u16,
    predictor: u16,
    tiled: bool,
    chunk_width: usize,
    chunk_height: usize,
    chunks_across: usize,
    chunks_down: usize,
    offsets: Vec<u64>,
    byte_counts: Vec<u64>,
    jpeg_tables: Option<Vec<u8>>,
}

impl Layout {
    fn chunks_per_plane(&self) -> usize {
        self.chunks_across * self.chunks_down
    }

    /// Samples interleaved within one chunk.
    fn chunk_samples(&self) -> usize {
        if self.planar {
            1
        } else {
            self.samples
        }
    }

    /// Rows actually stored in chunk row `cy`. The last strip of a stripped
    /// image may be short; tiles are always padded to full size.
    fn stored_rows(&self, cy: usize) -> usize {
        if self.tiled {
            self.chunk_height
        } else {
            self.chunk_height.min(self.height - cy * self.chunk_height)
        }
    }

    fn chunk_bytes(&self, cy: usize) -> usize {
        self.chunk_width * self.stored_rows(cy) * self.chunk_samples() * self.pixel_type.size()
    }
}

/// An open raster file supporting windowed reads.
///
/// The handle is `Sync`: concurrent readers share the file through a mutex
/// and the decoded-chunk cache through another. Dropping the handle or
/// calling [`RasterHandle::close`] releases the file.
pub struct RasterHandle {
    path: PathBuf,
    file: Mutex<Option<BufReader<File>>>,
    /// Full resolution first, then overviews in file order
    levels: Vec<Layout>,
    geo: GeoMeta,
    overview_sizes: Vec<(usize, usize)>,
    cache: Mutex<ChunkCache>,
}

impl std::fmt::Debug for RasterHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RasterHandle")
            .field("path", &self.path)
            .field("width", &self.layout().width)
            .field("height", &self.layout().height)
            .field("bands", &self.layout().samples)
            .field("dtype", &self.layout().pixel_type)
            .field("levels", &self.levels.len())
            .finish()
    }
}

impl RasterHandle {
    /// Open a GeoTIFF for windowed reading.
    ///
    /// Fails with [`Error::Open`] when the file is missing, unreadable or not
    /// a raster this reader understands.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_cache(path, DEFAULT_CACHE_CHUNKS)
    }

    /// Open with an explicit chunk cache capacity.
    pub fn open_with_cache(path: impl AsRef<Path>, cache_chunks: usize) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let open_err = |reason: String| Error::Open {
            path: path.display().to_string(),
            reason,
        };

        let file = File::open(&path).map_err(|e| open_err(e.to_string()))?;
        let mut reader = BufReader::new(file);

        let (levels, geo) = parse_structure(&mut reader).map_err(|e| open_err(e.to_string()))?;
        let main = &levels[0];

        debug!(
            path = %path.display(),
            width = main.width,
            height = main.height,
            bands = main.samples,
            dtype = %main.pixel_type,
            tiled = main.tiled,
            overviews = levels.len() - 1,
            "opened raster"
        );

        let overview_sizes = levels[1..].iter().map(|l| (l.width, l.height)).collect();
        Ok(Self {
            path,
            file: Mutex::new(Some(reader)),
            levels,
            geo,
            overview_sizes,
            cache: Mutex::new(ChunkCache::new(cache_chunks)),
        })
    }

    /// Release the underlying file. Safe to call repeatedly and after
    /// failed reads; later reads fail with [`Error::Read`].
    pub fn close(&self) {
        lock(&self.file).take();
        lock(&self.cache).clear();
    }

    pub fn is_closed(&self) -> bool {
        lock(&self.file).is_none()
    }

    fn layout(&self) -> &Layout {
        &self.levels[0]
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn width(&self) -> usize {
        self.layout().width
    }

    pub fn height(&self) -> usize {
        self.layout().height
    }

    pub fn band_count(&self) -> usize {
        self.layout().samples
    }

    pub fn pixel_type(&self) -> PixelType {
        self.layout().pixel_type
    }

    pub fn transform(&self) -> &GeoTransform {
        &self.geo.transform
    }

    /// Whether the file carried its own georeferencing tags.
    pub fn is_georeferenced(&self) -> bool {
        self.geo.georeferenced
    }

    pub fn crs(&self) -> Option<&CRS> {
        self.geo.crs.as_ref()
    }

    pub fn nodata(&self) -> Option<f64> {
        self.geo.nodata
    }

    /// Native tile or strip size (width, height).
    pub fn block_size(&self) -> (usize, usize) {
        (self.layout().chunk_width, self.layout().chunk_height)
    }

    /// Dimensions of the usable reduced-resolution images stored after the
    /// main one.
    pub fn overview_sizes(&self) -> &[(usize, usize)] {
        &self.overview_sizes
    }

    pub fn metadata(&self) -> RasterMetadata {
        let l = self.layout();
        let t = &self.geo.transform;
        let (min_x, min_y, max_x, max_y) = t.bounds(l.width, l.height);
        RasterMetadata {
            width: l.width,
            height: l.height,
            bands: l.samples,
            dtype: l.pixel_type.name().to_string(),
            crs: self.geo.crs.as_ref().map(|c| c.identifier()),
            transform: t.to_gdal(),
            bounds: (min_x, min_y, max_x, max_y),
            resolution: t.resolution(),
            nodata: self.geo.nodata,
            compression: compression_name(l.compression).to_string(),
            tiled: l.tiled,
            block_size: (l.chunk_width, l.chunk_height),
            overview_count: self.overview_sizes.len(),
        }
    }

    /// Read one band (1-based) over `window`.
    ///
    /// The window is clipped to the raster; a window with no pixels inside
    /// fails with [`Error::Read`]. Nodata samples are returned as NaN and the
    /// result carries the transform of the clipped window's corner.
    pub fn read_window(&self, window: &Window, band: usize) -> Result<Raster<f64>> {
        self.check_band(band)?;
        let win = self.clip(window)?;
        let mut out = Array2::<f64>::zeros((win.height, win.width));
        self.fill_window(0, &win, band, &mut out)?;

        let mut raster = Raster::from_array(out)
            .with_georef(self.geo.transform.for_window(win.col(), win.row()), self.geo.crs.clone());
        raster.set_nodata(self.geo.nodata);
        Ok(raster)
    }

    /// Read one band over `window`, area-averaged to `out_width` x `out_height`.
    ///
    /// The average is taken over the coarsest stored level whose pixels are
    /// no larger than the output's, so a downsampled read of a file with
    /// overviews decodes overview chunks rather than the full image.
    /// Source rows are consumed in bounded strips, so the peak allocation is
    /// the output plus one strip of the window. NaN samples are excluded from
    /// each average; an output cell with no valid coverage is NaN.
    pub fn read_window_resampled(
        &self,
        window: &Window,
        band: usize,
        out_width: usize,
        out_height: usize,
    ) -> Result<Raster<f64>> {
        self.check_band(band)?;
        if out_width == 0 || out_height == 0 {
            return Err(Error::InvalidDimensions {
                width: out_width,
                height: out_height,
            });
        }
        let win = self.clip(window)?;
        if out_width == win.width && out_height == win.height {
            return self.read_window(&win, band);
        }

        let sx = win.width as f64 / out_width as f64;
        let sy = win.height as f64 / out_height as f64;
        let level = self.level_for_scale(sx, sy);
        let l = &self.levels[level];
        let (fx, fy) = self.level_factors(level);

        // Window edges in the chosen level's pixel grid.
        let x0 = win.col() as f64 / fx;
        let x1 = ((win.col() + win.width) as f64 / fx).min(l.width as f64);
        let y0 = win.row() as f64 / fy;
        let y1 = ((win.row() + win.height) as f64 / fy).min(l.height as f64);
        let col_weights = span_weights(x0, x1, l.width, out_width);
        let row_weights = span_weights(y0, y1, l.height, out_height);

        let src_c0 = col_weights.iter().flatten().map(|&(c, _)| c).min().unwrap_or(0);
        let src_c1 = col_weights.iter().flatten().map(|&(c, _)| c + 1).max().unwrap_or(src_c0 + 1);
        let batch = ((STRIP_ROWS as f64 / ((y1 - y0) / out_height as f64).ceil()).floor() as usize).max(1);

        debug!(level, out_width, out_height, "resampled read");

        let mut out = Array2::<f64>::from_elem((out_height, out_width), f64::NAN);
        let mut oy = 0;
        while oy < out_height {
            let oy_end = (oy + batch).min(out_height);
            let rows = &row_weights[oy..oy_end];
            let (src_r0, src_r1) = match (
                rows.iter().flatten().map(|&(r, _)| r).min(),
                rows.iter().flatten().map(|&(r, _)| r + 1).max(),
            ) {
                (Some(a), Some(b)) => (a, b),
                _ => {
                    oy = oy_end;
                    continue;
                }
            };

            let strip_win = Window::new(src_c0 as isize, src_r0 as isize, src_c1 - src_c0, src_r1 - src_r0);
            let mut strip = Array2::<f64>::zeros((strip_win.height, strip_win.width));
            self.fill_window(level, &strip_win, band, &mut strip)?;

            for y in oy..oy_end {
                for (x, cols) in col_weights.iter().enumerate() {
                    out[(y, x)] = weighted_mean(row_weights[y].iter().flat_map(|&(r, wr)| {
                        let row = strip.row(r - src_r0);
                        cols.iter().map(move |&(c, wc)| (row[c - src_c0], wr * wc))
                    }));
                }
            }
            oy = oy_end;
        }

        let transform = self
            .geo
            .transform
            .for_window(win.col(), win.row())
            .scaled(sx, sy);
        let mut raster = Raster::from_array(out).with_georef(transform, self.geo.crs.clone());
        raster.set_nodata(self.geo.nodata);
        Ok(raster)
    }

    /// Full-resolution pixels per pixel of `level`, along each axis.
    fn level_factors(&self, level: usize) -> (f64, f64) {
        let main = self.layout();
        let l = &self.levels[level];
        (main.width as f64 / l.width as f64, main.height as f64 / l.height as f64)
    }

    /// Coarsest level whose pixels cover at most `sx` by `sy` full-resolution
    /// pixels.
    fn level_for_scale(&self, sx: f64, sy: f64) -> usize {
        const TOLERANCE: f64 = 1e-6;
        (1..self.levels.len())
            .filter(|&i| {
                let (fx, fy) = self.level_factors(i);
                fx <= sx * (1.0 + TOLERANCE) && fy <= sy * (1.0 + TOLERANCE)
            })
            .max_by(|&a, &b| self.level_factors(a).0.total_cmp(&self.level_factors(b).0))
            .unwrap_or(0)
    }

    fn check_band(&self, band: usize) -> Result<()> {
        if band == 0 || band > self.layout().samples {
            return Err(Error::InvalidParameter {
                name: "band",
                value: band.to_string(),
                reason: format!("raster has bands 1..={}", self.layout().samples),
            });
        }
        Ok(())
    }

    fn clip(&self, window: &Window) -> Result<Window> {
        window
            .clip(self.layout().width, self.layout().height)
            .ok_or_else(|| {
                Error::Read(format!(
                    "window {:?} lies outside raster {}x{}",
                    window, self.layout().width, self.layout().height
                ))
            })
    }

    /// Copy band samples of `level` for a window already clipped to that
    /// level into `out`.
    fn fill_window(&self, level: usize, win: &Window, band: usize, out: &mut Array2<f64>) -> Result<()> {
        let l = &self.levels[level];
        let size = l.pixel_type.size();
        let spp = l.chunk_samples();
        let (plane, sample) = if l.planar { (band - 1, 0) } else { (0, band - 1) };
        let nodata = self.geo.nodata;

        let (c0, r0) = (win.col(), win.row());
        let (c1, r1) = (c0 + win.width, r0 + win.height);

        for cy in r0 / l.chunk_height..=(r1 - 1) / l.chunk_height {
            for cx in c0 / l.chunk_width..=(c1 - 1) / l.chunk_width {
                let chunk = self.chunk(level, plane, cy * l.chunks_across + cx, cy)?;

                let chunk_r0 = cy * l.chunk_height;
                let chunk_c0 = cx * l.chunk_width;
                let rows = r0.max(chunk_r0)..r1.min(chunk_r0 + l.stored_rows(cy));
                let cols = c0.max(chunk_c0)..c1.min(chunk_c0 + l.chunk_width);

                for r in rows {
                    let local_r = r - chunk_r0;
                    let mut dst = out.row_mut(r - r0);
                    for c in cols.clone() {
                        let local_c = c - chunk_c0;
                        let off = ((local_r * l.chunk_width + local_c) * spp + sample) * size;
                        let v = l.pixel_type.read_sample(l.order, &chunk[off..off + size]);
                        dst[c - c0] = match nodata {
                            Some(nd) if v == nd => f64::NAN,
                            _ => v,
                        };
                    }
                }
            }
        }
        Ok(())
    }

    /// Decoded bytes of one chunk, served from the cache when possible.
    fn chunk(&self, level: usize, plane: usize, index: usize, cy: usize) -> Result<Arc<Vec<u8>>> {
        let key = ChunkKey {
            level,
            plane,
            chunk: index,
        };
        if let Some(hit) = lock(&self.cache).get(&key) {
            return Ok(hit);
        }

        let l = &self.levels[level];
        let slot = plane * l.chunks_per_plane() + index;
        let (offset, count) = match (l.offsets.get(slot), l.byte_counts.get(slot)) {
            (Some(&o), Some(&c)) => (o, c),
            _ => return Err(Error::Read(format!("chunk {} missing from offset table", slot))),
        };
        let expected = l.chunk_bytes(cy);

        let decoded = if count == 0 {
            // Sparse chunk: never written, reads as zero.
            vec![0u8; expected]
        } else {
            let compressed = {
                let mut guard = lock(&self.file);
                let reader = guard
                    .as_mut()
                    .ok_or_else(|| Error::Read(format!("{} is closed", self.path.display())))?;
                let mut buf = vec![0u8; count as usize];
                reader.seek(SeekFrom::Start(offset))?;
                reader
                    .read_exact(&mut buf)
                    .map_err(|e| Error::Read(format!("chunk {} at offset {}: {}", slot, offset, e)))?;
                buf
            };

            let shape = ChunkShape {
                width: l.chunk_width as u32,
                height: l.stored_rows(cy) as u32,
                samples: l.chunk_samples() as u16,
            };
            let mut raw = codec::decompress(
                &compressed,
                l.compression,
                expected,
                shape,
                l.jpeg_tables.as_deref(),
            )
            .map_err(|e| Error::Read(format!("chunk {}: {}", slot, e)))?;

            if raw.len() < expected {
                return Err(Error::Read(format!(
                    "chunk {} decoded to {} bytes, expected {}",
                    slot,
                    raw.len(),
                    expected
                )));
            }
            if l.predictor == 2 {
                codec::undo_horizontal_predictor(&mut raw, l.pixel_type, l.order, l.chunk_width, l.chunk_samples())?;
            }
            raw
        };

        let decoded = Arc::new(decoded);
        lock(&self.cache).insert(key, Arc::clone(&decoded));
        Ok(decoded)
    }
}

/// Source rows read per resampling strip.
const STRIP_ROWS: usize = 256;

/// Area weights mapping `src` source cells onto `dst` output cells.
#[cfg(test)]
fn axis_weights(src: usize, dst: usize) -> Vec<Vec<(usize, f64)>> {
    span_weights(0.0, src as f64, src, dst)
}

/// Area weights mapping the source span `[start, end)` onto `dst` equal
/// output cells.
///
/// Entry `i` lists `(source_index, overlap)` for every source cell below
/// `limit` that intersects output cell `i`.
fn span_weights(start: f64, end: f64, limit: usize, dst: usize) -> Vec<Vec<(usize, f64)>> {
    let scale = (end - start) / dst as f64;
    (0..dst)
        .map(|i| {
            let a = start + i as f64 * scale;
            let b = (start + (i + 1) as f64 * scale).min(limit as f64);
            let first = (a.floor().max(0.0) as usize).min(limit.saturating_sub(1));
            let last = (b.ceil() as usize).clamp(first + 1, limit.max(first + 1));
            (first..last)
                .filter_map(|s| {
                    let overlap = b.min(s as f64 + 1.0) - a.max(s as f64);
                    (overlap > 1e-12).then_some((s, overlap))
                })
                .collect()
        })
        .collect()
}

/// Weighted mean of the non-NaN values, or NaN when none remain.
///
/// Deviations are accumulated around the first valid value, so a run of
/// identical samples averages to exactly that sample.
fn weighted_mean(samples: impl Iterator<Item = (f64, f64)>) -> f64 {
    let mut base = f64::NAN;
    let mut sum = 0.0;
    let mut weight = 0.0;
    for (v, w) in samples.filter(|(v, _)| !v.is_nan()) {
        if base.is_nan() {
            base = v;
        }
        sum += (v - base) * w;
        weight += w;
    }
    if weight > 0.0 {
        base + sum / weight
    } else {
        f64::NAN
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn compression_name(code: u16) -> &'static str {
    match code {
        codec::codes::NONE => "none",
        codec::codes::LZW => "lzw",
        codec::codes::JPEG => "jpeg",
        codec::codes::DEFLATE | codec::codes::ADOBE_DEFLATE => "deflate",
        _ => "unknown",
    }
}

/// NewSubfileType bits.
const SUBFILE_REDUCED: u64 = 1;
const SUBFILE_MASK: u64 = 4;

fn parse_structure<R: Read + Seek>(reader: &mut R) -> Result<(Vec<Layout>, GeoMeta)> {
    let header = ifd::read_header(reader)?;
    let order = header.order;
    let main_ifd = ifd::read_ifd(reader, &header, header.first_ifd)?;
    let main = parse_layout(reader, order, &main_ifd)?;
    let geo = geokeys::read_geo_meta(reader, order, &main_ifd)?;

    let mut levels = vec![main];
    let mut next = main_ifd.next_ifd_offset;
    let mut visited = 0;
    while next != 0 && visited < MAX_IFD_CHAIN {
        visited += 1;
        let sub = ifd::read_ifd(reader, &header, next)?;
        next = sub.next_ifd_offset;

        let subfile = sub.first_u64(reader, order, tags::NEW_SUBFILE_TYPE)?.unwrap_or(0);
        if subfile & SUBFILE_REDUCED == 0 || subfile & SUBFILE_MASK != 0 {
            continue;
        }
        match parse_layout(reader, order, &sub) {
            Ok(ovr) if ovr.samples == levels[0].samples && ovr.pixel_type == levels[0].pixel_type => levels.push(ovr),
            Ok(ovr) => debug!(
                width = ovr.width,
                height = ovr.height,
                "skipping overview with a different sample layout"
            ),
            Err(e) => debug!(error = %e, "skipping unreadable overview"),
        }
    }

    Ok((levels, geo))
}

fn required<T>(tag: u16, value: Option<T>) -> Result<T> {
    value.ok_or_else(|| Error::InvalidTiff(format!("missing required tag {}", tag)))
}

fn parse_layout<R: Read + Seek>(reader: &mut R, order: Endian, ifd: &Ifd) -> Result<Layout> {
    let width = required(tags::IMAGE_WIDTH, ifd.first_u64(reader, order, tags::IMAGE_WIDTH)?)? as usize;
    let height = required(tags::IMAGE_LENGTH, ifd.first_u64(reader, order, tags::IMAGE_LENGTH)?)? as usize;
    if width == 0 || height == 0 {
        return Err(Error::InvalidDimensions { width, height });
    }

    let samples = ifd.first_u64(reader, order, tags::SAMPLES_PER_PIXEL)?.unwrap_or(1) as usize;
    let bits = ifd.first_u64(reader, order, tags::BITS_PER_SAMPLE)?.unwrap_or(1) as u16;
    let format = ifd.first_u64(reader, order, tags::SAMPLE_FORMAT)?.unwrap_or(1) as u16;
    let pixel_type = PixelType::from_tiff(bits, format)?;
    let compression = ifd.first_u64(reader, order, tags::COMPRESSION)?.unwrap_or(1) as u16;
    let predictor = ifd.first_u64(reader, order, tags::PREDICTOR)?.unwrap_or(1) as u16;
    let planar = ifd.first_u64(reader, order, tags::PLANAR_CONFIG)?.unwrap_or(1) == 2;
    let photometric = ifd.first_u64(reader, order, tags::PHOTOMETRIC)?.unwrap_or(1) as u16;

    if !matches!(
        compression,
        codec::codes::NONE | codec::codes::LZW | codec::codes::JPEG | codec::codes::DEFLATE | codec::codes::ADOBE_DEFLATE
    ) {
        return Err(Error::UnsupportedCompression(compression));
    }
    if photometric == photometric::YCBCR && compression != codec::codes::JPEG {
        return Err(Error::UnsupportedDataType("YCbCr samples outside JPEG chunks".into()));
    }
    if compression == codec::codes::JPEG && pixel_type != PixelType::Uint8 {
        return Err(Error::UnsupportedDataType(format!("JPEG chunks with {} samples", pixel_type)));
    }
    if predictor != 1 && predictor != 2 {
        return Err(Error::UnsupportedDataType(format!("predictor {}", predictor)));
    }

    let tiled = ifd.find(tags::TILE_WIDTH).is_some();
    let (chunk_width, chunk_height, offsets_tag, counts_tag) = if tiled {
        let tw = required(tags::TILE_WIDTH, ifd.first_u64(reader, order, tags::TILE_WIDTH)?)? as usize;
        let th = required(tags::TILE_LENGTH, ifd.first_u64(reader, order, tags::TILE_LENGTH)?)? as usize;
        (tw, th, tags::TILE_OFFSETS, tags::TILE_BYTE_COUNTS)
    } else {
        let rps = ifd
            .first_u64(reader, order, tags::ROWS_PER_STRIP)?
            .unwrap_or(height as u64)
            .min(height as u64) as usize;
        (width, rps, tags::STRIP_OFFSETS, tags::STRIP_BYTE_COUNTS)
    };
    if chunk_width == 0 || chunk_height == 0 {
        return Err(Error::InvalidTiff("zero chunk size".into()));
    }

    let offsets = required(offsets_tag, ifd.values_u64(reader, order, offsets_tag)?)?;
    let byte_counts = required(counts_tag, ifd.values_u64(reader, order, counts_tag)?)?;

    let chunks_across = width.div_ceil(chunk_width);
    let chunks_down = height.div_ceil(chunk_height);
    let planes = if planar { samples } else { 1 };
    let needed = chunks_across * chunks_down * planes;
    if offsets.len() < needed || byte_counts.len() < needed {
        return Err(Error::InvalidTiff(format!(
            "expected {} chunks, offset table has {}",
            needed,
            offsets.len().min(byte_counts.len())
        )));
    }

    let jpeg_tables = if compression == codec::codes::JPEG {
        ifd.raw_bytes(reader, order, tags::JPEG_TABLES)?
    } else {
        None
    };

    Ok(Layout {
        width,
        height,
        samples,
        planar,
        pixel_type,
        order,
        compression,
        predictor,
        tiled,
        chunk_width,
        chunk_height,
        chunks_across,
        chunks_down,
        offsets,
        byte_counts,
        jpeg_tables,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_clip() {
        let w = Window::new(-10, 90, 50, 50);
        let clipped = w.clip(100, 100).unwrap();
        assert_eq!(clipped, Window::new(0, 90, 40, 10));

        assert!(Window::new(100, 0, 10, 10).clip(100, 100).is_none());
        assert!(Window::new(-20, -20, 20, 20).clip(100, 100).is_none());
        assert_eq!(Window::full(8, 4).clip(8, 4), Some(Window::full(8, 4)));
    }

    #[test]
    fn test_axis_weights_downsample() {
        let w = axis_weights(4, 2);
        assert_eq!(w, vec![vec![(0, 1.0), (1, 1.0)], vec![(2, 1.0), (3, 1.0)]]);

        let w = axis_weights(3, 2);
        assert_eq!(w[0], vec![(0, 1.0), (1, 0.5)]);
        assert_eq!(w[1], vec![(1, 0.5), (2, 1.0)]);
    }

    #[test]
    fn test_axis_weights_upsample() {
        let w = axis_weights(2, 4);
        assert_eq!(w[0], vec![(0, 0.5)]);
        assert_eq!(w[1], vec![(0, 0.5)]);
        assert_eq!(w[3], vec![(1, 0.5)]);
    }

    #[test]
    fn test_open_missing_file() {
        let err = RasterHandle::open("/nonexistent/scene.tif").unwrap_err();
        assert!(matches!(err, Error::Open { .. }));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_open_not_a_tiff() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("junk.tif");
        std::fs::write(&path, b"definitely not a tiff").unwrap();
        assert!(matches!(RasterHandle::open(&path), Err(Error::Open { .. })));
    }
}
