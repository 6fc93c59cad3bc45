//! Tiled GeoTIFF writer.
//!
//! Images are streamed tile by tile: compressed tiles are appended to the
//! file as they arrive and every image directory is written once at the end,
//! so callers never hold more than one tile in memory. Output is classic TIFF
//! or, for files that may pass 4 GiB, BigTIFF. Output goes to
//! `<path>.partial` and is renamed into place by [`TiffWriter::finish`]; a
//! writer dropped before finishing deletes the partial file.

use std::fs::{self, File};
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use byteorder::{LittleEndian, WriteBytesExt};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::crs::CRS;
use crate::error::{Error, Result};
use crate::io::codec::{self, ChunkShape, Compression};
use crate::io::geokeys::{self, ModelPlacement};
use crate::io::ifd::{field_type, tags};
use crate::io::source::photometric;
use crate::raster::{GeoTransform, PixelType};

/// Layout and encoding of one image written by [`TiffWriter`].
#[derive(Debug, Clone)]
pub struct ImageSpec {
    pub width: usize,
    pub height: usize,
    pub bands: usize,
    pub pixel_type: PixelType,
    pub tile_size: usize,
    pub compression: Compression,
    /// JPEG quality (1-100); ignored by lossless codecs.
    pub quality: u8,
    pub transform: GeoTransform,
    pub crs: Option<CRS>,
    pub nodata: Option<f64>,
    /// Mark the image as a reduced-resolution overview.
    pub overview: bool,
}

impl ImageSpec {
    pub fn tiles_across(&self) -> usize {
        self.width.div_ceil(self.tile_size)
    }

    pub fn tiles_down(&self) -> usize {
        self.height.div_ceil(self.tile_size)
    }

    pub fn tile_count(&self) -> usize {
        self.tiles_across() * self.tiles_down()
    }

    fn photometric(&self) -> u16 {
        if self.compression == Compression::Jpeg {
            photometric::YCBCR
        } else if self.bands >= 3 {
            photometric::RGB
        } else {
            photometric::MIN_IS_BLACK
        }
    }

    fn extra_samples(&self) -> usize {
        match self.photometric() {
            photometric::RGB | photometric::YCBCR => self.bands.saturating_sub(3),
            _ => self.bands.saturating_sub(1),
        }
    }

    fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 || self.bands == 0 {
            return Err(Error::InvalidDimensions {
                width: self.width,
                height: self.height,
            });
        }
        if self.tile_size == 0 || self.tile_size % 16 != 0 {
            return Err(Error::InvalidParameter {
                name: "tile_size",
                value: self.tile_size.to_string(),
                reason: "must be a positive multiple of 16".into(),
            });
        }
        if self.compression == Compression::Jpeg && (self.bands != 3 || self.pixel_type != PixelType::Uint8) {
            return Err(Error::InvalidParameter {
                name: "compression",
                value: "jpeg".into(),
                reason: format!("requires 3 uint8 bands, got {} {} bands", self.bands, self.pixel_type),
            });
        }
        if !(1..=100).contains(&self.quality) {
            return Err(Error::InvalidParameter {
                name: "quality",
                value: self.quality.to_string(),
                reason: "must be within 1..=100".into(),
            });
        }
        Ok(())
    }
}

/// Container flavour of a written file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TiffFormat {
    /// 32-bit offsets, readable everywhere
    #[default]
    Classic,
    /// 64-bit offsets
    Big,
}

/// Uncompressed payload above which [`TiffFormat::for_payload`] picks
/// BigTIFF. Kept below 4 GiB so directories and incompressible tiles fit.
pub const BIGTIFF_THRESHOLD: u64 = 4_000_000_000;

impl TiffFormat {
    /// BigTIFF when `uncompressed_bytes` of pixel data could overflow
    /// classic offsets, classic otherwise.
    pub fn for_payload(uncompressed_bytes: u64) -> Self {
        if uncompressed_bytes > BIGTIFF_THRESHOLD {
            TiffFormat::Big
        } else {
            TiffFormat::Classic
        }
    }

    fn is_big(self) -> bool {
        self == TiffFormat::Big
    }

    /// Bytes in a value field; longer values are stored out of line.
    fn inline_len(self) -> usize {
        if self.is_big() {
            8
        } else {
            4
        }
    }

    fn entry_len(self) -> u64 {
        if self.is_big() {
            20
        } else {
            12
        }
    }

    /// Width of offsets, including the next-directory link.
    fn offset_len(self) -> u64 {
        if self.is_big() {
            8
        } else {
            4
        }
    }

    /// Directory entry-count field plus next-directory link.
    fn ifd_overhead(self) -> u64 {
        if self.is_big() {
            8 + 8
        } else {
            2 + 4
        }
    }
}

struct ImageEntry {
    spec: ImageSpec,
    offsets: Vec<u64>,
    byte_counts: Vec<u64>,
}

/// Streaming writer for little-endian tiled GeoTIFFs with overviews.
pub struct TiffWriter {
    out: BufWriter<File>,
    partial: PathBuf,
    target: PathBuf,
    format: TiffFormat,
    pos: u64,
    images: Vec<ImageEntry>,
    finished: bool,
}

impl TiffWriter {
    /// Start writing a classic TIFF at `path` (through `<path>.partial`).
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        Self::create_with(path, TiffFormat::Classic)
    }

    /// Start writing `path` in the given container format.
    pub fn create_with(path: impl AsRef<Path>, format: TiffFormat) -> Result<Self> {
        let target = path.as_ref().to_path_buf();
        let mut partial = target.clone().into_os_string();
        partial.push(".partial");
        let partial = PathBuf::from(partial);

        let mut out = BufWriter::new(File::create(&partial)?);
        out.write_all(b"II")?;
        let pos = match format {
            TiffFormat::Classic => {
                out.write_u16::<LittleEndian>(42)?;
                out.write_u32::<LittleEndian>(0)?;
                8
            }
            TiffFormat::Big => {
                out.write_u16::<LittleEndian>(43)?;
                out.write_u16::<LittleEndian>(8)?;
                out.write_u16::<LittleEndian>(0)?;
                out.write_u64::<LittleEndian>(0)?;
                16
            }
        };

        Ok(Self {
            out,
            partial,
            target,
            format,
            pos,
            images: Vec::new(),
            finished: false,
        })
    }

    pub fn format(&self) -> TiffFormat {
        self.format
    }

    /// Declare the next image; returns its index for [`TiffWriter::write_tile`].
    pub fn add_image(&mut self, spec: ImageSpec) -> Result<usize> {
        spec.validate()?;
        let n = spec.tile_count();
        self.images.push(ImageEntry {
            spec,
            offsets: vec![0; n],
            byte_counts: vec![0; n],
        });
        Ok(self.images.len() - 1)
    }

    pub fn spec(&self, image: usize) -> Option<&ImageSpec> {
        self.images.get(image).map(|e| &e.spec)
    }

    /// Encode and append one tile.
    ///
    /// `samples` is pixel-interleaved, `tile_size * tile_size * bands` long,
    /// row-major. NaN samples are written as the image's nodata value (or 0).
    pub fn write_tile(&mut self, image: usize, tile_col: usize, tile_row: usize, samples: &[f64]) -> Result<()> {
        let entry = self
            .images
            .get(image)
            .ok_or_else(|| Error::Other(format!("image {} was never added", image)))?;
        let spec = &entry.spec;
        if tile_col >= spec.tiles_across() || tile_row >= spec.tiles_down() {
            return Err(Error::IndexOutOfBounds {
                row: tile_row,
                col: tile_col,
                rows: spec.tiles_down(),
                cols: spec.tiles_across(),
            });
        }
        let expected = spec.tile_size * spec.tile_size * spec.bands;
        if samples.len() != expected {
            return Err(Error::SizeMismatch {
                er: expected,
                ec: 1,
                ar: samples.len(),
                ac: 1,
            });
        }

        let fill = spec.nodata.unwrap_or(0.0);
        let mut raw = Vec::with_capacity(expected * spec.pixel_type.size());
        for &v in samples {
            spec.pixel_type
                .write_sample(if v.is_nan() { fill } else { v }, &mut raw);
        }

        let shape = ChunkShape {
            width: spec.tile_size as u32,
            height: spec.tile_size as u32,
            samples: spec.bands as u16,
        };
        let packed = codec::compress(&raw, spec.compression, shape, spec.quality)?;
        let index = tile_row * spec.tiles_across() + tile_col;

        let offset = self.append(&packed)?;
        let entry = &mut self.images[image];
        entry.offsets[index] = offset;
        entry.byte_counts[index] = packed.len() as u64;
        Ok(())
    }

    /// Write all image directories, patch the header and move the file into
    /// place. Fails if any declared tile was never written.
    pub fn finish(mut self) -> Result<PathBuf> {
        for (i, entry) in self.images.iter().enumerate() {
            if let Some(missing) = entry.byte_counts.iter().position(|&c| c == 0) {
                return Err(Error::Other(format!("image {} tile {} was never written", i, missing)));
            }
        }
        if self.images.is_empty() {
            return Err(Error::Other("no images to write".into()));
        }

        let mut ifd_offsets = Vec::with_capacity(self.images.len());
        let mut next_links = Vec::with_capacity(self.images.len());
        for i in 0..self.images.len() {
            let entries = build_entries(&self.images[i], self.format);
            self.align()?;
            let (ifd_offset, link_pos) = self.write_ifd(entries)?;
            ifd_offsets.push(ifd_offset);
            next_links.push(link_pos);
        }

        // Chain directories: main image first, then overviews.
        for (i, &link) in next_links.iter().enumerate() {
            let next = ifd_offsets.get(i + 1).copied().unwrap_or(0);
            self.out.seek(SeekFrom::Start(link))?;
            self.write_offset(next)?;
        }
        let header_link = if self.format.is_big() { 8 } else { 4 };
        self.out.seek(SeekFrom::Start(header_link))?;
        self.write_offset(ifd_offsets[0])?;
        self.out.flush()?;
        self.out.get_ref().sync_all()?;

        fs::rename(&self.partial, &self.target)?;
        self.finished = true;
        debug!(
            path = %self.target.display(),
            images = self.images.len(),
            bytes = self.pos,
            format = ?self.format,
            "tiff written"
        );
        Ok(self.target.clone())
    }

    fn append(&mut self, bytes: &[u8]) -> Result<u64> {
        self.align()?;
        let offset = self.pos;
        self.out.write_all(bytes)?;
        self.pos += bytes.len() as u64;
        self.check_offset(self.pos)?;
        Ok(offset)
    }

    /// Classic files cannot address bytes past 4 GiB.
    fn check_offset(&self, offset: u64) -> Result<()> {
        if !self.format.is_big() && u32::try_from(offset).is_err() {
            return Err(Error::Other("output exceeds the 4 GiB classic TIFF limit; write BigTIFF".into()));
        }
        Ok(())
    }

    fn write_offset(&mut self, offset: u64) -> Result<()> {
        if self.format.is_big() {
            self.out.write_u64::<LittleEndian>(offset)?;
        } else {
            self.check_offset(offset)?;
            self.out.write_u32::<LittleEndian>(offset as u32)?;
        }
        Ok(())
    }

    /// TIFF offsets must be word aligned.
    fn align(&mut self) -> Result<()> {
        if self.pos % 2 == 1 {
            self.out.write_u8(0)?;
            self.pos += 1;
        }
        Ok(())
    }

    /// Write one IFD followed by its out-of-line values. Returns the IFD
    /// offset and the position of its next-IFD link.
    fn write_ifd(&mut self, mut entries: Vec<Entry>) -> Result<(u64, u64)> {
        entries.sort_by_key(|e| e.tag);
        let format = self.format;
        let inline_len = format.inline_len();
        let ifd_offset = self.pos;
        let ifd_len = format.ifd_overhead() + format.entry_len() * entries.len() as u64;

        let mut data_pos = ifd_offset + ifd_len;
        let mut placed = Vec::with_capacity(entries.len());
        for e in &entries {
            if e.bytes.len() > inline_len {
                self.check_offset(data_pos)?;
                placed.push(Some(data_pos));
                data_pos += e.bytes.len() as u64;
                data_pos += data_pos % 2;
            } else {
                placed.push(None);
            }
        }

        if format.is_big() {
            self.out.write_u64::<LittleEndian>(entries.len() as u64)?;
        } else {
            self.out.write_u16::<LittleEndian>(entries.len() as u16)?;
        }
        for (e, at) in entries.iter().zip(&placed) {
            self.out.write_u16::<LittleEndian>(e.tag)?;
            self.out.write_u16::<LittleEndian>(e.type_id)?;
            if format.is_big() {
                self.out.write_u64::<LittleEndian>(e.count)?;
            } else {
                self.out.write_u32::<LittleEndian>(e.count as u32)?;
            }
            match at {
                Some(offset) => self.write_offset(*offset)?,
                None => {
                    let mut inline = [0u8; 8];
                    inline[..e.bytes.len()].copy_from_slice(&e.bytes);
                    self.out.write_all(&inline[..inline_len])?;
                }
            }
        }
        let link_pos = ifd_offset + ifd_len - format.offset_len();
        self.write_offset(0)?;
        self.pos += ifd_len;

        for e in entries.iter().filter(|e| e.bytes.len() > inline_len) {
            self.out.write_all(&e.bytes)?;
            self.pos += e.bytes.len() as u64;
            self.align()?;
        }
        debug_assert_eq!(self.pos, data_pos);

        self.check_offset(ifd_offset)?;
        Ok((ifd_offset, link_pos))
    }
}

impl Drop for TiffWriter {
    fn drop(&mut self) {
        if !self.finished {
            if let Err(e) = fs::remove_file(&self.partial) {
                warn!(path = %self.partial.display(), error = %e, "could not remove partial output");
            }
        }
    }
}

struct Entry {
    tag: u16,
    type_id: u16,
    count: u64,
    bytes: Vec<u8>,
}

impl Entry {
    fn shorts(tag: u16, values: &[u16]) -> Self {
        let bytes = values.iter().flat_map(|v| v.to_le_bytes()).collect();
        Self {
            tag,
            type_id: field_type::SHORT,
            count: values.len() as u64,
            bytes,
        }
    }

    fn longs(tag: u16, values: &[u32]) -> Self {
        let bytes = values.iter().flat_map(|v| v.to_le_bytes()).collect();
        Self {
            tag,
            type_id: field_type::LONG,
            count: values.len() as u64,
            bytes,
        }
    }

    fn long8s(tag: u16, values: &[u64]) -> Self {
        let bytes = values.iter().flat_map(|v| v.to_le_bytes()).collect();
        Self {
            tag,
            type_id: field_type::LONG8,
            count: values.len() as u64,
            bytes,
        }
    }

    /// Offsets or byte counts: LONG in classic files, LONG8 in BigTIFF.
    fn offsets(tag: u16, values: &[u64], format: TiffFormat) -> Self {
        if format.is_big() {
            Self::long8s(tag, values)
        } else {
            let narrow: Vec<u32> = values.iter().map(|&v| v as u32).collect();
            Self::longs(tag, &narrow)
        }
    }

    fn doubles(tag: u16, values: &[f64]) -> Self {
        let bytes = values.iter().flat_map(|v| v.to_le_bytes()).collect();
        Self {
            tag,
            type_id: field_type::DOUBLE,
            count: values.len() as u64,
            bytes,
        }
    }

    fn ascii(tag: u16, value: &str) -> Self {
        let mut bytes = value.as_bytes().to_vec();
        bytes.push(0);
        Self {
            tag,
            type_id: field_type::ASCII,
            count: bytes.len() as u64,
            bytes,
        }
    }
}

fn build_entries(image: &ImageEntry, format: TiffFormat) -> Vec<Entry> {
    let spec = &image.spec;
    let spp = spec.bands as u16;
    let mut entries = vec![
        Entry::longs(tags::IMAGE_WIDTH, &[spec.width as u32]),
        Entry::longs(tags::IMAGE_LENGTH, &[spec.height as u32]),
        Entry::shorts(tags::BITS_PER_SAMPLE, &vec![spec.pixel_type.bits(); spec.bands]),
        Entry::shorts(tags::COMPRESSION, &[spec.compression.tiff_code()]),
        Entry::shorts(tags::PHOTOMETRIC, &[spec.photometric()]),
        Entry::shorts(tags::SAMPLES_PER_PIXEL, &[spp]),
        Entry::shorts(tags::PLANAR_CONFIG, &[1]),
        Entry::longs(tags::TILE_WIDTH, &[spec.tile_size as u32]),
        Entry::longs(tags::TILE_LENGTH, &[spec.tile_size as u32]),
        Entry::offsets(tags::TILE_OFFSETS, &image.offsets, format),
        Entry::offsets(tags::TILE_BYTE_COUNTS, &image.byte_counts, format),
        Entry::shorts(tags::SAMPLE_FORMAT, &vec![spec.pixel_type.sample_format(); spec.bands]),
    ];

    if spec.overview {
        entries.push(Entry::longs(tags::NEW_SUBFILE_TYPE, &[1]));
    }
    let extra = spec.extra_samples();
    if extra > 0 {
        entries.push(Entry::shorts(tags::EXTRA_SAMPLES, &vec![0; extra]));
    }
    if spec.compression == Compression::Jpeg {
        entries.push(Entry::shorts(tags::YCBCR_SUBSAMPLING, &[1, 1]));
    }

    match geokeys::placement(&spec.transform) {
        ModelPlacement::ScaleTiepoint { scale, tiepoint } => {
            entries.push(Entry::doubles(tags::MODEL_PIXEL_SCALE, &scale));
            entries.push(Entry::doubles(tags::MODEL_TIEPOINT, &tiepoint));
        }
        ModelPlacement::Matrix(m) => entries.push(Entry::doubles(tags::MODEL_TRANSFORMATION, &m)),
    }
    if let Some(keys) = spec.crs.as_ref().and_then(geokeys::encode_key_directory) {
        entries.push(Entry::shorts(tags::GEO_KEY_DIRECTORY, &keys));
    }
    if let Some(nd) = spec.nodata {
        entries.push(Entry::ascii(tags::GDAL_NODATA, &format_nodata(nd)));
    }

    entries
}

fn format_nodata(v: f64) -> String {
    if v.is_nan() {
        "nan".to_string()
    } else if v.fract() == 0.0 && v.abs() < 1e15 {
        format!("{}", v as i64)
    } else {
        format!("{}", v)
    }
}

/// Options for [`write_geotiff`].
#[derive(Debug, Clone)]
pub struct WriteOptions {
    pub pixel_type: PixelType,
    pub compression: Compression,
    pub tile_size: usize,
    pub quality: u8,
    pub crs: Option<CRS>,
    pub nodata: Option<f64>,
    pub format: TiffFormat,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            pixel_type: PixelType::Uint8,
            compression: Compression::Deflate,
            tile_size: 256,
            quality: 90,
            crs: None,
            nodata: None,
            format: TiffFormat::Classic,
        }
    }
}

/// Write in-memory bands as a single tiled GeoTIFF without overviews.
///
/// Convenient for small rasters; large ones should be streamed through
/// [`TiffWriter`] directly.
pub fn write_geotiff(
    path: impl AsRef<Path>,
    bands: &[Array2<f64>],
    transform: GeoTransform,
    opts: &WriteOptions,
) -> Result<PathBuf> {
    let first = bands.first().ok_or_else(|| Error::Other("no bands to write".into()))?;
    let (height, width) = first.dim();
    if let Some(bad) = bands.iter().find(|b| b.dim() != (height, width)) {
        let (ar, ac) = bad.dim();
        return Err(Error::SizeMismatch {
            er: height,
            ec: width,
            ar,
            ac,
        });
    }

    let spec = ImageSpec {
        width,
        height,
        bands: bands.len(),
        pixel_type: opts.pixel_type,
        tile_size: opts.tile_size,
        compression: opts.compression,
        quality: opts.quality,
        transform,
        crs: opts.crs.clone(),
        nodata: opts.nodata,
        overview: false,
    };

    let mut writer = TiffWriter::create_with(path, opts.format)?;
    let image = writer.add_image(spec.clone())?;
    let ts = spec.tile_size;
    let fill = opts.nodata.unwrap_or(0.0);
    let mut buf = vec![fill; ts * ts * bands.len()];

    for ty in 0..spec.tiles_down() {
        for tx in 0..spec.tiles_across() {
            buf.fill(fill);
            for r in 0..ts.min(height - ty * ts) {
                for c in 0..ts.min(width - tx * ts) {
                    for (b, band) in bands.iter().enumerate() {
                        buf[(r * ts + c) * bands.len() + b] = band[(ty * ts + r, tx * ts + c)];
                    }
                }
            }
            writer.write_tile(image, tx, ty, &buf)?;
        }
    }

    writer.finish()
}
