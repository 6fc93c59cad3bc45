//! Chunk compression codecs.
//!
//! Supports DEFLATE (via `flate2`), LZW (via `weezl`), JPEG (via `image`)
//! and uncompressed chunks, in both directions.

use std::io::{Read, Write};

use byteorder::{BigEndian, ByteOrder, LittleEndian};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::raster::{Endian, PixelType};

/// TIFF compression codes.
pub mod codes {
    pub const NONE: u16 = 1;
    pub const LZW: u16 = 5;
    pub const JPEG: u16 = 7;
    pub const DEFLATE: u16 = 8;
    pub const ADOBE_DEFLATE: u16 = 32946;
}

/// Compression applied to written chunks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    None,
    Lzw,
    #[default]
    Deflate,
    Jpeg,
}

impl Compression {
    pub fn tiff_code(&self) -> u16 {
        match self {
            Compression::None => codes::NONE,
            Compression::Lzw => codes::LZW,
            Compression::Deflate => codes::DEFLATE,
            Compression::Jpeg => codes::JPEG,
        }
    }

    pub fn is_lossless(&self) -> bool {
        !matches!(self, Compression::Jpeg)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Compression::None => "none",
            Compression::Lzw => "lzw",
            Compression::Deflate => "deflate",
            Compression::Jpeg => "jpeg",
        }
    }
}

impl std::str::FromStr for Compression {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "none" | "raw" => Ok(Compression::None),
            "lzw" => Ok(Compression::Lzw),
            "deflate" | "zip" | "zlib" => Ok(Compression::Deflate),
            "jpeg" | "jpg" => Ok(Compression::Jpeg),
            other => Err(Error::InvalidParameter {
                name: "compression",
                value: other.to_string(),
                reason: "expected none, lzw, deflate or jpeg".to_string(),
            }),
        }
    }
}

/// Geometry of a chunk handed to the JPEG codec.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ChunkShape {
    pub width: u32,
    pub height: u32,
    pub samples: u16,
}

/// Decompress raw chunk bytes according to the TIFF compression code.
pub(crate) fn decompress(
    data: &[u8],
    compression_code: u16,
    expected_raw_size: usize,
    shape: ChunkShape,
    jpeg_tables: Option<&[u8]>,
) -> Result<Vec<u8>> {
    match compression_code {
        codes::NONE => Ok(data.to_vec()),

        codes::DEFLATE | codes::ADOBE_DEFLATE => {
            // TIFF DEFLATE chunks use zlib framing; tolerate raw deflate too.
            let mut decoder = flate2::read::ZlibDecoder::new(data);
            let mut out = Vec::with_capacity(expected_raw_size);
            match decoder.read_to_end(&mut out) {
                Ok(_) => Ok(out),
                Err(_) => {
                    out.clear();
                    let mut decoder = flate2::read::DeflateDecoder::new(data);
                    decoder
                        .read_to_end(&mut out)
                        .map_err(|e| Error::Decompress(format!("DEFLATE: {}", e)))?;
                    Ok(out)
                }
            }
        }

        codes::LZW => {
            let mut decoder = weezl::decode::Decoder::with_tiff_size_switch(weezl::BitOrder::Msb, 8);
            decoder
                .decode(data)
                .map_err(|e| Error::Decompress(format!("LZW: {}", e)))
        }

        codes::JPEG => decode_jpeg(data, shape, jpeg_tables),

        other => Err(Error::UnsupportedCompression(other)),
    }
}

fn decode_jpeg(data: &[u8], shape: ChunkShape, jpeg_tables: Option<&[u8]>) -> Result<Vec<u8>> {
    // Abbreviated streams share quantization/Huffman tables stored once in
    // the IFD: splice them in ahead of the chunk's own segments.
    let stream: std::borrow::Cow<'_, [u8]> = match jpeg_tables {
        Some(tables) if tables.len() > 4 && data.len() > 2 => {
            let mut merged = Vec::with_capacity(tables.len() + data.len());
            merged.extend_from_slice(&tables[..tables.len() - 2]);
            merged.extend_from_slice(&data[2..]);
            merged.into()
        }
        _ => data.into(),
    };

    let img = image::load_from_memory_with_format(&stream, image::ImageFormat::Jpeg)
        .map_err(|e| Error::Decompress(format!("JPEG: {}", e)))?;

    match shape.samples {
        1 => Ok(img.to_luma8().into_raw()),
        3 => Ok(img.to_rgb8().into_raw()),
        n => Err(Error::Decompress(format!("JPEG chunks with {} samples", n))),
    }
}

/// Compress little-endian chunk bytes for writing.
pub(crate) fn compress(raw: &[u8], compression: Compression, shape: ChunkShape, quality: u8) -> Result<Vec<u8>> {
    match compression {
        Compression::None => Ok(raw.to_vec()),

        Compression::Deflate => {
            let mut encoder = flate2::write::ZlibEncoder::new(
                Vec::with_capacity(raw.len() / 2),
                flate2::Compression::default(),
            );
            encoder
                .write_all(raw)
                .map_err(|e| Error::Compress(format!("DEFLATE: {}", e)))?;
            encoder
                .finish()
                .map_err(|e| Error::Compress(format!("DEFLATE: {}", e)))
        }

        Compression::Lzw => {
            let mut encoder = weezl::encode::Encoder::with_tiff_size_switch(weezl::BitOrder::Msb, 8);
            encoder
                .encode(raw)
                .map_err(|e| Error::Compress(format!("LZW: {}", e)))
        }

        Compression::Jpeg => {
            if shape.samples != 3 {
                return Err(Error::Compress(format!(
                    "JPEG requires 3 samples per pixel, got {}",
                    shape.samples
                )));
            }
            let img = image::RgbImage::from_raw(shape.width, shape.height, raw.to_vec())
                .ok_or_else(|| Error::Compress("JPEG: chunk buffer size mismatch".into()))?;
            let mut out = Vec::new();
            let mut encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut out, quality);
            encoder
                .encode_image(&img)
                .map_err(|e| Error::Compress(format!("JPEG: {}", e)))?;
            Ok(out)
        }
    }
}

/// Reverse TIFF horizontal differencing (`Predictor = 2`) in place.
pub(crate) fn undo_horizontal_predictor(
    buf: &mut [u8],
    pixel_type: PixelType,
    order: Endian,
    row_width: usize,
    samples: usize,
) -> Result<()> {
    let size = pixel_type.size();
    if pixel_type.is_float() {
        return Err(Error::UnsupportedDataType(
            "horizontal predictor on floating-point samples".into(),
        ));
    }
    let row_bytes = row_width * samples * size;
    if row_bytes == 0 {
        return Ok(());
    }

    for row in buf.chunks_mut(row_bytes) {
        let n = row.len() / size;
        for i in samples..n {
            let (prev, cur) = ((i - samples) * size, (i - samples + 1) * size);
            let here = i * size..(i + 1) * size;
            match size {
                1 => row[i] = row[i].wrapping_add(row[i - samples]),
                2 => {
                    let p = read_u16(order, &row[prev..cur]);
                    let c = read_u16(order, &row[here.clone()]);
                    write_u16(order, &mut row[here], c.wrapping_add(p));
                }
                4 => {
                    let p = read_u32(order, &row[prev..cur]);
                    let c = read_u32(order, &row[here.clone()]);
                    write_u32(order, &mut row[here], c.wrapping_add(p));
                }
                _ => {}
            }
        }
    }
    Ok(())
}

fn read_u16(order: Endian, data: &[u8]) -> u16 {
    match order {
        Endian::Little => LittleEndian::read_u16(data),
        Endian::Big => BigEndian::read_u16(data),
    }
}

fn read_u32(order: Endian, data: &[u8]) -> u32 {
    match order {
        Endian::Little => LittleEndian::read_u32(data),
        Endian::Big => BigEndian::read_u32(data),
    }
}

fn write_u16(order: Endian, data: &mut [u8], v: u16) {
    match order {
        Endian::Little => LittleEndian::write_u16(data, v),
        Endian::Big => BigEndian::write_u16(data, v),
    }
}

fn write_u32(order: Endian, data: &mut [u8], v: u32) {
    match order {
        Endian::Little => LittleEndian::write_u32(data, v),
        Endian::Big => BigEndian::write_u32(data, v),
    }
}
