//! TIFF IFD (Image File Directory) parsing for local files.
//!
//! Entries are parsed eagerly; out-of-line values are fetched lazily with a
//! seek so that large offset tables are only read for the tags that need them.

use std::io::{Read, Seek, SeekFrom};

use byteorder::{BigEndian, ByteOrder, LittleEndian};

use crate::error::{Error, Result};
use crate::raster::Endian;

/// Well-known TIFF tag IDs.
#[allow(dead_code)]
pub mod tags {
    pub const NEW_SUBFILE_TYPE: u16 = 254;
    pub const IMAGE_WIDTH: u16 = 256;
    pub const IMAGE_LENGTH: u16 = 257;
    pub const BITS_PER_SAMPLE: u16 = 258;
    pub const COMPRESSION: u16 = 259;
    pub const PHOTOMETRIC: u16 = 262;
    pub const STRIP_OFFSETS: u16 = 273;
    pub const SAMPLES_PER_PIXEL: u16 = 277;
    pub const ROWS_PER_STRIP: u16 = 278;
    pub const STRIP_BYTE_COUNTS: u16 = 279;
    pub const PLANAR_CONFIG: u16 = 284;
    pub const PREDICTOR: u16 = 317;
    pub const TILE_WIDTH: u16 = 322;
    pub const TILE_LENGTH: u16 = 323;
    pub const TILE_OFFSETS: u16 = 324;
    pub const TILE_BYTE_COUNTS: u16 = 325;
    pub const EXTRA_SAMPLES: u16 = 338;
    pub const SAMPLE_FORMAT: u16 = 339;
    pub const JPEG_TABLES: u16 = 347;
    pub const YCBCR_SUBSAMPLING: u16 = 530;
    pub const MODEL_PIXEL_SCALE: u16 = 33550;
    pub const MODEL_TIEPOINT: u16 = 33922;
    pub const MODEL_TRANSFORMATION: u16 = 34264;
    pub const GEO_KEY_DIRECTORY: u16 = 34735;
    pub const GEO_DOUBLE_PARAMS: u16 = 34736;
    pub const GEO_ASCII_PARAMS: u16 = 34737;
    pub const GDAL_NODATA: u16 = 42113;
}

/// TIFF field type IDs used by the reader and writer.
#[allow(dead_code)]
pub mod field_type {
    pub const BYTE: u16 = 1;
    pub const ASCII: u16 = 2;
    pub const SHORT: u16 = 3;
    pub const LONG: u16 = 4;
    pub const RATIONAL: u16 = 5;
    pub const UNDEFINED: u16 = 7;
    pub const FLOAT: u16 = 11;
    pub const DOUBLE: u16 = 12;
    pub const LONG8: u16 = 16;
}

/// Upper bound on entries in one directory; real files carry a few dozen.
const MAX_IFD_ENTRIES: usize = 4096;

/// TIFF data type IDs and their byte sizes.
pub(crate) fn type_byte_size(type_id: u16) -> Option<usize> {
    match type_id {
        1 => Some(1),   // BYTE
        2 => Some(1),   // ASCII
        3 => Some(2),   // SHORT
        4 => Some(4),   // LONG
        5 => Some(8),   // RATIONAL
        6 => Some(1),   // SBYTE
        7 => Some(1),   // UNDEFINED
        8 => Some(2),   // SSHORT
        9 => Some(4),   // SLONG
        10 => Some(8),  // SRATIONAL
        11 => Some(4),  // FLOAT
        12 => Some(8),  // DOUBLE
        16 => Some(8),  // LONG8 (BigTIFF)
        _ => None,
    }
}

/// A raw IFD tag entry before value resolution.
#[derive(Debug, Clone)]
pub(crate) struct TagEntry {
    pub tag: u16,
    pub type_id: u16,
    pub count: u64,
    /// The value field exactly as stored (file byte order): 4 bytes in
    /// classic TIFF, 8 in BigTIFF.
    pub raw_value: [u8; 8],
    pub big: bool,
}

impl TagEntry {
    fn byte_len(&self) -> u64 {
        (type_byte_size(self.type_id).unwrap_or(1) as u64).saturating_mul(self.count)
    }

    fn is_inline(&self) -> bool {
        self.byte_len() <= if self.big { 8 } else { 4 }
    }

    fn value_offset(&self, order: Endian) -> u64 {
        if self.big {
            read_u64(order, &self.raw_value)
        } else {
            read_u32(order, &self.raw_value[..4]) as u64
        }
    }
}

/// A single parsed IFD with all tag entries and the offset to the next IFD.
#[derive(Debug, Clone)]
pub(crate) struct Ifd {
    pub entries: Vec<TagEntry>,
    pub next_ifd_offset: u64,
}

/// Byte order and offset width of a TIFF file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Header {
    pub order: Endian,
    /// BigTIFF: 8-byte offsets and counts
    pub big: bool,
    pub first_ifd: u64,
}

/// Parse the TIFF or BigTIFF header.
pub(crate) fn read_header<R: Read + Seek>(reader: &mut R) -> Result<Header> {
    let mut data = [0u8; 16];
    reader.seek(SeekFrom::Start(0))?;
    reader
        .read_exact(&mut data[..8])
        .map_err(|_| Error::InvalidTiff("header too short".into()))?;

    let order = match (data[0], data[1]) {
        (b'I', b'I') => Endian::Little,
        (b'M', b'M') => Endian::Big,
        _ => return Err(Error::InvalidTiff("invalid byte order marker".into())),
    };

    match read_u16(order, &data[2..4]) {
        42 => Ok(Header {
            order,
            big: false,
            first_ifd: read_u32(order, &data[4..8]) as u64,
        }),
        43 => {
            if read_u16(order, &data[4..6]) != 8 {
                return Err(Error::InvalidTiff("BigTIFF offsets must be 8 bytes".into()));
            }
            reader
                .read_exact(&mut data[8..16])
                .map_err(|_| Error::InvalidTiff("header too short".into()))?;
            Ok(Header {
                order,
                big: true,
                first_ifd: read_u64(order, &data[8..16]),
            })
        }
        magic => Err(Error::InvalidTiff(format!("expected magic 42 or 43, got {}", magic))),
    }
}

/// Parse one IFD located at `offset`.
pub(crate) fn read_ifd<R: Read + Seek>(reader: &mut R, header: &Header, offset: u64) -> Result<Ifd> {
    let order = header.order;
    let truncated = |_| Error::InvalidTiff(format!("IFD at {} truncated", offset));
    reader.seek(SeekFrom::Start(offset))?;

    let (entry_count, entry_len, link_len) = if header.big {
        let mut buf = [0u8; 8];
        reader.read_exact(&mut buf).map_err(truncated)?;
        (read_u64(order, &buf) as usize, 20, 8)
    } else {
        let mut buf = [0u8; 2];
        reader.read_exact(&mut buf).map_err(truncated)?;
        (read_u16(order, &buf) as usize, 12, 4)
    };
    if entry_count > MAX_IFD_ENTRIES {
        return Err(Error::InvalidTiff(format!("IFD at {} claims {} entries", offset, entry_count)));
    }

    let mut data = vec![0u8; entry_count * entry_len + link_len];
    reader.read_exact(&mut data).map_err(truncated)?;

    let mut entries = Vec::with_capacity(entry_count);
    for e in data[..entry_count * entry_len].chunks_exact(entry_len) {
        let mut raw_value = [0u8; 8];
        let count = if header.big {
            raw_value.copy_from_slice(&e[12..20]);
            read_u64(order, &e[4..12])
        } else {
            raw_value[..4].copy_from_slice(&e[8..12]);
            read_u32(order, &e[4..8]) as u64
        };
        entries.push(TagEntry {
            tag: read_u16(order, &e[0..2]),
            type_id: read_u16(order, &e[2..4]),
            count,
            raw_value,
            big: header.big,
        });
    }

    let link = &data[entry_count * entry_len..];
    let next_ifd_offset = if header.big {
        read_u64(order, link)
    } else {
        read_u32(order, link) as u64
    };

    Ok(Ifd {
        entries,
        next_ifd_offset,
    })
}

impl Ifd {
    pub fn find(&self, tag: u16) -> Option<&TagEntry> {
        self.entries.iter().find(|e| e.tag == tag)
    }

    /// Raw value bytes of a tag, fetched from the file when out of line.
    pub fn raw_bytes<R: Read + Seek>(&self, reader: &mut R, order: Endian, tag: u16) -> Result<Option<Vec<u8>>> {
        let entry = match self.find(tag) {
            Some(e) => e,
            None => return Ok(None),
        };
        let len = entry.byte_len() as usize;
        if entry.is_inline() {
            return Ok(Some(entry.raw_value[..len].to_vec()));
        }
        let offset = entry.value_offset(order);
        let mut buf = vec![0u8; len];
        reader.seek(SeekFrom::Start(offset))?;
        reader
            .read_exact(&mut buf)
            .map_err(|_| Error::InvalidTiff(format!("tag {} value truncated", tag)))?;
        Ok(Some(buf))
    }

    /// Integer values of a tag (BYTE, SHORT, LONG, LONG8).
    pub fn values_u64<R: Read + Seek>(&self, reader: &mut R, order: Endian, tag: u16) -> Result<Option<Vec<u64>>> {
        let entry = match self.find(tag) {
            Some(e) => e,
            None => return Ok(None),
        };
        let data = match self.raw_bytes(reader, order, tag)? {
            Some(d) => d,
            None => return Ok(None),
        };
        let size = type_byte_size(entry.type_id).unwrap_or(1);
        let values = data
            .chunks_exact(size)
            .filter_map(|chunk| match entry.type_id {
                1 | 7 => Some(chunk[0] as u64),
                3 => Some(read_u16(order, chunk) as u64),
                4 => Some(read_u32(order, chunk) as u64),
                16 => Some(read_u64(order, chunk)),
                _ => None,
            })
            .collect();
        Ok(Some(values))
    }

    /// Floating-point values of a tag (FLOAT, DOUBLE).
    pub fn values_f64<R: Read + Seek>(&self, reader: &mut R, order: Endian, tag: u16) -> Result<Option<Vec<f64>>> {
        let entry = match self.find(tag) {
            Some(e) => e,
            None => return Ok(None),
        };
        let data = match self.raw_bytes(reader, order, tag)? {
            Some(d) => d,
            None => return Ok(None),
        };
        let values: Vec<f64> = match entry.type_id {
            field_type::DOUBLE => data.chunks_exact(8).map(|c| read_f64(order, c)).collect(),
            field_type::FLOAT => data.chunks_exact(4).map(|c| read_f32(order, c) as f64).collect(),
            _ => Vec::new(),
        };
        Ok(if values.is_empty() { None } else { Some(values) })
    }

    /// ASCII value of a tag, without the trailing NUL.
    pub fn ascii<R: Read + Seek>(&self, reader: &mut R, order: Endian, tag: u16) -> Result<Option<String>> {
        Ok(self.raw_bytes(reader, order, tag)?.map(|bytes| {
            let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
            String::from_utf8_lossy(&bytes[..end]).to_string()
        }))
    }

    /// First integer value of a tag.
    pub fn first_u64<R: Read + Seek>(&self, reader: &mut R, order: Endian, tag: u16) -> Result<Option<u64>> {
        Ok(self
            .values_u64(reader, order, tag)?
            .and_then(|v| v.first().copied()))
    }
}

// ---- Byte order helpers ----

pub(crate) fn read_u16(order: Endian, data: &[u8]) -> u16 {
    match order {
        Endian::Little => LittleEndian::read_u16(data),
        Endian::Big => BigEndian::read_u16(data),
    }
}

pub(crate) fn read_u32(order: Endian, data: &[u8]) -> u32 {
    match order {
        Endian::Little => LittleEndian::read_u32(data),
        Endian::Big => BigEndian::read_u32(data),
    }
}

pub(crate) fn read_u64(order: Endian, data: &[u8]) -> u64 {
    match order {
        Endian::Little => LittleEndian::read_u64(data),
        Endian::Big => BigEndian::read_u64(data),
    }
}

fn read_f32(order: Endian, data: &[u8]) -> f32 {
    match order {
        Endian::Little => LittleEndian::read_f32(data),
        Endian::Big => BigEndian::read_f32(data),
    }
}

fn read_f64(order: Endian, data: &[u8]) -> f64 {
    match order {
        Endian::Little => LittleEndian::read_f64(data),
        Endian::Big => BigEndian::read_f64(data),
    }
}
