//! Pixel sample types

use crate::error::{Error, Result};
use byteorder::{BigEndian, ByteOrder, LittleEndian};
use num_traits::{NumCast, Zero};
use serde::{Deserialize, Serialize};
use std::fmt::{self, Debug};

/// Byte order of an encoded sample stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endian {
    Little,
    Big,
}

/// TIFF sample format codes.
pub mod sample_format {
    pub const UNSIGNED_INT: u16 = 1;
    pub const SIGNED_INT: u16 = 2;
    pub const FLOAT: u16 = 3;
}

/// On-disk sample type of a raster band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PixelType {
    Uint8,
    Int8,
    Uint16,
    Int16,
    Uint32,
    Int32,
    Float32,
    Float64,
}

impl PixelType {
    /// Resolve a TIFF `BitsPerSample` / `SampleFormat` pair.
    pub fn from_tiff(bits_per_sample: u16, format: u16) -> Result<Self> {
        use sample_format::*;
        match (bits_per_sample, format) {
            (8, UNSIGNED_INT) => Ok(PixelType::Uint8),
            (8, SIGNED_INT) => Ok(PixelType::Int8),
            (16, UNSIGNED_INT) => Ok(PixelType::Uint16),
            (16, SIGNED_INT) => Ok(PixelType::Int16),
            (32, UNSIGNED_INT) => Ok(PixelType::Uint32),
            (32, SIGNED_INT) => Ok(PixelType::Int32),
            (32, FLOAT) => Ok(PixelType::Float32),
            (64, FLOAT) => Ok(PixelType::Float64),
            (bps, sf) => Err(Error::UnsupportedDataType(format!(
                "bits_per_sample={}, sample_format={}",
                bps, sf
            ))),
        }
    }

    pub fn bits(&self) -> u16 {
        (self.size() * 8) as u16
    }

    /// Bytes per sample
    pub fn size(&self) -> usize {
        match self {
            PixelType::Uint8 | PixelType::Int8 => 1,
            PixelType::Uint16 | PixelType::Int16 => 2,
            PixelType::Uint32 | PixelType::Int32 | PixelType::Float32 => 4,
            PixelType::Float64 => 8,
        }
    }

    pub fn sample_format(&self) -> u16 {
        match self {
            PixelType::Uint8 | PixelType::Uint16 | PixelType::Uint32 => sample_format::UNSIGNED_INT,
            PixelType::Int8 | PixelType::Int16 | PixelType::Int32 => sample_format::SIGNED_INT,
            PixelType::Float32 | PixelType::Float64 => sample_format::FLOAT,
        }
    }

    pub fn is_float(&self) -> bool {
        matches!(self, PixelType::Float32 | PixelType::Float64)
    }

    /// Name in the conventional dtype vocabulary (`uint8`, `float32`, ...).
    pub fn name(&self) -> &'static str {
        match self {
            PixelType::Uint8 => "uint8",
            PixelType::Int8 => "int8",
            PixelType::Uint16 => "uint16",
            PixelType::Int16 => "int16",
            PixelType::Uint32 => "uint32",
            PixelType::Int32 => "int32",
            PixelType::Float32 => "float32",
            PixelType::Float64 => "float64",
        }
    }

    /// Decode the sample starting at `data[0]`.
    pub fn read_sample(&self, order: Endian, data: &[u8]) -> f64 {
        match (self, order) {
            (PixelType::Uint8, _) => data[0] as f64,
            (PixelType::Int8, _) => data[0] as i8 as f64,
            (PixelType::Uint16, Endian::Little) => LittleEndian::read_u16(data) as f64,
            (PixelType::Uint16, Endian::Big) => BigEndian::read_u16(data) as f64,
            (PixelType::Int16, Endian::Little) => LittleEndian::read_i16(data) as f64,
            (PixelType::Int16, Endian::Big) => BigEndian::read_i16(data) as f64,
            (PixelType::Uint32, Endian::Little) => LittleEndian::read_u32(data) as f64,
            (PixelType::Uint32, Endian::Big) => BigEndian::read_u32(data) as f64,
            (PixelType::Int32, Endian::Little) => LittleEndian::read_i32(data) as f64,
            (PixelType::Int32, Endian::Big) => BigEndian::read_i32(data) as f64,
            (PixelType::Float32, Endian::Little) => LittleEndian::read_f32(data) as f64,
            (PixelType::Float32, Endian::Big) => BigEndian::read_f32(data) as f64,
            (PixelType::Float64, Endian::Little) => LittleEndian::read_f64(data),
            (PixelType::Float64, Endian::Big) => BigEndian::read_f64(data),
        }
    }

    /// Append `value` as a little-endian sample, rounding and saturating
    /// for integer types.
    pub fn write_sample(&self, value: f64, out: &mut Vec<u8>) {
        fn int<T: NumCast>(v: f64, lo: f64, hi: f64) -> Option<T> {
            let v = if v.is_nan() { 0.0 } else { v.round().clamp(lo, hi) };
            NumCast::from(v)
        }
        match self {
            PixelType::Uint8 => out.push(int::<u8>(value, 0.0, u8::MAX as f64).unwrap_or(0)),
            PixelType::Int8 => out.push(int::<i8>(value, i8::MIN as f64, i8::MAX as f64).unwrap_or(0) as u8),
            PixelType::Uint16 => out.extend_from_slice(
                &int::<u16>(value, 0.0, u16::MAX as f64).unwrap_or(0).to_le_bytes(),
            ),
            PixelType::Int16 => out.extend_from_slice(
                &int::<i16>(value, i16::MIN as f64, i16::MAX as f64).unwrap_or(0).to_le_bytes(),
            ),
            PixelType::Uint32 => out.extend_from_slice(
                &int::<u32>(value, 0.0, u32::MAX as f64).unwrap_or(0).to_le_bytes(),
            ),
            PixelType::Int32 => out.extend_from_slice(
                &int::<i32>(value, i32::MIN as f64, i32::MAX as f64).unwrap_or(0).to_le_bytes(),
            ),
            PixelType::Float32 => out.extend_from_slice(&(value as f32).to_le_bytes()),
            PixelType::Float64 => out.extend_from_slice(&value.to_le_bytes()),
        }
    }
}

impl fmt::Display for PixelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Trait for types that can be stored in a raster cell.
pub trait RasterElement:
    Copy + Clone + Debug + PartialOrd + PartialEq + NumCast + Zero + Send + Sync + 'static
{
    /// Check if this value represents no-data
    fn is_nodata(&self, nodata: Option<Self>) -> bool;

    /// Convert self to f64
    fn to_f64(self) -> Option<f64> {
        NumCast::from(self)
    }
}

macro_rules! impl_raster_element_int {
    ($t:ty) => {
        impl RasterElement for $t {
            fn is_nodata(&self, nodata: Option<Self>) -> bool {
                nodata.map_or(false, |nd| *self == nd)
            }
        }
    };
}

macro_rules! impl_raster_element_float {
    ($t:ty) => {
        impl RasterElement for $t {
            fn is_nodata(&self, nodata: Option<Self>) -> bool {
                if self.is_nan() {
                    return true;
                }
                match nodata {
                    Some(nd) if !nd.is_nan() => (self - nd).abs() < <$t>::EPSILON * 100.0,
                    _ => false,
                }
            }
        }
    };
}

impl_raster_element_int!(u8);
impl_raster_element_int!(u16);
impl_raster_element_int!(i16);
impl_raster_element_int!(u32);
impl_raster_element_int!(i32);
impl_raster_element_float!(f32);
impl_raster_element_float!(f64);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pixel_type_from_tiff() {
        assert_eq!(PixelType::from_tiff(8, 1).unwrap(), PixelType::Uint8);
        assert_eq!(PixelType::from_tiff(32, 3).unwrap(), PixelType::Float32);
        assert!(PixelType::from_tiff(12, 1).is_err());
    }

    #[test]
    fn test_write_sample_saturates() {
        let mut buf = Vec::new();
        PixelType::Uint8.write_sample(300.0, &mut buf);
        PixelType::Uint8.write_sample(-4.0, &mut buf);
        PixelType::Uint8.write_sample(127.6, &mut buf);
        assert_eq!(buf, vec![255, 0, 128]);
    }

    #[test]
    fn test_read_sample_big_endian() {
        let data = 513u16.to_be_bytes();
        let v = PixelType::Uint16.read_sample(Endian::Big, &data);
        assert_eq!(v, 513.0);
    }

    #[test]
    fn test_float_nodata_nan() {
        assert!(f64::NAN.is_nodata(None));
        assert!((-9999.0f64).is_nodata(Some(-9999.0)));
        assert!(!(1.0f64).is_nodata(Some(f64::NAN)));
    }
}
