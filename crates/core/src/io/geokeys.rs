//! GeoTIFF georeferencing tags.
//!
//! Reads tags 33550 (ModelPixelScale), 33922 (ModelTiepoint),
//! 34264 (ModelTransformation), 34735 (GeoKeyDirectory) and
//! 42113 (GDAL_NODATA) into a `GeoTransform`, optional `CRS` and optional
//! nodata value, and produces the same tags for writing.

use std::io::{Read, Seek};

use crate::crs::CRS;
use crate::error::Result;
use crate::io::ifd::{tags, Ifd};
use crate::raster::{Endian, GeoTransform};

const GT_MODEL_TYPE: u16 = 1024;
const GT_RASTER_TYPE: u16 = 1025;
const GEOGRAPHIC_TYPE: u16 = 2048;
const PROJECTED_CS_TYPE: u16 = 3072;

const MODEL_TYPE_PROJECTED: u16 = 1;
const MODEL_TYPE_GEOGRAPHIC: u16 = 2;
const RASTER_PIXEL_IS_AREA: u16 = 1;

/// GeoTIFF metadata extracted from an IFD.
#[derive(Debug, Clone)]
pub(crate) struct GeoMeta {
    pub transform: GeoTransform,
    /// False when neither a tiepoint/scale pair nor a transformation
    /// matrix was present and the identity transform was assumed.
    pub georeferenced: bool,
    pub crs: Option<CRS>,
    pub nodata: Option<f64>,
}

/// Extract GeoTIFF metadata from `ifd`.
pub(crate) fn read_geo_meta<R: Read + Seek>(reader: &mut R, order: Endian, ifd: &Ifd) -> Result<GeoMeta> {
    let (transform, georeferenced) = match read_transform(reader, order, ifd)? {
        Some(t) => (t, true),
        None => (GeoTransform::default(), false),
    };
    let crs = read_crs(reader, order, ifd)?;
    let nodata = ifd
        .ascii(reader, order, tags::GDAL_NODATA)?
        .and_then(|s| s.trim().parse::<f64>().ok());

    Ok(GeoMeta {
        transform,
        georeferenced,
        crs,
        nodata,
    })
}

fn read_transform<R: Read + Seek>(reader: &mut R, order: Endian, ifd: &Ifd) -> Result<Option<GeoTransform>> {
    let scale = ifd.values_f64(reader, order, tags::MODEL_PIXEL_SCALE)?;
    let tiepoint = ifd.values_f64(reader, order, tags::MODEL_TIEPOINT)?;

    if let (Some(scale), Some(tiepoint)) = (&scale, &tiepoint) {
        if scale.len() >= 2 && tiepoint.len() >= 6 {
            let origin_x = tiepoint[3] - tiepoint[0] * scale[0];
            let origin_y = tiepoint[4] + tiepoint[1] * scale[1];
            return Ok(Some(GeoTransform::new(origin_x, origin_y, scale[0], -scale[1])));
        }
    }

    // 4x4 row-major matrix; only the first two rows matter in 2D.
    if let Some(t) = ifd.values_f64(reader, order, tags::MODEL_TRANSFORMATION)? {
        if t.len() >= 16 {
            return Ok(Some(GeoTransform {
                origin_x: t[3],
                origin_y: t[7],
                pixel_width: t[0],
                pixel_height: t[5],
                row_rotation: t[1],
                col_rotation: t[4],
            }));
        }
    }

    Ok(None)
}

fn read_crs<R: Read + Seek>(reader: &mut R, order: Endian, ifd: &Ifd) -> Result<Option<CRS>> {
    let keys = match ifd.values_u64(reader, order, tags::GEO_KEY_DIRECTORY)? {
        Some(k) if k.len() >= 4 => k,
        _ => return Ok(None),
    };

    // Header: [version, revision, minor, count], then 4 shorts per key:
    // [key_id, tiff_tag_location, count, value_or_index].
    let num_keys = keys[3] as usize;
    let mut geographic = None;
    for i in 0..num_keys {
        let base = 4 + i * 4;
        if base + 4 > keys.len() {
            break;
        }
        let key_id = keys[base] as u16;
        let location = keys[base + 1];
        let value = keys[base + 3] as u32;
        if location != 0 || value == 0 || value == 32767 {
            continue;
        }
        match key_id {
            PROJECTED_CS_TYPE => return Ok(Some(CRS::from_epsg(value))),
            GEOGRAPHIC_TYPE => geographic = Some(CRS::from_epsg(value)),
            _ => {}
        }
    }

    Ok(geographic)
}

/// Placement of the image in model space, in the tag form it is written as.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum ModelPlacement {
    ScaleTiepoint { scale: [f64; 3], tiepoint: [f64; 6] },
    Matrix([f64; 16]),
}

/// Choose tags for `transform`: scale plus tiepoint for north-up images,
/// a full transformation matrix otherwise.
pub(crate) fn placement(transform: &GeoTransform) -> ModelPlacement {
    if transform.row_rotation == 0.0 && transform.col_rotation == 0.0 && transform.pixel_height <= 0.0 {
        ModelPlacement::ScaleTiepoint {
            scale: [transform.pixel_width, -transform.pixel_height, 0.0],
            tiepoint: [0.0, 0.0, 0.0, transform.origin_x, transform.origin_y, 0.0],
        }
    } else {
        let t = transform;
        ModelPlacement::Matrix([
            t.pixel_width, t.row_rotation, 0.0, t.origin_x,
            t.col_rotation, t.pixel_height, 0.0, t.origin_y,
            0.0, 0.0, 0.0, 0.0,
            0.0, 0.0, 0.0, 1.0,
        ])
    }
}

/// GeoKeyDirectory contents for `crs`, or `None` when it has no EPSG code.
pub(crate) fn encode_key_directory(crs: &CRS) -> Option<Vec<u16>> {
    let code = u16::try_from(crs.epsg()?).ok()?;
    let geographic = crs.is_geographic();
    let (model_type, cs_key) = if geographic {
        (MODEL_TYPE_GEOGRAPHIC, GEOGRAPHIC_TYPE)
    } else {
        (MODEL_TYPE_PROJECTED, PROJECTED_CS_TYPE)
    };

    Some(vec![
        1, 1, 0, 3,
        GT_MODEL_TYPE, 0, 1, model_type,
        GT_RASTER_TYPE, 0, 1, RASTER_PIXEL_IS_AREA,
        cs_key, 0, 1, code,
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_directory_projected() {
        let keys = encode_key_directory(&CRS::from_epsg(32630)).unwrap();
        assert_eq!(keys[3], 3);
        assert_eq!(&keys[4..8], &[GT_MODEL_TYPE, 0, 1, MODEL_TYPE_PROJECTED]);
        assert_eq!(&keys[12..16], &[PROJECTED_CS_TYPE, 0, 1, 32630]);
    }

    #[test]
    fn test_key_directory_geographic() {
        let keys = encode_key_directory(&CRS::wgs84()).unwrap();
        assert_eq!(&keys[12..16], &[GEOGRAPHIC_TYPE, 0, 1, 4326]);
        assert!(encode_key_directory(&CRS::from_wkt("LOCAL_CS[\"x\"]")).is_none());
    }

    #[test]
    fn test_placement_north_up() {
        let gt = GeoTransform::new(100.0, 200.0, 10.0, -10.0);
        match placement(&gt) {
            ModelPlacement::ScaleTiepoint { scale, tiepoint } => {
                assert_eq!(scale, [10.0, 10.0, 0.0]);
                assert_eq!(tiepoint[3], 100.0);
                assert_eq!(tiepoint[4], 200.0);
            }
            other => panic!("expected scale/tiepoint, got {:?}", other),
        }

        let rotated = GeoTransform {
            row_rotation: 0.5,
            ..gt
        };
        assert!(matches!(placement(&rotated), ModelPlacement::Matrix(_)));
    }
}
