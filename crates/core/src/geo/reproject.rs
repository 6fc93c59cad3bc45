//! Pure-Rust reprojection to WGS84 (proj4rs + crs-definitions).

use proj4rs::proj::Proj;
use proj4rs::transform::transform;

use crate::crs::CRS;
use crate::error::{Error, Result};

const WGS84_PROJ: &str = "+proj=longlat +datum=WGS84 +no_defs";

/// Transforms coordinates from one source CRS into WGS84 degrees.
pub struct Reprojector {
    source: Proj,
    target: Proj,
    source_geographic: bool,
    label: String,
}

impl std::fmt::Debug for Reprojector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reprojector").field("source", &self.label).finish()
    }
}

impl Reprojector {
    /// Build a transformer from `crs` to WGS84.
    ///
    /// Fails when the CRS has no PROJ definition (e.g. WKT-only or an EPSG
    /// code missing from the bundled database) or the definition is invalid.
    pub fn to_wgs84(crs: &CRS) -> Result<Self> {
        let definition = crs.proj_definition().ok_or_else(|| {
            Error::Reprojection(format!("{} has no PROJ definition", crs.identifier()))
        })?;
        let source = Proj::from_proj_string(&definition)
            .map_err(|e| Error::Reprojection(format!("invalid projection {}: {:?}", crs.identifier(), e)))?;
        let target = Proj::from_proj_string(WGS84_PROJ)
            .map_err(|e| Error::Reprojection(format!("invalid WGS84 definition: {:?}", e)))?;

        Ok(Self {
            source,
            target,
            source_geographic: crs.is_geographic(),
            label: crs.identifier(),
        })
    }

    /// Transform one source-CRS coordinate to (longitude, latitude).
    pub fn transform(&self, x: f64, y: f64) -> Result<(f64, f64)> {
        // proj4rs works in radians for geographic coordinates
        let mut point = if self.source_geographic {
            (x.to_radians(), y.to_radians(), 0.0)
        } else {
            (x, y, 0.0)
        };
        transform(&self.source, &self.target, &mut point).map_err(|e| {
            Error::Reprojection(format!("({}, {}) from {}: {:?}", x, y, self.label, e))
        })?;

        let (lon, lat) = (point.0.to_degrees(), point.1.to_degrees());
        if !lon.is_finite() || !lat.is_finite() {
            return Err(Error::Reprojection(format!(
                "({}, {}) from {} produced a non-finite result",
                x, y, self.label
            )));
        }
        Ok((lon, lat))
    }
}
