//! Pixel to WGS84 coordinate mapping with footprint validation.

use std::sync::OnceLock;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::crs::CRS;
use crate::error::{Error, Result};
use crate::geo::{GeoBounds, GeoPoint, Geolocated, Reprojector};
use crate::io::RasterHandle;
use crate::raster::GeoTransform;

/// Points sampled along each footprint edge before reprojection.
pub const EDGE_DENSIFY_POINTS: usize = 21;

/// Fraction of the footprint span added on each side before validation.
const VALIDATION_MARGIN: f64 = 0.1;

/// WGS84 footprint of a raster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeographicExtent {
    pub bounds: GeoBounds,
    pub center: GeoPoint,
    /// Closed 5-vertex ring of the envelope.
    pub polygon: Vec<GeoPoint>,
}

#[derive(Debug)]
enum Projection {
    /// Source coordinates already are WGS84 degrees.
    Identity,
    Reproject(Reprojector),
    /// No usable CRS: raw affine output, every point degraded.
    Unavailable,
}

/// Converts pixel positions of one raster into WGS84 coordinates.
///
/// The geographic extent is computed on first use and cached for the
/// lifetime of the mapper.
#[derive(Debug)]
pub struct CoordinateMapper {
    transform: GeoTransform,
    width: usize,
    height: usize,
    georeferenced: bool,
    projection: Projection,
    extent: OnceLock<GeographicExtent>,
}

impl CoordinateMapper {
    /// Mapper for an open raster.
    pub fn new(handle: &RasterHandle) -> Self {
        Self::from_parts(
            *handle.transform(),
            handle.crs().cloned(),
            handle.width(),
            handle.height(),
            handle.is_georeferenced(),
        )
    }

    pub fn from_parts(
        transform: GeoTransform,
        crs: Option<CRS>,
        width: usize,
        height: usize,
        georeferenced: bool,
    ) -> Self {
        let projection = match &crs {
            None => {
                warn!("raster has no CRS; locations use raw transform coordinates");
                Projection::Unavailable
            }
            Some(c) if c.is_wgs84() => Projection::Identity,
            Some(c) => match Reprojector::to_wgs84(c) {
                Ok(r) => Projection::Reproject(r),
                Err(e) => {
                    warn!(crs = %c, error = %e, "cannot reproject to WGS84; locations use raw transform coordinates");
                    Projection::Unavailable
                }
            },
        };
        if !georeferenced {
            warn!("raster has no georeferencing; using the identity transform");
        }

        Self {
            transform,
            width,
            height,
            georeferenced,
            projection,
            extent: OnceLock::new(),
        }
    }

    /// Whether every point from this mapper is degraded.
    pub fn is_degraded(&self) -> bool {
        !self.georeferenced || matches!(self.projection, Projection::Unavailable)
    }

    /// Map the centre of pixel `(x, y)` (column, row; fractional allowed).
    ///
    /// Never fails: when reprojection is impossible the raw affine result is
    /// returned with `degraded` set.
    pub fn pixel_to_geo(&self, x: f64, y: f64) -> Geolocated {
        let (mx, my) = self.transform.apply(x + 0.5, y + 0.5);
        let (point, reprojected) = self.project(mx, my);
        Geolocated {
            point,
            degraded: !reprojected || !self.georeferenced,
        }
    }

    fn project(&self, x: f64, y: f64) -> (GeoPoint, bool) {
        match &self.projection {
            Projection::Identity => (GeoPoint::new(x, y), true),
            Projection::Unavailable => (GeoPoint::new(x, y), false),
            Projection::Reproject(r) => match r.transform(x, y) {
                Ok((lon, lat)) => (GeoPoint::new(lon, lat), true),
                Err(e) => {
                    warn!(x, y, error = %e, "reprojection failed; using raw transform coordinates");
                    (GeoPoint::new(x, y), false)
                }
            },
        }
    }

    /// WGS84 footprint of the raster, densified along each edge.
    pub fn geographic_extent(&self) -> &GeographicExtent {
        self.extent.get_or_init(|| {
            let bounds = self.compute_bounds();
            debug!(
                west = bounds.west,
                south = bounds.south,
                east = bounds.east,
                north = bounds.north,
                "geographic bounds"
            );
            GeographicExtent {
                bounds,
                center: bounds.center(),
                polygon: bounds.polygon(),
            }
        })
    }

    pub fn geographic_bounds(&self) -> GeoBounds {
        self.geographic_extent().bounds
    }

    fn compute_bounds(&self) -> GeoBounds {
        let (w, h) = (self.width as f64, self.height as f64);
        let n = EDGE_DENSIFY_POINTS - 1;
        let mut bounds = GeoBounds::new(f64::INFINITY, f64::INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY);

        for i in 0..=n {
            let t = i as f64 / n as f64;
            for (col, row) in [(t * w, 0.0), (t * w, h), (0.0, t * h), (w, t * h)] {
                let (mx, my) = self.transform.apply(col, row);
                let (p, _) = self.project(mx, my);
                if p.longitude.is_finite() && p.latitude.is_finite() {
                    bounds.west = bounds.west.min(p.longitude);
                    bounds.east = bounds.east.max(p.longitude);
                    bounds.south = bounds.south.min(p.latitude);
                    bounds.north = bounds.north.max(p.latitude);
                }
            }
        }
        bounds
    }

    /// Reject points outside valid WGS84 ranges or outside the footprint
    /// expanded by 10% of its span on each side.
    pub fn check(&self, point: &GeoPoint) -> Result<()> {
        if !point.in_range() {
            return Err(Error::Validation(format!(
                "({:.6}, {:.6}) is outside WGS84 coordinate ranges",
                point.longitude, point.latitude
            )));
        }
        let allowed = self.geographic_bounds().expanded(VALIDATION_MARGIN);
        if !allowed.contains(point) {
            return Err(Error::Validation(format!(
                "({:.6}, {:.6}) is outside raster bounds [{:.6}, {:.6}, {:.6}, {:.6}]",
                point.longitude, point.latitude, allowed.west, allowed.south, allowed.east, allowed.north
            )));
        }
        Ok(())
    }

    pub fn validate(&self, point: &GeoPoint) -> bool {
        self.check(point).is_ok()
    }
}
