//! Geographic coordinates and pixel-to-WGS84 mapping.

mod mapper;
mod reproject;

pub use mapper::{CoordinateMapper, GeographicExtent, EDGE_DENSIFY_POINTS};
pub use reproject::Reprojector;

use serde::{Deserialize, Serialize};

/// A WGS84 longitude/latitude pair in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub longitude: f64,
    pub latitude: f64,
}

impl GeoPoint {
    pub fn new(longitude: f64, latitude: f64) -> Self {
        Self { longitude, latitude }
    }

    /// Within [-180, 180] x [-90, 90] and finite.
    pub fn in_range(&self) -> bool {
        self.longitude.is_finite()
            && self.latitude.is_finite()
            && (-180.0..=180.0).contains(&self.longitude)
            && (-90.0..=90.0).contains(&self.latitude)
    }
}

/// Result of mapping a pixel position to the ground.
///
/// `degraded` is set when the point could not be expressed in WGS84 and the
/// raw affine result was returned instead: the raster had no
/// georeferencing, no usable CRS, or reprojection failed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Geolocated {
    pub point: GeoPoint,
    pub degraded: bool,
}

/// Axis-aligned envelope in longitude/latitude degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoBounds {
    pub west: f64,
    pub south: f64,
    pub east: f64,
    pub north: f64,
}

impl GeoBounds {
    pub fn new(west: f64, south: f64, east: f64, north: f64) -> Self {
        Self {
            west,
            south,
            east,
            north,
        }
    }

    pub fn width(&self) -> f64 {
        self.east - self.west
    }

    pub fn height(&self) -> f64 {
        self.north - self.south
    }

    /// Grow each side by `fraction` of the span along its axis.
    pub fn expanded(&self, fraction: f64) -> Self {
        let dx = self.width() * fraction;
        let dy = self.height() * fraction;
        Self::new(self.west - dx, self.south - dy, self.east + dx, self.north + dy)
    }

    /// Inclusive containment test.
    pub fn contains(&self, p: &GeoPoint) -> bool {
        p.longitude >= self.west && p.longitude <= self.east && p.latitude >= self.south && p.latitude <= self.north
    }

    pub fn center(&self) -> GeoPoint {
        GeoPoint::new((self.west + self.east) / 2.0, (self.south + self.north) / 2.0)
    }

    /// Closed ring: (west,south), (east,south), (east,north), (west,north),
    /// back to (west,south).
    pub fn polygon(&self) -> Vec<GeoPoint> {
        vec![
            GeoPoint::new(self.west, self.south),
            GeoPoint::new(self.east, self.south),
            GeoPoint::new(self.east, self.north),
            GeoPoint::new(self.west, self.north),
            GeoPoint::new(self.west, self.south),
        ]
    }
}
