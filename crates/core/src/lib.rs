//! # Geoscout Core
//!
//! Raster access and georeferencing shared by every geoscout crate:
//! - `RasterHandle`: windowed, bounded-memory access to tiled or striped GeoTIFFs
//! - `TiffWriter`: tiled multi-resolution GeoTIFF writer
//! - `Raster<T>`: georeferenced 2D pixel buffer returned by window reads
//! - `GeoTransform` and `CRS`: georeferencing metadata
//! - `CoordinateMapper`: pixel to WGS84 conversion with bounds validation

pub mod crs;
pub mod error;
pub mod geo;
pub mod io;
pub mod raster;

pub use crs::CRS;
pub use error::{Error, Result};
pub use geo::{CoordinateMapper, GeoBounds, GeoPoint, Geolocated};
pub use io::{Compression, RasterHandle, RasterMetadata, TiffWriter, Window};
pub use raster::{GeoTransform, PixelType, Raster, RasterElement};

pub mod prelude {
    pub use crate::crs::CRS;
    pub use crate::error::{Error, Result};
    pub use crate::geo::{CoordinateMapper, GeoPoint};
    pub use crate::io::{RasterHandle, Window};
    pub use crate::raster::{GeoTransform, Raster, RasterElement};
    pub use crate::Algorithm;
}

/// A named pixel operation with typed parameters.
///
/// Implemented by the algorithms crate so that steps can be listed and run
/// uniformly; plain functions remain the primary entry points.
pub trait Algorithm {
    type Input;
    type Output;
    type Params: Default;
    type Error: std::error::Error;

    fn name(&self) -> &'static str;

    fn description(&self) -> &'static str;

    fn execute(&self, input: Self::Input, params: Self::Params) -> std::result::Result<Self::Output, Self::Error>;

    fn execute_default(&self, input: Self::Input) -> std::result::Result<Self::Output, Self::Error> {
        self.execute(input, Self::Params::default())
    }
}
