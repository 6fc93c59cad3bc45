//! Raster data structures

mod element;
mod geotransform;
mod grid;

pub use element::{sample_format, Endian, PixelType, RasterElement};
pub use geotransform::GeoTransform;
pub use grid::Raster;
