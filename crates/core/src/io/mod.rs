//! Raster reading and writing.
//!
//! [`RasterHandle`] opens a GeoTIFF and serves windowed reads; [`TiffWriter`]
//! streams tiled, multi-resolution GeoTIFFs back out. Both share the IFD,
//! codec and GeoTIFF key handling in this module.

mod cache;
pub mod codec;
mod geokeys;
mod ifd;
mod source;
mod writer;

pub use codec::Compression;
pub use source::{photometric, RasterHandle, RasterMetadata, Window, DEFAULT_CACHE_CHUNKS};
pub use writer::{write_geotiff, ImageSpec, TiffFormat, TiffWriter, WriteOptions, BIGTIFF_THRESHOLD};
