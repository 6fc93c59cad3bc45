//! # Geoscout COG
//!
//! Builds tiled, multi-resolution GeoTIFFs and downsampled previews from a
//! [`geoscout_core::RasterHandle`] without ever holding a full band in
//! memory.
//!
//! - [`build_tiled_output`]: internally tiled output with area-averaged
//!   overviews, written atomically
//! - [`build_preview`]: percentile-stretched RGB thumbnail or map overlay

pub mod error;
pub mod optimize;
pub mod preview;

pub use error::{CogError, Result};
pub use optimize::{build_tiled_output, effective_compression, OptimizeOptions, OverviewLevel, TiledOutput};
pub use preview::{build_preview, BandMapping, PreviewImage, PreviewOptions};
