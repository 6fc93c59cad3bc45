//! # Geoscout Algorithms
//!
//! Pure pixel algorithms used by the optimizer and the detectors. Every
//! function works on in-memory `ndarray` buffers produced by window reads.
//!
//! ## Available Algorithm Categories
//!
//! - **stretch**: 2nd/98th percentile contrast stretching
//! - **spectral**: fire index, brightness and fire mask
//! - **morphology**: binary erosion, dilation, opening, closing
//! - **edge**: Sobel gradient magnitude, edge density, centre of mass
//! - **label**: connected-component labelling with region properties
//! - **blobs**: bright compact blob detection
//! - **cluster**: single-linkage clustering of points
//! - **resample**: block-average downsampling

pub(crate) mod maybe_rayon;

pub mod blobs;
pub mod cluster;
pub mod edge;
pub mod label;
pub mod morphology;
pub mod resample;
pub mod spectral;
pub mod stretch;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::blobs::{detect_blobs, Blob, BlobDetector, BlobParams};
    pub use crate::cluster::{centroid, single_linkage, spread};
    pub use crate::edge::{center_of_mass, edge_density, edge_mask, sobel_magnitude};
    pub use crate::label::{label, Connectivity, Region};
    pub use crate::morphology::{
        closing, dilate, erode, opening, Closing, Opening, StructuringElement,
    };
    pub use crate::resample::downsample_mean;
    pub use crate::spectral::{brightness, fire_index, fire_mask, FireIndex, FireMaskParams};
    pub use crate::stretch::{band_percentiles, stretch_linear, stretch_u8, stretch_unit, PercentileRange};
    pub use geoscout_core::prelude::*;
}
