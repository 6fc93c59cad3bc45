//! Bright compact blob detection
//!
//! Blobs are 8-connected groups of pixels above a brightness threshold,
//! kept by area only (shape is not filtered).

use ndarray::Array2;
use geoscout_core::{Algorithm, Error, Result};

use crate::label::{label, Connectivity};

/// Parameters for [`detect_blobs`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlobParams {
    /// Minimum normalized value for a pixel to belong to a blob
    pub threshold: f64,
    /// Smallest accepted blob, in `pixel_area` units
    pub min_area: f64,
    /// Largest accepted blob, in `pixel_area` units
    pub max_area: f64,
    /// Area represented by one input pixel (4 for a 2x downsampled block
    /// measured in source pixels)
    pub pixel_area: f64,
}

impl Default for BlobParams {
    fn default() -> Self {
        Self {
            threshold: 0.8,
            min_area: 10.0,
            max_area: 200.0,
            pixel_area: 1.0,
        }
    }
}

/// A detected blob in input pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Blob {
    /// Centroid column
    pub x: f64,
    /// Centroid row
    pub y: f64,
    /// Area in `pixel_area` units
    pub area: f64,
}

/// Find bright blobs whose area lies within `[min_area, max_area]`.
pub fn detect_blobs(data: &Array2<f64>, params: &BlobParams) -> Vec<Blob> {
    let mask = data.mapv(|v| v >= params.threshold);
    let (_, regions) = label(&mask, Connectivity::Eight);
    regions
        .into_iter()
        .filter_map(|region| {
            let area = region.area as f64 * params.pixel_area;
            (area >= params.min_area && area <= params.max_area).then_some(Blob {
                x: region.centroid.1,
                y: region.centroid.0,
                area,
            })
        })
        .collect()
}

/// Blob detection as an [`Algorithm`].
#[derive(Debug, Clone, Default)]
pub struct BlobDetector;

impl Algorithm for BlobDetector {
    type Input = Array2<f64>;
    type Output = Vec<Blob>;
    type Params = BlobParams;
    type Error = Error;

    fn name(&self) -> &'static str {
        "BlobDetector"
    }

    fn description(&self) -> &'static str {
        "Bright compact blobs filtered by area"
    }

    fn execute(&self, input: Self::Input, params: Self::Params) -> Result<Self::Output> {
        if params.min_area > params.max_area {
            return Err(Error::InvalidParameter {
                name: "min_area",
                value: params.min_area.to_string(),
                reason: format!("must not exceed max_area ({})", params.max_area),
            });
        }
        Ok(detect_blobs(&input, &params))
    }
}
