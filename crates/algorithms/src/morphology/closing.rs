//! Binary closing (dilation followed by erosion)
//!
//! Fills gaps and holes smaller than the structuring element.

use ndarray::Array2;
use geoscout_core::{Algorithm, Error, Result};

use super::dilate::dilate;
use super::element::StructuringElement;
use super::erode::erode;

/// Parameters for binary closing
#[derive(Debug, Clone, Default)]
pub struct ClosingParams {
    /// Structuring element shape
    pub element: StructuringElement,
}

/// Closing algorithm
#[derive(Debug, Clone, Default)]
pub struct Closing;

impl Algorithm for Closing {
    type Input = Array2<bool>;
    type Output = Array2<bool>;
    type Params = ClosingParams;
    type Error = Error;

    fn name(&self) -> &'static str {
        "Closing"
    }

    fn description(&self) -> &'static str {
        "Binary closing (dilation then erosion) to fill small gaps"
    }

    fn execute(&self, input: Self::Input, params: Self::Params) -> Result<Self::Output> {
        closing(&input, &params.element)
    }
}

/// Perform binary closing on a mask
pub fn closing(mask: &Array2<bool>, element: &StructuringElement) -> Result<Array2<bool>> {
    let dilated = dilate(mask, element)?;
    erode(&dilated, element)
}
