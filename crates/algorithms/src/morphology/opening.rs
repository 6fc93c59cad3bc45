//! Binary opening (erosion followed by dilation)
//!
//! Removes specks smaller than the structuring element while keeping the
//! shape of larger regions.

use ndarray::Array2;
use geoscout_core::{Algorithm, Error, Result};

use super::dilate::dilate;
use super::element::StructuringElement;
use super::erode::erode;

/// Parameters for binary opening
#[derive(Debug, Clone, Default)]
pub struct OpeningParams {
    /// Structuring element shape
    pub element: StructuringElement,
}

/// Opening algorithm
#[derive(Debug, Clone, Default)]
pub struct Opening;

impl Algorithm for Opening {
    type Input = Array2<bool>;
    type Output = Array2<bool>;
    type Params = OpeningParams;
    type Error = Error;

    fn name(&self) -> &'static str {
        "Opening"
    }

    fn description(&self) -> &'static str {
        "Binary opening (erosion then dilation) to remove speckle"
    }

    fn execute(&self, input: Self::Input, params: Self::Params) -> Result<Self::Output> {
        opening(&input, &params.element)
    }
}

/// Perform binary opening on a mask
pub fn opening(mask: &Array2<bool>, element: &StructuringElement) -> Result<Array2<bool>> {
    let eroded = erode(mask, element)?;
    dilate(&eroded, element)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opening_removes_speckle() {
        let mut mask = Array2::from_elem((20, 20), false);
        mask[(3, 3)] = true;
        mask[(3, 4)] = true;
        mask[(15, 15)] = true;
        let result = opening(&mask, &StructuringElement::Disk(3)).unwrap();
        assert!(result.iter().all(|&v| !v));
    }

    #[test]
    fn test_opening_preserves_large_square() {
        let mask = Array2::from_shape_fn((40, 40), |(r, c)| (10..30).contains(&r) && (10..30).contains(&c));
        let result = opening(&mask, &StructuringElement::Disk(3)).unwrap();
        assert!(result[(20, 20)]);
        assert!(result[(10, 20)]);
        // disk corners round off the square's corners
        assert!(!result[(10, 10)]);
        assert!(result.iter().zip(mask.iter()).all(|(&o, &m)| !o || m));
    }

    #[test]
    fn test_opening_keeps_region_touching_border() {
        let mask = Array2::from_shape_fn((30, 30), |(r, c)| r < 12 && c < 12);
        let result = opening(&mask, &StructuringElement::Disk(3)).unwrap();
        assert!(result[(0, 0)]);
        assert!(result[(0, 11)]);
    }
}
