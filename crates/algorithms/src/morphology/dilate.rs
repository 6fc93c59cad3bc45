//! Binary dilation
//!
//! A pixel is set if any in-bounds cell under the structuring element is
//! set. Both element shapes are point-symmetric, so no reflection is needed.

use ndarray::Array2;
use crate::maybe_rayon::*;
use geoscout_core::{Algorithm, Error, Result};

use super::element::StructuringElement;
use super::erode::{clip_run, RowCounts};

/// Parameters for binary dilation
#[derive(Debug, Clone, Default)]
pub struct DilateParams {
    /// Structuring element shape
    pub element: StructuringElement,
}

/// Dilation algorithm
#[derive(Debug, Clone, Default)]
pub struct Dilate;

impl Algorithm for Dilate {
    type Input = Array2<bool>;
    type Output = Array2<bool>;
    type Params = DilateParams;
    type Error = Error;

    fn name(&self) -> &'static str {
        "Dilate"
    }

    fn description(&self) -> &'static str {
        "Binary dilation over a structuring element"
    }

    fn execute(&self, input: Self::Input, params: Self::Params) -> Result<Self::Output> {
        dilate(&input, &params.element)
    }
}

/// Perform binary dilation on a mask
///
/// # Arguments
/// * `mask` - Input mask
/// * `element` - Structuring element defining the neighborhood shape
pub fn dilate(mask: &Array2<bool>, element: &StructuringElement) -> Result<Array2<bool>> {
    element.validate()?;

    let (rows, cols) = mask.dim();
    let runs = element.runs();
    let counts = RowCounts::new(mask);

    let output: Vec<bool> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            let mut row_data = vec![false; cols];
            for (col, out) in row_data.iter_mut().enumerate() {
                *out = runs.iter().any(|&run| match clip_run(row, col, run, rows, cols) {
                    Some((r, lo, hi)) => counts.count(r, lo, hi) > 0,
                    None => false,
                });
            }
            row_data
        })
        .collect();

    Array2::from_shape_vec((rows, cols), output).map_err(|e| Error::Other(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dilate_single_pixel_to_disk() {
        let mut mask = Array2::from_elem((11, 11), false);
        mask[(5, 5)] = true;
        let result = dilate(&mask, &StructuringElement::Disk(3)).unwrap();
        assert_eq!(result.iter().filter(|&&v| v).count(), 29);
        assert!(result[(2, 5)]);
        assert!(!result[(2, 4)]);
    }

    #[test]
    fn test_dilate_clipped_at_border() {
        let mut mask = Array2::from_elem((5, 5), false);
        mask[(0, 0)] = true;
        let result = dilate(&mask, &StructuringElement::Square(1)).unwrap();
        assert_eq!(result.iter().filter(|&&v| v).count(), 4);
    }

    #[test]
    fn test_dilate_matches_naive() {
        let mask = Array2::from_shape_fn((17, 29), |(r, c)| (r * 13 + c * 7) % 11 == 0);
        let element = StructuringElement::Disk(2);
        let offsets = element.offsets();
        let result = dilate(&mask, &element).unwrap();
        for ((r, c), &v) in result.indexed_iter() {
            let expected = offsets.iter().any(|&(dr, dc)| {
                let (nr, nc) = (r as isize - dr, c as isize - dc);
                nr >= 0 && nc >= 0 && nr < 17 && nc < 29 && mask[(nr as usize, nc as usize)]
            });
            assert_eq!(v, expected, "at ({}, {})", r, c);
        }
    }
}
