//! Binary erosion
//!
//! A pixel stays set only if every in-bounds cell under the structuring
//! element is set. Cells outside the mask are ignored, so objects touching
//! the border are not eaten away from the outside.

use ndarray::Array2;
use crate::maybe_rayon::*;
use geoscout_core::{Algorithm, Error, Result};

use super::element::{Run, StructuringElement};

/// Parameters for binary erosion
#[derive(Debug, Clone, Default)]
pub struct ErodeParams {
    /// Structuring element shape
    pub element: StructuringElement,
}

/// Erosion algorithm
#[derive(Debug, Clone, Default)]
pub struct Erode;

impl Algorithm for Erode {
    type Input = Array2<bool>;
    type Output = Array2<bool>;
    type Params = ErodeParams;
    type Error = Error;

    fn name(&self) -> &'static str {
        "Erode"
    }

    fn description(&self) -> &'static str {
        "Binary erosion over a structuring element"
    }

    fn execute(&self, input: Self::Input, params: Self::Params) -> Result<Self::Output> {
        erode(&input, &params.element)
    }
}

/// Per-row running counts of set pixels.
///
/// `count(r, lo, hi)` is the number of set pixels in row `r` between
/// columns `lo` and `hi` inclusive, in O(1).
pub(super) struct RowCounts {
    cols: usize,
    prefix: Vec<u32>,
}

impl RowCounts {
    pub(super) fn new(mask: &Array2<bool>) -> Self {
        let (_, cols) = mask.dim();
        let stride = cols + 1;
        let mut prefix = Vec::with_capacity(mask.nrows() * stride);
        for row in mask.rows() {
            let mut acc = 0u32;
            prefix.push(0);
            for &v in row.iter() {
                acc += v as u32;
                prefix.push(acc);
            }
        }
        Self { cols, prefix }
    }

    #[inline]
    pub(super) fn count(&self, row: usize, lo: usize, hi: usize) -> u32 {
        let base = row * (self.cols + 1);
        self.prefix[base + hi + 1] - self.prefix[base + lo]
    }
}

/// Clip `run` centred on `(row, col)` to the mask.
#[inline]
pub(super) fn clip_run(row: usize, col: usize, run: Run, rows: usize, cols: usize) -> Option<(usize, usize, usize)> {
    let Run { dr, lo, hi } = run;
    let r = row as isize + dr;
    if r < 0 || r >= rows as isize {
        return None;
    }
    let c_lo = (col as isize + lo).max(0);
    let c_hi = (col as isize + hi).min(cols as isize - 1);
    if c_lo > c_hi {
        return None;
    }
    Some((r as usize, c_lo as usize, c_hi as usize))
}

/// Perform binary erosion on a mask
///
/// # Arguments
/// * `mask` - Input mask
/// * `element` - Structuring element defining the neighborhood shape
pub fn erode(mask: &Array2<bool>, element: &StructuringElement) -> Result<Array2<bool>> {
    element.validate()?;

    let (rows, cols) = mask.dim();
    let runs = element.runs();
    let counts = RowCounts::new(mask);

    let output: Vec<bool> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            let mut row_data = vec![false; cols];
            for (col, out) in row_data.iter_mut().enumerate() {
                if !mask[(row, col)] {
                    continue;
                }
                *out = runs.iter().all(|&run| match clip_run(row, col, run, rows, cols) {
                    Some((r, lo, hi)) => counts.count(r, lo, hi) as usize == hi - lo + 1,
                    None => true,
                });
            }
            row_data
        })
        .collect();

    Array2::from_shape_vec((rows, cols), output).map_err(|e| Error::Other(e.to_string()))
}
