//! In-memory block-average downsampling

use ndarray::Array2;
use geoscout_core::{Error, Result};

/// Average `factor`×`factor` blocks of `data`.
///
/// The output has `ceil(rows / factor)` × `ceil(cols / factor)` cells; the
/// last row and column of blocks may be partial. NaN cells are left out of
/// each average and a block with no valid cell becomes NaN.
pub fn downsample_mean(data: &Array2<f64>, factor: usize) -> Result<Array2<f64>> {
    if factor == 0 {
        return Err(Error::InvalidParameter {
            name: "factor",
            value: "0".to_string(),
            reason: "downsampling factor must be at least 1".to_string(),
        });
    }
    let (rows, cols) = data.dim();
    let out_rows = rows.div_ceil(factor);
    let out_cols = cols.div_ceil(factor);

    let mut sums = Array2::<f64>::zeros((out_rows, out_cols));
    let mut counts = Array2::<u32>::zeros((out_rows, out_cols));
    for ((r, c), &v) in data.indexed_iter() {
        if !v.is_nan() {
            sums[(r / factor, c / factor)] += v;
            counts[(r / factor, c / factor)] += 1;
        }
    }

    Ok(ndarray::Zip::from(&sums)
        .and(&counts)
        .map_collect(|&s, &n| if n == 0 { f64::NAN } else { s / n as f64 }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_downsample_by_two() {
        let data = Array2::from_shape_fn((4, 4), |(r, c)| (r * 4 + c) as f64);
        let out = downsample_mean(&data, 2).unwrap();
        assert_eq!(out.dim(), (2, 2));
        assert_relative_eq!(out[(0, 0)], 2.5);
        assert_relative_eq!(out[(1, 1)], 12.5);
    }

    #[test]
    fn test_partial_blocks_and_nan() {
        let mut data = Array2::from_elem((3, 5), 4.0);
        data[(0, 0)] = f64::NAN;
        data[(2, 4)] = f64::NAN;
        let out = downsample_mean(&data, 2).unwrap();
        assert_eq!(out.dim(), (2, 3));
        assert_relative_eq!(out[(0, 0)], 4.0);
        assert!(out[(1, 2)].is_nan());
    }

    #[test]
    fn test_zero_factor_rejected() {
        let data = Array2::from_elem((2, 2), 1.0);
        assert!(downsample_mean(&data, 0).is_err());
    }
}
