//! Gradient-based edge analysis
//!
//! Sobel gradient magnitude, edge masks and their summary statistics.

use ndarray::Array2;
use crate::maybe_rayon::*;
use geoscout_core::{Error, Result};

/// Scale applied to the raw Sobel magnitude: each kernel is normalised by
/// its weight sum (4) and the two axes are averaged in quadrature (√2).
const SOBEL_SCALE: f64 = 4.0 * std::f64::consts::SQRT_2;

/// Sobel gradient magnitude.
///
/// Computes `sqrt(Gx² + Gy²) / (4√2)` with the 3x3 Sobel operators, so a
/// unit step between 0 and 1 yields roughly 0.71. NaN inputs count as 0.
/// The one-pixel border has no full neighborhood and is set to 0.
pub fn sobel_magnitude(data: &Array2<f64>) -> Result<Array2<f64>> {
    let (rows, cols) = data.dim();
    if rows < 3 || cols < 3 {
        return Err(Error::Algorithm("Sobel requires at least 3x3 input".into()));
    }

    let out: Vec<f64> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            let mut row_data = vec![0.0; cols];
            if row == 0 || row == rows - 1 {
                return row_data;
            }

            let z = |r: usize, c: usize| -> f64 {
                let v = data[(r, c)];
                if v.is_nan() { 0.0 } else { v }
            };

            for col in 1..(cols - 1) {
                let z1 = z(row - 1, col - 1);
                let z2 = z(row - 1, col);
                let z3 = z(row - 1, col + 1);
                let z4 = z(row, col - 1);
                let z6 = z(row, col + 1);
                let z7 = z(row + 1, col - 1);
                let z8 = z(row + 1, col);
                let z9 = z(row + 1, col + 1);

                let gx = (z3 + 2.0 * z6 + z9) - (z1 + 2.0 * z4 + z7);
                let gy = (z7 + 2.0 * z8 + z9) - (z1 + 2.0 * z2 + z3);

                row_data[col] = (gx * gx + gy * gy).sqrt() / SOBEL_SCALE;
            }
            row_data
        })
        .collect();

    Array2::from_shape_vec((rows, cols), out).map_err(|e| Error::Other(e.to_string()))
}

/// Pixels whose gradient magnitude exceeds `threshold`.
pub fn edge_mask(magnitude: &Array2<f64>, threshold: f64) -> Array2<bool> {
    magnitude.mapv(|m| m > threshold)
}

/// Fraction of set pixels. 0 for an empty mask.
pub fn edge_density(mask: &Array2<bool>) -> f64 {
    if mask.is_empty() {
        return 0.0;
    }
    mask.iter().filter(|&&v| v).count() as f64 / mask.len() as f64
}

/// Centre of mass `(row, col)` of the set pixels, if any.
pub fn center_of_mass(mask: &Array2<bool>) -> Option<(f64, f64)> {
    let (mut sr, mut sc, mut n) = (0.0, 0.0, 0usize);
    for ((r, c), &v) in mask.indexed_iter() {
        if v {
            sr += r as f64;
            sc += c as f64;
            n += 1;
        }
    }
    (n > 0).then(|| (sr / n as f64, sc / n as f64))
}

/// Mean of the finite values of `data`. 0 when there are none.
pub fn finite_mean(data: &Array2<f64>) -> f64 {
    let (sum, n) = data
        .iter()
        .filter(|v| v.is_finite())
        .fold((0.0, 0usize), |(s, n), &v| (s + v, n + 1));
    if n == 0 { 0.0 } else { sum / n as f64 }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_sobel_flat_is_zero() {
        let data = Array2::from_elem((8, 8), 0.6);
        let mag = sobel_magnitude(&data).unwrap();
        assert!(mag.iter().all(|&m| m.abs() < 1e-12));
    }

    #[test]
    fn test_sobel_unit_step() {
        let data = Array2::from_shape_fn((6, 6), |(_, c)| if c < 3 { 0.0 } else { 1.0 });
        let mag = sobel_magnitude(&data).unwrap();
        assert_relative_eq!(mag[(2, 2)], 1.0 / std::f64::consts::SQRT_2, epsilon = 1e-12);
        assert_relative_eq!(mag[(2, 3)], 1.0 / std::f64::consts::SQRT_2, epsilon = 1e-12);
        assert_eq!(mag[(2, 1)], 0.0);
        // border
        assert_eq!(mag[(0, 3)], 0.0);
    }

    #[test]
    fn test_sobel_too_small() {
        let data = Array2::from_elem((2, 5), 1.0);
        assert!(matches!(sobel_magnitude(&data), Err(Error::Algorithm(_))));
    }

    #[test]
    fn test_density_and_center() {
        let mut mask = Array2::from_elem((4, 5), false);
        mask[(1, 1)] = true;
        mask[(3, 3)] = true;
        assert_relative_eq!(edge_density(&mask), 0.1);
        assert_eq!(center_of_mass(&mask), Some((2.0, 2.0)));
        assert_eq!(center_of_mass(&Array2::from_elem((3, 3), false)), None);
    }

    #[test]
    fn test_edge_mask_threshold_is_strict() {
        let mag = Array2::from_shape_vec((1, 3), vec![0.1, 0.15, 0.2]).unwrap();
        assert_eq!(edge_mask(&mag, 0.15).as_slice().unwrap(), &[false, false, true]);
    }
}
