//! Spectral indices for fire and explosion signatures
//!
//! The fire index is a red/green normalized difference: hot, burning
//! surfaces saturate red well above green.

use ndarray::{Array2, Zip};
use geoscout_core::{Algorithm, Error, Result};

/// Added to the denominator of the fire index.
pub const FIRE_INDEX_EPSILON: f64 = 1e-10;

fn check_same_shape(a: &Array2<f64>, b: &Array2<f64>) -> Result<()> {
    if a.dim() != b.dim() {
        let (er, ec) = a.dim();
        let (ar, ac) = b.dim();
        return Err(Error::SizeMismatch { er, ec, ar, ac });
    }
    Ok(())
}

/// `(red - green) / (red + green + ε)` per pixel.
pub fn fire_index(red: &Array2<f64>, green: &Array2<f64>) -> Result<Array2<f64>> {
    check_same_shape(red, green)?;
    Ok(Zip::from(red)
        .and(green)
        .map_collect(|&r, &g| (r - g) / (r + g + FIRE_INDEX_EPSILON)))
}

/// Mean of the three visible channels per pixel.
pub fn brightness(red: &Array2<f64>, green: &Array2<f64>, blue: &Array2<f64>) -> Result<Array2<f64>> {
    check_same_shape(red, green)?;
    check_same_shape(red, blue)?;
    Ok(Zip::from(red)
        .and(green)
        .and(blue)
        .map_collect(|&r, &g, &b| (r + g + b) / 3.0))
}

/// Thresholds for the fire mask.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FireMaskParams {
    pub min_fire_index: f64,
    pub min_brightness: f64,
}

impl Default for FireMaskParams {
    fn default() -> Self {
        Self {
            min_fire_index: 0.3,
            min_brightness: 0.5,
        }
    }
}

/// Pixels whose index and brightness both exceed the thresholds.
pub fn fire_mask(index: &Array2<f64>, brightness: &Array2<f64>, params: &FireMaskParams) -> Result<Array2<bool>> {
    check_same_shape(index, brightness)?;
    Ok(Zip::from(index)
        .and(brightness)
        .map_collect(|&fi, &br| fi > params.min_fire_index && br > params.min_brightness))
}

/// Fire index over normalized red, green and blue channels.
#[derive(Debug, Clone, Default)]
pub struct FireIndex;

/// Output of [`FireIndex`].
#[derive(Debug, Clone)]
pub struct FireIndexOutput {
    pub index: Array2<f64>,
    pub brightness: Array2<f64>,
    pub mask: Array2<bool>,
}

impl Algorithm for FireIndex {
    type Input = [Array2<f64>; 3];
    type Output = FireIndexOutput;
    type Params = FireMaskParams;
    type Error = Error;

    fn name(&self) -> &'static str {
        "FireIndex"
    }

    fn description(&self) -> &'static str {
        "Red/green normalized difference and brightness with a fire mask"
    }

    fn execute(&self, input: Self::Input, params: Self::Params) -> Result<Self::Output> {
        let [red, green, blue] = input;
        let index = fire_index(&red, &green)?;
        let brightness = brightness(&red, &green, &blue)?;
        let mask = fire_mask(&index, &brightness, &params)?;
        Ok(FireIndexOutput {
            index,
            brightness,
            mask,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_fire_index_values() {
        let red = Array2::from_elem((2, 2), 2.0);
        let green = Array2::from_elem((2, 2), 0.5);
        let fi = fire_index(&red, &green).unwrap();
        assert_relative_eq!(fi[(0, 0)], 0.6, epsilon = 1e-9);

        let zero = Array2::zeros((2, 2));
        let fi = fire_index(&zero, &zero).unwrap();
        assert_eq!(fi[(1, 1)], 0.0);
    }

    #[test]
    fn test_shape_mismatch() {
        let a = Array2::<f64>::zeros((2, 2));
        let b = Array2::<f64>::zeros((3, 2));
        assert!(matches!(fire_index(&a, &b), Err(Error::SizeMismatch { .. })));
    }

    #[test]
    fn test_fire_algorithm_mask() {
        let red = Array2::from_shape_vec((1, 3), vec![2.0, 1.0, 0.4]).unwrap();
        let green = Array2::from_shape_vec((1, 3), vec![0.5, 1.0, 0.1]).unwrap();
        let blue = Array2::from_shape_vec((1, 3), vec![0.5, 1.0, 0.1]).unwrap();
        let out = FireIndex.execute_default([red, green, blue]).unwrap();
        // hot, neutral, red-dominant but dark
        assert_eq!(out.mask.as_slice().unwrap(), &[true, false, false]);
        assert_relative_eq!(out.brightness[(0, 0)], 1.0);
    }
}
