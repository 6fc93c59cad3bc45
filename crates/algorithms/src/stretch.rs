//! Percentile contrast stretching
//!
//! Percentiles use linear interpolation between closest ranks (the common
//! "linear" definition). Analysis statistics treat zero and non-finite
//! samples as fill, since imagery pads scene edges with zeros. Display
//! statistics only skip non-finite samples.

use ndarray::Array2;
use geoscout_core::{Error, Result};

/// Spans below this fraction of the range's magnitude count as flat.
const DEGENERATE_RELATIVE_SPAN: f64 = 1e-9;

/// Low/high values bracketing a stretch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PercentileRange {
    pub low: f64,
    pub high: f64,
}

impl PercentileRange {
    pub fn new(low: f64, high: f64) -> Self {
        Self { low, high }
    }

    pub fn span(&self) -> f64 {
        self.high - self.low
    }

    /// True when the range cannot be used as a divisor: non-finite, or a
    /// span lost in rounding noise relative to the values themselves.
    pub fn is_degenerate(&self) -> bool {
        if !self.low.is_finite() || !self.high.is_finite() {
            return true;
        }
        let magnitude = self.low.abs().max(self.high.abs()).max(1.0);
        self.span() <= DEGENERATE_RELATIVE_SPAN * magnitude
    }

    /// Map `v` into 0..1 (unclipped).
    pub fn normalize(&self, v: f64) -> f64 {
        (v - self.low) / self.span()
    }
}

/// Percentile `p` (0..=100) of ascending-sorted `sorted`.
pub fn percentile(sorted: &[f64], p: f64) -> Option<f64> {
    if sorted.is_empty() || !(0.0..=100.0).contains(&p) {
        return None;
    }
    let rank = p / 100.0 * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    let frac = rank - lo as f64;
    Some(sorted[lo] + (sorted[hi] - sorted[lo]) * frac)
}

/// Keep only the samples that count towards statistics, sorted.
fn valid_sorted<I: IntoIterator<Item = f64>>(values: I) -> Vec<f64> {
    let mut v: Vec<f64> = values
        .into_iter()
        .filter(|x| x.is_finite() && *x != 0.0)
        .collect();
    v.sort_unstable_by(f64::total_cmp);
    v
}

/// Percentile range over the finite samples of `values`, zeros included.
///
/// Used for display stretches, where dark pixels are real data.
pub fn display_percentile_range<I: IntoIterator<Item = f64>>(
    values: I,
    low_pct: f64,
    high_pct: f64,
) -> Option<PercentileRange> {
    let mut sorted: Vec<f64> = values.into_iter().filter(|x| x.is_finite()).collect();
    sorted.sort_unstable_by(f64::total_cmp);
    Some(PercentileRange::new(
        percentile(&sorted, low_pct)?,
        percentile(&sorted, high_pct)?,
    ))
}

/// Percentiles `low_pct` and `high_pct` over the valid samples of `values`.
///
/// Returns `None` when there are no valid samples.
pub fn percentile_range<I: IntoIterator<Item = f64>>(
    values: I,
    low_pct: f64,
    high_pct: f64,
) -> Option<PercentileRange> {
    let sorted = valid_sorted(values);
    Some(PercentileRange::new(
        percentile(&sorted, low_pct)?,
        percentile(&sorted, high_pct)?,
    ))
}

/// Single percentile over the valid samples of `values`.
pub fn valid_percentile<I: IntoIterator<Item = f64>>(values: I, pct: f64) -> Option<f64> {
    percentile(&valid_sorted(values), pct)
}

/// 2nd/98th percentile range of a band, failing when it has no valid data.
pub fn band_percentiles(data: &Array2<f64>) -> Result<PercentileRange> {
    percentile_range(data.iter().copied(), 2.0, 98.0)
        .ok_or_else(|| Error::Algorithm("band has no valid samples for a percentile stretch".into()))
}

fn check_range(range: &PercentileRange) -> Result<()> {
    if range.is_degenerate() {
        return Err(Error::Algorithm(format!(
            "degenerate percentile range [{}, {}]",
            range.low, range.high
        )));
    }
    Ok(())
}

/// Stretch so `low` maps to 0 and `high` to 1, without clipping: samples
/// brighter than `high` land above 1. NaN stays NaN.
pub fn stretch_linear(data: &Array2<f64>, range: &PercentileRange) -> Result<Array2<f64>> {
    check_range(range)?;
    Ok(data.mapv(|v| range.normalize(v)))
}

/// Stretch to 0..1 with clipping. NaN stays NaN.
pub fn stretch_unit(data: &Array2<f64>, range: &PercentileRange) -> Result<Array2<f64>> {
    check_range(range)?;
    Ok(data.mapv(|v| {
        if v.is_nan() {
            v
        } else {
            range.normalize(v).clamp(0.0, 1.0)
        }
    }))
}

/// Stretch to 0..255 bytes with clipping. NaN maps to 0.
pub fn stretch_u8(data: &Array2<f64>, range: &PercentileRange) -> Result<Array2<u8>> {
    check_range(range)?;
    Ok(data.mapv(|v| {
        if v.is_nan() {
            0
        } else {
            (range.normalize(v).clamp(0.0, 1.0) * 255.0).round() as u8
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_percentile_linear() {
        let v: Vec<f64> = (1..=5).map(|x| x as f64).collect();
        assert_relative_eq!(percentile(&v, 0.0).unwrap(), 1.0);
        assert_relative_eq!(percentile(&v, 50.0).unwrap(), 3.0);
        assert_relative_eq!(percentile(&v, 98.0).unwrap(), 4.92, epsilon = 1e-12);
        assert_relative_eq!(percentile(&v, 2.0).unwrap(), 1.08, epsilon = 1e-12);
        assert!(percentile(&[], 50.0).is_none());
    }

    #[test]
    fn test_zero_and_nan_excluded() {
        let r = percentile_range(vec![0.0, f64::NAN, 10.0, 20.0, 0.0], 0.0, 100.0).unwrap();
        assert_eq!(r, PercentileRange::new(10.0, 20.0));
        assert!(percentile_range(vec![0.0, 0.0], 2.0, 98.0).is_none());
    }

    #[test]
    fn test_display_range_keeps_zeros() {
        let values = vec![0.0, 0.0, 0.0, 10.0, f64::NAN];
        let r = display_percentile_range(values, 0.0, 100.0).unwrap();
        assert_eq!(r, PercentileRange::new(0.0, 10.0));
        assert!(display_percentile_range(vec![f64::NAN], 2.0, 98.0).is_none());
    }

    #[test]
    fn test_stretch_identity_on_byte_range() {
        let data = Array2::from_shape_fn((16, 16), |(r, c)| ((r * 16 + c) % 256) as f64);
        let out = stretch_u8(&data, &PercentileRange::new(0.0, 255.0)).unwrap();
        for (a, b) in data.iter().zip(out.iter()) {
            assert_eq!(*a as u8, *b);
        }
    }

    #[test]
    fn test_stretch_clips() {
        let data = Array2::from_shape_vec((1, 4), vec![0.0, 50.0, 100.0, 150.0]).unwrap();
        let out = stretch_unit(&data, &PercentileRange::new(50.0, 100.0)).unwrap();
        assert_eq!(out.as_slice().unwrap(), &[0.0, 0.0, 1.0, 1.0]);
    }

    #[test]
    fn test_linear_stretch_keeps_highlights() {
        let data = Array2::from_shape_vec((1, 4), vec![40.0, 60.0, 250.0, f64::NAN]).unwrap();
        let out = stretch_linear(&data, &PercentileRange::new(40.0, 60.0)).unwrap();
        assert_relative_eq!(out[(0, 0)], 0.0);
        assert_relative_eq!(out[(0, 1)], 1.0);
        assert_relative_eq!(out[(0, 2)], 10.5);
        assert!(out[(0, 3)].is_nan());
    }

    #[test]
    fn test_degenerate_range_is_error() {
        let data = Array2::from_elem((4, 4), 7.0);
        let range = band_percentiles(&data).unwrap();
        assert!(range.is_degenerate());
        assert!(matches!(stretch_u8(&data, &range), Err(Error::Algorithm(_))));
    }

    #[test]
    fn test_rounding_noise_range_is_degenerate() {
        // one ulp apart around 42: an averaged flat band, not contrast
        let range = PercentileRange::new(42.0, 42.0 + 2.0 * f64::EPSILON * 42.0);
        assert!(range.is_degenerate());
        assert!(PercentileRange::new(0.1, 0.1 + 1e-17).is_degenerate());
        assert!(PercentileRange::new(0.0, f64::NAN).is_degenerate());

        // real, if small, spreads still stretch
        assert!(!PercentileRange::new(42.0, 42.001).is_degenerate());
        assert!(!PercentileRange::new(0.0, 1e-6).is_degenerate());
        assert!(!PercentileRange::new(1e6, 1e6 + 1.0).is_degenerate());
    }
}
