//! Affine pixel-to-map transform

use serde::{Deserialize, Serialize};

/// Six-coefficient affine transform from pixel space `(col, row)` to the
/// raster's native CRS:
///
/// ```text
/// x = origin_x + col * pixel_width  + row * row_rotation
/// y = origin_y + col * col_rotation + row * pixel_height
/// ```
///
/// `(0, 0)` is the outer corner of the first pixel; pixel centres sit at
/// `+0.5`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoTransform {
    pub origin_x: f64,
    pub origin_y: f64,
    pub pixel_width: f64,
    /// Negative for north-up rasters
    pub pixel_height: f64,
    pub row_rotation: f64,
    pub col_rotation: f64,
}

impl GeoTransform {
    /// North-up transform without rotation.
    pub fn new(origin_x: f64, origin_y: f64, pixel_width: f64, pixel_height: f64) -> Self {
        Self {
            origin_x,
            origin_y,
            pixel_width,
            pixel_height,
            row_rotation: 0.0,
            col_rotation: 0.0,
        }
    }

    /// Coefficients in GDAL order.
    pub fn to_gdal(&self) -> [f64; 6] {
        [
            self.origin_x,
            self.pixel_width,
            self.row_rotation,
            self.origin_y,
            self.col_rotation,
            self.pixel_height,
        ]
    }

    #[inline]
    pub fn apply(&self, col: f64, row: f64) -> (f64, f64) {
        (
            self.origin_x + col * self.pixel_width + row * self.row_rotation,
            self.origin_y + col * self.col_rotation + row * self.pixel_height,
        )
    }

    /// Transform of the window whose first pixel is `(col, row)`.
    pub fn for_window(&self, col: usize, row: usize) -> Self {
        let (origin_x, origin_y) = self.apply(col as f64, row as f64);
        Self {
            origin_x,
            origin_y,
            ..*self
        }
    }

    /// Transform of a grid whose pixels cover `sx` by `sy` source pixels.
    pub fn scaled(&self, sx: f64, sy: f64) -> Self {
        Self {
            pixel_width: self.pixel_width * sx,
            pixel_height: self.pixel_height * sy,
            row_rotation: self.row_rotation * sy,
            col_rotation: self.col_rotation * sx,
            ..*self
        }
    }

    /// Ground size of one pixel along each axis.
    pub fn resolution(&self) -> (f64, f64) {
        (
            self.pixel_width.hypot(self.col_rotation),
            self.pixel_height.hypot(self.row_rotation),
        )
    }

    /// `(min_x, min_y, max_x, max_y)` of a `width` x `height` raster.
    pub fn bounds(&self, width: usize, height: usize) -> (f64, f64, f64, f64) {
        let (w, h) = (width as f64, height as f64);
        let corners = [self.apply(0.0, 0.0), self.apply(w, 0.0), self.apply(0.0, h), self.apply(w, h)];
        corners.iter().fold(
            (f64::INFINITY, f64::INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY),
            |(x0, y0, x1, y1), &(x, y)| (x0.min(x), y0.min(y), x1.max(x), y1.max(y)),
        )
    }
}

impl Default for GeoTransform {
    /// Identity-like transform used for rasters without georeferencing.
    fn default() -> Self {
        Self::new(0.0, 0.0, 1.0, -1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_bounds_north_up() {
        let gt = GeoTransform::new(450_000.0, 4_430_000.0, 10.0, -10.0);
        let (min_x, min_y, max_x, max_y) = gt.bounds(200, 100);
        assert_relative_eq!(min_x, 450_000.0);
        assert_relative_eq!(max_x, 452_000.0);
        assert_relative_eq!(min_y, 4_429_000.0);
        assert_relative_eq!(max_y, 4_430_000.0);
        assert_eq!(gt.resolution(), (10.0, 10.0));
    }

    #[test]
    fn test_rotated_resolution() {
        let mut gt = GeoTransform::new(0.0, 0.0, 3.0, -3.0);
        gt.col_rotation = 4.0;
        gt.row_rotation = 4.0;
        assert_relative_eq!(gt.resolution().0, 5.0);
        assert_relative_eq!(gt.resolution().1, 5.0);
    }

    #[test]
    fn test_window_and_scaled() {
        let gt = GeoTransform::new(500_000.0, 4_000_000.0, 10.0, -10.0);
        let win = gt.for_window(100, 50);
        assert_relative_eq!(win.origin_x, 501_000.0, epsilon = 1e-9);
        assert_relative_eq!(win.origin_y, 3_999_500.0, epsilon = 1e-9);

        let ovr = gt.scaled(4.0, 4.0);
        assert_relative_eq!(ovr.pixel_width, 40.0);
        assert_relative_eq!(ovr.pixel_height, -40.0);
        assert_eq!(ovr.to_gdal(), [500_000.0, 40.0, 0.0, 4_000_000.0, 0.0, -40.0]);
    }
}
