//! Georeferenced pixel block

use crate::crs::CRS;
use crate::raster::{GeoTransform, RasterElement};
use ndarray::Array2;

/// One band of one window, as handed back by window reads.
///
/// The transform is that of the block's own upper-left pixel, so positions
/// inside the block can be mapped to the ground without knowing where the
/// window sat in the source.
#[derive(Debug, Clone)]
pub struct Raster<T: RasterElement> {
    data: Array2<T>,
    transform: GeoTransform,
    crs: Option<CRS>,
    nodata: Option<T>,
}

impl<T: RasterElement> Raster<T> {
    pub fn from_array(data: Array2<T>) -> Self {
        Self {
            data,
            transform: GeoTransform::default(),
            crs: None,
            nodata: None,
        }
    }

    pub fn with_georef(mut self, transform: GeoTransform, crs: Option<CRS>) -> Self {
        self.transform = transform;
        self.crs = crs;
        self
    }

    /// `(rows, cols)`
    pub fn shape(&self) -> (usize, usize) {
        self.data.dim()
    }

    pub fn data(&self) -> &Array2<T> {
        &self.data
    }

    pub fn into_array(self) -> Array2<T> {
        self.data
    }

    pub fn transform(&self) -> &GeoTransform {
        &self.transform
    }

    pub fn crs(&self) -> Option<&CRS> {
        self.crs.as_ref()
    }

    pub fn nodata(&self) -> Option<T> {
        self.nodata
    }

    pub fn set_nodata(&mut self, nodata: Option<T>) {
        self.nodata = nodata;
    }

    /// Samples that are neither no-data nor NaN.
    pub fn valid_values(&self) -> impl Iterator<Item = T> + '_ {
        self.data.iter().copied().filter(move |v| !v.is_nodata(self.nodata))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_georef_is_attached() {
        let block = Raster::from_array(Array2::<f64>::zeros((3, 5)))
            .with_georef(GeoTransform::new(10.0, 20.0, 2.0, -2.0), Some(CRS::from_epsg(32630)));
        assert_eq!(block.shape(), (3, 5));
        assert_eq!(block.transform().origin_x, 10.0);
        assert_eq!(block.crs(), Some(&CRS::from_epsg(32630)));
        assert!(block.nodata().is_none());
    }

    #[test]
    fn test_valid_values_skip_nodata() {
        let mut block = Raster::from_array(Array2::from_shape_vec((2, 2), vec![1.0, -9999.0, f64::NAN, 4.0]).unwrap());
        block.set_nodata(Some(-9999.0));
        let valid: Vec<f64> = block.valid_values().collect();
        assert_eq!(valid, vec![1.0, 4.0]);
    }
}
