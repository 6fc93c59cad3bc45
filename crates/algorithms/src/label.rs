//! Connected-component labelling of binary masks
//!
//! Components are found with an explicit-stack flood fill in row-major
//! scan order, so labels are stable: label 1 is the component containing
//! the first set pixel encountered.

use ndarray::Array2;

/// Pixel adjacency used to join components.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Connectivity {
    /// Edge neighbors only
    Four,
    /// Edge and corner neighbors
    #[default]
    Eight,
}

impl Connectivity {
    fn offsets(self) -> &'static [(isize, isize)] {
        const FOUR: [(isize, isize); 4] = [(-1, 0), (0, -1), (0, 1), (1, 0)];
        const EIGHT: [(isize, isize); 8] = [
            (-1, -1), (-1, 0), (-1, 1),
            (0, -1), (0, 1),
            (1, -1), (1, 0), (1, 1),
        ];
        match self {
            Connectivity::Four => &FOUR,
            Connectivity::Eight => &EIGHT,
        }
    }
}

/// Properties of one labelled component.
#[derive(Debug, Clone, PartialEq)]
pub struct Region {
    pub label: u32,
    /// Pixel count
    pub area: usize,
    /// Mean `(row, col)` of member pixels
    pub centroid: (f64, f64),
    /// Member pixels with a 4-neighbor outside the component (or the image)
    pub perimeter: usize,
    /// `(min_row, min_col, max_row, max_col)`, inclusive
    pub bbox: (usize, usize, usize, usize),
    pub pixels: Vec<(usize, usize)>,
}

impl Region {
    /// Mean of `values` over the region's pixels, ignoring NaN.
    pub fn mean_of(&self, values: &Array2<f64>) -> f64 {
        let (sum, n) = self
            .pixels
            .iter()
            .filter_map(|&p| values.get(p).copied())
            .filter(|v| !v.is_nan())
            .fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
        if n == 0 { 0.0 } else { sum / n as f64 }
    }
}

/// Label the connected components of `mask`.
///
/// Returns the label image (0 = background) and one [`Region`] per label,
/// ordered by label.
pub fn label(mask: &Array2<bool>, connectivity: Connectivity) -> (Array2<u32>, Vec<Region>) {
    let (rows, cols) = mask.dim();
    let mut labels = Array2::<u32>::zeros((rows, cols));
    let mut regions = Vec::new();
    let mut stack = Vec::new();

    for start_r in 0..rows {
        for start_c in 0..cols {
            if !mask[(start_r, start_c)] || labels[(start_r, start_c)] != 0 {
                continue;
            }
            let id = regions.len() as u32 + 1;
            labels[(start_r, start_c)] = id;
            stack.push((start_r, start_c));
            let mut pixels = Vec::new();

            while let Some((r, c)) = stack.pop() {
                pixels.push((r, c));
                for &(dr, dc) in connectivity.offsets() {
                    let (nr, nc) = (r as isize + dr, c as isize + dc);
                    if nr < 0 || nc < 0 || nr >= rows as isize || nc >= cols as isize {
                        continue;
                    }
                    let (nr, nc) = (nr as usize, nc as usize);
                    if mask[(nr, nc)] && labels[(nr, nc)] == 0 {
                        labels[(nr, nc)] = id;
                        stack.push((nr, nc));
                    }
                }
            }

            pixels.sort_unstable();
            regions.push(region_props(id, pixels, &labels));
        }
    }

    (labels, regions)
}

fn region_props(id: u32, pixels: Vec<(usize, usize)>, labels: &Array2<u32>) -> Region {
    let (rows, cols) = labels.dim();
    let area = pixels.len();
    let mut bbox = (usize::MAX, usize::MAX, 0, 0);
    let (mut sr, mut sc) = (0.0, 0.0);
    let mut perimeter = 0;

    for &(r, c) in &pixels {
        sr += r as f64;
        sc += c as f64;
        bbox.0 = bbox.0.min(r);
        bbox.1 = bbox.1.min(c);
        bbox.2 = bbox.2.max(r);
        bbox.3 = bbox.3.max(c);

        let boundary = r == 0
            || c == 0
            || r + 1 == rows
            || c + 1 == cols
            || labels[(r - 1, c)] != id
            || labels[(r + 1, c)] != id
            || labels[(r, c - 1)] != id
            || labels[(r, c + 1)] != id;
        if boundary {
            perimeter += 1;
        }
    }

    Region {
        label: id,
        area,
        centroid: (sr / area as f64, sc / area as f64),
        perimeter,
        bbox,
        pixels,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_diagonal_pixels_depend_on_connectivity() {
        let mut mask = Array2::from_elem((4, 4), false);
        mask[(0, 0)] = true;
        mask[(1, 1)] = true;
        mask[(3, 3)] = true;

        let (_, eight) = label(&mask, Connectivity::Eight);
        assert_eq!(eight.len(), 2);
        assert_eq!(eight[0].area, 2);

        let (labels, four) = label(&mask, Connectivity::Four);
        assert_eq!(four.len(), 3);
        assert_eq!(labels[(1, 1)], 2);
    }

    #[test]
    fn test_square_region_props() {
        let mask = Array2::from_shape_fn((20, 20), |(r, c)| (5..15).contains(&r) && (2..12).contains(&c));
        let (_, regions) = label(&mask, Connectivity::Eight);
        assert_eq!(regions.len(), 1);
        let region = &regions[0];
        assert_eq!(region.area, 100);
        assert_relative_eq!(region.centroid.0, 9.5);
        assert_relative_eq!(region.centroid.1, 6.5);
        assert_eq!(region.bbox, (5, 2, 14, 11));
        assert_eq!(region.perimeter, 36);
    }

    #[test]
    fn test_region_touching_image_edge_counts_as_boundary() {
        let mask = Array2::from_elem((3, 3), true);
        let (_, regions) = label(&mask, Connectivity::Four);
        assert_eq!(regions[0].perimeter, 8);
    }

    #[test]
    fn test_mean_of_region() {
        let mask = Array2::from_shape_fn((3, 3), |(r, _)| r == 1);
        let values = Array2::from_shape_fn((3, 3), |(_, c)| c as f64);
        let (_, regions) = label(&mask, Connectivity::Eight);
        assert_relative_eq!(regions[0].mean_of(&values), 1.0);
    }

    #[test]
    fn test_empty_mask() {
        let (labels, regions) = label(&Array2::from_elem((5, 5), false), Connectivity::Eight);
        assert!(regions.is_empty());
        assert!(labels.iter().all(|&l| l == 0));
    }
}
