//! Structuring elements
//!
//! Both shapes are symmetric and convex along rows, so an element is stored
//! as one horizontal run per row offset. Erosion and dilation cost grows
//! with the element height rather than its area.

use geoscout_core::{Error, Result};

/// A horizontal run of element cells: row offset and inclusive column span.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Run {
    pub dr: isize,
    pub lo: isize,
    pub hi: isize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StructuringElement {
    /// `2r+1` square
    Square(usize),
    /// Cells with `dr² + dc² <= r²`
    Disk(usize),
}

impl Default for StructuringElement {
    fn default() -> Self {
        StructuringElement::Disk(1)
    }
}

impl StructuringElement {
    pub fn validate(&self) -> Result<()> {
        if self.radius() == 0 {
            return Err(Error::InvalidParameter {
                name: "radius",
                value: "0".to_string(),
                reason: "structuring element radius must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    pub fn radius(&self) -> usize {
        match *self {
            StructuringElement::Square(r) | StructuringElement::Disk(r) => r,
        }
    }

    /// One run per row offset, top to bottom.
    pub fn runs(&self) -> Vec<Run> {
        let r = self.radius() as isize;
        (-r..=r)
            .map(|dr| {
                let half = match self {
                    StructuringElement::Square(_) => r,
                    // widest dc with dc² <= r² - dr²
                    StructuringElement::Disk(_) => {
                        let rem = r * r - dr * dr;
                        let mut h = (rem as f64).sqrt() as isize;
                        while h * h > rem {
                            h -= 1;
                        }
                        while (h + 1) * (h + 1) <= rem {
                            h += 1;
                        }
                        h
                    }
                };
                Run { dr, lo: -half, hi: half }
            })
            .collect()
    }

    /// `(dr, dc)` of every cell, row by row.
    pub fn offsets(&self) -> Vec<(isize, isize)> {
        self.runs()
            .into_iter()
            .flat_map(|run| (run.lo..=run.hi).map(move |dc| (run.dr, dc)))
            .collect()
    }

    pub fn cell_count(&self) -> usize {
        self.runs().iter().map(|run| (run.hi - run.lo + 1) as usize).sum()
    }
}
