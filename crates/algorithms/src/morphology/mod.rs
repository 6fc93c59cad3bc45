//! Binary mathematical morphology on masks
//!
//! - **Erosion**: shrinks set regions
//! - **Dilation**: grows set regions
//! - **Opening**: erosion then dilation (removes speckle)
//! - **Closing**: dilation then erosion (fills small gaps)
//!
//! Cells outside the mask never influence the result.

mod closing;
mod dilate;
mod element;
mod erode;
mod opening;

pub use closing::{closing, Closing, ClosingParams};
pub use dilate::{dilate, Dilate, DilateParams};
pub use element::StructuringElement;
pub use erode::{erode, Erode, ErodeParams};
pub use opening::{opening, Opening, OpeningParams};
