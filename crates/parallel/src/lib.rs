//! # Geoscout Parallel
//!
//! Tiling and execution strategies for scanning large rasters.
//!
//! This crate provides:
//! - Overlapping tile grids whose tiles each own a disjoint core region
//! - Sparse strided sample grids with a bounded sample count
//! - Sequential or rayon-backed execution over tile indices

pub mod strategy;
pub mod tiling;

pub use strategy::{ParallelStrategy, ProcessingMode};
pub use tiling::{SampleGrid, Tile, TileIterator};
