//! Error types for tiled output and previews.

use thiserror::Error;

/// Errors produced while building optimized rasters or previews.
#[derive(Error, Debug)]
pub enum CogError {
    #[error(transparent)]
    Core(#[from] geoscout_core::Error),

    #[error("image encoding failed: {0}")]
    Encode(#[from] image::ImageError),

    #[error("invalid option {name}: {reason}")]
    InvalidOption { name: &'static str, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias for tiled output operations.
pub type Result<T> = std::result::Result<T, CogError>;
