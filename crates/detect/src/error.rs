//! Error types for detection and analysis

use geoscout_core::Window;
use thiserror::Error;

/// A tile that could not be read or processed.
#[derive(Error, Debug)]
#[error("tile {index} at ({}, {}) {}x{}: {source}", .window.col_off, .window.row_off, .window.width, .window.height)]
pub struct TileError {
    pub index: usize,
    pub window: Window,
    #[source]
    pub source: geoscout_core::Error,
}

/// Detection and pipeline errors
#[derive(Error, Debug)]
pub enum DetectError {
    #[error(transparent)]
    Core(#[from] geoscout_core::Error),

    #[error(transparent)]
    Cog(#[from] geoscout_cog::CogError),

    #[error("{detector}: all {tiles} tiles failed; last error: {last}")]
    AllTilesFailed {
        detector: &'static str,
        tiles: usize,
        last: String,
    },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for detection operations
pub type Result<T> = std::result::Result<T, DetectError>;
