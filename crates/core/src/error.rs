//! Raster and georeferencing errors

use thiserror::Error;

/// Main error type for raster, georeferencing and algorithm operations.
///
/// Variants map onto the failure scopes used by the processing pipeline:
/// [`Error::Open`] and [`Error::Io`] are fatal to an operation, [`Error::Read`]
/// is local to one window or tile, [`Error::Reprojection`] degrades to the
/// raw affine result and [`Error::Validation`] drops a single detection.
#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("cannot open raster {path}: {reason}")]
    Open { path: String, reason: String },

    #[error("invalid TIFF: {0}")]
    InvalidTiff(String),

    #[error("read error: {0}")]
    Read(String),

    #[error("unsupported compression: {0}")]
    UnsupportedCompression(u16),

    #[error("decompression failed: {0}")]
    Decompress(String),

    #[error("compression failed: {0}")]
    Compress(String),

    #[error("reprojection error: {0}")]
    Reprojection(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("invalid dimensions {width}x{height}")]
    InvalidDimensions { width: usize, height: usize },

    #[error("block ({row}, {col}) outside a {rows}x{cols} grid")]
    IndexOutOfBounds {
        row: usize,
        col: usize,
        rows: usize,
        cols: usize,
    },

    #[error("shape mismatch: expected {er}x{ec}, got {ar}x{ac}")]
    SizeMismatch { er: usize, ec: usize, ar: usize, ac: usize },

    #[error("unsupported sample layout: {0}")]
    UnsupportedDataType(String),

    #[error("invalid {name} = {value}: {reason}")]
    InvalidParameter {
        name: &'static str,
        value: String,
        reason: String,
    },

    #[error("{0}")]
    Algorithm(String),

    /// Catch-all for third-party failures without a better home
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Whether the error prevents the whole operation from producing output.
    ///
    /// Per-window read failures, numeric degeneracies and rejected points are
    /// local and can be absorbed by the caller.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::Io(_) | Error::Open { .. } | Error::InvalidTiff(_) | Error::Compress(_)
        )
    }
}


pub type Result<T> = std::result::Result<T, Error>;
