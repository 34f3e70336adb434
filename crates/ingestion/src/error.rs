//! Ingestion error types

use thiserror::Error;

/// Volume decoding / encoding error
#[derive(Debug, Error)]
pub enum NiftiError {
    /// File shorter than a NIfTI-1 header
    #[error("file too short for a NIfTI-1 header: {len} bytes")]
    TooShort { len: usize },

    /// `sizeof_hdr` is 348 in neither byte order
    #[error("not a NIfTI-1 header (sizeof_hdr = {0})")]
    BadHeaderSize(i32),

    /// Only single-file `n+1` volumes are supported
    #[error("unsupported magic {0:?}, expected single-file \"n+1\"")]
    BadMagic([u8; 4]),

    /// Voxel datatype code not supported
    #[error("unsupported datatype code {0}")]
    UnsupportedDatatype(i16),

    /// Dimensions unusable as a 3-D volume
    #[error("invalid dimensions: {0}")]
    BadDimensions(String),

    /// Voxel spacing zero or not finite
    #[error("invalid voxel spacing {0:?}")]
    BadSpacing([f32; 3]),

    /// Voxel data shorter than the header announces
    #[error("voxel data truncated: expected {expected} bytes, found {actual}")]
    Truncated { expected: usize, actual: usize },

    /// Underlying IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Ingestion Result type alias
pub type Result<T> = std::result::Result<T, NiftiError>;
