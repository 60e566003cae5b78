//! Error types for volume operations.

use thiserror::Error;

/// Errors raised while manipulating volumes.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CoreError {
    /// Region of interest extends past the volume.
    #[error("Region {start:?}+{size:?} exceeds volume shape {shape:?}")]
    RegionOutOfBounds {
        start: [usize; 3],
        size: [usize; 3],
        shape: [usize; 3],
    },

    /// Region of interest could not be built or parsed.
    #[error("Invalid region: {0}")]
    InvalidRegion(String),

    /// Two volumes (or a volume and a tensor) disagree in shape.
    #[error("Shape mismatch: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        actual: Vec<usize>,
    },
}

/// Result type for volume operations.
pub type Result<T> = std::result::Result<T, CoreError>;

impl CoreError {
    /// Create an invalid region error.
    pub fn invalid_region(msg: impl Into<String>) -> Self {
        Self::InvalidRegion(msg.into())
    }
}
