//! Error types for network construction and forward passes.

use thiserror::Error;
use volseg_core::CoreError;

/// Errors raised by the segmentation network and its helpers.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ModelError {
    /// Tensors cannot be combined because their shapes disagree, e.g. a
    /// decoder tensor larger than the skip tensor it is aligned against.
    #[error("Shape mismatch: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    /// Input spatial extent is too small for the network depth.
    #[error("Input spatial shape {shape:?} is smaller than the minimum {minimum} per axis")]
    InputTooSmall { shape: Vec<usize>, minimum: usize },

    /// A batch was requested from zero volumes.
    #[error("Cannot build a batch from zero volumes")]
    EmptyBatch,

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Error from volume handling.
    #[error(transparent)]
    Core(#[from] CoreError),
}

/// Result type for model operations.
pub type Result<T> = std::result::Result<T, ModelError>;

impl ModelError {
    /// Create an invalid configuration error.
    pub fn invalid_configuration(msg: impl Into<String>) -> Self {
        Self::InvalidConfiguration(msg.into())
    }

    /// Create a shape mismatch error from two dimension arrays.
    pub fn shape_mismatch(expected: &[usize], actual: &[usize]) -> Self {
        Self::ShapeMismatch {
            expected: expected.to_vec(),
            actual: actual.to_vec(),
        }
    }
}
