//! Error types for training runs.

use thiserror::Error;
use volseg_core::CoreError;
use volseg_io::IoError;
use volseg_model::ModelError;

/// Main error type for training operations.
#[derive(Error, Debug)]
pub enum TrainingError {
    /// Error from volume handling (ROI cropping, metadata).
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Error while loading scans or labels.
    #[error(transparent)]
    Loader(#[from] IoError),

    /// Error from the network, loss or metrics.
    #[error(transparent)]
    Model(#[from] ModelError),

    /// Error reading or writing run files (configuration, report).
    #[error("File error: {0}")]
    File(#[from] std::io::Error),

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// No samples to train or evaluate on.
    #[error("Dataset is empty")]
    EmptyDataset,

    /// Shape mismatch.
    #[error("Shape mismatch: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        actual: Vec<usize>,
    },
}

/// Result type for training operations.
pub type Result<T> = std::result::Result<T, TrainingError>;

impl TrainingError {
    /// Create an invalid configuration error.
    pub fn invalid_configuration(msg: impl Into<String>) -> Self {
        Self::InvalidConfiguration(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = TrainingError::invalid_configuration("batch_size must be positive");
        assert_eq!(err.to_string(), "Invalid configuration: batch_size must be positive");
        assert_eq!(TrainingError::EmptyDataset.to_string(), "Dataset is empty");
    }

    #[test]
    fn test_wrapped_errors_keep_message() {
        let err: TrainingError = ModelError::invalid_configuration("depth").into();
        assert_eq!(err.to_string(), "Invalid configuration: depth");
        assert!(matches!(err, TrainingError::Model(_)));

        let err: TrainingError = IoError::NoSeries.into();
        assert!(matches!(err, TrainingError::Loader(IoError::NoSeries)));
    }

    #[test]
    fn test_shape_mismatch() {
        let err = TrainingError::ShapeMismatch {
            expected: vec![64, 64, 64],
            actual: vec![64, 64, 32],
        };
        let err_str = err.to_string();
        assert!(err_str.contains("expected"));
        assert!(err_str.contains("got"));
    }
}
