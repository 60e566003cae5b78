//! Loader errors.
//!
//! Messages never contain file system paths; the offending path is logged at
//! debug level where the error is raised.

use thiserror::Error;

/// Errors raised while locating or decoding volumes and labels.
#[derive(Error, Debug)]
pub enum IoError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A file could not be parsed or decoded as DICOM.
    #[error("DICOM error: {0}")]
    Dicom(String),

    /// A required DICOM attribute is absent or malformed.
    #[error("Missing or invalid DICOM attribute {0}")]
    MissingTag(&'static str),

    /// Slices of one series disagree on geometry or size.
    #[error("Inconsistent series: {0}")]
    InconsistentSeries(String),

    #[error("No DICOM series found")]
    NoSeries,

    #[error("Found {0} DICOM series; select one explicitly")]
    AmbiguousSeries(usize),

    /// Malformed MetaImage header.
    #[error("MetaImage error: {0}")]
    MetaImage(String),

    #[error("Unsupported element type: {0}")]
    UnsupportedElementType(String),

    /// Voxel payload length does not match the header.
    #[error("Data size mismatch: expected {expected} bytes, got {actual}")]
    DataSize { expected: usize, actual: usize },
}

/// Result type for loader operations.
pub type Result<T> = std::result::Result<T, IoError>;

impl IoError {
    pub fn inconsistent(msg: impl Into<String>) -> Self {
        Self::InconsistentSeries(msg.into())
    }

    pub fn metaimage(msg: impl Into<String>) -> Self {
        Self::MetaImage(msg.into())
    }
}
