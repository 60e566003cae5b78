//! Volumetric segmentation network.
//!
//! - [`unet`]: the encoder-decoder network and its skip alignment
//! - [`losses`]: binary cross-entropy training objective
//! - [`metrics`]: accuracy and Dice on thresholded predictions
//! - [`io`]: conversions between [`volseg_core::Volume`] and network tensors

pub mod error;
pub mod io;
pub mod losses;
pub mod metrics;
pub mod unet;

pub use error::{ModelError, Result};
pub use losses::BinaryCrossEntropyLoss;
pub use unet::{AlignmentPolicy, SegmentationNetwork, SegmentationNetworkConfig};
