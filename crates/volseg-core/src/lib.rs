//! Volume types and label preprocessing for volumetric segmentation.
//!
//! - [`Volume`]: a `[Z, Y, X]` tensor with origin, spacing and orientation
//! - [`spatial`]: nalgebra-backed point, spacing and direction types
//! - [`roi`]: fixed region-of-interest cropping
//! - [`mask`]: label binarization and thresholding

pub mod error;
pub mod mask;
pub mod roi;
pub mod spatial;
pub mod volume;

pub use error::{CoreError, Result};
pub use roi::RegionOfInterest;
pub use spatial::{Direction3, Point3, Spacing3, Vector3};
pub use volume::Volume;
