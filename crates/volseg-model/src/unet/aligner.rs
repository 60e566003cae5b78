//! Skip-connection alignment.
//!
//! After learned upsampling, a decoder tensor can be smaller than the encoder
//! tensor it is concatenated with: pooling floors odd extents, so the
//! upsampled size drops the odd voxel. Two policies reconcile the sizes:
//!
//! - **Crop**: cut a centered sub-volume of the skip tensor with the decoder
//!   tensor's shape. Border context of the skip tensor is lost.
//! - **Pad**: zero-pad the decoder tensor up to the skip tensor's shape.
//!   All decoder information is kept, at the cost of a synthetic border.
//!
//! For an odd difference the extra voxel goes to the trailing side under
//! both policies. A decoder tensor larger than its skip tensor is rejected
//! under either policy.

use std::fmt;
use std::str::FromStr;

use burn::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{ModelError, Result};

/// How decoder and skip tensors are brought to a common spatial shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlignmentPolicy {
    /// Center-crop the skip tensor to the decoder tensor's shape.
    #[default]
    Crop,
    /// Zero-pad the decoder tensor to the skip tensor's shape.
    Pad,
}

impl FromStr for AlignmentPolicy {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "crop" => Ok(Self::Crop),
            "pad" => Ok(Self::Pad),
            other => Err(ModelError::invalid_configuration(format!(
                "unknown alignment policy {other:?} (expected \"crop\" or \"pad\")"
            ))),
        }
    }
}

impl fmt::Display for AlignmentPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Crop => write!(f, "crop"),
            Self::Pad => write!(f, "pad"),
        }
    }
}

/// Reconciles decoder/skip spatial shapes before concatenation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SpatialAligner {
    policy: AlignmentPolicy,
}

impl SpatialAligner {
    /// Create an aligner for the given policy.
    pub fn new(policy: AlignmentPolicy) -> Self {
        Self { policy }
    }

    /// The configured policy.
    pub fn policy(&self) -> AlignmentPolicy {
        self.policy
    }

    /// Align an upsampled decoder tensor with its skip tensor.
    ///
    /// # Arguments
    /// * `upsampled` - Decoder tensor `[N, C1, Z, Y, X]`
    /// * `skip` - Encoder tensor `[N, C2, Z', Y', X']` with `Z' >= Z` etc.
    ///
    /// # Returns
    /// `(upsampled, skip)` with identical spatial shape: the decoder shape
    /// under [`AlignmentPolicy::Crop`], the skip shape under
    /// [`AlignmentPolicy::Pad`]. Batch and channel dims are untouched.
    pub fn align<B: Backend>(
        &self,
        upsampled: Tensor<B, 5>,
        skip: Tensor<B, 5>,
    ) -> Result<(Tensor<B, 5>, Tensor<B, 5>)> {
        let up_dims = upsampled.dims();
        let skip_dims = skip.dims();

        if up_dims[0] != skip_dims[0] {
            return Err(ModelError::shape_mismatch(&skip_dims, &up_dims));
        }
        let diff = spatial_difference(&up_dims, &skip_dims)?;

        match self.policy {
            AlignmentPolicy::Crop => {
                let skip = center_crop(skip, [up_dims[2], up_dims[3], up_dims[4]])?;
                Ok((upsampled, skip))
            }
            AlignmentPolicy::Pad => Ok((zero_pad(upsampled, diff), skip)),
        }
    }
}

/// Per-axis `shape(reference) - shape(smaller)` over the spatial dims.
fn spatial_difference(smaller: &[usize; 5], reference: &[usize; 5]) -> Result<[usize; 3]> {
    let mut diff = [0; 3];
    for (axis, d) in diff.iter_mut().enumerate() {
        let dim = axis + 2;
        *d = reference[dim]
            .checked_sub(smaller[dim])
            .ok_or_else(|| ModelError::shape_mismatch(reference, smaller))?;
    }
    Ok(diff)
}

/// Centered spatial crop of `tensor` to `target` (Z, Y, X).
///
/// The crop starts at `(shape - target) / 2` on each axis.
pub fn center_crop<B: Backend>(tensor: Tensor<B, 5>, target: [usize; 3]) -> Result<Tensor<B, 5>> {
    let [n, c, z, y, x] = tensor.dims();
    if target == [z, y, x] {
        return Ok(tensor);
    }
    if target[0] > z || target[1] > y || target[2] > x {
        return Err(ModelError::shape_mismatch(
            &[n, c, target[0], target[1], target[2]],
            &[n, c, z, y, x],
        ));
    }

    let offset = [(z - target[0]) / 2, (y - target[1]) / 2, (x - target[2]) / 2];
    Ok(tensor.slice([
        0..n,
        0..c,
        offset[0]..offset[0] + target[0],
        offset[1]..offset[1] + target[1],
        offset[2]..offset[2] + target[2],
    ]))
}

/// Zero-pad the spatial dims by `diff / 2` leading and `diff - diff / 2`
/// trailing voxels on each axis.
pub fn zero_pad<B: Backend>(tensor: Tensor<B, 5>, diff: [usize; 3]) -> Tensor<B, 5> {
    diff.iter().enumerate().fold(tensor, |t, (axis, &d)| {
        let before = d / 2;
        pad_dim(t, axis + 2, before, d - before)
    })
}

fn pad_dim<B: Backend>(tensor: Tensor<B, 5>, dim: usize, before: usize, after: usize) -> Tensor<B, 5> {
    if before == 0 && after == 0 {
        return tensor;
    }

    let device = tensor.device();
    let mut shape = tensor.dims();
    let mut parts = Vec::with_capacity(3);

    if before > 0 {
        shape[dim] = before;
        parts.push(Tensor::zeros(shape, &device));
    }
    parts.push(tensor);
    if after > 0 {
        shape[dim] = after;
        parts.push(Tensor::zeros(shape, &device));
    }

    Tensor::cat(parts, dim)
}
