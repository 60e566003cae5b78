//! Evaluation metrics on thresholded predictions.
//!
//! Both metrics threshold `predictions` at `threshold` and treat targets
//! above 0.5 as foreground. They return plain `f64` and never take part in
//! gradient computation.

use burn::tensor::{backend::Backend, ElementConversion, Tensor};

use crate::error::{ModelError, Result};

/// Fraction of voxels where the thresholded prediction equals the target.
pub fn voxel_accuracy<B: Backend, const D: usize>(
    predictions: Tensor<B, D>,
    targets: Tensor<B, D>,
    threshold: f64,
) -> Result<f64> {
    let (pred, target) = binarize_pair(predictions, targets, threshold)?;
    let agree = pred.equal(target).float().mean();
    Ok(agree.into_scalar().elem::<f64>())
}

/// Dice overlap `2|P∩T| / (|P| + |T|)`.
///
/// Two empty masks agree perfectly and score 1.0.
pub fn dice_coefficient<B: Backend, const D: usize>(
    predictions: Tensor<B, D>,
    targets: Tensor<B, D>,
    threshold: f64,
) -> Result<f64> {
    let (pred, target) = binarize_pair(predictions, targets, threshold)?;

    let intersection = (pred.clone() * target.clone()).sum().into_scalar().elem::<f64>();
    let total = (pred.sum() + target.sum()).into_scalar().elem::<f64>();

    if total == 0.0 {
        return Ok(1.0);
    }
    Ok(2.0 * intersection / total)
}

fn binarize_pair<B: Backend, const D: usize>(
    predictions: Tensor<B, D>,
    targets: Tensor<B, D>,
    threshold: f64,
) -> Result<(Tensor<B, D>, Tensor<B, D>)> {
    let (p_dims, t_dims) = (predictions.dims(), targets.dims());
    if p_dims != t_dims {
        return Err(ModelError::shape_mismatch(&p_dims, &t_dims));
    }
    Ok((
        predictions.greater_elem(threshold).float(),
        targets.greater_elem(0.5).float(),
    ))
}
