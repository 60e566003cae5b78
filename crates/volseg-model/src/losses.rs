use std::marker::PhantomData;

use burn::{
    module::Module,
    tensor::{backend::Backend, Tensor},
};

use crate::error::{ModelError, Result};

/// Binary cross-entropy over probabilities.
///
/// `L = -mean(t·ln p + (1 - t)·ln(1 - p))`, with `p` clamped to
/// `[epsilon, 1 - epsilon]` so saturated predictions stay finite.
#[derive(Module, Debug)]
pub struct BinaryCrossEntropyLoss<B: Backend> {
    epsilon: f64,
    phantom: PhantomData<B>,
}

impl<B: Backend> Default for BinaryCrossEntropyLoss<B> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: Backend> BinaryCrossEntropyLoss<B> {
    pub fn new() -> Self {
        Self {
            epsilon: 1e-7,
            phantom: PhantomData,
        }
    }

    /// # Arguments
    /// * `predictions` - Probabilities in [0, 1]
    /// * `targets` - Binary labels, same shape as `predictions`
    ///
    /// # Returns
    /// Scalar loss, `[1]`.
    pub fn forward<const D: usize>(
        &self,
        predictions: Tensor<B, D>,
        targets: Tensor<B, D>,
    ) -> Result<Tensor<B, 1>> {
        let (p_dims, t_dims) = (predictions.dims(), targets.dims());
        if p_dims != t_dims {
            return Err(ModelError::shape_mismatch(&p_dims, &t_dims));
        }

        let p = predictions.clamp(self.epsilon, 1.0 - self.epsilon);
        let positive = targets.clone() * p.clone().log();
        let negative = targets.neg().add_scalar(1.0) * p.neg().add_scalar(1.0).log();

        Ok((positive + negative).mean().neg())
    }
}
