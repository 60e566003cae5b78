//! Optimizer trait for parameter updates.

use burn::module::AutodiffModule;
use burn::optim::GradientsParams;
use burn::tensor::backend::AutodiffBackend;

/// Optimizer trait for training modules.
///
/// Updates are functional: the module is consumed and the updated module is
/// returned, so parameters change exactly once per step after the backward
/// pass.
///
/// # Type Parameters
/// * `M` - The module type to optimize
/// * `B` - The backend for tensor operations (must support autodiff)
pub trait Optimizer<M, B>
where
    M: AutodiffModule<B>,
    B: AutodiffBackend,
{
    /// Perform a single optimization step.
    ///
    /// # Arguments
    /// * `module` - The module to update
    /// * `gradients` - The gradients of the loss with respect to module parameters
    ///
    /// # Returns
    /// The updated module with new parameter values
    fn step(&mut self, module: M, gradients: GradientsParams) -> M;

    /// Get the current learning rate.
    fn learning_rate(&self) -> f64;

    /// Set the learning rate.
    fn set_learning_rate(&mut self, lr: f64);
}
