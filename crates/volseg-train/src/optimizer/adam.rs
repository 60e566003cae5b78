use crate::optimizer::Optimizer;
use burn::module::AutodiffModule;
use burn::optim::adaptor::OptimizerAdaptor;
use burn::optim::{Adam, AdamConfig, GradientsParams, Optimizer as BurnOptimizer};
use burn::tensor::backend::AutodiffBackend;

/// Adam optimizer.
///
/// A wrapper around Burn's Adam optimizer.
pub struct AdamOptimizer<M: AutodiffModule<B>, B: AutodiffBackend> {
    optimizer: OptimizerAdaptor<Adam, M, B>,
    learning_rate: f64,
}

impl<M: AutodiffModule<B>, B: AutodiffBackend> AdamOptimizer<M, B> {
    /// Create a new Adam optimizer with default moments
    /// (beta_1 = 0.9, beta_2 = 0.999, epsilon = 1e-5).
    ///
    /// # Arguments
    /// * `learning_rate` - The learning rate
    pub fn new(learning_rate: f64) -> Self {
        Self {
            optimizer: AdamConfig::new().init(),
            learning_rate,
        }
    }
}

impl<M, B> Optimizer<M, B> for AdamOptimizer<M, B>
where
    M: AutodiffModule<B>,
    B: AutodiffBackend,
{
    fn step(&mut self, module: M, gradients: GradientsParams) -> M {
        self.optimizer.step(self.learning_rate, module, gradients)
    }

    fn learning_rate(&self) -> f64 {
        self.learning_rate
    }

    fn set_learning_rate(&mut self, lr: f64) {
        self.learning_rate = lr;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::Autodiff;
    use burn::module::Module;
    use burn::nn::{Linear, LinearConfig};
    use burn::tensor::Tensor;
    use burn_ndarray::NdArray;

    type TestBackend = Autodiff<NdArray<f32>>;

    #[test]
    fn test_step_moves_parameters() {
        let device = Default::default();
        let model: Linear<TestBackend> = LinearConfig::new(2, 1).init(&device);
        let before = model.weight.val().into_data().to_vec::<f32>().unwrap();

        let input = Tensor::<TestBackend, 2>::ones([4, 2], &device);
        let loss = model.forward(input).powf_scalar(2.0).mean();
        let grads = GradientsParams::from_grads(loss.backward(), &model);

        let mut optimizer = AdamOptimizer::new(0.1);
        let model = optimizer.step(model, grads);
        let after = model.weight.val().into_data().to_vec::<f32>().unwrap();

        assert_ne!(before, after);
        assert_eq!(model.num_params(), 3);
    }

    #[test]
    fn test_learning_rate_accessors() {
        let mut optimizer = AdamOptimizer::<Linear<TestBackend>, TestBackend>::new(5e-5);
        assert_eq!(optimizer.learning_rate(), 5e-5);
        optimizer.set_learning_rate(1e-4);
        assert_eq!(optimizer.learning_rate(), 1e-4);
    }
}
