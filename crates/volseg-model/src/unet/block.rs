//! Building blocks shared by the encoder and decoder stages.

use burn::nn::conv::{Conv3d, Conv3dConfig};
use burn::nn::PaddingConfig3d;
use burn::prelude::*;
use burn::tensor::activation::relu;
use burn::tensor::Distribution;

/// Feature mixing: two 3×3×3 convolutions with unit padding, each followed
/// by ReLU. Spatial shape is preserved.
#[derive(Module, Debug)]
pub struct ConvBlock<B: Backend> {
    pub conv1: Conv3d<B>,
    pub conv2: Conv3d<B>,
}

#[derive(Config, Debug)]
pub struct ConvBlockConfig {
    pub in_channels: usize,
    pub out_channels: usize,
}

impl ConvBlockConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> ConvBlock<B> {
        let conv = |c_in: usize, c_out: usize| {
            Conv3dConfig::new([c_in, c_out], [3, 3, 3])
                .with_padding(PaddingConfig3d::Explicit(1, 1, 1))
                .init(device)
        };

        ConvBlock {
            conv1: conv(self.in_channels, self.out_channels),
            conv2: conv(self.out_channels, self.out_channels),
        }
    }
}

impl<B: Backend> ConvBlock<B> {
    pub fn forward(&self, x: Tensor<B, 5>) -> Tensor<B, 5> {
        let x = relu(self.conv1.forward(x));
        relu(self.conv2.forward(x))
    }
}

/// Channel-wise dropout.
///
/// Zeroes entire feature maps with probability `prob` and rescales the
/// survivors by `1 / (1 - prob)`. Active only on autodiff backends, so
/// `model.valid()` makes inference deterministic.
#[derive(Module, Clone, Debug)]
pub struct ChannelDropout {
    pub prob: f64,
}

impl ChannelDropout {
    pub fn new(prob: f64) -> Self {
        Self { prob }
    }

    pub fn forward<B: Backend>(&self, x: Tensor<B, 5>) -> Tensor<B, 5> {
        if !B::ad_enabled() || self.prob == 0.0 {
            return x;
        }

        let [n, c, _, _, _] = x.dims();
        let keep = 1.0 - self.prob;
        let mask = Tensor::<B, 5>::random([n, c, 1, 1, 1], Distribution::Bernoulli(keep), &x.device())
            .div_scalar(keep);

        x * mask
    }
}

/// 2×2×2 max pooling with stride 2.
///
/// Odd trailing voxels are dropped, so each spatial axis becomes
/// `floor(s / 2)`. Callers guarantee every spatial axis is at least 2.
pub fn max_pool3d<B: Backend>(x: Tensor<B, 5>) -> Tensor<B, 5> {
    let [n, c, z, y, x_len] = x.dims();
    let (z2, y2, x2) = (z / 2, y / 2, x_len / 2);

    let x = if (z2 * 2, y2 * 2, x2 * 2) == (z, y, x_len) {
        x
    } else {
        x.slice([0..n, 0..c, 0..z2 * 2, 0..y2 * 2, 0..x2 * 2])
    };

    // [N*C*Z/2, 2, Y/2, 2, X/2, 2]: each window's 8 voxels sit on dims 1, 3, 5.
    x.reshape([n * c * z2, 2, y2, 2, x2, 2])
        .max_dim(5)
        .max_dim(3)
        .max_dim(1)
        .reshape([n, c, z2, y2, x2])
}
