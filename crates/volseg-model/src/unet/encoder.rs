//! Contracting path stage.

use burn::prelude::*;

use super::block::{max_pool3d, ChannelDropout, ConvBlock, ConvBlockConfig};

/// One downsampling stage: pool → channel dropout → feature mixing.
///
/// `[N, Cin, Z, Y, X]` → `[N, Cout, ⌊Z/2⌋, ⌊Y/2⌋, ⌊X/2⌋]`
#[derive(Module, Debug)]
pub struct EncoderStage<B: Backend> {
    pub dropout: ChannelDropout,
    pub block: ConvBlock<B>,
}

#[derive(Config, Debug)]
pub struct EncoderStageConfig {
    pub in_channels: usize,
    pub out_channels: usize,
    #[config(default = "0.0")]
    pub dropout: f64,
}

impl EncoderStageConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> EncoderStage<B> {
        EncoderStage {
            dropout: ChannelDropout::new(self.dropout),
            block: ConvBlockConfig::new(self.in_channels, self.out_channels).init(device),
        }
    }
}

impl<B: Backend> EncoderStage<B> {
    pub fn forward(&self, x: Tensor<B, 5>) -> Tensor<B, 5> {
        let x = max_pool3d(x);
        let x = self.dropout.forward(x);
        self.block.forward(x)
    }
}
