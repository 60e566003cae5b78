//! Expanding path stage.

use burn::module::Ignored;
use burn::nn::conv::{ConvTranspose3d, ConvTranspose3dConfig};
use burn::prelude::*;

use super::aligner::{AlignmentPolicy, SpatialAligner};
use super::block::{ChannelDropout, ConvBlock, ConvBlockConfig};
use crate::error::Result as ModelResult;

/// One upsampling stage.
///
/// 1. Learned 2× upsampling `Cin → Cout` (transposed conv, kernel 2, stride 2)
/// 2. Align with the skip tensor (crop or pad)
/// 3. Concatenate `[skip, upsampled]` on channels → `2 * Cout`
/// 4. Channel dropout
/// 5. Feature mixing `2 * Cout → Cout`
#[derive(Module, Debug)]
pub struct DecoderStage<B: Backend> {
    pub upsample: ConvTranspose3d<B>,
    pub dropout: ChannelDropout,
    pub block: ConvBlock<B>,
    aligner: Ignored<SpatialAligner>,
}

#[derive(Config, Debug)]
pub struct DecoderStageConfig {
    pub in_channels: usize,
    pub out_channels: usize,
    #[config(default = "0.0")]
    pub dropout: f64,
    #[config(default = "AlignmentPolicy::Crop")]
    pub alignment: AlignmentPolicy,
}

impl DecoderStageConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> DecoderStage<B> {
        DecoderStage {
            upsample: ConvTranspose3dConfig::new([self.in_channels, self.out_channels], [2, 2, 2])
                .with_stride([2, 2, 2])
                .init(device),
            dropout: ChannelDropout::new(self.dropout),
            block: ConvBlockConfig::new(2 * self.out_channels, self.out_channels).init(device),
            aligner: Ignored(SpatialAligner::new(self.alignment)),
        }
    }
}

impl<B: Backend> DecoderStage<B> {
    /// # Arguments
    /// * `x` - Decoder tensor `[N, Cin, Z, Y, X]`
    /// * `skip` - Encoder output at the target resolution `[N, Cout, Z', Y', X']`
    pub fn forward(&self, x: Tensor<B, 5>, skip: Tensor<B, 5>) -> ModelResult<Tensor<B, 5>> {
        let up = self.upsample.forward(x);
        let (up, skip) = self.aligner.align(up, skip)?;
        let x = Tensor::cat(vec![skip, up], 1);
        let x = self.dropout.forward(x);
        Ok(self.block.forward(x))
    }

    pub fn alignment(&self) -> AlignmentPolicy {
        self.aligner.policy()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_decoder_stage_crop() {
        let device = Default::default();
        let stage = DecoderStageConfig::new(8, 4).init::<TestBackend>(&device);
        let x = Tensor::<TestBackend, 5>::ones([1, 8, 2, 3, 2], &device);
        let skip = Tensor::<TestBackend, 5>::ones([1, 4, 5, 7, 4], &device);
        assert_eq!(stage.forward(x, skip).unwrap().dims(), [1, 4, 4, 6, 4]);
    }

    #[test]
    fn test_decoder_stage_pad() {
        let device = Default::default();
        let stage = DecoderStageConfig::new(8, 4)
            .with_alignment(AlignmentPolicy::Pad)
            .init::<TestBackend>(&device);
        assert_eq!(stage.alignment(), AlignmentPolicy::Pad);

        let x = Tensor::<TestBackend, 5>::ones([1, 8, 2, 3, 2], &device);
        let skip = Tensor::<TestBackend, 5>::ones([1, 4, 5, 7, 4], &device);
        assert_eq!(stage.forward(x, skip).unwrap().dims(), [1, 4, 5, 7, 4]);
    }

    #[test]
    fn test_decoder_stage_rejects_small_skip() {
        let device = Default::default();
        let stage = DecoderStageConfig::new(8, 4).init::<TestBackend>(&device);
        let x = Tensor::<TestBackend, 5>::ones([1, 8, 3, 3, 3], &device);
        let skip = Tensor::<TestBackend, 5>::ones([1, 4, 4, 4, 4], &device);
        assert!(stage.forward(x, skip).is_err());
    }
}
