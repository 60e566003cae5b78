//! Encoder-decoder segmentation network with skip connections.
//!
//! ```text
//! input [N,Cin,Z,Y,X]
//!   │ stem (feature mixing Cin→c0)
//!   ├──────────────────────────────────────────────┐ skip 0
//!   │ encoder 0 (pool, dropout, mix c0→c1)         │
//!   ├──────────────────────────────┐ skip 1        │
//!   ⋮                              │               │
//!   │ encoder d-1 → bottleneck c_d │               │
//!   │ decoder 0 (up c_d→c_{d-1}, align, concat) ◄──┘ …
//!   ⋮                                              │
//!   │ decoder d-1 (up c1→c0, align, concat) ◄──────┘
//!   │ dropout, 1×1×1 conv c0→1, sigmoid
//!   ▼
//! probabilities [N,1,Z',Y',X']
//! ```
//!
//! Decoder stage `i` consumes the skip tensor captured at encoder level
//! `d-1-i` during the same forward pass.

use burn::module::Ignored;
use burn::nn::conv::{Conv3d, Conv3dConfig};
use burn::prelude::*;
use burn::tensor::activation::sigmoid;

use super::aligner::AlignmentPolicy;
use super::block::{ChannelDropout, ConvBlock, ConvBlockConfig};
use super::decoder::{DecoderStage, DecoderStageConfig};
use super::encoder::{EncoderStage, EncoderStageConfig};
use crate::error::{ModelError, Result as ModelResult};

/// Deepest supported network; inputs must be at least `2^depth` per axis.
pub const MAX_DEPTH: usize = 8;

/// Configuration for [`SegmentationNetwork`].
#[derive(Config, Debug, PartialEq)]
pub struct SegmentationNetworkConfig {
    /// Input channels (1 for a single CT/MR modality)
    #[config(default = "1")]
    pub in_channels: usize,
    /// Width of the first level; level `k` has `base_channels * 2^k`
    #[config(default = "16")]
    pub base_channels: usize,
    /// Number of downsampling stages
    #[config(default = "4")]
    pub depth: usize,
    /// Explicit channel schedule `[c0, ..., c_depth]` (overrides base/depth)
    pub channels: Option<Vec<usize>>,
    /// Channel dropout probability in every stage and before the head
    #[config(default = "0.0")]
    pub dropout: f64,
    /// Skip alignment policy
    #[config(default = "AlignmentPolicy::Crop")]
    pub alignment: AlignmentPolicy,
}

impl SegmentationNetworkConfig {
    /// Small configuration for CPU experiments and tests.
    pub fn lightweight() -> Self {
        Self::new().with_base_channels(4).with_depth(3)
    }

    /// Use an explicit channel schedule.
    pub fn with_schedule(mut self, schedule: Vec<usize>) -> Self {
        self.channels = Some(schedule);
        self
    }

    /// Channel width per level, `depth + 1` entries.
    pub fn channel_schedule(&self) -> Vec<usize> {
        match &self.channels {
            Some(schedule) => schedule.clone(),
            // Widths that overflow saturate; `validate` rejects them.
            None => (0..=self.depth)
                .map(|level| {
                    u32::try_from(level)
                        .ok()
                        .and_then(|shift| 1usize.checked_shl(shift))
                        .and_then(|factor| self.base_channels.checked_mul(factor))
                        .unwrap_or(usize::MAX)
                })
                .collect(),
        }
    }

    /// Number of downsampling stages implied by the schedule.
    pub fn num_stages(&self) -> usize {
        match &self.channels {
            Some(schedule) => schedule.len().saturating_sub(1),
            None => self.depth,
        }
    }

    pub fn validate(&self) -> ModelResult<()> {
        if self.in_channels == 0 {
            return Err(ModelError::invalid_configuration("in_channels must be positive"));
        }
        if !(0.0..1.0).contains(&self.dropout) {
            return Err(ModelError::invalid_configuration(format!(
                "dropout must be in [0, 1), got {}",
                self.dropout
            )));
        }

        if self.num_stages() > MAX_DEPTH {
            return Err(ModelError::invalid_configuration(format!(
                "depth must be at most {MAX_DEPTH}, got {}",
                self.num_stages()
            )));
        }

        let schedule = self.channel_schedule();
        if schedule.len() < 2 {
            return Err(ModelError::invalid_configuration(
                "channel schedule needs at least two levels (depth >= 1)",
            ));
        }
        if schedule[0] == 0 {
            return Err(ModelError::invalid_configuration("channel widths must be positive"));
        }
        if schedule.windows(2).any(|w| w[1] <= w[0]) {
            return Err(ModelError::invalid_configuration(format!(
                "channel schedule must be strictly increasing, got {schedule:?}"
            )));
        }
        Ok(())
    }

    /// Build the network. Fails on an invalid configuration.
    pub fn init<B: Backend>(&self, device: &B::Device) -> ModelResult<SegmentationNetwork<B>> {
        self.validate()?;
        let channels = self.channel_schedule();
        let depth = channels.len() - 1;

        let stem = ConvBlockConfig::new(self.in_channels, channels[0]).init(device);

        let encoders = (0..depth)
            .map(|k| {
                EncoderStageConfig::new(channels[k], channels[k + 1])
                    .with_dropout(self.dropout)
                    .init(device)
            })
            .collect();

        let decoders = (0..depth)
            .rev()
            .map(|k| {
                DecoderStageConfig::new(channels[k + 1], channels[k])
                    .with_dropout(self.dropout)
                    .with_alignment(self.alignment)
                    .init(device)
            })
            .collect();

        let head = Conv3dConfig::new([channels[0], 1], [1, 1, 1]).init(device);

        tracing::debug!(
            ?channels,
            alignment = %self.alignment,
            dropout = self.dropout,
            "Initialized segmentation network"
        );

        Ok(SegmentationNetwork {
            stem,
            encoders,
            decoders,
            head_dropout: ChannelDropout::new(self.dropout),
            head,
            in_channels: Ignored(self.in_channels),
            channels: Ignored(channels),
            alignment: Ignored(self.alignment),
        })
    }
}

/// Volumetric encoder-decoder network producing per-voxel foreground
/// probabilities.
#[derive(Module, Debug)]
pub struct SegmentationNetwork<B: Backend> {
    pub stem: ConvBlock<B>,
    pub encoders: Vec<EncoderStage<B>>,
    pub decoders: Vec<DecoderStage<B>>,
    pub head_dropout: ChannelDropout,
    pub head: Conv3d<B>,
    in_channels: Ignored<usize>,
    channels: Ignored<Vec<usize>>,
    alignment: Ignored<AlignmentPolicy>,
}

impl<B: Backend> SegmentationNetwork<B> {
    /// Segment a batch.
    ///
    /// # Arguments
    /// * `input` - `[N, in_channels, Z, Y, X]`, every spatial axis at least `2^depth`
    ///
    /// # Returns
    /// Probabilities in (0, 1), shape `[N, 1, Z', Y', X']` with
    /// `[Z', Y', X'] == self.output_shape([Z, Y, X])`.
    pub fn forward(&self, input: Tensor<B, 5>) -> ModelResult<Tensor<B, 5>> {
        self.check_input(&input.dims())?;
        let (skips, bottleneck) = self.encode(input);
        let features = self.decode(bottleneck, skips)?;
        Ok(self.project(features))
    }

    /// Run the stem and every encoder stage.
    ///
    /// Returns the skip tensors, shallowest first, and the bottleneck.
    pub fn encode(&self, input: Tensor<B, 5>) -> (Vec<Tensor<B, 5>>, Tensor<B, 5>) {
        let mut x = self.stem.forward(input);
        let mut skips = Vec::with_capacity(self.encoders.len());

        for encoder in &self.encoders {
            skips.push(x.clone());
            x = encoder.forward(x);
        }

        (skips, x)
    }

    /// Run every decoder stage, consuming skips deepest first.
    pub fn decode(&self, bottleneck: Tensor<B, 5>, skips: Vec<Tensor<B, 5>>) -> ModelResult<Tensor<B, 5>> {
        if skips.len() != self.decoders.len() {
            return Err(ModelError::invalid_configuration(format!(
                "expected {} skip tensors, got {}",
                self.decoders.len(),
                skips.len()
            )));
        }

        self.decoders
            .iter()
            .zip(skips.into_iter().rev())
            .try_fold(bottleneck, |x, (decoder, skip)| decoder.forward(x, skip))
    }

    /// Final dropout, 1×1×1 projection to one channel and sigmoid.
    pub fn project(&self, features: Tensor<B, 5>) -> Tensor<B, 5> {
        let x = self.head_dropout.forward(features);
        sigmoid(self.head.forward(x))
    }

    /// Spatial output shape for a given input spatial shape.
    ///
    /// Equal to the input under [`AlignmentPolicy::Pad`]; under
    /// [`AlignmentPolicy::Crop`] each axis is the input size with the
    /// remainders dropped by pooling removed.
    pub fn output_shape(&self, input: [usize; 3]) -> [usize; 3] {
        let mut out = [0; 3];
        for (axis, o) in out.iter_mut().enumerate() {
            let mut levels = Vec::with_capacity(self.depth() + 1);
            let mut size = input[axis];
            levels.push(size);
            for _ in 0..self.depth() {
                size /= 2;
                levels.push(size);
            }

            let mut up = levels[self.depth()];
            for level in (0..self.depth()).rev() {
                up = match *self.alignment {
                    AlignmentPolicy::Crop => up * 2,
                    AlignmentPolicy::Pad => levels[level],
                };
            }
            *o = up;
        }
        out
    }

    /// Smallest extent accepted on every spatial axis.
    pub fn min_input_size(&self) -> usize {
        1 << self.depth()
    }

    pub fn depth(&self) -> usize {
        self.encoders.len()
    }

    pub fn in_channels(&self) -> usize {
        *self.in_channels
    }

    pub fn channels(&self) -> &[usize] {
        &self.channels
    }

    pub fn alignment(&self) -> AlignmentPolicy {
        *self.alignment
    }

    fn check_input(&self, dims: &[usize; 5]) -> ModelResult<()> {
        if dims[1] != self.in_channels() {
            return Err(ModelError::shape_mismatch(
                &[dims[0], self.in_channels(), dims[2], dims[3], dims[4]],
                dims,
            ));
        }

        let minimum = self.min_input_size();
        if dims[2..].iter().any(|&s| s < minimum) {
            return Err(ModelError::InputTooSmall {
                shape: dims[2..].to_vec(),
                minimum,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_default_schedule() {
        let config = SegmentationNetworkConfig::new();
        assert_eq!(config.channel_schedule(), vec![16, 32, 64, 128, 256]);
        assert_eq!(config.num_stages(), 4);
        assert_eq!(config.alignment, AlignmentPolicy::Crop);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_explicit_schedule() {
        let config = SegmentationNetworkConfig::new().with_schedule(vec![3, 5, 9]);
        assert_eq!(config.channel_schedule(), vec![3, 5, 9]);
        assert_eq!(config.num_stages(), 2);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_configurations() {
        let bad = [
            SegmentationNetworkConfig::new().with_depth(0),
            SegmentationNetworkConfig::new().with_base_channels(0),
            SegmentationNetworkConfig::new().with_in_channels(0),
            SegmentationNetworkConfig::new().with_dropout(1.0),
            SegmentationNetworkConfig::new().with_schedule(vec![8, 8, 16]),
            SegmentationNetworkConfig::new().with_schedule(vec![8]),
            SegmentationNetworkConfig::new().with_depth(64),
            SegmentationNetworkConfig::new().with_depth(MAX_DEPTH + 1),
            SegmentationNetworkConfig::new().with_base_channels(usize::MAX / 4),
            SegmentationNetworkConfig::new().with_schedule((1..=MAX_DEPTH + 2).collect()),
        ];
        let device = Default::default();
        for config in bad {
            assert!(
                matches!(
                    config.init::<TestBackend>(&device),
                    Err(ModelError::InvalidConfiguration(_))
                ),
                "{config:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_deep_schedule_saturates() {
        let config = SegmentationNetworkConfig::new().with_depth(64);
        let schedule = config.channel_schedule();
        assert_eq!(schedule.len(), 65);
        assert_eq!(schedule[4], 256);
        assert_eq!(schedule[64], usize::MAX);

        let deepest = SegmentationNetworkConfig::new()
            .with_base_channels(1)
            .with_depth(MAX_DEPTH);
        assert!(deepest.validate().is_ok());
    }

    #[test]
    fn test_stage_counts() {
        let device = Default::default();
        let net = SegmentationNetworkConfig::lightweight()
            .init::<TestBackend>(&device)
            .unwrap();
        assert_eq!(net.depth(), 3);
        assert_eq!(net.decoders.len(), 3);
        assert_eq!(net.channels(), &[4, 8, 16, 32]);
        assert_eq!(net.min_input_size(), 8);
    }

    #[test]
    fn test_output_shape_rules() {
        let device = Default::default();
        let crop = SegmentationNetworkConfig::new()
            .with_base_channels(2)
            .with_depth(2)
            .init::<TestBackend>(&device)
            .unwrap();
        // 13 -> 6 -> 3 -> 6 -> 12
        assert_eq!(crop.output_shape([16, 13, 9]), [16, 12, 8]);

        let pad = SegmentationNetworkConfig::new()
            .with_base_channels(2)
            .with_depth(2)
            .with_alignment(AlignmentPolicy::Pad)
            .init::<TestBackend>(&device)
            .unwrap();
        assert_eq!(pad.output_shape([16, 13, 9]), [16, 13, 9]);
    }

    #[test]
    fn test_rejects_bad_input() {
        let device = Default::default();
        let net = SegmentationNetworkConfig::new()
            .with_base_channels(2)
            .with_depth(2)
            .init::<TestBackend>(&device)
            .unwrap();

        let small = Tensor::<TestBackend, 5>::zeros([1, 1, 8, 3, 8], &device);
        assert!(matches!(
            net.forward(small),
            Err(ModelError::InputTooSmall { minimum: 4, .. })
        ));

        let wrong_channels = Tensor::<TestBackend, 5>::zeros([1, 2, 8, 8, 8], &device);
        assert!(matches!(
            net.forward(wrong_channels),
            Err(ModelError::ShapeMismatch { .. })
        ));
    }
}
