//! 3D U-Net: encoder/decoder stages joined by aligned skip connections.

pub mod aligner;
pub mod block;
pub mod decoder;
pub mod encoder;
pub mod network;

pub use aligner::{center_crop, zero_pad, AlignmentPolicy, SpatialAligner};
pub use block::{max_pool3d, ChannelDropout, ConvBlock, ConvBlockConfig};
pub use decoder::{DecoderStage, DecoderStageConfig};
pub use encoder::{EncoderStage, EncoderStageConfig};
pub use network::{SegmentationNetwork, SegmentationNetworkConfig, MAX_DEPTH};
