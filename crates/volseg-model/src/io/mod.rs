pub mod adapter;

pub use adapter::{probabilities_to_mask, probabilities_to_volume, volume_to_tensor, volumes_to_batch};
