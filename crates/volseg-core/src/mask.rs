//! Label binarization.
//!
//! Ground-truth volumes may carry several label values (organ, lesion,
//! boundary, ...). The segmentation target is foreground vs background, so
//! every non-zero voxel becomes `1.0` and zero stays `0.0`. The mapping is
//! voxel-wise on the `[Z, Y, X]` tensor; no flatten/reshape round trip is
//! involved, so axis order is preserved by construction.

use burn::tensor::ElementConversion;
use burn::tensor::backend::Backend;

use crate::volume::Volume;

/// Map every non-zero voxel to `1.0` and every zero voxel to `0.0`.
pub fn binarize<B: Backend>(label: &Volume<B>) -> Volume<B> {
    let mask = label.data().clone().equal_elem(0.0).bool_not().float();
    Volume::new(mask, *label.origin(), *label.spacing(), *label.direction())
}

/// Map voxels strictly above `threshold` to `1.0`, the rest to `0.0`.
pub fn threshold<B: Backend>(volume: &Volume<B>, threshold: f64) -> Volume<B> {
    let mask = volume.data().clone().greater_elem(threshold).float();
    Volume::new(mask, *volume.origin(), *volume.spacing(), *volume.direction())
}

/// Fraction of non-zero voxels.
pub fn foreground_fraction<B: Backend>(volume: &Volume<B>) -> f64 {
    binarize(volume).into_data().mean().into_scalar().elem::<f64>()
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::tensor::{Tensor, TensorData};
    use burn_ndarray::NdArray;

    type Backend = NdArray<f32>;

    fn volume_from(values: Vec<f32>, shape: [usize; 3]) -> Volume<Backend> {
        let device = Default::default();
        Volume::from_tensor(Tensor::from_data(TensorData::new(values, shape), &device))
    }

    #[test]
    fn test_binarize_multi_label() {
        let label = volume_from(vec![0.0, 1.0, 2.0, 0.0, 255.0, -1.0, 0.0, 3.0], [2, 2, 2]);
        let mask = binarize(&label);
        let data = mask.data().to_data();
        assert_eq!(
            data.as_slice::<f32>().unwrap(),
            &[0.0, 1.0, 1.0, 0.0, 1.0, 1.0, 0.0, 1.0]
        );
        assert_eq!(mask.shape(), [2, 2, 2]);
    }

    #[test]
    fn test_binarize_preserves_axis_order() {
        // A single foreground voxel at (z=1, y=0, x=2) must stay there.
        let mut values = vec![0.0; 2 * 3 * 4];
        values[12 + 2] = 7.0;
        let mask = binarize(&volume_from(values, [2, 3, 4]));
        let data = mask.data().to_data();
        let data = data.as_slice::<f32>().unwrap();
        for (i, v) in data.iter().enumerate() {
            assert_eq!(*v, if i == 14 { 1.0 } else { 0.0 });
        }
    }

    #[test]
    fn test_threshold_and_fraction() {
        let probs = volume_from(vec![0.1, 0.5, 0.51, 0.9], [1, 2, 2]);
        let mask = threshold(&probs, 0.5);
        let data = mask.data().to_data();
        assert_eq!(data.as_slice::<f32>().unwrap(), &[0.0, 0.0, 1.0, 1.0]);
        assert!((foreground_fraction(&mask) - 0.5).abs() < 1e-6);
    }
}
