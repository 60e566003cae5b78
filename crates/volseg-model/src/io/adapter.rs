use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use volseg_core::{RegionOfInterest, Volume};

use crate::error::{ModelError, Result};

/// Helper to convert a single volume to a model input tensor [1, 1, Z, Y, X]
pub fn volume_to_tensor<B: Backend>(volume: &Volume<B>) -> Tensor<B, 5> {
    let [z, y, x] = volume.shape();
    volume.data().clone().reshape([1, 1, z, y, x])
}

/// Stack volumes of identical shape into `[N, 1, Z, Y, X]`.
pub fn volumes_to_batch<B: Backend>(volumes: &[Volume<B>]) -> Result<Tensor<B, 5>> {
    let first = volumes.first().ok_or(ModelError::EmptyBatch)?;
    let shape = first.shape();

    for volume in volumes.iter().skip(1) {
        if volume.shape() != shape {
            return Err(ModelError::shape_mismatch(&shape, &volume.shape()));
        }
    }

    let tensors: Vec<Tensor<B, 5>> = volumes.iter().map(volume_to_tensor).collect();

    // Concatenate along batch dimension (0)
    Ok(Tensor::cat(tensors, 0))
}

/// Wrap a single-sample, single-channel network output as a volume on the
/// reference grid.
///
/// If the output is smaller than the reference (crop alignment), it is taken
/// to cover the centered sub-region of the reference, and the origin is moved
/// to that region's first voxel.
pub fn probabilities_to_volume<B: Backend>(tensor: &Tensor<B, 5>, reference: &Volume<B>) -> Result<Volume<B>> {
    let [n, c, z, y, x] = tensor.dims();
    if n != 1 || c != 1 {
        return Err(ModelError::shape_mismatch(&[1, 1, z, y, x], &[n, c, z, y, x]));
    }

    let region = RegionOfInterest::centered(reference.shape(), [z, y, x])?;
    let origin = reference.index_to_physical([
        region.start[0] as f64,
        region.start[1] as f64,
        region.start[2] as f64,
    ]);

    Ok(Volume::new(
        tensor.clone().reshape([z, y, x]),
        origin,
        *reference.spacing(),
        *reference.direction(),
    ))
}

/// Threshold network output into a binary mask volume on the reference grid.
pub fn probabilities_to_mask<B: Backend>(
    tensor: &Tensor<B, 5>,
    reference: &Volume<B>,
    threshold: f64,
) -> Result<Volume<B>> {
    let probabilities = probabilities_to_volume(tensor, reference)?;
    Ok(volseg_core::mask::threshold(&probabilities, threshold))
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::tensor::TensorData;
    use burn_ndarray::NdArray;
    use volseg_core::{Direction3, Point3, Spacing3};

    type TestBackend = NdArray<f32>;

    fn volume(shape: [usize; 3], fill: f32) -> Volume<TestBackend> {
        let device = Default::default();
        Volume::new(
            Tensor::full(shape, fill, &device),
            Point3::new([1.0, 2.0, 3.0]),
            Spacing3::new([2.0, 1.0, 1.0]),
            Direction3::axis_aligned(),
        )
    }

    #[test]
    fn test_volume_to_tensor_shape() {
        let tensor = volume_to_tensor(&volume([3, 4, 5], 0.0));
        assert_eq!(tensor.dims(), [1, 1, 3, 4, 5]);
    }

    #[test]
    fn test_batch() {
        let batch = volumes_to_batch(&[volume([2, 2, 2], 0.0), volume([2, 2, 2], 1.0)]).unwrap();
        assert_eq!(batch.dims(), [2, 1, 2, 2, 2]);
        let data = batch.into_data().to_vec::<f32>().unwrap();
        assert!(data[..8].iter().all(|v| *v == 0.0));
        assert!(data[8..].iter().all(|v| *v == 1.0));

        assert!(matches!(
            volumes_to_batch::<TestBackend>(&[]),
            Err(ModelError::EmptyBatch)
        ));
        assert!(volumes_to_batch(&[volume([2, 2, 2], 0.0), volume([2, 2, 3], 0.0)]).is_err());
    }

    #[test]
    fn test_probabilities_to_mask_recenters_origin() {
        let reference = volume([6, 6, 6], 0.0);
        let values: Vec<f32> = (0..64).map(|v| if v % 2 == 0 { 0.9 } else { 0.1 }).collect();
        let probs = Tensor::<TestBackend, 5>::from_data(TensorData::new(values, [1, 1, 4, 4, 4]), &Default::default());

        let mask = probabilities_to_mask(&probs, &reference, 0.5).unwrap();
        assert_eq!(mask.shape(), [4, 4, 4]);
        // Offset (1, 1, 1) voxels; axis-aligned direction maps Z spacing to physical z.
        assert_eq!(mask.origin().to_array(), [2.0, 3.0, 5.0]);

        let data = mask.into_data().into_data().to_vec::<f32>().unwrap();
        assert_eq!(data[0], 1.0);
        assert_eq!(data[1], 0.0);
    }

    #[test]
    fn test_probabilities_to_volume_rejects_multichannel() {
        let reference = volume([2, 2, 2], 0.0);
        let probs = Tensor::<TestBackend, 5>::zeros([1, 2, 2, 2, 2], &Default::default());
        assert!(probabilities_to_volume(&probs, &reference).is_err());
    }
}
