//! Volume type with physical metadata.
//!
//! A [`Volume`] couples a `[Z, Y, X]` tensor with the metadata needed to map
//! voxel indices to patient space: origin, per-axis spacing and orientation.
//! Volumes are produced by the loaders and are treated as immutable inputs;
//! every operation returns a new volume.

use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

use crate::error::{CoreError, Result};
use crate::spatial::{Direction3, Point3, Spacing3, Vector3};

/// Scalar volume in Z, Y, X axis order.
///
/// # Examples
/// ```rust
/// use volseg_core::Volume;
/// use burn::tensor::Tensor;
/// use burn_ndarray::NdArray;
///
/// type Backend = NdArray<f32>;
///
/// let device = Default::default();
/// let data = Tensor::<Backend, 3>::zeros([4, 8, 8], &device);
/// let volume = Volume::from_tensor(data);
/// assert_eq!(volume.shape(), [4, 8, 8]);
/// ```
#[derive(Debug, Clone)]
pub struct Volume<B: Backend> {
    data: Tensor<B, 3>,
    origin: Point3,
    spacing: Spacing3,
    direction: Direction3,
}

impl<B: Backend> Volume<B> {
    /// Create a volume from data and metadata.
    ///
    /// # Arguments
    /// * `data` - Voxel intensities, shape `[Z, Y, X]`
    /// * `origin` - Physical position of voxel `(0, 0, 0)`
    /// * `spacing` - Voxel pitch per array axis (Z, Y, X)
    /// * `direction` - Physical direction of each array axis
    pub fn new(data: Tensor<B, 3>, origin: Point3, spacing: Spacing3, direction: Direction3) -> Self {
        Self {
            data,
            origin,
            spacing,
            direction,
        }
    }

    /// Volume with unit spacing, zero origin and axis-aligned orientation.
    pub fn from_tensor(data: Tensor<B, 3>) -> Self {
        Self::new(data, Point3::origin(), Spacing3::uniform(1.0), Direction3::axis_aligned())
    }

    /// Voxel data, `[Z, Y, X]`.
    pub fn data(&self) -> &Tensor<B, 3> {
        &self.data
    }

    /// Consume the volume and return its voxel data.
    pub fn into_data(self) -> Tensor<B, 3> {
        self.data
    }

    pub fn origin(&self) -> &Point3 {
        &self.origin
    }

    pub fn spacing(&self) -> &Spacing3 {
        &self.spacing
    }

    pub fn direction(&self) -> &Direction3 {
        &self.direction
    }

    /// Shape as `[Z, Y, X]`.
    pub fn shape(&self) -> [usize; 3] {
        self.data.dims()
    }

    /// Total number of voxels.
    pub fn num_voxels(&self) -> usize {
        self.shape().iter().product()
    }

    /// Origin coordinates in reversed (z, y, x) order, matching the axis
    /// order of the array.
    pub fn origin_zyx(&self) -> [f64; 3] {
        self.origin.reversed()
    }

    /// Replace the voxel data, keeping the metadata.
    ///
    /// The new data must have the same shape.
    pub fn with_data(&self, data: Tensor<B, 3>) -> Result<Self> {
        let actual = data.dims();
        if actual != self.shape() {
            return Err(CoreError::ShapeMismatch {
                expected: self.shape().to_vec(),
                actual: actual.to_vec(),
            });
        }
        Ok(Self::new(data, self.origin, self.spacing, self.direction))
    }

    /// Map a (continuous) voxel index to its physical position.
    ///
    /// `point = origin + sum_i direction[:, i] * index[i] * spacing[i]`
    pub fn index_to_physical(&self, index: [f64; 3]) -> Point3 {
        let mut offset = Vector3::zeros();
        for (axis, &i) in index.iter().enumerate() {
            offset = Vector3(offset.0 + self.direction.axis(axis).0 * (i * self.spacing[axis]));
        }
        self.origin + offset
    }

    /// Map a physical position to a continuous voxel index.
    ///
    /// Returns `None` when the orientation matrix is singular or a spacing
    /// component is zero.
    pub fn physical_to_index(&self, point: &Point3) -> Option<[f64; 3]> {
        let inverse = self.direction.try_inverse()?;
        let rotated = inverse * (*point - self.origin);
        let mut index = [0.0; 3];
        for (axis, value) in index.iter_mut().enumerate() {
            if self.spacing[axis] == 0.0 {
                return None;
            }
            *value = rotated[axis] / self.spacing[axis];
        }
        Some(index)
    }
}
