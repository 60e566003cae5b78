//! Fixed region-of-interest cropping.
//!
//! Training runs on a fixed sub-volume of every scan. A region is given as a
//! start index and a size, both in Z, Y, X order.

use std::str::FromStr;

use burn::tensor::backend::Backend;
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};
use crate::volume::Volume;

/// Axis-aligned box in voxel index space, Z, Y, X order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RegionOfInterest {
    /// First voxel included on each axis.
    pub start: [usize; 3],
    /// Extent on each axis.
    pub size: [usize; 3],
}

impl RegionOfInterest {
    /// Create a region from a start index and a size.
    pub fn new(start: [usize; 3], size: [usize; 3]) -> Self {
        Self { start, size }
    }

    /// Create a region from half-open bounds `start..end` on each axis.
    pub fn from_bounds(start: [usize; 3], end: [usize; 3]) -> Result<Self> {
        let mut size = [0; 3];
        for axis in 0..3 {
            if end[axis] <= start[axis] {
                return Err(CoreError::invalid_region(format!(
                    "axis {axis}: end {} must be greater than start {}",
                    end[axis], start[axis]
                )));
            }
            size[axis] = end[axis] - start[axis];
        }
        Ok(Self { start, size })
    }

    /// Region of `size` centered inside a volume of `shape`.
    ///
    /// When the margin is odd the extra voxel is left on the trailing side.
    pub fn centered(shape: [usize; 3], size: [usize; 3]) -> Result<Self> {
        let mut start = [0; 3];
        for axis in 0..3 {
            if size[axis] > shape[axis] {
                return Err(CoreError::RegionOutOfBounds {
                    start: [0; 3],
                    size,
                    shape,
                });
            }
            start[axis] = (shape[axis] - size[axis]) / 2;
        }
        Ok(Self { start, size })
    }

    /// Exclusive end index on each axis. Fails when `start + size` overflows.
    pub fn end(&self) -> Result<[usize; 3]> {
        let mut end = [0; 3];
        for axis in 0..3 {
            end[axis] = self.start[axis].checked_add(self.size[axis]).ok_or_else(|| {
                CoreError::invalid_region(format!(
                    "axis {axis}: start {} + size {} overflows",
                    self.start[axis], self.size[axis]
                ))
            })?;
        }
        Ok(end)
    }

    /// Whether the region lies entirely inside a volume of `shape`.
    pub fn fits(&self, shape: [usize; 3]) -> bool {
        match self.end() {
            Ok(end) => (0..3).all(|axis| self.size[axis] > 0 && end[axis] <= shape[axis]),
            Err(_) => false,
        }
    }
}

impl FromStr for RegionOfInterest {
    type Err = CoreError;

    /// Parse `z0,y0,x0,dz,dy,dx`.
    fn from_str(s: &str) -> Result<Self> {
        let values = s
            .split(',')
            .map(|part| part.trim().parse::<usize>())
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| CoreError::invalid_region(format!("{s:?}: {e}")))?;

        if values.len() != 6 {
            return Err(CoreError::invalid_region(format!(
                "expected 6 comma-separated values (z0,y0,x0,dz,dy,dx), got {}",
                values.len()
            )));
        }

        let region = Self::new(
            [values[0], values[1], values[2]],
            [values[3], values[4], values[5]],
        );
        region.end()?;
        Ok(region)
    }
}

impl<B: Backend> Volume<B> {
    /// Extract a sub-volume.
    ///
    /// The origin of the result is the physical position of the region's
    /// first voxel; spacing and direction are unchanged.
    pub fn crop(&self, region: &RegionOfInterest) -> Result<Self> {
        let shape = self.shape();
        let end = region.end()?;
        if !region.fits(shape) {
            return Err(CoreError::RegionOutOfBounds {
                start: region.start,
                size: region.size,
                shape,
            });
        }

        let data = self.data().clone().slice([
            region.start[0]..end[0],
            region.start[1]..end[1],
            region.start[2]..end[2],
        ]);
        let origin = self.index_to_physical([
            region.start[0] as f64,
            region.start[1] as f64,
            region.start[2] as f64,
        ]);

        Ok(Volume::new(data, origin, *self.spacing(), *self.direction()))
    }
}
