//! Spatial metadata types for volumes.
//!
//! Array axes are always ordered Z, Y, X. Physical coordinates are ordered
//! x, y, z (patient space), so column `i` of a [`Direction3`] is the physical
//! direction of array axis `i` and entry `i` of a [`Spacing3`] is the voxel
//! pitch along array axis `i`.
//!
//! All types are thin wrappers around nalgebra so the usual linear algebra
//! stays available through `.0`.

use nalgebra::{Matrix3, Point3 as NaPoint3, Vector3 as NaVector3};
use serde::{Deserialize, Serialize};

/// A point in physical space (x, y, z).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point3(pub NaPoint3<f64>);

impl Point3 {
    /// Create a point from physical coordinates.
    pub fn new(coords: [f64; 3]) -> Self {
        Self(NaPoint3::new(coords[0], coords[1], coords[2]))
    }

    /// The physical origin.
    pub fn origin() -> Self {
        Self(NaPoint3::origin())
    }

    /// Coordinates as an array, physical (x, y, z) order.
    pub fn to_array(&self) -> [f64; 3] {
        [self.0.x, self.0.y, self.0.z]
    }

    /// Coordinates in reversed order, i.e. (z, y, x).
    pub fn reversed(&self) -> [f64; 3] {
        [self.0.z, self.0.y, self.0.x]
    }
}

impl Default for Point3 {
    fn default() -> Self {
        Self::origin()
    }
}

impl std::ops::Index<usize> for Point3 {
    type Output = f64;

    fn index(&self, index: usize) -> &Self::Output {
        &self.0.coords[index]
    }
}

impl std::ops::Sub for Point3 {
    type Output = Vector3;

    fn sub(self, other: Self) -> Self::Output {
        Vector3(self.0 - other.0)
    }
}

impl std::ops::Add<Vector3> for Point3 {
    type Output = Self;

    fn add(self, vector: Vector3) -> Self::Output {
        Self(self.0 + vector.0)
    }
}

/// A 3-component vector (displacement, axis direction or spacing).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Vector3(pub NaVector3<f64>);

/// Voxel pitch per array axis, Z, Y, X order.
pub type Spacing3 = Vector3;

impl Vector3 {
    /// Create a vector from components.
    pub fn new(components: [f64; 3]) -> Self {
        Self(NaVector3::new(components[0], components[1], components[2]))
    }

    /// The zero vector.
    pub fn zeros() -> Self {
        Self(NaVector3::zeros())
    }

    /// Same value on every axis.
    pub fn uniform(value: f64) -> Self {
        Self::new([value; 3])
    }

    /// Components as an array.
    pub fn to_array(&self) -> [f64; 3] {
        [self.0.x, self.0.y, self.0.z]
    }

    /// Components in reversed order.
    pub fn reversed(&self) -> Self {
        Self::new([self.0.z, self.0.y, self.0.x])
    }

    /// Whether all components are equal (within 1e-9).
    pub fn is_uniform(&self) -> bool {
        (self.0.y - self.0.x).abs() < 1e-9 && (self.0.z - self.0.x).abs() < 1e-9
    }

    /// Product of the components; for a spacing this is the voxel volume.
    pub fn product(&self) -> f64 {
        self.0.x * self.0.y * self.0.z
    }
}

impl Default for Vector3 {
    fn default() -> Self {
        Self::uniform(1.0)
    }
}

impl std::ops::Index<usize> for Vector3 {
    type Output = f64;

    fn index(&self, index: usize) -> &Self::Output {
        &self.0[index]
    }
}

impl std::ops::IndexMut<usize> for Vector3 {
    fn index_mut(&mut self, index: usize) -> &mut Self::Output {
        &mut self.0[index]
    }
}

impl std::ops::Mul<f64> for Vector3 {
    type Output = Self;

    fn mul(self, scalar: f64) -> Self::Output {
        Self(self.0 * scalar)
    }
}

/// Orientation of the array axes in physical space.
///
/// Column `i` is the unit direction of array axis `i` (Z, Y, X order).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Direction3(pub Matrix3<f64>);

impl Direction3 {
    /// Axis-aligned orientation for a Z, Y, X array: array axis 0 runs along
    /// physical z, axis 1 along y and axis 2 along x.
    pub fn axis_aligned() -> Self {
        Self::from_axes([
            Vector3::new([0.0, 0.0, 1.0]),
            Vector3::new([0.0, 1.0, 0.0]),
            Vector3::new([1.0, 0.0, 0.0]),
        ])
    }

    /// Build from the physical directions of array axes 0, 1 and 2.
    pub fn from_axes(axes: [Vector3; 3]) -> Self {
        Self(Matrix3::from_columns(&[axes[0].0, axes[1].0, axes[2].0]))
    }

    /// Physical direction of array axis `i`.
    pub fn axis(&self, i: usize) -> Vector3 {
        Vector3(self.0.column(i).into_owned())
    }

    /// Determinant of the orientation matrix.
    pub fn determinant(&self) -> f64 {
        self.0.determinant()
    }

    /// Whether the columns form an orthonormal basis.
    pub fn is_orthogonal(&self) -> bool {
        let product = self.0 * self.0.transpose();
        (product - Matrix3::identity()).abs().max() < 1e-6
    }

    /// Inverse matrix, if the orientation is not degenerate.
    pub fn try_inverse(&self) -> Option<Self> {
        self.0.try_inverse().map(Self)
    }
}

impl Default for Direction3 {
    fn default() -> Self {
        Self::axis_aligned()
    }
}

impl std::ops::Mul<Vector3> for Direction3 {
    type Output = Vector3;

    fn mul(self, vector: Vector3) -> Self::Output {
        Vector3(self.0 * vector.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_point_vector_arithmetic() {
        let p = Point3::new([1.0, 2.0, 3.0]);
        let v = Vector3::new([4.0, 5.0, 6.0]);
        assert_eq!(p + v, Point3::new([5.0, 7.0, 9.0]));
        assert_eq!((p + v) - p, v);
    }

    #[test]
    fn test_point_reversed() {
        let p = Point3::new([1.0, 2.0, 3.0]);
        assert_eq!(p.reversed(), [3.0, 2.0, 1.0]);
    }

    #[test]
    fn test_spacing_helpers() {
        let s = Spacing3::new([2.5, 0.7, 0.7]);
        assert!(!s.is_uniform());
        assert!(Spacing3::uniform(1.5).is_uniform());
        assert!((s.product() - 2.5 * 0.7 * 0.7).abs() < 1e-12);
        assert_eq!(s.reversed(), Spacing3::new([0.7, 0.7, 2.5]));
    }

    #[test]
    fn test_axis_aligned_direction() {
        let d = Direction3::axis_aligned();
        assert!(d.is_orthogonal());
        assert_eq!(d.axis(0), Vector3::new([0.0, 0.0, 1.0]));
        assert_eq!(d.axis(2), Vector3::new([1.0, 0.0, 0.0]));
        // Z,Y,X -> z,y,x is an axis swap, so the handedness flips.
        assert!((d.determinant() + 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_degenerate_direction_has_no_inverse() {
        let d = Direction3::from_axes([Vector3::zeros(), Vector3::zeros(), Vector3::zeros()]);
        assert!(d.try_inverse().is_none());
        assert!(!d.is_orthogonal());
    }
}
