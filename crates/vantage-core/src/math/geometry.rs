// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Bounding volumes used by culling and light-volume placement.

use super::{Mat4, Vec3};
use serde::{Deserialize, Serialize};

/// Represents an Axis-Aligned Bounding Box (AABB).
///
/// Every mesh, light volume, probe and particle emitter handed to the culler
/// carries one of these in world space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Aabb {
    /// The corner of the box with the smallest coordinates on all axes.
    pub min: Vec3,
    /// The corner of the box with the largest coordinates on all axes.
    pub max: Vec3,
}

impl Aabb {
    /// An empty box; merging anything into it yields that thing.
    pub const INVALID: Self = Self {
        min: Vec3::splat(f32::INFINITY),
        max: Vec3::splat(f32::NEG_INFINITY),
    };

    /// Creates a new `Aabb` from two corner points, in any order.
    #[inline]
    pub fn from_min_max(a: Vec3, b: Vec3) -> Self {
        Self {
            min: a.min(b),
            max: a.max(b),
        }
    }

    /// Creates a new `Aabb` from a center point and its half-extents.
    #[inline]
    pub fn from_center_half_extents(center: Vec3, half_extents: Vec3) -> Self {
        let h = half_extents.abs();
        Self {
            min: center - h,
            max: center + h,
        }
    }

    /// Creates a cube enclosing a sphere.
    #[inline]
    pub fn from_sphere(center: Vec3, radius: f32) -> Self {
        Self::from_center_half_extents(center, Vec3::splat(radius))
    }

    /// Calculates the center point of the `Aabb`.
    #[inline]
    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    /// Calculates the half-extents of the `Aabb`.
    #[inline]
    pub fn half_extents(&self) -> Vec3 {
        (self.max - self.min) * 0.5
    }

    /// Checks if the `Aabb` is valid (`min <= max` on all axes).
    #[inline]
    pub fn is_valid(&self) -> bool {
        self.min.cmple(self.max).all()
    }

    /// Checks if a point is inside or on the boundary.
    #[inline]
    pub fn contains_point(&self, point: Vec3) -> bool {
        point.cmpge(self.min).all() && point.cmple(self.max).all()
    }

    /// Checks if a point is strictly inside, excluding the boundary.
    #[inline]
    pub fn contains_point_strict(&self, point: Vec3) -> bool {
        point.cmpgt(self.min).all() && point.cmplt(self.max).all()
    }

    /// Returns a copy grown by `amount` on every side.
    #[inline]
    pub fn grown(&self, amount: f32) -> Self {
        Self {
            min: self.min - Vec3::splat(amount),
            max: self.max + Vec3::splat(amount),
        }
    }

    /// Creates a new `Aabb` that encompasses both boxes.
    #[inline]
    pub fn merge(&self, other: &Aabb) -> Self {
        Self {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    /// The corner furthest along `normal`.
    #[inline]
    pub fn positive_vertex(&self, normal: Vec3) -> Vec3 {
        Vec3::new(
            if normal.x >= 0.0 { self.max.x } else { self.min.x },
            if normal.y >= 0.0 { self.max.y } else { self.min.y },
            if normal.z >= 0.0 { self.max.z } else { self.min.z },
        )
    }

    /// The corner furthest against `normal`.
    #[inline]
    pub fn negative_vertex(&self, normal: Vec3) -> Vec3 {
        Vec3::new(
            if normal.x >= 0.0 { self.min.x } else { self.max.x },
            if normal.y >= 0.0 { self.min.y } else { self.max.y },
            if normal.z >= 0.0 { self.min.z } else { self.max.z },
        )
    }

    /// The eight corners, x varying fastest.
    pub fn corners(&self) -> [Vec3; 8] {
        let (a, b) = (self.min, self.max);
        [
            Vec3::new(a.x, a.y, a.z),
            Vec3::new(b.x, a.y, a.z),
            Vec3::new(a.x, b.y, a.z),
            Vec3::new(b.x, b.y, a.z),
            Vec3::new(a.x, a.y, b.z),
            Vec3::new(b.x, a.y, b.z),
            Vec3::new(a.x, b.y, b.z),
            Vec3::new(b.x, b.y, b.z),
        ]
    }

    /// Computes the bounding box enclosing this box after an affine transform.
    ///
    /// Projects the half-extents onto the absolute basis vectors of `matrix`
    /// instead of transforming all eight corners.
    pub fn transform(&self, matrix: &Mat4) -> Self {
        let center = matrix.transform_point3(self.center());
        let h = self.half_extents();
        let half = matrix.x_axis.truncate().abs() * h.x
            + matrix.y_axis.truncate().abs() * h.y
            + matrix.z_axis.truncate().abs() * h.z;
        Aabb::from_center_half_extents(center, half)
    }
}

impl Default for Aabb {
    fn default() -> Self {
        Self::INVALID
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_from_min_max_orders_corners() {
        let aabb = Aabb::from_min_max(Vec3::new(1.0, -1.0, 3.0), Vec3::new(-1.0, 1.0, 0.0));
        assert_eq!(aabb.min, Vec3::new(-1.0, -1.0, 0.0));
        assert_eq!(aabb.max, Vec3::new(1.0, 1.0, 3.0));
    }

    #[test]
    fn test_merge_with_invalid_is_identity() {
        let aabb = Aabb::from_sphere(Vec3::ONE, 2.0);
        assert_eq!(Aabb::INVALID.merge(&aabb), aabb);
        assert!(!Aabb::INVALID.is_valid());
    }

    #[test]
    fn test_strict_containment_excludes_boundary() {
        let aabb = Aabb::from_min_max(Vec3::ZERO, Vec3::ONE);
        assert!(aabb.contains_point(Vec3::new(1.0, 0.5, 0.5)));
        assert!(!aabb.contains_point_strict(Vec3::new(1.0, 0.5, 0.5)));
        assert!(aabb.contains_point_strict(Vec3::splat(0.5)));
    }

    #[test]
    fn test_positive_and_negative_vertex() {
        let aabb = Aabb::from_min_max(Vec3::splat(-1.0), Vec3::splat(2.0));
        let n = Vec3::new(1.0, -1.0, 0.0);
        assert_eq!(aabb.positive_vertex(n), Vec3::new(2.0, -1.0, 2.0));
        assert_eq!(aabb.negative_vertex(n), Vec3::new(-1.0, 2.0, -1.0));
    }

    #[test]
    fn test_transform_rotation_grows_box() {
        let aabb = Aabb::from_center_half_extents(Vec3::ZERO, Vec3::new(1.0, 1.0, 1.0));
        let rot = Mat4::from_rotation_y(std::f32::consts::FRAC_PI_4);
        let out = aabb.transform(&(Mat4::from_translation(Vec3::X * 5.0) * rot));
        assert_relative_eq!(out.center().x, 5.0, epsilon = 1e-5);
        assert_relative_eq!(out.half_extents().x, std::f32::consts::SQRT_2, epsilon = 1e-5);
        assert_relative_eq!(out.half_extents().y, 1.0, epsilon = 1e-5);
    }
}
