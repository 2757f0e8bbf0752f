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

//! Half-space planes and view frusta.

use super::{Aabb, Mat4, Vec3, Vec4};

/// A plane in Hessian normal form. Points with a positive signed distance
/// lie on the side the normal points to.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Plane {
    /// Unit normal.
    pub normal: Vec3,
    /// Offset along the normal.
    pub d: f32,
}

impl Plane {
    /// Builds a plane from raw `(a, b, c, d)` coefficients, normalizing them.
    pub fn from_coefficients(v: Vec4) -> Self {
        let normal = v.truncate();
        let len = normal.length();
        if len <= f32::EPSILON {
            return Self { normal, d: v.w };
        }
        Self {
            normal: normal / len,
            d: v.w / len,
        }
    }

    /// Builds a plane through `point` facing `normal`.
    pub fn from_point_normal(point: Vec3, normal: Vec3) -> Self {
        let n = normal.normalize_or_zero();
        Self {
            normal: n,
            d: -n.dot(point),
        }
    }

    /// Signed distance from `point` to the plane.
    #[inline]
    pub fn signed_distance(&self, point: Vec3) -> f32 {
        self.normal.dot(point) + self.d
    }
}

/// Result of testing a volume against a frustum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Overlap {
    /// Fully outside at least one plane.
    Outside,
    /// Straddles one or more planes.
    Intersect,
    /// Fully inside every plane.
    Inside,
}

/// Index of each plane inside [`Frustum::planes`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(usize)]
pub enum FrustumPlane {
    /// Left clip plane.
    Left = 0,
    /// Right clip plane.
    Right = 1,
    /// Bottom clip plane.
    Bottom = 2,
    /// Top clip plane.
    Top = 3,
    /// Near clip plane.
    Near = 4,
    /// Far clip plane.
    Far = 5,
}

/// Six inward-facing planes extracted from a view-projection matrix.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Frustum {
    /// Left, right, bottom, top, near, far.
    pub planes: [Plane; 6],
}

impl Frustum {
    /// Extracts the planes of a view-projection matrix whose clip depth runs 0..1.
    pub fn from_view_projection(view_projection: &Mat4) -> Self {
        let r0 = view_projection.row(0);
        let r1 = view_projection.row(1);
        let r2 = view_projection.row(2);
        let r3 = view_projection.row(3);
        Self {
            planes: [
                Plane::from_coefficients(r3 + r0),
                Plane::from_coefficients(r3 - r0),
                Plane::from_coefficients(r3 + r1),
                Plane::from_coefficients(r3 - r1),
                Plane::from_coefficients(r2),
                Plane::from_coefficients(r3 - r2),
            ],
        }
    }

    /// Returns one plane by name.
    #[inline]
    pub fn plane(&self, which: FrustumPlane) -> &Plane {
        &self.planes[which as usize]
    }

    /// Classifies a box against all six planes.
    pub fn classify_aabb(&self, aabb: &Aabb) -> Overlap {
        let mut result = Overlap::Inside;
        for plane in &self.planes {
            if plane.signed_distance(aabb.positive_vertex(plane.normal)) < 0.0 {
                return Overlap::Outside;
            }
            if plane.signed_distance(aabb.negative_vertex(plane.normal)) < 0.0 {
                result = Overlap::Intersect;
            }
        }
        result
    }

    /// Returns the first plane the box lies completely behind, if any.
    pub fn separating_plane(&self, aabb: &Aabb) -> Option<usize> {
        self.planes
            .iter()
            .position(|p| aabb.corners().iter().all(|c| p.signed_distance(*c) < 0.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_frustum() -> Frustum {
        let proj = Mat4::perspective_rh(std::f32::consts::FRAC_PI_2, 1.0, 1.0, 100.0);
        let view = Mat4::look_at_rh(Vec3::ZERO, Vec3::NEG_Z, Vec3::Y);
        Frustum::from_view_projection(&(proj * view))
    }

    #[test]
    fn test_planes_face_inward() {
        let f = test_frustum();
        let inside = Vec3::new(0.0, 0.0, -10.0);
        for plane in &f.planes {
            assert!(plane.signed_distance(inside) > 0.0);
        }
        assert!(f.plane(FrustumPlane::Near).signed_distance(Vec3::new(0.0, 0.0, -0.5)) < 0.0);
        assert!(f.plane(FrustumPlane::Far).signed_distance(Vec3::new(0.0, 0.0, -101.0)) < 0.0);
    }

    #[test]
    fn test_classify_inside_intersect_outside() {
        let f = test_frustum();
        let inside = Aabb::from_sphere(Vec3::new(0.0, 0.0, -20.0), 1.0);
        let straddle = Aabb::from_sphere(Vec3::new(0.0, 0.0, -100.0), 5.0);
        let behind = Aabb::from_sphere(Vec3::new(0.0, 0.0, 20.0), 1.0);
        assert_eq!(f.classify_aabb(&inside), Overlap::Inside);
        assert_eq!(f.classify_aabb(&straddle), Overlap::Intersect);
        assert_eq!(f.classify_aabb(&behind), Overlap::Outside);
        assert!(f.separating_plane(&behind).is_some());
        assert!(f.separating_plane(&inside).is_none());
    }
}
