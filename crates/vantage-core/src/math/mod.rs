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

//! Mathematics primitives used by the frame orchestrator.
//!
//! Linear algebra comes from `glam` (column-major, right-handed). This module
//! adds the spatial types the visibility and lighting code reasons about:
//! bounding boxes, planes, frusta and linear colors.
//!
//! All angular functions operate in **radians** unless the name says otherwise.

/// A small constant for floating-point comparisons.
pub const EPSILON: f32 = 1e-5;

pub use std::f32::consts::{FRAC_PI_2, PI};

pub mod color;
pub mod frustum;
pub mod geometry;

pub use self::color::LinearRgba;
pub use self::frustum::{Frustum, Overlap, Plane};
pub use self::geometry::Aabb;
pub use glam::{Mat4, Quat, UVec2, Vec2, Vec3, Vec4};

/// Converts an angle from degrees to radians.
///
/// # Examples
///
/// ```
/// use vantage_core::math::{degrees_to_radians, PI};
/// assert_eq!(degrees_to_radians(180.0), PI);
/// ```
#[inline]
pub fn degrees_to_radians(degrees: f32) -> f32 {
    degrees.to_radians()
}

/// Checks if two floating-point numbers are approximately equal within [`EPSILON`].
#[inline]
pub fn approx_eq(a: f32, b: f32) -> bool {
    (a - b).abs() <= EPSILON
}

/// Linearly interpolates between `a` and `b`.
#[inline]
pub fn interpolate(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

/// Returns the bit pattern of a matrix, suitable for exact comparisons and hashing.
#[inline]
pub fn matrix_bits(m: &Mat4) -> [u32; 16] {
    let cols = m.to_cols_array();
    let mut bits = [0u32; 16];
    for (dst, src) in bits.iter_mut().zip(cols.iter()) {
        *dst = src.to_bits();
    }
    bits
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interpolate_endpoints() {
        assert_eq!(interpolate(2.0, 4.0, 0.0), 2.0);
        assert_eq!(interpolate(2.0, 4.0, 1.0), 4.0);
        assert!(approx_eq(interpolate(0.0, 0.5, 0.5), 0.25));
    }

    #[test]
    fn test_matrix_bits_distinguish_signed_zero() {
        let a = Mat4::from_translation(Vec3::new(0.0, 0.0, 0.0));
        let b = Mat4::from_translation(Vec3::new(-0.0, 0.0, 0.0));
        assert_eq!(a, b);
        assert_ne!(matrix_bits(&a), matrix_bits(&b));
    }
}
