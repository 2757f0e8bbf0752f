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

//! Defines light types for the rendering system.
//!
//! Lights are a single tagged type: one [`Light`] struct with a [`LightKind`]
//! carrying the kind-specific shape. Stages match on the kind once per draw.

use crate::math::{degrees_to_radians, Aabb, LinearRgba, Vec3};
use serde::{Deserialize, Serialize};

/// Stable identifier of a light within a scene.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LightId(pub u32);

/// Shape of a light's influence.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum LightKind {
    /// Parallel rays along the light direction.
    ///
    /// With `box_extents`, the light only affects an oriented box centered on
    /// its position and is drawn as a volume. Without, it covers the whole
    /// screen.
    Directional {
        /// Half extents of the influence box.
        box_extents: Option<Vec3>,
    },
    /// Point light with a finite radius.
    Omni {
        /// Influence radius.
        radius: f32,
    },
    /// Cone of light.
    Spot {
        /// Cone length.
        range: f32,
        /// Half angle of the outer cone, in degrees.
        outer_angle: f32,
        /// Half angle of the full-intensity inner cone, in degrees.
        inner_angle: f32,
    },
}

/// Volumetric light-shaft settings attached to a light.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lightshaft {
    /// Number of view-aligned slices drawn through the light frustum.
    pub slices: u32,
}

/// A light source.
///
/// # Examples
///
/// ```
/// use vantage_core::renderer::light::{Light, LightId};
/// use vantage_core::math::Vec3;
///
/// let lamp = Light::omni(LightId(1), Vec3::new(0.0, 3.0, 0.0), 8.0).with_shadow();
/// assert!(lamp.casts_shadow);
/// assert!(lamp.bounds().is_some());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Light {
    /// Identifier.
    pub id: LightId,
    /// Shape.
    pub kind: LightKind,
    /// World position. For box-less directional lights, only used by light shafts.
    pub position: Vec3,
    /// Unit direction the light points to.
    pub direction: Vec3,
    /// Linear color.
    pub color: LinearRgba,
    /// Intensity multiplier.
    pub intensity: f32,
    /// Renders a shadow map.
    pub casts_shadow: bool,
    /// Hidden lights are skipped by culling.
    pub visible: bool,
    /// Optional light shaft.
    pub lightshaft: Option<Lightshaft>,
}

impl Light {
    fn new(id: LightId, kind: LightKind, position: Vec3, direction: Vec3) -> Self {
        Self {
            id,
            kind,
            position,
            direction: direction.normalize_or(Vec3::NEG_Y),
            color: LinearRgba::WHITE,
            intensity: 1.0,
            casts_shadow: false,
            visible: true,
            lightshaft: None,
        }
    }

    /// A directional light covering the whole screen.
    pub fn directional(id: LightId, direction: Vec3) -> Self {
        Self::new(
            id,
            LightKind::Directional { box_extents: None },
            Vec3::ZERO,
            direction,
        )
    }

    /// A directional light restricted to a box.
    pub fn directional_box(id: LightId, center: Vec3, direction: Vec3, half_extents: Vec3) -> Self {
        Self::new(
            id,
            LightKind::Directional {
                box_extents: Some(half_extents.abs()),
            },
            center,
            direction,
        )
    }

    /// A point light.
    pub fn omni(id: LightId, position: Vec3, radius: f32) -> Self {
        Self::new(id, LightKind::Omni { radius }, position, Vec3::NEG_Y)
    }

    /// A spot light.
    pub fn spot(
        id: LightId,
        position: Vec3,
        direction: Vec3,
        range: f32,
        outer_angle: f32,
        inner_angle: f32,
    ) -> Self {
        Self::new(
            id,
            LightKind::Spot {
                range,
                outer_angle,
                inner_angle: inner_angle.min(outer_angle),
            },
            position,
            direction,
        )
    }

    /// Builder-style: enables shadow casting.
    pub fn with_shadow(mut self) -> Self {
        self.casts_shadow = true;
        self
    }

    /// Builder-style: sets color and intensity.
    pub fn with_color(mut self, color: LinearRgba, intensity: f32) -> Self {
        self.color = color;
        self.intensity = intensity;
        self
    }

    /// Builder-style: attaches a light shaft.
    pub fn with_lightshaft(mut self, slices: u32) -> Self {
        self.lightshaft = Some(Lightshaft { slices });
        self
    }

    /// World bounds of the light's influence, or `None` when it is unbounded.
    pub fn bounds(&self) -> Option<Aabb> {
        match self.kind {
            LightKind::Directional { box_extents: None } => None,
            LightKind::Directional {
                box_extents: Some(half),
            } => {
                // Box is oriented along the light direction; bound it conservatively.
                Some(Aabb::from_center_half_extents(
                    self.position,
                    Vec3::splat(half.length()),
                ))
            }
            LightKind::Omni { radius } => Some(Aabb::from_sphere(self.position, radius)),
            LightKind::Spot {
                range, outer_angle, ..
            } => {
                let d = self.direction;
                let cap_center = self.position + d * range;
                let cap_radius = range * degrees_to_radians(outer_angle.min(89.0)).tan();
                let extent = Vec3::new(
                    (1.0 - d.x * d.x).max(0.0).sqrt(),
                    (1.0 - d.y * d.y).max(0.0).sqrt(),
                    (1.0 - d.z * d.z).max(0.0).sqrt(),
                ) * cap_radius;
                let cap = Aabb::from_center_half_extents(cap_center, extent);
                Some(cap.merge(&Aabb::from_min_max(self.position, self.position)))
            }
        }
    }

    /// Returns `true` for directional lights without a box.
    pub fn is_unbounded(&self) -> bool {
        matches!(self.kind, LightKind::Directional { box_extents: None })
    }

    /// Bit pattern of everything that places the light, for change detection.
    pub fn placement_bits(&self) -> [u32; 9] {
        let (a, b, c) = match self.kind {
            LightKind::Directional { box_extents } => {
                let e = box_extents.unwrap_or(Vec3::ZERO);
                (e.x, e.y, e.z)
            }
            LightKind::Omni { radius } => (radius, 0.0, 0.0),
            LightKind::Spot {
                range,
                outer_angle,
                inner_angle,
            } => (range, outer_angle, inner_angle),
        };
        [
            self.position.x.to_bits(),
            self.position.y.to_bits(),
            self.position.z.to_bits(),
            self.direction.x.to_bits(),
            self.direction.y.to_bits(),
            self.direction.z.to_bits(),
            a.to_bits(),
            b.to_bits(),
            c.to_bits(),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_unbounded_directional() {
        let sun = Light::directional(LightId(0), Vec3::new(0.0, -2.0, 0.0));
        assert!(sun.bounds().is_none());
        assert!(sun.is_unbounded());
        assert_relative_eq!(sun.direction.y, -1.0);
    }

    #[test]
    fn test_spot_bounds_cover_cone() {
        let spot = Light::spot(LightId(2), Vec3::ZERO, Vec3::NEG_Z, 10.0, 45.0, 30.0);
        let b = spot.bounds().unwrap();
        assert!(b.contains_point(Vec3::ZERO));
        assert!(b.contains_point(Vec3::new(9.9, 0.0, -10.0)));
        assert_relative_eq!(b.min.z, -10.0, epsilon = 1e-5);
        assert!(!b.contains_point(Vec3::new(0.0, 0.0, 1.0)));
    }

    #[test]
    fn test_placement_bits_track_moves() {
        let a = Light::omni(LightId(1), Vec3::ONE, 4.0);
        let mut b = a.clone();
        assert_eq!(a.placement_bits(), b.placement_bits());
        b.position.x += 0.001;
        assert_ne!(a.placement_bits(), b.placement_bits());
    }
}
