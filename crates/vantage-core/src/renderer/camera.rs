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

//! Cameras for the main view and for shadow rendering.

use crate::math::{degrees_to_radians, Frustum, Mat4, Vec2, Vec3};

/// Projection model of a [`Camera`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Projection {
    /// Perspective with a vertical field of view.
    Perspective {
        /// Vertical field of view, in degrees.
        fov_y_degrees: f32,
        /// Width over height.
        aspect: f32,
    },
    /// Orthographic box centered on the view axis.
    Orthographic {
        /// Half the box width.
        half_width: f32,
        /// Half the box height.
        half_height: f32,
    },
}

/// A camera with derived matrices, frustum planes and depth linearization.
///
/// Mutate the placement or projection, then call [`Camera::update`] once.
/// Between updates the derived fields are stale.
#[derive(Debug, Clone, PartialEq)]
pub struct Camera {
    /// Projection model.
    pub projection_kind: Projection,
    /// Near clip distance.
    pub near: f32,
    /// Far clip distance.
    pub far: f32,
    /// Eye position.
    pub eye: Vec3,
    /// Point looked at.
    pub target: Vec3,
    /// Up hint.
    pub up: Vec3,
    /// Camera-cut index. A change between frames is a cut.
    pub shot: u32,

    view: Mat4,
    projection: Mat4,
    view_projection: Mat4,
    inverse_view_projection: Mat4,
    forward: Vec3,
    frustum: Frustum,
    depth_linearize: Vec2,
}

impl Camera {
    /// A perspective camera at the origin looking down `-Z`.
    pub fn perspective(fov_y_degrees: f32, aspect: f32, near: f32, far: f32) -> Self {
        Self::with_projection(
            Projection::Perspective {
                fov_y_degrees,
                aspect,
            },
            near,
            far,
        )
    }

    /// An orthographic camera at the origin looking down `-Z`.
    pub fn orthographic(half_width: f32, half_height: f32, near: f32, far: f32) -> Self {
        Self::with_projection(
            Projection::Orthographic {
                half_width,
                half_height,
            },
            near,
            far,
        )
    }

    fn with_projection(projection_kind: Projection, near: f32, far: f32) -> Self {
        let mut camera = Self {
            projection_kind,
            near,
            far,
            eye: Vec3::ZERO,
            target: Vec3::NEG_Z,
            up: Vec3::Y,
            shot: 0,
            view: Mat4::IDENTITY,
            projection: Mat4::IDENTITY,
            view_projection: Mat4::IDENTITY,
            inverse_view_projection: Mat4::IDENTITY,
            forward: Vec3::NEG_Z,
            frustum: Frustum::from_view_projection(&Mat4::IDENTITY),
            depth_linearize: Vec2::ZERO,
        };
        camera.update();
        camera
    }

    /// Places the camera. Picks another up vector if `up` is parallel to the view direction.
    pub fn look_at(&mut self, eye: Vec3, target: Vec3, up: Vec3) {
        let dir = (target - eye).normalize_or_zero();
        self.eye = eye;
        self.target = target;
        self.up = if dir.cross(up).length_squared() < 1e-8 {
            if dir.y.abs() < 0.99 {
                Vec3::Y
            } else {
                Vec3::Z
            }
        } else {
            up
        };
    }

    /// Changes the clip range and re-derives everything.
    pub fn set_near_far(&mut self, near: f32, far: f32) {
        self.near = near;
        self.far = far;
        self.update();
    }

    /// Sets the aspect ratio of a perspective camera.
    pub fn set_aspect(&mut self, aspect: f32) {
        if let Projection::Perspective { aspect: a, .. } = &mut self.projection_kind {
            *a = aspect;
        }
    }

    /// Recomputes view, projection, their product and inverse, forward,
    /// frustum planes and depth-linearization factors.
    pub fn update(&mut self) {
        let near = self.near.max(1e-4);
        let far = self.far.max(near + 1e-3);
        self.view = Mat4::look_at_rh(self.eye, self.target, self.up);
        self.projection = match self.projection_kind {
            Projection::Perspective {
                fov_y_degrees,
                aspect,
            } => Mat4::perspective_rh(degrees_to_radians(fov_y_degrees), aspect.max(1e-4), near, far),
            Projection::Orthographic {
                half_width,
                half_height,
            } => Mat4::orthographic_rh(
                -half_width,
                half_width,
                -half_height,
                half_height,
                near,
                far,
            ),
        };
        self.view_projection = self.projection * self.view;
        self.inverse_view_projection = self.view_projection.inverse();
        self.forward = (self.target - self.eye).normalize_or(Vec3::NEG_Z);
        self.frustum = Frustum::from_view_projection(&self.view_projection);
        self.depth_linearize = match self.projection_kind {
            Projection::Perspective { .. } => {
                Vec2::new(near * far / (far - near), far / (far - near))
            }
            Projection::Orthographic { .. } => Vec2::new(far - near, near),
        };
    }

    /// World-to-view matrix.
    pub fn view(&self) -> &Mat4 {
        &self.view
    }

    /// View-to-clip matrix.
    pub fn projection(&self) -> &Mat4 {
        &self.projection
    }

    /// World-to-clip matrix.
    pub fn view_projection(&self) -> &Mat4 {
        &self.view_projection
    }

    /// Clip-to-world matrix.
    pub fn inverse_view_projection(&self) -> &Mat4 {
        &self.inverse_view_projection
    }

    /// Unit view direction.
    pub fn forward(&self) -> Vec3 {
        self.forward
    }

    /// The six clip planes.
    pub fn frustum(&self) -> &Frustum {
        &self.frustum
    }

    /// Factors uploaded to shaders that reconstruct view distance from depth.
    pub fn depth_linearize(&self) -> Vec2 {
        self.depth_linearize
    }

    /// Returns `true` for orthographic cameras.
    pub fn is_orthographic(&self) -> bool {
        matches!(self.projection_kind, Projection::Orthographic { .. })
    }

    /// Distance of `point` along the view direction.
    #[inline]
    pub fn view_depth(&self, point: Vec3) -> f32 {
        (point - self.eye).dot(self.forward)
    }

    /// Maps a `0..1` depth-buffer value to view distance.
    pub fn linearize_depth(&self, depth: f32) -> f32 {
        let k = self.depth_linearize;
        match self.projection_kind {
            Projection::Perspective { .. } => k.x / (k.y - depth),
            Projection::Orthographic { .. } => k.y + depth * k.x,
        }
    }
}

impl Default for Camera {
    fn default() -> Self {
        Self::perspective(60.0, 16.0 / 9.0, 0.1, 2000.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::Vec4;
    use approx::assert_relative_eq;

    fn project_depth(camera: &Camera, distance: f32) -> f32 {
        let p = camera.eye + camera.forward() * distance;
        let clip = *camera.view_projection() * Vec4::new(p.x, p.y, p.z, 1.0);
        clip.z / clip.w
    }

    #[test]
    fn test_perspective_linearize_round_trip() {
        let mut cam = Camera::perspective(60.0, 1.5, 0.5, 200.0);
        cam.look_at(Vec3::new(1.0, 2.0, 3.0), Vec3::new(4.0, 2.0, -8.0), Vec3::Y);
        cam.update();
        assert_relative_eq!(cam.linearize_depth(0.0), 0.5, epsilon = 1e-4);
        assert_relative_eq!(cam.linearize_depth(1.0), 200.0, max_relative = 1e-3);
        let d = project_depth(&cam, 25.0);
        assert_relative_eq!(cam.linearize_depth(d), 25.0, max_relative = 1e-3);
    }

    #[test]
    fn test_orthographic_linearize() {
        let mut cam = Camera::orthographic(10.0, 10.0, 1.0, 101.0);
        cam.update();
        assert!(cam.is_orthographic());
        assert_relative_eq!(cam.linearize_depth(0.5), 51.0, epsilon = 1e-4);
        let d = project_depth(&cam, 26.0);
        assert_relative_eq!(d, 0.25, epsilon = 1e-5);
    }

    #[test]
    fn test_look_at_parallel_up_is_repaired() {
        let mut cam = Camera::default();
        cam.look_at(Vec3::ZERO, Vec3::new(0.0, -10.0, 0.0), Vec3::Y);
        cam.update();
        assert!(cam.view().is_finite());
        assert_relative_eq!(cam.forward().y, -1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_set_near_far_rebuilds_frustum() {
        let mut cam = Camera::default();
        cam.set_near_far(1.0, 10.0);
        let far_plane = cam.frustum().planes[5];
        assert!(far_plane.signed_distance(Vec3::new(0.0, 0.0, -11.0)) < 0.0);
        assert!(far_plane.signed_distance(Vec3::new(0.0, 0.0, -9.0)) > 0.0);
    }
}
