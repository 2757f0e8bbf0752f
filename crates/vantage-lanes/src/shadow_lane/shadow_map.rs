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

//! One light's shadow map: its face cameras and the redraw state machine.

use std::fmt;
use vantage_core::config::{OmniShadowMode, RendererConfig};
use vantage_core::math::{Mat4, Vec3};
use vantage_core::renderer::api::{TextureDescriptor, TextureFormat, TextureId, TextureUsage};
use vantage_core::renderer::light::{Light, LightId, LightKind};
use vantage_core::renderer::{Camera, GraphicsContext, ResourceError};

/// Near plane of perspective shadow cameras.
pub const SHADOW_NEAR: f32 = 0.1;

/// Projection used by a shadow map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShadowMapKind {
    /// Orthographic, for directional lights.
    Directional,
    /// Single perspective frustum, for spot lights.
    Perspective,
    /// Six 90° faces around an omni light.
    Cube,
    /// Two hemispheres around an omni light.
    Paraboloid,
}

impl ShadowMapKind {
    /// The kind a light needs.
    pub fn for_light(light: &Light, omni_mode: OmniShadowMode) -> Self {
        match (light.kind, omni_mode) {
            (LightKind::Directional { .. }, _) => ShadowMapKind::Directional,
            (LightKind::Spot { .. }, _) => ShadowMapKind::Perspective,
            (LightKind::Omni { .. }, OmniShadowMode::Cube) => ShadowMapKind::Cube,
            (LightKind::Omni { .. }, OmniShadowMode::Paraboloid) => ShadowMapKind::Paraboloid,
        }
    }

    /// Number of faces, one texture layer each.
    pub fn face_count(self) -> u32 {
        match self {
            ShadowMapKind::Directional | ShadowMapKind::Perspective => 1,
            ShadowMapKind::Cube => 6,
            ShadowMapKind::Paraboloid => 2,
        }
    }
}

/// Redraw state of a shadow face.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum UpdateState {
    /// Never rendered.
    #[default]
    Invalid,
    /// Rendered and unchanged since.
    Static,
    /// Inputs changed; redrawn every frame until a frame passes unchanged.
    Dynamic,
}

impl fmt::Display for UpdateState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            UpdateState::Invalid => "INVALID",
            UpdateState::Static => "STATIC",
            UpdateState::Dynamic => "DYNAMIC",
        })
    }
}

/// Outcome of advancing a face by one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FaceUpdate {
    /// State before.
    pub from: UpdateState,
    /// State after.
    pub to: UpdateState,
    /// The face must be rendered this frame.
    pub redraw: bool,
}

/// One rendered face of a shadow map.
#[derive(Debug, Clone)]
pub struct ShadowFace {
    camera: Camera,
    state: UpdateState,
    view_projection: Option<Mat4>,
    fingerprint: u64,
}

impl Default for ShadowFace {
    fn default() -> Self {
        Self {
            camera: Camera::default(),
            state: UpdateState::Invalid,
            view_projection: None,
            fingerprint: 0,
        }
    }
}

impl ShadowFace {
    /// Current state.
    pub fn state(&self) -> UpdateState {
        self.state
    }

    /// Camera of the last update.
    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    /// Advances the state machine.
    ///
    /// `fingerprint` covers the light placement and the static casters seen
    /// by `camera`. `actors_now` is true when the light includes actors this
    /// frame and at least one dynamic caster is inside the face frustum.
    pub fn advance(&mut self, camera: Camera, fingerprint: u64, actors_now: bool) -> FaceUpdate {
        let view_projection = *camera.view_projection();
        let from = self.state;
        let changed = from != UpdateState::Invalid
            && (self.view_projection != Some(view_projection) || self.fingerprint != fingerprint);
        let to = if changed || actors_now {
            UpdateState::Dynamic
        } else {
            UpdateState::Static
        };
        // A DYNAMIC face is redrawn once more after its inputs settle.
        let redraw = from != UpdateState::Static || changed || actors_now;

        self.state = to;
        self.view_projection = Some(view_projection);
        self.fingerprint = fingerprint;
        self.camera = camera;
        FaceUpdate { from, to, redraw }
    }

    /// Forces a redraw on the next update.
    pub fn invalidate(&mut self) {
        self.state = UpdateState::Invalid;
        self.view_projection = None;
    }
}

/// Shadow parameters shared by every map.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShadowSettings {
    /// Texels per side.
    pub resolution: u32,
    /// Cube or paraboloid omni shadows.
    pub omni_mode: OmniShadowMode,
    /// Half extent of box-less directional shadows.
    pub directional_extent: f32,
}

impl ShadowSettings {
    /// Reads the shadow parameters of a configuration.
    pub fn from_config(config: &RendererConfig) -> Self {
        Self {
            resolution: config.shadow_map_resolution.max(1),
            omni_mode: config.omni_shadow_mode,
            directional_extent: config.directional_shadow_extent,
        }
    }
}

impl Default for ShadowSettings {
    fn default() -> Self {
        Self::from_config(&RendererConfig::default())
    }
}

/// Maps clip space to texture space: x and y from -1..1 to 0..1, y flipped.
pub fn bias_matrix() -> Mat4 {
    Mat4::from_cols_array(&[
        0.5, 0.0, 0.0, 0.0, //
        0.0, -0.5, 0.0, 0.0, //
        0.0, 0.0, 1.0, 0.0, //
        0.5, 0.5, 0.0, 1.0,
    ])
}

fn up_for(direction: Vec3) -> Vec3 {
    if direction.y.abs() > 0.99 {
        Vec3::Z
    } else {
        Vec3::Y
    }
}

fn looking(mut camera: Camera, eye: Vec3, direction: Vec3) -> Camera {
    camera.look_at(eye, eye + direction, up_for(direction));
    camera.update();
    camera
}

/// Computes the camera of every face.
///
/// Box-less directional shadows follow `main`: they are centered on its eye,
/// snapped to whole texels so that small camera moves do not swim.
pub fn face_cameras(
    light: &Light,
    kind: ShadowMapKind,
    settings: &ShadowSettings,
    main: &Camera,
) -> Vec<Camera> {
    let dir = light.direction;
    match (kind, light.kind) {
        (
            _,
            LightKind::Directional {
                box_extents: Some(half),
            },
        ) => {
            let r = half.length().max(1e-3);
            let camera = Camera::orthographic(r, r, 0.0, 2.0 * r);
            vec![looking(camera, light.position - dir * r, dir)]
        }
        (_, LightKind::Directional { .. }) => {
            let extent = settings.directional_extent.max(1e-3);
            let up = up_for(dir);
            let right = dir.cross(up).normalize();
            let true_up = right.cross(dir);
            let texel = 2.0 * extent / settings.resolution as f32;
            let snap = |v: f32| (v / texel).round() * texel;
            let center = right * snap(main.eye.dot(right))
                + true_up * snap(main.eye.dot(true_up))
                + dir * main.eye.dot(dir);
            let camera = Camera::orthographic(extent, extent, 0.0, 4.0 * extent);
            vec![looking(camera, center - dir * 2.0 * extent, dir)]
        }
        (
            _,
            LightKind::Spot {
                range, outer_angle, ..
            },
        ) => {
            let fov = (outer_angle * 2.0).clamp(1.0, 170.0);
            let camera = Camera::perspective(fov, 1.0, SHADOW_NEAR, range.max(SHADOW_NEAR * 2.0));
            vec![looking(camera, light.position, dir)]
        }
        (ShadowMapKind::Paraboloid, LightKind::Omni { radius }) => [dir, -dir]
            .into_iter()
            .map(|d| looking(Camera::orthographic(radius, radius, 0.0, radius), light.position, d))
            .collect(),
        (_, LightKind::Omni { radius }) => [
            Vec3::X,
            Vec3::NEG_X,
            Vec3::Y,
            Vec3::NEG_Y,
            Vec3::Z,
            Vec3::NEG_Z,
        ]
        .into_iter()
        .map(|d| {
            let camera =
                Camera::perspective(90.0, 1.0, SHADOW_NEAR, radius.max(SHADOW_NEAR * 2.0));
            looking(camera, light.position, d)
        })
        .collect(),
    }
}

/// A light's depth target and per-face state.
#[derive(Debug)]
pub struct ShadowMap {
    light: LightId,
    kind: ShadowMapKind,
    texture: TextureId,
    faces: Vec<ShadowFace>,
}

impl ShadowMap {
    /// Creates the depth target, one layer per face.
    pub fn create(
        gfx: &GraphicsContext,
        light: &Light,
        settings: &ShadowSettings,
    ) -> Result<Self, ResourceError> {
        let kind = ShadowMapKind::for_light(light, settings.omni_mode);
        let label = format!("shadow map {}", light.id.0);
        let texture = gfx.create_texture(
            &TextureDescriptor::render_target(
                &label,
                settings.resolution,
                settings.resolution,
                TextureFormat::Depth32Float,
            )
            .with_layers(kind.face_count())
            .with_usage(TextureUsage::TEXTURE_BINDING),
        )?;
        log::debug!(
            "ShadowMap: created {kind:?} map for light {} ({} faces)",
            light.id.0,
            kind.face_count()
        );
        Ok(Self {
            light: light.id,
            kind,
            texture,
            faces: vec![ShadowFace::default(); kind.face_count() as usize],
        })
    }

    /// Owning light.
    pub fn light(&self) -> LightId {
        self.light
    }

    /// Projection kind.
    pub fn kind(&self) -> ShadowMapKind {
        self.kind
    }

    /// Depth texture, layered by face.
    pub fn texture(&self) -> TextureId {
        self.texture
    }

    /// Faces in layer order.
    pub fn faces(&self) -> &[ShadowFace] {
        &self.faces
    }

    /// Mutable face access.
    pub fn face_mut(&mut self, face: usize) -> Option<&mut ShadowFace> {
        self.faces.get_mut(face)
    }

    /// Summary state: INVALID if any face is, else DYNAMIC if any face is.
    pub fn state(&self) -> UpdateState {
        let states = self.faces.iter().map(ShadowFace::state);
        if states.clone().any(|s| s == UpdateState::Invalid) {
            UpdateState::Invalid
        } else if states.into_iter().any(|s| s == UpdateState::Dynamic) {
            UpdateState::Dynamic
        } else {
            UpdateState::Static
        }
    }

    /// Texture-space shadow matrices, one per face.
    pub fn shadow_matrices(&self) -> Vec<Mat4> {
        let bias = bias_matrix();
        self.faces
            .iter()
            .map(|f| bias * *f.camera().view_projection())
            .collect()
    }

    /// Forces every face to redraw.
    pub fn invalidate(&mut self) {
        self.faces.iter_mut().for_each(ShadowFace::invalidate);
    }

    /// Destroys the depth target.
    pub fn destroy(self, gfx: &GraphicsContext) {
        if let Err(e) = gfx.destroy_texture(self.texture) {
            log::warn!("ShadowMap: failed to destroy map of light {}: {e}", self.light.0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vantage_core::math::Vec4;

    #[test]
    fn test_state_history() {
        let mut face = ShadowFace::default();
        let cam = Camera::default();

        let first = face.advance(cam.clone(), 7, false);
        assert_eq!(
            first,
            FaceUpdate {
                from: UpdateState::Invalid,
                to: UpdateState::Static,
                redraw: true
            }
        );
        let second = face.advance(cam.clone(), 7, false);
        assert_eq!((second.from, second.to, second.redraw), (UpdateState::Static, UpdateState::Static, false));

        // An actor entering flips to DYNAMIC without the light moving.
        let third = face.advance(cam.clone(), 7, true);
        assert_eq!((third.to, third.redraw), (UpdateState::Dynamic, true));
        // Actor gone: one more redraw clears it, then STATIC.
        let fourth = face.advance(cam.clone(), 7, false);
        assert_eq!((fourth.from, fourth.to, fourth.redraw), (UpdateState::Dynamic, UpdateState::Static, true));
        let fifth = face.advance(cam, 7, false);
        assert!(!fifth.redraw);
    }

    #[test]
    fn test_fingerprint_or_camera_change_redraws() {
        let mut face = ShadowFace::default();
        let cam = Camera::default();
        face.advance(cam.clone(), 1, false);
        let moved_caster = face.advance(cam.clone(), 2, false);
        assert_eq!((moved_caster.to, moved_caster.redraw), (UpdateState::Dynamic, true));

        let mut other = cam.clone();
        other.look_at(Vec3::new(0.0, 5.0, 0.0), Vec3::ZERO, Vec3::Z);
        other.update();
        face.advance(cam, 2, false);
        let moved_light = face.advance(other, 2, false);
        assert_eq!(moved_light.to, UpdateState::Dynamic);
    }

    #[test]
    fn test_invalid_with_actors_goes_dynamic() {
        let mut face = ShadowFace::default();
        let update = face.advance(Camera::default(), 0, true);
        assert_eq!(update.to, UpdateState::Dynamic);
        face.invalidate();
        assert_eq!(face.state(), UpdateState::Invalid);
    }

    #[test]
    fn test_face_counts() {
        let omni = Light::omni(LightId(1), Vec3::ZERO, 5.0);
        let settings = ShadowSettings::default();
        let main = Camera::default();
        let cube = ShadowMapKind::for_light(&omni, OmniShadowMode::Cube);
        assert_eq!(face_cameras(&omni, cube, &settings, &main).len(), 6);
        let para = ShadowMapKind::for_light(&omni, OmniShadowMode::Paraboloid);
        assert_eq!(face_cameras(&omni, para, &settings, &main).len(), 2);
        let sun = Light::directional(LightId(2), Vec3::NEG_Y);
        assert_eq!(
            face_cameras(&sun, ShadowMapKind::Directional, &settings, &main).len(),
            1
        );
    }

    #[test]
    fn test_directional_snaps_to_texels() {
        let sun = Light::directional(LightId(0), Vec3::new(0.3, -1.0, 0.2));
        let settings = ShadowSettings {
            resolution: 1024,
            omni_mode: OmniShadowMode::Cube,
            directional_extent: 50.0,
        };
        let mut a = Camera::default();
        a.look_at(Vec3::new(1.0, 2.0, 3.0), Vec3::ZERO, Vec3::Y);
        let mut b = a.clone();
        b.eye += Vec3::new(0.001, 0.0, 0.0);
        let dir = sun.direction;
        let right = dir.cross(Vec3::Y).normalize();
        let up = right.cross(dir);
        let texel = 100.0 / 1024.0;
        for main in [&a, &b] {
            let face = &face_cameras(&sun, ShadowMapKind::Directional, &settings, main)[0];
            // The face center lands on whole texels across the light.
            for axis in [right, up] {
                let t = face.eye.dot(axis) / texel;
                assert!((t - t.round()).abs() < 1e-2, "{t} is not texel aligned");
            }
        }
    }

    #[test]
    fn test_bias_maps_clip_to_texture() {
        let bias = bias_matrix();
        let corner = bias * Vec4::new(-1.0, 1.0, 0.25, 1.0);
        assert_eq!(corner, Vec4::new(0.0, 0.0, 0.25, 1.0));
        let center = bias * Vec4::new(0.0, 0.0, 0.5, 1.0);
        assert_eq!(center, Vec4::new(0.5, 0.5, 0.5, 1.0));
    }
}
