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

//! Frustum culling of meshes, lights, probes and emitters.

use super::visible_set::{LodBucket, VisibleMesh, VisibleSet};
use std::cmp::Ordering;
use vantage_core::config::{LodDistances, RendererConfig};
use vantage_core::lane::{FrameFlags, Lane, LaneContext, LaneError, LaneKind, Ref, RenderLane};
use vantage_core::math::frustum::FrustumPlane;
use vantage_core::math::{Aabb, Overlap};
use vantage_core::renderer::{Camera, RenderFlags};
use vantage_core::scene::{MaterialClass, MeshRecord, Scene};

/// Tests scene content against a camera's six half-spaces.
///
/// The culler is stateless: the same camera and scene always produce the same
/// [`VisibleSet`], in the same order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrustumCuller {
    lod_thresholds_sq: (f32, f32),
    default_near: f32,
    default_far: f32,
    far_plane_padding: f32,
}

impl Default for FrustumCuller {
    fn default() -> Self {
        Self::new(&RendererConfig::default())
    }
}

impl FrustumCuller {
    /// Creates a culler with the configured LOD distances and clip defaults.
    pub fn new(config: &RendererConfig) -> Self {
        Self {
            lod_thresholds_sq: config.lod_distances.squared(),
            default_near: config.default_near,
            default_far: config.default_far,
            far_plane_padding: config.far_plane_padding,
        }
    }

    /// Replaces the LOD distances, e.g. with per-shot environment values.
    pub fn set_lod_distances(&mut self, distances: LodDistances) {
        self.lod_thresholds_sq = distances.squared();
    }

    /// Culls everything the main camera can see.
    pub fn cull(&self, camera: &Camera, scene: &Scene) -> VisibleSet {
        let mut set = VisibleSet::default();
        let mut depth = DepthBounds::default();

        for (key, mesh) in scene.meshes() {
            if !mesh.visible {
                continue;
            }
            let Some(entry) = self.classify_mesh(camera, key, mesh) else {
                continue;
            };
            depth.include(camera, &mesh.bounds);
            if mesh.dynamic {
                set.visible_actors += 1;
            }
            match mesh.material {
                MaterialClass::Opaque => set.opaque.push(entry),
                MaterialClass::AlphaTested => set.alpha_tested.push(entry),
                MaterialClass::Transparent => set.transparent.push(entry),
            }
            if mesh.emissive && mesh.material != MaterialClass::Transparent {
                set.emissive.push(entry);
            }
        }

        for light in scene.lights.iter().filter(|l| l.visible) {
            let visible = match light.bounds() {
                None => true,
                Some(bounds) => camera.frustum().classify_aabb(&bounds) != Overlap::Outside,
            };
            if visible {
                if let Some(bounds) = light.bounds() {
                    depth.extend_far(camera, &bounds);
                }
                set.lights.push(light.id);
                if light.lightshaft.is_some() {
                    set.lightshafts.push(light.id);
                }
            }
        }
        // Light shafts blend back to front.
        set.lightshafts.sort_by(|a, b| {
            let da = scene.light(*a).map_or(0.0, |l| (l.position - camera.eye).length_squared());
            let db = scene.light(*b).map_or(0.0, |l| (l.position - camera.eye).length_squared());
            db.total_cmp(&da)
        });

        for (index, probe) in scene.probes.iter().enumerate() {
            let bounds = probe.bounds();
            if camera.frustum().classify_aabb(&bounds) == Overlap::Outside {
                continue;
            }
            depth.extend_far(camera, &bounds);
            if Self::reaches_camera(camera, &bounds) {
                set.inside_probes.push(index);
            } else {
                set.outside_probes.push(index);
            }
        }

        for (index, emitter) in scene.emitters.iter().enumerate() {
            if emitter.particle_count > 0
                && camera.frustum().classify_aabb(&emitter.bounds) != Overlap::Outside
            {
                set.emitters.push(index);
            }
        }

        self.sort_bins(&mut set);
        (set.near, set.far) = depth.resolve(self);
        set
    }

    /// Culls the shadow casters seen by a light-space camera.
    ///
    /// Only opaque and alpha-tested meshes flagged `casts_shadow` are kept,
    /// or every one of them with [`RenderFlags::FORCE_SHADOW_CASTER_ALL`].
    pub fn cull_casters(&self, camera: &Camera, scene: &Scene, flags: RenderFlags) -> VisibleSet {
        let force_all = flags.contains(RenderFlags::FORCE_SHADOW_CASTER_ALL);
        let mut set = VisibleSet::default();
        let mut depth = DepthBounds::default();

        for (key, mesh) in scene.meshes() {
            let solid = matches!(
                mesh.material,
                MaterialClass::Opaque | MaterialClass::AlphaTested
            );
            if !mesh.visible || !solid || !(mesh.casts_shadow || force_all) {
                continue;
            }
            let Some(entry) = self.classify_mesh(camera, key, mesh) else {
                continue;
            };
            depth.include(camera, &mesh.bounds);
            if mesh.dynamic {
                set.visible_actors += 1;
            }
            if mesh.material == MaterialClass::AlphaTested {
                set.alpha_tested.push(entry);
            } else {
                set.opaque.push(entry);
            }
        }

        self.sort_bins(&mut set);
        (set.near, set.far) = depth.resolve(self);
        set
    }

    fn classify_mesh(
        &self,
        camera: &Camera,
        key: vantage_core::scene::MeshKey,
        mesh: &MeshRecord,
    ) -> Option<VisibleMesh> {
        let overlap = camera.frustum().classify_aabb(&mesh.bounds);
        if overlap == Overlap::Outside {
            return None;
        }
        let distance_sq = (mesh.bounds.center() - camera.eye).length_squared();
        Some(VisibleMesh {
            key,
            lod: LodBucket::from_distance_sq(distance_sq, self.lod_thresholds_sq),
            overlap,
            distance_sq,
        })
    }

    fn sort_bins(&self, set: &mut VisibleSet) {
        let front_to_back =
            |a: &VisibleMesh, b: &VisibleMesh| -> Ordering { a.distance_sq.total_cmp(&b.distance_sq) };
        set.opaque.sort_by(front_to_back);
        set.alpha_tested.sort_by(front_to_back);
        set.emissive.sort_by(front_to_back);
        set.transparent
            .sort_by(|a, b| b.distance_sq.total_cmp(&a.distance_sq));
    }

    /// A probe volume reaches the camera when the eye is inside it, or when
    /// the near plane cuts through it. Either way its front faces are clipped.
    fn reaches_camera(camera: &Camera, bounds: &Aabb) -> bool {
        if bounds.grown(camera.near).contains_point_strict(camera.eye) {
            return true;
        }
        let near = camera.frustum().plane(FrustumPlane::Near);
        bounds
            .corners()
            .iter()
            .any(|c| near.signed_distance(*c) <= 0.0)
    }
}

#[derive(Debug, Default)]
struct DepthBounds {
    range: Option<(f32, f32)>,
}

impl DepthBounds {
    fn include(&mut self, camera: &Camera, bounds: &Aabb) {
        let (mut lo, mut hi) = (f32::INFINITY, f32::NEG_INFINITY);
        for corner in bounds.corners() {
            let d = camera.view_depth(corner);
            lo = lo.min(d);
            hi = hi.max(d);
        }
        self.range = Some(match self.range {
            Some((a, b)) => (a.min(lo), b.max(hi)),
            None => (lo, hi),
        });
    }

    /// Pushes the far plane behind a light or probe volume. The back faces
    /// of those volumes are drawn, so they must not be clipped. Near stays
    /// driven by geometry.
    fn extend_far(&mut self, camera: &Camera, bounds: &Aabb) {
        let Some((lo, hi)) = self.range else {
            return;
        };
        let deepest = bounds
            .corners()
            .iter()
            .map(|c| camera.view_depth(*c))
            .fold(f32::NEG_INFINITY, f32::max);
        self.range = Some((lo, hi.max(deepest)));
    }

    fn resolve(&self, culler: &FrustumCuller) -> (f32, f32) {
        match self.range {
            Some((lo, hi)) => {
                let near = if lo > 0.0 { lo } else { culler.default_near };
                let far = (hi + culler.far_plane_padding).max(near + culler.far_plane_padding);
                (near, far)
            }
            None => (culler.default_near, culler.default_far),
        }
    }
}

/// Lane running the main-camera cull.
///
/// Reads `Ref<Scene>` and `Ref<Camera>`, inserts the resulting [`VisibleSet`].
#[derive(Debug, Default)]
pub struct FrustumCullLane {
    culler: std::sync::RwLock<FrustumCuller>,
}

impl FrustumCullLane {
    /// Creates the lane.
    pub fn new(config: &RendererConfig) -> Self {
        Self {
            culler: std::sync::RwLock::new(FrustumCuller::new(config)),
        }
    }

    /// Returns a copy of the culler, shared with the shadow stage.
    pub fn culler(&self) -> FrustumCuller {
        *self.culler.read().unwrap()
    }

    /// Replaces the LOD distances.
    pub fn set_lod_distances(&self, distances: LodDistances) {
        self.culler.write().unwrap().set_lod_distances(distances);
    }
}

impl Lane for FrustumCullLane {
    fn strategy_name(&self) -> &'static str {
        "FrustumCull"
    }

    fn lane_kind(&self) -> LaneKind {
        LaneKind::Cull
    }

    fn estimate_cost(&self, ctx: &LaneContext) -> f32 {
        ctx.get::<Ref<Scene>>()
            .map_or(1.0, |scene| scene.get().mesh_count() as f32 * 0.0001)
    }

    fn execute(&self, ctx: &mut LaneContext) -> Result<(), LaneError> {
        let set = {
            let scene = ctx.require::<Ref<Scene>>("Ref<Scene>")?.get();
            let camera = ctx.require::<Ref<Camera>>("Ref<Camera>")?.get();
            self.culler().cull(camera, scene)
        };
        log::trace!(
            "FrustumCull: {} meshes, {} lights, {} actors, depth {:.2}..{:.2}",
            set.mesh_count(),
            set.lights.len(),
            set.visible_actors,
            set.near,
            set.far
        );
        if !ctx.contains::<FrameFlags>() {
            log::debug!("FrustumCull: no FrameFlags in context");
        }
        ctx.insert(set);
        Ok(())
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
}

impl RenderLane for FrustumCullLane {}

#[cfg(test)]
mod tests {
    use super::*;
    use vantage_core::math::{Mat4, Vec3};
    use vantage_core::renderer::api::{BufferId, IndexFormat};
    use vantage_core::renderer::light::Light;
    use vantage_core::scene::{EnvProbe, MeshBuffers};

    fn buffers() -> MeshBuffers {
        MeshBuffers {
            vertex: BufferId(1),
            index: BufferId(2),
            index_format: IndexFormat::Uint16,
            index_count: 36,
        }
    }

    fn cube_at(p: Vec3) -> MeshRecord {
        MeshRecord::new(
            Aabb::from_center_half_extents(Vec3::ZERO, Vec3::splat(0.5)),
            Mat4::from_translation(p),
            buffers(),
        )
    }

    fn camera() -> Camera {
        let mut cam = Camera::perspective(60.0, 1.0, 0.1, 500.0);
        cam.look_at(Vec3::ZERO, Vec3::NEG_Z, Vec3::Y);
        cam.update();
        cam
    }

    #[test]
    fn test_excluded_meshes_are_fully_outside() {
        let mut scene = Scene::new();
        for x in -6..=6 {
            for z in -6..=6 {
                scene.add_mesh(cube_at(Vec3::new(x as f32 * 7.0, 0.0, z as f32 * 7.0)));
            }
        }
        let cam = camera();
        let set = FrustumCuller::default().cull(&cam, &scene);
        assert!(!set.opaque.is_empty());
        for (key, mesh) in scene.meshes() {
            let separated = cam.frustum().separating_plane(&mesh.bounds).is_some();
            assert_eq!(set.contains_mesh(key), !separated);
        }
    }

    #[test]
    fn test_bins_sort_and_lod() {
        let mut scene = Scene::new();
        let far = scene.add_mesh(cube_at(Vec3::new(0.0, 0.0, -120.0)));
        let near = scene.add_mesh(cube_at(Vec3::new(0.0, 0.0, -10.0)));
        let glass_near = scene.add_mesh(
            cube_at(Vec3::new(1.0, 0.0, -5.0)).with_material(MaterialClass::Transparent),
        );
        let glass_far = scene.add_mesh(
            cube_at(Vec3::new(1.0, 0.0, -60.0)).with_material(MaterialClass::Transparent),
        );
        let lamp = scene.add_mesh(cube_at(Vec3::new(-1.0, 0.0, -70.0)).emissive());

        let set = FrustumCuller::default().cull(&camera(), &scene);
        let opaque: Vec<_> = set.opaque.iter().map(|m| m.key).collect();
        assert_eq!(opaque, vec![near, lamp, far]);
        let glass: Vec<_> = set.transparent.iter().map(|m| m.key).collect();
        assert_eq!(glass, vec![glass_far, glass_near]);
        assert_eq!(set.emissive.len(), 1);
        assert_eq!(set.emissive[0].key, lamp);
        assert_eq!(set.opaque[0].lod, LodBucket::Near);
        assert_eq!(set.opaque[1].lod, LodBucket::Mid);
        assert_eq!(set.opaque[2].lod, LodBucket::Far);
    }

    #[test]
    fn test_depth_range_is_tightened() {
        let mut scene = Scene::new();
        scene.add_mesh(cube_at(Vec3::new(0.0, 0.0, -10.0)));
        scene.add_mesh(cube_at(Vec3::new(0.0, 0.0, -30.0)));
        let set = FrustumCuller::default().cull(&camera(), &scene);
        assert!((set.near - 9.5).abs() < 1e-4);
        assert!((set.far - 35.5).abs() < 1e-4);

        let empty = FrustumCuller::default().cull(&camera(), &Scene::new());
        assert_eq!((empty.near, empty.far), (0.1, 2000.0));
    }

    #[test]
    fn test_far_plane_covers_light_and_probe_volumes() {
        let mut scene = Scene::new();
        scene.add_mesh(cube_at(Vec3::new(0.0, 0.0, -10.0)));
        scene.add_light(Light::omni(
            vantage_core::renderer::LightId(7),
            Vec3::new(0.0, 0.0, -12.0),
            20.0,
        ));
        let culler = FrustumCuller::default();
        let set = culler.cull(&camera(), &scene);
        assert_eq!(set.lights, vec![vantage_core::renderer::LightId(7)]);
        assert!((set.near - 9.5).abs() < 1e-4);
        assert!(set.far >= 32.0 + RendererConfig::default().far_plane_padding - 1e-3);

        let mut scene = Scene::new();
        scene.add_mesh(cube_at(Vec3::new(0.0, 0.0, -10.0)));
        scene.probes.push(EnvProbe {
            index: 0,
            center: Vec3::ZERO,
            half_extents: Vec3::splat(40.0),
        });
        let set = culler.cull(&camera(), &scene);
        assert_eq!(set.inside_probes, vec![0]);
        assert!((set.near - 9.5).abs() < 1e-4);
        assert!(set.far >= 40.0);
    }

    #[test]
    fn test_unbounded_directional_always_visible() {
        let mut scene = Scene::new();
        scene.add_light(Light::directional(vantage_core::renderer::LightId(3), Vec3::NEG_Y));
        scene.add_light(Light::omni(
            vantage_core::renderer::LightId(4),
            Vec3::new(0.0, 0.0, 50.0),
            2.0,
        ));
        let set = FrustumCuller::default().cull(&camera(), &scene);
        assert_eq!(set.lights, vec![vantage_core::renderer::LightId(3)]);
    }

    #[test]
    fn test_probe_inside_outside_split() {
        let mut scene = Scene::new();
        scene.probes.push(EnvProbe {
            index: 0,
            center: Vec3::ZERO,
            half_extents: Vec3::splat(4.0),
        });
        scene.probes.push(EnvProbe {
            index: 1,
            center: Vec3::new(0.0, 0.0, -20.0),
            half_extents: Vec3::splat(4.0),
        });
        let set = FrustumCuller::default().cull(&camera(), &scene);
        assert_eq!(set.inside_probes, vec![0]);
        assert_eq!(set.outside_probes, vec![1]);
    }

    #[test]
    fn test_caster_filter() {
        let mut scene = Scene::new();
        let mut quiet = cube_at(Vec3::new(0.0, 0.0, -10.0));
        quiet.casts_shadow = false;
        let quiet = scene.add_mesh(quiet);
        let actor = scene.add_mesh(cube_at(Vec3::new(0.0, 0.0, -12.0)).dynamic());
        scene.add_mesh(cube_at(Vec3::new(0.0, 0.0, -14.0)).with_material(MaterialClass::Transparent));

        let culler = FrustumCuller::default();
        let set = culler.cull_casters(&camera(), &scene, RenderFlags::empty());
        assert_eq!(set.opaque.len(), 1);
        assert_eq!(set.opaque[0].key, actor);
        assert_eq!(set.visible_actors, 1);

        let all = culler.cull_casters(&camera(), &scene, RenderFlags::FORCE_SHADOW_CASTER_ALL);
        assert!(all.contains_mesh(quiet));
        assert_eq!(all.mesh_count(), 2);
    }

    #[test]
    fn test_cull_is_deterministic() {
        let mut scene = Scene::new();
        for i in 0..20 {
            scene.add_mesh(cube_at(Vec3::new((i % 5) as f32, 0.0, -5.0 - (i / 5) as f32)));
        }
        let culler = FrustumCuller::default();
        assert_eq!(culler.cull(&camera(), &scene), culler.cull(&camera(), &scene));
    }
}
