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

//! The shadow lane: keeps one [`ShadowMap`] per shadow-casting light and
//! redraws only the faces whose inputs changed.

use super::shadow_map::{face_cameras, ShadowMap, ShadowMapKind, ShadowSettings, UpdateState};
use crate::cull_lane::{FrustumCuller, VisibleSet};
use crate::render_lane::{encoder, graphics, init_error, material_defines, StageError};
use bytemuck::{Pod, Zeroable};
use std::collections::{BTreeMap, BTreeSet};
use std::hash::{BuildHasher, Hash, Hasher};
use std::sync::{Mutex, RwLock};
use vantage_core::config::{LodDistances, RendererConfig};
use vantage_core::lane::{
    DegradedFeatures, Feature, FrameFlags, Lane, LaneContext, LaneError, LaneKind, Ref,
    RenderLane,
};
use vantage_core::math::{Mat4, Vec3};
use vantage_core::renderer::api::{
    BlendMode, BufferId, CullMode, DepthState, IndexFormat, PrimitiveTopology,
    RenderPassDepthAttachment, RenderPassDescriptor, RenderPipelineDescriptor, RenderPipelineId,
    ResourceState, ShaderDefines, ShaderResourceUsage, ShaderStages, ShaderVariantKey,
    TextureFormat, TextureId,
};
use vantage_core::renderer::light::{Light, LightId};
use vantage_core::renderer::{Camera, CommandEncoder, GraphicsContext, RenderFlags, ResourceError};
use vantage_core::scene::Scene;

/// One face's state change during the last update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShadowTransition {
    /// Owning light.
    pub light: LightId,
    /// Face index, which is also the texture layer.
    pub face: u32,
    /// State before.
    pub from: UpdateState,
    /// State after.
    pub to: UpdateState,
    /// The face was rendered.
    pub redrawn: bool,
}

/// What the lighting pass needs to sample one light's shadows.
#[derive(Debug, Clone, PartialEq)]
pub struct ShadowBinding {
    /// Owning light.
    pub light: LightId,
    /// Projection kind.
    pub kind: ShadowMapKind,
    /// Layered depth texture, in `ShaderRead`.
    pub texture: TextureId,
    /// Texture-space matrices, one per face.
    pub matrices: Vec<Mat4>,
}

/// Context key: shadow maps ready for sampling this frame.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ShadowLookup(pub Vec<ShadowBinding>);

impl ShadowLookup {
    /// The binding of `light`, if it has a rendered map.
    pub fn get(&self, light: LightId) -> Option<&ShadowBinding> {
        self.0.iter().find(|b| b.light == light)
    }
}

/// Per-draw uniform block of the shadow-caster program.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct ShadowCasterUniforms {
    /// Face view-projection times world.
    pub mvp: [[f32; 4]; 4],
    /// Object to world.
    pub world: [[f32; 4]; 4],
    /// Light position and far distance, for paraboloid and linear depth.
    pub light: [f32; 4],
}

struct CasterDraw {
    pipeline: RenderPipelineId,
    uniforms: ShadowCasterUniforms,
    vertex: BufferId,
    index: BufferId,
    index_format: IndexFormat,
    index_count: u32,
    instances: u32,
}

/// Hashes everything static that a face depends on: the light placement and
/// the static casters the face frustum sees.
///
/// Seeds are fixed so the value is stable across runs.
pub fn caster_fingerprint(light: &Light, scene: &Scene, casters: &VisibleSet) -> u64 {
    let mut hasher = ahash::RandomState::with_seeds(
        0x7661_6e74_6167_6530,
        0x5348_4144_4f57_0001,
        0x1f2e_3d4c_5b6a_7988,
        0x0123_4567_89ab_cdef,
    )
    .build_hasher();
    light.placement_bits().hash(&mut hasher);
    for entry in casters.solid_meshes() {
        let Some(mesh) = scene.mesh(entry.key) else {
            continue;
        };
        if mesh.dynamic {
            continue;
        }
        entry.key.hash(&mut hasher);
        mesh.transform_bits().hash(&mut hasher);
    }
    hasher.finish()
}

/// Maintains the shadow maps of visible shadow-casting lights.
///
/// Expects `Ref<Scene>`, `Ref<Camera>`, [`VisibleSet`] and [`FrameFlags`].
/// Inserts a [`ShadowLookup`]. A light whose map cannot be created has its
/// shadows degraded for the session instead of failing the frame.
#[derive(Debug)]
pub struct ShadowMapSet {
    settings: ShadowSettings,
    culler: RwLock<FrustumCuller>,
    maps: Mutex<BTreeMap<LightId, ShadowMap>>,
    include_actors: Mutex<BTreeSet<LightId>>,
    transitions: Mutex<Vec<ShadowTransition>>,
}

impl Default for ShadowMapSet {
    fn default() -> Self {
        Self::new(&RendererConfig::default())
    }
}

impl ShadowMapSet {
    /// Creates the lane. Maps are created on first use.
    pub fn new(config: &RendererConfig) -> Self {
        Self {
            settings: ShadowSettings::from_config(config),
            culler: RwLock::new(FrustumCuller::new(config)),
            maps: Mutex::new(BTreeMap::new()),
            include_actors: Mutex::new(BTreeSet::new()),
            transitions: Mutex::new(Vec::new()),
        }
    }

    /// Shadow parameters.
    pub fn settings(&self) -> &ShadowSettings {
        &self.settings
    }

    /// Replaces the LOD distances used to pick caster meshes.
    pub fn set_lod_distances(&self, distances: LodDistances) {
        self.culler.write().unwrap().set_lod_distances(distances);
    }

    /// Returns a copy of the caster culler.
    pub fn culler(&self) -> FrustumCuller {
        *self.culler.read().unwrap()
    }

    /// Requests that dynamic casters be drawn into `light`'s map during the
    /// next update. The request is cleared once the light is updated.
    pub fn include_actors(&self, light: LightId) {
        self.include_actors.lock().unwrap().insert(light);
    }

    /// Summary state of a light's map.
    pub fn state(&self, light: LightId) -> Option<UpdateState> {
        self.maps.lock().unwrap().get(&light).map(ShadowMap::state)
    }

    /// State of every face of a light's map.
    pub fn face_states(&self, light: LightId) -> Vec<UpdateState> {
        self.maps
            .lock()
            .unwrap()
            .get(&light)
            .map(|m| m.faces().iter().map(|f| f.state()).collect())
            .unwrap_or_default()
    }

    /// Depth texture of a light's map.
    pub fn texture(&self, light: LightId) -> Option<TextureId> {
        self.maps.lock().unwrap().get(&light).map(ShadowMap::texture)
    }

    /// Number of live maps.
    pub fn map_count(&self) -> usize {
        self.maps.lock().unwrap().len()
    }

    /// Face transitions of the last update, in update order.
    pub fn last_transitions(&self) -> Vec<ShadowTransition> {
        self.transitions.lock().unwrap().clone()
    }

    /// Forces every face of every map to redraw.
    pub fn invalidate_all(&self) {
        for map in self.maps.lock().unwrap().values_mut() {
            map.invalidate();
        }
    }

    fn caster_pipeline(
        gfx: &GraphicsContext,
        defines: ShaderDefines,
        cull_mode: CullMode,
    ) -> Result<RenderPipelineId, ResourceError> {
        let program = gfx.shader_program(
            &ShaderVariantKey::new(
                ShaderStages::graphics("shadow_caster.vert", "shadow_caster.frag"),
                defines,
            ),
            ShaderResourceUsage {
                sampled_textures: 1,
                storage_resources: 0,
                uniform_buffers: 1,
            },
        )?;
        gfx.render_pipeline(&RenderPipelineDescriptor {
            label: Some("shadow caster".to_owned()),
            program,
            topology: PrimitiveTopology::TriangleList,
            cull_mode,
            depth: Some(DepthState::WRITE_LESS),
            blend: BlendMode::Opaque,
            color_formats: Vec::new(),
            depth_format: Some(TextureFormat::Depth32Float),
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn render_face(
        gfx: &GraphicsContext,
        encoder: &mut dyn CommandEncoder,
        scene: &Scene,
        light: &Light,
        map: &ShadowMap,
        face: u32,
        camera: &Camera,
        casters: &VisibleSet,
        flags: RenderFlags,
    ) -> Result<(), StageError> {
        let paraboloid = map.kind() == ShadowMapKind::Paraboloid;
        let view_projection = *camera.view_projection();
        let mut draws = Vec::with_capacity(casters.opaque.len() + casters.alpha_tested.len());
        for entry in casters.solid_meshes() {
            let Some(mesh) = scene.mesh(entry.key) else {
                continue;
            };
            let extension = scene.extension(entry.key);
            let defines = material_defines(mesh, extension, flags)
                .define("SHADOW_CASTER")
                .define_if("PARABOLOID", paraboloid);
            let cull_mode = if paraboloid || mesh.two_sided {
                CullMode::None
            } else {
                CullMode::Front
            };
            draws.push(CasterDraw {
                pipeline: Self::caster_pipeline(gfx, defines, cull_mode)?,
                uniforms: ShadowCasterUniforms {
                    mvp: (view_projection * mesh.world).to_cols_array_2d(),
                    world: mesh.world.to_cols_array_2d(),
                    light: light.position.extend(camera.far).to_array(),
                },
                vertex: mesh.buffers.vertex,
                index: mesh.buffers.index,
                index_format: mesh.buffers.index_format,
                index_count: mesh.buffers.index_count,
                instances: extension.map_or(1, |e| e.instance_count.max(1)),
            });
        }

        gfx.ledger()
            .batch()
            .texture(map.texture(), ResourceState::DepthWrite)
            .submit(encoder)?;
        let mut depth = RenderPassDepthAttachment::cleared(map.texture(), 1.0);
        depth.layer = face;
        let mut pass = encoder.begin_render_pass(&RenderPassDescriptor {
            label: Some("shadow face"),
            color_attachments: &[],
            depth_attachment: Some(depth),
        });
        for draw in &draws {
            pass.set_pipeline(draw.pipeline);
            pass.set_uniforms(bytemuck::bytes_of(&draw.uniforms));
            pass.set_vertex_buffer(0, draw.vertex, 0);
            pass.set_index_buffer(draw.index, 0, draw.index_format);
            pass.draw_indexed(0..draw.index_count, 0, 0..draw.instances);
        }
        Ok(())
    }

    fn update(
        &self,
        ctx: &LaneContext,
        degraded: &mut DegradedFeatures,
    ) -> Result<ShadowLookup, LaneError> {
        let gfx = graphics(ctx)?;
        let flags = ctx.require::<FrameFlags>("FrameFlags")?.0;
        let scene = ctx.require::<Ref<Scene>>("Ref<Scene>")?.get();
        let camera = ctx.require::<Ref<Camera>>("Ref<Camera>")?.get();
        let visible = ctx.require::<VisibleSet>("VisibleSet")?;
        let encoder = encoder(ctx)?;
        let culler = *self.culler.read().unwrap();

        let lights: Vec<&Light> = visible
            .lights
            .iter()
            .filter_map(|id| scene.light(*id))
            .filter(|l| l.casts_shadow && !degraded.contains(Feature::ShadowMap(l.id)))
            .collect();
        {
            let mut include = self.include_actors.lock().unwrap();
            include.extend(lights.iter().map(|l| l.id));
        }

        let mut maps = self.maps.lock().unwrap();
        let mut transitions = Vec::new();
        let mut redrawn = 0usize;
        for light in lights {
            if !maps.contains_key(&light.id) {
                match ShadowMap::create(&gfx, light, &self.settings) {
                    Ok(map) => {
                        maps.insert(light.id, map);
                    }
                    Err(e) => {
                        degraded.degrade(Feature::ShadowMap(light.id), &e);
                        continue;
                    }
                }
            }
            let Some(map) = maps.get_mut(&light.id) else {
                continue;
            };
            let include = self.include_actors.lock().unwrap().remove(&light.id);
            let cameras = face_cameras(light, map.kind(), &self.settings, camera);
            for (index, face_camera) in cameras.into_iter().enumerate() {
                let casters = culler.cull_casters(&face_camera, scene, flags);
                let actors_now = include && casters.visible_actors > 0;
                let fingerprint = caster_fingerprint(light, scene, &casters);
                let Some(face) = map.face_mut(index) else {
                    break;
                };
                let update = face.advance(face_camera.clone(), fingerprint, actors_now);
                if update.redraw {
                    Self::render_face(
                        &gfx,
                        encoder,
                        scene,
                        light,
                        map,
                        index as u32,
                        &face_camera,
                        &casters,
                        flags,
                    )?;
                    redrawn += 1;
                }
                transitions.push(ShadowTransition {
                    light: light.id,
                    face: index as u32,
                    from: update.from,
                    to: update.to,
                    redrawn: update.redraw,
                });
            }
        }

        let mut bindings = Vec::with_capacity(maps.len());
        {
            let mut ledger = gfx.ledger();
            let mut batch = ledger.batch();
            for map in maps.values() {
                batch = batch.texture(map.texture(), ResourceState::ShaderRead);
            }
            batch.submit(encoder).map_err(StageError::from)?;
        }
        for map in maps.values() {
            if map.state() == UpdateState::Invalid {
                continue;
            }
            bindings.push(ShadowBinding {
                light: map.light(),
                kind: map.kind(),
                texture: map.texture(),
                matrices: map.shadow_matrices(),
            });
        }

        log::trace!(
            "ShadowMapSet: {} faces updated, {redrawn} redrawn",
            transitions.len()
        );
        *self.transitions.lock().unwrap() = transitions;
        Ok(ShadowLookup(bindings))
    }

    fn release(&self, gfx: &GraphicsContext) {
        let maps = std::mem::take(&mut *self.maps.lock().unwrap());
        for map in maps.into_values() {
            map.destroy(gfx);
        }
    }
}

impl Lane for ShadowMapSet {
    fn strategy_name(&self) -> &'static str {
        "ShadowMapSet"
    }

    fn lane_kind(&self) -> LaneKind {
        LaneKind::Shadow
    }

    fn estimate_cost(&self, ctx: &LaneContext) -> f32 {
        ctx.get::<VisibleSet>()
            .map_or(1.0, |v| v.lights.len() as f32 * 0.1)
    }

    fn on_initialize(&self, ctx: &mut LaneContext) -> Result<(), LaneError> {
        let gfx = graphics(ctx)?;
        Self::caster_pipeline(&gfx, ShaderDefines::new().define("SHADOW_CASTER"), CullMode::Front)
            .map_err(init_error)?;
        Ok(())
    }

    fn execute(&self, ctx: &mut LaneContext) -> Result<(), LaneError> {
        let mut degraded = ctx.remove::<DegradedFeatures>().unwrap_or_default();
        let result = self.update(ctx, &mut degraded);
        ctx.insert(degraded);
        ctx.insert(result?);
        Ok(())
    }

    fn on_shutdown(&self, ctx: &mut LaneContext) {
        if let Ok(gfx) = graphics(ctx) {
            self.release(&gfx);
        }
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
}

impl RenderLane for ShadowMapSet {
    fn on_viewport_resized(&self, _ctx: &mut LaneContext) -> Result<(), LaneError> {
        self.invalidate_all();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vantage_core::math::Aabb;
    use vantage_core::scene::{MeshBuffers, MeshRecord};

    fn buffers() -> MeshBuffers {
        MeshBuffers {
            vertex: BufferId(1),
            index: BufferId(2),
            index_format: IndexFormat::Uint16,
            index_count: 36,
        }
    }

    fn scene_with_box(at: Vec3) -> Scene {
        let mut scene = Scene::new();
        scene.add_mesh(MeshRecord::new(
            Aabb::from_center_half_extents(Vec3::ZERO, Vec3::ONE),
            Mat4::from_translation(at),
            buffers(),
        ));
        scene
    }

    #[test]
    fn test_fingerprint_tracks_static_casters() {
        let light = Light::directional(LightId(0), Vec3::NEG_Y);
        let culler = FrustumCuller::default();
        let mut camera = Camera::orthographic(20.0, 20.0, 0.0, 100.0);
        camera.look_at(Vec3::new(0.0, 50.0, 0.0), Vec3::ZERO, Vec3::Z);
        camera.update();

        let a = scene_with_box(Vec3::ZERO);
        let b = scene_with_box(Vec3::new(1.0, 0.0, 0.0));
        let fa = caster_fingerprint(&light, &a, &culler.cull_casters(&camera, &a, RenderFlags::empty()));
        let fa2 = caster_fingerprint(&light, &a, &culler.cull_casters(&camera, &a, RenderFlags::empty()));
        let fb = caster_fingerprint(&light, &b, &culler.cull_casters(&camera, &b, RenderFlags::empty()));
        assert_eq!(fa, fa2);
        assert_ne!(fa, fb);
    }

    #[test]
    fn test_fingerprint_ignores_actors() {
        let light = Light::directional(LightId(0), Vec3::NEG_Y);
        let culler = FrustumCuller::default();
        let mut camera = Camera::orthographic(20.0, 20.0, 0.0, 100.0);
        camera.look_at(Vec3::new(0.0, 50.0, 0.0), Vec3::ZERO, Vec3::Z);
        camera.update();

        let mut scene = scene_with_box(Vec3::ZERO);
        let before = caster_fingerprint(&light, &scene, &culler.cull_casters(&camera, &scene, RenderFlags::empty()));
        let actor = scene.add_mesh(
            MeshRecord::new(
                Aabb::from_center_half_extents(Vec3::ZERO, Vec3::ONE),
                Mat4::from_translation(Vec3::new(3.0, 0.0, 0.0)),
                buffers(),
            )
            .dynamic(),
        );
        scene.set_mesh_transform(actor, Mat4::from_translation(Vec3::new(4.0, 0.0, 0.0)));
        let after = caster_fingerprint(&light, &scene, &culler.cull_casters(&camera, &scene, RenderFlags::empty()));
        assert_eq!(before, after);
    }

    #[test]
    fn test_lod_distances_reach_the_caster_culler() {
        let set = ShadowMapSet::default();
        assert_eq!(set.culler(), FrustumCuller::default());

        let near = LodDistances { lod1: 5.0, lod2: 10.0 };
        set.set_lod_distances(near);
        let mut expected = FrustumCuller::default();
        expected.set_lod_distances(near);
        assert_eq!(set.culler(), expected);
        assert_ne!(set.culler(), FrustumCuller::default());
    }

    #[test]
    fn test_lookup_by_light() {
        let lookup = ShadowLookup(vec![ShadowBinding {
            light: LightId(3),
            kind: ShadowMapKind::Cube,
            texture: TextureId(9),
            matrices: vec![Mat4::IDENTITY; 6],
        }]);
        assert_eq!(lookup.get(LightId(3)).map(|b| b.texture), Some(TextureId(9)));
        assert!(lookup.get(LightId(4)).is_none());
    }
}
