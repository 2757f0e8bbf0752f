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

//! The lighting lane: accumulates direct, indirect and image-based light into
//! an HDR target from the G-buffer.
//!
//! Bounded lights are drawn as proxy volumes with front faces culled and a
//! `GreaterEqual` depth test, so a pixel is shaded only where scene depth lies
//! inside the volume and the light still works with the eye inside it.

use super::volumes::{box_model, cone_model, sphere_model, LightVolumes, VolumeMesh};
use super::{
    create_target, encoder, graphics, init_error, release_textures, viewport, StageError,
    DEPTH_FORMAT, FULLSCREEN_VERTEX,
};
use crate::cull_lane::VisibleSet;
use crate::shadow_lane::{ShadowBinding, ShadowLookup, ShadowMapKind};
use bytemuck::{Pod, Zeroable};
use std::sync::{Mutex, RwLock};
use vantage_core::lane::{
    FrameFlags, GBufferTargets, Lane, LaneContext, LaneError, LaneKind, LightingTarget, Ref,
    RenderLane, SceneColor,
};
use vantage_core::math::{LinearRgba, Mat4};
use vantage_core::renderer::api::{
    BlendMode, BufferId, CompareFunction, CullMode, DepthState, PrimitiveTopology,
    RenderPassColorAttachment, RenderPassDepthAttachment, RenderPassDescriptor,
    RenderPipelineDescriptor, RenderPipelineId, ResourceState, ShaderDefines,
    ShaderResourceUsage, ShaderStages, ShaderVariantKey, TextureFormat, TextureId,
};
use vantage_core::renderer::{Camera, GraphicsContext, LightId, LightKind, RenderFlags, ResourceError};
use vantage_core::scene::Scene;
use vantage_core::EnvironmentValues;

/// Format of the lighting target.
pub const LIGHTING_FORMAT: TextureFormat = TextureFormat::Rgba16Float;

/// Shape used to rasterize a light.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LightVolume {
    /// A fullscreen triangle, for unbounded directional lights.
    Fullscreen,
    /// Omni lights.
    Sphere,
    /// Spot lights.
    Cone,
    /// Box-restricted directional lights.
    Box,
}

/// One light accumulated this frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LightDraw {
    /// The light.
    pub light: LightId,
    /// How it was rasterized.
    pub volume: LightVolume,
    /// Its shadow map was sampled.
    pub shadowed: bool,
}

/// One irradiance probe accumulated this frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeDraw {
    /// Index into the scene's probes.
    pub probe: usize,
    /// The probe volume reaches the camera.
    pub inside: bool,
    /// Faces culled.
    pub cull: CullMode,
    /// Depth test.
    pub compare: CompareFunction,
}

/// What the lighting lane drew during the last frame.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LightingReport {
    /// Direct lights, in visible order.
    pub lights: Vec<LightDraw>,
    /// Irradiance probes, inside ones first.
    pub probes: Vec<ProbeDraw>,
    /// The image-based pass ran.
    pub ibl: bool,
}

/// Cull mode and depth test of a probe box.
///
/// From inside, the near faces are behind the eye: the far faces are drawn
/// and shade pixels in front of them. From outside, the near faces are drawn
/// and shade pixels behind them. Swapping the two double-shades or drops the
/// seam between adjacent probes.
pub fn probe_pairing(inside: bool) -> (CullMode, CompareFunction) {
    if inside {
        (CullMode::Front, CompareFunction::GreaterEqual)
    } else {
        (CullMode::Back, CompareFunction::Less)
    }
}

/// Most faces a shadow map has (a cube).
pub const MAX_SHADOW_FACES: usize = 6;

/// Per-light uniform block.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct LightUniforms {
    /// Volume model-view-projection; identity for fullscreen lights.
    pub mvp: [[f32; 4]; 4],
    /// Reconstructs world positions from depth.
    pub inverse_view_projection: [[f32; 4]; 4],
    /// Shadow matrix of every face, in layer order. Unused faces are identity.
    pub shadow: [[[f32; 4]; 4]; MAX_SHADOW_FACES],
    /// Face count in `x`, zero without shadows.
    pub shadow_faces: [u32; 4],
    /// Position and radius or range.
    pub position: [f32; 4],
    /// Direction and cosine of the outer angle.
    pub direction: [f32; 4],
    /// Color premultiplied by intensity, cosine of the inner angle in `w`.
    pub color: [f32; 4],
    /// Eye position.
    pub eye: [f32; 4],
}

/// Packs a binding's face matrices for upload.
pub fn shadow_matrices(binding: Option<&ShadowBinding>) -> [[[f32; 4]; 4]; MAX_SHADOW_FACES] {
    let mut packed = [Mat4::IDENTITY.to_cols_array_2d(); MAX_SHADOW_FACES];
    let matrices = binding.map_or(&[][..], |b| b.matrices.as_slice());
    for (slot, matrix) in packed.iter_mut().zip(matrices) {
        *slot = matrix.to_cols_array_2d();
    }
    packed
}

/// Per-probe uniform block.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct ProbeUniforms {
    /// Box model-view-projection.
    pub mvp: [[f32; 4]; 4],
    /// Reconstructs world positions from depth.
    pub inverse_view_projection: [[f32; 4]; 4],
    /// Probe center and SH index.
    pub center: [f32; 4],
    /// Half extents and indirect factor.
    pub half_extents: [f32; 4],
    /// Sky color times intensity.
    pub sky: [f32; 4],
}

/// Uniform block of the image-based pass.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct IblUniforms {
    /// Reconstructs world positions from depth.
    pub inverse_view_projection: [[f32; 4]; 4],
    /// Eye position.
    pub eye: [f32; 4],
    /// Diffuse and reflection intensity.
    pub intensity: [f32; 4],
}

struct Draw {
    pipeline: RenderPipelineId,
    mesh: Option<VolumeMesh>,
    extra_textures: Vec<(u32, TextureId)>,
    buffer: Option<BufferId>,
    uniforms: Vec<u8>,
}

fn gbuffer_usage(extra: u32) -> ShaderResourceUsage {
    ShaderResourceUsage {
        sampled_textures: 4 + extra,
        storage_resources: 0,
        uniform_buffers: 1,
    }
}

/// Accumulates lighting.
///
/// Expects [`GBufferTargets`], `Ref<Scene>`, `Ref<Camera>`, [`VisibleSet`]
/// and [`FrameFlags`]; reads [`ShadowLookup`] and `Ref<EnvironmentValues>`
/// when present. Inserts [`LightingTarget`] and starts the post chain with
/// [`SceneColor`].
#[derive(Debug, Default)]
pub struct LightingLane {
    target: RwLock<Option<TextureId>>,
    volumes: RwLock<Option<LightVolumes>>,
    report: Mutex<LightingReport>,
}

impl LightingLane {
    /// Creates the lane. The target and proxy meshes are created on initialization.
    pub fn new() -> Self {
        Self::default()
    }

    /// The lighting target.
    pub fn target(&self) -> Option<TextureId> {
        *self.target.read().unwrap()
    }

    /// What the last frame drew.
    pub fn last_report(&self) -> LightingReport {
        self.report.lock().unwrap().clone()
    }

    fn volume_pipeline(
        gfx: &GraphicsContext,
        vertex: &str,
        fragment: &str,
        defines: ShaderDefines,
        extra_textures: u32,
        cull_mode: CullMode,
        compare: CompareFunction,
    ) -> Result<RenderPipelineId, ResourceError> {
        let program = gfx.shader_program(
            &ShaderVariantKey::new(ShaderStages::graphics(vertex, fragment), defines),
            gbuffer_usage(extra_textures),
        )?;
        gfx.render_pipeline(&RenderPipelineDescriptor {
            label: Some(fragment.trim_end_matches(".frag").replace('_', " ")),
            program,
            topology: PrimitiveTopology::TriangleList,
            cull_mode,
            depth: Some(DepthState::test(compare)),
            blend: BlendMode::Additive,
            color_formats: vec![LIGHTING_FORMAT],
            depth_format: Some(DEPTH_FORMAT),
        })
    }

    fn fullscreen_pipeline(
        gfx: &GraphicsContext,
        label: &str,
        fragment: &str,
        defines: ShaderDefines,
        extra_textures: u32,
    ) -> Result<RenderPipelineId, ResourceError> {
        let program = gfx.shader_program(
            &ShaderVariantKey::new(ShaderStages::graphics(FULLSCREEN_VERTEX, fragment), defines),
            gbuffer_usage(extra_textures),
        )?;
        Ok(gfx.render_pipeline(
            &RenderPipelineDescriptor::fullscreen(label, program, LIGHTING_FORMAT, BlendMode::Additive)
                .with_depth(DEPTH_FORMAT, DepthState::test(CompareFunction::Always)),
        )?)
    }

    #[allow(clippy::too_many_arguments)]
    fn light_draws(
        gfx: &GraphicsContext,
        scene: &Scene,
        camera: &Camera,
        visible: &VisibleSet,
        volumes: &LightVolumes,
        shadows: Option<&ShadowLookup>,
        flags: RenderFlags,
        report: &mut LightingReport,
    ) -> Result<Vec<Draw>, StageError> {
        let view_projection = *camera.view_projection();
        let inverse = camera.inverse_view_projection().to_cols_array_2d();
        let use_shadows = flags.contains(RenderFlags::DIRECT_SHADOWS);
        let mut draws = Vec::with_capacity(visible.lights.len());

        for light in visible.lights.iter().filter_map(|id| scene.light(*id)) {
            let (volume, model, extent, cones) = match light.kind {
                LightKind::Directional { box_extents: None } => {
                    (LightVolume::Fullscreen, None, 0.0, (1.0, 1.0))
                }
                LightKind::Directional {
                    box_extents: Some(half),
                } => (
                    LightVolume::Box,
                    Some(box_model(light.position, half)),
                    half.length(),
                    (1.0, 1.0),
                ),
                LightKind::Omni { radius } => (
                    LightVolume::Sphere,
                    Some(sphere_model(light.position, radius)),
                    radius,
                    (1.0, 1.0),
                ),
                LightKind::Spot {
                    range,
                    outer_angle,
                    inner_angle,
                } => (
                    LightVolume::Cone,
                    Some(cone_model(light.position, light.direction, range, outer_angle)),
                    range,
                    (
                        outer_angle.to_radians().cos(),
                        inner_angle.min(outer_angle).to_radians().cos(),
                    ),
                ),
            };

            let binding = if use_shadows && light.casts_shadow {
                shadows.and_then(|s| s.get(light.id))
            } else {
                None
            };
            let defines = ShaderDefines::new()
                .define_if("LIGHT_DIRECTIONAL", matches!(volume, LightVolume::Fullscreen | LightVolume::Box))
                .define_if("LIGHT_OMNI", volume == LightVolume::Sphere)
                .define_if("LIGHT_SPOT", volume == LightVolume::Cone)
                .define_if("LIGHT_BOX", volume == LightVolume::Box)
                .define_if("SHADOW_CASTER", binding.is_some())
                .define_if(
                    "PARABOLOID",
                    binding.is_some_and(|b| b.kind == ShadowMapKind::Paraboloid),
                );
            let extra = u32::from(binding.is_some());
            let pipeline = match volume {
                LightVolume::Fullscreen => {
                    Self::fullscreen_pipeline(gfx, "deferred light", "deferred_light.frag", defines, extra)?
                }
                _ => Self::volume_pipeline(
                    gfx,
                    "light_volume.vert",
                    "deferred_light.frag",
                    defines,
                    extra,
                    CullMode::Front,
                    CompareFunction::GreaterEqual,
                )?,
            };
            let mesh = match volume {
                LightVolume::Fullscreen => None,
                LightVolume::Sphere => Some(volumes.sphere),
                LightVolume::Cone => Some(volumes.cone),
                LightVolume::Box => Some(volumes.unit_box),
            };
            let color = light.color.rgb_vec3() * light.intensity;
            let uniforms = LightUniforms {
                mvp: model.map_or(Mat4::IDENTITY, |m| view_projection * m).to_cols_array_2d(),
                inverse_view_projection: inverse,
                shadow: shadow_matrices(binding),
                shadow_faces: [binding.map_or(0, |b| b.matrices.len().min(MAX_SHADOW_FACES) as u32), 0, 0, 0],
                position: light.position.extend(extent).to_array(),
                direction: light.direction.extend(cones.0).to_array(),
                color: color.extend(cones.1).to_array(),
                eye: camera.eye.extend(1.0).to_array(),
            };
            draws.push(Draw {
                pipeline,
                mesh,
                extra_textures: binding.map(|b| vec![(4, b.texture)]).unwrap_or_default(),
                buffer: None,
                uniforms: bytemuck::bytes_of(&uniforms).to_vec(),
            });
            report.lights.push(LightDraw {
                light: light.id,
                volume,
                shadowed: binding.is_some(),
            });
        }
        Ok(draws)
    }

    #[allow(clippy::too_many_arguments)]
    fn probe_draws(
        gfx: &GraphicsContext,
        scene: &Scene,
        camera: &Camera,
        visible: &VisibleSet,
        volumes: &LightVolumes,
        sh_buffer: BufferId,
        env: &EnvironmentValues,
        flags: RenderFlags,
        report: &mut LightingReport,
    ) -> Result<Vec<Draw>, StageError> {
        let view_projection = *camera.view_projection();
        let inverse = camera.inverse_view_projection().to_cols_array_2d();
        let sky = env.sky_color.rgb_vec3() * env.sky_intensity;
        let inside = visible.inside_probes.iter().map(|i| (*i, true));
        let outside = visible.outside_probes.iter().map(|i| (*i, false));
        let mut draws = Vec::new();

        for (index, is_inside) in inside.chain(outside) {
            let Some(probe) = scene.probes.get(index) else {
                continue;
            };
            let (cull, compare) = probe_pairing(is_inside);
            let defines = ShaderDefines::new()
                .define_if("GI_USE_TEXTURE_SH_ATLAS", flags.contains(RenderFlags::GI_USE_TEXTURE_SH_ATLAS));
            let pipeline = Self::volume_pipeline(
                gfx,
                "light_volume.vert",
                "irradiance_probe.frag",
                defines,
                0,
                cull,
                compare,
            )?;
            let uniforms = ProbeUniforms {
                mvp: (view_projection * box_model(probe.center, probe.half_extents)).to_cols_array_2d(),
                inverse_view_projection: inverse,
                center: probe.center.extend(probe.index as f32).to_array(),
                half_extents: probe.half_extents.extend(env.indirect_factor).to_array(),
                sky: sky.extend(1.0).to_array(),
            };
            draws.push(Draw {
                pipeline,
                mesh: Some(volumes.unit_box),
                extra_textures: Vec::new(),
                buffer: Some(sh_buffer),
                uniforms: bytemuck::bytes_of(&uniforms).to_vec(),
            });
            report.probes.push(ProbeDraw {
                probe: index,
                inside: is_inside,
                cull,
                compare,
            });
        }
        Ok(draws)
    }

    fn record(&self, ctx: &LaneContext) -> Result<TextureId, LaneError> {
        let gfx = graphics(ctx)?;
        let target = self.target().ok_or(StageError::MissingTarget("LightingLane"))?;
        let volumes = (*self.volumes.read().unwrap()).ok_or(StageError::MissingTarget("LightingLane"))?;
        let flags = ctx.require::<FrameFlags>("FrameFlags")?.0;
        let gbuffer = *ctx.require::<GBufferTargets>("GBufferTargets")?;
        let scene = ctx.require::<Ref<Scene>>("Ref<Scene>")?.get();
        let camera = ctx.require::<Ref<Camera>>("Ref<Camera>")?.get();
        let visible = ctx.require::<VisibleSet>("VisibleSet")?;
        let default_env = EnvironmentValues::default();
        let env = ctx
            .get::<Ref<EnvironmentValues>>()
            .map_or(&default_env, |e| e.get());
        let shadows = ctx.get::<ShadowLookup>();
        let encoder = encoder(ctx)?;

        let mut report = LightingReport::default();
        let mut draws = Vec::new();
        if flags.contains(RenderFlags::DIRECT_LIGHTING) {
            draws.extend(Self::light_draws(
                &gfx, scene, camera, visible, &volumes, shadows, flags, &mut report,
            )?);
        }
        if flags.contains(RenderFlags::IRRADIANCE_LIGHTING) {
            if let Some(sh) = scene.probe_sh_buffer {
                draws.extend(Self::probe_draws(
                    &gfx, scene, camera, visible, &volumes, sh, env, flags, &mut report,
                )?);
            }
        }
        if flags.contains(RenderFlags::IBL) {
            if let Some(ibl) = scene.ibl {
                let pipeline = Self::fullscreen_pipeline(&gfx, "ibl", "ibl.frag", ShaderDefines::new(), 2)
                    .map_err(StageError::from)?;
                let uniforms = IblUniforms {
                    inverse_view_projection: camera.inverse_view_projection().to_cols_array_2d(),
                    eye: camera.eye.extend(1.0).to_array(),
                    intensity: [env.ibl_diffuse_intensity, env.ibl_reflection_intensity, 0.0, 0.0],
                };
                draws.push(Draw {
                    pipeline,
                    mesh: None,
                    extra_textures: vec![(4, ibl.prefiltered), (5, ibl.brdf_lut)],
                    buffer: None,
                    uniforms: bytemuck::bytes_of(&uniforms).to_vec(),
                });
                report.ibl = true;
            }
        }

        {
            let ledger = gfx.ledger();
            for texture in [gbuffer.albedo, gbuffer.normal, gbuffer.specular, gbuffer.depth] {
                ledger.ensure_readable(texture).map_err(StageError::from)?;
            }
        }
        {
            let mut ledger = gfx.ledger();
            let mut extra: Vec<TextureId> = draws
                .iter()
                .flat_map(|d| d.extra_textures.iter().map(|(_, t)| *t))
                .filter(|t| ledger.is_registered(*t))
                .collect();
            extra.sort();
            extra.dedup();
            let mut batch = ledger.batch();
            for texture in extra {
                batch = batch.texture(texture, ResourceState::ShaderRead);
            }
            batch
                .texture(target, ResourceState::RenderTarget)
                .submit(encoder)
                .map_err(StageError::from)?;
        }

        {
            let colors = [RenderPassColorAttachment::cleared(target, LinearRgba::TRANSPARENT)];
            let mut pass = encoder.begin_render_pass(&RenderPassDescriptor {
                label: Some("lighting"),
                color_attachments: &colors,
                depth_attachment: Some(RenderPassDepthAttachment::read_only(gbuffer.depth)),
            });
            for draw in &draws {
                pass.set_pipeline(draw.pipeline);
                pass.bind_texture(0, gbuffer.albedo);
                pass.bind_texture(1, gbuffer.normal);
                pass.bind_texture(2, gbuffer.specular);
                pass.bind_texture(3, gbuffer.depth);
                for (slot, texture) in &draw.extra_textures {
                    pass.bind_texture(*slot, *texture);
                }
                if let Some(buffer) = draw.buffer {
                    pass.bind_buffer(0, buffer);
                }
                pass.set_uniforms(&draw.uniforms);
                match draw.mesh {
                    Some(mesh) => {
                        pass.set_vertex_buffer(0, mesh.vertex, 0);
                        pass.set_index_buffer(mesh.index, 0, mesh.index_format());
                        pass.draw_indexed(0..mesh.index_count, 0, 0..1);
                    }
                    None => pass.draw(0..3, 0..1),
                }
            }
        }

        gfx.ledger()
            .batch()
            .texture(target, ResourceState::ShaderRead)
            .submit(encoder)
            .map_err(StageError::from)?;

        log::trace!(
            "LightingLane: {} lights, {} probes, ibl {}",
            report.lights.len(),
            report.probes.len(),
            report.ibl
        );
        *self.report.lock().unwrap() = report;
        Ok(target)
    }

    fn release(&self, gfx: &GraphicsContext) {
        if let Some(target) = self.target.write().unwrap().take() {
            release_textures(gfx, "LightingLane", [target]);
        }
        if let Some(volumes) = self.volumes.write().unwrap().take() {
            volumes.destroy(gfx);
        }
    }
}

impl Lane for LightingLane {
    fn strategy_name(&self) -> &'static str {
        "DeferredLighting"
    }

    fn lane_kind(&self) -> LaneKind {
        LaneKind::Lighting
    }

    fn estimate_cost(&self, ctx: &LaneContext) -> f32 {
        ctx.get::<VisibleSet>()
            .map_or(1.0, |v| (v.lights.len() + v.inside_probes.len() + v.outside_probes.len()) as f32 * 0.05)
    }

    fn on_initialize(&self, ctx: &mut LaneContext) -> Result<(), LaneError> {
        let gfx = graphics(ctx)?;
        let size = viewport(ctx)?;
        self.release(&gfx);
        let target = create_target(&gfx, "lighting", size, LIGHTING_FORMAT).map_err(init_error)?;
        *self.target.write().unwrap() = Some(target);
        let volumes = LightVolumes::create(&gfx).map_err(init_error)?;
        *self.volumes.write().unwrap() = Some(volumes);
        Self::fullscreen_pipeline(
            &gfx,
            "deferred light",
            "deferred_light.frag",
            ShaderDefines::new().define("LIGHT_DIRECTIONAL"),
            0,
        )
        .map_err(init_error)?;
        Ok(())
    }

    fn execute(&self, ctx: &mut LaneContext) -> Result<(), LaneError> {
        let target = self.record(ctx)?;
        ctx.insert(LightingTarget(target));
        ctx.insert(SceneColor(target));
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

impl RenderLane for LightingLane {
    fn on_viewport_resized(&self, ctx: &mut LaneContext) -> Result<(), LaneError> {
        let gfx = graphics(ctx)?;
        let size = viewport(ctx)?;
        if let Some(old) = self.target.write().unwrap().take() {
            release_textures(&gfx, "LightingLane", [old]);
        }
        let target = create_target(&gfx, "lighting", size, LIGHTING_FORMAT).map_err(init_error)?;
        *self.target.write().unwrap() = Some(target);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probe_pairing_flips_with_side() {
        assert_eq!(
            probe_pairing(true),
            (CullMode::Front, CompareFunction::GreaterEqual)
        );
        assert_eq!(probe_pairing(false), (CullMode::Back, CompareFunction::Less));
    }

    #[test]
    fn test_every_shadow_face_is_uploaded() {
        let faces: Vec<Mat4> = (0..6)
            .map(|i| Mat4::from_translation(vantage_core::math::Vec3::splat(i as f32)))
            .collect();
        let cube = ShadowBinding {
            light: LightId(2),
            kind: ShadowMapKind::Cube,
            texture: TextureId(5),
            matrices: faces.clone(),
        };
        let packed = shadow_matrices(Some(&cube));
        for (slot, face) in packed.iter().zip(&faces) {
            assert_eq!(*slot, face.to_cols_array_2d());
        }

        let paraboloid = ShadowBinding {
            kind: ShadowMapKind::Paraboloid,
            matrices: faces[..2].to_vec(),
            ..cube
        };
        let packed = shadow_matrices(Some(&paraboloid));
        assert_eq!(packed[1], faces[1].to_cols_array_2d());
        assert_eq!(packed[2], Mat4::IDENTITY.to_cols_array_2d());
        assert_eq!(shadow_matrices(None), [Mat4::IDENTITY.to_cols_array_2d(); MAX_SHADOW_FACES]);
    }

    #[test]
    fn test_uniform_blocks_are_aligned() {
        assert_eq!(std::mem::size_of::<LightUniforms>() % 16, 0);
        assert_eq!(std::mem::size_of::<ProbeUniforms>() % 16, 0);
        assert_eq!(std::mem::size_of::<IblUniforms>() % 16, 0);
    }
}
