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

//! Half-resolution transients: light shafts and particles rendered at half
//! resolution, then upsampled against full-resolution depth.

use super::{degrade, is_degraded, ping_pong, scene_color, PostStage, HDR_FORMAT};
use crate::cull_lane::VisibleSet;
use crate::render_lane::{
    create_target, encoder, fullscreen_pipeline, graphics, init_error, release_textures,
    shadow_matrices, viewport, Fullscreen, Input, StageError, MAX_SHADOW_FACES,
};
use crate::shadow_lane::ShadowLookup;
use bytemuck::{Pod, Zeroable};
use std::sync::RwLock;
use vantage_core::lane::{
    DepthPyramid, Feature, FrameFlags, GBufferTargets, Lane, LaneContext, LaneError, LaneKind,
    Ref, RenderLane, SceneColor,
};
use vantage_core::math::LinearRgba;
use vantage_core::renderer::api::{
    BlendMode, BufferId, CullMode, PrimitiveTopology, RenderPassColorAttachment,
    RenderPassDescriptor, RenderPipelineDescriptor, RenderPipelineId, ResourceState,
    ShaderDefines, ShaderResourceUsage, ShaderStages, ShaderVariantKey, TextureId,
};
use vantage_core::renderer::{Camera, GraphicsContext, RenderFlags, ResourceError};
use vantage_core::scene::Scene;

/// Uniform block shared by light-shaft slices and particles.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct TransientUniforms {
    /// Camera view-projection.
    pub view_projection: [[f32; 4]; 4],
    /// Light shadow matrices per face, identity for particles.
    pub shadow: [[[f32; 4]; 4]; MAX_SHADOW_FACES],
    /// Light position or emitter center.
    pub origin: [f32; 4],
    /// Light direction and slice count.
    pub direction: [f32; 4],
    /// Light color times intensity.
    pub color: [f32; 4],
}

struct TransientDraw {
    pipeline: RenderPipelineId,
    uniforms: TransientUniforms,
    shadow: Option<TextureId>,
    instances: Option<BufferId>,
    count: u32,
}

/// Renders light shafts and particles at half resolution and composites them
/// over the chain head with a depth-aware upsample.
///
/// Enabled by [`RenderFlags::LIGHTSHAFT`] or [`RenderFlags::PARTICLE_SYSTEMS`]
/// when something of that kind is visible.
#[derive(Debug, Default)]
pub struct HalfResTransientLane {
    target: RwLock<Option<TextureId>>,
}

impl HalfResTransientLane {
    /// Creates the stage.
    pub fn new() -> Self {
        Self::default()
    }

    /// The half-resolution target.
    pub fn target(&self) -> Option<TextureId> {
        *self.target.read().unwrap()
    }

    fn create_target(&self, ctx: &mut LaneContext) -> Result<(), LaneError> {
        let gfx = graphics(ctx)?;
        let size = viewport(ctx)?.scaled_down(2);
        self.release(&gfx);
        if is_degraded(ctx, Feature::HalfResTransients) {
            return Ok(());
        }
        match create_target(&gfx, "half-res transients", size, HDR_FORMAT) {
            Ok(id) => *self.target.write().unwrap() = Some(id),
            Err(e) => degrade(ctx, Feature::HalfResTransients, &e),
        }
        Ok(())
    }

    fn release(&self, gfx: &GraphicsContext) {
        if let Some(id) = self.target.write().unwrap().take() {
            release_textures(gfx, "HalfResTransientLane", [id]);
        }
    }

    fn transient_pipeline(
        gfx: &GraphicsContext,
        label: &str,
        shader: &str,
        defines: ShaderDefines,
    ) -> Result<RenderPipelineId, ResourceError> {
        let program = gfx.shader_program(
            &ShaderVariantKey::new(
                ShaderStages::graphics(format!("{shader}.vert"), format!("{shader}.frag")),
                defines,
            ),
            ShaderResourceUsage {
                sampled_textures: 2,
                storage_resources: 0,
                uniform_buffers: 1,
            },
        )?;
        gfx.render_pipeline(&RenderPipelineDescriptor {
            label: Some(label.to_owned()),
            program,
            topology: PrimitiveTopology::TriangleList,
            cull_mode: CullMode::None,
            depth: None,
            blend: BlendMode::AdditiveAlpha,
            color_formats: vec![HDR_FORMAT],
            depth_format: None,
        })
    }

    /// `true` when a visible light shaft or emitter has its flag set.
    pub fn has_work(flags: RenderFlags, visible: &VisibleSet) -> bool {
        (flags.contains(RenderFlags::LIGHTSHAFT) && !visible.lightshafts.is_empty())
            || (flags.contains(RenderFlags::PARTICLE_SYSTEMS) && !visible.emitters.is_empty())
    }

    fn draws(
        gfx: &GraphicsContext,
        scene: &Scene,
        camera: &Camera,
        visible: &VisibleSet,
        shadows: Option<&ShadowLookup>,
        flags: RenderFlags,
    ) -> Result<Vec<TransientDraw>, ResourceError> {
        let view_projection = camera.view_projection().to_cols_array_2d();
        let mut draws = Vec::new();

        if flags.contains(RenderFlags::LIGHTSHAFT) {
            for light in visible.lightshafts.iter().filter_map(|id| scene.light(*id)) {
                let Some(shaft) = light.lightshaft else {
                    continue;
                };
                let binding = shadows.and_then(|s| s.get(light.id));
                let pipeline = Self::transient_pipeline(
                    gfx,
                    "lightshaft",
                    "lightshaft",
                    ShaderDefines::new().define_if("SHADOW_CASTER", binding.is_some()),
                )?;
                draws.push(TransientDraw {
                    pipeline,
                    uniforms: TransientUniforms {
                        view_projection,
                        shadow: shadow_matrices(binding),
                        origin: light.position.extend(1.0).to_array(),
                        direction: light.direction.extend(shaft.slices as f32).to_array(),
                        color: (light.color.rgb_vec3() * light.intensity).extend(1.0).to_array(),
                    },
                    shadow: binding.map(|b| b.texture),
                    instances: None,
                    count: shaft.slices.max(1),
                });
            }
        }

        if flags.contains(RenderFlags::PARTICLE_SYSTEMS) {
            let pipeline = Self::transient_pipeline(gfx, "particles", "particle", ShaderDefines::new())?;
            for emitter in visible.emitters.iter().filter_map(|i| scene.emitters.get(*i)) {
                draws.push(TransientDraw {
                    pipeline,
                    uniforms: TransientUniforms {
                        view_projection,
                        shadow: shadow_matrices(None),
                        origin: emitter.bounds.center().extend(1.0).to_array(),
                        direction: [0.0; 4],
                        color: [1.0; 4],
                    },
                    shadow: None,
                    instances: emitter.instance_buffer,
                    count: emitter.particle_count,
                });
            }
        }
        Ok(draws)
    }

    fn record(&self, ctx: &LaneContext) -> Result<TextureId, LaneError> {
        let gfx = graphics(ctx)?;
        let target = self.target().ok_or(StageError::MissingTarget("HalfResTransientLane"))?;
        let flags = ctx.require::<FrameFlags>("FrameFlags")?.0;
        let input = scene_color(ctx)?;
        let output = ping_pong(ctx)?.next_hdr(input);
        let gbuffer = *ctx.require::<GBufferTargets>("GBufferTargets")?;
        let pyramid = *ctx.require::<DepthPyramid>("DepthPyramid")?;
        let scene = ctx.require::<Ref<Scene>>("Ref<Scene>")?.get();
        let camera = ctx.require::<Ref<Camera>>("Ref<Camera>")?.get();
        let visible = ctx.require::<VisibleSet>("VisibleSet")?;
        let shadows = ctx.get::<ShadowLookup>();
        let encoder = encoder(ctx)?;

        let draws = Self::draws(&gfx, scene, camera, visible, shadows, flags).map_err(StageError::from)?;
        {
            let ledger = gfx.ledger();
            ledger
                .ensure_mip_readable(pyramid.texture, 0)
                .map_err(StageError::from)?;
            for shadow in draws.iter().filter_map(|d| d.shadow) {
                ledger.ensure_readable(shadow).map_err(StageError::from)?;
            }
        }
        gfx.ledger()
            .batch()
            .texture(target, ResourceState::RenderTarget)
            .submit(encoder)
            .map_err(StageError::from)?;
        {
            let colors = [RenderPassColorAttachment::cleared(target, LinearRgba::TRANSPARENT)];
            let mut pass = encoder.begin_render_pass(&RenderPassDescriptor {
                label: Some("half-res transients"),
                color_attachments: &colors,
                depth_attachment: None,
            });
            for draw in &draws {
                pass.set_pipeline(draw.pipeline);
                pass.bind_texture_level(0, pyramid.texture, 0);
                if let Some(shadow) = draw.shadow {
                    pass.bind_texture(1, shadow);
                }
                if let Some(instances) = draw.instances {
                    pass.set_vertex_buffer(0, instances, 0);
                }
                pass.set_uniforms(bytemuck::bytes_of(&draw.uniforms));
                pass.draw(0..6, 0..draw.count);
            }
        }
        gfx.ledger()
            .batch()
            .texture(target, ResourceState::ShaderRead)
            .submit(encoder)
            .map_err(StageError::from)?;

        let upsample = fullscreen_pipeline(
            &gfx,
            "bilateral upsample",
            "bilateral_upsample.frag",
            ShaderDefines::new(),
            4,
            HDR_FORMAT,
            BlendMode::Opaque,
        )
        .map_err(StageError::from)?;
        Fullscreen {
            label: "bilateral upsample",
            pipeline: upsample,
            target: RenderPassColorAttachment::cleared(output, LinearRgba::TRANSPARENT),
            inputs: &[
                Input::Texture(input),
                Input::Texture(target),
                Input::Level(pyramid.texture, 0),
                Input::Texture(gbuffer.depth),
            ],
            uniforms: &[],
        }
        .record(&gfx, encoder)?;
        log::trace!("HalfResTransientLane: {} transient draws", draws.len());
        Ok(output)
    }
}

impl Lane for HalfResTransientLane {
    fn strategy_name(&self) -> &'static str {
        "HalfResTransients"
    }

    fn lane_kind(&self) -> LaneKind {
        LaneKind::PostProcess
    }

    fn estimate_cost(&self, ctx: &LaneContext) -> f32 {
        ctx.get::<VisibleSet>()
            .map_or(0.0, |v| (v.lightshafts.len() + v.emitters.len()) as f32 * 0.05)
    }

    fn on_initialize(&self, ctx: &mut LaneContext) -> Result<(), LaneError> {
        self.create_target(ctx)?;
        let gfx = graphics(ctx)?;
        Self::transient_pipeline(&gfx, "particles", "particle", ShaderDefines::new())
            .map_err(init_error)?;
        Ok(())
    }

    fn execute(&self, ctx: &mut LaneContext) -> Result<(), LaneError> {
        let output = self.record(ctx)?;
        ctx.insert(SceneColor(output));
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

impl RenderLane for HalfResTransientLane {
    fn on_viewport_resized(&self, ctx: &mut LaneContext) -> Result<(), LaneError> {
        self.create_target(ctx)
    }
}

impl PostStage for HalfResTransientLane {
    fn enabled(&self, ctx: &LaneContext) -> bool {
        let (Some(flags), Some(visible)) = (ctx.get::<FrameFlags>(), ctx.get::<VisibleSet>()) else {
            return false;
        };
        flags.0.half_res_transients()
            && Self::has_work(flags.0, visible)
            && !is_degraded(ctx, Feature::HalfResTransients)
            && self.target().is_some()
            && ctx.contains::<DepthPyramid>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_work_needs_flag_and_content() {
        let mut visible = VisibleSet::default();
        assert!(!HalfResTransientLane::has_work(RenderFlags::all(), &visible));
        visible.emitters.push(0);
        assert!(HalfResTransientLane::has_work(RenderFlags::PARTICLE_SYSTEMS, &visible));
        assert!(!HalfResTransientLane::has_work(RenderFlags::LIGHTSHAFT, &visible));
    }
}
