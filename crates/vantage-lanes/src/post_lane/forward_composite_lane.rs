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

//! Forward pass for what the G-buffer cannot hold: emissive surfaces added on
//! top of the lit image and blended transparents, optionally refracting a
//! blurred copy of the background.

use super::{degrade, effects, is_degraded, ping_pong, scene_color, PostStage, SeparableBlur, HDR_FORMAT};
use crate::cull_lane::{VisibleMesh, VisibleSet};
use crate::render_lane::{
    create_target, encoder, graphics, init_error, material_defines, release_textures, viewport,
    GBufferUniforms, StageError, DEPTH_FORMAT,
};
use std::sync::RwLock;
use vantage_core::lane::{
    Feature, FrameFlags, GBufferTargets, Lane, LaneContext, LaneError, LaneKind, Ref, RenderLane,
    SceneColor,
};
use vantage_core::math::Mat4;
use vantage_core::renderer::api::{
    BlendMode, BufferId, CompareFunction, CullMode, DepthState, IndexFormat, PrimitiveTopology,
    RenderPassColorAttachment, RenderPassDepthAttachment, RenderPassDescriptor,
    RenderPipelineDescriptor, RenderPipelineId, ResourceState, ShaderDefines, ShaderResourceUsage,
    ShaderStages, ShaderVariantKey, TextureId,
};
use vantage_core::renderer::{Camera, GraphicsContext, NormalizedEffects, RenderFlags, ResourceError};
use vantage_core::scene::Scene;

/// Slot the blurred background is bound at, after the four material slots.
pub const BLURRED_BACKGROUND_SLOT: u32 = 4;

#[derive(Debug, Clone, Copy)]
struct BlurTargets {
    blurred: TextureId,
    scratch: TextureId,
}

/// Which forward bin a mesh is drawn from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForwardBin {
    /// Added on top of the lit image.
    Emissive,
    /// Blended over it, back to front.
    Transparent,
}

impl ForwardBin {
    /// Blend and depth test of the bin.
    pub fn state(self) -> (BlendMode, DepthState) {
        match self {
            ForwardBin::Emissive => (BlendMode::Additive, DepthState::test(CompareFunction::LessEqual)),
            ForwardBin::Transparent => (BlendMode::AlphaBlend, DepthState::test(CompareFunction::Less)),
        }
    }
}

struct ForwardDraw {
    pipeline: RenderPipelineId,
    uniforms: GBufferUniforms,
    vertex: BufferId,
    index: BufferId,
    index_format: IndexFormat,
    index_count: u32,
    instances: u32,
    textures: [Option<TextureId>; 4],
    background: bool,
}

/// Copies the chain head, then draws emissive and transparent meshes over
/// the copy against the G-buffer depth.
///
/// Runs whenever either bin is non-empty.
#[derive(Debug, Default)]
pub struct ForwardCompositeLane {
    blur: RwLock<Option<BlurTargets>>,
}

impl ForwardCompositeLane {
    /// Creates the stage.
    pub fn new() -> Self {
        Self::default()
    }

    fn create_targets(&self, ctx: &mut LaneContext) -> Result<(), LaneError> {
        let gfx = graphics(ctx)?;
        let size = viewport(ctx)?;
        self.release(&gfx);
        if is_degraded(ctx, Feature::TransparentBlur) {
            return Ok(());
        }
        let blurred = match create_target(&gfx, "transparent blur", size, HDR_FORMAT) {
            Ok(id) => id,
            Err(e) => {
                degrade(ctx, Feature::TransparentBlur, &e);
                return Ok(());
            }
        };
        match create_target(&gfx, "transparent blur scratch", size, HDR_FORMAT) {
            Ok(scratch) => *self.blur.write().unwrap() = Some(BlurTargets { blurred, scratch }),
            Err(e) => {
                release_textures(&gfx, "ForwardCompositeLane", [blurred]);
                degrade(ctx, Feature::TransparentBlur, &e);
            }
        }
        Ok(())
    }

    fn release(&self, gfx: &GraphicsContext) {
        if let Some(t) = self.blur.write().unwrap().take() {
            release_textures(gfx, "ForwardCompositeLane", [t.blurred, t.scratch]);
        }
    }

    fn pipeline(
        gfx: &GraphicsContext,
        bin: ForwardBin,
        defines: ShaderDefines,
        two_sided: bool,
    ) -> Result<RenderPipelineId, ResourceError> {
        let defines = defines
            .define_if("EMISSIVE", bin == ForwardBin::Emissive)
            .define_if("TRANSPARENT", bin == ForwardBin::Transparent);
        let program = gfx.shader_program(
            &ShaderVariantKey::new(ShaderStages::graphics("forward.vert", "forward.frag"), defines),
            ShaderResourceUsage {
                sampled_textures: 5,
                storage_resources: 0,
                uniform_buffers: 1,
            },
        )?;
        let (blend, depth) = bin.state();
        gfx.render_pipeline(&RenderPipelineDescriptor {
            label: Some(match bin {
                ForwardBin::Emissive => "forward emissive".to_owned(),
                ForwardBin::Transparent => "forward transparent".to_owned(),
            }),
            program,
            topology: PrimitiveTopology::TriangleList,
            cull_mode: if two_sided { CullMode::None } else { CullMode::Back },
            depth: Some(depth),
            blend,
            color_formats: vec![HDR_FORMAT],
            depth_format: Some(DEPTH_FORMAT),
        })
    }

    fn draws(
        gfx: &GraphicsContext,
        scene: &Scene,
        entries: &[VisibleMesh],
        bin: ForwardBin,
        view_projection: &Mat4,
        flags: RenderFlags,
        background: bool,
    ) -> Result<Vec<ForwardDraw>, ResourceError> {
        let mut draws = Vec::with_capacity(entries.len());
        for entry in entries {
            let Some(mesh) = scene.mesh(entry.key) else {
                continue;
            };
            let extension = scene.extension(entry.key);
            let defines = material_defines(mesh, extension, flags).define_if("BLURRED_BACKGROUND", background);
            draws.push(ForwardDraw {
                pipeline: Self::pipeline(gfx, bin, defines, mesh.two_sided)?,
                uniforms: GBufferUniforms::new(mesh, entry, extension, view_projection, view_projection),
                vertex: mesh.buffers.vertex,
                index: mesh.buffers.index,
                index_format: mesh.buffers.index_format,
                index_count: mesh.buffers.index_count,
                instances: extension.map_or(1, |e| e.instance_count.max(1)),
                textures: extension.map_or([None; 4], |e| [e.albedo, e.normal, e.specular, e.emissive]),
                background,
            });
        }
        Ok(draws)
    }

    fn record(&self, ctx: &LaneContext) -> Result<TextureId, LaneError> {
        let gfx = graphics(ctx)?;
        let flags = ctx.require::<FrameFlags>("FrameFlags")?.0;
        let input = scene_color(ctx)?;
        let output = ping_pong(ctx)?.next_hdr(input);
        let effects = effects(ctx)?;
        let gbuffer = *ctx.require::<GBufferTargets>("GBufferTargets")?;
        let scene = ctx.require::<Ref<Scene>>("Ref<Scene>")?.get();
        let camera = ctx.require::<Ref<Camera>>("Ref<Camera>")?.get();
        let visible = ctx.require::<VisibleSet>("VisibleSet")?;
        let encoder = encoder(ctx)?;

        let blur = if flags.contains(RenderFlags::BLUR_TRANSPARENTS)
            && !visible.transparent.is_empty()
            && !is_degraded(ctx, Feature::TransparentBlur)
        {
            *self.blur.read().unwrap()
        } else {
            None
        };

        {
            let ledger = gfx.ledger();
            ledger.ensure_readable(input).map_err(StageError::from)?;
            ledger.ensure_readable(gbuffer.depth).map_err(StageError::from)?;
        }

        if let Some(targets) = blur {
            let blurrer = SeparableBlur::create(&gfx, HDR_FORMAT, ShaderDefines::new())
                .map_err(StageError::from)?;
            let radius = NormalizedEffects::kernel_radius(effects.transparent_blur);
            blurrer.record(&gfx, encoder, input, targets.scratch, targets.blurred, radius)?;
        }

        gfx.ledger()
            .batch()
            .texture(input, ResourceState::TransferSrc)
            .texture(output, ResourceState::TransferDst)
            .submit(encoder)
            .map_err(StageError::from)?;
        encoder.copy_texture_to_texture(input, output);

        let view_projection = *camera.view_projection();
        let mut draws = Self::draws(&gfx, scene, &visible.emissive, ForwardBin::Emissive, &view_projection, flags, false)
            .map_err(StageError::from)?;
        draws.extend(
            Self::draws(
                &gfx,
                scene,
                &visible.transparent,
                ForwardBin::Transparent,
                &view_projection,
                flags,
                blur.is_some(),
            )
            .map_err(StageError::from)?,
        );

        {
            let mut ledger = gfx.ledger();
            let mut materials: Vec<TextureId> = draws
                .iter()
                .flat_map(|d| d.textures.iter().flatten().copied())
                .filter(|t| ledger.is_registered(*t))
                .collect();
            materials.sort();
            materials.dedup();
            let mut batch = ledger.batch();
            for texture in materials {
                batch = batch.texture(texture, ResourceState::ShaderRead);
            }
            batch
                .texture(input, ResourceState::ShaderRead)
                .texture(output, ResourceState::RenderTarget)
                .submit(encoder)
                .map_err(StageError::from)?;
        }

        {
            let colors = [RenderPassColorAttachment::loaded(output)];
            let mut pass = encoder.begin_render_pass(&RenderPassDescriptor {
                label: Some("forward composite"),
                color_attachments: &colors,
                depth_attachment: Some(RenderPassDepthAttachment::read_only(gbuffer.depth)),
            });
            for draw in &draws {
                pass.set_pipeline(draw.pipeline);
                for (slot, texture) in draw.textures.iter().enumerate() {
                    if let Some(texture) = texture {
                        pass.bind_texture(slot as u32, *texture);
                    }
                }
                if let (true, Some(targets)) = (draw.background, blur) {
                    pass.bind_texture(BLURRED_BACKGROUND_SLOT, targets.blurred);
                }
                pass.set_uniforms(bytemuck::bytes_of(&draw.uniforms));
                pass.set_vertex_buffer(0, draw.vertex, 0);
                pass.set_index_buffer(draw.index, 0, draw.index_format);
                pass.draw_indexed(0..draw.index_count, 0, 0..draw.instances);
            }
        }

        gfx.ledger()
            .batch()
            .texture(output, ResourceState::ShaderRead)
            .submit(encoder)
            .map_err(StageError::from)?;
        log::trace!(
            "ForwardCompositeLane: {} emissive, {} transparent{}",
            visible.emissive.len(),
            visible.transparent.len(),
            if blur.is_some() { ", blurred background" } else { "" }
        );
        Ok(output)
    }
}

impl Lane for ForwardCompositeLane {
    fn strategy_name(&self) -> &'static str {
        "ForwardComposite"
    }

    fn lane_kind(&self) -> LaneKind {
        LaneKind::PostProcess
    }

    fn estimate_cost(&self, ctx: &LaneContext) -> f32 {
        ctx.get::<VisibleSet>()
            .map_or(0.0, |v| (v.emissive.len() + v.transparent.len()) as f32 * 0.01)
    }

    fn on_initialize(&self, ctx: &mut LaneContext) -> Result<(), LaneError> {
        self.create_targets(ctx)?;
        let gfx = graphics(ctx)?;
        Self::pipeline(&gfx, ForwardBin::Transparent, ShaderDefines::new(), false).map_err(init_error)?;
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

impl RenderLane for ForwardCompositeLane {
    fn on_viewport_resized(&self, ctx: &mut LaneContext) -> Result<(), LaneError> {
        self.create_targets(ctx)
    }
}

impl PostStage for ForwardCompositeLane {
    fn enabled(&self, ctx: &LaneContext) -> bool {
        ctx.get::<VisibleSet>()
            .is_some_and(|v| !v.emissive.is_empty() || !v.transparent.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bin_states() {
        let (blend, depth) = ForwardBin::Emissive.state();
        assert_eq!(blend, BlendMode::Additive);
        assert!(!depth.write);
        let (blend, depth) = ForwardBin::Transparent.state();
        assert_eq!(blend, BlendMode::AlphaBlend);
        assert_eq!(depth.compare, CompareFunction::Less);
    }

    #[test]
    fn test_disabled_without_forward_meshes() {
        let mut ctx = LaneContext::new();
        let lane = ForwardCompositeLane::new();
        assert!(!lane.enabled(&ctx));
        ctx.insert(VisibleSet::default());
        assert!(!lane.enabled(&ctx));
    }
}
