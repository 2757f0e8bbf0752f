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

//! Depth of field.

use super::{degrade, effects, is_degraded, ping_pong, scene_color, PostStage, SeparableBlur, LDR_FORMAT};
use crate::render_lane::{
    compute_pipeline, create_storage, create_target, encoder, fullscreen_pipeline, graphics,
    init_error, release_textures, viewport, workgroups, Dispatch, Fullscreen, Input, StageError,
};
use bytemuck::{Pod, Zeroable};
use std::sync::RwLock;
use vantage_core::config::EnvironmentValues;
use vantage_core::lane::{
    DepthPyramid, Feature, FrameFlags, GBufferTargets, Lane, LaneContext, LaneError, LaneKind, Ref,
    RenderLane, SceneColor, Viewport,
};
use vantage_core::math::{LinearRgba, Vec2};
use vantage_core::renderer::api::{
    BlendMode, ComputePipelineId, RenderPassColorAttachment, ShaderDefines, ShaderResourceUsage,
    TextureFormat, TextureId,
};
use vantage_core::renderer::{Camera, GraphicsContext, NormalizedEffects, RenderFlags, ResourceError};

/// Format of the circle-of-confusion target.
pub const COC_FORMAT: TextureFormat = TextureFormat::R32Float;

const COC_GROUP: u32 = 8;

/// Circle-of-confusion uniform block.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct DofUniforms {
    /// Focus distance, range, focus range, unused.
    pub focus: [f32; 4],
    /// Depth linearization factors, then the CoC target size.
    pub depth: [f32; 4],
}

impl DofUniforms {
    /// Builds the block from the environment's focus settings.
    pub fn new(env: &EnvironmentValues, linearize: Vec2, coc: Viewport) -> Self {
        Self {
            focus: [env.dof_focus_distance, env.dof_range, env.dof_focus_range, 0.0],
            depth: [linearize.x, linearize.y, coc.width as f32, coc.height as f32],
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct DofTargets {
    coc: TextureId,
    coc_half: TextureId,
    blurred: TextureId,
    scratch: TextureId,
    size: Viewport,
}

impl DofTargets {
    fn textures(&self) -> [TextureId; 4] {
        [self.coc, self.coc_half, self.blurred, self.scratch]
    }
}

/// Blurs out-of-focus regions of the chain head.
///
/// With [`RenderFlags::DOF_HALF_RES`] the circle of confusion is computed at
/// half resolution from depth pyramid level 0.
#[derive(Debug, Default)]
pub struct DofLane {
    targets: RwLock<Option<DofTargets>>,
}

impl DofLane {
    /// Creates the stage.
    pub fn new() -> Self {
        Self::default()
    }

    fn create_targets(&self, ctx: &mut LaneContext) -> Result<(), LaneError> {
        let gfx = graphics(ctx)?;
        let size = viewport(ctx)?;
        self.release(&gfx);
        if is_degraded(ctx, Feature::DepthOfField) {
            return Ok(());
        }
        let specs: [(&str, Viewport, TextureFormat, bool); 4] = [
            ("dof coc", size, COC_FORMAT, true),
            ("dof coc half", size.scaled_down(2), COC_FORMAT, true),
            ("dof blur", size, LDR_FORMAT, false),
            ("dof blur scratch", size, LDR_FORMAT, false),
        ];
        let mut created = Vec::with_capacity(specs.len());
        for (label, extent, format, storage) in specs {
            let result = if storage {
                create_storage(&gfx, label, extent, format, 1)
            } else {
                create_target(&gfx, label, extent, format)
            };
            match result {
                Ok(id) => created.push(id),
                Err(e) => {
                    release_textures(&gfx, "DofLane", created);
                    degrade(ctx, Feature::DepthOfField, &e);
                    return Ok(());
                }
            }
        }
        *self.targets.write().unwrap() = Some(DofTargets {
            coc: created[0],
            coc_half: created[1],
            blurred: created[2],
            scratch: created[3],
            size,
        });
        Ok(())
    }

    fn release(&self, gfx: &GraphicsContext) {
        if let Some(t) = self.targets.write().unwrap().take() {
            release_textures(gfx, "DofLane", t.textures());
        }
    }

    fn coc_pipeline(gfx: &GraphicsContext, half_res: bool) -> Result<ComputePipelineId, ResourceError> {
        compute_pipeline(
            gfx,
            "dof coc",
            "dof_coc.comp",
            ShaderDefines::new().define_if("DOF_HALF_RES", half_res),
            ShaderResourceUsage {
                sampled_textures: 1,
                storage_resources: 1,
                uniform_buffers: 1,
            },
        )
    }

    fn record(&self, ctx: &LaneContext) -> Result<TextureId, LaneError> {
        let gfx = graphics(ctx)?;
        let targets = (*self.targets.read().unwrap()).ok_or(StageError::MissingTarget("DofLane"))?;
        let flags = ctx.require::<FrameFlags>("FrameFlags")?.0;
        let input = scene_color(ctx)?;
        let output = ping_pong(ctx)?.next_ldr(input);
        let effects = effects(ctx)?;
        let gbuffer = *ctx.require::<GBufferTargets>("GBufferTargets")?;
        let camera = ctx.require::<Ref<Camera>>("Ref<Camera>")?.get();
        let default_env = EnvironmentValues::default();
        let env = ctx
            .get::<Ref<EnvironmentValues>>()
            .map_or(&default_env, |e| e.get());
        let pyramid = ctx.get::<DepthPyramid>().copied();
        let encoder = encoder(ctx)?;

        let half_res = flags.contains(RenderFlags::DOF_HALF_RES) && pyramid.is_some();
        let (coc, coc_size, depth) = match pyramid {
            Some(p) if half_res => (targets.coc_half, targets.size.scaled_down(2), Input::Level(p.texture, 0)),
            _ => (targets.coc, targets.size, Input::Texture(gbuffer.depth)),
        };
        let uniforms = DofUniforms::new(env, camera.depth_linearize(), coc_size);
        Dispatch {
            label: "dof coc",
            pipeline: Self::coc_pipeline(&gfx, half_res).map_err(StageError::from)?,
            inputs: &[depth],
            output: (coc, 0),
            uniforms: bytemuck::bytes_of(&uniforms),
            groups: [
                workgroups(coc_size.width, COC_GROUP),
                workgroups(coc_size.height, COC_GROUP),
                1,
            ],
        }
        .record(&gfx, encoder)?;

        let blur = SeparableBlur::create(&gfx, LDR_FORMAT, ShaderDefines::new().define("DOF"))
            .map_err(StageError::from)?;
        let radius = NormalizedEffects::kernel_radius(effects.dof);
        blur.record(&gfx, encoder, input, targets.scratch, targets.blurred, radius)?;

        let composite = fullscreen_pipeline(
            &gfx,
            "dof composite",
            "dof_composite.frag",
            ShaderDefines::new().define_if("DOF_HALF_RES", half_res),
            3,
            LDR_FORMAT,
            BlendMode::Opaque,
        )
        .map_err(StageError::from)?;
        Fullscreen {
            label: "dof composite",
            pipeline: composite,
            target: RenderPassColorAttachment::cleared(output, LinearRgba::BLACK),
            inputs: &[
                Input::Texture(input),
                Input::Texture(targets.blurred),
                Input::Texture(coc),
            ],
            uniforms: bytemuck::bytes_of(&uniforms),
        }
        .record(&gfx, encoder)?;
        log::trace!("DofLane: radius {radius}{}", if half_res { ", half-res CoC" } else { "" });
        Ok(output)
    }
}

impl Lane for DofLane {
    fn strategy_name(&self) -> &'static str {
        "DepthOfField"
    }

    fn lane_kind(&self) -> LaneKind {
        LaneKind::PostProcess
    }

    fn estimate_cost(&self, _ctx: &LaneContext) -> f32 {
        0.4
    }

    fn on_initialize(&self, ctx: &mut LaneContext) -> Result<(), LaneError> {
        self.create_targets(ctx)?;
        let gfx = graphics(ctx)?;
        Self::coc_pipeline(&gfx, false).map_err(init_error)?;
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

impl RenderLane for DofLane {
    fn on_viewport_resized(&self, ctx: &mut LaneContext) -> Result<(), LaneError> {
        self.create_targets(ctx)
    }
}

impl PostStage for DofLane {
    fn enabled(&self, ctx: &LaneContext) -> bool {
        ctx.get::<FrameFlags>()
            .is_some_and(|f| f.0.contains(RenderFlags::DOF))
            && !is_degraded(ctx, Feature::DepthOfField)
            && self.targets.read().unwrap().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uniforms_carry_focus() {
        let env = EnvironmentValues {
            dof_focus_distance: 12.0,
            dof_range: 4.0,
            dof_focus_range: 2.0,
            ..EnvironmentValues::default()
        };
        let u = DofUniforms::new(&env, Vec2::new(0.5, 2.0), Viewport::new(640, 360));
        assert_eq!(u.focus, [12.0, 4.0, 2.0, 0.0]);
        assert_eq!(u.depth, [0.5, 2.0, 640.0, 360.0]);
    }

    #[test]
    fn test_disabled_without_flag() {
        let lane = DofLane::new();
        let mut ctx = LaneContext::new();
        ctx.insert(FrameFlags(RenderFlags::empty()));
        assert!(!lane.enabled(&ctx));
    }
}
