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

//! Screen-space ambient occlusion.

use super::{degrade, effects, is_degraded, ping_pong, scene_color, PostStage, SeparableBlur, HDR_FORMAT};
use crate::render_lane::{
    create_target, encoder, fullscreen_pipeline, graphics, init_error, release_textures, viewport,
    Fullscreen, Input, StageError,
};
use bytemuck::{Pod, Zeroable};
use std::sync::RwLock;
use vantage_core::lane::{
    AmbientOcclusion, DepthPyramid, Feature, FrameFlags, GBufferTargets, Lane, LaneContext,
    LaneError, LaneKind, Ref, RenderLane, SceneColor,
};
use vantage_core::math::LinearRgba;
use vantage_core::renderer::api::{
    BlendMode, RenderPassColorAttachment, RenderPipelineId, ShaderDefines, TextureFormat,
    TextureId,
};
use vantage_core::renderer::{Camera, GraphicsContext, NormalizedEffects, RenderFlags, ResourceError};

/// Format of the occlusion term.
pub const AO_FORMAT: TextureFormat = TextureFormat::R8Unorm;

/// Occlusion pass uniform block.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct SsaoUniforms {
    /// Depth linearization factors, then the inverse projection scale.
    pub projection: [f32; 4],
    /// Radius in AO texels, pyramid levels, unused, unused.
    pub params: [f32; 4],
}

impl SsaoUniforms {
    /// The sampling radius in texels of a target `downscale` times smaller
    /// than the viewport.
    pub fn radius_texels(effects: &NormalizedEffects, downscale: u32) -> f32 {
        effects.ssao_radius / downscale.max(1) as f32
    }
}

#[derive(Debug, Clone, Copy)]
struct SsaoTargets {
    ao: TextureId,
    scratch: TextureId,
}

/// Computes ambient occlusion at reduced resolution and darkens the chain
/// head with it.
///
/// Enabled by [`RenderFlags::SSAO`] once the depth pyramid exists.
#[derive(Debug)]
pub struct SsaoLane {
    downscale: u32,
    targets: RwLock<Option<SsaoTargets>>,
}

impl Default for SsaoLane {
    fn default() -> Self {
        Self::new(2)
    }
}

impl SsaoLane {
    /// Creates the stage; the occlusion target is `downscale` times smaller
    /// than the viewport.
    pub fn new(downscale: u32) -> Self {
        Self {
            downscale: downscale.max(1),
            targets: RwLock::new(None),
        }
    }

    /// The occlusion texture.
    pub fn ao_texture(&self) -> Option<TextureId> {
        self.targets.read().unwrap().map(|t| t.ao)
    }

    fn create_targets(&self, ctx: &mut LaneContext) -> Result<(), LaneError> {
        let gfx = graphics(ctx)?;
        let size = viewport(ctx)?.scaled_down(self.downscale);
        self.release(&gfx);
        if is_degraded(ctx, Feature::Ssao) {
            return Ok(());
        }
        let ao = match create_target(&gfx, "ssao", size, AO_FORMAT) {
            Ok(id) => id,
            Err(e) => {
                degrade(ctx, Feature::Ssao, &e);
                return Ok(());
            }
        };
        match create_target(&gfx, "ssao scratch", size, AO_FORMAT) {
            Ok(scratch) => *self.targets.write().unwrap() = Some(SsaoTargets { ao, scratch }),
            Err(e) => {
                release_textures(&gfx, "SsaoLane", [ao]);
                degrade(ctx, Feature::Ssao, &e);
            }
        }
        Ok(())
    }

    fn release(&self, gfx: &GraphicsContext) {
        if let Some(t) = self.targets.write().unwrap().take() {
            release_textures(gfx, "SsaoLane", [t.ao, t.scratch]);
        }
    }

    fn occlusion_pipeline(gfx: &GraphicsContext, flags: RenderFlags) -> Result<RenderPipelineId, ResourceError> {
        fullscreen_pipeline(
            gfx,
            "ssao",
            "ssao.frag",
            ShaderDefines::new().define_if("MID_RANGE_SSAO", flags.contains(RenderFlags::MID_RANGE_SSAO)),
            2,
            AO_FORMAT,
            BlendMode::Opaque,
        )
    }

    fn record(&self, ctx: &LaneContext) -> Result<(TextureId, TextureId), LaneError> {
        let gfx = graphics(ctx)?;
        let targets = (*self.targets.read().unwrap()).ok_or(StageError::MissingTarget("SsaoLane"))?;
        let flags = ctx.require::<FrameFlags>("FrameFlags")?.0;
        let input = scene_color(ctx)?;
        let output = ping_pong(ctx)?.next_hdr(input);
        let effects = effects(ctx)?;
        let gbuffer = *ctx.require::<GBufferTargets>("GBufferTargets")?;
        let pyramid = *ctx.require::<DepthPyramid>("DepthPyramid")?;
        let camera = ctx.require::<Ref<Camera>>("Ref<Camera>")?.get();
        let encoder = encoder(ctx)?;

        let linearize = camera.depth_linearize();
        let uniforms = SsaoUniforms {
            projection: [
                linearize.x,
                linearize.y,
                camera.projection().x_axis.x,
                camera.projection().y_axis.y,
            ],
            params: [
                SsaoUniforms::radius_texels(&effects, self.downscale),
                pyramid.levels as f32,
                0.0,
                0.0,
            ],
        };
        Fullscreen {
            label: "ssao",
            pipeline: Self::occlusion_pipeline(&gfx, flags).map_err(StageError::from)?,
            target: RenderPassColorAttachment::cleared(targets.ao, LinearRgba::WHITE),
            inputs: &[Input::Texture(gbuffer.normal), Input::Texture(pyramid.texture)],
            uniforms: bytemuck::bytes_of(&uniforms),
        }
        .record(&gfx, encoder)?;

        if flags.contains(RenderFlags::SSAO_BLUR) {
            let blur = SeparableBlur::create(&gfx, AO_FORMAT, ShaderDefines::new().define("SSAO"))
                .map_err(StageError::from)?;
            let radius = NormalizedEffects::kernel_radius(effects.ssao_blur / self.downscale as f32);
            blur.record(&gfx, encoder, targets.ao, targets.scratch, targets.ao, radius)?;
        }

        let apply = fullscreen_pipeline(
            &gfx,
            "ssao apply",
            "ssao_apply.frag",
            ShaderDefines::new(),
            2,
            HDR_FORMAT,
            BlendMode::Opaque,
        )
        .map_err(StageError::from)?;
        Fullscreen {
            label: "ssao apply",
            pipeline: apply,
            target: RenderPassColorAttachment::cleared(output, LinearRgba::TRANSPARENT),
            inputs: &[Input::Texture(input), Input::Texture(targets.ao)],
            uniforms: &[],
        }
        .record(&gfx, encoder)?;
        Ok((targets.ao, output))
    }
}

impl Lane for SsaoLane {
    fn strategy_name(&self) -> &'static str {
        "Ssao"
    }

    fn lane_kind(&self) -> LaneKind {
        LaneKind::PostProcess
    }

    fn estimate_cost(&self, _ctx: &LaneContext) -> f32 {
        0.5 / self.downscale as f32
    }

    fn on_initialize(&self, ctx: &mut LaneContext) -> Result<(), LaneError> {
        self.create_targets(ctx)?;
        let gfx = graphics(ctx)?;
        Self::occlusion_pipeline(&gfx, RenderFlags::default()).map_err(init_error)?;
        Ok(())
    }

    fn execute(&self, ctx: &mut LaneContext) -> Result<(), LaneError> {
        let (ao, output) = self.record(ctx)?;
        ctx.insert(AmbientOcclusion(ao));
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

impl RenderLane for SsaoLane {
    fn on_viewport_resized(&self, ctx: &mut LaneContext) -> Result<(), LaneError> {
        self.create_targets(ctx)
    }
}

impl PostStage for SsaoLane {
    fn enabled(&self, ctx: &LaneContext) -> bool {
        ctx.get::<FrameFlags>()
            .is_some_and(|f| f.0.contains(RenderFlags::SSAO))
            && !is_degraded(ctx, Feature::Ssao)
            && self.targets.read().unwrap().is_some()
            && ctx.contains::<DepthPyramid>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use vantage_core::renderer::EffectParams;

    #[test]
    fn test_radius_follows_viewport_and_downscale() {
        let raw = EffectParams::default();
        let full = raw.normalized(1080);
        let half = raw.normalized(540);
        assert_relative_eq!(SsaoUniforms::radius_texels(&full, 2), raw.ssao_radius / 2.0);
        assert_relative_eq!(
            SsaoUniforms::radius_texels(&half, 2),
            SsaoUniforms::radius_texels(&full, 2) / 2.0
        );
    }

    #[test]
    fn test_disabled_without_pyramid() {
        let lane = SsaoLane::default();
        let mut ctx = LaneContext::new();
        ctx.insert(FrameFlags(RenderFlags::SSAO));
        assert!(!lane.enabled(&ctx));
    }
}
