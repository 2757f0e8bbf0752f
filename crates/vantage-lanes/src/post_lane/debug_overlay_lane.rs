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

//! Debug overlay: blits an intermediate texture over the final image.

use super::{ping_pong, scene_color, PostStage, LDR_FORMAT};
use crate::render_lane::{encoder, fullscreen_pipeline, graphics, init_error, Fullscreen, Input, StageError};
use crate::shadow_lane::ShadowLookup;
use bytemuck::{Pod, Zeroable};
use vantage_core::lane::{
    ActiveDebugView, AmbientOcclusion, BloomTexture, DebugView, DepthPyramid, FrameFlags,
    GBufferTargets, Lane, LaneContext, LaneError, LaneKind, RenderLane, SceneColor,
};
use vantage_core::math::LinearRgba;
use vantage_core::renderer::api::{BlendMode, RenderPassColorAttachment, ShaderDefines, TextureId};
use vantage_core::renderer::RenderFlags;

/// Overlay uniform block: mip level, layer, unused, unused.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct OverlayUniforms {
    /// Level, layer, unused, unused.
    pub params: [f32; 4],
}

/// Preprocessor define selecting how the overlay decodes a view.
pub fn view_define(view: DebugView) -> &'static str {
    match view {
        DebugView::Normals => "DEBUG_NORMALS",
        DebugView::Velocity => "DEBUG_VELOCITY",
        DebugView::AmbientOcclusion => "DEBUG_AO",
        DebugView::Bloom => "DEBUG_BLOOM",
        DebugView::ShadowMap(_) => "DEBUG_SHADOW_MAP",
        DebugView::DepthPyramid { .. } => "DEBUG_DEPTH",
    }
}

/// Finds the texture a view shows, if it was produced this frame.
pub fn resolve_view(ctx: &LaneContext, view: DebugView) -> Option<Input> {
    match view {
        DebugView::Normals => ctx.get::<GBufferTargets>().map(|g| Input::Texture(g.normal)),
        DebugView::Velocity => ctx.get::<GBufferTargets>().map(|g| Input::Texture(g.velocity)),
        DebugView::AmbientOcclusion => ctx.get::<AmbientOcclusion>().map(|a| Input::Texture(a.0)),
        DebugView::Bloom => ctx.get::<BloomTexture>().map(|b| Input::Texture(b.0)),
        DebugView::ShadowMap(light) => ctx
            .get::<ShadowLookup>()
            .and_then(|s| s.get(light))
            .map(|b| Input::Texture(b.texture)),
        DebugView::DepthPyramid { level } => ctx
            .get::<DepthPyramid>()
            .filter(|p| level < p.levels)
            .map(|p| Input::Level(p.texture, level)),
    }
}

/// Shows the active [`DebugView`] over the chain head.
///
/// Enabled by [`RenderFlags::DEBUG_OVERLAY`] when a view is selected and its
/// texture exists this frame.
#[derive(Debug, Default)]
pub struct DebugOverlayLane;

impl DebugOverlayLane {
    /// Creates the stage.
    pub fn new() -> Self {
        Self
    }

    fn active_view(ctx: &LaneContext) -> Option<DebugView> {
        ctx.get::<ActiveDebugView>().and_then(|v| v.0)
    }

    fn record(&self, ctx: &LaneContext) -> Result<TextureId, LaneError> {
        let gfx = graphics(ctx)?;
        let view = Self::active_view(ctx).ok_or(LaneError::missing("ActiveDebugView"))?;
        let source = resolve_view(ctx, view).ok_or(LaneError::missing("debug view texture"))?;
        let input = scene_color(ctx)?;
        let output = ping_pong(ctx)?.next_ldr(input);
        let encoder = encoder(ctx)?;

        let level = match source {
            Input::Level(_, level) => level as f32,
            Input::Texture(_) => 0.0,
        };
        let uniforms = OverlayUniforms {
            params: [level, 0.0, 0.0, 0.0],
        };
        let pipeline = fullscreen_pipeline(
            &gfx,
            "debug overlay",
            "debug_overlay.frag",
            ShaderDefines::new().define(view_define(view)),
            2,
            LDR_FORMAT,
            BlendMode::Opaque,
        )
        .map_err(StageError::from)?;
        Fullscreen {
            label: "debug overlay",
            pipeline,
            target: RenderPassColorAttachment::cleared(output, LinearRgba::BLACK),
            inputs: &[Input::Texture(input), source],
            uniforms: bytemuck::bytes_of(&uniforms),
        }
        .record(&gfx, encoder)?;
        log::trace!("DebugOverlayLane: showing {view:?}");
        Ok(output)
    }
}

impl Lane for DebugOverlayLane {
    fn strategy_name(&self) -> &'static str {
        "DebugOverlay"
    }

    fn lane_kind(&self) -> LaneKind {
        LaneKind::PostProcess
    }

    fn estimate_cost(&self, _ctx: &LaneContext) -> f32 {
        0.05
    }

    fn on_initialize(&self, ctx: &mut LaneContext) -> Result<(), LaneError> {
        let gfx = graphics(ctx)?;
        fullscreen_pipeline(
            &gfx,
            "debug overlay",
            "debug_overlay.frag",
            ShaderDefines::new().define(view_define(DebugView::Normals)),
            2,
            LDR_FORMAT,
            BlendMode::Opaque,
        )
        .map_err(init_error)?;
        Ok(())
    }

    fn execute(&self, ctx: &mut LaneContext) -> Result<(), LaneError> {
        let output = self.record(ctx)?;
        ctx.insert(SceneColor(output));
        Ok(())
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
}

impl RenderLane for DebugOverlayLane {}

impl PostStage for DebugOverlayLane {
    fn enabled(&self, ctx: &LaneContext) -> bool {
        ctx.get::<FrameFlags>()
            .is_some_and(|f| f.0.contains(RenderFlags::DEBUG_OVERLAY))
            && Self::active_view(ctx).is_some_and(|v| resolve_view(ctx, v).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pyramid_level_must_exist() {
        let mut ctx = LaneContext::new();
        ctx.insert(DepthPyramid {
            texture: TextureId(7),
            levels: 1,
        });
        assert_eq!(
            resolve_view(&ctx, DebugView::DepthPyramid { level: 0 }),
            Some(Input::Level(TextureId(7), 0))
        );
        assert_eq!(resolve_view(&ctx, DebugView::DepthPyramid { level: 3 }), None);
    }

    #[test]
    fn test_needs_flag_and_view() {
        let lane = DebugOverlayLane::new();
        let mut ctx = LaneContext::new();
        ctx.insert(AmbientOcclusion(TextureId(3)));
        ctx.insert(ActiveDebugView(Some(DebugView::AmbientOcclusion)));
        assert!(!lane.enabled(&ctx));
        ctx.insert(FrameFlags(RenderFlags::DEBUG_OVERLAY));
        assert!(lane.enabled(&ctx));
        ctx.insert(ActiveDebugView(Some(DebugView::Bloom)));
        assert!(!lane.enabled(&ctx));
    }
}
