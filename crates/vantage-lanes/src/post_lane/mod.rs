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

//! The post-process chain and its stages.
//!
//! Stages run in a fixed order. Each reads the chain head from
//! [`SceneColor`], writes a new texture and publishes it as the new head.
//! A stage that is disabled for the frame is not executed at all, so its
//! output is its input.
//!
//! Intermediate results live in a [`PingPong`] pool: an HDR pair before the
//! tonemap and an LDR pair after it. A stage writes whichever texture of the
//! pair is not its input.

mod bloom_lane;
mod debug_overlay_lane;
mod dof_lane;
mod forward_composite_lane;
mod half_res_lane;
mod motion_blur_lane;
mod ssao_lane;
mod tonemap_lane;

pub use bloom_lane::*;
pub use debug_overlay_lane::*;
pub use dof_lane::*;
pub use forward_composite_lane::*;
pub use half_res_lane::*;
pub use motion_blur_lane::*;
pub use ssao_lane::*;
pub use tonemap_lane::*;

use crate::render_lane::{
    create_target, fullscreen_pipeline, graphics, init_error, release_textures, viewport,
    Fullscreen, Input, StageError,
};
use bytemuck::{Pod, Zeroable};
use std::fmt;
use std::sync::{Mutex, RwLock};
use vantage_core::config::RendererConfig;
use vantage_core::lane::{
    DegradedFeatures, Feature, Lane, LaneContext, LaneError, LaneKind, RenderLane, SceneColor,
    Viewport,
};
use vantage_core::math::LinearRgba;
use vantage_core::renderer::api::{
    BlendMode, RenderPassColorAttachment, RenderPipelineId, ShaderDefines, TextureFormat,
    TextureId,
};
use vantage_core::renderer::{CommandEncoder, GraphicsContext, NormalizedEffects, ResourceError};

/// Format of the HDR half of the pool.
pub const HDR_FORMAT: TextureFormat = TextureFormat::Rgba16Float;
/// Format of the LDR half of the pool.
pub const LDR_FORMAT: TextureFormat = TextureFormat::Rgba8Unorm;

/// A stage of the post chain.
pub trait PostStage: RenderLane {
    /// Returns `true` if the stage runs this frame.
    ///
    /// When `false` the chain skips [`Lane::execute`] and the head stays
    /// where it was.
    fn enabled(&self, ctx: &LaneContext) -> bool;
}

/// Context key: the chain's intermediate textures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PingPong {
    /// HDR pair.
    pub hdr: [TextureId; 2],
    /// LDR pair.
    pub ldr: [TextureId; 2],
}

impl PingPong {
    fn create(gfx: &GraphicsContext, size: Viewport) -> Result<Self, ResourceError> {
        let specs = [
            ("post hdr a", HDR_FORMAT),
            ("post hdr b", HDR_FORMAT),
            ("post ldr a", LDR_FORMAT),
            ("post ldr b", LDR_FORMAT),
        ];
        let mut created = Vec::with_capacity(specs.len());
        for (label, format) in specs {
            match create_target(gfx, label, size, format) {
                Ok(id) => created.push(id),
                Err(e) => {
                    release_textures(gfx, "PostProcessChain", created);
                    return Err(e);
                }
            }
        }
        Ok(Self {
            hdr: [created[0], created[1]],
            ldr: [created[2], created[3]],
        })
    }

    fn textures(&self) -> [TextureId; 4] {
        [self.hdr[0], self.hdr[1], self.ldr[0], self.ldr[1]]
    }

    /// The HDR texture to write when reading `input`.
    pub fn next_hdr(&self, input: TextureId) -> TextureId {
        if input == self.hdr[0] {
            self.hdr[1]
        } else {
            self.hdr[0]
        }
    }

    /// The LDR texture to write when reading `input`.
    pub fn next_ldr(&self, input: TextureId) -> TextureId {
        if input == self.ldr[0] {
            self.ldr[1]
        } else {
            self.ldr[0]
        }
    }
}

/// What one stage did with the chain head.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageOutput {
    /// Stage name.
    pub stage: &'static str,
    /// Head before the stage.
    pub input: TextureId,
    /// Head after the stage. Equal to `input` when the stage was skipped.
    pub output: TextureId,
    /// The stage executed.
    pub ran: bool,
}

/// The current chain head.
pub fn scene_color(ctx: &LaneContext) -> Result<TextureId, LaneError> {
    Ok(ctx.require::<SceneColor>("SceneColor")?.0)
}

/// The chain's intermediate textures.
pub fn ping_pong(ctx: &LaneContext) -> Result<PingPong, LaneError> {
    ctx.require::<PingPong>("PingPong").copied()
}

/// Effect strengths for this frame.
pub fn effects(ctx: &LaneContext) -> Result<NormalizedEffects, LaneError> {
    ctx.require::<NormalizedEffects>("NormalizedEffects").copied()
}

/// Returns `true` if `feature` was lost earlier in the session.
pub fn is_degraded(ctx: &LaneContext, feature: Feature) -> bool {
    ctx.get::<DegradedFeatures>()
        .is_some_and(|d| d.contains(feature))
}

/// Records `feature` as lost for the session.
pub fn degrade(ctx: &mut LaneContext, feature: Feature, reason: &dyn fmt::Display) {
    if let Some(degraded) = ctx.get_mut::<DegradedFeatures>() {
        degraded.degrade(feature, reason);
        return;
    }
    let mut degraded = DegradedFeatures::default();
    degraded.degrade(feature, reason);
    ctx.insert(degraded);
}

/// Uniform block of one blur direction.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct BlurUniforms {
    /// Unit step in texels: `(0, 1)` vertical, `(1, 0)` horizontal.
    pub direction: [f32; 2],
    /// Taps on each side of the center.
    pub radius: f32,
    /// Unused.
    pub _pad: f32,
}

/// A two-pass separable blur for one texture format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeparableBlur {
    vertical: RenderPipelineId,
    horizontal: RenderPipelineId,
}

impl SeparableBlur {
    /// Resolves both directional pipelines.
    pub fn create(
        gfx: &GraphicsContext,
        format: TextureFormat,
        defines: ShaderDefines,
    ) -> Result<Self, ResourceError> {
        let vertical = fullscreen_pipeline(
            gfx,
            "blur vertical",
            "separable_blur.frag",
            defines.clone().define("BLUR_VERTICAL"),
            1,
            format,
            BlendMode::Opaque,
        )?;
        let horizontal = fullscreen_pipeline(
            gfx,
            "blur horizontal",
            "separable_blur.frag",
            defines.define("BLUR_HORIZONTAL"),
            1,
            format,
            BlendMode::Opaque,
        )?;
        Ok(Self {
            vertical,
            horizontal,
        })
    }

    /// Blurs `source` into `dest` through `scratch`: vertical into the
    /// scratch, then horizontal into `dest`. `dest` may be `source`.
    pub fn record(
        &self,
        gfx: &GraphicsContext,
        encoder: &mut dyn CommandEncoder,
        source: TextureId,
        scratch: TextureId,
        dest: TextureId,
        radius: u32,
    ) -> Result<(), StageError> {
        let vertical = BlurUniforms {
            direction: [0.0, 1.0],
            radius: radius as f32,
            _pad: 0.0,
        };
        Fullscreen {
            label: "blur vertical",
            pipeline: self.vertical,
            target: RenderPassColorAttachment::cleared(scratch, LinearRgba::TRANSPARENT),
            inputs: &[Input::Texture(source)],
            uniforms: bytemuck::bytes_of(&vertical),
        }
        .record(gfx, encoder)?;
        let horizontal = BlurUniforms {
            direction: [1.0, 0.0],
            ..vertical
        };
        Fullscreen {
            label: "blur horizontal",
            pipeline: self.horizontal,
            target: RenderPassColorAttachment::cleared(dest, LinearRgba::TRANSPARENT),
            inputs: &[Input::Texture(scratch)],
            uniforms: bytemuck::bytes_of(&horizontal),
        }
        .record(gfx, encoder)
    }
}

/// Runs the post stages in order over the lighting result.
///
/// Expects [`SceneColor`] from the lighting lane and [`NormalizedEffects`].
/// Leaves the final image in [`SceneColor`].
pub struct PostProcessChain {
    stages: Vec<Box<dyn PostStage>>,
    pool: RwLock<Option<PingPong>>,
    outputs: Mutex<Vec<StageOutput>>,
}

impl fmt::Debug for PostProcessChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PostProcessChain")
            .field(
                "stages",
                &self.stages.iter().map(|s| s.strategy_name()).collect::<Vec<_>>(),
            )
            .field("pool", &*self.pool.read().unwrap())
            .finish()
    }
}

impl PostProcessChain {
    /// A chain running `stages` in the given order.
    pub fn new(stages: Vec<Box<dyn PostStage>>) -> Self {
        Self {
            stages,
            pool: RwLock::new(None),
            outputs: Mutex::new(Vec::new()),
        }
    }

    /// The full benchmark chain.
    pub fn standard(config: &RendererConfig) -> Self {
        Self::new(vec![
            Box::new(HalfResTransientLane::new()),
            Box::new(SsaoLane::new(config.ssao_downscale)),
            Box::new(ForwardCompositeLane::new()),
            Box::new(BloomLane::new(config.bloom_layers, config.bloom_mobile_layers)),
            Box::new(TonemapLane::new()),
            Box::new(MotionBlurLane::new(config.motion_blur_tile_size)),
            Box::new(DofLane::new()),
            Box::new(DebugOverlayLane::new()),
        ])
    }

    /// Stage names, in order.
    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|s| s.strategy_name()).collect()
    }

    /// A stage by concrete type.
    pub fn stage<T: 'static>(&self) -> Option<&T> {
        self.stages.iter().find_map(|s| s.as_any().downcast_ref())
    }

    /// The intermediate textures.
    pub fn pool(&self) -> Option<PingPong> {
        *self.pool.read().unwrap()
    }

    /// Per-stage results of the last frame.
    pub fn last_outputs(&self) -> Vec<StageOutput> {
        self.outputs.lock().unwrap().clone()
    }

    fn recreate_pool(&self, ctx: &LaneContext) -> Result<(), LaneError> {
        let gfx = graphics(ctx)?;
        let size = viewport(ctx)?;
        let mut pool = self.pool.write().unwrap();
        if let Some(old) = pool.take() {
            release_textures(&gfx, "PostProcessChain", old.textures());
        }
        *pool = Some(PingPong::create(&gfx, size).map_err(init_error)?);
        Ok(())
    }
}

impl Lane for PostProcessChain {
    fn strategy_name(&self) -> &'static str {
        "PostProcessChain"
    }

    fn lane_kind(&self) -> LaneKind {
        LaneKind::PostProcess
    }

    fn estimate_cost(&self, ctx: &LaneContext) -> f32 {
        self.stages.iter().map(|s| s.estimate_cost(ctx)).sum()
    }

    fn on_initialize(&self, ctx: &mut LaneContext) -> Result<(), LaneError> {
        self.recreate_pool(ctx)?;
        for stage in &self.stages {
            stage.on_initialize(ctx)?;
        }
        log::debug!("PostProcessChain: {} stages initialized", self.stages.len());
        Ok(())
    }

    fn execute(&self, ctx: &mut LaneContext) -> Result<(), LaneError> {
        let pool = self.pool().ok_or(LaneError::NotInitialized)?;
        ctx.insert(pool);
        let mut outputs = Vec::with_capacity(self.stages.len());
        for stage in &self.stages {
            let input = scene_color(ctx)?;
            let ran = stage.enabled(ctx);
            if ran {
                stage.execute(ctx)?;
            }
            let output = scene_color(ctx)?;
            log::trace!(
                "PostProcessChain: {} {:?} -> {:?}{}",
                stage.strategy_name(),
                input,
                output,
                if ran { "" } else { " (skipped)" }
            );
            outputs.push(StageOutput {
                stage: stage.strategy_name(),
                input,
                output,
                ran,
            });
        }
        ctx.remove::<PingPong>();
        *self.outputs.lock().unwrap() = outputs;
        Ok(())
    }

    fn on_shutdown(&self, ctx: &mut LaneContext) {
        for stage in &self.stages {
            stage.on_shutdown(ctx);
        }
        if let (Ok(gfx), Some(pool)) = (graphics(ctx), self.pool.write().unwrap().take()) {
            release_textures(&gfx, "PostProcessChain", pool.textures());
        }
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
}

impl RenderLane for PostProcessChain {
    fn on_viewport_resized(&self, ctx: &mut LaneContext) -> Result<(), LaneError> {
        self.recreate_pool(ctx)?;
        for stage in &self.stages {
            stage.on_viewport_resized(ctx)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool() -> PingPong {
        PingPong {
            hdr: [TextureId(1), TextureId(2)],
            ldr: [TextureId(3), TextureId(4)],
        }
    }

    #[test]
    fn test_ping_pong_never_writes_its_input() {
        let pool = pool();
        let lighting = TextureId(9);
        assert_eq!(pool.next_hdr(lighting), TextureId(1));
        assert_eq!(pool.next_hdr(TextureId(1)), TextureId(2));
        assert_eq!(pool.next_hdr(TextureId(2)), TextureId(1));
        assert_eq!(pool.next_ldr(TextureId(2)), TextureId(3));
        assert_eq!(pool.next_ldr(TextureId(3)), TextureId(4));
    }

    #[test]
    fn test_degrade_without_prior_set() {
        let mut ctx = LaneContext::new();
        assert!(!is_degraded(&ctx, Feature::Bloom));
        degrade(&mut ctx, Feature::Bloom, &"out of memory");
        assert!(is_degraded(&ctx, Feature::Bloom));
        degrade(&mut ctx, Feature::DepthOfField, &"out of memory");
        assert_eq!(ctx.get::<DegradedFeatures>().map(DegradedFeatures::len), Some(2));
    }

    #[test]
    fn test_standard_chain_order() {
        let chain = PostProcessChain::standard(&RendererConfig::default());
        assert_eq!(
            chain.stage_names(),
            [
                "HalfResTransients",
                "Ssao",
                "ForwardComposite",
                "HdrBloom",
                "Tonemap",
                "MotionBlur",
                "DepthOfField",
                "DebugOverlay"
            ]
        );
        assert!(chain.stage::<TonemapLane>().is_some());
    }
}
