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

//! Tile-based motion blur: velocity is reduced to a coarse tile grid,
//! dilated across neighboring tiles, then a fullscreen reconstruction
//! samples along the dilated velocity.

use super::{degrade, is_degraded, ping_pong, scene_color, PostStage, LDR_FORMAT};
use crate::render_lane::{
    compute_pipeline, create_storage, encoder, fullscreen_pipeline, graphics, init_error,
    release_textures, viewport, workgroups, Dispatch, Fullscreen, Input, StageError,
};
use bytemuck::{Pod, Zeroable};
use std::sync::RwLock;
use vantage_core::lane::{
    Feature, FrameFlags, GBufferTargets, Lane, LaneContext, LaneError, LaneKind, MotionBlurActive,
    RenderLane, SceneColor, Viewport,
};
use vantage_core::math::LinearRgba;
use vantage_core::renderer::api::{
    BlendMode, ComputePipelineId, RenderPassColorAttachment, ShaderDefines, ShaderResourceUsage,
    TextureFormat, TextureId,
};
use vantage_core::renderer::{GraphicsContext, RenderFlags, ResourceError};

/// Format of the tile velocity grids.
pub const TILE_FORMAT: TextureFormat = TextureFormat::Rg16Float;

const TILE_GROUP: u32 = 8;

/// Uniform block shared by the three motion-blur passes.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct MotionBlurUniforms {
    /// Tile size in pixels, then the tile grid size.
    pub tiles: [f32; 4],
    /// Viewport size and its inverse.
    pub viewport: [f32; 4],
}

impl MotionBlurUniforms {
    /// Builds the block for a viewport and its tile grid.
    pub fn new(tile_size: u32, grid: Viewport, size: Viewport) -> Self {
        Self {
            tiles: [tile_size as f32, grid.width as f32, grid.height as f32, 0.0],
            viewport: [
                size.width as f32,
                size.height as f32,
                1.0 / size.width as f32,
                1.0 / size.height as f32,
            ],
        }
    }
}

/// Size of the tile grid covering `size`; partial tiles count.
pub fn tile_grid(size: Viewport, tile_size: u32) -> Viewport {
    let tile = tile_size.max(1);
    Viewport::new(size.width.div_ceil(tile), size.height.div_ceil(tile))
}

#[derive(Debug, Clone, Copy)]
struct TileTargets {
    tile_max: TextureId,
    neighbor_max: TextureId,
    grid: Viewport,
}

/// Motion blur over the tonemapped image.
///
/// Enabled by [`RenderFlags::MOTION_BLUR`] when the frame's
/// [`MotionBlurActive`] allows it.
#[derive(Debug)]
pub struct MotionBlurLane {
    tile_size: u32,
    targets: RwLock<Option<TileTargets>>,
}

impl Default for MotionBlurLane {
    fn default() -> Self {
        Self::new(16)
    }
}

impl MotionBlurLane {
    /// Creates the stage with square tiles of `tile_size` pixels.
    pub fn new(tile_size: u32) -> Self {
        Self {
            tile_size: tile_size.max(1),
            targets: RwLock::new(None),
        }
    }

    /// Tile size in pixels.
    pub fn tile_size(&self) -> u32 {
        self.tile_size
    }

    fn create_targets(&self, ctx: &mut LaneContext) -> Result<(), LaneError> {
        let gfx = graphics(ctx)?;
        let grid = tile_grid(viewport(ctx)?, self.tile_size);
        self.release(&gfx);
        if is_degraded(ctx, Feature::MotionBlur) {
            return Ok(());
        }
        let tile_max = match create_storage(&gfx, "motion blur tile max", grid, TILE_FORMAT, 1) {
            Ok(id) => id,
            Err(e) => {
                degrade(ctx, Feature::MotionBlur, &e);
                return Ok(());
            }
        };
        match create_storage(&gfx, "motion blur neighbor max", grid, TILE_FORMAT, 1) {
            Ok(neighbor_max) => {
                *self.targets.write().unwrap() = Some(TileTargets {
                    tile_max,
                    neighbor_max,
                    grid,
                })
            }
            Err(e) => {
                release_textures(&gfx, "MotionBlurLane", [tile_max]);
                degrade(ctx, Feature::MotionBlur, &e);
            }
        }
        Ok(())
    }

    fn release(&self, gfx: &GraphicsContext) {
        if let Some(t) = self.targets.write().unwrap().take() {
            release_textures(gfx, "MotionBlurLane", [t.tile_max, t.neighbor_max]);
        }
    }

    fn reduction(gfx: &GraphicsContext, source: &str) -> Result<ComputePipelineId, ResourceError> {
        compute_pipeline(
            gfx,
            source,
            source,
            ShaderDefines::new().define_int("TILE_GROUP", i64::from(TILE_GROUP)),
            ShaderResourceUsage {
                sampled_textures: 1,
                storage_resources: 1,
                uniform_buffers: 1,
            },
        )
    }

    fn record(&self, ctx: &LaneContext) -> Result<TextureId, LaneError> {
        let gfx = graphics(ctx)?;
        let targets = (*self.targets.read().unwrap()).ok_or(StageError::MissingTarget("MotionBlurLane"))?;
        let input = scene_color(ctx)?;
        let output = ping_pong(ctx)?.next_ldr(input);
        let gbuffer = *ctx.require::<GBufferTargets>("GBufferTargets")?;
        let size = viewport(ctx)?;
        let encoder = encoder(ctx)?;

        let uniforms = MotionBlurUniforms::new(self.tile_size, targets.grid, size);
        let groups = [
            workgroups(targets.grid.width, TILE_GROUP),
            workgroups(targets.grid.height, TILE_GROUP),
            1,
        ];
        Dispatch {
            label: "motion blur tile max",
            pipeline: Self::reduction(&gfx, "motion_blur_tile_max.comp").map_err(StageError::from)?,
            inputs: &[Input::Texture(gbuffer.velocity)],
            output: (targets.tile_max, 0),
            uniforms: bytemuck::bytes_of(&uniforms),
            groups,
        }
        .record(&gfx, encoder)?;
        Dispatch {
            label: "motion blur neighbor max",
            pipeline: Self::reduction(&gfx, "motion_blur_neighbor_max.comp").map_err(StageError::from)?,
            inputs: &[Input::Texture(targets.tile_max)],
            output: (targets.neighbor_max, 0),
            uniforms: bytemuck::bytes_of(&uniforms),
            groups,
        }
        .record(&gfx, encoder)?;

        let reconstruct = fullscreen_pipeline(
            &gfx,
            "motion blur",
            "motion_blur.frag",
            ShaderDefines::new(),
            4,
            LDR_FORMAT,
            BlendMode::Opaque,
        )
        .map_err(StageError::from)?;
        Fullscreen {
            label: "motion blur",
            pipeline: reconstruct,
            target: RenderPassColorAttachment::cleared(output, LinearRgba::BLACK),
            inputs: &[
                Input::Texture(input),
                Input::Texture(gbuffer.velocity),
                Input::Texture(targets.neighbor_max),
                Input::Texture(gbuffer.depth),
            ],
            uniforms: bytemuck::bytes_of(&uniforms),
        }
        .record(&gfx, encoder)?;
        Ok(output)
    }
}

impl Lane for MotionBlurLane {
    fn strategy_name(&self) -> &'static str {
        "MotionBlur"
    }

    fn lane_kind(&self) -> LaneKind {
        LaneKind::PostProcess
    }

    fn estimate_cost(&self, _ctx: &LaneContext) -> f32 {
        0.3
    }

    fn on_initialize(&self, ctx: &mut LaneContext) -> Result<(), LaneError> {
        self.create_targets(ctx)?;
        let gfx = graphics(ctx)?;
        Self::reduction(&gfx, "motion_blur_tile_max.comp").map_err(init_error)?;
        Self::reduction(&gfx, "motion_blur_neighbor_max.comp").map_err(init_error)?;
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

impl RenderLane for MotionBlurLane {
    fn on_viewport_resized(&self, ctx: &mut LaneContext) -> Result<(), LaneError> {
        self.create_targets(ctx)
    }
}

impl PostStage for MotionBlurLane {
    fn enabled(&self, ctx: &LaneContext) -> bool {
        ctx.get::<FrameFlags>()
            .is_some_and(|f| f.0.contains(RenderFlags::MOTION_BLUR))
            && ctx.get::<MotionBlurActive>().is_some_and(|a| a.0)
            && !is_degraded(ctx, Feature::MotionBlur)
            && self.targets.read().unwrap().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tile_grid_counts_partial_tiles() {
        assert_eq!(tile_grid(Viewport::new(1920, 1080), 16), Viewport::new(120, 68));
        assert_eq!(tile_grid(Viewport::new(8, 8), 16), Viewport::new(1, 1));
    }

    #[test]
    fn test_disabled_until_allowed() {
        let lane = MotionBlurLane::new(16);
        let mut ctx = LaneContext::new();
        ctx.insert(FrameFlags(RenderFlags::MOTION_BLUR));
        ctx.insert(MotionBlurActive(false));
        assert!(!lane.enabled(&ctx));
        ctx.insert(MotionBlurActive(true));
        // No targets before initialization.
        assert!(!lane.enabled(&ctx));
    }
}
