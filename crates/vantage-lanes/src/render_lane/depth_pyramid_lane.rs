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

//! Linearized, downsampled depth for screen-space effects.

use super::{
    compute_pipeline, create_storage, encoder, graphics, init_error, release_textures, viewport,
    workgroups, StageError,
};
use crate::cull_lane::VisibleSet;
use crate::post_lane::{is_degraded, HalfResTransientLane};
use bytemuck::{Pod, Zeroable};
use std::sync::RwLock;
use vantage_core::lane::{
    ActiveDebugView, DebugView, DepthPyramid, Feature, FrameFlags, GBufferTargets, Lane,
    LaneContext, LaneError, LaneKind, Ref, RenderLane, Viewport,
};
use vantage_core::renderer::api::{
    ComputePassDescriptor, ComputePipelineId, Extent3D, ResourceState, ShaderDefines, ShaderResourceUsage,
    TextureFormat, TextureId,
};
use vantage_core::renderer::{Camera, GraphicsContext, RenderFlags, ResourceError};

const GROUP_SIZE: u32 = 8;

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
struct PyramidUniforms {
    depth_linearize: [f32; 2],
    source_size: [u32; 2],
}

#[derive(Debug, Clone, Copy)]
struct Pyramid {
    texture: TextureId,
    size: Viewport,
    levels: u32,
}

/// Builds the depth pyramid from the G-buffer depth.
///
/// Level 0 is half resolution and linear. It is built when half-res DOF or
/// visible half-res transients will read it. Coarser levels are a single-tap
/// box reduction of the level above and are only built for SSAO or the
/// pyramid debug view. Consumers lost to degradation do not count. With no
/// consumer, the lane records nothing.
#[derive(Debug)]
pub struct DepthPyramidLane {
    levels: u32,
    pyramid: RwLock<Option<Pyramid>>,
}

impl DepthPyramidLane {
    /// Creates the lane with `levels` mips.
    pub fn new(levels: u32) -> Self {
        Self {
            levels: levels.max(1),
            pyramid: RwLock::new(None),
        }
    }

    /// The pyramid texture, once created.
    pub fn texture(&self) -> Option<TextureId> {
        self.pyramid.read().unwrap().map(|p| p.texture)
    }

    /// Levels this frame's consumers read.
    pub fn levels_for(&self, ctx: &LaneContext) -> u32 {
        let Some(flags) = ctx.get::<FrameFlags>().map(|f| f.0) else {
            return 0;
        };
        let debug_view = flags.contains(RenderFlags::DEBUG_OVERLAY)
            && matches!(
                ctx.get::<ActiveDebugView>(),
                Some(ActiveDebugView(Some(DebugView::DepthPyramid { .. })))
            );
        if debug_view || (flags.contains(RenderFlags::SSAO) && !is_degraded(ctx, Feature::Ssao)) {
            return self.levels;
        }
        let dof = flags.contains(RenderFlags::DOF | RenderFlags::DOF_HALF_RES)
            && !is_degraded(ctx, Feature::DepthOfField);
        let transients = flags.half_res_transients()
            && !is_degraded(ctx, Feature::HalfResTransients)
            && ctx
                .get::<VisibleSet>()
                .is_some_and(|v| HalfResTransientLane::has_work(flags, v));
        u32::from(dof || transients)
    }

    fn pipelines(
        gfx: &GraphicsContext,
    ) -> Result<(ComputePipelineId, ComputePipelineId), ResourceError> {
        let usage = ShaderResourceUsage {
            sampled_textures: 1,
            storage_resources: 1,
            uniform_buffers: 1,
        };
        let linearize = compute_pipeline(
            gfx,
            "depth linearize",
            "depth_linearize.comp",
            ShaderDefines::new(),
            usage,
        )?;
        let reduce = compute_pipeline(
            gfx,
            "depth downsample",
            "depth_downsample.comp",
            ShaderDefines::new(),
            usage,
        )?;
        Ok((linearize, reduce))
    }

    fn create(&self, gfx: &GraphicsContext, full: Viewport) -> Result<(), ResourceError> {
        self.release(gfx);
        let size = full.scaled_down(2);
        let texture = create_storage(gfx, "depth pyramid", size, TextureFormat::R32Float, self.levels)?;
        *self.pyramid.write().unwrap() = Some(Pyramid {
            texture,
            size,
            levels: self.levels,
        });
        Ok(())
    }

    fn release(&self, gfx: &GraphicsContext) {
        if let Some(p) = self.pyramid.write().unwrap().take() {
            release_textures(gfx, "DepthPyramidLane", [p.texture]);
        }
    }

    fn record(&self, ctx: &LaneContext, levels: u32) -> Result<DepthPyramid, LaneError> {
        let gfx = graphics(ctx)?;
        let pyramid = (*self.pyramid.read().unwrap())
            .ok_or(StageError::MissingTarget("DepthPyramidLane"))?;
        let gbuffer = ctx.require::<GBufferTargets>("GBufferTargets")?;
        let camera = ctx.require::<Ref<Camera>>("Ref<Camera>")?.get();
        let encoder = encoder(ctx)?;
        let (linearize, reduce) = Self::pipelines(&gfx).map_err(StageError::from)?;
        let levels = levels.min(pyramid.levels);

        gfx.ledger()
            .ensure_readable(gbuffer.depth)
            .map_err(StageError::from)?;

        for level in 0..levels {
            let base = Extent3D::d2(pyramid.size.width, pyramid.size.height);
            let dst = base.mip_level_size(level);
            let source_size = if level == 0 {
                [pyramid.size.width * 2, pyramid.size.height * 2]
            } else {
                let src = base.mip_level_size(level - 1);
                [src.width, src.height]
            };
            let uniforms = PyramidUniforms {
                depth_linearize: camera.depth_linearize().to_array(),
                source_size,
            };

            gfx.ledger()
                .batch()
                .mip(pyramid.texture, level, ResourceState::UnorderedAccess)
                .submit(encoder)
                .map_err(StageError::from)?;
            if level > 0 {
                gfx.ledger()
                    .ensure_mip_readable(pyramid.texture, level - 1)
                    .map_err(StageError::from)?;
            }
            {
                let mut pass = encoder.begin_compute_pass(&ComputePassDescriptor {
                    label: Some(if level == 0 { "depth linearize" } else { "depth downsample" }),
                });
                if level == 0 {
                    pass.set_pipeline(linearize);
                    pass.bind_texture(0, gbuffer.depth);
                } else {
                    pass.set_pipeline(reduce);
                    pass.bind_texture_level(0, pyramid.texture, level - 1);
                }
                pass.bind_storage_texture(1, pyramid.texture, level);
                pass.set_uniforms(bytemuck::bytes_of(&uniforms));
                pass.dispatch(
                    workgroups(dst.width, GROUP_SIZE),
                    workgroups(dst.height, GROUP_SIZE),
                    1,
                );
            }
            gfx.ledger()
                .batch()
                .mip(pyramid.texture, level, ResourceState::ShaderRead)
                .submit(encoder)
                .map_err(StageError::from)?;
        }

        Ok(DepthPyramid {
            texture: pyramid.texture,
            levels,
        })
    }
}

impl Default for DepthPyramidLane {
    fn default() -> Self {
        Self::new(5)
    }
}

impl Lane for DepthPyramidLane {
    fn strategy_name(&self) -> &'static str {
        "DepthPyramid"
    }

    fn lane_kind(&self) -> LaneKind {
        LaneKind::Geometry
    }

    fn on_initialize(&self, ctx: &mut LaneContext) -> Result<(), LaneError> {
        let gfx = graphics(ctx)?;
        let size = viewport(ctx)?;
        self.create(&gfx, size).map_err(init_error)?;
        Self::pipelines(&gfx).map_err(init_error)?;
        Ok(())
    }

    fn execute(&self, ctx: &mut LaneContext) -> Result<(), LaneError> {
        let levels = self.levels_for(ctx);
        if levels == 0 {
            ctx.remove::<DepthPyramid>();
            log::trace!("DepthPyramid: no consumer, skipped");
            return Ok(());
        }
        let pyramid = self.record(ctx, levels)?;
        ctx.insert(pyramid);
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

impl RenderLane for DepthPyramidLane {
    fn on_viewport_resized(&self, ctx: &mut LaneContext) -> Result<(), LaneError> {
        let gfx = graphics(ctx)?;
        let size = viewport(ctx)?;
        self.create(&gfx, size).map_err(init_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::post_lane::degrade;
    use vantage_core::renderer::LightId;

    fn frame(flags: RenderFlags, visible: VisibleSet) -> LaneContext {
        let mut ctx = LaneContext::new();
        ctx.insert(FrameFlags(flags));
        ctx.insert(visible);
        ctx
    }

    #[test]
    fn test_levels_follow_consumers() {
        let lane = DepthPyramidLane::new(5);
        let levels = |flags| lane.levels_for(&frame(flags, VisibleSet::default()));
        assert_eq!(levels(RenderFlags::empty()), 0);
        assert_eq!(levels(RenderFlags::SSAO), 5);
        assert_eq!(levels(RenderFlags::DOF), 0);
        assert_eq!(levels(RenderFlags::DOF | RenderFlags::DOF_HALF_RES), 1);
        assert_eq!(levels(RenderFlags::DEBUG_OVERLAY), 0);
        assert_eq!(lane.levels_for(&LaneContext::new()), 0);

        let mut ctx = frame(RenderFlags::DEBUG_OVERLAY, VisibleSet::default());
        ctx.insert(ActiveDebugView(Some(DebugView::DepthPyramid { level: 2 })));
        assert_eq!(lane.levels_for(&ctx), 5);
    }

    #[test]
    fn test_flags_without_a_consumer_skip_the_pyramid() {
        let lane = DepthPyramidLane::new(5);

        // Half-res DOF is a sub-option of DOF.
        assert_eq!(lane.levels_for(&frame(RenderFlags::DOF_HALF_RES, VisibleSet::default())), 0);

        // Transient flags with nothing transient in view.
        let transients = RenderFlags::LIGHTSHAFT | RenderFlags::PARTICLE_SYSTEMS;
        assert_eq!(lane.levels_for(&frame(transients, VisibleSet::default())), 0);
        let shaft = VisibleSet {
            lightshafts: vec![LightId(3)],
            ..VisibleSet::default()
        };
        assert_eq!(lane.levels_for(&frame(transients, shaft.clone())), 1);
        assert_eq!(lane.levels_for(&frame(RenderFlags::PARTICLE_SYSTEMS, shaft)), 0);

        // Degraded consumers no longer count.
        let mut ctx = frame(RenderFlags::SSAO | RenderFlags::DOF | RenderFlags::DOF_HALF_RES, VisibleSet::default());
        degrade(&mut ctx, Feature::Ssao, &"out of memory");
        assert_eq!(lane.levels_for(&ctx), 1);
        degrade(&mut ctx, Feature::DepthOfField, &"out of memory");
        assert_eq!(lane.levels_for(&ctx), 0);
    }
}
