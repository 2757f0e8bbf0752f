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

//! Tonemap: HDR to LDR with exposure, bloom, fog and color correction.

use super::{ping_pong, scene_color, PostStage, LDR_FORMAT};
use crate::render_lane::{
    encoder, fullscreen_pipeline, graphics, init_error, Fullscreen, Input, StageError,
};
use bytemuck::{Pod, Zeroable};
use vantage_core::config::ExposureMode;
use vantage_core::lane::{
    BloomTexture, FrameFlags, GBufferTargets, Lane, LaneContext, LaneError, LaneKind,
    LuminanceTexture, Ref, RenderLane, SceneColor,
};
use vantage_core::math::{LinearRgba, Mat4};
use vantage_core::renderer::api::{BlendMode, RenderPassColorAttachment, ShaderDefines};
use vantage_core::renderer::{Camera, RenderFlags};
use vantage_core::EnvironmentValues;

/// Uniform block of the tonemap pass.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct TonemapUniforms {
    /// Reconstructs world positions for fog.
    pub inverse_view_projection: [[f32; 4]; 4],
    /// Exposure, bloom intensity, bloom threshold, unused.
    pub exposure: [f32; 4],
    /// Contrast, contrast bias, saturation, unused.
    pub color: [f32; 4],
    /// Sharpen strength, strength / 4, limit, unused.
    pub sharpen: [f32; 4],
    /// Fog color.
    pub fog_color: [f32; 4],
    /// Distance fog start, end, density, max.
    pub fog_distance: [f32; 4],
    /// Height fog base, falloff, density, max.
    pub fog_vertical: [f32; 4],
}

impl TonemapUniforms {
    /// Builds the block from the frame's environment.
    pub fn new(env: &EnvironmentValues, inverse_view_projection: &Mat4) -> Self {
        let sharpen = env.sharpen_vector();
        Self {
            inverse_view_projection: inverse_view_projection.to_cols_array_2d(),
            exposure: [env.exposure, env.bloom_intensity, env.bloom_threshold, 0.0],
            color: [
                env.contrast,
                env.color_correction_bias(),
                env.saturation,
                0.0,
            ],
            sharpen: sharpen.extend(0.0).to_array(),
            fog_color: env.fog_color.to_vec4().to_array(),
            fog_distance: env.fog_distance.to_array(),
            fog_vertical: env.fog_vertical.to_array(),
        }
    }
}

/// Maps the HDR head into the LDR half of the pool. Always runs.
#[derive(Debug, Default)]
pub struct TonemapLane;

impl TonemapLane {
    /// Creates the stage.
    pub fn new() -> Self {
        Self
    }

    fn defines(flags: RenderFlags, bloom: bool, auto_exposure: bool) -> ShaderDefines {
        ShaderDefines::new()
            .define_if(
                "GAMMA_CORRECTION_FAST",
                flags.contains(RenderFlags::GAMMA_CORRECTION_FAST),
            )
            .define_if("BLOOM", bloom)
            .define_if("AUTO_EXPOSURE", auto_exposure)
            .define("FOG")
    }
}

impl Lane for TonemapLane {
    fn strategy_name(&self) -> &'static str {
        "Tonemap"
    }

    fn lane_kind(&self) -> LaneKind {
        LaneKind::PostProcess
    }

    fn estimate_cost(&self, _ctx: &LaneContext) -> f32 {
        0.2
    }

    fn on_initialize(&self, ctx: &mut LaneContext) -> Result<(), LaneError> {
        let gfx = graphics(ctx)?;
        let flags = ctx.get::<FrameFlags>().map_or_else(RenderFlags::default, |f| f.0);
        fullscreen_pipeline(
            &gfx,
            "tonemap",
            "tonemap.frag",
            Self::defines(flags, false, false),
            2,
            LDR_FORMAT,
            BlendMode::Opaque,
        )
        .map_err(init_error)?;
        Ok(())
    }

    fn execute(&self, ctx: &mut LaneContext) -> Result<(), LaneError> {
        let output = {
            let gfx = graphics(ctx)?;
            let flags = ctx.require::<FrameFlags>("FrameFlags")?.0;
            let input = scene_color(ctx)?;
            let gbuffer = *ctx.require::<GBufferTargets>("GBufferTargets")?;
            let output = ping_pong(ctx)?.next_ldr(input);
            let default_env = EnvironmentValues::default();
            let env = ctx
                .get::<Ref<EnvironmentValues>>()
                .map_or(&default_env, |e| e.get());
            let inverse = ctx
                .get::<Ref<Camera>>()
                .map_or(Mat4::IDENTITY, |c| *c.get().inverse_view_projection());
            let bloom = ctx.get::<BloomTexture>().map(|b| b.0);
            let luminance = ctx
                .get::<LuminanceTexture>()
                .map(|l| l.0)
                .filter(|_| env.exposure_mode != ExposureMode::Manual);

            let mut inputs = vec![Input::Texture(input), Input::Texture(gbuffer.depth)];
            inputs.extend(bloom.map(Input::Texture));
            inputs.extend(luminance.map(Input::Texture));
            let pipeline = fullscreen_pipeline(
                &gfx,
                "tonemap",
                "tonemap.frag",
                Self::defines(flags, bloom.is_some(), luminance.is_some()),
                inputs.len() as u32,
                LDR_FORMAT,
                BlendMode::Opaque,
            )
            .map_err(StageError::from)?;
            let uniforms = TonemapUniforms::new(env, &inverse);
            Fullscreen {
                label: "tonemap",
                pipeline,
                target: RenderPassColorAttachment::cleared(output, LinearRgba::BLACK),
                inputs: &inputs,
                uniforms: bytemuck::bytes_of(&uniforms),
            }
            .record(&gfx, encoder(ctx)?)?;
            output
        };
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

impl RenderLane for TonemapLane {}

impl PostStage for TonemapLane {
    fn enabled(&self, _ctx: &LaneContext) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_uniforms_carry_color_correction() {
        let env = EnvironmentValues {
            contrast: 1.5,
            contrast_center: 0.5,
            sharpen_strength: 0.8,
            ..Default::default()
        };
        let u = TonemapUniforms::new(&env, &Mat4::IDENTITY);
        assert_relative_eq!(u.color[0], 1.5);
        assert_relative_eq!(u.color[1], env.color_correction_bias());
        assert_relative_eq!(u.sharpen[1], 0.2);
    }

    #[test]
    fn test_defines_follow_inputs() {
        let defines = TonemapLane::defines(RenderFlags::GAMMA_CORRECTION_FAST, true, false);
        assert!(defines.contains("BLOOM"));
        assert!(defines.contains("GAMMA_CORRECTION_FAST"));
        assert!(!defines.contains("AUTO_EXPOSURE"));
    }
}
