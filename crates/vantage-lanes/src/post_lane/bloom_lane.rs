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

//! HDR measurement and bloom.
//!
//! Produces side outputs only: the 1×1 [`LuminanceTexture`] and the
//! accumulated [`BloomTexture`]. The chain head passes through unchanged.

use super::{degrade, effects, is_degraded, scene_color, PostStage, SeparableBlur, HDR_FORMAT};
use crate::render_lane::{
    compute_pipeline, create_storage, create_target, encoder, fullscreen_pipeline, graphics,
    init_error, release_textures, viewport, Dispatch, Fullscreen, Input, StageError,
};
use bytemuck::{Pod, Zeroable};
use std::sync::RwLock;
use vantage_core::config::{AdaptationMode, ExposureMode};
use vantage_core::lane::{
    BloomTexture, Feature, FrameFlags, Lane, LaneContext, LaneError, LaneKind, LuminanceTexture,
    Ref, RenderLane, Viewport,
};
use vantage_core::math::LinearRgba;
use vantage_core::renderer::api::{
    BlendMode, ComputePipelineId, RenderPassColorAttachment, RenderPipelineId, ShaderDefines,
    ShaderResourceUsage, TextureFormat, TextureId,
};
use vantage_core::renderer::{
    CommandEncoder, GraphicsContext, NormalizedEffects, RenderFlags, ResourceError,
};
use vantage_core::EnvironmentValues;

/// Bloom uniform block.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct BloomUniforms {
    /// Bright-pass threshold, intensity, layer index, layer count.
    pub params: [f32; 4],
}

/// Luminance reduction uniform block.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct LuminanceUniforms {
    /// Manual exposure, adaptation speed, unused, unused.
    pub params: [f32; 4],
}

#[derive(Debug, Clone, Copy)]
struct BloomLayer {
    texture: TextureId,
    scratch: TextureId,
    size: Viewport,
}

#[derive(Debug, Clone, Default)]
struct HdrTargets {
    luminance: Option<TextureId>,
    bright: Option<TextureId>,
    layers: Vec<BloomLayer>,
}

impl HdrTargets {
    fn textures(&self) -> Vec<TextureId> {
        let mut out: Vec<TextureId> = self.luminance.into_iter().chain(self.bright).collect();
        for layer in &self.layers {
            out.push(layer.texture);
            out.push(layer.scratch);
        }
        out
    }
}

/// Which bloom chain runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BloomVariant {
    /// Downsample, blur per layer, accumulate upwards.
    Desktop,
    /// Downsample, accumulate upwards, no blur, fewer layers.
    Mobile,
}

impl BloomVariant {
    /// The variant selected by `flags`.
    pub fn from_flags(flags: RenderFlags) -> Self {
        if flags.contains(RenderFlags::BLOOM_MOBILE) {
            BloomVariant::Mobile
        } else {
            BloomVariant::Desktop
        }
    }
}

/// Luminance measurement plus bloom. Enabled by [`RenderFlags::HDR`].
#[derive(Debug)]
pub struct BloomLane {
    layers: u32,
    mobile_layers: u32,
    adaptation: RwLock<AdaptationMode>,
    targets: RwLock<HdrTargets>,
}

impl Default for BloomLane {
    fn default() -> Self {
        Self::new(4, 3)
    }
}

impl BloomLane {
    /// Creates the stage with the layer counts of both variants.
    pub fn new(layers: u32, mobile_layers: u32) -> Self {
        Self {
            layers: layers.max(1),
            mobile_layers: mobile_layers.max(1),
            adaptation: RwLock::new(AdaptationMode::default()),
            targets: RwLock::new(HdrTargets::default()),
        }
    }

    /// Sets luminance adaptation.
    pub fn set_adaptation(&self, mode: AdaptationMode) {
        *self.adaptation.write().unwrap() = mode;
    }

    /// Layer count of a variant.
    pub fn layer_count(&self, variant: BloomVariant) -> u32 {
        match variant {
            BloomVariant::Desktop => self.layers,
            BloomVariant::Mobile => self.mobile_layers,
        }
    }

    fn create_targets(&self, ctx: &mut LaneContext) -> Result<(), LaneError> {
        let gfx = graphics(ctx)?;
        let size = viewport(ctx)?;
        self.release(&gfx);

        let mut targets = HdrTargets::default();
        match create_storage(&gfx, "luminance", Viewport::new(1, 1), TextureFormat::R32Float, 1) {
            Ok(id) => targets.luminance = Some(id),
            Err(e) => degrade(ctx, Feature::Bloom, &e),
        }
        if !is_degraded(ctx, Feature::Bloom) {
            if let Err(e) = self.create_chain(&gfx, size, &mut targets) {
                degrade(ctx, Feature::Bloom, &e);
            }
        }
        *self.targets.write().unwrap() = targets;
        Ok(())
    }

    fn create_chain(
        &self,
        gfx: &GraphicsContext,
        size: Viewport,
        targets: &mut HdrTargets,
    ) -> Result<(), ResourceError> {
        let half = size.scaled_down(2);
        targets.bright = Some(create_target(gfx, "bloom bright", half, HDR_FORMAT)?);
        for layer in 0..self.layers.max(self.mobile_layers) {
            let layer_size = half.scaled_down(1 << (layer + 1));
            let texture = create_target(gfx, &format!("bloom layer {layer}"), layer_size, HDR_FORMAT)?;
            let scratch = match create_target(gfx, &format!("bloom scratch {layer}"), layer_size, HDR_FORMAT) {
                Ok(id) => id,
                Err(e) => {
                    release_textures(gfx, "BloomLane", [texture]);
                    return Err(e);
                }
            };
            targets.layers.push(BloomLayer {
                texture,
                scratch,
                size: layer_size,
            });
        }
        Ok(())
    }

    fn release(&self, gfx: &GraphicsContext) {
        let old = std::mem::take(&mut *self.targets.write().unwrap());
        release_textures(gfx, "BloomLane", old.textures());
    }

    fn luminance_pipeline(
        gfx: &GraphicsContext,
        exposure: ExposureMode,
        adaptation: AdaptationMode,
    ) -> Result<ComputePipelineId, ResourceError> {
        let defines = ShaderDefines::new()
            .define_if("AUTO_EXPOSURE", exposure != ExposureMode::Manual)
            .define_if("ADAPTATION", adaptation == AdaptationMode::Enabled)
            .define_if("ADAPTATION_PREDEFINED", adaptation == AdaptationMode::Predefined);
        compute_pipeline(
            gfx,
            "luminance",
            "luminance.comp",
            defines,
            ShaderResourceUsage {
                sampled_textures: 1,
                storage_resources: 1,
                uniform_buffers: 1,
            },
        )
    }

    fn bloom_pipeline(
        gfx: &GraphicsContext,
        label: &str,
        fragment: &str,
        blend: BlendMode,
    ) -> Result<RenderPipelineId, ResourceError> {
        fullscreen_pipeline(gfx, label, fragment, ShaderDefines::new(), 1, HDR_FORMAT, blend)
    }

    #[allow(clippy::too_many_arguments)]
    fn record_bloom(
        gfx: &GraphicsContext,
        encoder: &mut dyn CommandEncoder,
        input: TextureId,
        bright: TextureId,
        layers: &[BloomLayer],
        variant: BloomVariant,
        effects: &NormalizedEffects,
        env: &EnvironmentValues,
    ) -> Result<TextureId, StageError> {
        let count = layers.len() as f32;
        let uniforms = |layer: usize| BloomUniforms {
            params: [env.bloom_threshold, env.bloom_intensity, layer as f32, count],
        };

        let bright_pass = Self::bloom_pipeline(gfx, "bloom bright", "bloom_bright.frag", BlendMode::Opaque)?;
        Fullscreen {
            label: "bloom bright",
            pipeline: bright_pass,
            target: RenderPassColorAttachment::cleared(bright, LinearRgba::TRANSPARENT),
            inputs: &[Input::Texture(input)],
            uniforms: bytemuck::bytes_of(&uniforms(0)),
        }
        .record(gfx, encoder)?;

        let downsample = Self::bloom_pipeline(gfx, "bloom downsample", "bloom_downsample.frag", BlendMode::Opaque)?;
        let blur = match variant {
            BloomVariant::Desktop => Some(SeparableBlur::create(
                gfx,
                HDR_FORMAT,
                ShaderDefines::new().define("BLOOM"),
            )?),
            BloomVariant::Mobile => None,
        };
        let spread = NormalizedEffects::kernel_radius(effects.bloom);
        let mut source = bright;
        for (index, layer) in layers.iter().enumerate() {
            Fullscreen {
                label: "bloom downsample",
                pipeline: downsample,
                target: RenderPassColorAttachment::cleared(layer.texture, LinearRgba::TRANSPARENT),
                inputs: &[Input::Texture(source)],
                uniforms: bytemuck::bytes_of(&uniforms(index)),
            }
            .record(gfx, encoder)?;
            if let Some(blur) = &blur {
                // Coarser layers cover more screen per texel.
                let radius = (spread >> index).max(1);
                blur.record(gfx, encoder, layer.texture, layer.scratch, layer.texture, radius)?;
            }
            source = layer.texture;
        }

        let upsample = Self::bloom_pipeline(gfx, "bloom upsample", "bloom_upsample.frag", BlendMode::Additive)?;
        for index in (0..layers.len().saturating_sub(1)).rev() {
            Fullscreen {
                label: "bloom upsample",
                pipeline: upsample,
                target: RenderPassColorAttachment::loaded(layers[index].texture),
                inputs: &[Input::Texture(layers[index + 1].texture)],
                uniforms: bytemuck::bytes_of(&uniforms(index)),
            }
            .record(gfx, encoder)?;
        }
        Ok(layers.first().map_or(bright, |l| l.texture))
    }

    fn record(&self, ctx: &LaneContext) -> Result<(Option<TextureId>, Option<TextureId>), LaneError> {
        let gfx = graphics(ctx)?;
        let flags = ctx.require::<FrameFlags>("FrameFlags")?.0;
        let input = scene_color(ctx)?;
        let effects = effects(ctx)?;
        let default_env = EnvironmentValues::default();
        let env = ctx
            .get::<Ref<EnvironmentValues>>()
            .map_or(&default_env, |e| e.get());
        let encoder = encoder(ctx)?;
        let targets = self.targets.read().unwrap().clone();
        let adaptation = *self.adaptation.read().unwrap();

        let luminance = match targets.luminance {
            Some(luminance) => {
                let pipeline = Self::luminance_pipeline(&gfx, env.exposure_mode, adaptation)
                    .map_err(StageError::from)?;
                let uniforms = LuminanceUniforms {
                    params: [env.exposure, env.adaptation_speed, 0.0, 0.0],
                };
                Dispatch {
                    label: "luminance",
                    pipeline,
                    inputs: &[Input::Texture(input)],
                    output: (luminance, 0),
                    uniforms: bytemuck::bytes_of(&uniforms),
                    groups: [1, 1, 1],
                }
                .record(&gfx, encoder)?;
                Some(luminance)
            }
            None => None,
        };

        let bloom = match targets.bright {
            Some(bright) if flags.bloom_enabled() && !is_degraded(ctx, Feature::Bloom) => {
                let variant = BloomVariant::from_flags(flags);
                let count = (self.layer_count(variant) as usize).min(targets.layers.len());
                Some(Self::record_bloom(
                    &gfx,
                    encoder,
                    input,
                    bright,
                    &targets.layers[..count],
                    variant,
                    &effects,
                    env,
                )?)
            }
            _ => None,
        };
        log::trace!(
            "BloomLane: luminance {:?}, bloom {:?}",
            luminance,
            bloom
        );
        Ok((luminance, bloom))
    }
}

impl Lane for BloomLane {
    fn strategy_name(&self) -> &'static str {
        "HdrBloom"
    }

    fn lane_kind(&self) -> LaneKind {
        LaneKind::PostProcess
    }

    fn estimate_cost(&self, _ctx: &LaneContext) -> f32 {
        0.1 * self.layers as f32
    }

    fn on_initialize(&self, ctx: &mut LaneContext) -> Result<(), LaneError> {
        self.create_targets(ctx)?;
        let gfx = graphics(ctx)?;
        Self::luminance_pipeline(&gfx, ExposureMode::Manual, *self.adaptation.read().unwrap())
            .map_err(init_error)?;
        Self::bloom_pipeline(&gfx, "bloom bright", "bloom_bright.frag", BlendMode::Opaque)
            .map_err(init_error)?;
        Ok(())
    }

    fn execute(&self, ctx: &mut LaneContext) -> Result<(), LaneError> {
        let (luminance, bloom) = self.record(ctx)?;
        if let Some(luminance) = luminance {
            ctx.insert(LuminanceTexture(luminance));
        }
        if let Some(bloom) = bloom {
            ctx.insert(BloomTexture(bloom));
        }
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

impl RenderLane for BloomLane {
    fn on_viewport_resized(&self, ctx: &mut LaneContext) -> Result<(), LaneError> {
        self.create_targets(ctx)
    }
}

impl PostStage for BloomLane {
    fn enabled(&self, ctx: &LaneContext) -> bool {
        ctx.get::<FrameFlags>()
            .is_some_and(|f| f.0.contains(RenderFlags::HDR))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_variant_from_flags() {
        assert_eq!(BloomVariant::from_flags(RenderFlags::BLOOM), BloomVariant::Desktop);
        assert_eq!(
            BloomVariant::from_flags(RenderFlags::BLOOM | RenderFlags::BLOOM_MOBILE),
            BloomVariant::Mobile
        );
    }

    #[test]
    fn test_mobile_uses_fewer_layers() {
        let lane = BloomLane::new(4, 3);
        assert_eq!(lane.layer_count(BloomVariant::Desktop), 4);
        assert_eq!(lane.layer_count(BloomVariant::Mobile), 3);
    }

    #[test]
    fn test_disabled_without_hdr() {
        let lane = BloomLane::default();
        let mut ctx = LaneContext::new();
        assert!(!lane.enabled(&ctx));
        ctx.insert(FrameFlags(RenderFlags::HDR));
        assert!(lane.enabled(&ctx));
    }
}
