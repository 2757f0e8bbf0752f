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

//! Renderer configuration and per-scene environment values.

use crate::math::{interpolate, LinearRgba, Vec3, Vec4};
use crate::renderer::effects::EffectParams;
use crate::renderer::flags::RenderFlags;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The RON text could not be parsed.
    #[error("invalid renderer configuration: {0}")]
    Parse(#[from] ron::error::SpannedError),
    /// A value is outside its valid range.
    #[error("invalid value for '{field}': {reason}")]
    InvalidValue {
        /// Field name.
        field: &'static str,
        /// Why it was rejected.
        reason: String,
    },
}

/// How omni lights render their shadows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum OmniShadowMode {
    /// Six perspective faces.
    #[default]
    Cube,
    /// Two hemispherical faces.
    Paraboloid,
}

/// Level-of-detail switch distances.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LodDistances {
    /// Distance beyond which meshes use the mid bucket.
    pub lod1: f32,
    /// Distance beyond which meshes use the far bucket.
    pub lod2: f32,
}

impl Default for LodDistances {
    fn default() -> Self {
        Self {
            lod1: 50.0,
            lod2: 100.0,
        }
    }
}

impl LodDistances {
    /// Squared thresholds, compared against squared distances.
    pub fn squared(&self) -> (f32, f32) {
        (self.lod1 * self.lod1, self.lod2 * self.lod2)
    }
}

/// Static renderer settings, fixed for a benchmark run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    /// Edge of every shadow map face, in texels.
    pub shadow_map_resolution: u32,
    /// Shadow layout of omni lights.
    pub omni_shadow_mode: OmniShadowMode,
    /// Half extent of directional shadow frusta without a box.
    pub directional_shadow_extent: f32,
    /// Levels of the downsampled depth pyramid.
    pub depth_pyramid_levels: u32,
    /// SSAO resolution divisor.
    pub ssao_downscale: u32,
    /// Bloom layers of the desktop chain.
    pub bloom_layers: u32,
    /// Bloom layers of the mobile chain.
    pub bloom_mobile_layers: u32,
    /// Motion blur tile edge, in pixels.
    pub motion_blur_tile_size: u32,
    /// Seconds of animation before previous-frame matrices are trusted.
    pub motion_blur_warmup_time: f32,
    /// Luminance adaptation of the HDR stage.
    pub adaptation: AdaptationMode,
    /// LOD switch distances.
    pub lod_distances: LodDistances,
    /// Near plane used when culling cannot tighten it.
    pub default_near: f32,
    /// Far plane used when nothing survives culling.
    pub default_far: f32,
    /// Added to the farthest visible depth.
    pub far_plane_padding: f32,
    /// Check programs against device binding limits.
    pub conformance_checks: bool,
    /// Flags at startup.
    pub initial_flags: RenderFlags,
    /// Author-set effect strengths.
    pub effects: EffectParams,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            shadow_map_resolution: 2048,
            omni_shadow_mode: OmniShadowMode::Cube,
            directional_shadow_extent: 50.0,
            depth_pyramid_levels: 5,
            ssao_downscale: 2,
            bloom_layers: 4,
            bloom_mobile_layers: 3,
            motion_blur_tile_size: 16,
            motion_blur_warmup_time: 0.1,
            adaptation: AdaptationMode::Disabled,
            lod_distances: LodDistances::default(),
            default_near: 0.1,
            default_far: 2000.0,
            far_plane_padding: 5.0,
            conformance_checks: false,
            initial_flags: RenderFlags::default(),
            effects: EffectParams::default(),
        }
    }
}

impl RendererConfig {
    /// Parses a RON document. Missing fields keep their defaults.
    pub fn from_ron_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = ron::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects values the stages cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("shadow_map_resolution", self.shadow_map_resolution),
            ("depth_pyramid_levels", self.depth_pyramid_levels),
            ("ssao_downscale", self.ssao_downscale),
            ("bloom_layers", self.bloom_layers),
            ("bloom_mobile_layers", self.bloom_mobile_layers),
            ("motion_blur_tile_size", self.motion_blur_tile_size),
        ];
        for (field, value) in positive {
            if value == 0 {
                return Err(ConfigError::InvalidValue {
                    field,
                    reason: "must be at least 1".into(),
                });
            }
        }
        if !(self.default_near > 0.0 && self.default_far > self.default_near) {
            return Err(ConfigError::InvalidValue {
                field: "default_far",
                reason: format!(
                    "need 0 < near < far, got {} / {}",
                    self.default_near, self.default_far
                ),
            });
        }
        if self.lod_distances.lod2 < self.lod_distances.lod1 {
            return Err(ConfigError::InvalidValue {
                field: "lod_distances",
                reason: "lod2 must not be closer than lod1".into(),
            });
        }
        Ok(())
    }
}

/// How exposure is determined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ExposureMode {
    /// Fixed exposure value.
    #[default]
    Manual,
    /// Derived from measured luminance.
    Auto,
    /// Measured luminance with temporal adaptation.
    Adaptive,
    /// Authored per shot.
    Predefined,
}

/// Temporal adaptation of measured luminance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AdaptationMode {
    /// Adapt over time.
    Enabled,
    /// Use the current frame's measurement.
    #[default]
    Disabled,
    /// Use authored values, for reproducible benchmark runs.
    Predefined,
}

/// Tunables read once per frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvironmentValues {
    /// Sky color for indirect light.
    pub sky_color: LinearRgba,
    /// Sky intensity.
    pub sky_intensity: f32,
    /// Indirect lighting multiplier.
    pub indirect_factor: f32,
    /// IBL diffuse intensity.
    pub ibl_diffuse_intensity: f32,
    /// IBL reflection intensity.
    pub ibl_reflection_intensity: f32,

    /// Exposure mode.
    pub exposure_mode: ExposureMode,
    /// Manual exposure.
    pub exposure: f32,
    /// Luminance above which bloom picks up.
    pub bloom_threshold: f32,
    /// Bloom contribution.
    pub bloom_intensity: f32,
    /// Adaptation speed, per second.
    pub adaptation_speed: f32,

    /// Contrast.
    pub contrast: f32,
    /// Pivot of the contrast curve.
    pub contrast_center: f32,
    /// Saturation.
    pub saturation: f32,

    /// Sharpen strength.
    pub sharpen_strength: f32,
    /// Sharpen clamp.
    pub sharpen_limit: f32,

    /// Fog color.
    pub fog_color: LinearRgba,
    /// Distance fog start, end, density, max.
    pub fog_distance: Vec4,
    /// Height fog base, falloff, density, max.
    pub fog_vertical: Vec4,

    /// Focus distance.
    pub dof_focus_distance: f32,
    /// Depth range over which blur ramps up.
    pub dof_range: f32,
    /// Depth range kept sharp around the focus distance.
    pub dof_focus_range: f32,

    /// Raw effect strengths.
    pub effects: EffectParams,
    /// LOD distances.
    pub lod_distances: LodDistances,
}

impl Default for EnvironmentValues {
    fn default() -> Self {
        Self {
            sky_color: LinearRgba::from_rgb8(148, 164, 192),
            sky_intensity: 0.001,
            indirect_factor: 1.0,
            ibl_diffuse_intensity: 1.0,
            ibl_reflection_intensity: 1.0,
            exposure_mode: ExposureMode::Manual,
            exposure: 1.0,
            bloom_threshold: 1.0,
            bloom_intensity: 0.5,
            adaptation_speed: 1.0,
            contrast: 1.0,
            contrast_center: 0.5,
            saturation: 1.0,
            sharpen_strength: 0.0,
            sharpen_limit: 0.23,
            fog_color: LinearRgba::new(0.4, 0.5, 0.7, 1.0),
            fog_distance: Vec4::new(0.0, 1000.0, 0.0, 0.0),
            fog_vertical: Vec4::ZERO,
            dof_focus_distance: 10.0,
            dof_range: 20.0,
            dof_focus_range: 2.0,
            effects: EffectParams::default(),
            lod_distances: LodDistances::default(),
        }
    }
}

impl EnvironmentValues {
    /// Offset applied after contrast scaling so the pivot stays fixed.
    pub fn color_correction_bias(&self) -> f32 {
        interpolate(0.0, 1.0 - self.contrast, self.contrast_center)
    }

    /// `(strength, strength / 4, limit)` as consumed by the tonemap shader.
    pub fn sharpen_vector(&self) -> Vec3 {
        Vec3::new(
            self.sharpen_strength,
            self.sharpen_strength * 0.25,
            self.sharpen_limit,
        )
    }
}

/// Global environment plus optional per-shot overrides.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Environment {
    /// Values used when no override applies.
    pub global: EnvironmentValues,
    /// Overrides by camera shot index.
    pub per_shot: BTreeMap<u32, EnvironmentValues>,
    /// Honor `per_shot`.
    pub per_shot_mode: bool,
}

impl Environment {
    /// Values for the given camera shot.
    pub fn values_for_shot(&self, shot: u32) -> &EnvironmentValues {
        if self.per_shot_mode {
            if let Some(values) = self.per_shot.get(&shot) {
                return values;
            }
        }
        &self.global
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_defaults() {
        let config = RendererConfig::default();
        assert_eq!(config.shadow_map_resolution, 2048);
        assert_eq!(config.depth_pyramid_levels, 5);
        assert_eq!(config.omni_shadow_mode, OmniShadowMode::Cube);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_ron_keeps_defaults() {
        let config =
            RendererConfig::from_ron_str("(shadow_map_resolution: 512, omni_shadow_mode: Paraboloid)")
                .unwrap();
        assert_eq!(config.shadow_map_resolution, 512);
        assert_eq!(config.omni_shadow_mode, OmniShadowMode::Paraboloid);
        assert_eq!(config.bloom_layers, 4);
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(matches!(
            RendererConfig::from_ron_str("(ssao_downscale: 0)"),
            Err(ConfigError::InvalidValue {
                field: "ssao_downscale",
                ..
            })
        ));
        assert!(matches!(
            RendererConfig::from_ron_str("(shadow_map_resolution: \"big\")"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_derived_color_values() {
        let values = EnvironmentValues {
            contrast: 1.5,
            contrast_center: 0.5,
            sharpen_strength: 0.8,
            ..Default::default()
        };
        assert_relative_eq!(values.color_correction_bias(), -0.25);
        let sharpen = values.sharpen_vector();
        assert_relative_eq!(sharpen.y, 0.2);
        assert_relative_eq!(sharpen.z, 0.23);
    }

    #[test]
    fn test_per_shot_override() {
        let mut env = Environment::default();
        env.per_shot.insert(
            2,
            EnvironmentValues {
                exposure: 3.0,
                ..Default::default()
            },
        );
        assert_eq!(env.values_for_shot(2).exposure, 1.0);
        env.per_shot_mode = true;
        assert_eq!(env.values_for_shot(2).exposure, 3.0);
        assert_eq!(env.values_for_shot(1).exposure, 1.0);
    }
}
