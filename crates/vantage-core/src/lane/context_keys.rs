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

//! Frame context key types for [`LaneContext`](super::LaneContext).
//!
//! These newtypes are inserted into a `LaneContext` by the orchestrator or by
//! an earlier lane, and extracted by later lanes. Placing them in
//! `vantage-core` avoids a cyclic dependency between `vantage-lanes` and
//! `vantage-agents`.
//!
//! # Frame inputs (inserted by the orchestrator)
//!
//! | Key                   | Meaning                                          |
//! |-----------------------|--------------------------------------------------|
//! | [`FrameFlags`]        | Feature flags in effect for this frame           |
//! | [`Viewport`]          | Output resolution                                |
//! | [`FrameIndex`]        | Monotonic frame counter                          |
//! | [`MotionBlurActive`]  | Motion blur allowed this frame (warmup, cuts)    |
//! | [`ActiveDebugView`]   | Texture shown by the debug overlay               |
//! | [`DegradedFeatures`]  | Features disabled for the session                |
//!
//! # Stage outputs
//!
//! | Key                   | Written by        | Meaning                         |
//! |-----------------------|-------------------|---------------------------------|
//! | [`GBufferTargets`]    | G-buffer lane     | Geometry attachments            |
//! | [`LightingTarget`]    | Lighting lane     | Accumulated HDR light           |
//! | [`DepthPyramid`]      | Depth pyramid     | Linear depth mip chain          |
//! | [`SceneColor`]        | every chain stage | Current head of the post chain  |
//! | [`AmbientOcclusion`]  | SSAO              | Occlusion term                  |
//! | [`BloomTexture`]      | HDR/bloom         | Accumulated bloom               |
//! | [`LuminanceTexture`]  | HDR/bloom         | 1×1 average luminance           |

use crate::renderer::api::TextureId;
use std::collections::BTreeSet;
use std::fmt;
use crate::renderer::flags::RenderFlags;
use crate::renderer::light::LightId;

// ─────────────────────────────────────────────────────────────────────────────
// Frame inputs
// ─────────────────────────────────────────────────────────────────────────────

/// Feature flags for the current frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameFlags(pub RenderFlags);

/// Output resolution in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Viewport {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Viewport {
    /// Creates a viewport, clamping both sides to one pixel.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width: width.max(1),
            height: height.max(1),
        }
    }

    /// Width over height.
    pub fn aspect(&self) -> f32 {
        self.width as f32 / self.height as f32
    }

    /// The viewport divided by `factor`, clamped to one pixel.
    pub fn scaled_down(&self, factor: u32) -> Self {
        let factor = factor.max(1);
        Self::new(self.width / factor, self.height / factor)
    }
}

/// Monotonic frame counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct FrameIndex(pub u64);

/// Whether motion blur may run this frame.
///
/// False during warmup and on the frame of a camera cut, when no valid
/// previous-frame matrices exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MotionBlurActive(pub bool);

/// Texture selected for the debug overlay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebugView {
    /// G-buffer normals.
    Normals,
    /// G-buffer velocity.
    Velocity,
    /// Ambient occlusion.
    AmbientOcclusion,
    /// Bloom accumulation.
    Bloom,
    /// The shadow map of one light.
    ShadowMap(LightId),
    /// One level of the linear depth pyramid.
    DepthPyramid {
        /// Mip level.
        level: u32,
    },
}

/// The active debug view, if any.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ActiveDebugView(pub Option<DebugView>);

/// A feature that can be lost to a resource-creation failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Feature {
    /// The shadow map of one light.
    ShadowMap(LightId),
    /// Ambient occlusion.
    Ssao,
    /// Half-resolution light shafts and particles.
    HalfResTransients,
    /// Blurred copy behind transparent meshes.
    TransparentBlur,
    /// Bloom chain.
    Bloom,
    /// Motion blur tile targets.
    MotionBlur,
    /// Depth of field.
    DepthOfField,
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Feature::ShadowMap(id) => write!(f, "shadow map of light {}", id.0),
            Feature::Ssao => f.write_str("SSAO"),
            Feature::HalfResTransients => f.write_str("half-resolution transients"),
            Feature::TransparentBlur => f.write_str("transparent blur"),
            Feature::Bloom => f.write_str("bloom"),
            Feature::MotionBlur => f.write_str("motion blur"),
            Feature::DepthOfField => f.write_str("depth of field"),
        }
    }
}

/// Features disabled for the rest of the session.
///
/// There is no retry: once a target cannot be created, the feature stays off.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DegradedFeatures(BTreeSet<Feature>);

impl DegradedFeatures {
    /// Disables `feature`. Logs a warning the first time only.
    ///
    /// Returns `true` if the feature was still enabled.
    pub fn degrade(&mut self, feature: Feature, reason: &dyn fmt::Display) -> bool {
        let fresh = self.0.insert(feature);
        if fresh {
            log::warn!("DegradedFeatures: {feature} disabled for the session: {reason}");
        }
        fresh
    }

    /// Returns `true` if `feature` was disabled.
    pub fn contains(&self, feature: Feature) -> bool {
        self.0.contains(&feature)
    }

    /// Iterates disabled features in order.
    pub fn iter(&self) -> impl Iterator<Item = Feature> + '_ {
        self.0.iter().copied()
    }

    /// Number of disabled features.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if nothing was disabled.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Stage outputs
// ─────────────────────────────────────────────────────────────────────────────

/// Attachments filled by the G-buffer lane.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GBufferTargets {
    /// Base color.
    pub albedo: TextureId,
    /// View-space normals.
    pub normal: TextureId,
    /// Specular and roughness.
    pub specular: TextureId,
    /// Screen-space velocity.
    pub velocity: TextureId,
    /// Hardware depth.
    pub depth: TextureId,
}

/// Accumulated HDR lighting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LightingTarget(pub TextureId);

/// Linearized, downsampled depth. Level 0 is half resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DepthPyramid {
    /// The mip-chained texture.
    pub texture: TextureId,
    /// Number of levels.
    pub levels: u32,
}

/// Head of the post-process chain: the texture the next stage consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SceneColor(pub TextureId);

/// Ambient occlusion term.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AmbientOcclusion(pub TextureId);

/// Accumulated bloom, sampled by the tonemap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BloomTexture(pub TextureId);

/// 1×1 average scene luminance, sampled by the tonemap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LuminanceTexture(pub TextureId);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_viewport_scaling() {
        let vp = Viewport::new(1920, 1080);
        assert_eq!(vp.scaled_down(2), Viewport::new(960, 540));
        assert_eq!(Viewport::new(3, 1).scaled_down(4), Viewport::new(1, 1));
        assert!((vp.aspect() - 16.0 / 9.0).abs() < 1e-6);
    }

    #[test]
    fn test_degrade_once() {
        let mut degraded = DegradedFeatures::default();
        assert!(degraded.degrade(Feature::MotionBlur, &"no memory"));
        assert!(!degraded.degrade(Feature::MotionBlur, &"no memory"));
        assert!(degraded.contains(Feature::MotionBlur));
        assert!(!degraded.contains(Feature::ShadowMap(LightId(1))));
        assert_eq!(degraded.len(), 1);
    }
}
