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

//! Feature toggles for the frame.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

bitflags! {
    /// Independent feature toggles, settable by the host.
    ///
    /// Flags in [`RenderFlags::REBUILD_MASK`] change shader permutations or
    /// render-target layout; flipping one of them rebuilds pipelines before
    /// the next frame.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct RenderFlags: u32 {
        /// Approximate sRGB conversion in the tonemap shader.
        const GAMMA_CORRECTION_FAST = 1 << 0;
        /// Every opaque mesh casts shadows, ignoring per-mesh flags.
        const FORCE_SHADOW_CASTER_ALL = 1 << 1;
        /// Reduced bloom chain.
        const BLOOM_MOBILE = 1 << 2;
        /// Depth of field at half resolution.
        const DOF_HALF_RES = 1 << 3;
        /// Direct light volumes.
        const DIRECT_LIGHTING = 1 << 4;
        /// Image-based lighting pass.
        const IBL = 1 << 5;
        /// Irradiance probe accumulation.
        const IRRADIANCE_LIGHTING = 1 << 6;
        /// Shadow maps for direct lights.
        const DIRECT_SHADOWS = 1 << 7;
        /// Screen-space ambient occlusion.
        const SSAO = 1 << 8;
        /// Wider SSAO kernel.
        const MID_RANGE_SSAO = 1 << 9;
        /// Separable blur on the SSAO result.
        const SSAO_BLUR = 1 << 10;
        /// Particle billboards in the half-resolution pass.
        const PARTICLE_SYSTEMS = 1 << 11;
        /// Light shafts in the half-resolution pass.
        const LIGHTSHAFT = 1 << 12;
        /// Blur behind transparent surfaces.
        const BLUR_TRANSPARENTS = 1 << 13;
        /// Motion blur.
        const MOTION_BLUR = 1 << 14;
        /// Depth of field.
        const DOF = 1 << 15;
        /// Debug: probe atlas.
        const RENDER_PROBES_ATLAS = 1 << 16;
        /// Debug: probe SH spheres.
        const RENDER_PROBES_SH = 1 << 17;
        /// Debug: wireframe only.
        const WIREFRAME = 1 << 18;
        /// Debug: wireframe over solid.
        const WIREFRAME_SOLID = 1 << 19;
        /// Debug: tint shadow casters.
        const COLORIZE_SHADOW_CASTERS = 1 << 20;
        /// Debug: tint by LOD bucket.
        const COLORIZE_LOD_LEVELS = 1 << 21;
        /// Debug: irradiance mesh.
        const RENDER_IRRADIANCE_MESH = 1 << 22;
        /// HDR luminance and exposure.
        const HDR = 1 << 23;
        /// Bloom, effective only with `HDR`.
        const BLOOM = 1 << 24;
        /// Read probe SH from an atlas texture instead of a buffer.
        const GI_USE_TEXTURE_SH_ATLAS = 1 << 25;
        /// Debug overlay blit.
        const DEBUG_OVERLAY = 1 << 26;
    }
}

impl RenderFlags {
    /// Flags whose change invalidates shader permutations or target layout.
    pub const REBUILD_MASK: Self = Self::GAMMA_CORRECTION_FAST
        .union(Self::BLOOM_MOBILE)
        .union(Self::DOF_HALF_RES)
        .union(Self::IBL)
        .union(Self::IRRADIANCE_LIGHTING)
        .union(Self::SSAO)
        .union(Self::MID_RANGE_SSAO)
        .union(Self::PARTICLE_SYSTEMS)
        .union(Self::LIGHTSHAFT)
        .union(Self::MOTION_BLUR)
        .union(Self::DOF)
        .union(Self::WIREFRAME)
        .union(Self::COLORIZE_SHADOW_CASTERS)
        .union(Self::COLORIZE_LOD_LEVELS)
        .union(Self::HDR)
        .union(Self::BLOOM)
        .union(Self::GI_USE_TEXTURE_SH_ATLAS);

    /// `true` when light shafts or particles need the half-resolution pass.
    #[inline]
    pub fn half_res_transients(&self) -> bool {
        self.intersects(Self::LIGHTSHAFT | Self::PARTICLE_SYSTEMS)
    }

    /// `true` when some consumer needs the downsampled depth pyramid.
    #[inline]
    pub fn needs_depth_downsample(&self) -> bool {
        self.intersects(Self::SSAO | Self::DOF_HALF_RES) || self.half_res_transients()
    }

    /// `true` when bloom runs.
    #[inline]
    pub fn bloom_enabled(&self) -> bool {
        self.contains(Self::HDR | Self::BLOOM)
    }

    /// Returns `true` if going from `old` to `new` needs a pipeline rebuild.
    #[inline]
    pub fn requires_rebuild(old: Self, new: Self) -> bool {
        (old ^ new).intersects(Self::REBUILD_MASK)
    }
}

impl Default for RenderFlags {
    fn default() -> Self {
        Self::GAMMA_CORRECTION_FAST
            | Self::DIRECT_LIGHTING
            | Self::IRRADIANCE_LIGHTING
            | Self::DIRECT_SHADOWS
            | Self::SSAO
            | Self::MID_RANGE_SSAO
            | Self::SSAO_BLUR
            | Self::PARTICLE_SYSTEMS
            | Self::LIGHTSHAFT
            | Self::BLUR_TRANSPARENTS
            | Self::MOTION_BLUR
            | Self::DOF
            | Self::HDR
            | Self::BLOOM
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let flags = RenderFlags::default();
        assert!(flags.contains(RenderFlags::DIRECT_SHADOWS));
        assert!(!flags.contains(RenderFlags::IBL));
        assert!(!flags.contains(RenderFlags::BLOOM_MOBILE));
        assert!(flags.half_res_transients());
        assert!(flags.needs_depth_downsample());
        assert!(flags.bloom_enabled());
    }

    #[test]
    fn test_downsample_predicate() {
        let none = RenderFlags::DIRECT_LIGHTING;
        assert!(!none.needs_depth_downsample());
        assert!(RenderFlags::DOF_HALF_RES.needs_depth_downsample());
        assert!(RenderFlags::PARTICLE_SYSTEMS.needs_depth_downsample());
        assert!(!RenderFlags::BLOOM.bloom_enabled());
    }

    #[test]
    fn test_requires_rebuild() {
        let base = RenderFlags::default();
        assert!(!RenderFlags::requires_rebuild(base, base));
        assert!(!RenderFlags::requires_rebuild(
            base,
            base | RenderFlags::FORCE_SHADOW_CASTER_ALL
        ));
        assert!(!RenderFlags::requires_rebuild(
            base,
            base - RenderFlags::DIRECT_SHADOWS
        ));
        assert!(RenderFlags::requires_rebuild(
            base,
            base | RenderFlags::BLOOM_MOBILE
        ));
        assert!(RenderFlags::requires_rebuild(
            base,
            base - RenderFlags::IRRADIANCE_LIGHTING
        ));
    }
}
