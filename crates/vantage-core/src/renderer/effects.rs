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

//! Resolution-independent effect strengths.
//!
//! Authors tune blur, bloom, DOF and SSAO kernels at a 1080-pixel-high
//! viewport. Stages never see those raw values: they receive a
//! [`NormalizedEffects`] scaled to the current viewport height, so an effect
//! covers the same fraction of the screen at any resolution.

use serde::{Deserialize, Serialize};

/// Viewport height at which raw and normalized strengths are equal.
pub const REFERENCE_VIEWPORT_HEIGHT: f32 = 1080.0;

/// Scales `raw` from the reference height to `viewport_height`.
#[inline]
pub fn normalize(raw: f32, viewport_height: u32) -> f32 {
    raw * (viewport_height as f32 / REFERENCE_VIEWPORT_HEIGHT)
}

/// Author-set effect strengths, expressed in pixels at the reference height.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EffectParams {
    /// Depth-of-field blur.
    pub dof: f32,
    /// Bloom spread.
    pub bloom: f32,
    /// Blur behind transparent surfaces.
    pub transparent_blur: f32,
    /// SSAO blur.
    pub ssao_blur: f32,
    /// SSAO sampling radius.
    pub ssao_radius: f32,
}

impl Default for EffectParams {
    fn default() -> Self {
        Self {
            dof: 10.0,
            bloom: 4.0,
            transparent_blur: 6.0,
            ssao_blur: 2.0,
            ssao_radius: 12.0,
        }
    }
}

impl EffectParams {
    /// Scales every strength to `viewport_height`.
    pub fn normalized(&self, viewport_height: u32) -> NormalizedEffects {
        NormalizedEffects {
            viewport_height,
            dof: normalize(self.dof, viewport_height),
            bloom: normalize(self.bloom, viewport_height),
            transparent_blur: normalize(self.transparent_blur, viewport_height),
            ssao_blur: normalize(self.ssao_blur, viewport_height),
            ssao_radius: normalize(self.ssao_radius, viewport_height),
        }
    }
}

/// Effect strengths scaled to the current viewport. The only form stages read.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NormalizedEffects {
    /// Height the values were scaled to.
    pub viewport_height: u32,
    /// Depth-of-field blur.
    pub dof: f32,
    /// Bloom spread.
    pub bloom: f32,
    /// Blur behind transparent surfaces.
    pub transparent_blur: f32,
    /// SSAO blur.
    pub ssao_blur: f32,
    /// SSAO sampling radius.
    pub ssao_radius: f32,
}

impl NormalizedEffects {
    /// Integer tap radius for a separable kernel of the given strength.
    #[inline]
    pub fn kernel_radius(strength: f32) -> u32 {
        if strength.is_finite() && strength > 0.0 {
            strength.round() as u32
        } else {
            0
        }
    }
}

/// Keeps [`NormalizedEffects`] in sync with raw strengths and viewport height.
#[derive(Debug, Clone)]
pub struct EffectParameterNormalizer {
    raw: EffectParams,
    viewport_height: u32,
    normalized: NormalizedEffects,
    dirty: bool,
}

impl EffectParameterNormalizer {
    /// Creates a normalizer for the given raw strengths and height.
    pub fn new(raw: EffectParams, viewport_height: u32) -> Self {
        Self {
            raw,
            viewport_height,
            normalized: raw.normalized(viewport_height),
            dirty: false,
        }
    }

    /// The raw strengths.
    pub fn raw(&self) -> &EffectParams {
        &self.raw
    }

    /// Replaces the raw strengths. Takes effect on the next [`refresh`](Self::refresh).
    pub fn set_raw(&mut self, raw: EffectParams) {
        if raw != self.raw {
            self.raw = raw;
            self.dirty = true;
        }
    }

    /// Records a viewport resize. Takes effect on the next [`refresh`](Self::refresh).
    pub fn resize(&mut self, viewport_height: u32) {
        if viewport_height != self.viewport_height {
            self.viewport_height = viewport_height;
            self.dirty = true;
        }
    }

    /// Recomputes the normalized values if anything changed. Returns `true` if it did.
    pub fn refresh(&mut self) -> bool {
        if !self.dirty {
            return false;
        }
        self.normalized = self.raw.normalized(self.viewport_height);
        self.dirty = false;
        log::debug!(
            "EffectParameterNormalizer: renormalized for height {} (dof {:.3})",
            self.viewport_height,
            self.normalized.dof
        );
        true
    }

    /// Returns `true` if a refresh is pending.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// The current normalized values.
    pub fn normalized(&self) -> &NormalizedEffects {
        &self.normalized
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_reference_height_is_identity() {
        for k in [0.0, 0.5, 1.0, 3.25, 10.0, 123.456] {
            assert_eq!(normalize(k, 1080), k);
        }
    }

    #[test]
    fn test_ratio_matches_heights() {
        let k = 7.0;
        for (h1, h2) in [(540, 1080), (720, 2160), (1440, 900), (1, 4096)] {
            assert_relative_eq!(
                normalize(k, h1) / normalize(k, h2),
                h1 as f32 / h2 as f32,
                max_relative = 1e-5
            );
        }
    }

    #[test]
    fn test_resize_halves_dof() {
        let raw = EffectParams {
            dof: 10.0,
            ..Default::default()
        };
        let mut normalizer = EffectParameterNormalizer::new(raw, 1080);
        assert_eq!(normalizer.normalized().dof, 10.0);

        normalizer.resize(540);
        assert!(normalizer.is_dirty());
        assert!(normalizer.refresh());
        assert_eq!(normalizer.normalized().dof, 5.0);
        assert!(!normalizer.refresh());
    }

    #[test]
    fn test_raw_change_renormalizes() {
        let mut normalizer = EffectParameterNormalizer::new(EffectParams::default(), 540);
        normalizer.set_raw(EffectParams {
            bloom: 8.0,
            ..Default::default()
        });
        normalizer.refresh();
        assert_eq!(normalizer.normalized().bloom, 4.0);
    }

    #[test]
    fn test_kernel_radius() {
        assert_eq!(NormalizedEffects::kernel_radius(4.6), 5);
        assert_eq!(NormalizedEffects::kernel_radius(-1.0), 0);
        assert_eq!(NormalizedEffects::kernel_radius(f32::NAN), 0);
    }
}
