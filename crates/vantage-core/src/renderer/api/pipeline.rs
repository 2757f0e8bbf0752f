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

//! Pipeline handles, fixed-function state and pipeline descriptors.
//!
//! Descriptors are plain hashable values so that [`GraphicsContext`] can use
//! them directly as pipeline-cache keys.
//!
//! [`GraphicsContext`]: crate::renderer::GraphicsContext

use super::resource::TextureFormat;
use super::shader::ShaderProgramId;

/// An opaque handle to a compiled render pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RenderPipelineId(pub u64);

/// An opaque handle to a compiled compute pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ComputePipelineId(pub u64);

/// Specifies which face of a primitive to cull.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CullMode {
    /// No culling is performed.
    #[default]
    None,
    /// Front-facing primitives are culled.
    Front,
    /// Back-facing primitives are culled.
    Back,
}

/// A comparison function used for depth testing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CompareFunction {
    /// The test never passes.
    Never,
    /// Passes if the new value is less than the existing value.
    Less,
    /// Passes if the new value is equal to the existing value.
    Equal,
    /// Passes if the new value is less than or equal to the existing value.
    LessEqual,
    /// Passes if the new value is greater than the existing value.
    Greater,
    /// Passes if the new value is not equal to the existing value.
    NotEqual,
    /// Passes if the new value is greater than or equal to the existing value.
    GreaterEqual,
    /// The test always passes.
    #[default]
    Always,
}

/// Color blending presets used by the stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BlendMode {
    /// Overwrites the destination.
    #[default]
    Opaque,
    /// `dst + src`, used for light accumulation.
    Additive,
    /// `dst * src`, used to apply ambient occlusion.
    Modulative,
    /// Classic `src * a + dst * (1 - a)`.
    AlphaBlend,
    /// `dst + src * a`, used for particles and light shafts.
    AdditiveAlpha,
}

/// Depth test and write configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DepthState {
    /// Depth comparison.
    pub compare: CompareFunction,
    /// Whether passing fragments write depth.
    pub write: bool,
}

impl DepthState {
    /// Standard opaque geometry: `Less`, writes depth.
    pub const WRITE_LESS: Self = Self {
        compare: CompareFunction::Less,
        write: true,
    };

    /// Read-only test with the given comparison.
    pub const fn test(compare: CompareFunction) -> Self {
        Self {
            compare,
            write: false,
        }
    }
}

/// Primitive topology.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PrimitiveTopology {
    /// Independent triangles.
    #[default]
    TriangleList,
    /// Independent lines, used by wireframe debug views.
    LineList,
}

/// Describes a render pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RenderPipelineDescriptor {
    /// An optional debug label.
    pub label: Option<String>,
    /// The compiled program.
    pub program: ShaderProgramId,
    /// Primitive topology.
    pub topology: PrimitiveTopology,
    /// Face culling.
    pub cull_mode: CullMode,
    /// Depth state, `None` when no depth attachment is bound.
    pub depth: Option<DepthState>,
    /// Blending applied to every color target.
    pub blend: BlendMode,
    /// Formats of the color targets, in attachment order.
    pub color_formats: Vec<TextureFormat>,
    /// Format of the depth attachment, if any.
    pub depth_format: Option<TextureFormat>,
}

impl RenderPipelineDescriptor {
    /// A fullscreen-triangle pipeline writing a single color target.
    pub fn fullscreen(
        label: &str,
        program: ShaderProgramId,
        format: TextureFormat,
        blend: BlendMode,
    ) -> Self {
        Self {
            label: Some(label.to_owned()),
            program,
            topology: PrimitiveTopology::TriangleList,
            cull_mode: CullMode::None,
            depth: None,
            blend,
            color_formats: vec![format],
            depth_format: None,
        }
    }

    /// Builder-style: attaches a depth target and its state.
    pub fn with_depth(mut self, format: TextureFormat, state: DepthState) -> Self {
        self.depth_format = Some(format);
        self.depth = Some(state);
        self
    }

    /// Builder-style: sets the cull mode.
    pub fn with_cull(mut self, cull_mode: CullMode) -> Self {
        self.cull_mode = cull_mode;
        self
    }
}

/// Describes a compute pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ComputePipelineDescriptor {
    /// An optional debug label.
    pub label: Option<String>,
    /// The compiled compute program.
    pub program: ShaderProgramId,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_descriptors_are_cache_keys() {
        let a = RenderPipelineDescriptor::fullscreen(
            "tonemap",
            ShaderProgramId(3),
            TextureFormat::Rgba8Unorm,
            BlendMode::Opaque,
        );
        let b = a.clone().with_cull(CullMode::Front);
        let mut set = HashSet::new();
        set.insert(a.clone());
        set.insert(a.clone());
        set.insert(b);
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_defaults() {
        assert_eq!(CompareFunction::default(), CompareFunction::Always);
        assert_eq!(CullMode::default(), CullMode::None);
        assert!(DepthState::WRITE_LESS.write);
        assert!(!DepthState::test(CompareFunction::GreaterEqual).write);
    }
}
