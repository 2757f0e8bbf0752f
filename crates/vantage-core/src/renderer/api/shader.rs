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

//! Shader program handles and the keys of the shader-variant cache.
//!
//! Shader source text and its cross-backend compilation live outside the
//! orchestrator. Programs are requested by stage source names plus a set of
//! preprocessor defines, and the device returns an opaque handle.

use std::collections::BTreeMap;
use std::fmt;

/// An opaque handle representing a compiled shader program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ShaderProgramId(pub u64);

/// The stage sources making up a program.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ShaderStages {
    /// A vertex + fragment pair, e.g. `("shadow_caster.vert", "shadow_caster.frag")`.
    Graphics {
        /// Vertex stage source name.
        vertex: String,
        /// Fragment stage source name.
        fragment: String,
    },
    /// A single compute stage.
    Compute {
        /// Compute stage source name.
        compute: String,
    },
}

impl ShaderStages {
    /// Shorthand for a graphics pair.
    pub fn graphics(vertex: impl Into<String>, fragment: impl Into<String>) -> Self {
        Self::Graphics {
            vertex: vertex.into(),
            fragment: fragment.into(),
        }
    }

    /// Shorthand for a compute stage.
    pub fn compute(compute: impl Into<String>) -> Self {
        Self::Compute {
            compute: compute.into(),
        }
    }
}

impl fmt::Display for ShaderStages {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShaderStages::Graphics { vertex, fragment } => write!(f, "{vertex}+{fragment}"),
            ShaderStages::Compute { compute } => write!(f, "{compute}"),
        }
    }
}

/// Ordered preprocessor defines. Ordering keeps cache keys stable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ShaderDefines(BTreeMap<String, String>);

impl ShaderDefines {
    /// An empty define set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a valueless define such as `ALPHA_TEST`.
    pub fn define(mut self, name: &str) -> Self {
        self.0.insert(name.to_owned(), String::new());
        self
    }

    /// Adds a define only when `enabled`.
    pub fn define_if(self, name: &str, enabled: bool) -> Self {
        if enabled {
            self.define(name)
        } else {
            self
        }
    }

    /// Adds an integer define such as `MAX_BONES=96`.
    pub fn define_int(mut self, name: &str, value: i64) -> Self {
        self.0.insert(name.to_owned(), value.to_string());
        self
    }

    /// Returns `true` if `name` is defined.
    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    /// Returns the value of `name`, if defined.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    /// Iterates defines in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Number of defines.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if no define is set.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Number of resources a program binds in its busiest stage.
///
/// Checked against [`DeviceLimits`](super::adapter::DeviceLimits) by the
/// optional conformance check.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct ShaderResourceUsage {
    /// Sampled textures.
    pub sampled_textures: u32,
    /// Storage textures or buffers written by the stage.
    pub storage_resources: u32,
    /// Uniform buffers.
    pub uniform_buffers: u32,
}

/// Cache key of a shader variant: `(stage sources, defines)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ShaderVariantKey {
    /// Stage source names.
    pub stages: ShaderStages,
    /// Preprocessor defines.
    pub defines: ShaderDefines,
}

impl ShaderVariantKey {
    /// Creates a key.
    pub fn new(stages: ShaderStages, defines: ShaderDefines) -> Self {
        Self { stages, defines }
    }
}

impl fmt::Display for ShaderVariantKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.stages)?;
        for (name, value) in self.defines.iter() {
            if value.is_empty() {
                write!(f, " -D{name}")?;
            } else {
                write!(f, " -D{name}={value}")?;
            }
        }
        Ok(())
    }
}

/// Describes a shader program to be created by the `GraphicsDevice`.
#[derive(Debug, Clone)]
pub struct ShaderProgramDescriptor<'a> {
    /// An optional debug label.
    pub label: Option<&'a str>,
    /// The variant to compile.
    pub variant: &'a ShaderVariantKey,
    /// Declared per-stage resource usage.
    pub resources: ShaderResourceUsage,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defines_are_order_independent() {
        let a = ShaderDefines::new().define("SKELETAL").define("ALPHA_TEST");
        let b = ShaderDefines::new().define("ALPHA_TEST").define("SKELETAL");
        assert_eq!(a, b);
        let stages = ShaderStages::graphics("gbuffer.vert", "gbuffer.frag");
        assert_eq!(
            ShaderVariantKey::new(stages.clone(), a),
            ShaderVariantKey::new(stages, b)
        );
    }

    #[test]
    fn test_variant_display() {
        let key = ShaderVariantKey::new(
            ShaderStages::graphics("shadow_caster.vert", "shadow_caster.frag"),
            ShaderDefines::new()
                .define("ALPHA_TEST")
                .define_int("MAX_BONES", 96)
                .define_if("PARABOLOID", false),
        );
        assert_eq!(
            key.to_string(),
            "shadow_caster.vert+shadow_caster.frag -DALPHA_TEST -DMAX_BONES=96"
        );
        assert!(!key.defines.contains("PARABOLOID"));
        assert_eq!(key.defines.get("MAX_BONES"), Some("96"));
    }
}
