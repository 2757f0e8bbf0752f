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

//! Defines GPU texture and buffer handles and their descriptors.

use bitflags::bitflags;
use std::borrow::Cow;

/// An opaque handle to a GPU texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureId(pub u64);

/// An opaque handle to a GPU buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferId(pub u64);

/// Width, height and array layers of a texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Extent3D {
    /// Width in texels.
    pub width: u32,
    /// Height in texels.
    pub height: u32,
    /// Number of array layers (6 for a cube).
    pub depth_or_array_layers: u32,
}

impl Extent3D {
    /// A single-layer 2D extent.
    pub const fn d2(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            depth_or_array_layers: 1,
        }
    }

    /// Size of mip `level`, clamped to one texel.
    pub fn mip_level_size(&self, level: u32) -> Self {
        Self {
            width: (self.width >> level).max(1),
            height: (self.height >> level).max(1),
            depth_or_array_layers: self.depth_or_array_layers,
        }
    }
}

/// Texel formats the orchestrator allocates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureFormat {
    /// 8-bit normalized RGBA.
    Rgba8Unorm,
    /// 8-bit normalized RGBA, sRGB encoded.
    Rgba8UnormSrgb,
    /// 16-bit float RGBA, used for HDR lighting.
    Rgba16Float,
    /// 16-bit float RG, used for velocity.
    Rg16Float,
    /// 32-bit float single channel, used for linear depth and luminance.
    R32Float,
    /// 8-bit single channel, used for ambient occlusion.
    R8Unorm,
    /// 32-bit float depth.
    Depth32Float,
    /// 24-bit depth with 8-bit stencil.
    Depth24PlusStencil8,
}

impl TextureFormat {
    /// Returns `true` for depth or depth/stencil formats.
    pub fn is_depth(&self) -> bool {
        matches!(
            self,
            TextureFormat::Depth32Float | TextureFormat::Depth24PlusStencil8
        )
    }
}

bitflags! {
    /// Allowed usages of a texture.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct TextureUsage: u32 {
        /// Source of a copy.
        const COPY_SRC = 1 << 0;
        /// Destination of a copy.
        const COPY_DST = 1 << 1;
        /// Sampled from shaders.
        const TEXTURE_BINDING = 1 << 2;
        /// Written from compute shaders.
        const STORAGE_BINDING = 1 << 3;
        /// Color or depth attachment.
        const RENDER_ATTACHMENT = 1 << 4;
    }
}

/// A descriptor used to create a [`TextureId`].
#[derive(Debug, Clone)]
pub struct TextureDescriptor<'a> {
    /// An optional debug label. Also used by leak reports.
    pub label: Option<Cow<'a, str>>,
    /// Dimensions and layers.
    pub size: Extent3D,
    /// The number of mipmap levels.
    pub mip_level_count: u32,
    /// Texel format.
    pub format: TextureFormat,
    /// Allowed usages.
    pub usage: TextureUsage,
}

impl<'a> TextureDescriptor<'a> {
    /// A sampled, renderable single-mip 2D target.
    pub fn render_target(label: &'a str, width: u32, height: u32, format: TextureFormat) -> Self {
        Self {
            label: Some(Cow::Borrowed(label)),
            size: Extent3D::d2(width.max(1), height.max(1)),
            mip_level_count: 1,
            format,
            usage: TextureUsage::RENDER_ATTACHMENT
                | TextureUsage::TEXTURE_BINDING
                | TextureUsage::COPY_SRC,
        }
    }

    /// Builder-style: sets the mip count.
    pub fn with_mips(mut self, mip_level_count: u32) -> Self {
        self.mip_level_count = mip_level_count.max(1);
        self
    }

    /// Builder-style: sets the array layer count.
    pub fn with_layers(mut self, layers: u32) -> Self {
        self.size.depth_or_array_layers = layers.max(1);
        self
    }

    /// Builder-style: adds usages.
    pub fn with_usage(mut self, usage: TextureUsage) -> Self {
        self.usage |= usage;
        self
    }
}

bitflags! {
    /// Allowed usages of a buffer.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct BufferUsage: u32 {
        /// Vertex data.
        const VERTEX = 1 << 0;
        /// Index data.
        const INDEX = 1 << 1;
        /// Uniform data.
        const UNIFORM = 1 << 2;
        /// Read/write storage.
        const STORAGE = 1 << 3;
        /// Destination of CPU writes and copies.
        const COPY_DST = 1 << 4;
        /// Source of copies.
        const COPY_SRC = 1 << 5;
    }
}

/// A descriptor used to create a [`BufferId`].
#[derive(Debug, Clone)]
pub struct BufferDescriptor<'a> {
    /// An optional debug label.
    pub label: Option<Cow<'a, str>>,
    /// Size in bytes.
    pub size: u64,
    /// Allowed usages.
    pub usage: BufferUsage,
}

/// Index element width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexFormat {
    /// 16-bit indices.
    Uint16,
    /// 32-bit indices.
    Uint32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mip_level_size_clamps() {
        let e = Extent3D::d2(1920, 1080);
        assert_eq!(e.mip_level_size(1), Extent3D::d2(960, 540));
        assert_eq!(e.mip_level_size(12), Extent3D::d2(1, 1));
    }

    #[test]
    fn test_render_target_descriptor() {
        let d = TextureDescriptor::render_target("lighting", 0, 4, TextureFormat::Rgba16Float)
            .with_mips(0);
        assert_eq!(d.size.width, 1);
        assert_eq!(d.mip_level_count, 1);
        assert!(d.usage.contains(TextureUsage::TEXTURE_BINDING));
        assert!(!TextureFormat::Rgba16Float.is_depth());
        assert!(TextureFormat::Depth32Float.is_depth());
    }
}
