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

//! Descriptors and types for render and compute passes.

use super::resource::TextureId;
use crate::math::LinearRgba;

/// An opaque handle to a finished command buffer, ready for submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CommandBufferId(pub u64);

/// Describes the operation to perform on an attachment at the start of a render pass.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum LoadOp<V> {
    /// The existing contents of the attachment will be loaded into the pass.
    Load,
    /// The attachment will be cleared to the specified value before the pass begins.
    Clear(V),
}

/// Describes the operation to perform on an attachment at the end of a render pass.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StoreOp {
    /// The results of the render pass will be stored to the attachment's memory.
    Store,
    /// The results of the render pass will be discarded.
    Discard,
}

/// Defines the load and store operations for a single render pass attachment.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Operations<V> {
    /// The operation to perform at the beginning of the pass.
    pub load: LoadOp<V>,
    /// The operation to perform at the end of the pass.
    pub store: StoreOp,
}

impl<V> Operations<V> {
    /// Clear then store.
    pub fn clear(value: V) -> Self {
        Self {
            load: LoadOp::Clear(value),
            store: StoreOp::Store,
        }
    }

    /// Load then store.
    pub fn load() -> Self {
        Self {
            load: LoadOp::Load,
            store: StoreOp::Store,
        }
    }
}

/// A color attachment: one mip of one layer of a texture.
#[derive(Clone, Copy, Debug)]
pub struct RenderPassColorAttachment {
    /// The texture rendered to.
    pub target: TextureId,
    /// Mip level rendered to.
    pub mip: u32,
    /// Array layer rendered to (cube face index for cube maps).
    pub layer: u32,
    /// The load and store operations for this color attachment.
    pub ops: Operations<LinearRgba>,
}

impl RenderPassColorAttachment {
    /// Mip 0, layer 0, cleared to `color`.
    pub fn cleared(target: TextureId, color: LinearRgba) -> Self {
        Self {
            target,
            mip: 0,
            layer: 0,
            ops: Operations::clear(color),
        }
    }

    /// Mip 0, layer 0, existing contents kept.
    pub fn loaded(target: TextureId) -> Self {
        Self {
            target,
            mip: 0,
            layer: 0,
            ops: Operations::load(),
        }
    }

    /// Builder-style: selects a mip level.
    pub fn at_mip(mut self, mip: u32) -> Self {
        self.mip = mip;
        self
    }

    /// Builder-style: selects an array layer.
    pub fn at_layer(mut self, layer: u32) -> Self {
        self.layer = layer;
        self
    }
}

/// A depth attachment.
#[derive(Clone, Copy, Debug)]
pub struct RenderPassDepthAttachment {
    /// The depth texture.
    pub target: TextureId,
    /// Array layer rendered to.
    pub layer: u32,
    /// Depth load/store. `None` binds the attachment read-only for depth testing.
    pub depth_ops: Option<Operations<f32>>,
}

impl RenderPassDepthAttachment {
    /// A writable depth attachment cleared to `depth`.
    pub fn cleared(target: TextureId, depth: f32) -> Self {
        Self {
            target,
            layer: 0,
            depth_ops: Some(Operations::clear(depth)),
        }
    }

    /// A read-only depth attachment, used for depth-tested overlays.
    pub fn read_only(target: TextureId) -> Self {
        Self {
            target,
            layer: 0,
            depth_ops: None,
        }
    }

    /// Returns `true` if the pass may write depth.
    pub fn is_writable(&self) -> bool {
        self.depth_ops.is_some()
    }
}

/// A descriptor for a render pass.
#[derive(Debug, Default)]
pub struct RenderPassDescriptor<'a> {
    /// An optional debug label for the render pass.
    pub label: Option<&'a str>,
    /// A slice of color attachments to be used in the pass.
    pub color_attachments: &'a [RenderPassColorAttachment],
    /// An optional depth attachment for this pass.
    pub depth_attachment: Option<RenderPassDepthAttachment>,
}

/// A descriptor for a compute pass.
#[derive(Debug, Default)]
pub struct ComputePassDescriptor<'a> {
    /// An optional debug label for the compute pass.
    pub label: Option<&'a str>,
}
