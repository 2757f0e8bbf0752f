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

use crate::renderer::api::command::{CommandBufferId, ComputePassDescriptor, RenderPassDescriptor};
use crate::renderer::api::{
    BufferId, ComputePipelineId, IndexFormat, QuerySetId, RenderPipelineId, TextureId,
    TransitionBarrier,
};
use std::any::Any;
use std::ops::Range;

/// A trait representing an active render pass, used for recording drawing commands.
///
/// A `RenderPass` object is obtained from a [`CommandEncoder`] and provides methods
/// to set pipeline state, bind inputs and issue draw calls.
///
/// The `'pass` lifetime ensures that the pass object cannot outlive the
/// [`CommandEncoder`] that created it.
pub trait RenderPass<'pass> {
    /// Sets the active render pipeline for subsequent draw calls.
    fn set_pipeline(&mut self, pipeline: RenderPipelineId);

    /// Binds a vertex buffer to a specific slot.
    fn set_vertex_buffer(&mut self, slot: u32, buffer: BufferId, offset: u64);

    /// Binds an index buffer for indexed drawing.
    fn set_index_buffer(&mut self, buffer: BufferId, offset: u64, index_format: IndexFormat);

    /// Binds every mip of a texture for sampling at `slot`.
    fn bind_texture(&mut self, slot: u32, texture: TextureId);

    /// Binds a single mip of a texture for sampling at `slot`.
    fn bind_texture_level(&mut self, slot: u32, texture: TextureId, mip: u32);

    /// Binds a uniform or storage buffer at `slot`.
    fn bind_buffer(&mut self, slot: u32, buffer: BufferId);

    /// Sets the per-draw uniform block.
    fn set_uniforms(&mut self, data: &[u8]);

    /// Records a non-indexed draw call.
    fn draw(&mut self, vertices: Range<u32>, instances: Range<u32>);

    /// Records an indexed draw call.
    fn draw_indexed(&mut self, indices: Range<u32>, base_vertex: i32, instances: Range<u32>);
}

/// A trait representing an active compute pass, used for recording dispatch commands.
pub trait ComputePass<'pass> {
    /// Sets the active compute pipeline.
    fn set_pipeline(&mut self, pipeline: ComputePipelineId);

    /// Binds every mip of a texture for sampling at `slot`.
    fn bind_texture(&mut self, slot: u32, texture: TextureId);

    /// Binds a single mip of a texture for sampling at `slot`.
    fn bind_texture_level(&mut self, slot: u32, texture: TextureId, mip: u32);

    /// Binds one mip of a texture for unordered writes at `slot`.
    fn bind_storage_texture(&mut self, slot: u32, texture: TextureId, mip: u32);

    /// Sets the dispatch uniform block.
    fn set_uniforms(&mut self, data: &[u8]);

    /// Dispatches `x * y * z` workgroups.
    fn dispatch(&mut self, x: u32, y: u32, z: u32);
}

/// A trait for an object that records a sequence of GPU commands.
///
/// A `CommandEncoder` is the main tool for building a [`CommandBufferId`]. It creates
/// render and compute passes, and records commands that happen outside of a
/// pass: resource transitions, copies and query scopes.
pub trait CommandEncoder {
    /// Begins a new render pass, returning a mutable `RenderPass` object.
    ///
    /// The returned `RenderPass` object borrows the encoder mutably, so only one
    /// pass can be active at a time. When the `RenderPass` object is dropped,
    /// the pass is ended.
    fn begin_render_pass<'encoder>(
        &'encoder mut self,
        descriptor: &RenderPassDescriptor<'_>,
    ) -> Box<dyn RenderPass<'encoder> + 'encoder>;

    /// Begins a new compute pass, returning a mutable `ComputePass` object.
    fn begin_compute_pass<'encoder>(
        &'encoder mut self,
        descriptor: &ComputePassDescriptor<'_>,
    ) -> Box<dyn ComputePass<'encoder> + 'encoder>;

    /// Records explicit resource transitions.
    fn transition_resources(&mut self, barriers: &[TransitionBarrier]);

    /// Copies mip 0 of `source` into mip 0 of `destination`.
    fn copy_texture_to_texture(&mut self, source: TextureId, destination: TextureId);

    /// Opens query `index` of `set`.
    fn begin_query(&mut self, set: QuerySetId, index: u32);

    /// Closes query `index` of `set`.
    fn end_query(&mut self, set: QuerySetId, index: u32);

    /// Finalizes the command recording and returns a handle to the resulting command buffer.
    fn finish(self: Box<Self>) -> CommandBufferId;

    /// Returns a mutable reference to the underlying trait object as `Any`.
    fn as_any_mut(&mut self) -> &mut dyn Any;
}
