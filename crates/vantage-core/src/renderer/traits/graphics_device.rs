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

use crate::renderer::api::*;
use crate::renderer::error::ResourceError;
use crate::renderer::traits::CommandEncoder;
use std::fmt::Debug;
use std::ops::Range;

/// The backend-agnostic graphics device the orchestrator records against.
///
/// Implementations wrap a concrete GPU API. The orchestrator never talks to a
/// backend directly; it goes through this trait, usually via
/// [`GraphicsContext`](crate::renderer::GraphicsContext), which adds caching
/// and lifetime tracking on top.
pub trait GraphicsDevice: Send + Sync + Debug + 'static {
    /// Compiles a shader program variant.
    /// ## Arguments
    /// * `descriptor` - The variant key and its declared resource usage.
    /// ## Returns
    /// A `Result` containing the ID of the created program.
    /// ## Errors
    /// * `ResourceError::Shader` - If compilation or validation fails.
    fn create_shader_program(
        &self,
        descriptor: &ShaderProgramDescriptor,
    ) -> Result<ShaderProgramId, ResourceError>;

    /// Destroys a shader program.
    /// ## Arguments
    /// * `id` - The ID of the program to destroy.
    /// ## Returns
    /// A `Result` indicating success or failure of the operation.
    fn destroy_shader_program(&self, id: ShaderProgramId) -> Result<(), ResourceError>;

    /// Creates a render pipeline from the provided descriptor.
    /// ## Arguments
    /// * `descriptor` - A reference to a `RenderPipelineDescriptor` containing the pipeline configuration.
    /// ## Returns
    /// A `Result` containing the ID of the created render pipeline or an error if the creation fails.
    /// ## Errors
    /// * `ResourceError` - If the render pipeline creation fails.
    fn create_render_pipeline(
        &self,
        descriptor: &RenderPipelineDescriptor,
    ) -> Result<RenderPipelineId, ResourceError>;

    /// Destroys the render pipeline associated with the given ID.
    /// ## Arguments
    /// * `id` - The ID of the render pipeline to be destroyed.
    /// ## Returns
    /// A `Result` indicating success or failure of the operation.
    fn destroy_render_pipeline(&self, id: RenderPipelineId) -> Result<(), ResourceError>;

    /// Creates a compute pipeline from the provided descriptor.
    /// ## Arguments
    /// * `descriptor` - The compute program to wrap.
    /// ## Returns
    /// A `Result` containing the ID of the created compute pipeline.
    fn create_compute_pipeline(
        &self,
        descriptor: &ComputePipelineDescriptor,
    ) -> Result<ComputePipelineId, ResourceError>;

    /// Destroys a compute pipeline.
    fn destroy_compute_pipeline(&self, id: ComputePipelineId) -> Result<(), ResourceError>;

    /// Creates a new GPU buffer.
    /// ## Arguments
    /// * `descriptor` - A reference to a `BufferDescriptor` containing the buffer configuration.
    /// ## Returns
    /// A `Result` containing the ID of the created buffer or an error if the creation fails.
    fn create_buffer(&self, descriptor: &BufferDescriptor) -> Result<BufferId, ResourceError>;

    /// Creates a new GPU buffer and initializes it with the provided data.
    /// ## Arguments
    /// * `descriptor` - A reference to a `BufferDescriptor` containing the buffer configuration.
    /// * `data` - A slice of bytes containing the initial data for the buffer.
    /// ## Returns
    /// A `Result` containing the ID of the created buffer or an error if the creation fails.
    fn create_buffer_with_data(
        &self,
        descriptor: &BufferDescriptor,
        data: &[u8],
    ) -> Result<BufferId, ResourceError>;

    /// Destroys a GPU buffer.
    fn destroy_buffer(&self, id: BufferId) -> Result<(), ResourceError>;

    /// Writes data to a GPU buffer.
    /// ## Arguments
    /// * `id` - The ID of the buffer to write to.
    /// * `offset` - The offset in the buffer where the data will be written.
    /// * `data` - A slice of bytes containing the data to be written.
    /// ## Returns
    /// A `Result` indicating success or failure of the operation.
    fn write_buffer(&self, id: BufferId, offset: u64, data: &[u8]) -> Result<(), ResourceError>;

    /// Creates a new GPU texture.
    /// ## Arguments
    /// * `descriptor` - A reference to a `TextureDescriptor` containing the texture configuration.
    /// ## Returns
    /// A `Result` containing the ID of the created texture.
    /// ## Errors
    /// * `ResourceError::AllocationFailed` - If the format or size is unsupported.
    fn create_texture(&self, descriptor: &TextureDescriptor) -> Result<TextureId, ResourceError>;

    /// Destroys a GPU texture.
    fn destroy_texture(&self, id: TextureId) -> Result<(), ResourceError>;

    /// Creates a set of GPU queries.
    fn create_query_set(&self, descriptor: &QuerySetDescriptor)
        -> Result<QuerySetId, ResourceError>;

    /// Destroys a query set.
    fn destroy_query_set(&self, id: QuerySetId) -> Result<(), ResourceError>;

    /// Reads back the results of a range of queries without blocking.
    /// ## Arguments
    /// * `id` - The query set.
    /// * `queries` - The query indices to read.
    /// ## Returns
    /// `Ok(None)` when the GPU has not produced the results yet. The caller
    /// never waits for them.
    fn read_query_results(
        &self,
        id: QuerySetId,
        queries: Range<u32>,
    ) -> Result<Option<Vec<u64>>, ResourceError>;

    /// Creates a new command encoder to record GPU commands.
    /// ## Arguments
    /// * `label` - An optional label for the command encoder.
    /// ## Returns
    /// A `Box` containing the created command encoder.
    fn create_command_encoder(&self, label: Option<&str>) -> Box<dyn CommandEncoder>;

    /// Submits a finished command buffer for execution.
    fn submit_command_buffer(&self, command_buffer: CommandBufferId);

    /// Returns information about the adapter.
    fn get_adapter_info(&self) -> AdapterInfo;

    /// Returns the per-stage resource limits of the device.
    fn limits(&self) -> DeviceLimits;

    /// Returns `true` if the device supports `feature`.
    fn supports_feature(&self, feature: DeviceFeature) -> bool;
}
