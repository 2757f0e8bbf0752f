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

//! Geometry and lighting lanes, plus the recording helpers every render lane
//! shares.
//!
//! Render lanes find their collaborators in the [`LaneContext`]:
//!
//! - `Arc<GraphicsContext>`: device, caches and the transition ledger
//! - `Slot<dyn CommandEncoder>`: the frame's encoder
//! - the frame keys of [`vantage_core::lane`]
//!
//! Every pass goes through the ledger: inputs are checked readable before
//! they are bound, outputs are transitioned before they are written.

mod depth_pyramid_lane;
mod gbuffer_lane;
mod lighting_lane;
pub mod volumes;

pub use depth_pyramid_lane::*;
pub use gbuffer_lane::*;
pub use lighting_lane::*;

use std::sync::Arc;
use thiserror::Error;
use vantage_core::lane::{LaneContext, LaneError, Slot, Viewport};
use vantage_core::renderer::api::{
    BlendMode, ComputePassDescriptor, ComputePipelineDescriptor, ComputePipelineId, Extent3D, RenderPassColorAttachment,
    RenderPassDescriptor, RenderPipelineDescriptor, RenderPipelineId, ResourceState,
    ShaderDefines, ShaderResourceUsage, ShaderStages, ShaderVariantKey, TextureDescriptor,
    TextureFormat, TextureId, TextureUsage,
};
use vantage_core::renderer::{CommandEncoder, GraphicsContext, LedgerError, ResourceError};

/// Vertex stage shared by every fullscreen pass.
pub const FULLSCREEN_VERTEX: &str = "fullscreen.vert";

/// Failure while recording a stage.
#[derive(Debug, Error)]
pub enum StageError {
    /// A device call failed.
    #[error(transparent)]
    Resource(#[from] ResourceError),
    /// An input was not in a readable state, or a resource was unknown.
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    /// The lane's targets were never created.
    #[error("{0}: targets missing, lane not initialized")]
    MissingTarget(&'static str),
}

impl From<StageError> for LaneError {
    fn from(err: StageError) -> Self {
        LaneError::execution(err)
    }
}

/// Fetches the shared graphics context.
pub fn graphics(ctx: &LaneContext) -> Result<Arc<GraphicsContext>, LaneError> {
    ctx.require::<Arc<GraphicsContext>>("Arc<GraphicsContext>")
        .cloned()
}

/// Fetches the frame's command encoder.
pub fn encoder(ctx: &LaneContext) -> Result<&mut (dyn CommandEncoder + 'static), LaneError> {
    Ok(ctx
        .require::<Slot<dyn CommandEncoder>>("Slot<dyn CommandEncoder>")?
        .get())
}

/// Fetches the output resolution.
pub fn viewport(ctx: &LaneContext) -> Result<Viewport, LaneError> {
    ctx.require::<Viewport>("Viewport").copied()
}

/// Maps an initialization failure, keeping the device error when there is one.
pub fn init_error(err: ResourceError) -> LaneError {
    LaneError::InitializationFailed(Box::new(err))
}

/// A texture bound for sampling, at the slot matching its position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Input {
    /// Every mip.
    Texture(TextureId),
    /// A single mip.
    Level(TextureId, u32),
}

impl Input {
    fn check(&self, gfx: &GraphicsContext) -> Result<(), LedgerError> {
        match *self {
            Input::Texture(id) => gfx.ledger().ensure_readable(id),
            Input::Level(id, mip) => gfx.ledger().ensure_mip_readable(id, mip),
        }
    }
}

/// One fullscreen triangle into a single color target.
///
/// The target is transitioned to `RenderTarget` before the pass and back to
/// `ShaderRead` after it, so the next pass can sample it.
#[derive(Debug)]
pub struct Fullscreen<'a> {
    /// Pass label.
    pub label: &'a str,
    /// Pipeline to draw with.
    pub pipeline: RenderPipelineId,
    /// Output.
    pub target: RenderPassColorAttachment,
    /// Sampled inputs.
    pub inputs: &'a [Input],
    /// Uniform block.
    pub uniforms: &'a [u8],
}

impl Fullscreen<'_> {
    /// Records the pass.
    pub fn record(
        &self,
        gfx: &GraphicsContext,
        encoder: &mut dyn CommandEncoder,
    ) -> Result<(), StageError> {
        for input in self.inputs {
            input.check(gfx)?;
        }
        let target = self.target.target;
        let mip = self.target.mip;
        gfx.ledger()
            .batch()
            .mip(target, mip, ResourceState::RenderTarget)
            .submit(encoder)?;
        {
            let attachments = [self.target];
            let mut pass = encoder.begin_render_pass(&RenderPassDescriptor {
                label: Some(self.label),
                color_attachments: &attachments,
                depth_attachment: None,
            });
            pass.set_pipeline(self.pipeline);
            for (slot, input) in self.inputs.iter().enumerate() {
                match *input {
                    Input::Texture(id) => pass.bind_texture(slot as u32, id),
                    Input::Level(id, level) => pass.bind_texture_level(slot as u32, id, level),
                }
            }
            if !self.uniforms.is_empty() {
                pass.set_uniforms(self.uniforms);
            }
            pass.draw(0..3, 0..1);
        }
        gfx.ledger()
            .batch()
            .mip(target, mip, ResourceState::ShaderRead)
            .submit(encoder)?;
        Ok(())
    }
}

/// One compute dispatch writing a single storage mip.
///
/// Inputs are bound at slots `0..n` and the output at slot `n`. The output
/// mip goes through `UnorderedAccess` and ends in `ShaderRead`.
#[derive(Debug)]
pub struct Dispatch<'a> {
    /// Pass label.
    pub label: &'a str,
    /// Pipeline to dispatch.
    pub pipeline: ComputePipelineId,
    /// Sampled inputs.
    pub inputs: &'a [Input],
    /// Storage output and its mip.
    pub output: (TextureId, u32),
    /// Uniform block.
    pub uniforms: &'a [u8],
    /// Workgroup counts.
    pub groups: [u32; 3],
}

impl Dispatch<'_> {
    /// Records the dispatch.
    pub fn record(
        &self,
        gfx: &GraphicsContext,
        encoder: &mut dyn CommandEncoder,
    ) -> Result<(), StageError> {
        for input in self.inputs {
            input.check(gfx)?;
        }
        let (output, mip) = self.output;
        gfx.ledger()
            .batch()
            .mip(output, mip, ResourceState::UnorderedAccess)
            .submit(encoder)?;
        {
            let mut pass = encoder.begin_compute_pass(&ComputePassDescriptor {
                label: Some(self.label),
            });
            pass.set_pipeline(self.pipeline);
            for (slot, input) in self.inputs.iter().enumerate() {
                match *input {
                    Input::Texture(id) => pass.bind_texture(slot as u32, id),
                    Input::Level(id, level) => pass.bind_texture_level(slot as u32, id, level),
                }
            }
            pass.bind_storage_texture(self.inputs.len() as u32, output, mip);
            if !self.uniforms.is_empty() {
                pass.set_uniforms(self.uniforms);
            }
            let [x, y, z] = self.groups;
            pass.dispatch(x, y, z);
        }
        gfx.ledger()
            .batch()
            .mip(output, mip, ResourceState::ShaderRead)
            .submit(encoder)?;
        Ok(())
    }
}

/// Resolves a fullscreen pipeline through the variant and pipeline caches.
pub fn fullscreen_pipeline(
    gfx: &GraphicsContext,
    label: &str,
    fragment: &str,
    defines: ShaderDefines,
    sampled_textures: u32,
    format: TextureFormat,
    blend: BlendMode,
) -> Result<RenderPipelineId, ResourceError> {
    let program = gfx.shader_program(
        &ShaderVariantKey::new(ShaderStages::graphics(FULLSCREEN_VERTEX, fragment), defines),
        ShaderResourceUsage {
            sampled_textures,
            storage_resources: 0,
            uniform_buffers: 1,
        },
    )?;
    gfx.render_pipeline(&RenderPipelineDescriptor::fullscreen(
        label, program, format, blend,
    ))
}

/// Resolves a compute pipeline through the variant and pipeline caches.
pub fn compute_pipeline(
    gfx: &GraphicsContext,
    label: &str,
    source: &str,
    defines: ShaderDefines,
    usage: ShaderResourceUsage,
) -> Result<ComputePipelineId, ResourceError> {
    let program = gfx.shader_program(
        &ShaderVariantKey::new(ShaderStages::compute(source), defines),
        usage,
    )?;
    gfx.compute_pipeline(&ComputePipelineDescriptor {
        label: Some(label.to_owned()),
        program,
    })
}

/// Creates a sampled, renderable 2D target.
pub fn create_target(
    gfx: &GraphicsContext,
    label: &str,
    size: Viewport,
    format: TextureFormat,
) -> Result<TextureId, ResourceError> {
    gfx.create_texture(
        &TextureDescriptor::render_target(label, size.width, size.height, format)
            .with_usage(TextureUsage::COPY_DST),
    )
}

/// Creates a compute-written 2D texture with `mips` levels.
pub fn create_storage(
    gfx: &GraphicsContext,
    label: &str,
    size: Viewport,
    format: TextureFormat,
    mips: u32,
) -> Result<TextureId, ResourceError> {
    gfx.create_texture(&TextureDescriptor {
        label: Some(label.into()),
        size: Extent3D::d2(size.width, size.height),
        mip_level_count: mips.max(1),
        format,
        usage: TextureUsage::STORAGE_BINDING | TextureUsage::TEXTURE_BINDING,
    })
}

/// Destroys textures, logging failures.
pub fn release_textures(
    gfx: &GraphicsContext,
    owner: &str,
    textures: impl IntoIterator<Item = TextureId>,
) {
    for id in textures {
        if let Err(e) = gfx.destroy_texture(id) {
            log::warn!("{owner}: failed to destroy {id:?}: {e}");
        }
    }
}

/// Workgroups needed to cover `extent` texels with groups of `group`.
#[inline]
pub fn workgroups(extent: u32, group: u32) -> u32 {
    extent.div_ceil(group.max(1)).max(1)
}

/// A matrix as a plain column array for uniform blocks.
#[inline]
pub fn cols(m: &vantage_core::math::Mat4) -> [[f32; 4]; 4] {
    m.to_cols_array_2d()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_workgroups_round_up() {
        assert_eq!(workgroups(1920, 8), 240);
        assert_eq!(workgroups(1921, 8), 241);
        assert_eq!(workgroups(0, 8), 1);
    }

    #[test]
    fn test_stage_error_becomes_execution_failure() {
        let err: LaneError = StageError::MissingTarget("Tonemap").into();
        assert!(matches!(err, LaneError::ExecutionFailed(_)));
        assert!(err.to_string().contains("Tonemap"));
    }
}
