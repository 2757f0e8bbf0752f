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

//! The G-buffer lane: fills albedo, normal, specular, velocity and depth for
//! every opaque and alpha-tested mesh the main camera sees.

use super::{encoder, graphics, init_error, release_textures, viewport, StageError};
use crate::cull_lane::{VisibleMesh, VisibleSet};
use bytemuck::{Pod, Zeroable};
use std::sync::{Mutex, RwLock};
use vantage_core::lane::{
    FrameFlags, GBufferTargets, Lane, LaneContext, LaneError, LaneKind, Ref, RenderLane, Viewport,
};
use vantage_core::math::{LinearRgba, Mat4};
use vantage_core::renderer::api::{
    BlendMode, BufferId, CullMode, DepthState, IndexFormat, PrimitiveTopology,
    RenderPassColorAttachment, RenderPassDepthAttachment, RenderPassDescriptor,
    RenderPipelineDescriptor, RenderPipelineId, ResourceState, ShaderDefines,
    ShaderResourceUsage, ShaderStages, ShaderVariantKey, TextureFormat, TextureId,
};
use vantage_core::renderer::{Camera, GraphicsContext, RenderFlags, ResourceError};
use vantage_core::scene::{MaterialClass, MeshExtension, MeshRecord, Scene};

/// Color attachment formats, in attachment order.
pub const GBUFFER_COLOR_FORMATS: [TextureFormat; 4] = [
    TextureFormat::Rgba8Unorm,
    TextureFormat::Rgba16Float,
    TextureFormat::Rgba8Unorm,
    TextureFormat::Rg16Float,
];

/// Depth format shared by the G-buffer and every depth-tested pass after it.
pub const DEPTH_FORMAT: TextureFormat = TextureFormat::Depth32Float;

/// Preprocessor defines selecting the material variant of a mesh.
pub fn material_defines(
    mesh: &MeshRecord,
    extension: Option<&MeshExtension>,
    flags: RenderFlags,
) -> ShaderDefines {
    let mut defines = ShaderDefines::new()
        .define_if("ALPHA_TEST", mesh.material == MaterialClass::AlphaTested)
        .define_if(
            "INSTANCED",
            extension.is_some_and(|e| e.instance_count > 1),
        )
        .define_if(
            "COLORIZE_LOD_LEVELS",
            flags.contains(RenderFlags::COLORIZE_LOD_LEVELS),
        )
        .define_if(
            "COLORIZE_SHADOW_CASTERS",
            flags.contains(RenderFlags::COLORIZE_SHADOW_CASTERS),
        );
    if let Some(bones) = mesh.bone_count {
        defines = defines
            .define("SKELETAL")
            .define_int("MAX_BONES", i64::from(bones));
    }
    defines
}

/// Per-mesh uniform block.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct GBufferUniforms {
    /// Current model-view-projection.
    pub mvp: [[f32; 4]; 4],
    /// Previous frame's model-view-projection, for velocity.
    pub prev_mvp: [[f32; 4]; 4],
    /// Object to world.
    pub world: [[f32; 4]; 4],
    /// LOD bucket, colorize id, shadow-caster bit, unused.
    pub debug: [f32; 4],
}

impl GBufferUniforms {
    /// Builds the block for one mesh.
    pub fn new(
        mesh: &MeshRecord,
        visible: &VisibleMesh,
        extension: Option<&MeshExtension>,
        view_projection: &Mat4,
        prev_view_projection: &Mat4,
    ) -> Self {
        Self {
            mvp: (*view_projection * mesh.world).to_cols_array_2d(),
            prev_mvp: (*prev_view_projection * mesh.prev_world).to_cols_array_2d(),
            world: mesh.world.to_cols_array_2d(),
            debug: [
                visible.lod.index() as f32,
                extension.map_or(0.0, |e| e.colorize_id as f32),
                if mesh.casts_shadow { 1.0 } else { 0.0 },
                0.0,
            ],
        }
    }
}

struct MeshDraw {
    pipeline: RenderPipelineId,
    uniforms: GBufferUniforms,
    vertex: BufferId,
    index: BufferId,
    index_format: IndexFormat,
    index_count: u32,
    instances: u32,
    textures: [Option<TextureId>; 4],
}

/// Fills the G-buffer.
///
/// Expects `Ref<Scene>`, `Ref<Camera>`, [`VisibleSet`] and [`FrameFlags`];
/// inserts [`GBufferTargets`] with color targets in `ShaderRead` and depth in
/// `DepthRead`.
#[derive(Debug, Default)]
pub struct GBufferLane {
    targets: RwLock<Option<GBufferTargets>>,
    prev_view_projection: Mutex<Option<Mat4>>,
}

impl GBufferLane {
    /// Creates the lane. Targets are created on initialization.
    pub fn new() -> Self {
        Self::default()
    }

    /// The current targets.
    pub fn targets(&self) -> Option<GBufferTargets> {
        *self.targets.read().unwrap()
    }

    /// Forgets the previous view-projection, e.g. after a camera cut.
    pub fn reset_history(&self) {
        *self.prev_view_projection.lock().unwrap() = None;
    }

    fn create_targets(gfx: &GraphicsContext, size: Viewport) -> Result<GBufferTargets, ResourceError> {
        let mut created = Vec::with_capacity(5);
        let labels = ["gbuffer albedo", "gbuffer normal", "gbuffer specular", "gbuffer velocity"];
        for (label, format) in labels.iter().zip(GBUFFER_COLOR_FORMATS) {
            match super::create_target(gfx, label, size, format) {
                Ok(id) => created.push(id),
                Err(e) => {
                    release_textures(gfx, "GBufferLane", created);
                    return Err(e);
                }
            }
        }
        let depth = match super::create_target(gfx, "gbuffer depth", size, DEPTH_FORMAT) {
            Ok(id) => id,
            Err(e) => {
                release_textures(gfx, "GBufferLane", created);
                return Err(e);
            }
        };
        Ok(GBufferTargets {
            albedo: created[0],
            normal: created[1],
            specular: created[2],
            velocity: created[3],
            depth,
        })
    }

    fn release(&self, gfx: &GraphicsContext) {
        if let Some(t) = self.targets.write().unwrap().take() {
            release_textures(
                gfx,
                "GBufferLane",
                [t.albedo, t.normal, t.specular, t.velocity, t.depth],
            );
        }
    }

    fn pipeline(
        gfx: &GraphicsContext,
        defines: ShaderDefines,
        two_sided: bool,
    ) -> Result<RenderPipelineId, ResourceError> {
        let program = gfx.shader_program(
            &ShaderVariantKey::new(ShaderStages::graphics("gbuffer.vert", "gbuffer.frag"), defines),
            ShaderResourceUsage {
                sampled_textures: 4,
                storage_resources: 0,
                uniform_buffers: 1,
            },
        )?;
        gfx.render_pipeline(&RenderPipelineDescriptor {
            label: Some("gbuffer".to_owned()),
            program,
            topology: PrimitiveTopology::TriangleList,
            cull_mode: if two_sided { CullMode::None } else { CullMode::Back },
            depth: Some(DepthState::WRITE_LESS),
            blend: BlendMode::Opaque,
            color_formats: GBUFFER_COLOR_FORMATS.to_vec(),
            depth_format: Some(DEPTH_FORMAT),
        })
    }

    fn record(&self, ctx: &LaneContext) -> Result<GBufferTargets, LaneError> {
        let gfx = graphics(ctx)?;
        let targets = self
            .targets()
            .ok_or(StageError::MissingTarget("GBufferLane"))?;
        let flags = ctx.require::<FrameFlags>("FrameFlags")?.0;
        let scene = ctx.require::<Ref<Scene>>("Ref<Scene>")?.get();
        let camera = ctx.require::<Ref<Camera>>("Ref<Camera>")?.get();
        let visible = ctx.require::<VisibleSet>("VisibleSet")?;
        let encoder = encoder(ctx)?;

        let view_projection = *camera.view_projection();
        let prev_view_projection = self
            .prev_view_projection
            .lock()
            .unwrap()
            .replace(view_projection)
            .unwrap_or(view_projection);

        let mut draws = Vec::with_capacity(visible.opaque.len() + visible.alpha_tested.len());
        for entry in visible.solid_meshes() {
            let Some(mesh) = scene.mesh(entry.key) else {
                continue;
            };
            let extension = scene.extension(entry.key);
            let pipeline = Self::pipeline(
                &gfx,
                material_defines(mesh, extension, flags),
                mesh.two_sided,
            )
            .map_err(StageError::from)?;
            draws.push(MeshDraw {
                pipeline,
                uniforms: GBufferUniforms::new(
                    mesh,
                    entry,
                    extension,
                    &view_projection,
                    &prev_view_projection,
                ),
                vertex: mesh.buffers.vertex,
                index: mesh.buffers.index,
                index_format: mesh.buffers.index_format,
                index_count: mesh.buffers.index_count,
                instances: extension.map_or(1, |e| e.instance_count.max(1)),
                textures: extension.map_or([None; 4], |e| {
                    [e.albedo, e.normal, e.specular, e.emissive]
                }),
            });
        }

        {
            let mut ledger = gfx.ledger();
            // Material textures owned by the asset layer may be unknown to the ledger.
            let mut materials: Vec<TextureId> = draws
                .iter()
                .flat_map(|d| d.textures.iter().flatten().copied())
                .filter(|t| ledger.is_registered(*t))
                .collect();
            materials.sort();
            materials.dedup();
            let mut batch = ledger.batch();
            for texture in materials {
                batch = batch.texture(texture, ResourceState::ShaderRead);
            }
            batch
                .texture(targets.albedo, ResourceState::RenderTarget)
                .texture(targets.normal, ResourceState::RenderTarget)
                .texture(targets.specular, ResourceState::RenderTarget)
                .texture(targets.velocity, ResourceState::RenderTarget)
                .texture(targets.depth, ResourceState::DepthWrite)
                .submit(encoder)
                .map_err(StageError::from)?;
        }

        {
            let colors = [
                RenderPassColorAttachment::cleared(targets.albedo, LinearRgba::TRANSPARENT),
                RenderPassColorAttachment::cleared(targets.normal, LinearRgba::TRANSPARENT),
                RenderPassColorAttachment::cleared(targets.specular, LinearRgba::TRANSPARENT),
                RenderPassColorAttachment::cleared(targets.velocity, LinearRgba::TRANSPARENT),
            ];
            let mut pass = encoder.begin_render_pass(&RenderPassDescriptor {
                label: Some("gbuffer"),
                color_attachments: &colors,
                depth_attachment: Some(RenderPassDepthAttachment::cleared(targets.depth, 1.0)),
            });
            for draw in &draws {
                pass.set_pipeline(draw.pipeline);
                for (slot, texture) in draw.textures.iter().enumerate() {
                    if let Some(texture) = texture {
                        pass.bind_texture(slot as u32, *texture);
                    }
                }
                pass.set_uniforms(bytemuck::bytes_of(&draw.uniforms));
                pass.set_vertex_buffer(0, draw.vertex, 0);
                pass.set_index_buffer(draw.index, 0, draw.index_format);
                pass.draw_indexed(0..draw.index_count, 0, 0..draw.instances);
            }
        }

        gfx.ledger()
            .batch()
            .texture(targets.albedo, ResourceState::ShaderRead)
            .texture(targets.normal, ResourceState::ShaderRead)
            .texture(targets.specular, ResourceState::ShaderRead)
            .texture(targets.velocity, ResourceState::ShaderRead)
            .texture(targets.depth, ResourceState::DepthRead)
            .submit(encoder)
            .map_err(StageError::from)?;

        log::trace!("GBufferLane: {} meshes drawn", draws.len());
        Ok(targets)
    }
}

impl Lane for GBufferLane {
    fn strategy_name(&self) -> &'static str {
        "GBuffer"
    }

    fn lane_kind(&self) -> LaneKind {
        LaneKind::Geometry
    }

    fn estimate_cost(&self, ctx: &LaneContext) -> f32 {
        ctx.get::<VisibleSet>()
            .map_or(1.0, |v| (v.opaque.len() + v.alpha_tested.len()) as f32 * 0.01)
    }

    fn on_initialize(&self, ctx: &mut LaneContext) -> Result<(), LaneError> {
        let gfx = graphics(ctx)?;
        let size = viewport(ctx)?;
        self.release(&gfx);
        let targets = Self::create_targets(&gfx, size).map_err(init_error)?;
        *self.targets.write().unwrap() = Some(targets);
        Self::pipeline(&gfx, ShaderDefines::new(), false).map_err(init_error)?;
        log::debug!("GBufferLane: targets created at {}x{}", size.width, size.height);
        Ok(())
    }

    fn execute(&self, ctx: &mut LaneContext) -> Result<(), LaneError> {
        let targets = self.record(ctx)?;
        ctx.insert(targets);
        Ok(())
    }

    fn on_shutdown(&self, ctx: &mut LaneContext) {
        if let Ok(gfx) = graphics(ctx) {
            self.release(&gfx);
        }
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
}

impl RenderLane for GBufferLane {
    fn on_viewport_resized(&self, ctx: &mut LaneContext) -> Result<(), LaneError> {
        let gfx = graphics(ctx)?;
        let size = viewport(ctx)?;
        self.release(&gfx);
        let targets = Self::create_targets(&gfx, size).map_err(init_error)?;
        *self.targets.write().unwrap() = Some(targets);
        Ok(())
    }
}
