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

//! A recording graphics device for integration tests.
//!
//! Texture contents are simulated as 64-bit digests per (layer, mip). The
//! encoder records commands; the device replays them on submit, the way a GPU
//! would run them: clears set a digest, every draw or dispatch folds its
//! pipeline, sampled inputs, uniforms and ranges into the texels it writes,
//! and copies move digests. Transitions update a per-mip state table, and any
//! texture sampled while not shader-readable is recorded as a bad read.

#![allow(dead_code)]

use std::any::Any;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::hash::{DefaultHasher, Hash, Hasher};
use std::ops::Range;
use std::sync::{Arc, Mutex};
use vantage_core::renderer::api::{
    AdapterInfo, BackendFamily, BufferDescriptor, BufferId, CommandBufferId,
    ComputePassDescriptor, ComputePipelineDescriptor, ComputePipelineId, DeviceFeature,
    DeviceLimits, IndexFormat, LoadOp, QueryKind, QuerySetDescriptor, QuerySetId,
    RenderPassColorAttachment, RenderPassDepthAttachment, RenderPassDescriptor,
    RenderPipelineDescriptor, RenderPipelineId, ResourceHandle, ResourceState,
    ShaderProgramDescriptor, ShaderProgramId, TextureDescriptor, TextureId, TransitionBarrier,
};
use vantage_core::renderer::{
    CommandEncoder, ComputePass, GraphicsDevice, RenderPass, ResourceError, ShaderError,
};

/// Installs the test logger once.
pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn fold(seed: u64, value: impl Hash) -> u64 {
    let mut hasher = DefaultHasher::new();
    seed.hash(&mut hasher);
    value.hash(&mut hasher);
    hasher.finish()
}

/// A texture sampled while not in a readable state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BadRead {
    /// Pass that sampled it.
    pub pass: String,
    /// Label of the texture.
    pub texture: String,
    /// Offending mip.
    pub mip: u32,
    /// State it was in.
    pub state: ResourceState,
}

/// One executed pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassLog {
    /// Submission the pass belonged to.
    pub submission: u64,
    /// Pass label.
    pub label: String,
    /// Draw calls or dispatches.
    pub work: usize,
}

#[derive(Debug)]
struct MockTexture {
    label: String,
    layers: u32,
    states: Vec<ResourceState>,
}

#[derive(Debug, Clone, Copy)]
enum Binding {
    Texture(TextureId),
    Level(TextureId, u32),
}

#[derive(Debug, Clone)]
struct Work {
    pipeline: u64,
    bindings: BTreeMap<u32, Binding>,
    storage: Vec<(TextureId, u32)>,
    buffers: Vec<(u32, u64)>,
    uniforms: Vec<u8>,
    ranges: [u32; 6],
}

#[derive(Debug)]
enum Command {
    Transition(Vec<TransitionBarrier>),
    Copy(TextureId, TextureId),
    BeginQuery(QuerySetId, u32),
    EndQuery(QuerySetId, u32),
    Render {
        label: String,
        colors: Vec<RenderPassColorAttachment>,
        depth: Option<RenderPassDepthAttachment>,
        draws: Vec<Work>,
    },
    Compute {
        label: String,
        dispatches: Vec<Work>,
    },
}

#[derive(Debug, Default)]
struct MockState {
    next_id: u64,
    textures: HashMap<TextureId, MockTexture>,
    digests: HashMap<(TextureId, u32, u32), u64>,
    buffers: HashMap<BufferId, String>,
    programs: HashMap<ShaderProgramId, String>,
    render_pipelines: HashMap<RenderPipelineId, RenderPipelineDescriptor>,
    compute_pipelines: HashMap<ComputePipelineId, ComputePipelineDescriptor>,
    query_sets: HashMap<QuerySetId, (QueryKind, u32)>,
    query_results: HashMap<QuerySetId, Vec<u64>>,
    queries_ready: bool,
    recorded: HashMap<CommandBufferId, Vec<Command>>,
    submissions: u64,
    passes: Vec<PassLog>,
    transitions: Vec<TransitionBarrier>,
    bad_reads: Vec<BadRead>,
    failing_textures: HashSet<String>,
    failing_shaders: Vec<String>,
    failing_query_sets: HashSet<String>,
}

impl MockState {
    fn id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn label_of(&self, id: TextureId) -> String {
        self.textures
            .get(&id)
            .map_or_else(|| format!("texture#{}", id.0), |t| t.label.clone())
    }

    fn texture_digest(&self, id: TextureId) -> u64 {
        let mut entries: Vec<_> = self
            .digests
            .iter()
            .filter(|((t, _, _), _)| *t == id)
            .map(|((_, layer, mip), d)| (*layer, *mip, *d))
            .collect();
        entries.sort_unstable();
        fold(id.0, entries)
    }

    fn level_digest(&self, id: TextureId, mip: u32) -> u64 {
        let mut entries: Vec<_> = self
            .digests
            .iter()
            .filter(|((t, _, m), _)| *t == id && *m == mip)
            .map(|((_, layer, _), d)| (*layer, *d))
            .collect();
        entries.sort_unstable();
        fold(id.0, entries)
    }

    fn check_read(&mut self, pass: &str, id: TextureId, mip: Option<u32>) {
        let Some(texture) = self.textures.get(&id) else {
            return;
        };
        let mips: Vec<u32> = match mip {
            Some(mip) => vec![mip],
            None => (0..texture.states.len() as u32).collect(),
        };
        let reads: Vec<BadRead> = mips
            .into_iter()
            .filter_map(|mip| {
                let state = texture.states.get(mip as usize).copied().unwrap_or_default();
                (!state.is_readable()).then(|| BadRead {
                    pass: pass.to_string(),
                    texture: texture.label.clone(),
                    mip,
                    state,
                })
            })
            .collect();
        self.bad_reads.extend(reads);
    }

    fn work_hash(&mut self, pass: &str, work: &Work) -> u64 {
        let mut inputs = Vec::with_capacity(work.bindings.len());
        for (slot, binding) in &work.bindings {
            let digest = match *binding {
                Binding::Texture(id) => {
                    self.check_read(pass, id, None);
                    self.texture_digest(id)
                }
                Binding::Level(id, mip) => {
                    self.check_read(pass, id, Some(mip));
                    self.level_digest(id, mip)
                }
            };
            inputs.push((*slot, digest));
        }
        fold(
            work.pipeline,
            (&inputs, &work.buffers, &work.uniforms, work.ranges),
        )
    }

    fn write(&mut self, key: (TextureId, u32, u32), work: u64) {
        let old = self.digests.get(&key).copied().unwrap_or(0);
        self.digests.insert(key, fold(old, work));
    }

    fn execute(&mut self, commands: Vec<Command>) {
        self.submissions += 1;
        let submission = self.submissions;
        for command in commands {
            match command {
                Command::Transition(barriers) => {
                    for barrier in barriers {
                        if let ResourceHandle::Texture(id) = barrier.resource {
                            if let Some(texture) = self.textures.get_mut(&id) {
                                if let Some(state) = texture.states.get_mut(barrier.mip as usize) {
                                    *state = barrier.after;
                                }
                            }
                        }
                        self.transitions.push(barrier);
                    }
                }
                Command::Copy(source, destination) => {
                    let copied: Vec<_> = self
                        .digests
                        .iter()
                        .filter(|((t, _, _), _)| *t == source)
                        .map(|((_, layer, mip), d)| (*layer, *mip, *d))
                        .collect();
                    self.digests.retain(|(t, _, _), _| *t != destination);
                    for (layer, mip, digest) in copied {
                        self.digests.insert((destination, layer, mip), digest);
                    }
                    self.passes.push(PassLog {
                        submission,
                        label: "copy".to_string(),
                        work: 1,
                    });
                }
                Command::BeginQuery(..) => {}
                Command::EndQuery(set, _) => {
                    if let Some((_, count)) = self.query_sets.get(&set) {
                        let values = vec![submission; *count as usize];
                        self.query_results.insert(set, values);
                    }
                }
                Command::Render {
                    label,
                    colors,
                    depth,
                    draws,
                } => {
                    for color in &colors {
                        if let LoadOp::Clear(value) = color.ops.load {
                            let bits = [value.r, value.g, value.b, value.a].map(f32::to_bits);
                            self.digests
                                .insert((color.target, color.layer, color.mip), fold(0, bits));
                        }
                    }
                    let depth_write = depth.filter(|d| d.is_writable());
                    if let Some(ops) = depth_write.and_then(|d| d.depth_ops) {
                        if let LoadOp::Clear(value) = ops.load {
                            let target = depth_write.map(|d| (d.target, d.layer));
                            if let Some((target, layer)) = target {
                                self.digests.insert((target, layer, 0), fold(1, value.to_bits()));
                            }
                        }
                    }
                    for draw in &draws {
                        let work = self.work_hash(&label, draw);
                        for color in &colors {
                            self.write((color.target, color.layer, color.mip), work);
                        }
                        if let Some(depth) = depth_write {
                            self.write((depth.target, depth.layer, 0), work);
                        }
                    }
                    self.passes.push(PassLog {
                        submission,
                        label,
                        work: draws.len(),
                    });
                }
                Command::Compute { label, dispatches } => {
                    for dispatch in &dispatches {
                        let work = self.work_hash(&label, dispatch);
                        for (texture, mip) in &dispatch.storage {
                            let layers = self.textures.get(texture).map_or(1, |t| t.layers);
                            for layer in 0..layers {
                                self.write((*texture, layer, *mip), work);
                            }
                        }
                    }
                    self.passes.push(PassLog {
                        submission,
                        label,
                        work: dispatches.len(),
                    });
                }
            }
        }
    }
}

/// See the module documentation.
#[derive(Debug, Clone, Default)]
pub struct MockGraphicsDevice {
    state: Arc<Mutex<MockState>>,
}

impl MockGraphicsDevice {
    /// A device whose query results are always ready.
    pub fn new() -> Self {
        let device = Self::default();
        device.set_queries_ready(true);
        device
    }

    /// Fails every texture created with this label.
    pub fn fail_texture(&self, label: &str) {
        self.state.lock().unwrap().failing_textures.insert(label.to_string());
    }

    /// Fails every query set created with this label.
    pub fn fail_query_set(&self, label: &str) {
        self.state.lock().unwrap().failing_query_sets.insert(label.to_string());
    }

    /// Number of live query sets.
    pub fn live_query_sets(&self) -> usize {
        self.state.lock().unwrap().query_sets.len()
    }

    /// Fails every shader variant whose description contains `pattern`.
    pub fn fail_shader(&self, pattern: &str) {
        self.state.lock().unwrap().failing_shaders.push(pattern.to_string());
    }

    /// Controls whether query results are available when read.
    pub fn set_queries_ready(&self, ready: bool) {
        self.state.lock().unwrap().queries_ready = ready;
    }

    /// Digest of every layer and mip of a texture.
    pub fn digest(&self, id: TextureId) -> u64 {
        self.state.lock().unwrap().texture_digest(id)
    }

    /// Digest of one texel range, if it was ever written.
    pub fn texel_digest(&self, id: TextureId, layer: u32, mip: u32) -> Option<u64> {
        self.state.lock().unwrap().digests.get(&(id, layer, mip)).copied()
    }

    /// Device-side state of one mip.
    pub fn state_of(&self, id: TextureId, mip: u32) -> Option<ResourceState> {
        let state = self.state.lock().unwrap();
        state
            .textures
            .get(&id)
            .and_then(|t| t.states.get(mip as usize).copied())
    }

    /// The live texture carrying `label`.
    pub fn texture_by_label(&self, label: &str) -> Option<TextureId> {
        let state = self.state.lock().unwrap();
        state
            .textures
            .iter()
            .filter(|(_, t)| t.label == label)
            .map(|(id, _)| *id)
            .max()
    }

    /// Label of a live texture.
    pub fn texture_label(&self, id: TextureId) -> Option<String> {
        let state = self.state.lock().unwrap();
        state.textures.get(&id).map(|t| t.label.clone())
    }

    /// Descriptor of a live render pipeline.
    pub fn render_pipeline(&self, id: RenderPipelineId) -> Option<RenderPipelineDescriptor> {
        self.state.lock().unwrap().render_pipelines.get(&id).cloned()
    }

    /// Number of live objects of every kind.
    pub fn live_objects(&self) -> usize {
        let state = self.state.lock().unwrap();
        state.textures.len()
            + state.buffers.len()
            + state.programs.len()
            + state.render_pipelines.len()
            + state.compute_pipelines.len()
            + state.query_sets.len()
    }

    /// Number of live textures.
    pub fn live_textures(&self) -> usize {
        self.state.lock().unwrap().textures.len()
    }

    /// Number of command buffers submitted.
    pub fn submissions(&self) -> u64 {
        self.state.lock().unwrap().submissions
    }

    /// Every executed pass.
    pub fn passes(&self) -> Vec<PassLog> {
        self.state.lock().unwrap().passes.clone()
    }

    /// Passes of one submission carrying `label`.
    pub fn passes_in(&self, submission: u64, label: &str) -> usize {
        let state = self.state.lock().unwrap();
        state
            .passes
            .iter()
            .filter(|p| p.submission == submission && p.label == label)
            .count()
    }

    /// Every transition executed so far.
    pub fn transitions(&self) -> Vec<TransitionBarrier> {
        self.state.lock().unwrap().transitions.clone()
    }

    /// Textures sampled while not readable.
    pub fn bad_reads(&self) -> Vec<BadRead> {
        self.state.lock().unwrap().bad_reads.clone()
    }
}

impl GraphicsDevice for MockGraphicsDevice {
    fn create_shader_program(
        &self,
        descriptor: &ShaderProgramDescriptor,
    ) -> Result<ShaderProgramId, ResourceError> {
        let mut state = self.state.lock().unwrap();
        let variant = descriptor.variant.to_string();
        if state.failing_shaders.iter().any(|p| variant.contains(p.as_str())) {
            return Err(ResourceError::Shader(ShaderError::CompilationError {
                label: variant,
                details: "injected failure".to_string(),
            }));
        }
        let id = ShaderProgramId(state.id());
        state.programs.insert(id, variant);
        Ok(id)
    }

    fn destroy_shader_program(&self, id: ShaderProgramId) -> Result<(), ResourceError> {
        let mut state = self.state.lock().unwrap();
        state.programs.remove(&id).map(|_| ()).ok_or(ResourceError::NotFound)
    }

    fn create_render_pipeline(
        &self,
        descriptor: &RenderPipelineDescriptor,
    ) -> Result<RenderPipelineId, ResourceError> {
        let mut state = self.state.lock().unwrap();
        let id = RenderPipelineId(state.id());
        state.render_pipelines.insert(id, descriptor.clone());
        Ok(id)
    }

    fn destroy_render_pipeline(&self, id: RenderPipelineId) -> Result<(), ResourceError> {
        let mut state = self.state.lock().unwrap();
        state
            .render_pipelines
            .remove(&id)
            .map(|_| ())
            .ok_or(ResourceError::NotFound)
    }

    fn create_compute_pipeline(
        &self,
        descriptor: &ComputePipelineDescriptor,
    ) -> Result<ComputePipelineId, ResourceError> {
        let mut state = self.state.lock().unwrap();
        let id = ComputePipelineId(state.id());
        state.compute_pipelines.insert(id, descriptor.clone());
        Ok(id)
    }

    fn destroy_compute_pipeline(&self, id: ComputePipelineId) -> Result<(), ResourceError> {
        let mut state = self.state.lock().unwrap();
        state
            .compute_pipelines
            .remove(&id)
            .map(|_| ())
            .ok_or(ResourceError::NotFound)
    }

    fn create_buffer(&self, descriptor: &BufferDescriptor) -> Result<BufferId, ResourceError> {
        let mut state = self.state.lock().unwrap();
        let id = BufferId(state.id());
        let label = descriptor.label.as_deref().unwrap_or("buffer").to_string();
        state.buffers.insert(id, label);
        Ok(id)
    }

    fn create_buffer_with_data(
        &self,
        descriptor: &BufferDescriptor,
        _data: &[u8],
    ) -> Result<BufferId, ResourceError> {
        self.create_buffer(descriptor)
    }

    fn destroy_buffer(&self, id: BufferId) -> Result<(), ResourceError> {
        let mut state = self.state.lock().unwrap();
        state.buffers.remove(&id).map(|_| ()).ok_or(ResourceError::NotFound)
    }

    fn write_buffer(&self, id: BufferId, _offset: u64, _data: &[u8]) -> Result<(), ResourceError> {
        let state = self.state.lock().unwrap();
        if state.buffers.contains_key(&id) {
            Ok(())
        } else {
            Err(ResourceError::NotFound)
        }
    }

    fn create_texture(&self, descriptor: &TextureDescriptor) -> Result<TextureId, ResourceError> {
        let mut state = self.state.lock().unwrap();
        let label = descriptor.label.as_deref().unwrap_or("texture").to_string();
        if state.failing_textures.contains(&label) {
            return Err(ResourceError::AllocationFailed {
                label,
                reason: "injected failure".to_string(),
            });
        }
        let id = TextureId(state.id());
        state.textures.insert(
            id,
            MockTexture {
                label,
                layers: descriptor.size.depth_or_array_layers.max(1),
                states: vec![ResourceState::Undefined; descriptor.mip_level_count.max(1) as usize],
            },
        );
        Ok(id)
    }

    fn destroy_texture(&self, id: TextureId) -> Result<(), ResourceError> {
        let mut state = self.state.lock().unwrap();
        state.digests.retain(|(t, _, _), _| *t != id);
        state.textures.remove(&id).map(|_| ()).ok_or(ResourceError::NotFound)
    }

    fn create_query_set(
        &self,
        descriptor: &QuerySetDescriptor,
    ) -> Result<QuerySetId, ResourceError> {
        let mut state = self.state.lock().unwrap();
        let label = descriptor.label.unwrap_or("query set").to_string();
        if state.failing_query_sets.contains(&label) {
            return Err(ResourceError::AllocationFailed {
                label,
                reason: "injected failure".to_string(),
            });
        }
        let id = QuerySetId(state.id());
        state.query_sets.insert(id, (descriptor.kind, descriptor.count));
        Ok(id)
    }

    fn destroy_query_set(&self, id: QuerySetId) -> Result<(), ResourceError> {
        let mut state = self.state.lock().unwrap();
        state.query_results.remove(&id);
        state.query_sets.remove(&id).map(|_| ()).ok_or(ResourceError::NotFound)
    }

    fn read_query_results(
        &self,
        id: QuerySetId,
        queries: Range<u32>,
    ) -> Result<Option<Vec<u64>>, ResourceError> {
        let state = self.state.lock().unwrap();
        if !state.query_sets.contains_key(&id) {
            return Err(ResourceError::NotFound);
        }
        if !state.queries_ready {
            return Ok(None);
        }
        Ok(state.query_results.get(&id).map(|values| {
            values
                .iter()
                .skip(queries.start as usize)
                .take(queries.len())
                .copied()
                .collect()
        }))
    }

    fn create_command_encoder(&self, _label: Option<&str>) -> Box<dyn CommandEncoder> {
        Box::new(MockEncoder {
            state: Arc::clone(&self.state),
            commands: Vec::new(),
        })
    }

    fn submit_command_buffer(&self, command_buffer: CommandBufferId) {
        let mut state = self.state.lock().unwrap();
        if let Some(commands) = state.recorded.remove(&command_buffer) {
            state.execute(commands);
        }
    }

    fn get_adapter_info(&self) -> AdapterInfo {
        AdapterInfo {
            name: "mock".to_string(),
            backend: BackendFamily::Emulated,
        }
    }

    fn limits(&self) -> DeviceLimits {
        DeviceLimits::default()
    }

    fn supports_feature(&self, _feature: DeviceFeature) -> bool {
        true
    }
}

struct MockEncoder {
    state: Arc<Mutex<MockState>>,
    commands: Vec<Command>,
}

struct MockRenderPass<'a> {
    commands: &'a mut Vec<Command>,
    label: String,
    colors: Vec<RenderPassColorAttachment>,
    depth: Option<RenderPassDepthAttachment>,
    current: Work,
    draws: Vec<Work>,
}

struct MockComputePass<'a> {
    commands: &'a mut Vec<Command>,
    label: String,
    current: Work,
    dispatches: Vec<Work>,
}

fn empty_work() -> Work {
    Work {
        pipeline: 0,
        bindings: BTreeMap::new(),
        storage: Vec::new(),
        buffers: Vec::new(),
        uniforms: Vec::new(),
        ranges: [0; 6],
    }
}

impl<'a> RenderPass<'a> for MockRenderPass<'a> {
    fn set_pipeline(&mut self, pipeline: RenderPipelineId) {
        self.current.pipeline = pipeline.0;
    }

    fn set_vertex_buffer(&mut self, slot: u32, buffer: BufferId, _offset: u64) {
        self.current.buffers.retain(|(s, _)| *s != slot);
        self.current.buffers.push((slot, buffer.0));
    }

    fn set_index_buffer(&mut self, buffer: BufferId, _offset: u64, _format: IndexFormat) {
        self.current.buffers.retain(|(s, _)| *s != u32::MAX);
        self.current.buffers.push((u32::MAX, buffer.0));
    }

    fn bind_texture(&mut self, slot: u32, texture: TextureId) {
        self.current.bindings.insert(slot, Binding::Texture(texture));
    }

    fn bind_texture_level(&mut self, slot: u32, texture: TextureId, mip: u32) {
        self.current.bindings.insert(slot, Binding::Level(texture, mip));
    }

    fn bind_buffer(&mut self, slot: u32, buffer: BufferId) {
        self.set_vertex_buffer(slot + 1000, buffer, 0);
    }

    fn set_uniforms(&mut self, data: &[u8]) {
        self.current.uniforms = data.to_vec();
    }

    fn draw(&mut self, vertices: Range<u32>, instances: Range<u32>) {
        let mut work = self.current.clone();
        work.ranges = [vertices.start, vertices.end, instances.start, instances.end, 0, 0];
        self.draws.push(work);
    }

    fn draw_indexed(&mut self, indices: Range<u32>, base_vertex: i32, instances: Range<u32>) {
        let mut work = self.current.clone();
        work.ranges = [
            indices.start,
            indices.end,
            instances.start,
            instances.end,
            base_vertex as u32,
            1,
        ];
        self.draws.push(work);
    }
}

impl Drop for MockRenderPass<'_> {
    fn drop(&mut self) {
        self.commands.push(Command::Render {
            label: std::mem::take(&mut self.label),
            colors: std::mem::take(&mut self.colors),
            depth: self.depth.take(),
            draws: std::mem::take(&mut self.draws),
        });
    }
}

impl<'a> ComputePass<'a> for MockComputePass<'a> {
    fn set_pipeline(&mut self, pipeline: ComputePipelineId) {
        self.current.pipeline = pipeline.0;
    }

    fn bind_texture(&mut self, slot: u32, texture: TextureId) {
        self.current.bindings.insert(slot, Binding::Texture(texture));
    }

    fn bind_texture_level(&mut self, slot: u32, texture: TextureId, mip: u32) {
        self.current.bindings.insert(slot, Binding::Level(texture, mip));
    }

    fn bind_storage_texture(&mut self, slot: u32, texture: TextureId, mip: u32) {
        self.current.bindings.remove(&slot);
        self.current.storage.retain(|(t, m)| (*t, *m) != (texture, mip));
        self.current.storage.push((texture, mip));
    }

    fn set_uniforms(&mut self, data: &[u8]) {
        self.current.uniforms = data.to_vec();
    }

    fn dispatch(&mut self, x: u32, y: u32, z: u32) {
        let mut work = self.current.clone();
        work.ranges = [x, y, z, 0, 0, 0];
        self.dispatches.push(work);
    }
}

impl Drop for MockComputePass<'_> {
    fn drop(&mut self) {
        self.commands.push(Command::Compute {
            label: std::mem::take(&mut self.label),
            dispatches: std::mem::take(&mut self.dispatches),
        });
    }
}

impl CommandEncoder for MockEncoder {
    fn begin_render_pass<'encoder>(
        &'encoder mut self,
        descriptor: &RenderPassDescriptor<'_>,
    ) -> Box<dyn RenderPass<'encoder> + 'encoder> {
        Box::new(MockRenderPass {
            commands: &mut self.commands,
            label: descriptor.label.unwrap_or("render pass").to_string(),
            colors: descriptor.color_attachments.to_vec(),
            depth: descriptor.depth_attachment,
            current: empty_work(),
            draws: Vec::new(),
        })
    }

    fn begin_compute_pass<'encoder>(
        &'encoder mut self,
        descriptor: &ComputePassDescriptor<'_>,
    ) -> Box<dyn ComputePass<'encoder> + 'encoder> {
        Box::new(MockComputePass {
            commands: &mut self.commands,
            label: descriptor.label.unwrap_or("compute pass").to_string(),
            current: empty_work(),
            dispatches: Vec::new(),
        })
    }

    fn transition_resources(&mut self, barriers: &[TransitionBarrier]) {
        self.commands.push(Command::Transition(barriers.to_vec()));
    }

    fn copy_texture_to_texture(&mut self, source: TextureId, destination: TextureId) {
        self.commands.push(Command::Copy(source, destination));
    }

    fn begin_query(&mut self, set: QuerySetId, index: u32) {
        self.commands.push(Command::BeginQuery(set, index));
    }

    fn end_query(&mut self, set: QuerySetId, index: u32) {
        self.commands.push(Command::EndQuery(set, index));
    }

    fn finish(self: Box<Self>) -> CommandBufferId {
        let encoder = *self;
        let mut state = encoder.state.lock().unwrap();
        let id = CommandBufferId(state.id());
        state.recorded.insert(id, encoder.commands);
        id
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
