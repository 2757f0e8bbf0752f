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

//! The `GraphicsContext`: a device wrapper owned by the orchestrator.
//!
//! It adds three things on top of a [`GraphicsDevice`]:
//!
//! - a shader-variant cache keyed by [`ShaderVariantKey`] and a pipeline cache
//!   keyed by pipeline descriptors,
//! - the [`ResourceLedger`], kept in sync with texture and buffer lifetimes,
//! - a live-object table with labels and reference counts, swept by
//!   [`GraphicsContext::teardown`] to report leaks.

use crate::renderer::api::*;
use crate::renderer::error::ResourceError;
use crate::renderer::ledger::ResourceLedger;
use crate::renderer::traits::{CommandEncoder, GraphicsDevice};
use std::collections::HashMap;
use std::fmt;
use std::ops::Range;
use std::sync::{Arc, Mutex, MutexGuard};

/// Any GPU object the context tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GpuObject {
    /// A texture.
    Texture(TextureId),
    /// A buffer.
    Buffer(BufferId),
    /// A query set.
    QuerySet(QuerySetId),
    /// A shader program.
    Program(ShaderProgramId),
    /// A render pipeline.
    RenderPipeline(RenderPipelineId),
    /// A compute pipeline.
    ComputePipeline(ComputePipelineId),
}

#[derive(Debug, Clone)]
struct LiveEntry {
    label: String,
    refs: u32,
}

/// One object found alive at teardown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeakedObject {
    /// The object.
    pub object: GpuObject,
    /// Its creation label.
    pub label: String,
    /// Outstanding references.
    pub refs: u32,
}

/// Result of the teardown sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LeakReport {
    /// Objects that were still referenced, sorted by label.
    pub leaks: Vec<LeakedObject>,
    /// Cached programs and pipelines released normally.
    pub cached_released: usize,
}

impl LeakReport {
    /// Returns `true` if nothing leaked.
    pub fn is_clean(&self) -> bool {
        self.leaks.is_empty()
    }
}

/// A program binding more resources than the device allows in one stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LimitViolation {
    /// The offending variant.
    pub program: String,
    /// Which limit.
    pub resource: &'static str,
    /// Declared usage.
    pub used: u32,
    /// Device limit.
    pub limit: u32,
}

impl fmt::Display for LimitViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "'{}' binds {} {} per stage, device allows {}",
            self.program, self.used, self.resource, self.limit
        )
    }
}

/// Hit and miss counts of the variant and pipeline caches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Programs found in the cache.
    pub program_hits: u64,
    /// Programs compiled.
    pub program_misses: u64,
    /// Pipelines found in the cache.
    pub pipeline_hits: u64,
    /// Pipelines created.
    pub pipeline_misses: u64,
}

/// Device wrapper with caches, the transition ledger and leak tracking.
pub struct GraphicsContext {
    device: Arc<dyn GraphicsDevice>,
    conformance_checks: bool,
    programs: Mutex<HashMap<ShaderVariantKey, ShaderProgramId>>,
    render_pipelines: Mutex<HashMap<RenderPipelineDescriptor, RenderPipelineId>>,
    compute_pipelines: Mutex<HashMap<ComputePipelineDescriptor, ComputePipelineId>>,
    live: Mutex<HashMap<GpuObject, LiveEntry>>,
    ledger: Mutex<ResourceLedger>,
    violations: Mutex<Vec<LimitViolation>>,
    stats: Mutex<CacheStats>,
}

impl fmt::Debug for GraphicsContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GraphicsContext")
            .field("device", &self.device)
            .field("live_objects", &self.live_object_count())
            .finish()
    }
}

impl GraphicsContext {
    /// Wraps a device.
    ///
    /// With `conformance_checks`, every newly compiled program is checked
    /// against the device's per-stage binding limits.
    pub fn new(device: Arc<dyn GraphicsDevice>, conformance_checks: bool) -> Self {
        Self {
            device,
            conformance_checks,
            programs: Mutex::new(HashMap::new()),
            render_pipelines: Mutex::new(HashMap::new()),
            compute_pipelines: Mutex::new(HashMap::new()),
            live: Mutex::new(HashMap::new()),
            ledger: Mutex::new(ResourceLedger::new()),
            violations: Mutex::new(Vec::new()),
            stats: Mutex::new(CacheStats::default()),
        }
    }

    /// The wrapped device.
    pub fn device(&self) -> &Arc<dyn GraphicsDevice> {
        &self.device
    }

    /// Locks and returns the transition ledger.
    pub fn ledger(&self) -> MutexGuard<'_, ResourceLedger> {
        self.ledger.lock().unwrap()
    }

    // --- Shader variants and pipelines ---

    /// Returns the program for `key`, compiling it on first use.
    ///
    /// ## Errors
    /// * `ResourceError::Shader` - If the variant fails to compile. Nothing is cached.
    pub fn shader_program(
        &self,
        key: &ShaderVariantKey,
        resources: ShaderResourceUsage,
    ) -> Result<ShaderProgramId, ResourceError> {
        let mut programs = self.programs.lock().unwrap();
        if let Some(id) = programs.get(key) {
            self.stats.lock().unwrap().program_hits += 1;
            return Ok(*id);
        }

        let label = key.to_string();
        if self.conformance_checks {
            for violation in self.check_binding_limits(&label, resources) {
                log::warn!("GraphicsContext: binding limit exceeded: {violation}");
                self.violations.lock().unwrap().push(violation);
            }
        }

        let id = self
            .device
            .create_shader_program(&ShaderProgramDescriptor {
                label: Some(&label),
                variant: key,
                resources,
            })
            .inspect_err(|e| log::error!("GraphicsContext: variant '{label}' failed: {e}"))?;
        log::debug!("GraphicsContext: compiled variant '{label}' as {id:?}");
        programs.insert(key.clone(), id);
        self.track(GpuObject::Program(id), label);
        self.stats.lock().unwrap().program_misses += 1;
        Ok(id)
    }

    /// Returns the render pipeline for `descriptor`, creating it on first use.
    pub fn render_pipeline(
        &self,
        descriptor: &RenderPipelineDescriptor,
    ) -> Result<RenderPipelineId, ResourceError> {
        let mut pipelines = self.render_pipelines.lock().unwrap();
        if let Some(id) = pipelines.get(descriptor) {
            self.stats.lock().unwrap().pipeline_hits += 1;
            return Ok(*id);
        }
        let id = self.device.create_render_pipeline(descriptor)?;
        pipelines.insert(descriptor.clone(), id);
        self.track(
            GpuObject::RenderPipeline(id),
            descriptor.label.clone().unwrap_or_default(),
        );
        self.stats.lock().unwrap().pipeline_misses += 1;
        Ok(id)
    }

    /// Returns the compute pipeline for `descriptor`, creating it on first use.
    pub fn compute_pipeline(
        &self,
        descriptor: &ComputePipelineDescriptor,
    ) -> Result<ComputePipelineId, ResourceError> {
        let mut pipelines = self.compute_pipelines.lock().unwrap();
        if let Some(id) = pipelines.get(descriptor) {
            self.stats.lock().unwrap().pipeline_hits += 1;
            return Ok(*id);
        }
        let id = self.device.create_compute_pipeline(descriptor)?;
        pipelines.insert(descriptor.clone(), id);
        self.track(
            GpuObject::ComputePipeline(id),
            descriptor.label.clone().unwrap_or_default(),
        );
        self.stats.lock().unwrap().pipeline_misses += 1;
        Ok(id)
    }

    /// Destroys every cached program and pipeline.
    ///
    /// Called when a flag change alters shader permutations. Returns the
    /// number of objects released.
    pub fn invalidate_pipelines(&self) -> usize {
        let mut released = 0;
        for (_, id) in self.render_pipelines.lock().unwrap().drain() {
            if let Err(e) = self.device.destroy_render_pipeline(id) {
                log::warn!("GraphicsContext: failed to destroy {id:?}: {e}");
            }
            self.untrack(GpuObject::RenderPipeline(id));
            released += 1;
        }
        for (_, id) in self.compute_pipelines.lock().unwrap().drain() {
            if let Err(e) = self.device.destroy_compute_pipeline(id) {
                log::warn!("GraphicsContext: failed to destroy {id:?}: {e}");
            }
            self.untrack(GpuObject::ComputePipeline(id));
            released += 1;
        }
        for (_, id) in self.programs.lock().unwrap().drain() {
            if let Err(e) = self.device.destroy_shader_program(id) {
                log::warn!("GraphicsContext: failed to destroy {id:?}: {e}");
            }
            self.untrack(GpuObject::Program(id));
            released += 1;
        }
        log::debug!("GraphicsContext: invalidated {released} cached programs and pipelines");
        released
    }

    /// Compares a program's declared bindings with the device limits.
    pub fn check_binding_limits(
        &self,
        program: &str,
        resources: ShaderResourceUsage,
    ) -> Vec<LimitViolation> {
        let limits = self.device.limits();
        [
            (
                "sampled textures",
                resources.sampled_textures,
                limits.max_sampled_textures_per_stage,
            ),
            (
                "storage resources",
                resources.storage_resources,
                limits.max_storage_resources_per_stage,
            ),
            (
                "uniform buffers",
                resources.uniform_buffers,
                limits.max_uniform_buffers_per_stage,
            ),
        ]
        .into_iter()
        .filter(|(_, used, limit)| used > limit)
        .map(|(resource, used, limit)| LimitViolation {
            program: program.to_owned(),
            resource,
            used,
            limit,
        })
        .collect()
    }

    /// Violations found by the conformance check so far.
    pub fn limit_violations(&self) -> Vec<LimitViolation> {
        self.violations.lock().unwrap().clone()
    }

    /// Current cache counters.
    pub fn cache_stats(&self) -> CacheStats {
        *self.stats.lock().unwrap()
    }

    // --- Resources ---

    /// Creates a texture and registers all its mips with the ledger.
    pub fn create_texture(&self, descriptor: &TextureDescriptor) -> Result<TextureId, ResourceError> {
        let id = self.device.create_texture(descriptor)?;
        self.ledger()
            .register_texture(id, descriptor.mip_level_count);
        self.track(
            GpuObject::Texture(id),
            descriptor.label.as_deref().unwrap_or("texture").to_owned(),
        );
        Ok(id)
    }

    /// Releases one reference to a texture, destroying it on the last one.
    pub fn destroy_texture(&self, id: TextureId) -> Result<(), ResourceError> {
        if self.release(GpuObject::Texture(id)) {
            self.ledger().unregister(id);
            self.device.destroy_texture(id)?;
        }
        Ok(())
    }

    /// Creates a buffer and registers it with the ledger.
    pub fn create_buffer(&self, descriptor: &BufferDescriptor) -> Result<BufferId, ResourceError> {
        let id = self.device.create_buffer(descriptor)?;
        self.register_buffer(id, descriptor);
        Ok(id)
    }

    /// Creates a buffer initialized with `data` and registers it with the ledger.
    pub fn create_buffer_with_data(
        &self,
        descriptor: &BufferDescriptor,
        data: &[u8],
    ) -> Result<BufferId, ResourceError> {
        let id = self.device.create_buffer_with_data(descriptor, data)?;
        self.register_buffer(id, descriptor);
        Ok(id)
    }

    /// Writes into a buffer.
    pub fn write_buffer(&self, id: BufferId, offset: u64, data: &[u8]) -> Result<(), ResourceError> {
        self.device.write_buffer(id, offset, data)
    }

    /// Releases one reference to a buffer, destroying it on the last one.
    pub fn destroy_buffer(&self, id: BufferId) -> Result<(), ResourceError> {
        if self.release(GpuObject::Buffer(id)) {
            self.ledger().unregister(id);
            self.device.destroy_buffer(id)?;
        }
        Ok(())
    }

    /// Creates a query set.
    pub fn create_query_set(
        &self,
        descriptor: &QuerySetDescriptor,
    ) -> Result<QuerySetId, ResourceError> {
        let id = self.device.create_query_set(descriptor)?;
        self.track(
            GpuObject::QuerySet(id),
            descriptor.label.unwrap_or("query set").to_owned(),
        );
        Ok(id)
    }

    /// Releases a query set.
    pub fn destroy_query_set(&self, id: QuerySetId) -> Result<(), ResourceError> {
        if self.release(GpuObject::QuerySet(id)) {
            self.device.destroy_query_set(id)?;
        }
        Ok(())
    }

    /// Non-blocking query readback.
    pub fn read_query_results(
        &self,
        id: QuerySetId,
        queries: Range<u32>,
    ) -> Result<Option<Vec<u64>>, ResourceError> {
        self.device.read_query_results(id, queries)
    }

    /// Adds a reference to a tracked object.
    pub fn retain(&self, object: GpuObject) {
        if let Some(entry) = self.live.lock().unwrap().get_mut(&object) {
            entry.refs += 1;
        }
    }

    /// Number of live tracked objects.
    pub fn live_object_count(&self) -> usize {
        self.live.lock().unwrap().len()
    }

    // --- Recording ---

    /// Creates a command encoder on the device.
    pub fn create_command_encoder(&self, label: Option<&str>) -> Box<dyn CommandEncoder> {
        self.device.create_command_encoder(label)
    }

    /// Finishes and submits an encoder.
    pub fn submit(&self, encoder: Box<dyn CommandEncoder>) {
        let buffer = encoder.finish();
        self.device.submit_command_buffer(buffer);
    }

    // --- Teardown ---

    /// Releases caches, then sweeps the live set.
    ///
    /// Every object still alive is reported, logged at `error` level and
    /// destroyed. The sweep never fails.
    pub fn teardown(&self) -> LeakReport {
        let cached_released = self.invalidate_pipelines();

        let mut leaked: Vec<(GpuObject, LiveEntry)> =
            self.live.lock().unwrap().drain().collect();
        leaked.sort_by(|a, b| a.1.label.cmp(&b.1.label));

        let mut report = LeakReport {
            leaks: Vec::with_capacity(leaked.len()),
            cached_released,
        };
        for (object, entry) in leaked {
            log::error!(
                "GraphicsContext: leaked {:?} '{}' ({} outstanding refs)",
                object,
                entry.label,
                entry.refs
            );
            self.reclaim(object);
            report.leaks.push(LeakedObject {
                object,
                label: entry.label,
                refs: entry.refs,
            });
        }

        if report.is_clean() {
            log::info!("GraphicsContext: teardown clean, {cached_released} cached objects released");
        }
        report
    }

    fn reclaim(&self, object: GpuObject) {
        let result = match object {
            GpuObject::Texture(id) => {
                self.ledger().unregister(id);
                self.device.destroy_texture(id)
            }
            GpuObject::Buffer(id) => {
                self.ledger().unregister(id);
                self.device.destroy_buffer(id)
            }
            GpuObject::QuerySet(id) => self.device.destroy_query_set(id),
            GpuObject::Program(id) => self.device.destroy_shader_program(id),
            GpuObject::RenderPipeline(id) => self.device.destroy_render_pipeline(id),
            GpuObject::ComputePipeline(id) => self.device.destroy_compute_pipeline(id),
        };
        if let Err(e) = result {
            log::warn!("GraphicsContext: could not reclaim {object:?}: {e}");
        }
    }

    fn register_buffer(&self, id: BufferId, descriptor: &BufferDescriptor) {
        self.ledger().register_buffer(id);
        self.track(
            GpuObject::Buffer(id),
            descriptor.label.as_deref().unwrap_or("buffer").to_owned(),
        );
    }

    fn track(&self, object: GpuObject, label: String) {
        self.live
            .lock()
            .unwrap()
            .insert(object, LiveEntry { label, refs: 1 });
    }

    fn untrack(&self, object: GpuObject) {
        self.live.lock().unwrap().remove(&object);
    }

    /// Drops one reference. Returns `true` if the object should be destroyed now.
    fn release(&self, object: GpuObject) -> bool {
        let mut live = self.live.lock().unwrap();
        match live.get_mut(&object) {
            Some(entry) if entry.refs > 1 => {
                entry.refs -= 1;
                false
            }
            Some(_) => {
                live.remove(&object);
                true
            }
            None => {
                log::warn!("GraphicsContext: release of untracked {object:?}");
                false
            }
        }
    }
}
