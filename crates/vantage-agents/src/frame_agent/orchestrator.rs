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

//! Defines the FrameOrchestrator, which records one frame of the benchmark
//! renderer per call.
//!
//! The orchestrator owns the [`GraphicsContext`], the scene, the main camera,
//! the feature flags and the effect parameters. Each frame it builds a fresh
//! [`LaneContext`], runs the lanes in dependency order into a single command
//! encoder, and submits it.

use super::commands::{self, HostCommand, OrchestratorHandle};
use crossbeam_channel::{Receiver, Sender};
use std::sync::Arc;
use vantage_core::config::{Environment, EnvironmentValues, RendererConfig};
use vantage_core::lane::{
    ActiveDebugView, DebugView, DegradedFeatures, FrameFlags, FrameIndex, LaneContext, LaneError,
    MotionBlurActive, Ref, RenderLane, SceneColor, Slot, Viewport,
};
use vantage_core::renderer::api::{QueryKind, TextureId};
use vantage_core::renderer::{
    Camera, CommandEncoder, EffectParameterNormalizer, FrameStatistics, GraphicsContext,
    GraphicsDevice, InitStatus, LeakReport, NormalizedEffects, QueryReadback, RenderError,
    RenderFlags, ResourceError,
};
use vantage_core::scene::Scene;
use vantage_lanes::cull_lane::{FrustumCullLane, VisibleSet};
use vantage_lanes::post_lane::{BloomLane, PostProcessChain, StageOutput};
use vantage_lanes::render_lane::{DepthPyramidLane, GBufferLane, LightingLane, LightingReport};
use vantage_lanes::shadow_lane::{ShadowMapSet, ShadowTransition};

/// Vertical field of view of the default camera, in degrees.
const DEFAULT_FOV_Y: f32 = 60.0;

/// Pipeline-statistics queries recorded per frame.
const QUERIES_PER_FRAME: u32 = 1;

/// What a frame did.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameReport {
    /// Index of the frame.
    pub frame_index: u64,
    /// The main camera's cull result.
    pub visible: VisibleSet,
    /// Shadow face transitions, empty when shadows were skipped.
    pub shadow_transitions: Vec<ShadowTransition>,
    /// Lights and probes the lighting pass drew.
    pub lighting: LightingReport,
    /// Per-stage results of the post chain.
    pub post: Vec<StageOutput>,
    /// The texture holding the finished image.
    pub final_image: TextureId,
    /// Motion blur was allowed this frame.
    pub motion_blur: bool,
    /// The camera shot changed since the previous frame.
    pub camera_cut: bool,
    /// Features lost so far in the session.
    pub degraded: DegradedFeatures,
}


/// Result of [`FrameOrchestrator::render_frame`].
#[derive(Debug, Clone, PartialEq)]
pub enum FrameOutcome {
    /// A frame was recorded and submitted.
    Rendered(FrameReport),
    /// Single-frame mode already produced its frame; nothing was recorded.
    Halted,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum FrameMode {
    Continuous,
    SingleFrame { time: f32 },
    Halted,
}

/// Decides whether motion blur may run.
///
/// Warmup forces it on. A camera cut always suppresses it, since the previous
/// frame's matrices belong to another shot. Otherwise it waits until the scene
/// has animated past `warmup_time`, except for single frames.
pub fn motion_blur_allowed(
    warming: bool,
    camera_cut: bool,
    single_frame: bool,
    animation_time: f32,
    warmup_time: f32,
) -> bool {
    if warming {
        return true;
    }
    if camera_cut {
        return false;
    }
    single_frame || animation_time >= warmup_time
}

/// Maps a lane initialization error to the status reported to the host.
fn init_status(stage: &str, err: LaneError) -> InitStatus {
    let error = match err {
        LaneError::InitializationFailed(source) => match source.downcast::<ResourceError>() {
            Ok(error) => *error,
            Err(other) => ResourceError::BackendError(other.to_string()),
        },
        other => ResourceError::BackendError(other.to_string()),
    };
    InitStatus::Failed {
        stage: stage.to_string(),
        error,
    }
}

fn run_lane(lane: &dyn RenderLane, ctx: &mut LaneContext) -> Result<(), RenderError> {
    lane.execute(ctx)
        .map_err(|e| RenderError::RenderingFailed(format!("{}: {e}", lane.strategy_name())))
}

/// The per-frame driver of the renderer.
pub struct FrameOrchestrator {
    // Shared device state, also handed to every lane through the context.
    gfx: Arc<GraphicsContext>,
    config: RendererConfig,
    scene: Scene,
    // The host-controlled camera. Each frame works on a copy with tightened planes.
    camera: Camera,
    environment: Environment,
    flags: RenderFlags,
    viewport: Viewport,
    normalizer: EffectParameterNormalizer,
    debug_view: Option<DebugView>,
    // --- Lanes, in recording order ---
    cull: FrustumCullLane,
    shadows: ShadowMapSet,
    gbuffer: GBufferLane,
    lighting: LightingLane,
    pyramid: DepthPyramidLane,
    post: PostProcessChain,
    // --- Frame bookkeeping ---
    queries: Option<QueryReadback>,
    last_statistics: Option<FrameStatistics>,
    degraded: DegradedFeatures,
    sender: Sender<HostCommand>,
    receiver: Receiver<HostCommand>,
    pending_resize: Option<Viewport>,
    pending_rebuild: bool,
    mode: FrameMode,
    last_shot: Option<u32>,
    frame_index: u64,
    initialized: bool,
}

impl FrameOrchestrator {
    /// Creates an orchestrator rendering at `width`×`height`.
    ///
    /// Nothing is created on the device until [`initialize`](Self::initialize).
    pub fn new(
        device: Arc<dyn GraphicsDevice>,
        config: RendererConfig,
        width: u32,
        height: u32,
    ) -> Self {
        let viewport = Viewport::new(width, height);
        let gfx = Arc::new(GraphicsContext::new(device, config.conformance_checks));
        let camera = Camera::perspective(
            DEFAULT_FOV_Y,
            viewport.aspect(),
            config.default_near,
            config.default_far,
        );
        let mut environment = Environment::default();
        environment.global.effects = config.effects;
        environment.global.lod_distances = config.lod_distances;

        let post = PostProcessChain::standard(&config);
        if let Some(bloom) = post.stage::<BloomLane>() {
            bloom.set_adaptation(config.adaptation);
        }
        let (sender, receiver) = crossbeam_channel::unbounded();

        Self {
            normalizer: EffectParameterNormalizer::new(config.effects, viewport.height),
            cull: FrustumCullLane::new(&config),
            shadows: ShadowMapSet::new(&config),
            gbuffer: GBufferLane::new(),
            lighting: LightingLane::new(),
            pyramid: DepthPyramidLane::new(config.depth_pyramid_levels),
            post,
            flags: config.initial_flags,
            gfx,
            config,
            scene: Scene::new(),
            camera,
            environment,
            viewport,
            debug_view: None,
            queries: None,
            last_statistics: None,
            degraded: DegradedFeatures::default(),
            sender,
            receiver,
            pending_resize: None,
            pending_rebuild: false,
            mode: FrameMode::Continuous,
            last_shot: None,
            frame_index: 0,
            initialized: false,
        }
    }

    /// Builds every lane's programs, pipelines and targets, and the query sets.
    ///
    /// A shader or pipeline failure is returned as
    /// [`RenderError::InitializationFailed`] naming the stage; the host should
    /// not start the run.
    pub fn initialize(&mut self) -> Result<(), RenderError> {
        if let Some(size) = self.pending_resize.take() {
            self.adopt_viewport(size);
        }
        self.pending_rebuild = false;

        let status = self.initialize_lanes();
        if let InitStatus::Failed { stage, error } = &status {
            log::error!("FrameOrchestrator: {stage} failed to initialize: {error}");
        }
        status.into_result()?;

        if self.queries.is_none() {
            let queries = QueryReadback::new(&self.gfx, QueryKind::PipelineStatistics, QUERIES_PER_FRAME)
                .map_err(|source| RenderError::InitializationFailed {
                    stage: "QueryReadback".to_string(),
                    source,
                })?;
            self.queries = Some(queries);
        }
        self.initialized = true;
        log::info!(
            "FrameOrchestrator: initialized at {}x{} with flags {:?}",
            self.viewport.width,
            self.viewport.height,
            self.flags
        );
        Ok(())
    }

    /// A cloneable handle for sending [`HostCommand`]s from another thread.
    pub fn handle(&self) -> OrchestratorHandle {
        OrchestratorHandle::new(self.sender.clone())
    }

    /// Applies a host command. Resizes and rebuilds take effect at the next frame.
    pub fn apply(&mut self, command: HostCommand) {
        match command {
            HostCommand::SetFlags(flags) => {
                let old = self.flags;
                self.flags = flags;
                if RenderFlags::requires_rebuild(old, flags) {
                    log::info!("FrameOrchestrator: flags {:?} require a rebuild", old ^ flags);
                    self.pending_rebuild = true;
                }
            }
            HostCommand::Resize { width, height } => {
                let size = Viewport::new(width, height);
                if size != self.viewport || self.pending_resize.is_some() {
                    self.pending_resize = Some(size);
                }
            }
            HostCommand::SetEffects(effects) => {
                self.environment.global.effects = effects;
            }
            HostCommand::SetDebugView(view) => {
                self.debug_view = view;
            }
            HostCommand::RequestSingleFrame { time } => {
                log::info!("FrameOrchestrator: single frame requested at t={time:.3}");
                self.mode = FrameMode::SingleFrame { time };
            }
            HostCommand::Resume => {
                if self.mode != FrameMode::Continuous {
                    log::info!("FrameOrchestrator: resuming continuous rendering");
                }
                self.mode = FrameMode::Continuous;
            }
        }
    }

    /// Replaces the feature flags.
    pub fn set_flags(&mut self, flags: RenderFlags) {
        self.apply(HostCommand::SetFlags(flags));
    }

    /// Resizes the output.
    pub fn resize(&mut self, width: u32, height: u32) {
        self.apply(HostCommand::Resize { width, height });
    }

    /// Selects the debug overlay view.
    pub fn set_debug_view(&mut self, view: Option<DebugView>) {
        self.apply(HostCommand::SetDebugView(view));
    }

    /// Renders exactly one frame at `time` on the next call to
    /// [`render_frame`](Self::render_frame), then halts.
    pub fn request_single_frame(&mut self, time: f32) {
        self.apply(HostCommand::RequestSingleFrame { time });
    }

    /// Leaves single-frame mode.
    pub fn resume(&mut self) {
        self.apply(HostCommand::Resume);
    }

    /// Records and submits one frame.
    pub fn render_frame(&mut self) -> Result<FrameOutcome, RenderError> {
        if !self.initialized {
            return Err(RenderError::NotInitialized);
        }

        // Step 1: Host commands queued since the last frame.
        for command in commands::drain(&self.receiver) {
            self.apply(command);
        }

        let single_frame = match self.mode {
            FrameMode::Halted => {
                log::trace!("FrameOrchestrator: halted, frame skipped");
                return Ok(FrameOutcome::Halted);
            }
            FrameMode::SingleFrame { time } => {
                self.scene.animation_time = time;
                true
            }
            FrameMode::Continuous => false,
        };

        // Step 2: Resize and rebuild, before anything records.
        self.apply_pending()?;

        // Step 3: Everything else.
        let report = self.record_frame(false, single_frame)?;
        if single_frame {
            log::info!("FrameOrchestrator: single frame {} done, halting", report.frame_index);
            self.mode = FrameMode::Halted;
        }
        Ok(FrameOutcome::Rendered(report))
    }

    /// Renders `frames` frames with shadows skipped and motion blur forced on,
    /// to bring every target and cache to a steady state before measuring.
    pub fn warmup(&mut self, frames: u32) -> Result<(), RenderError> {
        if !self.initialized {
            return Err(RenderError::NotInitialized);
        }
        self.apply_pending()?;
        for _ in 0..frames {
            self.record_frame(true, false)?;
        }
        log::info!("FrameOrchestrator: {frames} warmup frames recorded");
        Ok(())
    }

    /// Shuts every lane down, releases the query sets and sweeps the device
    /// for objects nobody released.
    pub fn shutdown(&mut self) -> LeakReport {
        let mut ctx = self.lifecycle_context();
        for lane in self.lanes() {
            lane.on_shutdown(&mut ctx);
        }
        self.reclaim_degraded(&mut ctx);
        if let Some(mut queries) = self.queries.take() {
            queries.destroy(&self.gfx);
        }
        self.initialized = false;
        let report = self.gfx.teardown();
        log::info!(
            "FrameOrchestrator: shut down after {} frames, {} leaks",
            self.frame_index,
            report.leaks.len()
        );
        report
    }

    fn lanes(&self) -> [&dyn RenderLane; 6] {
        [
            &self.cull,
            &self.shadows,
            &self.gbuffer,
            &self.lighting,
            &self.pyramid,
            &self.post,
        ]
    }

    /// Context for lifecycle hooks: device, size, flags and the degraded set.
    fn lifecycle_context(&mut self) -> LaneContext {
        let mut ctx = LaneContext::new();
        ctx.insert(Arc::clone(&self.gfx));
        ctx.insert(self.viewport);
        ctx.insert(FrameFlags(self.flags));
        ctx.insert(std::mem::take(&mut self.degraded));
        ctx
    }

    fn reclaim_degraded(&mut self, ctx: &mut LaneContext) {
        if let Some(degraded) = ctx.remove::<DegradedFeatures>() {
            self.degraded = degraded;
        }
    }

    fn initialize_lanes(&mut self) -> InitStatus {
        let mut ctx = self.lifecycle_context();
        let mut status = InitStatus::Ready;
        for lane in self.lanes() {
            if let Err(e) = lane.on_initialize(&mut ctx) {
                status = init_status(lane.strategy_name(), e);
                break;
            }
        }
        self.reclaim_degraded(&mut ctx);
        status
    }

    fn adopt_viewport(&mut self, size: Viewport) {
        self.viewport = size;
        self.camera.set_aspect(size.aspect());
        self.camera.update();
        self.normalizer.resize(size.height);
    }

    fn apply_pending(&mut self) -> Result<(), RenderError> {
        if let Some(size) = self.pending_resize.take() {
            let old = self.viewport;
            self.adopt_viewport(size);
            let mut ctx = self.lifecycle_context();
            let mut status = InitStatus::Ready;
            for lane in self.lanes() {
                if let Err(e) = lane.on_viewport_resized(&mut ctx) {
                    status = init_status(lane.strategy_name(), e);
                    break;
                }
            }
            self.reclaim_degraded(&mut ctx);
            status.into_result()?;
            log::info!(
                "FrameOrchestrator: resized {}x{} -> {}x{}",
                old.width,
                old.height,
                size.width,
                size.height
            );
        }

        if std::mem::take(&mut self.pending_rebuild) {
            let released = self.gfx.invalidate_pipelines();
            log::info!("FrameOrchestrator: rebuilding, {released} cached objects released");
            self.initialize_lanes().into_result()?;
        }
        Ok(())
    }

    fn record_frame(&mut self, warming: bool, single_frame: bool) -> Result<FrameReport, RenderError> {
        let frame_index = self.frame_index;

        if let Some(queries) = self.queries.as_mut() {
            if let Some(stats) = queries.poll(&self.gfx, frame_index) {
                log::trace!("FrameOrchestrator: statistics of frame {} read", stats.frame_index);
                self.last_statistics = Some(stats);
            }
        }

        let env: EnvironmentValues = self.environment.values_for_shot(self.camera.shot).clone();
        self.normalizer.set_raw(env.effects);
        self.normalizer.refresh();
        self.cull.set_lod_distances(env.lod_distances);
        self.shadows.set_lod_distances(env.lod_distances);
        let effects = *self.normalizer.normalized();

        let camera_cut = self.last_shot.is_some_and(|shot| shot != self.camera.shot);
        if camera_cut {
            log::debug!("FrameOrchestrator: camera cut to shot {}", self.camera.shot);
            self.gbuffer.reset_history();
        }
        let motion_blur = motion_blur_allowed(
            warming,
            camera_cut,
            single_frame,
            self.scene.animation_time,
            self.config.motion_blur_warmup_time,
        );

        let mut encoder = self.gfx.create_command_encoder(Some("frame"));
        if let Some(queries) = &self.queries {
            queries.begin(encoder.as_mut(), frame_index, 0);
        }

        // Both outlive the context that points at them.
        let mut frame_camera = self.camera.clone();
        let mut ctx = LaneContext::new();
        ctx.insert(Arc::clone(&self.gfx));
        ctx.insert(Ref::new(&self.scene));
        ctx.insert(Ref::new(&self.camera));
        ctx.insert(Ref::new(&env));
        ctx.insert(FrameFlags(self.flags));
        ctx.insert(self.viewport);
        ctx.insert(FrameIndex(frame_index));
        ctx.insert(MotionBlurActive(motion_blur));
        ctx.insert(ActiveDebugView(self.debug_view));
        ctx.insert::<NormalizedEffects>(effects);
        ctx.insert(std::mem::take(&mut self.degraded));
        ctx.insert(Slot::<dyn CommandEncoder>::new(encoder.as_mut()));

        let result = self.run_lanes(&mut ctx, &mut frame_camera, warming);

        ctx.remove::<Slot<dyn CommandEncoder>>();
        self.reclaim_degraded(&mut ctx);
        let final_image = ctx.get::<SceneColor>().map(|c| c.0);
        let visible = ctx.remove::<VisibleSet>().unwrap_or_default();
        drop(ctx);

        if let Some(queries) = self.queries.as_mut() {
            queries.end(encoder.as_mut(), frame_index, 0);
        }
        self.gfx.submit(encoder);

        self.last_shot = Some(self.camera.shot);
        self.frame_index += 1;
        self.scene.settle_transforms();

        let shadows_ran = result?;
        let final_image = final_image
            .ok_or_else(|| RenderError::Internal("post chain produced no image".to_string()))?;
        let report = FrameReport {
            frame_index,
            visible,
            shadow_transitions: if shadows_ran {
                self.shadows.last_transitions()
            } else {
                Vec::new()
            },
            lighting: self.lighting.last_report(),
            post: self.post.last_outputs(),
            final_image,
            motion_blur,
            camera_cut,
            degraded: self.degraded.clone(),
        };
        log::trace!(
            "FrameOrchestrator: frame {frame_index} submitted, {} meshes visible",
            report.visible.mesh_count()
        );
        Ok(report)
    }

    /// Runs the lanes in order. Returns whether the shadow lane ran.
    fn run_lanes(
        &self,
        ctx: &mut LaneContext,
        frame_camera: &mut Camera,
        warming: bool,
    ) -> Result<bool, RenderError> {
        run_lane(&self.cull, ctx)?;
        if let Some(visible) = ctx.get::<VisibleSet>() {
            frame_camera.set_near_far(visible.near, visible.far);
        }
        ctx.insert(Ref::new(&*frame_camera));

        let shadows = self.flags.contains(RenderFlags::DIRECT_SHADOWS) && !warming;
        if shadows {
            run_lane(&self.shadows, ctx)?;
        }

        run_lane(&self.gbuffer, ctx)?;
        run_lane(&self.lighting, ctx)?;
        run_lane(&self.pyramid, ctx)?;
        run_lane(&self.post, ctx)?;
        Ok(shadows)
    }

    // --- Accessors ---

    /// The shared graphics context.
    pub fn graphics(&self) -> &Arc<GraphicsContext> {
        &self.gfx
    }

    /// The renderer configuration.
    pub fn config(&self) -> &RendererConfig {
        &self.config
    }

    /// The scene.
    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    /// The scene, for the host to populate and animate between frames.
    pub fn scene_mut(&mut self) -> &mut Scene {
        &mut self.scene
    }

    /// The main camera.
    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    /// The main camera. Changing its `shot` starts a new camera cut.
    pub fn camera_mut(&mut self) -> &mut Camera {
        &mut self.camera
    }

    /// Global and per-shot environment values.
    pub fn environment_mut(&mut self) -> &mut Environment {
        &mut self.environment
    }

    /// The current feature flags.
    pub fn flags(&self) -> RenderFlags {
        self.flags
    }

    /// The current output size.
    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    /// Effect strengths as of the last frame.
    pub fn effects(&self) -> NormalizedEffects {
        *self.normalizer.normalized()
    }

    /// Features lost so far in the session.
    pub fn degraded(&self) -> &DegradedFeatures {
        &self.degraded
    }

    /// The shadow lane.
    pub fn shadows(&self) -> &ShadowMapSet {
        &self.shadows
    }

    /// The G-buffer lane.
    pub fn gbuffer(&self) -> &GBufferLane {
        &self.gbuffer
    }

    /// The lighting lane.
    pub fn lighting(&self) -> &LightingLane {
        &self.lighting
    }

    /// The post chain.
    pub fn post(&self) -> &PostProcessChain {
        &self.post
    }

    /// Index of the next frame.
    pub fn frame_index(&self) -> u64 {
        self.frame_index
    }

    /// Returns `true` once a single frame has been rendered and until [`resume`](Self::resume).
    pub fn is_halted(&self) -> bool {
        self.mode == FrameMode::Halted
    }

    /// The most recent query results, at least one frame old.
    pub fn last_statistics(&self) -> Option<&FrameStatistics> {
        self.last_statistics.as_ref()
    }

    /// Query results dropped because the GPU had not finished them in time.
    pub fn missed_queries(&self) -> u64 {
        self.queries.as_ref().map_or(0, QueryReadback::missed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_motion_blur_waits_for_warmup_time() {
        assert!(!motion_blur_allowed(false, false, false, 0.5, 1.0));
        assert!(motion_blur_allowed(false, false, false, 1.0, 1.0));
    }

    #[test]
    fn test_motion_blur_suppressed_on_cut() {
        assert!(!motion_blur_allowed(false, true, false, 10.0, 1.0));
        assert!(!motion_blur_allowed(false, true, true, 10.0, 1.0));
    }

    #[test]
    fn test_single_frame_only_checks_the_shot() {
        assert!(motion_blur_allowed(false, false, true, 0.0, 1.0));
    }

    #[test]
    fn test_warmup_forces_motion_blur() {
        assert!(motion_blur_allowed(true, true, false, 0.0, 1.0));
    }

    #[test]
    fn test_init_status_keeps_resource_error() {
        let err = LaneError::initialization(ResourceError::AllocationFailed {
            label: "lighting".to_string(),
            reason: "out of memory".to_string(),
        });
        match init_status("LightingLane", err) {
            InitStatus::Failed {
                stage,
                error: ResourceError::AllocationFailed { label, .. },
            } => {
                assert_eq!(stage, "LightingLane");
                assert_eq!(label, "lighting");
            }
            other => panic!("unexpected status {other:?}"),
        }
    }

    #[test]
    fn test_init_status_wraps_context_errors() {
        let status = init_status("GBuffer", LaneError::missing("Viewport"));
        assert!(matches!(
            status,
            InitStatus::Failed {
                error: ResourceError::BackendError(_),
                ..
            }
        ));
    }
}
