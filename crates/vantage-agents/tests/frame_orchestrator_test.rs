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

mod common;

use approx::assert_relative_eq;
use common::{init_logger, MockGraphicsDevice};
use std::sync::Arc;
use vantage_agents::{FrameOrchestrator, FrameOutcome, FrameReport};
use vantage_core::lane::Feature;
use vantage_core::math::{Aabb, Mat4, Vec3};
use vantage_core::renderer::{
    BufferId, CompareFunction, CullMode, IndexFormat, Light, LightId, RenderError, RenderFlags,
};
use vantage_core::scene::{EnvProbe, MeshBuffers, MeshKey, MeshRecord};
use vantage_core::config::LodDistances;
use vantage_core::RendererConfig;
use vantage_lanes::cull_lane::FrustumCuller;
use vantage_lanes::shadow_lane::{ShadowTransition, UpdateState};

fn cube_buffers() -> MeshBuffers {
    MeshBuffers {
        vertex: BufferId(9001),
        index: BufferId(9002),
        index_format: IndexFormat::Uint16,
        index_count: 36,
    }
}

fn unit_cube() -> Aabb {
    Aabb::from_min_max(Vec3::splat(-0.5), Vec3::splat(0.5))
}

fn orchestrator(device: &MockGraphicsDevice) -> FrameOrchestrator {
    init_logger();
    let mut orchestrator = FrameOrchestrator::new(
        Arc::new(device.clone()),
        RendererConfig::default(),
        1920,
        1080,
    );
    let camera = orchestrator.camera_mut();
    camera.look_at(Vec3::new(0.0, 5.0, 12.0), Vec3::ZERO, Vec3::Y);
    camera.update();
    orchestrator
        .scene_mut()
        .add_mesh(MeshRecord::new(unit_cube(), Mat4::IDENTITY, cube_buffers()));
    orchestrator
}

fn with_sun(device: &MockGraphicsDevice) -> FrameOrchestrator {
    let mut orchestrator = orchestrator(device);
    orchestrator
        .scene_mut()
        .add_light(Light::directional(LightId(1), Vec3::new(-0.3, -1.0, -0.2)).with_shadow());
    orchestrator
}

fn rendered(orchestrator: &mut FrameOrchestrator) -> FrameReport {
    match orchestrator.render_frame() {
        Ok(FrameOutcome::Rendered(report)) => report,
        other => panic!("expected a rendered frame, got {other:?}"),
    }
}

fn stage<'a>(report: &'a FrameReport, name: &str) -> &'a vantage_lanes::post_lane::StageOutput {
    report
        .post
        .iter()
        .find(|s| s.stage == name)
        .unwrap_or_else(|| panic!("no stage {name}"))
}

#[test]
fn test_render_before_initialize_fails() {
    let device = MockGraphicsDevice::new();
    let mut orchestrator = orchestrator(&device);
    assert!(matches!(
        orchestrator.render_frame(),
        Err(RenderError::NotInitialized)
    ));
    assert_eq!(device.submissions(), 0);
}

#[test]
fn test_static_scene_is_deterministic() {
    let device = MockGraphicsDevice::new();
    let mut orchestrator = with_sun(&device);
    orchestrator.initialize().unwrap();

    let first = rendered(&mut orchestrator);
    assert_eq!(
        first.shadow_transitions,
        [ShadowTransition {
            light: LightId(1),
            face: 0,
            from: UpdateState::Invalid,
            to: UpdateState::Static,
            redrawn: true,
        }]
    );
    let lighting = orchestrator.lighting().target().unwrap();
    let shadow_map = orchestrator.shadows().texture(LightId(1)).unwrap();
    let lighting_digest = device.digest(lighting);
    let shadow_digest = device.digest(shadow_map);
    assert_eq!(device.passes_in(device.submissions(), "shadow face"), 1);

    let second = rendered(&mut orchestrator);
    assert_eq!(
        second.shadow_transitions,
        [ShadowTransition {
            light: LightId(1),
            face: 0,
            from: UpdateState::Static,
            to: UpdateState::Static,
            redrawn: false,
        }]
    );
    assert_eq!(device.passes_in(device.submissions(), "shadow face"), 0);
    assert_eq!(device.digest(shadow_map), shadow_digest);
    assert_eq!(device.digest(lighting), lighting_digest);
    assert_eq!(first.visible, second.visible);
    assert_eq!(first.lighting, second.lighting);
    assert!(device.bad_reads().is_empty(), "{:?}", device.bad_reads());
}

#[test]
fn test_shadowed_sun_with_nothing_else_enabled() {
    let device = MockGraphicsDevice::new();
    let mut orchestrator = with_sun(&device);
    orchestrator.set_flags(RenderFlags::DIRECT_LIGHTING | RenderFlags::DIRECT_SHADOWS);
    orchestrator.initialize().unwrap();

    let first = rendered(&mut orchestrator);
    let lighting = orchestrator.lighting().target().unwrap();
    let lit = device.digest(lighting);
    let image = device.digest(first.final_image);
    let second = rendered(&mut orchestrator);

    let history: Vec<_> = first
        .shadow_transitions
        .iter()
        .chain(&second.shadow_transitions)
        .map(|t| (t.from, t.to, t.redrawn))
        .collect();
    assert_eq!(
        history,
        [
            (UpdateState::Invalid, UpdateState::Static, true),
            (UpdateState::Static, UpdateState::Static, false),
        ]
    );
    assert_eq!(first.visible, second.visible);
    assert_eq!(device.digest(lighting), lit);
    assert_eq!(second.final_image, first.final_image);
    assert_eq!(device.digest(second.final_image), image);

    let ran: Vec<_> = second.post.iter().filter(|s| s.ran).map(|s| s.stage).collect();
    assert_eq!(ran, ["Tonemap"]);
    assert!(device.bad_reads().is_empty(), "{:?}", device.bad_reads());
}

#[test]
fn test_actor_entering_spot_flips_face_to_dynamic() {
    let device = MockGraphicsDevice::new();
    let mut orchestrator = orchestrator(&device);
    let spot = LightId(2);
    orchestrator.scene_mut().add_light(
        Light::spot(spot, Vec3::new(0.0, 6.0, 0.0), Vec3::NEG_Y, 10.0, 30.0, 20.0).with_shadow(),
    );
    let actor: MeshKey = orchestrator.scene_mut().add_mesh(
        MeshRecord::new(
            unit_cube(),
            Mat4::from_translation(Vec3::new(20.0, 0.0, 0.0)),
            cube_buffers(),
        )
        .dynamic(),
    );
    orchestrator.initialize().unwrap();

    let first = rendered(&mut orchestrator);
    assert_eq!(first.shadow_transitions.len(), 1);
    assert_eq!(first.shadow_transitions[0].to, UpdateState::Static);
    let second = rendered(&mut orchestrator);
    assert!(!second.shadow_transitions[0].redrawn);

    assert!(orchestrator
        .scene_mut()
        .set_mesh_transform(actor, Mat4::from_translation(Vec3::new(1.0, 0.0, 0.0))));
    let third = rendered(&mut orchestrator);
    assert_eq!(
        third.shadow_transitions,
        [ShadowTransition {
            light: spot,
            face: 0,
            from: UpdateState::Static,
            to: UpdateState::Dynamic,
            redrawn: true,
        }]
    );
    assert_eq!(orchestrator.shadows().state(spot), Some(UpdateState::Dynamic));
    assert_eq!(device.passes_in(device.submissions(), "shadow face"), 1);
}

#[test]
fn test_disabled_stages_pass_the_image_through() {
    let device = MockGraphicsDevice::new();
    let mut orchestrator = with_sun(&device);
    orchestrator.set_flags(RenderFlags::default() - RenderFlags::DOF);
    orchestrator.initialize().unwrap();
    let report = rendered(&mut orchestrator);

    let dof = stage(&report, "DepthOfField");
    assert!(!dof.ran);
    assert_eq!(dof.input, dof.output);

    // Scene time is still below the motion blur warmup.
    assert!(!report.motion_blur);
    let motion_blur = stage(&report, "MotionBlur");
    assert!(!motion_blur.ran);
    assert_eq!(motion_blur.input, motion_blur.output);

    let tonemap = stage(&report, "Tonemap");
    assert!(tonemap.ran);
    assert_ne!(tonemap.input, tonemap.output);

    for pair in report.post.windows(2) {
        assert_eq!(pair[0].output, pair[1].input);
    }
    assert_eq!(report.post.last().map(|s| s.output), Some(report.final_image));
    assert_eq!(report.final_image, tonemap.output);
}

#[test]
fn test_flag_change_rebuilds_and_enables_ssao() {
    let device = MockGraphicsDevice::new();
    let mut orchestrator = with_sun(&device);
    orchestrator.set_flags(RenderFlags::default() - RenderFlags::SSAO);
    orchestrator.initialize().unwrap();
    let before = rendered(&mut orchestrator);
    assert!(!stage(&before, "Ssao").ran);

    orchestrator.set_flags(RenderFlags::default());
    assert_eq!(orchestrator.flags(), RenderFlags::default());
    let after = rendered(&mut orchestrator);
    let ssao = stage(&after, "Ssao");
    assert!(ssao.ran);
    assert_ne!(ssao.input, ssao.output);
    assert!(device.bad_reads().is_empty(), "{:?}", device.bad_reads());
}

#[test]
fn test_depth_pyramid_skipped_without_consumers() {
    let device = MockGraphicsDevice::new();
    let mut orchestrator = orchestrator(&device);
    orchestrator.set_flags(
        RenderFlags::DIRECT_LIGHTING
            | RenderFlags::LIGHTSHAFT
            | RenderFlags::PARTICLE_SYSTEMS
            | RenderFlags::DOF_HALF_RES,
    );
    orchestrator.initialize().unwrap();

    let report = rendered(&mut orchestrator);
    assert!(report.visible.lightshafts.is_empty());
    assert!(report.visible.emitters.is_empty());
    assert!(!stage(&report, "HalfResTransients").ran);
    assert_eq!(device.passes_in(device.submissions(), "depth linearize"), 0);
    assert_eq!(device.passes_in(device.submissions(), "depth downsample"), 0);
}

#[test]
fn test_environment_lod_distances_reach_shadow_casters() {
    let device = MockGraphicsDevice::new();
    let mut orchestrator = with_sun(&device);
    orchestrator.initialize().unwrap();
    let lod = LodDistances { lod1: 4.0, lod2: 8.0 };
    orchestrator.environment_mut().global.lod_distances = lod;

    rendered(&mut orchestrator);
    let mut expected = FrustumCuller::new(orchestrator.config());
    expected.set_lod_distances(lod);
    assert_eq!(orchestrator.shadows().culler(), expected);
}

fn bloom_passes(device: &MockGraphicsDevice, flags: RenderFlags) -> (usize, usize) {
    let mut orchestrator = with_sun(device);
    orchestrator.set_flags(flags);
    orchestrator.initialize().unwrap();
    let report = rendered(&mut orchestrator);
    assert!(stage(&report, "HdrBloom").ran);
    let submission = device.submissions();
    let passes: Vec<_> = device
        .passes()
        .into_iter()
        .filter(|p| p.submission == submission && p.label.starts_with("bloom"))
        .collect();
    let downsamples = passes.iter().filter(|p| p.label == "bloom downsample").count();
    (passes.len(), downsamples)
}

#[test]
fn test_mobile_bloom_records_a_shorter_chain() {
    let base = RenderFlags::DIRECT_LIGHTING | RenderFlags::HDR | RenderFlags::BLOOM;

    let desktop_device = MockGraphicsDevice::new();
    let (desktop, desktop_layers) = bloom_passes(&desktop_device, base);
    let mobile_device = MockGraphicsDevice::new();
    let (mobile, mobile_layers) = bloom_passes(&mobile_device, base | RenderFlags::BLOOM_MOBILE);

    let config = RendererConfig::default();
    assert_eq!(desktop_layers, config.bloom_layers as usize);
    assert_eq!(mobile_layers, config.bloom_mobile_layers as usize);
    assert!(mobile < desktop, "mobile {mobile} vs desktop {desktop}");
    assert!(desktop_device.bad_reads().is_empty(), "{:?}", desktop_device.bad_reads());
    assert!(mobile_device.bad_reads().is_empty(), "{:?}", mobile_device.bad_reads());
}

#[test]
fn test_resize_rescales_effect_parameters() {
    let device = MockGraphicsDevice::new();
    let mut orchestrator = with_sun(&device);
    orchestrator.initialize().unwrap();
    rendered(&mut orchestrator);
    assert_relative_eq!(orchestrator.effects().dof, 10.0);

    let handle = orchestrator.handle();
    std::thread::spawn(move || assert!(handle.resize(960, 540)))
        .join()
        .unwrap();
    rendered(&mut orchestrator);
    assert_eq!(orchestrator.viewport().height, 540);
    assert_eq!(orchestrator.effects().viewport_height, 540);
    assert_relative_eq!(orchestrator.effects().dof, 5.0);
    assert_relative_eq!(orchestrator.effects().bloom, 2.0);
}

#[test]
fn test_probe_pairing_follows_camera() {
    let device = MockGraphicsDevice::new();
    let mut orchestrator = with_sun(&device);
    {
        let scene = orchestrator.scene_mut();
        scene.probe_sh_buffer = Some(BufferId(9100));
        scene.probes.push(EnvProbe {
            index: 0,
            center: Vec3::ZERO,
            half_extents: Vec3::splat(30.0),
        });
        scene.probes.push(EnvProbe {
            index: 1,
            center: Vec3::new(0.0, 0.0, -6.0),
            half_extents: Vec3::splat(1.0),
        });
    }
    orchestrator.initialize().unwrap();
    let report = rendered(&mut orchestrator);

    let enclosing = report.lighting.probes.iter().find(|p| p.probe == 0).unwrap();
    assert!(enclosing.inside);
    assert_eq!(
        (enclosing.cull, enclosing.compare),
        (CullMode::Front, CompareFunction::GreaterEqual)
    );
    let distant = report.lighting.probes.iter().find(|p| p.probe == 1).unwrap();
    assert!(!distant.inside);
    assert_eq!(
        (distant.cull, distant.compare),
        (CullMode::Back, CompareFunction::Less)
    );
}

#[test]
fn test_shadow_map_failure_degrades_light() {
    let device = MockGraphicsDevice::new();
    device.fail_texture("shadow map 1");
    let mut orchestrator = with_sun(&device);
    orchestrator.initialize().unwrap();

    let first = rendered(&mut orchestrator);
    assert!(first.shadow_transitions.is_empty());
    assert!(first.degraded.contains(Feature::ShadowMap(LightId(1))));
    assert!(first.visible.contains_light(LightId(1)));

    let second = rendered(&mut orchestrator);
    assert_eq!(second.degraded.len(), 1);
    assert!(orchestrator.degraded().contains(Feature::ShadowMap(LightId(1))));
    assert_eq!(orchestrator.shadows().texture(LightId(1)), None);
}

#[test]
fn test_shader_failure_stops_initialization() {
    let device = MockGraphicsDevice::new();
    device.fail_shader("tonemap.frag");
    let mut orchestrator = with_sun(&device);
    let err = orchestrator.initialize().unwrap_err();
    match err {
        RenderError::InitializationFailed { stage, .. } => assert_eq!(stage, "PostProcessChain"),
        other => panic!("unexpected error {other:?}"),
    }
    assert!(matches!(
        orchestrator.render_frame(),
        Err(RenderError::NotInitialized)
    ));
}

#[test]
fn test_query_set_failure_releases_the_first_set() {
    let device = MockGraphicsDevice::new();
    device.fail_query_set("frame queries 1");
    let mut orchestrator = with_sun(&device);
    match orchestrator.initialize().unwrap_err() {
        RenderError::InitializationFailed { stage, .. } => assert_eq!(stage, "QueryReadback"),
        other => panic!("unexpected error {other:?}"),
    }
    assert_eq!(device.live_query_sets(), 0);
}

#[test]
fn test_single_frame_halts_until_resumed() {
    let device = MockGraphicsDevice::new();
    let mut orchestrator = with_sun(&device);
    orchestrator.initialize().unwrap();

    orchestrator.request_single_frame(3.5);
    let report = rendered(&mut orchestrator);
    assert!(report.motion_blur);
    assert_relative_eq!(orchestrator.scene().animation_time, 3.5);
    assert!(orchestrator.is_halted());

    let submissions = device.submissions();
    assert_eq!(orchestrator.render_frame().unwrap(), FrameOutcome::Halted);
    assert_eq!(device.submissions(), submissions);

    orchestrator.resume();
    let resumed = rendered(&mut orchestrator);
    assert_eq!(resumed.frame_index, report.frame_index + 1);
    assert_eq!(device.submissions(), submissions + 1);
}

#[test]
fn test_camera_cut_suppresses_motion_blur() {
    let device = MockGraphicsDevice::new();
    let mut orchestrator = with_sun(&device);
    orchestrator.initialize().unwrap();
    orchestrator.scene_mut().animation_time = 100.0;

    let first = rendered(&mut orchestrator);
    assert!(!first.camera_cut);
    assert!(first.motion_blur);

    orchestrator.camera_mut().shot += 1;
    let cut = rendered(&mut orchestrator);
    assert!(cut.camera_cut);
    assert!(!cut.motion_blur);

    let after = rendered(&mut orchestrator);
    assert!(!after.camera_cut);
    assert!(after.motion_blur);
}

#[test]
fn test_query_results_are_read_without_waiting() {
    let device = MockGraphicsDevice::new();
    device.set_queries_ready(false);
    let mut orchestrator = with_sun(&device);
    orchestrator.initialize().unwrap();

    for _ in 0..3 {
        rendered(&mut orchestrator);
    }
    assert!(orchestrator.last_statistics().is_none());
    assert_eq!(orchestrator.missed_queries(), 2);

    device.set_queries_ready(true);
    rendered(&mut orchestrator);
    let stats = orchestrator.last_statistics().unwrap();
    assert_eq!(stats.frame_index, 2);
    assert_eq!(stats.values.len(), 1);
    assert_eq!(orchestrator.missed_queries(), 2);
}

#[test]
fn test_warmup_advances_frames_without_shadows() {
    let device = MockGraphicsDevice::new();
    let mut orchestrator = with_sun(&device);
    orchestrator.initialize().unwrap();
    orchestrator.warmup(2).unwrap();
    assert_eq!(orchestrator.frame_index(), 2);
    assert_eq!(device.submissions(), 2);
    assert_eq!(orchestrator.shadows().state(LightId(1)), None);

    let report = rendered(&mut orchestrator);
    assert_eq!(report.frame_index, 2);
    assert_eq!(report.shadow_transitions[0].from, UpdateState::Invalid);
}

#[test]
fn test_shutdown_releases_everything() {
    let device = MockGraphicsDevice::new();
    let mut orchestrator = with_sun(&device);
    orchestrator.initialize().unwrap();
    for _ in 0..3 {
        rendered(&mut orchestrator);
    }
    assert!(device.live_objects() > 0);

    let report = orchestrator.shutdown();
    assert!(report.is_clean(), "{:?}", report.leaks);
    assert!(report.cached_released > 0);
    assert_eq!(device.live_objects(), 0);
}
