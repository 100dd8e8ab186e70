mod common;

use std::collections::HashMap;
use std::sync::atomic::Ordering;

use common::*;
use pose_overlay::render::OverlayGeometry;
use pose_overlay::store::{OutputConfig, Thresholds};
use pose_overlay::{
    compose_frame, draw_point, Affine2, Architecture, DrawingSurface, FrameHost, FrameSource,
    LoopEvent, LoopState, OverlayError, Position, RasterCanvas, StopHandle, TickOutcome, VideoFrame,
};

/// Host that asks the loop to stop after `limit` frames.
struct CountingHost {
    stop: StopHandle,
    limit: usize,
    requested: usize,
    presented: usize,
}

impl FrameHost<RasterCanvas> for CountingHost {
    fn present(&mut self, _surface: &RasterCanvas) -> anyhow::Result<()> {
        self.presented += 1;
        Ok(())
    }

    fn request_frame(&mut self) -> bool {
        self.requested += 1;
        if self.requested >= self.limit {
            self.stop.request_stop();
        }
        true
    }
}

fn drawn(outcome: TickOutcome) -> pose_overlay::FrameSummary {
    match outcome {
        TickOutcome::Drawn(summary) => summary,
        other => panic!("expected a drawn frame, got {:?}", other),
    }
}

#[test]
fn only_confident_poses_get_an_overlay() {
    let mut render = test_loop(
        RecordingEstimator::new(vec![0.9, 0.15, 0.149, 0.02]),
        ScriptedSource::new(),
    );
    render.setup().unwrap();

    let summary = drawn(render.tick().unwrap());
    assert_eq!(summary.total, 4);
    assert_eq!(summary.confident, 2);
    assert_eq!(summary.overlays_drawn, 2);

    render
        .store()
        .set("multiPoseDetection.minPoseConfidence", "0.95")
        .unwrap();
    let summary = drawn(render.tick().unwrap());
    assert_eq!(summary.confident, 0);
    assert_eq!(summary.overlays_drawn, 0);
}

#[test]
fn max_detections_caps_multi_pose_results() {
    let mut render = test_loop(
        RecordingEstimator::new(vec![0.9; 8]),
        ScriptedSource::new(),
    );
    render.setup().unwrap();
    assert_eq!(drawn(render.tick().unwrap()).total, 5);

    render
        .store()
        .set("multiPoseDetection.maxPoseDetections", "2")
        .unwrap();
    assert_eq!(drawn(render.tick().unwrap()).total, 2);
}

#[test]
fn algorithm_switch_applies_on_next_tick() {
    let estimator = RecordingEstimator::new(vec![0.8, 0.7]);
    let log = estimator.log();
    let mut render = test_loop(estimator, ScriptedSource::new());
    render.setup().unwrap();

    render.tick().unwrap();
    render.store().set("algorithm", "single-pose").unwrap();
    let summary = drawn(render.tick().unwrap());
    assert_eq!(summary.total, 1);
    render.tick().unwrap();

    let estimates: Vec<Call> = calls(&log)
        .into_iter()
        .filter(|call| matches!(call, Call::Single | Call::Multi))
        .collect();
    assert_eq!(estimates, vec![Call::Multi, Call::Single, Call::Single]);
}

#[test]
fn architecture_change_reloads_once_and_disposes_every_handle_once() {
    let estimator = RecordingEstimator::new(vec![0.8]);
    let log = estimator.log();
    let mut render = test_loop(estimator, ScriptedSource::new());
    let events = render.subscribe();
    render.setup().unwrap();
    assert_eq!(render.loaded_architecture(), Some(Architecture::MobileNet075));

    render
        .store()
        .set("input.mobileNetArchitecture", "1.01")
        .unwrap();
    render.tick().unwrap();
    render.tick().unwrap();
    assert_eq!(render.loaded_architecture(), Some(Architecture::MobileNet101));
    assert_eq!(render.stats().reconfigurations, 1);

    render.teardown();
    render.teardown();
    drop(render);

    let recorded = calls(&log);
    let loads: Vec<&Call> = recorded
        .iter()
        .filter(|call| matches!(call, Call::Load(_)))
        .collect();
    assert_eq!(
        loads,
        vec![
            &Call::Load(Architecture::MobileNet075),
            &Call::Load(Architecture::MobileNet101)
        ]
    );

    let mut disposals: HashMap<u64, usize> = HashMap::new();
    for call in &recorded {
        if let Call::Dispose(id) = call {
            *disposals.entry(*id).or_default() += 1;
        }
    }
    assert_eq!(disposals, HashMap::from([(1, 1), (2, 1)]));

    // Old handle is gone before the new one is requested.
    let dispose_first = recorded.iter().position(|c| *c == Call::Dispose(1));
    let load_second = recorded
        .iter()
        .position(|c| *c == Call::Load(Architecture::MobileNet101));
    assert!(dispose_first < load_second);

    let states: Vec<LoopState> = events
        .try_iter()
        .filter_map(|event| match event {
            LoopEvent::StateChanged(state) => Some(state),
            _ => None,
        })
        .collect();
    assert_eq!(
        states,
        vec![
            LoopState::Loading,
            LoopState::Running,
            LoopState::Reconfiguring,
            LoopState::Running,
            LoopState::Stopped,
        ]
    );
}

#[test]
fn failed_reconfiguration_ends_the_session() {
    let mut estimator = RecordingEstimator::new(vec![0.8]);
    estimator.fail_load_for = Some(Architecture::MobileNet050);
    let source = ScriptedSource::new();
    let releases = source.releases.clone();
    let mut render = test_loop(estimator, source);
    render.setup().unwrap();

    render
        .store()
        .set("input.mobileNetArchitecture", "0.50")
        .unwrap();
    let err = render.tick().unwrap_err();
    assert!(matches!(err, OverlayError::Reconfigure(_)));
    assert_eq!(render.state(), LoopState::Stopped);
    assert_eq!(render.estimator().live_handles(), 0);
    assert_eq!(releases.load(Ordering::SeqCst), 1);
    assert_eq!(render.tick().unwrap(), TickOutcome::Stopped);
}

#[test]
fn denied_camera_disposes_loaded_model() {
    let estimator = RecordingEstimator::new(vec![0.8]);
    let log = estimator.log();
    let mut render = test_loop(estimator, ScriptedSource::denied());

    let err = render.setup().unwrap_err();
    assert!(matches!(err, OverlayError::CameraPermissionDenied(_)));
    assert!(err.is_setup_error());
    assert_eq!(render.state(), LoopState::Stopped);
    assert_eq!(render.estimator().live_handles(), 0);
    assert_eq!(
        calls(&log),
        vec![Call::Load(Architecture::MobileNet075), Call::Dispose(1)]
    );
    assert_eq!(render.tick().unwrap(), TickOutcome::Stopped);
}

#[test]
fn failed_model_load_releases_camera() {
    let mut estimator = RecordingEstimator::new(vec![0.8]);
    estimator.fail_load_for = Some(Architecture::MobileNet075);
    let source = ScriptedSource::new();
    let releases = source.releases.clone();
    let mut render = test_loop(estimator, source);

    let err = render.setup().unwrap_err();
    assert!(matches!(err, OverlayError::ModelLoad { .. }));
    assert_eq!(render.state(), LoopState::Stopped);
    assert!(!render.capture().is_acquired());
    assert_eq!(releases.load(Ordering::SeqCst), 1);
}

#[test]
fn setup_twice_is_rejected() {
    let mut render = test_loop(RecordingEstimator::new(vec![0.8]), ScriptedSource::new());
    render.setup().unwrap();
    assert!(matches!(render.setup(), Err(OverlayError::InvalidState(_))));
    assert_eq!(render.estimator().live_handles(), 1);
}

#[test]
fn per_frame_failures_skip_the_tick() {
    let estimator = RecordingEstimator::new(vec![0.8]);
    estimator.failing_estimates.store(1, Ordering::SeqCst);
    let source = ScriptedSource::new();
    source.failing_frames.store(1, Ordering::SeqCst);
    let mut render = test_loop(estimator, source);
    let events = render.subscribe();
    render.setup().unwrap();

    assert_eq!(render.tick().unwrap(), TickOutcome::Skipped);
    assert_eq!(render.tick().unwrap(), TickOutcome::Skipped);
    assert_eq!(drawn(render.tick().unwrap()).confident, 1);
    assert_eq!(render.state(), LoopState::Running);
    assert_eq!(render.stats().skipped_frames, 2);
    assert_eq!(render.stats().frames_drawn, 1);

    let failures = events
        .try_iter()
        .filter(|event| matches!(event, LoopEvent::EstimationFailed(_)))
        .count();
    assert_eq!(failures, 2);
}

#[test]
fn stop_request_ends_run_and_tears_down() {
    let source = ScriptedSource::new();
    let releases = source.releases.clone();
    let mut render = test_loop(RecordingEstimator::new(vec![0.8]), source);
    render.setup().unwrap();

    let mut host = CountingHost {
        stop: render.stop_handle(),
        limit: 3,
        requested: 0,
        presented: 0,
    };
    render.run(&mut host).unwrap();

    assert_eq!(host.requested, 3);
    assert_eq!(host.presented, 3);
    assert_eq!(render.stats().ticks, 3);
    assert_eq!(render.state(), LoopState::Stopped);
    assert_eq!(render.estimator().live_handles(), 0);
    assert_eq!(releases.load(Ordering::SeqCst), 1);
}

#[test]
fn release_before_run_draws_nothing() {
    let estimator = RecordingEstimator::new(vec![0.8]);
    let log = estimator.log();
    let mut render = test_loop(estimator, ScriptedSource::new());
    render.setup().unwrap();
    render.release();

    let mut host = CountingHost {
        stop: render.stop_handle(),
        limit: 100,
        requested: 0,
        presented: 0,
    };
    render.run(&mut host).unwrap();
    assert_eq!(host.requested, 0);
    assert!(!calls(&log)
        .iter()
        .any(|call| matches!(call, Call::Single | Call::Multi)));
    assert_eq!(render.state(), LoopState::Stopped);
}

#[test]
fn drawing_after_overlay_is_unaffected_by_its_transform() {
    let frame = VideoFrame::new(image::RgbImage::new(FRAME_WIDTH, FRAME_HEIGHT), 1);
    let mut canvas = RasterCanvas::new(FRAME_WIDTH, FRAME_HEIGHT);
    let output = OutputConfig {
        show_video: false,
        show_skeleton: false,
        show_points: false,
        show_searching: false,
    };
    let summary = compose_frame(
        &mut canvas,
        &frame,
        &[forearm_pose(0.9)],
        Thresholds {
            min_pose_confidence: 0.1,
            min_part_confidence: 0.5,
        },
        &output,
        &sprite(),
        &OverlayGeometry::default(),
    );
    assert_eq!(summary.overlays_drawn, 1);
    assert_eq!(canvas.transform(), Affine2::IDENTITY);
    assert_eq!(canvas.depth(), 0);

    // The sprite lands around the wrist; the far corner is still clear.
    let wrist = canvas.pixel(WRIST.x as u32, WRIST.y as u32).unwrap();
    assert_eq!(wrist[2], 255);
    assert_eq!(canvas.pixel(85, 85).unwrap()[3], 0);

    draw_point(&mut canvas, Position::new(85.0, 85.0));
    let marked = canvas.pixel(85, 85).unwrap();
    assert!(marked[0] > 200);
    assert_eq!(marked[2], 0);
}

#[test]
fn overlay_follows_video_stretched_to_a_larger_canvas() {
    let frame = VideoFrame::new(
        image::RgbImage::from_pixel(300, 250, image::Rgb([10, 10, 10])),
        1,
    );
    let mut canvas = RasterCanvas::new(600, 500);
    let output = OutputConfig {
        show_video: true,
        show_skeleton: false,
        show_points: false,
        show_searching: false,
    };
    let pose = pose_overlay::Pose::from_fn(0.9, |part| match part {
        pose_overlay::BodyPart::RightElbow => (Position::new(120.0, 125.0), 0.9),
        pose_overlay::BodyPart::RightWrist => (Position::new(150.0, 125.0), 0.9),
        _ => (Position::new(20.0, 20.0), 0.9),
    });
    let summary = compose_frame(
        &mut canvas,
        &frame,
        &[pose],
        Thresholds {
            min_pose_confidence: 0.1,
            min_part_confidence: 0.5,
        },
        &output,
        &sprite(),
        &OverlayGeometry::default(),
    );
    assert_eq!(summary.overlays_drawn, 1);
    assert_eq!(canvas.pixel(300, 250), Some(image::Rgba([0, 0, 255, 255])));
    assert_eq!(canvas.pixel(150, 125), Some(image::Rgba([10, 10, 10, 255])));
}
