#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, bail};
use image::{Rgb, RgbImage, Rgba, RgbaImage};

use pose_overlay::{
    Architecture, BodyPart, ConfigStore, EstimatorHandle, FrameInfo, FrameSource, InputParams,
    LoopSettings, MultiParams, OverlayError, OverlaySprite, Pose, PoseEstimator, Position,
    RasterCanvas, RenderLoop, VideoFrame,
};

pub const FRAME_WIDTH: u32 = 100;
pub const FRAME_HEIGHT: u32 = 100;
pub const ELBOW: Position = Position::new(30.0, 50.0);
pub const WRIST: Position = Position::new(60.0, 50.0);

/// Estimator calls in the order they happened.
#[derive(Clone, Debug, PartialEq)]
pub enum Call {
    Load(Architecture),
    Dispose(u64),
    Single,
    Multi,
}

pub type CallLog = Arc<Mutex<Vec<Call>>>;

/// Estimator that records every call and returns scripted poses.
pub struct RecordingEstimator {
    log: CallLog,
    live: HashSet<u64>,
    next_id: u64,
    /// Pose scores returned by `estimate_multiple`; the first is used for single.
    pub scores: Vec<f32>,
    pub fail_load_for: Option<Architecture>,
    /// Number of upcoming estimate calls that fail.
    pub failing_estimates: Arc<AtomicUsize>,
}

impl RecordingEstimator {
    pub fn new(scores: Vec<f32>) -> Self {
        Self {
            log: Arc::new(Mutex::new(Vec::new())),
            live: HashSet::new(),
            next_id: 1,
            scores,
            fail_load_for: None,
            failing_estimates: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn log(&self) -> CallLog {
        Arc::clone(&self.log)
    }

    pub fn live_handles(&self) -> usize {
        self.live.len()
    }

    fn record(&self, call: Call) {
        self.log.lock().unwrap().push(call);
    }

    fn check(&self, handle: &EstimatorHandle) -> anyhow::Result<()> {
        if !self.live.contains(&handle.id()) {
            bail!("handle {} is not loaded", handle.id());
        }
        let failing = self.failing_estimates.load(Ordering::SeqCst);
        if failing > 0 {
            self.failing_estimates.store(failing - 1, Ordering::SeqCst);
            bail!("scripted estimate failure");
        }
        Ok(())
    }
}

impl PoseEstimator for RecordingEstimator {
    fn name(&self) -> &'static str {
        "recording"
    }

    fn load(&mut self, architecture: Architecture) -> anyhow::Result<EstimatorHandle> {
        self.record(Call::Load(architecture));
        if self.fail_load_for == Some(architecture) {
            bail!("no weights for {}", architecture);
        }
        let id = self.next_id;
        self.next_id += 1;
        self.live.insert(id);
        Ok(EstimatorHandle::new(id, architecture))
    }

    fn dispose(&mut self, handle: EstimatorHandle) -> anyhow::Result<()> {
        self.record(Call::Dispose(handle.id()));
        if !self.live.remove(&handle.id()) {
            bail!("handle {} disposed twice", handle.id());
        }
        Ok(())
    }

    fn estimate_single(
        &mut self,
        handle: &EstimatorHandle,
        _frame: &VideoFrame,
        _input: &InputParams,
    ) -> anyhow::Result<Pose> {
        self.record(Call::Single);
        self.check(handle)?;
        let score = self.scores.first().copied().unwrap_or(0.0);
        Ok(forearm_pose(score))
    }

    fn estimate_multiple(
        &mut self,
        handle: &EstimatorHandle,
        _frame: &VideoFrame,
        _input: &InputParams,
        multi: &MultiParams,
    ) -> anyhow::Result<Vec<Pose>> {
        self.record(Call::Multi);
        self.check(handle)?;
        Ok(self
            .scores
            .iter()
            .take(multi.max_detections as usize)
            .map(|&score| forearm_pose(score))
            .collect())
    }
}

/// Pose with the right forearm along `ELBOW` to `WRIST`.
pub fn forearm_pose(score: f32) -> Pose {
    Pose::from_fn(score, |part| match part {
        BodyPart::RightElbow => (ELBOW, 0.9),
        BodyPart::RightWrist => (WRIST, 0.9),
        _ => (Position::new(50.0, 20.0), 0.9),
    })
}

/// Frame source with scripted failures.
pub struct ScriptedSource {
    pub fail_acquire: bool,
    /// Number of upcoming `next_frame` calls that fail.
    pub failing_frames: Arc<AtomicUsize>,
    pub releases: Arc<AtomicUsize>,
    acquired: bool,
    sequence: u64,
}

impl ScriptedSource {
    pub fn new() -> Self {
        Self {
            fail_acquire: false,
            failing_frames: Arc::new(AtomicUsize::new(0)),
            releases: Arc::new(AtomicUsize::new(0)),
            acquired: false,
            sequence: 0,
        }
    }

    pub fn denied() -> Self {
        Self {
            fail_acquire: true,
            ..Self::new()
        }
    }
}

impl FrameSource for ScriptedSource {
    fn name(&self) -> &str {
        "scripted"
    }

    fn acquire(&mut self) -> pose_overlay::Result<FrameInfo> {
        if self.fail_acquire {
            return Err(OverlayError::CameraPermissionDenied(
                "user dismissed the prompt".to_string(),
            ));
        }
        self.acquired = true;
        Ok(FrameInfo {
            width: FRAME_WIDTH,
            height: FRAME_HEIGHT,
        })
    }

    fn next_frame(&mut self) -> anyhow::Result<VideoFrame> {
        if !self.acquired {
            return Err(anyhow!("scripted source not acquired"));
        }
        let failing = self.failing_frames.load(Ordering::SeqCst);
        if failing > 0 {
            self.failing_frames.store(failing - 1, Ordering::SeqCst);
            bail!("scripted frame drop");
        }
        self.sequence += 1;
        Ok(VideoFrame::new(
            RgbImage::from_pixel(FRAME_WIDTH, FRAME_HEIGHT, Rgb([10, 10, 10])),
            self.sequence,
        ))
    }

    fn release(&mut self) {
        if self.acquired {
            self.acquired = false;
            self.releases.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn is_acquired(&self) -> bool {
        self.acquired
    }
}

pub fn sprite() -> OverlaySprite {
    OverlaySprite::new(Arc::new(RgbaImage::from_pixel(
        8,
        8,
        Rgba([0, 0, 255, 255]),
    )))
}

pub type TestLoop = RenderLoop<RecordingEstimator, ScriptedSource, RasterCanvas>;

pub fn test_loop(estimator: RecordingEstimator, source: ScriptedSource) -> TestLoop {
    RenderLoop::new(
        ConfigStore::default(),
        estimator,
        source,
        RasterCanvas::new(FRAME_WIDTH, FRAME_HEIGHT),
        sprite(),
        LoopSettings::default(),
    )
}

pub fn calls(log: &CallLog) -> Vec<Call> {
    log.lock().unwrap().clone()
}
