use std::collections::HashMap;
use std::f32::consts::TAU;
use std::thread;
use std::time::Duration;

use anyhow::{anyhow, Result};
use rand::Rng;

use crate::capture::VideoFrame;
use crate::estimate::backend::{EstimatorHandle, InputParams, MultiParams, PoseEstimator};
use crate::pose::{BodyPart, Pose, Position};
use crate::store::Architecture;

/// Tunables for the synthetic estimator.
#[derive(Clone, Debug)]
pub struct SyntheticConfig {
    /// People produced by multi-pose estimation (capped by `max_detections`).
    pub crowd_size: u32,
    /// Per-keypoint positional noise in pixels. Zero gives deterministic output.
    pub jitter_px: f32,
    /// Simulated model load time.
    pub load_delay: Duration,
    /// Score of the first person; each further person scores 0.1 lower.
    pub pose_score: f32,
    /// Right forearm rotation per frame, in radians.
    pub sweep_per_frame: f32,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            crowd_size: 2,
            jitter_px: 1.0,
            load_delay: Duration::from_millis(250),
            pose_score: 0.9,
            sweep_per_frame: TAU / 120.0,
        }
    }
}

/// Estimator that draws a standing figure whose right forearm sweeps a full
/// circle every `TAU / sweep_per_frame` frames. Needs no model files.
pub struct SyntheticEstimator {
    config: SyntheticConfig,
    loaded: HashMap<u64, Architecture>,
    next_id: u64,
}

impl SyntheticEstimator {
    pub fn new(config: SyntheticConfig) -> Self {
        Self {
            config,
            loaded: HashMap::new(),
            next_id: 1,
        }
    }

    /// Number of models currently loaded.
    pub fn loaded_models(&self) -> usize {
        self.loaded.len()
    }

    fn check_handle(&self, handle: &EstimatorHandle) -> Result<()> {
        if self.loaded.contains_key(&handle.id()) {
            Ok(())
        } else {
            Err(anyhow!("estimator handle {} is not loaded", handle.id()))
        }
    }

    fn figure(
        &self,
        frame: &VideoFrame,
        input: &InputParams,
        center_x: f32,
        phase: f32,
        score: f32,
    ) -> Pose {
        let width = frame.width() as f32;
        let h = frame.height() as f32;
        let cy = h * 0.5;
        let jitter = self.config.jitter_px.max(0.0);
        let mut rng = rand::thread_rng();
        let angle = frame.sequence as f32 * self.config.sweep_per_frame + phase;

        Pose::from_fn(score, |part| {
            let (dx, dy) = body_offset(part, angle);
            let mut x = center_x + dx * h;
            let y = cy + dy * h;
            if input.flip_horizontal {
                x = width - 1.0 - x;
            }
            let (nx, ny) = if jitter > 0.0 {
                (rng.gen_range(-jitter..=jitter), rng.gen_range(-jitter..=jitter))
            } else {
                (0.0, 0.0)
            };
            (Position::new(x + nx, y + ny), score)
        })
    }
}

impl Default for SyntheticEstimator {
    fn default() -> Self {
        Self::new(SyntheticConfig::default())
    }
}

/// Offset of a part from the figure's center, in units of frame height.
fn body_offset(part: BodyPart, forearm_angle: f32) -> (f32, f32) {
    const RIGHT_ELBOW: (f32, f32) = (-0.16, -0.08);
    const FOREARM: f32 = 0.13;
    match part {
        BodyPart::Nose => (0.0, -0.35),
        BodyPart::LeftEye => (0.03, -0.37),
        BodyPart::RightEye => (-0.03, -0.37),
        BodyPart::LeftEar => (0.06, -0.36),
        BodyPart::RightEar => (-0.06, -0.36),
        BodyPart::LeftShoulder => (0.12, -0.22),
        BodyPart::RightShoulder => (-0.12, -0.22),
        BodyPart::LeftElbow => (0.16, -0.08),
        BodyPart::RightElbow => RIGHT_ELBOW,
        BodyPart::LeftWrist => (0.17, 0.05),
        BodyPart::RightWrist => (
            RIGHT_ELBOW.0 + FOREARM * forearm_angle.cos(),
            RIGHT_ELBOW.1 + FOREARM * forearm_angle.sin(),
        ),
        BodyPart::LeftHip => (0.08, 0.05),
        BodyPart::RightHip => (-0.08, 0.05),
        BodyPart::LeftKnee => (0.08, 0.25),
        BodyPart::RightKnee => (-0.08, 0.25),
        BodyPart::LeftAnkle => (0.08, 0.42),
        BodyPart::RightAnkle => (-0.08, 0.42),
    }
}

impl PoseEstimator for SyntheticEstimator {
    fn name(&self) -> &'static str {
        "synthetic"
    }

    fn load(&mut self, architecture: Architecture) -> Result<EstimatorHandle> {
        if !self.config.load_delay.is_zero() {
            thread::sleep(self.config.load_delay);
        }
        let id = self.next_id;
        self.next_id += 1;
        self.loaded.insert(id, architecture);
        log::debug!("SyntheticEstimator: loaded model {} ({})", id, architecture);
        Ok(EstimatorHandle::new(id, architecture))
    }

    fn dispose(&mut self, handle: EstimatorHandle) -> Result<()> {
        match self.loaded.remove(&handle.id()) {
            Some(_) => {
                log::debug!("SyntheticEstimator: disposed model {}", handle.id());
                Ok(())
            }
            None => Err(anyhow!("estimator handle {} is not loaded", handle.id())),
        }
    }

    fn estimate_single(
        &mut self,
        handle: &EstimatorHandle,
        frame: &VideoFrame,
        input: &InputParams,
    ) -> Result<Pose> {
        self.check_handle(handle)?;
        let center = frame.width() as f32 * 0.5;
        Ok(self.figure(frame, input, center, 0.0, self.config.pose_score))
    }

    fn estimate_multiple(
        &mut self,
        handle: &EstimatorHandle,
        frame: &VideoFrame,
        input: &InputParams,
        multi: &MultiParams,
    ) -> Result<Vec<Pose>> {
        self.check_handle(handle)?;
        let count = self.config.crowd_size.min(multi.max_detections);
        let slot = frame.width() as f32 / (count as f32 + 1.0);
        Ok((0..count)
            .map(|i| {
                let score = (self.config.pose_score - 0.1 * i as f32).max(0.0);
                let phase = i as f32 * TAU / 3.0;
                self.figure(frame, input, slot * (i as f32 + 1.0), phase, score)
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::OutputStride;
    use image::RgbImage;

    fn quiet() -> SyntheticEstimator {
        SyntheticEstimator::new(SyntheticConfig {
            crowd_size: 3,
            jitter_px: 0.0,
            load_delay: Duration::ZERO,
            pose_score: 0.9,
            sweep_per_frame: TAU / 4.0,
        })
    }

    fn input(flip: bool) -> InputParams {
        InputParams {
            image_scale_factor: 0.5,
            flip_horizontal: flip,
            output_stride: OutputStride::Sixteen,
        }
    }

    fn frame(sequence: u64) -> VideoFrame {
        VideoFrame::new(RgbImage::new(600, 500), sequence)
    }

    #[test]
    fn forearm_rotates_with_frame_sequence() -> Result<()> {
        let mut estimator = quiet();
        let handle = estimator.load(Architecture::MobileNet075)?;

        let a = estimator.estimate_single(&handle, &frame(0), &input(false))?;
        let b = estimator.estimate_single(&handle, &frame(1), &input(false))?;
        let elbow = a.keypoint(BodyPart::RightElbow).position;
        let wrist_a = a.keypoint(BodyPart::RightWrist).position;
        let wrist_b = b.keypoint(BodyPart::RightWrist).position;

        assert!((wrist_a.x - elbow.x - 65.0).abs() < 1e-3);
        assert!((wrist_a.y - elbow.y).abs() < 1e-3);
        assert!((wrist_b.x - elbow.x).abs() < 1e-3);
        assert!((wrist_b.y - elbow.y - 65.0).abs() < 1e-3);
        Ok(())
    }

    #[test]
    fn flip_mirrors_x() -> Result<()> {
        let mut estimator = quiet();
        let handle = estimator.load(Architecture::MobileNet075)?;
        let plain = estimator.estimate_single(&handle, &frame(3), &input(false))?;
        let flipped = estimator.estimate_single(&handle, &frame(3), &input(true))?;
        let p = plain.keypoint(BodyPart::LeftShoulder).position;
        let f = flipped.keypoint(BodyPart::LeftShoulder).position;
        assert!((p.x + f.x - 599.0).abs() < 1e-3);
        assert_eq!(p.y, f.y);
        Ok(())
    }

    #[test]
    fn crowd_is_capped_by_max_detections() -> Result<()> {
        let mut estimator = quiet();
        let handle = estimator.load(Architecture::MobileNet050)?;
        let multi = MultiParams {
            max_detections: 2,
            min_part_confidence: 0.1,
            nms_radius: 30.0,
        };
        let poses = estimator.estimate_multiple(&handle, &frame(1), &input(true), &multi)?;
        assert_eq!(poses.len(), 2);
        assert!((poses[1].score() - 0.8).abs() < 1e-6);
        Ok(())
    }

    #[test]
    fn disposed_handles_are_rejected() -> Result<()> {
        let mut estimator = quiet();
        let handle = estimator.load(Architecture::MobileNet101)?;
        let stale = EstimatorHandle::new(handle.id(), handle.architecture());
        estimator.dispose(handle)?;
        assert_eq!(estimator.loaded_models(), 0);
        assert!(estimator.estimate_single(&stale, &frame(1), &input(false)).is_err());
        assert!(estimator.dispose(stale).is_err());
        Ok(())
    }
}
