use anyhow::Result;

use crate::capture::VideoFrame;
use crate::pose::Pose;
use crate::store::{Architecture, DetectionConfig, OutputStride};

/// Opaque reference to a loaded pose model.
///
/// Handles are neither `Clone` nor `Copy`: `PoseEstimator::dispose` consumes the
/// handle, so a model can only be disposed once.
#[derive(Debug, PartialEq, Eq)]
pub struct EstimatorHandle {
    id: u64,
    architecture: Architecture,
}

impl EstimatorHandle {
    /// Mint a handle. Called by estimator implementations from `load`.
    pub fn new(id: u64, architecture: Architecture) -> Self {
        Self { id, architecture }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn architecture(&self) -> Architecture {
        self.architecture
    }
}

/// Input parameters shared by single and multi pose estimation.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct InputParams {
    pub image_scale_factor: f32,
    pub flip_horizontal: bool,
    pub output_stride: OutputStride,
}

impl InputParams {
    pub fn from_config(config: &DetectionConfig, flip_horizontal: bool) -> Self {
        Self {
            image_scale_factor: config.input.image_scale_factor,
            flip_horizontal,
            output_stride: config.input.output_stride,
        }
    }
}

/// Multi-pose only parameters.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MultiParams {
    pub max_detections: u32,
    pub min_part_confidence: f32,
    pub nms_radius: f32,
}

impl MultiParams {
    pub fn from_config(config: &DetectionConfig) -> Self {
        Self {
            max_detections: config.multi_pose_detection.max_pose_detections,
            min_part_confidence: config.multi_pose_detection.min_part_confidence,
            nms_radius: config.multi_pose_detection.nms_radius,
        }
    }
}

/// Pose estimation adapter.
///
/// Any inference engine exposing this shape can drive the render loop. The
/// render loop owns the estimator and the single live handle exclusively.
pub trait PoseEstimator: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Load a model. May block for seconds.
    fn load(&mut self, architecture: Architecture) -> Result<EstimatorHandle>;

    /// Release a model's resources.
    fn dispose(&mut self, handle: EstimatorHandle) -> Result<()>;

    /// Estimate exactly one pose. No thresholding is applied.
    fn estimate_single(
        &mut self,
        handle: &EstimatorHandle,
        frame: &VideoFrame,
        input: &InputParams,
    ) -> Result<Pose>;

    /// Estimate zero or more poses, de-duplicated by `nms_radius`.
    ///
    /// Result order is unspecified.
    fn estimate_multiple(
        &mut self,
        handle: &EstimatorHandle,
        frame: &VideoFrame,
        input: &InputParams,
        multi: &MultiParams,
    ) -> Result<Vec<Pose>>;
}

impl<E: PoseEstimator + ?Sized> PoseEstimator for Box<E> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn load(&mut self, architecture: Architecture) -> Result<EstimatorHandle> {
        (**self).load(architecture)
    }

    fn dispose(&mut self, handle: EstimatorHandle) -> Result<()> {
        (**self).dispose(handle)
    }

    fn estimate_single(
        &mut self,
        handle: &EstimatorHandle,
        frame: &VideoFrame,
        input: &InputParams,
    ) -> Result<Pose> {
        (**self).estimate_single(handle, frame, input)
    }

    fn estimate_multiple(
        &mut self,
        handle: &EstimatorHandle,
        frame: &VideoFrame,
        input: &InputParams,
        multi: &MultiParams,
    ) -> Result<Vec<Pose>> {
        (**self).estimate_multiple(handle, frame, input, multi)
    }
}
