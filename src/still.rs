//! One-shot pose estimation on a single image.
//!
//! Loads a model, estimates one pose and disposes the model again, whether
//! or not estimation succeeded. Input parameters are fixed: half-scale input,
//! no mirroring and output stride 16.

use image::RgbImage;

use crate::capture::VideoFrame;
use crate::error::{chain_message, OverlayError, Result};
use crate::estimate::{InputParams, PoseEstimator};
use crate::pose::Pose;
use crate::store::{Architecture, OutputStride};

pub const STILL_INPUT: InputParams = InputParams {
    image_scale_factor: 0.5,
    flip_horizontal: false,
    output_stride: OutputStride::Sixteen,
};

/// Default edge length of the square still-image canvas.
pub const STILL_CANVAS_SIZE: u32 = 564;

pub fn estimate_still_pose<E: PoseEstimator + ?Sized>(
    estimator: &mut E,
    architecture: Architecture,
    image: RgbImage,
) -> Result<Pose> {
    let handle = estimator
        .load(architecture)
        .map_err(|err| OverlayError::ModelLoad {
            architecture,
            reason: chain_message(&err),
        })?;
    let frame = VideoFrame::new(image, 0);
    let estimated = estimator.estimate_single(&handle, &frame, &STILL_INPUT);
    if let Err(err) = estimator.dispose(handle) {
        log::warn!("still: dispose model: {:#}", err);
    }
    let pose = estimated.map_err(|err| OverlayError::Estimation(chain_message(&err)))?;
    log::info!(
        "still: pose score {:.3} on {}x{} image",
        pose.score(),
        frame.width(),
        frame.height()
    );
    Ok(pose)
}
