//! Per-frame composition: video, skeleton, keypoints and the overlay sprite.

pub mod overlay;
pub mod skeleton;
pub mod still;

pub use overlay::{
    render_overlay, AnchorPair, OverlayGeometry, OverlaySprite, OverlayTransform, Side,
};
pub use skeleton::{draw_keypoints, draw_searching_indicator, draw_skeleton};
pub use still::{render_still_pose, StillSummary};

use crate::capture::VideoFrame;
use crate::pose::Pose;
use crate::store::{OutputConfig, Thresholds};
use crate::surface::DrawingSurface;

/// What one composed frame contained.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FrameSummary {
    pub total: usize,
    pub confident: usize,
    pub overlays_drawn: usize,
}

/// Factors that map frame coordinates onto the surface the video is stretched to.
pub fn frame_to_canvas<S: DrawingSurface + ?Sized>(
    surface: &S,
    frame_width: u32,
    frame_height: u32,
) -> (f32, f32) {
    let ratio = |canvas: u32, frame: u32| {
        if frame == 0 {
            1.0
        } else {
            canvas as f32 / frame as f32
        }
    };
    (
        ratio(surface.width(), frame_width),
        ratio(surface.height(), frame_height),
    )
}

/// Clear the surface and draw one frame's worth of poses.
///
/// A pose is confident when its score is at least `thresholds.min_pose_confidence`.
/// Only confident poses get decorations and an overlay. Poses are in frame
/// coordinates and are mapped onto the surface the same way the video is.
pub fn compose_frame<S: DrawingSurface + ?Sized>(
    surface: &mut S,
    frame: &VideoFrame,
    poses: &[Pose],
    thresholds: Thresholds,
    output: &OutputConfig,
    sprite: &OverlaySprite,
    geometry: &OverlayGeometry,
) -> FrameSummary {
    surface.clear();
    if output.show_video {
        surface.draw_video(&frame.image);
    }

    let mut summary = FrameSummary {
        total: poses.len(),
        ..FrameSummary::default()
    };
    let (sx, sy) = frame_to_canvas(surface, frame.width(), frame.height());
    for pose in poses {
        if pose.score() < thresholds.min_pose_confidence {
            continue;
        }
        summary.confident += 1;
        let scaled;
        let pose = if (sx, sy) == (1.0, 1.0) {
            pose
        } else {
            scaled = pose.scaled(sx, sy);
            &scaled
        };
        if output.show_skeleton {
            draw_skeleton(surface, pose.keypoints(), thresholds.min_part_confidence);
        }
        if output.show_points {
            draw_keypoints(surface, pose.keypoints(), thresholds.min_part_confidence);
        }
        if render_overlay(surface, sprite, &geometry.transform_for(pose)) {
            summary.overlays_drawn += 1;
        }
    }

    if summary.confident == 0 && output.show_searching {
        draw_searching_indicator(surface);
    }
    summary
}
