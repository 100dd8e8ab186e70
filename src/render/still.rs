//! Single-image rendering: every keypoint dot plus three body outlines.

use image::RgbImage;

use super::frame_to_canvas;
use crate::pose::{BodyPart, Pose, Position};
use crate::surface::{draw_point, draw_polyline, DrawingSurface};

/// Shoulders, then hips.
pub const BODY_OUTLINE: [BodyPart; 4] = [
    BodyPart::LeftShoulder,
    BodyPart::RightShoulder,
    BodyPart::LeftHip,
    BodyPart::RightHip,
];
pub const LEFT_ARM: [BodyPart; 3] = [
    BodyPart::LeftShoulder,
    BodyPart::LeftElbow,
    BodyPart::LeftWrist,
];
pub const RIGHT_ARM: [BodyPart; 3] = [
    BodyPart::RightShoulder,
    BodyPart::RightElbow,
    BodyPart::RightWrist,
];

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StillSummary {
    pub points: usize,
    pub outlines: usize,
}

/// Draw `image` stretched to the surface and `pose` (in image coordinates) on top.
///
/// No confidence threshold applies: a still image shows everything the
/// estimator reported.
pub fn render_still_pose<S: DrawingSurface + ?Sized>(
    surface: &mut S,
    image: &RgbImage,
    pose: &Pose,
) -> StillSummary {
    surface.clear();
    surface.draw_video(image);

    let (sx, sy) = frame_to_canvas(surface, image.width(), image.height());
    let pose = pose.scaled(sx, sy);

    let mut summary = StillSummary::default();
    for keypoint in pose.keypoints() {
        draw_point(surface, keypoint.position);
        summary.points += 1;
    }
    for outline in [&BODY_OUTLINE[..], &LEFT_ARM[..], &RIGHT_ARM[..]] {
        let points: Vec<Position> = outline
            .iter()
            .map(|&part| pose.keypoint(part).position)
            .collect();
        draw_polyline(surface, &points);
        summary.outlines += 1;
    }
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surface::RasterCanvas;
    use image::Rgb;

    fn standing(score: f32) -> Pose {
        Pose::from_fn(score, |part| {
            let position = match part {
                BodyPart::LeftShoulder => Position::new(10.0, 10.0),
                BodyPart::RightShoulder => Position::new(30.0, 10.0),
                BodyPart::LeftHip => Position::new(10.0, 40.0),
                BodyPart::RightHip => Position::new(30.0, 40.0),
                BodyPart::LeftElbow => Position::new(4.0, 20.0),
                BodyPart::LeftWrist => Position::new(4.0, 30.0),
                BodyPart::RightElbow => Position::new(36.0, 20.0),
                BodyPart::RightWrist => Position::new(36.0, 30.0),
                _ => Position::new(20.0, 4.0),
            };
            (position, 0.01)
        })
    }

    #[test]
    fn draws_low_scoring_points_and_all_outlines() {
        let image = RgbImage::from_pixel(48, 48, Rgb([0, 0, 0]));
        let mut canvas = RasterCanvas::new(48, 48);
        let summary = render_still_pose(&mut canvas, &image, &standing(0.02));
        assert_eq!(
            summary,
            StillSummary {
                points: 17,
                outlines: 3,
            }
        );

        let red = |x: u32, y: u32| canvas.pixel(x, y).unwrap()[0] > 0;
        // Shoulder line, then the diagonal back to the left hip.
        assert!(red(20, 10));
        assert!(red(20, 25));
        // Upper arms, shoulder to elbow.
        assert!(red(7, 15));
        assert!(red(33, 15));
        // Arm outlines stop at the wrist; nothing joins the hips to the wrists.
        assert!(!red(20, 34));
    }

    #[test]
    fn pose_is_mapped_onto_a_larger_canvas() {
        let image = RgbImage::from_pixel(48, 48, Rgb([0, 0, 0]));
        let mut canvas = RasterCanvas::new(96, 96);
        render_still_pose(&mut canvas, &image, &standing(0.9));
        // Shoulder midpoint (20, 10) lands at (40, 20).
        assert!(canvas.pixel(40, 20).unwrap()[0] > 0);
        assert_eq!(canvas.pixel(20, 10).unwrap()[0], 0);
    }
}
