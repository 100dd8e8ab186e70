use std::f32::consts::TAU;

use crate::pose::{Keypoint, Position, ADJACENT_PARTS};
use crate::surface::{draw_point, draw_polyline, DrawingSurface, HIGHLIGHT};

const SEARCHING_RADIUS: f32 = 24.0;
const SEARCHING_SEGMENTS: usize = 32;

/// Dot per confident keypoint.
pub fn draw_keypoints<S: DrawingSurface + ?Sized>(
    surface: &mut S,
    keypoints: &[Keypoint],
    min_part_confidence: f32,
) -> usize {
    let mut drawn = 0;
    for keypoint in keypoints
        .iter()
        .filter(|k| k.is_confident(min_part_confidence))
    {
        draw_point(surface, keypoint.position);
        drawn += 1;
    }
    drawn
}

/// Segment per adjacent pair whose ends are both confident.
pub fn draw_skeleton<S: DrawingSurface + ?Sized>(
    surface: &mut S,
    keypoints: &[Keypoint],
    min_part_confidence: f32,
) -> usize {
    let mut drawn = 0;
    for (a, b) in ADJACENT_PARTS {
        let (Some(a), Some(b)) = (keypoints.get(a.index()), keypoints.get(b.index())) else {
            continue;
        };
        if a.is_confident(min_part_confidence) && b.is_confident(min_part_confidence) {
            draw_polyline(surface, &[a.position, b.position]);
            drawn += 1;
        }
    }
    drawn
}

/// Ring at the canvas centre, shown while no pose is confident.
pub fn draw_searching_indicator<S: DrawingSurface + ?Sized>(surface: &mut S) {
    let cx = surface.width() as f32 / 2.0;
    let cy = surface.height() as f32 / 2.0;
    let ring: Vec<Position> = (0..=SEARCHING_SEGMENTS)
        .map(|i| {
            let angle = TAU * i as f32 / SEARCHING_SEGMENTS as f32;
            Position::new(
                cx + SEARCHING_RADIUS * angle.cos(),
                cy + SEARCHING_RADIUS * angle.sin(),
            )
        })
        .collect();
    surface.stroke_polyline(&ring, HIGHLIGHT, 2.0);
}
