use std::sync::Arc;

use image::RgbaImage;
use serde::{Deserialize, Serialize};

use crate::pose::{BodyPart, Pose, Position};
use crate::surface::{DrawingSurface, SavedState};

/// Expected forearm length in sprite space.
pub const DEFAULT_REFERENCE_DISTANCE: f32 = 500.0;
pub const DEFAULT_SPRITE_OFFSET: Position = Position::new(-100.0, -120.0);
pub const DEFAULT_SPRITE_WIDTH: f32 = 200.0;
pub const DEFAULT_SPRITE_HEIGHT: f32 = 240.0;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Left,
    #[default]
    Right,
}

/// Keypoints the overlay is pinned to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AnchorPair {
    pub wrist: BodyPart,
    pub elbow: BodyPart,
}

impl AnchorPair {
    pub fn for_side(side: Side) -> Self {
        match side {
            Side::Left => Self {
                wrist: BodyPart::LeftWrist,
                elbow: BodyPart::LeftElbow,
            },
            Side::Right => Self {
                wrist: BodyPart::RightWrist,
                elbow: BodyPart::RightElbow,
            },
        }
    }
}

impl Default for AnchorPair {
    fn default() -> Self {
        Self::for_side(Side::Right)
    }
}

/// Placement of the overlay for one pose in one frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct OverlayTransform {
    pub anchor: Position,
    pub rotation: f32,
    pub scale: f32,
}

impl OverlayTransform {
    /// Anchor at the wrist, scaled by forearm length, rotated along the forearm.
    pub fn between(wrist: Position, elbow: Position, reference_distance: f32) -> Self {
        Self {
            anchor: wrist,
            rotation: (wrist.y - elbow.y).atan2(wrist.x - elbow.x),
            scale: wrist.distance_to(elbow) / reference_distance,
        }
    }

    pub fn from_pose(pose: &Pose, anchors: AnchorPair, reference_distance: f32) -> Self {
        Self::between(
            pose.keypoint(anchors.wrist).position,
            pose.keypoint(anchors.elbow).position,
            reference_distance,
        )
    }

    /// False for degenerate placements (zero forearm or non-finite values).
    pub fn is_drawable(&self) -> bool {
        self.anchor.x.is_finite()
            && self.anchor.y.is_finite()
            && self.rotation.is_finite()
            && self.scale.is_finite()
            && self.scale > 0.0
    }
}

/// Overlay image and its rectangle relative to the anchor, before scaling.
#[derive(Clone, Debug)]
pub struct OverlaySprite {
    pub image: Arc<RgbaImage>,
    pub offset: Position,
    pub width: f32,
    pub height: f32,
}

impl OverlaySprite {
    pub fn new(image: Arc<RgbaImage>) -> Self {
        Self {
            image,
            offset: DEFAULT_SPRITE_OFFSET,
            width: DEFAULT_SPRITE_WIDTH,
            height: DEFAULT_SPRITE_HEIGHT,
        }
    }

    pub fn with_placement(mut self, offset: Position, width: f32, height: f32) -> Self {
        self.offset = offset;
        self.width = width;
        self.height = height;
        self
    }
}

/// Anchor selection and calibration for the overlay.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct OverlayGeometry {
    pub anchors: AnchorPair,
    pub reference_distance: f32,
}

impl Default for OverlayGeometry {
    fn default() -> Self {
        Self {
            anchors: AnchorPair::default(),
            reference_distance: DEFAULT_REFERENCE_DISTANCE,
        }
    }
}

impl OverlayGeometry {
    pub fn transform_for(&self, pose: &Pose) -> OverlayTransform {
        OverlayTransform::from_pose(pose, self.anchors, self.reference_distance)
    }
}

/// Draw `sprite` at `transform`. Returns whether anything was drawn.
///
/// The surface transform is identical before and after the call.
pub fn render_overlay<S: DrawingSurface + ?Sized>(
    surface: &mut S,
    sprite: &OverlaySprite,
    transform: &OverlayTransform,
) -> bool {
    let mut guard = SavedState::new(surface);
    if !transform.is_drawable() {
        return false;
    }
    guard.translate(transform.anchor.x, transform.anchor.y);
    guard.scale(transform.scale, transform.scale);
    guard.rotate(transform.rotation);
    guard.draw_image(
        &sprite.image,
        sprite.offset.x,
        sprite.offset.y,
        sprite.width,
        sprite.height,
    );
    true
}
