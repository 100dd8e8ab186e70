//! Pose data model.
//!
//! A `Pose` always carries exactly one `Keypoint` per `BodyPart`, in `BodyPart::ALL`
//! order. Construction enforces this, so lookups by part never fail.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{OverlayError, Result};

/// Number of keypoints in every pose.
pub const PART_COUNT: usize = 17;

/// Anatomical landmarks in estimator output order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BodyPart {
    Nose,
    LeftEye,
    RightEye,
    LeftEar,
    RightEar,
    LeftShoulder,
    RightShoulder,
    LeftElbow,
    RightElbow,
    LeftWrist,
    RightWrist,
    LeftHip,
    RightHip,
    LeftKnee,
    RightKnee,
    LeftAnkle,
    RightAnkle,
}

impl BodyPart {
    pub const ALL: [BodyPart; PART_COUNT] = [
        BodyPart::Nose,
        BodyPart::LeftEye,
        BodyPart::RightEye,
        BodyPart::LeftEar,
        BodyPart::RightEar,
        BodyPart::LeftShoulder,
        BodyPart::RightShoulder,
        BodyPart::LeftElbow,
        BodyPart::RightElbow,
        BodyPart::LeftWrist,
        BodyPart::RightWrist,
        BodyPart::LeftHip,
        BodyPart::RightHip,
        BodyPart::LeftKnee,
        BodyPart::RightKnee,
        BodyPart::LeftAnkle,
        BodyPart::RightAnkle,
    ];

    /// Position of this part within a pose's keypoint sequence.
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> Option<BodyPart> {
        Self::ALL.get(index).copied()
    }

    pub fn name(self) -> &'static str {
        match self {
            BodyPart::Nose => "nose",
            BodyPart::LeftEye => "leftEye",
            BodyPart::RightEye => "rightEye",
            BodyPart::LeftEar => "leftEar",
            BodyPart::RightEar => "rightEar",
            BodyPart::LeftShoulder => "leftShoulder",
            BodyPart::RightShoulder => "rightShoulder",
            BodyPart::LeftElbow => "leftElbow",
            BodyPart::RightElbow => "rightElbow",
            BodyPart::LeftWrist => "leftWrist",
            BodyPart::RightWrist => "rightWrist",
            BodyPart::LeftHip => "leftHip",
            BodyPart::RightHip => "rightHip",
            BodyPart::LeftKnee => "leftKnee",
            BodyPart::RightKnee => "rightKnee",
            BodyPart::LeftAnkle => "leftAnkle",
            BodyPart::RightAnkle => "rightAnkle",
        }
    }
}

impl fmt::Display for BodyPart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Part pairs joined by skeleton lines.
pub const ADJACENT_PARTS: [(BodyPart, BodyPart); 12] = [
    (BodyPart::LeftHip, BodyPart::LeftShoulder),
    (BodyPart::LeftElbow, BodyPart::LeftShoulder),
    (BodyPart::LeftElbow, BodyPart::LeftWrist),
    (BodyPart::LeftHip, BodyPart::LeftKnee),
    (BodyPart::LeftKnee, BodyPart::LeftAnkle),
    (BodyPart::RightHip, BodyPart::RightShoulder),
    (BodyPart::RightElbow, BodyPart::RightShoulder),
    (BodyPart::RightElbow, BodyPart::RightWrist),
    (BodyPart::RightHip, BodyPart::RightKnee),
    (BodyPart::RightKnee, BodyPart::RightAnkle),
    (BodyPart::LeftShoulder, BodyPart::RightShoulder),
    (BodyPart::LeftHip, BodyPart::RightHip),
];

/// Pixel position in frame coordinates.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f32,
    pub y: f32,
}

impl Position {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn distance_to(self, other: Position) -> f32 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Keypoint {
    pub part: BodyPart,
    pub position: Position,
    pub score: f32,
}

impl Keypoint {
    pub fn new(part: BodyPart, position: Position, score: f32) -> Self {
        Self {
            part,
            position,
            score,
        }
    }

    pub fn is_confident(&self, min_part_confidence: f32) -> bool {
        self.score >= min_part_confidence
    }
}

/// One detected person in one frame.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "UncheckedPose")]
pub struct Pose {
    score: f32,
    keypoints: Vec<Keypoint>,
}

impl Pose {
    /// Build a pose from a full keypoint sequence in `BodyPart::ALL` order.
    pub fn new(score: f32, keypoints: Vec<Keypoint>) -> Result<Self> {
        if keypoints.len() != PART_COUNT {
            return Err(OverlayError::Estimation(format!(
                "pose has {} keypoints, expected {}",
                keypoints.len(),
                PART_COUNT
            )));
        }
        for (expected, keypoint) in BodyPart::ALL.iter().zip(&keypoints) {
            if keypoint.part != *expected {
                return Err(OverlayError::Estimation(format!(
                    "keypoint {} found where {} was expected",
                    keypoint.part, expected
                )));
            }
        }
        Ok(Self { score, keypoints })
    }

    /// Build a pose by asking for each part's position and score in order.
    pub fn from_fn(score: f32, mut f: impl FnMut(BodyPart) -> (Position, f32)) -> Self {
        let keypoints = BodyPart::ALL
            .iter()
            .map(|&part| {
                let (position, part_score) = f(part);
                Keypoint::new(part, position, part_score)
            })
            .collect();
        Self { score, keypoints }
    }

    pub fn score(&self) -> f32 {
        self.score
    }

    pub fn keypoints(&self) -> &[Keypoint] {
        &self.keypoints
    }

    pub fn keypoint(&self, part: BodyPart) -> &Keypoint {
        &self.keypoints[part.index()]
    }

    /// Same pose with every position multiplied by `(sx, sy)`; scores are kept.
    pub fn scaled(&self, sx: f32, sy: f32) -> Pose {
        let keypoints = self
            .keypoints
            .iter()
            .map(|k| {
                let position = Position::new(k.position.x * sx, k.position.y * sy);
                Keypoint::new(k.part, position, k.score)
            })
            .collect();
        Self {
            score: self.score,
            keypoints,
        }
    }

    /// Mean keypoint score, the instance score single-pose decoders report.
    pub fn mean_part_score(&self) -> f32 {
        self.keypoints.iter().map(|k| k.score).sum::<f32>() / PART_COUNT as f32
    }
}

#[derive(Deserialize)]
struct UncheckedPose {
    score: f32,
    keypoints: Vec<Keypoint>,
}

impl TryFrom<UncheckedPose> for Pose {
    type Error = OverlayError;

    fn try_from(raw: UncheckedPose) -> Result<Self> {
        Pose::new(raw.score, raw.keypoints)
    }
}
