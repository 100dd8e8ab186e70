//! PoseNet output decoding.
//!
//! Turns the four PoseNet output tensors (part heatmaps, short-range offsets,
//! forward and backward mid-range displacements) into poses. Coordinates come
//! out in model-input pixel space; callers rescale them to the frame.

use anyhow::{anyhow, Result};

use crate::pose::{BodyPart, Pose, Position, PART_COUNT};

/// Parent/child edges of the part tree used for displacement traversal.
pub const POSE_CHAIN: [(BodyPart, BodyPart); 16] = [
    (BodyPart::Nose, BodyPart::LeftEye),
    (BodyPart::LeftEye, BodyPart::LeftEar),
    (BodyPart::Nose, BodyPart::RightEye),
    (BodyPart::RightEye, BodyPart::RightEar),
    (BodyPart::Nose, BodyPart::LeftShoulder),
    (BodyPart::LeftShoulder, BodyPart::LeftElbow),
    (BodyPart::LeftElbow, BodyPart::LeftWrist),
    (BodyPart::LeftShoulder, BodyPart::LeftHip),
    (BodyPart::LeftHip, BodyPart::LeftKnee),
    (BodyPart::LeftKnee, BodyPart::LeftAnkle),
    (BodyPart::Nose, BodyPart::RightShoulder),
    (BodyPart::RightShoulder, BodyPart::RightElbow),
    (BodyPart::RightElbow, BodyPart::RightWrist),
    (BodyPart::RightShoulder, BodyPart::RightHip),
    (BodyPart::RightHip, BodyPart::RightKnee),
    (BodyPart::RightKnee, BodyPart::RightAnkle),
];

const EDGE_COUNT: usize = POSE_CHAIN.len();
const LOCAL_MAXIMUM_RADIUS: usize = 1;
const OFFSET_REFINE_STEPS: usize = 2;

/// Decoded-ready PoseNet outputs on a `height` x `width` grid, channels last.
#[derive(Clone, Debug)]
pub struct PoseNetOutputs {
    pub height: usize,
    pub width: usize,
    pub output_stride: u32,
    /// `[h][w][17]` part scores in [0, 1] (sigmoid already applied).
    pub heatmaps: Vec<f32>,
    /// `[h][w][34]`: 17 y offsets then 17 x offsets.
    pub offsets: Vec<f32>,
    /// `[h][w][32]`: 16 y then 16 x displacements, parent to child.
    pub displacements_fwd: Vec<f32>,
    /// `[h][w][32]`: 16 y then 16 x displacements, child to parent.
    pub displacements_bwd: Vec<f32>,
}

#[derive(Clone, Copy, Debug)]
struct GridPoint {
    y: usize,
    x: usize,
}

#[derive(Clone, Copy, Debug)]
struct PartCandidate {
    score: f32,
    part: usize,
    cell: GridPoint,
}

impl PoseNetOutputs {
    pub fn new(
        height: usize,
        width: usize,
        output_stride: u32,
        heatmaps: Vec<f32>,
        offsets: Vec<f32>,
        displacements_fwd: Vec<f32>,
        displacements_bwd: Vec<f32>,
    ) -> Result<Self> {
        let cells = height * width;
        if cells == 0 || output_stride == 0 {
            return Err(anyhow!("empty PoseNet output grid"));
        }
        let checks = [
            ("heatmaps", heatmaps.len(), PART_COUNT),
            ("offsets", offsets.len(), PART_COUNT * 2),
            ("displacements_fwd", displacements_fwd.len(), EDGE_COUNT * 2),
            ("displacements_bwd", displacements_bwd.len(), EDGE_COUNT * 2),
        ];
        for (name, len, channels) in checks {
            if len != cells * channels {
                return Err(anyhow!(
                    "{} has {} values, expected {}x{}x{}",
                    name,
                    len,
                    height,
                    width,
                    channels
                ));
            }
        }
        Ok(Self {
            height,
            width,
            output_stride,
            heatmaps,
            offsets,
            displacements_fwd,
            displacements_bwd,
        })
    }

    fn score(&self, cell: GridPoint, part: usize) -> f32 {
        self.heatmaps[(cell.y * self.width + cell.x) * PART_COUNT + part]
    }

    fn offset(&self, cell: GridPoint, part: usize) -> (f32, f32) {
        let base = (cell.y * self.width + cell.x) * PART_COUNT * 2;
        (self.offsets[base + part], self.offsets[base + PART_COUNT + part])
    }

    fn displacement(&self, field: &[f32], cell: GridPoint, edge: usize) -> (f32, f32) {
        let base = (cell.y * self.width + cell.x) * EDGE_COUNT * 2;
        (field[base + edge], field[base + EDGE_COUNT + edge])
    }

    fn image_position(&self, cell: GridPoint, part: usize) -> Position {
        let (dy, dx) = self.offset(cell, part);
        let stride = self.output_stride as f32;
        Position::new(cell.x as f32 * stride + dx, cell.y as f32 * stride + dy)
    }

    fn to_grid(&self, position: Position) -> GridPoint {
        let stride = self.output_stride as f32;
        let clamp = |v: f32, len: usize| -> usize {
            let rounded = (v / stride).round();
            if rounded <= 0.0 || !rounded.is_finite() {
                0
            } else {
                (rounded as usize).min(len - 1)
            }
        };
        GridPoint {
            y: clamp(position.y, self.height),
            x: clamp(position.x, self.width),
        }
    }

    fn is_local_maximum(&self, part: usize, score: f32, cell: GridPoint) -> bool {
        let y_start = cell.y.saturating_sub(LOCAL_MAXIMUM_RADIUS);
        let y_end = (cell.y + LOCAL_MAXIMUM_RADIUS + 1).min(self.height);
        let x_start = cell.x.saturating_sub(LOCAL_MAXIMUM_RADIUS);
        let x_end = (cell.x + LOCAL_MAXIMUM_RADIUS + 1).min(self.width);
        for y in y_start..y_end {
            for x in x_start..x_end {
                if self.score(GridPoint { y, x }, part) > score {
                    return false;
                }
            }
        }
        true
    }
}

/// Single-pose decoding: best cell per part, refined by its offset.
pub fn decode_single_pose(outputs: &PoseNetOutputs) -> Pose {
    let pose = Pose::from_fn(0.0, |part| {
        let k = part.index();
        let mut best = (GridPoint { y: 0, x: 0 }, f32::NEG_INFINITY);
        for y in 0..outputs.height {
            for x in 0..outputs.width {
                let cell = GridPoint { y, x };
                let score = outputs.score(cell, k);
                if score > best.1 {
                    best = (cell, score);
                }
            }
        }
        (outputs.image_position(best.0, k), best.1)
    });
    let score = pose.mean_part_score();
    with_score(pose, score)
}

/// Multi-pose decoding with non-maximum suppression of root parts.
pub fn decode_multiple_poses(
    outputs: &PoseNetOutputs,
    max_detections: u32,
    score_threshold: f32,
    nms_radius: f32,
) -> Vec<Pose> {
    let squared_nms_radius = nms_radius * nms_radius;
    let mut queue = build_part_queue(outputs, score_threshold);
    queue.sort_by(|a, b| b.score.total_cmp(&a.score));

    let mut poses: Vec<Pose> = Vec::new();
    for root in queue {
        if poses.len() >= max_detections as usize {
            break;
        }
        let root_position = outputs.image_position(root.cell, root.part);
        if within_nms_of_existing(&poses, squared_nms_radius, root_position, root.part) {
            continue;
        }
        let pose = decode_pose(outputs, root, root_position);
        let score = instance_score(&poses, squared_nms_radius, &pose);
        poses.push(with_score(pose, score));
    }
    poses
}

/// Rescale and optionally mirror every keypoint position.
pub fn rescale_pose(pose: &Pose, scale_x: f32, scale_y: f32, mirror_width: Option<f32>) -> Pose {
    let keypoints = pose.keypoints();
    Pose::from_fn(pose.score(), |part| {
        let keypoint = keypoints[part.index()];
        let mut x = keypoint.position.x * scale_x;
        if let Some(width) = mirror_width {
            x = width - 1.0 - x;
        }
        (Position::new(x, keypoint.position.y * scale_y), keypoint.score)
    })
}

fn with_score(pose: Pose, score: f32) -> Pose {
    let keypoints = pose.keypoints();
    Pose::from_fn(score, |part| {
        let keypoint = keypoints[part.index()];
        (keypoint.position, keypoint.score)
    })
}

fn build_part_queue(outputs: &PoseNetOutputs, score_threshold: f32) -> Vec<PartCandidate> {
    let mut queue = Vec::new();
    for y in 0..outputs.height {
        for x in 0..outputs.width {
            let cell = GridPoint { y, x };
            for part in 0..PART_COUNT {
                let score = outputs.score(cell, part);
                if score < score_threshold {
                    continue;
                }
                if outputs.is_local_maximum(part, score, cell) {
                    queue.push(PartCandidate { score, part, cell });
                }
            }
        }
    }
    queue
}

fn squared_distance(a: Position, b: Position) -> f32 {
    let dx = a.x - b.x;
    let dy = a.y - b.y;
    dx * dx + dy * dy
}

fn within_nms_of_existing(
    poses: &[Pose],
    squared_nms_radius: f32,
    position: Position,
    part: usize,
) -> bool {
    poses.iter().any(|pose| {
        squared_distance(position, pose.keypoints()[part].position) <= squared_nms_radius
    })
}

fn instance_score(existing: &[Pose], squared_nms_radius: f32, pose: &Pose) -> f32 {
    let total: f32 = pose
        .keypoints()
        .iter()
        .enumerate()
        .filter(|(part, keypoint)| {
            !within_nms_of_existing(existing, squared_nms_radius, keypoint.position, *part)
        })
        .map(|(_, keypoint)| keypoint.score)
        .sum();
    total / PART_COUNT as f32
}

fn decode_pose(outputs: &PoseNetOutputs, root: PartCandidate, root_position: Position) -> Pose {
    let mut instance: [Option<(Position, f32)>; PART_COUNT] = [None; PART_COUNT];
    instance[root.part] = Some((root_position, root.score));

    for edge in (0..EDGE_COUNT).rev() {
        let (parent, child) = POSE_CHAIN[edge];
        if let (Some(source), None) = (instance[child.index()], instance[parent.index()]) {
            instance[parent.index()] = Some(traverse_to_target(
                outputs,
                edge,
                source.0,
                parent.index(),
                &outputs.displacements_bwd,
            ));
        }
    }

    for (edge, (parent, child)) in POSE_CHAIN.iter().enumerate() {
        if let (Some(source), None) = (instance[parent.index()], instance[child.index()]) {
            instance[child.index()] = Some(traverse_to_target(
                outputs,
                edge,
                source.0,
                child.index(),
                &outputs.displacements_fwd,
            ));
        }
    }

    Pose::from_fn(0.0, |part| {
        instance[part.index()].unwrap_or((root_position, 0.0))
    })
}

fn traverse_to_target(
    outputs: &PoseNetOutputs,
    edge: usize,
    source: Position,
    target_part: usize,
    displacements: &[f32],
) -> (Position, f32) {
    let source_cell = outputs.to_grid(source);
    let (dy, dx) = outputs.displacement(displacements, source_cell, edge);
    let mut target = Position::new(source.x + dx, source.y + dy);
    for _ in 0..OFFSET_REFINE_STEPS {
        let cell = outputs.to_grid(target);
        target = outputs.image_position(cell, target_part);
    }
    let cell = outputs.to_grid(target);
    (target, outputs.score(cell, target_part))
}
