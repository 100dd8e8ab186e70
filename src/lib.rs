//! Pose Overlay Kernel
//!
//! Real-time pose-driven overlay: frames from a camera go through a pose
//! estimator, and an image is drawn pinned to the detected forearm of every
//! confident person, scaled and rotated to follow it.
//!
//! # Pipeline
//!
//! 1. **Capture** (`capture`): a `FrameSource` yields RGB frames once acquired.
//! 2. **Estimation** (`estimate`): a `PoseEstimator` turns a frame into poses,
//!    in single-pose or multi-pose mode.
//! 3. **Rendering** (`render`, `surface`): confident poses are drawn on a
//!    `DrawingSurface`; the overlay follows the wrist/elbow anchor pair.
//! 4. **Scheduling** (`scheduler`): `RenderLoop` runs the above once per tick
//!    and applies live changes from the `ConfigStore`.
//!
//! # Module Structure
//!
//! - `pose`: keypoints and poses
//! - `store`: live detection configuration with change notification
//! - `capture`, `estimate`, `surface`, `preload`, `render`: pipeline stages
//! - `scheduler`, `stats`: the render loop and its counters
//! - `still`: one-shot estimation on a single image
//! - `config`, `panel`: daemon settings and the stdin operator panel

pub mod capture;
pub mod config;
pub mod error;
pub mod estimate;
pub mod panel;
pub mod pose;
pub mod preload;
pub mod render;
pub mod scheduler;
pub mod stats;
pub mod still;
pub mod store;
pub mod surface;
#[cfg(feature = "window")]
pub mod window;

pub use capture::{CameraSource, CaptureConfig, FrameInfo, FrameSource, VideoFrame};
pub use error::{OverlayError, Result};
pub use estimate::{
    build_estimator, BackendKind, EstimatorHandle, EstimatorSettings, InputParams, MultiParams,
    PoseEstimator, SyntheticConfig, SyntheticEstimator,
};
pub use pose::{BodyPart, Keypoint, Pose, Position, PART_COUNT};
pub use preload::{DefaultFetcher, ImagePreloader, ResourceFetcher, ResourceUrl};
pub use render::{
    compose_frame, frame_to_canvas, render_overlay, render_still_pose, AnchorPair, FrameSummary,
    OverlayGeometry, OverlaySprite, OverlayTransform, Side, StillSummary,
};
pub use scheduler::{
    FrameHost, IntervalHost, LoopEvent, LoopSettings, LoopState, RenderLoop, StopHandle,
    TickOutcome,
};
pub use stats::FrameStats;
pub use still::{estimate_still_pose, STILL_CANVAS_SIZE, STILL_INPUT};
pub use store::{
    Algorithm, Architecture, ConfigField, ConfigStore, DetectionConfig, OutputStride,
    TickConfig,
};
pub use surface::{draw_point, draw_polyline, Affine2, DrawingSurface, RasterCanvas, SavedState};

#[cfg(feature = "backend-tract")]
pub use estimate::TractEstimator;
#[cfg(feature = "window")]
pub use window::WindowHost;
