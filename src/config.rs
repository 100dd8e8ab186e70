//! `overlayd` daemon settings.
//!
//! Read once at startup: an optional TOML (or `.json`) file, then environment
//! overrides, then validation. Every missing key falls back to a `DEFAULT_*`
//! constant.

use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::capture::CaptureConfig;
use crate::error::{OverlayError, Result};
use crate::estimate::{BackendKind, EstimatorSettings, SyntheticConfig};
use crate::pose::Position;
use crate::render::overlay::{
    DEFAULT_REFERENCE_DISTANCE, DEFAULT_SPRITE_HEIGHT, DEFAULT_SPRITE_OFFSET,
    DEFAULT_SPRITE_WIDTH,
};
use crate::render::{AnchorPair, OverlayGeometry, Side};
use crate::scheduler::LoopSettings;
use crate::store::DetectionConfig;

pub const CONFIG_ENV: &str = "POSE_OVERLAY_CONFIG";
pub const CAMERA_ENV: &str = "POSE_OVERLAY_CAMERA";
pub const BACKEND_ENV: &str = "POSE_OVERLAY_BACKEND";
pub const IMAGE_ENV: &str = "POSE_OVERLAY_IMAGE";
pub const MODEL_DIR_ENV: &str = "POSE_OVERLAY_MODEL_DIR";
pub const FPS_ENV: &str = "POSE_OVERLAY_FPS";

const DEFAULT_CAMERA_DEVICE: &str = "stub://camera";
const DEFAULT_CAMERA_WIDTH: u32 = 600;
const DEFAULT_CAMERA_HEIGHT: u32 = 500;
const DEFAULT_CAMERA_FPS: u32 = 30;
const DEFAULT_CAMERA_MIRROR: bool = true;
const DEFAULT_CANVAS_WIDTH: u32 = 600;
const DEFAULT_CANVAS_HEIGHT: u32 = 500;
const DEFAULT_OVERLAY_IMAGE: &str = "assets/overlay.png";
const DEFAULT_MODEL_DIR: &str = "models";
const DEFAULT_CROWD_SIZE: u32 = 2;

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct OverlaydConfigFile {
    camera: Option<CameraConfigFile>,
    canvas: Option<CanvasConfigFile>,
    overlay: Option<OverlayConfigFile>,
    model: Option<ModelConfigFile>,
    detection: Option<DetectionConfig>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct CameraConfigFile {
    device: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    target_fps: Option<u32>,
    mirror: Option<bool>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct CanvasConfigFile {
    width: Option<u32>,
    height: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct OverlayConfigFile {
    image: Option<String>,
    reference_distance: Option<f32>,
    anchor: Option<Side>,
    offset: Option<[f32; 2]>,
    size: Option<[f32; 2]>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct ModelConfigFile {
    backend: Option<BackendKind>,
    model_dir: Option<PathBuf>,
    crowd_size: Option<u32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OverlaydConfig {
    pub camera: CameraSettings,
    pub canvas: CanvasSettings,
    pub overlay: OverlaySettings,
    pub model: ModelSettings,
    /// Initial values for the live configuration store.
    pub detection: DetectionConfig,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CameraSettings {
    pub device: String,
    pub width: u32,
    pub height: u32,
    pub target_fps: u32,
    /// Mirror keypoints horizontally, as for a front-facing camera.
    pub mirror: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CanvasSettings {
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OverlaySettings {
    pub image: String,
    pub reference_distance: f32,
    pub anchor: Side,
    pub offset: Position,
    pub width: f32,
    pub height: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModelSettings {
    pub backend: BackendKind,
    pub model_dir: PathBuf,
    /// People produced by the synthetic backend in multi-pose mode.
    pub crowd_size: u32,
}

impl OverlaydConfig {
    /// Load from the file named by `POSE_OVERLAY_CONFIG`, if set.
    pub fn load() -> Result<Self> {
        let path = std::env::var(CONFIG_ENV)
            .ok()
            .filter(|p| !p.trim().is_empty())
            .map(PathBuf::from);
        Self::load_from(path.as_deref())
    }

    /// Load from `path` (or defaults when `None`), then apply env overrides.
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let file_cfg = match path {
            Some(path) => read_config_file(path)?,
            None => OverlaydConfigFile::default(),
        };
        let mut cfg = Self::from_file(file_cfg);
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: OverlaydConfigFile) -> Self {
        let camera = file.camera.unwrap_or_default();
        let canvas = file.canvas.unwrap_or_default();
        let overlay = file.overlay.unwrap_or_default();
        let model = file.model.unwrap_or_default();
        let offset = overlay
            .offset
            .map(|[x, y]| Position::new(x, y))
            .unwrap_or(DEFAULT_SPRITE_OFFSET);
        let [width, height] = overlay
            .size
            .unwrap_or([DEFAULT_SPRITE_WIDTH, DEFAULT_SPRITE_HEIGHT]);

        Self {
            camera: CameraSettings {
                device: camera
                    .device
                    .unwrap_or_else(|| DEFAULT_CAMERA_DEVICE.to_string()),
                width: camera.width.unwrap_or(DEFAULT_CAMERA_WIDTH),
                height: camera.height.unwrap_or(DEFAULT_CAMERA_HEIGHT),
                target_fps: camera.target_fps.unwrap_or(DEFAULT_CAMERA_FPS),
                mirror: camera.mirror.unwrap_or(DEFAULT_CAMERA_MIRROR),
            },
            canvas: CanvasSettings {
                width: canvas.width.unwrap_or(DEFAULT_CANVAS_WIDTH),
                height: canvas.height.unwrap_or(DEFAULT_CANVAS_HEIGHT),
            },
            overlay: OverlaySettings {
                image: overlay
                    .image
                    .unwrap_or_else(|| DEFAULT_OVERLAY_IMAGE.to_string()),
                reference_distance: overlay
                    .reference_distance
                    .unwrap_or(DEFAULT_REFERENCE_DISTANCE),
                anchor: overlay.anchor.unwrap_or_default(),
                offset,
                width,
                height,
            },
            model: ModelSettings {
                backend: model.backend.unwrap_or_default(),
                model_dir: model
                    .model_dir
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_MODEL_DIR)),
                crowd_size: model.crowd_size.unwrap_or(DEFAULT_CROWD_SIZE),
            },
            detection: file.detection.unwrap_or_default(),
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Some(device) = env_value(CAMERA_ENV) {
            self.camera.device = device;
        }
        if let Some(backend) = env_value(BACKEND_ENV) {
            self.model.backend = backend.parse()?;
        }
        if let Some(image) = env_value(IMAGE_ENV) {
            self.overlay.image = image;
        }
        if let Some(dir) = env_value(MODEL_DIR_ENV) {
            self.model.model_dir = PathBuf::from(dir);
        }
        if let Some(fps) = env_value(FPS_ENV) {
            self.camera.target_fps = fps.parse().map_err(|_| {
                OverlayError::InvalidConfig(format!("{} must be an integer, got {:?}", FPS_ENV, fps))
            })?;
        }
        Ok(())
    }

    /// Reject settings the daemon cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.camera.device.trim().is_empty() {
            return Err(invalid("camera.device must not be empty"));
        }
        if self.camera.width == 0 || self.camera.height == 0 {
            return Err(invalid("camera resolution must be non-zero"));
        }
        if self.camera.target_fps == 0 {
            return Err(invalid("camera.target_fps must be greater than zero"));
        }
        if self.canvas.width == 0 || self.canvas.height == 0 {
            return Err(invalid("canvas size must be non-zero"));
        }
        if self.overlay.image.trim().is_empty() {
            return Err(invalid("overlay.image must not be empty"));
        }
        if !(self.overlay.reference_distance.is_finite() && self.overlay.reference_distance > 0.0) {
            return Err(invalid("overlay.reference_distance must be positive"));
        }
        if !(self.overlay.width > 0.0 && self.overlay.height > 0.0) {
            return Err(invalid("overlay.size must be positive"));
        }
        if !(self.overlay.offset.x.is_finite() && self.overlay.offset.y.is_finite()) {
            return Err(invalid("overlay.offset must be finite"));
        }
        self.detection.validate()
    }

    pub fn capture_config(&self) -> CaptureConfig {
        CaptureConfig {
            device: self.camera.device.clone(),
            width: self.camera.width,
            height: self.camera.height,
            target_fps: self.camera.target_fps,
        }
    }

    pub fn estimator_settings(&self) -> EstimatorSettings {
        EstimatorSettings {
            backend: self.model.backend,
            model_dir: self.model.model_dir.clone(),
            synthetic: SyntheticConfig {
                crowd_size: self.model.crowd_size,
                ..SyntheticConfig::default()
            },
        }
    }

    pub fn loop_settings(&self) -> LoopSettings {
        LoopSettings {
            flip_horizontal: self.camera.mirror,
            geometry: OverlayGeometry {
                anchors: AnchorPair::for_side(self.overlay.anchor),
                reference_distance: self.overlay.reference_distance,
            },
        }
    }
}

impl Default for OverlaydConfig {
    fn default() -> Self {
        Self::from_file(OverlaydConfigFile::default())
    }
}

fn invalid(message: &str) -> OverlayError {
    OverlayError::InvalidConfig(message.to_string())
}

fn env_value(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn read_config_file(path: &Path) -> Result<OverlaydConfigFile> {
    let raw = std::fs::read_to_string(path).map_err(|e| {
        OverlayError::InvalidConfig(format!("failed to read config file {}: {}", path.display(), e))
    })?;
    let is_json = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
    let parsed = if is_json {
        serde_json::from_str(&raw).map_err(|e| e.to_string())
    } else {
        toml::from_str(&raw).map_err(|e| e.to_string())
    };
    parsed.map_err(|e| {
        OverlayError::InvalidConfig(format!("invalid config file {}: {}", path.display(), e))
    })
}
