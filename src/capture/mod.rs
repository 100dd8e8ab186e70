//! Live video capture.
//!
//! `FrameSource` is the capture contract the render loop depends on:
//! - `acquire` opens the stream and resolves once frame dimensions are known
//! - `next_frame` yields the most recent frame of an acquired stream
//! - `release` stops the stream; calling it again is a no-op
//!
//! `CameraSource` is the shipped implementation. It selects a backend from the
//! device string:
//! - `stub://<name>`: synthetic moving test pattern (always available)
//! - anything else: a V4L2 device node (feature: capture-v4l2)
//!
//! Capture failures at acquisition are fatal and never retried here.

mod synthetic;
#[cfg(feature = "capture-v4l2")]
mod v4l2;

use anyhow::anyhow;
use image::RgbImage;

use crate::error::{OverlayError, Result};
use synthetic::SyntheticCamera;
#[cfg(feature = "capture-v4l2")]
use v4l2::DeviceCamera;

/// Dimensions reported once the stream's metadata is available.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameInfo {
    pub width: u32,
    pub height: u32,
}

/// One decoded RGB frame.
#[derive(Clone, Debug)]
pub struct VideoFrame {
    pub image: RgbImage,
    /// Monotonic per-source frame counter, starting at 1.
    pub sequence: u64,
}

impl VideoFrame {
    pub fn new(image: RgbImage, sequence: u64) -> Self {
        Self { image, sequence }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

/// Capture contract consumed by the render loop.
pub trait FrameSource: Send {
    /// Source identifier for logs.
    fn name(&self) -> &str;

    /// Open the stream. Resolves with the negotiated frame size.
    fn acquire(&mut self) -> Result<FrameInfo>;

    /// Most recent frame of an acquired stream.
    fn next_frame(&mut self) -> anyhow::Result<VideoFrame>;

    /// Stop all tracks and detach the stream. Idempotent.
    fn release(&mut self);

    fn is_acquired(&self) -> bool;
}

/// Configuration for a camera source.
#[derive(Clone, Debug)]
pub struct CaptureConfig {
    /// Device path (e.g. "/dev/video0") or "stub://<name>".
    pub device: String,
    /// Preferred frame width.
    pub width: u32,
    /// Preferred frame height.
    pub height: u32,
    /// Target frame rate requested from the device.
    pub target_fps: u32,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            device: "stub://camera".to_string(),
            width: 600,
            height: 500,
            target_fps: 30,
        }
    }
}

/// Statistics for a camera source.
#[derive(Clone, Debug)]
pub struct CaptureStats {
    pub frames_captured: u64,
    pub device: String,
}

/// Camera frame source.
pub struct CameraSource {
    backend: CameraBackend,
}

enum CameraBackend {
    Synthetic(SyntheticCamera),
    #[cfg(feature = "capture-v4l2")]
    Device(DeviceCamera),
}

impl CameraSource {
    pub fn new(config: CaptureConfig) -> Result<Self> {
        if config.device.trim().is_empty() {
            return Err(OverlayError::InvalidConfig(
                "camera device must not be empty".to_string(),
            ));
        }
        if config.width == 0 || config.height == 0 {
            return Err(OverlayError::InvalidConfig(format!(
                "camera resolution {}x{} is invalid",
                config.width, config.height
            )));
        }
        if config.device.starts_with("stub://") {
            Ok(Self {
                backend: CameraBackend::Synthetic(SyntheticCamera::new(config)),
            })
        } else {
            #[cfg(feature = "capture-v4l2")]
            {
                Ok(Self {
                    backend: CameraBackend::Device(DeviceCamera::new(config)),
                })
            }
            #[cfg(not(feature = "capture-v4l2"))]
            {
                Err(OverlayError::CaptureUnavailable(format!(
                    "{} requires the capture-v4l2 feature",
                    config.device
                )))
            }
        }
    }

    pub fn stats(&self) -> CaptureStats {
        match &self.backend {
            CameraBackend::Synthetic(camera) => camera.stats(),
            #[cfg(feature = "capture-v4l2")]
            CameraBackend::Device(camera) => camera.stats(),
        }
    }
}

impl FrameSource for CameraSource {
    fn name(&self) -> &str {
        match &self.backend {
            CameraBackend::Synthetic(camera) => camera.device(),
            #[cfg(feature = "capture-v4l2")]
            CameraBackend::Device(camera) => camera.device(),
        }
    }

    fn acquire(&mut self) -> Result<FrameInfo> {
        match &mut self.backend {
            CameraBackend::Synthetic(camera) => camera.acquire(),
            #[cfg(feature = "capture-v4l2")]
            CameraBackend::Device(camera) => camera.acquire(),
        }
    }

    fn next_frame(&mut self) -> anyhow::Result<VideoFrame> {
        match &mut self.backend {
            CameraBackend::Synthetic(camera) => camera.next_frame(),
            #[cfg(feature = "capture-v4l2")]
            CameraBackend::Device(camera) => camera.next_frame(),
        }
    }

    fn release(&mut self) {
        match &mut self.backend {
            CameraBackend::Synthetic(camera) => camera.release(),
            #[cfg(feature = "capture-v4l2")]
            CameraBackend::Device(camera) => camera.release(),
        }
    }

    fn is_acquired(&self) -> bool {
        match &self.backend {
            CameraBackend::Synthetic(camera) => camera.is_acquired(),
            #[cfg(feature = "capture-v4l2")]
            CameraBackend::Device(camera) => camera.is_acquired(),
        }
    }
}

pub(crate) fn not_acquired(device: &str) -> anyhow::Error {
    anyhow!("capture stream {} is not acquired", device)
}
