use anyhow::Result as AnyResult;
use image::{Rgb, RgbImage};

use super::{not_acquired, CaptureConfig, CaptureStats, FrameInfo, VideoFrame};
use crate::error::Result;

/// Synthetic camera for `stub://` devices.
///
/// Produces a diagonal gradient that scrolls one pixel per frame, so consecutive
/// frames always differ.
pub(super) struct SyntheticCamera {
    config: CaptureConfig,
    acquired: bool,
    frame_count: u64,
}

impl SyntheticCamera {
    pub(super) fn new(config: CaptureConfig) -> Self {
        Self {
            config,
            acquired: false,
            frame_count: 0,
        }
    }

    pub(super) fn device(&self) -> &str {
        &self.config.device
    }

    /// Synthetic sources are always available.
    pub(super) fn acquire(&mut self) -> Result<FrameInfo> {
        self.acquired = true;
        log::info!(
            "CameraSource: acquired {} ({}x{}, synthetic)",
            self.config.device,
            self.config.width,
            self.config.height
        );
        Ok(FrameInfo {
            width: self.config.width,
            height: self.config.height,
        })
    }

    pub(super) fn next_frame(&mut self) -> AnyResult<VideoFrame> {
        if !self.acquired {
            return Err(not_acquired(&self.config.device));
        }
        self.frame_count += 1;
        let shift = self.frame_count;
        let image = RgbImage::from_fn(self.config.width, self.config.height, |x, y| {
            let v = ((x as u64 + y as u64 + shift) % 256) as u8;
            Rgb([v / 2, v / 3, 64 + v / 4])
        });
        Ok(VideoFrame::new(image, self.frame_count))
    }

    pub(super) fn release(&mut self) {
        if self.acquired {
            log::info!("CameraSource: released {}", self.config.device);
        }
        self.acquired = false;
    }

    pub(super) fn is_acquired(&self) -> bool {
        self.acquired
    }

    pub(super) fn stats(&self) -> CaptureStats {
        CaptureStats {
            frames_captured: self.frame_count,
            device: self.config.device.clone(),
        }
    }
}
