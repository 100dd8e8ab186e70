use anyhow::{anyhow, Context, Result as AnyResult};
use image::RgbImage;
use ouroboros::self_referencing;
use std::io;

use super::{not_acquired, CaptureConfig, CaptureStats, FrameInfo, VideoFrame};
use crate::error::{OverlayError, Result};

/// V4L2 camera using an mmap RGB3 stream.
pub(super) struct DeviceCamera {
    config: CaptureConfig,
    state: Option<DeviceState>,
    frame_count: u64,
    active_width: u32,
    active_height: u32,
}

#[self_referencing]
struct DeviceState {
    device: v4l::Device,
    #[borrows(mut device)]
    #[covariant]
    stream: v4l::prelude::MmapStream<'this, v4l::Device>,
}

fn open_error(device: &str, err: io::Error) -> OverlayError {
    if err.kind() == io::ErrorKind::PermissionDenied {
        OverlayError::CameraPermissionDenied(format!("{}: {}", device, err))
    } else {
        OverlayError::CaptureUnavailable(format!("{}: {}", device, err))
    }
}

impl DeviceCamera {
    pub(super) fn new(config: CaptureConfig) -> Self {
        Self {
            active_width: config.width,
            active_height: config.height,
            config,
            state: None,
            frame_count: 0,
        }
    }

    pub(super) fn device(&self) -> &str {
        &self.config.device
    }

    pub(super) fn acquire(&mut self) -> Result<FrameInfo> {
        use v4l::buffer::Type;
        use v4l::video::Capture;

        let device_path = self.config.device.clone();
        let mut device =
            v4l::Device::with_path(&device_path).map_err(|e| open_error(&device_path, e))?;
        let mut format = device
            .format()
            .map_err(|e| open_error(&device_path, e))?;
        format.width = self.config.width;
        format.height = self.config.height;
        format.fourcc = v4l::FourCC::new(b"RGB3");

        let format = match device.set_format(&format) {
            Ok(format) => format,
            Err(err) => {
                log::warn!("CameraSource: failed to set format on {}: {}", device_path, err);
                device.format().map_err(|e| open_error(&device_path, e))?
            }
        };
        if format.fourcc != v4l::FourCC::new(b"RGB3") {
            return Err(OverlayError::CaptureUnavailable(format!(
                "{} does not offer RGB3 frames (got {})",
                device_path, format.fourcc
            )));
        }

        if self.config.target_fps > 0 {
            let params = v4l::video::capture::Parameters::with_fps(self.config.target_fps);
            if let Err(err) = device.set_params(&params) {
                log::warn!("CameraSource: failed to set fps on {}: {}", device_path, err);
            }
        }

        let state = DeviceStateTryBuilder {
            device,
            stream_builder: |device| {
                v4l::prelude::MmapStream::with_buffers(device, Type::VideoCapture, 4)
            },
        }
        .try_build()
        .map_err(|e| open_error(&device_path, e))?;

        self.active_width = format.width;
        self.active_height = format.height;
        self.state = Some(state);

        log::info!(
            "CameraSource: acquired {} ({}x{})",
            device_path,
            self.active_width,
            self.active_height
        );
        Ok(FrameInfo {
            width: self.active_width,
            height: self.active_height,
        })
    }

    pub(super) fn next_frame(&mut self) -> AnyResult<VideoFrame> {
        use v4l::io::traits::CaptureStream;

        let Some(state) = self.state.as_mut() else {
            return Err(not_acquired(&self.config.device));
        };
        let (width, height) = (self.active_width, self.active_height);
        let pixels = state
            .with_mut(|fields| fields.stream.next().map(|(buf, _meta)| buf.to_vec()))
            .context("capture v4l2 frame")?;

        let image = RgbImage::from_raw(width, height, pixels).ok_or_else(|| {
            anyhow!("v4l2 buffer does not hold a {}x{} RGB frame", width, height)
        })?;
        self.frame_count += 1;
        Ok(VideoFrame::new(image, self.frame_count))
    }

    pub(super) fn release(&mut self) {
        if self.state.take().is_some() {
            log::info!("CameraSource: released {}", self.config.device);
        }
    }

    pub(super) fn is_acquired(&self) -> bool {
        self.state.is_some()
    }

    pub(super) fn stats(&self) -> CaptureStats {
        CaptureStats {
            frames_captured: self.frame_count,
            device: self.config.device.clone(),
        }
    }
}
