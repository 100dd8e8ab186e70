#![cfg(feature = "window")]

use anyhow::{Context, Result};
use minifb::{Key, Window, WindowOptions};

use crate::scheduler::FrameHost;
use crate::surface::RasterCanvas;

/// Desktop window that shows the canvas after every drawn tick.
///
/// Pacing comes from the window's frame limiter. Closing the window or
/// pressing Escape ends the loop.
pub struct WindowHost {
    window: Window,
    buffer: Vec<u32>,
    width: usize,
    height: usize,
    presented: bool,
}

impl WindowHost {
    pub fn new(title: &str, width: usize, height: usize, target_fps: usize) -> Result<Self> {
        let mut window = Window::new(
            title,
            width,
            height,
            WindowOptions {
                resize: false,
                ..WindowOptions::default()
            },
        )
        .context("open overlay window")?;
        window.set_target_fps(target_fps);
        Ok(Self {
            window,
            buffer: vec![0u32; width * height],
            width,
            height,
            presented: false,
        })
    }

    pub fn is_open(&self) -> bool {
        self.window.is_open() && !self.window.is_key_down(Key::Escape)
    }
}

impl FrameHost<RasterCanvas> for WindowHost {
    fn present(&mut self, surface: &RasterCanvas) -> Result<()> {
        surface.write_rgb_buffer(&mut self.buffer);
        self.window
            .update_with_buffer(&self.buffer, self.width, self.height)
            .context("update overlay window")?;
        self.presented = true;
        Ok(())
    }

    fn request_frame(&mut self) -> bool {
        if !self.is_open() {
            return false;
        }
        // Keeps the window responsive on ticks that drew nothing.
        if !std::mem::take(&mut self.presented) {
            self.window.update();
        }
        self.is_open()
    }
}
