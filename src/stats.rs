//! Render loop counters and the periodic health line.

use std::time::{Duration, Instant};

/// Interval between health log lines.
pub const HEALTH_LOG_INTERVAL: Duration = Duration::from_secs(5);

/// Cumulative loop counters plus a rolling FPS window.
#[derive(Clone, Debug)]
pub struct FrameStats {
    pub ticks: u64,
    pub frames_drawn: u64,
    pub confident_frames: u64,
    pub skipped_frames: u64,
    pub reconfigurations: u64,
    window_start: Instant,
    window_frames: u64,
    last_fps: f32,
    last_health_log: Instant,
}

impl FrameStats {
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            ticks: 0,
            frames_drawn: 0,
            confident_frames: 0,
            skipped_frames: 0,
            reconfigurations: 0,
            window_start: now,
            window_frames: 0,
            last_fps: 0.0,
            last_health_log: now,
        }
    }

    pub fn record_drawn(&mut self, confident: bool) {
        self.ticks += 1;
        self.frames_drawn += 1;
        if confident {
            self.confident_frames += 1;
        }
        self.window_frames += 1;
    }

    pub fn record_skipped(&mut self) {
        self.ticks += 1;
        self.skipped_frames += 1;
    }

    pub fn record_reconfiguration(&mut self) {
        self.reconfigurations += 1;
    }

    /// Drawn frames per second over the last completed window.
    pub fn fps(&self) -> f32 {
        self.last_fps
    }

    /// Log a health line if `HEALTH_LOG_INTERVAL` has elapsed.
    pub fn maybe_log(&mut self, source: &str) {
        if self.last_health_log.elapsed() < HEALTH_LOG_INTERVAL {
            return;
        }
        self.roll_window();
        log::info!(
            "render health source={} ticks={} drawn={} confident={} skipped={} fps={:.1}",
            source,
            self.ticks,
            self.frames_drawn,
            self.confident_frames,
            self.skipped_frames,
            self.last_fps
        );
        self.last_health_log = Instant::now();
    }

    fn roll_window(&mut self) {
        let elapsed = self.window_start.elapsed().as_secs_f32();
        if elapsed > 0.0 {
            self.last_fps = self.window_frames as f32 / elapsed;
        }
        self.window_start = Instant::now();
        self.window_frames = 0;
    }
}

impl Default for FrameStats {
    fn default() -> Self {
        Self::new()
    }
}
