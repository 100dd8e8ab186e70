//! Frame scheduler.
//!
//! `RenderLoop` owns every collaborator of the overlay pipeline and drives it
//! one tick at a time:
//! 1. consume a pending architecture change (dispose, then load)
//! 2. read a frame and run the estimator for the active algorithm
//! 3. clear the surface and draw every confident pose
//!
//! Ticks never overlap. Cancellation goes through `StopHandle` and is checked
//! at the top of each tick and again before the host schedules the next one.
//! A failed estimation or frame read skips the tick and the loop carries on;
//! setup and reconfiguration failures end the session.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::capture::{FrameInfo, FrameSource};
use crate::error::{chain_message, OverlayError, Result};
use crate::estimate::{EstimatorHandle, InputParams, MultiParams, PoseEstimator};
use crate::render::{compose_frame, FrameSummary, OverlayGeometry, OverlaySprite};
use crate::stats::FrameStats;
use crate::store::{Algorithm, Architecture, ConfigStore};
use crate::surface::DrawingSurface;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoopState {
    Idle,
    Loading,
    Running,
    Reconfiguring,
    Stopped,
}

impl fmt::Display for LoopState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LoopState::Idle => "idle",
            LoopState::Loading => "loading",
            LoopState::Running => "running",
            LoopState::Reconfiguring => "reconfiguring",
            LoopState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Notifications published to subscribers.
#[derive(Clone, Debug, PartialEq)]
pub enum LoopEvent {
    StateChanged(LoopState),
    PosesDetected { total: usize, confident: usize },
    EstimationFailed(String),
}

/// What a single tick did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TickOutcome {
    Drawn(FrameSummary),
    /// Frame read or estimation failed; the surface was left untouched.
    Skipped,
    Stopped,
}

/// Cloneable cancellation token.
#[derive(Clone, Debug, Default)]
pub struct StopHandle {
    flag: Arc<AtomicBool>,
}

impl StopHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request_stop(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_stop_requested(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Per-frame callback facility.
pub trait FrameHost<S: ?Sized> {
    /// Show the surface after a tick drew to it.
    fn present(&mut self, _surface: &S) -> anyhow::Result<()> {
        Ok(())
    }

    /// Block until the next frame is due. `false` ends the loop.
    fn request_frame(&mut self) -> bool;
}

/// Paces ticks to a fixed rate with `thread::sleep`.
pub struct IntervalHost {
    interval: Duration,
    next_due: Option<Instant>,
}

impl IntervalHost {
    pub fn new(target_fps: u32) -> Self {
        let interval = if target_fps == 0 {
            Duration::ZERO
        } else {
            Duration::from_secs_f64(1.0 / target_fps as f64)
        };
        Self {
            interval,
            next_due: None,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }
}

impl<S: ?Sized> FrameHost<S> for IntervalHost {
    fn request_frame(&mut self) -> bool {
        let now = Instant::now();
        let due = self.next_due.unwrap_or(now + self.interval);
        if due > now {
            thread::sleep(due - now);
        }
        // Late frames reschedule from now instead of bursting to catch up.
        self.next_due = Some(due.max(now) + self.interval);
        true
    }
}

/// Loop options that are not part of the live detection config.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LoopSettings {
    /// Mirror keypoints horizontally (for front-facing cameras).
    pub flip_horizontal: bool,
    pub geometry: OverlayGeometry,
}

impl Default for LoopSettings {
    fn default() -> Self {
        Self {
            flip_horizontal: true,
            geometry: OverlayGeometry::default(),
        }
    }
}

/// The overlay render loop.
pub struct RenderLoop<E, C, S>
where
    E: PoseEstimator,
    C: FrameSource,
    S: DrawingSurface,
{
    store: ConfigStore,
    estimator: E,
    capture: C,
    surface: S,
    sprite: OverlaySprite,
    settings: LoopSettings,
    state: LoopState,
    handle: Option<EstimatorHandle>,
    frame_info: Option<FrameInfo>,
    stop: StopHandle,
    subscribers: Vec<Sender<LoopEvent>>,
    stats: FrameStats,
}

impl<E, C, S> RenderLoop<E, C, S>
where
    E: PoseEstimator,
    C: FrameSource,
    S: DrawingSurface,
{
    pub fn new(
        store: ConfigStore,
        estimator: E,
        capture: C,
        surface: S,
        sprite: OverlaySprite,
        settings: LoopSettings,
    ) -> Self {
        Self {
            store,
            estimator,
            capture,
            surface,
            sprite,
            settings,
            state: LoopState::Idle,
            handle: None,
            frame_info: None,
            stop: StopHandle::new(),
            subscribers: Vec::new(),
            stats: FrameStats::new(),
        }
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Ask the loop to stop at the next tick boundary.
    pub fn release(&self) {
        self.stop.request_stop();
    }

    pub fn store(&self) -> &ConfigStore {
        &self.store
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn estimator(&self) -> &E {
        &self.estimator
    }

    pub fn capture(&self) -> &C {
        &self.capture
    }

    pub fn stats(&self) -> &FrameStats {
        &self.stats
    }

    /// Frame size negotiated at setup.
    pub fn frame_info(&self) -> Option<FrameInfo> {
        self.frame_info
    }

    /// Architecture of the live model, if one is loaded.
    pub fn loaded_architecture(&self) -> Option<Architecture> {
        self.handle.as_ref().map(|handle| handle.architecture())
    }

    /// Receive loop events. Dropped receivers are pruned on the next publish.
    pub fn subscribe(&mut self) -> Receiver<LoopEvent> {
        let (tx, rx) = mpsc::channel();
        self.subscribers.push(tx);
        rx
    }

    /// Acquire capture and load the initial model.
    ///
    /// Capture is acquired on a scoped thread while the model loads. If either
    /// fails, whatever succeeded is released and the loop ends up `Stopped`.
    pub fn setup(&mut self) -> Result<()> {
        if self.state != LoopState::Idle {
            return Err(OverlayError::InvalidState(format!(
                "setup called while {}",
                self.state
            )));
        }
        self.set_state(LoopState::Loading);
        let architecture = self.store.get().input.mobile_net_architecture;
        log::info!(
            "RenderLoop: loading {} model via {} while acquiring {}",
            architecture,
            self.estimator.name(),
            self.capture.name()
        );

        let capture = &mut self.capture;
        let estimator = &mut self.estimator;
        let (acquired, loaded) = thread::scope(|scope| {
            let acquiring = scope.spawn(move || capture.acquire());
            let loaded = estimator.load(architecture);
            let acquired = acquiring.join().unwrap_or_else(|_| {
                Err(OverlayError::CaptureUnavailable(
                    "capture thread panicked".to_string(),
                ))
            });
            (acquired, loaded)
        });

        match (acquired, loaded) {
            (Ok(info), Ok(handle)) => {
                log::info!(
                    "RenderLoop: ready ({}x{}, model {})",
                    info.width,
                    info.height,
                    handle.architecture()
                );
                let (cw, ch) = (self.surface.width(), self.surface.height());
                if (info.width, info.height) != (cw, ch) {
                    log::info!(
                        "RenderLoop: scaling {}x{} frames onto {}x{} canvas",
                        info.width,
                        info.height,
                        cw,
                        ch
                    );
                }
                self.frame_info = Some(info);
                self.handle = Some(handle);
                self.set_state(LoopState::Running);
                Ok(())
            }
            (acquired, loaded) => {
                let load_error = match loaded {
                    Ok(handle) => {
                        if let Err(err) = self.estimator.dispose(handle) {
                            log::warn!("RenderLoop: dispose after failed setup: {:#}", err);
                        }
                        None
                    }
                    Err(err) => Some(OverlayError::ModelLoad {
                        architecture,
                        reason: chain_message(&err),
                    }),
                };
                let capture_error = match acquired {
                    Ok(_) => {
                        self.capture.release();
                        None
                    }
                    Err(err) => Some(err),
                };
                self.set_state(LoopState::Stopped);
                let err = capture_error.or(load_error).unwrap_or_else(|| {
                    OverlayError::InvalidState("setup failed without an error".to_string())
                });
                log::error!("RenderLoop: setup failed: {}", err);
                Err(err)
            }
        }
    }

    /// Run one frame.
    pub fn tick(&mut self) -> Result<TickOutcome> {
        if self.stop.is_stop_requested() {
            self.teardown();
            return Ok(TickOutcome::Stopped);
        }
        match self.state {
            LoopState::Running => {}
            LoopState::Stopped => return Ok(TickOutcome::Stopped),
            other => {
                return Err(OverlayError::InvalidState(format!("tick while {}", other)));
            }
        }

        let tick = self.store.begin_tick();
        if let Some(architecture) = tick.pending_architecture {
            if let Err(err) = self.reconfigure(architecture) {
                log::error!("RenderLoop: {}", err);
                self.teardown();
                return Err(err);
            }
        }

        let frame = match self.capture.next_frame() {
            Ok(frame) => frame,
            Err(err) => return Ok(self.skip_tick(err.context("read frame"))),
        };
        let Some(handle) = self.handle.as_ref() else {
            return Err(OverlayError::InvalidState(
                "running without a loaded model".to_string(),
            ));
        };

        let config = &tick.config;
        let input = InputParams::from_config(config, self.settings.flip_horizontal);
        let estimated = match config.algorithm {
            Algorithm::Single => self
                .estimator
                .estimate_single(handle, &frame, &input)
                .map(|pose| vec![pose]),
            Algorithm::Multi => self.estimator.estimate_multiple(
                handle,
                &frame,
                &input,
                &MultiParams::from_config(config),
            ),
        };
        let poses = match estimated {
            Ok(poses) => poses,
            Err(err) => return Ok(self.skip_tick(err)),
        };

        let summary = compose_frame(
            &mut self.surface,
            &frame,
            &poses,
            config.thresholds(),
            &config.output,
            &self.sprite,
            &self.settings.geometry,
        );
        self.stats.record_drawn(summary.confident > 0);
        self.publish(LoopEvent::PosesDetected {
            total: summary.total,
            confident: summary.confident,
        });
        Ok(TickOutcome::Drawn(summary))
    }

    /// Drive ticks through `host` until stopped.
    ///
    /// Tears the loop down before returning, on success and on error.
    pub fn run<H: FrameHost<S>>(&mut self, host: &mut H) -> Result<()> {
        loop {
            match self.tick()? {
                TickOutcome::Stopped => return Ok(()),
                TickOutcome::Drawn(_) => {
                    if let Err(err) = host.present(&self.surface) {
                        log::warn!("RenderLoop: present failed: {:#}", err);
                    }
                }
                TickOutcome::Skipped => {}
            }
            self.stats.maybe_log(self.capture.name());

            if self.stop.is_stop_requested() || !host.request_frame() {
                self.teardown();
                return Ok(());
            }
        }
    }

    /// Dispose the model, release capture and move to `Stopped`. Idempotent.
    pub fn teardown(&mut self) {
        if let Some(handle) = self.handle.take() {
            let architecture = handle.architecture();
            match self.estimator.dispose(handle) {
                Ok(()) => log::info!("RenderLoop: disposed {} model", architecture),
                Err(err) => log::warn!("RenderLoop: dispose failed: {:#}", err),
            }
        }
        self.capture.release();
        if self.state != LoopState::Stopped {
            self.set_state(LoopState::Stopped);
        }
    }

    fn reconfigure(&mut self, architecture: Architecture) -> Result<()> {
        self.set_state(LoopState::Reconfiguring);
        log::info!("RenderLoop: switching model to {}", architecture);
        if let Some(old) = self.handle.take() {
            let previous = old.architecture();
            self.estimator.dispose(old).map_err(|err| {
                OverlayError::Reconfigure(format!(
                    "dispose {} model: {}",
                    previous,
                    chain_message(&err)
                ))
            })?;
        }
        let handle = self.estimator.load(architecture).map_err(|err| {
            OverlayError::Reconfigure(format!(
                "load {} model: {}",
                architecture,
                chain_message(&err)
            ))
        })?;
        self.handle = Some(handle);
        self.stats.record_reconfiguration();
        self.set_state(LoopState::Running);
        Ok(())
    }

    fn skip_tick(&mut self, err: anyhow::Error) -> TickOutcome {
        let failure = OverlayError::Estimation(chain_message(&err));
        log::warn!("RenderLoop: {}", failure);
        self.stats.record_skipped();
        self.publish(LoopEvent::EstimationFailed(chain_message(&err)));
        TickOutcome::Skipped
    }

    fn set_state(&mut self, state: LoopState) {
        log::debug!("RenderLoop: {} -> {}", self.state, state);
        self.state = state;
        self.publish(LoopEvent::StateChanged(state));
    }

    fn publish(&mut self, event: LoopEvent) {
        self.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }
}

impl<E, C, S> Drop for RenderLoop<E, C, S>
where
    E: PoseEstimator,
    C: FrameSource,
    S: DrawingSurface,
{
    fn drop(&mut self) {
        self.teardown();
    }
}
