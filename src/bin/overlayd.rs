//! overlayd - live pose overlay daemon
//!
//! This daemon:
//! 1. Loads settings (file, env, then CLI overrides)
//! 2. Preloads the overlay image
//! 3. Acquires the camera while the pose model loads
//! 4. Draws every confident pose with the overlay pinned to its forearm
//! 5. Accepts live detection changes on stdin (`set`, `get`, `fields`, `quit`)
//!
//! With `--still <image>` it instead estimates one pose on that image, draws
//! it and writes the result to `--output`.

use anyhow::{Context, Result};
use clap::Parser;
use std::io::{BufRead, IsTerminal};
use std::path::{Path, PathBuf};
use std::thread;

#[path = "../ui.rs"]
mod ui;

use pose_overlay::{
    build_estimator,
    config::{OverlaydConfig, CONFIG_ENV},
    panel::{apply_command, parse_command},
    estimate_still_pose, render_still_pose, CameraSource, ConfigStore, ImagePreloader,
    OverlaySprite, RasterCanvas, RenderLoop, StopHandle, STILL_CANVAS_SIZE,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "Draw an image pinned to detected forearms")]
struct Args {
    /// Settings file (TOML, or JSON when the extension is .json).
    #[arg(long, env = CONFIG_ENV)]
    config: Option<PathBuf>,
    /// Capture device (`stub://<name>` or a V4L2 node).
    #[arg(long)]
    camera: Option<String>,
    /// Estimator backend (synthetic, tract).
    #[arg(long)]
    backend: Option<String>,
    /// Overlay image path or URL.
    #[arg(long)]
    image: Option<String>,
    /// Target frame rate.
    #[arg(long)]
    fps: Option<u32>,
    /// Show the canvas in a desktop window (feature: window).
    #[arg(long)]
    window: bool,
    /// Output mode for setup progress: auto, plain, pretty.
    #[arg(long, default_value = "auto", value_name = "MODE")]
    ui: String,
    /// Estimate one pose on this image (path or URL) instead of running the camera loop.
    #[arg(long, value_name = "IMAGE")]
    still: Option<String>,
    /// Where `--still` writes the annotated image (PNG).
    #[arg(long, default_value = "still-pose.png", value_name = "PATH")]
    output: PathBuf,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let ui = ui::Ui::from_flag(&args.ui, std::io::stderr().is_terminal());

    let cfg = ui.run("Load settings", || load_settings(&args))?;
    if let Some(reference) = &args.still {
        return run_still(&ui, &cfg, reference, &args.output);
    }
    let image = ui.run("Preload overlay image", || {
        ImagePreloader::new().preload(&cfg.overlay.image)
    })?;
    let sprite = OverlaySprite::new(image).with_placement(
        cfg.overlay.offset,
        cfg.overlay.width,
        cfg.overlay.height,
    );

    let store = ConfigStore::new(cfg.detection.clone())?;
    let estimator = build_estimator(&cfg.estimator_settings())?;
    let capture = CameraSource::new(cfg.capture_config())?;
    let surface = RasterCanvas::new(cfg.canvas.width, cfg.canvas.height);
    let mut render = RenderLoop::new(
        store.clone(),
        estimator,
        capture,
        surface,
        sprite,
        cfg.loop_settings(),
    );
    ui.run("Load model and acquire camera", || render.setup())
        .context("set up render loop")?;

    let stop = render.stop_handle();
    let on_signal = stop.clone();
    ctrlc::set_handler(move || on_signal.request_stop()).context("set Ctrl-C handler")?;
    spawn_panel(store, stop);

    log::info!(
        "overlayd running ({} at {} fps, Ctrl-C or `quit` to stop)",
        cfg.camera.device,
        cfg.camera.target_fps
    );

    #[cfg(feature = "window")]
    {
        if args.window {
            let mut host = pose_overlay::WindowHost::new(
                "overlayd",
                cfg.canvas.width as usize,
                cfg.canvas.height as usize,
                cfg.camera.target_fps as usize,
            )?;
            render.run(&mut host)?;
            log_summary(render.stats());
            return Ok(());
        }
    }
    #[cfg(not(feature = "window"))]
    {
        if args.window {
            log::warn!("--window needs the window feature; running headless");
        }
    }

    let mut host = pose_overlay::IntervalHost::new(cfg.camera.target_fps);
    render.run(&mut host)?;
    log_summary(render.stats());
    Ok(())
}

fn run_still(ui: &ui::Ui, cfg: &OverlaydConfig, reference: &str, output: &Path) -> Result<()> {
    let image = ui.run("Load still image", || ImagePreloader::new().preload(reference))?;
    let rgb = image::DynamicImage::ImageRgba8(image.as_ref().clone()).to_rgb8();
    let mut estimator = build_estimator(&cfg.estimator_settings())?;
    let architecture = cfg.detection.input.mobile_net_architecture;
    let pose = ui.run("Estimate pose", || {
        estimate_still_pose(&mut estimator, architecture, rgb.clone())
    })?;

    let mut canvas = RasterCanvas::new(STILL_CANVAS_SIZE, STILL_CANVAS_SIZE);
    let summary = render_still_pose(&mut canvas, &rgb, &pose);
    canvas
        .pixels()
        .save(output)
        .with_context(|| format!("write {}", output.display()))?;
    log::info!(
        "overlayd: still pose (score {:.3}, {} points) written to {}",
        pose.score(),
        summary.points,
        output.display()
    );
    Ok(())
}

fn load_settings(args: &Args) -> Result<OverlaydConfig> {
    let mut cfg = OverlaydConfig::load_from(args.config.as_deref())?;
    if let Some(camera) = &args.camera {
        cfg.camera.device = camera.clone();
    }
    if let Some(backend) = &args.backend {
        cfg.model.backend = backend.parse()?;
    }
    if let Some(image) = &args.image {
        cfg.overlay.image = image.clone();
    }
    if let Some(fps) = args.fps {
        cfg.camera.target_fps = fps;
    }
    cfg.validate()?;
    Ok(cfg)
}

/// Read panel commands from stdin until EOF.
fn spawn_panel(store: ConfigStore, stop: StopHandle) {
    thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            let reply = parse_command(&line).and_then(|command| match command {
                Some(command) => apply_command(&store, &stop, command).map(Some),
                None => Ok(None),
            });
            match reply {
                Ok(Some(reply)) => println!("{reply}"),
                Ok(None) => {}
                Err(err) => println!("error: {err}"),
            }
            if stop.is_stop_requested() {
                break;
            }
        }
    });
}

fn log_summary(stats: &pose_overlay::FrameStats) {
    log::info!(
        "overlayd stopped: {} ticks, {} drawn, {} skipped, {} model switches",
        stats.ticks,
        stats.frames_drawn,
        stats.skipped_frames,
        stats.reconfigurations
    );
}
