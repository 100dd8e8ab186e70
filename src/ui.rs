use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::time::{Duration, Instant};

/// How setup progress is written to stderr.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Progress {
    /// Animated spinner per stage.
    Spinner,
    /// One line when a stage starts and one when it ends.
    Lines,
}

#[derive(Clone, Copy, Debug)]
pub struct Ui {
    progress: Progress,
}

impl Ui {
    /// `--ui auto` picks the spinner only when stderr is a terminal.
    pub fn from_flag(flag: &str, stderr_is_tty: bool) -> Self {
        let progress = match flag {
            "plain" => Progress::Lines,
            "pretty" if stderr_is_tty => Progress::Spinner,
            "auto" if stderr_is_tty => Progress::Spinner,
            _ => Progress::Lines,
        };
        Self { progress }
    }

    /// Run one setup step, reporting its outcome and duration.
    pub fn run<T, E>(&self, label: &str, step: impl FnOnce() -> Result<T, E>) -> Result<T, E> {
        let started = Instant::now();
        let spinner = match self.progress {
            Progress::Spinner => Some(spinner(label)),
            Progress::Lines => {
                eprintln!("==> {label}");
                None
            }
        };

        let result = step();
        let line = format!(
            "{} {label} ({})",
            if result.is_ok() { '✔' } else { '✘' },
            elapsed(started.elapsed())
        );
        match spinner {
            Some(bar) if result.is_ok() => bar.finish_with_message(line),
            Some(bar) => bar.abandon_with_message(line),
            None => eprintln!("{line}"),
        }
        result
    }
}

fn spinner(label: &str) -> ProgressBar {
    let bar = ProgressBar::new_spinner();
    bar.set_draw_target(ProgressDrawTarget::stderr());
    if let Ok(style) = ProgressStyle::with_template("{spinner:.cyan} {msg} [{elapsed}]") {
        bar.set_style(style);
    }
    bar.set_message(format!("{label}…"));
    bar.enable_steady_tick(Duration::from_millis(100));
    bar
}

fn elapsed(duration: Duration) -> String {
    match duration.as_millis() {
        ms if ms < 1000 => format!("{ms}ms"),
        _ => format!("{:.2}s", duration.as_secs_f64()),
    }
}
