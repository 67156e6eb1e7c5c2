//! Console progress for long-running commands.
//!
//! A [`Progress`] owns its own start time and rendering mode, so the engines
//! that drive it carry no hidden console state. On a TTY it renders an
//! indicatif bar; otherwise it prints a plain line for the first item, every
//! hundredth item, and the last one.
//!
//! Record lines (`Uploaded: ...`) go to stdout so a redirected run log can be
//! fed back into `reconcile`. Diagnostics go through `tracing` on stderr.

use std::io::IsTerminal;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use indicatif::{ProgressBar, ProgressStyle};

const PLAIN_EVERY: u64 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Bar,
    Plain,
    Silent,
}

#[derive(Debug)]
pub struct Progress {
    label: &'static str,
    mode: Mode,
    bar: ProgressBar,
    started: Instant,
    /// Record lines swallowed in silent mode.
    captured: Mutex<Vec<String>>,
}

impl Progress {
    /// Bar when stdout is a terminal and bars are not disabled, plain lines otherwise.
    pub fn new(label: &'static str, no_progress_bar: bool) -> Self {
        if no_progress_bar || !std::io::stdout().is_terminal() {
            return Self::with_mode(label, Mode::Plain, ProgressBar::hidden());
        }
        let pb = ProgressBar::new(0);
        pb.set_style(
            ProgressStyle::with_template(
                "{prefix} [{elapsed_precise}] [{bar:30.cyan/blue}] {pos}/{len} ({eta}) {msg}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> "),
        );
        pb.set_prefix(label);
        Self::with_mode(label, Mode::Bar, pb)
    }

    /// No output at all.
    #[cfg(test)]
    pub fn silent(label: &'static str) -> Self {
        Self::with_mode(label, Mode::Silent, ProgressBar::hidden())
    }

    fn with_mode(label: &'static str, mode: Mode, bar: ProgressBar) -> Self {
        Self {
            label,
            mode,
            bar,
            started: Instant::now(),
            captured: Mutex::new(Vec::new()),
        }
    }

    /// Report that `current` of `total` items are done. The total may grow
    /// between calls when work is re-queued.
    pub fn update(&self, current: u64, total: u64) {
        if total == 0 {
            return;
        }
        match self.mode {
            Mode::Bar => {
                self.bar.set_length(total);
                self.bar.set_position(current);
            }
            Mode::Plain => {
                if current == 1 || current == total || current % PLAIN_EVERY == 0 {
                    println!(
                        "{}",
                        plain_line(self.label, current, total, self.started.elapsed())
                    );
                }
            }
            Mode::Silent => {}
        }
    }

    pub fn set_message(&self, msg: impl Into<String>) {
        if self.mode == Mode::Bar {
            self.bar.set_message(msg.into());
        }
    }

    /// Print a record line to stdout without tearing the bar.
    pub fn record(&self, line: &str) {
        match self.mode {
            Mode::Bar => self.bar.suspend(|| println!("{line}")),
            Mode::Plain => println!("{line}"),
            Mode::Silent => {
                if let Ok(mut captured) = self.captured.lock() {
                    captured.push(line.to_string());
                }
            }
        }
    }

    /// Record lines seen by a silent reporter.
    #[cfg(test)]
    pub fn recorded(&self) -> Vec<String> {
        self.captured.lock().unwrap().clone()
    }

    /// Run `f` with the bar hidden, for emitting `tracing` events.
    pub fn suspend<F: FnOnce() -> R, R>(&self, f: F) -> R {
        self.bar.suspend(f)
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

fn plain_line(label: &str, current: u64, total: u64, elapsed: Duration) -> String {
    let ratio = (current as f64 / total as f64).clamp(0.0, 1.0);
    format!(
        "{}: {}/{} ({:.1}%) elapsed {}",
        label,
        current,
        total,
        ratio * 100.0,
        format_duration(elapsed)
    )
}

pub fn format_duration(d: Duration) -> String {
    let total_secs = d.as_secs();
    let hours = total_secs / 3600;
    let mins = (total_secs % 3600) / 60;
    let secs = total_secs % 60;

    if hours > 0 {
        format!("{}h {:02}m {:02}s", hours, mins, secs)
    } else if mins > 0 {
        format!("{}m {:02}s", mins, secs)
    } else {
        format!("{}s", secs)
    }
}
