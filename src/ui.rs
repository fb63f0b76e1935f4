//! Terminal feedback: startup stages and the live status line.
//!
//! Pretty output (spinners) is only used when stderr is a terminal; otherwise
//! everything degrades to plain `eprintln!` lines that are safe to pipe.

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::io::IsTerminal;
use std::str::FromStr;
use std::time::{Duration, Instant};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum UiMode {
    #[default]
    Auto,
    Plain,
    Pretty,
}

impl FromStr for UiMode {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "plain" => Ok(Self::Plain),
            "pretty" => Ok(Self::Pretty),
            other => Err(anyhow::anyhow!(
                "unknown ui mode '{}' (expected auto, plain or pretty)",
                other
            )),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Ui {
    mode: UiMode,
    is_tty: bool,
}

impl Ui {
    pub fn new(mode: UiMode, is_tty: bool) -> Self {
        Self { mode, is_tty }
    }

    /// Detect whether stderr is a terminal.
    pub fn detect(mode: UiMode) -> Self {
        Self::new(mode, std::io::stderr().is_terminal())
    }

    pub fn is_pretty(&self) -> bool {
        self.is_tty
            && match self.mode {
                UiMode::Auto | UiMode::Pretty => true,
                UiMode::Plain => false,
            }
    }

    pub fn stage(&self, name: &str) -> StageGuard {
        if self.is_pretty() {
            let spinner = ProgressBar::new_spinner();
            spinner.set_draw_target(ProgressDrawTarget::stderr());
            spinner.enable_steady_tick(Duration::from_millis(120));
            let style = ProgressStyle::with_template("{spinner} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner());
            spinner.set_style(style);
            spinner.set_message(format!("{name}…"));
            StageGuard::new(name.to_string(), Some(spinner))
        } else {
            eprintln!("==> {}", name);
            StageGuard::new(name.to_string(), None)
        }
    }

    pub fn status_line(&self, title: &str) -> StatusLine {
        if self.is_pretty() {
            let bar = ProgressBar::new_spinner();
            bar.set_draw_target(ProgressDrawTarget::stderr());
            let style = ProgressStyle::with_template("{prefix:.bold} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner());
            bar.set_style(style);
            bar.set_prefix(title.to_string());
            StatusLine::new(Some(bar), false)
        } else {
            StatusLine::new(None, true)
        }
    }
}

/// Reports a startup stage; prints the elapsed time when dropped.
pub struct StageGuard {
    name: String,
    start: Instant,
    spinner: Option<ProgressBar>,
}

impl StageGuard {
    fn new(name: String, spinner: Option<ProgressBar>) -> Self {
        Self {
            name,
            start: Instant::now(),
            spinner,
        }
    }
}

impl Drop for StageGuard {
    fn drop(&mut self) {
        let elapsed = self.start.elapsed();
        let message = format!("✔ {} ({})", self.name, format_duration(elapsed));
        if let Some(spinner) = &self.spinner {
            spinner.finish_with_message(message);
        } else {
            eprintln!("{message}");
        }
    }
}

/// Single-line status display, redrawn in place on a terminal.
///
/// In plain mode a line is printed only when the text changes.
pub struct StatusLine {
    bar: Option<ProgressBar>,
    echo: bool,
    current: String,
    updates: u64,
}

impl StatusLine {
    fn new(bar: Option<ProgressBar>, echo: bool) -> Self {
        Self {
            bar,
            echo,
            current: String::new(),
            updates: 0,
        }
    }

    /// Plain status line that never draws.
    pub fn hidden() -> Self {
        Self::new(None, false)
    }

    pub fn set(&mut self, text: &str) {
        self.updates += 1;
        if self.current == text {
            return;
        }
        self.current = text.to_string();
        match &self.bar {
            Some(bar) => bar.set_message(self.current.clone()),
            None if self.echo => eprintln!("{}", self.current),
            None => {}
        }
    }

    pub fn current(&self) -> &str {
        &self.current
    }

    pub fn updates(&self) -> u64 {
        self.updates
    }
}

impl Drop for StatusLine {
    fn drop(&mut self) {
        if let Some(bar) = &self.bar {
            bar.finish();
        }
    }
}

pub(crate) fn format_duration(duration: Duration) -> String {
    if duration.as_secs() >= 1 {
        format!("{:.2}s", duration.as_secs_f64())
    } else {
        format!("{}ms", duration.as_millis())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pretty_output_requires_a_terminal() {
        assert!(!Ui::new(UiMode::Pretty, false).is_pretty());
        assert!(Ui::new(UiMode::Auto, true).is_pretty());
        assert!(!Ui::new(UiMode::Plain, true).is_pretty());
    }

    #[test]
    fn ui_mode_parses_case_insensitively() {
        assert_eq!("Plain".parse::<UiMode>().ok(), Some(UiMode::Plain));
        assert!("fancy".parse::<UiMode>().is_err());
    }

    #[test]
    fn status_line_tracks_latest_text() {
        let mut status = StatusLine::hidden();
        status.set("a | Network 10 FPS");
        status.set("a | Network 10 FPS");
        status.set("a | Network 12 FPS");
        assert_eq!(status.current(), "a | Network 12 FPS");
        assert_eq!(status.updates(), 3);
    }

    #[test]
    fn durations_switch_units_at_one_second() {
        assert_eq!(format_duration(Duration::from_millis(250)), "250ms");
        assert_eq!(format_duration(Duration::from_millis(1500)), "1.50s");
    }
}
