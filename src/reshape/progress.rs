//! Progress display for copy operations

use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// Receives copy progress, measured in k-point records
pub trait ProgressReporter: Send {
    /// Begin tracking `total` records
    fn start(&mut self, total: u64);

    /// Number of records copied so far
    fn set_position(&mut self, position: u64);

    /// Copy phase is over
    fn finish(&mut self);
}

/// Progress bar on the terminal
#[derive(Default)]
pub struct TerminalProgress {
    bar: Option<ProgressBar>,
}

impl TerminalProgress {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ProgressReporter for TerminalProgress {
    fn start(&mut self, total: u64) {
        let bar = ProgressBar::new(total);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} ({eta})")
        {
            bar.set_style(style.progress_chars("##-"));
        }
        bar.enable_steady_tick(Duration::from_millis(100));
        self.bar = Some(bar);
    }

    fn set_position(&mut self, position: u64) {
        if let Some(bar) = &self.bar {
            bar.set_position(position);
        }
    }

    fn finish(&mut self) {
        if let Some(bar) = self.bar.take() {
            bar.finish();
        }
    }
}

/// Discards all progress, used for `--quiet`
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn start(&mut self, _total: u64) {}

    fn set_position(&mut self, _position: u64) {}

    fn finish(&mut self) {}
}

/// Pick the reporter for the current output mode
pub fn reporter(quiet: bool) -> Box<dyn ProgressReporter> {
    if quiet {
        Box::new(SilentProgress)
    } else {
        Box::new(TerminalProgress::new())
    }
}
