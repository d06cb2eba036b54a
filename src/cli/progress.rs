//! Progress display for pipeline runs.

use indicatif::{ProgressBar, ProgressStyle};

/// One bar per cycle tracking recognition jobs.
pub struct RecognitionProgress {
    bar: Option<ProgressBar>,
}

impl RecognitionProgress {
    pub fn new() -> Self {
        Self { bar: None }
    }

    /// Start a bar for `total` jobs, replacing the previous one.
    pub fn start(&mut self, label: &str, total: usize) {
        self.finish();
        let bar = ProgressBar::new(total as u64);
        bar.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-"),
        );
        bar.set_message(label.to_string());
        self.bar = Some(bar);
    }

    pub fn inc(&self) {
        if let Some(ref bar) = self.bar {
            bar.inc(1);
        }
    }

    /// Print a line without corrupting the bar.
    pub fn println(&self, line: &str) {
        match self.bar {
            Some(ref bar) => bar.println(line),
            None => eprintln!("{}", line),
        }
    }

    pub fn finish(&mut self) {
        if let Some(bar) = self.bar.take() {
            bar.finish_and_clear();
        }
    }
}
