//! Console progress bars for training phases

use indicatif::{ProgressBar, ProgressStyle};

/// Progress bar over the batches of one phase
pub struct EpochProgress {
    bar: ProgressBar,
}

impl EpochProgress {
    /// Create a bar with `total` batches, hidden when `quiet`
    pub fn new(description: &str, total: usize, quiet: bool) -> Self {
        let bar = if quiet {
            ProgressBar::hidden()
        } else {
            ProgressBar::new(total as u64)
        };

        let style = ProgressStyle::default_bar()
            .template("{prefix} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▇▆▅▄▃▂▁  ");
        bar.set_style(style);
        bar.set_prefix(description.to_string());

        Self { bar }
    }

    /// Advance one batch and show the running metrics
    pub fn advance(&self, loss: f64, accuracy: f64) {
        self.bar
            .set_message(format!("loss={:.6} acc={:.6}", loss, accuracy));
        self.bar.inc(1);
    }

    /// Finish the bar, leaving the last state on screen
    pub fn finish(&self) {
        self.bar.finish();
    }
}
