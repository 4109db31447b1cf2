//! Epoch-level metric aggregation
//!
//! Each phase accumulates `loss / N` and `(1 - loss) / N` per batch, where `N`
//! is the number of batches the loader reports. After a full pass the sums are
//! the arithmetic means of the batch values.

use serde::{Deserialize, Serialize};

/// Running means for one training or validation pass
#[derive(Debug, Clone, Copy)]
pub struct PhaseAccumulator {
    num_batches: usize,
    loss: f64,
    accuracy: f64,
    seen: usize,
}

impl PhaseAccumulator {
    /// Start a pass over a loader of `num_batches` batches
    pub fn new(num_batches: usize) -> Self {
        Self {
            num_batches,
            loss: 0.0,
            accuracy: 0.0,
            seen: 0,
        }
    }

    /// Add one batch loss
    pub fn add(&mut self, batch_loss: f64) {
        let n = self.num_batches.max(1) as f64;
        self.loss += batch_loss / n;
        self.accuracy += (1.0 - batch_loss) / n;
        self.seen += 1;
    }

    /// Batches added so far
    pub fn seen(&self) -> usize {
        self.seen
    }

    /// Current partial sums
    pub fn current(&self) -> PhaseMetrics {
        PhaseMetrics {
            loss: self.loss,
            accuracy: self.accuracy,
        }
    }

    /// Metrics of the finished pass
    pub fn finish(self) -> PhaseMetrics {
        self.current()
    }
}

/// Loss and accuracy of one pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PhaseMetrics {
    pub loss: f64,
    pub accuracy: f64,
}

/// Metrics recorded for one epoch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochSummary {
    /// One-based epoch number
    pub epoch: usize,
    pub train: PhaseMetrics,
    pub validation: PhaseMetrics,
    /// Learning rate after the scheduler step
    pub learning_rate: f64,
    /// Optimizer steps skipped by the loss scaler during the epoch
    pub skipped_steps: usize,
}

impl EpochSummary {
    /// Single-line report written to the console and the run log
    pub fn log_line(&self, timestamp: &str) -> String {
        format!(
            "[{}] Epoch {} - loss : {:.4} - acc: {:.4} - val_loss : {:.4} - val_acc: {:.4}",
            timestamp,
            self.epoch,
            self.train.loss,
            self.train.accuracy,
            self.validation.loss,
            self.validation.accuracy
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_running_mean_equals_arithmetic_mean() {
        let losses = [0.42, 0.37, 0.55, 0.31];
        let mut acc = PhaseAccumulator::new(losses.len());
        for loss in losses {
            acc.add(loss);
        }
        let metrics = acc.finish();

        let mean = losses.iter().sum::<f64>() / losses.len() as f64;
        assert_relative_eq!(metrics.loss, mean, epsilon = 1e-12);
        assert_relative_eq!(metrics.accuracy, 1.0 - metrics.loss, epsilon = 1e-12);
    }

    #[test]
    fn test_empty_pass_is_zero() {
        let metrics = PhaseAccumulator::new(0).finish();
        assert_eq!(metrics, PhaseMetrics { loss: 0.0, accuracy: 0.0 });
    }

    #[test]
    fn test_log_line_format() {
        let summary = EpochSummary {
            epoch: 3,
            train: PhaseMetrics { loss: 0.25, accuracy: 0.75 },
            validation: PhaseMetrics { loss: 0.5, accuracy: 0.5 },
            learning_rate: 0.0002,
            skipped_steps: 0,
        };
        assert_eq!(
            summary.log_line("2024-01-02 03.04.05"),
            "[2024-01-02 03.04.05] Epoch 3 - loss : 0.2500 - acc: 0.7500 - val_loss : 0.5000 - val_acc: 0.5000"
        );
    }
}
