//! Learning rate schedulers

use super::Scheduler;

/// Step decay learning rate schedule
///
/// After `k` epochs the learning rate is `initial_lr * gamma^(k / period)`,
/// with integer division.
#[derive(Debug, Clone)]
pub struct StepScheduler {
    initial_lr: f64,
    period: usize,
    gamma: f64,
    epochs: usize,
}

impl StepScheduler {
    /// Decay `initial_lr` by `gamma` every `period` steps
    pub fn new(initial_lr: f64, period: usize, gamma: f64) -> Self {
        Self {
            initial_lr,
            period: period.max(1),
            gamma,
            epochs: 0,
        }
    }
}

impl Scheduler for StepScheduler {
    fn name(&self) -> &str {
        "step"
    }

    fn step(&mut self) {
        self.epochs += 1;
    }

    fn get_lr(&self) -> f64 {
        let decays = (self.epochs / self.period) as i32;
        self.initial_lr * self.gamma.powi(decays)
    }

    fn step_count(&self) -> usize {
        self.epochs
    }
}
