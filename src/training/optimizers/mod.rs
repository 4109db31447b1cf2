//! Optimizers, learning rate schedulers and loss scaling for fusion training
//!
//! This module provides the AdamW optimizer used for training, the step-decay
//! learning rate scheduler and the dynamic loss scaler for reduced-precision
//! runs.

pub mod adamw;
pub mod schedulers;
pub mod scaler;

pub use adamw::AdamWOptimizer;
pub use schedulers::StepScheduler;
pub use scaler::GradScaler;

use anyhow::Result;
use candle_core::backprop::GradStore;
use candle_nn::VarMap;
use tracing::info;

use crate::training::config::HyperParams;

/// Trait for optimizers
pub trait Optimizer {
    /// Optimizer name
    fn name(&self) -> &str;

    /// Apply one update from a gradient store
    fn step(&mut self, gradients: &GradStore) -> Result<()>;

    /// Get current learning rate
    fn learning_rate(&self) -> f64;

    /// Set learning rate
    fn set_learning_rate(&mut self, lr: f64);

    /// Number of updates applied so far
    fn step_count(&self) -> usize;
}

/// Trait for learning rate schedulers
pub trait Scheduler {
    /// Scheduler name
    fn name(&self) -> &str;

    /// Advance the schedule by one epoch
    fn step(&mut self);

    /// Get current learning rate
    fn get_lr(&self) -> f64;

    /// Number of steps taken
    fn step_count(&self) -> usize;
}

/// AdamW over every variable of a model, without weight decay
pub fn create_optimizer(var_map: &VarMap, hyperparams: &HyperParams) -> Result<AdamWOptimizer> {
    let optimizer = AdamWOptimizer::new(var_map, hyperparams.lr, 0.9, 0.999, 1e-8, 0.0)?;
    info!(
        "Created {} optimizer with lr={} over {} tensors",
        optimizer.name(),
        hyperparams.lr,
        optimizer.parameter_count()
    );
    Ok(optimizer)
}

/// Step decay by `gamma` every `scheduler_step` epochs
pub fn create_scheduler(hyperparams: &HyperParams) -> StepScheduler {
    let scheduler = StepScheduler::new(hyperparams.lr, hyperparams.scheduler_step, hyperparams.gamma);
    info!(
        "Created {} scheduler: gamma={} every {} epochs",
        scheduler.name(),
        hyperparams.gamma,
        hyperparams.scheduler_step
    );
    scheduler
}
