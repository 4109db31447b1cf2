//! Training infrastructure for fusion networks
//!
//! This module provides everything needed to train a decision-map fusion
//! network: configuration, data loading, the composite loss, optimizers and
//! schedulers, mixed precision, checkpointing and the epoch loop.
//!
//! # Main Components
//!
//! - **Configuration**: hyperparameter record and run options
//! - **Data**: file indexing, image decoding and batching
//! - **Loss**: L1, Dice and SSIM combined into one objective
//! - **Optimizers**: AdamW, step decay and dynamic loss scaling
//! - **Checkpoints**: run logs, weight files and early stopping
//! - **Trainer**: the epoch state machine
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use dmfusion::training::{FusionTrainer, TrainingConfig};
//!
//! let mut config = TrainingConfig::default();
//! config.data_path = "datasets/mff".into();
//!
//! let trainer = FusionTrainer::new(config)?;
//! let result = trainer.run()?;
//! println!("best val loss {}", result.best_val_loss);
//! ```

pub mod config;
pub mod trainer;
pub mod data;
pub mod checkpoints;
pub mod metrics;
pub mod optimizers;
pub mod loss;
pub mod precision;
pub mod progress;

// Tests module
#[cfg(test)]
pub mod tests;

/// Result type of the training layer
pub type Result<T> = anyhow::Result<T>;

// Configuration re-exports
pub use config::{
    CheckpointingConfig, ColorMode, DataConfig, HyperParams, LossConfig, LossScalingConfig,
    MixedPrecisionConfig, ModelConfig, PrecisionType, RuntimeConfig, TrainingConfig,
};

// Trainer re-exports
pub use trainer::{FusionTrainer, TrainingResult};

// Data re-exports
pub use data::{DataError, DataLoader, Dataset, FusionBatch, FusionDataset, FusionSample};

// Checkpoint re-exports
pub use checkpoints::{CheckpointLogger, CheckpointOutcome, CheckpointSink};

// Metrics re-exports
pub use metrics::{EpochSummary, PhaseAccumulator, PhaseMetrics};

// Optimizer re-exports
pub use optimizers::{AdamWOptimizer, GradScaler, Optimizer, Scheduler, StepScheduler};

// Loss re-exports
pub use loss::{CompositeLoss, LossBreakdown};

pub use precision::Autocast;
