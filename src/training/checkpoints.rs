//! Run logging, weight checkpointing and early stopping
//!
//! A [`CheckpointLogger`] owns one run directory:
//!
//! ```text
//! <save_path>/<YYYY-MM-DD_HH.MM.SS>/
//!     hyperparams.json
//!     log.txt
//!     epoch_001.safetensors
//!     best_network.safetensors
//! ```
//!
//! It tracks the best validation loss and the number of epochs since it last
//! improved; the trainer only sees the [`CheckpointOutcome`] of each epoch.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use candle_nn::VarMap;
use tracing::{debug, info, instrument};

use crate::training::config::HyperParams;

/// File name of the best weights in a run directory
pub const BEST_WEIGHTS: &str = "best_network.safetensors";

/// Whether training should go on after an epoch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckpointOutcome {
    Continue,
    Stop,
}

/// Receiver of per-epoch results
pub trait CheckpointSink {
    /// Record one finished epoch
    fn record(
        &mut self,
        vars: &VarMap,
        epoch: usize,
        log_line: &str,
        val_loss: f64,
        save_every_epoch: bool,
    ) -> Result<CheckpointOutcome>;

    /// Best validation loss seen so far
    fn best_loss(&self) -> f64;

    /// Directory receiving the outputs, if any
    fn run_dir(&self) -> Option<&Path>;
}

/// File-backed checkpoint sink with patience-based early stopping
#[derive(Debug)]
pub struct CheckpointLogger {
    run_dir: PathBuf,
    patience: usize,
    best_loss: f64,
    stale_epochs: usize,
}

impl CheckpointLogger {
    /// Create a fresh run directory under `save_path` and write the run header
    #[instrument(skip(hyperparams))]
    pub fn new(save_path: &Path, hyperparams: &HyperParams) -> Result<Self> {
        let stamp = chrono::Local::now().format("%Y-%m-%d_%H.%M.%S").to_string();
        let run_dir = unique_dir(save_path, &stamp)?;

        let params_json = serde_json::to_string_pretty(hyperparams)
            .context("Failed to serialize hyperparameters")?;
        fs::write(run_dir.join("hyperparams.json"), params_json)
            .context("Failed to write hyperparams.json")?;

        let mut log = File::create(run_dir.join("log.txt")).context("Failed to create log.txt")?;
        writeln!(log, "Hyperparameters:")?;
        writeln!(log, "  set_size: {}", hyperparams.set_size)?;
        writeln!(log, "  batchsize: {}", hyperparams.batch_size)?;
        writeln!(log, "  epochs: {}", hyperparams.epochs)?;
        writeln!(log, "  lr: {}", hyperparams.lr)?;
        writeln!(log, "  gamma: {}", hyperparams.gamma)?;
        writeln!(log, "  scheduler_step: {}", hyperparams.scheduler_step)?;
        writeln!(log, "  lmd: {}", hyperparams.lmd)?;
        writeln!(log, "  patience: {}", hyperparams.patience)?;
        writeln!(log)?;

        info!("Logging run to {}", run_dir.display());

        Ok(Self {
            run_dir,
            patience: hyperparams.patience,
            best_loss: f64::INFINITY,
            stale_epochs: 0,
        })
    }

    /// Epochs since the last improvement
    pub fn stale_epochs(&self) -> usize {
        self.stale_epochs
    }

    fn append_log(&self, line: &str) -> Result<()> {
        let mut log = OpenOptions::new()
            .append(true)
            .create(true)
            .open(self.run_dir.join("log.txt"))
            .context("Failed to open log.txt")?;
        writeln!(log, "{}", line)?;
        Ok(())
    }

    fn save_weights(&self, vars: &VarMap, name: &str) -> Result<()> {
        let path = self.run_dir.join(name);
        vars.save(&path)
            .with_context(|| format!("Failed to save weights to {}", path.display()))?;
        debug!("Saved weights to {}", path.display());
        Ok(())
    }
}

impl CheckpointSink for CheckpointLogger {
    fn record(
        &mut self,
        vars: &VarMap,
        epoch: usize,
        log_line: &str,
        val_loss: f64,
        save_every_epoch: bool,
    ) -> Result<CheckpointOutcome> {
        self.append_log(log_line)?;

        if save_every_epoch {
            self.save_weights(vars, &format!("epoch_{:03}.safetensors", epoch))?;
        }

        // NaN compares false and never improves
        if val_loss < self.best_loss {
            self.best_loss = val_loss;
            self.stale_epochs = 0;
            self.save_weights(vars, BEST_WEIGHTS)?;
            self.append_log(&format!("Best model updated at epoch {} (val_loss {:.4})", epoch, val_loss))?;
            info!("New best validation loss {:.6} at epoch {}", val_loss, epoch);
            return Ok(CheckpointOutcome::Continue);
        }

        self.stale_epochs += 1;
        debug!(
            "No improvement for {} epoch(s), patience {}",
            self.stale_epochs, self.patience
        );
        if self.stale_epochs >= self.patience {
            self.append_log(&format!(
                "Early stopping after epoch {}: no improvement for {} epochs",
                epoch, self.stale_epochs
            ))?;
            return Ok(CheckpointOutcome::Stop);
        }

        Ok(CheckpointOutcome::Continue)
    }

    fn best_loss(&self) -> f64 {
        self.best_loss
    }

    fn run_dir(&self) -> Option<&Path> {
        Some(&self.run_dir)
    }
}

/// Create `parent/name`, or `parent/name_1`, `parent/name_2`, ... when taken
fn unique_dir(parent: &Path, name: &str) -> Result<PathBuf> {
    fs::create_dir_all(parent)
        .with_context(|| format!("Failed to create {}", parent.display()))?;

    let mut candidate = parent.join(name);
    let mut suffix = 0;
    loop {
        match fs::create_dir(&candidate) {
            Ok(()) => return Ok(candidate),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                suffix += 1;
                candidate = parent.join(format!("{}_{}", name, suffix));
            }
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to create {}", candidate.display()))
            }
        }
    }
}
