//! Training orchestration for decision-map fusion models
//!
//! [`FusionTrainer`] prepares the data loaders, builds the network, optimizer
//! and scheduler, and drives the epoch loop:
//!
//! ```text
//! Training -> Validating -> SchedulerStep -> Logging/Checkpoint -> (Continue | Stopped)
//! ```
//!
//! Everything runs on one thread against one device. Any error aborts the run
//! and is returned to the caller; early stopping is a normal completion.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use candle_core::{DType, Device, Tensor};
use serde::{Deserialize, Serialize};
use tracing::{debug, enabled, info, instrument, Level};

use crate::device::{device_label, select_device};
use crate::models::{FusionModel, FusionNet};
use crate::training::checkpoints::{CheckpointLogger, CheckpointOutcome, CheckpointSink};
use crate::training::config::TrainingConfig;
use crate::training::data::{DataLoader, DataLoaderConfig, FileIndex, FusionBatch, FusionDataset, Split};
use crate::training::loss::CompositeLoss;
use crate::training::metrics::{EpochSummary, PhaseAccumulator, PhaseMetrics};
use crate::training::optimizers::{
    create_optimizer, create_scheduler, AdamWOptimizer, GradScaler, Optimizer, Scheduler, StepScheduler,
};
use crate::training::precision::Autocast;
use crate::training::progress::EpochProgress;

/// Trainer for fusion networks
pub struct FusionTrainer {
    /// Training configuration
    config: TrainingConfig,

    /// Device for every tensor of the run
    device: Device,

    /// Forward-pass precision of the training phase
    autocast: Autocast,

    /// Loss evaluators, built once
    loss_fn: CompositeLoss,
}

/// Outcome of a training run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingResult {
    /// Metrics of every completed epoch
    pub history: Vec<EpochSummary>,

    /// Whether the run ended through early stopping
    pub early_stopped: bool,

    /// Best validation loss seen
    pub best_val_loss: f64,

    /// Run directory holding logs and weights
    pub run_dir: Option<PathBuf>,

    /// Wall-clock duration
    pub training_duration: Duration,
}

impl TrainingResult {
    /// Number of completed epochs
    pub fn epochs_run(&self) -> usize {
        self.history.len()
    }
}

impl FusionTrainer {
    /// Create a trainer on the configured device
    pub fn new(config: TrainingConfig) -> Result<Self> {
        let device = select_device(config.runtime.device).context("Failed to select device")?;
        Self::with_device(config, device)
    }

    /// Create a trainer on an explicit device
    pub fn with_device(config: TrainingConfig, device: Device) -> Result<Self> {
        config
            .validate()
            .context("Training configuration validation failed")?;

        let autocast = Autocast::resolve(&config.mixed_precision, &device);
        let loss_fn = CompositeLoss::new(&device, config.loss.ssim_gradient)
            .context("Failed to build loss functions")?;

        Ok(Self {
            config,
            device,
            autocast,
            loss_fn,
        })
    }

    /// Training configuration
    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    /// Device used for the run
    pub fn device(&self) -> &Device {
        &self.device
    }

    /// Run a full training session
    pub fn run(&self) -> Result<TrainingResult> {
        info!("Training start...");

        let (mut train_loader, mut valid_loader) = self.prepare_data_loaders()?;
        let model = self.build_model()?;
        let (mut optimizer, mut scheduler) = self.build_optimization(&model)?;
        let mut sink = CheckpointLogger::new(&self.config.save_path, &self.config.hyperparams)
            .context("Failed to create run directory")?;

        self.training_process(
            &model,
            &mut optimizer,
            &mut scheduler,
            &mut train_loader,
            &mut valid_loader,
            &mut sink,
        )
    }

    /// Build the training and validation loaders
    #[instrument(skip(self))]
    pub fn prepare_data_loaders(&self) -> Result<(DataLoader, DataLoader)> {
        let train = self.build_loader(Split::Train, self.config.hyperparams.set_size)?;
        let valid = self.build_loader(Split::Validate, self.config.validation_size())?;
        Ok((train, valid))
    }

    fn build_loader(&self, split: Split, limit: usize) -> Result<DataLoader> {
        let index = FileIndex::scan(&self.config.data_path, split, limit)
            .with_context(|| format!("Failed to index {} data", split))?;

        let label = match split {
            Split::Train => "Train",
            Split::Validate => "Valid",
        };
        info!("{} Data A: {}", label, index.source_a.len());
        info!("{} Data B: {}", label, index.source_b.len());
        info!("{} Data GT: {}", label, index.ground_truth.len());
        info!("{} Data DM: {}", label, index.decision_map.len());

        let dataset = FusionDataset::new(index, split, &self.config.data, Device::Cpu)
            .with_context(|| format!("Failed to prepare {} dataset", split))?;

        let batch_size = self.config.hyperparams.batch_size;
        let loader = DataLoader::new(
            Arc::new(dataset),
            DataLoaderConfig {
                batch_size,
                shuffle: self.config.data.shuffle,
                seed: self.config.data.seed,
            },
        )?;

        info!(
            "{} Data Size:{} , {} Loader Amount: {}/{} = {}",
            label,
            loader.dataset_size(),
            label,
            loader.dataset_size(),
            batch_size,
            loader.len()
        );
        Ok(loader)
    }

    /// Build the reference network on the run device
    pub fn build_model(&self) -> Result<FusionNet> {
        let model = FusionNet::new(&self.config.model, self.config.data.color.channels(), &self.device)
            .context("Failed to build model")?;
        Ok(model)
    }

    /// AdamW over the model's variables plus the step-decay scheduler
    pub fn build_optimization<M: FusionModel + ?Sized>(
        &self,
        model: &M,
    ) -> Result<(AdamWOptimizer, StepScheduler)> {
        let optimizer = create_optimizer(model.vars(), &self.config.hyperparams)
            .context("Failed to create optimizer")?;
        let scheduler = create_scheduler(&self.config.hyperparams);

        info!(
            "The number of model parameters: {:.6} M",
            model.parameter_count() as f64 / 1e6
        );
        Ok((optimizer, scheduler))
    }

    /// Epoch loop over prepared components
    pub fn training_process<M, O, S, C>(
        &self,
        model: &M,
        optimizer: &mut O,
        scheduler: &mut S,
        train_loader: &mut DataLoader,
        valid_loader: &mut DataLoader,
        sink: &mut C,
    ) -> Result<TrainingResult>
    where
        M: FusionModel + ?Sized,
        O: Optimizer + ?Sized,
        S: Scheduler + ?Sized,
        C: CheckpointSink + ?Sized,
    {
        let start = Instant::now();
        let scaling_active = self.config.mixed_precision.enabled && self.autocast.dtype() == DType::F16;
        let mut scaler = GradScaler::new(&self.config.mixed_precision.loss_scaling, scaling_active);
        info!(
            "Device: {}, compute dtype: {:?}, loss scaling: {}",
            device_label(&self.device),
            self.autocast.dtype(),
            scaler.is_enabled()
        );

        let mut history = Vec::new();
        let mut early_stopped = false;

        for epoch in 1..=self.config.hyperparams.epochs {
            let skipped_before = scaler.skipped_steps();
            let train = self
                .train_epoch(model, optimizer, &mut scaler, train_loader, epoch)
                .with_context(|| format!("Training failed in epoch {}", epoch))?;
            let validation = self
                .validate_epoch(model, valid_loader, epoch)
                .with_context(|| format!("Validation failed in epoch {}", epoch))?;

            scheduler.step();
            optimizer.set_learning_rate(scheduler.get_lr());
            debug!("Learning rate for next epoch: {}", scheduler.get_lr());

            let summary = EpochSummary {
                epoch,
                train,
                validation,
                learning_rate: scheduler.get_lr(),
                skipped_steps: scaler.skipped_steps() - skipped_before,
            };
            let line = summary.log_line(&timestamp());
            info!("{}", line);

            let outcome = sink
                .record(
                    model.vars(),
                    epoch,
                    &line,
                    validation.loss,
                    self.config.checkpointing.save_every_epoch,
                )
                .with_context(|| format!("Failed to record epoch {}", epoch))?;
            history.push(summary);

            if outcome == CheckpointOutcome::Stop {
                info!("Early stopping!!!");
                early_stopped = true;
                break;
            }
        }

        let result = TrainingResult {
            history,
            early_stopped,
            best_val_loss: sink.best_loss(),
            run_dir: sink.run_dir().map(|p| p.to_path_buf()),
            training_duration: start.elapsed(),
        };
        info!(
            "Training completed in {:?} after {} epochs",
            result.training_duration,
            result.epochs_run()
        );
        Ok(result)
    }

    /// One optimisation pass over the training loader
    #[instrument(skip_all, fields(epoch = epoch))]
    fn train_epoch<M, O>(
        &self,
        model: &M,
        optimizer: &mut O,
        scaler: &mut GradScaler,
        loader: &mut DataLoader,
        epoch: usize,
    ) -> Result<PhaseMetrics>
    where
        M: FusionModel + ?Sized,
        O: Optimizer + ?Sized,
    {
        let vars = model.vars().all_vars();
        let mut metrics = PhaseAccumulator::new(loader.len());
        let progress = EpochProgress::new(
            &format!("[{}] Epoch {}", timestamp(), epoch),
            loader.len(),
            self.config.runtime.quiet,
        );

        for batch in loader.batches() {
            let batch = batch?.to_device(&self.device)?;
            let pred = self.predict(model, &batch, &self.autocast)?;
            let loss = self.loss_fn.forward(&batch.decision_map, &pred)?;
            if metrics.seen() == 0 && enabled!(Level::DEBUG) {
                let parts = self.loss_fn.breakdown(&batch.decision_map, &pred.detach())?;
                debug!(?parts, "Loss components of the first batch");
            }

            let grads = scaler.scale_loss(&loss)?.backward()?;
            scaler.step(optimizer, &vars, grads)?;

            let loss = loss.to_scalar::<f32>()? as f64;
            metrics.add(loss);
            progress.advance(loss, 1.0 - loss);
            debug!("batch {} loss {:.6}", metrics.seen(), loss);
        }

        progress.finish();
        Ok(metrics.finish())
    }

    /// One pass over the validation loader with detached f32 predictions
    #[instrument(skip_all, fields(epoch = epoch))]
    fn validate_epoch<M>(&self, model: &M, loader: &mut DataLoader, epoch: usize) -> Result<PhaseMetrics>
    where
        M: FusionModel + ?Sized,
    {
        let mut metrics = PhaseAccumulator::new(loader.len());
        let progress = EpochProgress::new(
            &format!("[Validating...] Epoch {}", epoch),
            loader.len(),
            self.config.runtime.quiet,
        );

        for batch in loader.batches() {
            let batch = batch?.to_device(&self.device)?;
            let pred = self.predict(model, &batch, &Autocast::disabled())?.detach();
            let loss = self
                .loss_fn
                .forward(&batch.decision_map, &pred)?
                .to_scalar::<f32>()? as f64;
            metrics.add(loss);
            progress.advance(loss, 1.0 - loss);
        }

        progress.finish();
        Ok(metrics.finish())
    }

    /// Forward pass in an autocast context, returning an f32 prediction
    fn predict<M: FusionModel + ?Sized>(
        &self,
        model: &M,
        batch: &FusionBatch,
        autocast: &Autocast,
    ) -> candle_core::Result<Tensor> {
        let source_a = autocast.cast_input(&batch.source_a)?;
        let source_b = autocast.cast_input(&batch.source_b)?;
        autocast.cast_output(&model.forward(&source_a, &source_b)?)
    }
}

/// Wall-clock timestamp used in progress and log lines
fn timestamp() -> String {
    chrono::Local::now().format("%Y-%m-%d %H.%M.%S").to_string()
}
