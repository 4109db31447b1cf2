//! Training configuration system for decision-map fusion models
//!
//! This module provides the configuration structures for a training run: the
//! hyperparameter record, data layout options, mixed precision settings,
//! checkpointing and runtime options. Every section has defaults so that a
//! partial JSON/YAML file (or no file at all) produces a usable config.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::device::DeviceType;

/// Main training configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TrainingConfig {
    /// Dataset root containing `train/` and `validate/`
    pub data_path: PathBuf,

    /// Directory receiving run logs and weights
    pub save_path: PathBuf,

    /// Hyperparameters recorded with every run
    pub hyperparams: HyperParams,

    /// Data configuration
    pub data: DataConfig,

    /// Reference network configuration
    pub model: ModelConfig,

    /// Loss configuration
    pub loss: LossConfig,

    /// Mixed precision training settings
    pub mixed_precision: MixedPrecisionConfig,

    /// Checkpointing configuration
    pub checkpointing: CheckpointingConfig,

    /// Runtime configuration
    pub runtime: RuntimeConfig,
}

/// Hyperparameter record
///
/// Fixed at trainer construction and handed to the checkpoint logger
/// unchanged. Field names follow the keys written to `hyperparams.json`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HyperParams {
    /// Number of training samples per modality (validation uses `set_size / 9`)
    pub set_size: usize,

    /// Batch size for both loaders
    #[serde(rename = "batchsize", alias = "batch_size")]
    pub batch_size: usize,

    /// Maximum number of epochs
    pub epochs: usize,

    /// Initial learning rate
    pub lr: f64,

    /// Learning rate decay factor
    pub gamma: f64,

    /// Epochs between learning rate decays
    pub scheduler_step: usize,

    /// Recorded for bookkeeping only
    pub lmd: f64,

    /// Epochs without validation improvement before stopping
    pub patience: usize,
}

/// Data configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DataConfig {
    /// Channel layout of source and ground-truth images
    pub color: ColorMode,

    /// Resize every image to `[width, height]`
    pub resize: Option<[u32; 2]>,

    /// Fail instead of warning when the four modalities do not line up
    pub strict_pairing: bool,

    /// Shuffle batches each epoch
    pub shuffle: bool,

    /// Seed for the shuffling RNG (OS entropy when unset)
    pub seed: Option<u64>,
}

/// Channel layout for decoded images
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ColorMode {
    /// Single luminance channel
    Gray,
    /// Three RGB channels
    #[default]
    Rgb,
}

impl ColorMode {
    /// Number of channels produced by this mode
    pub fn channels(&self) -> usize {
        match self {
            ColorMode::Gray => 1,
            ColorMode::Rgb => 3,
        }
    }
}

/// Reference network configuration
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ModelConfig {
    /// Width of the hidden convolution layers
    pub hidden_channels: usize,

    /// Number of hidden 3x3 convolution layers
    pub num_layers: usize,
}

/// Loss configuration
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct LossConfig {
    /// Let the SSIM term contribute gradients instead of a constant offset
    pub ssim_gradient: bool,
}

/// Mixed precision training configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MixedPrecisionConfig {
    /// Enable mixed precision training
    pub enabled: bool,

    /// Reduced precision used on accelerators
    pub precision: PrecisionType,

    /// Loss scaling
    pub loss_scaling: LossScalingConfig,
}

/// Precision types
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PrecisionType {
    /// IEEE half precision
    FP16,
    /// bfloat16
    BF16,
    /// Full precision
    FP32,
}

/// Dynamic loss scaling configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LossScalingConfig {
    /// Initial scale
    pub init_scale: f64,

    /// Growth factor
    pub growth_factor: f64,

    /// Backoff factor
    pub backoff_factor: f64,

    /// Consecutive finite steps before growing the scale
    pub growth_interval: usize,
}

/// Checkpointing configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CheckpointingConfig {
    /// Save weights after every epoch, not only on improvement
    pub save_every_epoch: bool,
}

/// Runtime configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Compute device preference
    pub device: DeviceType,

    /// Hide progress bars
    pub quiet: bool,
}

impl TrainingConfig {
    /// Create a new training configuration with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from a file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .context("Failed to read configuration file")?;

        let config = if path.as_ref().extension().and_then(|s| s.to_str()) == Some("json") {
            serde_json::from_str(&content)
                .context("Failed to parse JSON configuration")?
        } else {
            serde_yaml::from_str(&content)
                .context("Failed to parse YAML configuration")?
        };

        Ok(config)
    }

    /// Save configuration to a file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = if path.as_ref().extension().and_then(|s| s.to_str()) == Some("json") {
            serde_json::to_string_pretty(self)
                .context("Failed to serialize configuration to JSON")?
        } else {
            serde_yaml::to_string(self)
                .context("Failed to serialize configuration to YAML")?
        };

        std::fs::write(path.as_ref(), content)
            .context("Failed to write configuration file")?;

        Ok(())
    }

    /// Validate the configuration
    ///
    /// Paths are deliberately not checked: a missing dataset directory yields
    /// an empty loader rather than an error.
    pub fn validate(&self) -> Result<()> {
        let hp = &self.hyperparams;

        if hp.batch_size == 0 {
            return Err(anyhow::anyhow!("Batch size must be greater than 0"));
        }

        if hp.epochs == 0 {
            return Err(anyhow::anyhow!("Number of epochs must be greater than 0"));
        }

        if !hp.lr.is_finite() || hp.lr < 0.0 {
            return Err(anyhow::anyhow!("Learning rate must be finite and non-negative"));
        }

        if !(hp.gamma > 0.0 && hp.gamma <= 1.0) {
            return Err(anyhow::anyhow!("Gamma must be in (0.0, 1.0]"));
        }

        if hp.scheduler_step == 0 {
            return Err(anyhow::anyhow!("Scheduler step must be greater than 0"));
        }

        if let Some([w, h]) = self.data.resize {
            if w == 0 || h == 0 {
                return Err(anyhow::anyhow!("Resize dimensions must be non-zero"));
            }
        }

        if self.model.hidden_channels == 0 {
            return Err(anyhow::anyhow!("Hidden channels must be greater than 0"));
        }

        let scaling = &self.mixed_precision.loss_scaling;
        if scaling.init_scale <= 0.0 || scaling.growth_factor <= 1.0 {
            return Err(anyhow::anyhow!("Loss scale must be positive and grow by a factor > 1"));
        }

        if !(scaling.backoff_factor > 0.0 && scaling.backoff_factor < 1.0) {
            return Err(anyhow::anyhow!("Loss scale backoff must be in (0.0, 1.0)"));
        }

        if scaling.growth_interval == 0 {
            return Err(anyhow::anyhow!("Loss scale growth interval must be greater than 0"));
        }

        Ok(())
    }

    /// Number of validation samples drawn per modality
    pub fn validation_size(&self) -> usize {
        self.hyperparams.set_size / 9
    }
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            data_path: PathBuf::from("data"),
            save_path: PathBuf::from("RunTimeData"),
            hyperparams: HyperParams::default(),
            data: DataConfig::default(),
            model: ModelConfig::default(),
            loss: LossConfig::default(),
            mixed_precision: MixedPrecisionConfig::default(),
            checkpointing: CheckpointingConfig::default(),
            runtime: RuntimeConfig::default(),
        }
    }
}

impl Default for HyperParams {
    fn default() -> Self {
        Self {
            set_size: 7866,
            batch_size: 8,
            epochs: 200,
            lr: 0.0002,
            gamma: 0.88,
            scheduler_step: 1,
            lmd: 0.0,
            patience: 6,
        }
    }
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            color: ColorMode::default(),
            resize: None,
            strict_pairing: false,
            shuffle: true,
            seed: None,
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            hidden_channels: 16,
            num_layers: 3,
        }
    }
}

impl Default for MixedPrecisionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            precision: PrecisionType::FP16,
            loss_scaling: LossScalingConfig::default(),
        }
    }
}

impl Default for LossScalingConfig {
    fn default() -> Self {
        Self {
            init_scale: 65536.0,
            growth_factor: 2.0,
            backoff_factor: 0.5,
            growth_interval: 2000,
        }
    }
}

impl Default for CheckpointingConfig {
    fn default() -> Self {
        Self {
            save_every_epoch: true,
        }
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            device: DeviceType::Auto,
            quiet: false,
        }
    }
}
