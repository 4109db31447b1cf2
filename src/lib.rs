//! DMFusion - supervised training of decision-map image fusion networks
//!
//! A fusion network looks at two aligned source images and predicts, per
//! pixel, which source is in focus. This crate trains such networks with a
//! composite L1 + Dice + SSIM loss, AdamW, step learning rate decay, mixed
//! precision and patience-based early stopping.

#![warn(rustdoc::broken_intra_doc_links)]

pub mod device;
pub mod error;
pub mod logging;
pub mod models;
pub mod training;

// Re-exports
pub use device::{select_device, DeviceType};
pub use error::{Error, Result};
pub use models::{FusionModel, FusionNet};
pub use training::{FusionTrainer, TrainingConfig, TrainingResult};
