//! Loss functions for decision-map fusion training
//!
//! # Key Components
//!
//! - **L1Loss**: mean absolute error between prediction and target
//! - **DiceLoss**: overlap loss over the whole batch
//! - **Ssim**: structural similarity with a Gaussian window
//! - **CompositeLoss**: the fixed weighted combination used for training
//!
//! # Usage
//! ```rust,ignore
//! use dmfusion::training::loss::CompositeLoss;
//!
//! let loss_fn = CompositeLoss::new(&device, false)?;
//! let loss = loss_fn.forward(&batch.decision_map, &prediction)?;
//! ```

pub mod pixel;
pub mod ssim;
pub mod composition;

pub use composition::{CompositeLoss, LossBreakdown, DICE_WEIGHT, L1_WEIGHT, SSIM_WEIGHT};
pub use pixel::{DiceLoss, L1Loss};
pub use ssim::Ssim;
