//! Fusion networks
//!
//! A fusion model maps two aligned source images to a single-channel decision
//! map in `[0, 1]`. Models own their variables in a [`VarMap`] so that the
//! optimizer and the checkpoint logger can reach them.

pub mod fusion_net;

pub use fusion_net::FusionNet;

use candle_core::Tensor;
use candle_nn::VarMap;

/// Network trained by the fusion trainer
pub trait FusionModel {
    /// Predict the decision map for two `[N, C, H, W]` source batches
    ///
    /// The output is `[N, 1, H, W]` in the dtype of the inputs.
    fn forward(&self, source_a: &Tensor, source_b: &Tensor) -> candle_core::Result<Tensor>;

    /// Trainable variables
    fn vars(&self) -> &VarMap;

    /// Total number of scalar parameters
    fn parameter_count(&self) -> usize {
        self.vars()
            .all_vars()
            .iter()
            .map(|v| v.as_tensor().elem_count())
            .sum()
    }
}
