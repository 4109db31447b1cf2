//! AdamW optimizer
//!
//! Thin wrapper over `candle_nn::AdamW` that exposes the crate's
//! [`Optimizer`] interface and keeps a step counter.

use anyhow::Result;
use candle_core::backprop::GradStore;
use candle_nn::{ParamsAdamW, VarMap};

use super::Optimizer;

/// AdamW optimizer with decoupled weight decay
pub struct AdamWOptimizer {
    inner: candle_nn::AdamW,

    /// Current step count
    step_count: usize,

    /// Number of optimized tensors
    parameter_count: usize,
}

impl AdamWOptimizer {
    /// Create a new AdamW optimizer over every variable in `var_map`
    pub fn new(
        var_map: &VarMap,
        learning_rate: f64,
        beta1: f64,
        beta2: f64,
        epsilon: f64,
        weight_decay: f64,
    ) -> Result<Self> {
        let vars = var_map.all_vars();
        let parameter_count = vars.len();
        let params = ParamsAdamW {
            lr: learning_rate,
            beta1,
            beta2,
            eps: epsilon,
            weight_decay,
        };
        let inner = <candle_nn::AdamW as candle_nn::Optimizer>::new(vars, params)?;

        Ok(Self {
            inner,
            step_count: 0,
            parameter_count,
        })
    }

    /// Number of optimized tensors
    pub fn parameter_count(&self) -> usize {
        self.parameter_count
    }
}

impl Optimizer for AdamWOptimizer {
    fn name(&self) -> &str {
        "adamw"
    }

    fn step(&mut self, gradients: &GradStore) -> Result<()> {
        candle_nn::Optimizer::step(&mut self.inner, gradients)?;
        self.step_count += 1;
        Ok(())
    }

    fn learning_rate(&self) -> f64 {
        candle_nn::Optimizer::learning_rate(&self.inner)
    }

    fn set_learning_rate(&mut self, lr: f64) {
        candle_nn::Optimizer::set_learning_rate(&mut self.inner, lr)
    }

    fn step_count(&self) -> usize {
        self.step_count
    }
}
