//! Dynamic loss scaling for f16 training
//!
//! The loss is multiplied by `scale` before backpropagation so that small f16
//! gradients do not flush to zero. Gradients are divided by the same factor
//! before the optimizer sees them. A non-finite gradient skips the update and
//! backs the scale off; a run of finite steps grows it again.

use anyhow::Result;
use candle_core::backprop::GradStore;
use candle_core::{DType, Tensor, Var};
use tracing::{debug, warn};

use super::Optimizer;
use crate::training::config::LossScalingConfig;

/// Gradient scaler with growth and backoff
#[derive(Debug, Clone)]
pub struct GradScaler {
    enabled: bool,
    scale: f64,
    growth_factor: f64,
    backoff_factor: f64,
    growth_interval: usize,
    /// Consecutive finite steps since the last scale change
    growth_tracker: usize,
    skipped_steps: usize,
}

impl GradScaler {
    pub fn new(config: &LossScalingConfig, enabled: bool) -> Self {
        Self {
            enabled,
            scale: if enabled { config.init_scale } else { 1.0 },
            growth_factor: config.growth_factor,
            backoff_factor: config.backoff_factor,
            growth_interval: config.growth_interval,
            growth_tracker: 0,
            skipped_steps: 0,
        }
    }

    /// A scaler that never scales or skips
    pub fn disabled() -> Self {
        Self::new(&LossScalingConfig::default(), false)
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Current scale factor
    pub fn scale(&self) -> f64 {
        self.scale
    }

    /// Optimizer steps skipped because of non-finite gradients
    pub fn skipped_steps(&self) -> usize {
        self.skipped_steps
    }

    /// Multiply the loss by the current scale
    pub fn scale_loss(&self, loss: &Tensor) -> candle_core::Result<Tensor> {
        if self.enabled {
            loss.affine(self.scale, 0.0)
        } else {
            Ok(loss.clone())
        }
    }

    /// Divide the gradients of `vars` by the scale in place
    ///
    /// Returns `true` when every gradient is finite.
    pub fn unscale(&self, vars: &[Var], grads: &mut GradStore) -> candle_core::Result<bool> {
        let inv_scale = 1.0 / self.scale;
        let mut finite = true;

        for var in vars {
            let Some(grad) = grads.remove(var.as_tensor()) else {
                continue;
            };
            let grad = grad.affine(inv_scale, 0.0)?;
            if finite && !is_finite(&grad)? {
                finite = false;
            }
            grads.insert(var.as_tensor(), grad);
        }

        Ok(finite)
    }

    /// Unscale, step the optimizer when gradients are finite and update the scale
    ///
    /// Returns whether the optimizer stepped.
    pub fn step<O: Optimizer + ?Sized>(
        &mut self,
        optimizer: &mut O,
        vars: &[Var],
        mut grads: GradStore,
    ) -> Result<bool> {
        if !self.enabled {
            optimizer.step(&grads)?;
            return Ok(true);
        }

        let finite = self.unscale(vars, &mut grads)?;
        if finite {
            optimizer.step(&grads)?;
        } else {
            self.skipped_steps += 1;
            warn!("Non-finite gradients at loss scale {}, skipping optimizer step", self.scale);
        }
        self.update(finite);
        Ok(finite)
    }

    /// Adjust the scale after a step
    pub fn update(&mut self, finite: bool) {
        if !self.enabled {
            return;
        }

        if finite {
            self.growth_tracker += 1;
            if self.growth_tracker >= self.growth_interval {
                self.scale *= self.growth_factor;
                self.growth_tracker = 0;
                debug!("Loss scale grown to {}", self.scale);
            }
        } else {
            self.scale *= self.backoff_factor;
            self.growth_tracker = 0;
            debug!("Loss scale backed off to {}", self.scale);
        }
    }
}

/// Whether every element is finite
fn is_finite(tensor: &Tensor) -> candle_core::Result<bool> {
    if tensor.elem_count() == 0 {
        return Ok(true);
    }
    let values = tensor.to_dtype(DType::F32)?.flatten_all()?;
    // NaN is the only value not equal to itself
    let nans = values.ne(&values)?.to_dtype(DType::F32)?.sum_all()?.to_scalar::<f32>()?;
    let peak = values.abs()?.max(0)?.to_scalar::<f32>()?;
    Ok(nans == 0.0 && peak.is_finite())
}
