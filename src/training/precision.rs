//! Reduced-precision compute context
//!
//! candle has no global autocast switch, so the context is explicit: inputs
//! are cast to the compute dtype before the forward pass and the prediction is
//! cast back to f32 before the loss. Models keep f32 master weights and cast
//! them to the activation dtype inside their layers; `to_dtype` is
//! differentiable so gradients land on the f32 variables.

use candle_core::{DType, Device, Tensor};

use crate::training::config::{MixedPrecisionConfig, PrecisionType};

/// Compute dtype selection for the forward pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Autocast {
    dtype: DType,
}

impl Autocast {
    /// Resolve the effective compute dtype for a device
    ///
    /// Reduced precision only applies on accelerators; the CPU always computes
    /// in f32.
    pub fn resolve(config: &MixedPrecisionConfig, device: &Device) -> Self {
        let dtype = if !config.enabled || device.is_cpu() {
            DType::F32
        } else {
            match config.precision {
                PrecisionType::FP16 => DType::F16,
                PrecisionType::BF16 => DType::BF16,
                PrecisionType::FP32 => DType::F32,
            }
        };
        Self::new(dtype)
    }

    /// Context computing in `dtype`
    pub fn new(dtype: DType) -> Self {
        Self { dtype }
    }

    /// Full precision context, used for validation
    pub fn disabled() -> Self {
        Self::new(DType::F32)
    }

    /// Compute dtype used inside the context
    pub fn dtype(&self) -> DType {
        self.dtype
    }

    /// Cast a model input into the context
    pub fn cast_input(&self, tensor: &Tensor) -> candle_core::Result<Tensor> {
        tensor.to_dtype(self.dtype)
    }

    /// Cast a model output back to f32 for loss computation
    pub fn cast_output(&self, tensor: &Tensor) -> candle_core::Result<Tensor> {
        tensor.to_dtype(DType::F32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cpu_always_full_precision() {
        let config = MixedPrecisionConfig::default();
        let autocast = Autocast::resolve(&config, &Device::Cpu);
        assert_eq!(autocast.dtype(), DType::F32);
    }

    #[test]
    fn test_casts_round_trip_to_f32() {
        let autocast = Autocast::disabled();
        let x = Tensor::new(&[0.25f32, 0.5], &Device::Cpu).unwrap();
        let y = autocast.cast_output(&autocast.cast_input(&x).unwrap()).unwrap();
        assert_eq!(y.dtype(), DType::F32);
        assert_eq!(y.to_vec1::<f32>().unwrap(), vec![0.25, 0.5]);
    }
}
