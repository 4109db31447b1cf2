//! Small convolutional reference network

use std::path::Path;

use candle_core::{DType, Device, Tensor};
use candle_nn::{Conv2dConfig, VarBuilder, VarMap};
use tracing::debug;

use super::FusionModel;
use crate::error::{Error, Result};
use crate::training::config::ModelConfig;

/// Convolution whose f32 master weights follow the activation dtype
struct Conv {
    weight: Tensor,
    bias: Option<Tensor>,
    padding: usize,
}

impl Conv {
    fn new(
        in_channels: usize,
        out_channels: usize,
        kernel_size: usize,
        vb: VarBuilder,
    ) -> candle_core::Result<Self> {
        let padding = kernel_size / 2;
        let config = Conv2dConfig {
            padding,
            ..Default::default()
        };
        let conv = candle_nn::conv2d(in_channels, out_channels, kernel_size, config, vb)?;
        Ok(Self {
            weight: conv.weight().clone(),
            bias: conv.bias().cloned(),
            padding,
        })
    }

    fn forward(&self, x: &Tensor) -> candle_core::Result<Tensor> {
        let weight = self.weight.to_dtype(x.dtype())?;
        let y = x.conv2d(&weight, self.padding, 1, 1, 1)?;
        match &self.bias {
            Some(bias) => {
                let channels = bias.dim(0)?;
                let bias = bias.to_dtype(x.dtype())?.reshape((1, channels, 1, 1))?;
                y.broadcast_add(&bias)
            }
            None => Ok(y),
        }
    }
}

/// Concatenates both sources, applies `num_layers` 3x3 convolutions with ReLU
/// and a 1x1 projection to one channel followed by a sigmoid
pub struct FusionNet {
    vars: VarMap,
    hidden: Vec<Conv>,
    head: Conv,
}

impl FusionNet {
    /// Build a freshly initialised network for `channels`-channel sources
    pub fn new(config: &ModelConfig, channels: usize, device: &Device) -> Result<Self> {
        if channels == 0 {
            return Err(Error::model("source images must have at least one channel"));
        }

        let vars = VarMap::new();
        let vb = VarBuilder::from_varmap(&vars, DType::F32, device);

        let mut hidden = Vec::with_capacity(config.num_layers);
        let mut in_channels = 2 * channels;
        for i in 0..config.num_layers {
            hidden.push(Conv::new(in_channels, config.hidden_channels, 3, vb.pp(format!("conv{}", i)))?);
            in_channels = config.hidden_channels;
        }
        let head = Conv::new(in_channels, 1, 1, vb.pp("head"))?;

        debug!(
            "Built FusionNet with {} hidden layers of width {}",
            config.num_layers, config.hidden_channels
        );

        Ok(Self { vars, hidden, head })
    }

    /// Overwrite the weights with a saved safetensors file
    pub fn load_weights<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        self.vars.load(path)?;
        Ok(())
    }
}

impl FusionModel for FusionNet {
    fn forward(&self, source_a: &Tensor, source_b: &Tensor) -> candle_core::Result<Tensor> {
        let mut x = Tensor::cat(&[source_a, source_b], 1)?;
        for layer in &self.hidden {
            x = layer.forward(&x)?.relu()?;
        }
        let logits = self.head.forward(&x)?;
        // sigmoid
        (logits.neg()?.exp()? + 1.0)?.recip()
    }

    fn vars(&self) -> &VarMap {
        &self.vars
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn config() -> ModelConfig {
        ModelConfig {
            hidden_channels: 4,
            num_layers: 2,
        }
    }

    #[test]
    fn test_output_shape_and_range() {
        let net = FusionNet::new(&config(), 3, &Device::Cpu).unwrap();
        let a = Tensor::rand(0f32, 1f32, (2, 3, 8, 6), &Device::Cpu).unwrap();
        let b = Tensor::rand(0f32, 1f32, (2, 3, 8, 6), &Device::Cpu).unwrap();

        let out = net.forward(&a, &b).unwrap();
        assert_eq!(out.dims(), &[2, 1, 8, 6]);

        let values = out.flatten_all().unwrap().to_vec1::<f32>().unwrap();
        assert!(values.iter().all(|v| (0.0..=1.0).contains(v)));
    }

    #[test]
    fn test_parameter_count() {
        let net = FusionNet::new(&config(), 1, &Device::Cpu).unwrap();
        // conv0: 2->4 3x3, conv1: 4->4 3x3, head: 4->1 1x1
        let expected = (4 * 2 * 9 + 4) + (4 * 4 * 9 + 4) + (4 + 1);
        assert_eq!(net.parameter_count(), expected);
    }

    #[test]
    fn test_reduced_precision_forward() {
        let net = FusionNet::new(&config(), 1, &Device::Cpu).unwrap();
        let a = Tensor::rand(0f32, 1f32, (1, 1, 4, 4), &Device::Cpu)
            .unwrap()
            .to_dtype(DType::F16)
            .unwrap();
        let out = net.forward(&a, &a).unwrap();
        assert_eq!(out.dtype(), DType::F16);
    }

    #[test]
    fn test_weights_reload() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("weights.safetensors");
        let a = Tensor::rand(0f32, 1f32, (1, 1, 4, 4), &Device::Cpu).unwrap();

        let saved = FusionNet::new(&config(), 1, &Device::Cpu).unwrap();
        saved.vars().save(&path).unwrap();
        let expected = saved.forward(&a, &a).unwrap().flatten_all().unwrap().to_vec1::<f32>().unwrap();

        let mut loaded = FusionNet::new(&config(), 1, &Device::Cpu).unwrap();
        loaded.load_weights(&path).unwrap();
        let actual = loaded.forward(&a, &a).unwrap().flatten_all().unwrap().to_vec1::<f32>().unwrap();
        assert_eq!(expected, actual);
    }

    #[test]
    fn test_zero_channels_rejected() {
        assert!(FusionNet::new(&config(), 0, &Device::Cpu).is_err());
    }
}
