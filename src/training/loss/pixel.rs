//! Per-pixel losses

use candle_core::{Result, Tensor};

/// Mean absolute error
#[derive(Debug, Clone, Copy, Default)]
pub struct L1Loss;

impl L1Loss {
    pub fn new() -> Self {
        Self
    }

    /// `mean(|pred - target|)`
    pub fn forward(&self, pred: &Tensor, target: &Tensor) -> Result<Tensor> {
        (pred - target)?.abs()?.mean_all()
    }
}

/// Dice loss with additive smoothing
///
/// `1 - (2 * sum(p * t) + smooth) / (sum(p) + sum(t) + smooth)`, summed over
/// every element of the batch.
#[derive(Debug, Clone, Copy)]
pub struct DiceLoss {
    smooth: f64,
}

impl Default for DiceLoss {
    fn default() -> Self {
        Self { smooth: 1.0 }
    }
}

impl DiceLoss {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn forward(&self, pred: &Tensor, target: &Tensor) -> Result<Tensor> {
        let intersection = (pred * target)?.sum_all()?;
        let numerator = intersection.affine(2.0, self.smooth)?;
        let denominator = (pred.sum_all()? + target.sum_all()?)?.affine(1.0, self.smooth)?;
        (numerator / denominator)?.affine(-1.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use candle_core::Device;

    fn scalar(t: &Tensor) -> f32 {
        t.to_scalar::<f32>().unwrap()
    }

    #[test]
    fn test_l1_loss() {
        let pred = Tensor::new(&[0.0f32, 0.5, 1.0, 1.0], &Device::Cpu).unwrap();
        let target = Tensor::new(&[1.0f32, 0.5, 0.0, 1.0], &Device::Cpu).unwrap();
        assert_relative_eq!(scalar(&L1Loss::new().forward(&pred, &target).unwrap()), 0.5);
    }

    #[test]
    fn test_dice_loss_values() {
        let target = Tensor::new(&[1.0f32, 1.0, 0.0, 0.0], &Device::Cpu).unwrap();
        let dice = DiceLoss::new();

        assert_relative_eq!(scalar(&dice.forward(&target, &target).unwrap()), 0.0);

        let zeros = target.zeros_like().unwrap();
        // 1 - 1 / (0 + 2 + 1)
        assert_relative_eq!(
            scalar(&dice.forward(&zeros, &target).unwrap()),
            2.0 / 3.0,
            epsilon = 1e-6
        );
    }
}
