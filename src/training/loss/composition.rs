//! Weighted combination of the pixel and structural losses

use candle_core::{Device, Result, Tensor};
use serde::{Deserialize, Serialize};

use super::{DiceLoss, L1Loss, Ssim};

/// Weight of the L1 term
pub const L1_WEIGHT: f64 = 0.7;
/// Weight of the Dice term
pub const DICE_WEIGHT: f64 = 0.1;
/// Weight of the `1 - SSIM` term
pub const SSIM_WEIGHT: f64 = 0.2;

/// `0.7 * L1 + 0.1 * Dice + 0.2 * (1 - SSIM)`
///
/// The component evaluators are built once and reused for every batch. Unless
/// `ssim_gradient` is set, the SSIM score is read out as a number before it is
/// combined, so the term shifts the loss value without contributing gradients.
#[derive(Debug, Clone)]
pub struct CompositeLoss {
    l1: L1Loss,
    dice: DiceLoss,
    ssim: Ssim,
    ssim_gradient: bool,
}

/// Component values of one loss evaluation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LossBreakdown {
    pub l1: f32,
    pub dice: f32,
    pub ssim: f32,
    pub total: f32,
}

impl CompositeLoss {
    pub fn new(device: &Device, ssim_gradient: bool) -> Result<Self> {
        Ok(Self {
            l1: L1Loss::new(),
            dice: DiceLoss::new(),
            ssim: Ssim::new(device)?,
            ssim_gradient,
        })
    }

    /// Scalar loss between ground truth and prediction
    pub fn forward(&self, ground_truth: &Tensor, pred: &Tensor) -> Result<Tensor> {
        let pixel = self.pixel_terms(ground_truth, pred)?;

        if self.ssim_gradient {
            let structural = self.ssim.forward(ground_truth, pred)?.affine(-SSIM_WEIGHT, SSIM_WEIGHT)?;
            pixel + structural
        } else {
            let score = self.ssim.score(ground_truth, pred)? as f64;
            pixel.affine(1.0, SSIM_WEIGHT * (1.0 - score))
        }
    }

    /// Evaluate every component separately
    pub fn breakdown(&self, ground_truth: &Tensor, pred: &Tensor) -> Result<LossBreakdown> {
        let l1 = self.l1.forward(pred, ground_truth)?.to_scalar::<f32>()?;
        let dice = self.dice.forward(pred, ground_truth)?.to_scalar::<f32>()?;
        let ssim = self.ssim.score(ground_truth, pred)?;
        let total = (L1_WEIGHT * l1 as f64
            + DICE_WEIGHT * dice as f64
            + SSIM_WEIGHT * (1.0 - ssim as f64)) as f32;
        Ok(LossBreakdown { l1, dice, ssim, total })
    }

    fn pixel_terms(&self, ground_truth: &Tensor, pred: &Tensor) -> Result<Tensor> {
        let l1 = self.l1.forward(pred, ground_truth)?.affine(L1_WEIGHT, 0.0)?;
        let dice = self.dice.forward(pred, ground_truth)?.affine(DICE_WEIGHT, 0.0)?;
        l1 + dice
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use candle_core::{DType, Var};

    /// 4x4 mask with the top-left 2x2 block set
    fn mask() -> Tensor {
        let mut data = vec![0f32; 16];
        for i in [0, 1, 4, 5] {
            data[i] = 1.0;
        }
        Tensor::from_vec(data, (1, 1, 4, 4), &Device::Cpu).unwrap()
    }

    fn scalar(t: &Tensor) -> f32 {
        t.to_scalar::<f32>().unwrap()
    }

    #[test]
    fn test_perfect_prediction_has_zero_loss() {
        let loss_fn = CompositeLoss::new(&Device::Cpu, false).unwrap();
        let gt = mask();
        assert_relative_eq!(scalar(&loss_fn.forward(&gt, &gt).unwrap()), 0.0, epsilon = 1e-5);
    }

    #[test]
    fn test_breakdown_matches_forward() {
        let loss_fn = CompositeLoss::new(&Device::Cpu, false).unwrap();
        let gt = mask();
        let pred = Tensor::full(0.3f32, (1, 1, 4, 4), &Device::Cpu).unwrap();

        let total = scalar(&loss_fn.forward(&gt, &pred).unwrap());
        let parts = loss_fn.breakdown(&gt, &pred).unwrap();
        assert_relative_eq!(parts.total, total, epsilon = 1e-5);
        assert_relative_eq!(parts.l1, (4.0 * 0.7 + 12.0 * 0.3) / 16.0, epsilon = 1e-6);
    }

    #[test]
    fn test_gradient_mode_gives_same_value() {
        let gt = mask();
        let pred = Tensor::full(0.6f32, (1, 1, 4, 4), &Device::Cpu).unwrap();
        let detached = CompositeLoss::new(&Device::Cpu, false).unwrap();
        let attached = CompositeLoss::new(&Device::Cpu, true).unwrap();
        assert_relative_eq!(
            scalar(&detached.forward(&gt, &pred).unwrap()),
            scalar(&attached.forward(&gt, &pred).unwrap()),
            epsilon = 1e-5
        );
    }

    #[test]
    fn test_interpolation_toward_ground_truth_decreases_pixel_terms() {
        let gt = mask();
        let start = Tensor::full(0.5f32, (1, 1, 4, 4), &Device::Cpu).unwrap();
        let l1 = L1Loss::new();
        let dice = DiceLoss::new();

        let mut previous = (f32::INFINITY, f32::INFINITY);
        for step in 0..=4 {
            let t = step as f64 / 4.0;
            let pred = (gt.affine(t, 0.0).unwrap() + start.affine(1.0 - t, 0.0).unwrap()).unwrap();
            let current = (
                scalar(&l1.forward(&pred, &gt).unwrap()),
                scalar(&dice.forward(&pred, &gt).unwrap()),
            );
            assert!(current.0 < previous.0, "L1 did not decrease at t={t}");
            assert!(current.1 < previous.1, "Dice did not decrease at t={t}");
            previous = current;
        }
    }

    #[test]
    fn test_gradients_flow_to_prediction() {
        let gt = mask();
        let pred = Var::from_tensor(&Tensor::full(0.5f32, (1, 1, 4, 4), &Device::Cpu).unwrap()).unwrap();

        for ssim_gradient in [false, true] {
            let loss_fn = CompositeLoss::new(&Device::Cpu, ssim_gradient).unwrap();
            let loss = loss_fn.forward(&gt, pred.as_tensor()).unwrap();
            let grads = loss.backward().unwrap();
            let grad = grads.get(pred.as_tensor()).unwrap();
            assert_eq!(grad.dtype(), DType::F32);
            let magnitude: f32 = grad.abs().unwrap().sum_all().unwrap().to_scalar().unwrap();
            assert!(magnitude > 0.0);
        }
    }
}
