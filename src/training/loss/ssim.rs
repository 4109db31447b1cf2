//! Structural similarity index

use candle_core::{DType, Device, Result, Tensor};

const C1: f64 = 0.01 * 0.01;
const C2: f64 = 0.03 * 0.03;

/// SSIM with a normalized Gaussian window applied per channel
#[derive(Debug, Clone)]
pub struct Ssim {
    window_size: usize,
    /// `[1, 1, k, k]`
    window: Tensor,
}

impl Ssim {
    /// 11x11 window with sigma 1.5
    pub fn new(device: &Device) -> Result<Self> {
        Self::with_window(11, 1.5, device)
    }

    pub fn with_window(window_size: usize, sigma: f64, device: &Device) -> Result<Self> {
        let center = (window_size / 2) as f64;
        let gauss: Vec<f64> = (0..window_size)
            .map(|i| (-((i as f64 - center).powi(2)) / (2.0 * sigma * sigma)).exp())
            .collect();
        let total: f64 = gauss.iter().sum();
        let gauss: Vec<f32> = gauss.iter().map(|g| (g / total) as f32).collect();

        let g = Tensor::from_vec(gauss, (window_size, 1), device)?;
        let window = g
            .matmul(&g.t()?)?
            .reshape((1, 1, window_size, window_size))?;

        Ok(Self { window_size, window })
    }

    /// Mean SSIM between two `[N, C, H, W]` tensors
    pub fn forward(&self, img1: &Tensor, img2: &Tensor) -> Result<Tensor> {
        let channels = img1.dim(1)?;
        let window = self
            .window
            .to_device(img1.device())?
            .to_dtype(img1.dtype())?
            .broadcast_as((channels, 1, self.window_size, self.window_size))?
            .contiguous()?;
        let padding = self.window_size / 2;
        let filter = |x: &Tensor| x.conv2d(&window, padding, 1, 1, channels);

        let mu1 = filter(img1)?;
        let mu2 = filter(img2)?;
        let mu1_sq = mu1.sqr()?;
        let mu2_sq = mu2.sqr()?;
        let mu1_mu2 = (&mu1 * &mu2)?;

        let sigma1_sq = (filter(&img1.sqr()?)? - &mu1_sq)?;
        let sigma2_sq = (filter(&img2.sqr()?)? - &mu2_sq)?;
        let sigma12 = (filter(&(img1 * img2)?)? - &mu1_mu2)?;

        let numerator = (mu1_mu2.affine(2.0, C1)? * sigma12.affine(2.0, C2)?)?;
        let denominator =
            ((mu1_sq + mu2_sq)?.affine(1.0, C1)? * (sigma1_sq + sigma2_sq)?.affine(1.0, C2)?)?;

        (numerator / denominator)?.mean_all()
    }

    /// SSIM as a plain number, outside the autograd graph
    pub fn score(&self, img1: &Tensor, img2: &Tensor) -> Result<f32> {
        self.forward(img1, img2)?.to_dtype(DType::F32)?.to_scalar::<f32>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_window_is_normalized() {
        let ssim = Ssim::new(&Device::Cpu).unwrap();
        assert_eq!(ssim.window.dims(), &[1, 1, 11, 11]);
        let total: f32 = ssim.window.sum_all().unwrap().to_scalar().unwrap();
        assert_relative_eq!(total, 1.0, epsilon = 1e-5);
    }

    #[test]
    fn test_identical_images_score_one() {
        let ssim = Ssim::new(&Device::Cpu).unwrap();
        let img = Tensor::rand(0f32, 1f32, (2, 3, 16, 16), &Device::Cpu).unwrap();
        assert_relative_eq!(ssim.score(&img, &img).unwrap(), 1.0, epsilon = 1e-4);
    }

    #[test]
    fn test_different_images_score_lower() {
        let ssim = Ssim::new(&Device::Cpu).unwrap();
        let img = Tensor::rand(0f32, 1f32, (1, 1, 16, 16), &Device::Cpu).unwrap();
        let inverted = img.affine(-1.0, 1.0).unwrap();
        assert!(ssim.score(&img, &inverted).unwrap() < 0.5);
    }
}
