//! Batch collation for fusion samples

use candle_core::{Device, Tensor};

use super::{DataError, FusionSample};

/// A collated batch, each tensor shaped `[N, C, H, W]`
#[derive(Debug, Clone)]
pub struct FusionBatch {
    pub source_a: Tensor,
    pub source_b: Tensor,
    pub ground_truth: Tensor,
    pub decision_map: Tensor,
}

impl FusionBatch {
    /// Number of samples in the batch
    pub fn batch_size(&self) -> usize {
        self.source_a.dims().first().copied().unwrap_or(0)
    }

    /// Move every tensor to a device
    pub fn to_device(&self, device: &Device) -> candle_core::Result<Self> {
        Ok(Self {
            source_a: self.source_a.to_device(device)?,
            source_b: self.source_b.to_device(device)?,
            ground_truth: self.ground_truth.to_device(device)?,
            decision_map: self.decision_map.to_device(device)?,
        })
    }
}

/// Stack samples along a new leading batch dimension
///
/// All samples must share spatial dimensions; use `data.resize` for datasets
/// with mixed image sizes.
pub fn collate(samples: &[FusionSample]) -> Result<FusionBatch, DataError> {
    let first = samples.first().ok_or_else(|| DataError::BatchCollation {
        reason: "cannot collate an empty batch".to_string(),
    })?;

    let reference = first.source_a.dims();
    for (i, sample) in samples.iter().enumerate() {
        for tensor in [&sample.source_a, &sample.source_b, &sample.ground_truth] {
            if tensor.dims() != reference {
                return Err(DataError::BatchCollation {
                    reason: format!(
                        "sample {} has shape {:?}, expected {:?}",
                        i,
                        tensor.dims(),
                        reference
                    ),
                });
            }
        }
        if sample.decision_map.dims()[1..] != reference[1..] {
            return Err(DataError::BatchCollation {
                reason: format!(
                    "decision map of sample {} has shape {:?}, expected spatial size {:?}",
                    i,
                    sample.decision_map.dims(),
                    &reference[1..]
                ),
            });
        }
    }

    let source_a: Vec<&Tensor> = samples.iter().map(|s| &s.source_a).collect();
    let source_b: Vec<&Tensor> = samples.iter().map(|s| &s.source_b).collect();
    let ground_truth: Vec<&Tensor> = samples.iter().map(|s| &s.ground_truth).collect();
    let decision_map: Vec<&Tensor> = samples.iter().map(|s| &s.decision_map).collect();

    Ok(FusionBatch {
        source_a: Tensor::stack(&source_a, 0)?,
        source_b: Tensor::stack(&source_b, 0)?,
        ground_truth: Tensor::stack(&ground_truth, 0)?,
        decision_map: Tensor::stack(&decision_map, 0)?,
    })
}
