//! Data loading infrastructure for fusion training
//!
//! This module provides the dataset abstraction, the on-disk file index for
//! the four aligned modalities, batch collation and a synchronous data loader.

use candle_core::Tensor;

pub mod datasets;
pub mod loaders;
pub mod batching;

// Re-exports
pub use datasets::{FileIndex, FusionDataset, Modality, Split};
pub use loaders::{DataLoader, DataLoaderConfig};
pub use batching::{collate, FusionBatch};

/// Common trait for all training datasets
pub trait Dataset: Send + Sync {
    /// Get the number of samples in the dataset
    fn len(&self) -> usize;

    /// Check if the dataset is empty
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Get a sample by index
    fn get(&self, index: usize) -> Result<FusionSample, DataError>;
}

/// One aligned training sample, each tensor shaped `[C, H, W]`
#[derive(Debug, Clone)]
pub struct FusionSample {
    /// First source image
    pub source_a: Tensor,
    /// Second source image
    pub source_b: Tensor,
    /// Fused ground-truth image
    pub ground_truth: Tensor,
    /// Ground-truth decision map (single channel)
    pub decision_map: Tensor,
}

/// Error types for data loading
#[derive(thiserror::Error, Debug)]
pub enum DataError {
    #[error("Invalid sample index: {index} >= {dataset_size}")]
    InvalidIndex { index: usize, dataset_size: usize },

    #[error("Misaligned {split} data: {reason}")]
    Misaligned { split: String, reason: String },

    #[error("Failed to decode image {path}: {source}")]
    Image {
        path: String,
        #[source]
        source: image::ImageError,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Tensor error: {0}")]
    Tensor(#[from] candle_core::Error),

    #[error("Batch collation error: {reason}")]
    BatchCollation { reason: String },
}
