//! Synchronous data loader for fusion training

use std::sync::Arc;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{collate, DataError, Dataset, FusionBatch};

/// Configuration for DataLoader
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataLoaderConfig {
    /// Batch size
    pub batch_size: usize,
    /// Whether to shuffle data each epoch
    pub shuffle: bool,
    /// Seed for shuffling (OS entropy when unset)
    pub seed: Option<u64>,
}

impl Default for DataLoaderConfig {
    fn default() -> Self {
        Self {
            batch_size: 8,
            shuffle: true,
            seed: None,
        }
    }
}

/// Batched view over a dataset
///
/// The final batch may be smaller than `batch_size`. Iterating is restartable:
/// every call to [`DataLoader::batches`] starts a new epoch with a fresh order.
pub struct DataLoader {
    dataset: Arc<dyn Dataset>,
    config: DataLoaderConfig,
    rng: StdRng,
}

impl DataLoader {
    /// Create a new DataLoader
    pub fn new(dataset: Arc<dyn Dataset>, config: DataLoaderConfig) -> Result<Self, DataError> {
        if config.batch_size == 0 {
            return Err(DataError::BatchCollation {
                reason: "batch size must be greater than 0".to_string(),
            });
        }

        info!(
            "Creating DataLoader with batch_size={}, shuffle={}, samples={}",
            config.batch_size,
            config.shuffle,
            dataset.len()
        );

        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };

        Ok(Self { dataset, config, rng })
    }

    /// Number of batches per epoch
    pub fn len(&self) -> usize {
        self.dataset.len().div_ceil(self.config.batch_size)
    }

    /// Whether the loader yields no batches
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of samples in the underlying dataset
    pub fn dataset_size(&self) -> usize {
        self.dataset.len()
    }

    /// Batch size
    pub fn batch_size(&self) -> usize {
        self.config.batch_size
    }

    /// Start an epoch
    pub fn batches(&mut self) -> BatchIter<'_> {
        let mut indices: Vec<usize> = (0..self.dataset.len()).collect();
        if self.config.shuffle {
            indices.shuffle(&mut self.rng);
            debug!("Shuffled {} indices", indices.len());
        }

        BatchIter {
            dataset: self.dataset.as_ref(),
            indices,
            batch_size: self.config.batch_size,
            position: 0,
        }
    }
}

/// Iterator over the batches of one epoch
pub struct BatchIter<'a> {
    dataset: &'a dyn Dataset,
    indices: Vec<usize>,
    batch_size: usize,
    position: usize,
}

impl Iterator for BatchIter<'_> {
    type Item = Result<FusionBatch, DataError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.position >= self.indices.len() {
            return None;
        }

        let end = (self.position + self.batch_size).min(self.indices.len());
        let chunk = &self.indices[self.position..end];
        self.position = end;

        let samples: Result<Vec<_>, _> = chunk.iter().map(|&i| self.dataset.get(i)).collect();
        Some(samples.and_then(|s| collate(&s)))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = (self.indices.len() - self.position).div_ceil(self.batch_size);
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for BatchIter<'_> {}
