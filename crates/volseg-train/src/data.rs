//! In-memory dataset and batch feed.

use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use volseg_core::Volume;
use volseg_model::io::volumes_to_batch;

use crate::error::{Result, TrainingError};

/// One scan with its binary label, same spatial shape.
#[derive(Debug, Clone)]
pub struct VoxelSample<B: Backend> {
    pub input: Volume<B>,
    pub label: Volume<B>,
}

impl<B: Backend> VoxelSample<B> {
    pub fn new(input: Volume<B>, label: Volume<B>) -> Result<Self> {
        if input.shape() != label.shape() {
            return Err(TrainingError::ShapeMismatch {
                expected: input.shape().to_vec(),
                actual: label.shape().to_vec(),
            });
        }
        Ok(Self { input, label })
    }

    pub fn shape(&self) -> [usize; 3] {
        self.input.shape()
    }
}

/// Samples sharing one spatial shape.
#[derive(Debug, Clone)]
pub struct VoxelDataset<B: Backend> {
    samples: Vec<VoxelSample<B>>,
}

impl<B: Backend> Default for VoxelDataset<B> {
    fn default() -> Self {
        Self { samples: Vec::new() }
    }
}

impl<B: Backend> VoxelDataset<B> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_samples(samples: Vec<VoxelSample<B>>) -> Result<Self> {
        let mut dataset = Self::new();
        for sample in samples {
            dataset.push(sample)?;
        }
        Ok(dataset)
    }

    /// Add a sample. Its shape must match the samples already present.
    pub fn push(&mut self, sample: VoxelSample<B>) -> Result<()> {
        if let Some(shape) = self.shape() {
            if sample.shape() != shape {
                return Err(TrainingError::ShapeMismatch {
                    expected: shape.to_vec(),
                    actual: sample.shape().to_vec(),
                });
            }
        }
        self.samples.push(sample);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&VoxelSample<B>> {
        self.samples.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &VoxelSample<B>> {
        self.samples.iter()
    }

    /// Spatial shape shared by all samples.
    pub fn shape(&self) -> Option<[usize; 3]> {
        self.samples.first().map(VoxelSample::shape)
    }

    /// Split into `(train, holdout)`, keeping order. The first
    /// `round(len * train_fraction)` samples go to training.
    pub fn split(self, train_fraction: f64) -> Result<(Self, Self)> {
        if !(0.0..=1.0).contains(&train_fraction) {
            return Err(TrainingError::invalid_configuration(format!(
                "train fraction must be in [0, 1], got {train_fraction}"
            )));
        }
        let n_train = (self.samples.len() as f64 * train_fraction).round() as usize;
        let mut train = self.samples;
        let holdout = train.split_off(n_train);
        Ok((Self { samples: train }, Self { samples: holdout }))
    }
}

/// A stacked batch, `[N, 1, Z, Y, X]` each.
#[derive(Debug, Clone)]
pub struct Batch<B: Backend> {
    pub inputs: Tensor<B, 5>,
    pub labels: Tensor<B, 5>,
    /// Dataset indices of the stacked samples, in batch order.
    pub indices: Vec<usize>,
}

/// Groups dataset samples into batches, optionally reshuffled on every pass.
pub struct DataFeed<'a, B: Backend> {
    dataset: &'a VoxelDataset<B>,
    batch_size: usize,
    rng: StdRng,
}

impl<'a, B: Backend> DataFeed<'a, B> {
    pub fn new(dataset: &'a VoxelDataset<B>, batch_size: usize, seed: u64) -> Result<Self> {
        if batch_size == 0 {
            return Err(TrainingError::invalid_configuration("batch_size must be positive"));
        }
        Ok(Self {
            dataset,
            batch_size,
            rng: StdRng::seed_from_u64(seed),
        })
    }

    /// Batches per pass; the last batch may be smaller.
    pub fn num_batches(&self) -> usize {
        self.dataset.len().div_ceil(self.batch_size)
    }

    /// One pass over the dataset.
    ///
    /// With `shuffle` the sample order is a fresh permutation drawn from the
    /// feed's seeded generator; without it the dataset order is kept.
    pub fn batches(&mut self, shuffle: bool) -> BatchIter<'a, B> {
        let mut order: Vec<usize> = (0..self.dataset.len()).collect();
        if shuffle {
            order.shuffle(&mut self.rng);
        }
        BatchIter {
            dataset: self.dataset,
            order,
            batch_size: self.batch_size,
            cursor: 0,
        }
    }
}

/// Iterator over the batches of one pass.
pub struct BatchIter<'a, B: Backend> {
    dataset: &'a VoxelDataset<B>,
    order: Vec<usize>,
    batch_size: usize,
    cursor: usize,
}

impl<B: Backend> Iterator for BatchIter<'_, B> {
    type Item = Result<Batch<B>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.cursor >= self.order.len() {
            return None;
        }
        let end = (self.cursor + self.batch_size).min(self.order.len());
        let indices = self.order[self.cursor..end].to_vec();
        self.cursor = end;

        let (inputs, labels): (Vec<_>, Vec<_>) = indices
            .iter()
            .map(|&i| {
                let sample = &self.dataset.samples[i];
                (sample.input.clone(), sample.label.clone())
            })
            .unzip();

        let batch = volumes_to_batch(&inputs)
            .and_then(|inputs| Ok((inputs, volumes_to_batch(&labels)?)))
            .map(|(inputs, labels)| Batch {
                inputs,
                labels,
                indices,
            })
            .map_err(TrainingError::from);
        Some(batch)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = (self.order.len() - self.cursor).div_ceil(self.batch_size);
        (remaining, Some(remaining))
    }
}
