//! Training loop for the segmentation network.
//!
//! One step is forward, binary cross-entropy against the labels, backward
//! and one optimizer update. Labels are center-cropped to the network
//! output when the crop policy shrinks odd-sized inputs.

use std::sync::Arc;
use std::time::Instant;

use burn::module::AutodiffModule;
use burn::optim::GradientsParams;
use burn::tensor::backend::{AutodiffBackend, Backend};
use burn::tensor::{ElementConversion, Tensor};
use serde::{Deserialize, Serialize};
use volseg_model::metrics::{dice_coefficient, voxel_accuracy};
use volseg_model::unet::center_crop;
use volseg_model::{BinaryCrossEntropyLoss, SegmentationNetwork};

use crate::config::TrainingConfig;
use crate::data::{Batch, DataFeed, VoxelDataset};
use crate::error::{Result, TrainingError};
use crate::optimizer::Optimizer;
use crate::progress::{ConsoleProgressCallback, ProgressTracker};

/// Probability above which a voxel counts as foreground in evaluation.
pub const FOREGROUND_THRESHOLD: f64 = 0.5;

/// Loss statistics of one epoch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochSummary {
    /// 1-based epoch number
    pub epoch: usize,
    pub steps: usize,
    pub mean_loss: f64,
    pub min_loss: f64,
    pub max_loss: f64,
}

impl EpochSummary {
    fn from_losses(epoch: usize, losses: &[f64]) -> Self {
        let steps = losses.len();
        let mean_loss = if steps == 0 {
            f64::NAN
        } else {
            losses.iter().sum::<f64>() / steps as f64
        };
        Self {
            epoch,
            steps,
            mean_loss,
            min_loss: losses.iter().copied().fold(f64::INFINITY, f64::min),
            max_loss: losses.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        }
    }
}

/// Outcome of [`Trainer::fit`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainingReport {
    pub epochs: Vec<EpochSummary>,
    /// Loss of every optimizer step, in order.
    pub step_losses: Vec<f64>,
    pub elapsed_secs: f64,
}

impl TrainingReport {
    /// Loss of the last step, if any step ran.
    pub fn final_loss(&self) -> Option<f64> {
        self.step_losses.last().copied()
    }
}

/// Outcome of [`Trainer::evaluate`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub samples: usize,
    pub mean_loss: f64,
    pub accuracy: f64,
    pub dice: f64,
}

/// Drives training and evaluation of a [`SegmentationNetwork`].
pub struct Trainer<B: AutodiffBackend> {
    config: TrainingConfig,
    loss: BinaryCrossEntropyLoss<B>,
    tracker: ProgressTracker,
}

impl<B: AutodiffBackend> Trainer<B> {
    /// Trainer that logs progress to tracing at the configured interval.
    pub fn new(config: TrainingConfig) -> Result<Self> {
        let tracker = ProgressTracker::new()
            .with_callback(Arc::new(ConsoleProgressCallback::new(config.log_interval)));
        Self::with_tracker(config, tracker)
    }

    pub fn with_tracker(config: TrainingConfig, tracker: ProgressTracker) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            loss: BinaryCrossEntropyLoss::new(),
            tracker,
        })
    }

    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    /// Seed the backend and build the network described by the config.
    pub fn init_model(&self, device: &B::Device) -> Result<SegmentationNetwork<B>> {
        B::seed(self.config.seed);
        Ok(self.config.network().init(device)?)
    }

    /// One optimizer step on `batch`.
    ///
    /// Returns the updated model and the step's loss.
    pub fn step<O>(
        &self,
        model: SegmentationNetwork<B>,
        optimizer: &mut O,
        batch: &Batch<B>,
    ) -> Result<(SegmentationNetwork<B>, f64)>
    where
        O: Optimizer<SegmentationNetwork<B>, B>,
    {
        let predictions = model.forward(batch.inputs.clone())?;
        let labels = align_labels(batch.labels.clone(), &predictions)?;
        let loss = self.loss.forward(predictions, labels)?;

        let value = loss.clone().into_scalar().elem::<f64>();
        if !value.is_finite() {
            tracing::warn!(loss = value, samples = ?batch.indices, "Non-finite loss");
        }

        let grads = GradientsParams::from_grads(loss.backward(), &model);
        Ok((optimizer.step(model, grads), value))
    }

    /// Train for `epoch_count` passes over `dataset`.
    pub fn fit<O>(
        &self,
        model: SegmentationNetwork<B>,
        optimizer: &mut O,
        dataset: &VoxelDataset<B>,
    ) -> Result<(SegmentationNetwork<B>, TrainingReport)>
    where
        O: Optimizer<SegmentationNetwork<B>, B>,
    {
        if dataset.is_empty() {
            return Err(TrainingError::EmptyDataset);
        }

        self.tracker.start();
        match self.run_epochs(model, optimizer, dataset) {
            Ok((model, report)) => {
                let final_loss = report.final_loss().unwrap_or(f64::NAN);
                self.tracker
                    .complete(self.config.epoch_count, final_loss, optimizer.learning_rate());
                Ok((model, report))
            }
            Err(e) => {
                self.tracker.error(&e.to_string());
                Err(e)
            }
        }
    }

    fn run_epochs<O>(
        &self,
        mut model: SegmentationNetwork<B>,
        optimizer: &mut O,
        dataset: &VoxelDataset<B>,
    ) -> Result<(SegmentationNetwork<B>, TrainingReport)>
    where
        O: Optimizer<SegmentationNetwork<B>, B>,
    {
        let start = Instant::now();
        let epochs = self.config.epoch_count;
        let mut feed = DataFeed::new(dataset, self.config.batch_size, self.config.seed)?;
        let steps = feed.num_batches();
        let mut report = TrainingReport::default();

        for epoch in 1..=epochs {
            let mut losses = Vec::with_capacity(steps);
            for (i, batch) in feed.batches(self.config.shuffle).enumerate() {
                let (updated, loss) = self.step(model, optimizer, &batch?)?;
                model = updated;
                losses.push(loss);
                self.tracker
                    .update((epoch, epochs), (i + 1, steps), loss, optimizer.learning_rate());
            }

            let summary = EpochSummary::from_losses(epoch, &losses);
            self.tracker.epoch_end(epoch, summary.mean_loss);
            report.step_losses.extend(losses);
            report.epochs.push(summary);
        }

        report.elapsed_secs = start.elapsed().as_secs_f64();
        Ok((model, report))
    }

    /// Loss, voxel accuracy and Dice of `model` on `dataset`, in dataset
    /// order with dropout disabled.
    ///
    /// Metrics are averaged over batches.
    pub fn evaluate(
        &self,
        model: &SegmentationNetwork<B>,
        dataset: &VoxelDataset<B>,
    ) -> Result<EvaluationReport> {
        if dataset.is_empty() {
            return Err(TrainingError::EmptyDataset);
        }

        let model = model.valid();
        let loss_fn = BinaryCrossEntropyLoss::<B::InnerBackend>::new();
        let mut feed = DataFeed::new(dataset, self.config.batch_size, self.config.seed)?;

        let (mut loss, mut accuracy, mut dice, mut batches) = (0.0, 0.0, 0.0, 0usize);
        for batch in feed.batches(false) {
            let batch = batch?;
            let predictions = model.forward(batch.inputs.inner())?;
            let labels = align_labels(batch.labels.inner(), &predictions)?;

            loss += loss_fn
                .forward(predictions.clone(), labels.clone())?
                .into_scalar()
                .elem::<f64>();
            accuracy += voxel_accuracy(predictions.clone(), labels.clone(), FOREGROUND_THRESHOLD)?;
            dice += dice_coefficient(predictions, labels, FOREGROUND_THRESHOLD)?;
            batches += 1;
        }

        let n = batches as f64;
        let report = EvaluationReport {
            samples: dataset.len(),
            mean_loss: loss / n,
            accuracy: accuracy / n,
            dice: dice / n,
        };
        tracing::info!(
            "Evaluation: loss {:.4}, accuracy {:.4}, dice {:.4}",
            report.mean_loss,
            report.accuracy,
            report.dice
        );
        Ok(report)
    }
}

/// Center-crop `labels` to the spatial shape of `predictions`.
pub fn align_labels<B: Backend>(labels: Tensor<B, 5>, predictions: &Tensor<B, 5>) -> Result<Tensor<B, 5>> {
    let [_, _, z, y, x] = predictions.dims();
    Ok(center_crop(labels, [z, y, x])?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::tensor::Int;
    use burn_ndarray::NdArray;

    #[test]
    fn test_epoch_summary() {
        let summary = EpochSummary::from_losses(2, &[0.5, 0.25, 0.75]);
        assert_eq!(summary.steps, 3);
        assert_eq!(summary.mean_loss, 0.5);
        assert_eq!(summary.min_loss, 0.25);
        assert_eq!(summary.max_loss, 0.75);
    }

    #[test]
    fn test_align_labels_crops_centered() {
        let device = Default::default();
        let labels = Tensor::<NdArray<f32>, 1, Int>::arange(0..27, &device)
            .float()
            .reshape([1, 1, 3, 3, 3]);
        let predictions = Tensor::<NdArray<f32>, 5>::zeros([1, 1, 2, 2, 2], &device);

        let aligned = align_labels(labels, &predictions).unwrap();
        assert_eq!(aligned.dims(), [1, 1, 2, 2, 2]);
        let values = aligned.into_data().to_vec::<f32>().unwrap();
        assert_eq!(values, vec![0.0, 1.0, 3.0, 4.0, 9.0, 10.0, 12.0, 13.0]);
    }

    #[test]
    fn test_report_json() {
        let report = TrainingReport {
            epochs: vec![EpochSummary::from_losses(1, &[0.7])],
            step_losses: vec![0.7],
            elapsed_secs: 1.5,
        };
        let json = serde_json::to_string(&report).unwrap();
        let back: TrainingReport = serde_json::from_str(&json).unwrap();
        assert_eq!(back, report);
        assert_eq!(back.final_loss(), Some(0.7));
    }
}
