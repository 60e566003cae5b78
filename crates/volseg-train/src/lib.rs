//! Training for the volseg segmentation network.
//!
//! - [`config`]: flat key/value run settings
//! - [`data`]: in-memory dataset and seeded batch feed
//! - [`pipeline`]: DICOM/MetaImage pairs from disk into a dataset
//! - [`trainer`]: step, fit and evaluate
//! - [`progress`]: per-step reporting callbacks

pub mod config;
pub mod data;
pub mod error;
pub mod optimizer;
pub mod pipeline;
pub mod progress;
pub mod trainer;

pub use config::TrainingConfig;
pub use data::{Batch, DataFeed, VoxelDataset, VoxelSample};
pub use error::{Result, TrainingError};
pub use optimizer::{AdamOptimizer, Optimizer};
pub use progress::{
    ConsoleProgressCallback, HistoryCallback, ProgressBarCallback, ProgressCallback, ProgressInfo,
    ProgressTracker,
};
pub use trainer::{EpochSummary, EvaluationReport, Trainer, TrainingReport};
