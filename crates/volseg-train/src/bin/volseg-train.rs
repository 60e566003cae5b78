use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use burn::backend::Autodiff;
use clap::Parser;
use serde::Serialize;
use tracing::info;
use tracing_subscriber::EnvFilter;
use volseg_core::RegionOfInterest;
use volseg_model::AlignmentPolicy;
use volseg_train::pipeline::{discover_pairs, load_dataset, DEFAULT_REGION};
use volseg_train::{
    AdamOptimizer, ConsoleProgressCallback, DataFeed, EvaluationReport, ProgressBarCallback,
    ProgressTracker, Trainer, TrainingConfig, TrainingReport,
};

#[cfg(not(feature = "wgpu"))]
type TrainBackend = Autodiff<burn_ndarray::NdArray<f32>>;
#[cfg(feature = "wgpu")]
type TrainBackend = Autodiff<burn::backend::Wgpu>;

#[derive(Parser)]
#[command(name = "volseg-train")]
#[command(about = "Train a 3D U-Net on DICOM scans with MetaImage labels")]
struct Cli {
    /// Root directory holding one DICOM series per subdirectory
    #[arg(long)]
    dicom_dir: PathBuf,

    /// Directory holding the .mhd/.mha label files
    #[arg(long)]
    label_dir: PathBuf,

    /// Settings file (`key = value` lines, or JSON with a .json extension)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Training region, z0,y0,x0,dz,dy,dx (slice axis first)
    #[arg(long, default_value = DEFAULT_REGION)]
    roi: RegionOfInterest,

    /// Fraction of samples used for training; the rest are held out for evaluation
    #[arg(long, default_value_t = 1.0)]
    train_fraction: f64,

    /// Write a JSON run report here
    #[arg(long)]
    report: Option<PathBuf>,

    /// Hide the progress bar
    #[arg(short, long)]
    quiet: bool,

    #[arg(long)]
    base_channel_width: Option<usize>,
    #[arg(long)]
    depth: Option<usize>,
    #[arg(long)]
    epoch_count: Option<usize>,
    #[arg(long)]
    batch_size: Option<usize>,
    #[arg(long)]
    learning_rate: Option<f64>,
    #[arg(long)]
    dropout_rate: Option<f64>,
    #[arg(long)]
    alignment_policy: Option<AlignmentPolicy>,
    #[arg(long)]
    seed: Option<u64>,
    #[arg(long)]
    shuffle: Option<bool>,
    #[arg(long)]
    log_interval: Option<usize>,
}

impl Cli {
    fn training_config(&self) -> Result<TrainingConfig> {
        let mut config = match &self.config {
            Some(path) => TrainingConfig::from_file(path)
                .with_context(|| format!("loading settings from {}", path.display()))?,
            None => TrainingConfig::new(),
        };

        if let Some(v) = self.base_channel_width {
            config.base_channel_width = v;
        }
        if let Some(v) = self.depth {
            config.depth = v;
        }
        if let Some(v) = self.epoch_count {
            config.epoch_count = v;
        }
        if let Some(v) = self.batch_size {
            config.batch_size = v;
        }
        if let Some(v) = self.learning_rate {
            config.learning_rate = v;
        }
        if let Some(v) = self.dropout_rate {
            config.dropout_rate = v;
        }
        if let Some(v) = self.alignment_policy {
            config.alignment_policy = v;
        }
        if let Some(v) = self.seed {
            config.seed = v;
        }
        if let Some(v) = self.shuffle {
            config.shuffle = v;
        }
        if let Some(v) = self.log_interval {
            config.log_interval = v;
        }

        config.validate()?;
        Ok(config)
    }
}

#[derive(Serialize)]
struct RunReport {
    config: TrainingConfig,
    region: RegionOfInterest,
    training: TrainingReport,
    evaluation: EvaluationReport,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = cli.training_config()?;
    let device = Default::default();

    let pairs = discover_pairs(&cli.dicom_dir, &cli.label_dir)?;
    info!("Found {} scan/label pairs", pairs.len());
    let dataset = load_dataset::<TrainBackend>(&pairs, &cli.roi, &device)?;
    let (train, holdout) = dataset.split(cli.train_fraction)?;
    info!("Training on {} samples, {} held out", train.len(), holdout.len());

    let steps = DataFeed::new(&train, config.batch_size, config.seed)?.num_batches();
    let bar = if cli.quiet {
        ProgressBarCallback::hidden()
    } else {
        ProgressBarCallback::new((steps * config.epoch_count) as u64)
    };
    let tracker = ProgressTracker::new()
        .with_callback(Arc::new(ConsoleProgressCallback::new(config.log_interval)))
        .with_callback(Arc::new(bar));

    let trainer = Trainer::<TrainBackend>::with_tracker(config.clone(), tracker)?;
    let model = trainer.init_model(&device)?;
    info!(
        "Network: depth {}, channels {:?}, alignment {}",
        model.depth(),
        model.channels(),
        model.alignment()
    );

    let mut optimizer = AdamOptimizer::new(config.learning_rate);
    let (model, training) = trainer.fit(model, &mut optimizer, &train)?;

    // With nothing held out, score the training set in fixed order.
    let eval_set = if holdout.is_empty() { &train } else { &holdout };
    let evaluation = trainer.evaluate(&model, eval_set)?;

    if let Some(path) = &cli.report {
        let report = RunReport {
            config,
            region: cli.roi,
            training,
            evaluation,
        };
        fs::write(path, serde_json::to_string_pretty(&report)?)
            .with_context(|| format!("writing report to {}", path.display()))?;
        info!("Report written to {}", path.display());
    }

    Ok(())
}
