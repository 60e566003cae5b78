//! Training configuration.
//!
//! Settings are a flat set of keys. They can be given as `key = value` text
//! (one per line, `#` starts a comment) or as JSON through burn's
//! [`Config`] loader:
//!
//! ```text
//! # volseg.cfg
//! base_channel_width = 16
//! epoch_count = 10
//! batch_size = 1
//! learning_rate = 5e-5
//! dropout_rate = 0.0
//! alignment_policy = crop
//! ```

use std::fs;
use std::path::Path;
use std::str::FromStr;

use burn::config::Config;
use volseg_model::{AlignmentPolicy, SegmentationNetworkConfig};

use crate::error::{Result as TrainingResult, TrainingError};

/// Hyperparameters and run settings.
#[derive(Config, Debug, PartialEq)]
pub struct TrainingConfig {
    /// Channel width of the first network level
    #[config(default = "16")]
    pub base_channel_width: usize,
    /// Number of downsampling stages
    #[config(default = "4")]
    pub depth: usize,
    /// Passes over the training set
    #[config(default = "10")]
    pub epoch_count: usize,
    /// Samples per optimizer step
    #[config(default = "1")]
    pub batch_size: usize,
    /// Adam step size
    #[config(default = "5e-5")]
    pub learning_rate: f64,
    /// Channel dropout probability
    #[config(default = "0.0")]
    pub dropout_rate: f64,
    /// Skip alignment policy
    #[config(default = "AlignmentPolicy::Crop")]
    pub alignment_policy: AlignmentPolicy,
    /// Seed for weight init and batch shuffling
    #[config(default = "42")]
    pub seed: u64,
    /// Reshuffle training samples every epoch
    #[config(default = "true")]
    pub shuffle: bool,
    /// Log every n-th step
    #[config(default = "1")]
    pub log_interval: usize,
}

impl TrainingConfig {
    /// Recognized keys, in file order.
    pub const KEYS: [&'static str; 10] = [
        "base_channel_width",
        "depth",
        "epoch_count",
        "batch_size",
        "learning_rate",
        "dropout_rate",
        "alignment_policy",
        "seed",
        "shuffle",
        "log_interval",
    ];

    /// Parse `key = value` lines on top of the defaults.
    pub fn from_key_values(text: &str) -> TrainingResult<Self> {
        let mut config = Self::new();
        for (number, raw) in text.lines().enumerate() {
            let line = raw.split('#').next().unwrap_or_default().trim();
            if line.is_empty() {
                continue;
            }
            let (key, value) = line.split_once('=').ok_or_else(|| {
                TrainingError::invalid_configuration(format!(
                    "line {}: expected `key = value`, got {line:?}",
                    number + 1
                ))
            })?;
            config.set(key.trim(), value.trim())?;
        }
        config.validate()?;
        Ok(config)
    }

    /// Load from a file: JSON when the extension is `.json`, `key = value`
    /// text otherwise.
    pub fn from_file<P: AsRef<Path>>(path: P) -> TrainingResult<Self> {
        let path = path.as_ref();
        let is_json = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("json"));

        let config = if is_json {
            Self::load(path).map_err(|e| TrainingError::invalid_configuration(e.to_string()))?
        } else {
            Self::from_key_values(&fs::read_to_string(path)?)?
        };
        config.validate()?;
        Ok(config)
    }

    /// Set one key from its textual value.
    pub fn set(&mut self, key: &str, value: &str) -> TrainingResult<()> {
        match key {
            "base_channel_width" => self.base_channel_width = parse(key, value)?,
            "depth" => self.depth = parse(key, value)?,
            "epoch_count" => self.epoch_count = parse(key, value)?,
            "batch_size" => self.batch_size = parse(key, value)?,
            "learning_rate" => self.learning_rate = parse(key, value)?,
            "dropout_rate" => self.dropout_rate = parse(key, value)?,
            "alignment_policy" => {
                self.alignment_policy = value
                    .trim_matches('"')
                    .parse()
                    .map_err(|e: volseg_model::ModelError| TrainingError::invalid_configuration(e.to_string()))?
            }
            "seed" => self.seed = parse(key, value)?,
            "shuffle" => self.shuffle = parse(key, value)?,
            "log_interval" => self.log_interval = parse(key, value)?,
            _ => {
                return Err(TrainingError::invalid_configuration(format!(
                    "unknown key {key:?} (expected one of {})",
                    Self::KEYS.join(", ")
                )))
            }
        }
        Ok(())
    }

    pub fn validate(&self) -> TrainingResult<()> {
        let positive = [
            ("base_channel_width", self.base_channel_width),
            ("depth", self.depth),
            ("epoch_count", self.epoch_count),
            ("batch_size", self.batch_size),
            ("log_interval", self.log_interval),
        ];
        for (key, value) in positive {
            if value == 0 {
                return Err(TrainingError::invalid_configuration(format!("{key} must be positive")));
            }
        }
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            return Err(TrainingError::invalid_configuration(format!(
                "learning_rate must be a positive number, got {}",
                self.learning_rate
            )));
        }
        if !(0.0..1.0).contains(&self.dropout_rate) {
            return Err(TrainingError::invalid_configuration(format!(
                "dropout_rate must be in [0, 1), got {}",
                self.dropout_rate
            )));
        }
        self.network()
            .validate()
            .map_err(|e| TrainingError::invalid_configuration(e.to_string()))
    }

    /// Network configuration implied by these settings.
    pub fn network(&self) -> SegmentationNetworkConfig {
        SegmentationNetworkConfig::new()
            .with_base_channels(self.base_channel_width)
            .with_depth(self.depth)
            .with_dropout(self.dropout_rate)
            .with_alignment(self.alignment_policy)
    }
}

fn parse<T: FromStr>(key: &str, value: &str) -> TrainingResult<T>
where
    T::Err: std::fmt::Display,
{
    value
        .parse()
        .map_err(|e| TrainingError::invalid_configuration(format!("{key} = {value:?}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = TrainingConfig::new();
        assert_eq!(config.base_channel_width, 16);
        assert_eq!(config.epoch_count, 10);
        assert_eq!(config.batch_size, 1);
        assert_eq!(config.learning_rate, 5e-5);
        assert_eq!(config.dropout_rate, 0.0);
        assert_eq!(config.alignment_policy, AlignmentPolicy::Crop);
        assert_eq!(config.seed, 42);
        assert!(config.shuffle);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_key_values() {
        let text = "# run settings\n\
            base_channel_width = 8\n\
            learning_rate = 1e-3   # faster\n\
            \n\
            alignment_policy = pad\n\
            shuffle = false\n";
        let config = TrainingConfig::from_key_values(text).unwrap();
        assert_eq!(config.base_channel_width, 8);
        assert_eq!(config.learning_rate, 1e-3);
        assert_eq!(config.alignment_policy, AlignmentPolicy::Pad);
        assert!(!config.shuffle);
        assert_eq!(config.epoch_count, 10);
    }

    #[test]
    fn test_rejects_bad_input() {
        for text in [
            "unknown_key = 1",
            "batch_size = many",
            "batch_size = 0",
            "dropout_rate = 1.5",
            "learning_rate = -1",
            "alignment_policy = mirror",
            "epoch_count 10",
            "depth = 64",
            "depth = 9",
            "base_channel_width = 4611686018427387904",
        ] {
            assert!(
                matches!(
                    TrainingConfig::from_key_values(text),
                    Err(TrainingError::InvalidConfiguration(_))
                ),
                "{text:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_network_config() {
        let config = TrainingConfig::new()
            .with_base_channel_width(4)
            .with_depth(2)
            .with_alignment_policy(AlignmentPolicy::Pad);
        let network = config.network();
        assert_eq!(network.channel_schedule(), vec![4, 8, 16]);
        assert_eq!(network.alignment, AlignmentPolicy::Pad);
    }

    #[test]
    fn test_json_file() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("run.json");
        let config = TrainingConfig::new().with_epoch_count(3).with_alignment_policy(AlignmentPolicy::Pad);
        config.save(&path).unwrap();

        let loaded = TrainingConfig::from_file(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_text_file() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("run.cfg");
        fs::write(&path, "epoch_count = 2\nbatch_size = 2\n").unwrap();

        let loaded = TrainingConfig::from_file(&path).unwrap();
        assert_eq!(loaded.epoch_count, 2);
        assert_eq!(loaded.batch_size, 2);
    }
}
