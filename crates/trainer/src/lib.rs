pub mod callback;
pub mod error;
pub mod hpo;
pub mod train;

pub use callback::{CallbackAction, CallbackContext, EarlyStopping, TrainerCallback};
pub use error::{Result, TrainError};
pub use train::{evaluate, seed_everything, EpochRecord, EvalMetrics, FitSummary, Trainer};

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Metric that drives checkpointing, early stopping and pruning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Monitor {
    #[default]
    ValLoss,
    ValAccuracy,
    TrainLoss,
}

impl Monitor {
    pub fn higher_is_better(self) -> bool {
        matches!(self, Monitor::ValAccuracy)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EarlyStoppingConfig {
    pub patience: usize,
    pub min_delta: f64,
}

impl Default for EarlyStoppingConfig {
    fn default() -> Self {
        Self {
            patience: 3,
            min_delta: 1e-4,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainerConfig {
    pub learning_rate: f64,
    pub max_epochs: usize,
    pub checkpoint_dir: String,
    pub monitor: Monitor,
    pub seed: u64,
    pub early_stopping: Option<EarlyStoppingConfig>,
    pub grad_clip: Option<f64>,
    pub log_every_n_steps: usize,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            learning_rate: 1e-3,
            max_epochs: 15,
            checkpoint_dir: "./checkpoints".to_string(),
            monitor: Monitor::ValLoss,
            seed: 42,
            early_stopping: Some(EarlyStoppingConfig::default()),
            grad_clip: None,
            log_every_n_steps: 50,
        }
    }
}

impl TrainerConfig {
    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&content)?)
    }

    /// Reads `path` when it exists, otherwise falls back to the defaults.
    pub fn load_or_default<P: AsRef<Path>>(path: Option<P>) -> Result<Self> {
        match path {
            Some(path) if path.as_ref().exists() => Self::from_yaml_file(path),
            Some(path) => {
                log::warn!("No trainer config at {:?}, using defaults", path.as_ref());
                Ok(Self::default())
            }
            None => Ok(Self::default()),
        }
    }
}
