use serde::{Serialize, Deserialize};

use crate::error::{Error, Result};

/// Hyperparameters of the iterative (gradient) fitting procedure.
///
/// # Fields
/// - `n_epochs`     : pass budget over the training set
/// - `batch_size`   : samples per mini-batch; `1` is online SGD
/// - `learning_rate`: SGD step size
/// - `patience`     : passes without validation improvement before stopping
/// - `min_delta`    : minimum decrease of the monitored loss that counts as
///                     an improvement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IterativeConfig {
    pub n_epochs: usize,
    pub batch_size: usize,
    pub learning_rate: f64,
    pub patience: usize,
    #[serde(default)]
    pub min_delta: f64,
}

impl Default for IterativeConfig {
    fn default() -> Self {
        IterativeConfig {
            n_epochs: 512,
            batch_size: 64,
            learning_rate: 0.05,
            patience: 32,
            min_delta: 0.0,
        }
    }
}

impl IterativeConfig {
    pub fn new(n_epochs: usize, batch_size: usize, patience: usize) -> Self {
        IterativeConfig { n_epochs, batch_size, patience, ..Self::default() }
    }

    pub fn with_learning_rate(mut self, learning_rate: f64) -> Self {
        self.learning_rate = learning_rate;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.n_epochs == 0 {
            return Err(Error::config("n_epochs must be at least 1"));
        }
        if self.batch_size == 0 {
            return Err(Error::config("batch_size must be at least 1"));
        }
        if self.patience == 0 {
            return Err(Error::config("patience must be at least 1"));
        }
        if !(self.learning_rate > 0.0 && self.learning_rate.is_finite()) {
            return Err(Error::config(format!(
                "learning_rate must be positive, got {}", self.learning_rate
            )));
        }
        if self.min_delta < 0.0 {
            return Err(Error::config("min_delta must not be negative"));
        }
        Ok(())
    }
}
