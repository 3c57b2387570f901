use serde::{Serialize, Deserialize};

/// Statistics of one completed pass, kept in the artifact's training history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochStats {
    /// 1-based pass number.
    pub epoch: usize,
    /// Mean training loss over the pass.
    pub train_loss: f64,
    /// Mean validation loss, when a validation set was provided.
    pub val_loss: Option<f64>,
    /// Validation accuracy in [0, 1], when a validation set was provided.
    pub val_accuracy: Option<f64>,
    /// The score early stopping watched for this pass (lower is better).
    pub monitored: f64,
}
