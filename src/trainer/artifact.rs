use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::trainer::{FitReport, ModelState, Subset, TrainingStrategy};

/// Fitted models of one (trainer, fold) cell. Written once and replaced
/// wholesale on retrain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainedArtifact {
    pub trainer_id: String,
    pub fold: usize,
    /// Identity of the (experiment, trainer) specification that produced it.
    pub fingerprint: String,
    pub strategy: TrainingStrategy,
    pub n_targets: usize,
    pub input_size: usize,
    /// One model for multiclass, one per class for class-specific.
    pub models: Vec<ModelState>,
    pub reports: Vec<FitReport>,
    pub created_at: DateTime<Utc>,
}

impl TrainedArtifact {
    /// Distinguishes this artifact from any later retrain of the same cell.
    pub fn stamp(&self) -> String {
        format!(
            "{}@{}",
            self.fingerprint,
            self.created_at.to_rfc3339_opts(SecondsFormat::Nanos, true)
        )
    }

    /// Largest number of passes any sub-model ran.
    pub fn epochs_run(&self) -> usize {
        self.reports.iter().map(|r| r.epochs_run).max().unwrap_or(0)
    }
}

/// Ordered (ground truth, prediction) pairs of one (trainer, fold, subset).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionRecord {
    pub trainer_id: String,
    pub fold: usize,
    pub subset: Subset,
    pub fingerprint: String,
    /// [`TrainedArtifact::stamp`] of the artifact that produced it.
    pub artifact_stamp: String,
    /// Digest of `ids`; a changed subset definition invalidates the record.
    pub subset_digest: String,
    pub ids: Vec<String>,
    pub targets: Vec<usize>,
    pub predictions: Vec<usize>,
}

impl PredictionRecord {
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}
