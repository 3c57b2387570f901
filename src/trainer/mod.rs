//! Uniform fit/predict contract over structurally different model families.
//!
//! A [`Trainer`] only knows how to fit one model on encoded labels and how to
//! score an input. Label encoding for the two training strategies, and the
//! decoding of scores back to class predictions, live in [`fit_artifact`]
//! and [`predict_record`] so every family gets both strategies for free.

pub mod artifact;
pub mod forest;
pub mod mlp;
pub mod params;

use std::fmt;
use std::str::FromStr;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::experiment::persist::digest;
use crate::forest::RandomForest;
use crate::network::Network;
use crate::train::loop_fn::argmax;
use crate::train::EpochStats;

pub use artifact::{PredictionRecord, TrainedArtifact};
pub use forest::ForestTrainer;
pub use mlp::MlpTrainer;
pub use params::{ParamGrid, ParamSet, ParamValue};

// ---------------------------------------------------------------------------
// Strategy and subset keys
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrainingStrategy {
    /// One binary model per class; the class whose model scores highest wins.
    ClassSpecific,
    /// One joint model; argmax over its outputs.
    Multiclass,
}

impl TrainingStrategy {
    pub const ALL: [TrainingStrategy; 2] = [TrainingStrategy::ClassSpecific, TrainingStrategy::Multiclass];
}

impl fmt::Display for TrainingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrainingStrategy::ClassSpecific => write!(f, "class_specific"),
            TrainingStrategy::Multiclass => write!(f, "multiclass"),
        }
    }
}

impl FromStr for TrainingStrategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "class_specific" => Ok(TrainingStrategy::ClassSpecific),
            "multiclass" => Ok(TrainingStrategy::Multiclass),
            other => Err(Error::config(format!("unknown training strategy '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Subset {
    Train,
    Validation,
    Test,
}

impl Subset {
    pub const ALL: [Subset; 3] = [Subset::Train, Subset::Validation, Subset::Test];
}

impl fmt::Display for Subset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Subset::Train => write!(f, "trn"),
            Subset::Validation => write!(f, "val"),
            Subset::Test => write!(f, "test"),
        }
    }
}

impl FromStr for Subset {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "trn" | "train" => Ok(Subset::Train),
            "val" | "validation" => Ok(Subset::Validation),
            "test" => Ok(Subset::Test),
            other => Err(Error::config(format!("unknown subset '{other}'"))),
        }
    }
}

// ---------------------------------------------------------------------------
// Trainer contract
// ---------------------------------------------------------------------------

/// Inputs paired with class indices.
#[derive(Debug, Clone, Copy)]
pub struct LabeledSet<'a> {
    pub inputs: &'a [Vec<f64>],
    pub labels: &'a [usize],
}

impl<'a> LabeledSet<'a> {
    pub fn new(inputs: &'a [Vec<f64>], labels: &'a [usize]) -> Self {
        LabeledSet { inputs, labels }
    }

    pub fn len(&self) -> usize {
        self.inputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inputs.is_empty()
    }
}

/// Fitted state of a single model.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "family", content = "state", rename_all = "snake_case")]
pub enum ModelState {
    Mlp(Network),
    Forest(RandomForest),
}

/// How a fit went.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FitReport {
    pub epochs_run: usize,
    /// Pass whose parameters were committed; `None` for one-shot fits.
    pub best_epoch: Option<usize>,
    pub stopped_early: bool,
    pub history: Vec<EpochStats>,
}

/// One concrete model configuration with a fit/score contract.
pub trait Trainer {
    /// Unique, filesystem-safe id; names the cache directory.
    fn id(&self) -> &str;

    fn strategy(&self) -> TrainingStrategy;

    /// Resolved hyperparameters, used as the grid key when aggregating.
    fn params(&self) -> &ParamSet;

    /// Digest of everything that determines the fitted state.
    fn fingerprint(&self) -> Result<String>;

    /// Rejects hyperparameters that could only fail once fitting starts.
    fn validate(&self) -> Result<()> {
        Ok(())
    }

    /// Fits one model on `n_outputs` classes. `validation` may be empty.
    fn fit_model(
        &self,
        train: &LabeledSet<'_>,
        validation: &LabeledSet<'_>,
        n_outputs: usize,
        seed: u64,
    ) -> Result<(ModelState, FitReport)>;

    /// Per-class scores of one input, higher meaning more likely.
    fn scores(&self, model: &ModelState, input: &[f64]) -> Result<Vec<f64>>;
}

// ---------------------------------------------------------------------------
// Strategy encoding
// ---------------------------------------------------------------------------

/// Fits every model `trainer.strategy()` needs and bundles them.
///
/// `fingerprint` identifies the experiment, trainer and fold samples the artifact
/// belongs to.
pub fn fit_artifact(
    trainer: &dyn Trainer,
    fold: usize,
    fingerprint: String,
    train: &LabeledSet<'_>,
    validation: &LabeledSet<'_>,
    n_classes: usize,
    seed: u64,
) -> Result<TrainedArtifact> {
    if train.is_empty() {
        return Err(Error::model("training subset is empty"));
    }
    let input_size = train.inputs[0].len();

    let mut models = Vec::new();
    let mut reports = Vec::new();
    match trainer.strategy() {
        TrainingStrategy::Multiclass => {
            let (model, report) = trainer.fit_model(train, validation, n_classes, seed)?;
            models.push(model);
            reports.push(report);
        }
        TrainingStrategy::ClassSpecific => {
            for class in 0..n_classes {
                let train_labels = one_vs_rest(train.labels, class);
                let val_labels = one_vs_rest(validation.labels, class);
                let (model, report) = trainer.fit_model(
                    &LabeledSet::new(train.inputs, &train_labels),
                    &LabeledSet::new(validation.inputs, &val_labels),
                    2,
                    seed.wrapping_add(class as u64),
                )?;
                debug!(trainer = trainer.id(), fold, class, epochs = report.epochs_run, "fitted class model");
                models.push(model);
                reports.push(report);
            }
        }
    }

    Ok(TrainedArtifact {
        trainer_id: trainer.id().to_string(),
        fold,
        fingerprint,
        strategy: trainer.strategy(),
        n_targets: n_classes,
        input_size,
        models,
        reports,
        created_at: Utc::now(),
    })
}

/// Predicts `data` with `artifact` and records (target, prediction) pairs.
pub fn predict_record(
    trainer: &dyn Trainer,
    artifact: &TrainedArtifact,
    subset: Subset,
    ids: &[String],
    data: &LabeledSet<'_>,
) -> Result<PredictionRecord> {
    if ids.len() != data.len() || data.labels.len() != data.len() {
        return Err(Error::model(format!(
            "{} ids, {} inputs and {} labels for {subset}",
            ids.len(),
            data.len(),
            data.labels.len()
        )));
    }

    let predictions = data
        .inputs
        .iter()
        .map(|x| decode(trainer, artifact, x))
        .collect::<Result<Vec<_>>>()?;

    Ok(PredictionRecord {
        trainer_id: artifact.trainer_id.clone(),
        fold: artifact.fold,
        subset,
        fingerprint: artifact.fingerprint.clone(),
        artifact_stamp: artifact.stamp(),
        subset_digest: digest(ids)?,
        ids: ids.to_vec(),
        targets: data.labels.to_vec(),
        predictions,
    })
}

fn decode(trainer: &dyn Trainer, artifact: &TrainedArtifact, input: &[f64]) -> Result<usize> {
    if input.len() != artifact.input_size {
        return Err(Error::model(format!(
            "input has {} features, model expects {}",
            input.len(),
            artifact.input_size
        )));
    }
    match artifact.strategy {
        TrainingStrategy::Multiclass => {
            let model = artifact
                .models
                .first()
                .ok_or_else(|| Error::model("artifact holds no model"))?;
            Ok(argmax(&trainer.scores(model, input)?))
        }
        TrainingStrategy::ClassSpecific => {
            let positive = artifact
                .models
                .iter()
                .map(|m| {
                    let s = trainer.scores(m, input)?;
                    s.get(1).copied().ok_or_else(|| Error::model("binary model must emit two scores"))
                })
                .collect::<Result<Vec<_>>>()?;
            Ok(argmax(&positive))
        }
    }
}

fn one_vs_rest(labels: &[usize], class: usize) -> Vec<usize> {
    labels.iter().map(|&l| usize::from(l == class)).collect()
}
