use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::dataset::{Catalog, CompiledDataset};
use crate::error::{Error, Result};
use crate::experiment::config::{is_safe_name, ConfigLookup, ExperimentConfig, MismatchPolicy};
use crate::experiment::persist::digest;
use crate::experiment::store::{ArtifactStore, CellState};
use crate::features::{FeatureCache, FeatureProcessor};
use crate::folds::FoldAssignment;
use crate::metrics::{DuplicatePolicy, GridCompiler};
use crate::trainer::{
    fit_artifact, predict_record, LabeledSet, PredictionRecord, Subset, TrainedArtifact, Trainer,
    TrainingStrategy,
};

/// Predictions of one trainer on one fold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FoldResult {
    pub fold: usize,
    pub targets: Vec<usize>,
    pub predictions: Vec<usize>,
}

impl From<PredictionRecord> for FoldResult {
    fn from(record: PredictionRecord) -> Self {
        FoldResult { fold: record.fold, targets: record.targets, predictions: record.predictions }
    }
}

/// (subset, training strategy) → trainer id → per-fold results, folds ascending.
pub type ResultMap = BTreeMap<(Subset, TrainingStrategy), BTreeMap<String, Vec<FoldResult>>>;

/// Drives the fold loop over a fixed set of trainers and owns the cache.
pub struct ExperimentManager {
    config: ExperimentConfig,
    fingerprint: String,
    dataset: CompiledDataset,
    folds: Vec<FoldAssignment>,
    processor: Box<dyn FeatureProcessor>,
    trainers: Vec<Box<dyn Trainer>>,
    store: ArtifactStore,
    override_cache: bool,
}

impl ExperimentManager {
    /// Validates everything that can be checked before training: the
    /// configuration, processor settings, trainer ids, the dataset and the
    /// fold partition.
    pub fn new(
        config: ExperimentConfig,
        catalog: &dyn Catalog,
        processor: Box<dyn FeatureProcessor>,
        trainers: Vec<Box<dyn Trainer>>,
    ) -> Result<Self> {
        config.validate()?;
        if processor.settings() != &config.processor {
            return Err(Error::config(
                "feature processor settings differ from the experiment configuration",
            ));
        }
        if trainers.is_empty() {
            return Err(Error::config("no trainers registered"));
        }
        let mut ids = BTreeSet::new();
        for trainer in &trainers {
            let id = trainer.id();
            if !is_safe_name(id) {
                return Err(Error::config(format!("trainer id '{id}' is not filesystem-safe")));
            }
            if !ids.insert(id) {
                return Err(Error::config(format!("trainer id '{id}' registered twice")));
            }
            trainer.validate()?;
        }

        let dataset = config.dataset.compile(catalog, config.group_column.as_deref())?;
        let folds = config.partitioner().partition(&dataset)?;
        let fingerprint = config.fingerprint()?;
        let store = ArtifactStore::new(config.output_dir());

        info!(
            experiment = %config.name,
            samples = dataset.len(),
            classes = dataset.n_classes(),
            folds = folds.len(),
            trainers = trainers.len(),
            "experiment ready"
        );

        Ok(ExperimentManager {
            config,
            fingerprint,
            dataset,
            folds,
            processor,
            trainers,
            store,
            override_cache: false,
        })
    }

    /// Resolves the stored configuration under `config_dir` first, then
    /// builds the manager.
    pub fn open(
        config: ExperimentConfig,
        config_dir: &Path,
        policy: MismatchPolicy,
        catalog: &dyn Catalog,
        processor: Box<dyn FeatureProcessor>,
        trainers: Vec<Box<dyn Trainer>>,
    ) -> Result<Self> {
        config.validate()?;
        if let ConfigLookup::NotFound = ExperimentConfig::resolve(config_dir, &config, policy)? {
            info!(experiment = %config.name, "new experiment");
        }
        Self::new(config, catalog, processor, trainers)
    }

    /// Refit and repredict every cell even when cached.
    pub fn with_override(mut self, override_cache: bool) -> Self {
        self.override_cache = override_cache;
        self
    }

    pub fn config(&self) -> &ExperimentConfig {
        &self.config
    }

    pub fn dataset(&self) -> &CompiledDataset {
        &self.dataset
    }

    pub fn class_names(&self) -> &[String] {
        &self.dataset.class_names
    }

    pub fn folds(&self) -> &[FoldAssignment] {
        &self.folds
    }

    pub fn trainer(&self, id: &str) -> Option<&dyn Trainer> {
        self.trainers.iter().find(|t| t.id() == id).map(|t| t.as_ref())
    }

    pub fn cell_state(&self, trainer_id: &str, fold: usize) -> CellState {
        self.store.cell_state(trainer_id, fold)
    }

    // -----------------------------------------------------------------------
    // Run
    // -----------------------------------------------------------------------

    /// Ensures artifacts and predictions for the requested folds (all when
    /// `None`), reusing whatever is cached and still current.
    ///
    /// A failure aborts the run with the failing (trainer, fold); cells
    /// completed before it stay cached.
    pub fn run(&self, folds: Option<&[usize]>) -> Result<ResultMap> {
        let folds = self.select_folds(folds)?;
        let mut features = FeatureCache::new(self.processor.as_ref());
        let mut results = ResultMap::new();

        for &fold in &folds {
            info!(experiment = %self.config.name, fold, "running fold");
            for trainer in &self.trainers {
                let trainer = trainer.as_ref();
                let records = self
                    .run_cell(trainer, fold, &mut features)
                    .map_err(|e| e.in_cell(trainer.id(), fold))?;
                for record in records {
                    results
                        .entry((record.subset, trainer.strategy()))
                        .or_default()
                        .entry(trainer.id().to_string())
                        .or_default()
                        .push(record.into());
                }
            }
        }

        debug!(experiment = %self.config.name, samples = features.len(), "feature vectors processed");
        Ok(results)
    }

    fn run_cell(
        &self,
        trainer: &dyn Trainer,
        fold: usize,
        features: &mut FeatureCache<'_>,
    ) -> Result<Vec<PredictionRecord>> {
        let assignment = &self.folds[fold];
        let fingerprint = self.cell_fingerprint(trainer, assignment)?;

        let cached = if self.override_cache {
            None
        } else {
            match self.store.load_artifact(trainer.id(), fold) {
                Ok(Some(artifact)) if artifact.fingerprint == fingerprint => {
                    debug!(trainer = trainer.id(), fold, "artifact cache hit");
                    Some(artifact)
                }
                Ok(Some(_)) => {
                    warn!(trainer = trainer.id(), fold, "cached artifact is stale; retraining");
                    None
                }
                Ok(None) => None,
                Err(Error::Serde(e)) => {
                    warn!(trainer = trainer.id(), fold, error = %e, "cached artifact is unreadable; retraining");
                    None
                }
                Err(e) => return Err(e),
            }
        };

        let artifact = match cached {
            Some(artifact) => artifact,
            None => {
                let artifact = self.fit_cell(trainer, fold, assignment, fingerprint, features)?;
                self.store.save_artifact(&artifact)?;
                artifact
            }
        };

        Subset::ALL
            .iter()
            .map(|&subset| self.ensure_predictions(trainer, &artifact, assignment, subset, features))
            .collect()
    }

    fn fit_cell(
        &self,
        trainer: &dyn Trainer,
        fold: usize,
        assignment: &FoldAssignment,
        fingerprint: String,
        features: &mut FeatureCache<'_>,
    ) -> Result<TrainedArtifact> {
        let train_inputs = features.inputs(&assignment.train)?;
        let train_labels = self.labels_of(&assignment.train)?;
        let val_inputs = features.inputs(&assignment.validation)?;
        let val_labels = self.labels_of(&assignment.validation)?;

        info!(
            trainer = trainer.id(),
            fold,
            train = train_inputs.len(),
            validation = val_inputs.len(),
            "fitting"
        );
        let artifact = fit_artifact(
            trainer,
            fold,
            fingerprint,
            &LabeledSet::new(&train_inputs, &train_labels),
            &LabeledSet::new(&val_inputs, &val_labels),
            self.dataset.n_classes(),
            self.config.seed.wrapping_add(fold as u64),
        )?;
        debug!(trainer = trainer.id(), fold, epochs = artifact.epochs_run(), "fitted");
        Ok(artifact)
    }

    fn ensure_predictions(
        &self,
        trainer: &dyn Trainer,
        artifact: &TrainedArtifact,
        assignment: &FoldAssignment,
        subset: Subset,
        features: &mut FeatureCache<'_>,
    ) -> Result<PredictionRecord> {
        let ids = assignment.subset(subset);
        let subset_digest = digest(ids)?;

        if let Some(record) = self.store.load_predictions(trainer.id(), assignment.index, subset)? {
            if record.artifact_stamp == artifact.stamp() && record.subset_digest == subset_digest {
                debug!(trainer = trainer.id(), fold = assignment.index, %subset, "prediction cache hit");
                return Ok(record);
            }
        }

        let inputs = features.inputs(ids)?;
        let labels = self.labels_of(ids)?;
        let record = predict_record(trainer, artifact, subset, ids, &LabeledSet::new(&inputs, &labels))?;
        self.store.save_predictions(&record)?;
        Ok(record)
    }

    // -----------------------------------------------------------------------
    // Read-only queries
    // -----------------------------------------------------------------------

    /// Reads cached predictions of `subset` without computing anything.
    ///
    /// Fails with `NotComputed` for a missing cell and `StaleArtifact` for a
    /// cell produced by another trainer or experiment specification.
    pub fn compile_results(
        &self,
        subset: Subset,
        folds: Option<&[usize]>,
        trainer_ids: Option<&[&str]>,
    ) -> Result<ResultMap> {
        let folds = self.select_folds(folds)?;
        let trainers: Vec<&dyn Trainer> = match trainer_ids {
            None => self.trainers.iter().map(|t| t.as_ref()).collect(),
            Some(ids) => ids
                .iter()
                .map(|id| {
                    self.trainer(id)
                        .ok_or_else(|| Error::config(format!("unknown trainer '{id}'")))
                })
                .collect::<Result<_>>()?,
        };

        let mut results = ResultMap::new();
        for trainer in trainers {
            for &fold in &folds {
                let fingerprint = self.cell_fingerprint(trainer, &self.folds[fold])?;
                let record = self
                    .store
                    .load_predictions(trainer.id(), fold, subset)?
                    .ok_or_else(|| Error::NotComputed {
                        trainer_id: trainer.id().to_string(),
                        fold,
                        subset,
                    })?;
                let ids = self.folds[fold].subset(subset);
                if record.fingerprint != fingerprint || record.subset_digest != digest(ids)? {
                    return Err(Error::StaleArtifact { trainer_id: trainer.id().to_string(), fold });
                }
                results
                    .entry((subset, trainer.strategy()))
                    .or_default()
                    .entry(trainer.id().to_string())
                    .or_default()
                    .push(record.into());
            }
        }
        Ok(results)
    }

    /// Feeds every result of `strategy` on `subset` into a grid keyed by the
    /// trainers' parameters.
    pub fn grid(&self, results: &ResultMap, subset: Subset, strategy: TrainingStrategy) -> Result<GridCompiler> {
        let mut grid = GridCompiler::new(self.class_names().to_vec()).with_duplicates(DuplicatePolicy::Reject);
        if let Some(by_trainer) = results.get(&(subset, strategy)) {
            for (trainer_id, fold_results) in by_trainer {
                let trainer = self
                    .trainer(trainer_id)
                    .ok_or_else(|| Error::config(format!("unknown trainer '{trainer_id}'")))?;
                for r in fold_results {
                    grid.add(trainer.params().clone(), r.fold, &r.targets, &r.predictions)?;
                }
            }
        }
        Ok(grid)
    }

    // -----------------------------------------------------------------------
    // Private helpers
    // -----------------------------------------------------------------------

    fn select_folds(&self, folds: Option<&[usize]>) -> Result<Vec<usize>> {
        let selected: BTreeSet<usize> = match folds {
            None => (0..self.folds.len()).collect(),
            Some(list) => list.iter().copied().collect(),
        };
        if let Some(&bad) = selected.iter().find(|&&f| f >= self.folds.len()) {
            return Err(Error::config(format!(
                "fold {bad} out of range for {} folds",
                self.folds.len()
            )));
        }
        Ok(selected.into_iter().collect())
    }

    /// Identifies what a cell's artifact was fitted from: the experiment, the
    /// trainer, and the labeled train/validation samples of its fold.
    fn cell_fingerprint(&self, trainer: &dyn Trainer, assignment: &FoldAssignment) -> Result<String> {
        let fitted_on = digest(&(
            &assignment.train,
            self.labels_of(&assignment.train)?,
            &assignment.validation,
            self.labels_of(&assignment.validation)?,
        ))?;
        digest(&(&self.fingerprint, trainer.fingerprint()?, fitted_on))
    }

    fn labels_of(&self, ids: &[String]) -> Result<Vec<usize>> {
        ids.iter()
            .map(|id| {
                self.dataset
                    .label_of(id)
                    .ok_or_else(|| Error::catalog(format!("sample '{id}' is not in the dataset")))
            })
            .collect()
    }
}
