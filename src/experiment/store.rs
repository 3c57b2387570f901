use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::Result;
use crate::experiment::persist::{atomic_write_json, read_json, remove_if_exists};
use crate::trainer::{PredictionRecord, Subset, TrainedArtifact};

/// Cache status of one (trainer, fold) cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CellState {
    NotStarted,
    ArtifactCached,
    /// Artifact and every subset's predictions are on disk.
    PredictionsCached,
}

/// On-disk layout: `<root>/<trainer id>/fold_<k>/model.json` plus one
/// `predictions_<subset>.json` per subset. File existence is the cache-hit
/// signal.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        ArtifactStore { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn cell_dir(&self, trainer_id: &str, fold: usize) -> PathBuf {
        self.root.join(trainer_id).join(format!("fold_{fold}"))
    }

    pub fn artifact_path(&self, trainer_id: &str, fold: usize) -> PathBuf {
        self.cell_dir(trainer_id, fold).join("model.json")
    }

    pub fn predictions_path(&self, trainer_id: &str, fold: usize, subset: Subset) -> PathBuf {
        self.cell_dir(trainer_id, fold).join(format!("predictions_{subset}.json"))
    }

    pub fn cell_state(&self, trainer_id: &str, fold: usize) -> CellState {
        if !self.artifact_path(trainer_id, fold).exists() {
            return CellState::NotStarted;
        }
        let all_predicted = Subset::ALL
            .iter()
            .all(|&s| self.predictions_path(trainer_id, fold, s).exists());
        if all_predicted {
            CellState::PredictionsCached
        } else {
            CellState::ArtifactCached
        }
    }

    pub fn load_artifact(&self, trainer_id: &str, fold: usize) -> Result<Option<TrainedArtifact>> {
        read_json(&self.artifact_path(trainer_id, fold))
    }

    /// Replaces the cell's artifact. Predictions made by the previous artifact
    /// are removed first so they can never be paired with the new one.
    pub fn save_artifact(&self, artifact: &TrainedArtifact) -> Result<()> {
        for subset in Subset::ALL {
            remove_if_exists(&self.predictions_path(&artifact.trainer_id, artifact.fold, subset))?;
        }
        let path = self.artifact_path(&artifact.trainer_id, artifact.fold);
        atomic_write_json(&path, artifact)?;
        debug!(path = %path.display(), "stored artifact");
        Ok(())
    }

    pub fn load_predictions(&self, trainer_id: &str, fold: usize, subset: Subset) -> Result<Option<PredictionRecord>> {
        read_json(&self.predictions_path(trainer_id, fold, subset))
    }

    pub fn save_predictions(&self, record: &PredictionRecord) -> Result<()> {
        let path = self.predictions_path(&record.trainer_id, record.fold, record.subset);
        atomic_write_json(&path, record)?;
        debug!(path = %path.display(), "stored predictions");
        Ok(())
    }
}
