//! Error types for hydrofold.
//!
//! Configuration and cache-consistency errors are raised before any work is
//! done; training failures always carry the (trainer, fold) cell that failed.

use std::path::PathBuf;

use thiserror::Error;

use crate::trainer::Subset;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// hydrofold error types
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid experiment, dataset or trainer configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// No configuration was ever saved under this name.
    #[error("no saved configuration '{name}' at {}", path.display())]
    ConfigNotFound { name: String, path: PathBuf },

    /// A saved configuration exists but no longer matches the requested one.
    #[error("saved configuration '{name}' differs from the requested one in: {}", fields.join(", "))]
    ConfigMismatch { name: String, fields: Vec<String> },

    /// A requested target class has no admitted samples.
    #[error("target class '{0}' has no admitted samples")]
    EmptyClass(String),

    /// A read-only query hit a cell that was never computed.
    #[error("{subset} predictions of '{trainer_id}' on fold {fold} have not been computed")]
    NotComputed {
        trainer_id: String,
        fold: usize,
        subset: Subset,
    },

    /// A cached cell belongs to a different trainer or experiment specification.
    #[error("cached results of '{trainer_id}' on fold {fold} are stale")]
    StaleArtifact { trainer_id: String, fold: usize },

    /// Fitting or predicting a specific cell failed.
    #[error("trainer '{trainer_id}' failed on fold {fold}: {source}")]
    Training {
        trainer_id: String,
        fold: usize,
        #[source]
        source: Box<Error>,
    },

    #[error("model error: {0}")]
    Model(String),

    #[error("catalog error: {0}")]
    Catalog(String),

    #[error("feature error: {0}")]
    Feature(String),

    #[error("metrics error: {0}")]
    Metrics(String),

    /// The grid already holds this (parameters, fold) entry.
    #[error("grid already holds fold {fold} for [{params}]")]
    DuplicateEntry { params: String, fold: usize },

    #[error("settings error: {0}")]
    Settings(#[from] figment::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl Error {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn model(msg: impl Into<String>) -> Self {
        Self::Model(msg.into())
    }

    pub fn catalog(msg: impl Into<String>) -> Self {
        Self::Catalog(msg.into())
    }

    pub fn feature(msg: impl Into<String>) -> Self {
        Self::Feature(msg.into())
    }

    pub fn metrics(msg: impl Into<String>) -> Self {
        Self::Metrics(msg.into())
    }

    /// Attaches the failing (trainer, fold) cell.
    pub fn in_cell(self, trainer_id: &str, fold: usize) -> Self {
        match self {
            already @ Self::Training { .. } => already,
            other => Self::Training {
                trainer_id: trainer_id.to_string(),
                fold,
                source: Box::new(other),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cell_context_wraps_once() {
        let err = Error::model("diverged").in_cell("mlp_16_Tanh", 2).in_cell("other", 9);
        let msg = err.to_string();
        assert!(msg.contains("mlp_16_Tanh"));
        assert!(msg.contains("fold 2"));
        assert!(msg.contains("diverged"));
    }

    #[test]
    fn not_found_and_mismatch_render_differently() {
        let nf = Error::ConfigNotFound { name: "a".into(), path: PathBuf::from("/x/a.json") };
        let mm = Error::ConfigMismatch { name: "a".into(), fields: vec!["dataset.filters".into()] };
        assert!(nf.to_string().contains("no saved configuration"));
        assert!(mm.to_string().contains("dataset.filters"));
    }
}
