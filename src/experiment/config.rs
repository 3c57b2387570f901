use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};

use crate::dataset::DatasetDescriptor;
use crate::error::{Error, Result};
use crate::experiment::persist::{atomic_write_json, digest, read_json};
use crate::features::ProcessorSettings;
use crate::folds::{FoldPartitioner, FoldStrategy};

/// Persisted, hashable description of what an experiment is.
///
/// Everything except `output_base_dir` takes part in the fingerprint: moving
/// an experiment does not invalidate it, changing its data or folds does.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentConfig {
    pub name: String,
    pub dataset: DatasetDescriptor,
    pub processor: ProcessorSettings,
    pub n_folds: usize,
    pub seed: u64,
    pub validation_fraction: f64,
    #[serde(default)]
    pub fold_strategy: FoldStrategy,
    /// Catalog column whose values must never straddle two subsets.
    #[serde(default)]
    pub group_column: Option<String>,
    pub output_base_dir: PathBuf,
}

/// Outcome of looking a configuration up by name.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigLookup {
    Match,
    Mismatch { stored: Box<ExperimentConfig>, fields: Vec<String> },
    NotFound,
}

/// What to do when a stored configuration no longer matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MismatchPolicy {
    #[default]
    Fail,
    /// Overwrite the stored configuration; cached cells become stale.
    Rebuild,
}

impl ExperimentConfig {
    pub fn new(
        name: impl Into<String>,
        dataset: DatasetDescriptor,
        processor: ProcessorSettings,
        output_base_dir: impl Into<PathBuf>,
    ) -> Self {
        ExperimentConfig {
            name: name.into(),
            dataset,
            processor,
            n_folds: 10,
            seed: 42,
            validation_fraction: 0.1,
            fold_strategy: FoldStrategy::default(),
            group_column: None,
            output_base_dir: output_base_dir.into(),
        }
    }

    pub fn with_n_folds(mut self, n_folds: usize) -> Self {
        self.n_folds = n_folds;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_validation_fraction(mut self, fraction: f64) -> Self {
        self.validation_fraction = fraction;
        self
    }

    pub fn with_fold_strategy(mut self, strategy: FoldStrategy) -> Self {
        self.fold_strategy = strategy;
        self
    }

    pub fn with_group_column(mut self, column: impl Into<String>) -> Self {
        self.group_column = Some(column.into());
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !is_safe_name(&self.name) {
            return Err(Error::config(format!(
                "experiment name '{}' must be non-empty and use only letters, digits, '-', '_' or '.'",
                self.name
            )));
        }
        self.partitioner().validate()?;
        self.processor.validate()
    }

    pub fn partitioner(&self) -> FoldPartitioner {
        FoldPartitioner::new(self.n_folds, self.seed)
            .with_validation_fraction(self.validation_fraction)
            .with_strategy(self.fold_strategy)
    }

    /// Directory holding this experiment's per-trainer caches.
    pub fn output_dir(&self) -> PathBuf {
        self.output_base_dir.join(&self.name)
    }

    pub fn path_in(&self, dir: &Path) -> PathBuf {
        config_path(dir, &self.name)
    }

    pub fn fingerprint(&self) -> Result<String> {
        digest(&json!({
            "name": self.name,
            "dataset": self.dataset,
            "processor": self.processor,
            "n_folds": self.n_folds,
            "seed": self.seed,
            "validation_fraction": self.validation_fraction,
            "fold_strategy": self.fold_strategy,
            "group_column": self.group_column,
        }))
    }

    /// Names of the fingerprinted fields that differ from `other`.
    pub fn differences(&self, other: &ExperimentConfig) -> Vec<String> {
        let mut fields = Vec::new();
        let mut check = |name: &str, same: bool| {
            if !same {
                fields.push(name.to_string());
            }
        };
        check("name", self.name == other.name);
        check("dataset.collection", self.dataset.collection == other.dataset.collection);
        check("dataset.target", self.dataset.target == other.dataset.target);
        check("dataset.filters", self.dataset.filters == other.dataset.filters);
        check("dataset.only_sample", self.dataset.only_sample == other.dataset.only_sample);
        check("processor", self.processor == other.processor);
        check("n_folds", self.n_folds == other.n_folds);
        check("seed", self.seed == other.seed);
        check("validation_fraction", self.validation_fraction == other.validation_fraction);
        check("fold_strategy", self.fold_strategy == other.fold_strategy);
        check("group_column", self.group_column == other.group_column);
        fields
    }

    /// Writes `<dir>/<name>.json` atomically and returns its path.
    pub fn save(&self, dir: &Path) -> Result<PathBuf> {
        let path = self.path_in(dir);
        atomic_write_json(&path, self)?;
        info!(name = %self.name, path = %path.display(), "saved experiment configuration");
        Ok(path)
    }

    /// Loads a stored configuration, checking it against `expected` when given.
    pub fn load(dir: &Path, name: &str, expected: Option<&ExperimentConfig>) -> Result<ExperimentConfig> {
        let path = config_path(dir, name);
        let stored: ExperimentConfig = read_json(&path)?.ok_or_else(|| Error::ConfigNotFound {
            name: name.to_string(),
            path: path.clone(),
        })?;
        if let Some(expected) = expected {
            let fields = expected.differences(&stored);
            if !fields.is_empty() {
                return Err(Error::ConfigMismatch { name: name.to_string(), fields });
            }
        }
        Ok(stored)
    }

    pub fn lookup(dir: &Path, expected: &ExperimentConfig) -> Result<ConfigLookup> {
        match Self::load(dir, &expected.name, None) {
            Ok(stored) => {
                let fields = expected.differences(&stored);
                if fields.is_empty() {
                    Ok(ConfigLookup::Match)
                } else {
                    Ok(ConfigLookup::Mismatch { stored: Box::new(stored), fields })
                }
            }
            Err(Error::ConfigNotFound { .. }) => Ok(ConfigLookup::NotFound),
            Err(e) => Err(e),
        }
    }

    /// Makes `<dir>/<name>.json` describe `expected`, applying `policy` when a
    /// different configuration is stored. Returns what was found.
    pub fn resolve(dir: &Path, expected: &ExperimentConfig, policy: MismatchPolicy) -> Result<ConfigLookup> {
        let found = Self::lookup(dir, expected)?;
        match (&found, policy) {
            (ConfigLookup::Match, _) => {}
            (ConfigLookup::NotFound, _) => {
                expected.save(dir)?;
            }
            (ConfigLookup::Mismatch { fields, .. }, MismatchPolicy::Fail) => {
                return Err(Error::ConfigMismatch { name: expected.name.clone(), fields: fields.clone() });
            }
            (ConfigLookup::Mismatch { fields, .. }, MismatchPolicy::Rebuild) => {
                warn!(
                    name = %expected.name,
                    fields = %fields.join(", "),
                    "stored configuration differs; rebuilding"
                );
                expected.save(dir)?;
            }
        }
        Ok(found)
    }
}

fn config_path(dir: &Path, name: &str) -> PathBuf {
    dir.join(format!("{name}.json"))
}

pub(crate) fn is_safe_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && name.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{LabelTarget, RowFilter};

    fn config(base: &Path) -> ExperimentConfig {
        let target = LabelTarget::new("Class", ["A", "B", "C"], true);
        ExperimentConfig::new(
            "forest_lofar",
            DatasetDescriptor::new("shipsear", target),
            ProcessorSettings::default(),
            base,
        )
        .with_n_folds(5)
    }

    #[test]
    fn not_found_then_saved_then_match() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(dir.path());
        assert!(matches!(
            ExperimentConfig::load(dir.path(), "forest_lofar", None),
            Err(Error::ConfigNotFound { .. })
        ));
        assert_eq!(ExperimentConfig::resolve(dir.path(), &cfg, MismatchPolicy::Fail).unwrap(), ConfigLookup::NotFound);
        assert_eq!(ExperimentConfig::lookup(dir.path(), &cfg).unwrap(), ConfigLookup::Match);
        assert_eq!(ExperimentConfig::load(dir.path(), "forest_lofar", Some(&cfg)).unwrap(), cfg);
    }

    #[test]
    fn changed_filter_is_a_named_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(dir.path());
        cfg.save(dir.path()).unwrap();

        let mut changed = cfg.clone();
        changed.dataset = changed.dataset.with_filter(RowFilter::new("Rain", ["No rain"]));
        match ExperimentConfig::load(dir.path(), "forest_lofar", Some(&changed)) {
            Err(Error::ConfigMismatch { fields, .. }) => assert_eq!(fields, vec!["dataset.filters"]),
            other => panic!("unexpected {other:?}"),
        }
        assert!(ExperimentConfig::resolve(dir.path(), &changed, MismatchPolicy::Fail).is_err());

        ExperimentConfig::resolve(dir.path(), &changed, MismatchPolicy::Rebuild).unwrap();
        assert_eq!(ExperimentConfig::lookup(dir.path(), &changed).unwrap(), ConfigLookup::Match);
    }

    #[test]
    fn fingerprint_ignores_output_location() {
        let cfg = config(Path::new("/a"));
        let moved = ExperimentConfig { output_base_dir: PathBuf::from("/b"), ..cfg.clone() };
        assert_eq!(cfg.fingerprint().unwrap(), moved.fingerprint().unwrap());
        assert_ne!(cfg.fingerprint().unwrap(), cfg.clone().with_seed(7).fingerprint().unwrap());
    }

    #[test]
    fn rejects_unsafe_names() {
        let mut cfg = config(Path::new("/a"));
        cfg.name = "../escape".into();
        assert!(cfg.validate().is_err());
    }
}
