//! hydrofold: K-fold experiment orchestration for signal classifiers.
//!
//! A [`dataset::DatasetDescriptor`] compiles a catalog into labeled samples,
//! a [`folds::FoldPartitioner`] splits them, an
//! [`experiment::ExperimentManager`] fits every registered
//! [`trainer::Trainer`] on every fold with on-disk caching, and a
//! [`metrics::GridCompiler`] turns the cached predictions into comparable
//! scores.

pub mod error;
pub mod settings;

pub mod math;
pub mod activation;
pub mod layers;
pub mod network;
pub mod loss;
pub mod optim;
pub mod train;
pub mod forest;

pub mod dataset;
pub mod features;
pub mod folds;
pub mod trainer;
pub mod experiment;
pub mod metrics;

// Convenience re-exports
pub use error::{Error, Result};
pub use settings::{Directories, Settings};
pub use dataset::{Catalog, CompiledDataset, CsvCatalog, DatasetDescriptor, LabelTarget, RowFilter};
pub use features::{FeatureProcessor, FeatureTable, ProcessorSettings};
pub use folds::{FoldAssignment, FoldPartitioner, FoldStrategy};
pub use trainer::{
    ForestTrainer, MlpTrainer, ParamGrid, ParamSet, ParamValue, Subset, Trainer, TrainingStrategy,
};
pub use experiment::{ExperimentConfig, ExperimentManager, MismatchPolicy, ResultMap};
pub use metrics::{ConfusionMatrix, GridCompiler, Metric};
