//! Experiment lifecycle: persisted configuration, the on-disk cell cache and
//! the manager that drives folds and trainers over them.

pub mod config;
pub mod manager;
pub mod persist;
pub mod store;

pub use config::{ConfigLookup, ExperimentConfig, MismatchPolicy};
pub use manager::{ExperimentManager, FoldResult, ResultMap};
pub use store::{ArtifactStore, CellState};
