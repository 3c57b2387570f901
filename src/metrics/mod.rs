//! Aggregation of per-fold predictions into comparable scores.

pub mod confusion;
pub mod grid;

pub use confusion::ConfusionMatrix;
pub use grid::{DuplicatePolicy, GridCompiler, Metric, Summary};
