//! Random-forest model family used by the one-shot trainer.

pub mod forest;
pub mod tree;

pub use forest::{ForestParams, RandomForest};
pub use tree::{DecisionTree, TreeParams};
