pub mod early_stop;
pub mod epoch_stats;
pub mod train_config;
pub mod loop_fn;

pub use early_stop::{EarlyStopping, Verdict};
pub use epoch_stats::EpochStats;
pub use train_config::IterativeConfig;
pub use loop_fn::{advance, evaluate, mlp_epoch, TrainingState};
