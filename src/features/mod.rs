//! Feature extraction seam: declared processing settings, the processor
//! trait, a CSV-backed processor and a per-run memo.

pub mod cache;
pub mod processor;
pub mod table;

pub use cache::FeatureCache;
pub use processor::{FeatureProcessor, Normalization, ProcessorSettings, SpectralAnalysis};
pub use table::FeatureTable;
