pub mod partition;

pub use partition::{FoldAssignment, FoldPartitioner, FoldStrategy};
