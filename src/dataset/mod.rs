//! Labeled sample collections: catalogs, target rules and the compiled
//! (id → label, group) view the fold partitioner works on.

pub mod catalog;
pub mod collection;
pub mod descriptor;
pub mod target;

pub use catalog::{parse_catalog, Catalog, CsvCatalog, Record};
pub use collection::{CollectionInfo, CollectionRegistry};
pub use descriptor::{CompiledDataset, DatasetDescriptor, LabeledSample};
pub use target::{LabelTarget, RowFilter, OTHERS_LABEL};
