use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::dataset::catalog::{Catalog, CsvCatalog};
use crate::dataset::collection::CollectionInfo;
use crate::dataset::target::{LabelTarget, RowFilter};
use crate::error::{Error, Result};

/// Which labeled collection to use, how labels are extracted and which rows
/// are admitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetDescriptor {
    pub collection: String,
    pub target: LabelTarget,
    /// Conjunctive: a row must pass every filter.
    #[serde(default)]
    pub filters: Vec<RowFilter>,
    /// Read the collection's reduced sample catalog instead of the full one.
    /// Applied when the catalog is opened, see [`DatasetDescriptor::catalog`].
    #[serde(default)]
    pub only_sample: bool,
}

impl DatasetDescriptor {
    pub fn new(collection: impl Into<String>, target: LabelTarget) -> Self {
        DatasetDescriptor {
            collection: collection.into(),
            target,
            filters: Vec::new(),
            only_sample: false,
        }
    }

    pub fn with_filter(mut self, filter: RowFilter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn with_only_sample(mut self, only_sample: bool) -> Self {
        self.only_sample = only_sample;
        self
    }

    /// Opens the catalog this descriptor reads from `info`.
    pub fn catalog(&self, info: &CollectionInfo) -> Result<CsvCatalog> {
        if info.id != self.collection {
            return Err(Error::config(format!(
                "dataset reads collection '{}', got '{}'",
                self.collection, info.id
            )));
        }
        info.catalog(self.only_sample)
    }

    /// Materializes the admitted, labeled sample table.
    ///
    /// Filters run before labeling. Rows whose target value is outside the
    /// class set are dropped unless the target buckets them as "Others".
    /// With `group_column`, every admitted row must carry a group value.
    pub fn compile(&self, catalog: &dyn Catalog, group_column: Option<&str>) -> Result<CompiledDataset> {
        if self.target.values.is_empty() {
            return Err(Error::config("target has no class values"));
        }
        if self.target.n_targets() < 2 {
            return Err(Error::config("target needs at least two classes"));
        }

        let records = catalog.to_table()?;
        let total = records.len();

        let mut seen = BTreeSet::new();
        let mut samples = Vec::new();
        'rows: for record in records {
            if !seen.insert(record.id.clone()) {
                return Err(Error::catalog(format!("duplicate sample id '{}'", record.id)));
            }
            for filter in &self.filters {
                if !filter.admits(&record)? {
                    continue 'rows;
                }
            }
            let Some(label) = self.target.classify(record.field(&self.target.column)?) else {
                continue;
            };
            let group = match group_column {
                Some(column) => Some(
                    record
                        .field(column)?
                        .ok_or_else(|| {
                            Error::catalog(format!("sample '{}' has no value for group '{column}'", record.id))
                        })?
                        .to_string(),
                ),
                None => None,
            };
            samples.push(LabeledSample { id: record.id, label, group });
        }

        samples.sort_by(|a, b| a.id.cmp(&b.id));
        debug!(
            collection = %self.collection,
            total,
            admitted = samples.len(),
            "compiled dataset"
        );

        Ok(CompiledDataset { class_names: self.target.class_names(), samples })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabeledSample {
    pub id: String,
    pub label: usize,
    pub group: Option<String>,
}

/// Canonical (id → label, group) table, sorted by id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompiledDataset {
    pub class_names: Vec<String>,
    pub samples: Vec<LabeledSample>,
}

impl CompiledDataset {
    pub fn n_classes(&self) -> usize {
        self.class_names.len()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.samples.iter().map(|s| s.id.as_str())
    }

    pub fn label_of(&self, id: &str) -> Option<usize> {
        self.samples
            .binary_search_by(|s| s.id.as_str().cmp(id))
            .ok()
            .map(|pos| self.samples[pos].label)
    }

    /// Admitted samples per class, in class order.
    pub fn class_counts(&self) -> Vec<usize> {
        let mut counts = vec![0; self.n_classes()];
        for s in &self.samples {
            counts[s.label] += 1;
        }
        counts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::catalog::Record;

    fn catalog() -> Vec<Record> {
        vec![
            Record::new("3").with("Class", "B").with("Rain", "no").with("Ship", "s2"),
            Record::new("1").with("Class", "A").with("Rain", "no").with("Ship", "s1"),
            Record::new("2").with("Class", "C").with("Rain", "no").with("Ship", "s1"),
            Record::new("4").with("Class", "A").with("Rain", "yes").with("Ship", "s3"),
        ]
    }

    #[test]
    fn only_sample_selects_the_reduced_catalog() {
        let info = CollectionInfo::new("c", "full.csv").with_sample_catalog("sample.csv");
        let target = LabelTarget::new("Class", ["A", "B"], false);

        let full = DatasetDescriptor::new("c", target.clone()).catalog(&info).unwrap();
        assert_eq!(full.path(), std::path::Path::new("full.csv"));
        let sample = DatasetDescriptor::new("c", target.clone())
            .with_only_sample(true)
            .catalog(&info)
            .unwrap();
        assert_eq!(sample.path(), std::path::Path::new("sample.csv"));

        assert!(DatasetDescriptor::new("other", target).catalog(&info).is_err());
    }

    #[test]
    fn filters_then_labels_sorted_by_id() {
        let desc = DatasetDescriptor::new("c", LabelTarget::new("Class", ["A", "B"], false))
            .with_filter(RowFilter::new("Rain", ["no"]));
        let ds = desc.compile(&catalog(), None).unwrap();
        assert_eq!(ds.ids().collect::<Vec<_>>(), vec!["1", "3"]);
        assert_eq!(ds.label_of("3"), Some(1));
        assert_eq!(ds.label_of("2"), None);
        assert_eq!(ds.class_counts(), vec![1, 1]);
    }

    #[test]
    fn others_bucket_keeps_out_of_set_rows() {
        let desc = DatasetDescriptor::new("c", LabelTarget::new("Class", ["A", "B"], true));
        let ds = desc.compile(&catalog(), Some("Ship")).unwrap();
        assert_eq!(ds.len(), 4);
        assert_eq!(ds.label_of("2"), Some(2));
        assert_eq!(ds.samples[1].group.as_deref(), Some("s1"));
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let mut rows = catalog();
        rows.push(Record::new("1").with("Class", "B").with("Rain", "no").with("Ship", "s9"));
        let desc = DatasetDescriptor::new("c", LabelTarget::new("Class", ["A", "B"], false));
        assert!(matches!(desc.compile(&rows, None), Err(Error::Catalog(_))));
    }
}
