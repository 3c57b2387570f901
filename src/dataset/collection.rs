use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::dataset::catalog::CsvCatalog;
use crate::error::{Error, Result};

/// Where a labeled collection's catalog lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionInfo {
    pub id: String,
    /// Full catalog CSV.
    pub catalog: PathBuf,
    /// Reduced catalog used for quick iterations, if the collection has one.
    #[serde(default)]
    pub sample_catalog: Option<PathBuf>,
    pub id_column: String,
}

impl CollectionInfo {
    pub fn new(id: impl Into<String>, catalog: impl Into<PathBuf>) -> Self {
        CollectionInfo {
            id: id.into(),
            catalog: catalog.into(),
            sample_catalog: None,
            id_column: "ID".to_string(),
        }
    }

    pub fn with_sample_catalog(mut self, path: impl Into<PathBuf>) -> Self {
        self.sample_catalog = Some(path.into());
        self
    }

    pub fn with_id_column(mut self, column: impl Into<String>) -> Self {
        self.id_column = column.into();
        self
    }

    pub fn catalog(&self, only_sample: bool) -> Result<CsvCatalog> {
        let path = if only_sample {
            self.sample_catalog.clone().ok_or_else(|| {
                Error::config(format!("collection '{}' has no sample catalog", self.id))
            })?
        } else {
            self.catalog.clone()
        };
        Ok(CsvCatalog::new(path, self.id_column.clone()))
    }
}

/// Explicit mapping from collection id to its file locations.
#[derive(Debug, Clone, Default)]
pub struct CollectionRegistry {
    collections: BTreeMap<String, CollectionInfo>,
}

impl CollectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, info: CollectionInfo) -> Result<()> {
        if self.collections.contains_key(&info.id) {
            return Err(Error::config(format!("collection '{}' registered twice", info.id)));
        }
        self.collections.insert(info.id.clone(), info);
        Ok(())
    }

    pub fn get(&self, id: &str) -> Result<&CollectionInfo> {
        self.collections
            .get(id)
            .ok_or_else(|| Error::config(format!("unknown collection '{id}'")))
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.collections.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_rejects_duplicates_and_unknown_ids() {
        let mut reg = CollectionRegistry::new();
        reg.register(CollectionInfo::new("shipsear", "info/shipsear.csv")).unwrap();
        assert!(reg.register(CollectionInfo::new("shipsear", "other.csv")).is_err());
        assert!(reg.get("deepship").is_err());
        assert_eq!(reg.ids().collect::<Vec<_>>(), vec!["shipsear"]);
    }

    #[test]
    fn sample_catalog_must_be_declared() {
        let info = CollectionInfo::new("c", "full.csv");
        assert!(info.catalog(true).is_err());
        let info = info.with_sample_catalog("small.csv");
        assert_eq!(info.catalog(true).unwrap().path(), std::path::Path::new("small.csv"));
    }
}
