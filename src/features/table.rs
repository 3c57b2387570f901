//! Precomputed feature tables.
//!
//! Supported CSV format:
//! - Header row optional: skipped when its feature cells do not parse as `f64`
//! - First column is the sample id, the remaining columns its features
//! - Every row has the same width
use std::collections::HashMap;
use std::path::Path;

use crate::error::{Error, Result};
use crate::features::processor::{FeatureProcessor, ProcessorSettings};

/// Feature processor backed by an in-memory table of precomputed vectors.
#[derive(Debug, Clone)]
pub struct FeatureTable {
    settings: ProcessorSettings,
    width: usize,
    rows: HashMap<String, Vec<f64>>,
}

impl FeatureTable {
    pub fn from_rows<I>(settings: ProcessorSettings, rows: I) -> Result<Self>
    where
        I: IntoIterator<Item = (String, Vec<f64>)>,
    {
        let mut width = None;
        let mut table = HashMap::new();
        for (id, features) in rows {
            let expected = *width.get_or_insert(features.len());
            if features.len() != expected {
                return Err(Error::feature(format!(
                    "sample '{id}' has {} features, expected {expected}",
                    features.len()
                )));
            }
            if table.insert(id.clone(), features).is_some() {
                return Err(Error::feature(format!("sample '{id}' appears twice")));
            }
        }
        let width = width.unwrap_or(0);
        if width == 0 {
            return Err(Error::feature("feature table is empty"));
        }
        Ok(FeatureTable { settings, width, rows: table })
    }

    pub fn from_csv(path: &Path, settings: ProcessorSettings) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::feature(format!("cannot read {}: {e}", path.display())))?;

        let mut rows = Vec::new();
        for (line_idx, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let mut cells = line.split(',').map(str::trim);
            let id = cells.next().unwrap_or_default().to_string();
            let values: std::result::Result<Vec<f64>, _> = cells.map(str::parse::<f64>).collect();
            match values {
                Ok(values) => rows.push((id, values)),
                Err(_) if line_idx == 0 => continue,
                Err(e) => {
                    return Err(Error::feature(format!("line {}: {e}", line_idx + 1)));
                }
            }
        }
        Self::from_rows(settings, rows)
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

impl FeatureProcessor for FeatureTable {
    fn settings(&self) -> &ProcessorSettings {
        &self.settings
    }

    fn process(&self, sample_id: &str) -> Result<Vec<f64>> {
        self.rows
            .get(sample_id)
            .cloned()
            .ok_or_else(|| Error::feature(format!("no features for sample '{sample_id}'")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn reads_csv_with_header() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "id,f0,f1").unwrap();
        writeln!(file, "a,0.5,1.0").unwrap();
        writeln!(file, "b,-1,2e-1").unwrap();
        let table = FeatureTable::from_csv(file.path(), ProcessorSettings::default()).unwrap();
        assert_eq!(table.width(), 2);
        assert_eq!(table.process("b").unwrap(), vec![-1.0, 0.2]);
        assert!(matches!(table.process("z"), Err(Error::Feature(_))));
    }

    #[test]
    fn rejects_ragged_rows() {
        let rows = vec![("a".to_string(), vec![1.0, 2.0]), ("b".to_string(), vec![1.0])];
        assert!(FeatureTable::from_rows(ProcessorSettings::default(), rows).is_err());
    }
}
