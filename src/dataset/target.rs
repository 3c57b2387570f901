use serde::{Deserialize, Serialize};

use crate::dataset::catalog::Record;
use crate::error::Result;

/// Label shown for samples bucketed outside the target value set.
pub const OTHERS_LABEL: &str = "Others";

/// Rule that turns a catalog column into a finite class set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelTarget {
    pub column: String,
    /// Class values, in class-index order.
    pub values: Vec<String>,
    /// Bucket every other value as an extra "Others" class instead of
    /// dropping the sample.
    pub include_others: bool,
}

impl LabelTarget {
    pub fn new<S: Into<String>>(
        column: impl Into<String>,
        values: impl IntoIterator<Item = S>,
        include_others: bool,
    ) -> Self {
        LabelTarget {
            column: column.into(),
            values: values.into_iter().map(Into::into).collect(),
            include_others,
        }
    }

    pub fn n_targets(&self) -> usize {
        self.values.len() + usize::from(self.include_others)
    }

    pub fn class_names(&self) -> Vec<String> {
        let mut names = self.values.clone();
        if self.include_others {
            names.push(OTHERS_LABEL.to_string());
        }
        names
    }

    /// Class index of a raw cell, or `None` when the sample is dropped.
    /// Missing cells are never bucketed.
    pub fn classify(&self, value: Option<&str>) -> Option<usize> {
        let value = value?;
        match self.values.iter().position(|v| v == value) {
            Some(idx) => Some(idx),
            None if self.include_others => Some(self.values.len()),
            None => None,
        }
    }
}

/// Admits a row when `column` holds one of `values`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowFilter {
    pub column: String,
    pub values: Vec<String>,
}

impl RowFilter {
    pub fn new<S: Into<String>>(column: impl Into<String>, values: impl IntoIterator<Item = S>) -> Self {
        RowFilter {
            column: column.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    pub fn admits(&self, record: &Record) -> Result<bool> {
        Ok(record
            .field(&self.column)?
            .is_some_and(|v| self.values.iter().any(|allowed| allowed == v)))
    }
}
