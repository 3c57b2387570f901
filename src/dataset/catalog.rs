//! Dataset catalogs: tables of (sample id, named label fields).
//!
//! Supported CSV format:
//! - UTF-8, comma-separated, mandatory header row
//! - Double-quoted fields with embedded commas and `""` escapes
//! - Empty cells and the `" - "` placeholder read as missing values
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// One catalog row.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub id: String,
    /// Column name → cell; `None` for a missing value.
    pub fields: BTreeMap<String, Option<String>>,
}

impl Record {
    pub fn new(id: impl Into<String>) -> Self {
        Record { id: id.into(), fields: BTreeMap::new() }
    }

    pub fn with(mut self, column: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(column.into(), Some(value.into()));
        self
    }

    /// `Ok(None)` for a missing value, an error for an unknown column.
    pub fn field(&self, column: &str) -> Result<Option<&str>> {
        self.fields
            .get(column)
            .map(|v| v.as_deref())
            .ok_or_else(|| Error::catalog(format!("sample '{}' has no column '{column}'", self.id)))
    }
}

/// Source of the labeled sample table.
pub trait Catalog {
    fn to_table(&self) -> Result<Vec<Record>>;
}

impl Catalog for Vec<Record> {
    fn to_table(&self) -> Result<Vec<Record>> {
        Ok(self.clone())
    }
}

/// CSV-backed catalog.
#[derive(Debug, Clone)]
pub struct CsvCatalog {
    path: PathBuf,
    id_column: String,
}

impl CsvCatalog {
    pub fn new(path: impl Into<PathBuf>, id_column: impl Into<String>) -> Self {
        CsvCatalog { path: path.into(), id_column: id_column.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Catalog for CsvCatalog {
    fn to_table(&self) -> Result<Vec<Record>> {
        let text = std::fs::read_to_string(&self.path).map_err(|e| {
            Error::catalog(format!("cannot read {}: {e}", self.path.display()))
        })?;
        parse_catalog(&text, &self.id_column)
    }
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Parses catalog CSV text into records keyed by `id_column`.
pub fn parse_catalog(text: &str, id_column: &str) -> Result<Vec<Record>> {
    let mut lines = text.lines().enumerate().filter(|(_, l)| !l.trim().is_empty());

    let (_, header_line) = lines
        .next()
        .ok_or_else(|| Error::catalog("catalog is empty"))?;
    let header: Vec<String> = parse_csv_row(header_line)
        .into_iter()
        .map(|h| h.trim().to_string())
        .collect();
    let id_pos = header
        .iter()
        .position(|h| h == id_column)
        .ok_or_else(|| Error::catalog(format!("catalog has no id column '{id_column}'")))?;

    let mut records = Vec::new();
    for (line_idx, line) in lines {
        let cells = parse_csv_row(line);
        if cells.len() != header.len() {
            return Err(Error::catalog(format!(
                "line {}: expected {} columns, got {}",
                line_idx + 1,
                header.len(),
                cells.len()
            )));
        }

        let id = cells[id_pos].trim().to_string();
        if id.is_empty() {
            return Err(Error::catalog(format!("line {}: empty sample id", line_idx + 1)));
        }

        let fields = header
            .iter()
            .zip(cells)
            .enumerate()
            .filter(|(pos, _)| *pos != id_pos)
            .map(|(_, (name, cell))| (name.clone(), normalize_cell(&cell)))
            .collect();

        records.push(Record { id, fields });
    }

    Ok(records)
}

// ---------------------------------------------------------------------------
// Private helpers
// ---------------------------------------------------------------------------

fn normalize_cell(cell: &str) -> Option<String> {
    let t = cell.trim();
    if t.is_empty() || t == "-" {
        None
    } else {
        Some(t.to_string())
    }
}

/// Parses a single CSV row, handling double-quoted fields.
fn parse_csv_row(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes && chars.peek() == Some(&'"') => {
                // Escaped quote inside quoted field.
                current.push('"');
                chars.next();
            }
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => fields.push(std::mem::take(&mut current)),
            c => current.push(c),
        }
    }
    fields.push(current);
    fields
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "ID,Class,Ship,Notes\n\
                          1,A,12,\"calm, clear\"\n\
                          2,B, - ,\n\
                          \n\
                          3,\"A\",13,\"said \"\"hi\"\"\"\n";

    #[test]
    fn parses_quoted_and_missing_cells() {
        let rows = parse_catalog(SAMPLE, "ID").unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].field("Notes").unwrap(), Some("calm, clear"));
        assert_eq!(rows[1].field("Ship").unwrap(), None);
        assert_eq!(rows[1].field("Notes").unwrap(), None);
        assert_eq!(rows[2].field("Class").unwrap(), Some("A"));
        assert_eq!(rows[2].field("Notes").unwrap(), Some("said \"hi\""));
        assert!(rows[0].field("Missing").is_err());
    }

    #[test]
    fn rejects_ragged_rows_and_unknown_id_column() {
        assert!(parse_catalog("ID,Class\n1,A,extra\n", "ID").is_err());
        assert!(parse_catalog("ID,Class\n1,A\n", "Id").is_err());
    }
}
