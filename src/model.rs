//! Uniform in-memory representation of health records, independent of the
//! backend they came from. The parser produces an `ExportData` which is then
//! written to CSV files or inserted into the SQLite store.

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;

/// Compute a ratio, returning 0.0 when the total is zero.
#[must_use]
pub fn rate(part: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 / total as f64
    }
}

/// A single element of an export: its tag plus its attributes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Record {
    pub tag: String,
    pub fields: BTreeMap<String, String>,
}

impl Record {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            fields: BTreeMap::new(),
        }
    }

    /// Builder-style helper, mostly for tests and fixtures.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.fields.get(field).map(String::as_str)
    }
}

/// All records sharing one tag.
#[derive(Debug, Clone, Default)]
pub struct TagTable {
    pub tag: String,
    /// Union of field names across `records`, in first-seen order.
    pub columns: Vec<String>,
    pub records: Vec<Record>,
}

impl TagTable {
    pub fn new(tag: String) -> Self {
        Self {
            tag,
            ..Default::default()
        }
    }

    /// Append a record, extending `columns` with any field names not seen yet.
    pub fn push(&mut self, fields: Vec<(String, String)>) {
        let mut record = Record::new(self.tag.clone());
        for (name, value) in fields {
            if !self.columns.iter().any(|c| *c == name) {
                self.columns.push(name.clone());
            }
            record.fields.insert(name, value);
        }
        self.records.push(record);
    }

    /// Field values of `record` laid out in column order; `None` where absent.
    pub fn row<'a>(&'a self, record: &'a Record) -> Vec<Option<&'a str>> {
        self.columns.iter().map(|c| record.get(c)).collect()
    }
}

/// The complete result of parsing one or more export documents.
#[derive(Debug, Clone, Default)]
pub struct ExportData {
    tables: Vec<TagTable>,
    index: HashMap<String, usize>,
}

impl ExportData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, tag: &str, fields: Vec<(String, String)>) {
        let idx = match self.index.get(tag) {
            Some(&idx) => idx,
            None => {
                self.tables.push(TagTable::new(tag.to_string()));
                self.index.insert(tag.to_string(), self.tables.len() - 1);
                self.tables.len() - 1
            }
        };
        self.tables[idx].push(fields);
    }

    /// Append every record of `other`, keeping first-seen tag order.
    pub fn merge(&mut self, other: ExportData) {
        for table in other.tables {
            let idx = match self.index.get(&table.tag) {
                Some(&idx) => idx,
                None => {
                    self.index.insert(table.tag.clone(), self.tables.len());
                    self.tables.push(TagTable::new(table.tag.clone()));
                    self.tables.len() - 1
                }
            };
            let target = &mut self.tables[idx];
            for column in table.columns {
                if !target.columns.contains(&column) {
                    target.columns.push(column);
                }
            }
            target.records.extend(table.records);
        }
    }

    /// Tables in the order their tag first appeared.
    pub fn tables(&self) -> &[TagTable] {
        &self.tables
    }

    pub fn table(&self, tag: &str) -> Option<&TagTable> {
        self.index.get(tag).map(|&idx| &self.tables[idx])
    }

    pub fn total_rows(&self) -> usize {
        self.tables.iter().map(|t| t.records.len()).sum()
    }

    pub fn summaries(&self) -> Vec<TagSummary> {
        self.tables
            .iter()
            .map(|t| TagSummary {
                tag: t.tag.clone(),
                rows: t.records.len() as u64,
            })
            .collect()
    }
}

/// Row count for one tag in a store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TagSummary {
    pub tag: String,
    pub rows: u64,
}

/// Metadata for a stored import.
#[derive(Debug)]
pub struct ImportInfo {
    pub name: String,
    pub source_file: Option<String>,
    pub created_at: String,
    pub records: u64,
}
