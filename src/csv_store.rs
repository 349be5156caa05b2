//! Per-tag CSV files: one `<tag>.csv` per tag, header row = columns.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::str;

use crate::error::{Result, VitalisError};
use crate::model::{ExportData, Record, TagSummary, TagTable};
use crate::query::{unknown_tag, Store};

const EXTENSION: &str = "csv";

/// File stem used for `tag`. Bytes outside `[A-Za-z0-9_.-]` are written as
/// `%XX`, so distinct tags never share a file and [`tag_from_stem`] can
/// recover the original name.
pub fn file_stem(tag: &str) -> String {
    let mut stem = String::with_capacity(tag.len());
    for byte in tag.bytes() {
        if byte.is_ascii_alphanumeric() || matches!(byte, b'_' | b'.' | b'-') {
            stem.push(char::from(byte));
        } else {
            stem.push_str(&format!("%{byte:02X}"));
        }
    }
    stem
}

/// Inverse of [`file_stem`]. `None` for stems it could not have produced.
pub fn tag_from_stem(stem: &str) -> Option<String> {
    let bytes = stem.as_bytes();
    let mut tag = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = str::from_utf8(bytes.get(i + 1..i + 3)?).ok()?;
            tag.push(u8::from_str_radix(hex, 16).ok()?);
            i += 3;
        } else {
            tag.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(tag).ok()
}

/// Write every table of `data` into `dir`, replacing existing files of the
/// same name. Returns the written paths in table order.
///
/// Fails before writing anything if two tags would land in the same file on a
/// case-insensitive file system.
pub fn write_tables(dir: &Path, data: &ExportData) -> Result<Vec<PathBuf>> {
    let mut stems: HashMap<String, &str> = HashMap::new();
    for table in data.tables() {
        let folded = file_stem(&table.tag).to_ascii_lowercase();
        if let Some(other) = stems.insert(folded, &table.tag) {
            return Err(VitalisError::Other(format!(
                "tags '{}' and '{}' would share a CSV file",
                other, table.tag
            )));
        }
    }

    fs::create_dir_all(dir)?;
    let mut written = Vec::with_capacity(data.tables().len());
    for table in data.tables() {
        let path = dir.join(format!("{}.{EXTENSION}", file_stem(&table.tag)));
        write_table(&path, table)?;
        written.push(path);
    }
    Ok(written)
}

fn write_table(path: &Path, table: &TagTable) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(&table.columns)?;
    for record in &table.records {
        writer.write_record(table.row(record).into_iter().map(|v| v.unwrap_or("")))?;
    }
    writer.flush()?;
    Ok(())
}

/// A directory of CSV files produced by [`write_tables`].
pub struct CsvStore {
    dir: PathBuf,
}

impl CsvStore {
    /// Fails with `NotFound` when `dir` does not exist.
    pub fn open(dir: &Path) -> Result<Self> {
        if !dir.is_dir() {
            return Err(VitalisError::NotFound(format!(
                "data directory '{}' does not exist",
                dir.display()
            )));
        }
        Ok(Self {
            dir: dir.to_path_buf(),
        })
    }

    fn path_for(&self, tag: &str) -> Result<PathBuf> {
        let path = self.dir.join(format!("{}.{EXTENSION}", file_stem(tag)));
        if path.is_file() {
            Ok(path)
        } else {
            Err(unknown_tag(tag))
        }
    }

    fn reader(path: &Path) -> Result<csv::Reader<fs::File>> {
        Ok(csv::ReaderBuilder::new().flexible(true).from_path(path)?)
    }
}

impl Store for CsvStore {
    fn tag_names(&self) -> Result<Vec<String>> {
        let mut tags = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if !path.is_file() || path.extension().and_then(|e| e.to_str()) != Some(EXTENSION) {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            match tag_from_stem(stem) {
                Some(tag) => tags.push(tag),
                None => tracing::debug!(path = %path.display(), "skipping file with foreign name"),
            }
        }
        tags.sort();
        Ok(tags)
    }

    fn tags(&self) -> Result<Vec<TagSummary>> {
        let mut summaries = Vec::new();
        for tag in self.tag_names()? {
            let mut reader = Self::reader(&self.path_for(&tag)?)?;
            let mut rows = 0u64;
            for record in reader.records() {
                record?;
                rows += 1;
            }
            summaries.push(TagSummary { tag, rows });
        }
        Ok(summaries)
    }

    fn columns(&self, tag: &str) -> Result<Vec<String>> {
        let mut reader = Self::reader(&self.path_for(tag)?)?;
        Ok(reader
            .headers()?
            .iter()
            .filter(|h| !h.is_empty())
            .map(str::to_string)
            .collect())
    }

    fn records(&self, tag: &str) -> Result<Vec<Record>> {
        let mut reader = Self::reader(&self.path_for(tag)?)?;
        let headers = reader.headers()?.clone();
        let mut records = Vec::new();
        for row in reader.records() {
            let row = row?;
            let mut record = Record::new(tag);
            for (name, value) in headers.iter().zip(row.iter()) {
                // Empty cells carry no information once written out.
                if !name.is_empty() && !value.is_empty() {
                    record.fields.insert(name.to_string(), value.to_string());
                }
            }
            records.push(record);
        }
        Ok(records)
    }
}
