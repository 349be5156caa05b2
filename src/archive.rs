//! Reading export documents out of the ZIP archive the Health app produces.
//!
//! A typical archive holds `apple_health_export/export.xml`, an
//! `export_cda.xml` alongside it, and a tree of GPX routes and ECG CSVs. Only
//! the XML entries are parsed; nothing is extracted to disk.

use std::fs::File;
use std::io::{BufReader, Read, Seek};
use std::path::Path;

use zip::ZipArchive;

use crate::error::{Result, VitalisError};
use crate::model::ExportData;
use crate::parser::ExportParser;

/// Names of the XML entries in `archive`, sorted.
pub fn xml_entries<R: Read + Seek>(archive: &mut ZipArchive<R>) -> Result<Vec<String>> {
    let mut names = Vec::new();
    for i in 0..archive.len() {
        let entry = archive.by_index(i)?;
        if entry.is_dir() {
            continue;
        }
        if entry.name().to_lowercase().ends_with(".xml") {
            names.push(entry.name().to_string());
        }
    }
    names.sort();
    Ok(names)
}

/// Parse every XML entry of the archive at `path` and merge the results.
pub fn parse_archive(path: &Path, parser: &ExportParser) -> Result<ExportData> {
    let file = File::open(path)?;
    parse_archive_reader(BufReader::new(file), parser)
}

pub fn parse_archive_reader<R: Read + Seek>(
    reader: R,
    parser: &ExportParser,
) -> Result<ExportData> {
    let mut archive = ZipArchive::new(reader)?;
    let names = xml_entries(&mut archive)?;
    if names.is_empty() {
        return Err(VitalisError::NotFound(
            "no XML files in the archive".to_string(),
        ));
    }

    let mut data = ExportData::new();
    for name in &names {
        tracing::info!("Parsing archive entry {name}");
        let entry = archive.by_name(name)?;
        data.merge(parser.parse_reader(BufReader::new(entry))?);
    }
    Ok(data)
}
