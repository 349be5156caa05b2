use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use rusqlite::Connection;

use crate::archive;
use crate::csv_store;
use crate::db;
use crate::detect::{detect_input, InputKind};
use crate::error::{Result, VitalisError};
use crate::model::{ExportData, TagSummary};
use crate::parser::ExportParser;

/// Read an export file, auto-detect its kind (or use the override) and parse it.
pub fn load(
    input: &Path,
    kind_override: Option<InputKind>,
    parser: &ExportParser,
) -> Result<(InputKind, ExportData)> {
    if !input.is_file() {
        return Err(VitalisError::NotFound(format!(
            "export file '{}' does not exist",
            input.display()
        )));
    }

    let kind = match kind_override {
        Some(kind) => kind,
        None => {
            let mut head = Vec::with_capacity(4096);
            File::open(input)?.take(4096).read_to_end(&mut head)?;
            detect_input(input, &head).ok_or_else(|| {
                VitalisError::Parse(format!(
                    "cannot tell whether '{}' is an XML export or a ZIP archive; pass --kind",
                    input.display()
                ))
            })?
        }
    };

    tracing::info!("Parsing {} as {}", input.display(), kind);
    let data = match kind {
        InputKind::Xml => parser.parse_reader(BufReader::new(File::open(input)?))?,
        InputKind::Zip => archive::parse_archive(input, parser)?,
    };
    tracing::info!("Found {} unique tags", data.tables().len());
    Ok((kind, data))
}

/// Outcome of [`convert`].
#[derive(Debug)]
pub struct ConversionSummary {
    pub kind: InputKind,
    pub tags: Vec<TagSummary>,
    pub files: Vec<PathBuf>,
    pub total_rows: usize,
    pub elapsed: Duration,
}

/// Convert an export into one CSV file per tag under `output_dir`.
pub fn convert(
    input: &Path,
    output_dir: &Path,
    kind_override: Option<InputKind>,
    parser: &ExportParser,
) -> Result<ConversionSummary> {
    let start = Instant::now();

    if !output_dir.is_dir() {
        tracing::warn!(
            "Output directory does not exist, it will be created: {}",
            output_dir.display()
        );
    }

    // Nothing is written until the whole input has parsed.
    let (kind, data) = load(input, kind_override, parser)?;
    let files = csv_store::write_tables(output_dir, &data)?;

    let tags = data.summaries();
    for summary in &tags {
        tracing::info!("{:<40} {:>40}", summary.tag, summary.rows);
    }
    let total_rows = data.total_rows();
    tracing::info!("{}", "-".repeat(80));
    tracing::info!("{:<40} {:>40}", "Total number of rows :", total_rows);

    let elapsed = start.elapsed();
    tracing::info!("Execution time: {:.2} seconds", elapsed.as_secs_f64());

    Ok(ConversionSummary {
        kind,
        tags,
        files,
        total_rows,
        elapsed,
    })
}

/// Parse an export and store it in the database.
/// Returns (import_id, detected_kind, actual_import_name, total_rows).
pub fn ingest(
    conn: &mut Connection,
    input: &Path,
    kind_override: Option<InputKind>,
    import_name: Option<&str>,
    parser: &ExportParser,
    overwrite: bool,
) -> Result<(i64, InputKind, String, usize)> {
    let (kind, data) = load(input, kind_override, parser)?;

    let name = match import_name {
        Some(n) => n.to_string(),
        None => input
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("unnamed")
            .to_string(),
    };

    if data.total_rows() == 0 {
        tracing::warn!("{} contains no elements", input.display());
    }

    let import_id = db::insert_import(conn, &name, input.to_str(), &data, overwrite)?;
    Ok((import_id, kind, name, data.total_rows()))
}
