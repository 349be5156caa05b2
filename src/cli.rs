//! Command handler functions for the vitalis CLI.
//!
//! Each `cmd_*` function returns its output as a `String`, making them easy
//! to test without capturing stdout.

use std::fmt::Write;
use std::path::Path;

use anyhow::{Context, Result};
use clap::ValueEnum;
use rusqlite::Connection;

use crate::convert;
use crate::db;
use crate::detect::InputKind;
use crate::parser::ExportParser;
use crate::query::{self, Filter, Store};
use crate::report::{
    format_stats, CsvFormatter, JsonFormatter, RecordFormatter, RecordSet, TableFormatter,
};
use crate::stats;

/// Which backend a read command queries.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum StoreKind {
    /// Per-tag CSV files under the data directory.
    Csv,
    /// The SQLite database.
    Sqlite,
}

/// Output style for the `fetch` command.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Table,
    Csv,
    Json,
}

pub fn cmd_convert(
    input: &Path,
    output_dir: &Path,
    kind: Option<InputKind>,
    parser: &ExportParser,
) -> Result<String> {
    let summary = convert::convert(input, output_dir, kind, parser)
        .with_context(|| format!("Failed to convert {}", input.display()))?;

    let mut out = String::new();
    writeln!(out, "{:<40} {:>10}", "TAG", "ROWS")?;
    writeln!(out, "{}", "-".repeat(51))?;
    for tag in &summary.tags {
        writeln!(out, "{:<40} {:>10}", tag.tag, tag.rows)?;
    }
    writeln!(out, "{}", "-".repeat(51))?;
    writeln!(out, "{:<40} {:>10}", "Total", summary.total_rows)?;
    writeln!(
        out,
        "Converted {} ({}) → {} CSV files in {} ({:.2}s)",
        input.display(),
        summary.kind,
        summary.files.len(),
        output_dir.display(),
        summary.elapsed.as_secs_f64(),
    )?;
    Ok(out)
}

pub fn cmd_ingest(
    conn: &mut Connection,
    input: &Path,
    kind: Option<InputKind>,
    name: Option<&str>,
    parser: &ExportParser,
    overwrite: bool,
) -> Result<String> {
    let (import_id, detected_kind, actual_name, rows) =
        convert::ingest(conn, input, kind, name, parser, overwrite)?;
    Ok(format!(
        "Ingested {} as '{}' → import id {} (name: '{}', {} records)\n",
        input.display(),
        detected_kind,
        import_id,
        actual_name,
        rows,
    ))
}

pub fn cmd_imports(conn: &Connection) -> Result<String> {
    let imports = db::list_imports(conn)?;
    if imports.is_empty() {
        return Ok("No imports in database.\n".to_string());
    }
    let mut out = String::new();
    writeln!(out, "{:<30} {:>10} CREATED", "NAME", "RECORDS")?;
    writeln!(out, "{}", "-".repeat(75))?;
    for import in &imports {
        writeln!(
            out,
            "{:<30} {:>10} {}",
            import.name, import.records, import.created_at
        )?;
    }
    Ok(out)
}

pub fn cmd_delete(conn: &mut Connection, name: &str) -> Result<String> {
    db::delete_import(conn, name)?;
    Ok(format!("Deleted import '{}'\n", name))
}

pub fn cmd_tags(store: &dyn Store) -> Result<String> {
    let tags = store.tags()?;
    if tags.is_empty() {
        return Ok("No records in store.\n".to_string());
    }
    let mut out = String::new();
    writeln!(out, "{:<40} {:>10}", "TAG", "ROWS")?;
    writeln!(out, "{}", "-".repeat(51))?;
    for tag in &tags {
        writeln!(out, "{:<40} {:>10}", tag.tag, tag.rows)?;
    }
    let total: u64 = tags.iter().map(|t| t.rows).sum();
    writeln!(out, "{}", "-".repeat(51))?;
    writeln!(out, "{:<40} {:>10}", "Total", total)?;
    Ok(out)
}

pub fn cmd_fetch(store: &dyn Store, filter: &Filter, format: OutputFormat) -> Result<String> {
    let records = query::fetch(store, filter)?;

    let columns = match &filter.select {
        Some(select) => select.clone(),
        None => {
            let tags = query::selected_tags(store, filter.tag.as_deref())?;
            query::known_columns(store, &tags)?
        }
    };
    let set = RecordSet { columns, records };

    let formatter: &dyn RecordFormatter = match format {
        OutputFormat::Table => &TableFormatter,
        OutputFormat::Csv => &CsvFormatter,
        OutputFormat::Json => &JsonFormatter,
    };
    Ok(formatter.format(&set)?)
}

pub fn cmd_stats(store: &dyn Store, filter: &Filter, field: &str, bins: usize) -> Result<String> {
    let mut filter = filter.clone();
    filter.select = Some(vec![field.to_string()]);
    let records = query::fetch(store, &filter)?;
    let summary = stats::field_stats(&records, field, bins);
    Ok(format_stats(&summary))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::csv_store::CsvStore;
    use crate::db::SqliteStore;
    use crate::query::{Condition, Op};

    const EXPORT: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<HealthData locale="en_US">
 <Record type="HKQuantityTypeIdentifierStepCount" unit="count" value="1200" startDate="2024-02-28 08:00:00 -0800"/>
 <Record type="HKQuantityTypeIdentifierStepCount" unit="count" value="300" startDate="2024-02-28 12:00:00 -0800"/>
 <Record type="HKQuantityTypeIdentifierHeartRate" unit="count/min" value="64" startDate="2024-02-28 08:05:00 -0800"/>
 <Workout workoutActivityType="HKWorkoutActivityTypeRunning" duration="31.5"/>
</HealthData>
"#;

    /// Create an in-memory database with schema initialized.
    fn test_db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("PRAGMA foreign_keys=ON;").unwrap();
        db::init_schema(&conn).unwrap();
        conn
    }

    fn write_export(dir: &Path) -> std::path::PathBuf {
        let path = dir.join("export.xml");
        std::fs::write(&path, EXPORT).unwrap();
        path
    }

    #[test]
    fn test_cmd_convert() {
        let dir = tempfile::tempdir().unwrap();
        let input = write_export(dir.path());
        let out_dir = dir.path().join("csv_output");

        let out = cmd_convert(&input, &out_dir, None, &ExportParser::default()).unwrap();

        assert!(out.contains("Record"));
        assert!(out.contains("Total"));
        assert!(out.contains("3 CSV files"));
        assert!(out_dir.join("Workout.csv").is_file());
    }

    #[test]
    fn test_cmd_convert_missing_input() {
        let dir = tempfile::tempdir().unwrap();
        let result = cmd_convert(
            &dir.path().join("nope.xml"),
            &dir.path().join("out"),
            None,
            &ExportParser::default(),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_cmd_ingest_and_imports() {
        let dir = tempfile::tempdir().unwrap();
        let input = write_export(dir.path());
        let mut conn = test_db();

        let out = cmd_ingest(
            &mut conn,
            &input,
            None,
            Some("feb"),
            &ExportParser::default(),
            false,
        )
        .unwrap();
        assert!(out.contains("Ingested"));
        assert!(out.contains("'xml'"));
        assert!(out.contains("5 records"));

        let out = cmd_imports(&conn).unwrap();
        assert!(out.contains("NAME"));
        assert!(out.contains("feb"));
    }

    #[test]
    fn test_cmd_imports_empty() {
        let conn = test_db();
        assert!(cmd_imports(&conn)
            .unwrap()
            .contains("No imports in database."));
    }

    #[test]
    fn test_cmd_delete() {
        let dir = tempfile::tempdir().unwrap();
        let input = write_export(dir.path());
        let mut conn = test_db();
        cmd_ingest(&mut conn, &input, None, None, &ExportParser::default(), false).unwrap();

        let out = cmd_delete(&mut conn, "export.xml").unwrap();
        assert!(out.contains("Deleted import 'export.xml'"));
        assert!(cmd_delete(&mut conn, "export.xml").is_err());
    }

    #[test]
    fn test_cmd_tags_sqlite() {
        let dir = tempfile::tempdir().unwrap();
        let input = write_export(dir.path());
        let mut conn = test_db();
        cmd_ingest(&mut conn, &input, None, None, &ExportParser::default(), false).unwrap();

        let out = cmd_tags(&SqliteStore::new(&conn)).unwrap();
        let record_line = out.lines().find(|l| l.starts_with("Record")).unwrap();
        assert!(record_line.ends_with(" 3"));
        assert!(out.lines().last().unwrap().ends_with(" 5"));
    }

    #[test]
    fn test_cmd_fetch_csv_store() {
        let dir = tempfile::tempdir().unwrap();
        let input = write_export(dir.path());
        let out_dir = dir.path().join("csv");
        cmd_convert(&input, &out_dir, None, &ExportParser::default()).unwrap();
        let store = CsvStore::open(&out_dir).unwrap();

        let filter = Filter::tag("Record")
            .condition(Condition::new(
                "type",
                Op::Eq,
                "HKQuantityTypeIdentifierStepCount",
            ))
            .select(["value", "startDate"])
            .sort_by("value", false);
        let out = cmd_fetch(&store, &filter, OutputFormat::Csv).unwrap();

        assert_eq!(
            out,
            "value,startDate\n300,2024-02-28 12:00:00 -0800\n1200,2024-02-28 08:00:00 -0800\n"
        );
    }

    #[test]
    fn test_cmd_fetch_unknown_field() {
        let dir = tempfile::tempdir().unwrap();
        let input = write_export(dir.path());
        let mut conn = test_db();
        cmd_ingest(&mut conn, &input, None, None, &ExportParser::default(), false).unwrap();

        let filter = Filter::tag("Record").condition(Condition::new("steps", Op::Gt, "1"));
        let err = cmd_fetch(&SqliteStore::new(&conn), &filter, OutputFormat::Table).unwrap_err();
        assert!(err.to_string().contains("unknown field 'steps'"), "{err}");
    }

    #[test]
    fn test_cmd_stats() {
        let dir = tempfile::tempdir().unwrap();
        let input = write_export(dir.path());
        let mut conn = test_db();
        cmd_ingest(&mut conn, &input, None, None, &ExportParser::default(), false).unwrap();

        let filter = Filter::tag("Record").condition(Condition::new("unit", Op::Eq, "count"));
        let out = cmd_stats(&SqliteStore::new(&conn), &filter, "value", 4).unwrap();

        assert!(out.contains("Values:     2/2 numeric"));
        assert!(out.contains("Min:        300"));
        assert!(out.contains("Max:        1200"));
        assert!(out.contains("Mean:       750.000"));
    }
}
