use chrono::Utc;
use rusqlite::{params, Connection, Transaction};
use std::path::Path;

use crate::error::{Result, VitalisError};
use crate::model::{ExportData, ImportInfo, Record, TagSummary};
use crate::query::{unknown_tag, Store};

pub const SCHEMA_VERSION: u32 = 1;

const SCHEMA: &str = include_str!("../schema.sql");

/// Open (or create) the vitalis database at the given path.
pub fn open(path: &Path) -> Result<Connection> {
    let conn = Connection::open(path)?;
    conn.execute_batch("PRAGMA journal_mode=WAL;")?;
    conn.execute_batch("PRAGMA foreign_keys=ON;")?;
    conn.execute_batch("PRAGMA synchronous=NORMAL;")?;
    Ok(conn)
}

/// Open an existing database for reading. Fails with `NotFound` instead of
/// silently creating an empty file.
pub fn open_existing(path: &Path) -> Result<Connection> {
    if !path.is_file() {
        return Err(VitalisError::NotFound(format!(
            "database '{}' does not exist",
            path.display()
        )));
    }
    let conn = open(path)?;
    init_schema(&conn)?;
    Ok(conn)
}

/// Ensure the schema is initialized. Safe to call on an already-initialized DB.
pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(SCHEMA)?;

    let count: u32 = conn.query_row("SELECT COUNT(*) FROM schema_version", [], |row| {
        row.get(0)
    })?;
    if count == 0 {
        conn.execute(
            "INSERT INTO schema_version (version) VALUES (?1)",
            params![SCHEMA_VERSION],
        )?;
        return Ok(());
    }

    let version: u32 = conn.query_row("SELECT version FROM schema_version LIMIT 1", [], |row| {
        row.get(0)
    })?;
    if version > SCHEMA_VERSION {
        return Err(VitalisError::Other(format!(
            "Database schema version {} is newer than this binary supports ({}). \
             Please upgrade vitalis.",
            version, SCHEMA_VERSION
        )));
    }
    if version < SCHEMA_VERSION {
        return Err(VitalisError::Other(format!(
            "Database schema version {} predates this binary ({}) and has no migration. \
             Delete the database and re-ingest.",
            version, SCHEMA_VERSION
        )));
    }
    Ok(())
}

/// Store a parsed export under a new import. With `overwrite`, an existing
/// import of the same name is replaced; otherwise a duplicate name fails.
/// Returns the import id.
pub fn insert_import(
    conn: &mut Connection,
    name: &str,
    source_file: Option<&str>,
    data: &ExportData,
    overwrite: bool,
) -> Result<i64> {
    let tx = conn.transaction()?;
    if overwrite {
        tx.execute("DELETE FROM import WHERE name = ?1", params![name])?;
    }
    let import_id = insert_import_tx(&tx, name, source_file, data)?;
    tx.commit()?;
    Ok(import_id)
}

fn insert_import_tx(
    tx: &Transaction,
    name: &str,
    source_file: Option<&str>,
    data: &ExportData,
) -> Result<i64> {
    let now = Utc::now().to_rfc3339();

    tx.execute(
        "INSERT INTO import (name, source_file, created_at) VALUES (?1, ?2, ?3)",
        params![name, source_file, now],
    )
    .map_err(|e| match e {
        rusqlite::Error::SqliteFailure(ref err, _)
            if err.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            VitalisError::Other(format!(
                "Import '{}' already exists. Use --name to choose a different name, or --overwrite to replace it.",
                name
            ))
        }
        other => VitalisError::Sqlite(other),
    })?;
    let import_id = tx.last_insert_rowid();

    let mut column_stmt = tx.prepare_cached(
        "INSERT INTO tag_column (import_id, tag, name, position) VALUES (?1, ?2, ?3, ?4)",
    )?;
    let mut record_stmt =
        tx.prepare_cached("INSERT INTO record (import_id, tag, seq) VALUES (?1, ?2, ?3)")?;
    let mut field_stmt =
        tx.prepare_cached("INSERT INTO field (record_id, name, value) VALUES (?1, ?2, ?3)")?;

    for table in data.tables() {
        for (position, column) in table.columns.iter().enumerate() {
            column_stmt.execute(params![import_id, table.tag, column, position as i64])?;
        }
        for (seq, record) in table.records.iter().enumerate() {
            record_stmt.execute(params![import_id, table.tag, seq as i64])?;
            let record_id = tx.last_insert_rowid();
            // Empty attributes are stored as absent, matching the CSV files.
            for (field, value) in record.fields.iter().filter(|(_, v)| !v.is_empty()) {
                field_stmt.execute(params![record_id, field, value])?;
            }
        }
    }

    Ok(import_id)
}

/// All imports, oldest first.
pub fn list_imports(conn: &Connection) -> Result<Vec<ImportInfo>> {
    let mut stmt = conn.prepare(
        "SELECT i.name, i.source_file, i.created_at,
                (SELECT COUNT(*) FROM record WHERE import_id = i.id)
         FROM import i
         ORDER BY i.id",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok(ImportInfo {
            name: row.get(0)?,
            source_file: row.get(1)?,
            created_at: row.get(2)?,
            records: row.get(3)?,
        })
    })?;
    let mut result = Vec::new();
    for row in rows {
        result.push(row?);
    }
    Ok(result)
}

/// Delete an import and everything recorded under it.
/// Records, fields and columns are removed via ON DELETE CASCADE.
pub fn delete_import(conn: &mut Connection, name: &str) -> Result<()> {
    let tx = conn.transaction()?;
    let deleted = tx.execute("DELETE FROM import WHERE name = ?1", params![name])?;
    if deleted == 0 {
        return Err(VitalisError::NotFound(format!("import '{}'", name)));
    }
    tx.commit()?;
    Ok(())
}

/// Read side of the database.
pub struct SqliteStore<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteStore<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    fn has_tag(&self, tag: &str) -> Result<bool> {
        let count: u64 = self.conn.query_row(
            "SELECT COUNT(*) FROM record WHERE tag = ?1",
            params![tag],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }
}

impl Store for SqliteStore<'_> {
    fn tag_names(&self) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT DISTINCT tag FROM record ORDER BY tag")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let mut result = Vec::new();
        for row in rows {
            result.push(row?);
        }
        Ok(result)
    }

    fn tags(&self) -> Result<Vec<TagSummary>> {
        let mut stmt = self
            .conn
            .prepare("SELECT tag, COUNT(*) FROM record GROUP BY tag ORDER BY tag")?;
        let rows = stmt.query_map([], |row| {
            Ok(TagSummary {
                tag: row.get(0)?,
                rows: row.get(1)?,
            })
        })?;
        let mut result = Vec::new();
        for row in rows {
            result.push(row?);
        }
        Ok(result)
    }

    fn columns(&self, tag: &str) -> Result<Vec<String>> {
        if !self.has_tag(tag)? {
            return Err(unknown_tag(tag));
        }
        let mut stmt = self.conn.prepare(
            "SELECT name FROM tag_column WHERE tag = ?1 ORDER BY import_id, position",
        )?;
        let rows = stmt.query_map(params![tag], |row| row.get::<_, String>(0))?;
        let mut result: Vec<String> = Vec::new();
        for row in rows {
            let name = row?;
            if !result.contains(&name) {
                result.push(name);
            }
        }
        Ok(result)
    }

    fn records(&self, tag: &str) -> Result<Vec<Record>> {
        if !self.has_tag(tag)? {
            return Err(unknown_tag(tag));
        }
        let mut stmt = self.conn.prepare(
            "SELECT r.id, f.name, f.value
             FROM record r
             LEFT JOIN field f ON f.record_id = r.id
             WHERE r.tag = ?1
             ORDER BY r.import_id, r.seq",
        )?;
        let mut rows = stmt.query(params![tag])?;

        let mut result: Vec<Record> = Vec::new();
        let mut current_id: Option<i64> = None;
        while let Some(row) = rows.next()? {
            let id: i64 = row.get(0)?;
            if current_id != Some(id) {
                result.push(Record::new(tag));
                current_id = Some(id);
            }
            let name: Option<String> = row.get(1)?;
            let value: Option<String> = row.get(2)?;
            if let (Some(name), Some(value), Some(record)) = (name, value, result.last_mut()) {
                record.fields.insert(name, value);
            }
        }
        Ok(result)
    }
}
