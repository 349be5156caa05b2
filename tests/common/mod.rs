use rusqlite::Connection;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

pub const EXPORT_XML: &[u8] = include_bytes!("../fixtures/export.xml");

/// Create a fresh temporary database, returning the connection, dir handle, and db path.
/// The caller must hold onto `TempDir` to keep the temp directory alive.
pub fn setup_db() -> (Connection, TempDir, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("test.db");
    let conn = vitalis::db::open(&db_path).unwrap();
    vitalis::db::init_schema(&conn).unwrap();
    (conn, dir, db_path)
}

/// Copy the fixture export into `dir` and return its path.
pub fn write_export(dir: &Path) -> PathBuf {
    let path = dir.join("export.xml");
    std::fs::write(&path, EXPORT_XML).unwrap();
    path
}

/// Package `entries` into a ZIP archive at `path`.
#[allow(dead_code)]
pub fn write_zip(path: &Path, entries: &[(&str, &[u8])]) {
    use std::io::Write;

    let file = std::fs::File::create(path).unwrap();
    let mut writer = zip::ZipWriter::new(file);
    for (name, body) in entries {
        writer
            .start_file(*name, zip::write::FileOptions::default())
            .unwrap();
        writer.write_all(body).unwrap();
    }
    writer.finish().unwrap();
}
