mod common;

use vitalis::convert;
use vitalis::db::{self, SqliteStore};
use vitalis::detect::InputKind;
use vitalis::parser::ExportParser;
use vitalis::query::{fetch, Filter, Store};

/// Test the full `convert::ingest()` pipeline: read file from disk, auto-detect kind, insert.
#[test]
fn ingest_xml_file_auto_detect() {
    let (mut conn, dir, _) = common::setup_db();
    let input = common::write_export(dir.path());

    let (import_id, kind, name, rows) =
        convert::ingest(&mut conn, &input, None, None, &ExportParser::default(), false).unwrap();

    assert!(import_id > 0);
    assert_eq!(kind, InputKind::Xml);
    assert_eq!(name, "export.xml");
    assert_eq!(rows, 12);

    let imports = db::list_imports(&conn).unwrap();
    assert_eq!(imports.len(), 1);
    assert_eq!(imports[0].records, 12);
    assert_eq!(imports[0].source_file.as_deref(), input.to_str());
}

#[test]
fn ingest_zip_archive() {
    let (mut conn, dir, _) = common::setup_db();
    let zip_path = dir.path().join("export.zip");
    common::write_zip(&zip_path, &[("apple_health_export/export.xml", common::EXPORT_XML)]);

    let (_id, kind, name, rows) = convert::ingest(
        &mut conn,
        &zip_path,
        None,
        Some("feb"),
        &ExportParser::default(),
        false,
    )
    .unwrap();

    assert_eq!(kind, InputKind::Zip);
    assert_eq!(name, "feb");
    assert_eq!(rows, 12);
}

#[test]
fn ingest_duplicate_name_fails() {
    let (mut conn, dir, _) = common::setup_db();
    let input = common::write_export(dir.path());
    let parser = ExportParser::default();

    convert::ingest(&mut conn, &input, None, Some("dup"), &parser, false).unwrap();

    // Second ingest with same name should fail without --overwrite
    let result = convert::ingest(&mut conn, &input, None, Some("dup"), &parser, false);
    let err_msg = format!("{}", result.unwrap_err());
    assert!(err_msg.contains("already exists"), "Error: {}", err_msg);

    // The failed attempt must not leave partial records behind.
    let store = SqliteStore::new(&conn);
    assert_eq!(fetch(&store, &Filter::tag("Record")).unwrap().len(), 5);
}

#[test]
fn ingest_overwrite_replaces_import() {
    let (mut conn, dir, _) = common::setup_db();
    let input = common::write_export(dir.path());

    convert::ingest(&mut conn, &input, None, Some("health"), &ExportParser::default(), false)
        .unwrap();

    let include = vec!["Workout".to_string()];
    convert::ingest(
        &mut conn,
        &input,
        None,
        Some("health"),
        &ExportParser::new(Some(&include)),
        true,
    )
    .unwrap();

    let store = SqliteStore::new(&conn);
    assert_eq!(store.tag_names().unwrap(), vec!["Workout"]);
    assert_eq!(db::list_imports(&conn).unwrap().len(), 1);
}

#[test]
fn records_from_older_imports_come_first() {
    let (mut conn, dir, _) = common::setup_db();
    let first = dir.path().join("first.xml");
    std::fs::write(
        &first,
        br#"<HealthData><Record value="1"/><Record value="2" unit="count"/></HealthData>"#,
    )
    .unwrap();
    let second = dir.path().join("second.xml");
    std::fs::write(
        &second,
        br#"<HealthData><Record sourceName="Watch" value="3"/></HealthData>"#,
    )
    .unwrap();

    let parser = ExportParser::default();
    convert::ingest(&mut conn, &first, None, None, &parser, false).unwrap();
    convert::ingest(&mut conn, &second, None, None, &parser, false).unwrap();

    let store = SqliteStore::new(&conn);
    assert_eq!(
        store.columns("Record").unwrap(),
        vec!["value", "unit", "sourceName"]
    );
    let records = fetch(&store, &Filter::tag("Record")).unwrap();
    let values: Vec<_> = records.iter().filter_map(|r| r.get("value")).collect();
    assert_eq!(values, vec!["1", "2", "3"]);

    let names: Vec<_> = db::list_imports(&conn)
        .unwrap()
        .into_iter()
        .map(|i| i.name)
        .collect();
    assert_eq!(names, vec!["first.xml", "second.xml"]);
}

#[test]
fn delete_import_removes_its_records() {
    let (mut conn, dir, _) = common::setup_db();
    let input = common::write_export(dir.path());
    convert::ingest(&mut conn, &input, None, None, &ExportParser::default(), false).unwrap();

    db::delete_import(&mut conn, "export.xml").unwrap();

    let store = SqliteStore::new(&conn);
    assert!(store.tags().unwrap().is_empty());
    assert!(db::list_imports(&conn).unwrap().is_empty());
}
