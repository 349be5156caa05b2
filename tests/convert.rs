mod common;

use vitalis::convert;
use vitalis::csv_store::CsvStore;
use vitalis::detect::InputKind;
use vitalis::error::VitalisError;
use vitalis::parser::ExportParser;
use vitalis::query::Store;

/// Full pipeline: export.xml on disk → one CSV per tag → readable store.
#[test]
fn convert_xml_writes_one_csv_per_tag() {
    let dir = tempfile::tempdir().unwrap();
    let input = common::write_export(dir.path());
    let out = dir.path().join("csv_output");

    let summary = convert::convert(&input, &out, None, &ExportParser::default()).unwrap();

    assert_eq!(summary.kind, InputKind::Xml);
    assert_eq!(summary.total_rows, 12);
    assert_eq!(summary.files.len(), 8);
    let tags: Vec<_> = summary.tags.iter().map(|t| t.tag.as_str()).collect();
    assert_eq!(
        tags,
        vec![
            "HealthData",
            "ExportDate",
            "Me",
            "Record",
            "MetadataEntry",
            "Workout",
            "WorkoutStatistics",
            "ActivitySummary",
        ]
    );

    let header = std::fs::read_to_string(out.join("Record.csv")).unwrap();
    assert_eq!(
        header.lines().next().unwrap(),
        "type,sourceName,unit,creationDate,startDate,endDate,value"
    );

    let store = CsvStore::open(&out).unwrap();
    let records = store.records("Record").unwrap();
    assert_eq!(records.len(), 5);
    // Sleep analysis has no unit; the empty cell reads back as absent.
    assert_eq!(records[4].get("unit"), None);
}

#[test]
fn convert_zip_archive() {
    let dir = tempfile::tempdir().unwrap();
    let zip_path = dir.path().join("export.zip");
    common::write_zip(
        &zip_path,
        &[
            ("apple_health_export/export.xml", common::EXPORT_XML),
            ("apple_health_export/electrocardiograms/ecg_2024-02-28.csv", b"Name,Value\n"),
        ],
    );
    let out = dir.path().join("csv_output");

    let summary = convert::convert(&zip_path, &out, None, &ExportParser::default()).unwrap();

    assert_eq!(summary.kind, InputKind::Zip);
    assert_eq!(summary.total_rows, 12);
    assert!(out.join("Workout.csv").is_file());
}

#[test]
fn convert_with_include_tags() {
    let dir = tempfile::tempdir().unwrap();
    let input = common::write_export(dir.path());
    let out = dir.path().join("csv_output");
    let include = vec!["Workout".to_string(), "WorkoutStatistics".to_string()];

    let summary =
        convert::convert(&input, &out, None, &ExportParser::new(Some(&include))).unwrap();

    assert_eq!(summary.total_rows, 2);
    let store = CsvStore::open(&out).unwrap();
    assert_eq!(store.tag_names().unwrap(), vec!["Workout", "WorkoutStatistics"]);
}

#[test]
fn convert_kind_override() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("upload.bin");
    std::fs::write(&input, common::EXPORT_XML).unwrap();
    let out = dir.path().join("csv_output");

    let summary =
        convert::convert(&input, &out, Some(InputKind::Xml), &ExportParser::default()).unwrap();
    assert_eq!(summary.total_rows, 12);
}

#[test]
fn convert_missing_input_is_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let result = convert::convert(
        &dir.path().join("export.xml"),
        &dir.path().join("out"),
        None,
        &ExportParser::default(),
    );
    assert!(matches!(result, Err(VitalisError::NotFound(_))));
}

#[test]
fn convert_undetectable_input_fails() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("random.dat");
    std::fs::write(&input, b"hello world, not an export").unwrap();

    let result = convert::convert(&input, &dir.path().join("out"), None, &ExportParser::default());
    assert!(matches!(result, Err(VitalisError::Parse(_))));
}

#[test]
fn convert_rejects_truncated_export() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("export.xml");
    // A download cut off partway through the document.
    std::fs::write(&input, &common::EXPORT_XML[..common::EXPORT_XML.len() / 2]).unwrap();
    let out = dir.path().join("csv_output");

    let result = convert::convert(&input, &out, None, &ExportParser::default());
    assert!(result.is_err());
    assert!(!out.exists());
}
