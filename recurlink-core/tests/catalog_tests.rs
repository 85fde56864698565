//! Catalog error-message, atomic-write-safety, and break integration tests.
//! Storage: ~/.recurlink/sequences/<id>.yaml

use assert_fs::prelude::*;
use chrono::{NaiveDate, NaiveDateTime};
use predicates::prelude::predicate;
use recurlink_core::{
    catalog,
    types::{OccurrenceId, SequenceId, SharedFields},
    CatalogError,
};
use rstest::rstest;
use std::fs;

fn jan(day: u32) -> (NaiveDateTime, NaiveDateTime) {
    let d = NaiveDate::from_ymd_opt(2025, 1, day).unwrap();
    (d.and_hms_opt(18, 0, 0).unwrap(), d.and_hms_opt(20, 0, 0).unwrap())
}

fn fields(title: &str) -> SharedFields {
    SharedFields {
        title: title.to_string(),
        ..SharedFields::default()
    }
}

// ---------------------------------------------------------------------------
// 1. Load error messages
// ---------------------------------------------------------------------------

#[test]
fn load_missing_sequence_mentions_path() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    let err = catalog::load_sequence_at(home.path(), SequenceId(4)).unwrap_err();
    assert!(matches!(err, CatalogError::SequenceNotFound { .. }), "got: {err}");
    assert!(err.to_string().contains("4.yaml"));
}

#[rstest]
#[case::garbage(": : corrupt : yaml : !!!\n  - broken: [unclosed")]
#[case::wrong_shape("- this is a list, not a mapping\n")]
#[case::missing_fields("id: 1\n")]
fn load_malformed_yaml_returns_parse_error_with_path(#[case] body: &str) {
    let home = assert_fs::TempDir::new().expect("tempdir");
    home.child(".recurlink/sequences/1.yaml")
        .write_str(body)
        .expect("write");

    let err = catalog::load_sequence_at(home.path(), SequenceId(1)).unwrap_err();
    assert!(matches!(err, CatalogError::Parse { .. }), "got: {err}");
    assert!(err.to_string().contains("1.yaml"), "must contain file path, got: {err}");
}

// ---------------------------------------------------------------------------
// 2. Atomic write safety
// ---------------------------------------------------------------------------

#[test]
fn mid_write_crash_leaves_original_intact() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    let seq = catalog::add_sequence_at(home.path(), fields("Book club"), vec![jan(6)]).expect("add");

    let yaml_path = catalog::sequence_path_at(home.path(), seq.id);
    let original_bytes = fs::read(&yaml_path).expect("read original");

    // Simulate crash: .tmp written but process died before rename
    let tmp = yaml_path.with_file_name("1.yaml.tmp");
    fs::write(&tmp, b"CRASH - INCOMPLETE WRITE").expect("write crash tmp");

    let current_bytes = fs::read(&yaml_path).expect("read after crash");
    assert_eq!(original_bytes, current_bytes, "original must be unchanged after crash");

    // The stray tmp file is not mistaken for a sequence.
    let ids = catalog::list_sequence_ids_at(home.path()).expect("list");
    assert_eq!(ids, vec![SequenceId(1)]);
}

#[test]
fn saved_sequence_is_private() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    let seq = catalog::add_sequence_at(home.path(), fields("Book club"), vec![jan(6)]).expect("add");
    home.child(".recurlink/sequences/1.yaml")
        .assert(predicate::path::exists());

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let path = catalog::sequence_path_at(home.path(), seq.id);
        let mode = fs::metadata(&path).expect("meta").permissions().mode() & 0o777;
        assert_eq!(mode, 0o600, "expected 0600, got {mode:o}");
    }
}

// ---------------------------------------------------------------------------
// 3. Listing and mutations
// ---------------------------------------------------------------------------

#[test]
fn list_is_sorted_numerically() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    for _ in 0..11 {
        catalog::add_sequence_at(home.path(), fields("x"), vec![]).expect("add");
    }
    let ids: Vec<u64> = catalog::list_sequence_ids_at(home.path())
        .expect("list")
        .into_iter()
        .map(|id| id.0)
        .collect();
    assert_eq!(ids, (1..=11).collect::<Vec<_>>());
}

#[test]
fn delete_sequence_is_idempotent() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    let seq = catalog::add_sequence_at(home.path(), fields("x"), vec![]).expect("add");
    assert!(catalog::delete_sequence_at(home.path(), seq.id).expect("delete"));
    assert!(!catalog::delete_sequence_at(home.path(), seq.id).expect("delete again"));
    home.child(".recurlink/sequences/1.yaml")
        .assert(predicate::path::missing());
}

#[test]
fn update_fields_keeps_occurrences() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    let seq = catalog::add_sequence_at(home.path(), fields("Old"), vec![jan(1), jan(8)]).expect("add");
    let updated = catalog::update_fields_at(home.path(), seq.id, fields("New")).expect("update");
    assert_eq!(updated.fields.title, "New");
    assert_eq!(updated.occurrences, seq.occurrences);
}

#[test]
fn break_creates_standalone_sequence_with_next_id() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    let seq = catalog::add_sequence_at(home.path(), fields("Yoga"), vec![jan(1), jan(8), jan(15)])
        .expect("add");
    catalog::add_sequence_at(home.path(), fields("Other"), vec![]).expect("add");

    let standalone =
        catalog::break_occurrence_at(home.path(), seq.id, OccurrenceId(2), &[]).expect("break");
    assert_eq!(standalone.id, SequenceId(3));
    assert_eq!(standalone.fields.title, "Yoga");
    assert_eq!(standalone.occurrences[0].start, jan(8).0);

    home.child(".recurlink/sequences/3.yaml")
        .assert(predicate::path::exists());
    let original = catalog::load_sequence_at(home.path(), seq.id).expect("load");
    let remaining: Vec<u64> = original.occurrences.iter().map(|o| o.occurrence_id.0).collect();
    assert_eq!(remaining, vec![1, 3]);
}
