use std::collections::BTreeSet;

use chrono::{NaiveDate, NaiveDateTime};
use recurlink_core::{catalog, types::SharedFields};
use recurlink_sync::{
    local::{CatalogProvider, LedgerClient},
    CorrespondenceStore, ExternalRecordClient, ReconcileMode, ReconcileOptions, RequestContext,
    SyncEngine, SyncError,
};
use tempfile::TempDir;

fn at(day: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 5, day)
        .expect("date")
        .and_hms_opt(19, 0, 0)
        .expect("time")
}

fn open(home: &TempDir) -> SyncEngine<CatalogProvider, LedgerClient> {
    SyncEngine::new(
        CatalogProvider::new(home.path()),
        LedgerClient::open_at(home.path()).expect("ledger"),
        CorrespondenceStore::open_at(home.path()).expect("store"),
        RequestContext::new(ReconcileOptions::default()),
    )
}

#[test]
fn orphan_state_survives_a_restart() {
    let home = TempDir::new().expect("home");
    let seq = catalog::add_sequence_at(
        home.path(),
        SharedFields {
            title: "Book club".to_string(),
            ..SharedFields::default()
        },
        vec![(at(1), at(1)), (at(8), at(8)), (at(15), at(15))],
    )
    .expect("add")
    .id;

    let first = open(&home).sync_sequence(seq).expect("first sync");
    assert_eq!(first.mode, ReconcileMode::FirstSync);

    catalog::reschedule_at(home.path(), seq, vec![(at(1), at(1)), (at(15), at(15))])
        .expect("reschedule");
    let second = open(&home).sync_sequence(seq).expect("second sync");
    assert_eq!(second.mode, ReconcileMode::DateMatched);
    assert_eq!(second.disabled.len(), 1);

    let engine = open(&home);
    let orphans = engine.store().orphans(seq);
    assert_eq!(orphans, BTreeSet::from([second.disabled[0]]));
    assert_eq!(engine.store().forward(seq).len(), 2);
    let disabled = engine
        .client()
        .get(second.disabled[0])
        .expect("get")
        .expect("record kept");
    assert!(!disabled.fields.is_active);
}

#[test]
fn break_persists_to_catalog_and_store() {
    let home = TempDir::new().expect("home");
    let seq = catalog::add_sequence_at(
        home.path(),
        SharedFields::default(),
        vec![(at(2), at(2)), (at(9), at(9))],
    )
    .expect("add")
    .id;
    let mut engine = open(&home);
    engine.sync_sequence(seq).expect("sync");
    let moved = *engine
        .store()
        .forward(seq)
        .values()
        .last()
        .expect("second record");
    let occurrence = *engine.store().forward(seq).keys().last().expect("occurrence");

    let new_seq = engine.break_occurrence(seq, occurrence).expect("break");

    let reopened = open(&home);
    assert_eq!(reopened.store().reverse(moved), Some((new_seq, occurrence)));
    assert_eq!(reopened.store().forward(seq).len(), 1);
    let standalone = catalog::load_sequence_at(home.path(), new_seq).expect("new sequence");
    assert_eq!(standalone.occurrences.len(), 1);
}

#[test]
fn offline_ledger_refuses_sync() {
    let home = TempDir::new().expect("home");
    let seq = catalog::add_sequence_at(home.path(), SharedFields::default(), vec![(at(3), at(3))])
        .expect("add")
        .id;
    LedgerClient::open_at(home.path())
        .expect("ledger")
        .set_online(false)
        .expect("offline");

    let err = open(&home).sync_sequence(seq).unwrap_err();
    assert!(matches!(err, SyncError::ClientUnavailable), "got: {err}");
}

#[test]
fn stale_store_handle_is_refused() {
    let home = TempDir::new().expect("home");
    let seq = catalog::add_sequence_at(home.path(), SharedFields::default(), vec![(at(4), at(4))])
        .expect("add")
        .id;
    let mut stale = open(&home);
    open(&home).sync_sequence(seq).expect("sync");

    let err = stale.sync_sequence(seq).unwrap_err();
    assert!(matches!(err, SyncError::Conflict { .. }), "got: {err}");
}
