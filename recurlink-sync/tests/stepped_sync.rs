use chrono::{NaiveDate, NaiveDateTime};
use recurlink_core::types::{OccurrenceDate, SharedFields};
use recurlink_sync::{
    memory::{MemoryRecordClient, MemorySequenceProvider},
    step_sequences,
    stepped::{self, SEQUENCES_JOB},
    CorrespondenceStore, ReconcileOptions, RequestContext, StepReport, SyncEngine, SyncError,
};
use tempfile::TempDir;

type Engine = SyncEngine<MemorySequenceProvider, MemoryRecordClient>;

fn at(day: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 2, day)
        .expect("date")
        .and_hms_opt(9, 0, 0)
        .expect("time")
}

fn engine_with(count: u32) -> Engine {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut provider = MemorySequenceProvider::new();
    for day in 1..=count {
        provider.add(
            SharedFields {
                title: format!("Class {day}"),
                ..SharedFields::default()
            },
            vec![OccurrenceDate::new(1, at(day), at(day))],
        );
    }
    SyncEngine::new(
        provider,
        MemoryRecordClient::new(),
        CorrespondenceStore::in_memory(),
        RequestContext::new(ReconcileOptions::default()),
    )
}

fn report(finished: bool, from: usize, to: usize, failed: usize) -> StepReport {
    StepReport {
        finished,
        from,
        to,
        failed,
    }
}

#[test]
fn steps_walk_every_sequence_then_finish() {
    let home = TempDir::new().expect("home");
    let mut engine = engine_with(7);

    let reports: Vec<StepReport> = (0..4)
        .map(|_| step_sequences(home.path(), &mut engine, 3).expect("step"))
        .collect();

    assert_eq!(
        reports,
        vec![
            report(false, 0, 3, 0),
            report(false, 3, 6, 0),
            report(false, 6, 7, 0),
            report(true, 7, 7, 0),
        ]
    );
    assert_eq!(engine.client().len(), 7);
    let cursor = stepped::load_at(home.path()).expect("cursor");
    assert_eq!(cursor.offsets.get(SEQUENCES_JOB), None);

    // After finishing, the next step starts over.
    let again = step_sequences(home.path(), &mut engine, 3).expect("restart");
    assert_eq!(again.from, 0);
}

#[test]
fn offset_survives_between_engines() {
    let home = TempDir::new().expect("home");
    let mut first = engine_with(4);
    step_sequences(home.path(), &mut first, 2).expect("step");

    let mut second = engine_with(4);
    let next = step_sequences(home.path(), &mut second, 2).expect("step");

    assert_eq!(next, report(false, 2, 4, 0));
    assert_eq!(second.client().len(), 2);
}

#[test]
fn failing_items_are_counted_and_the_offset_still_advances() {
    let home = TempDir::new().expect("home");
    let mut engine = engine_with(3);
    engine.client_mut().fail_create_at(at(2));

    let step = step_sequences(home.path(), &mut engine, 5).expect("step");

    assert_eq!(step, report(false, 0, 3, 1));
    assert_eq!(engine.client().len(), 2);
}

#[test]
fn unavailable_client_leaves_the_offset_untouched() {
    let home = TempDir::new().expect("home");
    let mut engine = engine_with(3);
    step_sequences(home.path(), &mut engine, 1).expect("step");
    engine.client_mut().set_available(false);

    let err = step_sequences(home.path(), &mut engine, 1).unwrap_err();

    assert!(matches!(err, SyncError::ClientUnavailable), "got: {err}");
    let cursor = stepped::load_at(home.path()).expect("cursor");
    assert_eq!(cursor.offsets.get(SEQUENCES_JOB), Some(&1));
}

#[test]
fn zero_batch_size_is_treated_as_one() {
    let home = TempDir::new().expect("home");
    let mut engine = engine_with(2);
    let step = step_sequences(home.path(), &mut engine, 0).expect("step");
    assert_eq!(step, report(false, 0, 1, 0));
}

#[test]
fn reset_starts_the_job_over() {
    let home = TempDir::new().expect("home");
    let mut engine = engine_with(4);
    step_sequences(home.path(), &mut engine, 2).expect("step");

    assert_eq!(stepped::reset_at(home.path(), SEQUENCES_JOB).expect("reset"), Some(2));
    let step = step_sequences(home.path(), &mut engine, 2).expect("step");
    assert_eq!(step.from, 0);
}
