use std::path::Path;
use std::process::Command;

use assert_cmd::prelude::*;
use predicates::str::contains;
use serde_json::Value;
use tempfile::TempDir;

fn recurlink_cmd(home: &Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("recurlink"));
    cmd.env("HOME", home)
        .env("USERPROFILE", home)
        .env("RUST_LOG", "warn");
    cmd
}

fn add_weekly(home: &Path, title: &str) {
    recurlink_cmd(home)
        .args([
            "sequence",
            "add",
            title,
            "--at",
            "2024-01-01T10:00",
            "--at",
            "2024-01-08T10:00",
            "--at",
            "2024-01-15T10:00",
        ])
        .assert()
        .success()
        .stdout(contains("3 created"));
}

fn status_json(home: &Path) -> Value {
    let output = recurlink_cmd(home)
        .args(["status", "--json"])
        .output()
        .expect("run status");
    assert!(output.status.success(), "status failed: {output:?}");
    serde_json::from_slice(&output.stdout).expect("status emits JSON")
}

#[test]
fn init_writes_settings() {
    let home = TempDir::new().unwrap();
    recurlink_cmd(home.path())
        .args(["init", "--delete-unused", "--batch-size", "2"])
        .assert()
        .success()
        .stdout(contains("settings.yaml"));

    let raw = std::fs::read_to_string(home.path().join(".recurlink/settings.yaml")).unwrap();
    assert!(raw.contains("delete_unused: true"));
    assert!(raw.contains("step_batch_size: 2"));
}

#[test]
fn added_sequence_is_synced_and_reported() {
    let home = TempDir::new().unwrap();
    add_weekly(home.path(), "Yoga");

    let status = status_json(home.path());
    assert_eq!(status["records"], 3);
    assert_eq!(status["ledger_online"], true);
    let row = &status["sequences"][0];
    assert_eq!(row["id"], 1);
    assert_eq!(row["live"], 3);
    assert_eq!(row["orphans"], 0);
    assert_eq!(row["state"], "synced");

    recurlink_cmd(home.path())
        .arg("status")
        .assert()
        .success()
        .stdout(contains("Yoga"))
        .stdout(contains("SYNCED"));
}

#[test]
fn no_sync_leaves_sequence_unlinked_until_sync() {
    let home = TempDir::new().unwrap();
    recurlink_cmd(home.path())
        .args(["sequence", "add", "Choir", "--at", "2024-02-01T19:00", "--no-sync"])
        .assert()
        .success();
    assert_eq!(status_json(home.path())["sequences"][0]["state"], "never_synced");

    recurlink_cmd(home.path())
        .args(["sync", "1"])
        .assert()
        .success()
        .stdout(contains("1 created"));
    assert_eq!(status_json(home.path())["sequences"][0]["state"], "synced");
}

#[test]
fn shortened_reschedule_orphans_the_dropped_record() {
    let home = TempDir::new().unwrap();
    add_weekly(home.path(), "Yoga");

    recurlink_cmd(home.path())
        .args([
            "sequence",
            "reschedule",
            "1",
            "--at",
            "2024-01-01T10:00",
            "--at",
            "2024-01-08T10:00",
        ])
        .assert()
        .success()
        .stdout(contains("date matched"))
        .stdout(contains("1 disabled"))
        .stdout(contains("orphan record 3"));

    let row = &status_json(home.path())["sequences"][0];
    assert_eq!(row["live"], 2);
    assert_eq!(row["orphans"], 1);

    recurlink_cmd(home.path())
        .args(["record", "show", "3"])
        .assert()
        .success()
        .stdout(contains("\"is_active\": false"));
}

#[test]
fn break_moves_the_record_to_a_new_sequence() {
    let home = TempDir::new().unwrap();
    add_weekly(home.path(), "Yoga");

    recurlink_cmd(home.path())
        .args(["break", "1", "2"])
        .assert()
        .success()
        .stdout(contains("Occurrence 2 is now sequence 2"))
        .stdout(contains("record 2 moved along"));

    let status = status_json(home.path());
    assert_eq!(status["sequences"][0]["live"], 2);
    assert_eq!(status["sequences"][1]["id"], 2);
    assert_eq!(status["sequences"][1]["live"], 1);
}

#[test]
fn record_edit_propagates_to_sequence_and_siblings() {
    let home = TempDir::new().unwrap();
    add_weekly(home.path(), "Yoga");

    recurlink_cmd(home.path())
        .args(["record", "edit", "1", "--title", "Hatha Yoga"])
        .assert()
        .success()
        .stdout(contains("Record 1 updated"))
        .stdout(contains("positional"));

    recurlink_cmd(home.path())
        .args(["sequence", "list"])
        .assert()
        .success()
        .stdout(contains("Hatha Yoga"));
    recurlink_cmd(home.path())
        .args(["record", "show", "3"])
        .assert()
        .success()
        .stdout(contains("Hatha Yoga"));
}

#[test]
fn offline_ledger_refuses_sync() {
    let home = TempDir::new().unwrap();
    add_weekly(home.path(), "Yoga");

    recurlink_cmd(home.path())
        .args(["record", "offline"])
        .assert()
        .success();
    recurlink_cmd(home.path())
        .args(["sync", "1"])
        .assert()
        .failure()
        .stderr(contains("unavailable"));

    recurlink_cmd(home.path())
        .args(["record", "online"])
        .assert()
        .success();
    recurlink_cmd(home.path())
        .args(["sync", "1"])
        .assert()
        .success();
}

#[test]
fn step_walks_every_sequence_then_finishes() {
    let home = TempDir::new().unwrap();
    for title in ["Yoga", "Choir"] {
        recurlink_cmd(home.path())
            .args(["sequence", "add", title, "--at", "2024-03-01T09:00", "--no-sync"])
            .assert()
            .success();
    }

    recurlink_cmd(home.path())
        .args(["step", "--batch", "1"])
        .assert()
        .success()
        .stdout(contains("Synced sequences 0..1"));
    assert_eq!(status_json(home.path())["step_offset"], 1);

    recurlink_cmd(home.path())
        .args(["step", "--batch", "1"])
        .assert()
        .success()
        .stdout(contains("Synced sequences 1..2"));
    recurlink_cmd(home.path())
        .args(["step", "--batch", "1"])
        .assert()
        .success()
        .stdout(contains("finished"));

    let status = status_json(home.path());
    assert!(status["step_offset"].is_null());
    assert_eq!(status["records"], 2);
}

#[test]
fn purge_requires_confirmation() {
    let home = TempDir::new().unwrap();
    add_weekly(home.path(), "Yoga");

    recurlink_cmd(home.path())
        .arg("purge")
        .assert()
        .failure()
        .stderr(contains("--yes"));
    recurlink_cmd(home.path())
        .args(["purge", "--yes"])
        .assert()
        .success()
        .stdout(contains("Purged 3"));

    let status = status_json(home.path());
    assert_eq!(status["sequences"][0]["live"], 0);
    assert_eq!(status["records"], 3);
}

#[test]
fn removing_a_sequence_drops_its_rows() {
    let home = TempDir::new().unwrap();
    add_weekly(home.path(), "Yoga");

    recurlink_cmd(home.path())
        .args(["sequence", "remove", "1"])
        .assert()
        .success()
        .stdout(contains("3 correspondence rows dropped"));
    assert_eq!(status_json(home.path())["sequences"], Value::Array(vec![]));
}

#[test]
fn deleting_an_occurrence_disables_its_record() {
    let home = TempDir::new().unwrap();
    add_weekly(home.path(), "Yoga");

    recurlink_cmd(home.path())
        .args(["occurrence", "delete", "1", "3"])
        .assert()
        .success()
        .stdout(contains("Record 3 disabled"));
    let row = &status_json(home.path())["sequences"][0];
    assert_eq!(row["occurrences"], 2);
    assert_eq!(row["live"], 2);
    assert_eq!(row["orphans"], 0);
}

#[test]
fn offline_ledger_keeps_the_occurrence() {
    let home = TempDir::new().unwrap();
    add_weekly(home.path(), "Yoga");
    recurlink_cmd(home.path())
        .args(["record", "offline"])
        .assert()
        .success();

    for action in ["delete", "hide"] {
        recurlink_cmd(home.path())
            .args(["occurrence", action, "1", "3"])
            .assert()
            .failure()
            .stderr(contains("unavailable"));
    }
    let row = &status_json(home.path())["sequences"][0];
    assert_eq!(row["occurrences"], 3);
    assert_eq!(row["live"], 3);

    recurlink_cmd(home.path())
        .args(["record", "online"])
        .assert()
        .success();
    recurlink_cmd(home.path())
        .args(["occurrence", "delete", "1", "3"])
        .assert()
        .success()
        .stdout(contains("Record 3 disabled"));
    assert_eq!(status_json(home.path())["sequences"][0]["occurrences"], 2);
}
