//! Exercises the `mvctl` demonstration binary end-to-end: ingest a note
//! through its CLI surface, then read it back via `list`/`get`/`stats`.

use assert_cmd::Command;
use predicates::str::contains;

#[test]
fn ingest_note_then_list_and_stats_roundtrip() {
    let dir = tempfile::tempdir().unwrap();

    Command::cargo_bin("mvctl")
        .unwrap()
        .args(["--data-dir", dir.path().to_str().unwrap(), "--owner", "1"])
        .args(["ingest-note", "# Meeting\nDiscuss #roadmap today"])
        .assert()
        .success()
        .stdout(contains("Meeting"))
        .stdout(contains("roadmap"));

    Command::cargo_bin("mvctl")
        .unwrap()
        .args(["--data-dir", dir.path().to_str().unwrap(), "--owner", "1"])
        .arg("stats")
        .assert()
        .success()
        .stdout(contains("\"items\": 1"));

    Command::cargo_bin("mvctl")
        .unwrap()
        .args(["--data-dir", dir.path().to_str().unwrap(), "--owner", "1"])
        .arg("tags")
        .assert()
        .success()
        .stdout(contains("roadmap"));
}

#[test]
fn delete_of_missing_id_reports_not_deleted() {
    let dir = tempfile::tempdir().unwrap();

    Command::cargo_bin("mvctl")
        .unwrap()
        .args(["--data-dir", dir.path().to_str().unwrap(), "--owner", "1"])
        .args(["delete", "does-not-exist"])
        .assert()
        .success()
        .stdout(contains("\"deleted\": false"));
}
