use std::fs;

use assert_cmd::Command;
use predicates::prelude::*;

fn vamp() -> Command {
    Command::cargo_bin("vamp").expect("vamp binary")
}

#[test]
fn help_lists_flags() {
    vamp()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--open"))
        .stdout(predicate::str::contains("--stage"))
        .stdout(predicate::str::contains("--check"));
}

#[test]
fn check_accepts_valid_setlist() {
    let dir = tempfile::tempdir().expect("tmp");
    let path = dir.path().join("set.yaml");
    fs::write(
        &path,
        r#"
slots:
  - id: 1
    name: Oceans
    color: '#7c3aed'
    tempo_bpm: 68
    sections:
      - { id: 1, name: Intro, start_measure: 1, kind: normal }
      - { id: 2, name: Vamp, start_measure: 9, kind: loop, end_measure: 13 }
"#,
    )
    .expect("write");

    vamp()
        .arg("--check")
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("ok:"))
        .stdout(predicate::str::contains("1 slots, 2 sections"));
}

#[test]
fn check_rejects_loop_ending_before_start() {
    let dir = tempfile::tempdir().expect("tmp");
    let path = dir.path().join("set.yaml");
    fs::write(
        &path,
        r#"
slots:
  - id: 1
    name: Oceans
    color: '#7c3aed'
    tempo_bpm: 68
    sections:
      - { id: 1, name: Vamp, start_measure: 9, kind: loop, end_measure: 4 }
"#,
    )
    .expect("write");

    vamp()
        .arg("--check")
        .arg(&path)
        .assert()
        .code(1)
        .stderr(predicate::str::contains("invalid:"))
        .stderr(predicate::str::contains("must be after start measure"));
}

#[test]
fn check_rejects_reused_section_id() {
    let dir = tempfile::tempdir().expect("tmp");
    let path = dir.path().join("set.yaml");
    fs::write(
        &path,
        r#"
slots:
  - id: 1
    name: Oceans
    color: '#7c3aed'
    tempo_bpm: 80
    sections:
      - { id: 1, name: Intro, start_measure: 1 }
      - { id: 1, name: Vamp, start_measure: 5, kind: loop, end_measure: 8 }
"#,
    )
    .expect("write");

    vamp()
        .arg("--check")
        .arg(&path)
        .assert()
        .code(1)
        .stderr(predicate::str::contains("section id 1 is used by more than one section"));
}

#[test]
fn check_rejects_sections_without_tempo() {
    let dir = tempfile::tempdir().expect("tmp");
    let path = dir.path().join("set.json");
    fs::write(
        &path,
        r##"{"slots":[{"id":1,"name":"Oceans","color":"#7c3aed","sections":[{"id":1,"name":"Intro","start_measure":1,"kind":"normal"}]}]}"##,
    )
    .expect("write");

    vamp().arg("--check").arg(&path).assert().failure();
}

#[test]
fn check_reports_missing_file() {
    vamp()
        .args(["--check", "does/not/exist.yaml"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("reading"));
}

#[test]
fn invalid_slot_count_is_a_usage_error() {
    vamp()
        .args(["--slots", "0"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("slot count"));
}
