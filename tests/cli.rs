//! Binary-level checks

use assert_cmd::Command;
use predicates::prelude::*;

#[test]
fn help_exits_zero_and_lists_the_subcommands() {
    Command::cargo_bin("monowatch")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("watch").and(predicate::str::contains("upgrade")));
}

#[test]
fn watch_help_lists_the_flags() {
    Command::cargo_bin("monowatch")
        .unwrap()
        .args(["watch", "--help"])
        .assert()
        .success()
        .stdout(
            predicate::str::contains("--change")
                .and(predicate::str::contains("--extension"))
                .and(predicate::str::contains("--ignore"))
                .and(predicate::str::contains("--delay")),
        );
}

#[test]
fn watch_fails_outside_a_workspace() {
    let dir = tempfile::tempdir().unwrap();
    Command::cargo_bin("monowatch")
        .unwrap()
        .arg("--root")
        .arg(dir.path())
        .args(["watch", "sleep 1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("workspace"));
}

#[test]
fn watch_rejects_an_empty_extension() {
    let dir = tempfile::tempdir().unwrap();
    Command::cargo_bin("monowatch")
        .unwrap()
        .arg("--root")
        .arg(dir.path())
        .args(["watch", "sleep 1", "--extension", ""])
        .assert()
        .failure()
        .stderr(predicate::str::contains("extension"));
}

#[test]
fn upgrade_fails_outside_a_workspace() {
    let dir = tempfile::tempdir().unwrap();
    Command::cargo_bin("monowatch")
        .unwrap()
        .arg("--root")
        .arg(dir.path())
        .arg("upgrade")
        .assert()
        .failure()
        .stderr(predicate::str::contains("workspace"));
}
