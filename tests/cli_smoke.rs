//! End-to-end CLI coverage over the manifest fixtures.

use assert_cmd::Command;
use predicates::prelude::*;
use std::path::PathBuf;

fn fixtures() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures")
}

fn loupe() -> Command {
    let mut cmd = Command::cargo_bin("loupe").expect("binary");
    cmd.current_dir(fixtures());
    cmd
}

#[test]
fn clean_package_reports_nothing() {
    loupe()
        .arg("demo/app.json")
        .assert()
        .success()
        .stdout(predicate::str::is_empty());
}

#[test]
fn patterns_resolve_against_the_working_directory() {
    loupe()
        .arg("demo/app")
        .assert()
        .success()
        .stdout(predicate::str::is_empty());
}

#[test]
fn analysis_flags_change_findings() {
    loupe()
        .arg("-apisurface.min=5")
        .arg("demo/app")
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "app.src:3:1: [apisurface] package demo/app exports 1 of 3 declarations (want at least 5)",
        ));
}

#[test]
fn low_export_packages_are_reported() {
    loupe()
        .arg("demo/lowexports")
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "lowexports.src:2:1: [apisurface] package demo/lowexports exports 0 of 2 declarations (want at least 1)",
        ));
}

#[test]
fn json_output_is_structured_per_package() {
    let assert = loupe().arg("-json").arg("demo/lowexports").assert().success();
    let stdout = String::from_utf8(assert.get_output().stdout.clone()).unwrap();
    let tree: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    let findings = &tree["demo/lowexports"]["apisurface"];
    assert!(findings.is_array());
    assert_eq!(findings[0]["position"], "lowexports.src:2:1");
}

#[test]
fn enable_flags_limit_the_run() {
    // Only inventory enabled: apisurface never runs, so no findings.
    loupe()
        .arg("-inventory.enable")
        .arg("demo/lowexports")
        .assert()
        .success()
        .stdout(predicate::str::is_empty());
}

#[test]
fn context_lines_show_source() {
    loupe()
        .arg("-c=1")
        .arg("demo/lowexports")
        .assert()
        .success()
        .stdout(predicate::str::contains("2\tfunc helper() {}"));
}

#[test]
fn unknown_analysis_flags_fail() {
    loupe()
        .arg("-bogus.enable")
        .arg("demo/app")
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown analysis"));
}

#[test]
fn missing_packages_fail_with_a_loader_error() {
    loupe()
        .arg("demo/absent")
        .assert()
        .failure()
        .stderr(predicate::str::contains("can't find a manifest"));
}

#[test]
fn singlechecker_takes_unprefixed_flags() {
    let mut cmd = Command::cargo_bin("loupe-apisurface").expect("binary");
    cmd.current_dir(fixtures())
        .arg("-min=5")
        .arg("demo/app")
        .assert()
        .success()
        .stdout(predicate::str::contains("want at least 5"));
}

#[test]
fn debug_timing_prints_a_table() {
    loupe()
        .arg("-debug=t")
        .arg("demo/app")
        .assert()
        .success()
        .stderr(predicate::str::contains("@demo/"));
}
