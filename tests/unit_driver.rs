//! Compile-protocol driver coverage: the version handshake, per-package
//! fact files, and fact accumulation across invocations.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::Path;

fn loupe_unit() -> Command {
    Command::cargo_bin("loupe-unit").expect("binary")
}

fn write(dir: &Path, name: &str, text: &str) {
    fs::write(dir.join(name), text).unwrap();
}

const UTIL: &str = r#"{
    "path": "demo/util",
    "sources": [{"name": "util.src", "text": "package util\nfunc Grow() {}\n"}],
    "decls": [
        {"name": "Grow", "kind": "func", "type": {"func": {}}, "span": [0, 13, 27]}
    ]
}"#;

const APP: &str = r#"{
    "path": "demo/app",
    "imports": ["demo/util"],
    "sources": [{"name": "app.src", "text": "package app\nfunc Run() {}\n"}],
    "decls": [
        {"name": "Run", "kind": "func", "type": {"func": {}}, "span": [0, 12, 25]}
    ]
}"#;

#[test]
fn version_flag_prints_a_build_id() {
    loupe_unit()
        .arg("-V=full")
        .assert()
        .success()
        .stdout(predicate::str::is_match(r" version devel buildID=[0-9a-f]{64}\n$").unwrap());
}

#[test]
fn non_cfg_arguments_are_rejected() {
    loupe_unit()
        .arg("whatever.json")
        .assert()
        .failure()
        .stderr(predicate::str::contains("expected a *.cfg argument"));
}

#[test]
fn facts_accumulate_across_invocations() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "util.json", UTIL);
    write(dir.path(), "app.json", APP);

    // First invocation: the leaf package.
    let util_cfg = format!(
        r#"{{
            "dir": {dir:?},
            "import_path": "demo/util",
            "source_files": ["util.json"],
            "output": "util.facts"
        }}"#,
        dir = dir.path()
    );
    write(dir.path(), "util.cfg", &util_cfg);
    loupe_unit()
        .arg(dir.path().join("util.cfg"))
        .assert()
        .success();

    let util_facts = fs::read_to_string(dir.path().join("util.facts")).unwrap();
    assert!(util_facts.contains("apisurface.ApiSurface"));
    assert!(util_facts.contains("demo/util"));

    // Second invocation: the importer consumes the leaf's facts and its
    // own output carries both packages' facts.
    let app_cfg = format!(
        r#"{{
            "dir": {dir:?},
            "import_path": "demo/app",
            "source_files": ["app.json"],
            "package_file": {{"demo/util": "util.json"}},
            "package_facts": {{"demo/util": "util.facts"}},
            "output": "app.facts"
        }}"#,
        dir = dir.path()
    );
    write(dir.path(), "app.cfg", &app_cfg);
    loupe_unit()
        .arg(dir.path().join("app.cfg"))
        .assert()
        .success();

    let app_facts = fs::read_to_string(dir.path().join("app.facts")).unwrap();
    assert!(app_facts.contains("demo/app"));
    assert!(app_facts.contains("demo/util"));

    // Determinism: re-running produces identical bytes.
    loupe_unit()
        .arg(dir.path().join("app.cfg"))
        .assert()
        .success();
    let again = fs::read_to_string(dir.path().join("app.facts")).unwrap();
    assert_eq!(app_facts, again);
}

#[test]
fn typecheck_failures_can_succeed_silently() {
    let dir = tempfile::tempdir().unwrap();
    // The manifest is missing entirely.
    let cfg = format!(
        r#"{{
            "dir": {dir:?},
            "import_path": "demo/broken",
            "source_files": ["broken.json"],
            "succeed_on_typecheck_failure": true,
            "output": "broken.facts"
        }}"#,
        dir = dir.path()
    );
    write(dir.path(), "broken.cfg", &cfg);
    loupe_unit()
        .arg(dir.path().join("broken.cfg"))
        .assert()
        .success()
        .stdout(predicate::str::is_empty());
    assert!(!dir.path().join("broken.facts").exists());

    // Without the flag, the same config is fatal.
    let cfg = format!(
        r#"{{
            "dir": {dir:?},
            "import_path": "demo/broken",
            "source_files": ["broken.json"],
            "output": "broken.facts"
        }}"#,
        dir = dir.path()
    );
    write(dir.path(), "broken2.cfg", &cfg);
    loupe_unit()
        .arg(dir.path().join("broken2.cfg"))
        .assert()
        .failure();
}
