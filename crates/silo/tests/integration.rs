//! End-to-end CLI integration tests for the `silo` binary.
//!
//! Each test creates its own temporary folder of definition files and
//! exercises the offline modes as a subprocess via `assert_cmd`.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Build a `Command` targeting the cargo-built `silo` binary.
fn silo() -> Command {
    Command::cargo_bin("silo").unwrap()
}

/// A folder with two chained views: `ds.a` selects from `ds.b`.
fn chained_views() -> TempDir {
    let tmp = TempDir::new().unwrap();
    std::fs::write(tmp.path().join("a.view"), "select * from ds.b\n").unwrap();
    std::fs::write(tmp.path().join("b.view"), "select 1\n").unwrap();
    tmp
}

// ---------------------------------------------------------------------------
// Show mode
// ---------------------------------------------------------------------------

#[test]
fn show_prints_dependencies_and_execution_order() {
    let tmp = chained_views();
    let output = silo()
        .args(["--show", "--default-dataset", "ds"])
        .arg(tmp.path())
        .output()
        .unwrap();
    assert!(
        output.status.success(),
        "show failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.contains("ds.a depends on ds ds.b"), "{stdout}");
    assert!(stdout.contains("ds.b depends on ds"), "{stdout}");

    let order: Vec<&str> = stdout
        .lines()
        .filter(|l| l.starts_with("would execute "))
        .collect();
    assert_eq!(
        order,
        vec![
            "would execute ds",
            "would execute ds.b",
            "would execute ds.a"
        ]
    );
}

#[test]
fn show_without_folders_fails() {
    silo()
        .args(["--show"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("one or more folders"));
}

#[test]
fn show_rejects_duplicate_keys() {
    let tmp = TempDir::new().unwrap();
    std::fs::write(tmp.path().join("one.view"), "select 1").unwrap();
    std::fs::write(tmp.path().join("one.view.vars"), r#"[{"table": "t"}]"#).unwrap();
    std::fs::write(tmp.path().join("two.view"), "select 2").unwrap();
    std::fs::write(tmp.path().join("two.view.vars"), r#"[{"table": "t"}]"#).unwrap();

    silo()
        .args(["--show", "--default-dataset", "ds"])
        .arg(tmp.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("duplicate"));
}

#[test]
fn show_reports_textual_cycles() {
    let tmp = TempDir::new().unwrap();
    std::fs::write(tmp.path().join("a.view"), "select * from ds.b").unwrap();
    std::fs::write(tmp.path().join("b.view"), "select * from ds.a").unwrap();

    silo()
        .args(["--show", "--default-dataset", "ds"])
        .arg(tmp.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("cycle"));
}

// ---------------------------------------------------------------------------
// Dotml mode
// ---------------------------------------------------------------------------

#[test]
fn dotml_emits_a_digraph() {
    let tmp = chained_views();
    silo()
        .args(["--dotml", "--default-dataset", "ds"])
        .arg(tmp.path())
        .assert()
        .success()
        .stdout(predicate::str::starts_with("digraph silo {"))
        .stdout(predicate::str::contains("\"ds.b\" -> \"ds.a\";"));
}

// ---------------------------------------------------------------------------
// Dump mode
// ---------------------------------------------------------------------------

#[test]
fn dump_writes_rendered_definitions() {
    let tmp = chained_views();
    let out = TempDir::new().unwrap();
    silo()
        .args(["--dump-to-folder"])
        .arg(out.path())
        .args(["--default-dataset", "ds"])
        .arg(tmp.path())
        .assert()
        .success();

    let a = std::fs::read_to_string(out.path().join("ds.a.debug")).unwrap();
    assert_eq!(a, "select * from ds.b\n");
    assert!(out.path().join("ds.b.debug").exists());
    assert!(out.path().join("ds.debug").exists());
}

// ---------------------------------------------------------------------------
// Template expansion through the CLI
// ---------------------------------------------------------------------------

#[test]
fn vars_file_supplies_defaults() {
    let tmp = TempDir::new().unwrap();
    std::fs::write(tmp.path().join("t.view"), "select * from {src}").unwrap();

    let defaults = TempDir::new().unwrap();
    let vars_path = defaults.path().join("defaults.json");
    std::fs::write(&vars_path, r#"{"dataset": "ds", "src": "ds.base"}"#).unwrap();

    let output = silo()
        .args(["--show", "--vars-file"])
        .arg(&vars_path)
        .arg(tmp.path())
        .output()
        .unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.contains("ds.t depends on ds"), "{stdout}");
}

#[test]
fn list_vars_fan_out_into_many_artifacts() {
    let tmp = TempDir::new().unwrap();
    std::fs::write(tmp.path().join("shard.view"), "select {n}").unwrap();
    std::fs::write(
        tmp.path().join("shard.view.vars"),
        r#"[{"table": "shard_{n}", "n": ["0", "1", "2"]}]"#,
    )
    .unwrap();

    let output = silo()
        .args(["--show", "--default-dataset", "ds"])
        .arg(tmp.path())
        .output()
        .unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    for n in 0..3 {
        assert!(stdout.contains(&format!("would execute ds.shard_{n}")), "{stdout}");
    }
}

// ---------------------------------------------------------------------------
// No mode
// ---------------------------------------------------------------------------

#[test]
fn no_mode_prints_help() {
    silo()
        .assert()
        .success()
        .stdout(predicate::str::contains("--execute"))
        .stdout(predicate::str::contains("--show"));
}
