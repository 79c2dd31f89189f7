//! CLI end-to-end tests for the `tablelog` binary.

use std::fs;
use std::path::Path;
use std::time::Duration;

use assert_cmd::cargo::cargo_bin_cmd;
use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use tempfile::{tempdir, TempDir};

/// `tablelog` isolated from the caller's environment and config files.
fn tablelog(dir: &TempDir) -> Command {
    let mut cmd = cargo_bin_cmd!("tablelog");
    cmd.timeout(Duration::from_secs(60))
        .env_remove("TABLELOG_CONFIG")
        .env_remove("TABLELOG_DB")
        .env_remove("TABLELOG_PREFIX")
        .env_remove("TABLELOG_LOG")
        .env("XDG_CONFIG_HOME", dir.path().join("xdg"))
        .arg("--db")
        .arg(dir.path().join("logs.db"));
    cmd
}

fn stdout_json(output: &[u8]) -> Value {
    serde_json::from_slice(output).expect("stdout is JSON")
}

fn write_config(dir: &Path, body: &str) -> std::path::PathBuf {
    let path = dir.join("sink.toml");
    fs::write(&path, body).unwrap();
    path
}

const LINES: &str = concat!(
    r#"{"channel":"app","level":"info","message":"started","time":1700000000,"extra":{"req":"a1"}}"#,
    "\n",
    r#"{"channel":"app","level":400,"message":"boom","time":1700000001,"context":{"user":"bob"},"origin":{"headers":[["X-Forwarded-For","8.8.8.8"]]}}"#,
    "\n",
);

#[test]
fn ingest_then_list_columns() {
    let dir = tempdir().unwrap();
    let config = write_config(
        dir.path(),
        "table = \"events\"\naddress_column = \"address\"\nadditional_fields = [\"user\"]\n",
    );

    let output = tablelog(&dir)
        .arg("--config")
        .arg(&config)
        .args(["--prefix", "wp_", "ingest"])
        .write_stdin(LINES)
        .assert()
        .success()
        .code(0)
        .get_output()
        .stdout
        .clone();
    let summary = stdout_json(&output);
    assert_eq!(summary["table"], "wp_events");
    assert_eq!(summary["written"], 2);
    assert_eq!(summary["failed"], 0);

    let output = tablelog(&dir)
        .arg("--config")
        .arg(&config)
        .args(["--prefix", "wp_", "columns"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let columns = stdout_json(&output);
    let names: Vec<&str> = columns["columns"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(Value::as_str)
        .collect();
    assert_eq!(
        names,
        vec!["id", "channel", "level", "message", "time", "address", "user", "req"]
    );
}

#[test]
fn bad_line_is_a_partial_failure() {
    let dir = tempdir().unwrap();
    let input = format!("{LINES}not json\n");

    let output = tablelog(&dir)
        .arg("ingest")
        .write_stdin(input)
        .assert()
        .code(3)
        .get_output()
        .stdout
        .clone();
    let summary = stdout_json(&output);
    assert_eq!(summary["written"], 2);
    assert_eq!(summary["failed"], 1);
}

#[test]
fn stop_on_error_aborts() {
    let dir = tempdir().unwrap();
    tablelog(&dir)
        .args(["ingest", "--stop-on-error"])
        .write_stdin("{\"channel\":\"app\"}\n")
        .assert()
        .failure()
        .stderr(predicate::str::contains("tablelog:"));
}

#[test]
fn drop_requires_confirmation() {
    let dir = tempdir().unwrap();
    tablelog(&dir)
        .arg("ingest")
        .write_stdin(LINES)
        .assert()
        .success();

    tablelog(&dir)
        .arg("drop")
        .assert()
        .code(4)
        .stderr(predicate::str::contains("without --yes"));

    let output = tablelog(&dir)
        .args(["drop", "--yes"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    assert_eq!(stdout_json(&output)["dropped"], true);

    let output = tablelog(&dir)
        .arg("columns")
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    assert!(stdout_json(&output)["columns"].as_array().unwrap().is_empty());
}

#[test]
fn prune_applies_retention() {
    let dir = tempdir().unwrap();
    let config = write_config(dir.path(), "[retention]\nmax_rows = 1000\nbatch_size = 10\n");
    tablelog(&dir)
        .arg("--config")
        .arg(&config)
        .arg("ingest")
        .write_stdin(LINES)
        .assert()
        .success();

    let output = tablelog(&dir)
        .arg("--config")
        .arg(&config)
        .arg("prune")
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let result = stdout_json(&output);
    assert_eq!(result["table"], "logs");
    assert_eq!(result["deleted"], 0);
}

#[test]
fn invalid_config_exits_with_config_code() {
    let dir = tempdir().unwrap();
    let config = write_config(dir.path(), "table = \"bad-name\"\n");
    tablelog(&dir)
        .arg("--config")
        .arg(&config)
        .arg("columns")
        .assert()
        .code(10)
        .stderr(predicate::str::contains("tablelog:"));
}

#[test]
fn config_show_reports_defaults() {
    let dir = tempdir().unwrap();
    let output = tablelog(&dir)
        .args(["config", "show"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let shown = stdout_json(&output);
    assert!(shown["source"].is_null());
    assert_eq!(shown["config"]["table"], "logs");
    assert_eq!(shown["config"]["schema_policy"], "add_only");
}

#[test]
fn config_schema_is_json_schema() {
    let dir = tempdir().unwrap();
    let output = tablelog(&dir)
        .args(["config", "schema"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let schema = stdout_json(&output);
    assert!(schema["properties"]["table"].is_object());
    assert!(schema["properties"]["retention"].is_object());
}
