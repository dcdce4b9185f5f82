// CLI integration tests for local inspect/describe flows and error envelopes.
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use serde_json::Value;

fn cmd() -> Command {
    let exe = env!("CARGO_BIN_EXE_tabserve");
    Command::new(exe)
}

fn parse_json(output: &[u8]) -> Value {
    serde_json::from_slice(output).expect("valid json")
}

fn write_csv(dir: &Path, name: &str, contents: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, contents).expect("write csv");
    path
}

fn run(args: &[&str], path: &Path) -> Output {
    cmd().args(args).arg(path).output().expect("run")
}

#[test]
fn inspect_prints_requested_page() {
    let temp = tempfile::tempdir().expect("tempdir");
    let path = write_csv(temp.path(), "people.csv", "name,age\nAlice,30\nBob,\nCarol,25\n");

    let output = cmd()
        .args(["inspect", "--start", "1", "--limit", "5"])
        .arg(&path)
        .output()
        .expect("inspect");
    assert!(output.status.success());
    let value = parse_json(&output.stdout);
    assert_eq!(value["total"], 3);
    assert_eq!(value["start"], 1);
    assert_eq!(value["limit"], 5);
    assert_eq!(value["columns"], serde_json::json!(["name", "age"]));
    assert_eq!(value["records"][0][0], "Bob");
    assert!(value["records"][0][1].is_null());
    assert_eq!(value["records"][1][1], 25);
    assert!(value.get("message").is_none());
}

#[test]
fn inspect_past_end_reports_message() {
    let temp = tempfile::tempdir().expect("tempdir");
    let path = write_csv(temp.path(), "tiny.csv", "a\n1\n");

    let output = cmd()
        .args(["inspect", "--start", "10"])
        .arg(&path)
        .output()
        .expect("inspect");
    assert!(output.status.success());
    let value = parse_json(&output.stdout);
    assert_eq!(value["total"], 1);
    assert_eq!(value["records"].as_array().map(Vec::len), Some(0));
    assert_eq!(value["message"], "No data in specified range");
}

#[test]
fn inspect_clamps_limits() {
    let temp = tempfile::tempdir().expect("tempdir");
    let path = write_csv(temp.path(), "tiny.csv", "a\n1\n2\n");

    let output = cmd()
        .args(["inspect", "--start", "-3", "--limit", "99999"])
        .arg(&path)
        .output()
        .expect("inspect");
    assert!(output.status.success());
    let value = parse_json(&output.stdout);
    assert_eq!(value["start"], 0);
    assert_eq!(value["limit"], 1000);
    assert_eq!(value["records"].as_array().map(Vec::len), Some(2));
}

#[test]
fn describe_reports_numeric_and_categorical_columns() {
    let temp = tempfile::tempdir().expect("tempdir");
    let path = write_csv(
        temp.path(),
        "people.csv",
        "name,age\nAlice,30\nBob,\nCarol,25\nAlice,41\n",
    );

    let output = run(&["describe"], &path);
    assert!(output.status.success());
    let value = parse_json(&output.stdout);
    let summary = value["summary"].as_array().expect("summary array");
    assert_eq!(summary.len(), 2);

    let name = &summary[0];
    assert_eq!(name["name"], "name");
    assert_eq!(name["type"], "categorical");
    assert_eq!(name["count"], 4);
    assert_eq!(name["distinct_count"], 3);
    assert_eq!(name["top"], "Alice");
    assert_eq!(name["top_count"], 2);

    let age = &summary[1];
    assert_eq!(age["type"], "numeric");
    assert_eq!(age["count"], 3);
    assert_eq!(age["null_count"], 1);
    assert_eq!(age["min"], 25.0);
    assert_eq!(age["max"], 41.0);
}

#[test]
fn describe_honors_delimiter() {
    let temp = tempfile::tempdir().expect("tempdir");
    let path = write_csv(temp.path(), "semi.csv", "x;y\n1;a\n2;b\n");

    let output = cmd()
        .args(["describe", "--delimiter", ";"])
        .arg(&path)
        .output()
        .expect("describe");
    assert!(output.status.success());
    let value = parse_json(&output.stdout);
    assert_eq!(value["summary"][0]["type"], "numeric");
    assert_eq!(value["summary"][1]["type"], "categorical");
}

#[test]
fn load_failures_map_to_exit_codes() {
    let temp = tempfile::tempdir().expect("tempdir");

    let missing = run(&["inspect"], &temp.path().join("nope.csv"));
    assert_eq!(missing.status.code(), Some(4));
    let err = parse_json(&missing.stderr);
    assert_eq!(err["error"]["kind"], "Io");
    assert!(err["error"]["path"].as_str().is_some_and(|p| p.ends_with("nope.csv")));

    let dupe = write_csv(temp.path(), "dupe.csv", "a,b,a\n1,2,3\n");
    let output = run(&["inspect"], &dupe);
    assert_eq!(output.status.code(), Some(7));
    assert_eq!(parse_json(&output.stderr)["error"]["kind"], "DuplicateColumn");

    let ragged = write_csv(temp.path(), "ragged.csv", "a,b\n1,2\n3\n");
    let output = run(&["describe"], &ragged);
    assert_eq!(output.status.code(), Some(6));
    let err = parse_json(&output.stderr);
    assert_eq!(err["error"]["kind"], "MalformedRow");
    assert_eq!(err["error"]["row"], 3);
}

#[test]
fn bad_arguments_are_invalid_requests() {
    let temp = tempfile::tempdir().expect("tempdir");
    let path = write_csv(temp.path(), "a.csv", "a\n1\n");

    let output = cmd()
        .args(["inspect", "--delimiter", "ab"])
        .arg(&path)
        .output()
        .expect("inspect");
    assert_eq!(output.status.code(), Some(2));
    assert_eq!(parse_json(&output.stderr)["error"]["kind"], "InvalidRequest");

    let output = cmd().args(["inspect", "--bogus"]).output().expect("inspect");
    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn remote_against_unreachable_server_is_io_error() {
    let output = cmd()
        .args(["remote", "--url", "http://127.0.0.1:9", "info"])
        .output()
        .expect("remote");
    assert_eq!(output.status.code(), Some(4));
    assert_eq!(parse_json(&output.stderr)["error"]["kind"], "Io");
}

#[test]
fn remote_rejects_urls_with_paths() {
    let output = cmd()
        .args(["remote", "--url", "http://127.0.0.1:9/data", "health"])
        .output()
        .expect("remote");
    assert_eq!(output.status.code(), Some(2));
    assert_eq!(parse_json(&output.stderr)["error"]["kind"], "InvalidRequest");
}

#[test]
fn completion_emits_script() {
    let output = cmd().args(["completion", "bash"]).output().expect("completion");
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("tabserve"));
}
