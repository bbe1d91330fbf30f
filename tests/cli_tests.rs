//! CLI tests for the gqlforge binary
//!
//! Spawns `gqlforge compile` against a temp project and checks exit codes and
//! output.

use std::fs;
use std::path::Path;
use std::process::{Command, Output};
use tempfile::TempDir;

const SCHEMA: &str = "type Query { user: User }\ntype User { id: ID!, firstName: String! }\n";

fn bin() -> &'static str {
    env!("CARGO_BIN_EXE_gqlforge")
}

fn project(document: &str) -> TempDir {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("schema.graphql"), SCHEMA).unwrap();
    fs::create_dir_all(dir.path().join("src")).unwrap();
    fs::write(dir.path().join("src/query.graphql"), document).unwrap();
    let config = serde_json::json!({ "projectRoot": dir.path(), "logLevel": "QUIET" });
    fs::write(dir.path().join("gqlforge.json"), config.to_string()).unwrap();
    dir
}

fn compile(root: &Path, extra: &[&str]) -> Output {
    Command::new(bin())
        .arg("compile")
        .arg("--config")
        .arg(root.join("gqlforge.json"))
        .arg("--db")
        .arg(root.join("cli.db"))
        .args(extra)
        .output()
        .expect("Failed to start gqlforge binary")
}

#[test]
fn test_clean_build_exits_zero() {
    let dir = project("query Q { user { firstName } }");
    let output = compile(dir.path(), &[]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
}

#[test]
fn test_validation_error_exits_non_zero() {
    let dir = project("query Q { user { nope } }");
    let output = compile(dir.path(), &[]);
    assert_eq!(output.status.code(), Some(1));

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("src/query.graphql"), "{stderr}");
    assert!(stderr.contains("nope"), "{stderr}");
}

#[test]
fn test_json_output_with_collected_documents() {
    let dir = project("query Q { user { firstName } }");
    let output = compile(dir.path(), &["--output", "json", "--collect"]);
    assert!(output.status.success());

    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["diagnostics"].as_array().unwrap().len(), 0);
    let documents = report["documents"].as_array().unwrap();
    assert_eq!(documents.len(), 1);
    assert_eq!(documents[0]["name"], "Q");

    let user = &documents[0]["selections"][0];
    let fields: Vec<&str> = user["children"]
        .as_array()
        .unwrap()
        .iter()
        .map(|child| child["field_name"].as_str().unwrap())
        .collect();
    assert_eq!(fields, vec!["firstName", "__typename", "id"]);
}

#[test]
fn test_missing_config_is_an_error() {
    let dir = TempDir::new().unwrap();
    let output = Command::new(bin())
        .args(["compile", "--config"])
        .arg(dir.path().join("missing.json"))
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(2));
    assert!(String::from_utf8_lossy(&output.stderr).contains("missing.json"));
}

#[test]
fn test_version_flag() {
    let output = Command::new(bin()).arg("--version").output().unwrap();
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).starts_with("gqlforge "));
}
