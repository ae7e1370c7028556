use assert_cmd::Command;
use predicates::prelude::*;
use std::path::{Path, PathBuf};

fn fixture(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

#[allow(deprecated)]
fn threatdraw() -> Command {
    let mut cmd = Command::cargo_bin("threatdraw").unwrap();
    cmd.env_remove("RUST_LOG")
        .env_remove("THREATDRAW_TITLE")
        .env_remove("THREATDRAW_AUTHOR")
        .env_remove("THREATDRAW_MIN_CONFIDENCE")
        .arg("--no-color");
    cmd
}

#[test]
fn test_cli_version() {
    threatdraw().arg("--version").assert().success();
}

#[test]
fn test_cli_help_lists_subcommands() {
    threatdraw()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("convert"))
        .stdout(predicate::str::contains("validate"));
}

#[test]
fn test_convert_to_stdout() {
    threatdraw()
        .args(["convert", "--date", "2024-05-01"])
        .arg(fixture("shop.json"))
        .assert()
        .success()
        .stdout(predicate::str::contains("title: Threat Model"))
        .stdout(predicate::str::contains("2024-05-01"))
        .stdout(predicate::str::contains("boundary-default"));
}

#[test]
fn test_convert_json_is_parseable() {
    let output = threatdraw()
        .args(["convert", "--format", "json", "--title", "Shop"])
        .arg(fixture("shop.json"))
        .output()
        .unwrap();
    assert!(output.status.success());
    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(value["title"], "Shop");
    assert_eq!(value["relations"].as_array().unwrap().len(), 1);
}

#[test]
fn test_convert_writes_output_directory() {
    let dir = tempfile::tempdir().unwrap();
    threatdraw()
        .args(["convert", "--date", "2024-05-01", "--output"])
        .arg(dir.path())
        .arg(fixture("shop.json"))
        .assert()
        .success()
        .stdout(predicate::str::is_empty());
    assert!(dir.path().join("shop.threagile.yaml").is_file());
}

#[test]
fn test_convert_malformed_input_exit_code() {
    threatdraw()
        .arg("convert")
        .arg(fixture("broken.json"))
        .assert()
        .code(3)
        .stderr(predicate::str::contains("Duplicate cell id '2'"));
}

#[test]
fn test_convert_strict_fails_on_warnings() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("vague.json");
    std::fs::write(&input, r#"[{"id": "2", "value": "Thing"}]"#).unwrap();

    threatdraw().arg("convert").arg(&input).assert().success();
    threatdraw()
        .args(["convert", "--strict"])
        .arg(&input)
        .assert()
        .code(4);
}

#[test]
fn test_validate_generated_document() {
    let dir = tempfile::tempdir().unwrap();
    threatdraw()
        .args(["convert", "--date", "2024-05-01", "--output"])
        .arg(dir.path())
        .arg(fixture("shop.json"))
        .assert()
        .success();
    let document = dir.path().join("shop.threagile.yaml");

    threatdraw()
        .arg("validate")
        .arg(&document)
        .assert()
        .success()
        .stdout(predicate::str::contains("is valid"));

    let tampered = std::fs::read_to_string(&document)
        .unwrap()
        .replace("2024-05-01", "yesterday");
    std::fs::write(&document, tampered).unwrap();
    threatdraw()
        .args(["validate", "--format", "json"])
        .arg(&document)
        .assert()
        .code(4)
        .stdout(predicate::str::contains("\"is_valid\": false"));
}

#[test]
fn test_invalid_config_exit_code() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("threatdraw.yaml");
    std::fs::write(&config, "detection:\n  min_confidence: 2.0\n").unwrap();
    threatdraw()
        .arg("--config")
        .arg(&config)
        .arg("convert")
        .arg(fixture("shop.json"))
        .assert()
        .code(2);
}
