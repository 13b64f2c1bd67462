//! Integration tests for the `export-metrics` and `summary` commands.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::TempDir;
use tunekit_training::EventFileWriter;

fn tunekit(temp_dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("tunekit-cli").unwrap();
    cmd.current_dir(temp_dir.path())
        .env("HOME", temp_dir.path())
        .env_remove("TUNEKIT_SERVER_URL")
        .env_remove("TUNEKIT_TOKEN");
    cmd
}

fn write_shard(path: &Path, points: &[(&str, i64, f32)]) {
    let mut writer = EventFileWriter::create(path).unwrap();
    for (tag, step, value) in points {
        writer.add_scalar(tag, *step, *value).unwrap();
    }
    writer.flush().unwrap();
}

#[test]
fn test_export_missing_log_dir() {
    let temp_dir = TempDir::new().unwrap();

    tunekit(&temp_dir)
        .args(["export-metrics", "--log_dir", "vits_finetuned_vie/runs"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Log directory does not exist"));

    assert!(!temp_dir.path().join("training_metrics.json").exists());
}

#[test]
fn test_export_empty_log_dir() {
    let temp_dir = TempDir::new().unwrap();
    fs::create_dir_all(temp_dir.path().join("runs")).unwrap();
    fs::write(temp_dir.path().join("runs").join("notes.txt"), "no events here").unwrap();

    tunekit(&temp_dir)
        .args(["export-metrics", "--log_dir", "runs"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No event files found"));

    assert!(!temp_dir.path().join("training_metrics.json").exists());
}

#[test]
fn test_export_writes_document_and_summary() {
    let temp_dir = TempDir::new().unwrap();
    write_shard(
        &temp_dir.path().join("runs").join("a").join("events.out.tfevents.1.node"),
        &[("train_loss", 1, 0.5), ("train_loss", 2, 0.25), ("val_loss", 2, 0.75)],
    );

    tunekit(&temp_dir)
        .args(["export-metrics", "--log_dir", "runs"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Found 1 event file(s)"))
        .stdout(predicate::str::contains("LATEST METRICS SUMMARY"))
        .stdout(predicate::str::contains("0.250000 (step 2)"));

    let raw = fs::read_to_string(temp_dir.path().join("training_metrics.json")).unwrap();
    let doc: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(doc["training_metrics"]["train_loss"], 0.25);
    assert_eq!(doc["validation_metrics"]["val_loss"], 0.75);
    assert_eq!(doc["step"], 2);
}

#[test]
fn test_export_skips_corrupt_shard_and_writes_history() {
    let temp_dir = TempDir::new().unwrap();
    write_shard(
        &temp_dir.path().join("runs").join("a").join("events.out.tfevents.1.node"),
        &[("train_loss", 10, 0.5)],
    );
    let bad = temp_dir.path().join("runs").join("b").join("events.out.tfevents.2.node");
    fs::create_dir_all(bad.parent().unwrap()).unwrap();
    fs::write(&bad, b"definitely not a tfrecord file").unwrap();

    tunekit(&temp_dir)
        .args([
            "export-metrics",
            "--log_dir",
            "runs",
            "--output",
            "out/metrics.json",
            "--history",
            "out/history.json",
            "--latest",
            "max-step",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("Found 2 event file(s)"))
        .stdout(predicate::str::contains("skipped"));

    assert!(temp_dir.path().join("out").join("metrics.json").exists());
    let history: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(temp_dir.path().join("out").join("history.json")).unwrap()).unwrap();
    assert_eq!(history["training_metrics"]["train_loss"][0]["step"], 10);
}

#[test]
fn test_export_log_dir_from_config() {
    let temp_dir = TempDir::new().unwrap();
    fs::write(temp_dir.path().join("finetune.json"), r#"{"output_dir": "/model_out", "num_train_epochs": 3}"#).unwrap();
    write_shard(
        &temp_dir.path().join("model_out").join("runs").join("events.out.tfevents.1.node"),
        &[("train_loss", 3, 0.5), ("lr", 3, 0.25), ("val_loss", 3, 0.75)],
    );

    tunekit(&temp_dir)
        .args(["export-metrics", "--config", "finetune.json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Found 1 event file(s)"))
        .stdout(predicate::str::contains("last-emitted policy"))
        .stdout(predicate::str::contains("training_metrics: [lr, train_loss]"))
        .stdout(predicate::str::contains("validation_metrics: [val_loss]"));

    assert!(temp_dir.path().join("training_metrics.json").exists());
}

#[test]
fn test_export_requires_log_dir_or_config() {
    let temp_dir = TempDir::new().unwrap();
    tunekit(&temp_dir).arg("export-metrics").assert().failure().stderr(predicate::str::contains("--log_dir"));
}

#[test]
fn test_export_rejects_unknown_policy() {
    let temp_dir = TempDir::new().unwrap();
    tunekit(&temp_dir)
        .args(["export-metrics", "--log_dir", "runs", "--latest", "newest"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown latest policy"));
}

#[test]
fn test_summary_of_existing_document() {
    let temp_dir = TempDir::new().unwrap();
    fs::write(
        temp_dir.path().join("training_metrics.json"),
        r#"{"training_metrics": {"lr": 0.0001}, "validation_metrics": {"val_loss": 1.5}, "step": 42}"#,
    )
    .unwrap();

    tunekit(&temp_dir)
        .arg("summary")
        .assert()
        .success()
        .stdout(predicate::str::contains("Train lr"))
        .stdout(predicate::str::contains("0.000100 (step 42)"))
        .stdout(predicate::str::contains("1.500000 (step 42)"));
}

#[test]
fn test_summary_ignores_broken_settings() {
    let temp_dir = TempDir::new().unwrap();
    fs::create_dir_all(temp_dir.path().join(".tunekit")).unwrap();
    fs::write(temp_dir.path().join(".tunekit").join("config.toml"), "server_url = [").unwrap();
    fs::write(
        temp_dir.path().join("training_metrics.json"),
        r#"{"training_metrics": {"train_loss": 0.5}, "validation_metrics": {}, "step": 3}"#,
    )
    .unwrap();

    tunekit(&temp_dir).arg("summary").assert().success().stdout(predicate::str::contains("0.500000 (step 3)"));

    tunekit(&temp_dir)
        .args(["status", "--server", "http://127.0.0.1:9"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to load tunekit settings"));
}

#[test]
fn test_summary_missing_file_fails() {
    let temp_dir = TempDir::new().unwrap();
    tunekit(&temp_dir)
        .args(["summary", "nope.json"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to read metrics document"));
}
