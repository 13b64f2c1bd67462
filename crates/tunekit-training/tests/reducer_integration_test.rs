//! End-to-end tests for reducing TensorBoard logs written to disk.

use std::path::Path;
use tempfile::TempDir;
use tunekit_training::{
    read_document, summarize, write_document, EventFileWriter, LatestPolicy, MetricsReducer, DEFAULT_METRICS_FILE,
};

fn write_shard(path: &Path, points: &[(&str, i64, f32)]) {
    let mut writer = EventFileWriter::create(path).unwrap();
    for (tag, step, value) in points {
        writer.add_scalar(tag, *step, *value).unwrap();
    }
    writer.flush().unwrap();
}

/// A run restarted from an early checkpoint: the second shard covers lower
/// steps than the first.
fn restarted_run(root: &Path) {
    write_shard(
        &root.join("runs").join("2024-06-01").join("events.out.tfevents.1717200000.node.1.0"),
        &[("train_loss", 100, 0.25), ("lr", 100, 1e-4), ("val_loss", 100, 0.5)],
    );
    write_shard(
        &root.join("runs").join("2024-06-02").join("events.out.tfevents.1717286400.node.1.0"),
        &[("train_loss", 40, 0.75), ("train_loss", 50, 0.5)],
    );
}

#[test]
fn test_last_emitted_follows_discovery_order() {
    let temp = TempDir::new().unwrap();
    restarted_run(temp.path());

    let report = MetricsReducer::new(LatestPolicy::LastEmitted).run(temp.path());
    assert_eq!(report.shards_read.len(), 2);
    assert!(report.shards_skipped.is_empty());

    let doc = &report.document;
    assert_eq!(doc.training_metrics["train_loss"], 0.5);
    assert_eq!(doc.training_metrics["lr"], f64::from(1e-4f32));
    assert_eq!(doc.validation_metrics["val_loss"], 0.5);
    assert_eq!(doc.step, 100);
    assert_eq!(report.history.training_metrics["train_loss"].len(), 3);
}

#[test]
fn test_max_step_policy_ignores_restart() {
    let temp = TempDir::new().unwrap();
    restarted_run(temp.path());

    let doc = MetricsReducer::new(LatestPolicy::MaxStep).run(temp.path()).document;
    assert_eq!(doc.training_metrics["train_loss"], 0.25);
    assert_eq!(doc.step, 100);
}

#[test]
fn test_empty_log_root_produces_empty_document() {
    let temp = TempDir::new().unwrap();
    let report = MetricsReducer::default().run(temp.path());
    assert!(!report.found_logs());
    assert!(report.document.is_empty());
    assert_eq!(report.document.step, 0);
}

#[test]
fn test_export_round_trip_and_summary() {
    let temp = TempDir::new().unwrap();
    restarted_run(temp.path());
    let output = temp.path().join(DEFAULT_METRICS_FILE);

    let doc = MetricsReducer::default().run(temp.path()).document;
    write_document(&doc, &output).unwrap();
    let reread = read_document(&output).unwrap();
    assert_eq!(reread, doc);

    let raw: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&output).unwrap()).unwrap();
    assert_eq!(raw["step"], 100);
    assert!(raw["training_metrics"].get("train_loss").is_some());

    let text = summarize(&reread);
    assert!(text.contains("Train lr"));
    assert!(text.contains("0.500000 (step 100)"));
    assert!(text.contains("Val   val_loss"));
}
