//! Metrics export command implementation.

use anyhow::{bail, Context, Result};
use colored::Colorize;
use std::path::{Path, PathBuf};
use tunekit_training::{
    summarize, write_document, write_history, FinetuneConfig, LatestPolicy, MetricBucket, MetricsDocument,
    MetricsReducer,
};

/// `--log_dir` when given, otherwise `<output_dir>/runs` of the fine-tuning config.
pub fn resolve_log_dir(log_dir: Option<PathBuf>, config: Option<&Path>) -> Result<PathBuf> {
    if let Some(dir) = log_dir {
        return Ok(dir);
    }
    let Some(config) = config else {
        bail!("pass --log_dir or --config");
    };
    let log_dir = FinetuneConfig::load(config)?.log_dir();
    tracing::debug!(config = %config.display(), log_dir = %log_dir.display(), "Log directory taken from config");
    Ok(log_dir)
}

pub fn execute(log_dir: &Path, output: &Path, policy: LatestPolicy, history: Option<&Path>) -> Result<()> {
    if !log_dir.is_dir() {
        println!("Log directory does not exist: {}", log_dir.display());
        println!("{}", "It is created once training starts; run this command again after that.".dimmed());
        return Ok(());
    }

    let reducer = MetricsReducer::new(policy);
    let report = reducer.run(log_dir);
    if !report.found_logs() {
        println!("No event files found in {}", log_dir.display());
        return Ok(());
    }

    println!("✓ Found {} event file(s)", report.shards_read.len() + report.shards_skipped.len());
    for (path, reason) in &report.shards_skipped {
        println!("  {} {}: {}", "skipped".yellow(), path.display(), reason.dimmed());
    }

    write_document(&report.document, output)
        .with_context(|| format!("Failed to write metrics to {}", output.display()))?;
    println!("Exported metrics to {} ({} policy)", output.display().to_string().cyan(), reducer.policy());

    if let Some(path) = history {
        write_history(&report.history, path)
            .with_context(|| format!("Failed to write metric history to {}", path.display()))?;
        println!("Exported metric history to {}", path.display().to_string().cyan());
    }

    println!();
    print_overview(&report.document);
    println!();
    print!("{}", summarize(&report.document));
    Ok(())
}

fn print_overview(doc: &MetricsDocument) {
    println!("{}", "Metrics overview:".bold());
    for bucket in [MetricBucket::Training, MetricBucket::Validation] {
        let names: Vec<&str> = doc.bucket(bucket).keys().map(String::as_str).collect();
        println!("  - {}: [{}]", bucket.document_key(), names.join(", "));
    }
}
