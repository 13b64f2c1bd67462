//! Reduces TensorBoard scalar logs to a [`MetricsDocument`].
//!
//! Shards are merged in discovery order: files sorted by name within each
//! directory, directories walked depth first. Within a shard, points keep the
//! order they were written. Under [`LatestPolicy::LastEmitted`] this ordering
//! decides which value is reported, even when an earlier shard reached a
//! higher step.

use crate::error::TrainingResult;
use crate::events::{is_event_file, read_scalars};
use crate::metrics::{LatestPolicy, MetricBucket, MetricsDocument, ScalarHistory, ScalarSeries};
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Scalars of one shard, keyed by name.
pub type SeriesMap = BTreeMap<String, ScalarSeries>;

/// Default output file name for reduced metrics.
pub const DEFAULT_METRICS_FILE: &str = "training_metrics.json";

/// Finds every event log below `root`.
///
/// Returns an empty list (and logs a warning) when `root` is missing or holds
/// no event files.
pub fn discover_logs(root: &Path) -> Vec<PathBuf> {
    if !root.is_dir() {
        warn!(root = %root.display(), "Log directory does not exist");
        return Vec::new();
    }

    let mut logs = Vec::new();
    for entry in WalkDir::new(root).sort_by_file_name() {
        match entry {
            Ok(entry) if entry.file_type().is_file() && is_event_file(entry.path()) => {
                logs.push(entry.into_path());
            }
            Ok(_) => {}
            Err(e) => warn!(root = %root.display(), error = %e, "Skipping unreadable directory entry"),
        }
    }

    if logs.is_empty() {
        warn!(root = %root.display(), "No event files found");
    } else {
        info!(root = %root.display(), count = logs.len(), "Found event files");
    }
    logs
}

/// Loads all scalar series of one shard.
pub fn load_series(path: &Path) -> TrainingResult<SeriesMap> {
    debug!(path = %path.display(), "Reading event file");
    read_scalars(path)
}

/// Concatenates same-name series across shards, in the order given.
#[must_use]
pub fn merge(per_log: &[SeriesMap]) -> SeriesMap {
    let mut merged = SeriesMap::new();
    for shard in per_log {
        for (name, series) in shard {
            merged.entry(name.clone()).or_insert_with(|| ScalarSeries::new(name.clone())).extend_from(series);
        }
    }
    merged
}

/// Reduces per-shard series to the latest value per scalar.
#[must_use]
pub fn reduce(per_log: &[SeriesMap], policy: LatestPolicy) -> MetricsDocument {
    let mut doc = MetricsDocument::default();
    for (name, series) in merge(per_log) {
        if let Some(point) = series.latest(policy) {
            doc.record(&name, point);
        }
    }
    doc
}

/// Full merged series per bucket, without reduction.
#[must_use]
pub fn history(per_log: &[SeriesMap]) -> ScalarHistory {
    let mut history = ScalarHistory::default();
    for series in merge(per_log).values() {
        history.insert(series);
    }
    history
}

/// Writes `doc` as pretty JSON, replacing any existing file.
pub fn write_document(doc: &MetricsDocument, path: &Path) -> TrainingResult<()> {
    write_json(path, doc)
}

pub fn write_history(history: &ScalarHistory, path: &Path) -> TrainingResult<()> {
    write_json(path, history)
}

pub fn read_document(path: &Path) -> TrainingResult<MetricsDocument> {
    let bytes = std::fs::read(path)?;
    Ok(serde_json::from_slice(&bytes)?)
}

pub(crate) fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> TrainingResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let mut json = serde_json::to_string_pretty(value)?;
    json.push('\n');
    std::fs::write(path, json)?;
    Ok(())
}

/// Renders the latest-metrics report shown after an export.
#[must_use]
pub fn summarize(doc: &MetricsDocument) -> String {
    let mut out = String::new();
    out.push_str("LATEST METRICS SUMMARY\n");
    out.push_str("----------------------\n");
    for (bucket, label) in [(MetricBucket::Training, "Train"), (MetricBucket::Validation, "Val  ")] {
        for (name, value) in doc.bucket(bucket) {
            let _ = writeln!(out, "{label} {name:<25}: {value:.6} (step {})", doc.step);
        }
    }
    out
}

/// Outcome of a full reduction run.
#[derive(Debug, Clone, Default)]
pub struct ReductionReport {
    pub document: MetricsDocument,
    pub history: ScalarHistory,
    pub shards_read: Vec<PathBuf>,
    /// Shards that failed to load, with the reason.
    pub shards_skipped: Vec<(PathBuf, String)>,
}

impl ReductionReport {
    #[must_use]
    pub fn found_logs(&self) -> bool {
        !self.shards_read.is_empty() || !self.shards_skipped.is_empty()
    }
}

/// Discover, load and reduce in one pass.
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsReducer {
    policy: LatestPolicy,
}

impl MetricsReducer {
    #[must_use]
    pub fn new(policy: LatestPolicy) -> Self {
        Self { policy }
    }

    #[must_use]
    pub fn policy(&self) -> LatestPolicy {
        self.policy
    }

    /// Reduces every readable shard below `root`. Unreadable shards are
    /// logged and listed in the report; they never abort the run.
    pub fn run(&self, root: &Path) -> ReductionReport {
        let mut report = ReductionReport::default();
        let mut per_log = Vec::new();

        for path in discover_logs(root) {
            match load_series(&path) {
                Ok(series) => {
                    per_log.push(series);
                    report.shards_read.push(path);
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Skipping unreadable event file");
                    report.shards_skipped.push((path, e.to_string()));
                }
            }
        }

        report.document = reduce(&per_log, self.policy);
        report.history = history(&per_log);
        info!(
            policy = %self.policy,
            shards = report.shards_read.len(),
            skipped = report.shards_skipped.len(),
            metrics = report.document.len(),
            step = report.document.step,
            "Reduced scalar logs"
        );
        report
    }
}
