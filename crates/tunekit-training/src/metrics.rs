//! Metric data model shared by the reducer and the job client.
//!
//! A [`MetricsDocument`] is the compact artifact both sides produce: the latest
//! value of every scalar, split into training and validation buckets, plus the
//! highest step seen among those latest values.

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Scalar names starting with this prefix are validation metrics.
pub const VALIDATION_PREFIX: &str = "val_";

/// Learning-rate scalar name. Always bucketed as training.
pub const LEARNING_RATE_NAME: &str = "lr";

/// One observation of a named scalar.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScalarPoint {
    pub step: i64,
    pub value: f64,
}

/// Points of one scalar in the order the logs emitted them.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ScalarSeries {
    pub name: String,
    pub points: Vec<ScalarPoint>,
}

impl ScalarSeries {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), points: Vec::new() }
    }

    pub fn push(&mut self, step: i64, value: f64) {
        self.points.push(ScalarPoint { step, value });
    }

    /// Appends another shard's points after this one's.
    pub fn extend_from(&mut self, other: &Self) {
        self.points.extend_from_slice(&other.points);
    }

    /// Picks the point reported as "latest" under `policy`.
    #[must_use]
    pub fn latest(&self, policy: LatestPolicy) -> Option<ScalarPoint> {
        match policy {
            LatestPolicy::LastEmitted => self.points.last().copied(),
            // `max_by_key` returns the last maximum, so equal steps favor the later point.
            LatestPolicy::MaxStep => self.points.iter().copied().max_by_key(|p| p.step),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricBucket {
    Training,
    Validation,
}

impl MetricBucket {
    #[must_use]
    pub fn document_key(self) -> &'static str {
        match self {
            Self::Training => "training_metrics",
            Self::Validation => "validation_metrics",
        }
    }
}

/// Buckets a scalar by name alone. Anything that is not a validation metric,
/// including `lr` and unknown names, counts as training.
#[must_use]
pub fn classify(name: &str) -> MetricBucket {
    if name.starts_with(VALIDATION_PREFIX) {
        MetricBucket::Validation
    } else {
        MetricBucket::Training
    }
}

/// Which point of a merged series counts as the latest value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LatestPolicy {
    /// Last point in discovery order, then emission order.
    #[default]
    LastEmitted,
    /// Point with the highest step.
    MaxStep,
}

impl fmt::Display for LatestPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LastEmitted => f.write_str("last-emitted"),
            Self::MaxStep => f.write_str("max-step"),
        }
    }
}

impl FromStr for LatestPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "last-emitted" | "last_emitted" => Ok(Self::LastEmitted),
            "max-step" | "max_step" => Ok(Self::MaxStep),
            other => Err(format!("unknown latest policy '{other}' (expected last-emitted or max-step)")),
        }
    }
}

/// Reduced metrics: latest value per scalar plus the overall step.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MetricsDocument {
    #[serde(default, deserialize_with = "values_or_nan")]
    pub training_metrics: BTreeMap<String, f64>,
    #[serde(default, deserialize_with = "values_or_nan")]
    pub validation_metrics: BTreeMap<String, f64>,
    #[serde(default)]
    pub step: u64,
}

impl MetricsDocument {
    #[must_use]
    pub fn bucket(&self, bucket: MetricBucket) -> &BTreeMap<String, f64> {
        match bucket {
            MetricBucket::Training => &self.training_metrics,
            MetricBucket::Validation => &self.validation_metrics,
        }
    }

    pub fn bucket_mut(&mut self, bucket: MetricBucket) -> &mut BTreeMap<String, f64> {
        match bucket {
            MetricBucket::Training => &mut self.training_metrics,
            MetricBucket::Validation => &mut self.validation_metrics,
        }
    }

    /// Records a latest point and raises `step` if needed.
    pub fn record(&mut self, name: &str, point: ScalarPoint) {
        self.bucket_mut(classify(name)).insert(name.to_string(), point.value);
        let step = u64::try_from(point.step).unwrap_or(0);
        self.step = self.step.max(step);
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.training_metrics.is_empty() && self.validation_metrics.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.training_metrics.len() + self.validation_metrics.len()
    }
}

/// Full, unreduced series per bucket.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ScalarHistory {
    #[serde(default)]
    pub training_metrics: BTreeMap<String, Vec<ScalarPoint>>,
    #[serde(default)]
    pub validation_metrics: BTreeMap<String, Vec<ScalarPoint>>,
}

impl ScalarHistory {
    pub fn insert(&mut self, series: &ScalarSeries) {
        let target = match classify(&series.name) {
            MetricBucket::Training => &mut self.training_metrics,
            MetricBucket::Validation => &mut self.validation_metrics,
        };
        target.entry(series.name.clone()).or_default().extend_from_slice(&series.points);
    }
}

// serde_json writes non-finite floats as null; read them back as NaN.
fn values_or_nan<'de, D>(deserializer: D) -> Result<BTreeMap<String, f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = BTreeMap::<String, Option<f64>>::deserialize(deserializer)?;
    Ok(raw.into_iter().map(|(name, value)| (name, value.unwrap_or(f64::NAN))).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_defaults_to_training() {
        assert_eq!(classify("train_loss"), MetricBucket::Training);
        assert_eq!(classify(LEARNING_RATE_NAME), MetricBucket::Training);
        assert_eq!(classify("grad_norm"), MetricBucket::Training);
        assert_eq!(classify(""), MetricBucket::Training);
        assert_eq!(classify("validation_loss"), MetricBucket::Training);
    }

    #[test]
    fn test_classify_validation_prefix() {
        assert_eq!(classify("val_loss"), MetricBucket::Validation);
        assert_eq!(classify("val_"), MetricBucket::Validation);
        assert_eq!(classify("val_mel_loss"), MetricBucket::Validation);
    }

    #[test]
    fn test_latest_policies_disagree_on_out_of_order_points() {
        let mut series = ScalarSeries::new("train_loss");
        series.push(10, 0.2);
        series.push(4, 0.9);

        assert_eq!(series.latest(LatestPolicy::LastEmitted), Some(ScalarPoint { step: 4, value: 0.9 }));
        assert_eq!(series.latest(LatestPolicy::MaxStep), Some(ScalarPoint { step: 10, value: 0.2 }));
    }

    #[test]
    fn test_max_step_tie_prefers_later_point() {
        let mut series = ScalarSeries::new("lr");
        series.push(5, 1.0);
        series.push(5, 2.0);
        assert_eq!(series.latest(LatestPolicy::MaxStep).map(|p| p.value), Some(2.0));
    }

    #[test]
    fn test_record_clamps_negative_step() {
        let mut doc = MetricsDocument::default();
        doc.record("train_loss", ScalarPoint { step: -3, value: 1.0 });
        assert_eq!(doc.step, 0);
        assert_eq!(doc.training_metrics.get("train_loss"), Some(&1.0));
    }

    #[test]
    fn test_document_json_shape() {
        let mut doc = MetricsDocument::default();
        doc.record("train_loss", ScalarPoint { step: 2, value: 0.5 });
        doc.record("val_loss", ScalarPoint { step: 1, value: 0.75 });

        let value = serde_json::to_value(&doc).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "training_metrics": {"train_loss": 0.5},
                "validation_metrics": {"val_loss": 0.75},
                "step": 2
            })
        );
    }

    #[test]
    fn test_document_reads_null_as_nan() {
        let doc: MetricsDocument =
            serde_json::from_str(r#"{"training_metrics": {"train_loss": null}, "step": 7}"#).unwrap();
        assert!(doc.training_metrics["train_loss"].is_nan());
        assert!(doc.validation_metrics.is_empty());
        assert_eq!(doc.step, 7);
    }

    #[test]
    fn test_document_rejects_negative_step() {
        let result = serde_json::from_str::<MetricsDocument>(r#"{"step": -1}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_latest_policy_parse() {
        assert_eq!("max-step".parse::<LatestPolicy>().unwrap(), LatestPolicy::MaxStep);
        assert_eq!("LAST_EMITTED".parse::<LatestPolicy>().unwrap(), LatestPolicy::LastEmitted);
        assert!("newest".parse::<LatestPolicy>().is_err());
        assert_eq!(LatestPolicy::MaxStep.to_string(), "max-step");
    }
}
