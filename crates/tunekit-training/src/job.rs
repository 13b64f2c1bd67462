use crate::metrics::MetricsDocument;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::path::PathBuf;

/// Remote job status. The server owns the vocabulary; only `completed` and
/// `failed` are terminal, anything unrecognized is kept as `Other`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobStatus {
    Queued,
    Running,
    Completed,
    Failed,
    Other(String),
}

impl JobStatus {
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Other(s) => s.as_str(),
        }
    }

    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl From<&str> for JobStatus {
    fn from(s: &str) -> Self {
        match s {
            "queued" => Self::Queued,
            "running" => Self::Running,
            "completed" => Self::Completed,
            "failed" => Self::Failed,
            other => Self::Other(other.to_string()),
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for JobStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for JobStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(Self::from(s.as_str()))
    }
}

/// Body of `GET /finetune/status`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusReport {
    pub status: JobStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<MetricsDocument>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StatusReport {
    #[must_use]
    pub fn new(status: JobStatus) -> Self {
        Self { status, metrics: None, error: None }
    }

    /// Error text of a failed job, or a placeholder when the server sent none.
    #[must_use]
    pub fn error_message(&self) -> String {
        self.error.clone().unwrap_or_else(|| "unknown error".to_string())
    }
}

/// Server response to a job submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionAck {
    pub status_code: u16,
    #[serde(default)]
    pub body: Option<serde_json::Value>,
}

/// Result of a job that reached `completed`.
#[derive(Debug, Clone, PartialEq)]
pub struct JobOutcome {
    pub metrics: MetricsDocument,
    pub polls: u32,
    pub output_path: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_report_completed_with_metrics() {
        let report: StatusReport = serde_json::from_str(
            r#"{"status": "completed", "metrics": {"training_metrics": {"train_loss": 0.3}, "validation_metrics": {}, "step": 2}}"#,
        )
        .unwrap();
        assert_eq!(report.status, JobStatus::Completed);
        assert!(report.status.is_terminal());
        let metrics = report.metrics.unwrap();
        assert_eq!(metrics.training_metrics["train_loss"], 0.3);
        assert_eq!(metrics.step, 2);
    }

    #[test]
    fn test_status_report_failed() {
        let report: StatusReport = serde_json::from_str(r#"{"status": "failed", "error": "OOM"}"#).unwrap();
        assert_eq!(report.status, JobStatus::Failed);
        assert_eq!(report.error_message(), "OOM");
    }

    #[test]
    fn test_unknown_status_is_not_terminal() {
        let report: StatusReport = serde_json::from_str(r#"{"status": "preparing"}"#).unwrap();
        assert_eq!(report.status, JobStatus::Other("preparing".to_string()));
        assert!(!report.status.is_terminal());
        assert!(!JobStatus::Running.is_terminal());
        assert!(!JobStatus::Queued.is_terminal());
    }

    #[test]
    fn test_status_report_rejects_malformed_payloads() {
        assert!(serde_json::from_str::<StatusReport>(r#"{"state": "running"}"#).is_err());
        assert!(serde_json::from_str::<StatusReport>(r#"{"status": 3}"#).is_err());
        assert!(
            serde_json::from_str::<StatusReport>(r#"{"status": "completed", "metrics": {"step": "x"}}"#).is_err()
        );
    }
}
