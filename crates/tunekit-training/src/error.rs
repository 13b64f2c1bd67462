use std::path::PathBuf;
use thiserror::Error;

pub type TrainingResult<T> = std::result::Result<T, TrainingError>;

#[derive(Debug, Error)]
pub enum TrainingError {
    #[error("configuration file not found: {}", .0.display())]
    ConfigNotFound(PathBuf),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("job submission failed: {0}")]
    Submission(String),

    #[error("status polling failed: {0}")]
    Poll(String),

    #[error("job failed: {0}")]
    JobFailed(String),

    #[error("failed to read event log {}: {reason}", path.display())]
    LogRead { path: PathBuf, reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl TrainingError {
    pub(crate) fn log_read(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::LogRead { path: path.into(), reason: reason.into() }
    }
}
