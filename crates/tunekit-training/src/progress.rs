use crate::job::JobStatus;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressEvent {
    Submitted { config: PathBuf },
    Status { poll: u32, status: JobStatus },
    PollRetry { attempt: u32, max_attempts: u32, error: String },
    Completed { output: PathBuf },
    Failed { error: String },
}

pub trait ProgressSink: Send + Sync {
    fn on_event(&self, event: ProgressEvent);
}

#[derive(Debug, Default)]
pub struct StdoutProgressSink;

impl ProgressSink for StdoutProgressSink {
    fn on_event(&self, event: ProgressEvent) {
        match event {
            ProgressEvent::Submitted { config } => println!("✓ started ({})", config.display()),
            ProgressEvent::Status { status, .. } => println!("status: {status}"),
            ProgressEvent::PollRetry { attempt, max_attempts, error } => {
                println!("status check failed ({attempt}/{max_attempts}): {error}");
            }
            ProgressEvent::Completed { output } => println!("done. saved -> {}", output.display()),
            ProgressEvent::Failed { error } => println!("failed: {error}"),
        }
    }
}
