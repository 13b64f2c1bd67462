//! Client for the remote fine-tuning server.
//!
//! A run is one submission followed by a poll loop:
//!
//! ```text
//! SUBMITTING -> SUBMITTED -> poll ... poll -> COMPLETED (metrics written)
//!                                         \-> FAILED    (JobFailed error)
//! ```
//!
//! The transport and the sleep between polls are injected, so the loop can be
//! driven without a network or real delays.

use crate::config::{ClientSettings, PollPolicy};
use crate::error::{TrainingError, TrainingResult};
use crate::job::{JobOutcome, JobStatus, StatusReport, SubmissionAck};
use crate::progress::{ProgressEvent, ProgressSink};
use crate::reducer::write_document;
use crate::run_config::FinetuneConfig;
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Talks to the job server.
#[async_trait]
pub trait JobTransport: Send + Sync {
    /// Uploads a configuration document and starts the job.
    async fn submit(&self, file_name: &str, payload: Vec<u8>) -> TrainingResult<SubmissionAck>;

    /// Fetches the current job status.
    async fn fetch_status(&self) -> TrainingResult<StatusReport>;
}

/// Waits between polls.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// HTTP transport for `POST /finetune` and `GET /finetune/status`.
pub struct HttpJobTransport {
    /// HTTP client for making requests.
    http_client: Client,
    /// Server base URL without a trailing slash.
    base_url: String,
    /// Optional bearer token.
    token: Option<String>,
    submit_timeout: Duration,
    status_timeout: Duration,
}

impl HttpJobTransport {
    #[must_use]
    pub fn new(base_url: &str, token: Option<String>, poll: &PollPolicy) -> Self {
        Self {
            http_client: Client::new(),
            base_url: base_url.trim().trim_end_matches('/').to_string(),
            token,
            submit_timeout: Duration::from_secs(poll.submit_timeout_secs),
            status_timeout: Duration::from_secs(poll.status_timeout_secs),
        }
    }

    pub fn from_settings(settings: &ClientSettings) -> TrainingResult<Self> {
        let base_url = settings.require_server_url()?;
        Ok(Self::new(base_url, settings.token.clone(), &settings.poll))
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.token {
            Some(ref token) => request.bearer_auth(token),
            None => request,
        }
    }
}

#[async_trait]
impl JobTransport for HttpJobTransport {
    async fn submit(&self, file_name: &str, payload: Vec<u8>) -> TrainingResult<SubmissionAck> {
        let url = self.endpoint("finetune");
        debug!(url = %url, file_name, bytes = payload.len(), "Submitting fine-tuning job");

        let part = Part::bytes(payload)
            .file_name(file_name.to_string())
            .mime_str("application/json")
            .map_err(|e| TrainingError::Submission(format!("Failed to set MIME type: {}", e)))?;
        let form = Form::new().part("file", part);

        let response = self
            .authorize(self.http_client.post(&url))
            .multipart(form)
            .timeout(self.submit_timeout)
            .send()
            .await
            .map_err(|e| TrainingError::Submission(format!("Failed to reach {}: {}", url, e)))?;

        let status = response.status();
        let text = submission_body(status, response.text().await)?;

        let body = if text.trim().is_empty() {
            None
        } else {
            Some(serde_json::from_str(&text).unwrap_or(serde_json::Value::String(text)))
        };
        Ok(SubmissionAck { status_code: status.as_u16(), body })
    }

    async fn fetch_status(&self) -> TrainingResult<StatusReport> {
        let url = self.endpoint("finetune/status");

        let response = self
            .authorize(self.http_client.get(&url))
            .timeout(self.status_timeout)
            .send()
            .await
            .map_err(|e| TrainingError::Poll(format!("Failed to reach {}: {}", url, e)))?;

        let status = response.status();
        let text = response.text().await.map_err(|e| TrainingError::Poll(format!("Failed to read status body: {}", e)))?;
        if !status.is_success() {
            return Err(TrainingError::Poll(describe_http_error(status, &text, "status check")));
        }

        serde_json::from_str(&text).map_err(|e| TrainingError::Poll(format!("Malformed status payload: {}", e)))
    }
}

/// Checks a submission response. A body that cannot be read only matters
/// when the server rejected the job, and then its read error becomes the detail.
fn submission_body<E: std::fmt::Display>(
    status: reqwest::StatusCode,
    body: Result<String, E>,
) -> TrainingResult<String> {
    let text = match body {
        Ok(text) => text,
        Err(e) if status.is_success() => {
            warn!(error = %e, "Job accepted but the response body could not be read");
            String::new()
        }
        Err(e) => format!("<failed to read response body: {}>", e),
    };
    if !status.is_success() {
        return Err(TrainingError::Submission(describe_http_error(status, &text, "job submission")));
    }
    Ok(text)
}

/// Maps HTTP status codes to a readable description.
fn describe_http_error(status: reqwest::StatusCode, error_text: &str, operation: &str) -> String {
    match status.as_u16() {
        400 => format!("Invalid request for {}: {}", operation, error_text),
        401 | 403 => format!("Authentication failed for {}: {}", operation, error_text),
        404 => format!("Endpoint not found for {}: {}", operation, error_text),
        409 => format!("Server is busy with another job ({}): {}", operation, error_text),
        413 => format!("Configuration too large for {}: {}", operation, error_text),
        429 => format!("Rate limit exceeded for {}: {}", operation, error_text),
        500..=599 => format!("Server error for {} ({}): {}", operation, status, error_text),
        _ => format!("Unexpected response for {} ({}): {}", operation, status, error_text),
    }
}

/// Submits jobs and waits for them to finish.
pub struct JobClient<T, S = TokioSleeper> {
    transport: T,
    sleeper: S,
    poll: PollPolicy,
    output: PathBuf,
}

impl<T: JobTransport, S: Sleeper> JobClient<T, S> {
    #[must_use]
    pub fn new(transport: T, sleeper: S, poll: PollPolicy, output: PathBuf) -> Self {
        Self { transport, sleeper, poll, output }
    }

    #[must_use]
    pub fn transport(&self) -> &T {
        &self.transport
    }

    #[must_use]
    pub fn output(&self) -> &Path {
        &self.output
    }

    /// Uploads `config_path`. Nothing is sent unless the file exists and is a JSON object.
    pub async fn submit(&self, config_path: &Path) -> TrainingResult<SubmissionAck> {
        if !config_path.is_file() {
            return Err(TrainingError::ConfigNotFound(config_path.to_path_buf()));
        }
        let payload = std::fs::read(config_path)?;
        FinetuneConfig::from_slice(&payload)
            .map_err(|e| TrainingError::InvalidConfig(format!("{}: {}", config_path.display(), e)))?;

        let file_name = config_path.file_name().and_then(|n| n.to_str()).unwrap_or("config.json");
        let ack = self.transport.submit(file_name, payload).await?;
        info!(config = %config_path.display(), status = ack.status_code, "Job submitted");
        Ok(ack)
    }

    pub async fn poll_status(&self) -> TrainingResult<StatusReport> {
        self.transport.fetch_status().await
    }

    /// Polls until the job is terminal.
    ///
    /// Failed polls are retried with backoff; more than `max_failures`
    /// consecutive failures abort with [`TrainingError::Poll`].
    ///
    /// On completion the server's `metrics` are written as a typed
    /// [`MetricsDocument`](crate::metrics::MetricsDocument), not byte for byte:
    /// fields outside `training_metrics`, `validation_metrics` and `step` are
    /// dropped and metric names come out sorted.
    pub async fn wait_for_completion(&self, progress: &dyn ProgressSink) -> TrainingResult<JobOutcome> {
        let mut polls = 0u32;
        let mut failures = 0u32;

        loop {
            let report = match self.poll_status().await {
                Ok(report) => report,
                Err(e) => {
                    failures += 1;
                    if failures > self.poll.max_failures {
                        return Err(TrainingError::Poll(format!(
                            "giving up after {failures} consecutive failed status checks: {e}"
                        )));
                    }
                    let delay = self.poll.backoff_delay(failures);
                    warn!(attempt = failures, delay = ?delay, error = %e, "Status check failed, retrying");
                    progress.on_event(ProgressEvent::PollRetry {
                        attempt: failures,
                        max_attempts: self.poll.max_failures,
                        error: e.to_string(),
                    });
                    self.sleeper.sleep(delay).await;
                    continue;
                }
            };

            failures = 0;
            polls += 1;
            debug!(poll = polls, status = %report.status, "Polled job status");
            progress.on_event(ProgressEvent::Status { poll: polls, status: report.status.clone() });

            match report.status {
                JobStatus::Completed => {
                    let metrics = report.metrics.unwrap_or_else(|| {
                        warn!("Completed job carried no metrics, writing an empty document");
                        Default::default()
                    });
                    write_document(&metrics, &self.output)?;
                    info!(output = %self.output.display(), polls, step = metrics.step, "Job completed");
                    progress.on_event(ProgressEvent::Completed { output: self.output.clone() });
                    return Ok(JobOutcome { metrics, polls, output_path: self.output.clone() });
                }
                JobStatus::Failed => {
                    let message = report.error_message();
                    warn!(polls, error = %message, "Job failed");
                    progress.on_event(ProgressEvent::Failed { error: message.clone() });
                    return Err(TrainingError::JobFailed(message));
                }
                _ => self.sleeper.sleep(self.poll.interval()).await,
            }
        }
    }

    /// Submits `config_path` and waits for the job to finish.
    pub async fn run(&self, config_path: &Path, progress: &dyn ProgressSink) -> TrainingResult<JobOutcome> {
        self.submit(config_path).await?;
        progress.on_event(ProgressEvent::Submitted { config: config_path.to_path_buf() });
        self.wait_for_completion(progress).await
    }
}
