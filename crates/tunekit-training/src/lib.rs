//! Tunekit Training
//!
//! Client-side telemetry for remote fine-tuning jobs:
//! - Submitting a job and polling it to a terminal state (`JobClient`)
//! - Reading TensorBoard scalar event logs (`events`)
//! - Reducing scalar series to a `MetricsDocument` (`MetricsReducer`)
//! - Deriving per-run configuration files (`derive_run_config`)

pub mod client;
pub mod config;
pub mod error;
pub mod events;
pub mod job;
pub mod metrics;
pub mod progress;
pub mod reducer;
pub mod run_config;

pub use client::{HttpJobTransport, JobClient, JobTransport, Sleeper, TokioSleeper};
pub use config::{ClientSettings, PollPolicy, RunSettings};
pub use error::{TrainingError, TrainingResult};
pub use events::{EventFileWriter, EVENT_FILE_PREFIX};
pub use job::{JobOutcome, JobStatus, StatusReport, SubmissionAck};
pub use metrics::{classify, LatestPolicy, MetricBucket, MetricsDocument, ScalarHistory, ScalarPoint, ScalarSeries};
pub use progress::{ProgressEvent, ProgressSink, StdoutProgressSink};
pub use reducer::{
    discover_logs, load_series, read_document, reduce, summarize, write_document, write_history, MetricsReducer,
    ReductionReport, DEFAULT_METRICS_FILE,
};
pub use run_config::{derive_run_config, FinetuneConfig, RunOverrides, DEFAULT_OUTPUT_DIR};
