//! Client settings.
//!
//! Settings are resolved once at startup and passed into the job client:
//! 1. Defaults
//! 2. Global file (`~/.tunekit/config.toml`)
//! 3. Local file (`./.tunekitrc`)
//! 4. Environment (`TUNEKIT_SERVER_URL`, `TUNEKIT_TOKEN`)
//! 5. CLI flags (applied by the caller)

use crate::error::{TrainingError, TrainingResult};
use crate::metrics::LatestPolicy;
use crate::reducer::DEFAULT_METRICS_FILE;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

pub const ENV_SERVER_URL: &str = "TUNEKIT_SERVER_URL";
pub const ENV_TOKEN: &str = "TUNEKIT_TOKEN";

/// Poll loop timing and failure tolerance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollPolicy {
    pub interval_secs: u64,
    /// Consecutive failed polls tolerated before giving up.
    pub max_failures: u32,
    pub initial_backoff_secs: u64,
    pub max_backoff_secs: u64,
    pub backoff_multiplier: f64,
    pub submit_timeout_secs: u64,
    pub status_timeout_secs: u64,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval_secs: 30,
            max_failures: 3,
            initial_backoff_secs: 5,
            max_backoff_secs: 60,
            backoff_multiplier: 2.0,
            submit_timeout_secs: 60,
            status_timeout_secs: 30,
        }
    }
}

impl PollPolicy {
    #[must_use]
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    /// Delay before retrying after the `attempt`-th consecutive failure (1-based).
    #[must_use]
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
        let secs = (self.initial_backoff_secs as f64 * self.backoff_multiplier.powi(exponent))
            .min(self.max_backoff_secs as f64);
        Duration::from_secs_f64(secs.max(0.0))
    }

    pub fn validate(&self) -> TrainingResult<()> {
        if self.interval_secs == 0 {
            return Err(TrainingError::InvalidConfig("poll.interval_secs must be >= 1".to_string()));
        }
        if !self.backoff_multiplier.is_finite() || self.backoff_multiplier < 1.0 {
            return Err(TrainingError::InvalidConfig("poll.backoff_multiplier must be >= 1".to_string()));
        }
        if self.submit_timeout_secs == 0 || self.status_timeout_secs == 0 {
            return Err(TrainingError::InvalidConfig("request timeouts must be >= 1 second".to_string()));
        }
        Ok(())
    }
}

/// How per-run configuration files are derived.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSettings {
    pub hub_owner: Option<String>,
    pub repo_prefix: String,
    pub num_train_epochs: u32,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self { hub_owner: None, repo_prefix: "vits-finetuned-vie".to_string(), num_train_epochs: 5 }
    }
}

/// Resolved settings for the job client and metrics export.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientSettings {
    pub server_url: Option<String>,
    pub token: Option<String>,
    pub output: PathBuf,
    pub latest_policy: LatestPolicy,
    pub poll: PollPolicy,
    pub run: RunSettings,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            server_url: None,
            token: None,
            output: PathBuf::from(DEFAULT_METRICS_FILE),
            latest_policy: LatestPolicy::default(),
            poll: PollPolicy::default(),
            run: RunSettings::default(),
        }
    }
}

/// One settings file. Every field is optional so files only override what they set.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SettingsFile {
    #[serde(default)]
    pub server_url: Option<String>,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub output: Option<PathBuf>,
    #[serde(default)]
    pub latest_policy: Option<LatestPolicy>,
    #[serde(default)]
    pub poll: Option<PollPolicyFile>,
    #[serde(default)]
    pub run: Option<RunSettingsFile>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PollPolicyFile {
    pub interval_secs: Option<u64>,
    pub max_failures: Option<u32>,
    pub initial_backoff_secs: Option<u64>,
    pub max_backoff_secs: Option<u64>,
    pub backoff_multiplier: Option<f64>,
    pub submit_timeout_secs: Option<u64>,
    pub status_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RunSettingsFile {
    pub hub_owner: Option<String>,
    pub repo_prefix: Option<String>,
    pub num_train_epochs: Option<u32>,
}

impl SettingsFile {
    pub fn load_from_file(path: &Path) -> TrainingResult<Self> {
        if !path.exists() {
            return Err(TrainingError::ConfigNotFound(path.to_path_buf()));
        }
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content)
            .map_err(|e| TrainingError::InvalidConfig(format!("{}: {}", path.display(), e)))
    }
}

impl ClientSettings {
    /// Get default global settings file path.
    pub fn default_global_path() -> PathBuf {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("."))
            .join(".tunekit")
            .join("config.toml")
    }

    /// Get default local settings file path.
    pub fn default_local_path() -> PathBuf {
        PathBuf::from(".tunekitrc")
    }

    /// Defaults overlaid with the global then local settings files.
    pub fn discover_and_load() -> TrainingResult<Self> {
        Self::load_layered(&[Self::default_global_path(), Self::default_local_path()])
    }

    /// Defaults overlaid with each file in `paths`, later files winning.
    ///
    /// Missing files are skipped; a file that exists but does not parse is an
    /// error, and so is a merged poll policy that fails validation.
    pub fn load_layered(paths: &[PathBuf]) -> TrainingResult<Self> {
        let mut settings = Self::default();
        for path in paths {
            match SettingsFile::load_from_file(path) {
                Ok(file) => {
                    debug!(path = %path.display(), "Loaded settings file");
                    settings.merge(&file);
                }
                Err(TrainingError::ConfigNotFound(_)) => {}
                Err(e) => return Err(e),
            }
        }
        settings.poll.validate()?;
        Ok(settings)
    }

    /// Values set in `file` override the current ones.
    pub fn merge(&mut self, file: &SettingsFile) {
        if let Some(ref url) = file.server_url {
            self.server_url = Some(url.clone());
        }
        if let Some(ref token) = file.token {
            self.token = Some(token.clone());
        }
        if let Some(ref output) = file.output {
            self.output = output.clone();
        }
        if let Some(policy) = file.latest_policy {
            self.latest_policy = policy;
        }
        if let Some(ref poll) = file.poll {
            let p = &mut self.poll;
            p.interval_secs = poll.interval_secs.unwrap_or(p.interval_secs);
            p.max_failures = poll.max_failures.unwrap_or(p.max_failures);
            p.initial_backoff_secs = poll.initial_backoff_secs.unwrap_or(p.initial_backoff_secs);
            p.max_backoff_secs = poll.max_backoff_secs.unwrap_or(p.max_backoff_secs);
            p.backoff_multiplier = poll.backoff_multiplier.unwrap_or(p.backoff_multiplier);
            p.submit_timeout_secs = poll.submit_timeout_secs.unwrap_or(p.submit_timeout_secs);
            p.status_timeout_secs = poll.status_timeout_secs.unwrap_or(p.status_timeout_secs);
        }
        if let Some(ref run) = file.run {
            if let Some(ref owner) = run.hub_owner {
                self.run.hub_owner = Some(owner.clone());
            }
            if let Some(ref prefix) = run.repo_prefix {
                self.run.repo_prefix = prefix.clone();
            }
            if let Some(epochs) = run.num_train_epochs {
                self.run.num_train_epochs = epochs;
            }
        }
    }

    /// Applies environment overrides through `lookup` (normally `std::env::var`).
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(ENV_SERVER_URL).filter(|v| !v.trim().is_empty()) {
            self.server_url = Some(url);
        }
        if let Some(token) = lookup(ENV_TOKEN).filter(|v| !v.trim().is_empty()) {
            self.token = Some(token);
        }
    }

    /// Server URL, required for anything that talks to the job server.
    pub fn require_server_url(&self) -> TrainingResult<&str> {
        self.server_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .ok_or_else(|| {
                TrainingError::InvalidConfig(format!(
                    "no job server configured; set {ENV_SERVER_URL}, `server_url` in .tunekitrc, or pass --server"
                ))
            })
    }
}
