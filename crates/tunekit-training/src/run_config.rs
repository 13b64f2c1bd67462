//! Fine-tuning configuration documents and per-run derivation.

use crate::config::RunSettings;
use crate::error::{TrainingError, TrainingResult};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use tracing::info;

/// `output_dir` assumed when a configuration does not set one.
pub const DEFAULT_OUTPUT_DIR: &str = "vits_finetuned_vie";

const LOG_SUBDIR: &str = "runs";

/// A fine-tuning configuration: a JSON object the server interprets.
///
/// Unknown fields are carried through untouched, in their original order.
#[derive(Debug, Clone, PartialEq)]
pub struct FinetuneConfig {
    fields: Map<String, Value>,
}

impl FinetuneConfig {
    /// Reads and validates a configuration file.
    pub fn load(path: &Path) -> TrainingResult<Self> {
        if !path.is_file() {
            return Err(TrainingError::ConfigNotFound(path.to_path_buf()));
        }
        let bytes = std::fs::read(path)?;
        Self::from_slice(&bytes)
            .map_err(|e| TrainingError::InvalidConfig(format!("{}: {}", path.display(), e)))
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, String> {
        match serde_json::from_slice::<Value>(bytes) {
            Ok(Value::Object(fields)) => Ok(Self { fields }),
            Ok(_) => Err("configuration must be a JSON object".to_string()),
            Err(e) => Err(e.to_string()),
        }
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn set(&mut self, key: &str, value: impl Into<Value>) {
        self.fields.insert(key.to_string(), value.into());
    }

    #[must_use]
    pub fn output_dir(&self) -> Option<&str> {
        self.get("output_dir").and_then(Value::as_str)
    }

    /// TensorBoard log directory of the run, `<output_dir>/runs` relative to
    /// the working directory. A leading `/` on `output_dir` is dropped.
    #[must_use]
    pub fn log_dir(&self) -> PathBuf {
        let output_dir = self.output_dir().unwrap_or(DEFAULT_OUTPUT_DIR).trim_start_matches('/');
        Path::new(output_dir).join(LOG_SUBDIR)
    }

    #[must_use]
    pub fn hub_model_id(&self) -> Option<&str> {
        self.get("hub_model_id").and_then(Value::as_str)
    }

    pub fn apply(&mut self, overrides: &RunOverrides) {
        self.set("push_to_hub", overrides.push_to_hub);
        self.set("hub_model_id", overrides.hub_model_id.clone());
        self.set("dataset_config_name", overrides.dataset_config_name.clone());
        self.set("num_train_epochs", overrides.num_train_epochs);
    }

    pub fn write(&self, path: &Path) -> TrainingResult<()> {
        crate::reducer::write_json(path, &self.fields)
    }
}

/// Fields rewritten for one run of the fine-tuning job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOverrides {
    pub push_to_hub: bool,
    pub hub_model_id: String,
    pub dataset_config_name: String,
    pub num_train_epochs: u32,
}

impl RunOverrides {
    pub fn for_run(run_id: &str, settings: &RunSettings) -> TrainingResult<Self> {
        validate_run_id(run_id)?;
        let owner = settings.hub_owner.as_deref().map(str::trim).filter(|o| !o.is_empty()).ok_or_else(|| {
            TrainingError::InvalidConfig("run.hub_owner must be set to derive a per-run configuration".to_string())
        })?;
        if settings.num_train_epochs == 0 {
            return Err(TrainingError::InvalidConfig("run.num_train_epochs must be >= 1".to_string()));
        }

        Ok(Self {
            push_to_hub: true,
            hub_model_id: format!("{owner}/{}-{run_id}", settings.repo_prefix),
            dataset_config_name: run_id.to_string(),
            num_train_epochs: settings.num_train_epochs,
        })
    }
}

fn validate_run_id(run_id: &str) -> TrainingResult<()> {
    if run_id.is_empty() {
        return Err(TrainingError::InvalidConfig("run id must not be empty".to_string()));
    }
    if let Some(bad) = run_id.chars().find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))) {
        return Err(TrainingError::InvalidConfig(format!("run id '{run_id}' contains invalid character '{bad}'")));
    }
    Ok(())
}

/// Path of the per-run file derived from `template`: `<stem>_<run_id>.json` beside it.
#[must_use]
pub fn run_config_path(template: &Path, run_id: &str) -> PathBuf {
    let stem = template.file_stem().and_then(|s| s.to_str()).unwrap_or("finetune");
    template.with_file_name(format!("{stem}_{run_id}.json"))
}

/// Writes a per-run copy of `template` with the run overrides applied.
///
/// The template itself is left untouched.
pub fn derive_run_config(template: &Path, run_id: &str, settings: &RunSettings) -> TrainingResult<PathBuf> {
    let overrides = RunOverrides::for_run(run_id, settings)?;
    let mut config = FinetuneConfig::load(template)?;
    config.apply(&overrides);

    let path = run_config_path(template, run_id);
    config.write(&path)?;
    info!(
        template = %template.display(),
        path = %path.display(),
        hub_model_id = %overrides.hub_model_id,
        "Derived run configuration"
    );
    Ok(path)
}
